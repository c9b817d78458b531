use serde_json::Value;

/// How the elements of an array are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayShape {
    /// No elements
    Empty,
    /// Every element is a `[name, value]` pair with a string name
    PairList,
    /// Every element is an object
    RecordList,
    /// Scalars or a mix of shapes
    ScalarList,
}

impl ArrayShape {
    /// Classify an array. The first rule matching every element wins.
    pub fn classify(items: &[Value]) -> Self {
        if items.is_empty() {
            return ArrayShape::Empty;
        }

        if items.iter().all(is_pair) {
            ArrayShape::PairList
        } else if items.iter().all(Value::is_object) {
            ArrayShape::RecordList
        } else {
            ArrayShape::ScalarList
        }
    }
}

fn is_pair(value: &Value) -> bool {
    matches!(value, Value::Array(pair) if pair.len() == 2 && pair[0].is_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shape(value: Value) -> ArrayShape {
        ArrayShape::classify(value.as_array().unwrap())
    }

    #[test]
    fn test_pair_list() {
        assert_eq!(shape(json!([["a", 1], ["b", {"x": 2}]])), ArrayShape::PairList);
    }

    #[test]
    fn test_record_list() {
        assert_eq!(shape(json!([{"type": "RRS"}, {}])), ArrayShape::RecordList);
    }

    #[test]
    fn test_scalar_and_mixed_lists() {
        assert_eq!(shape(json!([1, 2, 3])), ArrayShape::ScalarList);
        assert_eq!(shape(json!([{"a": 1}, 2])), ArrayShape::ScalarList);
        assert_eq!(shape(json!([["a", 1], ["b"]])), ArrayShape::ScalarList);
        assert_eq!(shape(json!([[1, 2], [3, 4]])), ArrayShape::ScalarList);
    }

    #[test]
    fn test_empty() {
        assert_eq!(shape(json!([])), ArrayShape::Empty);
    }
}
