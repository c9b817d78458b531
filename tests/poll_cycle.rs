use chrono::{TimeZone, Utc};
use dashmelt::fetch::FileSource;
use dashmelt::poll::{run_cycle, EXIT_REJECTED};
use dashmelt::record::{CAPTURE_COLUMN, REVISION_COLUMN};
use dashmelt::{AppendOutcome, AssemblyConfig, CsvSink, FlattenConfig, Flattener, RecordAssembler};
use serde_json::json;
use std::fs;
use std::path::Path;

fn write_doc(dir: &Path, name: &str, value: serde_json::Value) -> FileSource {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();
    FileSource::new(path)
}

fn assembler() -> RecordAssembler {
    let flattener = Flattener::new(FlattenConfig::default()).unwrap();
    let config = AssemblyConfig {
        min_fields: 3,
        ..AssemblyConfig::default()
    };
    RecordAssembler::new(flattener, config)
}

#[test]
fn test_polls_accumulate_into_one_table() {
    let dir = tempfile::tempdir().unwrap();
    let sink = CsvSink::new(dir.path().join("ercot_ancillary_data.csv"));
    let assembler = assembler();

    let first = write_doc(
        dir.path(),
        "first.json",
        json!({
            "lastUpdate": "2025-03-01 06:00:00",
            "data": {
                "prc": 5000,
                "rows": [
                    {"type": "RRS", "responsibility": 2800, "label": "Responsive Reserve"},
                    {"type": "ECRS", "responsibility": 1500}
                ]
            }
        }),
    );
    let second = write_doc(
        dir.path(),
        "second.json",
        json!({
            "lastUpdate": "2025-03-01 06:05:00",
            "data": {
                "prc": 5100,
                "rows": [
                    {"type": "RRS", "responsibility": 2810},
                    {"type": "ECRS", "responsibility": 1490}
                ],
                "aggregations": {"hsl out": 4100}
            }
        }),
    );
    let degenerate = write_doc(dir.path(), "degenerate.json", json!({"data": {"prc": 1}}));

    let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    let t1 = Utc.with_ymd_and_hms(2025, 3, 1, 12, 5, 0).unwrap();
    let t2 = Utc.with_ymd_and_hms(2025, 3, 1, 12, 10, 0).unwrap();

    assert_eq!(
        run_cycle(&first, &assembler, &sink, t0).unwrap(),
        AppendOutcome::Created { columns: 5 }
    );
    assert_eq!(
        run_cycle(&second, &assembler, &sink, t1).unwrap(),
        AppendOutcome::Appended { rows: 2, columns: 6, new_columns: 1 }
    );
    let err = run_cycle(&degenerate, &assembler, &sink, t2).unwrap_err();
    assert_eq!(err.exit_code(), EXIT_REJECTED);

    let mut reader = csv::Reader::from_path(sink.path()).unwrap();
    let header: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
    assert_eq!(
        header,
        vec![
            CAPTURE_COLUMN,
            REVISION_COLUMN,
            "SYSTEM_PRC",
            "ROWS_RRS_RESPONSIBILITY",
            "ROWS_ECRS_RESPONSIBILITY",
            "AGG_HSL_OUT",
        ]
    );

    let rows: Vec<Vec<String>> = reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect();
    assert_eq!(
        rows,
        vec![
            vec!["2025-03-01T12:00:00.000000Z", "2025-03-01 06:00:00", "5000", "2800", "1500", ""],
            vec!["2025-03-01T12:05:00.000000Z", "2025-03-01 06:05:00", "5100", "2810", "1490", "4100"],
        ]
    );
}

#[test]
fn test_same_document_twice_gives_identical_columns() {
    let dir = tempfile::tempdir().unwrap();
    let sink = CsvSink::new(dir.path().join("out.csv"));
    let assembler = assembler();
    let doc = write_doc(
        dir.path(),
        "doc.json",
        json!({"data": {"group": [["a", 1], ["b", 2]], "list": [3, 4]}}),
    );

    run_cycle(&doc, &assembler, &sink, Utc::now()).unwrap();
    let outcome = run_cycle(&doc, &assembler, &sink, Utc::now()).unwrap();

    assert_eq!(outcome, AppendOutcome::Appended { rows: 2, columns: 5, new_columns: 0 });
}
