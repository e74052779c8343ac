// End-to-end runs: config in, parts out

mod harness;

use chunkpipe::config::{DestinationConfig, FsConfig, RuntimeConfig, TransformConfig};
use chunkpipe::writer::{OperatorStore, PartStore};
use harness::{memory_operator, read_string};
use std::path::Path;
use std::sync::Arc;

fn write_input(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path.to_string_lossy().to_string()
}

fn mapped_destination() -> DestinationConfig {
    let mut destination = DestinationConfig::new("mapped");
    destination.path = "exports/gwl".to_string();
    destination.extension = "csv".to_string();
    destination.filename_template = Some("{filename}_{source}_{part}".to_string());
    destination.header = Some("id,value".to_string());
    destination.transform = Some(TransformConfig {
        columns: Some(vec![0, 1]),
        ..TransformConfig::default()
    });
    destination
}

#[tokio::test]
async fn multiple_inputs_land_in_the_same_parts_on_disk() {
    let input_dir = tempfile::tempdir().unwrap();
    let output_dir = tempfile::tempdir().unwrap();
    let first = write_input(input_dir.path(), "day1.txt", "a|1|x\nb|2|y\n");
    let second = write_input(input_dir.path(), "day2.txt", "c|3|z\n");

    let mut full = DestinationConfig::new("full");
    full.max_part_bytes = 8;

    let mut config = RuntimeConfig::default();
    config.source.paths = vec![first, second];
    config.source.chunk_size = 4;
    config.storage.fs = Some(FsConfig {
        path: output_dir.path().to_string_lossy().to_string(),
    });
    config.destinations = vec![full, mapped_destination()];
    config.validate().unwrap();

    let report = chunkpipe::run_with_config(&config).await.unwrap();

    assert_eq!(report.inputs, 2);
    assert_eq!(report.bytes, 18);
    assert_eq!(report.total_parts(), 4);

    let full = &report.destinations[0];
    assert_eq!(full.name, "full");
    assert_eq!(
        full.parts,
        vec!["full-part-1.txt", "full-part-2.txt", "full-part-3.txt"]
    );
    let read = |key: &str| std::fs::read_to_string(output_dir.path().join(key)).unwrap();
    assert_eq!(read("full-part-1.txt"), "a|1|x\n");
    assert_eq!(read("full-part-3.txt"), "c|3|z\n");

    let mapped = &report.destinations[1];
    assert_eq!(mapped.parts, vec!["exports/gwl/mapped_day1_1.csv"]);
    assert_eq!(
        read("exports/gwl/mapped_day1_1.csv"),
        "id,value\na,1\nb,2\nc,3\n"
    );
}

#[tokio::test]
async fn runs_against_any_part_store() {
    let input_dir = tempfile::tempdir().unwrap();
    let input = write_input(
        input_dir.path(),
        "master.txt",
        "code|name\nA1|alpha\nB2|beta\n\nC3|gamma",
    );

    let mut skip_header = mapped_destination();
    skip_header.name = "no-header-row".to_string();
    skip_header.filename = Some("rows".to_string());
    skip_header.max_part_bytes = 16;
    skip_header.transform = Some(TransformConfig {
        columns: Some(vec![1]),
        skip_first_line: true,
        drop_empty: true,
        ..TransformConfig::default()
    });

    let mut config = RuntimeConfig::default();
    config.source.paths = vec![input];
    config.destinations = vec![skip_header];

    let op = memory_operator();
    let store: Arc<dyn PartStore> = Arc::new(OperatorStore::new(op.clone()));
    let report = chunkpipe::run_with_store(&config, store).await.unwrap();

    // Header is 9 bytes, so one mapped row fits next to it.
    let parts = &report.destinations[0].parts;
    assert_eq!(
        parts,
        &vec![
            "exports/gwl/rows_master_1.csv".to_string(),
            "exports/gwl/rows_master_2.csv".to_string(),
            "exports/gwl/rows_master_3.csv".to_string(),
        ]
    );
    assert_eq!(read_string(&op, &parts[0]).await, "id,value\nalpha\n");
    assert_eq!(read_string(&op, &parts[2]).await, "id,value\ngamma\n");
}

#[tokio::test]
async fn missing_input_fails_without_committing_parts() {
    let input_dir = tempfile::tempdir().unwrap();
    let present = write_input(input_dir.path(), "present.txt", "kept?\n");
    let missing = input_dir
        .path()
        .join("missing.txt")
        .to_string_lossy()
        .to_string();

    let mut config = RuntimeConfig::default();
    config.source.paths = vec![present, missing];
    config.destinations = vec![DestinationConfig::new("only")];

    let op = memory_operator();
    let store: Arc<dyn PartStore> = Arc::new(OperatorStore::new(op.clone()));
    let err = chunkpipe::run_with_store(&config, store).await.unwrap_err();

    let message = format!("{:#}", err);
    assert!(message.contains("missing.txt"), "{}", message);
    assert!(message.contains("E104"), "{}", message);
    assert!(!op.exists("only-part-1.txt").await.unwrap());
}

#[tokio::test]
async fn duplicate_part_names_are_rejected_before_running() {
    let mut config = RuntimeConfig::default();
    let mut a = DestinationConfig::new("a");
    a.filename = Some("same".to_string());
    let mut b = DestinationConfig::new("b");
    b.filename = Some("same".to_string());
    config.destinations = vec![a, b];

    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("destination 'b'"), "{}", err);
}
