//! External sort properties: ordering, multiset preservation, idempotence,
//! header handling and temp-file hygiene.

use std::path::Path;

use stitch::error::ErrorKind;
use stitch::schema::ColumnType;
use stitch::sort::{SortColumn, sort_file};
use stitch_config::{CsvFormatConfig, SortFileConfig};

fn format_with_header() -> CsvFormatConfig {
    CsvFormatConfig {
        has_header: true,
        ..CsvFormatConfig::default()
    }
}

fn write_input(path: &Path, lines: &[&str]) {
    std::fs::write(path, lines.join("\n") + "\n").unwrap();
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

const UNSORTED: &[&str] = &[
    "account,id,amount",
    "10,2,5.0",
    "2,1,1.5",
    "10,1,2.0",
    "2,10,0.25",
    "2,9,4.0",
    "7,1,9.9",
];

const SORTED: &[&str] = &[
    "account,id,amount",
    "2,1,1.5",
    "2,9,4.0",
    "2,10,0.25",
    "7,1,9.9",
    "10,1,2.0",
    "10,2,5.0",
];

fn key() -> Vec<SortColumn> {
    vec![
        SortColumn::by_name("account", ColumnType::Integer),
        SortColumn::by_name("id", ColumnType::Integer),
    ]
}

#[test]
fn test_sorts_numerically_for_any_chunk_size() {
    for chunk_rows in [1, 2, 3, 100] {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.csv");
        let output = dir.path().join("output.csv");
        write_input(&input, UNSORTED);

        let config = SortFileConfig {
            chunk_rows,
            ..SortFileConfig::default()
        };
        sort_file(&input, &output, &key(), &format_with_header(), &config).unwrap();

        assert_eq!(read_lines(&output), SORTED, "chunk_rows = {chunk_rows}");
    }
}

#[test]
fn test_sort_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.csv");
    let once = dir.path().join("once.csv");
    let twice = dir.path().join("twice.csv");
    write_input(&input, UNSORTED);

    let config = SortFileConfig {
        chunk_rows: 2,
        ..SortFileConfig::default()
    };
    sort_file(&input, &once, &key(), &format_with_header(), &config).unwrap();
    sort_file(&once, &twice, &key(), &format_with_header(), &config).unwrap();

    assert_eq!(read_lines(&once), read_lines(&twice));
}

#[test]
fn test_refuses_existing_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.csv");
    let output = dir.path().join("output.csv");
    write_input(&input, UNSORTED);
    std::fs::write(&output, "already here\n").unwrap();

    let err = sort_file(
        &input,
        &output,
        &key(),
        &format_with_header(),
        &SortFileConfig::default(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn test_empty_fields_sort_first() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.csv");
    let output = dir.path().join("output.csv");
    write_input(&input, &["account,id,amount", "5,1,0", ",1,0", "1,1,0"]);

    sort_file(
        &input,
        &output,
        &key(),
        &format_with_header(),
        &SortFileConfig {
            chunk_rows: 2,
            ..SortFileConfig::default()
        },
    )
    .unwrap();

    assert_eq!(
        read_lines(&output),
        vec!["account,id,amount", ",1,0", "1,1,0", "5,1,0"]
    );
}

#[test]
fn test_headerless_input_keys_by_index() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.csv");
    let output = dir.path().join("output.csv");
    write_input(&input, &["b,2", "a,1", "c,3"]);

    let key = vec![SortColumn::by_index(0, ColumnType::text())];
    sort_file(
        &input,
        &output,
        &key,
        &CsvFormatConfig::default(),
        &SortFileConfig::default(),
    )
    .unwrap();

    assert_eq!(read_lines(&output), vec!["a,1", "b,2", "c,3"]);
}

#[test]
fn test_temporary_chunks_are_removed() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.csv");
    let output = dir.path().join("output.csv");
    let tmp = dir.path().join("spill");
    write_input(&input, UNSORTED);

    let config = SortFileConfig {
        chunk_rows: 1,
        tmp_dir: Some(tmp.clone()),
        ..SortFileConfig::default()
    };
    sort_file(&input, &output, &key(), &format_with_header(), &config).unwrap();

    // The sort created the spill directory itself, so it removes it too.
    assert!(!tmp.exists());
    assert_eq!(read_lines(&output), SORTED);
}

#[test]
fn test_sorting_an_empty_file_keeps_the_header() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.csv");
    let output = dir.path().join("output.csv");
    write_input(&input, &["account,id,amount"]);

    sort_file(
        &input,
        &output,
        &key(),
        &format_with_header(),
        &SortFileConfig::default(),
    )
    .unwrap();

    assert_eq!(read_lines(&output), vec!["account,id,amount"]);
}
