//! Tests for Segment
//!
//! These tests verify:
//! - Appending records and reading them back by offset
//! - End-of-log detection (EOF, zeroed bytes, torn tail)
//! - Checksum failures on corrupted bytes
//! - Hint records

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

use caskdb::data::{segment_file_name, LogRecord, LogRecordType, RecordPosition, Segment};
use caskdb::CaskError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().to_path_buf();
    (temp_dir, path)
}

fn append(segment: &mut Segment, record: &LogRecord) -> u64 {
    segment.write(&record.encode()).unwrap()
}

fn overwrite_byte(path: &std::path::Path, offset: u64, byte: u8) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(&[byte]).unwrap();
}

// =============================================================================
// Naming Tests
// =============================================================================

#[test]
fn test_segment_file_name_is_zero_padded() {
    assert_eq!(segment_file_name(0), "000000000.data");
    assert_eq!(segment_file_name(42), "000000042.data");
}

#[test]
fn test_open_creates_file() {
    let (_temp, dir) = setup_temp_dir();

    let segment = Segment::open(&dir, 3).unwrap();

    assert_eq!(segment.id(), 3);
    assert_eq!(segment.write_offset(), 0);
    assert!(dir.join("000000003.data").exists());
}

// =============================================================================
// Read/Write Tests
// =============================================================================

#[test]
fn test_write_returns_start_offset() {
    let (_temp, dir) = setup_temp_dir();
    let mut segment = Segment::open(&dir, 0).unwrap();

    let first = LogRecord::normal(b"a".to_vec(), b"1".to_vec());
    let second = LogRecord::normal(b"b".to_vec(), b"22".to_vec());

    assert_eq!(append(&mut segment, &first), 0);
    let second_offset = append(&mut segment, &second);
    assert_eq!(second_offset, first.encode().len() as u64);
    assert_eq!(
        segment.write_offset(),
        (first.encode().len() + second.encode().len()) as u64
    );
}

#[test]
fn test_read_records_sequentially() {
    let (_temp, dir) = setup_temp_dir();
    let mut segment = Segment::open(&dir, 0).unwrap();

    let records = vec![
        LogRecord::normal(b"key1".to_vec(), b"value1".to_vec()),
        LogRecord::deleted(b"key1".to_vec()),
        LogRecord::normal(b"key2".to_vec(), vec![7; 1000]),
    ];
    for record in &records {
        append(&mut segment, record);
    }

    let mut offset = 0;
    let mut read_back = Vec::new();
    while let Some((record, size)) = segment.read_log_record(offset).unwrap() {
        read_back.push(record);
        offset += size;
    }

    assert_eq!(read_back, records);
    assert_eq!(offset, segment.write_offset());
}

#[test]
fn test_reopen_resumes_at_file_end() {
    let (_temp, dir) = setup_temp_dir();
    let len = {
        let mut segment = Segment::open(&dir, 0).unwrap();
        append(&mut segment, &LogRecord::normal(b"k".to_vec(), b"v".to_vec()));
        segment.sync().unwrap();
        segment.write_offset()
    };

    let segment = Segment::open(&dir, 0).unwrap();
    assert_eq!(segment.write_offset(), len);
    assert_eq!(segment.size().unwrap(), len);
}

// =============================================================================
// End-of-Log Tests
// =============================================================================

#[test]
fn test_read_past_end_is_none() {
    let (_temp, dir) = setup_temp_dir();
    let segment = Segment::open(&dir, 0).unwrap();

    assert!(segment.read_log_record(0).unwrap().is_none());
    assert!(segment.read_log_record(1000).unwrap().is_none());
}

#[test]
fn test_zeroed_bytes_are_end_of_log() {
    let (_temp, dir) = setup_temp_dir();
    let mut segment = Segment::open(&dir, 0).unwrap();

    let offset = segment.write(&[0u8; 64]).unwrap();
    assert!(segment.read_log_record(offset).unwrap().is_none());
}

#[test]
fn test_torn_tail_is_end_of_log() {
    let (_temp, dir) = setup_temp_dir();
    let mut segment = Segment::open(&dir, 0).unwrap();

    let good = LogRecord::normal(b"good".to_vec(), b"value".to_vec());
    append(&mut segment, &good);

    // Half of a second record
    let torn = LogRecord::normal(b"torn".to_vec(), vec![9; 100]).encode();
    let torn_offset = segment.write(&torn[..torn.len() / 2]).unwrap();

    assert!(segment.read_log_record(0).unwrap().is_some());
    assert!(segment.read_log_record(torn_offset).unwrap().is_none());
}

#[test]
fn test_truncate_drops_tail() {
    let (_temp, dir) = setup_temp_dir();
    let mut segment = Segment::open(&dir, 0).unwrap();

    append(&mut segment, &LogRecord::normal(b"a".to_vec(), b"1".to_vec()));
    let keep = segment.write_offset();
    segment.write(&[1, 2, 3]).unwrap();

    segment.truncate(keep).unwrap();

    assert_eq!(segment.write_offset(), keep);
    assert_eq!(segment.size().unwrap(), keep);

    // Appends line up with the truncated end
    let offset = append(&mut segment, &LogRecord::normal(b"b".to_vec(), b"2".to_vec()));
    assert_eq!(offset, keep);
    let (record, _) = segment.read_log_record(offset).unwrap().unwrap();
    assert_eq!(record.key, b"b");
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_flipped_value_byte_is_checksum_mismatch() {
    let (_temp, dir) = setup_temp_dir();
    let mut segment = Segment::open(&dir, 0).unwrap();

    let record = LogRecord::normal(b"key".to_vec(), b"value".to_vec());
    append(&mut segment, &record);
    segment.sync().unwrap();

    let last = record.encode().len() as u64 - 1;
    overwrite_byte(segment.path(), last, b'X');

    let err = segment.read_log_record(0).unwrap_err();
    match err {
        CaskError::ChecksumMismatch { offset, .. } => assert_eq!(offset, 0),
        other => panic!("expected checksum mismatch, got {:?}", other),
    }
}

#[test]
fn test_flipped_type_byte_is_checksum_mismatch() {
    let (_temp, dir) = setup_temp_dir();
    let mut segment = Segment::open(&dir, 0).unwrap();

    append(&mut segment, &LogRecord::normal(b"key".to_vec(), b"value".to_vec()));
    segment.sync().unwrap();

    overwrite_byte(segment.path(), 4, LogRecordType::Deleted as u8);

    assert!(matches!(
        segment.read_log_record(0),
        Err(CaskError::ChecksumMismatch { .. })
    ));
}

// =============================================================================
// Auxiliary File Tests
// =============================================================================

#[test]
fn test_hint_record_holds_position() {
    let (_temp, dir) = setup_temp_dir();
    let mut hint = Segment::open_hint_file(&dir).unwrap();

    let pos = RecordPosition::new(4, 1234);
    hint.write_hint_record(b"user:1", pos).unwrap();

    let (record, _) = hint.read_log_record(0).unwrap().unwrap();
    assert_eq!(record.key, b"user:1");
    assert_eq!(RecordPosition::decode(&record.value).unwrap(), pos);
    assert!(dir.join("hint-index").exists());
}
