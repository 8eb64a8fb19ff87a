//! Record codec tests
//!
//! - Every layout variant and byte order decodes what it encodes
//! - Size limits of each variant are enforced
//! - Corrupted directories are rejected

use mstdb::binary::ByteOrder;
use mstdb::codec::{Encoding, FormatParams, RecordCodec, MAX_STANDARD_RECORD};
use mstdb::errors::MstErrorCode;
use mstdb::record::{Position, Record, RecordStatus};

fn all_codecs(encoding: Encoding) -> Vec<RecordCodec> {
    ByteOrder::CANDIDATES
        .into_iter()
        .flat_map(|order| FormatParams::variants(order, 0))
        .map(|params| RecordCodec::new(params, encoding))
        .collect()
}

fn sample_record() -> Record {
    let mut record = Record::with_mfn(42);
    record
        .add_field(10, "Lovelace, Ada")
        .add_field(24, "Notes on the analytical engine")
        .add_field(24, "")
        .add_field(70, "Crónica ^aMadrid^b1843");
    record.back_pointer = Position::new(7, 128);
    record
}

#[test]
fn test_all_variants_round_trip() {
    let record = sample_record();
    for codec in all_codecs(Encoding::Cp1252) {
        let bytes = codec.encode(&record).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, record, "{}", codec.params().describe());
    }
}

#[test]
fn test_deleted_status_round_trips() {
    let mut record = sample_record();
    record.status = RecordStatus::LogicallyDeleted;
    for codec in all_codecs(Encoding::Utf8) {
        let decoded = codec.decode(&codec.encode(&record).unwrap()).unwrap();
        assert_eq!(decoded.status, RecordStatus::LogicallyDeleted);
    }
}

#[test]
fn test_empty_record_is_header_only() {
    for codec in all_codecs(Encoding::Cp1252) {
        let bytes = codec.encode(&Record::with_mfn(1)).unwrap();
        assert_eq!(bytes.len(), codec.params().header_size());
        assert!(codec.decode(&bytes).unwrap().fields.is_empty());
    }
}

#[test]
fn test_padding_is_spaces_and_invisible() {
    let codec = RecordCodec::new(FormatParams::standard(), Encoding::Cp1252);
    let record = Record::with_mfn(3).field_with(1, "abc");
    let natural = codec.encoded_len(&record).unwrap();
    let padded = codec.encode_with_span(&record, natural + 10).unwrap();

    assert_eq!(padded.len(), natural + 10);
    assert!(padded[natural..].iter().all(|&b| b == b' '));
    assert_eq!(codec.decode(&padded).unwrap(), record);
}

#[test]
fn test_standard_size_limit() {
    let codec = RecordCodec::new(FormatParams::standard(), Encoding::Latin1);
    let header = codec.params().expected_base(1);

    let fits = Record::with_mfn(1).field_with(1, "x".repeat(MAX_STANDARD_RECORD - header));
    assert_eq!(codec.encode(&fits).unwrap().len(), MAX_STANDARD_RECORD);

    let too_big = Record::with_mfn(1).field_with(1, "x".repeat(MAX_STANDARD_RECORD - header + 1));
    let err = codec.encode(&too_big).unwrap_err();
    assert_eq!(err.code(), MstErrorCode::Capacity);
}

#[test]
fn test_extended_holds_large_records() {
    let params = FormatParams::new(ByteOrder::Direct, true, 2, 0).unwrap();
    let codec = RecordCodec::new(params, Encoding::Latin1);
    let record = Record::with_mfn(9).field_with(1, "y".repeat(100_000));
    let bytes = codec.encode(&record).unwrap();
    assert_eq!(codec.decode(&bytes).unwrap(), record);
}

#[test]
fn test_directory_mismatch_is_format_error() {
    let codec = RecordCodec::new(FormatParams::standard(), Encoding::Cp1252);
    let mut bytes = codec.encode(&sample_record()).unwrap();
    let at = codec.params().field_count_at();
    bytes[at] = bytes[at].wrapping_add(1);

    let err = codec.decode(&bytes).unwrap_err();
    assert_eq!(err.code(), MstErrorCode::Format);
    assert!(err.message().contains("directory mismatch"));
}

#[test]
fn test_tag_must_fit_directory_slot() {
    let codec = RecordCodec::new(FormatParams::standard(), Encoding::Cp1252);
    let err = codec
        .encode(&Record::with_mfn(1).field_with(70_000, "x"))
        .unwrap_err();
    assert_eq!(err.code(), MstErrorCode::Range);
}

#[test]
fn test_invalid_utf8_content_is_format_error() {
    let latin = RecordCodec::new(FormatParams::standard(), Encoding::Latin1);
    let utf8 = RecordCodec::new(FormatParams::standard(), Encoding::Utf8);
    let bytes = latin.encode(&Record::with_mfn(1).field_with(1, "é")).unwrap();
    assert_eq!(utf8.decode(&bytes).unwrap_err().code(), MstErrorCode::Format);
}
