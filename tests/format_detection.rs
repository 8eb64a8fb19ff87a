//! Format detection tests
//!
//! A database written under any layout opens with every layout option left
//! unset, and the handle then reads and writes with the detected layout.

use std::fs;

use mstdb::binary::ByteOrder;
use mstdb::codec::{Encoding, FormatParams};
use mstdb::config::{DatabasePaths, MasterConfig};
use mstdb::detect::platform_default_filler;
use mstdb::errors::MstErrorCode;
use mstdb::master::{DiskMaster, MasterStore};
use mstdb::record::Record;
use tempfile::TempDir;

fn written_with(dir: &TempDir, name: &str, config: &MasterConfig) -> DatabasePaths {
    let paths = DatabasePaths::new(dir.path().join(name));
    let mut master = DiskMaster::create(&paths, config).unwrap();
    master
        .write(&mut Record::new().field_with(10, "Borges, J. L.").field_with(24, "Ficciones"))
        .unwrap();
    master
        .write(&mut Record::new().field_with(24, "El Aleph"))
        .unwrap();
    master.close().unwrap();
    paths
}

fn layout(order: ByteOrder, extended: bool, filler: u8) -> MasterConfig {
    MasterConfig {
        byte_order: Some(order),
        extended: Some(extended),
        filler: Some(filler),
        ..MasterConfig::default()
    }
}

#[test]
fn test_extended_filler2_swapped_is_recovered() {
    let dir = TempDir::new().unwrap();
    let original = written_with(&dir, "ffi", &layout(ByteOrder::Swapped, true, 2));

    // a copy that carries no layout hints at all
    let copy = DatabasePaths::new(dir.path().join("copy"));
    fs::copy(original.master(), copy.master()).unwrap();
    fs::copy(original.xrf(), copy.xrf()).unwrap();

    let mut master = DiskMaster::open(&copy, &MasterConfig::default()).unwrap();
    assert_eq!(
        *master.params(),
        FormatParams::new(ByteOrder::Swapped, true, 2, 0).unwrap()
    );
    assert_eq!(master.read(1).unwrap().field(24), Some("Ficciones"));
    assert_eq!(master.read(2).unwrap().field(24), Some("El Aleph"));
}

#[test]
fn test_every_layout_is_recovered() {
    let dir = TempDir::new().unwrap();
    for order in ByteOrder::CANDIDATES {
        for (extended, filler) in [(false, 0), (false, 2), (true, 0), (true, 2)] {
            let name = format!("db-{}-{}-{}", order, extended, filler);
            let paths = written_with(&dir, &name, &layout(order, extended, filler));
            let master = DiskMaster::open(&paths, &MasterConfig::default()).unwrap();
            let params = master.params();
            assert_eq!(params.byte_order(), order, "{}", name);
            assert_eq!(params.is_extended(), extended, "{}", name);
            assert_eq!(params.filler(), filler, "{}", name);
        }
    }
}

#[test]
fn test_detection_skips_leading_tombstones() {
    let dir = TempDir::new().unwrap();
    let paths = DatabasePaths::new(dir.path().join("gaps"));
    {
        let mut master = DiskMaster::create(&paths, &layout(ByteOrder::Direct, true, 0)).unwrap();
        master
            .write(&mut Record::with_mfn(6).field_with(1, "after gap"))
            .unwrap();
        master.close().unwrap();
    }
    let mut master = DiskMaster::open(&paths, &MasterConfig::default()).unwrap();
    assert!(master.params().is_extended());
    assert_eq!(master.params().filler(), 0);
    assert_eq!(master.read(6).unwrap().field(1), Some("after gap"));
}

#[test]
fn test_empty_database_falls_back_to_platform_filler() {
    let dir = TempDir::new().unwrap();
    let paths = DatabasePaths::new(dir.path().join("empty"));
    DiskMaster::create(&paths, &layout(ByteOrder::Swapped, false, 0))
        .unwrap()
        .close()
        .unwrap();

    let master = DiskMaster::open(&paths, &MasterConfig::default()).unwrap();
    assert_eq!(master.params().byte_order(), ByteOrder::Swapped);
    assert!(!master.params().is_extended());
    assert_eq!(master.params().filler(), platform_default_filler());
}

#[test]
fn test_conflicting_configuration_is_rejected() {
    let dir = TempDir::new().unwrap();
    let paths = written_with(&dir, "std", &layout(ByteOrder::Direct, false, 2));

    let config = MasterConfig {
        extended: Some(true),
        ..MasterConfig::default()
    };
    let err = DiskMaster::open(&paths, &config).err().unwrap();
    assert_eq!(err.code(), MstErrorCode::Format);
}

#[test]
fn test_shift_recovered_from_control_record() {
    let dir = TempDir::new().unwrap();
    let config = MasterConfig {
        shift: 3,
        ..MasterConfig::default()
    };
    let paths = written_with(&dir, "wide", &config);

    let mut master = DiskMaster::open(&paths, &MasterConfig::default()).unwrap();
    assert_eq!(master.params().shift(), 3);
    assert_eq!(master.entry(2).unwrap().position.offset % 8, 0);
    assert_eq!(master.read(2).unwrap().field(24), Some("El Aleph"));
}

#[test]
fn test_garbage_file_is_unrecognized() {
    let dir = TempDir::new().unwrap();
    let paths = DatabasePaths::new(dir.path().join("junk"));
    fs::write(paths.master(), vec![0xEE; 4096]).unwrap();
    fs::write(paths.xrf(), vec![0u8; 512]).unwrap();

    let err = DiskMaster::open(&paths, &MasterConfig::default()).err().unwrap();
    assert_eq!(err.code(), MstErrorCode::Format);
    assert!(err.message().contains("unrecognized format"));
}

#[test]
fn test_corrupted_shift_byte_is_a_format_error() {
    let dir = TempDir::new().unwrap();
    let paths = written_with(&dir, "badshift", &layout(ByteOrder::Direct, false, 2));

    // high byte of the little-endian file-type word
    let mut bytes = fs::read(paths.master()).unwrap();
    bytes[15] = 12;
    fs::write(paths.master(), &bytes).unwrap();

    let err = DiskMaster::open(&paths, &MasterConfig::default()).err().unwrap();
    assert_eq!(err.code(), MstErrorCode::Format);
    assert!(err.message().contains("shift"));
}

#[test]
fn test_encoding_guessed_from_content() {
    let dir = TempDir::new().unwrap();
    let paths = DatabasePaths::new(dir.path().join("dos"));
    let dos = MasterConfig {
        encoding: "cp850".to_string(),
        ..MasterConfig::default()
    };
    {
        let mut master = DiskMaster::create(&paths, &dos).unwrap();
        master
            .write(&mut Record::new().field_with(24, "Canción del niño español"))
            .unwrap();
        master.close().unwrap();
    }

    let auto = MasterConfig {
        encoding: "auto".to_string(),
        ..MasterConfig::default()
    };
    let mut master = DiskMaster::open(&paths, &auto).unwrap();
    assert_eq!(master.encoding(), Encoding::Cp850);
    assert_eq!(
        master.read(1).unwrap().field(24),
        Some("Canción del niño español")
    );
}
