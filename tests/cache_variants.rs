//! Cache variant tests
//!
//! The write-back cache and the in-memory store honour the same contract as
//! the disk engine; the XRF strategies are interchangeable on disk.

use mstdb::cache::{CacheClock, CachedMaster, MemoryMaster};
use mstdb::config::{DatabasePaths, MasterConfig};
use mstdb::master::{create_store, open_store, DiskMaster, MasterStore};
use mstdb::record::{ActiveStatus, Record, RecordStatus};
use tempfile::TempDir;

fn disk(dir: &TempDir) -> DiskMaster {
    DiskMaster::create(&DatabasePaths::new(dir.path().join("cds")), &MasterConfig::default())
        .unwrap()
}

fn reopen(dir: &TempDir) -> DiskMaster {
    DiskMaster::open(&DatabasePaths::new(dir.path().join("cds")), &MasterConfig::default())
        .unwrap()
}

/// Runs the same scenario against any store.
fn exercise(store: &mut dyn MasterStore) {
    let mut first = Record::new().field_with(1, "hello");
    assert_eq!(store.write(&mut first).unwrap(), 1);
    assert_eq!(store.next_mfn(), 2);

    store.delete(1).unwrap();
    assert_eq!(store.read(1).unwrap().status, RecordStatus::LogicallyDeleted);

    let mut fifth = Record::with_mfn(5).field_with(1, "five");
    assert_eq!(store.write(&mut fifth).unwrap(), 5);
    for mfn in 2..5 {
        assert_eq!(store.read(mfn).unwrap().status, RecordStatus::PhysicallyDeleted);
    }

    let mut update = store.read(5).unwrap();
    update.fields[0].content = "FIVE".to_string();
    store.write(&mut update).unwrap();
    assert_eq!(store.read(5).unwrap().field(1), Some("FIVE"));
    assert_eq!(update.active_status, Some(ActiveStatus::New));
    store.flush().unwrap();
}

#[test]
fn test_all_variants_share_the_contract() {
    let dir = TempDir::new().unwrap();
    let mut plain = disk(&dir);
    exercise(&mut plain);

    let cached_dir = TempDir::new().unwrap();
    let mut cached = CachedMaster::new(disk(&cached_dir), 2);
    exercise(&mut cached);

    let mut memory = MemoryMaster::new();
    exercise(&mut memory);
}

#[test]
fn test_write_back_reaches_disk_on_close() {
    let dir = TempDir::new().unwrap();
    {
        let mut cached = CachedMaster::new(disk(&dir), 10);
        cached.write(&mut Record::new().field_with(1, "v1")).unwrap();
        let mut update = cached.read(1).unwrap();
        update.fields[0].content = "v2".to_string();
        cached.write(&mut update).unwrap();
        assert_eq!(cached.dirty_count(), 1);
        cached.close().unwrap();
    }
    let mut master = reopen(&dir);
    assert_eq!(master.read(1).unwrap().field(1), Some("v2"));
}

#[test]
fn test_eviction_order_follows_clock() {
    let dir = TempDir::new().unwrap();
    let mut cached = CachedMaster::with_clock(disk(&dir), 3, CacheClock::starting_at(1_000));
    for i in 1..=3 {
        cached
            .write(&mut Record::new().field_with(1, format!("r{}", i)))
            .unwrap();
    }
    // touching 1 makes 2 the oldest
    cached.read(1).unwrap();
    cached.write(&mut Record::new().field_with(1, "r4")).unwrap();

    assert!(cached.contains(1));
    assert!(!cached.contains(2));
    assert!(cached.contains(3));
    assert_eq!(cached.len(), 3);
    assert_eq!(cached.metrics().cache_evictions, 1);
}

#[test]
fn test_dirty_eviction_is_written_through() {
    let dir = TempDir::new().unwrap();
    let mut cached = CachedMaster::new(disk(&dir), 1);
    cached.write(&mut Record::new().field_with(1, "a")).unwrap();
    let mut update = cached.read(1).unwrap();
    update.fields[0].content = "b".to_string();
    cached.write(&mut update).unwrap();

    // pushes the dirty mfn 1 out
    cached.write(&mut Record::new().field_with(1, "c")).unwrap();
    assert_eq!(cached.dirty_count(), 0);
    assert_eq!(cached.inner().metrics().records_read, 0);
    cached.close().unwrap();
    drop(cached);

    let mut master = reopen(&dir);
    assert_eq!(master.read(1).unwrap().field(1), Some("b"));
}

#[test]
fn test_xrf_strategies_are_interchangeable() {
    let configs = [
        MasterConfig {
            xrf_page_cache: false,
            ..MasterConfig::default()
        },
        MasterConfig::default(),
        MasterConfig {
            xrf_write_through: true,
            ..MasterConfig::default()
        },
        MasterConfig {
            in_memory_xrf: true,
            ..MasterConfig::default()
        },
    ];

    for (i, writer) in configs.iter().enumerate() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("x");
        {
            let mut store = create_store(&base, writer).unwrap();
            for n in 0..200 {
                store
                    .write(&mut Record::new().field_with(1, format!("n{}", n)))
                    .unwrap();
            }
            store.close().unwrap();
        }
        for reader in &configs {
            let mut store = open_store(&base, reader).unwrap();
            assert_eq!(store.next_mfn(), 201, "writer {}", i);
            assert_eq!(store.read(128).unwrap().field(1), Some("n127"));
            assert_eq!(store.read(200).unwrap().field(1), Some("n199"));
        }
    }
}

#[test]
fn test_in_memory_master_has_no_files() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("ghost");
    let config = MasterConfig {
        in_memory_master: true,
        ..MasterConfig::default()
    };
    let mut store = create_store(&base, &config).unwrap();
    store.write(&mut Record::new().field_with(1, "x")).unwrap();
    store.close().unwrap();
    assert!(!DatabasePaths::new(&base).exists());
}
