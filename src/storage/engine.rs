use crate::config::StoreConfig;
use crate::error::AcadError;
use parking_lot::{Mutex, RwLock};
use redb::{Database, TableDefinition};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

const DATA: TableDefinition<&[u8], &[u8]> = TableDefinition::new("academy");
const STORE_FILE: &str = "academy.redb";

/// Named sub-stores the adapter opens; the configured budget must cover them.
const OPENED_TABLES: usize = 1;

/// The injectable store contract every repository is written against.
///
/// Point operations serialize at single-key granularity only; there is no
/// cross-key transaction. Invariants spanning multiple keys are maintained by
/// the write ordering the repository layer applies.
pub trait Kv: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, AcadError>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), AcadError>;
    /// Returns whether the key was present.
    fn remove(&self, key: &[u8]) -> Result<bool, AcadError>;
    /// Ordered scan over the half-open range `[start, end)`.
    fn scan(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, AcadError>;
}

/// redb-backed adapter owning the single engine handle.
pub struct RedbStore {
    db: Database,
    reader_budget: usize,
    readers_in_flight: AtomicUsize,
}

impl RedbStore {
    fn new(config: &StoreConfig) -> Result<Self, AcadError> {
        config.validate()?;
        if config.max_tables < OPENED_TABLES {
            return Err(AcadError::InvalidConfig {
                message: format!(
                    "sub-store budget {} below the {} the adapter opens",
                    config.max_tables, OPENED_TABLES
                ),
            });
        }
        create_private_dir_all(&config.data_dir)?;
        let db = Database::builder()
            .set_cache_size(config.capacity_bytes as usize)
            .create(config.data_dir.join(STORE_FILE))?;
        // Materialize the table so read transactions never race its creation.
        let tx = db.begin_write()?;
        tx.open_table(DATA)?;
        tx.commit()?;
        Ok(Self {
            db,
            reader_budget: config.max_readers,
            readers_in_flight: AtomicUsize::new(0),
        })
    }

    /// Claims a read slot. Exhaustion is a provisioning bug, not a soft
    /// error: the request fails outright.
    fn acquire_reader(&self) -> Result<ReaderSlot<'_>, AcadError> {
        let claimed = self
            .readers_in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.reader_budget).then_some(n + 1)
            });
        match claimed {
            Ok(_) => Ok(ReaderSlot { store: self }),
            Err(_) => Err(AcadError::ReadersExhausted {
                budget: self.reader_budget,
            }),
        }
    }
}

struct ReaderSlot<'a> {
    store: &'a RedbStore,
}

impl Drop for ReaderSlot<'_> {
    fn drop(&mut self) {
        self.store.readers_in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Kv for RedbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, AcadError> {
        let _slot = self.acquire_reader()?;
        let tx = self.db.begin_read()?;
        let table = tx.open_table(DATA)?;
        Ok(table.get(key)?.map(|guard| guard.value().to_vec()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), AcadError> {
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(DATA)?;
            table.insert(key, value)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<bool, AcadError> {
        let tx = self.db.begin_write()?;
        let existed = {
            let mut table = tx.open_table(DATA)?;
            // The removal guard must drop before the table does.
            let removed = table.remove(key)?.is_some();
            removed
        };
        tx.commit()?;
        Ok(existed)
    }

    fn scan(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, AcadError> {
        let _slot = self.acquire_reader()?;
        let tx = self.db.begin_read()?;
        let table = tx.open_table(DATA)?;
        let mut entries = Vec::new();
        for item in table.range::<&[u8]>(start..end)? {
            let (key, value) = item?;
            entries.push((key.value().to_vec(), value.value().to_vec()));
        }
        Ok(entries)
    }
}

static HANDLE: Mutex<Option<Arc<RedbStore>>> = Mutex::new(None);

/// Opens the process-wide store handle, idempotent per process. Failure to
/// acquire the backing store (locked, bad path, disk full) is fatal and
/// propagates without retry.
pub fn open(config: &StoreConfig) -> Result<Arc<RedbStore>, AcadError> {
    let mut handle = HANDLE.lock();
    if let Some(store) = handle.as_ref() {
        debug!("store handle already open, reusing");
        return Ok(Arc::clone(store));
    }
    let store = Arc::new(RedbStore::new(config)?);
    info!(
        data_dir = %config.data_dir.display(),
        capacity_bytes = config.capacity_bytes,
        max_readers = config.max_readers,
        "opened store"
    );
    *handle = Some(Arc::clone(&store));
    Ok(store)
}

/// Releases the singleton so a later `open` builds a fresh handle. The
/// engine file closes once the last outstanding reference drops.
pub fn close() {
    let mut handle = HANDLE.lock();
    if handle.take().is_some() {
        info!("closed store handle");
    }
}

/// Creates the backing directory with owner-only permissions so database
/// files are not readable by other accounts on shared systems.
fn create_private_dir_all(path: &Path) -> Result<(), AcadError> {
    #[cfg(unix)]
    {
        use std::fs::DirBuilder;
        use std::os::unix::fs::DirBuilderExt;

        DirBuilder::new().recursive(true).mode(0o700).create(path)?;
        if !fs::metadata(path)?.is_dir() {
            return Err(AcadError::Validation(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }
    }
    #[cfg(not(unix))]
    {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// In-memory `Kv` fake for repository tests. Mirrors the ordered-scan
/// semantics of the real engine and counts writes so tests can assert that
/// migrate-on-read repairs are paid exactly once.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total puts and removes applied so far.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Kv for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, AcadError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), AcadError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<bool, AcadError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(self.entries.write().remove(key).is_some())
    }

    fn scan(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, AcadError> {
        Ok(self
            .entries
            .read()
            .range(start.to_vec()..end.to_vec())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_scan_is_ordered_and_half_open() {
        let store = MemoryStore::new();
        store.put(b"a:1", b"1").unwrap();
        store.put(b"a:2", b"2").unwrap();
        store.put(b"b:1", b"3").unwrap();

        let entries = store.scan(b"a:", b"a:\xFF").unwrap();
        assert_eq!(
            entries.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>(),
            vec![b"a:1".to_vec(), b"a:2".to_vec()]
        );
    }

    #[test]
    fn memory_store_remove_reports_presence() {
        let store = MemoryStore::new();
        store.put(b"k", b"v").unwrap();
        assert!(store.remove(b"k").unwrap());
        assert!(!store.remove(b"k").unwrap());
    }

    #[test]
    fn redb_store_round_trips_and_reports_removal() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::profile(dir.path());
        let store = RedbStore::new(&config).unwrap();

        store.put(b"a:1", b"x").unwrap();
        assert_eq!(store.get(b"a:1").unwrap(), Some(b"x".to_vec()));
        assert!(store.remove(b"a:1").unwrap());
        assert!(!store.remove(b"a:1").unwrap());
        assert_eq!(store.get(b"a:1").unwrap(), None);
    }

    #[test]
    fn exhausted_reader_budget_is_a_typed_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StoreConfig::profile(dir.path());
        config.max_readers = 1;
        let store = RedbStore::new(&config).unwrap();
        store.put(b"k", b"v").unwrap();

        let held = store.acquire_reader().unwrap();
        let err = store.get(b"k").unwrap_err();
        assert_eq!(err.code_str(), "readers_exhausted");

        // Releasing the slot makes reads available again.
        drop(held);
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
    }
}
