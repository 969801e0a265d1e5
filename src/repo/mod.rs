//! Per-entity repositories built on the store adapter and the key-space
//! convention.
//!
//! There is no cross-key transaction underneath, so one write ordering is
//! applied globally: creates write the primary record before any index
//! entry, deletes remove index entries before the primary. A crash between
//! steps therefore leaves either an index-invisible primary (recoverable by
//! re-running the write) or a dangling pointer (skipped on read), never an
//! ambiguous state.

pub mod assessment;
pub mod attendance;
pub mod course;
pub mod enrollment;
pub mod program;
pub mod tenant;

use crate::error::AcadError;
use crate::model::Entity;
use crate::storage::engine::Kv;
use crate::storage::keyspace::{pointer_id, prefix_range, primary_key, primary_prefix};
use tracing::{debug, warn};

/// Generic single-entity operations shared by every repository.
#[derive(Clone, Copy)]
pub struct Repo<'a> {
    kv: &'a dyn Kv,
}

impl<'a> Repo<'a> {
    pub fn new(kv: &'a dyn Kv) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &'a dyn Kv {
        self.kv
    }

    /// Writes the primary record, then every index entry derived from it.
    pub fn create<T: Entity>(&self, record: &T) -> Result<(), AcadError> {
        let id = record.id().to_string();
        self.kv
            .put(&primary_key(T::KIND, &id), &encode(record)?)?;
        for key in record.index_keys() {
            self.kv.put(&key, id.as_bytes())?;
        }
        Ok(())
    }

    /// Point lookup with migrate-on-read: a pre-migration shape is
    /// normalized and persisted back under the same primary key once, so the
    /// repair cost is paid on first read only.
    pub fn find<T: Entity>(&self, id: &str) -> Result<Option<T>, AcadError> {
        let key = primary_key(T::KIND, id);
        let Some(bytes) = self.kv.get(&key)? else {
            return Ok(None);
        };
        let stored: T = decode(&bytes)?;
        let mut record = stored.clone();
        if record.migrate() {
            debug!(entity = T::KIND, id, "normalized pre-migration record");
            self.rewrite(&stored, &record)?;
        }
        Ok(Some(record))
    }

    /// Re-reads, applies the patch closure, rewrites the primary and any
    /// index entry whose key depends on changed fields.
    pub fn update<T: Entity>(
        &self,
        id: &str,
        patch: impl FnOnce(&mut T),
    ) -> Result<Option<T>, AcadError> {
        let key = primary_key(T::KIND, id);
        let Some(bytes) = self.kv.get(&key)? else {
            return Ok(None);
        };
        let stored: T = decode(&bytes)?;
        let mut record = stored.clone();
        record.migrate();
        patch(&mut record);
        self.rewrite(&stored, &record)?;
        Ok(Some(record))
    }

    /// Removes every index entry the record participates in, then the
    /// primary. Safe to re-run: a missing record reports `false`.
    pub fn delete<T: Entity>(&self, id: &str) -> Result<bool, AcadError> {
        let key = primary_key(T::KIND, id);
        let Some(bytes) = self.kv.get(&key)? else {
            return Ok(false);
        };
        let record: T = decode(&bytes)?;
        for index in record.index_keys() {
            self.kv.remove(&index)?;
        }
        self.kv.remove(&key)?;
        Ok(true)
    }

    /// Ids referenced by index entries under `prefix`, in key order.
    pub fn scan_ids(&self, prefix: &[u8]) -> Result<Vec<String>, AcadError> {
        let (start, end) = prefix_range(prefix);
        let mut ids = Vec::new();
        for (key, value) in self.kv.scan(&start, &end)? {
            match pointer_id(&value) {
                Some(id) => ids.push(id),
                None => warn!(key = ?String::from_utf8_lossy(&key), "unreadable index pointer"),
            }
        }
        Ok(ids)
    }

    /// Pointer-then-primary fetch for every index entry under `prefix`.
    /// Dangling pointers (primary already gone) are skipped.
    pub fn list_by_index<T: Entity>(&self, prefix: &[u8]) -> Result<Vec<T>, AcadError> {
        let mut records = Vec::new();
        for id in self.scan_ids(prefix)? {
            match self.find::<T>(&id)? {
                Some(record) => records.push(record),
                None => debug!(entity = T::KIND, id, "skipping dangling index pointer"),
            }
        }
        Ok(records)
    }

    /// `list_by_index` with a tenant-isolation guard: a record whose stored
    /// tenant differs from the requested one is never returned.
    pub fn list_scoped<T: Entity>(
        &self,
        prefix: &[u8],
        tenant_id: &str,
    ) -> Result<Vec<T>, AcadError> {
        let mut records = self.list_by_index::<T>(prefix)?;
        records.retain(|record| match record.tenant_id() {
            Some(owner) if owner == tenant_id => true,
            owner => {
                warn!(
                    entity = T::KIND,
                    id = record.id(),
                    ?owner,
                    requested = tenant_id,
                    "index entry crossed tenant scope, dropping from result"
                );
                false
            }
        });
        Ok(records)
    }

    /// Full primary scan for one entity kind, migrate-on-read applied.
    /// Unbounded; callers paginate large tenants themselves.
    pub fn list_all<T: Entity>(&self) -> Result<Vec<T>, AcadError> {
        let (start, end) = prefix_range(&primary_prefix(T::KIND));
        let mut records = Vec::new();
        for (_, bytes) in self.kv.scan(&start, &end)? {
            let stored: T = decode(&bytes)?;
            let mut record = stored.clone();
            if record.migrate() {
                debug!(entity = T::KIND, id = record.id(), "normalized pre-migration record");
                self.rewrite(&stored, &record)?;
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Rewrites the primary and reconciles index entries: keys the new shape
    /// no longer produces are removed, new ones written. Primary goes first,
    /// matching the create ordering.
    fn rewrite<T: Entity>(&self, stored: &T, record: &T) -> Result<(), AcadError> {
        self.kv
            .put(&primary_key(T::KIND, record.id()), &encode(record)?)?;
        let old_keys = stored.index_keys();
        let new_keys = record.index_keys();
        for key in &new_keys {
            if !old_keys.contains(key) {
                self.kv.put(key, record.id().as_bytes())?;
            }
        }
        for key in &old_keys {
            if !new_keys.contains(key) {
                self.kv.remove(key)?;
            }
        }
        Ok(())
    }
}

pub fn encode<T: serde::Serialize>(record: &T) -> Result<Vec<u8>, AcadError> {
    serde_json::to_vec(record).map_err(|e| AcadError::Encode(e.to_string()))
}

pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, AcadError> {
    serde_json::from_slice(bytes).map_err(|e| AcadError::Decode(e.to_string()))
}

/// Bundle handing out every per-entity repository over one store handle.
#[derive(Clone, Copy)]
pub struct Repos<'a> {
    kv: &'a dyn Kv,
}

impl<'a> Repos<'a> {
    pub fn new(kv: &'a dyn Kv) -> Self {
        Self { kv }
    }

    pub fn raw(&self) -> Repo<'a> {
        Repo::new(self.kv)
    }

    pub fn tenants(&self) -> tenant::TenantRepo<'a> {
        tenant::TenantRepo::new(self.kv)
    }

    pub fn users(&self) -> tenant::UserRepo<'a> {
        tenant::UserRepo::new(self.kv)
    }

    pub fn memberships(&self) -> tenant::MembershipRepo<'a> {
        tenant::MembershipRepo::new(self.kv)
    }

    pub fn courses(&self) -> course::CourseRepo<'a> {
        course::CourseRepo::new(self.kv)
    }

    pub fn programs(&self) -> program::ProgramRepo<'a> {
        program::ProgramRepo::new(self.kv)
    }

    pub fn enrollments(&self) -> enrollment::EnrollmentRepo<'a> {
        enrollment::EnrollmentRepo::new(self.kv)
    }

    pub fn attendance(&self) -> attendance::AttendanceRepo<'a> {
        attendance::AttendanceRepo::new(self.kv)
    }

    pub fn assessments(&self) -> assessment::AssessmentRepo<'a> {
        assessment::AssessmentRepo::new(self.kv)
    }

    pub fn medals(&self) -> assessment::MedalRepo<'a> {
        assessment::MedalRepo::new(self.kv)
    }
}
