//! Destructive reset for development and staging environments.
//!
//! Wipes the data directory and reseeds the minimum state the application
//! needs to start: the bootstrap academy, one admin account, and the admin's
//! manager membership. Nothing here is reachable from normal request paths;
//! callers opt in explicitly.

use crate::config::StoreConfig;
use crate::error::AcadError;
use crate::model::{GlobalRole, Membership, Tenant, User};
use crate::repo::Repos;
use crate::storage::engine::{self, RedbStore};
use std::fs;
use std::sync::Arc;
use tracing::warn;

/// State seeded by a reset.
#[derive(Debug, Clone)]
pub struct SeededState {
    pub tenant: Tenant,
    pub admin: User,
    pub membership: Membership,
}

/// Closes the store, deletes the data directory, reopens, and seeds the
/// bootstrap state. All persisted data is gone afterwards. Outstanding store
/// handles must be dropped first or reopening fails on the engine lock.
pub fn reset_store(
    config: &StoreConfig,
    admin_name: &str,
) -> Result<(Arc<RedbStore>, SeededState), AcadError> {
    warn!(data_dir = %config.data_dir.display(), "destructive reset: wiping all data");
    engine::close();
    match fs::remove_dir_all(&config.data_dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    let store = engine::open(config)?;
    let seeded = seed(Repos::new(store.as_ref()), admin_name)?;
    Ok((store, seeded))
}

fn seed(repos: Repos<'_>, admin_name: &str) -> Result<SeededState, AcadError> {
    let tenant = repos.tenants().ensure_bootstrap()?;
    let admin = repos.users().create(admin_name, GlobalRole::Admin)?;
    let membership = repos.memberships().upsert(
        &tenant.id,
        &admin.id,
        GlobalRole::Admin.tenant_role(),
    )?;
    Ok(SeededState {
        tenant,
        admin,
        membership,
    })
}
