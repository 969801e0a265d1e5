//! Lifecycle of the real engine-backed store: open, reopen, and the
//! destructive reset. The store handle is process-wide, so the whole
//! sequence runs as one test.

use acadb::model::{BOOTSTRAP_TENANT_ID, GlobalRole, TenantRole};
use acadb::repo::Repos;
use acadb::reset::reset_store;
use acadb::storage::engine;
use acadb::StoreConfig;

#[test]
fn open_persists_across_reopen_and_reset_wipes() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::profile(dir.path());

    let store = engine::open(&config).unwrap();
    let tenant_id = {
        let repos = Repos::new(store.as_ref());
        repos.tenants().ensure_bootstrap().unwrap();
        let extra = repos.tenants().create("Second Academy").unwrap();
        repos
            .users()
            .create("Dana", GlobalRole::Coach)
            .unwrap();
        extra.id
    };

    // A second open inside the same process reuses the handle.
    let again = engine::open(&config).unwrap();
    assert!(std::sync::Arc::ptr_eq(&store, &again));
    drop(again);
    drop(store);

    engine::close();
    let store = engine::open(&config).unwrap();
    {
        let repos = Repos::new(store.as_ref());
        assert!(repos.tenants().find(&tenant_id).unwrap().is_some());
        assert_eq!(repos.tenants().list().unwrap().len(), 2);
    }
    drop(store);

    let (store, seeded) = reset_store(&config, "root").unwrap();
    let repos = Repos::new(store.as_ref());
    assert_eq!(seeded.tenant.id, BOOTSTRAP_TENANT_ID);
    assert_eq!(seeded.membership.role, TenantRole::Manager);
    // Everything from before the reset is gone.
    assert!(repos.tenants().find(&tenant_id).unwrap().is_none());
    assert_eq!(repos.tenants().list().unwrap().len(), 1);
    assert_eq!(
        repos
            .users()
            .find(&seeded.admin.id)
            .unwrap()
            .unwrap()
            .global_role,
        GlobalRole::Admin
    );

    drop(store);
    engine::close();
}
