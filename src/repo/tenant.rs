use super::Repo;
use crate::error::AcadError;
use crate::model::{
    Entity, GlobalRole, Membership, Tenant, TenantRole, User, BOOTSTRAP_TENANT_ID,
};
use crate::storage::engine::Kv;
use crate::storage::keyspace::{index_prefix, new_id, prefix_range, primary_key};
use tracing::info;

pub struct TenantRepo<'a> {
    repo: Repo<'a>,
}

impl<'a> TenantRepo<'a> {
    pub fn new(kv: &'a dyn Kv) -> Self {
        Self {
            repo: Repo::new(kv),
        }
    }

    pub fn create(&self, name: &str) -> Result<Tenant, AcadError> {
        let tenant = Tenant {
            id: new_id(),
            name: name.to_string(),
            active: true,
        };
        self.repo.create(&tenant)?;
        Ok(tenant)
    }

    pub fn find(&self, id: &str) -> Result<Option<Tenant>, AcadError> {
        self.repo.find(id)
    }

    pub fn list(&self) -> Result<Vec<Tenant>, AcadError> {
        self.repo.list_all()
    }

    /// First active tenant in key order, if any.
    pub fn first_active(&self) -> Result<Option<Tenant>, AcadError> {
        Ok(self.repo.list_all::<Tenant>()?.into_iter().find(|t| t.active))
    }

    pub fn update(
        &self,
        id: &str,
        patch: impl FnOnce(&mut Tenant),
    ) -> Result<Option<Tenant>, AcadError> {
        self.repo.update(id, patch)
    }

    pub fn delete(&self, id: &str) -> Result<bool, AcadError> {
        if id == BOOTSTRAP_TENANT_ID {
            return Err(AcadError::Validation(
                "the bootstrap academy cannot be deleted".into(),
            ));
        }
        self.repo.delete::<Tenant>(id)
    }

    /// Guarantees the bootstrap tenant exists; never overwrites one that
    /// does.
    pub fn ensure_bootstrap(&self) -> Result<Tenant, AcadError> {
        if let Some(existing) = self.repo.find::<Tenant>(BOOTSTRAP_TENANT_ID)? {
            return Ok(existing);
        }
        let tenant = Tenant {
            id: BOOTSTRAP_TENANT_ID.to_string(),
            name: "Main Academy".to_string(),
            active: true,
        };
        self.repo.create(&tenant)?;
        info!(tenant_id = BOOTSTRAP_TENANT_ID, "seeded bootstrap academy");
        Ok(tenant)
    }
}

pub struct UserRepo<'a> {
    repo: Repo<'a>,
}

impl<'a> UserRepo<'a> {
    pub fn new(kv: &'a dyn Kv) -> Self {
        Self {
            repo: Repo::new(kv),
        }
    }

    pub fn create(&self, name: &str, global_role: GlobalRole) -> Result<User, AcadError> {
        let user = User {
            id: new_id(),
            name: name.to_string(),
            global_role,
        };
        self.repo.create(&user)?;
        Ok(user)
    }

    pub fn find(&self, id: &str) -> Result<Option<User>, AcadError> {
        self.repo.find(id)
    }

    pub fn update(
        &self,
        id: &str,
        patch: impl FnOnce(&mut User),
    ) -> Result<Option<User>, AcadError> {
        self.repo.update(id, patch)
    }

    pub fn delete(&self, id: &str) -> Result<bool, AcadError> {
        self.repo.delete::<User>(id)
    }
}

pub struct MembershipRepo<'a> {
    repo: Repo<'a>,
}

impl<'a> MembershipRepo<'a> {
    pub fn new(kv: &'a dyn Kv) -> Self {
        Self {
            repo: Repo::new(kv),
        }
    }

    /// Creates or replaces the membership row for (tenant, user). The id is
    /// the composite `{tenant}:{user}`, so the row is naturally unique.
    pub fn upsert(
        &self,
        tenant_id: &str,
        user_id: &str,
        role: TenantRole,
    ) -> Result<Membership, AcadError> {
        let membership = Membership {
            id: Membership::composite_id(tenant_id, user_id),
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
            role,
        };
        self.repo.create(&membership)?;
        Ok(membership)
    }

    pub fn find(&self, tenant_id: &str, user_id: &str) -> Result<Option<Membership>, AcadError> {
        self.repo.find(&Membership::composite_id(tenant_id, user_id))
    }

    /// Every membership row for a user, across tenants, via the by-user
    /// index.
    pub fn memberships_of(&self, user_id: &str) -> Result<Vec<Membership>, AcadError> {
        self.repo
            .list_by_index(&index_prefix(Membership::KIND, &["user"], &[user_id]))
    }

    /// Members of one tenant, straight off the primary prefix: membership
    /// ids start with the tenant id, so `membership:{tenant}:` covers
    /// exactly this tenant's rows.
    pub fn list_for_tenant(&self, tenant_id: &str) -> Result<Vec<Membership>, AcadError> {
        let prefix = primary_key(Membership::KIND, &format!("{tenant_id}:"));
        let (start, end) = prefix_range(&prefix);
        let mut rows = Vec::new();
        for (_, bytes) in self.repo.kv().scan(&start, &end)? {
            rows.push(super::decode(&bytes)?);
        }
        Ok(rows)
    }

    pub fn remove(&self, tenant_id: &str, user_id: &str) -> Result<bool, AcadError> {
        self.repo
            .delete::<Membership>(&Membership::composite_id(tenant_id, user_id))
    }
}
