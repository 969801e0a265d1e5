//! Academy (tenant) resolution.
//!
//! Resolution runs before any tenant-scoped repository call and scopes the
//! request to exactly one academy. It never authenticates: the caller hands
//! in an identity already verified upstream. The only terminal failure is
//! the `Forbidden` decision; everything else resolves to a selected tenant
//! that the caller persists back into the selection cookie.

use crate::error::AcadError;
use crate::model::{GlobalRole, TenantRole, BOOTSTRAP_TENANT_ID};
use crate::repo::Repos;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};

pub const COOKIE_NAME: &str = "acad_tenant";
const COOKIE_MAX_AGE_SECS: u32 = 30 * 24 * 60 * 60;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub id: String,
    pub global_role: GlobalRole,
}

/// Where a request stands before the fallback transitions run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionState {
    NoSelection,
    SelectedValid { tenant_id: String },
    SelectedInvalidOrInactive { tenant_id: String },
    SelectedButNotMember { tenant_id: String },
}

/// Terminal outcome of resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Selected { tenant_id: String },
    Forbidden { message: String },
}

/// Membership and tenant lookups the pure decision core runs against. One
/// implementation sits on the repositories; tests substitute their own.
pub trait Directory {
    fn tenant_is_active(&self, tenant_id: &str) -> Result<bool, AcadError>;
    fn membership_role(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<Option<TenantRole>, AcadError>;
    /// Tenant ids the user holds memberships in, paired with the role, in
    /// stable order.
    fn memberships_of(&self, user_id: &str) -> Result<Vec<(String, TenantRole)>, AcadError>;
    fn first_active_tenant(&self) -> Result<Option<String>, AcadError>;
}

impl Directory for Repos<'_> {
    fn tenant_is_active(&self, tenant_id: &str) -> Result<bool, AcadError> {
        Ok(self
            .tenants()
            .find(tenant_id)?
            .map(|t| t.active)
            .unwrap_or(false))
    }

    fn membership_role(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<Option<TenantRole>, AcadError> {
        Ok(self
            .memberships()
            .find(tenant_id, user_id)?
            .map(|m| m.role))
    }

    fn memberships_of(&self, user_id: &str) -> Result<Vec<(String, TenantRole)>, AcadError> {
        Ok(self
            .memberships()
            .memberships_of(user_id)?
            .into_iter()
            .map(|m| (m.tenant_id, m.role))
            .collect())
    }

    fn first_active_tenant(&self) -> Result<Option<String>, AcadError> {
        Ok(self.tenants().first_active()?.map(|t| t.id))
    }
}

/// Classifies the incoming selection against tenant state and membership.
pub fn classify(
    user: &UserIdentity,
    selection: Option<&str>,
    dir: &dyn Directory,
) -> Result<SelectionState, AcadError> {
    let Some(tenant_id) = selection else {
        return Ok(SelectionState::NoSelection);
    };
    let tenant_id = tenant_id.to_string();
    if !dir.tenant_is_active(&tenant_id)? {
        return Ok(SelectionState::SelectedInvalidOrInactive { tenant_id });
    }
    if user.global_role == GlobalRole::Admin {
        return Ok(SelectionState::SelectedValid { tenant_id });
    }
    match dir.membership_role(&tenant_id, &user.id)? {
        Some(role) => {
            // A manager-class user must never silently operate inside a
            // tenant they do not manage; force the fallback path.
            if user.global_role.is_manager_class() && role != TenantRole::Manager {
                Ok(SelectionState::SelectedInvalidOrInactive { tenant_id })
            } else {
                Ok(SelectionState::SelectedValid { tenant_id })
            }
        }
        None => Ok(SelectionState::SelectedButNotMember { tenant_id }),
    }
}

/// Default tenant for a user with no usable selection. Never creates a
/// tenant: the bootstrap id is used as a last resort whether or not the
/// record exists yet.
pub fn pick_default_tenant(
    user: &UserIdentity,
    dir: &dyn Directory,
) -> Result<String, AcadError> {
    if user.global_role == GlobalRole::Admin {
        return Ok(dir
            .first_active_tenant()?
            .unwrap_or_else(|| BOOTSTRAP_TENANT_ID.to_string()));
    }
    let memberships = dir.memberships_of(&user.id)?;
    if user.global_role.is_manager_class() {
        if let Some((tenant_id, _)) = memberships
            .iter()
            .find(|(_, role)| *role == TenantRole::Manager)
        {
            return Ok(tenant_id.clone());
        }
    }
    Ok(memberships
        .into_iter()
        .next()
        .map(|(tenant_id, _)| tenant_id)
        .unwrap_or_else(|| BOOTSTRAP_TENANT_ID.to_string()))
}

/// Runs tenant resolution against the repositories.
pub struct TenantContext<'a> {
    repos: Repos<'a>,
    signer: CookieSigner,
}

impl<'a> TenantContext<'a> {
    pub fn new(repos: Repos<'a>, signer: CookieSigner) -> Self {
        Self { repos, signer }
    }

    /// Resolves the active tenant for a request carrying an optional signed
    /// selection cookie. On success the caller persists the returned tenant
    /// id via [`TenantContext::selection_cookie`].
    pub fn resolve(
        &self,
        user: &UserIdentity,
        cookie_value: Option<&str>,
    ) -> Result<Resolution, AcadError> {
        let selection = cookie_value.and_then(|v| self.signer.verify(v));
        let state = classify(user, selection.as_deref(), &self.repos)?;
        match state {
            SelectionState::SelectedValid { tenant_id } => {
                Ok(Resolution::Selected { tenant_id })
            }
            SelectionState::NoSelection
            | SelectionState::SelectedInvalidOrInactive { .. } => {
                let tenant_id = pick_default_tenant(user, &self.repos)?;
                debug!(user_id = %user.id, tenant_id, "selected fallback tenant");
                Ok(Resolution::Selected { tenant_id })
            }
            SelectionState::SelectedButNotMember { tenant_id } => {
                // Legacy compatibility: accounts from before per-tenant
                // memberships get a row derived from their global role.
                warn!(
                    user_id = %user.id,
                    tenant_id,
                    "backfilling membership from global role"
                );
                self.repos.memberships().upsert(
                    &tenant_id,
                    &user.id,
                    user.global_role.tenant_role(),
                )?;
                match self.repos.membership_role(&tenant_id, &user.id)? {
                    Some(_) => Ok(Resolution::Selected { tenant_id }),
                    None => Ok(Resolution::Forbidden {
                        message: format!(
                            "user {} has no membership in academy {tenant_id}",
                            user.id
                        ),
                    }),
                }
            }
        }
    }

    /// `Set-Cookie` header value persisting a resolved selection.
    pub fn selection_cookie(&self, tenant_id: &str) -> Result<String, AcadError> {
        let value = self.signer.sign(tenant_id)?;
        Ok(format!(
            "{COOKIE_NAME}={value}; Path=/; Max-Age={COOKIE_MAX_AGE_SECS}; HttpOnly; SameSite=Lax"
        ))
    }
}

/// Signs and verifies the tenant-selection cookie value. The value is the
/// opaque tenant id plus an HMAC-SHA256 tag; a bad tag degrades to
/// no-selection rather than failing the request.
pub struct CookieSigner {
    key: Vec<u8>,
}

impl CookieSigner {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    pub fn sign(&self, tenant_id: &str) -> Result<String, AcadError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).map_err(|e| AcadError::InvalidConfig {
                message: format!("invalid cookie key: {e}"),
            })?;
        mac.update(tenant_id.as_bytes());
        Ok(format!(
            "{tenant_id}.{}",
            hex::encode(mac.finalize().into_bytes())
        ))
    }

    /// Recovers the tenant id when the tag checks out.
    pub fn verify(&self, value: &str) -> Option<String> {
        let (tenant_id, tag_hex) = value.rsplit_once('.')?;
        let tag = hex::decode(tag_hex).ok()?;
        let mut mac = HmacSha256::new_from_slice(&self.key).ok()?;
        mac.update(tenant_id.as_bytes());
        mac.verify_slice(&tag).ok()?;
        Some(tenant_id.to_string())
    }
}
