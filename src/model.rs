//! Stored record shapes for every academy entity.
//!
//! The store enforces no schema, so each type decodes with defaults: fields
//! added after the first deployment carry `#[serde(default)]` and the
//! `Entity::migrate` hook upgrades pre-migration shapes on first read.
//! Index keys are derived purely from a record's own fields, so deletion can
//! recompute every key a record participates in without a reverse index.

use crate::storage::keyspace::index_key;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// The bootstrap tenant that always exists.
pub const BOOTSTRAP_TENANT_ID: &str = "main";

/// Legacy courses predate the color field.
pub const DEFAULT_COURSE_COLOR: &str = "#4a90d9";

/// Recent coach notes kept on an enrollment; older entries are dropped. This
/// is a bounded activity log, not an audit trail.
pub const COACH_NOTE_CAP: usize = 50;

fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

pub trait Entity: Serialize + DeserializeOwned + Clone {
    const KIND: &'static str;

    fn id(&self) -> &str;

    /// Owning tenant, `None` for records that are not tenant-scoped.
    fn tenant_id(&self) -> Option<&str> {
        None
    }

    /// Every secondary index key this record participates in.
    fn index_keys(&self) -> Vec<Vec<u8>> {
        Vec::new()
    }

    /// Upgrades a pre-migration shape in place; returns true when the record
    /// changed and the normalized form must be persisted back.
    fn migrate(&mut self) -> bool {
        false
    }
}

/// Backfills an empty tenant id with the bootstrap tenant.
fn migrate_tenant(tenant_id: &mut String) -> bool {
    if tenant_id.is_empty() {
        *tenant_id = BOOTSTRAP_TENANT_ID.to_string();
        return true;
    }
    false
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalRole {
    Admin,
    Manager,
    Coach,
    Parent,
    Kid,
}

impl GlobalRole {
    /// Tenant-local role a legacy membership backfill derives from the
    /// user's global role.
    pub fn tenant_role(self) -> TenantRole {
        match self {
            GlobalRole::Admin | GlobalRole::Manager => TenantRole::Manager,
            GlobalRole::Coach => TenantRole::Coach,
            GlobalRole::Parent => TenantRole::Parent,
            GlobalRole::Kid => TenantRole::Kid,
        }
    }

    /// Manager-class users must never silently operate inside a tenant they
    /// do not manage.
    pub fn is_manager_class(self) -> bool {
        matches!(self, GlobalRole::Manager)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantRole {
    Manager,
    Coach,
    #[default]
    Parent,
    Kid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl Entity for Tenant {
    const KIND: &'static str = "tenant";

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub global_role: GlobalRole,
}

impl Entity for User {
    const KIND: &'static str = "user";

    fn id(&self) -> &str {
        &self.id
    }
}

/// Tenant-local role grant for one user. The id is `{tenant}:{user}`, so a
/// primary prefix scan under one tenant lists its members directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: String,
    pub tenant_id: String,
    pub user_id: String,
    #[serde(default)]
    pub role: TenantRole,
}

impl Membership {
    pub fn composite_id(tenant_id: &str, user_id: &str) -> String {
        format!("{tenant_id}:{user_id}")
    }
}

impl Entity for Membership {
    const KIND: &'static str = "membership";

    fn id(&self) -> &str {
        &self.id
    }

    fn tenant_id(&self) -> Option<&str> {
        Some(&self.tenant_id)
    }

    fn index_keys(&self) -> Vec<Vec<u8>> {
        vec![index_key(
            Self::KIND,
            &["user"],
            &[&self.user_id],
            &self.id,
        )]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: String,
    #[serde(default = "unix_epoch")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "unix_epoch")]
    pub updated_at: DateTime<Utc>,
}

impl Entity for Course {
    const KIND: &'static str = "course";

    fn id(&self) -> &str {
        &self.id
    }

    fn tenant_id(&self) -> Option<&str> {
        Some(&self.tenant_id)
    }

    fn index_keys(&self) -> Vec<Vec<u8>> {
        vec![index_key(
            Self::KIND,
            &["tenant"],
            &[&self.tenant_id],
            &self.id,
        )]
    }

    fn migrate(&mut self) -> bool {
        let mut changed = migrate_tenant(&mut self.tenant_id);
        if self.color.is_empty() {
            self.color = DEFAULT_COURSE_COLOR.to_string();
            changed = true;
        }
        changed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Waived,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseEnrollment {
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    pub course_id: String,
    pub user_id: String,
    #[serde(default)]
    pub payment: PaymentStatus,
    #[serde(default = "unix_epoch")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "unix_epoch")]
    pub updated_at: DateTime<Utc>,
}

impl Entity for CourseEnrollment {
    const KIND: &'static str = "course_enrollment";

    fn id(&self) -> &str {
        &self.id
    }

    fn tenant_id(&self) -> Option<&str> {
        Some(&self.tenant_id)
    }

    fn index_keys(&self) -> Vec<Vec<u8>> {
        vec![
            index_key(
                Self::KIND,
                &["course"],
                &[&self.tenant_id, &self.course_id],
                &self.id,
            ),
            index_key(
                Self::KIND,
                &["user"],
                &[&self.tenant_id, &self.user_id],
                &self.id,
            ),
        ]
    }

    fn migrate(&mut self) -> bool {
        migrate_tenant(&mut self.tenant_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "unix_epoch")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "unix_epoch")]
    pub updated_at: DateTime<Utc>,
}

impl Entity for Program {
    const KIND: &'static str = "program";

    fn id(&self) -> &str {
        &self.id
    }

    fn tenant_id(&self) -> Option<&str> {
        Some(&self.tenant_id)
    }

    fn index_keys(&self) -> Vec<Vec<u8>> {
        vec![index_key(
            Self::KIND,
            &["tenant"],
            &[&self.tenant_id],
            &self.id,
        )]
    }

    fn migrate(&mut self) -> bool {
        migrate_tenant(&mut self.tenant_id)
    }
}

/// One rung of a program ladder. `order` is dense `1..N` within the program;
/// deletes and moves re-pack the remaining siblings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramLevel {
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    pub program_id: String,
    pub name: String,
    pub order: u32,
}

impl Entity for ProgramLevel {
    const KIND: &'static str = "program_level";

    fn id(&self) -> &str {
        &self.id
    }

    fn tenant_id(&self) -> Option<&str> {
        Some(&self.tenant_id)
    }

    fn index_keys(&self) -> Vec<Vec<u8>> {
        vec![index_key(
            Self::KIND,
            &["program"],
            &[&self.tenant_id, &self.program_id],
            &self.id,
        )]
    }

    fn migrate(&mut self) -> bool {
        migrate_tenant(&mut self.tenant_id)
    }
}

/// One point-affecting event in the progression ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoachNote {
    pub id: String,
    pub coach_id: String,
    pub text: String,
    #[serde(default)]
    pub points_delta: i64,
    #[serde(default = "unix_epoch")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramEnrollment {
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    pub program_id: String,
    pub user_id: String,
    /// Running total over every note delta ever applied, maintained
    /// incrementally; dropping a capped note never reduces it.
    #[serde(default)]
    pub points_total: i64,
    #[serde(default)]
    pub coach_notes: Vec<CoachNote>,
    #[serde(default = "unix_epoch")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "unix_epoch")]
    pub updated_at: DateTime<Utc>,
}

impl Entity for ProgramEnrollment {
    const KIND: &'static str = "program_enrollment";

    fn id(&self) -> &str {
        &self.id
    }

    fn tenant_id(&self) -> Option<&str> {
        Some(&self.tenant_id)
    }

    fn index_keys(&self) -> Vec<Vec<u8>> {
        vec![
            index_key(
                Self::KIND,
                &["program"],
                &[&self.tenant_id, &self.program_id],
                &self.id,
            ),
            index_key(
                Self::KIND,
                &["user"],
                &[&self.tenant_id, &self.user_id],
                &self.id,
            ),
            index_key(
                Self::KIND,
                &["program", "user"],
                &[&self.tenant_id, &self.program_id, &self.user_id],
                &self.id,
            ),
        ]
    }

    fn migrate(&mut self) -> bool {
        migrate_tenant(&mut self.tenant_id)
    }
}

/// One row per (tenant, program, date, user); the date is date-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramAttendanceRecord {
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    pub program_id: String,
    pub user_id: String,
    pub date: String,
    pub present: bool,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default = "unix_epoch")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "unix_epoch")]
    pub updated_at: DateTime<Utc>,
}

impl Entity for ProgramAttendanceRecord {
    const KIND: &'static str = "program_attendance";

    fn id(&self) -> &str {
        &self.id
    }

    fn tenant_id(&self) -> Option<&str> {
        Some(&self.tenant_id)
    }

    fn index_keys(&self) -> Vec<Vec<u8>> {
        vec![
            index_key(
                Self::KIND,
                &["program"],
                &[&self.tenant_id, &self.program_id],
                &self.id,
            ),
            index_key(
                Self::KIND,
                &["program", "user"],
                &[&self.tenant_id, &self.program_id, &self.user_id],
                &self.id,
            ),
            index_key(
                Self::KIND,
                &["program", "date", "user"],
                &[&self.tenant_id, &self.program_id, &self.date, &self.user_id],
                &self.id,
            ),
        ]
    }

    fn migrate(&mut self) -> bool {
        migrate_tenant(&mut self.tenant_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillScore {
    pub skill: String,
    pub score: u8,
}

/// Snapshot of one assessment sitting. Immutable once locked, except via an
/// explicit unlock or the notes-only update path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentSession {
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    pub program_id: String,
    pub player_id: String,
    #[serde(default)]
    pub skills: Vec<SkillScore>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default = "unix_epoch")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "unix_epoch")]
    pub updated_at: DateTime<Utc>,
}

impl Entity for AssessmentSession {
    const KIND: &'static str = "assessment_session";

    fn id(&self) -> &str {
        &self.id
    }

    fn tenant_id(&self) -> Option<&str> {
        Some(&self.tenant_id)
    }

    fn index_keys(&self) -> Vec<Vec<u8>> {
        vec![
            index_key(
                Self::KIND,
                &["program", "player"],
                &[&self.tenant_id, &self.program_id, &self.player_id],
                &self.id,
            ),
            index_key(
                Self::KIND,
                &["player"],
                &[&self.tenant_id, &self.player_id],
                &self.id,
            ),
        ]
    }

    fn migrate(&mut self) -> bool {
        migrate_tenant(&mut self.tenant_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medal {
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Entity for Medal {
    const KIND: &'static str = "medal";

    fn id(&self) -> &str {
        &self.id
    }

    fn tenant_id(&self) -> Option<&str> {
        Some(&self.tenant_id)
    }

    fn index_keys(&self) -> Vec<Vec<u8>> {
        vec![index_key(
            Self::KIND,
            &["tenant"],
            &[&self.tenant_id],
            &self.id,
        )]
    }

    fn migrate(&mut self) -> bool {
        migrate_tenant(&mut self.tenant_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentMedal {
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    pub medal_id: String,
    pub student_id: String,
    #[serde(default = "unix_epoch")]
    pub awarded_at: DateTime<Utc>,
}

impl Entity for StudentMedal {
    const KIND: &'static str = "student_medal";

    fn id(&self) -> &str {
        &self.id
    }

    fn tenant_id(&self) -> Option<&str> {
        Some(&self.tenant_id)
    }

    fn index_keys(&self) -> Vec<Vec<u8>> {
        vec![
            index_key(
                Self::KIND,
                &["student"],
                &[&self.tenant_id, &self.student_id],
                &self.id,
            ),
            index_key(
                Self::KIND,
                &["medal"],
                &[&self.tenant_id, &self.medal_id],
                &self.id,
            ),
        ]
    }

    fn migrate(&mut self) -> bool {
        migrate_tenant(&mut self.tenant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_course_shape_decodes_and_migrates() {
        // Pre-migration course: no tenant, no color, no timestamps.
        let mut course: Course =
            serde_json::from_str(r#"{"id":"c1","name":"Chess Basics"}"#).unwrap();
        assert!(course.migrate());
        assert_eq!(course.tenant_id, BOOTSTRAP_TENANT_ID);
        assert_eq!(course.color, DEFAULT_COURSE_COLOR);
        // A second pass is a no-op.
        assert!(!course.migrate());
    }

    #[test]
    fn index_keys_are_derived_from_record_fields_only() {
        let record = ProgramAttendanceRecord {
            id: "a1".into(),
            tenant_id: "t1".into(),
            program_id: "p1".into(),
            user_id: "u1".into(),
            date: "2024-05-01".into(),
            present: true,
            note: None,
            created_at: unix_epoch(),
            updated_at: unix_epoch(),
        };
        let keys = record.index_keys();
        assert!(keys.contains(
            &b"program_attendance_by_program_date_user:t1:p1:2024-05-01:u1:a1".to_vec()
        ));
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn backfilled_tenant_role_follows_global_role() {
        assert_eq!(GlobalRole::Admin.tenant_role(), TenantRole::Manager);
        assert_eq!(GlobalRole::Coach.tenant_role(), TenantRole::Coach);
        assert_eq!(GlobalRole::Kid.tenant_role(), TenantRole::Kid);
        assert!(GlobalRole::Manager.is_manager_class());
        assert!(!GlobalRole::Admin.is_manager_class());
    }
}
