use super::Repo;
use crate::error::AcadError;
use crate::model::{Entity, ProgramAttendanceRecord};
use crate::storage::engine::Kv;
use crate::storage::keyspace::{index_prefix, new_id};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct AttendanceMark {
    pub program_id: String,
    pub user_id: String,
    pub date: String,
    pub present: bool,
    pub note: Option<String>,
}

/// Collapses any parseable date input to a date-only `YYYY-MM-DD` string.
/// Unparsable input falls back to today rather than being rejected; legacy
/// callers depend on that.
pub fn normalize_date(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.to_string();
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return ts.date_naive().to_string();
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%m/%d/%Y") {
        return date.to_string();
    }
    debug!(raw, "unparsable attendance date, falling back to today");
    Utc::now().date_naive().to_string()
}

pub struct AttendanceRepo<'a> {
    repo: Repo<'a>,
}

impl<'a> AttendanceRepo<'a> {
    pub fn new(kv: &'a dyn Kv) -> Self {
        Self {
            repo: Repo::new(kv),
        }
    }

    /// Upserts the row keyed by (tenant, program, normalized date, user).
    /// An update preserves `created_at` and advances `updated_at`.
    pub fn upsert(
        &self,
        tenant_id: &str,
        mark: AttendanceMark,
    ) -> Result<ProgramAttendanceRecord, AcadError> {
        let date = normalize_date(&mark.date);
        let existing = self
            .repo
            .list_scoped::<ProgramAttendanceRecord>(
                &index_prefix(
                    ProgramAttendanceRecord::KIND,
                    &["program", "date", "user"],
                    &[tenant_id, &mark.program_id, &date, &mark.user_id],
                ),
                tenant_id,
            )?
            .into_iter()
            .next();

        if let Some(record) = existing {
            let updated = self
                .repo
                .update::<ProgramAttendanceRecord>(&record.id, |r| {
                    r.present = mark.present;
                    r.note = mark.note;
                    r.updated_at = Utc::now();
                })?
                .unwrap_or(record);
            return Ok(updated);
        }

        let now = Utc::now();
        let record = ProgramAttendanceRecord {
            id: new_id(),
            tenant_id: tenant_id.to_string(),
            program_id: mark.program_id,
            user_id: mark.user_id,
            date,
            present: mark.present,
            note: mark.note,
            created_at: now,
            updated_at: now,
        };
        self.repo.create(&record)?;
        Ok(record)
    }

    /// Applies the upsert sequentially over the batch and returns the full
    /// resulting set.
    pub fn save_batch(
        &self,
        tenant_id: &str,
        marks: Vec<AttendanceMark>,
    ) -> Result<Vec<ProgramAttendanceRecord>, AcadError> {
        let mut records = Vec::with_capacity(marks.len());
        for mark in marks {
            records.push(self.upsert(tenant_id, mark)?);
        }
        Ok(records)
    }

    pub fn list_for_program(
        &self,
        tenant_id: &str,
        program_id: &str,
    ) -> Result<Vec<ProgramAttendanceRecord>, AcadError> {
        let mut records = self.repo.list_scoped::<ProgramAttendanceRecord>(
            &index_prefix(
                ProgramAttendanceRecord::KIND,
                &["program"],
                &[tenant_id, program_id],
            ),
            tenant_id,
        )?;
        // Key order is lexicographic; callers want chronological.
        records.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(records)
    }

    pub fn list_for_player(
        &self,
        tenant_id: &str,
        program_id: &str,
        user_id: &str,
    ) -> Result<Vec<ProgramAttendanceRecord>, AcadError> {
        let mut records = self.repo.list_scoped::<ProgramAttendanceRecord>(
            &index_prefix(
                ProgramAttendanceRecord::KIND,
                &["program", "user"],
                &[tenant_id, program_id, user_id],
            ),
            tenant_id,
        )?;
        records.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(records)
    }

    pub fn delete(&self, tenant_id: &str, id: &str) -> Result<bool, AcadError> {
        let owned = self
            .repo
            .find::<ProgramAttendanceRecord>(id)?
            .filter(|r| r.tenant_id == tenant_id)
            .is_some();
        if !owned {
            return Ok(false);
        }
        self.repo.delete::<ProgramAttendanceRecord>(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::engine::MemoryStore;

    fn mark(program: &str, user: &str, date: &str, present: bool) -> AttendanceMark {
        AttendanceMark {
            program_id: program.into(),
            user_id: user.into(),
            date: date.into(),
            present,
            note: None,
        }
    }

    #[test]
    fn date_normalization_collapses_to_date_only() {
        assert_eq!(normalize_date("2024-05-01"), "2024-05-01");
        assert_eq!(normalize_date("2024-05-01T18:30:00+02:00"), "2024-05-01");
        assert_eq!(normalize_date("05/01/2024"), "2024-05-01");
    }

    #[test]
    fn unparsable_date_falls_back_to_today() {
        let today = Utc::now().date_naive().to_string();
        assert_eq!(normalize_date("next tuesday"), today);
    }

    #[test]
    fn upsert_keeps_one_record_per_day_and_player() {
        let store = MemoryStore::new();
        let attendance = AttendanceRepo::new(&store);

        let first = attendance
            .upsert("t1", mark("p1", "u1", "2024-05-01", true))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = attendance
            .upsert("t1", mark("p1", "u1", "2024-05-01", false))
            .unwrap();

        assert_eq!(first.id, second.id);
        assert!(!second.present);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(attendance.list_for_program("t1", "p1").unwrap().len(), 1);
    }

    #[test]
    fn differently_formatted_inputs_hit_the_same_row() {
        let store = MemoryStore::new();
        let attendance = AttendanceRepo::new(&store);

        attendance
            .upsert("t1", mark("p1", "u1", "2024-05-01T09:00:00Z", true))
            .unwrap();
        attendance
            .upsert("t1", mark("p1", "u1", "2024-05-01", false))
            .unwrap();

        let records = attendance.list_for_program("t1", "p1").unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].present);
    }

    #[test]
    fn batch_save_returns_the_full_resulting_set() {
        let store = MemoryStore::new();
        let attendance = AttendanceRepo::new(&store);

        let records = attendance
            .save_batch(
                "t1",
                vec![
                    mark("p1", "u1", "2024-05-01", true),
                    mark("p1", "u2", "2024-05-01", false),
                    mark("p1", "u1", "2024-05-02", true),
                ],
            )
            .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(attendance.list_for_program("t1", "p1").unwrap().len(), 3);
        assert_eq!(
            attendance.list_for_player("t1", "p1", "u1").unwrap().len(),
            2
        );
    }
}
