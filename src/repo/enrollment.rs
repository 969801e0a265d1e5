use super::Repo;
use crate::error::AcadError;
use crate::model::{CoachNote, Entity, Program, ProgramEnrollment, COACH_NOTE_CAP};
use crate::storage::engine::Kv;
use crate::storage::keyspace::{index_prefix, new_id};
use chrono::Utc;

#[derive(Debug, Clone)]
pub struct NewCoachNote {
    pub coach_id: String,
    pub text: String,
    pub points_delta: i64,
}

pub struct EnrollmentRepo<'a> {
    repo: Repo<'a>,
}

impl<'a> EnrollmentRepo<'a> {
    pub fn new(kv: &'a dyn Kv) -> Self {
        Self {
            repo: Repo::new(kv),
        }
    }

    /// Enrolls a player into a program, one row per (tenant, program, user).
    pub fn enroll(
        &self,
        tenant_id: &str,
        program_id: &str,
        user_id: &str,
    ) -> Result<ProgramEnrollment, AcadError> {
        let program_owned = self
            .repo
            .find::<Program>(program_id)?
            .filter(|p| p.tenant_id == tenant_id)
            .is_some();
        if !program_owned {
            return Err(AcadError::Validation(format!(
                "program {program_id} does not belong to academy {tenant_id}"
            )));
        }
        if let Some(existing) = self.find_for_player(tenant_id, program_id, user_id)? {
            return Ok(existing);
        }
        let now = Utc::now();
        let enrollment = ProgramEnrollment {
            id: new_id(),
            tenant_id: tenant_id.to_string(),
            program_id: program_id.to_string(),
            user_id: user_id.to_string(),
            points_total: 0,
            coach_notes: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.repo.create(&enrollment)?;
        Ok(enrollment)
    }

    pub fn find(&self, tenant_id: &str, id: &str) -> Result<Option<ProgramEnrollment>, AcadError> {
        Ok(self
            .repo
            .find::<ProgramEnrollment>(id)?
            .filter(|e| e.tenant_id == tenant_id))
    }

    pub fn find_for_player(
        &self,
        tenant_id: &str,
        program_id: &str,
        user_id: &str,
    ) -> Result<Option<ProgramEnrollment>, AcadError> {
        Ok(self
            .repo
            .list_scoped::<ProgramEnrollment>(
                &index_prefix(
                    ProgramEnrollment::KIND,
                    &["program", "user"],
                    &[tenant_id, program_id, user_id],
                ),
                tenant_id,
            )?
            .into_iter()
            .next())
    }

    pub fn list_for_program(
        &self,
        tenant_id: &str,
        program_id: &str,
    ) -> Result<Vec<ProgramEnrollment>, AcadError> {
        self.repo.list_scoped(
            &index_prefix(
                ProgramEnrollment::KIND,
                &["program"],
                &[tenant_id, program_id],
            ),
            tenant_id,
        )
    }

    pub fn list_for_user(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<Vec<ProgramEnrollment>, AcadError> {
        self.repo.list_scoped(
            &index_prefix(ProgramEnrollment::KIND, &["user"], &[tenant_id, user_id]),
            tenant_id,
        )
    }

    /// Appends a point-affecting note: the note is prepended to the capped
    /// recent-history list, the delta is added to the running total, and the
    /// whole enrollment is written back as one single-key operation. Entries
    /// the cap drops keep their already-applied contribution to the total.
    pub fn append_coach_note(
        &self,
        tenant_id: &str,
        enrollment_id: &str,
        note: NewCoachNote,
    ) -> Result<Option<ProgramEnrollment>, AcadError> {
        if self.find(tenant_id, enrollment_id)?.is_none() {
            return Ok(None);
        }
        self.repo.update::<ProgramEnrollment>(enrollment_id, |e| {
            e.coach_notes.insert(
                0,
                CoachNote {
                    id: new_id(),
                    coach_id: note.coach_id,
                    text: note.text,
                    points_delta: note.points_delta,
                    created_at: Utc::now(),
                },
            );
            e.coach_notes.truncate(COACH_NOTE_CAP);
            e.points_total += note.points_delta;
            e.updated_at = Utc::now();
        })
    }

    pub fn delete(&self, tenant_id: &str, id: &str) -> Result<bool, AcadError> {
        if self.find(tenant_id, id)?.is_none() {
            return Ok(false);
        }
        self.repo.delete::<ProgramEnrollment>(id)
    }
}
