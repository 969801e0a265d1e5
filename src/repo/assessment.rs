use super::Repo;
use crate::error::AcadError;
use crate::model::{AssessmentSession, Entity, Medal, Program, SkillScore, StudentMedal};
use crate::storage::engine::Kv;
use crate::storage::keyspace::{index_prefix, new_id};
use chrono::Utc;

#[derive(Debug, Clone)]
pub struct NewAssessment {
    pub program_id: String,
    pub player_id: String,
    pub skills: Vec<SkillScore>,
    pub notes: String,
}

pub struct AssessmentRepo<'a> {
    repo: Repo<'a>,
}

impl<'a> AssessmentRepo<'a> {
    pub fn new(kv: &'a dyn Kv) -> Self {
        Self {
            repo: Repo::new(kv),
        }
    }

    pub fn create(
        &self,
        tenant_id: &str,
        input: NewAssessment,
    ) -> Result<AssessmentSession, AcadError> {
        let program_owned = self
            .repo
            .find::<Program>(&input.program_id)?
            .filter(|p| p.tenant_id == tenant_id)
            .is_some();
        if !program_owned {
            return Err(AcadError::Validation(format!(
                "program {} does not belong to academy {tenant_id}",
                input.program_id
            )));
        }
        let now = Utc::now();
        let session = AssessmentSession {
            id: new_id(),
            tenant_id: tenant_id.to_string(),
            program_id: input.program_id,
            player_id: input.player_id,
            skills: input.skills,
            notes: input.notes,
            locked: false,
            created_at: now,
            updated_at: now,
        };
        self.repo.create(&session)?;
        Ok(session)
    }

    pub fn find(&self, tenant_id: &str, id: &str) -> Result<Option<AssessmentSession>, AcadError> {
        Ok(self
            .repo
            .find::<AssessmentSession>(id)?
            .filter(|s| s.tenant_id == tenant_id))
    }

    pub fn list_for_player(
        &self,
        tenant_id: &str,
        player_id: &str,
    ) -> Result<Vec<AssessmentSession>, AcadError> {
        let mut sessions = self.repo.list_scoped::<AssessmentSession>(
            &index_prefix(AssessmentSession::KIND, &["player"], &[tenant_id, player_id]),
            tenant_id,
        )?;
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    pub fn list_for_program_player(
        &self,
        tenant_id: &str,
        program_id: &str,
        player_id: &str,
    ) -> Result<Vec<AssessmentSession>, AcadError> {
        let mut sessions = self.repo.list_scoped::<AssessmentSession>(
            &index_prefix(
                AssessmentSession::KIND,
                &["program", "player"],
                &[tenant_id, program_id, player_id],
            ),
            tenant_id,
        )?;
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    /// General update path: rejected once the session is locked.
    pub fn update_skills(
        &self,
        tenant_id: &str,
        id: &str,
        skills: Vec<SkillScore>,
    ) -> Result<Option<AssessmentSession>, AcadError> {
        let Some(session) = self.find(tenant_id, id)? else {
            return Ok(None);
        };
        if session.locked {
            return Err(AcadError::Validation(format!(
                "assessment session {id} is locked"
            )));
        }
        self.repo.update::<AssessmentSession>(id, |s| {
            s.skills = skills;
            s.updated_at = Utc::now();
        })
    }

    /// The dedicated notes-only path stays open on a locked session.
    pub fn update_notes(
        &self,
        tenant_id: &str,
        id: &str,
        notes: String,
    ) -> Result<Option<AssessmentSession>, AcadError> {
        if self.find(tenant_id, id)?.is_none() {
            return Ok(None);
        }
        self.repo.update::<AssessmentSession>(id, |s| {
            s.notes = notes;
            s.updated_at = Utc::now();
        })
    }

    pub fn lock(&self, tenant_id: &str, id: &str) -> Result<Option<AssessmentSession>, AcadError> {
        self.set_locked(tenant_id, id, true)
    }

    pub fn unlock(
        &self,
        tenant_id: &str,
        id: &str,
    ) -> Result<Option<AssessmentSession>, AcadError> {
        self.set_locked(tenant_id, id, false)
    }

    fn set_locked(
        &self,
        tenant_id: &str,
        id: &str,
        locked: bool,
    ) -> Result<Option<AssessmentSession>, AcadError> {
        if self.find(tenant_id, id)?.is_none() {
            return Ok(None);
        }
        self.repo.update::<AssessmentSession>(id, |s| {
            s.locked = locked;
            s.updated_at = Utc::now();
        })
    }

    pub fn delete(&self, tenant_id: &str, id: &str) -> Result<bool, AcadError> {
        if self.find(tenant_id, id)?.is_none() {
            return Ok(false);
        }
        self.repo.delete::<AssessmentSession>(id)
    }
}

pub struct MedalRepo<'a> {
    repo: Repo<'a>,
}

impl<'a> MedalRepo<'a> {
    pub fn new(kv: &'a dyn Kv) -> Self {
        Self {
            repo: Repo::new(kv),
        }
    }

    pub fn create(
        &self,
        tenant_id: &str,
        name: &str,
        description: &str,
    ) -> Result<Medal, AcadError> {
        let medal = Medal {
            id: new_id(),
            tenant_id: tenant_id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
        };
        self.repo.create(&medal)?;
        Ok(medal)
    }

    pub fn find(&self, tenant_id: &str, id: &str) -> Result<Option<Medal>, AcadError> {
        Ok(self
            .repo
            .find::<Medal>(id)?
            .filter(|m| m.tenant_id == tenant_id))
    }

    pub fn list(&self, tenant_id: &str) -> Result<Vec<Medal>, AcadError> {
        self.repo.list_scoped(
            &index_prefix(Medal::KIND, &["tenant"], &[tenant_id]),
            tenant_id,
        )
    }

    pub fn award(
        &self,
        tenant_id: &str,
        medal_id: &str,
        student_id: &str,
    ) -> Result<StudentMedal, AcadError> {
        if self.find(tenant_id, medal_id)?.is_none() {
            return Err(AcadError::Validation(format!(
                "medal {medal_id} does not belong to academy {tenant_id}"
            )));
        }
        let award = StudentMedal {
            id: new_id(),
            tenant_id: tenant_id.to_string(),
            medal_id: medal_id.to_string(),
            student_id: student_id.to_string(),
            awarded_at: Utc::now(),
        };
        self.repo.create(&award)?;
        Ok(award)
    }

    pub fn awards_for_student(
        &self,
        tenant_id: &str,
        student_id: &str,
    ) -> Result<Vec<StudentMedal>, AcadError> {
        self.repo.list_scoped(
            &index_prefix(StudentMedal::KIND, &["student"], &[tenant_id, student_id]),
            tenant_id,
        )
    }

    /// Deletes a medal and cascades over every award referencing it.
    pub fn delete(&self, tenant_id: &str, medal_id: &str) -> Result<bool, AcadError> {
        if self.find(tenant_id, medal_id)?.is_none() {
            return Ok(false);
        }
        let awards = self.repo.list_scoped::<StudentMedal>(
            &index_prefix(StudentMedal::KIND, &["medal"], &[tenant_id, medal_id]),
            tenant_id,
        )?;
        for award in awards {
            self.repo.delete::<StudentMedal>(&award.id)?;
        }
        self.repo.delete::<Medal>(medal_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::engine::MemoryStore;

    fn seed_program(store: &MemoryStore, tenant_id: &str) -> Program {
        let now = Utc::now();
        let program = Program {
            id: new_id(),
            tenant_id: tenant_id.into(),
            name: "Pathway".into(),
            description: String::new(),
            created_at: now,
            updated_at: now,
        };
        Repo::new(store).create(&program).unwrap();
        program
    }

    fn skill(name: &str, score: u8) -> SkillScore {
        SkillScore {
            skill: name.into(),
            score,
        }
    }

    #[test]
    fn locked_session_rejects_skill_updates_but_keeps_notes_path() {
        let store = MemoryStore::new();
        let program = seed_program(&store, "t1");
        let assessments = AssessmentRepo::new(&store);
        let session = assessments
            .create(
                "t1",
                NewAssessment {
                    program_id: program.id.clone(),
                    player_id: "kid1".into(),
                    skills: vec![skill("footwork", 3)],
                    notes: String::new(),
                },
            )
            .unwrap();

        assessments.lock("t1", &session.id).unwrap();

        let err = assessments
            .update_skills("t1", &session.id, vec![skill("footwork", 5)])
            .unwrap_err();
        assert_eq!(err.code_str(), "validation");

        let noted = assessments
            .update_notes("t1", &session.id, "good focus".into())
            .unwrap()
            .unwrap();
        assert_eq!(noted.notes, "good focus");
        assert_eq!(noted.skills[0].score, 3);
    }

    #[test]
    fn unlock_reopens_the_general_update_path() {
        let store = MemoryStore::new();
        let program = seed_program(&store, "t1");
        let assessments = AssessmentRepo::new(&store);
        let session = assessments
            .create(
                "t1",
                NewAssessment {
                    program_id: program.id.clone(),
                    player_id: "kid1".into(),
                    skills: vec![],
                    notes: String::new(),
                },
            )
            .unwrap();

        assessments.lock("t1", &session.id).unwrap();
        assessments.unlock("t1", &session.id).unwrap();
        let updated = assessments
            .update_skills("t1", &session.id, vec![skill("serve", 4)])
            .unwrap()
            .unwrap();
        assert_eq!(updated.skills.len(), 1);
    }

    #[test]
    fn sessions_accumulate_per_player() {
        let store = MemoryStore::new();
        let program = seed_program(&store, "t1");
        let assessments = AssessmentRepo::new(&store);
        for _ in 0..3 {
            assessments
                .create(
                    "t1",
                    NewAssessment {
                        program_id: program.id.clone(),
                        player_id: "kid1".into(),
                        skills: vec![],
                        notes: String::new(),
                    },
                )
                .unwrap();
        }

        assert_eq!(assessments.list_for_player("t1", "kid1").unwrap().len(), 3);
        assert_eq!(
            assessments
                .list_for_program_player("t1", &program.id, "kid1")
                .unwrap()
                .len(),
            3
        );
    }

    #[test]
    fn medal_delete_cascades_awards() {
        let store = MemoryStore::new();
        let medals = MedalRepo::new(&store);
        let medal = medals.create("t1", "Gold Pawn", "first win").unwrap();
        medals.award("t1", &medal.id, "kid1").unwrap();
        medals.award("t1", &medal.id, "kid2").unwrap();

        assert!(medals.delete("t1", &medal.id).unwrap());
        assert!(medals.awards_for_student("t1", "kid1").unwrap().is_empty());
        assert!(medals.awards_for_student("t1", "kid2").unwrap().is_empty());
    }
}
