use super::Repo;
use crate::error::AcadError;
use crate::model::{
    AssessmentSession, Entity, Program, ProgramAttendanceRecord, ProgramEnrollment, ProgramLevel,
};
use crate::storage::engine::Kv;
use crate::storage::keyspace::{index_prefix, new_id};
use chrono::Utc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct NewProgram {
    pub tenant_id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProgramPatch {
    pub name: Option<String>,
    pub description: Option<String>,
}

pub struct ProgramRepo<'a> {
    repo: Repo<'a>,
}

impl<'a> ProgramRepo<'a> {
    pub fn new(kv: &'a dyn Kv) -> Self {
        Self {
            repo: Repo::new(kv),
        }
    }

    pub fn create(&self, input: NewProgram) -> Result<Program, AcadError> {
        let now = Utc::now();
        let program = Program {
            id: new_id(),
            tenant_id: input.tenant_id,
            name: input.name,
            description: input.description,
            created_at: now,
            updated_at: now,
        };
        self.repo.create(&program)?;
        Ok(program)
    }

    pub fn find(&self, tenant_id: &str, id: &str) -> Result<Option<Program>, AcadError> {
        Ok(self
            .repo
            .find::<Program>(id)?
            .filter(|p| p.tenant_id == tenant_id))
    }

    pub fn list(&self, tenant_id: &str) -> Result<Vec<Program>, AcadError> {
        self.repo.list_scoped(
            &index_prefix(Program::KIND, &["tenant"], &[tenant_id]),
            tenant_id,
        )
    }

    pub fn update(
        &self,
        tenant_id: &str,
        id: &str,
        patch: ProgramPatch,
    ) -> Result<Option<Program>, AcadError> {
        if self.find(tenant_id, id)?.is_none() {
            return Ok(None);
        }
        self.repo.update::<Program>(id, |program| {
            if let Some(name) = patch.name {
                program.name = name;
            }
            if let Some(description) = patch.description {
                program.description = description;
            }
            program.updated_at = Utc::now();
        })
    }

    /// Deletes a program and everything scoped to it, dependents first and
    /// the program primary last. Every step is independently idempotent, so
    /// the cascade can re-run after a partial failure without issue.
    pub fn delete(&self, tenant_id: &str, id: &str) -> Result<bool, AcadError> {
        if self.find(tenant_id, id)?.is_none() {
            return Ok(false);
        }
        for level in self.levels(tenant_id, id)? {
            self.repo.delete::<ProgramLevel>(&level.id)?;
        }
        let attendance = self.repo.list_scoped::<ProgramAttendanceRecord>(
            &index_prefix(ProgramAttendanceRecord::KIND, &["program"], &[tenant_id, id]),
            tenant_id,
        )?;
        for record in attendance {
            self.repo.delete::<ProgramAttendanceRecord>(&record.id)?;
        }
        let sessions = self.repo.list_scoped::<AssessmentSession>(
            &index_prefix(
                AssessmentSession::KIND,
                &["program", "player"],
                &[tenant_id, id],
            ),
            tenant_id,
        )?;
        for session in sessions {
            self.repo.delete::<AssessmentSession>(&session.id)?;
        }
        let enrollments = self.repo.list_scoped::<ProgramEnrollment>(
            &index_prefix(ProgramEnrollment::KIND, &["program"], &[tenant_id, id]),
            tenant_id,
        )?;
        for enrollment in enrollments {
            self.repo.delete::<ProgramEnrollment>(&enrollment.id)?;
        }
        debug!(program_id = id, "program cascade complete");
        self.repo.delete::<Program>(id)
    }

    /// Removes one player from a program: enrollment, attendance rows, and
    /// assessment sessions scoped to (tenant, program, user). Same pattern
    /// as the program cascade, narrowed to the player.
    pub fn remove_player(
        &self,
        tenant_id: &str,
        program_id: &str,
        user_id: &str,
    ) -> Result<(), AcadError> {
        let enrollments = self.repo.list_scoped::<ProgramEnrollment>(
            &index_prefix(
                ProgramEnrollment::KIND,
                &["program", "user"],
                &[tenant_id, program_id, user_id],
            ),
            tenant_id,
        )?;
        for enrollment in enrollments {
            self.repo.delete::<ProgramEnrollment>(&enrollment.id)?;
        }
        let attendance = self.repo.list_scoped::<ProgramAttendanceRecord>(
            &index_prefix(
                ProgramAttendanceRecord::KIND,
                &["program", "user"],
                &[tenant_id, program_id, user_id],
            ),
            tenant_id,
        )?;
        for record in attendance {
            self.repo.delete::<ProgramAttendanceRecord>(&record.id)?;
        }
        let sessions = self.repo.list_scoped::<AssessmentSession>(
            &index_prefix(
                AssessmentSession::KIND,
                &["program", "player"],
                &[tenant_id, program_id, user_id],
            ),
            tenant_id,
        )?;
        for session in sessions {
            self.repo.delete::<AssessmentSession>(&session.id)?;
        }
        Ok(())
    }

    /// Appends a level at the bottom of the ladder (order N+1).
    pub fn add_level(
        &self,
        tenant_id: &str,
        program_id: &str,
        name: &str,
    ) -> Result<ProgramLevel, AcadError> {
        if self.find(tenant_id, program_id)?.is_none() {
            return Err(AcadError::Validation(format!(
                "program {program_id} does not belong to academy {tenant_id}"
            )));
        }
        let next_order = self.levels(tenant_id, program_id)?.len() as u32 + 1;
        let level = ProgramLevel {
            id: new_id(),
            tenant_id: tenant_id.to_string(),
            program_id: program_id.to_string(),
            name: name.to_string(),
            order: next_order,
        };
        self.repo.create(&level)?;
        Ok(level)
    }

    /// Levels of a program sorted by their dense order.
    pub fn levels(&self, tenant_id: &str, program_id: &str) -> Result<Vec<ProgramLevel>, AcadError> {
        let mut levels = self.repo.list_scoped::<ProgramLevel>(
            &index_prefix(ProgramLevel::KIND, &["program"], &[tenant_id, program_id]),
            tenant_id,
        )?;
        levels.sort_by_key(|level| level.order);
        Ok(levels)
    }

    /// Deletes a level, then re-packs the remaining siblings to a dense
    /// `1..N`. The re-pack runs after the primary delete so the removed row
    /// is never part of it.
    pub fn delete_level(&self, tenant_id: &str, level_id: &str) -> Result<bool, AcadError> {
        let Some(level) = self
            .repo
            .find::<ProgramLevel>(level_id)?
            .filter(|l| l.tenant_id == tenant_id)
        else {
            return Ok(false);
        };
        self.repo.delete::<ProgramLevel>(level_id)?;
        self.repack_levels(tenant_id, &level.program_id)?;
        Ok(true)
    }

    /// Moves a level to a 1-based target position and re-packs the ladder.
    pub fn move_level(
        &self,
        tenant_id: &str,
        level_id: &str,
        target_order: u32,
    ) -> Result<Option<ProgramLevel>, AcadError> {
        let Some(level) = self
            .repo
            .find::<ProgramLevel>(level_id)?
            .filter(|l| l.tenant_id == tenant_id)
        else {
            return Ok(None);
        };
        let mut siblings = self.levels(tenant_id, &level.program_id)?;
        let position = siblings.iter().position(|l| l.id == level_id);
        let Some(position) = position else {
            return Ok(None);
        };
        let moved = siblings.remove(position);
        let target = (target_order.max(1) as usize - 1).min(siblings.len());
        siblings.insert(target, moved);
        for (index, sibling) in siblings.iter().enumerate() {
            let order = index as u32 + 1;
            if sibling.order != order {
                self.repo
                    .update::<ProgramLevel>(&sibling.id, |l| l.order = order)?;
            }
        }
        Ok(self.repo.find::<ProgramLevel>(level_id)?)
    }

    fn repack_levels(&self, tenant_id: &str, program_id: &str) -> Result<(), AcadError> {
        let mut levels = self.levels(tenant_id, program_id)?;
        levels.sort_by_key(|level| level.order);
        for (index, level) in levels.iter().enumerate() {
            let order = index as u32 + 1;
            if level.order != order {
                self.repo
                    .update::<ProgramLevel>(&level.id, |l| l.order = order)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::engine::MemoryStore;

    fn new_program(tenant: &str, name: &str) -> NewProgram {
        NewProgram {
            tenant_id: tenant.into(),
            name: name.into(),
            description: String::new(),
        }
    }

    #[test]
    fn levels_stay_densely_ordered_across_deletes() {
        let store = MemoryStore::new();
        let programs = ProgramRepo::new(&store);
        let program = programs.create(new_program("t1", "Pathway")).unwrap();

        let l1 = programs.add_level("t1", &program.id, "Rookie").unwrap();
        let l2 = programs.add_level("t1", &program.id, "Climber").unwrap();
        let l3 = programs.add_level("t1", &program.id, "Master").unwrap();
        assert_eq!((l1.order, l2.order, l3.order), (1, 2, 3));

        assert!(programs.delete_level("t1", &l1.id).unwrap());
        let orders: Vec<(String, u32)> = programs
            .levels("t1", &program.id)
            .unwrap()
            .into_iter()
            .map(|l| (l.name, l.order))
            .collect();
        assert_eq!(
            orders,
            vec![("Climber".to_string(), 1), ("Master".to_string(), 2)]
        );
    }

    #[test]
    fn move_level_repacks_the_ladder() {
        let store = MemoryStore::new();
        let programs = ProgramRepo::new(&store);
        let program = programs.create(new_program("t1", "Pathway")).unwrap();
        let l1 = programs.add_level("t1", &program.id, "A").unwrap();
        programs.add_level("t1", &program.id, "B").unwrap();
        programs.add_level("t1", &program.id, "C").unwrap();

        let moved = programs.move_level("t1", &l1.id, 3).unwrap().unwrap();
        assert_eq!(moved.order, 3);
        let names: Vec<String> = programs
            .levels("t1", &program.id)
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(names, vec!["B", "C", "A"]);
        let orders: Vec<u32> = programs
            .levels("t1", &program.id)
            .unwrap()
            .into_iter()
            .map(|l| l.order)
            .collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[test]
    fn move_level_clamps_out_of_range_targets() {
        let store = MemoryStore::new();
        let programs = ProgramRepo::new(&store);
        let program = programs.create(new_program("t1", "Pathway")).unwrap();
        programs.add_level("t1", &program.id, "A").unwrap();
        let l2 = programs.add_level("t1", &program.id, "B").unwrap();

        let moved = programs.move_level("t1", &l2.id, 99).unwrap().unwrap();
        assert_eq!(moved.order, 2);
        let moved = programs.move_level("t1", &l2.id, 0).unwrap().unwrap();
        assert_eq!(moved.order, 1);
    }

    #[test]
    fn cross_tenant_level_delete_is_invisible() {
        let store = MemoryStore::new();
        let programs = ProgramRepo::new(&store);
        let program = programs.create(new_program("t1", "Pathway")).unwrap();
        let level = programs.add_level("t1", &program.id, "Rookie").unwrap();

        assert!(!programs.delete_level("t2", &level.id).unwrap());
        assert_eq!(programs.levels("t1", &program.id).unwrap().len(), 1);
    }
}
