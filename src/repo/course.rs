use super::Repo;
use crate::error::AcadError;
use crate::model::{Course, CourseEnrollment, Entity, PaymentStatus, DEFAULT_COURSE_COLOR};
use crate::storage::engine::Kv;
use crate::storage::keyspace::{index_prefix, new_id};
use chrono::Utc;

#[derive(Debug, Clone)]
pub struct NewCourse {
    pub tenant_id: String,
    pub name: String,
    pub description: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CoursePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
}

pub struct CourseRepo<'a> {
    repo: Repo<'a>,
}

impl<'a> CourseRepo<'a> {
    pub fn new(kv: &'a dyn Kv) -> Self {
        Self {
            repo: Repo::new(kv),
        }
    }

    pub fn create(&self, input: NewCourse) -> Result<Course, AcadError> {
        let now = Utc::now();
        let course = Course {
            id: new_id(),
            tenant_id: input.tenant_id,
            name: input.name,
            description: input.description,
            color: input
                .color
                .unwrap_or_else(|| DEFAULT_COURSE_COLOR.to_string()),
            created_at: now,
            updated_at: now,
        };
        self.repo.create(&course)?;
        Ok(course)
    }

    pub fn find(&self, tenant_id: &str, id: &str) -> Result<Option<Course>, AcadError> {
        Ok(self
            .repo
            .find::<Course>(id)?
            .filter(|course| course.tenant_id == tenant_id))
    }

    pub fn list(&self, tenant_id: &str) -> Result<Vec<Course>, AcadError> {
        self.repo.list_scoped(
            &index_prefix(Course::KIND, &["tenant"], &[tenant_id]),
            tenant_id,
        )
    }

    pub fn update(
        &self,
        tenant_id: &str,
        id: &str,
        patch: CoursePatch,
    ) -> Result<Option<Course>, AcadError> {
        if self.find(tenant_id, id)?.is_none() {
            return Ok(None);
        }
        self.repo.update::<Course>(id, |course| {
            if let Some(name) = patch.name {
                course.name = name;
            }
            if let Some(description) = patch.description {
                course.description = description;
            }
            if let Some(color) = patch.color {
                course.color = color;
            }
            course.updated_at = Utc::now();
        })
    }

    /// Deletes the course and cascades over its enrollments; each step is
    /// idempotent so the cascade can re-run after a partial failure.
    pub fn delete(&self, tenant_id: &str, id: &str) -> Result<bool, AcadError> {
        if self.find(tenant_id, id)?.is_none() {
            return Ok(false);
        }
        for enrollment in self.enrollments_for_course(tenant_id, id)? {
            self.repo.delete::<CourseEnrollment>(&enrollment.id)?;
        }
        self.repo.delete::<Course>(id)
    }

    /// Enrolls a user; the course must belong to the caller's tenant.
    pub fn enroll(
        &self,
        tenant_id: &str,
        course_id: &str,
        user_id: &str,
    ) -> Result<CourseEnrollment, AcadError> {
        if self.find(tenant_id, course_id)?.is_none() {
            return Err(AcadError::Validation(format!(
                "course {course_id} does not belong to academy {tenant_id}"
            )));
        }
        if let Some(existing) = self.enrollment_of(tenant_id, course_id, user_id)? {
            return Ok(existing);
        }
        let now = Utc::now();
        let enrollment = CourseEnrollment {
            id: new_id(),
            tenant_id: tenant_id.to_string(),
            course_id: course_id.to_string(),
            user_id: user_id.to_string(),
            payment: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.repo.create(&enrollment)?;
        Ok(enrollment)
    }

    pub fn set_payment(
        &self,
        tenant_id: &str,
        enrollment_id: &str,
        payment: PaymentStatus,
    ) -> Result<Option<CourseEnrollment>, AcadError> {
        let owned = self
            .repo
            .find::<CourseEnrollment>(enrollment_id)?
            .filter(|e| e.tenant_id == tenant_id)
            .is_some();
        if !owned {
            return Ok(None);
        }
        self.repo.update::<CourseEnrollment>(enrollment_id, |e| {
            e.payment = payment;
            e.updated_at = Utc::now();
        })
    }

    pub fn enrollments_for_course(
        &self,
        tenant_id: &str,
        course_id: &str,
    ) -> Result<Vec<CourseEnrollment>, AcadError> {
        self.repo.list_scoped(
            &index_prefix(CourseEnrollment::KIND, &["course"], &[tenant_id, course_id]),
            tenant_id,
        )
    }

    pub fn enrollments_for_user(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<Vec<CourseEnrollment>, AcadError> {
        self.repo.list_scoped(
            &index_prefix(CourseEnrollment::KIND, &["user"], &[tenant_id, user_id]),
            tenant_id,
        )
    }

    pub fn unenroll(&self, tenant_id: &str, enrollment_id: &str) -> Result<bool, AcadError> {
        let owned = self
            .repo
            .find::<CourseEnrollment>(enrollment_id)?
            .filter(|e| e.tenant_id == tenant_id)
            .is_some();
        if !owned {
            return Ok(false);
        }
        self.repo.delete::<CourseEnrollment>(enrollment_id)
    }

    fn enrollment_of(
        &self,
        tenant_id: &str,
        course_id: &str,
        user_id: &str,
    ) -> Result<Option<CourseEnrollment>, AcadError> {
        Ok(self
            .enrollments_for_course(tenant_id, course_id)?
            .into_iter()
            .find(|e| e.user_id == user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::engine::MemoryStore;

    fn course_repo(store: &MemoryStore) -> CourseRepo<'_> {
        CourseRepo::new(store)
    }

    #[test]
    fn enroll_rejects_cross_tenant_course() {
        let store = MemoryStore::new();
        let courses = course_repo(&store);
        let course = courses
            .create(NewCourse {
                tenant_id: "t1".into(),
                name: "Endgames".into(),
                description: String::new(),
                color: None,
            })
            .unwrap();

        let err = courses.enroll("t2", &course.id, "u1").unwrap_err();
        assert_eq!(err.code_str(), "validation");
    }

    #[test]
    fn enroll_is_idempotent_per_user() {
        let store = MemoryStore::new();
        let courses = course_repo(&store);
        let course = courses
            .create(NewCourse {
                tenant_id: "t1".into(),
                name: "Openings".into(),
                description: String::new(),
                color: None,
            })
            .unwrap();

        let first = courses.enroll("t1", &course.id, "u1").unwrap();
        let second = courses.enroll("t1", &course.id, "u1").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(courses.enrollments_for_course("t1", &course.id).unwrap().len(), 1);
    }

    #[test]
    fn course_delete_cascades_enrollments() {
        let store = MemoryStore::new();
        let courses = course_repo(&store);
        let course = courses
            .create(NewCourse {
                tenant_id: "t1".into(),
                name: "Tactics".into(),
                description: String::new(),
                color: None,
            })
            .unwrap();
        courses.enroll("t1", &course.id, "u1").unwrap();
        courses.enroll("t1", &course.id, "u2").unwrap();

        assert!(courses.delete("t1", &course.id).unwrap());
        assert!(courses.find("t1", &course.id).unwrap().is_none());
        assert!(courses
            .enrollments_for_course("t1", &course.id)
            .unwrap()
            .is_empty());
        // Re-running the cascade is safe.
        assert!(!courses.delete("t1", &course.id).unwrap());
    }

    #[test]
    fn payment_status_updates_in_place() {
        let store = MemoryStore::new();
        let courses = course_repo(&store);
        let course = courses
            .create(NewCourse {
                tenant_id: "t1".into(),
                name: "Strategy".into(),
                description: String::new(),
                color: None,
            })
            .unwrap();
        let enrollment = courses.enroll("t1", &course.id, "u1").unwrap();

        let updated = courses
            .set_payment("t1", &enrollment.id, PaymentStatus::Paid)
            .unwrap()
            .unwrap();
        assert_eq!(updated.payment, PaymentStatus::Paid);
        assert!(courses
            .set_payment("t2", &enrollment.id, PaymentStatus::Waived)
            .unwrap()
            .is_none());
    }
}
