// src/departments.rs

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::Department;
use crate::store::{DataStore, StoreError};
use crate::validation::{FieldViolation, ValidationErrorReason};

pub struct DepartmentService {
    store: Arc<dyn DataStore>,
}

impl DepartmentService {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    pub async fn create(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<Department, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::rejected(FieldViolation::new(
                "name",
                ValidationErrorReason::Required,
            )));
        }
        let department = Department {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
            created_at: Utc::now(),
        };
        match self.store.save_department(&department).await {
            // Surfaced as a conflict-flavored violation so the API can give
            // a 409 with a stable code instead of a bare storage error.
            Err(StoreError::DepartmentExists(name)) => {
                return Err(ServiceError::rejected(FieldViolation::new(
                    "name",
                    ValidationErrorReason::DepartmentNameTaken { name },
                )))
            }
            other => other?,
        }
        info!(department_id = %department.id, name = %department.name, "department created");
        Ok(department)
    }

    pub async fn get(&self, id: Uuid) -> Result<Department, ServiceError> {
        self.store
            .get_department(id)
            .await?
            .ok_or(ServiceError::DepartmentNotFound(id))
    }

    pub async fn list(&self) -> Result<Vec<Department>, ServiceError> {
        Ok(self.store.list_departments().await?)
    }

    /// Resolves a department by name, creating it when missing. Import rows
    /// reference departments by name, not id.
    pub async fn get_or_create(&self, name: &str) -> Result<Department, ServiceError> {
        let name = name.trim();
        if let Some(existing) = self.store.find_department_by_name(name).await? {
            return Ok(existing);
        }
        match self.create(name, None).await {
            // Lost a race with a concurrent import creating the same name;
            // the winner's record is the one to use.
            Err(ServiceError::Rejected(_)) => self
                .store
                .find_department_by_name(name)
                .await?
                .ok_or_else(|| StoreError::Unavailable("department vanished".into()).into()),
            other => other,
        }
    }
}
