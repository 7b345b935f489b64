// src/employees.rs

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::Employee;
use crate::search::{EmployeeDocument, SearchIndex};
use crate::store::{DataStore, EmployeeFilter, StoreError};
use crate::validation::{
    validate_employee, EmployeeContext, EmployeeDraft, FieldViolation, ValidationErrorReason,
};

/// Partial update; `None` leaves a field untouched. A `position` of
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct EmployeePatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub position: Option<Option<String>>,
    pub department_id: Option<Option<Uuid>>,
    pub hire_date: Option<NaiveDate>,
}

pub struct EmployeeService {
    store: Arc<dyn DataStore>,
    index: Arc<dyn SearchIndex>,
}

impl EmployeeService {
    pub fn new(store: Arc<dyn DataStore>, index: Arc<dyn SearchIndex>) -> Self {
        Self { store, index }
    }

    pub async fn create(&self, draft: EmployeeDraft) -> Result<Employee, ServiceError> {
        let today = Utc::now().date_naive();
        let email = draft.email.trim().to_lowercase();
        let email_in_use = self.store.find_employee_by_email(&email).await?.is_some();
        let department_exists = match draft.department_id {
            Some(id) => self.store.get_department(id).await?.is_some(),
            None => true,
        };

        let accepted = validate_employee(
            &draft,
            &EmployeeContext {
                today,
                email_in_use,
                department_exists,
            },
        )
        .map_err(ServiceError::Rejected)?;

        let employee = Employee {
            id: Uuid::new_v4(),
            name: accepted.name,
            email: accepted.email,
            position: accepted.position,
            department_id: accepted.department_id,
            hire_date: accepted.hire_date,
            removed: false,
            created_at: Utc::now(),
        };

        match self.store.save_employee(&employee).await {
            // The store re-checks uniqueness under its own lock; a race that
            // slipped past the pre-check above lands here.
            Err(StoreError::EmailExists(email)) => {
                return Err(ServiceError::rejected(FieldViolation::new(
                    "email",
                    ValidationErrorReason::EmailTaken { email },
                )))
            }
            other => other?,
        }

        info!(employee_id = %employee.id, email = %employee.email, "employee created");
        self.index_in_background(employee.clone());
        Ok(employee)
    }

    pub async fn get(&self, id: Uuid) -> Result<Employee, ServiceError> {
        match self.store.get_employee(id).await? {
            Some(e) if !e.removed => Ok(e),
            _ => Err(ServiceError::EmployeeNotFound(id)),
        }
    }

    pub async fn list(
        &self,
        filter: &EmployeeFilter,
    ) -> Result<(Vec<Employee>, usize), ServiceError> {
        Ok(self.store.list_employees(filter).await?)
    }

    pub async fn update(&self, id: Uuid, patch: EmployeePatch) -> Result<Employee, ServiceError> {
        let current = self.get(id).await?;
        let today = Utc::now().date_naive();

        let draft = EmployeeDraft {
            name: patch.name.unwrap_or_else(|| current.name.clone()),
            email: patch.email.unwrap_or_else(|| current.email.clone()),
            position: patch.position.unwrap_or_else(|| current.position.clone()),
            department_id: patch.department_id.unwrap_or(current.department_id),
            hire_date: patch.hire_date.or(current.hire_date),
        };

        let email = draft.email.trim().to_lowercase();
        let email_in_use = match self.store.find_employee_by_email(&email).await? {
            Some(owner) => owner.id != id,
            None => false,
        };
        let department_exists = match draft.department_id {
            Some(dept) => self.store.get_department(dept).await?.is_some(),
            None => true,
        };

        let accepted = validate_employee(
            &draft,
            &EmployeeContext {
                today,
                email_in_use,
                department_exists,
            },
        )
        .map_err(ServiceError::Rejected)?;

        let updated = Employee {
            id,
            name: accepted.name,
            email: accepted.email,
            position: accepted.position,
            department_id: accepted.department_id,
            hire_date: accepted.hire_date,
            removed: current.removed,
            created_at: current.created_at,
        };

        match self.store.update_employee(&updated).await {
            Err(StoreError::EmailExists(email)) => {
                return Err(ServiceError::rejected(FieldViolation::new(
                    "email",
                    ValidationErrorReason::EmailTaken { email },
                )))
            }
            other => other?,
        }

        self.index_in_background(updated.clone());
        Ok(updated)
    }

    /// Soft delete. Historical time entries keep pointing at the record.
    pub async fn remove(&self, id: Uuid) -> Result<(), ServiceError> {
        if !self.store.soft_delete_employee(id).await? {
            return Err(ServiceError::EmployeeNotFound(id));
        }
        info!(employee_id = %id, "employee removed (soft)");
        let index = Arc::clone(&self.index);
        tokio::spawn(async move {
            if let Err(e) = index.remove_document(id).await {
                warn!(employee_id = %id, error = %e, "search index removal failed");
            }
        });
        Ok(())
    }

    pub async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<EmployeeDocument>, ServiceError> {
        if query.trim().chars().count() < 2 {
            return Ok(Vec::new());
        }
        match self.index.query(query, limit).await {
            Ok(hits) => Ok(hits),
            Err(e) => {
                // Search is best-effort; an index outage degrades to empty
                // results rather than a failed request.
                warn!(error = %e, "search index query failed");
                Ok(Vec::new())
            }
        }
    }

    /// Upserts the search document without blocking (or failing) the write
    /// that triggered it.
    fn index_in_background(&self, employee: Employee) {
        let index = Arc::clone(&self.index);
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let department = match employee.department_id {
                Some(id) => match store.get_department(id).await {
                    Ok(d) => d.map(|d| d.name),
                    Err(_) => None,
                },
                None => None,
            };
            let doc = EmployeeDocument {
                id: employee.id,
                name: employee.name,
                email: employee.email,
                position: employee.position,
                department,
            };
            if let Err(e) = index.upsert_employee_document(&doc).await {
                warn!(employee_id = %doc.id, error = %e, "search index upsert failed");
            }
        });
    }
}
