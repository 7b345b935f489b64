// src/error.rs

use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;
use crate::validation::FieldViolation;

/// Errors crossing the service-layer boundary. `Rejected` carries expected
/// business-rule violations as data; everything else is a lookup miss or an
/// infrastructure fault.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("request failed validation")]
    Rejected(Vec<FieldViolation>),
    #[error("employee {0} not found")]
    EmployeeNotFound(Uuid),
    #[error("time entry {0} not found")]
    TimeEntryNotFound(Uuid),
    #[error("department {0} not found")]
    DepartmentNotFound(Uuid),
    #[error("import job {0} not found")]
    JobNotFound(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub fn rejected(violation: FieldViolation) -> Self {
        ServiceError::Rejected(vec![violation])
    }
}
