// src/models.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An employee record. Employees are soft-deleted (the `removed` flag) so
/// that historical time entries keep a resolvable owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub position: Option<String>,
    pub department_id: Option<Uuid>,
    pub hire_date: Option<NaiveDate>,
    pub removed: bool,
    pub created_at: DateTime<Utc>,
}

/// A single unit of logged work. `hours` carries at most two fractional
/// digits; the per-(employee, date) total may never exceed 24.00.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub date: NaiveDate,
    pub hours: Decimal,
    pub description: String,
    pub billable: bool,
    pub matter_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportKind {
    EmployeeImport,
    TimeEntryImport,
}

impl ImportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportKind::EmployeeImport => "employee_import",
            ImportKind::TimeEntryImport => "time_entry_import",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl ImportStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportStatus::Completed | ImportStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Queued => "queued",
            ImportStatus::Processing => "processing",
            ImportStatus::Completed => "completed",
            ImportStatus::Failed => "failed",
        }
    }
}

/// One failed input row of a bulk import. `row_number` is 1-based over the
/// data rows; the header counts as row 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowError {
    pub row_number: u32,
    pub raw_data: String,
    pub message: String,
    pub code: String,
}

/// Lifecycle record of one bulk import. Owned by the import pipeline; the
/// error list is append-only while processing and frozen once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: Uuid,
    pub kind: ImportKind,
    pub status: ImportStatus,
    pub total_rows: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub row_errors: Vec<RowError>,
    /// Top-level message for jobs that failed before (or instead of) row
    /// processing. Row-level problems go to `row_errors`, never here.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ImportJob {
    pub fn new(kind: ImportKind, total_rows: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            status: ImportStatus::Queued,
            total_rows,
            succeeded: 0,
            failed: 0,
            row_errors: Vec::new(),
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}
