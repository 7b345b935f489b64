// src/validation.rs
//
// Business-rule checking for employees and time entries. Every function here
// is pure: callers hand in a snapshot of the surrounding state (today's date,
// persisted hours, reference existence) and get back either a normalized
// record or a list of field-level violations. Nothing in this module touches
// the store, the clock, or the network.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;
use uuid::Uuid;

pub const MIN_ENTRY_HOURS: Decimal = dec!(0.01);
pub const MAX_ENTRY_HOURS: Decimal = dec!(24.00);
pub const DAILY_HOURS_CAP: Decimal = dec!(24.00);
pub const MIN_DESCRIPTION_CHARS: usize = 10;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"));
static MATTER_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9][A-Z0-9-]{1,19}$").expect("matter code regex"));

/// Stable machine-readable reason codes, one per rule. These are part of the
/// API surface (clients branch on them), so they never change casually.
pub mod codes {
    pub const NAME_INCOMPLETE: &str = "NAME_INCOMPLETE";
    pub const INVALID_EMAIL: &str = "INVALID_EMAIL";
    pub const EMAIL_ALREADY_EXISTS: &str = "EMAIL_ALREADY_EXISTS";
    pub const INVALID_HIRE_DATE: &str = "INVALID_HIRE_DATE";
    pub const DEPARTMENT_NOT_FOUND: &str = "DEPARTMENT_NOT_FOUND";
    pub const DEPARTMENT_ALREADY_EXISTS: &str = "DEPARTMENT_ALREADY_EXISTS";
    pub const HOURS_OUT_OF_RANGE: &str = "HOURS_OUT_OF_RANGE";
    pub const HOURS_TOO_PRECISE: &str = "HOURS_TOO_PRECISE";
    pub const DATE_IN_FUTURE: &str = "DATE_IN_FUTURE";
    pub const DESCRIPTION_TOO_SHORT: &str = "DESCRIPTION_TOO_SHORT";
    pub const DAILY_CAP_EXCEEDED: &str = "DAILY_CAP_EXCEEDED";
    pub const EMPLOYEE_NOT_FOUND: &str = "EMPLOYEE_NOT_FOUND";
    pub const EMPLOYEE_REMOVED: &str = "EMPLOYEE_REMOVED";
    pub const INVALID_MATTER_CODE: &str = "INVALID_MATTER_CODE";
    pub const DUPLICATE_IN_BATCH: &str = "DUPLICATE_IN_BATCH";
    pub const FIELD_REQUIRED: &str = "FIELD_REQUIRED";
    pub const INVALID_DATE: &str = "INVALID_DATE";
    pub const INVALID_HOURS: &str = "INVALID_HOURS";
    pub const INVALID_BILLABLE: &str = "INVALID_BILLABLE";
}

/// How a violation should be surfaced at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// Malformed or out-of-range value.
    Invalid,
    /// Collides with existing data (409-style).
    Conflict,
    /// References a record that does not exist (or is removed).
    NotFound,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorReason {
    #[error("name must contain at least two words")]
    NameIncomplete,
    #[error("email address is not valid")]
    EmailInvalid,
    #[error("email {email} is already registered")]
    EmailTaken { email: String },
    #[error("hire date {date} is in the future")]
    HireDateInFuture { date: NaiveDate },
    #[error("department {department_id} does not exist")]
    DepartmentMissing { department_id: Uuid },
    #[error("department {name} already exists")]
    DepartmentNameTaken { name: String },
    #[error("hours must be between 0.01 and 24.00, got {hours}")]
    HoursOutOfRange { hours: Decimal },
    #[error("hours may carry at most two decimal places")]
    HoursTooPrecise { hours: Decimal },
    #[error("date {date} is in the future")]
    DateInFuture { date: NaiveDate },
    #[error("description must be at least 10 characters, got {length}")]
    DescriptionTooShort { length: usize },
    #[error(
        "employee already has {already_logged}h on this date; adding {requested}h would exceed the 24.00h daily cap"
    )]
    DailyCapExceeded {
        already_logged: Decimal,
        requested: Decimal,
    },
    #[error("employee {employee_id} does not exist")]
    EmployeeMissing { employee_id: Uuid },
    #[error("no employee with email {email}")]
    EmployeeEmailUnknown { email: String },
    #[error("employee {employee_id} has been removed")]
    EmployeeRemoved { employee_id: Uuid },
    #[error("matter code must be 2-20 characters: letters, digits or dashes")]
    MatterCodeInvalid,
    #[error("duplicate of an earlier row in the same file")]
    DuplicateInBatch,
    #[error("field is required")]
    Required,
    #[error("{raw:?} is not a valid date (expected YYYY-MM-DD)")]
    DateUnparseable { raw: String },
    #[error("{raw:?} is not a valid decimal hours value")]
    HoursUnparseable { raw: String },
    #[error("{raw:?} is not a valid billable flag (expected true/false, yes/no or 1/0)")]
    BillableUnparseable { raw: String },
}

impl ValidationErrorReason {
    pub fn code(&self) -> &'static str {
        use ValidationErrorReason::*;
        match self {
            NameIncomplete => codes::NAME_INCOMPLETE,
            EmailInvalid => codes::INVALID_EMAIL,
            EmailTaken { .. } => codes::EMAIL_ALREADY_EXISTS,
            HireDateInFuture { .. } => codes::INVALID_HIRE_DATE,
            DepartmentMissing { .. } => codes::DEPARTMENT_NOT_FOUND,
            DepartmentNameTaken { .. } => codes::DEPARTMENT_ALREADY_EXISTS,
            HoursOutOfRange { .. } => codes::HOURS_OUT_OF_RANGE,
            HoursTooPrecise { .. } => codes::HOURS_TOO_PRECISE,
            DateInFuture { .. } => codes::DATE_IN_FUTURE,
            DescriptionTooShort { .. } => codes::DESCRIPTION_TOO_SHORT,
            DailyCapExceeded { .. } => codes::DAILY_CAP_EXCEEDED,
            EmployeeMissing { .. } | EmployeeEmailUnknown { .. } => codes::EMPLOYEE_NOT_FOUND,
            EmployeeRemoved { .. } => codes::EMPLOYEE_REMOVED,
            MatterCodeInvalid => codes::INVALID_MATTER_CODE,
            DuplicateInBatch => codes::DUPLICATE_IN_BATCH,
            Required => codes::FIELD_REQUIRED,
            DateUnparseable { .. } => codes::INVALID_DATE,
            HoursUnparseable { .. } => codes::INVALID_HOURS,
            BillableUnparseable { .. } => codes::INVALID_BILLABLE,
        }
    }

    pub fn kind(&self) -> ViolationKind {
        use ValidationErrorReason::*;
        match self {
            EmailTaken { .. } | DepartmentNameTaken { .. } | DuplicateInBatch => {
                ViolationKind::Conflict
            }
            DepartmentMissing { .. }
            | EmployeeMissing { .. }
            | EmployeeEmailUnknown { .. }
            | EmployeeRemoved { .. } => ViolationKind::NotFound,
            _ => ViolationKind::Invalid,
        }
    }
}

/// One rule failure, anchored to the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: &'static str,
    pub reason: ValidationErrorReason,
}

impl FieldViolation {
    pub fn new(field: &'static str, reason: ValidationErrorReason) -> Self {
        Self { field, reason }
    }
}

// --- Employee validation ---

/// Unvalidated inbound employee payload.
#[derive(Debug, Clone, Default)]
pub struct EmployeeDraft {
    pub name: String,
    pub email: String,
    pub position: Option<String>,
    pub department_id: Option<Uuid>,
    pub hire_date: Option<NaiveDate>,
}

/// Snapshot of the state the employee rules depend on.
#[derive(Debug, Clone, Copy)]
pub struct EmployeeContext {
    pub today: NaiveDate,
    /// Whether the (normalized) email already belongs to an active employee.
    pub email_in_use: bool,
    /// Whether `department_id` resolves; vacuously true when it is `None`.
    pub department_exists: bool,
}

/// Accepted, normalized employee record ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEmployee {
    pub name: String,
    pub email: String,
    pub position: Option<String>,
    pub department_id: Option<Uuid>,
    pub hire_date: Option<NaiveDate>,
}

pub fn validate_employee(
    draft: &EmployeeDraft,
    ctx: &EmployeeContext,
) -> Result<NewEmployee, Vec<FieldViolation>> {
    let mut violations = Vec::new();

    let name = draft.name.trim().to_string();
    if name.split_whitespace().count() < 2 {
        violations.push(FieldViolation::new(
            "name",
            ValidationErrorReason::NameIncomplete,
        ));
    }

    let email = draft.email.trim().to_lowercase();
    if !EMAIL_RE.is_match(&email) {
        violations.push(FieldViolation::new(
            "email",
            ValidationErrorReason::EmailInvalid,
        ));
    } else if ctx.email_in_use {
        violations.push(FieldViolation::new(
            "email",
            ValidationErrorReason::EmailTaken {
                email: email.clone(),
            },
        ));
    }

    if let Some(date) = draft.hire_date {
        if date > ctx.today {
            violations.push(FieldViolation::new(
                "hire_date",
                ValidationErrorReason::HireDateInFuture { date },
            ));
        }
    }

    if let Some(department_id) = draft.department_id {
        if !ctx.department_exists {
            violations.push(FieldViolation::new(
                "department_id",
                ValidationErrorReason::DepartmentMissing { department_id },
            ));
        }
    }

    if !violations.is_empty() {
        return Err(violations);
    }

    let position = draft
        .position
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from);

    Ok(NewEmployee {
        name,
        email,
        position,
        department_id: draft.department_id,
        hire_date: draft.hire_date,
    })
}

// --- Time entry validation ---

#[derive(Debug, Clone, Default)]
pub struct TimeEntryDraft {
    pub employee_id: Uuid,
    pub date: Option<NaiveDate>,
    pub hours: Option<Decimal>,
    pub description: String,
    pub billable: bool,
    pub matter_code: Option<String>,
}

/// What the store knows about the referenced employee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmployeeLookup {
    Active,
    Removed,
    Missing,
}

#[derive(Debug, Clone, Copy)]
pub struct TimeEntryContext {
    pub today: NaiveDate,
    pub employee: EmployeeLookup,
    /// Sum of hours already persisted for (employee, date), including rows
    /// committed earlier in the same import batch.
    pub hours_already_logged: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTimeEntry {
    pub employee_id: Uuid,
    pub date: NaiveDate,
    pub hours: Decimal,
    pub description: String,
    pub billable: bool,
    pub matter_code: Option<String>,
}

pub fn validate_time_entry(
    draft: &TimeEntryDraft,
    ctx: &TimeEntryContext,
) -> Result<NewTimeEntry, Vec<FieldViolation>> {
    let mut violations = Vec::new();

    match ctx.employee {
        EmployeeLookup::Active => {}
        EmployeeLookup::Removed => violations.push(FieldViolation::new(
            "employee_id",
            ValidationErrorReason::EmployeeRemoved {
                employee_id: draft.employee_id,
            },
        )),
        EmployeeLookup::Missing => violations.push(FieldViolation::new(
            "employee_id",
            ValidationErrorReason::EmployeeMissing {
                employee_id: draft.employee_id,
            },
        )),
    }

    let date = match draft.date {
        Some(date) if date > ctx.today => {
            violations.push(FieldViolation::new(
                "date",
                ValidationErrorReason::DateInFuture { date },
            ));
            Some(date)
        }
        Some(date) => Some(date),
        None => {
            violations.push(FieldViolation::new("date", ValidationErrorReason::Required));
            None
        }
    };

    let hours = match draft.hours {
        Some(hours) => {
            if hours < MIN_ENTRY_HOURS || hours > MAX_ENTRY_HOURS {
                violations.push(FieldViolation::new(
                    "hours",
                    ValidationErrorReason::HoursOutOfRange { hours },
                ));
            } else if hours.round_dp(2) != hours {
                violations.push(FieldViolation::new(
                    "hours",
                    ValidationErrorReason::HoursTooPrecise { hours },
                ));
            } else if ctx.hours_already_logged + hours > DAILY_HOURS_CAP {
                // Checked only for otherwise-valid hours so one bad value
                // does not produce two overlapping violations.
                violations.push(FieldViolation::new(
                    "hours",
                    ValidationErrorReason::DailyCapExceeded {
                        already_logged: ctx.hours_already_logged,
                        requested: hours,
                    },
                ));
            }
            Some(hours)
        }
        None => {
            violations.push(FieldViolation::new(
                "hours",
                ValidationErrorReason::Required,
            ));
            None
        }
    };

    let description = draft.description.trim().to_string();
    if description.chars().count() < MIN_DESCRIPTION_CHARS {
        violations.push(FieldViolation::new(
            "description",
            ValidationErrorReason::DescriptionTooShort {
                length: description.chars().count(),
            },
        ));
    }

    let matter_code = draft
        .matter_code
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_uppercase);
    if let Some(code) = &matter_code {
        if !MATTER_CODE_RE.is_match(code) {
            violations.push(FieldViolation::new(
                "matter_code",
                ValidationErrorReason::MatterCodeInvalid,
            ));
        }
    }

    if !violations.is_empty() {
        return Err(violations);
    }

    Ok(NewTimeEntry {
        employee_id: draft.employee_id,
        // Both unwraps are guarded by the Required violations above.
        date: date.expect("validated"),
        hours: hours.expect("validated"),
        description,
        billable: draft.billable,
        matter_code,
    })
}
