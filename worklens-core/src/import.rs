// src/import.rs
//
// Bulk CSV import pipeline. `submit` always creates a job: file-level
// defects fail it on the spot, anything else is queued for the worker pool.
// Row-level problems never abort a job; they are appended to the job's
// error list and processing continues in file order. Row numbers are
// 1-based over data rows (the header is row 0).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use csv::{ReaderBuilder, StringRecord, Trim};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::departments::DepartmentService;
use crate::employees::EmployeeService;
use crate::error::ServiceError;
use crate::jobs::JobRegistry;
use crate::models::{ImportJob, ImportKind, RowError};
use crate::notify::{ImportEvent, ImportNotifier};
use crate::store::DataStore;
use crate::time_entries::TimeEntryService;
use crate::validation::{EmployeeDraft, FieldViolation, TimeEntryDraft, ValidationErrorReason};

const ROW_UNREADABLE: &str = "ROW_UNREADABLE";

const EMPLOYEE_COLUMNS: [&str; 4] = ["name", "email", "position", "department"];
const EMPLOYEE_OPTIONAL_COLUMNS: [&str; 1] = ["hire_date"];
const TIME_ENTRY_COLUMNS: [&str; 5] = ["employee_email", "date", "hours", "description", "billable"];

/// A submitted file waiting for a worker.
pub struct QueuedImport {
    pub job_id: Uuid,
    pub kind: ImportKind,
    pub content: String,
}

/// Column-name -> index map derived from the validated header row.
struct CsvLayout {
    columns: HashMap<String, usize>,
}

impl CsvLayout {
    fn field<'r>(&self, record: &'r StringRecord, column: &str) -> &'r str {
        self.columns
            .get(column)
            .and_then(|&i| record.get(i))
            .unwrap_or("")
            .trim()
    }

    fn has(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }
}

/// Parses and checks the header, and counts data rows. Any error returned
/// here is fatal for the whole job.
fn inspect_csv(content: &str, kind: ImportKind) -> Result<(CsvLayout, u32), String> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|_| "file header could not be parsed".to_string())?;
    let columns: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_lowercase(), i))
        .collect();

    let required: &[&str] = match kind {
        ImportKind::EmployeeImport => &EMPLOYEE_COLUMNS,
        ImportKind::TimeEntryImport => &TIME_ENTRY_COLUMNS,
    };
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|c| !columns.contains_key(*c))
        .collect();
    if !missing.is_empty() {
        return Err(format!("missing required columns: {}", missing.join(", ")));
    }

    if kind == ImportKind::EmployeeImport {
        let mut unexpected: Vec<&str> = columns
            .keys()
            .map(String::as_str)
            .filter(|c| !EMPLOYEE_COLUMNS.contains(c) && !EMPLOYEE_OPTIONAL_COLUMNS.contains(c))
            .collect();
        if !unexpected.is_empty() {
            unexpected.sort_unstable();
            return Err(format!("unexpected columns: {}", unexpected.join(", ")));
        }
    }

    // Unreadable records still occupy a row slot, so they count too.
    let row_count = reader.records().count() as u32;
    if row_count == 0 {
        return Err("file contains no data rows".to_string());
    }

    Ok((CsvLayout { columns }, row_count))
}

/// The canonical header plus sample rows for an import kind.
pub fn csv_template(kind: ImportKind) -> &'static str {
    match kind {
        ImportKind::EmployeeImport => {
            "name,email,position,department,hire_date\n\
             John Doe,john@example.com,Senior Attorney,Corporate Law,2023-01-15\n\
             Jane Smith,jane@example.com,Paralegal,Litigation,2023-02-01\n"
        }
        ImportKind::TimeEntryImport => {
            "employee_email,date,hours,description,billable,matter_code\n\
             john@example.com,2023-12-01,8.00,Client meeting and contract review,true,CORP-104\n\
             jane@example.com,2023-12-01,6.50,Research and documentation,false,\n"
        }
    }
}

pub struct ImportService {
    registry: Arc<JobRegistry>,
    employees: Arc<EmployeeService>,
    time_entries: Arc<TimeEntryService>,
    departments: Arc<DepartmentService>,
    store: Arc<dyn DataStore>,
    notifier: Arc<dyn ImportNotifier>,
    queue: mpsc::UnboundedSender<QueuedImport>,
}

impl ImportService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<JobRegistry>,
        employees: Arc<EmployeeService>,
        time_entries: Arc<TimeEntryService>,
        departments: Arc<DepartmentService>,
        store: Arc<dyn DataStore>,
        notifier: Arc<dyn ImportNotifier>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<QueuedImport>) {
        let (queue, receiver) = mpsc::unbounded_channel();
        let service = Arc::new(Self {
            registry,
            employees,
            time_entries,
            departments,
            store,
            notifier,
            queue,
        });
        (service, receiver)
    }

    /// Creates a job for the file and either queues it or, on a fatal
    /// file-level defect, fails it immediately. Returns the job snapshot;
    /// callers poll `get_status` for progress.
    pub async fn submit(&self, content: String, kind: ImportKind) -> ImportJob {
        match inspect_csv(&content, kind) {
            Ok((_, row_count)) => {
                let job = self.registry.create(kind, row_count);
                let queued = QueuedImport {
                    job_id: job.id,
                    kind,
                    content,
                };
                if self.queue.send(queued).is_err() {
                    error!(job_id = %job.id, "import queue is closed; failing job");
                    return self.finish_failed(job.id, "import workers unavailable".into()).await;
                }
                job
            }
            Err(message) => {
                let job = self.registry.create(kind, 0);
                warn!(job_id = %job.id, %message, "import rejected before processing");
                self.finish_failed(job.id, message).await
            }
        }
    }

    pub fn get_status(&self, job_id: Uuid) -> Option<ImportJob> {
        self.registry.get(job_id)
    }

    pub fn list_jobs(&self, limit: usize) -> Vec<ImportJob> {
        self.registry.list(limit)
    }

    /// Runs one queued job to completion. Called from a worker task.
    pub async fn process(&self, work: QueuedImport) {
        if !self.registry.mark_processing(work.job_id, Utc::now()) {
            return;
        }

        let layout = match inspect_csv(&work.content, work.kind) {
            Ok((layout, _)) => layout,
            // Unreachable for content that passed submit, but a job must
            // never hang in `processing`.
            Err(message) => {
                self.finish_failed(work.job_id, message).await;
                return;
            }
        };

        let outcome = match work.kind {
            ImportKind::EmployeeImport => {
                self.process_employee_rows(work.job_id, &work.content, &layout).await
            }
            ImportKind::TimeEntryImport => {
                self.process_time_entry_rows(work.job_id, &work.content, &layout).await
            }
        };

        match outcome {
            Ok(()) => {
                if let Some(job) = self.registry.complete(work.job_id, Utc::now()) {
                    self.notify_terminal(&job).await;
                }
            }
            Err(message) => {
                self.finish_failed(work.job_id, message).await;
            }
        }
    }

    async fn process_employee_rows(
        &self,
        job_id: Uuid,
        content: &str,
        layout: &CsvLayout,
    ) -> Result<(), String> {
        let mut seen_emails: HashSet<String> = HashSet::new();
        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .from_reader(content.as_bytes());

        for (i, record) in reader.records().enumerate() {
            let row_number = (i + 1) as u32;
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!(job_id = %job_id, row_number, error = %e, "unreadable CSV row");
                    self.registry.record_row_error(job_id, unreadable_row(row_number));
                    continue;
                }
            };
            let raw = raw_row(&record);

            let name = layout.field(&record, "name");
            let email = layout.field(&record, "email");
            let position = layout.field(&record, "position");
            let department = layout.field(&record, "department");
            let hire_date_raw = layout.field(&record, "hire_date");

            let mut violations: Vec<FieldViolation> = Vec::new();
            let email_norm = email.to_lowercase();
            if email.is_empty() {
                violations.push(FieldViolation::new("email", ValidationErrorReason::Required));
            } else if seen_emails.contains(&email_norm) {
                violations.push(FieldViolation::new(
                    "email",
                    ValidationErrorReason::DuplicateInBatch,
                ));
            }
            if name.is_empty() {
                violations.push(FieldViolation::new("name", ValidationErrorReason::Required));
            }
            let hire_date = if hire_date_raw.is_empty() {
                None
            } else {
                match NaiveDate::parse_from_str(hire_date_raw, "%Y-%m-%d") {
                    Ok(date) => Some(date),
                    Err(_) => {
                        violations.push(FieldViolation::new(
                            "hire_date",
                            ValidationErrorReason::DateUnparseable {
                                raw: hire_date_raw.to_string(),
                            },
                        ));
                        None
                    }
                }
            };
            if !violations.is_empty() {
                self.registry
                    .record_row_error(job_id, row_error(row_number, raw, &violations));
                continue;
            }

            // Departments are referenced by name in the file and created on
            // first sight, matching the HR tool this replaces.
            let department_id = if department.is_empty() {
                None
            } else {
                match self.departments.get_or_create(department).await {
                    Ok(dept) => Some(dept.id),
                    Err(ServiceError::Store(e)) => return Err(infra_failure(job_id, e)),
                    Err(e) => {
                        warn!(job_id = %job_id, row_number, error = %e, "department resolution failed");
                        self.registry.record_row_error(
                            job_id,
                            RowError {
                                row_number,
                                raw_data: raw,
                                message: format!("department could not be resolved: {department}"),
                                code: crate::validation::codes::DEPARTMENT_NOT_FOUND.to_string(),
                            },
                        );
                        continue;
                    }
                }
            };

            let draft = EmployeeDraft {
                name: name.to_string(),
                email: email.to_string(),
                position: (!position.is_empty()).then(|| position.to_string()),
                department_id,
                hire_date,
            };
            match self.employees.create(draft).await {
                Ok(_) => {
                    self.registry.record_success(job_id);
                    seen_emails.insert(email_norm);
                }
                Err(ServiceError::Rejected(violations)) => {
                    self.registry
                        .record_row_error(job_id, row_error(row_number, raw, &violations));
                }
                Err(ServiceError::Store(e)) => return Err(infra_failure(job_id, e)),
                Err(e) => {
                    warn!(job_id = %job_id, row_number, error = %e, "unexpected row failure");
                    self.registry.record_row_error(
                        job_id,
                        RowError {
                            row_number,
                            raw_data: raw,
                            message: "row could not be imported".to_string(),
                            code: ROW_UNREADABLE.to_string(),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    async fn process_time_entry_rows(
        &self,
        job_id: Uuid,
        content: &str,
        layout: &CsvLayout,
    ) -> Result<(), String> {
        let mut seen: HashSet<(Uuid, NaiveDate, String)> = HashSet::new();
        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .from_reader(content.as_bytes());

        for (i, record) in reader.records().enumerate() {
            let row_number = (i + 1) as u32;
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!(job_id = %job_id, row_number, error = %e, "unreadable CSV row");
                    self.registry.record_row_error(job_id, unreadable_row(row_number));
                    continue;
                }
            };
            let raw = raw_row(&record);

            let email = layout.field(&record, "employee_email");
            let date_raw = layout.field(&record, "date");
            let hours_raw = layout.field(&record, "hours");
            let description = layout.field(&record, "description");
            let billable_raw = layout.field(&record, "billable");
            let matter_code = if layout.has("matter_code") {
                let m = layout.field(&record, "matter_code");
                (!m.is_empty()).then(|| m.to_string())
            } else {
                None
            };

            let mut violations: Vec<FieldViolation> = Vec::new();

            let employee = if email.is_empty() {
                violations.push(FieldViolation::new(
                    "employee_email",
                    ValidationErrorReason::Required,
                ));
                None
            } else {
                match self.store.find_employee_by_email(email).await {
                    Ok(Some(employee)) => Some(employee),
                    Ok(None) => {
                        violations.push(FieldViolation::new(
                            "employee_email",
                            ValidationErrorReason::EmployeeEmailUnknown {
                                email: email.to_lowercase(),
                            },
                        ));
                        None
                    }
                    Err(e) => return Err(infra_failure(job_id, e)),
                }
            };

            let date = parse_date("date", date_raw, &mut violations);
            let hours = parse_hours(hours_raw, &mut violations);
            let billable = parse_billable(billable_raw, &mut violations);

            if let (Some(employee), Some(date)) = (&employee, date) {
                let triple = (employee.id, date, description.to_string());
                if seen.contains(&triple) {
                    violations.push(FieldViolation::new(
                        "description",
                        ValidationErrorReason::DuplicateInBatch,
                    ));
                }
            }

            if !violations.is_empty() {
                self.registry
                    .record_row_error(job_id, row_error(row_number, raw, &violations));
                continue;
            }

            let employee = employee.expect("checked above");
            let draft = TimeEntryDraft {
                employee_id: employee.id,
                date,
                hours,
                description: description.to_string(),
                billable: billable.unwrap_or(false),
                matter_code,
            };
            match self.time_entries.log(draft).await {
                Ok(entry) => {
                    self.registry.record_success(job_id);
                    seen.insert((entry.employee_id, entry.date, description.to_string()));
                }
                Err(ServiceError::Rejected(violations)) => {
                    self.registry
                        .record_row_error(job_id, row_error(row_number, raw, &violations));
                }
                Err(ServiceError::Store(e)) => return Err(infra_failure(job_id, e)),
                Err(e) => {
                    warn!(job_id = %job_id, row_number, error = %e, "unexpected row failure");
                    self.registry.record_row_error(
                        job_id,
                        RowError {
                            row_number,
                            raw_data: raw,
                            message: "row could not be imported".to_string(),
                            code: ROW_UNREADABLE.to_string(),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    async fn finish_failed(&self, job_id: Uuid, message: String) -> ImportJob {
        let job = self.registry.fail(job_id, message, Utc::now());
        match job {
            Some(job) => {
                self.notify_terminal(&job).await;
                job
            }
            // Transition refused means someone already finished it; return
            // whatever the registry holds now.
            None => self
                .registry
                .get(job_id)
                .expect("job exists for the lifetime of the process"),
        }
    }

    async fn notify_terminal(&self, job: &ImportJob) {
        let started = job.started_at.unwrap_or(job.created_at);
        let finished = job.completed_at.unwrap_or_else(Utc::now);
        let event = ImportEvent {
            job_id: job.id,
            kind: job.kind,
            status: job.status,
            succeeded: job.succeeded,
            failed: job.failed,
            duration: (finished - started).to_std().unwrap_or_default(),
        };
        if let Err(e) = self.notifier.notify(&event).await {
            warn!(job_id = %job.id, error = %e, "import notification failed");
        }
    }
}

/// Spawns `count` worker tasks draining one shared queue. Each job runs to
/// completion on a single worker; concurrency exists only across jobs.
pub fn spawn_workers(
    service: Arc<ImportService>,
    receiver: mpsc::UnboundedReceiver<QueuedImport>,
    count: usize,
) -> Vec<JoinHandle<()>> {
    let shared = Arc::new(TokioMutex::new(receiver));
    (0..count.max(1))
        .map(|worker| {
            let service = Arc::clone(&service);
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                info!(worker, "import worker started");
                loop {
                    let work = { shared.lock().await.recv().await };
                    match work {
                        Some(work) => service.process(work).await,
                        None => break,
                    }
                }
                info!(worker, "import worker stopped");
            })
        })
        .collect()
}

fn raw_row(record: &StringRecord) -> String {
    record.iter().collect::<Vec<_>>().join(",")
}

fn unreadable_row(row_number: u32) -> RowError {
    RowError {
        row_number,
        raw_data: String::new(),
        message: "row could not be parsed as CSV".to_string(),
        code: ROW_UNREADABLE.to_string(),
    }
}

fn row_error(row_number: u32, raw_data: String, violations: &[FieldViolation]) -> RowError {
    let message = violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.reason))
        .collect::<Vec<_>>()
        .join("; ");
    let code = violations
        .first()
        .map(|v| v.reason.code())
        .unwrap_or(ROW_UNREADABLE)
        .to_string();
    RowError {
        row_number,
        raw_data,
        message,
        code,
    }
}

fn infra_failure(job_id: Uuid, e: crate::store::StoreError) -> String {
    error!(job_id = %job_id, error = %e, "storage failure aborted import");
    // Sanitized for the job snapshot; the log line above keeps the detail.
    "storage became unavailable during processing; import aborted".to_string()
}

fn parse_date(
    field: &'static str,
    raw: &str,
    violations: &mut Vec<FieldViolation>,
) -> Option<NaiveDate> {
    if raw.is_empty() {
        violations.push(FieldViolation::new(field, ValidationErrorReason::Required));
        return None;
    }
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            violations.push(FieldViolation::new(
                field,
                ValidationErrorReason::DateUnparseable {
                    raw: raw.to_string(),
                },
            ));
            None
        }
    }
}

fn parse_hours(raw: &str, violations: &mut Vec<FieldViolation>) -> Option<Decimal> {
    if raw.is_empty() {
        violations.push(FieldViolation::new("hours", ValidationErrorReason::Required));
        return None;
    }
    match raw.parse::<Decimal>() {
        Ok(hours) => Some(hours),
        Err(_) => {
            violations.push(FieldViolation::new(
                "hours",
                ValidationErrorReason::HoursUnparseable {
                    raw: raw.to_string(),
                },
            ));
            None
        }
    }
}

fn parse_billable(raw: &str, violations: &mut Vec<FieldViolation>) -> Option<bool> {
    if raw.is_empty() {
        violations.push(FieldViolation::new(
            "billable",
            ValidationErrorReason::Required,
        ));
        return None;
    }
    match raw.to_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => {
            violations.push(FieldViolation::new(
                "billable",
                ValidationErrorReason::BillableUnparseable {
                    raw: raw.to_string(),
                },
            ));
            None
        }
    }
}
