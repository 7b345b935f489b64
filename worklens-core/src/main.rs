// src/main.rs

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Datelike, NaiveDate, Utc};
use clap::Parser;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use url::Url;
use uuid::Uuid;

mod aggregation;
mod departments;
mod employees;
mod error;
mod import;
mod jobs;
mod models;
mod notify;
mod search;
mod store;
mod time_entries;
mod validation;

#[cfg(test)]
mod aggregation_tests;
#[cfg(test)]
mod store_tests;

use aggregation::{AggregationEngine, AggregationError, DateRange, Summary, SummaryScope};
use departments::DepartmentService;
use employees::{EmployeePatch, EmployeeService};
use error::ServiceError;
use import::{csv_template, spawn_workers, ImportService};
use jobs::JobRegistry;
use models::{Department, Employee, ImportJob, ImportKind, TimeEntry};
use notify::{ImportNotifier, LogNotifier, SlackNotifier};
use search::{EmployeeDocument, HttpIndex, MemoryIndex, SearchIndex};
use store::{DataStore, EmployeeFilter, MemoryStore, StoreError, TimeEntryFilter};
use time_entries::{EmployeeLocks, TimeEntryPatch, TimeEntryService};
use validation::{EmployeeDraft, TimeEntryDraft, ViolationKind};

// --- Configuration ---

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "defaults::host")]
    pub server_host: String,
    #[serde(default = "defaults::port")]
    pub server_port: u16,
    #[serde(default = "defaults::import_workers")]
    pub import_workers: usize,
    /// Slack incoming webhook for import completion notices; logs only when
    /// unset.
    #[serde(default)]
    pub slack_webhook_url: Option<String>,
    /// Remote search index base URL; an in-process index is used when unset.
    #[serde(default)]
    pub search_index_url: Option<String>,
    /// Whether soft-deleted employees' historical hours appear in firm and
    /// department reports.
    #[serde(default = "defaults::include_removed")]
    pub include_removed_in_reports: bool,
}

mod defaults {
    pub fn host() -> String {
        "127.0.0.1".to_string()
    }
    pub fn port() -> u16 {
        4400
    }
    pub fn import_workers() -> usize {
        2
    }
    pub fn include_removed() -> bool {
        true
    }
}

impl Config {
    pub fn from_env() -> Result<Self, envy::Error> {
        // Load .env file if it exists
        dotenv::dotenv().ok();
        envy::prefixed("WORKLENS_").from_env()
    }
}

#[derive(Parser, Debug)]
#[command(name = "worklens-core", about = "People-analytics backend service")]
struct Args {
    /// Override the configured bind address
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port
    #[arg(long)]
    port: Option<u16>,
}

// --- Error mapping ---

#[derive(Error, Debug)]
enum AppError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Aggregation(#[from] AggregationError),
    #[error("invalid request: {0}")]
    BadRequest(String),
}

#[derive(Serialize)]
struct ViolationBody {
    field: &'static str,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, code, message, violations) = match &self {
            AppError::Service(ServiceError::Rejected(violations)) => {
                let status = if violations.iter().any(|v| v.reason.kind() == ViolationKind::Conflict)
                {
                    StatusCode::CONFLICT
                } else if violations.iter().any(|v| v.reason.kind() == ViolationKind::NotFound) {
                    StatusCode::NOT_FOUND
                } else {
                    StatusCode::BAD_REQUEST
                };
                let code = violations
                    .first()
                    .map(|v| v.reason.code())
                    .unwrap_or("VALIDATION_FAILED");
                let body: Vec<ViolationBody> = violations
                    .iter()
                    .map(|v| ViolationBody {
                        field: v.field,
                        code: v.reason.code(),
                        message: v.reason.to_string(),
                    })
                    .collect();
                (status, code, "request failed validation".to_string(), body)
            }
            AppError::Service(ServiceError::EmployeeNotFound(_)) => (
                StatusCode::NOT_FOUND,
                "EMPLOYEE_NOT_FOUND",
                self.to_string(),
                Vec::new(),
            ),
            AppError::Service(ServiceError::TimeEntryNotFound(_)) => (
                StatusCode::NOT_FOUND,
                "TIME_ENTRY_NOT_FOUND",
                self.to_string(),
                Vec::new(),
            ),
            AppError::Service(ServiceError::DepartmentNotFound(_)) => (
                StatusCode::NOT_FOUND,
                "DEPARTMENT_NOT_FOUND",
                self.to_string(),
                Vec::new(),
            ),
            AppError::Service(ServiceError::JobNotFound(_)) => (
                StatusCode::NOT_FOUND,
                "IMPORT_JOB_NOT_FOUND",
                self.to_string(),
                Vec::new(),
            ),
            AppError::Service(ServiceError::Store(e)) => {
                let (status, code) = match e {
                    StoreError::EmailExists(_) => (StatusCode::CONFLICT, "EMAIL_ALREADY_EXISTS"),
                    StoreError::DepartmentExists(_) => {
                        (StatusCode::CONFLICT, "DEPARTMENT_ALREADY_EXISTS")
                    }
                    StoreError::Missing(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                    StoreError::Unavailable(_) => {
                        error!(error = %e, "storage failure");
                        (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_UNAVAILABLE")
                    }
                };
                // Storage detail stays in the log, not the response body.
                (status, code, "request could not be completed".to_string(), Vec::new())
            }
            AppError::Aggregation(AggregationError::InvalidRange { .. }) => (
                StatusCode::BAD_REQUEST,
                "INVALID_DATE_RANGE",
                self.to_string(),
                Vec::new(),
            ),
            AppError::Aggregation(AggregationError::UnknownEmployee(_)) => (
                StatusCode::NOT_FOUND,
                "EMPLOYEE_NOT_FOUND",
                self.to_string(),
                Vec::new(),
            ),
            AppError::Aggregation(AggregationError::UnknownDepartment(_)) => (
                StatusCode::NOT_FOUND,
                "DEPARTMENT_NOT_FOUND",
                self.to_string(),
                Vec::new(),
            ),
            AppError::Aggregation(AggregationError::Store(e)) => {
                error!(error = %e, "storage failure during aggregation");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_UNAVAILABLE",
                    "request could not be completed".to_string(),
                    Vec::new(),
                )
            }
            AppError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                message.clone(),
                Vec::new(),
            ),
        };

        let body = serde_json::json!({
            "error": message,
            "code": code,
            "violations": violations,
        });
        (status, Json(body)).into_response()
    }
}

// --- Shared state ---

#[derive(Clone)]
struct AppState {
    employees: Arc<EmployeeService>,
    time_entries: Arc<TimeEntryService>,
    departments: Arc<DepartmentService>,
    imports: Arc<ImportService>,
    engine: Arc<AggregationEngine>,
}

// --- Request/response DTOs ---

#[derive(Debug, Deserialize)]
struct CreateEmployeeRequest {
    name: String,
    email: String,
    position: Option<String>,
    department_id: Option<Uuid>,
    hire_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct UpdateEmployeeRequest {
    name: Option<String>,
    email: Option<String>,
    position: Option<String>,
    department_id: Option<Uuid>,
    hire_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct EmployeeListQuery {
    page: Option<u32>,
    limit: Option<u32>,
    department_id: Option<Uuid>,
    search: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: String,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct CreateTimeEntryRequest {
    employee_id: Uuid,
    date: NaiveDate,
    hours: Decimal,
    description: String,
    billable: Option<bool>,
    matter_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateTimeEntryRequest {
    date: Option<NaiveDate>,
    hours: Option<Decimal>,
    description: Option<String>,
    billable: Option<bool>,
    matter_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimeEntryListQuery {
    page: Option<u32>,
    limit: Option<u32>,
    employee_id: Option<Uuid>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    billable: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct CreateDepartmentRequest {
    name: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SummaryQuery {
    scope: Option<String>,
    id: Option<Uuid>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct ImportListQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct Pagination {
    page: u32,
    limit: u32,
    total: usize,
    pages: u32,
}

impl Pagination {
    fn new(page: u32, limit: u32, total: usize) -> Self {
        Self {
            page,
            limit,
            total,
            pages: (total as u32).div_ceil(limit.max(1)),
        }
    }
}

#[derive(Serialize)]
struct EmployeeListResponse {
    employees: Vec<Employee>,
    pagination: Pagination,
}

#[derive(Serialize)]
struct TimeEntryListResponse {
    time_entries: Vec<TimeEntry>,
    pagination: Pagination,
}

fn page_params(page: Option<u32>, limit: Option<u32>) -> (u32, u32) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(20).clamp(1, 100);
    (page, limit)
}

// --- Handlers ---

async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn handle_create_employee(
    State(state): State<AppState>,
    Json(body): Json<CreateEmployeeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let employee = state
        .employees
        .create(EmployeeDraft {
            name: body.name,
            email: body.email,
            position: body.position,
            department_id: body.department_id,
            hire_date: body.hire_date,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(employee)))
}

async fn handle_list_employees(
    State(state): State<AppState>,
    Query(query): Query<EmployeeListQuery>,
) -> Result<Json<EmployeeListResponse>, AppError> {
    let (page, limit) = page_params(query.page, query.limit);
    let filter = EmployeeFilter {
        department_id: query.department_id,
        search: query.search,
        include_removed: false,
        offset: ((page - 1) * limit) as usize,
        limit: limit as usize,
    };
    let (employees, total) = state.employees.list(&filter).await?;
    Ok(Json(EmployeeListResponse {
        employees,
        pagination: Pagination::new(page, limit, total),
    }))
}

async fn handle_search_employees(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<EmployeeDocument>>, AppError> {
    let hits = state
        .employees
        .search(&query.q, query.limit.unwrap_or(10).clamp(1, 50))
        .await?;
    Ok(Json(hits))
}

async fn handle_get_employee(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Employee>, AppError> {
    Ok(Json(state.employees.get(id).await?))
}

async fn handle_update_employee(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateEmployeeRequest>,
) -> Result<Json<Employee>, AppError> {
    let patch = EmployeePatch {
        name: body.name,
        email: body.email,
        position: body.position.map(Some),
        department_id: body.department_id.map(Some),
        hire_date: body.hire_date,
    };
    Ok(Json(state.employees.update(id, patch).await?))
}

async fn handle_delete_employee(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.employees.remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_create_time_entry(
    State(state): State<AppState>,
    Json(body): Json<CreateTimeEntryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let entry = state
        .time_entries
        .log(TimeEntryDraft {
            employee_id: body.employee_id,
            date: Some(body.date),
            hours: Some(body.hours),
            description: body.description,
            billable: body.billable.unwrap_or(false),
            matter_code: body.matter_code,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn handle_list_time_entries(
    State(state): State<AppState>,
    Query(query): Query<TimeEntryListQuery>,
) -> Result<Json<TimeEntryListResponse>, AppError> {
    let (page, limit) = page_params(query.page, query.limit);
    let filter = TimeEntryFilter {
        employee_id: query.employee_id,
        start: query.start_date,
        end: query.end_date,
        billable: query.billable,
        offset: ((page - 1) * limit) as usize,
        limit: limit as usize,
    };
    let (time_entries, total) = state.time_entries.list(&filter).await?;
    Ok(Json(TimeEntryListResponse {
        time_entries,
        pagination: Pagination::new(page, limit, total),
    }))
}

async fn handle_get_time_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TimeEntry>, AppError> {
    Ok(Json(state.time_entries.get(id).await?))
}

async fn handle_update_time_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateTimeEntryRequest>,
) -> Result<Json<TimeEntry>, AppError> {
    let patch = TimeEntryPatch {
        date: body.date,
        hours: body.hours,
        description: body.description,
        billable: body.billable,
        matter_code: body.matter_code.map(Some),
    };
    Ok(Json(state.time_entries.update(id, patch).await?))
}

async fn handle_delete_time_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.time_entries.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_list_departments(
    State(state): State<AppState>,
) -> Result<Json<Vec<Department>>, AppError> {
    Ok(Json(state.departments.list().await?))
}

async fn handle_create_department(
    State(state): State<AppState>,
    Json(body): Json<CreateDepartmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let department = state.departments.create(&body.name, body.description).await?;
    Ok((StatusCode::CREATED, Json(department)))
}

async fn handle_get_department(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Department>, AppError> {
    Ok(Json(state.departments.get(id).await?))
}

async fn handle_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<Summary>, AppError> {
    let scope = match query.scope.as_deref().unwrap_or("firm") {
        "firm" => SummaryScope::Firm,
        "department" => SummaryScope::Department(query.id.ok_or_else(|| {
            AppError::BadRequest("scope=department requires an id".to_string())
        })?),
        "employee" => SummaryScope::Employee(query.id.ok_or_else(|| {
            AppError::BadRequest("scope=employee requires an id".to_string())
        })?),
        other => {
            return Err(AppError::BadRequest(format!(
                "unknown scope {other:?}; expected firm, department or employee"
            )))
        }
    };

    let today = Utc::now().date_naive();
    let start = query
        .start_date
        .unwrap_or_else(|| today.with_day(1).unwrap_or(today));
    let end = query.end_date.unwrap_or(today);
    let range = DateRange::new(start, end).map_err(AppError::Aggregation)?;

    Ok(Json(state.engine.summarize(scope, range).await?))
}

fn parse_import_kind(raw: &str) -> Option<ImportKind> {
    match raw {
        "employees" => Some(ImportKind::EmployeeImport),
        "time-entries" | "time_entries" => Some(ImportKind::TimeEntryImport),
        _ => None,
    }
}

async fn handle_submit_employee_import(
    State(state): State<AppState>,
    body: String,
) -> impl IntoResponse {
    let job = state.imports.submit(body, ImportKind::EmployeeImport).await;
    (StatusCode::ACCEPTED, Json(job))
}

async fn handle_submit_time_entry_import(
    State(state): State<AppState>,
    body: String,
) -> impl IntoResponse {
    let job = state.imports.submit(body, ImportKind::TimeEntryImport).await;
    (StatusCode::ACCEPTED, Json(job))
}

async fn handle_get_import(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ImportJob>, AppError> {
    state
        .imports
        .get_status(id)
        .map(Json)
        .ok_or_else(|| AppError::Service(ServiceError::JobNotFound(id)))
}

async fn handle_list_imports(
    State(state): State<AppState>,
    Query(query): Query<ImportListQuery>,
) -> Result<Json<Vec<ImportJob>>, AppError> {
    Ok(Json(state.imports.list_jobs(query.limit.unwrap_or(50).clamp(1, 200))))
}

async fn handle_import_template(Path(kind): Path<String>) -> Result<impl IntoResponse, AppError> {
    let kind = parse_import_kind(&kind).ok_or_else(|| {
        AppError::BadRequest(format!(
            "unknown import kind {kind:?}; expected employees or time-entries"
        ))
    })?;
    Ok(([(header::CONTENT_TYPE, "text/csv")], csv_template(kind)))
}

fn router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/employees",
            get(handle_list_employees).post(handle_create_employee),
        )
        .route("/employees/search", get(handle_search_employees))
        .route(
            "/employees/{id}",
            get(handle_get_employee)
                .put(handle_update_employee)
                .delete(handle_delete_employee),
        )
        .route(
            "/time-entries",
            get(handle_list_time_entries).post(handle_create_time_entry),
        )
        .route(
            "/time-entries/{id}",
            get(handle_get_time_entry)
                .put(handle_update_time_entry)
                .delete(handle_delete_time_entry),
        )
        .route(
            "/departments",
            get(handle_list_departments).post(handle_create_department),
        )
        .route("/departments/{id}", get(handle_get_department))
        .route("/reports/summary", get(handle_summary))
        .route("/imports", get(handle_list_imports))
        .route("/imports/templates/{kind}", get(handle_import_template))
        .route("/imports/employees", post(handle_submit_employee_import))
        .route(
            "/imports/time-entries",
            post(handle_submit_time_entry_import),
        )
        .route("/imports/{id}", get(handle_get_import));

    Router::new()
        .nest("/api", api)
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let host = args.host.unwrap_or_else(|| config.server_host.clone());
    let port = args.port.unwrap_or(config.server_port);

    let store: Arc<dyn DataStore> = Arc::new(MemoryStore::new());

    let index: Arc<dyn SearchIndex> = match &config.search_index_url {
        Some(raw) => {
            let base = Url::parse(raw).context("WORKLENS_SEARCH_INDEX_URL is not a valid URL")?;
            info!(url = %base, "using remote search index");
            Arc::new(HttpIndex::new(base))
        }
        None => {
            info!("using in-process search index");
            Arc::new(MemoryIndex::new())
        }
    };

    let notifier: Arc<dyn ImportNotifier> = match &config.slack_webhook_url {
        Some(raw) => {
            let url = Url::parse(raw).context("WORKLENS_SLACK_WEBHOOK_URL is not a valid URL")?;
            info!("Slack notifications enabled");
            Arc::new(SlackNotifier::new(url))
        }
        None => Arc::new(LogNotifier),
    };

    let locks = Arc::new(EmployeeLocks::new());
    let registry = Arc::new(JobRegistry::new());
    let employees = Arc::new(EmployeeService::new(Arc::clone(&store), Arc::clone(&index)));
    let time_entries = Arc::new(TimeEntryService::new(Arc::clone(&store), Arc::clone(&locks)));
    let departments = Arc::new(DepartmentService::new(Arc::clone(&store)));
    let engine = Arc::new(AggregationEngine::new(
        Arc::clone(&store),
        config.include_removed_in_reports,
    ));

    let (imports, queue) = ImportService::new(
        Arc::clone(&registry),
        Arc::clone(&employees),
        Arc::clone(&time_entries),
        Arc::clone(&departments),
        Arc::clone(&store),
        notifier,
    );
    spawn_workers(Arc::clone(&imports), queue, config.import_workers);
    info!(workers = config.import_workers, "import pipeline ready");

    let state = AppState {
        employees,
        time_entries,
        departments,
        imports,
        engine,
    };

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid bind address {host}:{port}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on http://{addr}");
    axum::serve(listener, router(state))
        .await
        .context("server error")?;

    Ok(())
}
