// src/store.rs
//
// Persistence collaborator. The service and import layers only ever see the
// `DataStore` trait; `MemoryStore` is the in-process implementation backing
// the server and the test suites. Soft-deleted employees stay in the store
// and are filtered at this boundary, not by callers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Department, Employee, TimeEntry};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("email already registered: {0}")]
    EmailExists(String),
    #[error("department name already exists: {0}")]
    DepartmentExists(String),
    #[error("no such record: {0}")]
    Missing(Uuid),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Default)]
pub struct EmployeeFilter {
    pub department_id: Option<Uuid>,
    /// Case-insensitive substring match on name, email or position.
    pub search: Option<String>,
    pub include_removed: bool,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TimeEntryFilter {
    pub employee_id: Option<Uuid>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub billable: Option<bool>,
    pub offset: usize,
    pub limit: usize,
}

#[async_trait]
pub trait DataStore: Send + Sync {
    /// Fetches an employee by id, soft-deleted ones included; callers that
    /// only want active records check the `removed` flag.
    async fn get_employee(&self, id: Uuid) -> Result<Option<Employee>, StoreError>;
    /// Case-insensitive lookup among ACTIVE employees only.
    async fn find_employee_by_email(&self, email: &str) -> Result<Option<Employee>, StoreError>;
    /// Filtered page plus the total match count (for pagination metadata).
    async fn list_employees(
        &self,
        filter: &EmployeeFilter,
    ) -> Result<(Vec<Employee>, usize), StoreError>;
    async fn all_employees(&self, include_removed: bool) -> Result<Vec<Employee>, StoreError>;
    async fn save_employee(&self, employee: &Employee) -> Result<(), StoreError>;
    async fn update_employee(&self, employee: &Employee) -> Result<(), StoreError>;
    /// Flags the employee as removed; their time entries are untouched.
    async fn soft_delete_employee(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn get_time_entry(&self, id: Uuid) -> Result<Option<TimeEntry>, StoreError>;
    async fn time_entries_for_day(
        &self,
        employee_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TimeEntry>, StoreError>;
    async fn time_entries_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TimeEntry>, StoreError>;
    async fn list_time_entries(
        &self,
        filter: &TimeEntryFilter,
    ) -> Result<(Vec<TimeEntry>, usize), StoreError>;
    async fn save_time_entry(&self, entry: &TimeEntry) -> Result<(), StoreError>;
    async fn update_time_entry(&self, entry: &TimeEntry) -> Result<(), StoreError>;
    async fn delete_time_entry(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn get_department(&self, id: Uuid) -> Result<Option<Department>, StoreError>;
    async fn find_department_by_name(&self, name: &str)
        -> Result<Option<Department>, StoreError>;
    async fn list_departments(&self) -> Result<Vec<Department>, StoreError>;
    async fn save_department(&self, department: &Department) -> Result<(), StoreError>;
}

/// In-memory store backed by mutex-guarded maps. Uniqueness constraints
/// (employee email, department name) are re-checked here under the lock, so
/// two concurrent writers cannot both pass a stale pre-check.
pub struct MemoryStore {
    employees: Mutex<HashMap<Uuid, Employee>>,
    time_entries: Mutex<HashMap<Uuid, TimeEntry>>,
    departments: Mutex<HashMap<Uuid, Department>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            employees: Mutex::new(HashMap::new()),
            time_entries: Mutex::new(HashMap::new()),
            departments: Mutex::new(HashMap::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent write fail with `StoreError::Unavailable`.
    /// Test hook for the infrastructure-fault paths.
    pub fn set_write_failures(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn get_employee(&self, id: Uuid) -> Result<Option<Employee>, StoreError> {
        Ok(self.employees.lock().unwrap().get(&id).cloned())
    }

    async fn find_employee_by_email(&self, email: &str) -> Result<Option<Employee>, StoreError> {
        let email = email.to_lowercase();
        Ok(self
            .employees
            .lock()
            .unwrap()
            .values()
            .find(|e| !e.removed && e.email == email)
            .cloned())
    }

    async fn list_employees(
        &self,
        filter: &EmployeeFilter,
    ) -> Result<(Vec<Employee>, usize), StoreError> {
        let employees = self.employees.lock().unwrap();
        let needle = filter.search.as_deref().map(str::to_lowercase);
        let mut matches: Vec<Employee> = employees
            .values()
            .filter(|e| filter.include_removed || !e.removed)
            .filter(|e| filter.department_id.map_or(true, |d| e.department_id == Some(d)))
            .filter(|e| match &needle {
                None => true,
                Some(q) => {
                    e.name.to_lowercase().contains(q)
                        || e.email.contains(q)
                        || e.position
                            .as_deref()
                            .map_or(false, |p| p.to_lowercase().contains(q))
                }
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.email.cmp(&b.email)));
        let total = matches.len();
        let page: Vec<Employee> = matches
            .into_iter()
            .skip(filter.offset)
            .take(if filter.limit == 0 { usize::MAX } else { filter.limit })
            .collect();
        Ok((page, total))
    }

    async fn all_employees(&self, include_removed: bool) -> Result<Vec<Employee>, StoreError> {
        Ok(self
            .employees
            .lock()
            .unwrap()
            .values()
            .filter(|e| include_removed || !e.removed)
            .cloned()
            .collect())
    }

    async fn save_employee(&self, employee: &Employee) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut employees = self.employees.lock().unwrap();
        let collision = employees
            .values()
            .any(|e| !e.removed && e.id != employee.id && e.email == employee.email);
        if collision {
            return Err(StoreError::EmailExists(employee.email.clone()));
        }
        employees.insert(employee.id, employee.clone());
        Ok(())
    }

    async fn update_employee(&self, employee: &Employee) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut employees = self.employees.lock().unwrap();
        if !employees.contains_key(&employee.id) {
            return Err(StoreError::Missing(employee.id));
        }
        let collision = employees
            .values()
            .any(|e| !e.removed && e.id != employee.id && e.email == employee.email);
        if collision {
            return Err(StoreError::EmailExists(employee.email.clone()));
        }
        employees.insert(employee.id, employee.clone());
        Ok(())
    }

    async fn soft_delete_employee(&self, id: Uuid) -> Result<bool, StoreError> {
        self.check_writable()?;
        let mut employees = self.employees.lock().unwrap();
        match employees.get_mut(&id) {
            Some(e) if !e.removed => {
                e.removed = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_time_entry(&self, id: Uuid) -> Result<Option<TimeEntry>, StoreError> {
        Ok(self.time_entries.lock().unwrap().get(&id).cloned())
    }

    async fn time_entries_for_day(
        &self,
        employee_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TimeEntry>, StoreError> {
        Ok(self
            .time_entries
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.employee_id == employee_id && t.date == date)
            .cloned()
            .collect())
    }

    async fn time_entries_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TimeEntry>, StoreError> {
        Ok(self
            .time_entries
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.date >= start && t.date <= end)
            .cloned()
            .collect())
    }

    async fn list_time_entries(
        &self,
        filter: &TimeEntryFilter,
    ) -> Result<(Vec<TimeEntry>, usize), StoreError> {
        let entries = self.time_entries.lock().unwrap();
        let mut matches: Vec<TimeEntry> = entries
            .values()
            .filter(|t| filter.employee_id.map_or(true, |id| t.employee_id == id))
            .filter(|t| filter.start.map_or(true, |s| t.date >= s))
            .filter(|t| filter.end.map_or(true, |e| t.date <= e))
            .filter(|t| filter.billable.map_or(true, |b| t.billable == b))
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        let total = matches.len();
        let page: Vec<TimeEntry> = matches
            .into_iter()
            .skip(filter.offset)
            .take(if filter.limit == 0 { usize::MAX } else { filter.limit })
            .collect();
        Ok((page, total))
    }

    async fn save_time_entry(&self, entry: &TimeEntry) -> Result<(), StoreError> {
        self.check_writable()?;
        self.time_entries
            .lock()
            .unwrap()
            .insert(entry.id, entry.clone());
        Ok(())
    }

    async fn update_time_entry(&self, entry: &TimeEntry) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut entries = self.time_entries.lock().unwrap();
        if !entries.contains_key(&entry.id) {
            return Err(StoreError::Missing(entry.id));
        }
        entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn delete_time_entry(&self, id: Uuid) -> Result<bool, StoreError> {
        self.check_writable()?;
        Ok(self.time_entries.lock().unwrap().remove(&id).is_some())
    }

    async fn get_department(&self, id: Uuid) -> Result<Option<Department>, StoreError> {
        Ok(self.departments.lock().unwrap().get(&id).cloned())
    }

    async fn find_department_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Department>, StoreError> {
        Ok(self
            .departments
            .lock()
            .unwrap()
            .values()
            .find(|d| d.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn list_departments(&self) -> Result<Vec<Department>, StoreError> {
        let mut departments: Vec<Department> =
            self.departments.lock().unwrap().values().cloned().collect();
        departments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(departments)
    }

    async fn save_department(&self, department: &Department) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut departments = self.departments.lock().unwrap();
        let collision = departments
            .values()
            .any(|d| d.id != department.id && d.name.eq_ignore_ascii_case(&department.name));
        if collision {
            return Err(StoreError::DepartmentExists(department.name.clone()));
        }
        departments.insert(department.id, department.clone());
        Ok(())
    }
}
