// src/time_entries.rs
//
// Direct time-entry logging. The daily 24-hour cap is check-then-write, so
// every mutation for an employee runs under that employee's advisory lock;
// the import pipeline shares the same `EmployeeLocks` instance, which is
// what keeps concurrent bulk jobs and API writes from jointly overshooting
// the cap.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex as TokioMutex, OwnedMutexGuard};
use tracing::info;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::TimeEntry;
use crate::store::{DataStore, TimeEntryFilter};
use crate::validation::{
    validate_time_entry, EmployeeLookup, TimeEntryContext, TimeEntryDraft,
};

/// Per-employee advisory locks. Lock objects are created on first use and
/// kept for the process lifetime; the registry itself is only locked long
/// enough to clone the entry's Arc.
pub struct EmployeeLocks {
    inner: StdMutex<HashMap<Uuid, Arc<TokioMutex<()>>>>,
}

impl EmployeeLocks {
    pub fn new() -> Self {
        Self {
            inner: StdMutex::new(HashMap::new()),
        }
    }

    pub async fn acquire(&self, employee_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().unwrap();
            Arc::clone(
                locks
                    .entry(employee_id)
                    .or_insert_with(|| Arc::new(TokioMutex::new(()))),
            )
        };
        lock.lock_owned().await
    }
}

impl Default for EmployeeLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TimeEntryPatch {
    pub date: Option<NaiveDate>,
    pub hours: Option<Decimal>,
    pub description: Option<String>,
    pub billable: Option<bool>,
    pub matter_code: Option<Option<String>>,
}

pub struct TimeEntryService {
    store: Arc<dyn DataStore>,
    locks: Arc<EmployeeLocks>,
}

impl TimeEntryService {
    pub fn new(store: Arc<dyn DataStore>, locks: Arc<EmployeeLocks>) -> Self {
        Self { store, locks }
    }

    pub async fn log(&self, draft: TimeEntryDraft) -> Result<TimeEntry, ServiceError> {
        let today = Utc::now().date_naive();
        let employee = self.lookup_employee(draft.employee_id).await?;

        let _guard = self.locks.acquire(draft.employee_id).await;

        let already_logged = match draft.date {
            Some(date) => self.hours_logged(draft.employee_id, date, None).await?,
            None => Decimal::ZERO,
        };

        let accepted = validate_time_entry(
            &draft,
            &TimeEntryContext {
                today,
                employee,
                hours_already_logged: already_logged,
            },
        )
        .map_err(ServiceError::Rejected)?;

        let entry = TimeEntry {
            id: Uuid::new_v4(),
            employee_id: accepted.employee_id,
            date: accepted.date,
            hours: accepted.hours,
            description: accepted.description,
            billable: accepted.billable,
            matter_code: accepted.matter_code,
            created_at: Utc::now(),
        };
        self.store.save_time_entry(&entry).await?;
        info!(
            entry_id = %entry.id,
            employee_id = %entry.employee_id,
            date = %entry.date,
            hours = %entry.hours,
            "time entry logged"
        );
        Ok(entry)
    }

    pub async fn get(&self, id: Uuid) -> Result<TimeEntry, ServiceError> {
        self.store
            .get_time_entry(id)
            .await?
            .ok_or(ServiceError::TimeEntryNotFound(id))
    }

    pub async fn list(
        &self,
        filter: &TimeEntryFilter,
    ) -> Result<(Vec<TimeEntry>, usize), ServiceError> {
        Ok(self.store.list_time_entries(filter).await?)
    }

    pub async fn update(&self, id: Uuid, patch: TimeEntryPatch) -> Result<TimeEntry, ServiceError> {
        let current = self.get(id).await?;
        let employee = self.lookup_employee(current.employee_id).await?;

        let draft = TimeEntryDraft {
            employee_id: current.employee_id,
            date: Some(patch.date.unwrap_or(current.date)),
            hours: Some(patch.hours.unwrap_or(current.hours)),
            description: patch.description.unwrap_or_else(|| current.description.clone()),
            billable: patch.billable.unwrap_or(current.billable),
            matter_code: patch.matter_code.unwrap_or_else(|| current.matter_code.clone()),
        };

        let _guard = self.locks.acquire(current.employee_id).await;

        // The entry being replaced must not count against its own cap.
        let already_logged = self
            .hours_logged(current.employee_id, draft.date.expect("set above"), Some(id))
            .await?;

        let accepted = validate_time_entry(
            &draft,
            &TimeEntryContext {
                today: Utc::now().date_naive(),
                employee,
                hours_already_logged: already_logged,
            },
        )
        .map_err(ServiceError::Rejected)?;

        let updated = TimeEntry {
            id,
            employee_id: accepted.employee_id,
            date: accepted.date,
            hours: accepted.hours,
            description: accepted.description,
            billable: accepted.billable,
            matter_code: accepted.matter_code,
            created_at: current.created_at,
        };
        self.store.update_time_entry(&updated).await?;
        Ok(updated)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        if !self.store.delete_time_entry(id).await? {
            return Err(ServiceError::TimeEntryNotFound(id));
        }
        info!(entry_id = %id, "time entry deleted");
        Ok(())
    }

    async fn lookup_employee(&self, id: Uuid) -> Result<EmployeeLookup, ServiceError> {
        Ok(match self.store.get_employee(id).await? {
            None => EmployeeLookup::Missing,
            Some(e) if e.removed => EmployeeLookup::Removed,
            Some(_) => EmployeeLookup::Active,
        })
    }

    async fn hours_logged(
        &self,
        employee_id: Uuid,
        date: NaiveDate,
        exclude: Option<Uuid>,
    ) -> Result<Decimal, ServiceError> {
        Ok(self
            .store
            .time_entries_for_day(employee_id, date)
            .await?
            .iter()
            .filter(|t| Some(t.id) != exclude)
            .map(|t| t.hours)
            .sum())
    }
}
