// src/aggregation.rs
//
// Read-only reporting over the persisted dataset. For a fixed store state,
// scope and range the output is bit-identical across calls: breakdowns are
// stably sorted and utilization rates are canonically normalized Decimals.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Department, Employee, TimeEntry};
use crate::store::{DataStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryScope {
    Firm,
    Department(Uuid),
    Employee(Uuid),
}

impl SummaryScope {
    fn label(&self) -> &'static str {
        match self {
            SummaryScope::Firm => "firm",
            SummaryScope::Department(_) => "department",
            SummaryScope::Employee(_) => "employee",
        }
    }
}

/// Inclusive date range; construction enforces start <= end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, AggregationError> {
        if start > end {
            return Err(AggregationError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

}

#[derive(Error, Debug)]
pub enum AggregationError {
    #[error("start date {start} is after end date {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
    #[error("unknown employee {0}")]
    UnknownEmployee(Uuid),
    #[error("unknown department {0}")]
    UnknownDepartment(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DepartmentBreakdown {
    pub department_id: Uuid,
    pub name: String,
    pub employee_count: u32,
    pub total_hours: Decimal,
    pub billable_hours: Decimal,
    pub utilization_rate: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EmployeeBreakdown {
    pub employee_id: Uuid,
    pub name: String,
    pub email: String,
    pub total_hours: Decimal,
    pub billable_hours: Decimal,
    pub utilization_rate: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Summary {
    pub scope: &'static str,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_hours: Decimal,
    pub billable_hours: Decimal,
    pub non_billable_hours: Decimal,
    pub entry_count: u32,
    /// billable / total as a fraction in [0, 1]; exactly 0 for an empty scope.
    pub utilization_rate: Decimal,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub departments: Vec<DepartmentBreakdown>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub employees: Vec<EmployeeBreakdown>,
    /// Employees contributing hours in range but carrying no department;
    /// they are left out of the department breakdown and counted here.
    pub unassigned_employee_count: u32,
}

/// Division-safe utilization, canonically normalized so equal rates always
/// compare (and serialize) identically.
pub fn utilization(billable: Decimal, total: Decimal) -> Decimal {
    if total.is_zero() {
        return Decimal::ZERO;
    }
    (billable / total).round_dp(4).normalize()
}

pub struct AggregationEngine {
    store: Arc<dyn DataStore>,
    /// Whether soft-deleted employees' historical hours show up in firm and
    /// department summaries. Employee-scope queries always see them.
    include_removed: bool,
}

impl AggregationEngine {
    pub fn new(store: Arc<dyn DataStore>, include_removed: bool) -> Self {
        Self {
            store,
            include_removed,
        }
    }

    pub async fn summarize(
        &self,
        scope: SummaryScope,
        range: DateRange,
    ) -> Result<Summary, AggregationError> {
        let employees = self.store.all_employees(true).await?;
        let by_id: HashMap<Uuid, &Employee> = employees.iter().map(|e| (e.id, e)).collect();
        let departments = self.store.list_departments().await?;
        let entries = self.store.time_entries_between(range.start, range.end).await?;

        // Resolve scope membership up front so unknown ids surface as
        // errors instead of empty summaries.
        let included: Vec<&TimeEntry> = match scope {
            SummaryScope::Firm => entries
                .iter()
                .filter(|t| self.entry_visible(t, &by_id))
                .collect(),
            SummaryScope::Department(dept_id) => {
                if !departments.iter().any(|d| d.id == dept_id) {
                    return Err(AggregationError::UnknownDepartment(dept_id));
                }
                entries
                    .iter()
                    .filter(|t| self.entry_visible(t, &by_id))
                    .filter(|t| {
                        by_id
                            .get(&t.employee_id)
                            .map_or(false, |e| e.department_id == Some(dept_id))
                    })
                    .collect()
            }
            SummaryScope::Employee(employee_id) => {
                if !by_id.contains_key(&employee_id) {
                    return Err(AggregationError::UnknownEmployee(employee_id));
                }
                entries
                    .iter()
                    .filter(|t| t.employee_id == employee_id)
                    .collect()
            }
        };

        let total_hours: Decimal = included.iter().map(|t| t.hours).sum();
        let billable_hours: Decimal = included
            .iter()
            .filter(|t| t.billable)
            .map(|t| t.hours)
            .sum();

        let mut summary = Summary {
            scope: scope.label(),
            start_date: range.start,
            end_date: range.end,
            total_hours,
            billable_hours,
            non_billable_hours: total_hours - billable_hours,
            entry_count: included.len() as u32,
            utilization_rate: utilization(billable_hours, total_hours),
            departments: Vec::new(),
            employees: Vec::new(),
            unassigned_employee_count: 0,
        };

        match scope {
            SummaryScope::Firm => {
                let (breakdown, unassigned) =
                    self.department_breakdown(&included, &by_id, &departments);
                summary.departments = breakdown;
                summary.unassigned_employee_count = unassigned;
            }
            SummaryScope::Department(_) => {
                summary.employees = Self::employee_breakdown(&included, &by_id);
            }
            SummaryScope::Employee(_) => {}
        }

        Ok(summary)
    }

    fn entry_visible(&self, entry: &TimeEntry, by_id: &HashMap<Uuid, &Employee>) -> bool {
        match by_id.get(&entry.employee_id) {
            Some(owner) => self.include_removed || !owner.removed,
            // Orphaned entries cannot happen through the services, but an
            // aggregate must not panic on one.
            None => false,
        }
    }

    fn department_breakdown(
        &self,
        entries: &[&TimeEntry],
        by_id: &HashMap<Uuid, &Employee>,
        departments: &[Department],
    ) -> (Vec<DepartmentBreakdown>, u32) {
        let mut per_dept: HashMap<Uuid, (Decimal, Decimal)> = HashMap::new();
        let mut unassigned: Vec<Uuid> = Vec::new();

        for entry in entries {
            let Some(owner) = by_id.get(&entry.employee_id) else {
                continue;
            };
            match owner.department_id {
                Some(dept_id) => {
                    let slot = per_dept.entry(dept_id).or_insert((Decimal::ZERO, Decimal::ZERO));
                    slot.0 += entry.hours;
                    if entry.billable {
                        slot.1 += entry.hours;
                    }
                }
                None => {
                    if !unassigned.contains(&owner.id) {
                        unassigned.push(owner.id);
                    }
                }
            }
        }

        let mut breakdown: Vec<DepartmentBreakdown> = departments
            .iter()
            .filter_map(|dept| {
                let (total, billable) = per_dept.get(&dept.id).copied()?;
                let headcount = by_id
                    .values()
                    .filter(|e| {
                        e.department_id == Some(dept.id) && (self.include_removed || !e.removed)
                    })
                    .count() as u32;
                Some(DepartmentBreakdown {
                    department_id: dept.id,
                    name: dept.name.clone(),
                    employee_count: headcount,
                    total_hours: total,
                    billable_hours: billable,
                    utilization_rate: utilization(billable, total),
                })
            })
            .collect();
        breakdown.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.department_id.cmp(&b.department_id)));

        (breakdown, unassigned.len() as u32)
    }

    fn employee_breakdown(
        entries: &[&TimeEntry],
        by_id: &HashMap<Uuid, &Employee>,
    ) -> Vec<EmployeeBreakdown> {
        let mut per_employee: HashMap<Uuid, (Decimal, Decimal)> = HashMap::new();
        for entry in entries {
            let slot = per_employee
                .entry(entry.employee_id)
                .or_insert((Decimal::ZERO, Decimal::ZERO));
            slot.0 += entry.hours;
            if entry.billable {
                slot.1 += entry.hours;
            }
        }

        let mut breakdown: Vec<EmployeeBreakdown> = per_employee
            .into_iter()
            .filter_map(|(employee_id, (total, billable))| {
                let employee = by_id.get(&employee_id)?;
                Some(EmployeeBreakdown {
                    employee_id,
                    name: employee.name.clone(),
                    email: employee.email.clone(),
                    total_hours: total,
                    billable_hours: billable,
                    utilization_rate: utilization(billable, total),
                })
            })
            .collect();
        breakdown.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.email.cmp(&b.email)));
        breakdown
    }
}
