// src/store_tests.rs

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use crate::departments::DepartmentService;
    use crate::employees::{EmployeePatch, EmployeeService};
    use crate::error::ServiceError;
    use crate::search::MemoryIndex;
    use crate::store::{DataStore, EmployeeFilter, MemoryStore, StoreError, TimeEntryFilter};
    use crate::time_entries::{EmployeeLocks, TimeEntryService};
    use crate::validation::{codes, EmployeeDraft, TimeEntryDraft, ViolationKind};

    fn d(date_str: &str) -> NaiveDate {
        NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .unwrap_or_else(|_| panic!("Invalid date string format: {}", date_str))
    }

    struct Services {
        store: Arc<MemoryStore>,
        employees: EmployeeService,
        time_entries: TimeEntryService,
        departments: DepartmentService,
    }

    fn services() -> Services {
        let store = Arc::new(MemoryStore::new());
        let index = Arc::new(MemoryIndex::new());
        let locks = Arc::new(EmployeeLocks::new());
        Services {
            employees: EmployeeService::new(
                Arc::clone(&store) as Arc<dyn DataStore>,
                index,
            ),
            time_entries: TimeEntryService::new(Arc::clone(&store) as Arc<dyn DataStore>, locks),
            departments: DepartmentService::new(Arc::clone(&store) as Arc<dyn DataStore>),
            store,
        }
    }

    fn draft(name: &str, email: &str) -> EmployeeDraft {
        EmployeeDraft {
            name: name.to_string(),
            email: email.to_string(),
            position: Some("Attorney".to_string()),
            department_id: None,
            hire_date: Some(d("2023-01-15")),
        }
    }

    fn entry_draft(employee_id: Uuid, date: &str, hours: rust_decimal::Decimal) -> TimeEntryDraft {
        TimeEntryDraft {
            employee_id,
            date: Some(d(date)),
            hours: Some(hours),
            description: "regular client work session".to_string(),
            billable: true,
            matter_code: None,
        }
    }

    #[tokio::test]
    async fn employee_creation_normalizes_and_enforces_unique_email() {
        let svc = services();
        let created = svc
            .employees
            .create(draft("Alice Chen", "  Alice@Firm.Test "))
            .await
            .unwrap();
        assert_eq!(created.email, "alice@firm.test");

        let err = svc
            .employees
            .create(draft("Another Person", "ALICE@firm.test"))
            .await
            .unwrap_err();
        match err {
            ServiceError::Rejected(violations) => {
                assert_eq!(violations[0].reason.code(), codes::EMAIL_ALREADY_EXISTS);
                assert_eq!(violations[0].reason.kind(), ViolationKind::Conflict);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn store_level_uniqueness_backstops_racy_prechecks() {
        let store = MemoryStore::new();
        let mut first = crate::models::Employee {
            id: Uuid::new_v4(),
            name: "Alice Chen".to_string(),
            email: "alice@firm.test".to_string(),
            position: None,
            department_id: None,
            hire_date: None,
            removed: false,
            created_at: chrono::Utc::now(),
        };
        store.save_employee(&first).await.unwrap();

        let mut clone = first.clone();
        clone.id = Uuid::new_v4();
        assert!(matches!(
            store.save_employee(&clone).await,
            Err(StoreError::EmailExists(_))
        ));

        // Re-saving the same record (an update) is not a collision.
        first.name = "Alice B Chen".to_string();
        store.save_employee(&first).await.unwrap();
    }

    #[tokio::test]
    async fn soft_deleted_employees_keep_history_but_leave_listings() {
        let svc = services();
        let employee = svc
            .employees
            .create(draft("Alice Chen", "alice@firm.test"))
            .await
            .unwrap();
        svc.time_entries
            .log(entry_draft(employee.id, "2024-01-10", dec!(8.00)))
            .await
            .unwrap();

        svc.employees.remove(employee.id).await.unwrap();

        // Gone from active lookups...
        assert!(matches!(
            svc.employees.get(employee.id).await,
            Err(ServiceError::EmployeeNotFound(_))
        ));
        assert!(svc
            .store
            .find_employee_by_email("alice@firm.test")
            .await
            .unwrap()
            .is_none());
        let (listed, total) = svc
            .employees
            .list(&EmployeeFilter::default())
            .await
            .unwrap();
        assert!(listed.is_empty());
        assert_eq!(total, 0);

        // ...but the record and its time entries survive.
        let raw = svc.store.get_employee(employee.id).await.unwrap().unwrap();
        assert!(raw.removed);
        let day = svc
            .store
            .time_entries_for_day(employee.id, d("2024-01-10"))
            .await
            .unwrap();
        assert_eq!(day.len(), 1);

        // And their email can be reused by a new hire.
        svc.employees
            .create(draft("New Alice", "alice@firm.test"))
            .await
            .expect("email is free again");
    }

    #[tokio::test]
    async fn logging_against_a_removed_employee_is_rejected() {
        let svc = services();
        let employee = svc
            .employees
            .create(draft("Alice Chen", "alice@firm.test"))
            .await
            .unwrap();
        svc.employees.remove(employee.id).await.unwrap();

        let err = svc
            .time_entries
            .log(entry_draft(employee.id, "2024-01-10", dec!(1.00)))
            .await
            .unwrap_err();
        match err {
            ServiceError::Rejected(violations) => {
                assert_eq!(violations[0].reason.code(), codes::EMPLOYEE_REMOVED);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn direct_logging_respects_the_daily_cap_against_persisted_state() {
        let svc = services();
        let employee = svc
            .employees
            .create(draft("Alice Chen", "alice@firm.test"))
            .await
            .unwrap();
        svc.time_entries
            .log(entry_draft(employee.id, "2024-01-10", dec!(20.00)))
            .await
            .unwrap();

        let err = svc
            .time_entries
            .log(entry_draft(employee.id, "2024-01-10", dec!(5.00)))
            .await
            .unwrap_err();
        match err {
            ServiceError::Rejected(violations) => {
                assert_eq!(violations[0].reason.code(), codes::DAILY_CAP_EXCEEDED);
            }
            other => panic!("expected rejection, got {:?}", other),
        }

        svc.time_entries
            .log(entry_draft(employee.id, "2024-01-10", dec!(3.00)))
            .await
            .expect("20 + 3 fits under the cap");
    }

    #[tokio::test]
    async fn updating_an_entry_does_not_count_it_against_its_own_cap() {
        let svc = services();
        let employee = svc
            .employees
            .create(draft("Alice Chen", "alice@firm.test"))
            .await
            .unwrap();
        let entry = svc
            .time_entries
            .log(entry_draft(employee.id, "2024-01-10", dec!(20.00)))
            .await
            .unwrap();

        // 20 -> 23 would breach the cap if the old value were still counted.
        let updated = svc
            .time_entries
            .update(
                entry.id,
                crate::time_entries::TimeEntryPatch {
                    hours: Some(dec!(23.00)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.hours, dec!(23.00));

        let err = svc
            .time_entries
            .update(
                entry.id,
                crate::time_entries::TimeEntryPatch {
                    hours: Some(dec!(24.50)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Rejected(_)));
    }

    #[tokio::test]
    async fn employee_updates_are_validated_like_creates() {
        let svc = services();
        let alice = svc
            .employees
            .create(draft("Alice Chen", "alice@firm.test"))
            .await
            .unwrap();
        svc.employees
            .create(draft("Bob Diaz", "bob@firm.test"))
            .await
            .unwrap();

        // Taking Bob's email is a conflict.
        let err = svc
            .employees
            .update(
                alice.id,
                EmployeePatch {
                    email: Some("bob@firm.test".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Rejected(_)));

        // Keeping her own email while renaming is fine.
        let renamed = svc
            .employees
            .update(
                alice.id,
                EmployeePatch {
                    name: Some("Alice B. Chen".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "Alice B. Chen");
        assert_eq!(renamed.email, "alice@firm.test");
    }

    #[tokio::test]
    async fn employee_search_hits_the_index_after_writes() {
        let svc = services();
        svc.employees
            .create(draft("Alice Chen", "alice@firm.test"))
            .await
            .unwrap();

        // Index upserts run in the background of the write; poll briefly.
        let mut hits = Vec::new();
        for _ in 0..50 {
            hits = svc.employees.search("alice", 10).await.unwrap();
            if !hits.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].email, "alice@firm.test");

        // Sub-two-character queries are not forwarded to the index.
        assert!(svc.employees.search("a", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_filters_and_paginates() {
        let svc = services();
        let dept = svc.departments.create("Litigation", None).await.unwrap();
        for (name, email) in [
            ("Alice Chen", "alice@firm.test"),
            ("Bob Diaz", "bob@firm.test"),
            ("Carol Evans", "carol@firm.test"),
        ] {
            let mut d = draft(name, email);
            d.department_id = Some(dept.id);
            svc.employees.create(d).await.unwrap();
        }

        let (page, total) = svc
            .employees
            .list(&EmployeeFilter {
                limit: 2,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].name, "Alice Chen");

        let (second_page, _) = svc
            .employees
            .list(&EmployeeFilter {
                offset: 2,
                limit: 2,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].name, "Carol Evans");

        let (found, _) = svc
            .employees
            .list(&EmployeeFilter {
                search: Some("bob".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].email, "bob@firm.test");
    }

    #[tokio::test]
    async fn time_entry_listing_filters_by_range_and_billable() {
        let svc = services();
        let employee = svc
            .employees
            .create(draft("Alice Chen", "alice@firm.test"))
            .await
            .unwrap();
        svc.time_entries
            .log(entry_draft(employee.id, "2024-01-10", dec!(8.00)))
            .await
            .unwrap();
        let mut non_billable = entry_draft(employee.id, "2024-01-20", dec!(4.00));
        non_billable.billable = false;
        svc.time_entries.log(non_billable).await.unwrap();

        let (in_window, total) = svc
            .time_entries
            .list(&TimeEntryFilter {
                start: Some(d("2024-01-01")),
                end: Some(d("2024-01-15")),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(in_window[0].date, d("2024-01-10"));

        let (billable_only, _) = svc
            .time_entries
            .list(&TimeEntryFilter {
                billable: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(billable_only.len(), 1);
        assert!(billable_only[0].billable);
    }

    #[tokio::test]
    async fn departments_are_unique_and_get_or_create_is_idempotent() {
        let svc = services();
        let first = svc.departments.create("Litigation", None).await.unwrap();

        let err = svc.departments.create("litigation", None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Rejected(_)));

        let resolved = svc.departments.get_or_create("Litigation").await.unwrap();
        assert_eq!(resolved.id, first.id);

        let fresh = svc.departments.get_or_create("Tax Advisory").await.unwrap();
        assert_ne!(fresh.id, first.id);
        assert_eq!(svc.departments.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn injected_write_failures_surface_as_unavailable() {
        let svc = services();
        svc.store.set_write_failures(true);
        let err = svc
            .employees
            .create(draft("Alice Chen", "alice@firm.test"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Store(StoreError::Unavailable(_))
        ));
    }
}
