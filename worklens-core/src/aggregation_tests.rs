// src/aggregation_tests.rs

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use crate::aggregation::*;
    use crate::models::{Department, Employee, TimeEntry};
    use crate::store::{DataStore, MemoryStore};

    fn d(date_str: &str) -> NaiveDate {
        NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .unwrap_or_else(|_| panic!("Invalid date string format: {}", date_str))
    }

    fn range(start: &str, end: &str) -> DateRange {
        DateRange::new(d(start), d(end)).expect("valid range")
    }

    fn department(name: &str) -> Department {
        Department {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            created_at: Utc::now(),
        }
    }

    fn employee(name: &str, email: &str, department_id: Option<Uuid>) -> Employee {
        Employee {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            position: None,
            department_id,
            hire_date: Some(d("2023-01-15")),
            removed: false,
            created_at: Utc::now(),
        }
    }

    fn entry(employee_id: Uuid, date: &str, hours: Decimal, billable: bool) -> TimeEntry {
        TimeEntry {
            id: Uuid::new_v4(),
            employee_id,
            date: d(date),
            hours,
            description: "recorded work for the test dataset".to_string(),
            billable,
            matter_code: None,
            created_at: Utc::now(),
        }
    }

    async fn seed(store: &MemoryStore) -> (Department, Department, Employee, Employee, Employee) {
        let litigation = department("Litigation");
        let corporate = department("Corporate Law");
        store.save_department(&litigation).await.unwrap();
        store.save_department(&corporate).await.unwrap();

        let alice = employee("Alice Chen", "alice@firm.test", Some(corporate.id));
        let bob = employee("Bob Diaz", "bob@firm.test", Some(litigation.id));
        let carol = employee("Carol Evans", "carol@firm.test", None);
        store.save_employee(&alice).await.unwrap();
        store.save_employee(&bob).await.unwrap();
        store.save_employee(&carol).await.unwrap();

        (litigation, corporate, alice, bob, carol)
    }

    #[tokio::test]
    async fn firm_utilization_matches_the_textbook_dataset() {
        // 100.00 total hours of which 60.00 billable => utilization 0.6.
        let store = Arc::new(MemoryStore::new());
        let (_, _, alice, bob, _) = seed(&store).await;
        for _ in 0..6 {
            store
                .save_time_entry(&entry(alice.id, "2024-01-10", dec!(10.00), true))
                .await
                .unwrap();
        }
        for _ in 0..4 {
            store
                .save_time_entry(&entry(bob.id, "2024-01-12", dec!(10.00), false))
                .await
                .unwrap();
        }

        let engine = AggregationEngine::new(store, true);
        let summary = engine
            .summarize(SummaryScope::Firm, range("2024-01-01", "2024-01-31"))
            .await
            .unwrap();

        assert_eq!(summary.total_hours, dec!(100.00));
        assert_eq!(summary.billable_hours, dec!(60.00));
        assert_eq!(summary.non_billable_hours, dec!(40.00));
        assert_eq!(summary.utilization_rate, dec!(0.6));
        assert_eq!(summary.entry_count, 10);
    }

    #[tokio::test]
    async fn empty_scope_has_zero_utilization_without_faulting() {
        let store = Arc::new(MemoryStore::new());
        seed(&store).await;

        let engine = AggregationEngine::new(store, true);
        let summary = engine
            .summarize(SummaryScope::Firm, range("2024-01-01", "2024-01-31"))
            .await
            .unwrap();

        assert_eq!(summary.total_hours, Decimal::ZERO);
        assert_eq!(summary.utilization_rate, Decimal::ZERO);
    }

    #[tokio::test]
    async fn summarize_is_deterministic_for_fixed_state() {
        let store = Arc::new(MemoryStore::new());
        let (_, _, alice, bob, carol) = seed(&store).await;
        store
            .save_time_entry(&entry(alice.id, "2024-01-10", dec!(7.50), true))
            .await
            .unwrap();
        store
            .save_time_entry(&entry(bob.id, "2024-01-11", dec!(3.25), false))
            .await
            .unwrap();
        store
            .save_time_entry(&entry(carol.id, "2024-01-12", dec!(4.00), true))
            .await
            .unwrap();

        let engine = AggregationEngine::new(store, true);
        let first = engine
            .summarize(SummaryScope::Firm, range("2024-01-01", "2024-01-31"))
            .await
            .unwrap();
        let second = engine
            .summarize(SummaryScope::Firm, range("2024-01-01", "2024-01-31"))
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn firm_breakdown_is_sorted_and_counts_unassigned() {
        let store = Arc::new(MemoryStore::new());
        let (litigation, corporate, alice, bob, carol) = seed(&store).await;
        store
            .save_time_entry(&entry(alice.id, "2024-01-10", dec!(8.00), true))
            .await
            .unwrap();
        store
            .save_time_entry(&entry(bob.id, "2024-01-10", dec!(6.00), false))
            .await
            .unwrap();
        // Carol has no department: her hours count firm-wide but she is
        // reported separately, not in the department table.
        store
            .save_time_entry(&entry(carol.id, "2024-01-10", dec!(2.00), true))
            .await
            .unwrap();

        let engine = AggregationEngine::new(store, true);
        let summary = engine
            .summarize(SummaryScope::Firm, range("2024-01-01", "2024-01-31"))
            .await
            .unwrap();

        assert_eq!(summary.total_hours, dec!(16.00));
        assert_eq!(summary.unassigned_employee_count, 1);
        let names: Vec<&str> = summary.departments.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Corporate Law", "Litigation"]);

        let corp = &summary.departments[0];
        assert_eq!(corp.department_id, corporate.id);
        assert_eq!(corp.total_hours, dec!(8.00));
        assert_eq!(corp.utilization_rate, dec!(1));

        let lit = &summary.departments[1];
        assert_eq!(lit.department_id, litigation.id);
        assert_eq!(lit.billable_hours, Decimal::ZERO);
        assert_eq!(lit.utilization_rate, Decimal::ZERO);
    }

    #[tokio::test]
    async fn entries_outside_the_range_are_excluded() {
        let store = Arc::new(MemoryStore::new());
        let (_, _, alice, _, _) = seed(&store).await;
        store
            .save_time_entry(&entry(alice.id, "2024-01-10", dec!(8.00), true))
            .await
            .unwrap();
        store
            .save_time_entry(&entry(alice.id, "2024-02-01", dec!(5.00), true))
            .await
            .unwrap();

        let engine = AggregationEngine::new(store, true);
        let summary = engine
            .summarize(SummaryScope::Firm, range("2024-01-01", "2024-01-31"))
            .await
            .unwrap();
        assert_eq!(summary.total_hours, dec!(8.00));
    }

    #[tokio::test]
    async fn department_scope_breaks_down_by_employee() {
        let store = Arc::new(MemoryStore::new());
        let (_, corporate, alice, bob, _) = seed(&store).await;
        let zoe = employee("Zoe Adams", "zoe@firm.test", Some(corporate.id));
        store.save_employee(&zoe).await.unwrap();
        store
            .save_time_entry(&entry(alice.id, "2024-01-10", dec!(8.00), true))
            .await
            .unwrap();
        store
            .save_time_entry(&entry(zoe.id, "2024-01-10", dec!(4.00), false))
            .await
            .unwrap();
        // Bob is in another department and must not appear here.
        store
            .save_time_entry(&entry(bob.id, "2024-01-10", dec!(6.00), true))
            .await
            .unwrap();

        let engine = AggregationEngine::new(store, true);
        let summary = engine
            .summarize(
                SummaryScope::Department(corporate.id),
                range("2024-01-01", "2024-01-31"),
            )
            .await
            .unwrap();

        assert_eq!(summary.total_hours, dec!(12.00));
        let names: Vec<&str> = summary.employees.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Alice Chen", "Zoe Adams"]);
        assert_eq!(summary.employees[0].utilization_rate, dec!(1));
    }

    #[tokio::test]
    async fn unknown_scope_ids_are_errors_not_empty_summaries() {
        let store = Arc::new(MemoryStore::new());
        seed(&store).await;
        let engine = AggregationEngine::new(store, true);

        let missing = Uuid::new_v4();
        assert!(matches!(
            engine
                .summarize(SummaryScope::Department(missing), range("2024-01-01", "2024-01-31"))
                .await,
            Err(AggregationError::UnknownDepartment(id)) if id == missing
        ));
        assert!(matches!(
            engine
                .summarize(SummaryScope::Employee(missing), range("2024-01-01", "2024-01-31"))
                .await,
            Err(AggregationError::UnknownEmployee(id)) if id == missing
        ));
    }

    #[tokio::test]
    async fn removed_employees_follow_the_configured_visibility() {
        let store = Arc::new(MemoryStore::new());
        let (_, _, alice, bob, _) = seed(&store).await;
        store
            .save_time_entry(&entry(alice.id, "2024-01-10", dec!(8.00), true))
            .await
            .unwrap();
        store
            .save_time_entry(&entry(bob.id, "2024-01-10", dec!(4.00), true))
            .await
            .unwrap();
        store.soft_delete_employee(bob.id).await.unwrap();

        let auditing = AggregationEngine::new(Arc::clone(&store) as Arc<dyn DataStore>, true);
        let summary = auditing
            .summarize(SummaryScope::Firm, range("2024-01-01", "2024-01-31"))
            .await
            .unwrap();
        assert_eq!(summary.total_hours, dec!(12.00));

        let current_only = AggregationEngine::new(Arc::clone(&store) as Arc<dyn DataStore>, false);
        let summary = current_only
            .summarize(SummaryScope::Firm, range("2024-01-01", "2024-01-31"))
            .await
            .unwrap();
        assert_eq!(summary.total_hours, dec!(8.00));

        // A direct employee-scope query is an explicit audit request and
        // still sees the removed employee's history.
        let summary = current_only
            .summarize(SummaryScope::Employee(bob.id), range("2024-01-01", "2024-01-31"))
            .await
            .unwrap();
        assert_eq!(summary.total_hours, dec!(4.00));
    }

    #[test]
    fn inverted_ranges_are_rejected() {
        assert!(matches!(
            DateRange::new(d("2024-02-01"), d("2024-01-01")),
            Err(AggregationError::InvalidRange { .. })
        ));
    }

    #[test]
    fn utilization_stays_within_the_unit_interval() {
        assert_eq!(utilization(Decimal::ZERO, Decimal::ZERO), Decimal::ZERO);
        assert_eq!(utilization(dec!(60.00), dec!(100.00)), dec!(0.6));
        assert_eq!(utilization(dec!(1.00), dec!(3.00)), dec!(0.3333));
        assert_eq!(utilization(dec!(5.00), dec!(5.00)), dec!(1));
    }
}
