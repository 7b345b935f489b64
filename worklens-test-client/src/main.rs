// src/main.rs
//
// Smoke-test client for a locally running worklens-core instance. Walks the
// API end to end: departments, employees, time entries, a CSV import with
// status polling, a report, and search.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::error::Error;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct Department {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Employee {
    id: String,
    name: String,
    email: String,
}

#[derive(Debug, Deserialize)]
struct TimeEntry {
    id: String,
    hours: String,
}

#[derive(Debug, Deserialize)]
struct ImportJob {
    id: String,
    status: String,
    total_rows: u32,
    succeeded: u32,
    failed: u32,
}

#[derive(Debug, Deserialize)]
struct Summary {
    total_hours: String,
    billable_hours: String,
    utilization_rate: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let base_url =
        std::env::var("WORKLENS_BASE_URL").unwrap_or_else(|_| "http://localhost:4400".to_string());
    let client = Client::new();

    println!("\n🔍 Testing health check endpoint...");
    let health = client
        .get(format!("{}/health", base_url))
        .send()
        .await?
        .json::<HealthResponse>()
        .await?;
    println!("Health check response: {:?}", health);
    assert_eq!(health.status, "ok");

    println!("\n🔍 Creating a department...");
    let department = client
        .post(format!("{}/api/departments", base_url))
        .json(&json!({ "name": "Corporate Law", "description": "M&A and contracts" }))
        .send()
        .await?
        .json::<Department>()
        .await?;
    println!("Created department {} ({})", department.name, department.id);

    println!("\n🔍 Creating an employee...");
    let employee = client
        .post(format!("{}/api/employees", base_url))
        .json(&json!({
            "name": "Ada Lovelace",
            "email": "ada@example.com",
            "position": "Senior Attorney",
            "department_id": department.id,
            "hire_date": "2023-01-15"
        }))
        .send()
        .await?
        .json::<Employee>()
        .await?;
    println!("Created employee {} <{}>", employee.name, employee.email);

    println!("\n🔍 Logging a time entry...");
    let entry = client
        .post(format!("{}/api/time-entries", base_url))
        .json(&json!({
            "employee_id": employee.id,
            "date": "2024-01-10",
            "hours": "7.50",
            "description": "Client meeting and contract review",
            "billable": true,
            "matter_code": "CORP-104"
        }))
        .send()
        .await?
        .json::<TimeEntry>()
        .await?;
    println!("Logged entry {} for {} hours", entry.id, entry.hours);

    println!("\n🔍 Submitting a time-entry CSV import...");
    let csv = "employee_email,date,hours,description,billable\n\
               ada@example.com,2024-01-11,8.00,Discovery document review,true\n\
               ada@example.com,2024-01-12,6.00,Research and documentation,false\n\
               ada@example.com,2024-01-12,25.00,This row breaks the daily cap,true\n";
    let job = client
        .post(format!("{}/api/imports/time-entries", base_url))
        .header("content-type", "text/csv")
        .body(csv)
        .send()
        .await?
        .json::<ImportJob>()
        .await?;
    println!("Submitted import job {} ({})", job.id, job.status);

    println!("\n🔍 Polling import status...");
    let mut final_job = job;
    for _ in 0..50 {
        final_job = client
            .get(format!("{}/api/imports/{}", base_url, final_job.id))
            .send()
            .await?
            .json::<ImportJob>()
            .await?;
        if final_job.status == "completed" || final_job.status == "failed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    println!(
        "Import finished: status={} total={} succeeded={} failed={}",
        final_job.status, final_job.total_rows, final_job.succeeded, final_job.failed
    );
    assert_eq!(final_job.status, "completed");
    assert_eq!(final_job.succeeded, 2);
    assert_eq!(final_job.failed, 1);

    println!("\n🔍 Fetching the firm summary...");
    let summary = client
        .get(format!(
            "{}/api/reports/summary?start_date=2024-01-01&end_date=2024-01-31",
            base_url
        ))
        .send()
        .await?
        .json::<Summary>()
        .await?;
    println!(
        "Firm summary: total={}h billable={}h utilization={}",
        summary.total_hours, summary.billable_hours, summary.utilization_rate
    );

    println!("\n🔍 Searching for the employee...");
    let hits = client
        .get(format!("{}/api/employees/search?q=ada", base_url))
        .send()
        .await?
        .json::<Vec<serde_json::Value>>()
        .await?;
    println!("Search returned {} hit(s)", hits.len());

    println!("\n✅ All smoke checks passed.");
    Ok(())
}
