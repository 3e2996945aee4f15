//! End-to-end harvest runs against a mock listing site over HTTP.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use vacancy_harvester::challenge::RetryPolicy;
use vacancy_harvester::csv_sink::POSTING_ID_COLUMN;
use vacancy_harvester::{HarvestConfig, HarvestOptions, Harvester, HttpSession, RunStatus};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LISTING_PATH: &str = "/classifieds/saudi-arabia/jobs/";

fn listing_html(entries: &[(u32, &str)]) -> String {
    let items: String = entries
        .iter()
        .map(|(id, tail)| format!("<li><a href=\"/cls/{id}.html\">Job {id}</a> {tail}</li>"))
        .collect();
    format!("<html><head><title>Jobs</title></head><body><ul>{items}</ul></body></html>")
}

fn posting_html(id: u32) -> String {
    format!(
        "<html><head><title>Heavy Driver Wanted</title></head><body>\
         <p>Posting ID: {id}</p>\n<p>Region: Riyadh</p>\n\
         <p>Salary: 2500 SAR</p>\n<p>Call 0551234567 or mail hr@fleet.example.com</p>\n\
         <p>Chat on WhatsApp</p>\n<p>We need a heavy driver with a valid license for a full-time role.</p>\
         </body></html>"
    )
}

async fn mount_site(server: &MockServer, entries: &[(u32, &str)]) {
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(entries)))
        .mount(server)
        .await;

    for (id, _) in entries {
        Mock::given(method("GET"))
            .and(path(format!("/cls/{id}.html")))
            .respond_with(ResponseTemplate::new(200).set_body_string(posting_html(*id)))
            .mount(server)
            .await;
    }
}

fn config(server: &MockServer, dir: &Path) -> HarvestConfig {
    HarvestConfig::default()
        .with_base_url(server.uri())
        .with_output_csv(dir.join("exports/jobs.csv"))
        .with_dedup_db(dir.join("exports/db.json"))
        .with_request_delay(Duration::ZERO)
        .with_retry(RetryPolicy::immediate(2))
}

/// Run one harvest off the async runtime; the HTTP session is blocking.
async fn harvest(
    config: HarvestConfig,
    options: HarvestOptions,
) -> vacancy_harvester::HarvestOutcome {
    tokio::task::spawn_blocking(move || {
        let session = HttpSession::new().expect("session");
        let mut harvester = Harvester::new(session, config).expect("harvester");
        harvester.run(&options)
    })
    .await
    .expect("harvest task")
}

fn csv_ids(path: &Path) -> Vec<String> {
    csv::Reader::from_path(path)
        .expect("csv file")
        .records()
        .map(|r| r.expect("row")[POSTING_ID_COLUMN].to_string())
        .collect()
}

#[tokio::test]
async fn test_harvest_over_http() {
    let server = MockServer::start().await;
    mount_site(
        &server,
        &[(60_000_001, "2 hours ago"), (60_000_002, "Yesterday"), (60_000_003, "Sponsored")],
    )
    .await;
    let dir = TempDir::new().expect("tempdir");

    let outcome = harvest(config(&server, dir.path()), HarvestOptions::default()).await;

    assert_eq!(outcome.run.status, RunStatus::Success, "{:?}", outcome.run.error);
    assert_eq!(outcome.run.urls_discovered, 2);
    assert_eq!(outcome.run.sponsored_seen, 1);
    assert_eq!(outcome.run.new_jobs, 2);
    assert_eq!(outcome.run.written, 2);

    let record = &outcome.records[0];
    assert_eq!(record.title, "Heavy Driver Wanted");
    assert_eq!(record.salary, "2500");
    assert_eq!(record.contact, "0551234567");
    assert_eq!(record.email, "hr@fleet.example.com");
    assert_eq!(record.location, "Riyadh");
    assert_eq!(record.employment_type, "full-time");
    assert!(!record.is_sponsored);

    assert_eq!(
        csv_ids(&dir.path().join("exports/jobs.csv")),
        vec!["60000001".to_string(), "60000002".to_string()]
    );
}

#[tokio::test]
async fn test_repeated_runs_only_append() {
    let server = MockServer::start().await;
    mount_site(&server, &[(60_000_001, "2 hours ago"), (60_000_002, "3 hours ago")]).await;
    let dir = TempDir::new().expect("tempdir");
    let csv_path = dir.path().join("exports/jobs.csv");

    harvest(config(&server, dir.path()), HarvestOptions::default()).await;
    let first = std::fs::read_to_string(&csv_path).expect("csv");

    // A lost dedup store must not produce duplicate rows
    std::fs::remove_file(dir.path().join("exports/db.json")).expect("remove db");
    let second = harvest(config(&server, dir.path()), HarvestOptions::default()).await;
    assert!(second.run.is_success());
    assert_eq!(second.run.new_jobs, 2);
    assert_eq!(second.run.written, 0);
    assert_eq!(second.run.skipped_duplicate, 2);

    let after = std::fs::read_to_string(&csv_path).expect("csv");
    assert_eq!(first, after);

    let ids = csv_ids(&csv_path);
    let unique: HashSet<&String> = ids.iter().collect();
    assert_eq!(ids.len(), unique.len());
}

#[tokio::test]
async fn test_challenge_page_counts_as_blocked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cls/60000001.html"))
        .respond_with(ResponseTemplate::new(403).set_body_string(
            "<html><head><title>Just a moment...</title></head><body>Checking your browser</body></html>",
        ))
        .mount(&server)
        .await;
    mount_site(&server, &[(60_000_001, "2 hours ago"), (60_000_002, "2 hours ago")]).await;
    let dir = TempDir::new().expect("tempdir");

    let outcome = harvest(config(&server, dir.path()), HarvestOptions::default()).await;

    assert!(outcome.run.is_success());
    assert_eq!(outcome.run.failed_extractions, 1);
    assert_eq!(outcome.run.blocked, 1);
    assert_eq!(outcome.run.new_jobs, 1);
    assert_eq!(csv_ids(&dir.path().join("exports/jobs.csv")), vec!["60000002".to_string()]);
}

#[tokio::test]
async fn test_empty_listing_fails_run_without_output() {
    let server = MockServer::start().await;
    mount_site(&server, &[]).await;
    let dir = TempDir::new().expect("tempdir");

    let outcome = harvest(config(&server, dir.path()), HarvestOptions::default()).await;

    assert_eq!(outcome.run.status, RunStatus::Failed);
    assert!(outcome.run.error.is_some());
    assert!(!dir.path().join("exports/jobs.csv").exists());
}
