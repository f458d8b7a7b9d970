//! Collect, merge and resolve end to end against a mock upstream

use crate::{manual_clock, start_time, test_client};
use osh_harvest::clock::ManualClock;
use osh_harvest::collector::{
    work_items_from_store, Collector, FetchLog, FetchRecord, StopReason, WorkItem, WorkItemState,
};
use osh_harvest::config::{load_config, ResourceConfig};
use osh_harvest::credentials::{Credential, CredentialPool};
use osh_harvest::fetcher::{Fetcher, TemplateFetcher};
use osh_harvest::merger::EnrichmentMerger;
use osh_harvest::resolver::DeduplicationResolver;
use osh_harvest::store::{CanonicalStore, CrossReference, MatchType, NewEntity, SqliteStore};
use osh_harvest::RateLimitedClient;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Fetcher for a GitHub-shaped API: repository first, then its recursive tree
fn repo_fetcher(client: RateLimitedClient, base_url: &str) -> Arc<dyn Fetcher> {
    Arc::new(TemplateFetcher::new(
        client,
        base_url,
        vec![
            ResourceConfig {
                name: "repository".to_string(),
                path: "/repos/{id}".to_string(),
                required: true,
            },
            ResourceConfig {
                name: "tree".to_string(),
                path: "/repos/{id}/git/trees/{default_branch}?recursive=1".to_string(),
                required: false,
            },
        ],
    ))
}

/// Mounts the repository and tree endpoints of one project
///
/// Each endpoint must be called exactly once per test.
async fn mount_repo(server: &MockServer, id: &str, files: &[&str]) {
    let name = id.rsplit('/').next().unwrap_or(id);
    Mock::given(method("GET"))
        .and(path(format!("/repos/{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": name,
            "description": format!("The {} project", name),
            "default_branch": "main",
            "stargazers_count": 12,
            "forks_count": 3,
            "language": "KiCad",
            "license": {"name": "CERN-OHL-S-2.0"},
            "topics": ["open-hardware", "pcb"],
        })))
        .expect(1)
        .mount(server)
        .await;

    let tree: Vec<_> = files
        .iter()
        .map(|p| json!({"path": p, "type": "blob", "size": 100}))
        .collect();
    Mock::given(method("GET"))
        .and(path(format!("/repos/{}/git/trees/main", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tree": tree})))
        .expect(1)
        .mount(server)
        .await;
}

fn items(ids: &[&str]) -> Vec<WorkItem> {
    ids.iter().map(|id| WorkItem::new(*id, "github.com")).collect()
}

fn store_with(entities: &[NewEntity]) -> SqliteStore {
    let mut store = SqliteStore::new_in_memory().expect("Failed to open store");
    for entity in entities {
        store.upsert_entity(entity).expect("Failed to insert entity");
    }
    store
}

#[tokio::test]
async fn test_collect_two_items() {
    let mock_server = MockServer::start().await;
    mount_repo(&mock_server, "acme/widget", &["hardware/bom.csv", "README.md"]).await;
    mount_repo(&mock_server, "acme/gizmo", &["src/main.c"]).await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let pool = CredentialPool::from_tokens(["token-a"], manual_clock());
    let fetcher = repo_fetcher(test_client(pool.clone()), &mock_server.uri());
    let mut log = FetchLog::open(temp_dir.path().join("github.jsonl")).unwrap();

    let report = Collector::new(fetcher, pool, Duration::from_secs(60))
        .run(items(&["acme/widget", "acme/gizmo"]), &mut log)
        .await
        .expect("Run failed");

    assert_eq!(report.to_string(), "succeeded=2, failed=0, skipped=0, pending=0");
    assert!(report.is_complete());

    let records = FetchLog::read_records(temp_dir.path().join("github.jsonl")).unwrap();
    assert_eq!(records.len(), 2);

    let widget = records
        .iter()
        .find(|r| r.work_item_id == "acme/widget")
        .expect("No record for acme/widget");
    assert!(widget.ok);
    assert!(widget.has_bom);
    assert_eq!(widget.artifacts.len(), 1);
    assert_eq!(widget.artifacts[0].path, "hardware/bom.csv");
    assert_eq!(widget.raw_payload["repository"]["default_branch"], "main");

    let gizmo = records
        .iter()
        .find(|r| r.work_item_id == "acme/gizmo")
        .expect("No record for acme/gizmo");
    assert!(!gizmo.has_bom);
}

#[tokio::test]
async fn test_outage_leaves_item_for_next_run() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .expect(3)
        .mount(&mock_server)
        .await;
    mount_repo(&mock_server, "acme/widget", &["hardware/bom.csv"]).await;

    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("github.jsonl");
    let pool = CredentialPool::from_tokens(["token-a"], manual_clock());

    let mut log = FetchLog::open(&log_path).unwrap();
    let fetcher = repo_fetcher(test_client(pool.clone()), &mock_server.uri());
    let first = Collector::new(fetcher, pool.clone(), Duration::from_secs(60))
        .run(items(&["acme/widget"]), &mut log)
        .await
        .expect("First run failed");

    assert_eq!(first.to_string(), "succeeded=0, failed=0, skipped=0, pending=1");
    assert_eq!(first.items[0].state, WorkItemState::Pending);
    assert!(log.is_empty());
    drop(log);

    let mut log = FetchLog::open(&log_path).unwrap();
    let fetcher = repo_fetcher(test_client(pool.clone()), &mock_server.uri());
    let second = Collector::new(fetcher, pool, Duration::from_secs(60))
        .run(items(&["acme/widget"]), &mut log)
        .await
        .expect("Second run failed");

    assert_eq!(second.to_string(), "succeeded=1, failed=0, skipped=0, pending=0");
    let records = FetchLog::read_records(&log_path).unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].ok && records[0].has_bom);
}

#[tokio::test]
async fn test_missing_repository_is_recorded_as_failure() {
    let mock_server = MockServer::start().await;
    mount_repo(&mock_server, "acme/widget", &[]).await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let pool = CredentialPool::from_tokens(["token-a"], manual_clock());
    let fetcher = repo_fetcher(test_client(pool.clone()), &mock_server.uri());
    let mut log = FetchLog::open(temp_dir.path().join("github.jsonl")).unwrap();

    let report = Collector::new(fetcher, pool, Duration::from_secs(60))
        .run(items(&["acme/widget", "acme/gone"]), &mut log)
        .await
        .unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);

    let gone = log
        .records()
        .unwrap()
        .into_iter()
        .find(|r| r.work_item_id == "acme/gone")
        .unwrap();
    assert!(!gone.ok);
    assert!(gone.error.is_some());
}

#[tokio::test]
async fn test_quota_stop_and_resume_after_reset() {
    let mock_server = MockServer::start().await;
    mount_repo(&mock_server, "acme/widget", &[]).await;
    mount_repo(&mock_server, "acme/gizmo", &[]).await;

    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("github.jsonl");
    let clock = manual_clock();
    let reset = start_time() + chrono::Duration::hours(1);

    // Two calls per item: the window covers exactly one item
    let pool = CredentialPool::new(
        vec![Credential::with_quota("token-a", 2, Some(reset))],
        clock.clone(),
    );
    let fetcher = repo_fetcher(test_client(pool.clone()), &mock_server.uri());
    let collector = Collector::new(fetcher, pool, Duration::from_secs(60)).with_concurrency(1);

    let mut log = FetchLog::open(&log_path).unwrap();
    let first = collector
        .run(items(&["acme/widget", "acme/gizmo"]), &mut log)
        .await
        .unwrap();

    assert_eq!(first.succeeded, 1);
    assert_eq!(first.pending, 1);
    assert_eq!(first.stop, StopReason::Deferred { ready_at: reset });
    assert_eq!(log.len(), 1);
    drop(log);

    clock.advance(Duration::from_secs(2 * 3600));

    let mut log = FetchLog::open(&log_path).unwrap();
    let second = collector
        .run(items(&["acme/widget", "acme/gizmo"]), &mut log)
        .await
        .unwrap();

    assert_eq!(second.already_done, 1);
    assert_eq!(second.succeeded, 1);
    assert!(second.is_complete());

    let mut ids: Vec<String> = FetchLog::read_records(&log_path)
        .unwrap()
        .into_iter()
        .map(|r| r.work_item_id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["acme/gizmo", "acme/widget"]);
}

#[tokio::test]
async fn test_interrupted_run_ends_with_same_log() {
    let ids = ["acme/widget", "acme/gizmo", "acme/doohickey"];
    let files: &[&str] = &["hardware/bom.csv"];

    // Uninterrupted run
    let straight_server = MockServer::start().await;
    for id in ids {
        mount_repo(&straight_server, id, files).await;
    }
    let straight_dir = TempDir::new().unwrap();
    let straight_path = straight_dir.path().join("github.jsonl");
    let pool = CredentialPool::from_tokens(["token-a"], manual_clock());
    let fetcher = repo_fetcher(test_client(pool.clone()), &straight_server.uri());
    let mut log = FetchLog::open(&straight_path).unwrap();
    Collector::new(fetcher, pool, Duration::from_secs(60))
        .with_concurrency(1)
        .run(items(&ids), &mut log)
        .await
        .unwrap();

    // The same work split over two invocations
    let split_server = MockServer::start().await;
    for id in ids {
        mount_repo(&split_server, id, files).await;
    }
    let split_dir = TempDir::new().unwrap();
    let split_path = split_dir.path().join("github.jsonl");
    let pool = CredentialPool::from_tokens(["token-a"], manual_clock());
    let fetcher = repo_fetcher(test_client(pool.clone()), &split_server.uri());
    let collector = Collector::new(fetcher, pool, Duration::from_secs(60)).with_concurrency(1);

    let mut log = FetchLog::open(&split_path).unwrap();
    collector.run(items(&ids[..1]), &mut log).await.unwrap();
    drop(log);

    let mut log = FetchLog::open(&split_path).unwrap();
    let resumed = collector.run(items(&ids), &mut log).await.unwrap();
    assert_eq!(resumed.already_done, 1);
    assert_eq!(resumed.succeeded, 2);

    let straight = FetchLog::read_records(&straight_path).unwrap();
    let split = FetchLog::read_records(&split_path).unwrap();
    assert_eq!(split, straight);
}

#[tokio::test]
async fn test_torn_tail_is_discarded_and_nothing_refetched() {
    let mock_server = MockServer::start().await;
    mount_repo(&mock_server, "acme/widget", &[]).await;
    mount_repo(&mock_server, "acme/gizmo", &[]).await;

    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("github.jsonl");
    let pool = CredentialPool::from_tokens(["token-a"], manual_clock());
    let fetcher = repo_fetcher(test_client(pool.clone()), &mock_server.uri());
    let collector = Collector::new(fetcher, pool, Duration::from_secs(60));

    let mut log = FetchLog::open(&log_path).unwrap();
    collector
        .run(items(&["acme/widget", "acme/gizmo"]), &mut log)
        .await
        .unwrap();
    drop(log);

    // A crash in the middle of an append leaves half a line behind
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&log_path)
        .unwrap();
    file.write_all(b"{\"work_item_id\":\"acme/thing").unwrap();
    drop(file);

    let mut log = FetchLog::open(&log_path).unwrap();
    assert_eq!(log.len(), 2);

    let report = collector
        .run(items(&["acme/widget", "acme/gizmo"]), &mut log)
        .await
        .unwrap();

    assert_eq!(report.already_done, 2);
    assert_eq!(report.succeeded, 0);
    assert!(report
        .items
        .iter()
        .all(|item| item.state == WorkItemState::Done));
    assert_eq!(FetchLog::read_records(&log_path).unwrap().len(), 2);
}

#[tokio::test]
async fn test_collect_and_merge_from_store() {
    let mock_server = MockServer::start().await;
    mount_repo(&mock_server, "acme/widget", &["hardware/bom.csv", "docs/guide.md"]).await;
    mount_repo(&mock_server, "acme/gizmo", &["firmware/main.c"]).await;

    let temp_dir = TempDir::new().unwrap();
    let mut store = SqliteStore::new(&temp_dir.path().join("harvest.db")).unwrap();
    let widget = store
        .upsert_entity(
            &NewEntity::new("ohr", "1", "Widget").with_repo_url("https://github.com/acme/widget"),
        )
        .unwrap();
    let gizmo = store
        .upsert_entity(&NewEntity::new("ohr", "2", "Gizmo").with_repo_url("github.com/acme/gizmo.git"))
        .unwrap();
    store
        .upsert_entity(&NewEntity::new("ohr", "3", "Gadget").with_repo_url("https://gitlab.com/acme/gadget"))
        .unwrap();

    let work = work_items_from_store(&store, "github.com").unwrap();
    let ids: Vec<&str> = work.iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, vec!["acme/gizmo", "acme/widget"]);

    let log_path = temp_dir.path().join("logs").join("github.jsonl");
    let pool = CredentialPool::from_tokens(["token-a"], manual_clock());
    let fetcher = repo_fetcher(test_client(pool.clone()), &mock_server.uri());
    let mut log = FetchLog::open(&log_path).unwrap();
    let report = Collector::new(fetcher, pool, Duration::from_secs(60))
        .run(work, &mut log)
        .await
        .unwrap();
    assert_eq!(report.succeeded, 2);

    let merged = EnrichmentMerger::new().run_log(&log_path, &mut store).unwrap();
    assert_eq!(merged.applied, 2);
    assert_eq!(merged.skipped(), 0);

    let metrics = store.get_metrics(widget).unwrap().expect("No metrics for widget");
    assert_eq!(metrics.stars, Some(12));
    assert!(metrics.has_bom);
    assert_eq!(store.artifact_paths(widget).unwrap(), vec!["hardware/bom.csv"]);
    assert!(store.artifact_paths(gizmo).unwrap().is_empty());
    assert_eq!(store.tags(widget).unwrap(), vec!["open-hardware", "pcb"]);
    assert_eq!(store.licenses(widget).unwrap().len(), 1);

    // Enriched entities drop out of the next work list
    assert!(work_items_from_store(&store, "github.com").unwrap().is_empty());
}

#[tokio::test]
async fn test_merge_twice_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("github.jsonl");
    let mut log = FetchLog::open(&log_path).unwrap();
    let item = WorkItem::new("acme/widget", "github.com");
    log.append(&FetchRecord::success(
        &item,
        start_time(),
        json!({
            "repository": {
                "description": "Open widget",
                "stargazers_count": 7,
                "license": {"name": "MIT"}
            },
            "topics": {"names": ["pcb", "kicad"]},
            "contributors": [{"login": "jane", "contributions": 40}]
        }),
        Vec::new(),
    ))
    .unwrap();

    let mut store = store_with(&[
        NewEntity::new("ohr", "1", "Widget").with_repo_url("https://github.com/acme/widget")
    ]);
    let id = store.list_entities().unwrap()[0].id;
    let merger = EnrichmentMerger::new();

    merger.run_log(&log_path, &mut store).unwrap();
    let snapshot = (
        store.get_entity(id).unwrap(),
        store.get_metrics(id).unwrap(),
        store.licenses(id).unwrap(),
        store.tags(id).unwrap(),
        store.contributors(id).unwrap(),
    );

    let again = merger.run_log(&log_path, &mut store).unwrap();
    assert_eq!(again.applied, 1);
    assert_eq!(
        (
            store.get_entity(id).unwrap(),
            store.get_metrics(id).unwrap(),
            store.licenses(id).unwrap(),
            store.tags(id).unwrap(),
            store.contributors(id).unwrap(),
        ),
        snapshot
    );
    assert_eq!(store.contributors(id).unwrap().len(), 1);
}

#[test]
fn test_record_without_match_creates_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("github.jsonl");
    let mut log = FetchLog::open(&log_path).unwrap();
    log.append(&FetchRecord::success(
        &WorkItem::new("acme/unknown", "github.com"),
        start_time(),
        json!({"repository": {"description": "Nobody asked"}}),
        Vec::new(),
    ))
    .unwrap();

    let mut store = store_with(&[
        NewEntity::new("ohr", "1", "Widget").with_repo_url("https://github.com/acme/widget")
    ]);

    let report = EnrichmentMerger::new().run_log(&log_path, &mut store).unwrap();

    assert_eq!(report.skipped_no_match, 1);
    assert_eq!(report.applied, 0);
    assert_eq!(store.list_entities().unwrap().len(), 1);
    assert_eq!(store.count_entities_with_metrics().unwrap(), 0);
}

#[test]
fn test_ambiguous_record_is_skipped_while_pair_is_linked() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("github.jsonl");
    let mut log = FetchLog::open(&log_path).unwrap();
    log.append(&FetchRecord::success(
        &WorkItem::new("acme/widget", "github.com"),
        start_time(),
        json!({"repository": {"description": "Widget"}}),
        Vec::new(),
    ))
    .unwrap();

    let mut store = store_with(&[
        NewEntity::new("ohr", "1", "Widget").with_repo_url("https://github.com/acme/widget"),
        NewEntity::new("hackaday", "77", "Widget").with_repo_url("https://github.com/acme/widget.git/"),
    ]);

    let merged = EnrichmentMerger::new().run_log(&log_path, &mut store).unwrap();
    assert_eq!(merged.skipped_ambiguous, 1);
    assert_eq!(store.count_entities_with_metrics().unwrap(), 0);

    let resolved = DeduplicationResolver::default().run(&mut store).unwrap();
    assert_eq!(resolved.exact, 1);
}

#[test]
fn test_equivalent_urls_link_exactly_once() {
    let mut store = store_with(&[
        NewEntity::new("ohr", "1", "Widget").with_repo_url("https://github.com/acme/widget"),
        NewEntity::new("hackaday", "77", "Widget board").with_repo_url("https://github.com/acme/widget.git/"),
        NewEntity::new("ohr", "2", "Unrelated").with_repo_url("https://github.com/other/thing"),
    ]);
    let resolver = DeduplicationResolver::default();

    let report = resolver.run(&mut store).unwrap();
    assert_eq!(report.exact, 1);

    let links = store.list_cross_references().unwrap();
    assert_eq!(
        links,
        vec![CrossReference::new(1, 2, MatchType::IdentityExact, 1.0)]
    );

    // Re-running replaces the set with an identical one
    let again = resolver.run(&mut store).unwrap();
    assert_eq!(again, report);
    assert_eq!(store.list_cross_references().unwrap(), links);
}

#[tokio::test]
async fn test_config_driven_collection() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget"))
        .and(header("accept", "application/vnd.github+json"))
        .and(header("authorization", "Bearer ghp_configured"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"default_branch": "main"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("harvest.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
[collector]
log-dir = '{dir}/logs'

[store]
database-path = '{dir}/harvest.db'

[[source]]
tag = "github"
host = "github.com"
base-url = "{base}"
tokens = ["ghp_configured"]

[source.headers]
Accept = "application/vnd.github+json"

[[source.resource]]
name = "repository"
path = "/repos/{{id}}"
"#,
            dir = temp_dir.path().display(),
            base = mock_server.uri()
        ),
    )
    .unwrap();

    let config = load_config(&config_path).expect("Config should load");
    let source = config.source("github").unwrap();
    let pool = CredentialPool::from_tokens(source.tokens.clone(), Arc::new(ManualClock::new(start_time())));
    let client = RateLimitedClient::from_config(
        &config.client,
        &source.headers,
        pool.clone(),
        Duration::from_secs(60),
    )
    .unwrap();
    let fetcher: Arc<dyn Fetcher> = Arc::new(TemplateFetcher::from_source(client, source));

    let log_path = config.collector.log_path("github");
    let mut log = FetchLog::open(&log_path).unwrap();
    let report = Collector::new(fetcher, pool, Duration::from_secs(60))
        .run(items(&["acme/widget"]), &mut log)
        .await
        .unwrap();

    assert_eq!(report.succeeded, 1);
    assert!(log_path.starts_with(temp_dir.path()));
    assert_eq!(FetchLog::read_records(&log_path).unwrap().len(), 1);
}
