//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full pop, fetch, parse, forward cycle end-to-end.

use mycelium::config::{parse_config, Config};
use mycelium::crawler::{
    seed, CrawlEngine, Coordinator, Destination, EngineSettings, FetchSettings, ItemOutcome,
    PageFetcher, Step, StoreSet,
};
use mycelium::identity::Identity;
use mycelium::page::PageRecord;
use mycelium::storage::{FileStore, MemoryStore, PopMode, VisitedSet, WorkItem};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REFERENCE_PAGE: &str = r#"<html><head><title>T</title><meta name="description" content="D"></head><body><h1>H</h1><a href="/x">link</a></body></html>"#;

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html; charset=utf-8")
}

async fn mount_page(server: &MockServer, route: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
}

fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new(PopMode::Bounded(Duration::from_millis(20))))
}

fn engine(store: &Arc<MemoryStore>, destination: Destination) -> CrawlEngine {
    let stores = StoreSet {
        frontier: store.clone(),
        visited: store.clone(),
        blacklist: Some(store.clone()),
        destination,
    };
    let fetcher = PageFetcher::new(Identity::default(), FetchSettings::default())
        .expect("Failed to build fetcher");
    let settings = EngineSettings {
        max_retries: 3,
        ..EngineSettings::default()
    };
    CrawlEngine::new(0, stores, fetcher, settings)
}

fn temp_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// Creates a batch-mode memory store config that persists pages to `output`
fn create_test_config(output: &Path, seed_file: &Path, extra_inputs: &str) -> Config {
    parse_config(&format!(
        r#"
[crawler]
workers = 2
max-retries = 2
request-timeout-ms = 5000

[frontier]
pop-mode = "bounded"
pop-timeout-ms = 20

[idle]
interval-ms = 10
max-idle = 5

[store]
backend = "memory"
output-dir = "{}"

[inputs]
seed-file = "{}"
{}
"#,
        output.display(),
        seed_file.display(),
        extra_inputs
    ))
    .expect("Failed to parse test config")
}

fn stored_pages(output: &Path) -> Vec<PageRecord> {
    let dir = output.join("pages");
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Vec::new();
    };
    entries
        .map(|entry| {
            let bytes = std::fs::read(entry.unwrap().path()).unwrap();
            serde_json::from_slice(&bytes).unwrap()
        })
        .collect()
}

#[tokio::test]
async fn test_single_step_from_seeded_root() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, "/", html(REFERENCE_PAGE)).await;

    let output = TempDir::new().unwrap();
    let store = memory_store();
    let root = Url::parse(&mock_server.uri()).unwrap();

    assert_eq!(seed(&*store, &[root.clone()]).await.unwrap(), 1);

    let engine = engine(
        &store,
        Destination::Store(Arc::new(FileStore::new(output.path()))),
    );
    let step = engine.step().await.unwrap();
    assert_eq!(step, Step::Processed(ItemOutcome::Stored { links: 1 }));

    assert_eq!(
        store.frontier_items(),
        vec![WorkItem {
            location: format!("{}/x", mock_server.uri()),
            retries: 0,
        }]
    );
    assert!(store.is_marked(root.as_str()).await.unwrap());

    let pages = stored_pages(output.path());
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].title, "T");
    assert_eq!(pages[0].description, "D");
    assert_eq!(pages[0].headings, vec!["H"]);
    assert_eq!(pages[0].location, root.as_str());
}

#[tokio::test]
async fn test_handoff_mode_forwards_page_without_following_links() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, "/", html(REFERENCE_PAGE)).await;

    let store = memory_store();
    let root = Url::parse(&mock_server.uri()).unwrap();
    seed(&*store, &[root.clone()]).await.unwrap();

    let engine = engine(&store, Destination::Handoff(store.clone()));
    let step = engine.step().await.unwrap();
    assert_eq!(step, Step::Processed(ItemOutcome::Forwarded));

    assert!(store.frontier_items().is_empty());
    let handed = store.handed_off();
    assert_eq!(handed.len(), 1);

    let record: PageRecord = serde_json::from_str(&handed[0]).unwrap();
    assert_eq!(record.title, "T");
    assert_eq!(record.author, "");
    assert_eq!(record.links, vec![format!("{}/x", mock_server.uri())]);
}

#[tokio::test]
async fn test_repeated_location_fetched_once() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(REFERENCE_PAGE))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = memory_store();
    let engine = engine(&store, Destination::Handoff(store.clone()));
    let root = format!("{}/", mock_server.uri());

    let first = engine.process(WorkItem::new(root.as_str())).await.unwrap();
    let second = engine.process(WorkItem::new(root.as_str())).await.unwrap();
    assert_eq!(first, ItemOutcome::Forwarded);
    assert_eq!(second, ItemOutcome::AlreadyVisited);
}

#[tokio::test]
async fn test_full_crawl_single_site() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(
        &mock_server,
        "/",
        html(r#"<title>Home</title><a href="/page1">1</a><a href="page2">2</a>"#),
    )
    .await;
    mount_page(
        &mock_server,
        "/page1",
        html(r#"<title>Page 1</title><p>Content 1</p><a href="/">home</a>"#),
    )
    .await;
    mount_page(
        &mock_server,
        "/page2",
        html(r#"<title>Page 2</title><p>Content 2</p>"#),
    )
    .await;

    let output = TempDir::new().unwrap();
    let seeds = temp_file(&format!("{}/\n", base_url));
    let config = create_test_config(output.path(), seeds.path(), "");

    let coordinator = Coordinator::new(config, CancellationToken::new());
    let stats = tokio::time::timeout(Duration::from_secs(20), coordinator.run())
        .await
        .expect("Crawl did not go idle")
        .expect("Crawl failed");

    assert_eq!(stats.stored, 3);
    assert_eq!(stats.already_visited, 1);
    assert_eq!(stats.fetch_failed, 0);

    let mut titles: Vec<_> = stored_pages(output.path())
        .into_iter()
        .map(|p| p.title)
        .collect();
    titles.sort();
    assert_eq!(titles, vec!["Home", "Page 1", "Page 2"]);
}

#[tokio::test]
async fn test_crawl_skips_failures_and_non_html() {
    let mock_server = MockServer::start().await;

    mount_page(
        &mock_server,
        "/",
        html(r#"<a href="/notes.txt">t</a><a href="/missing">m</a><a href="/logo.png">l</a>"#),
    )
    .await;
    mount_page(
        &mock_server,
        "/notes.txt",
        ResponseTemplate::new(200).set_body_raw(b"plain notes".to_vec(), "text/plain"),
    )
    .await;
    mount_page(&mock_server, "/missing", ResponseTemplate::new(404)).await;
    mount_page(
        &mock_server,
        "/logo.png",
        ResponseTemplate::new(200).set_body_raw(vec![0x89, 0x50, 0x4e, 0x47], "image/png"),
    )
    .await;

    let output = TempDir::new().unwrap();
    let seeds = temp_file(&format!("{}/\n", mock_server.uri()));
    let config = create_test_config(output.path(), seeds.path(), "");

    let stats = tokio::time::timeout(
        Duration::from_secs(20),
        Coordinator::new(config, CancellationToken::new()).run(),
    )
    .await
    .expect("Crawl did not go idle")
    .expect("Crawl failed");

    assert_eq!(stats.stored, 1);
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.fetch_failed, 2);
    assert_eq!(stored_pages(output.path()).len(), 1);
}

#[tokio::test]
async fn test_blacklist_file_excludes_domains() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, "/", html("<title>Allowed</title>")).await;

    let output = TempDir::new().unwrap();
    let seeds = temp_file(&format!(
        "{}/\nhttps://ads.blocked.example/\n",
        mock_server.uri()
    ));
    let blacklist = temp_file("# excluded\nblocked.example\n");
    let config = create_test_config(
        output.path(),
        seeds.path(),
        &format!("blacklist-file = \"{}\"", blacklist.path().display()),
    );

    let stats = tokio::time::timeout(
        Duration::from_secs(20),
        Coordinator::new(config, CancellationToken::new()).run(),
    )
    .await
    .expect("Crawl did not go idle")
    .expect("Crawl failed");

    assert_eq!(stats.filtered, 1);
    assert_eq!(stats.stored, 1);
}

#[tokio::test]
async fn test_service_mode_stops_on_cancel() {
    let output = TempDir::new().unwrap();
    let config = parse_config(&format!(
        r#"
[crawler]
workers = 3
max-retries = 1
request-timeout-ms = 1000

[frontier]
pop-mode = "blocking"

[store]
backend = "memory"
output-dir = "{}"
"#,
        output.path().display()
    ))
    .unwrap();

    let cancel = CancellationToken::new();
    let coordinator = Coordinator::new(config, cancel.clone());
    let run = tokio::spawn(async move { coordinator.run().await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    let stats = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("Crawl did not stop after cancel")
        .unwrap()
        .unwrap();
    assert_eq!(stats.popped, 0);
}
