//! Integration tests for the harvest pipeline
//!
//! These tests drive both phases end-to-end, either over HTTP against a
//! wiremock server or against in-memory fixture pages.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use variant_harvest::config::{
    CaptureConfig, Config, CrawlerConfig, OutputConfig, RecordFormat, SelectorConfig, SiteConfig,
    TimingConfig, UserAgentConfig,
};
use variant_harvest::crawler::{HarvestOptions, Harvester};
use variant_harvest::output::MemorySink;
use variant_harvest::render::{
    build_http_client, FixtureRenderer, HttpRenderer, Renderer, VisibilityRules,
};
use variant_harvest::state::RequestState;
use variant_harvest::storage::{QueueKind, RunStatus, SqliteStorage, Storage};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ORIGIN: &str = "https://shop.example";

/// Creates a test configuration for a site with a single start URL
fn create_test_config(origin: &str, db_path: &str) -> Config {
    Config {
        crawler: CrawlerConfig {
            catalog_concurrency: 2,
            product_concurrency: 2,
            max_request_retries: 1,
            request_timeout_secs: 10,
            max_products: None,
        },
        site: SiteConfig {
            origin: origin.to_string(),
            start_urls: vec![format!("{}/shop/c?page=1", origin)],
            page_param: "page".to_string(),
            product_path: "/shop/p/".to_string(),
        },
        timing: TimingConfig::immediate(),
        capture: CaptureConfig::default(),
        selectors: SelectorConfig::default(),
        user_agent: UserAgentConfig::default(),
        output: OutputConfig {
            database_path: db_path.to_string(),
            records_path: "./unused.jsonl".to_string(),
            summary_path: "./unused.md".to_string(),
            format: RecordFormat::Nested,
        },
    }
}

fn options() -> HarvestOptions {
    HarvestOptions {
        fresh: false,
        write_records_file: false,
    }
}

/// Catalog markup listing `products` with page numbers `1..=last_shown`
fn catalog_page(products: &[&str], last_shown: u32, next_enabled: bool) -> String {
    let links: String = products
        .iter()
        .map(|p| format!(r#"<a class="product-listing-desc" href="{}">item</a>"#, p))
        .collect();
    let pages: String = (1..=last_shown)
        .map(|n| format!(r#"<li class="pagination-page"><a>{}</a></li>"#, n))
        .collect();
    let next = if next_enabled {
        r#"<li class="pagination-next"><a>Next</a></li>"#
    } else {
        r#"<li class="pagination-next disabled"><a>Next</a></li>"#
    };
    format!(
        r#"<html><body>{}<ul class="pagination">{}{}</ul></body></html>"#,
        links, pages, next
    )
}

/// Product markup without color options; the default capture picks up the gallery
fn product_page(style: &str, name: &str) -> String {
    format!(
        r#"<html><body>
        <div class="style-number-font">Style: {style}</div>
        <h1>{name}</h1>
        <a ng-href="c/tops">Tops</a>
        <div class="details sizes"><span class="ng-binding">S</span><span class="ng-binding">L</span></div>
        <ul class="preview-thumbnail">
            <li class="preview-image"><img src="https://cdn.example/product/{style}.jpg"></li>
        </ul>
        </body></html>"#
    )
}

fn harvester(config: Config, storage: SqliteStorage, renderer: Arc<dyn Renderer>) -> Harvester {
    Harvester::with_components(config, "hash", storage, renderer, options()).unwrap()
}

#[tokio::test]
async fn test_two_catalog_pages_over_http() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/shop/c"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(catalog_page(
            &["/shop/p/tee/1", "/shop/p/hoodie/2"],
            2,
            false,
        )))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/shop/c"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(catalog_page(
            // The tee is listed again and must not produce a second record
            &["/shop/p/cap/3", "/shop/p/tee/1"],
            2,
            false,
        )))
        .mount(&mock_server)
        .await;

    for (product, style, name) in [
        ("/shop/p/tee/1", "1", "Tee"),
        ("/shop/p/hoodie/2", "2", "Hoodie"),
        ("/shop/p/cap/3", "3", "Cap"),
    ] {
        Mock::given(method("GET"))
            .and(path(product))
            .respond_with(ResponseTemplate::new(200).set_body_string(product_page(style, name)))
            .mount(&mock_server)
            .await;
    }

    let config = create_test_config(&base_url, ":memory:");
    let client = build_http_client(&config.user_agent, Duration::from_secs(5)).unwrap();
    let renderer = Arc::new(HttpRenderer::new(client, VisibilityRules::default()));

    let memory = Arc::new(MemorySink::new());
    let storage = SqliteStorage::new_in_memory().unwrap();
    let harvester = harvester(config, storage, renderer).with_sink(Box::new(memory.clone()));
    let shared = Arc::clone(harvester.storage());

    let report = harvester.run().await.unwrap();

    assert_eq!(report.records_total, 3);
    assert_eq!(report.product.emitted, 3);
    assert_eq!(report.catalog.unwrap().processed, 2);

    let urls: BTreeSet<String> = memory.records().into_iter().map(|r| r.source_url).collect();
    let expected: BTreeSet<String> = ["/shop/p/cap/3", "/shop/p/hoodie/2", "/shop/p/tee/1"]
        .iter()
        .map(|p| format!("{}{}", base_url, p))
        .collect();
    assert_eq!(urls, expected);

    let storage = shared.lock().unwrap();
    let catalog = storage
        .urls_in_state(QueueKind::Catalog, RequestState::Handled)
        .unwrap();
    let catalog: BTreeSet<String> = catalog.into_iter().collect();
    let expected: BTreeSet<String> = [1, 2]
        .iter()
        .map(|n| format!("{}/shop/c?page={}", base_url, n))
        .collect();
    assert_eq!(catalog, expected);

    let tee = storage
        .get_record(&format!("{}/shop/p/tee/1", base_url))
        .unwrap()
        .unwrap();
    assert_eq!(tee.identifier.as_deref(), Some("1"));
    assert!(!tee.is_partial);
    assert_eq!(tee.image_count, 1);
}

#[tokio::test]
async fn test_pagination_reaches_fixpoint() {
    const PAGES: u32 = 5;

    let mut renderer = FixtureRenderer::new(VisibilityRules::default());
    for page in 1..=PAGES {
        let product = format!("/shop/p/item/{}", page);
        renderer = renderer
            .with_page(
                &format!("{}/shop/c?page={}", ORIGIN, page),
                catalog_page(&[product.as_str()], page, page < PAGES),
            )
            .with_page(
                &format!("{}{}", ORIGIN, product),
                product_page(&page.to_string(), "Item"),
            );
    }

    let storage = SqliteStorage::new_in_memory().unwrap();
    let config = create_test_config(ORIGIN, ":memory:");
    let harvester = harvester(config, storage, Arc::new(renderer));
    let frontier = Arc::clone(harvester.frontier());

    let report = harvester.run().await.unwrap();

    let catalog = frontier.stats(QueueKind::Catalog).unwrap();
    assert_eq!(catalog.handled, PAGES as u64);
    assert_eq!(catalog.failed, 0);
    assert_eq!(catalog.total, PAGES as u64);
    assert_eq!(report.records_total, PAGES as u64);
}

#[tokio::test]
async fn test_color_galleries_through_pipeline() {
    const PRODUCT: &str = "https://shop.example/shop/p/tee/42";

    let options = concat!(
        r#"<div class="color-tooltip"><span class="color-feature-title">Red</span><a class="pdp-colors" data-fixture-state="red"></a></div>"#,
        r#"<div class="color-tooltip"><span class="color-feature-title">Blue</span><a class="pdp-colors" data-fixture-state="blue"></a></div>"#,
    );
    let fields = r#"
        <div class="style-number-font">Style: 42</div>
        <h1>Classic Tee</h1>
        <a ng-href="c/tops">Tops</a>
        <div class="details sizes"><span class="ng-binding">S</span><span class="ng-binding">M</span></div>
    "#;
    let red_gallery = r#"<ul class="preview-thumbnail">
        <li class="preview-image"><img src="https://cdn.example/product/red-1.jpg"></li>
        <li class="preview-image"><img data-src="https://cdn.example/product/red-2.jpg"></li>
    </ul>"#;
    let empty_gallery = r#"<ul class="preview-thumbnail" style="display: none"></ul>"#;

    let renderer = FixtureRenderer::new(VisibilityRules::default())
        .with_page(
            "https://shop.example/shop/c?page=1",
            catalog_page(&["/shop/p/tee/42"], 1, false),
        )
        .with_page(PRODUCT, format!("{}{}{}", fields, options, empty_gallery))
        .with_state(PRODUCT, "red", format!("{}{}{}", fields, options, red_gallery))
        .with_state(PRODUCT, "blue", format!("{}{}{}", fields, options, empty_gallery));

    let memory = Arc::new(MemorySink::new());
    let storage = SqliteStorage::new_in_memory().unwrap();
    let config = create_test_config(ORIGIN, ":memory:");
    let harvester =
        harvester(config, storage, Arc::new(renderer)).with_sink(Box::new(memory.clone()));
    let shared = Arc::clone(harvester.storage());

    harvester.run().await.unwrap();

    let records = memory.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.identifier.as_deref(), Some("42"));
    assert_eq!(record.colors, vec!["Red", "Blue"]);
    assert_eq!(record.color_images.len(), 1);
    assert_eq!(
        record.color_images.get("Red").unwrap(),
        &vec![
            "https://cdn.example/product/red-1.jpg".to_string(),
            "https://cdn.example/product/red-2.jpg".to_string(),
        ]
    );

    let stored = shared.lock().unwrap().get_record(PRODUCT).unwrap().unwrap();
    let payload: serde_json::Value = serde_json::from_str(&stored.payload).unwrap();
    assert_eq!(payload["colorImages"]["Red"].as_array().unwrap().len(), 2);
    assert!(payload["colorImages"].get("Blue").is_none());
}

#[tokio::test]
async fn test_partial_record_after_retries_exhausted() {
    const PRODUCT: &str = "https://shop.example/shop/p/tee/7";

    let renderer = Arc::new(
        FixtureRenderer::new(VisibilityRules::default())
            .with_page(
                "https://shop.example/shop/c?page=1",
                catalog_page(&["/shop/p/tee/7"], 1, false),
            )
            .with_page(PRODUCT, product_page("7", "Tee"))
            .failing_first(PRODUCT, 5),
    );

    let memory = Arc::new(MemorySink::new());
    let storage = SqliteStorage::new_in_memory().unwrap();
    let config = create_test_config(ORIGIN, ":memory:");
    let harvester = harvester(config, storage, renderer.clone() as Arc<dyn Renderer>)
        .with_sink(Box::new(memory.clone()));
    let frontier = Arc::clone(harvester.frontier());

    let report = harvester.run().await.unwrap();

    // One initial attempt plus one retry
    assert_eq!(renderer.load_count(PRODUCT), 2);
    assert_eq!(report.product.failed, 1);
    assert_eq!(report.product.retried, 1);
    assert_eq!(report.records_total, 1);

    let records = memory.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].is_partial());
    assert_eq!(records[0].source_url, PRODUCT);
    assert!(records[0]
        .error_detail
        .as_deref()
        .unwrap()
        .contains("simulated failure 2 of 5"));

    assert_eq!(
        frontier.state_of(QueueKind::Product, PRODUCT).unwrap(),
        Some(RequestState::Failed)
    );
}

#[tokio::test]
async fn test_product_limit_skips_remaining_products() {
    let mut renderer = FixtureRenderer::new(VisibilityRules::default()).with_page(
        "https://shop.example/shop/c?page=1",
        catalog_page(&["/shop/p/a/1", "/shop/p/b/2", "/shop/p/c/3"], 1, false),
    );
    for id in 1..=3 {
        let product = ["a", "b", "c"][id - 1];
        renderer = renderer.with_page(
            &format!("https://shop.example/shop/p/{}/{}", product, id),
            product_page(&id.to_string(), product),
        );
    }
    let renderer = Arc::new(renderer);

    let mut config = create_test_config(ORIGIN, ":memory:");
    config.crawler.product_concurrency = 1;
    config.crawler.max_products = Some(1);

    let storage = SqliteStorage::new_in_memory().unwrap();
    let harvester = harvester(config, storage, renderer.clone() as Arc<dyn Renderer>);
    let frontier = Arc::clone(harvester.frontier());

    let report = harvester.run().await.unwrap();

    assert_eq!(report.records_total, 1);
    assert_eq!(report.product.skipped, 2);

    // The catalog page and a single product page
    assert_eq!(renderer.total_loads(), 2);

    let products = frontier.stats(QueueKind::Product).unwrap();
    assert_eq!(products.handled, 1);
    assert_eq!(products.skipped, 2);
}

#[tokio::test]
async fn test_rerun_does_not_duplicate_records() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");

    let renderer = || -> Arc<dyn Renderer> {
        Arc::new(
            FixtureRenderer::new(VisibilityRules::default())
                .with_page(
                    "https://shop.example/shop/c?page=1",
                    catalog_page(&["/shop/p/a/1", "/shop/p/b/2"], 1, false),
                )
                .with_page("https://shop.example/shop/p/a/1", product_page("1", "A"))
                .with_page("https://shop.example/shop/p/b/2", product_page("2", "B")),
        )
    };
    let config = create_test_config(ORIGIN, db_path.to_str().unwrap());

    let first = SqliteStorage::new(&db_path).unwrap();
    let report = harvester(config.clone(), first, renderer())
        .run()
        .await
        .unwrap();
    assert_eq!(report.records_total, 2);

    let memory = Arc::new(MemorySink::new());
    let second = SqliteStorage::new(&db_path).unwrap();
    let harvester = harvester(config, second, renderer()).with_sink(Box::new(memory.clone()));
    let shared = Arc::clone(harvester.storage());
    let report = harvester.run().await.unwrap();

    assert_eq!(report.records_total, 2);
    assert_eq!(report.product.processed, 0);
    assert!(memory.is_empty());

    let storage = shared.lock().unwrap();
    assert_eq!(storage.count_records().unwrap(), 2);
    assert_eq!(
        storage.get_latest_run().unwrap().unwrap().status,
        RunStatus::Completed
    );
}

#[tokio::test]
async fn test_interrupted_run_resumes() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");

    // A previous process claimed the start page and then died
    let mut storage = SqliteStorage::new(&db_path).unwrap();
    let run_id = storage.create_run("hash").unwrap();
    storage
        .add_if_absent(QueueKind::Catalog, "https://shop.example/shop/c?page=1", None)
        .unwrap();
    storage.claim_next(QueueKind::Catalog).unwrap().unwrap();
    drop(storage);

    let renderer: Arc<dyn Renderer> = Arc::new(
        FixtureRenderer::new(VisibilityRules::default())
            .with_page(
                "https://shop.example/shop/c?page=1",
                catalog_page(&["/shop/p/a/1"], 1, false),
            )
            .with_page("https://shop.example/shop/p/a/1", product_page("1", "A")),
    );

    let storage = SqliteStorage::new(&db_path).unwrap();
    let config = create_test_config(ORIGIN, db_path.to_str().unwrap());
    let harvester = harvester(config, storage, renderer);
    assert_eq!(harvester.run_id(), run_id);

    let report = harvester.run().await.unwrap();
    assert_eq!(report.run_id, run_id);
    assert_eq!(report.catalog.unwrap().processed, 1);
    assert_eq!(report.records_total, 1);
}
