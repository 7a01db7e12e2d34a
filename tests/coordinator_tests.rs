//! Integration tests for the pagination coordinator over a scripted driver
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{mpsc, Notify};

use ozon_pulse::crawl_engine::context::CollectionContext;
use ozon_pulse::crawl_engine::coordinator::{PaginationCoordinator, TaskSpec};
use ozon_pulse::domain::task::CollectionStatus;
use ozon_pulse::infrastructure::browser::{
    DriverError, NetworkResponse, PageDriver, ScrollOutcome,
};
use ozon_pulse::infrastructure::config::AppConfig;

/// Config with millisecond pacing so the state machine runs fast
fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.user.request_delay_min_ms = 1;
    config.user.request_delay_max_ms = 2;
    config.advanced.scroll_settle_min_ms = 1;
    config.advanced.scroll_settle_max_ms = 2;
    config.advanced.retry_delay_ms = 1;
    config.advanced.stall_pass_limit = 3;
    config
}

/// Wrap list items into a composition-API envelope body
fn search_body(items: serde_json::Value) -> String {
    let inner = serde_json::to_string(&json!({ "items": items })).unwrap();
    json!({ "widgetStates": { "searchResultsV2-226897-default-1": inner } }).to_string()
}

fn detail_body(widgets: Vec<(&str, serde_json::Value)>) -> String {
    let mut states = serde_json::Map::new();
    for (key, value) in widgets {
        states.insert(key.to_string(), json!(serde_json::to_string(&value).unwrap()));
    }
    json!({ "widgetStates": states }).to_string()
}

fn list_item(sku: &str, title: &str, price: &str) -> serde_json::Value {
    json!({
        "action": { "link": format!("/product/item-{sku}/") },
        "title": title,
        "price": price,
    })
}

/// One scripted listing page: the envelope pushed when it loads, plus its
/// rendered markup
#[derive(Clone, Default)]
struct ScriptedPage {
    body: Option<String>,
    html: String,
}

struct ScriptedDriver {
    pages: Vec<ScriptedPage>,
    current_page: usize,
    detail_bodies: Vec<String>,
    detail_html: String,
    tx: mpsc::Sender<NetworkResponse>,
    rx: Option<mpsc::Receiver<NetworkResponse>>,
    scroll_notify: Option<Arc<Notify>>,
    closed: bool,
}

impl ScriptedDriver {
    fn new(pages: Vec<ScriptedPage>) -> Self {
        let (tx, rx) = mpsc::channel(64);
        Self {
            pages,
            current_page: 0,
            detail_bodies: Vec::new(),
            detail_html: "<html><body></body></html>".to_string(),
            tx,
            rx: Some(rx),
            scroll_notify: None,
            closed: false,
        }
    }

    async fn push_current_body(&mut self) {
        if let Some(body) = self.pages.get(self.current_page).and_then(|p| p.body.clone()) {
            let _ = self
                .tx
                .send(NetworkResponse {
                    url: "https://www.ozon.ru/api/composer-api.bx/page/json/v2?url=/search/"
                        .to_string(),
                    status: 200,
                    body,
                })
                .await;
        }
    }
}

#[async_trait]
impl PageDriver for ScriptedDriver {
    async fn navigate(&mut self, _url: &str) -> Result<(), DriverError> {
        self.current_page = 0;
        self.push_current_body().await;
        Ok(())
    }

    async fn scroll_step(&mut self) -> Result<ScrollOutcome, DriverError> {
        if let Some(notify) = &self.scroll_notify {
            notify.notify_one();
            // Give the observer a moment to react before the next pass
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        if self.current_page + 1 >= self.pages.len() {
            return Ok(ScrollOutcome::Exhausted);
        }
        self.current_page += 1;
        self.push_current_body().await;
        Ok(ScrollOutcome::Grew)
    }

    async fn visible_html(&mut self) -> Result<String, DriverError> {
        Ok(self
            .pages
            .get(self.current_page)
            .map(|p| p.html.clone())
            .unwrap_or_default())
    }

    async fn open_detail(&mut self, _url: &str) -> Result<String, DriverError> {
        if let Some(body) = self.detail_bodies.first().cloned() {
            let _ = self
                .tx
                .send(NetworkResponse {
                    url: "https://www.ozon.ru/api/composer-api.bx/page/json/v2?url=/product/"
                        .to_string(),
                    status: 200,
                    body,
                })
                .await;
        }
        Ok(self.detail_html.clone())
    }

    async fn expand_detail(&mut self) -> Result<String, DriverError> {
        if let Some(body) = self.detail_bodies.get(1).cloned() {
            let _ = self
                .tx
                .send(NetworkResponse {
                    url: "https://www.ozon.ru/api/composer-api.bx/page/json/v2?url=/product/"
                        .to_string(),
                    status: 200,
                    body,
                })
                .await;
        }
        Ok(self.detail_html.clone())
    }

    fn take_responses(&mut self) -> Option<mpsc::Receiver<NetworkResponse>> {
        self.rx.take()
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.closed = true;
        Ok(())
    }
}

fn spec(keyword: &str, max_items: u32, deep: bool) -> TaskSpec {
    TaskSpec {
        keyword: keyword.to_string(),
        max_items,
        deep_collect: deep,
    }
}

#[tokio::test]
async fn shallow_collection_dedupes_across_passes() {
    let pages = vec![
        ScriptedPage {
            body: Some(search_body(json!([
                list_item("1111111", "First", "1 000 ₽"),
                list_item("2222222", "Second", "2 000 ₽"),
            ]))),
            html: String::new(),
        },
        ScriptedPage {
            // The second pass repeats one SKU and adds one
            body: Some(search_body(json!([
                list_item("2222222", "Second again", "2 100 ₽"),
                list_item("3333333", "Third", "3 000 ₽"),
            ]))),
            html: String::new(),
        },
    ];

    let (context, _events) = CollectionContext::new(Arc::new(fast_config()));
    let mut coordinator = PaginationCoordinator::new(ScriptedDriver::new(pages), context).unwrap();

    let (tx, mut rx) = mpsc::channel(16);
    let summary = coordinator.run(spec("kw", 100, false), tx).await;
    coordinator.shutdown().await;

    assert_eq!(summary.status, CollectionStatus::Exhausted);
    assert_eq!(summary.merged, 3);
    assert_eq!(summary.degraded, 0);

    let mut records = Vec::new();
    while let Ok(record) = rx.try_recv() {
        records.push(record);
    }
    assert_eq!(records.len(), 3);

    // The duplicate SKU kept its first-pass value; price 2000, not 2100
    let second = records.iter().find(|r| r.sku == "2222222").unwrap();
    assert_eq!(second.title, "Second");
    assert_eq!(second.price, 2000.0);
    assert_eq!(second.keyword, "kw");
}

#[tokio::test]
async fn target_reached_stops_with_completed_status() {
    let pages = vec![ScriptedPage {
        body: Some(search_body(json!([
            list_item("1111111", "First", "1 000 ₽"),
            list_item("2222222", "Second", "2 000 ₽"),
            list_item("3333333", "Third", "3 000 ₽"),
        ]))),
        html: String::new(),
    }];

    let (context, _events) = CollectionContext::new(Arc::new(fast_config()));
    let mut coordinator = PaginationCoordinator::new(ScriptedDriver::new(pages), context).unwrap();

    let (tx, mut rx) = mpsc::channel(16);
    let summary = coordinator.run(spec("kw", 2, false), tx).await;
    coordinator.shutdown().await;

    assert_eq!(summary.status, CollectionStatus::Completed);
    assert_eq!(summary.merged, 2);

    let mut count = 0;
    while rx.try_recv().is_ok() {
        count += 1;
    }
    assert_eq!(count, 2);
}

#[tokio::test]
async fn deep_collection_merges_detail_phases_left_biased() {
    let pages = vec![ScriptedPage {
        body: Some(search_body(json!([list_item(
            "1681720585",
            "List title",
            "1 999 ₽"
        )]))),
        html: String::new(),
    }];

    let mut driver = ScriptedDriver::new(pages);
    driver.detail_bodies = vec![
        detail_body(vec![
            (
                "webProductHeading-1-default-1",
                json!({"title": "Detail title XB-500"}),
            ),
            (
                "webCurrentSeller-1-default-1",
                json!({"name": "SoundHub", "deliverySchema": "FBO"}),
            ),
            (
                "breadCrumbs-1-default-1",
                json!({"breadcrumbs": [{"text": "Электроника"}, {"text": "Наушники"}]}),
            ),
        ]),
        detail_body(vec![(
            "webCharacteristics-1-default-1",
            json!({"characteristics": [{"title": "Габариты", "short": [
                {"name": "Длина, мм", "values": [{"text": "1700"}]},
                {"name": "Вес, г", "values": [{"text": "240"}]}
            ]}]}),
        )]),
    ];

    let (context, _events) = CollectionContext::new(Arc::new(fast_config()));
    let mut coordinator = PaginationCoordinator::new(driver, context).unwrap();

    let (tx, mut rx) = mpsc::channel(16);
    let summary = coordinator.run(spec("kw", 10, true), tx).await;
    coordinator.shutdown().await;

    assert_eq!(summary.status, CollectionStatus::Exhausted);
    assert_eq!(summary.merged, 1);
    assert_eq!(summary.degraded, 0);

    let record = rx.try_recv().unwrap();
    // Detail-phase API beats the list-phase value for a conflicting field
    assert_eq!(record.title, "Detail title XB-500");
    // List-phase-only fields survive the merge
    assert_eq!(record.price, 1999.0);
    assert_eq!(record.seller_name, "SoundHub");
    assert_eq!(record.category, "Электроника > Наушники");
    // Second detail step delivered unit-normalized dimensions
    assert_eq!(record.length_cm, 170.0);
    assert_eq!(record.weight_g, 240.0);
}

#[tokio::test]
async fn cancellation_mid_scroll_flushes_merged_items() {
    // Endless listing: every page yields a fresh SKU
    let pages: Vec<ScriptedPage> = (0..50)
        .map(|i| ScriptedPage {
            body: Some(search_body(json!([list_item(
                &format!("{}", 1000000 + i),
                &format!("Item {i}"),
                "1 000 ₽",
            )]))),
            html: String::new(),
        })
        .collect();

    let notify = Arc::new(Notify::new());
    let mut driver = ScriptedDriver::new(pages);
    driver.scroll_notify = Some(Arc::clone(&notify));

    let (context, _events) = CollectionContext::new(Arc::new(fast_config()));
    let cancel_context = context.clone();
    let mut coordinator = PaginationCoordinator::new(driver, context).unwrap();

    tokio::spawn(async move {
        // Cancel while the second scroll is settling
        notify.notified().await;
        notify.notified().await;
        cancel_context.cancel();
    });

    let (tx, mut rx) = mpsc::channel(64);
    let summary = coordinator.run(spec("kw", 1000, false), tx).await;
    coordinator.shutdown().await;

    assert_eq!(summary.status, CollectionStatus::Aborted);
    // Everything merged before the cancel still came out
    let mut records = Vec::new();
    while let Ok(record) = rx.try_recv() {
        records.push(record);
    }
    assert!(!records.is_empty());
    assert_eq!(records.len(), summary.merged);
    assert!(records.iter().any(|r| r.sku == "1000000"));
}

#[tokio::test]
async fn interstitial_page_aborts_the_task() {
    let pages = vec![ScriptedPage {
        body: None,
        html: "<html><body>Доступ ограничен. Подтвердите, что вы не робот.</body></html>"
            .to_string(),
    }];

    let (context, _events) = CollectionContext::new(Arc::new(fast_config()));
    let mut coordinator = PaginationCoordinator::new(ScriptedDriver::new(pages), context).unwrap();

    let (tx, mut rx) = mpsc::channel(16);
    let summary = coordinator.run(spec("kw", 10, false), tx).await;
    coordinator.shutdown().await;

    assert_eq!(summary.status, CollectionStatus::Aborted);
    assert_eq!(summary.merged, 0);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn dom_fallback_complements_missing_interception() {
    // No API envelope at all; the rendered cards carry the data
    let pages = vec![ScriptedPage {
        body: None,
        html: r#"
            <div class="tile-root">
              <a href="/product/fallback-item-7777777/" class="tile-hover-target">
                <span class="tsBody500Medium">Fallback item</span>
              </a>
              <div>499 ₽</div>
            </div>
        "#
        .to_string(),
    }];

    let (context, _events) = CollectionContext::new(Arc::new(fast_config()));
    let mut coordinator = PaginationCoordinator::new(ScriptedDriver::new(pages), context).unwrap();

    let (tx, mut rx) = mpsc::channel(16);
    let summary = coordinator.run(spec("kw", 10, false), tx).await;
    coordinator.shutdown().await;

    assert_eq!(summary.status, CollectionStatus::Exhausted);
    assert_eq!(summary.merged, 1);

    let record = rx.try_recv().unwrap();
    assert_eq!(record.sku, "7777777");
    assert_eq!(record.title, "Fallback item");
    assert_eq!(record.price, 499.0);
}
