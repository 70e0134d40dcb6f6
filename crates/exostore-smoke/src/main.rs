//! Exostore Smoke Harness
//!
//! Exercises the offline worker end to end against a simulated storefront:
//! install and activate a version, browse online, cut the network and keep
//! browsing, handle push/sync side channels, then roll out a new version.
//! Prints a JSON summary with per-phase timings and check results.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::{Method, StatusCode};
use serde_json::json;
use tracing::{error, info};
use url::Url;

use exostore_sw::{
    FetchRequest, FetchResponse, Fetcher, NotificationClick, RequestMode, ServiceWorker,
    SwConfig, SwError, WorkerState,
};

/// Performance timing collector for tracking phase durations.
struct PerfTiming {
    timings: RefCell<Vec<(&'static str, Duration)>>,
}

impl PerfTiming {
    fn new() -> Self {
        Self {
            timings: RefCell::new(Vec::new()),
        }
    }

    fn record(&self, phase: &'static str, duration: Duration) {
        self.timings.borrow_mut().push((phase, duration));
    }

    fn summary(&self) -> serde_json::Value {
        let timings = self.timings.borrow();
        let mut summary = serde_json::Map::new();
        for (phase, duration) in timings.iter() {
            summary.insert(
                phase.to_string(),
                json!(format!("{:.3}ms", duration.as_secs_f64() * 1000.0)),
            );
        }
        serde_json::Value::Object(summary)
    }
}

/// Simulated storefront network with an external kill switch.
struct SimNet {
    site: HashMap<String, (u16, String)>,
    offline: Arc<AtomicBool>,
}

impl SimNet {
    fn storefront() -> (Self, Arc<AtomicBool>) {
        let mut site = HashMap::new();
        for (path, status, body) in [
            ("https://exostore.app/", 200, "<html>storefront</html>"),
            (
                "https://exostore.app/offline.html",
                200,
                "<html>you are offline</html>",
            ),
            (
                "https://exostore.app/manifest.json",
                200,
                r#"{"name":"Exostore"}"#,
            ),
            ("https://exostore.app/assets/index.css", 200, "body{margin:0}"),
            (
                "https://exostore.app/api/apps",
                200,
                r#"[{"id":1,"name":"Nebula"}]"#,
            ),
        ] {
            site.insert(path.to_string(), (status, body.to_string()));
        }
        let offline = Arc::new(AtomicBool::new(false));
        let switch = Arc::clone(&offline);
        (Self { site, offline }, switch)
    }
}

impl Fetcher for SimNet {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, SwError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SwError::FetchFailed("network unreachable".to_string()));
        }
        match self.site.get(request.url.as_str()) {
            Some((status, body)) => Ok(FetchResponse::new(
                StatusCode::from_u16(*status).unwrap_or(StatusCode::OK),
                body.clone(),
            )),
            None => Ok(FetchResponse::new(StatusCode::NOT_FOUND, "not found")),
        }
    }
}

/// Pass/fail ledger for the scenario checks.
struct Checks {
    passed: u32,
    failed: Vec<&'static str>,
}

impl Checks {
    fn new() -> Self {
        Self {
            passed: 0,
            failed: Vec::new(),
        }
    }

    fn check(&mut self, name: &'static str, ok: bool) {
        if ok {
            self.passed += 1;
        } else {
            error!(check = name, "Smoke check failed");
            self.failed.push(name);
        }
    }
}

fn navigate(url: &str) -> FetchRequest {
    FetchRequest::navigate(Url::parse(url).expect("static URL"))
}

fn get(url: &str) -> FetchRequest {
    FetchRequest::get(Url::parse(url).expect("static URL"))
}

async fn wait_for_entries(worker: &ServiceWorker<SimNet>, at_least: usize) {
    for _ in 0..200 {
        if worker.cache().entry_count().await >= at_least {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting Exostore smoke harness");
    let perf = PerfTiming::new();
    let mut checks = Checks::new();

    // Phase 1: install and activate v1.
    let (net, net_switch) = SimNet::storefront();
    let sync_ran = Arc::new(AtomicBool::new(false));
    let sync_flag = Arc::clone(&sync_ran);
    let worker = ServiceWorker::new(SwConfig::default(), net)
        .with_sync_handler(Box::new(move || sync_flag.store(true, Ordering::SeqCst)));

    let start = Instant::now();
    let installed = worker.install().await;
    perf.record("install", start.elapsed());
    checks.check("install_succeeds", installed.is_ok());

    let start = Instant::now();
    let activated = worker.activate().await;
    perf.record("activate", start.elapsed());
    checks.check("activate_succeeds", activated.is_ok());
    checks.check(
        "state_activated",
        worker.state().await == WorkerState::Activated,
    );
    checks.check("precache_count", worker.cache().entry_count().await == 3);

    // Phase 2: browse while online.
    let start = Instant::now();
    let shell = worker.handle_fetch(&navigate("https://exostore.app/")).await;
    let css = worker
        .handle_fetch(&get("https://exostore.app/assets/index.css"))
        .await;
    let api = worker
        .handle_fetch(&get("https://exostore.app/api/apps"))
        .await;
    perf.record("online_browse", start.elapsed());

    checks.check(
        "online_navigation_live",
        matches!(&shell, Ok(Some(r)) if !r.from_cache && r.status == StatusCode::OK),
    );
    checks.check("online_asset_served", matches!(&css, Ok(Some(_))));
    checks.check("online_api_served", matches!(&api, Ok(Some(_))));

    // 3 precached entries; the shell write overwrites the precached root,
    // css and api add two more.
    wait_for_entries(&worker, 5).await;

    // Phase 3: network drops.
    net_switch.store(true, Ordering::SeqCst);
    info!("Network switched off");

    let start = Instant::now();
    let shell = worker.handle_fetch(&navigate("https://exostore.app/")).await;
    let unknown = worker
        .handle_fetch(&navigate("https://exostore.app/apps/detail/42"))
        .await;
    let css = worker
        .handle_fetch(&get("https://exostore.app/assets/index.css"))
        .await;
    let api = worker
        .handle_fetch(&get("https://exostore.app/api/apps"))
        .await;
    let fresh = worker
        .handle_fetch(&get("https://exostore.app/api/fresh"))
        .await;
    let post = worker
        .handle_fetch(&FetchRequest::new(
            Method::POST,
            Url::parse("https://exostore.app/api/ratings").expect("static URL"),
            RequestMode::NoCors,
        ))
        .await;
    perf.record("offline_browse", start.elapsed());

    checks.check(
        "offline_navigation_cached",
        matches!(&shell, Ok(Some(r)) if r.from_cache && r.body.as_ref() == b"<html>storefront</html>"),
    );
    checks.check(
        "offline_unknown_gets_offline_doc",
        matches!(&unknown, Ok(Some(r)) if r.body.as_ref() == b"<html>you are offline</html>"),
    );
    checks.check(
        "offline_asset_cache_first",
        matches!(&css, Ok(Some(r)) if r.from_cache),
    );
    checks.check(
        "offline_api_fallback",
        matches!(&api, Ok(Some(r)) if r.from_cache),
    );
    checks.check("offline_uncached_api_fails", fresh.is_err());
    checks.check("post_passthrough", matches!(&post, Ok(None)));

    // Phase 4: side channels.
    let notification = worker.handle_push(Some("3 new apps this week"));
    checks.check(
        "push_notification_body",
        notification.body == "3 new apps this week" && notification.actions.len() == 2,
    );
    let click = worker.handle_notification_click("explore").await;
    checks.check(
        "notification_click_opens_root",
        matches!(click, Ok(NotificationClick::Opened { ref url }) if url == "https://exostore.app/"),
    );
    checks.check("sync_known_tag", worker.handle_sync("background-sync"));
    checks.check("sync_action_ran", sync_ran.load(Ordering::SeqCst));

    // Phase 5: roll out v2 and force the handover.
    net_switch.store(false, Ordering::SeqCst);
    let (net2, _switch2) = SimNet::storefront();
    let v2 = ServiceWorker::with_storage(
        SwConfig {
            version: "2.0.0".to_string(),
            ..Default::default()
        },
        net2,
        worker.cache().storage(),
    );

    let start = Instant::now();
    let v2_install = v2.install().await;
    let v2_takeover = v2.handle_message(r#"{"type": "SKIP_WAITING"}"#).await;
    perf.record("upgrade", start.elapsed());

    checks.check("v2_install", v2_install.is_ok());
    checks.check("v2_takeover", v2_takeover.is_ok());
    checks.check("v2_activated", v2.state().await == WorkerState::Activated);
    let names = v2.cache().storage().read().await.names();
    checks.check(
        "single_store_after_upgrade",
        names == vec!["exostore-v2.0.0".to_string()],
    );

    let summary = json!({
        "timings": perf.summary(),
        "checks_passed": checks.passed,
        "checks_failed": checks.failed,
    });
    println!("{}", serde_json::to_string_pretty(&summary).expect("summary json"));

    if checks.failed.is_empty() {
        info!(passed = checks.passed, "Smoke harness completed");
    } else {
        error!(failed = checks.failed.len(), "Smoke harness FAILED");
        std::process::exit(1);
    }
}
