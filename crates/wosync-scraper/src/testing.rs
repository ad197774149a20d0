//! In-memory stand-ins for Chrome, the result store, and worker processes.

use crate::error::Result;
use crate::factory::SessionFactory;
use crate::portal::{anchor_xpath, field_locators, PortalSettings, NAV_FRAME, RESULTS_FRAME};
use crate::profiles::SessionProfile;
use crate::session::ScrapeSession;
use crate::supervisor::WorkerLauncher;
use crate::worker::{run_worker, WorkerOutcome, WorkerSpec, WorkerTemplate};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wosync_browser::{BrowserActions, BrowserError, Locator, Result as BrowserResult};
use wosync_core::{
    BrowserConfig, DatabaseConfig, Identity, ItemKind, PortalConfig, ScrapeResult, WorkItem,
};
use wosync_db::{DatabaseError, ResultSink};

pub(crate) const LOGIN_URL: &str = "https://portal.test/login";
pub(crate) const LOGIN_TITLE: &str = "Sign In";
pub(crate) const SECOND_FACTOR_TITLE: &str = "Second Factor";
pub(crate) const LANDING_TITLE: &str = "Service Desk";

pub(crate) fn test_settings() -> PortalSettings {
    PortalSettings {
        login_url: LOGIN_URL.to_string(),
        login_title: LOGIN_TITLE.to_string(),
        second_factor_title: SECOND_FACTOR_TITLE.to_string(),
        landing_title: LANDING_TITLE.to_string(),
        trust_button_id: "trust-browser-button".to_string(),
        trust_check: Duration::from_millis(20),
        second_factor_timeout: Duration::from_millis(50),
        page_timeout: Duration::from_millis(50),
    }
}

pub(crate) fn test_template() -> WorkerTemplate {
    WorkerTemplate {
        identity: Identity::new("oski", "go-bears", true),
        headless: true,
        browser: BrowserConfig::default(),
        portal: PortalConfig::default(),
        database: DatabaseConfig::default(),
    }
}

pub(crate) fn fake_profile(instance_id: u32) -> SessionProfile {
    let identity_hash = test_template().identity.hash();
    SessionProfile {
        storage_path: PathBuf::from("/profiles")
            .join(identity_hash.as_str())
            .join(format!("p{instance_id}")),
        identity_hash,
        instance_id,
        authenticated: false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoginBehavior {
    Trusted,
    SecondFactorApproves,
    SecondFactorNeverApproves,
    RejectCredentials,
}

/// What a [`FakeBrowser`] saw.
#[derive(Debug, Default)]
pub(crate) struct BrowserLog {
    pub title: String,
    pub filled: HashMap<String, String>,
    pub categories: Vec<String>,
    pub searches: Vec<String>,
    /// Query whose results the frame currently shows
    pub current: Option<String>,
    /// The results document carries the stale tag
    pub stale: bool,
    /// Submitted query and when its results replace the frame
    pub pending: Option<(String, Instant)>,
    pub trust_clicked: bool,
    pub closed: bool,
}

/// Search query to (XPath to cell text).
type Pages = HashMap<String, HashMap<String, String>>;

type Events = Arc<Mutex<Vec<String>>>;

fn push(events: &Events, event: String) {
    events.lock().expect("events lock").push(event);
}

/// A portal that answers from canned result pages.
#[derive(Clone)]
pub(crate) struct FakeBrowser {
    behavior: LoginBehavior,
    instance_id: u32,
    pages: Arc<Pages>,
    results_delay: Duration,
    log: Arc<Mutex<BrowserLog>>,
    events: Option<Events>,
}

impl FakeBrowser {
    pub fn new(behavior: LoginBehavior) -> Self {
        Self {
            behavior,
            instance_id: 0,
            pages: Arc::new(Pages::new()),
            results_delay: Duration::ZERO,
            log: Arc::default(),
            events: None,
        }
    }

    pub fn log(&self) -> Arc<Mutex<BrowserLog>> {
        self.log.clone()
    }

    pub fn with_request(self, id: u64, fields: &[(&str, &str)]) -> Self {
        self.with_page(&WorkItem::request(id), fields)
    }

    pub fn with_order(self, id: u64, fields: &[(&str, &str)]) -> Self {
        self.with_page(&WorkItem::order("WO", id), fields)
    }

    /// Results replace the frame only `delay` after the search is clicked.
    pub fn with_results_delay(mut self, delay: Duration) -> Self {
        self.results_delay = delay;
        self
    }

    fn with_page(mut self, item: &WorkItem, fields: &[(&str, &str)]) -> Self {
        let kind = item.kind();
        let mut page: HashMap<String, String> = HashMap::new();
        page.insert(anchor_xpath(kind).to_string(), "for 0".to_string());
        for (name, text) in fields {
            if let Some((_, xpath)) = field_locators(kind).iter().find(|(n, _)| n == name) {
                page.insert((*xpath).to_string(), (*text).to_string());
            }
        }
        Arc::make_mut(&mut self.pages).insert(item.key(), page);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BrowserLog> {
        self.log.lock().expect("browser log lock")
    }

    /// Swap in the pending results page once its load time has passed.
    fn settle(log: &mut BrowserLog) {
        if let Some((query, ready_at)) = log.pending.take() {
            if Instant::now() >= ready_at {
                log.current = Some(query);
                log.stale = false;
            } else {
                log.pending = Some((query, ready_at));
            }
        }
    }

    fn page_has(&self, log: &BrowserLog, expr: &str) -> bool {
        log.current
            .as_ref()
            .and_then(|query| self.pages.get(query))
            .is_some_and(|page| page.contains_key(expr))
    }
}

#[async_trait]
impl BrowserActions for FakeBrowser {
    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        let mut log = self.lock();
        log.title = if url != LOGIN_URL {
            String::new()
        } else if self.behavior == LoginBehavior::Trusted {
            LANDING_TITLE.to_string()
        } else {
            LOGIN_TITLE.to_string()
        };
        Ok(())
    }

    async fn title(&self) -> BrowserResult<String> {
        Ok(self.lock().title.clone())
    }

    async fn is_present(&self, locator: &Locator) -> BrowserResult<bool> {
        let mut log = self.lock();
        Self::settle(&mut log);
        Ok(match locator.frame() {
            None if locator.expr() == "#trust-browser-button" => {
                self.behavior == LoginBehavior::SecondFactorApproves
                    && log.title == SECOND_FACTOR_TITLE
            }
            Some(NAV_FRAME) => true,
            Some(RESULTS_FRAME) => self.page_has(&log, locator.expr()),
            _ => false,
        })
    }

    async fn fill_field(&self, locator: &Locator, value: &str) -> BrowserResult<()> {
        self.lock()
            .filled
            .insert(locator.expr().to_string(), value.to_string());
        Ok(())
    }

    async fn click(&self, locator: &Locator) -> BrowserResult<()> {
        let mut log = self.lock();
        match locator.expr() {
            "#submit" => {
                log.title = match self.behavior {
                    LoginBehavior::Trusted => LANDING_TITLE,
                    LoginBehavior::SecondFactorApproves
                    | LoginBehavior::SecondFactorNeverApproves => SECOND_FACTOR_TITLE,
                    LoginBehavior::RejectCredentials => LOGIN_TITLE,
                }
                .to_string();
            }
            "#trust-browser-button" => {
                log.trust_clicked = true;
                log.title = LANDING_TITLE.to_string();
            }
            expr if expr.contains("arrowbutton") => {
                let query = log
                    .filled
                    .get("input[name='WorkOrderNumber']")
                    .cloned()
                    .unwrap_or_default();
                log.searches.push(query.clone());
                if self.results_delay.is_zero() {
                    log.current = Some(query);
                    log.stale = false;
                } else {
                    log.pending = Some((query, Instant::now() + self.results_delay));
                }
            }
            expr => return Err(BrowserError::SelectorNotFound(expr.to_string())),
        }
        Ok(())
    }

    async fn select_option(&self, _locator: &Locator, value: &str) -> BrowserResult<()> {
        self.lock().categories.push(value.to_string());
        Ok(())
    }

    async fn extract_text(&self, locator: &Locator) -> BrowserResult<String> {
        let mut log = self.lock();
        Self::settle(&mut log);
        log.current
            .as_ref()
            .and_then(|query| self.pages.get(query))
            .and_then(|page| page.get(locator.expr()))
            .cloned()
            .ok_or_else(|| BrowserError::SelectorNotFound(locator.expr().to_string()))
    }

    async fn mark_stale(&self, locator: &Locator) -> BrowserResult<()> {
        if locator.frame() == Some(RESULTS_FRAME) {
            self.lock().stale = true;
        }
        Ok(())
    }

    async fn is_reloaded(&self, locator: &Locator) -> BrowserResult<bool> {
        let mut log = self.lock();
        Self::settle(&mut log);
        Ok(locator.frame() == Some(RESULTS_FRAME) && !log.stale)
    }

    async fn close(self) -> BrowserResult<()> {
        self.lock().closed = true;
        if let Some(events) = &self.events {
            push(events, format!("close {}", self.instance_id));
        }
        Ok(())
    }
}

/// Sink that keeps results in memory and can refuse chosen item ids.
#[derive(Debug, Default)]
pub(crate) struct MemorySink {
    results: Mutex<Vec<ScrapeResult>>,
    fail_on: HashSet<String>,
}

impl MemorySink {
    pub fn failing_on(ids: &[&str]) -> Self {
        Self {
            results: Mutex::default(),
            fail_on: ids.iter().map(|id| (*id).to_string()).collect(),
        }
    }

    pub fn results(&self) -> Vec<ScrapeResult> {
        self.results.lock().expect("sink lock").clone()
    }

    pub fn ids(&self) -> Vec<String> {
        self.results().into_iter().map(|r| r.item_id).collect()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn write(&self, result: &ScrapeResult) -> wosync_db::Result<()> {
        if self.fail_on.contains(&result.item_id) {
            return Err(DatabaseError::Open("connection reset".to_string()));
        }
        self.results.lock().expect("sink lock").push(result.clone());
        Ok(())
    }
}

/// Opens [`FakeBrowser`] sessions and records every open.
#[derive(Clone)]
pub(crate) struct FakeFactory {
    template: FakeBrowser,
    behaviors: HashMap<u32, LoginBehavior>,
    opened: Arc<Mutex<Vec<(u32, bool)>>>,
    events: Events,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self {
            template: FakeBrowser::new(LoginBehavior::Trusted),
            behaviors: HashMap::new(),
            opened: Arc::default(),
            events: Arc::default(),
        }
    }

    pub fn with_request(mut self, id: u64, fields: &[(&str, &str)]) -> Self {
        self.template = self.template.with_request(id, fields);
        self
    }

    pub fn with_order(mut self, id: u64, fields: &[(&str, &str)]) -> Self {
        self.template = self.template.with_order(id, fields);
        self
    }

    pub fn with_behavior(mut self, instance_id: u32, behavior: LoginBehavior) -> Self {
        self.behaviors.insert(instance_id, behavior);
        self
    }

    pub fn opened(&self) -> Vec<(u32, bool)> {
        self.opened.lock().expect("opened lock").clone()
    }

    pub fn event_log(&self) -> Events {
        self.events.clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("events lock").clone()
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    type Browser = FakeBrowser;

    async fn open(&self, instance_id: u32, headless: bool) -> Result<ScrapeSession<FakeBrowser>> {
        self.opened
            .lock()
            .expect("opened lock")
            .push((instance_id, headless));
        push(&self.events, format!("open {instance_id}"));

        let browser = FakeBrowser {
            behavior: self
                .behaviors
                .get(&instance_id)
                .copied()
                .unwrap_or(LoginBehavior::Trusted),
            instance_id,
            pages: self.template.pages.clone(),
            results_delay: self.template.results_delay,
            log: Arc::default(),
            events: Some(self.events.clone()),
        };
        let mut session = ScrapeSession::new(browser, fake_profile(instance_id), test_settings());
        session.authenticate(&test_template().identity).await?;
        Ok(session)
    }
}

/// Runs workers as tasks in this process instead of child processes.
pub(crate) struct InProcessLauncher {
    factory: FakeFactory,
    sink: Arc<MemorySink>,
}

impl InProcessLauncher {
    pub fn new(factory: FakeFactory, sink: Arc<MemorySink>) -> Self {
        Self { factory, sink }
    }
}

#[async_trait]
impl WorkerLauncher for InProcessLauncher {
    async fn launch(&self, spec: WorkerSpec) -> WorkerOutcome {
        push(
            &self.factory.events,
            format!("launch {}", spec.assignment.worker_index()),
        );
        run_worker(
            &self.factory,
            &*self.sink,
            &spec.assignment,
            spec.headless,
            &CancellationToken::new(),
        )
        .await
    }
}

#[test]
fn test_fake_pages_use_portal_locators() {
    let browser = FakeBrowser::new(LoginBehavior::Trusted).with_order(1, &[("trade", "HVAC")]);
    let page = browser.pages.get("WO1").expect("page");
    assert!(page.contains_key(anchor_xpath(ItemKind::Order)));
    assert_eq!(page.len(), 2);
}
