#![allow(dead_code)]

use async_trait::async_trait;
use dailypull_engine::alert::{AlertError, AlertNotifier};
use dailypull_engine::browser::{Browser, DriverError, ElementHandle};
use dailypull_engine::config::RunConfig;
use dailypull_engine::credentials::{CredentialError, CredentialStore, Credentials};
use dailypull_engine::interaction::channel::scripts;
use dailypull_engine::orchestrator::Collaborators;
use dailypull_engine::publish::{PublishError, SheetPublisher};
use dailypull_engine::table::Table;
use dailypull_engine::{ElementDescriptor, RetryPolicy};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const REPORT_CSV: &str = "ID,Nome,Região,Operação\n\
1,Ana,SPM,FMH\n\
2,Bruno,RJ,OF\n\
3,Carla,SPI,LMH\n\
4,Davi,SPM,XPT\n";

/// Side effect of clicking an element.
#[derive(Debug, Clone)]
pub enum ClickEffect {
    Navigate(String),
    Download { file_name: String, content: String },
}

#[derive(Debug, Clone)]
pub struct FakeElement {
    pub visible: bool,
    pub enabled: bool,
    pub value: String,
    pub clicks: usize,
    pub input_events: usize,
    pub change_events: usize,
    pub scrolls: usize,
    /// Native clicks that error before one goes through. `usize::MAX` never recovers.
    pub native_click_failures: usize,
    /// Injected scripts targeting this element error.
    pub script_error: bool,
    pub visible_after_scroll: bool,
    pub appears_after: Option<Duration>,
    pub on_click: Option<ClickEffect>,
}

impl Default for FakeElement {
    fn default() -> Self {
        Self {
            visible: true,
            enabled: true,
            value: String::new(),
            clicks: 0,
            input_events: 0,
            change_events: 0,
            scrolls: 0,
            native_click_failures: 0,
            script_error: false,
            visible_after_scroll: false,
            appears_after: None,
            on_click: None,
        }
    }
}

impl FakeElement {
    pub fn hidden() -> Self {
        Self {
            visible: false,
            ..Self::default()
        }
    }

    pub fn on_click(effect: ClickEffect) -> Self {
        Self {
            on_click: Some(effect),
            ..Self::default()
        }
    }
}

pub struct FakeState {
    pub elements: HashMap<String, FakeElement>,
    pub url: String,
    pub navigations: Vec<String>,
    pub resolve_log: Vec<String>,
    pub launched: bool,
    pub closed: bool,
    pub screenshots: usize,
    pub download_dir: Option<PathBuf>,
    pub ready_state: String,
    started: Instant,
}

/// In-memory page model. Elements are keyed by descriptor text, so
/// `id=data.email` and `xpath=//*[@id='data.email']` are distinct nodes.
#[derive(Clone)]
pub struct FakeBrowser {
    pub state: Arc<Mutex<FakeState>>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                elements: HashMap::new(),
                url: "about:blank".into(),
                navigations: Vec::new(),
                resolve_log: Vec::new(),
                launched: false,
                closed: false,
                screenshots: 0,
                download_dir: None,
                ready_state: "complete".into(),
                started: Instant::now(),
            })),
        }
    }

    pub fn with(self, descriptor: &ElementDescriptor, element: FakeElement) -> Self {
        self.insert(descriptor, element);
        self
    }

    pub fn insert(&self, descriptor: &ElementDescriptor, element: FakeElement) {
        self.state
            .lock()
            .unwrap()
            .elements
            .insert(descriptor.to_string(), element);
    }

    pub fn remove(&self, descriptor: &ElementDescriptor) {
        self.state
            .lock()
            .unwrap()
            .elements
            .remove(&descriptor.to_string());
    }

    pub fn update(&self, descriptor: &ElementDescriptor, f: impl FnOnce(&mut FakeElement)) {
        let mut state = self.state.lock().unwrap();
        let element = state
            .elements
            .get_mut(&descriptor.to_string())
            .expect("element registered");
        f(element);
    }

    pub fn element(&self, descriptor: &ElementDescriptor) -> FakeElement {
        self.state.lock().unwrap().elements[&descriptor.to_string()].clone()
    }

    pub fn resolve_count(&self, descriptor: &ElementDescriptor) -> usize {
        let key = descriptor.to_string();
        self.state
            .lock()
            .unwrap()
            .resolve_log
            .iter()
            .filter(|entry| **entry == key)
            .count()
    }

    pub fn resolve_log(&self) -> Vec<String> {
        self.state.lock().unwrap().resolve_log.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn is_launched(&self) -> bool {
        self.state.lock().unwrap().launched
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn screenshots(&self) -> usize {
        self.state.lock().unwrap().screenshots
    }

    /// A dashboard where every default selector's first candidate exists and
    /// the whole run can succeed.
    pub fn dashboard(config: &RunConfig) -> Self {
        let selectors = &config.selectors;
        let first = |list: &dailypull_engine::CandidateList| list.as_slice()[0].clone();
        let dashboard_url = format!("{}dashboard", config.site.base_url);

        Self::new()
            .with(&first(&selectors.login.email), FakeElement::default())
            .with(&first(&selectors.login.password), FakeElement::default())
            .with(
                &first(&selectors.login.submit),
                FakeElement::on_click(ClickEffect::Navigate(dashboard_url)),
            )
            .with(&selectors.post_login_landmark, FakeElement::default())
            .with(
                &first(&selectors.report_menu),
                FakeElement::on_click(ClickEffect::Navigate(config.site.report_url.clone())),
            )
            .with(&first(&selectors.from_date), FakeElement::default())
            .with(&first(&selectors.to_date), FakeElement::default())
            .with(&selectors.report.open_panel, FakeElement::default())
            .with(&selectors.report.generate, FakeElement::default())
            .with(&selectors.report.export_menu, FakeElement::default())
            .with(
                &selectors.report.export_csv,
                FakeElement::on_click(ClickEffect::Download {
                    file_name: "daily-worker-requests.csv".into(),
                    content: REPORT_CSV.into(),
                }),
            )
    }

    fn apply_click(state: &mut FakeState, key: &str) -> Result<(), DriverError> {
        let effect = {
            let element = state
                .elements
                .get_mut(key)
                .ok_or_else(|| DriverError::Stale { handle: key.into() })?;
            element.clicks += 1;
            element.on_click.clone()
        };
        match effect {
            Some(ClickEffect::Navigate(url)) => state.url = url,
            Some(ClickEffect::Download { file_name, content }) => {
                let dir = state
                    .download_dir
                    .clone()
                    .ok_or_else(|| DriverError::Other("no download dir".into()))?;
                std::fs::write(dir.join(file_name), content)
                    .map_err(|e| DriverError::Other(e.to_string()))?;
            }
            None => {}
        }
        Ok(())
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn launch(&mut self, download_dir: &Path) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.launched = true;
        state.download_dir = Some(download_dir.to_path_buf());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.launched && !state.closed
    }

    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.url = url.to_string();
        state.navigations.push(url.to_string());
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, DriverError> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn resolve(
        &mut self,
        descriptor: &ElementDescriptor,
    ) -> Result<Option<ElementHandle>, DriverError> {
        let mut state = self.state.lock().unwrap();
        let key = descriptor.to_string();
        state.resolve_log.push(key.clone());
        let elapsed = state.started.elapsed();
        Ok(state
            .elements
            .get(&key)
            .filter(|element| element.appears_after.is_none_or(|after| elapsed >= after))
            .map(|_| ElementHandle::new(key)))
    }

    async fn is_interactable(&mut self, handle: &ElementHandle) -> Result<bool, DriverError> {
        let state = self.state.lock().unwrap();
        let element = state
            .elements
            .get(handle.id())
            .ok_or_else(|| DriverError::Stale {
                handle: handle.id().into(),
            })?;
        Ok(element.visible && element.enabled)
    }

    async fn click(&mut self, handle: &ElementHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        if let Some(element) = state.elements.get_mut(handle.id()) {
            if element.native_click_failures > 0 {
                if element.native_click_failures != usize::MAX {
                    element.native_click_failures -= 1;
                }
                return Err(DriverError::Other("element click intercepted".into()));
            }
            if !element.visible {
                return Err(DriverError::NotInteractable {
                    target: handle.id().into(),
                    reason: "not visible".into(),
                });
            }
        }
        Self::apply_click(&mut state, handle.id())
    }

    async fn clear(&mut self, handle: &ElementHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        let element = state
            .elements
            .get_mut(handle.id())
            .ok_or_else(|| DriverError::Stale {
                handle: handle.id().into(),
            })?;
        element.value.clear();
        Ok(())
    }

    async fn send_keys(&mut self, handle: &ElementHandle, text: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        let element = state
            .elements
            .get_mut(handle.id())
            .ok_or_else(|| DriverError::Stale {
                handle: handle.id().into(),
            })?;
        element.value.push_str(text);
        element.input_events += text.chars().count();
        Ok(())
    }

    async fn execute_script(
        &mut self,
        script: &str,
        _args: Vec<Value>,
    ) -> Result<Value, DriverError> {
        if script.contains("document.readyState") {
            return Ok(json!(self.state.lock().unwrap().ready_state.clone()));
        }
        Ok(Value::Null)
    }

    async fn execute_on(
        &mut self,
        handle: &ElementHandle,
        script: &str,
        args: Vec<Value>,
    ) -> Result<Value, DriverError> {
        let mut state = self.state.lock().unwrap();
        let key = handle.id().to_string();
        let element = state
            .elements
            .get_mut(&key)
            .ok_or_else(|| DriverError::Stale {
                handle: key.clone(),
            })?;

        if script == scripts::SCROLL_INTO_VIEW {
            element.scrolls += 1;
            if element.visible_after_scroll {
                element.visible = true;
            }
            return Ok(json!(true));
        }
        if element.script_error {
            return Err(DriverError::Script("injected script rejected".into()));
        }
        if script == scripts::SET_VALUE {
            let value = args
                .first()
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            element.value = value.clone();
            for event in dispatched_bubbling_events(script) {
                match event.as_str() {
                    "input" => element.input_events += 1,
                    "change" => element.change_events += 1,
                    _ => {}
                }
            }
            return Ok(json!(value));
        }
        if script == scripts::CLICK {
            Self::apply_click(&mut state, &key)?;
            return Ok(json!(true));
        }
        Err(DriverError::Script(format!("unexpected script: {script}")))
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, DriverError> {
        self.state.lock().unwrap().screenshots += 1;
        Ok(vec![0x89, b'P', b'N', b'G'])
    }
}

/// Names of events the script dispatches on `el` with `bubbles: true`, in
/// statement order. Events that are built but never dispatched, dispatched on
/// another target, or that do not bubble are skipped, since page listeners
/// on ancestors would never see them.
fn dispatched_bubbling_events(script: &str) -> Vec<String> {
    script
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix("el.dispatchEvent(new Event('"))
        .filter_map(|rest| {
            let (name, options) = rest.split_once('\'')?;
            options
                .contains("bubbles: true")
                .then(|| name.to_string())
        })
        .collect()
}

/// Short timeouts and no fixed delays.
pub fn test_config(download_dir: &Path) -> RunConfig {
    let mut config = RunConfig::default();
    let t = &mut config.timeouts;
    t.login_ms = 200;
    t.post_login_ready_ms = 150;
    t.menu_ms = 150;
    t.navigation_ms = 60;
    t.report_page_load_ms = 150;
    t.report_form_ms = 150;
    t.date_script_ms = 60;
    t.date_native_ms = 60;
    t.click_ms = 200;
    t.download_ms = 500;
    t.poll_interval_ms = 10;
    t.post_find_delay_ms = 0;
    t.scroll_settle_ms = 0;
    config.delays = dailypull_engine::config::DelayConfig::none();
    config.download.directory = download_dir.to_path_buf();
    config
}

pub fn fast_policy(timeout_ms: u64) -> RetryPolicy {
    RetryPolicy::with_timeout(Duration::from_millis(timeout_ms))
        .poll_interval(Duration::from_millis(10))
        .post_find_delay(Duration::ZERO)
        .scroll_settle(Duration::ZERO)
}

pub struct StaticCredentials(pub Option<Credentials>);

impl CredentialStore for StaticCredentials {
    fn lookup(&self) -> Result<Option<Credentials>, CredentialError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone)]
pub struct Published {
    pub rows: usize,
    pub destination: String,
    pub tab: String,
}

#[derive(Clone, Default)]
pub struct RecordingPublisher {
    pub calls: Arc<Mutex<Vec<Published>>>,
    pub fail: bool,
}

#[async_trait]
impl SheetPublisher for RecordingPublisher {
    async fn publish(
        &self,
        table: &Table,
        destination: &str,
        tab: &str,
    ) -> Result<String, PublishError> {
        if self.fail {
            return Err(PublishError::PermissionDenied(destination.to_string()));
        }
        self.calls.lock().unwrap().push(Published {
            rows: table.len(),
            destination: destination.to_string(),
            tab: tab.to_string(),
        });
        Ok(format!("https://sheets.example/{destination}#{tab}"))
    }
}

#[derive(Debug, Clone)]
pub struct Alert {
    pub context: String,
    pub message: String,
    pub with_screenshot: bool,
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    pub alerts: Arc<Mutex<Vec<Alert>>>,
}

impl RecordingNotifier {
    pub fn contexts(&self) -> Vec<String> {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .map(|alert| alert.context.clone())
            .collect()
    }
}

#[async_trait]
impl AlertNotifier for RecordingNotifier {
    async fn notify_failure(
        &self,
        context: &str,
        message: &str,
        screenshot: Option<&[u8]>,
    ) -> Result<(), AlertError> {
        self.alerts.lock().unwrap().push(Alert {
            context: context.to_string(),
            message: message.to_string(),
            with_screenshot: screenshot.is_some(),
        });
        Ok(())
    }
}

pub fn collaborators(
    credentials: Option<Credentials>,
    publisher: &RecordingPublisher,
    notifier: &RecordingNotifier,
) -> Collaborators {
    Collaborators {
        credentials: Box::new(StaticCredentials(credentials)),
        publisher: Box::new(publisher.clone()),
        notifier: Box::new(notifier.clone()),
    }
}

pub fn credentials() -> Option<Credentials> {
    Some(Credentials::new("ops@example.com", "s3cret"))
}
