use crate::descriptor::{CandidateList, ElementDescriptor};
use crate::policy::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub selectors: SelectorConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub delays: DelayConfig,
    #[serde(default)]
    pub dates: DateWindowConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default = "default_filters")]
    pub filters: Vec<ColumnFilterConfig>,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub alerts: AlertPolicyConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub landmark_policy: LandmarkPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            browser: BrowserConfig::default(),
            selectors: SelectorConfig::default(),
            timeouts: TimeoutConfig::default(),
            delays: DelayConfig::default(),
            dates: DateWindowConfig::default(),
            download: DownloadConfig::default(),
            filters: default_filters(),
            publish: PublishConfig::default(),
            alerts: AlertPolicyConfig::default(),
            secrets: SecretsConfig::default(),
            landmark_policy: LandmarkPolicy::default(),
        }
    }
}

/// What to do when a readiness landmark never shows up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkPolicy {
    /// Log, alert and keep going.
    #[default]
    Advisory,
    /// Abort the run.
    Required,
}

// ============================================================
// Site
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Direct URL of the report page, used when menu navigation fails.
    #[serde(default = "default_report_url")]
    pub report_url: String,
    /// Substring of the URL that identifies the login page.
    #[serde(default = "default_login_url_marker")]
    pub login_url_marker: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            report_url: default_report_url(),
            login_url_marker: default_login_url_marker(),
        }
    }
}

fn default_base_url() -> String {
    "https://dwmanagement.spx.com.br/".to_string()
}

fn default_report_url() -> String {
    "https://dwmanagement.spx.com.br/daily-worker-requests".to_string()
}

fn default_login_url_marker() -> String {
    "login".to_string()
}

// ============================================================
// Browser
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// External WebDriver endpoint. When unset, chromedriver is launched locally.
    #[serde(default)]
    pub webdriver_url: Option<String>,
    #[serde(default)]
    pub chromedriver_path: Option<PathBuf>,
    #[serde(default = "default_chromedriver_port")]
    pub chromedriver_port: u16,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: None,
            chromedriver_path: None,
            chromedriver_port: default_chromedriver_port(),
            headless: default_headless(),
            window_width: default_window_width(),
            window_height: default_window_height(),
            extra_args: Vec::new(),
        }
    }
}

fn default_chromedriver_port() -> u16 {
    9515
}

fn default_headless() -> bool {
    true
}

fn default_window_width() -> u32 {
    1920
}

fn default_window_height() -> u32 {
    1080
}

// ============================================================
// Selectors
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    #[serde(default)]
    pub login: LoginSelectors,
    /// Present once the dashboard shell has rendered after login.
    #[serde(default = "default_nav_landmark")]
    pub post_login_landmark: ElementDescriptor,
    #[serde(default = "default_nav_landmark")]
    pub menu_landmark: ElementDescriptor,
    /// Ways to reach the report page through the side menu.
    #[serde(default = "default_report_menu")]
    pub report_menu: CandidateList,
    #[serde(default = "default_from_date")]
    pub from_date: CandidateList,
    #[serde(default = "default_to_date")]
    pub to_date: CandidateList,
    #[serde(default)]
    pub report: ReportSelectors,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            login: LoginSelectors::default(),
            post_login_landmark: default_nav_landmark(),
            menu_landmark: default_nav_landmark(),
            report_menu: default_report_menu(),
            from_date: default_from_date(),
            to_date: default_to_date(),
            report: ReportSelectors::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginSelectors {
    #[serde(default = "default_email")]
    pub email: CandidateList,
    #[serde(default = "default_password")]
    pub password: CandidateList,
    #[serde(default = "default_submit")]
    pub submit: CandidateList,
}

impl Default for LoginSelectors {
    fn default() -> Self {
        Self {
            email: default_email(),
            password: default_password(),
            submit: default_submit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSelectors {
    #[serde(default = "default_open_panel")]
    pub open_panel: ElementDescriptor,
    #[serde(default = "default_generate")]
    pub generate: ElementDescriptor,
    #[serde(default = "default_export_menu")]
    pub export_menu: ElementDescriptor,
    #[serde(default = "default_export_csv")]
    pub export_csv: ElementDescriptor,
}

impl Default for ReportSelectors {
    fn default() -> Self {
        Self {
            open_panel: default_open_panel(),
            generate: default_generate(),
            export_menu: default_export_menu(),
            export_csv: default_export_csv(),
        }
    }
}

fn default_nav_landmark() -> ElementDescriptor {
    ElementDescriptor::xpath("//aside//nav")
}

fn default_email() -> CandidateList {
    CandidateList::new(vec![
        ElementDescriptor::id("data.email"),
        ElementDescriptor::xpath("//*[@id='data.email']"),
    ])
}

fn default_password() -> CandidateList {
    CandidateList::new(vec![
        ElementDescriptor::id("data.password"),
        ElementDescriptor::xpath("//*[@id='data.password']"),
    ])
}

fn default_submit() -> CandidateList {
    CandidateList::single(ElementDescriptor::xpath("//*[@id='form']/div[2]/div/button"))
}

fn default_report_menu() -> CandidateList {
    CandidateList::new(vec![
        ElementDescriptor::xpath("/html/body/div[1]/aside/nav/ul/li[1]/ul/li[2]/a"),
        ElementDescriptor::xpath("//aside//nav//ul//li[1]//ul//li[2]//a"),
        ElementDescriptor::xpath("//a[contains(@href, 'daily') or contains(text(), 'Daily')]"),
        ElementDescriptor::xpath("//nav//a[contains(text(), 'Daily')]"),
        ElementDescriptor::xpath("//a[contains(@href, 'daily-worker')]"),
        ElementDescriptor::css("a[href*='daily-worker']"),
    ])
}

fn date_field(field: &str) -> CandidateList {
    CandidateList::new(vec![
        ElementDescriptor::id(field),
        ElementDescriptor::css(format!("#{}", field.replace('.', "\\."))),
        ElementDescriptor::xpath(format!("//*[@id='{field}']")),
        ElementDescriptor::name(field),
    ])
}

fn default_from_date() -> CandidateList {
    date_field("data.fromDate")
}

fn default_to_date() -> CandidateList {
    date_field("data.toDate")
}

fn default_open_panel() -> ElementDescriptor {
    ElementDescriptor::xpath("/html/body/div[1]/div[1]/main/div/section/header/div[2]/div/button")
}

fn default_generate() -> ElementDescriptor {
    ElementDescriptor::xpath(
        "/html/body/div[1]/div[1]/main/div/form[1]/div/div/div[2]/div/div/div[2]/div/button[1]/span[1]",
    )
}

fn default_export_menu() -> ElementDescriptor {
    ElementDescriptor::xpath("/html/body/div[1]/div[1]/div/nav/div/div[1]/div[1]/button")
}

fn default_export_csv() -> ElementDescriptor {
    ElementDescriptor::xpath(
        "/html/body/div[1]/div[1]/div/nav/div/div[1]/div[2]/div/div[2]/div/div/div[2]/div/div[1]/div/div/div/div[2]/a[1]/span",
    )
}

// ============================================================
// Timeouts and delays
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_login_ms")]
    pub login_ms: u64,
    #[serde(default = "default_landmark_ms")]
    pub post_login_ready_ms: u64,
    #[serde(default = "default_landmark_ms")]
    pub menu_ms: u64,
    #[serde(default = "default_navigation_ms")]
    pub navigation_ms: u64,
    #[serde(default = "default_landmark_ms")]
    pub report_page_load_ms: u64,
    #[serde(default = "default_navigation_ms")]
    pub report_form_ms: u64,
    #[serde(default = "default_date_script_ms")]
    pub date_script_ms: u64,
    #[serde(default = "default_date_native_ms")]
    pub date_native_ms: u64,
    #[serde(default = "default_click_ms")]
    pub click_ms: u64,
    #[serde(default = "default_download_ms")]
    pub download_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_post_find_delay_ms")]
    pub post_find_delay_ms: u64,
    #[serde(default = "default_scroll_settle_ms")]
    pub scroll_settle_ms: u64,
}

impl TimeoutConfig {
    /// Builds a retry policy with the shared poll/settle settings.
    pub fn policy(&self, timeout_ms: u64) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(timeout_ms),
            poll_interval: self.poll_interval(),
            post_find_delay: Duration::from_millis(self.post_find_delay_ms),
            scroll_settle: Duration::from_millis(self.scroll_settle_ms),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn login_policy(&self) -> RetryPolicy {
        self.policy(self.login_ms)
    }

    pub fn navigation_policy(&self) -> RetryPolicy {
        self.policy(self.navigation_ms)
    }

    pub fn date_script_policy(&self) -> RetryPolicy {
        self.policy(self.date_script_ms)
    }

    pub fn date_native_policy(&self) -> RetryPolicy {
        self.policy(self.date_native_ms)
    }

    pub fn click_policy(&self) -> RetryPolicy {
        self.policy(self.click_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            login_ms: default_login_ms(),
            post_login_ready_ms: default_landmark_ms(),
            menu_ms: default_landmark_ms(),
            navigation_ms: default_navigation_ms(),
            report_page_load_ms: default_landmark_ms(),
            report_form_ms: default_navigation_ms(),
            date_script_ms: default_date_script_ms(),
            date_native_ms: default_date_native_ms(),
            click_ms: default_click_ms(),
            download_ms: default_download_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            post_find_delay_ms: default_post_find_delay_ms(),
            scroll_settle_ms: default_scroll_settle_ms(),
        }
    }
}

fn default_login_ms() -> u64 {
    20_000
}

fn default_landmark_ms() -> u64 {
    30_000
}

fn default_navigation_ms() -> u64 {
    20_000
}

fn default_date_script_ms() -> u64 {
    15_000
}

fn default_date_native_ms() -> u64 {
    10_000
}

fn default_click_ms() -> u64 {
    30_000
}

fn default_download_ms() -> u64 {
    60_000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_post_find_delay_ms() -> u64 {
    500
}

fn default_scroll_settle_ms() -> u64 {
    1_000
}

/// Fixed waits that stand in for readiness signals the dashboard does not expose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayConfig {
    #[serde(default = "default_post_login_ms")]
    pub post_login_ms: u64,
    #[serde(default = "default_menu_render_ms")]
    pub menu_render_ms: u64,
    #[serde(default = "default_retry_pause_ms")]
    pub menu_retry_ms: u64,
    #[serde(default = "default_menu_render_ms")]
    pub report_page_settle_ms: u64,
    #[serde(default = "default_retry_pause_ms")]
    pub navigation_retry_ms: u64,
    #[serde(default = "default_between_fields_ms")]
    pub between_fields_ms: u64,
    /// Report generation runs server-side with no completion signal.
    #[serde(default = "default_report_generation_ms")]
    pub report_generation_ms: u64,
}

impl DelayConfig {
    pub fn post_login(&self) -> Duration {
        Duration::from_millis(self.post_login_ms)
    }

    pub fn menu_render(&self) -> Duration {
        Duration::from_millis(self.menu_render_ms)
    }

    pub fn menu_retry(&self) -> Duration {
        Duration::from_millis(self.menu_retry_ms)
    }

    pub fn report_page_settle(&self) -> Duration {
        Duration::from_millis(self.report_page_settle_ms)
    }

    pub fn navigation_retry(&self) -> Duration {
        Duration::from_millis(self.navigation_retry_ms)
    }

    pub fn between_fields(&self) -> Duration {
        Duration::from_millis(self.between_fields_ms)
    }

    pub fn report_generation(&self) -> Duration {
        Duration::from_millis(self.report_generation_ms)
    }

    /// All delays zeroed. Handy for tests against fake browsers.
    pub fn none() -> Self {
        Self {
            post_login_ms: 0,
            menu_render_ms: 0,
            menu_retry_ms: 0,
            report_page_settle_ms: 0,
            navigation_retry_ms: 0,
            between_fields_ms: 0,
            report_generation_ms: 0,
        }
    }
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            post_login_ms: default_post_login_ms(),
            menu_render_ms: default_menu_render_ms(),
            menu_retry_ms: default_retry_pause_ms(),
            report_page_settle_ms: default_menu_render_ms(),
            navigation_retry_ms: default_retry_pause_ms(),
            between_fields_ms: default_between_fields_ms(),
            report_generation_ms: default_report_generation_ms(),
        }
    }
}

fn default_post_login_ms() -> u64 {
    5_000
}

fn default_menu_render_ms() -> u64 {
    3_000
}

fn default_retry_pause_ms() -> u64 {
    5_000
}

fn default_between_fields_ms() -> u64 {
    1_000
}

fn default_report_generation_ms() -> u64 {
    10_000
}

// ============================================================
// Report window and artifacts
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateWindowConfig {
    #[serde(default = "default_days_offset")]
    pub days_before: u32,
    #[serde(default = "default_days_offset")]
    pub days_after: u32,
    /// chrono format string used when typing the dates.
    #[serde(default = "default_date_format")]
    pub format: String,
}

impl Default for DateWindowConfig {
    fn default() -> Self {
        Self {
            days_before: default_days_offset(),
            days_after: default_days_offset(),
            format: default_date_format(),
        }
    }
}

fn default_days_offset() -> u32 {
    5
}

fn default_date_format() -> String {
    "%d/%m/%Y".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Relative paths are resolved against the working directory.
    #[serde(default = "default_download_dir")]
    pub directory: PathBuf,
    #[serde(default = "default_artifact_extension")]
    pub artifact_extension: String,
    #[serde(default = "default_partial_extension")]
    pub partial_extension: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            directory: default_download_dir(),
            artifact_extension: default_artifact_extension(),
            partial_extension: default_partial_extension(),
        }
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_artifact_extension() -> String {
    "csv".to_string()
}

fn default_partial_extension() -> String {
    "crdownload".to_string()
}

/// Keep only rows whose value in the matched column is one of `allowed_values`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnFilterConfig {
    pub label: String,
    /// Case-insensitive fragments searched for in the header names.
    #[serde(default)]
    pub name_contains: Vec<String>,
    /// Zero-based column used when no header matches.
    #[serde(default)]
    pub fallback_index: Option<usize>,
    pub allowed_values: Vec<String>,
}

fn default_filters() -> Vec<ColumnFilterConfig> {
    vec![
        ColumnFilterConfig {
            label: "operation".to_string(),
            name_contains: vec!["oper".to_string(), "operação".to_string()],
            fallback_index: Some(12),
            allowed_values: vec!["FMH".to_string(), "OF".to_string(), "LMH".to_string()],
        },
        ColumnFilterConfig {
            label: "region".to_string(),
            name_contains: vec!["regi".to_string(), "região".to_string()],
            fallback_index: Some(8),
            allowed_values: vec!["SPM".to_string(), "SPI".to_string()],
        },
    ]
}

// ============================================================
// Publishing, alerts, secrets
// ============================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishTarget {
    #[default]
    GoogleSheets,
    CsvDirectory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default)]
    pub target: PublishTarget,
    #[serde(default = "default_spreadsheet")]
    pub spreadsheet: String,
    #[serde(default = "default_worksheet")]
    pub worksheet: String,
    /// Service-account JSON key used to mint API tokens.
    #[serde(default = "default_service_account_file")]
    pub service_account_file: PathBuf,
    /// Environment variable that, when set, supplies a ready-made bearer
    /// token and bypasses the key file.
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,
    #[serde(default = "default_batch_rows")]
    pub batch_rows: usize,
    /// Root directory for the `csv_directory` target.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            target: PublishTarget::default(),
            spreadsheet: default_spreadsheet(),
            worksheet: default_worksheet(),
            service_account_file: default_service_account_file(),
            access_token_env: default_access_token_env(),
            batch_rows: default_batch_rows(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_spreadsheet() -> String {
    "GET_BPO".to_string()
}

fn default_worksheet() -> String {
    "Base".to_string()
}

fn default_service_account_file() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_access_token_env() -> String {
    "GOOGLE_OAUTH_ACCESS_TOKEN".to_string()
}

fn default_batch_rows() -> usize {
    10_000
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("published")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPolicyConfig {
    #[serde(default = "default_true")]
    pub notify_on_failure: bool,
    /// Alert when an advisory readiness wait times out.
    #[serde(default = "default_true")]
    pub notify_on_degraded: bool,
}

impl Default for AlertPolicyConfig {
    fn default() -> Self {
        Self {
            notify_on_failure: true,
            notify_on_degraded: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,
    #[serde(default = "default_alert_file")]
    pub alert_file: PathBuf,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            credentials_file: default_credentials_file(),
            alert_file: default_alert_file(),
        }
    }
}

fn default_credentials_file() -> PathBuf {
    PathBuf::from("credentials.yaml")
}

fn default_alert_file() -> PathBuf {
    PathBuf::from("alert.yaml")
}
