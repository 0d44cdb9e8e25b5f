//! Drives one report run from login to publish.
//!
//! Stages run strictly in sequence. Authentication and date entry abort the
//! run when they fail; the readiness waits in between only degrade it unless
//! `landmark_policy` is `required`. The browser session is closed on every
//! exit path once it has been launched.

use crate::alert::{AlertNotifier, LogOnlyNotifier, SmtpAlertNotifier, SmtpSettings, notify_best_effort};
use crate::browser::{Browser, DriverError};
use crate::config::{LandmarkPolicy, PublishTarget, RunConfig};
use crate::credentials::{CredentialStore, Credentials, FileCredentialStore};
use crate::download::{DownloadError, DownloadWatcher};
use crate::interaction::{self, Action};
use crate::navigator::{self, Attempt, CandidateHit};
use crate::publish::{CsvDirectoryPublisher, GoogleSheetsPublisher, PublishError, SheetPublisher};
use crate::readiness::{self, ReadyProbe};
use crate::table::{Table, TableError};
use chrono::{Local, NaiveDate, TimeDelta};
use dailypull_common::error::InteractionError;
use dailypull_common::{ElementDescriptor, InteractionChannel};
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Tolerance for filesystems with coarse modification times.
const MTIME_SLACK: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preflight,
    Init,
    Authenticate,
    AwaitPostLoginReady,
    AwaitMenu,
    Navigate,
    FillDateRange,
    TriggerReport,
    Download,
    Publish,
    Cleanup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Preflight => "preflight",
            Stage::Init => "init",
            Stage::Authenticate => "authenticate",
            Stage::AwaitPostLoginReady => "await_post_login_ready",
            Stage::AwaitMenu => "await_menu",
            Stage::Navigate => "navigate",
            Stage::FillDateRange => "fill_date_range",
            Stage::TriggerReport => "trigger_report",
            Stage::Download => "download",
            Stage::Publish => "publish",
            Stage::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Credentials not configured: {0}")]
    CredentialsMissing(String),

    #[error("Failed to launch browser: {0}")]
    Launch(DriverError),

    #[error("Failed to open {url}: {source}")]
    Init { url: String, source: DriverError },

    #[error("Login failed via script channel ({script}) and native channel ({native})")]
    AuthFailed {
        script: InteractionError,
        native: InteractionError,
    },

    #[error("Landmark {landmark} missing at {stage}")]
    LandmarkMissing { stage: Stage, landmark: String },

    #[error("Could not fill {field}: {source}")]
    DateFillFailed {
        field: &'static str,
        source: InteractionError,
    },

    #[error("Stage {stage} failed: {source}")]
    Stage {
        stage: Stage,
        source: InteractionError,
    },

    #[error("Download did not complete within {waited:?} in {}", .dir.display())]
    DownloadTimeout { waited: Duration, dir: PathBuf },

    #[error("Downloaded artifact unavailable: {0}")]
    Artifact(#[from] DownloadError),

    #[error("Downloaded report unreadable: {0}")]
    Table(#[from] TableError),

    #[error("Publishing failed: {0}")]
    PublishFailed(#[from] PublishError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunError {
    /// Stage the error belongs to, used as alert context.
    pub fn stage(&self) -> Stage {
        match self {
            RunError::CredentialsMissing(_) | RunError::Io(_) => Stage::Preflight,
            RunError::Launch(_) => Stage::Preflight,
            RunError::Init { .. } => Stage::Init,
            RunError::AuthFailed { .. } => Stage::Authenticate,
            RunError::LandmarkMissing { stage, .. } | RunError::Stage { stage, .. } => *stage,
            RunError::DateFillFailed { .. } => Stage::FillDateRange,
            RunError::DownloadTimeout { .. } => Stage::Download,
            RunError::Artifact(_) | RunError::Table(_) | RunError::PublishFailed(_) => {
                Stage::Publish
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Completed(String),
    Degraded(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRecord {
    pub stage: Stage,
    pub outcome: StageOutcome,
}

/// What a successful run did.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub stages: Vec<StageRecord>,
    pub login_channel: Option<InteractionChannel>,
    pub navigation_hit: Option<CandidateHit>,
    pub date_range: Option<(String, String)>,
    pub artifact: Option<PathBuf>,
    pub sheet_url: Option<String>,
    pub rows_downloaded: usize,
    pub rows_published: usize,
}

impl RunReport {
    fn completed(&mut self, stage: Stage, detail: impl Into<String>) {
        let detail = detail.into();
        info!("Stage {} completed: {}", stage, detail);
        self.stages.push(StageRecord {
            stage,
            outcome: StageOutcome::Completed(detail),
        });
    }

    fn degraded(&mut self, stage: Stage, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("Stage {} degraded: {}", stage, reason);
        self.stages.push(StageRecord {
            stage,
            outcome: StageOutcome::Degraded(reason),
        });
    }

    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.stages
            .iter()
            .find(|record| record.stage == stage)
            .map(|record| &record.outcome)
    }

    pub fn is_degraded(&self) -> bool {
        self.stages
            .iter()
            .any(|record| matches!(record.outcome, StageOutcome::Degraded(_)))
    }
}

/// External services the run depends on.
pub struct Collaborators {
    pub credentials: Box<dyn CredentialStore>,
    pub publisher: Box<dyn SheetPublisher>,
    pub notifier: Box<dyn AlertNotifier>,
}

impl Collaborators {
    /// File-backed credentials, the configured publisher, and SMTP alerts
    /// when alert settings exist (log-only otherwise).
    pub fn from_config(config: &RunConfig) -> Self {
        let publisher: Box<dyn SheetPublisher> = match config.publish.target {
            PublishTarget::GoogleSheets => Box::new(GoogleSheetsPublisher::new(
                config.publish.access_token_env.clone(),
                &config.publish.service_account_file,
                config.publish.batch_rows,
            )),
            PublishTarget::CsvDirectory => {
                Box::new(CsvDirectoryPublisher::new(config.publish.output_dir.clone()))
            }
        };

        let notifier: Box<dyn AlertNotifier> = match SmtpSettings::load(&config.secrets.alert_file) {
            Ok(Some(settings)) => Box::new(SmtpAlertNotifier::new(settings)),
            Ok(None) => {
                info!(
                    "No alert settings at {}, alerts are logged only",
                    config.secrets.alert_file.display()
                );
                Box::new(LogOnlyNotifier)
            }
            Err(e) => {
                warn!("Ignoring unreadable alert settings: {}", e);
                Box::new(LogOnlyNotifier)
            }
        };

        Self {
            credentials: Box::new(FileCredentialStore::new(
                config.secrets.credentials_file.clone(),
            )),
            publisher,
            notifier,
        }
    }
}

pub struct SessionOrchestrator {
    browser: Box<dyn Browser>,
    config: RunConfig,
    collaborators: Collaborators,
    today: Option<NaiveDate>,
}

impl SessionOrchestrator {
    pub fn new(browser: Box<dyn Browser>, config: RunConfig, collaborators: Collaborators) -> Self {
        Self {
            browser,
            config,
            collaborators,
            today: None,
        }
    }

    /// Pin the date the report window is computed from.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub async fn run(mut self) -> Result<RunReport, RunError> {
        let mut report = RunReport::default();

        let credentials = match self.preflight() {
            Ok(credentials) => credentials,
            Err(e) => {
                error!("Run aborted before launch: {}", e);
                if self.config.alerts.notify_on_failure {
                    notify_best_effort(
                        &*self.collaborators.notifier,
                        &e.stage().to_string(),
                        &e.to_string(),
                        None,
                    )
                    .await;
                }
                return Err(e);
            }
        };

        let result = match self.prepare_download_dir().await {
            Ok(watcher) => self.drive(&credentials, &watcher, &mut report).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            error!("Run failed at {}: {}", e.stage(), e);
            if self.config.alerts.notify_on_failure {
                let screenshot = self.browser.screenshot().await.ok();
                notify_best_effort(
                    &*self.collaborators.notifier,
                    &e.stage().to_string(),
                    &e.to_string(),
                    screenshot.as_deref(),
                )
                .await;
            }
        }

        match self.browser.close().await {
            Ok(()) => report.completed(Stage::Cleanup, "browser session closed"),
            Err(e) => report.degraded(Stage::Cleanup, format!("close failed: {e}")),
        }

        result.map(|()| report)
    }

    fn preflight(&self) -> Result<Credentials, RunError> {
        match self.collaborators.credentials.lookup() {
            Ok(Some(credentials)) => {
                info!("Credentials loaded for {}", credentials.identity);
                Ok(credentials)
            }
            Ok(None) => Err(RunError::CredentialsMissing(
                "no credentials saved; run `dailypull save-credentials`".into(),
            )),
            Err(e) => Err(RunError::CredentialsMissing(e.to_string())),
        }
    }

    async fn prepare_download_dir(&self) -> Result<DownloadWatcher, RunError> {
        let dir = std::path::absolute(&self.config.download.directory)?;
        tokio::fs::create_dir_all(&dir).await?;
        info!("Downloads go to {}", dir.display());
        let since = SystemTime::now()
            .checked_sub(MTIME_SLACK)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        Ok(DownloadWatcher::new(dir)
            .artifact_extension(self.config.download.artifact_extension.clone())
            .partial_extension(self.config.download.partial_extension.clone())
            .poll_interval(self.config.timeouts.poll_interval())
            .only_newer_than(since))
    }

    async fn drive(
        &mut self,
        credentials: &Credentials,
        watcher: &DownloadWatcher,
        report: &mut RunReport,
    ) -> Result<(), RunError> {
        self.browser
            .launch(watcher.dir())
            .await
            .map_err(RunError::Launch)?;
        report.completed(Stage::Preflight, "credentials present, browser launched");

        self.init(report).await?;
        self.authenticate(credentials, report).await?;
        self.await_post_login_ready(report).await?;
        self.await_menu(report).await?;
        self.navigate(report).await;
        self.fill_date_range(report).await?;
        self.trigger_report(report).await?;
        self.download(watcher, report).await?;
        self.publish(watcher, report).await
    }

    async fn init(&mut self, report: &mut RunReport) -> Result<(), RunError> {
        let url = self.config.site.base_url.clone();
        info!("Opening {}", url);
        self.browser
            .navigate(&url)
            .await
            .map_err(|source| RunError::Init {
                url: url.clone(),
                source,
            })?;
        report.completed(Stage::Init, url);
        Ok(())
    }

    async fn login_with(
        &mut self,
        credentials: &Credentials,
        channel: InteractionChannel,
    ) -> Result<(), InteractionError> {
        let policy = self.config.timeouts.login_policy();
        let selectors = &self.config.selectors.login;
        let browser = self.browser.as_mut();

        navigator::try_in_order(
            browser,
            &selectors.email,
            &Action::type_text(&credentials.identity),
            channel,
            &policy,
        )
        .await?;
        navigator::try_in_order(
            browser,
            &selectors.password,
            &Action::type_text(&credentials.secret),
            channel,
            &policy,
        )
        .await?;
        navigator::try_in_order(browser, &selectors.submit, &Action::Click, channel, &policy)
            .await?;
        Ok(())
    }

    async fn authenticate(
        &mut self,
        credentials: &Credentials,
        report: &mut RunReport,
    ) -> Result<(), RunError> {
        info!("Logging in via script channel");
        let script = match self
            .login_with(credentials, InteractionChannel::ScriptInjection)
            .await
        {
            Ok(()) => {
                report.login_channel = Some(InteractionChannel::ScriptInjection);
                report.completed(Stage::Authenticate, "script channel");
                return Ok(());
            }
            Err(e) => e,
        };

        warn!("Script login failed ({}), retrying with native channel", script);
        match self.login_with(credentials, InteractionChannel::Native).await {
            Ok(()) => {
                report.login_channel = Some(InteractionChannel::Native);
                report.completed(Stage::Authenticate, "native channel");
                Ok(())
            }
            Err(native) => Err(RunError::AuthFailed { script, native }),
        }
    }

    /// Handles a landmark that never appeared according to `landmark_policy`.
    async fn landmark_missing(
        &mut self,
        stage: Stage,
        landmark: String,
        report: &mut RunReport,
    ) -> Result<(), RunError> {
        if self.config.landmark_policy == LandmarkPolicy::Required {
            return Err(RunError::LandmarkMissing { stage, landmark });
        }

        let reason = format!("{landmark} not seen, continuing");
        if self.config.alerts.notify_on_degraded {
            let screenshot = self.browser.screenshot().await.ok();
            notify_best_effort(
                &*self.collaborators.notifier,
                &stage.to_string(),
                &reason,
                screenshot.as_deref(),
            )
            .await;
        }
        report.degraded(stage, reason);
        Ok(())
    }

    async fn await_post_login_ready(&mut self, report: &mut RunReport) -> Result<(), RunError> {
        sleep(self.config.delays.post_login()).await;

        let marker = self.config.site.login_url_marker.clone();
        let landmark = self.config.selectors.post_login_landmark.clone();
        let probes = [ReadyProbe::UrlLacks(&marker), ReadyProbe::Present(&landmark)];
        let timeout = Duration::from_millis(self.config.timeouts.post_login_ready_ms);
        let poll = self.config.timeouts.poll_interval();

        if readiness::wait_for_any(self.browser.as_mut(), &probes, timeout, poll).await {
            report.completed(Stage::AwaitPostLoginReady, "left login page");
            Ok(())
        } else {
            self.landmark_missing(
                Stage::AwaitPostLoginReady,
                format!("url without '{marker}' or {landmark}"),
                report,
            )
            .await
        }
    }

    async fn await_menu(&mut self, report: &mut RunReport) -> Result<(), RunError> {
        let landmark = self.config.selectors.menu_landmark.clone();
        let timeout = Duration::from_millis(self.config.timeouts.menu_ms);
        let poll = self.config.timeouts.poll_interval();

        if readiness::wait_for_any(
            self.browser.as_mut(),
            &[ReadyProbe::Present(&landmark)],
            timeout,
            poll,
        )
        .await
        {
            sleep(self.config.delays.menu_render()).await;
            report.completed(Stage::AwaitMenu, landmark.to_string());
            Ok(())
        } else {
            self.landmark_missing(Stage::AwaitMenu, landmark.to_string(), report)
                .await?;
            sleep(self.config.delays.menu_retry()).await;
            Ok(())
        }
    }

    /// Menu first, direct URL second, then on regardless.
    async fn navigate(&mut self, report: &mut RunReport) {
        let policy = self.config.timeouts.navigation_policy();
        let menu = navigator::try_in_order(
            self.browser.as_mut(),
            &self.config.selectors.report_menu,
            &Action::Click,
            InteractionChannel::Native,
            &policy,
        )
        .await;

        match menu {
            Ok(hit) => {
                sleep(self.config.delays.report_page_settle()).await;
                report.completed(
                    Stage::Navigate,
                    format!("menu candidate #{} ({})", hit.index + 1, hit.descriptor),
                );
                report.navigation_hit = Some(hit);
                return;
            }
            Err(e) => warn!("Menu navigation failed: {}", e),
        }

        let url = self.config.site.report_url.clone();
        info!("Navigating directly to {}", url);
        if let Err(e) = self.browser.navigate(&url).await {
            warn!("Direct navigation to {} failed: {}", url, e);
        }

        let poll = self.config.timeouts.poll_interval();
        let page_load = Duration::from_millis(self.config.timeouts.report_page_load_ms);
        if !readiness::wait_for_any(
            self.browser.as_mut(),
            &[ReadyProbe::DocumentComplete],
            page_load,
            poll,
        )
        .await
        {
            warn!("Report page did not reach readyState complete");
        }
        sleep(self.config.delays.report_page_settle()).await;

        let from_fields = self.config.selectors.from_date.clone();
        let probes: Vec<ReadyProbe<'_>> = from_fields.iter().map(ReadyProbe::Present).collect();
        let form_timeout = Duration::from_millis(self.config.timeouts.report_form_ms);
        if readiness::wait_for_any(self.browser.as_mut(), &probes, form_timeout, poll).await {
            report.completed(Stage::Navigate, format!("direct url {url}"));
        } else {
            sleep(self.config.delays.navigation_retry()).await;
            report.degraded(
                Stage::Navigate,
                "report form not detected, continuing speculatively",
            );
        }
    }

    fn date_window(&self) -> (String, String) {
        let today = self.today.unwrap_or_else(|| Local::now().date_naive());
        let dates = &self.config.dates;
        let from = today - TimeDelta::days(i64::from(dates.days_before));
        let to = today + TimeDelta::days(i64::from(dates.days_after));
        (
            from.format(&dates.format).to_string(),
            to.format(&dates.format).to_string(),
        )
    }

    async fn fill_date_range(&mut self, report: &mut RunReport) -> Result<(), RunError> {
        let (from, to) = self.date_window();
        info!("Report window {} to {}", from, to);

        let plan = [
            Attempt::new(
                InteractionChannel::ScriptInjection,
                self.config.timeouts.date_script_policy(),
            ),
            Attempt::new(
                InteractionChannel::Native,
                self.config.timeouts.date_native_policy(),
            ),
        ];

        let from_hit = navigator::try_in_order_with(
            self.browser.as_mut(),
            &self.config.selectors.from_date,
            &Action::type_text(&from),
            &plan,
        )
        .await
        .map_err(|source| RunError::DateFillFailed {
            field: "from_date",
            source,
        })?;

        sleep(self.config.delays.between_fields()).await;

        let to_hit = navigator::try_in_order_with(
            self.browser.as_mut(),
            &self.config.selectors.to_date,
            &Action::type_text(&to),
            &plan,
        )
        .await
        .map_err(|source| RunError::DateFillFailed {
            field: "to_date",
            source,
        })?;

        report.completed(
            Stage::FillDateRange,
            format!(
                "{from} via {} ({}), {to} via {} ({})",
                from_hit.descriptor, from_hit.channel, to_hit.descriptor, to_hit.channel
            ),
        );
        report.date_range = Some((from, to));
        Ok(())
    }

    async fn click_stage(
        &mut self,
        stage: Stage,
        target: &ElementDescriptor,
    ) -> Result<(), RunError> {
        let policy = self.config.timeouts.click_policy();
        interaction::click(
            self.browser.as_mut(),
            target,
            InteractionChannel::Native,
            &policy,
        )
        .await
        .map_err(|source| RunError::Stage { stage, source })
    }

    async fn trigger_report(&mut self, report: &mut RunReport) -> Result<(), RunError> {
        let selectors = self.config.selectors.report.clone();
        self.click_stage(Stage::TriggerReport, &selectors.open_panel)
            .await?;
        self.click_stage(Stage::TriggerReport, &selectors.generate)
            .await?;
        // No completion signal exists for report generation.
        sleep(self.config.delays.report_generation()).await;
        report.completed(Stage::TriggerReport, "report generation requested");
        Ok(())
    }

    async fn download(
        &mut self,
        watcher: &DownloadWatcher,
        report: &mut RunReport,
    ) -> Result<(), RunError> {
        let selectors = self.config.selectors.report.clone();
        self.click_stage(Stage::Download, &selectors.export_menu)
            .await?;
        self.click_stage(Stage::Download, &selectors.export_csv)
            .await?;

        let waited = Duration::from_millis(self.config.timeouts.download_ms);
        if !watcher.await_completion(waited).await {
            return Err(RunError::DownloadTimeout {
                waited,
                dir: watcher.dir().to_path_buf(),
            });
        }
        report.completed(Stage::Download, "artifact on disk");
        Ok(())
    }

    async fn publish(
        &mut self,
        watcher: &DownloadWatcher,
        report: &mut RunReport,
    ) -> Result<(), RunError> {
        let artifact = watcher.latest_artifact()?;
        info!("Reading {}", artifact.display());
        let table = Table::from_csv_path(&artifact)?;
        report.rows_downloaded = table.len();
        report.artifact = Some(artifact);

        let table = table.apply_filters(&self.config.filters);
        report.rows_published = table.len();

        let publish = &self.config.publish;
        let url = self
            .collaborators
            .publisher
            .publish(&table, &publish.spreadsheet, &publish.worksheet)
            .await?;
        info!("Published to {}", url);

        match watcher.clear() {
            Ok(summary) if !summary.failed.is_empty() => warn!(
                "{} downloaded files could not be removed",
                summary.failed.len()
            ),
            Ok(_) => {}
            Err(e) => warn!("Could not clear download directory: {}", e),
        }

        report.completed(
            Stage::Publish,
            format!(
                "{} of {} rows to {}",
                report.rows_published, report.rows_downloaded, url
            ),
        );
        report.sheet_url = Some(url);
        Ok(())
    }
}
