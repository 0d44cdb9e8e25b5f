mod common;

use chrono::NaiveDate;
use common::{
    ClickEffect, FakeBrowser, FakeElement, RecordingNotifier, RecordingPublisher, collaborators, credentials,
    test_config,
};
use dailypull_engine::config::{LandmarkPolicy, RunConfig};
use dailypull_engine::orchestrator::{RunError, SessionOrchestrator, Stage, StageOutcome};
use dailypull_engine::{CandidateList, InteractionChannel};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
}

fn first(list: &CandidateList) -> dailypull_engine::ElementDescriptor {
    list.as_slice()[0].clone()
}

struct Harness {
    browser: FakeBrowser,
    publisher: RecordingPublisher,
    notifier: RecordingNotifier,
    config: RunConfig,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir.path().join("downloads"));
        Self {
            browser: FakeBrowser::dashboard(&config),
            publisher: RecordingPublisher::default(),
            notifier: RecordingNotifier::default(),
            config,
            _dir: dir,
        }
    }

    fn orchestrator(&self) -> SessionOrchestrator {
        SessionOrchestrator::new(
            Box::new(self.browser.clone()),
            self.config.clone(),
            collaborators(credentials(), &self.publisher, &self.notifier),
        )
        .with_today(today())
    }

    fn downloaded_files(&self) -> usize {
        std::fs::read_dir(&self.config.download.directory)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

#[tokio::test]
async fn full_run_publishes_filtered_rows_and_cleans_up() {
    let h = Harness::new();

    let report = h.orchestrator().run().await.unwrap();

    assert_eq!(report.login_channel, Some(InteractionChannel::ScriptInjection));
    assert_eq!(report.navigation_hit.as_ref().unwrap().index, 0);
    assert_eq!(
        report.date_range,
        Some(("05/03/2024".to_string(), "15/03/2024".to_string()))
    );
    assert_eq!(report.rows_downloaded, 4);
    assert_eq!(report.rows_published, 2);
    assert_eq!(report.sheet_url.as_deref(), Some("https://sheets.example/GET_BPO#Base"));
    assert!(!report.is_degraded());

    let selectors = &h.config.selectors;
    assert_eq!(h.browser.element(&first(&selectors.from_date)).value, "05/03/2024");
    assert_eq!(h.browser.element(&first(&selectors.to_date)).value, "15/03/2024");
    assert_eq!(h.browser.element(&first(&selectors.login.email)).value, "ops@example.com");

    let calls = h.publisher.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].rows, 2);
    assert_eq!(calls[0].destination, "GET_BPO");
    assert_eq!(calls[0].tab, "Base");

    assert_eq!(h.downloaded_files(), 0);
    assert!(h.browser.is_closed());
    assert!(h.notifier.contexts().is_empty());
    assert!(matches!(
        report.outcome(Stage::Cleanup),
        Some(StageOutcome::Completed(_))
    ));
}

#[tokio::test]
async fn missing_menu_landmark_does_not_abort_the_run() {
    let h = Harness::new();
    h.browser.remove(&h.config.selectors.menu_landmark);
    h.browser.remove(&first(&h.config.selectors.report_menu));

    let report = h.orchestrator().run().await.unwrap();

    assert!(matches!(
        report.outcome(Stage::AwaitMenu),
        Some(StageOutcome::Degraded(_))
    ));
    assert!(matches!(
        report.outcome(Stage::Navigate),
        Some(StageOutcome::Completed(detail)) if detail.starts_with("direct url")
    ));
    assert!(report.navigation_hit.is_none());
    assert!(h.browser.navigations().contains(&h.config.site.report_url));
    assert_eq!(h.notifier.contexts(), vec!["await_menu".to_string()]);
    assert!(h.browser.is_closed());
}

#[tokio::test]
async fn still_on_login_page_degrades_with_screenshot_and_continues() {
    let mut h = Harness::new();
    // Separate menu landmark so only the post-login wait misses.
    h.config.selectors.menu_landmark = dailypull_engine::ElementDescriptor::css("aside .menu");
    h.browser
        .insert(&h.config.selectors.menu_landmark, FakeElement::default());
    h.browser.remove(&h.config.selectors.post_login_landmark);
    let login_url = format!("{}Login?next=/", h.config.site.base_url);
    h.browser
        .update(&first(&h.config.selectors.login.submit), |submit| {
            submit.on_click = Some(ClickEffect::Navigate(login_url));
        });

    let report = h.orchestrator().run().await.unwrap();

    assert!(matches!(
        report.outcome(Stage::AwaitPostLoginReady),
        Some(StageOutcome::Degraded(_))
    ));
    assert!(matches!(
        report.outcome(Stage::AwaitMenu),
        Some(StageOutcome::Completed(_))
    ));
    let alerts = h.notifier.alerts.lock().unwrap().clone();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].context, "await_post_login_ready");
    assert!(alerts[0].with_screenshot);
    assert_eq!(h.browser.screenshots(), 1);
    assert_eq!(report.rows_published, 2);
    assert!(h.browser.is_closed());
}

#[tokio::test]
async fn navigation_continues_speculatively_when_form_never_shows() {
    let h = Harness::new();
    h.browser.remove(&first(&h.config.selectors.report_menu));
    h.browser.update(&first(&h.config.selectors.from_date), |field| {
        field.appears_after = Some(std::time::Duration::from_secs(3600));
    });

    let err = h.orchestrator().run().await.unwrap_err();

    // Navigation only degraded; the run failed later, at the date fields.
    assert!(matches!(err, RunError::DateFillFailed { field: "from_date", .. }));
    assert!(h.browser.is_closed());
}

#[tokio::test]
async fn required_landmark_policy_aborts() {
    let mut h = Harness::new();
    h.config.landmark_policy = LandmarkPolicy::Required;
    h.browser.remove(&h.config.selectors.menu_landmark);

    let err = h.orchestrator().run().await.unwrap_err();

    assert!(matches!(
        err,
        RunError::LandmarkMissing {
            stage: Stage::AwaitMenu,
            ..
        }
    ));
    assert!(h.browser.is_closed());
}

#[tokio::test]
async fn date_fill_failure_aborts_and_still_closes_the_session() {
    let h = Harness::new();
    h.browser.remove(&first(&h.config.selectors.from_date));
    h.browser.remove(&first(&h.config.selectors.to_date));

    let err = h.orchestrator().run().await.unwrap_err();

    match &err {
        RunError::DateFillFailed { field, source } => {
            assert_eq!(*field, "from_date");
            assert!(source.to_string().starts_with("All 4 candidates failed"));
        }
        other => panic!("expected DateFillFailed, got {other}"),
    }
    assert!(h.browser.is_closed());
    assert!(h.publisher.calls.lock().unwrap().is_empty());

    let alerts = h.notifier.alerts.lock().unwrap().clone();
    let last = alerts.last().unwrap();
    assert_eq!(last.context, "fill_date_range");
    assert!(last.with_screenshot);
}

#[tokio::test]
async fn missing_credentials_abort_before_any_browser_work() {
    let h = Harness::new();
    let orchestrator = SessionOrchestrator::new(
        Box::new(h.browser.clone()),
        h.config.clone(),
        collaborators(None, &h.publisher, &h.notifier),
    );

    let err = orchestrator.run().await.unwrap_err();

    assert!(matches!(err, RunError::CredentialsMissing(_)));
    assert!(!h.browser.is_launched());
    assert!(h.browser.resolve_log().is_empty());
    assert_eq!(h.browser.screenshots(), 0);
    assert_eq!(h.notifier.contexts(), vec!["preflight".to_string()]);
}

#[tokio::test]
async fn native_login_is_used_when_script_login_fails() {
    let h = Harness::new();
    h.browser
        .update(&first(&h.config.selectors.login.email), |field| {
            field.script_error = true;
        });

    let report = h.orchestrator().run().await.unwrap();

    assert_eq!(report.login_channel, Some(InteractionChannel::Native));
    assert_eq!(
        h.browser
            .element(&first(&h.config.selectors.login.email))
            .value,
        "ops@example.com"
    );
}

#[tokio::test]
async fn login_fails_when_both_channels_fail() {
    let h = Harness::new();
    h.browser.remove(&first(&h.config.selectors.login.submit));

    let err = h.orchestrator().run().await.unwrap_err();

    assert!(matches!(err, RunError::AuthFailed { .. }));
    assert!(h.browser.is_closed());
}

#[tokio::test]
async fn download_timeout_is_reported() {
    let h = Harness::new();
    h.browser
        .insert(&h.config.selectors.report.export_csv, FakeElement::default());

    let err = h.orchestrator().run().await.unwrap_err();

    assert!(matches!(err, RunError::DownloadTimeout { .. }));
    assert!(h.browser.is_closed());
}

#[tokio::test]
async fn publish_failure_keeps_downloaded_artifact() {
    let mut h = Harness::new();
    h.publisher.fail = true;

    let err = h.orchestrator().run().await.unwrap_err();

    assert!(matches!(err, RunError::PublishFailed(_)));
    assert_eq!(h.downloaded_files(), 1);
    assert!(h.browser.is_closed());
}

#[tokio::test]
async fn stale_artifact_from_earlier_run_is_not_mistaken_for_a_download() {
    let h = Harness::new();
    let dir = &h.config.download.directory;
    std::fs::create_dir_all(dir).unwrap();
    let stale = dir.join("yesterday.csv");
    std::fs::write(&stale, common::REPORT_CSV).unwrap();
    let old = std::time::SystemTime::now() - std::time::Duration::from_secs(3600);
    std::fs::File::options()
        .write(true)
        .open(&stale)
        .unwrap()
        .set_modified(old)
        .unwrap();
    h.browser
        .insert(&h.config.selectors.report.export_csv, FakeElement::default());

    let err = h.orchestrator().run().await.unwrap_err();

    assert!(matches!(err, RunError::DownloadTimeout { .. }));
    assert!(stale.exists());
}
