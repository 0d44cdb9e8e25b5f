mod prompt;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dailypull_engine::alert::SmtpSettings;
use dailypull_engine::config::{ConfigLoader, RunConfig};
use dailypull_engine::credentials::{Credentials, FileCredentialStore};
use dailypull_engine::orchestrator::{Collaborators, SessionOrchestrator};
use dailypull_webdriver::WebDriverBrowser;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "dailypull", version, about = "Daily dashboard report export")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Config file. Defaults to ./dailypull.yaml, then ~/.dailypull/config.yaml.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Log in, export the report, filter it and publish it
    Run {
        /// External WebDriver URL. chromedriver is launched when omitted.
        #[arg(long)]
        webdriver_url: Option<String>,

        /// Show the browser window
        #[arg(long)]
        visible: bool,
    },
    /// Store the dashboard login used by `run`
    SaveCredentials,
    /// Store SMTP settings for failure alerts
    SaveAlertConfig {
        #[arg(long, default_value = "smtp.gmail.com")]
        smtp_server: String,

        #[arg(long, default_value_t = 587)]
        smtp_port: u16,
    },
    /// Print the effective configuration as YAML
    ShowConfig,
}

async fn load_config(path: Option<&PathBuf>) -> anyhow::Result<RunConfig> {
    let config = match path {
        Some(path) => ConfigLoader::load_from(path).await,
        None => ConfigLoader::load_default().await,
    };
    config.context("loading configuration")
}

async fn run(
    mut config: RunConfig,
    webdriver_url: Option<String>,
    visible: bool,
) -> anyhow::Result<()> {
    if visible {
        config.browser.headless = false;
    }
    let browser = match webdriver_url {
        Some(url) => {
            info!("Using external WebDriver at {}", url);
            WebDriverBrowser::with_url(config.browser.clone(), url)
        }
        None => WebDriverBrowser::new(config.browser.clone()),
    };

    let collaborators = Collaborators::from_config(&config);
    let report = SessionOrchestrator::new(Box::new(browser), config, collaborators)
        .run()
        .await?;

    for record in &report.stages {
        info!("{:<24} {:?}", record.stage.to_string(), record.outcome);
    }
    if report.is_degraded() {
        warn!("Run completed with degraded stages");
    }
    match &report.sheet_url {
        Some(url) => println!(
            "Published {} of {} rows to {}",
            report.rows_published, report.rows_downloaded, url
        ),
        None => println!("Run completed without publishing"),
    }
    Ok(())
}

fn save_credentials(config: &RunConfig) -> anyhow::Result<()> {
    let email = prompt::line("Email")?;
    let password = prompt::secret("Password")?;
    let store = FileCredentialStore::new(config.secrets.credentials_file.clone());
    store.save(&Credentials::new(email, password))?;
    println!("Credentials saved to {}", store.path().display());
    Ok(())
}

fn save_alert_config(config: &RunConfig, smtp_server: String, smtp_port: u16) -> anyhow::Result<()> {
    let email_from = prompt::line("Sender address")?;
    let email_password = prompt::secret("Sender password")?;
    let email_to = prompt::list("Recipients (comma separated)")?;

    let mut settings = SmtpSettings::new(email_from, email_password, email_to);
    settings.smtp_server = smtp_server;
    settings.smtp_port = smtp_port;
    settings.save(&config.secrets.alert_file)?;
    println!("Alert settings saved to {}", config.secrets.alert_file.display());
    Ok(())
}

async fn dispatch(args: Args) -> anyhow::Result<()> {
    let config = load_config(args.config.as_ref()).await?;
    match args.command {
        Command::Run {
            webdriver_url,
            visible,
        } => run(config, webdriver_url, visible).await,
        Command::SaveCredentials => save_credentials(&config),
        Command::SaveAlertConfig {
            smtp_server,
            smtp_port,
        } => save_alert_config(&config, smtp_server, smtp_port),
        Command::ShowConfig => {
            print!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    // Logs go to stderr so stdout stays clean for `show-config`.
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dispatch(args).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
