use checkout_e2e::browser::{capture_login_state, ChromeDriver, ScenarioSession};
use checkout_e2e::core::config::{Config, Secrets};
use checkout_e2e::core::BrowserDriver;
use checkout_e2e::errors::Result;
use checkout_e2e::locator::TextPattern;
use checkout_e2e::pages::PageContext;
use checkout_e2e::steps::{feature, Runner, StepRegistry, TagFilter};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "checkout-e2e", version, about = "End-to-end checkout tests for the storefront")]
struct Cli {
    /// JSON config file layered over the defaults
    #[arg(long, global = true, env = "CHECKOUT_CONFIG")]
    config: Option<PathBuf>,

    /// Show the browser window
    #[arg(long, global = true)]
    headed: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run feature files
    Run {
        /// Feature file or directory of *.feature files
        #[arg(default_value = "features")]
        features: PathBuf,

        /// Tag expression, e.g. "@smoke" or "@card or @paypal not @wip"
        #[arg(long)]
        tags: Option<String>,

        #[arg(long)]
        base_url: Option<String>,

        #[arg(long)]
        webstore_url: Option<String>,

        /// Storage state injected into every scenario
        #[arg(long, conflicts_with = "no_storage_state")]
        storage_state: Option<PathBuf>,

        /// Start every scenario logged out
        #[arg(long)]
        no_storage_state: bool,

        /// Where to write the JSON run report
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Log in manually in a headed browser and save the storage state
    Auth {
        #[arg(
            long,
            default_value = "https://accounts.google.com/signin/v2/identifier?flowName=GlifWebSignIn&flowEntry=ServiceLogin"
        )]
        login_url: String,

        /// URL pattern that signals a finished login
        #[arg(long, default_value = r"^https://myaccount\.google\.com/")]
        success_url: String,

        #[arg(long, default_value = "auth.json")]
        output: PathBuf,

        #[arg(long, default_value_t = 600)]
        timeout_secs: u64,
    },
    /// List the step phrases the runner understands
    Steps,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match execute(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(2)
        }
    }
}

async fn execute(cli: Cli) -> Result<bool> {
    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_env()?;
    if cli.headed {
        config.browser.headless = false;
    }

    match cli.command {
        Command::Run {
            features,
            tags,
            base_url,
            webstore_url,
            storage_state,
            no_storage_state,
            report,
        } => {
            if let Some(url) = base_url {
                config.storefront.base_url = url;
            }
            if let Some(url) = webstore_url {
                config.storefront.webstore_url = url;
            }
            if storage_state.is_some() {
                config.paths.storage_state = storage_state;
            }
            if no_storage_state {
                config.paths.storage_state = None;
            }

            let filter = match tags {
                Some(expression) => TagFilter::parse(&expression)?,
                None => TagFilter::default(),
            };
            let features = feature::load(&features).await?;
            let report_path = report.unwrap_or_else(|| config.paths.report_dir.join("run-report.json"));

            let driver: Arc<dyn BrowserDriver> = Arc::new(ChromeDriver::launch(&config.browser)?);
            let ctx = PageContext::new(driver, Arc::new(config), Arc::new(Secrets::from_env()));
            let runner = Runner::new(ctx, StepRegistry::storefront()?).with_filter(filter);

            let report = runner.run(&features).await;
            report.save(&report_path).await?;
            info!("{}", report.summary());
            Ok(report.success())
        }
        Command::Auth {
            login_url,
            success_url,
            output,
            timeout_secs,
        } => {
            config.browser.headless = false;
            config
                .browser
                .args
                .push("--disable-blink-features=AutomationControlled".to_string());
            let pattern = TextPattern::new(&success_url)?;

            let driver: Arc<dyn BrowserDriver> = Arc::new(ChromeDriver::launch(&config.browser)?);
            let session = ScenarioSession::open(driver.clone(), None).await?;
            driver.navigate(session.home(), &login_url).await?;
            info!("Log in manually in the browser window; waiting up to {}s", timeout_secs);

            capture_login_state(
                driver.as_ref(),
                session.home(),
                &pattern,
                Duration::from_secs(timeout_secs),
                &output,
            )
            .await?;
            Ok(true)
        }
        Command::Steps => {
            for definition in StepRegistry::storefront()?.definitions() {
                println!("{:<60} {}", definition.pattern(), definition.description());
            }
            Ok(true)
        }
    }
}
