//! GH Users Search end-to-end runner
//!
//! Loads scenarios, drives the application through Playwright and checks the
//! REST API contract, then writes `test-results.json`.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ghsearch_common::{BrowserKind, SuiteConfig};
use ghsearch_e2e::{BridgeConfig, PlaywrightProvider, SuiteRunner};

#[derive(Parser)]
#[command(name = "ghsearch-e2e")]
#[command(about = "End-to-end checks for the GH users search application")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "GHSEARCH_CONFIG", default_value = "ghsearch.toml")]
    config: PathBuf,

    /// Application base URL
    #[arg(long)]
    base_url: Option<String>,

    /// REST API base URL
    #[arg(long)]
    api_base_url: Option<String>,

    /// Extra attempts per failing scenario
    #[arg(long)]
    retries: Option<u32>,

    /// Browser to launch (chromium, firefox, webkit)
    #[arg(long)]
    browser: Option<BrowserKind>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Scenario directory
    #[arg(long)]
    scenarios: Option<PathBuf>,

    /// Output directory for results and artifacts
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Only run scenarios with this tag
    #[arg(short, long, conflicts_with = "name")]
    tag: Option<String>,

    /// Only run the scenario with this name
    #[arg(short, long)]
    name: Option<String>,

    /// Write the effective configuration to --config and exit
    #[arg(long)]
    write_default_config: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Cli {
    fn apply(&self, config: &mut SuiteConfig) {
        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if let Some(url) = &self.api_base_url {
            config.api_base_url = url.clone();
        }
        if let Some(retries) = self.retries {
            config.retries = retries;
        }
        if let Some(browser) = self.browser {
            config.browser.kind = browser;
        }
        if self.headed {
            config.browser.headless = false;
        }
        if let Some(dir) = &self.scenarios {
            config.scenarios_dir = dir.clone();
        }
        if let Some(dir) = &self.output {
            config.output_dir = dir.clone();
        }
    }
}

fn init_logging(cli: &Cli) {
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut config = SuiteConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.apply_env()?;
    cli.apply(&mut config);
    config.validate()?;

    if cli.write_default_config {
        config.save(&cli.config)?;
        info!("Configuration written to {}", cli.config.display());
        return Ok(true);
    }

    info!(
        "GH users search e2e v{} against {}",
        ghsearch_common::VERSION,
        config.base_url
    );

    let provider = PlaywrightProvider::new(BridgeConfig::from_suite(&config));
    let runner = SuiteRunner::new(config, provider)?;

    let results = match (&cli.tag, &cli.name) {
        (Some(tag), _) => runner.run_tagged(tag).await?,
        (None, Some(name)) => runner.run_named(name).await?,
        (None, None) => runner.run_all().await?,
    };
    runner.write_results(&results)?;

    Ok(results.all_passed())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}
