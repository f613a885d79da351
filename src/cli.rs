use crate::actions::ActionRegistry;
use crate::config::{AutomationConfig, DownloaderConfig, SchedulerConfig};
use crate::controller::Controller;
use crate::downloader::GenerationDownloader;
use crate::driver::{BrowserDriver, ChromiumDriver};
use crate::engine::ExecutionEngine;
use crate::error::RuntimeError;
use crate::health::SystemHealthChecker;
use crate::metrics::{Metrics, PerformanceTracker};
use crate::scheduler::Scheduler;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "autoflow-runtime", about = "Programmable browser-automation runtime", version)]
pub struct Cli {
    /// Extra Chrome command-line args, passed through on every browser launch.
    #[arg(long, global = true)]
    pub chrome_arg: Vec<String>,

    /// Enable verbose (debug-level) logging.
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Operate on a single workflow.
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },
    /// Run a multi-workflow schedule.
    Scheduler {
        #[arg(long)]
        config: PathBuf,
    },
    /// Harvest generation downloads from a running workflow's gallery page.
    Downloader {
        #[arg(long)]
        config: PathBuf,
    },
    /// Print a one-shot health snapshot and exit.
    Health,
}

#[derive(Subcommand, Debug)]
pub enum WorkflowAction {
    /// Execute a workflow's action list end to end.
    Run {
        #[arg(long)]
        config: PathBuf,
    },
    /// Validate a workflow's block structure and required fields without running it.
    Validate {
        #[arg(long)]
        config: PathBuf,
    },
}

/// Owns ambient metrics and dispatches a parsed [`Cli`] to completion,
/// returning the process exit code.
pub struct CliRunner {
    metrics: Arc<Metrics>,
}

impl CliRunner {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub async fn run(&self, cli: Cli) -> i32 {
        let result = match cli.command {
            Commands::Workflow {
                action: WorkflowAction::Run { config },
            } => self.run_workflow(&config, cli.chrome_arg).await,
            Commands::Workflow {
                action: WorkflowAction::Validate { config },
            } => self.validate_workflow(&config).await,
            Commands::Scheduler { config } => self.run_scheduler(&config).await,
            Commands::Downloader { config } => self.run_downloader(&config, cli.chrome_arg).await,
            Commands::Health => self.run_health().await,
        };

        match result {
            Ok(()) => 0,
            Err(err) => {
                error!("{err}");
                eprintln!("{err}");
                1
            }
        }
    }

    async fn run_workflow(&self, config_path: &PathBuf, chrome_args: Vec<String>) -> Result<(), RuntimeError> {
        let config = AutomationConfig::load(config_path)?;
        let driver: Arc<dyn BrowserDriver> =
            Arc::new(ChromiumDriver::launch(config.headless, chrome_args).await?);
        let controller = Arc::new(Controller::new());
        let registry = Arc::new(ActionRegistry::new());

        let workflow_name = config.name.clone();
        let engine = ExecutionEngine::new(config, registry, driver, controller)?;
        let result = engine.run().await?;

        for message in &result.log_messages {
            info!("workflow log: {message}");
        }
        self.metrics.record_action(result.duration, result.ok);

        if result.ok {
            println!("workflow '{workflow_name}' completed successfully");
            Ok(())
        } else {
            Err(RuntimeError::Validation(format!(
                "workflow failed at action {:?}: {}",
                result.action_index,
                result.error_message.unwrap_or_default()
            )))
        }
    }

    async fn validate_workflow(&self, config_path: &PathBuf) -> Result<(), RuntimeError> {
        let config = AutomationConfig::load(config_path)?;
        let registry = ActionRegistry::new();
        registry.validate_actions(&config.actions)?;
        println!("workflow '{}' is valid ({} actions)", config.name, config.actions.len());
        Ok(())
    }

    async fn run_scheduler(&self, config_path: &PathBuf) -> Result<(), RuntimeError> {
        let content = std::fs::read_to_string(config_path)?;
        let config: SchedulerConfig = serde_json::from_str(&content)?;
        let controller = Arc::new(Controller::new());
        let exe_path = std::env::current_exe()?;

        self.metrics.set_scheduler_queue_size(config.configs.len());
        let scheduler = Scheduler::new(config, controller, exe_path);
        let outcomes = scheduler.run().await?;

        for outcome in &outcomes {
            if !outcome.succeeded {
                self.metrics.record_workflow_retry();
            }
            println!(
                "{:?}: succeeded={} attempts={}",
                outcome.config, outcome.succeeded, outcome.attempts
            );
        }
        Ok(())
    }

    async fn run_downloader(&self, config_path: &PathBuf, chrome_args: Vec<String>) -> Result<(), RuntimeError> {
        let content = std::fs::read_to_string(config_path)?;
        let downloader_config: DownloaderConfig = serde_json::from_str(&content)?;
        let workflow_config = AutomationConfig::load(&downloader_config.config)?;

        let driver: Arc<dyn BrowserDriver> =
            Arc::new(ChromiumDriver::launch(workflow_config.headless, chrome_args).await?);
        driver
            .navigate(
                &workflow_config.url,
                std::time::Duration::from_millis(workflow_config.default_timeout_ms),
            )
            .await?;

        let controller = Arc::new(Controller::new());
        let viewport_height = workflow_config.browser.viewport.height as f64;
        let mut downloader = GenerationDownloader::new(driver, downloader_config, controller, viewport_height)?;
        let summary = downloader.run().await?;

        for _ in 0..summary.downloaded {
            self.metrics.record_download();
        }
        for _ in 0..summary.skipped_duplicates {
            self.metrics.record_duplicate_skipped();
        }

        println!(
            "downloaded {} items, skipped {} duplicates, stopped: {:?}",
            summary.downloaded, summary.skipped_duplicates, summary.stopped_reason
        );
        Ok(())
    }

    async fn run_health(&self) -> Result<(), RuntimeError> {
        let controller = Arc::new(Controller::new());
        let tracker = Arc::new(PerformanceTracker::new(self.metrics.clone()));
        let mut checker = SystemHealthChecker::new(controller, tracker, self.metrics.clone());
        let status = checker.check_system_health().await;
        println!("overall: {:?}", status.overall);
        println!("performance: {:?}", status.performance);
        println!("errors: {:?}", status.errors);
        Ok(())
    }
}

impl Default for CliRunner {
    fn default() -> Self {
        Self::new()
    }
}

pub fn setup_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}
