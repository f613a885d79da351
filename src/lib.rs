//! # Autoflow Runtime
//!
//! A programmable browser-automation runtime: an action-list interpreter with
//! control flow (`IF`/`ELIF`/`ELSE`, `WHILE`/`BREAK`/`CONTINUE`, `STOP`),
//! `${name}` variable substitution, a multi-workflow scheduler with retry and
//! heuristic failure classification, and a generation-gallery download
//! engine with duplicate detection and boundary-resumption scanning.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use autoflow_runtime::config::AutomationConfig;
//! use autoflow_runtime::engine::ExecutionEngine;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AutomationConfig::load(std::path::Path::new("workflow.json"))?;
//!     let engine = ExecutionEngine::new(config).await?;
//!     let result = engine.run().await?;
//!     println!("completed {} actions", result.actions_run);
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! autoflow-runtime workflow run --config workflow.json
//! autoflow-runtime workflow validate --config workflow.json
//! autoflow-runtime scheduler --config schedule.json
//! autoflow-runtime downloader --config downloader.json
//! autoflow-runtime health
//! ```

/// Error taxonomy and circuit breaker shared across the runtime.
pub mod error;

/// `${name}` variable substitution store.
pub mod variables;

/// Cooperative pause/resume/stop lifecycle and checkpointing.
pub mod controller;

/// Browser driver trait and its chromiumoxide-backed implementation.
pub mod driver;

/// Workflow, scheduler, and downloader configuration types.
pub mod config;

/// Action handlers dispatched by the execution engine.
pub mod actions;

/// The control-flow interpreter driving an action list to completion.
pub mod engine;

/// On-disk chronological download log with duplicate indexing.
pub mod download_log;

/// Generation-gallery navigation and metadata extraction.
pub mod gallery;

/// Boundary-resumption scanning across a gallery's scroll history.
pub mod boundary;

/// Generation-download orchestration engine.
pub mod downloader;

/// Multi-workflow scheduler with retry and failure classification.
pub mod scheduler;

/// Command-line interface implementation.
pub mod cli;

/// Performance metrics collection and monitoring.
pub mod metrics;

/// Health checking system for the controller and engine.
pub mod health;

/// Utility functions and helpers.
pub mod utils;

pub use actions::*;
pub use boundary::*;
pub use cli::*;
pub use config::*;
pub use controller::*;
pub use download_log::*;
pub use downloader::*;
pub use driver::*;
pub use engine::*;
pub use error::*;
pub use gallery::*;
pub use health::*;
pub use metrics::*;
pub use scheduler::*;
pub use utils::*;
pub use variables::*;
