//! # cmdc_pipeline
//!
//! Ties the cmdcenter stages together.
//!
//! - [`AppConfig`]: TOML configuration with environment overrides
//! - [`Orchestrator`]: submit, cancel, status refresh and subscriptions
//! - [`ChatTranscript`] / [`ConsoleRenderer`]: observers turning lifecycle
//!   events into chat messages or terminal output
//!
//! # Example
//!
//! ```rust,no_run
//! use cmdc_core::EventFilter;
//! use cmdc_pipeline::{AppConfig, Orchestrator, SubmitRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load(None)?;
//!     let orchestrator = Orchestrator::from_config(&config)?;
//!     let mut events = orchestrator.subscribe(EventFilter::All);
//!
//!     let submission = orchestrator.submit(SubmitRequest::new("disk space")).await?;
//!     println!("running {}", submission.system_command);
//!     while let Some(event) = events.recv().await {
//!         if event.is_terminal() {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod consumers;
pub mod context;
pub mod error;
pub mod orchestrator;

pub use config::{AppConfig, CONFIG_ENV};
pub use consumers::{render_analysis, ChatTranscript, ConsoleRenderer, TranscriptStatus};
pub use context::ConversationContext;
pub use error::{PipelineError, PipelineResult};
pub use orchestrator::{Orchestrator, Submission, SubmitRequest};
