//! # cmdc_runner
//!
//! Remote command execution for cmdcenter.
//!
//! The [`SessionManager`] owns the single remote session allowed at any
//! time. It runs a [`CommandPlan`] step by step over one connection,
//! streams output to the [`EventBus`] as it arrives and supports
//! interruption and a total-runtime ceiling.
//!
//! # Features
//!
//! - **SSH transport**: public-key authentication with narrowed algorithm
//!   lists ([`SshExecutor`], built on russh)
//! - **Single session**: a second `start` while busy is rejected without
//!   touching the running command
//! - **Interrupt**: SIGINT to the remote process, then connection close
//! - **Status probe**: concurrent snapshot of load, memory, disks,
//!   temperature and addresses on a separate connection
//! - **Mock executor**: scripted remote processes for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cmdc_core::{CommandPlan, EventBus, Invocation, InvocationId};
//! use cmdc_runner::{SessionManager, SessionOptions, SshConfig, SshExecutor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let executor = SshExecutor::new(SshConfig::default().apply_env())?;
//!     let manager = SessionManager::new(Arc::new(executor), EventBus::default(), SessionOptions::default());
//!
//!     let invocation = Invocation::new(InvocationId::generate(), "memory");
//!     let running = manager.start(invocation, CommandPlan::single("free -h")).await?;
//!     let finished = running.wait().await?;
//!     println!("{}", finished.captured_text());
//!     Ok(())
//! }
//! ```
//!
//! [`CommandPlan`]: cmdc_core::CommandPlan
//! [`EventBus`]: cmdc_core::EventBus

pub mod config;
pub mod error;
pub mod mock;
pub mod probe;
pub mod runner;
pub mod session;
pub mod ssh;

pub use config::{AlgorithmConfig, SessionOptions, SshConfig};
pub use error::{RunnerError, RunnerResult};
pub use mock::{CapturedCall, MockExecutor, MockResponse};
pub use probe::{ProbeOutput, StatusProbe, SystemSnapshot, STATUS_COMMANDS};
pub use runner::{ProcessOutput, RemoteConnection, RemoteExecutor, RemoteProcess};
pub use session::{RunningInvocation, SessionManager, STOPPED_MESSAGE};
pub use ssh::SshExecutor;
