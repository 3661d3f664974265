//! # cmdc_core
//!
//! Shared model for the cmdcenter command pipeline.
//!
//! This crate holds the types every other stage agrees on:
//!
//! - **Invocation**: one request lifecycle, from natural-language input to
//!   terminal state, with its captured output
//! - **CommandPlan**: an ordered list of labelled shell steps
//! - **LifecycleEvent**: the events observers receive, keyed by invocation id
//! - **EventBus**: in-process broadcast of lifecycle events
//! - **AnalysisResult**: the structured interpretation of a finished command
//!
//! ## Event flow
//!
//! ```text
//! submit ──▶ Translator ──▶ SessionManager ──▶ EventBus ──▶ observers
//!                                 │                ▲
//!                                 └──▶ Analyzer ───┘
//! ```

pub mod analysis;
pub mod bus;
pub mod error;
pub mod event;
pub mod invocation;
pub mod plan;

pub use analysis::{
    AnalysisFacts, AnalysisResult, AnalysisSource, FilesystemUsage, LoadFacts, LoadSeverity,
    LoadTrend, ProcessFacts, ProcessUsage, RaidArray, StorageFacts,
};
pub use bus::{EventBus, EventFilter, Subscription, DEFAULT_BUS_CAPACITY};
pub use error::{CoreError, CoreResult};
pub use event::{
    CommandAnalysis, CommandFinished, CommandIssued, CommandOutput, CommandStopped, EventKind,
    LifecycleEvent,
};
pub use invocation::{Invocation, InvocationId, InvocationState, OutputChunk, OutputStream};
pub use plan::{shell_quote, CommandPlan, CommandStep};
