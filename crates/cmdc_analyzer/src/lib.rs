//! # cmdc_analyzer
//!
//! Interprets the captured output of a finished command.
//!
//! The reasoning service is asked first. When it is not configured, fails,
//! or answers with something unparsable, a deterministic rule set takes
//! over: load averages, `df` tables, `/proc/mdstat` and `ps aux` listings
//! are recognised and turned into concerns, warnings and typed facts.
//! Analysis never fails.

pub mod analyzer;
pub mod rules;

pub use analyzer::{AnalysisRequest, Analyzer, AnalyzerOptions, DEFAULT_MAX_OUTPUT_CHARS};
pub use rules::{analyze_output, parse_df, parse_load, parse_mdstat, parse_ps};
