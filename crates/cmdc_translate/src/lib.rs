//! # cmdc_translate
//!
//! Turns free-form requests such as `"disk space"` or
//! `"memory and temperature"` into an executable [`CommandPlan`].
//!
//! Resolution order: exact phrase, passthrough of well-known binaries,
//! conjunction split, partial word match, external reasoning service and
//! finally a diagnostic fallback. Translation never fails; the worst case is
//! a command that prints the unknown input and the known phrases.
//!
//! [`CommandPlan`]: cmdc_core::CommandPlan

pub mod catalog;
pub mod error;
pub mod table;
pub mod translator;

pub use catalog::{builtin_table, help_text};
pub use error::{TranslateError, TranslateResult};
pub use table::{PhraseEntry, PhraseRule, PhraseTable};
pub use translator::{
    TranslationContext, TranslationResult, TranslationSource, Translator, TranslatorOptions,
};
