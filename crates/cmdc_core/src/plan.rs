//! Typed command plans.
//!
//! A plan is an ordered list of shell steps. Multi-section commands are
//! expressed as separate labelled steps instead of `echo` banners chained
//! with `&&`; the execution engine runs each step and tags its output with
//! the step label.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// A single shell command, optionally labelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandStep {
    /// Section label shown to observers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Shell command line executed on the remote host
    pub command: String,
}

impl CommandStep {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            label: None,
            command: command.into(),
        }
    }

    pub fn labelled(label: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            command: command.into(),
        }
    }

    /// Display form of the step.
    pub fn render(&self) -> String {
        match &self.label {
            Some(label) => format!(
                "echo {} && {}",
                shell_quote(&format!("=== {} ===", label)),
                self.command
            ),
            None => self.command.clone(),
        }
    }
}

/// Ordered list of steps executed sequentially; execution stops at the
/// first step that exits non-zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandPlan {
    steps: Vec<CommandStep>,
}

impl CommandPlan {
    /// Create a plan from steps. Fails on an empty list.
    pub fn new(steps: Vec<CommandStep>) -> CoreResult<Self> {
        if steps.is_empty() {
            return Err(CoreError::EmptyPlan);
        }
        Ok(Self { steps })
    }

    /// Plan made of a single unlabelled command.
    pub fn single(command: impl Into<String>) -> Self {
        Self {
            steps: vec![CommandStep::new(command)],
        }
    }

    pub fn push(&mut self, step: CommandStep) {
        self.steps.push(step);
    }

    /// Append every step of `other`, labelling unlabelled steps with `label`.
    pub fn extend_labelled(&mut self, label: &str, other: CommandPlan) {
        for mut step in other.steps {
            if step.label.is_none() {
                step.label = Some(label.to_string());
            }
            self.steps.push(step);
        }
    }

    pub fn steps(&self) -> &[CommandStep] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<CommandStep> {
        self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Human-readable command line equivalent of the plan.
    pub fn render(&self) -> String {
        self.steps
            .iter()
            .map(CommandStep::render)
            .collect::<Vec<_>>()
            .join(" && ")
    }
}

impl std::fmt::Display for CommandPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Quote a string for POSIX shells using single quotes.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_step_renders_verbatim() {
        assert_eq!(CommandPlan::single("free -h").render(), "free -h");
    }

    #[test]
    fn test_multi_step_render() {
        let plan = CommandPlan::new(vec![
            CommandStep::new("uptime"),
            CommandStep::new("free -h"),
            CommandStep::new("df -h"),
        ])
        .unwrap();

        assert_eq!(plan.render(), "uptime && free -h && df -h");
    }

    #[test]
    fn test_labelled_render() {
        let step = CommandStep::labelled("Routing", "ip -br route");
        assert_eq!(step.render(), "echo '=== Routing ===' && ip -br route");
    }

    #[test]
    fn test_empty_plan_rejected() {
        assert!(matches!(CommandPlan::new(vec![]), Err(CoreError::EmptyPlan)));
    }

    #[test]
    fn test_extend_labelled_keeps_existing_labels() {
        let mut plan = CommandPlan::default();
        plan.extend_labelled("memory", CommandPlan::single("free -h"));
        plan.extend_labelled(
            "network",
            CommandPlan::new(vec![CommandStep::labelled("Routing", "ip -br route")]).unwrap(),
        );

        assert_eq!(plan.steps()[0].label.as_deref(), Some("memory"));
        assert_eq!(plan.steps()[1].label.as_deref(), Some("Routing"));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
