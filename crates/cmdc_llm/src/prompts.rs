//! System prompts and templates for reasoning service requests.

/// System role shared by translation and analysis requests.
pub const SYSTEM_PROMPT: &str = r#"You are an assistant managing a Raspberry Pi NAS system.
Your role is to:
1. Translate natural language commands into system commands
2. Break down complex tasks into executable steps
3. Ensure safe system modifications
4. Provide clear explanations of actions
5. Interpret command output and point out problems

Available command categories:
- System status and monitoring
- Storage and RAID management
- Memory management
- Temperature monitoring
- Network management
- File system operations
- Docker management
- Share management
- Power management
- Service management

CRITICAL RULES:
1. NEVER modify system configurations without explicit confirmation
2. Always explain what a command will do before executing
3. If a task requires multiple steps, break it down and list all steps
4. Flag any potentially dangerous operations
5. Respect file system permissions and quotas
6. Answer with JSON only"#;

/// Translation request. Placeholders: `{{input}}`, `{{history}}`, `{{systemState}}`.
pub const TRANSLATION_TEMPLATE: &str = r#"Given the following user request, translate it into appropriate system command(s).

User Request: {{input}}

Previous Context:
{{history}}

Current System State:
{{systemState}}

Provide your response in the following JSON format:
{
  "translation": {
    "command": "primary system command",
    "subCommands": ["step 1", "step 2"],
    "explanation": "what these commands will do",
    "requiresConfirmation": true/false
  },
  "confidence": 0.95,
  "warnings": ["any safety warnings"],
  "context": {"relevant context for future"}
}"#;

/// Analysis request. Placeholders: `{{input}}`, `{{command}}`, `{{output}}`.
pub const ANALYSIS_TEMPLATE: &str = r#"Analyze the result of the following command run on the NAS.

User Request: {{input}}

Command:
{{command}}

Output:
{{output}}

Provide your response in the following JSON format:
{
  "analysis": {
    "summary": "one paragraph summary",
    "concerns": ["problems that need attention"],
    "recommendations": ["suggested next steps"],
    "details": "longer explanation"
  },
  "confidence": 0.9
}"#;

/// Prompt used to check credentials and reachability.
pub const CONNECTION_CHECK_PROMPT: &str = "Hello, are you ready?";

/// Replace every `{{key}}` placeholder with its value.
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{{{}}}}}", key), value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_translation_template() {
        let prompt = render_template(
            TRANSLATION_TEMPLATE,
            &[
                ("input", "show disk usage"),
                ("history", "[\"memory\"]"),
                ("systemState", "{}"),
            ],
        );

        assert!(prompt.contains("User Request: show disk usage"));
        assert!(prompt.contains("[\"memory\"]"));
        assert!(!prompt.contains("{{input}}"));
        assert!(!prompt.contains("{{systemState}}"));
    }

    #[test]
    fn test_unknown_placeholders_are_kept() {
        let rendered = render_template("{{a}} {{b}}", &[("a", "1")]);
        assert_eq!(rendered, "1 {{b}}");
    }
}
