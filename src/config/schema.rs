//! Rule and settings validation
//!
//! Rules are checked once, when first resolved; settings are checked before
//! a run starts.

use crate::config::types::{RawRule, Rule, RuleArgument, RuleCommand, Settings};
use crate::error::{ConfigError, ConfigResult, RuleError, RuleResult};
use regex::Regex;
use std::collections::HashSet;

/// Names bound by the runner that no rule argument may use
pub const RESERVED_IDENTIFIERS: &[&str] =
    &["file", "files", "item", "items", "reference", "parameters"];

/// Check whether a name is reserved
pub fn is_reserved(identifier: &str) -> bool {
    RESERVED_IDENTIFIERS.contains(&identifier)
}

/// Validate a raw rule that was requested as `requested`
pub fn validate_rule(requested: &str, raw: RawRule) -> RuleResult<Rule> {
    let malformed = |reason: String| RuleError::MalformedRule {
        identifier: requested.to_string(),
        reason,
    };

    if raw.identifier.trim().is_empty() {
        return Err(malformed("the rule has no identifier".to_string()));
    }
    if raw.identifier != requested {
        return Err(malformed(format!(
            "the rule declares identifier '{}'",
            raw.identifier
        )));
    }
    if raw.name.trim().is_empty() {
        return Err(malformed("the rule has no name".to_string()));
    }

    let commands: Vec<RuleCommand> = match (raw.command, raw.commands) {
        (Some(_), Some(_)) => {
            return Err(malformed(
                "'command' and 'commands' cannot both be given".to_string(),
            ))
        }
        (Some(command), None) => vec![command.into()],
        (None, Some(commands)) => commands.into_iter().map(RuleCommand::from).collect(),
        (None, None) => Vec::new(),
    };
    if commands.is_empty() {
        return Err(malformed("the rule has no commands".to_string()));
    }
    if let Some(index) = commands.iter().position(|c| c.template.trim().is_empty()) {
        return Err(malformed(format!("command #{} is empty", index + 1)));
    }

    let mut seen = HashSet::new();
    let mut arguments = Vec::with_capacity(raw.arguments.len());
    for argument in raw.arguments {
        let id = argument.identifier.trim();
        if id.is_empty() {
            return Err(malformed("an argument has no identifier".to_string()));
        }
        if is_reserved(id) {
            return Err(malformed(format!("argument '{}' uses a reserved name", id)));
        }
        if !seen.insert(id.to_string()) {
            return Err(malformed(format!("argument '{}' is declared twice", id)));
        }
        if argument.flag.is_none() && argument.default.is_none() && !argument.required {
            return Err(malformed(format!(
                "argument '{}' needs a flag, a default or 'required: true'",
                id
            )));
        }
        arguments.push(RuleArgument {
            identifier: id.to_string(),
            flag: argument.flag,
            default: argument.default,
            required: argument.required,
        });
    }

    Ok(Rule {
        identifier: raw.identifier,
        name: raw.name,
        arguments,
        commands,
    })
}

/// Validate settings before they are applied
pub fn validate_settings(settings: &Settings) -> ConfigResult<()> {
    if settings.loops == Some(0) {
        return Err(ConfigError::Invalid(
            "'loops' must be at least 1".to_string(),
        ));
    }

    for file_type in &settings.filetypes {
        validate_file_type(&file_type.extension, &file_type.pattern)?;
    }

    Ok(())
}

/// Validate a file type extension and its comment pattern
pub fn validate_file_type(extension: &str, pattern: &str) -> ConfigResult<()> {
    if extension.trim().is_empty() || extension.starts_with('.') {
        return Err(ConfigError::Invalid(format!(
            "Invalid file type extension: '{}'",
            extension
        )));
    }
    Regex::new(pattern).map_err(|e| {
        ConfigError::Invalid(format!(
            "Invalid comment pattern for '{}': {}",
            extension, e
        ))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{FileTypeSetting, RawArgument, RawCommand};

    fn raw_rule() -> RawRule {
        RawRule {
            identifier: "pdflatex".to_string(),
            name: "PDFLaTeX".to_string(),
            command: Some(RawCommand::Simple("pdflatex {{ file }}".to_string())),
            commands: None,
            arguments: vec![RawArgument {
                identifier: "shell".to_string(),
                flag: Some("--shell-escape".to_string()),
                default: None,
                required: false,
            }],
        }
    }

    fn reason(result: RuleResult<Rule>) -> String {
        match result {
            Err(RuleError::MalformedRule { reason, .. }) => reason,
            other => panic!("expected MalformedRule, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_valid_rule() {
        let rule = validate_rule("pdflatex", raw_rule()).unwrap();
        assert_eq!(rule.commands.len(), 1);
        assert_eq!(rule.commands[0].template, "pdflatex {{ file }}");
        assert!(rule.argument("shell").is_some());
    }

    #[test]
    fn test_identifier_mismatch() {
        assert!(reason(validate_rule("xelatex", raw_rule())).contains("pdflatex"));
    }

    #[test]
    fn test_command_and_commands() {
        let mut raw = raw_rule();
        raw.commands = Some(vec![RawCommand::Simple("true".to_string())]);
        assert!(reason(validate_rule("pdflatex", raw)).contains("both"));

        let mut raw = raw_rule();
        raw.command = None;
        assert!(reason(validate_rule("pdflatex", raw)).contains("no commands"));
    }

    #[test]
    fn test_reserved_argument() {
        for name in RESERVED_IDENTIFIERS {
            let mut raw = raw_rule();
            raw.arguments[0].identifier = name.to_string();
            assert!(reason(validate_rule("pdflatex", raw)).contains("reserved"));
        }
    }

    #[test]
    fn test_duplicate_argument() {
        let mut raw = raw_rule();
        raw.arguments.push(raw.arguments[0].clone());
        assert!(reason(validate_rule("pdflatex", raw)).contains("twice"));
    }

    #[test]
    fn test_argument_without_flag_or_default() {
        let mut raw = raw_rule();
        raw.arguments[0].flag = None;
        assert!(validate_rule("pdflatex", raw.clone()).is_err());

        raw.arguments[0].required = true;
        assert!(validate_rule("pdflatex", raw).is_ok());
    }

    #[test]
    fn test_validate_settings() {
        let mut settings = Settings::default();
        assert!(validate_settings(&settings).is_ok());

        settings.loops = Some(0);
        assert!(matches!(
            validate_settings(&settings),
            Err(ConfigError::Invalid(_))
        ));

        settings.loops = Some(2);
        settings.filetypes.push(FileTypeSetting {
            extension: "md".to_string(),
            pattern: "(".to_string(),
        });
        assert!(validate_settings(&settings).is_err());
    }
}
