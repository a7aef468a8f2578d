//! Core configuration types
//!
//! This module defines the data structures behind rule files and the quill
//! settings file. `Raw*` types mirror the YAML as written; [`Rule`] and its
//! parts are the validated form handed to the runner.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A rule file as written
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRule {
    /// Rule identifier, must match the file name
    #[serde(default)]
    pub identifier: String,

    /// Human readable rule name
    #[serde(default)]
    pub name: String,

    /// Single command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<RawCommand>,

    /// Several commands, run in order
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_commands"
    )]
    pub commands: Option<Vec<RawCommand>>,

    /// Declared arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<RawArgument>,
}

/// A command template - a bare string or a detailed entry
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawCommand {
    /// Template only
    Simple(String),

    /// Template with a display name and working directory
    Detail(RawCommandDetail),
}

/// Command entry with its own name or directory
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RawCommandDetail {
    /// Display name (defaults to the rule name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// The command template
    pub command: String,

    /// Working directory template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

/// An argument declaration as written
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RawArgument {
    #[serde(default)]
    pub identifier: String,

    /// Template expanded when the argument is bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,

    /// Template expanded when the argument is not bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// The directive must bind this argument
    #[serde(default)]
    pub required: bool,
}

/// A validated rule
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub identifier: String,
    pub name: String,
    pub arguments: Vec<RuleArgument>,
    pub commands: Vec<RuleCommand>,
}

impl Rule {
    /// Look up a declared argument
    pub fn argument(&self, identifier: &str) -> Option<&RuleArgument> {
        self.arguments.iter().find(|a| a.identifier == identifier)
    }
}

/// A validated argument declaration
#[derive(Debug, Clone, PartialEq)]
pub struct RuleArgument {
    pub identifier: String,
    pub flag: Option<String>,
    pub default: Option<String>,
    pub required: bool,
}

/// A validated command template
#[derive(Debug, Clone, PartialEq)]
pub struct RuleCommand {
    pub name: Option<String>,
    pub template: String,
    pub dir: Option<String>,
}

impl From<RawCommand> for RuleCommand {
    fn from(raw: RawCommand) -> Self {
        match raw {
            RawCommand::Simple(template) => RuleCommand {
                name: None,
                template,
                dir: None,
            },
            RawCommand::Detail(detail) => RuleCommand {
                name: detail.name,
                template: detail.command,
                dir: detail.dir,
            },
        }
    }
}

/// What to do with a directive whose `files` list is empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyFilesPolicy {
    /// Produce no tasks and log a warning
    #[default]
    Skip,

    /// Fail with `EmptyFilesList`
    Reject,
}

/// Settings file contents
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    /// Rule search paths, relative to the settings file
    #[serde(default, deserialize_with = "deserialize_paths")]
    pub paths: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,

    /// Command timeout in milliseconds, 0 disables it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Loop ceiling for `while` and `until`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loops: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,

    /// Only scan the leading comment block of the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_files: Option<EmptyFilesPolicy>,

    /// Extra file types, or overrides of the built-in ones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filetypes: Vec<FileTypeSetting>,

    /// Named directive text that can be prepended to a run
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub preambles: BTreeMap<String, String>,
}

/// A file type entry in the settings file
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FileTypeSetting {
    /// Extension without the dot
    pub extension: String,

    /// Comment prefix pattern (a regular expression)
    pub pattern: String,
}

/// Custom deserializer for commands that handles both single values and arrays
fn deserialize_commands<'de, D>(deserializer: D) -> Result<Option<Vec<RawCommand>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    use serde_yaml::Value;

    let value = Value::deserialize(deserializer)?;

    match value {
        Value::String(s) => Ok(Some(vec![RawCommand::Simple(s)])),
        Value::Mapping(_) => {
            let cmd = RawCommand::deserialize(value).map_err(D::Error::custom)?;
            Ok(Some(vec![cmd]))
        }
        Value::Sequence(seq) => {
            let mut cmds = Vec::new();
            for item in seq {
                let cmd = RawCommand::deserialize(item).map_err(D::Error::custom)?;
                cmds.push(cmd);
            }
            Ok(Some(cmds))
        }
        Value::Null => Ok(None),
        _ => Err(D::Error::custom("commands must be a string, object, or array")),
    }
}

/// Custom deserializer for search paths: a single path or a list of them
fn deserialize_paths<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    use serde_yaml::Value;

    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(vec![s]),
        Value::Sequence(seq) => seq
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                _ => Err(D::Error::custom("paths must be strings")),
            })
            .collect(),
        Value::Null => Ok(Vec::new()),
        _ => Err(D::Error::custom("paths must be a string or array")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_single_command_rule() {
        let yaml = r#"
identifier: pdflatex
name: PDFLaTeX
command: pdflatex {{ file }}
arguments:
  - identifier: shell
    flag: "{{ isTrue(parameters.shell, '--shell-escape') }}"
"#;
        let rule: RawRule = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rule.identifier, "pdflatex");
        assert_eq!(
            rule.command,
            Some(RawCommand::Simple("pdflatex {{ file }}".to_string()))
        );
        assert!(rule.commands.is_none());
        assert_eq!(rule.arguments.len(), 1);
        assert!(!rule.arguments[0].required);
    }

    #[test]
    fn test_deserialize_command_list() {
        let yaml = r#"
identifier: clean
name: Cleaner
commands:
  - rm -f {{ file }}
  - name: Listing
    command: ls
    dir: build
"#;
        let rule: RawRule = serde_yaml::from_str(yaml).unwrap();
        let commands = rule.commands.unwrap();
        assert_eq!(commands.len(), 2);
        assert!(matches!(&commands[1], RawCommand::Detail(d) if d.dir.as_deref() == Some("build")));
    }

    #[test]
    fn test_deserialize_commands_single_value() {
        let yaml = "identifier: x\nname: X\ncommands: echo hi\n";
        let rule: RawRule = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rule.commands.map(|c| c.len()), Some(1));
    }

    #[test]
    fn test_deserialize_settings() {
        let yaml = r#"
paths: rules
loops: 5
dry-run: true
empty-files: reject
filetypes:
  - extension: md
    pattern: '^\s*<!--\s*'
preambles:
  twice: "% quill: pdflatex\n% quill: pdflatex"
"#;
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.paths, vec!["rules".to_string()]);
        assert_eq!(settings.loops, Some(5));
        assert_eq!(settings.dry_run, Some(true));
        assert_eq!(settings.empty_files, Some(EmptyFilesPolicy::Reject));
        assert_eq!(settings.filetypes[0].extension, "md");
        assert!(settings.preambles.contains_key("twice"));
    }

    #[test]
    fn test_raw_command_into_rule_command() {
        let command: RuleCommand = RawCommand::Simple("make".to_string()).into();
        assert_eq!(command.template, "make");
        assert!(command.name.is_none());
    }
}
