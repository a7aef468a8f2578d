//! Settings discovery and rule file loading

use crate::config::types::{RawRule, Settings};
use crate::error::{ConfigError, ConfigResult, RuleError, RuleResult};
use directories::ProjectDirs;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Settings file names to search for, in order
const SETTINGS_FILE_NAMES: &[&str] = &[".quillrc.yaml", ".quillrc.yml", "quillrc.yaml"];

/// Rule file extensions, in lookup order
const RULE_EXTENSIONS: &[&str] = &["yaml", "yml"];

/// Find a settings file by searching `start_dir` and its parents
pub fn find_settings_file_from(start_dir: &Path) -> Option<PathBuf> {
    let mut current_dir = start_dir.to_path_buf();

    loop {
        for file_name in SETTINGS_FILE_NAMES {
            let settings_path = current_dir.join(file_name);
            if settings_path.is_file() {
                return Some(settings_path);
            }
        }

        match current_dir.parent() {
            Some(parent) => current_dir = parent.to_path_buf(),
            None => return None,
        }
    }
}

/// Settings file in the user configuration directory, if one exists
pub fn user_settings_file() -> Option<PathBuf> {
    ProjectDirs::from("", "", "quill")
        .map(|dirs| dirs.config_dir().join("config.yaml"))
        .filter(|path| path.is_file())
}

/// Locate the settings that apply to a source directory
pub fn discover_settings(start_dir: &Path) -> Option<PathBuf> {
    find_settings_file_from(start_dir).or_else(user_settings_file)
}

/// Parse a settings file from a path
pub fn parse_settings_file(path: &Path) -> ConfigResult<Settings> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::Settings {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;

    parse_settings(&contents).map_err(|e| ConfigError::Settings {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Parse settings from a string
pub fn parse_settings(yaml: &str) -> Result<Settings, serde_yaml::Error> {
    if yaml.trim().is_empty() {
        return Ok(Settings::default());
    }
    serde_yaml::from_str(yaml)
}

/// Parse a rule from YAML text
pub fn parse_rule(yaml: &str, identifier: &str) -> RuleResult<RawRule> {
    serde_yaml::from_str(yaml).map_err(|e| RuleError::MalformedRule {
        identifier: identifier.to_string(),
        reason: e.to_string(),
    })
}

/// A source of rule definitions
pub trait RuleRepository {
    /// Look up a rule by identifier
    fn find(&self, identifier: &str) -> RuleResult<Option<RawRule>>;

    /// Every identifier this repository can serve, sorted
    fn identifiers(&self) -> RuleResult<Vec<String>>;
}

/// Rules stored as `<identifier>.yaml` files in a list of directories
#[derive(Debug, Clone, Default)]
pub struct FileRuleRepository {
    paths: Vec<PathBuf>,
}

impl FileRuleRepository {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        FileRuleRepository { paths }
    }

    /// Search paths, in lookup order
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Path of the file that would serve `identifier`
    pub fn locate(&self, identifier: &str) -> Option<PathBuf> {
        self.paths.iter().find_map(|dir| {
            RULE_EXTENSIONS
                .iter()
                .map(|ext| dir.join(format!("{}.{}", identifier, ext)))
                .find(|path| path.is_file())
        })
    }
}

impl RuleRepository for FileRuleRepository {
    fn find(&self, identifier: &str) -> RuleResult<Option<RawRule>> {
        let Some(path) = self.locate(identifier) else {
            log::debug!("rule '{}' not found in {:?}", identifier, self.paths);
            return Ok(None);
        };

        log::debug!("loading rule '{}' from {}", identifier, path.display());
        let contents = fs::read_to_string(&path).map_err(|e| RuleError::MalformedRule {
            identifier: identifier.to_string(),
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;
        parse_rule(&contents, identifier).map(Some)
    }

    fn identifiers(&self) -> RuleResult<Vec<String>> {
        let mut found = Vec::new();
        for dir in &self.paths {
            for ext in RULE_EXTENSIONS {
                let pattern = format!("{}/*.{}", glob::Pattern::escape(&dir.to_string_lossy()), ext);
                let entries = glob::glob(&pattern).map_err(|e| RuleError::MalformedRule {
                    identifier: dir.display().to_string(),
                    reason: e.to_string(),
                })?;
                for entry in entries {
                    let path = entry.map_err(|e| RuleError::MalformedRule {
                        identifier: dir.display().to_string(),
                        reason: e.to_string(),
                    })?;
                    if let Some(stem) = path.file_stem() {
                        found.push(stem.to_string_lossy().into_owned());
                    }
                }
            }
        }
        found.sort();
        found.dedup();
        Ok(found)
    }
}

impl RuleRepository for HashMap<String, RawRule> {
    fn find(&self, identifier: &str) -> RuleResult<Option<RawRule>> {
        Ok(self.get(identifier).cloned())
    }

    fn identifiers(&self) -> RuleResult<Vec<String>> {
        let mut keys: Vec<String> = self.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
