//! Common test utilities

#![allow(dead_code)]

use quill::config::RuntimeConfig;
use quill::runner::Verbosity;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary project: a `rules/` directory next to the source files
pub struct Project {
    pub dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("rules")).unwrap();
        Project { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn rules_dir(&self) -> PathBuf {
        self.dir.path().join("rules")
    }

    /// Write `rules/<identifier>.yaml`
    pub fn rule(&self, identifier: &str, yaml: &str) -> &Self {
        fs::write(self.rules_dir().join(format!("{}.yaml", identifier)), yaml).unwrap();
        self
    }

    /// Write a rule with a single command
    pub fn simple_rule(&self, identifier: &str, command: &str) -> &Self {
        let yaml = format!(
            "identifier: {id}\nname: {id}\ncommand: '{command}'\n",
            id = identifier,
            command = command.replace('\'', "''")
        );
        self.rule(identifier, &yaml)
    }

    /// Write a source file and return its path
    pub fn source(&self, name: &str, text: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, text).unwrap();
        path
    }

    /// Quiet configuration reading rules from this project
    pub fn config(&self) -> RuntimeConfig {
        RuntimeConfig::new()
            .with_rule_path(self.rules_dir())
            .with_verbosity(Verbosity::Silent)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }
}
