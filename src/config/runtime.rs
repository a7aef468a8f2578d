//! Effective configuration of a run
//!
//! [`RuntimeConfig`] starts from built-in defaults, is layered with a
//! settings file and finally with command line flags.

use crate::config::schema::validate_settings;
use crate::config::types::{EmptyFilesPolicy, Settings};
use crate::directive::Marker;
use crate::error::{ConfigError, ConfigResult};
use crate::runner::Verbosity;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default loop ceiling for `while` and `until`
pub const DEFAULT_MAX_LOOPS: u32 = 10;

/// Comment prefix shared by the TeX family
const TEX_COMMENT: &str = r"^\s*%\s*";

/// Extensions recognized without any settings
const DEFAULT_EXTENSIONS: &[&str] = &["tex", "dtx", "ltx", "drv", "ins"];

/// A source file type and how its comments look
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileType {
    /// Extension without the dot
    pub extension: String,

    /// Comment prefix pattern
    pub comment: String,
}

impl FileType {
    pub fn new(extension: impl Into<String>, comment: impl Into<String>) -> Self {
        FileType {
            extension: extension.into(),
            comment: comment.into(),
        }
    }

    /// Directive marker for this file type
    pub fn marker(&self) -> Marker {
        Marker::new(self.comment.clone())
    }
}

/// Built-in file types
pub fn default_file_types() -> Vec<FileType> {
    DEFAULT_EXTENSIONS
        .iter()
        .map(|ext| FileType::new(*ext, TEX_COMMENT))
        .collect()
}

/// Everything a pipeline run needs to know besides the source file
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub verbosity: Verbosity,

    /// Command timeout in milliseconds, 0 disables it
    pub timeout_ms: u64,

    /// Loop ceiling for `while` and `until`, at least 1
    pub max_loops: u32,

    /// Rule directories, in lookup order
    pub rule_paths: Vec<PathBuf>,

    pub dry_run: bool,

    /// Only scan the leading comment block of the source
    pub header_only: bool,

    pub empty_files: EmptyFilesPolicy,

    pub file_types: Vec<FileType>,

    /// Named directive text available to `--preamble`
    pub preambles: BTreeMap<String, String>,

    /// Preambles selected for this run, in order
    pub selected_preambles: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            verbosity: Verbosity::Normal,
            timeout_ms: 0,
            max_loops: DEFAULT_MAX_LOOPS,
            rule_paths: Vec::new(),
            dry_run: false,
            header_only: false,
            empty_files: EmptyFilesPolicy::default(),
            file_types: default_file_types(),
            preambles: BTreeMap::new(),
            selected_preambles: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer a settings file over the current values
    ///
    /// Relative rule paths are resolved against `base_dir`, the directory of
    /// the settings file.
    pub fn apply_settings(&mut self, settings: &Settings, base_dir: &Path) -> ConfigResult<()> {
        validate_settings(settings)?;

        self.rule_paths
            .extend(settings.paths.iter().map(|p| base_dir.join(p)));
        if settings.verbose == Some(true) {
            self.verbosity = Verbosity::Verbose;
        }
        if let Some(timeout) = settings.timeout {
            self.timeout_ms = timeout;
        }
        if let Some(loops) = settings.loops {
            self.max_loops = loops;
        }
        if let Some(dry_run) = settings.dry_run {
            self.dry_run = dry_run;
        }
        if let Some(header) = settings.header {
            self.header_only = header;
        }
        if let Some(policy) = settings.empty_files {
            self.empty_files = policy;
        }
        for entry in &settings.filetypes {
            let file_type = FileType::new(entry.extension.as_str(), entry.pattern.as_str());
            match self
                .file_types
                .iter_mut()
                .find(|t| t.extension == file_type.extension)
            {
                Some(existing) => *existing = file_type,
                None => self.file_types.push(file_type),
            }
        }
        self.preambles.extend(
            settings
                .preambles
                .iter()
                .map(|(name, text)| (name.clone(), text.clone())),
        );

        Ok(())
    }

    /// Set the loop ceiling
    pub fn with_max_loops(mut self, max_loops: u32) -> ConfigResult<Self> {
        if max_loops == 0 {
            return Err(ConfigError::Invalid(
                "the loop ceiling must be at least 1".to_string(),
            ));
        }
        self.max_loops = max_loops;
        Ok(self)
    }

    /// Set the command timeout in milliseconds
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set verbosity level
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Add a rule directory after the existing ones
    pub fn with_rule_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.rule_paths.push(path.into());
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_empty_files(mut self, policy: EmptyFilesPolicy) -> Self {
        self.empty_files = policy;
        self
    }

    /// File type for a source path, chosen by extension
    pub fn file_type_for(&self, source: &Path) -> ConfigResult<&FileType> {
        let extension = source
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.file_types
            .iter()
            .find(|t| t.extension.eq_ignore_ascii_case(&extension))
            .ok_or(ConfigError::UnsupportedFileType(extension))
    }

    /// Text of the selected preambles, in selection order
    pub fn preamble_texts(&self) -> ConfigResult<Vec<&str>> {
        self.selected_preambles
            .iter()
            .map(|name| {
                self.preambles
                    .get(name)
                    .map(String::as_str)
                    .ok_or_else(|| ConfigError::PreambleNotFound(name.clone()))
            })
            .collect()
    }
}
