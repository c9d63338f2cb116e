//! Source configuration
//!
//! [`SourceConfig`] carries every option a [`Source`](crate::Source) is
//! constructed with. It deserializes from TOML with all fields optional
//! except `file_name`:
//!
//! ```toml
//! file_name = "run_2024.spec"
//! file_path = "/beamtime/data"
//! read_and_forget = true
//! nexus_file_path = "/scratch/cache"
//!
//! [pal_xfel]
//! file_pattern = "{:07}_meta.log"
//! ```

use crate::error::ConfigError;
use crate::readers::{FilePattern, ReaderKind};
use evaldata_nexus::ContainerFormat;
use evaldata_scan::ScanNumber;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default postfix between cache base name and extension
pub const DEFAULT_NEXUS_POSTFIX: &str = ".evaldata";

/// Options of a scan source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    /// Raw file name (SPEC file, PAL-XFEL folder or NeXus file)
    pub file_name: String,
    /// Directory holding the raw data
    pub file_path: PathBuf,
    /// Force a reader instead of detecting it from the path
    pub reader: Option<ReaderKind>,
    /// Keep a NeXus cache file next to the raw data
    pub use_nexus: bool,
    /// Discard and rebuild the cache unconditionally
    pub force_overwrite: bool,
    /// Look for new scans before returning any scan
    pub update_before_read: bool,
    /// Drop scan data from memory after handing out a copy
    pub read_and_forget: bool,
    /// Read the data of every scan during update
    pub read_all_data: bool,
    /// First accepted scan number
    pub start_scan_number: ScanNumber,
    /// Last accepted scan number (inclusive)
    pub stop_scan_number: Option<ScanNumber>,
    /// Cache directory, defaults to `file_path`
    pub nexus_file_path: Option<PathBuf>,
    /// Cache base name, defaults to `file_name`
    pub nexus_file_name: Option<String>,
    /// Postfix appended to the cache base name
    pub nexus_file_name_postfix: String,
    /// Cache container format
    pub nexus_format: ContainerFormat,
    /// PAL-XFEL folder options
    pub pal_xfel: PalXfelOptions,
}

impl SourceConfig {
    /// Configuration for a raw file with default options
    #[must_use]
    pub fn new(file_name: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_name: file_name.into(),
            file_path: file_path.into(),
            ..Self::default()
        }
    }

    /// Parse a TOML document
    ///
    /// # Errors
    /// Returns error if the document is not valid TOML or fails validation
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    ///
    /// Relative `file_path` and `nexus_file_path` values are resolved
    /// against the directory of the config file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&content)?;

        if let Some(base) = path.parent() {
            if config.file_path.is_relative() {
                config.file_path = base.join(&config.file_path);
            }
            if let Some(dir) = config.nexus_file_path.as_mut().filter(|d| d.is_relative()) {
                *dir = base.join(&*dir);
            }
        }
        tracing::debug!("Loaded source config from {}", path.display());
        Ok(config)
    }

    /// Check option consistency
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] describing the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.file_name.trim().is_empty() {
            return Err(ConfigError::invalid("file_name must not be empty"));
        }
        if let Some(stop) = self.stop_scan_number {
            if stop < self.start_scan_number {
                return Err(ConfigError::invalid(format!(
                    "stop_scan_number {stop} is below start_scan_number {}",
                    self.start_scan_number
                )));
            }
        }
        if self.nexus_file_name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(ConfigError::invalid("nexus_file_name must not be empty"));
        }
        FilePattern::parse(&self.pal_xfel.file_pattern)
            .map_err(|e| ConfigError::invalid(e.to_string()))?;
        Ok(())
    }

    /// Path of the raw file or folder
    #[must_use]
    pub fn raw_path(&self) -> PathBuf {
        self.file_path.join(&self.file_name)
    }

    /// Directory of the cache file
    #[must_use]
    pub fn nexus_dir(&self) -> &Path {
        self.nexus_file_path.as_deref().unwrap_or(&self.file_path)
    }

    /// Full path of the cache file
    #[must_use]
    pub fn nexus_file(&self) -> PathBuf {
        let base = self.nexus_file_name.as_deref().unwrap_or(&self.file_name);
        self.nexus_dir().join(format!(
            "{base}{}.{}",
            self.nexus_file_name_postfix,
            self.nexus_format.extension()
        ))
    }

    /// Whether a scan number lies in the configured range
    #[inline]
    #[must_use]
    pub fn accepts(&self, number: ScanNumber) -> bool {
        number >= self.start_scan_number && self.stop_scan_number.map_or(true, |stop| number <= stop)
    }

    /// With forced reader
    #[inline]
    #[must_use]
    pub fn with_reader(mut self, reader: ReaderKind) -> Self {
        self.reader = Some(reader);
        self
    }

    /// With cache enabled or disabled
    #[inline]
    #[must_use]
    pub fn with_use_nexus(mut self, use_nexus: bool) -> Self {
        self.use_nexus = use_nexus;
        self
    }

    /// With forced cache rebuild
    #[inline]
    #[must_use]
    pub fn with_force_overwrite(mut self, force: bool) -> Self {
        self.force_overwrite = force;
        self
    }

    /// With update before every read
    #[inline]
    #[must_use]
    pub fn with_update_before_read(mut self, update: bool) -> Self {
        self.update_before_read = update;
        self
    }

    /// With data dropped after it was handed out
    #[inline]
    #[must_use]
    pub fn with_read_and_forget(mut self, forget: bool) -> Self {
        self.read_and_forget = forget;
        self
    }

    /// With eager data reads during update
    #[inline]
    #[must_use]
    pub fn with_read_all_data(mut self, read_all: bool) -> Self {
        self.read_all_data = read_all;
        self
    }

    /// With accepted scan number range
    #[inline]
    #[must_use]
    pub fn with_scan_range(mut self, start: ScanNumber, stop: Option<ScanNumber>) -> Self {
        self.start_scan_number = start;
        self.stop_scan_number = stop;
        self
    }

    /// With cache directory
    #[inline]
    #[must_use]
    pub fn with_nexus_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.nexus_file_path = Some(path.into());
        self
    }

    /// With cache base name
    #[inline]
    #[must_use]
    pub fn with_nexus_file_name(mut self, name: impl Into<String>) -> Self {
        self.nexus_file_name = Some(name.into());
        self
    }

    /// With cache postfix
    #[inline]
    #[must_use]
    pub fn with_nexus_file_name_postfix(mut self, postfix: impl Into<String>) -> Self {
        self.nexus_file_name_postfix = postfix.into();
        self
    }

    /// With cache container format
    #[inline]
    #[must_use]
    pub fn with_nexus_format(mut self, format: ContainerFormat) -> Self {
        self.nexus_format = format;
        self
    }

    /// With PAL-XFEL folder options
    #[inline]
    #[must_use]
    pub fn with_pal_xfel(mut self, options: PalXfelOptions) -> Self {
        self.pal_xfel = options;
        self
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            file_name: String::new(),
            file_path: PathBuf::from("./"),
            reader: None,
            use_nexus: true,
            force_overwrite: false,
            update_before_read: true,
            read_and_forget: false,
            read_all_data: false,
            start_scan_number: 0,
            stop_scan_number: None,
            nexus_file_path: None,
            nexus_file_name: None,
            nexus_file_name_postfix: DEFAULT_NEXUS_POSTFIX.to_string(),
            nexus_format: ContainerFormat::default(),
            pal_xfel: PalXfelOptions::default(),
        }
    }
}

/// Options for folders of per-scan PAL-XFEL files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PalXfelOptions {
    /// File name of one scan, `{}` or `{:0N}` stands for the scan number
    pub file_pattern: String,
    /// Explicit scan numbers to visit, in order
    pub scan_list: Vec<ScanNumber>,
}

impl Default for PalXfelOptions {
    fn default() -> Self {
        Self {
            file_pattern: "{:07}_meta.log".to_string(),
            scan_list: Vec::new(),
        }
    }
}
