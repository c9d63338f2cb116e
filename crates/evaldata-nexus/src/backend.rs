//! Container backend trait and format selection

use crate::error::{NexusError, NexusResult};
use crate::tree::{Attributes, NxFile, NxGroup};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::path::Path;
use std::str::FromStr;

/// How much of a container to load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadDepth {
    /// Groups, attributes and dataset shapes only
    Headers,
    /// Everything including dataset values
    Full,
}

/// On-disk container format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerFormat {
    /// Native HDF5 (NeXus) file
    Hdf5,
    /// Gzip-compressed JSON document with the same tree
    JsonGz,
}

impl ContainerFormat {
    /// File extension without leading dot
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Hdf5 => "nxs",
            Self::JsonGz => "nxjson.gz",
        }
    }

    /// Whether this build can read and write the format
    #[must_use]
    pub const fn is_available(&self) -> bool {
        match self {
            Self::Hdf5 => cfg!(feature = "hdf5"),
            Self::JsonGz => true,
        }
    }

    /// Guess the format from a file name
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".nxjson.gz") {
            Some(Self::JsonGz)
        } else if [".nxs", ".nx5", ".h5", ".hdf5"]
            .iter()
            .any(|ext| name.ends_with(ext))
        {
            Some(Self::Hdf5)
        } else {
            None
        }
    }

    /// Backend implementing this format
    ///
    /// # Errors
    /// Returns [`NexusError::UnsupportedFormat`] if the format is not compiled in
    pub fn backend(&self) -> NexusResult<Box<dyn ContainerBackend>> {
        match self {
            Self::JsonGz => Ok(Box::new(crate::json::JsonBackend::new())),
            #[cfg(feature = "hdf5")]
            Self::Hdf5 => Ok(Box::new(crate::h5::Hdf5Backend::new())),
            #[cfg(not(feature = "hdf5"))]
            Self::Hdf5 => Err(NexusError::UnsupportedFormat(self.to_string())),
        }
    }
}

impl Default for ContainerFormat {
    /// Native HDF5 when compiled in, JSON otherwise
    fn default() -> Self {
        if cfg!(feature = "hdf5") {
            Self::Hdf5
        } else {
            Self::JsonGz
        }
    }
}

impl Display for ContainerFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hdf5 => f.write_str("hdf5"),
            Self::JsonGz => f.write_str("json_gz"),
        }
    }
}

impl FromStr for ContainerFormat {
    type Err = NexusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hdf5" | "h5" | "nxs" => Ok(Self::Hdf5),
            "json_gz" | "json" | "nxjson" => Ok(Self::JsonGz),
            other => Err(NexusError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Persistence of a NeXus tree
///
/// Implement this trait to add a new container format. Entries are the
/// top-level groups of the file and are replaced as a whole on write.
pub trait ContainerBackend: Send + Sync + fmt::Debug {
    /// Format this backend writes
    fn format(&self) -> ContainerFormat;

    /// Read the container
    ///
    /// # Errors
    /// Returns error if the file is missing or malformed
    fn read(&self, path: &Path, depth: ReadDepth) -> NexusResult<NxFile>;

    /// Read one top-level entry with all values
    ///
    /// Returns `Ok(None)` when the entry is not present.
    ///
    /// # Errors
    /// Returns error if the file is missing or malformed
    fn read_entry(&self, path: &Path, name: &str) -> NexusResult<Option<NxGroup>> {
        let mut file = self.read(path, ReadDepth::Full)?;
        Ok(file.entries.shift_remove(name))
    }

    /// Merge root attributes and upsert entries; creates the file if missing
    ///
    /// # Errors
    /// Returns error if the file cannot be written
    fn write_entries(
        &self,
        path: &Path,
        attrs: &Attributes,
        entries: &[(String, NxGroup)],
    ) -> NexusResult<()>;

    /// Delete the container file; a missing file is not an error
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be removed
    fn remove(&self, path: &Path) -> NexusResult<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(NexusError::io_error(path, e)),
        }
    }
}
