//! Cache file handle
//!
//! [`NexusStore`] binds a container path to the backend for its format and
//! is the only type callers outside this crate need.

use crate::backend::{ContainerBackend, ContainerFormat, ReadDepth};
use crate::error::NexusResult;
use crate::tree::{Attributes, NxFile, NxGroup};
use std::path::{Path, PathBuf};

/// A NeXus cache file on disk
#[derive(Debug)]
pub struct NexusStore {
    path: PathBuf,
    backend: Box<dyn ContainerBackend>,
}

impl NexusStore {
    /// Bind a path to a container format
    ///
    /// The file is not touched until the first read or write.
    ///
    /// # Errors
    /// Returns error if the format is not compiled in
    pub fn open(path: impl Into<PathBuf>, format: ContainerFormat) -> NexusResult<Self> {
        Ok(Self {
            path: path.into(),
            backend: format.backend()?,
        })
    }

    /// Container path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Format of the bound backend
    #[must_use]
    pub fn format(&self) -> ContainerFormat {
        self.backend.format()
    }

    /// Whether the container file exists
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Root attributes and entry headers, without dataset values
    ///
    /// A missing file reads as an empty tree.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read
    pub fn read_index(&self) -> NexusResult<NxFile> {
        if !self.exists() {
            return Ok(NxFile::new());
        }
        self.backend.read(&self.path, ReadDepth::Headers)
    }

    /// Whole container with all dataset values
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read
    pub fn read_full(&self) -> NexusResult<NxFile> {
        if !self.exists() {
            return Ok(NxFile::new());
        }
        self.backend.read(&self.path, ReadDepth::Full)
    }

    /// One entry with all dataset values
    ///
    /// # Errors
    /// Returns error if the file cannot be read
    pub fn read_entry(&self, name: &str) -> NexusResult<Option<NxGroup>> {
        if !self.exists() {
            return Ok(None);
        }
        self.backend.read_entry(&self.path, name)
    }

    /// Upsert entries and merge root attributes
    ///
    /// # Errors
    /// Returns error if the file cannot be written
    pub fn write_entries(&self, attrs: &Attributes, entries: &[(String, NxGroup)]) -> NexusResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| crate::error::NexusError::io_error(parent, e))?;
        }
        self.backend.write_entries(&self.path, attrs, entries)
    }

    /// Delete the container so the next write starts from scratch
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be removed
    pub fn reset(&self) -> NexusResult<()> {
        tracing::info!("Resetting cache {}", self.path.display());
        self.backend.remove(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{AttrValue, NxDataset};
    use pretty_assertions::assert_eq;

    fn store(dir: &tempfile::TempDir) -> NexusStore {
        NexusStore::open(dir.path().join("sub/run.evaldata.nxjson.gz"), ContainerFormat::JsonGz)
            .unwrap()
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert!(!store.exists());
        assert_eq!(store.read_index().unwrap(), NxFile::new());
        assert!(store.read_entry("entry1").unwrap().is_none());
    }

    #[test]
    fn write_creates_parent_and_index_has_no_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let mut data = NxGroup::new("NXdata");
        data.insert_dataset("Detector", NxDataset::vector(vec![3.0, 4.0]));
        let mut entry = NxGroup::new("NXentry").with_attr("number", 7i64);
        entry.insert_group("data", data);

        let mut attrs = Attributes::new();
        attrs.insert("raw_fingerprint".to_string(), AttrValue::from("abc"));
        store
            .write_entries(&attrs, &[("entry7".to_string(), entry)])
            .unwrap();
        assert!(store.exists());
        assert_eq!(store.format(), ContainerFormat::JsonGz);

        let index = store.read_index().unwrap();
        assert_eq!(index.attrs.get("raw_fingerprint"), Some(&AttrValue::from("abc")));
        let ds = index.entry("entry7").unwrap().group("data").unwrap().dataset("Detector").unwrap();
        assert!(ds.values.is_empty());

        let all = store.read_full().unwrap();
        assert_eq!(all.entry("entry7").unwrap().group("data").unwrap().dataset("Detector").unwrap().values.len(), 2);

        let full = store.read_entry("entry7").unwrap().unwrap();
        assert_eq!(full.group("data").unwrap().dataset("Detector").unwrap().values, vec![3.0, 4.0]);
    }

    #[test]
    fn reset_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store
            .write_entries(&Attributes::new(), &[("entry1".to_string(), NxGroup::new("NXentry"))])
            .unwrap();
        store.reset().unwrap();
        assert!(!store.exists());
        store.reset().unwrap();
    }
}
