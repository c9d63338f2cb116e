//! Gzip-compressed JSON container
//!
//! Portable fallback when no HDF5 library is available. The whole tree is
//! one JSON document; writes go to a sibling temp file that is renamed over
//! the target so readers never observe a half-written cache.

use crate::backend::{ContainerBackend, ContainerFormat, ReadDepth};
use crate::error::{NexusError, NexusResult};
use crate::tree::{Attributes, NxFile, NxGroup};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// JSON + gzip backend
#[derive(Debug, Clone, Copy)]
pub struct JsonBackend {
    level: Compression,
}

impl JsonBackend {
    /// Backend with the default compression level
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            level: Compression::default(),
        }
    }

    /// Backend with an explicit gzip level (0-9)
    #[inline]
    #[must_use]
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }

    fn load(path: &Path) -> NexusResult<NxFile> {
        let file = File::open(path).map_err(|e| NexusError::io_error(path, e))?;
        let reader = BufReader::new(GzDecoder::new(file));
        serde_json::from_reader(reader).map_err(|source| NexusError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    fn store(&self, path: &Path, tree: &NxFile) -> NexusResult<()> {
        let tmp = temp_path(path);
        let file = File::create(&tmp).map_err(|e| NexusError::io_error(&tmp, e))?;
        let mut encoder = GzEncoder::new(BufWriter::new(file), self.level);
        serde_json::to_writer(&mut encoder, tree).map_err(|source| NexusError::Json {
            path: tmp.clone(),
            source,
        })?;
        let mut writer = encoder.finish().map_err(|e| NexusError::io_error(&tmp, e))?;
        writer.flush().map_err(|e| NexusError::io_error(&tmp, e))?;
        drop(writer);

        std::fs::rename(&tmp, path).map_err(|e| NexusError::io_error(path, e))
    }
}

impl Default for JsonBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

impl ContainerBackend for JsonBackend {
    fn format(&self) -> ContainerFormat {
        ContainerFormat::JsonGz
    }

    fn read(&self, path: &Path, depth: ReadDepth) -> NexusResult<NxFile> {
        let mut tree = Self::load(path)?;
        if depth == ReadDepth::Headers {
            tree.strip_values();
        }
        Ok(tree)
    }

    fn write_entries(
        &self,
        path: &Path,
        attrs: &Attributes,
        entries: &[(String, NxGroup)],
    ) -> NexusResult<()> {
        let mut tree = if path.exists() {
            Self::load(path)?
        } else {
            NxFile::new()
        };
        tree.merge(attrs, entries);
        tracing::debug!(
            "Writing {} entries to {} ({} total)",
            entries.len(),
            path.display(),
            tree.entries.len()
        );
        self.store(path, &tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{AttrValue, NxDataset};
    use pretty_assertions::assert_eq;

    fn entry(number: i64, values: Vec<f64>) -> (String, NxGroup) {
        let mut data = NxGroup::new("NXdata");
        data.insert_dataset("delay", NxDataset::vector(values));
        let mut group = NxGroup::new("NXentry").with_attr("number", number);
        group.insert_group("data", data);
        (format!("entry{number}"), group)
    }

    #[test]
    fn write_then_read_full() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.nxjson.gz");
        let backend = JsonBackend::new();

        let mut attrs = Attributes::new();
        attrs.insert("creator".to_string(), AttrValue::from("evaldata"));
        backend
            .write_entries(&path, &attrs, &[entry(1, vec![1.0, 2.0])])
            .unwrap();

        let tree = backend.read(&path, ReadDepth::Full).unwrap();
        assert_eq!(tree.attrs.get("creator"), Some(&AttrValue::from("evaldata")));
        let ds = tree.entry("entry1").unwrap().group("data").unwrap().dataset("delay").unwrap();
        assert_eq!(ds.values, vec![1.0, 2.0]);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn headers_read_strips_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.nxjson.gz");
        let backend = JsonBackend::with_level(1);
        backend
            .write_entries(&path, &Attributes::new(), &[entry(1, vec![1.0, 2.0, 3.0])])
            .unwrap();

        let tree = backend.read(&path, ReadDepth::Headers).unwrap();
        let ds = tree.entry("entry1").unwrap().group("data").unwrap().dataset("delay").unwrap();
        assert!(ds.values.is_empty());
        assert_eq!(ds.shape, vec![3]);
    }

    #[test]
    fn upsert_keeps_other_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.nxjson.gz");
        let backend = JsonBackend::new();
        backend
            .write_entries(&path, &Attributes::new(), &[entry(1, vec![1.0]), entry(2, vec![2.0])])
            .unwrap();
        backend
            .write_entries(&path, &Attributes::new(), &[entry(2, vec![5.0, 6.0])])
            .unwrap();

        let tree = backend.read(&path, ReadDepth::Full).unwrap();
        assert_eq!(tree.entries.keys().collect::<Vec<_>>(), vec!["entry1", "entry2"]);
        let e2 = backend.read_entry(&path, "entry2").unwrap().unwrap();
        assert_eq!(e2.group("data").unwrap().dataset("delay").unwrap().values, vec![5.0, 6.0]);
        assert!(backend.read_entry(&path, "entry9").unwrap().is_none());
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = JsonBackend::new().read(&dir.path().join("none.nxjson.gz"), ReadDepth::Full);
        assert!(matches!(result, Err(NexusError::Io { .. })));
    }

    #[test]
    fn garbage_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.nxjson.gz");
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::fast());
        enc.write_all(b"not json").unwrap();
        enc.finish().unwrap();

        let result = JsonBackend::new().read(&path, ReadDepth::Full);
        assert!(matches!(result, Err(NexusError::Json { .. })));
    }

    #[test]
    fn remove_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        JsonBackend::new().remove(&dir.path().join("none")).unwrap();
    }
}
