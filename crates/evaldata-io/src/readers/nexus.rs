//! Existing cache containers as raw input

use crate::config::SourceConfig;
use crate::error::ParseError;
use crate::mapping::{data_from_group, entry_name, meta_from_group};
use crate::readers::{DataBlock, RawReader, ReaderFactory, ReaderKind};
use evaldata_nexus::{ContainerFormat, NexusStore};
use evaldata_scan::{Fingerprint, ScanMeta, ScanStatus};
use std::path::{Path, PathBuf};

/// Reader for a container written in the evaldata layout
///
/// The container already is a consolidated file, so sources built on it run
/// without a companion cache.
#[derive(Debug)]
pub struct NexusReader {
    path: PathBuf,
    store: NexusStore,
}

impl NexusReader {
    /// Open a container; the format follows the file extension
    ///
    /// # Errors
    /// Returns error if the format is not compiled in
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, ParseError> {
        let path = path.into();
        let format = ContainerFormat::from_path(&path).unwrap_or_default();
        let store = NexusStore::open(&path, format)?;
        Ok(Self { path, store })
    }
}

impl RawReader for NexusReader {
    fn kind(&self) -> ReaderKind {
        ReaderKind::Nexus
    }

    fn raw_path(&self) -> &Path {
        &self.path
    }

    fn fingerprint(&self) -> Result<Fingerprint, ParseError> {
        Fingerprint::of_file_metadata(&self.path).map_err(|e| ParseError::from_hash(&self.path, e))
    }

    /// All entries, every call
    fn parse(&mut self) -> Result<Vec<ScanMeta>, ParseError> {
        if !self.store.exists() {
            return Err(ParseError::io_error(
                &self.path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "container not found"),
            ));
        }
        let index = self.store.read_index()?;
        let scans = index
            .entries
            .values()
            .map(|group| meta_from_group(&self.path, group))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!("Read {} entries from {}", scans.len(), self.path.display());
        Ok(scans)
    }

    fn read_data(&self, meta: &ScanMeta) -> Result<DataBlock, ParseError> {
        let Some(group) = self.store.read_entry(&entry_name(meta.number))? else {
            return Ok(DataBlock::empty(ScanStatus::NoData));
        };
        let stored = meta_from_group(&self.path, &group)?;
        let data = data_from_group(&self.path, &group, &stored)?;
        let status = if data.is_some() { stored.status } else { ScanStatus::NoData };
        Ok(DataBlock { status, data })
    }

    fn reset(&mut self) {}

    fn supports_cache(&self) -> bool {
        false
    }
}

/// Factory for [`NexusReader`]; matches container file extensions
#[derive(Debug, Clone, Copy, Default)]
pub struct NexusReaderFactory;

impl ReaderFactory for NexusReaderFactory {
    fn kind(&self) -> ReaderKind {
        ReaderKind::Nexus
    }

    fn can_read(&self, path: &Path) -> bool {
        ContainerFormat::from_path(path).is_some()
    }

    fn priority(&self) -> i32 {
        20
    }

    fn create(&self, config: &SourceConfig) -> Result<Box<dyn RawReader>, ParseError> {
        Ok(Box::new(NexusReader::new(config.raw_path())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{file_attrs, scan_to_group};
    use evaldata_scan::ScanData;
    use pretty_assertions::assert_eq;

    #[test]
    fn reads_entries_and_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.evaldata.nxjson.gz");

        let mut with_data = ScanMeta::new(1, "ascan");
        with_data.column_names = vec!["x".into(), "y".into()];
        let data = ScanData::from_records(with_data.column_names.clone(), vec![vec![1.0, 2.0]]).unwrap();
        let mut empty = ScanMeta::new(2, "timescan");
        empty.status = ScanStatus::NoData;

        let store = NexusStore::open(&path, ContainerFormat::JsonGz).unwrap();
        store
            .write_entries(
                &file_attrs(Path::new("scans.spec"), Fingerprint::compute(b"raw")),
                &[
                    (entry_name(1), scan_to_group(&with_data, Some(&data))),
                    (entry_name(2), scan_to_group(&empty, None)),
                ],
            )
            .unwrap();

        let mut reader = NexusReader::new(&path).unwrap();
        assert!(!reader.supports_cache());
        let metas = reader.parse().unwrap();
        assert_eq!(metas.iter().map(|m| m.number).collect::<Vec<_>>(), vec![1, 2]);

        let block = reader.read_data(&metas[0]).unwrap();
        assert_eq!(block.status, ScanStatus::Ok);
        assert_eq!(block.data, Some(data));
        assert_eq!(reader.read_data(&metas[1]).unwrap(), DataBlock::empty(ScanStatus::NoData));
    }

    #[test]
    fn missing_container_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut reader = NexusReader::new(dir.path().join("gone.nxjson.gz")).unwrap();
        assert!(matches!(reader.parse(), Err(ParseError::Io { .. })));
    }
}
