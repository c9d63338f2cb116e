//! SPEC file reader

use crate::config::SourceConfig;
use crate::error::ParseError;
use crate::readers::data::read_block;
use crate::readers::header::{HeaderParser, SPEC};
use crate::readers::{DataBlock, RawReader, ReaderFactory, ReaderKind};
use evaldata_scan::{Fingerprint, ScanMeta};
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Reader for a single SPEC text file
///
/// Parsing is incremental: each call continues at the header of the last
/// scan found before, so a growing file only costs the appended bytes plus
/// the re-read of its last scan.
#[derive(Debug)]
pub struct SpecReader {
    path: PathBuf,
    parser: HeaderParser,
    offset: u64,
}

impl SpecReader {
    /// Create reader for a file
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            parser: HeaderParser::new(&SPEC),
            offset: 0,
        }
    }

    /// Offset the next parse starts at
    #[inline]
    #[must_use]
    pub fn resume_offset(&self) -> u64 {
        self.offset
    }
}

impl RawReader for SpecReader {
    fn kind(&self) -> ReaderKind {
        ReaderKind::Spec
    }

    fn raw_path(&self) -> &Path {
        &self.path
    }

    fn fingerprint(&self) -> Result<Fingerprint, ParseError> {
        Fingerprint::of_file_metadata(&self.path).map_err(|e| ParseError::from_hash(&self.path, e))
    }

    fn parse(&mut self) -> Result<Vec<ScanMeta>, ParseError> {
        let mut file = File::open(&self.path).map_err(|e| ParseError::io_error(&self.path, e))?;
        let len = file
            .metadata()
            .map_err(|e| ParseError::io_error(&self.path, e))?
            .len();
        if len < self.offset {
            tracing::info!(
                "{} shrank below the last parse position, parsing from the start",
                self.path.display()
            );
            self.reset();
        }

        file.seek(SeekFrom::Start(self.offset))
            .map_err(|e| ParseError::io_error(&self.path, e))?;
        let outcome = self
            .parser
            .parse(&self.path, BufReader::new(file), self.offset)?;

        tracing::debug!(
            "Parsed {} scans from {} starting at byte {}",
            outcome.scans.len(),
            self.path.display(),
            self.offset
        );
        self.offset = outcome.resume_offset;
        Ok(outcome.scans)
    }

    fn read_data(&self, meta: &ScanMeta) -> Result<DataBlock, ParseError> {
        read_block(&SPEC, meta)
    }

    fn reset(&mut self) {
        self.offset = 0;
        self.parser.reset();
    }
}

/// Factory for [`SpecReader`]; fallback for any path that is not a folder
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecReaderFactory;

impl ReaderFactory for SpecReaderFactory {
    fn kind(&self) -> ReaderKind {
        ReaderKind::Spec
    }

    fn can_read(&self, path: &Path) -> bool {
        !path.is_dir()
    }

    fn create(&self, config: &SourceConfig) -> Result<Box<dyn RawReader>, ParseError> {
        Ok(Box::new(SpecReader::new(config.raw_path())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evaldata_scan::ScanStatus;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const TWO_SCANS: &str = "\
#F growing.spec
#O0 Theta

#S 1 ascan th 0 1 1 1
#P0 1.5
#L th  det
0 10
1 11

#S 2 ascan th 0 1 1 1
#P0 2.5
#L th  det
0 20
";

    #[test]
    fn incremental_parse_reports_new_and_last() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("growing.spec");
        std::fs::write(&path, TWO_SCANS).unwrap();

        let mut reader = SpecReader::new(&path);
        let first: Vec<_> = reader.parse().unwrap().iter().map(|m| m.number).collect();
        assert_eq!(first, vec![1, 2]);
        assert_eq!(reader.resume_offset(), TWO_SCANS.find("#S 2").unwrap() as u64);

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"1 21\n\n#S 3 ascan th 0 1 1 1\n#P0 3.5\n#L th  det\n0 30\n")
            .unwrap();
        drop(file);

        let second = reader.parse().unwrap();
        let numbers: Vec<_> = second.iter().map(|m| m.number).collect();
        assert_eq!(numbers, vec![2, 3]);
        assert_eq!(second[1].motor("Theta"), Some(3.5));

        let data = reader.read_data(&second[0]).unwrap().data.unwrap();
        assert_eq!(data.column("det").unwrap(), &[20.0, 21.0]);
    }

    #[test]
    fn truncated_file_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.spec");
        std::fs::write(&path, TWO_SCANS).unwrap();

        let mut reader = SpecReader::new(&path);
        reader.parse().unwrap();
        std::fs::write(&path, "#S 7 new\n#L a\n1\n").unwrap();

        let scans = reader.parse().unwrap();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].number, 7);
        assert_eq!(scans[0].status, ScanStatus::Ok);
    }

    #[test]
    fn missing_file_errors() {
        let mut reader = SpecReader::new("/nonexistent/scans.spec");
        assert!(matches!(reader.parse(), Err(ParseError::Io { .. })));
        assert!(matches!(reader.fingerprint(), Err(ParseError::Io { .. })));
    }

    #[test]
    fn fingerprint_changes_on_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.spec");
        std::fs::write(&path, TWO_SCANS).unwrap();
        let reader = SpecReader::new(&path);
        let before = reader.fingerprint().unwrap();
        assert_eq!(before, reader.fingerprint().unwrap());

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"1 21\n").unwrap();
        drop(file);
        assert_ne!(before, reader.fingerprint().unwrap());
    }
}
