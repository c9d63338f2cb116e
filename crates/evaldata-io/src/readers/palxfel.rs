//! PAL-XFEL folder reader
//!
//! Every scan lives in its own meta log file inside one folder, named by a
//! pattern such as `{:07}_meta.log`. Files are visited either by an explicit
//! scan list or sequentially from the start number until the first missing
//! file.

use crate::config::{PalXfelOptions, SourceConfig};
use crate::error::ParseError;
use crate::readers::data::read_block;
use crate::readers::header::{HeaderParser, PAL_XFEL};
use crate::readers::{DataBlock, RawReader, ReaderFactory, ReaderKind};
use evaldata_scan::{Fingerprint, ScanMeta, ScanNumber};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// File name pattern with one scan number placeholder
///
/// Supported placeholders: `{}`, `{:N}` (space padded), `{:0N}` (zero
/// padded) and the positional forms `{0:07d}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePattern {
    prefix: String,
    suffix: String,
    width: usize,
    zero_pad: bool,
}

impl FilePattern {
    /// Parse a pattern
    ///
    /// # Errors
    /// Returns [`ParseError::InvalidPattern`] unless the pattern holds
    /// exactly one well-formed placeholder
    pub fn parse(pattern: &str) -> Result<Self, ParseError> {
        let invalid = || ParseError::InvalidPattern(pattern.to_string());
        let open = pattern.find('{').ok_or_else(invalid)?;
        let close = open + pattern[open..].find('}').ok_or_else(invalid)?;
        let (prefix, suffix) = (&pattern[..open], &pattern[close + 1..]);
        if suffix.contains(['{', '}']) || prefix.contains('}') {
            return Err(invalid());
        }

        let inner = &pattern[open + 1..close];
        let spec = match inner.split_once(':') {
            Some(("" | "0", spec)) => spec,
            Some(_) => return Err(invalid()),
            None if inner.is_empty() || inner == "0" => "",
            None => return Err(invalid()),
        };
        let spec = spec.strip_suffix('d').unwrap_or(spec);
        let zero_pad = spec.starts_with('0') && spec.len() > 1;
        let digits = if zero_pad { &spec[1..] } else { spec };
        let width = if digits.is_empty() {
            0
        } else {
            digits.parse().map_err(|_| invalid())?
        };

        Ok(Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            width,
            zero_pad,
        })
    }

    /// File name of a scan
    #[must_use]
    pub fn file_name(&self, number: ScanNumber) -> String {
        let width = self.width;
        if self.zero_pad {
            format!("{}{number:0width$}{}", self.prefix, self.suffix)
        } else {
            format!("{}{number:width$}{}", self.prefix, self.suffix)
        }
    }
}

/// Reader for a folder of per-scan meta log files
#[derive(Debug)]
pub struct PalXfelReader {
    folder: PathBuf,
    pattern: FilePattern,
    scan_list: Vec<ScanNumber>,
    start: ScanNumber,
    stop: Option<ScanNumber>,
    parser: HeaderParser,
    /// Last scan file found; the next parse starts there
    current: Option<ScanNumber>,
}

impl PalXfelReader {
    /// Create reader for a folder
    ///
    /// # Errors
    /// Returns [`ParseError::InvalidPattern`] for a malformed file pattern
    pub fn new(
        folder: impl Into<PathBuf>,
        options: &PalXfelOptions,
        start: ScanNumber,
        stop: Option<ScanNumber>,
    ) -> Result<Self, ParseError> {
        Ok(Self {
            folder: folder.into(),
            pattern: FilePattern::parse(&options.file_pattern)?,
            scan_list: options.scan_list.clone(),
            start,
            stop,
            parser: HeaderParser::new(&PAL_XFEL),
            current: None,
        })
    }

    /// Path of the file for a scan number
    #[must_use]
    pub fn scan_file(&self, number: ScanNumber) -> PathBuf {
        self.folder.join(self.pattern.file_name(number))
    }

    /// Existing scan files from `from` on, stopping at the first gap
    fn existing_from(&self, from: Option<ScanNumber>) -> Vec<(ScanNumber, PathBuf)> {
        let in_range = |n: ScanNumber| self.stop.map_or(true, |stop| n <= stop);
        let mut found = Vec::new();

        if self.scan_list.is_empty() {
            let mut number = from.unwrap_or(self.start);
            while in_range(number) {
                let path = self.scan_file(number);
                if !path.is_file() {
                    break;
                }
                found.push((number, path));
                match number.checked_add(1) {
                    Some(next) => number = next,
                    None => break,
                }
            }
        } else {
            let from = from.unwrap_or(0);
            for &number in self.scan_list.iter().filter(|&&n| n >= from && n >= self.start) {
                if !in_range(number) {
                    break;
                }
                let path = self.scan_file(number);
                if !path.is_file() {
                    break;
                }
                found.push((number, path));
            }
        }
        found
    }

    fn parse_file(&mut self, path: &Path) -> Result<Vec<ScanMeta>, ParseError> {
        let file = File::open(path).map_err(|e| ParseError::io_error(path, e))?;
        Ok(self.parser.parse(path, BufReader::new(file), 0)?.scans)
    }
}

impl RawReader for PalXfelReader {
    fn kind(&self) -> ReaderKind {
        ReaderKind::PalXfel
    }

    fn raw_path(&self) -> &Path {
        &self.folder
    }

    fn fingerprint(&self) -> Result<Fingerprint, ParseError> {
        if !self.folder.is_dir() {
            return Err(ParseError::io_error(
                &self.folder,
                std::io::Error::new(std::io::ErrorKind::NotFound, "scan folder not found"),
            ));
        }
        let parts = self
            .existing_from(None)
            .into_iter()
            .map(|(_, path)| Fingerprint::of_file_metadata(&path).map_err(|e| ParseError::from_hash(&path, e)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Fingerprint::combine(parts))
    }

    fn parse(&mut self) -> Result<Vec<ScanMeta>, ParseError> {
        let files = self.existing_from(self.current);
        let mut scans = Vec::new();
        for (number, path) in files {
            tracing::trace!("Parsing scan file {}", path.display());
            scans.extend(self.parse_file(&path)?);
            self.current = Some(number);
        }
        tracing::debug!(
            "Parsed {} scans from {} ({} dialect)",
            scans.len(),
            self.folder.display(),
            PAL_XFEL.name
        );
        Ok(scans)
    }

    fn read_data(&self, meta: &ScanMeta) -> Result<DataBlock, ParseError> {
        read_block(&PAL_XFEL, meta)
    }

    fn reset(&mut self) {
        self.current = None;
        self.parser.reset();
    }
}

/// Factory for [`PalXfelReader`]; matches folders
#[derive(Debug, Clone, Copy, Default)]
pub struct PalXfelReaderFactory;

impl ReaderFactory for PalXfelReaderFactory {
    fn kind(&self) -> ReaderKind {
        ReaderKind::PalXfel
    }

    fn can_read(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn priority(&self) -> i32 {
        10
    }

    fn create(&self, config: &SourceConfig) -> Result<Box<dyn RawReader>, ParseError> {
        Ok(Box::new(PalXfelReader::new(
            config.raw_path(),
            &config.pal_xfel,
            config.start_scan_number,
            config.stop_scan_number,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn meta_log(number: ScanNumber, values: &[(f64, f64)]) -> String {
        let mut text = format!(
            "#RUN {number}\n#CMD delay scan\n#TIM 2020-02-0{} 10:00:00\n#MOT delay\n#VAL 0\n#COL delay  Intensity\n",
            number % 9 + 1
        );
        for (x, y) in values {
            text.push_str(&format!("{x} {y}\n"));
        }
        text
    }

    fn options() -> PalXfelOptions {
        PalXfelOptions::default()
    }

    #[test]
    fn pattern_forms() {
        assert_eq!(FilePattern::parse("{:07}_meta.log").unwrap().file_name(42), "0000042_meta.log");
        assert_eq!(FilePattern::parse("{0:07d}_meta.log").unwrap().file_name(42), "0000042_meta.log");
        assert_eq!(FilePattern::parse("run{}.log").unwrap().file_name(7), "run7.log");
        assert_eq!(FilePattern::parse("{:4}.log").unwrap().file_name(7), "   7.log");
        for bad in ["meta.log", "{x}.log", "{:07}{}.log", "{:ab}.log", "{1:07}.log"] {
            assert!(FilePattern::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn sequential_walk_stops_at_gap() {
        let dir = tempfile::tempdir().unwrap();
        for n in [1, 2, 4] {
            std::fs::write(
                dir.path().join(format!("{n:07}_meta.log")),
                meta_log(n, &[(0.0, 1.0), (1.0, 2.0)]),
            )
            .unwrap();
        }
        let mut reader = PalXfelReader::new(dir.path(), &options(), 1, None).unwrap();
        let numbers: Vec<_> = reader.parse().unwrap().iter().map(|m| m.number).collect();
        assert_eq!(numbers, vec![1, 2]);

        std::fs::write(dir.path().join("0000003_meta.log"), meta_log(3, &[(0.0, 3.0)])).unwrap();
        let numbers: Vec<_> = reader.parse().unwrap().iter().map(|m| m.number).collect();
        assert_eq!(numbers, vec![2, 3, 4]);
    }

    #[test]
    fn scan_list_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        for n in [3, 5, 8] {
            std::fs::write(dir.path().join(format!("{n:07}_meta.log")), meta_log(n, &[(0.0, 1.0)])).unwrap();
        }
        let options = PalXfelOptions {
            scan_list: vec![3, 5, 8],
            ..PalXfelOptions::default()
        };
        let mut reader = PalXfelReader::new(dir.path(), &options, 0, Some(6)).unwrap();
        let numbers: Vec<_> = reader.parse().unwrap().iter().map(|m| m.number).collect();
        assert_eq!(numbers, vec![3, 5]);
    }

    #[test]
    fn data_is_read_from_scan_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("0000001_meta.log"),
            meta_log(1, &[(-1.0, 5.0), (0.0, 6.0), (1.0, 7.0)]),
        )
        .unwrap();
        let mut reader = PalXfelReader::new(dir.path(), &options(), 1, None).unwrap();
        let metas = reader.parse().unwrap();
        assert_eq!(metas[0].command, "delay scan");
        assert_eq!(metas[0].motor("delay"), Some(0.0));

        let data = reader.read_data(&metas[0]).unwrap().data.unwrap();
        assert_eq!(data.column("Intensity").unwrap(), &[5.0, 6.0, 7.0]);
    }

    #[test]
    fn fingerprint_tracks_new_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("0000001_meta.log"), meta_log(1, &[(0.0, 1.0)])).unwrap();
        let reader = PalXfelReader::new(dir.path(), &options(), 1, None).unwrap();
        let before = reader.fingerprint().unwrap();
        std::fs::write(dir.path().join("0000002_meta.log"), meta_log(2, &[(0.0, 1.0)])).unwrap();
        assert_ne!(before, reader.fingerprint().unwrap());
    }

    #[test]
    fn missing_folder_errors() {
        let reader = PalXfelReader::new("/nonexistent/folder", &options(), 1, None).unwrap();
        assert!(matches!(reader.fingerprint(), Err(ParseError::Io { .. })));
    }
}
