//! Data block reading
//!
//! Shared by the SPEC and PAL-XFEL readers. A data block starts at the data
//! offset recorded for the scan and runs until the next header line that is
//! not a comment. Abort and resume notices inside the block switch the scan
//! status between `ABORTED` and `OK`.

use crate::error::ParseError;
use crate::readers::header::{Dialect, Line};
use crate::readers::DataBlock;
use evaldata_scan::{McaSpectra, ScanData, ScanError, ScanMeta, ScanStatus};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};

static NUM_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([+-]?\d*\.*\d*[eE]*[+-]*\d+|[+-]?[Ii][Nn][Ff]|[Nn][Aa][Nn])")
        .expect("static regex is valid")
});
static INT_VALUE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[+-]?\d+").expect("static regex is valid"));

/// All numbers in a line, in order
///
/// Tokens that look numeric but do not parse (`1..2`) become NaN so the
/// record keeps its width.
#[must_use]
pub fn parse_numbers(line: &str) -> Vec<f64> {
    NUM_VALUE
        .find_iter(line)
        .map(|m| m.as_str().parse().unwrap_or(f64::NAN))
        .collect()
}

/// First number in a line
pub(crate) fn first_number(line: &str) -> Option<f64> {
    NUM_VALUE.find(line).and_then(|m| m.as_str().parse().ok())
}

fn parse_counts(line: &str) -> impl Iterator<Item = u32> + '_ {
    INT_VALUE
        .find_iter(line)
        .map(|m| m.as_str().parse::<i64>().map_or(0, |v| u32::try_from(v.max(0)).unwrap_or(u32::MAX)))
}

/// Read the data block of a scan from its raw file
pub(crate) fn read_block(dialect: &Dialect, meta: &ScanMeta) -> Result<DataBlock, ParseError> {
    let (Some(location), true) = (meta.location.as_ref(), meta.status.may_have_data()) else {
        tracing::debug!("{} has no data block", meta.name());
        return Ok(DataBlock::empty(ScanStatus::NoData));
    };
    let Some(data_offset) = location.data_offset else {
        return Ok(DataBlock::empty(ScanStatus::NoData));
    };

    let path = &location.file;
    let mut file = File::open(path).map_err(|e| ParseError::io_error(path, e))?;
    file.seek(SeekFrom::Start(data_offset))
        .map_err(|e| ParseError::io_error(path, e))?;
    let mut reader = BufReader::new(file);

    let width = meta.column_names.len();
    let mca = meta.mca;
    let mut status = ScanStatus::Ok;
    let mut aborted = false;
    let mut records: Vec<Vec<f64>> = Vec::new();
    let mut counts: Vec<u32> = Vec::new();
    let mut current: Option<Vec<f64>> = None;
    let mut spectrum: Vec<u32> = Vec::new();
    let mut mca_lines = 0usize;
    let mut width_mismatch = false;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| ParseError::io_error(path, e))?;
        if read == 0 {
            break;
        }
        let terminated = buf.ends_with(b"\n");
        let text = String::from_utf8_lossy(&buf);
        let line = text.trim();

        match dialect.classify(line) {
            Line::Blank => continue,
            Line::Aborted => {
                if !aborted {
                    tracing::debug!("{} aborted", meta.name());
                    aborted = true;
                    status = ScanStatus::Aborted;
                }
                continue;
            }
            Line::Resumed => {
                if aborted {
                    tracing::debug!("{} resumed", meta.name());
                    aborted = false;
                    status = ScanStatus::Ok;
                }
                continue;
            }
            Line::Error => {
                tracing::warn!("{}: {}", meta.name(), line);
                continue;
            }
            Line::Header(..) | Line::OtherHeader if dialect.is_comment(line) => continue,
            Line::Header(..) | Line::OtherHeader => break,
            Line::Data | Line::Other if aborted => break,
            Line::Data | Line::Other => {}
        }

        match (mca, current.take()) {
            (Some(params), Some(scalars)) => {
                spectrum.extend(parse_counts(line));
                mca_lines += 1;
                if mca_lines >= params.lines_per_record() {
                    if spectrum.len() == params.channels && scalars.len() == width {
                        records.push(scalars);
                        counts.append(&mut spectrum);
                    } else {
                        width_mismatch = true;
                    }
                    spectrum.clear();
                    mca_lines = 0;
                } else {
                    current = Some(scalars);
                }
            }
            (Some(_), None) => current = Some(parse_numbers(line)),
            (None, _) => {
                let values = parse_numbers(line);
                if values.len() == width {
                    records.push(values);
                } else if terminated {
                    width_mismatch = true;
                } else {
                    tracing::debug!("{}: skipping partial last record", meta.name());
                }
            }
        }
        if width_mismatch {
            break;
        }
    }

    if width_mismatch || records.is_empty() {
        tracing::info!(
            "{}: {} records, column layout does not match {} names",
            meta.name(),
            records.len(),
            width
        );
        return Ok(DataBlock::empty(ScanStatus::NoData));
    }

    let points = records.len();
    let spectra = mca.map(|params| McaSpectra {
        channels: params.channels,
        counts,
    });
    match build_data(meta, records, spectra) {
        Ok(data) => {
            tracing::debug!("{}: read {} points", meta.name(), points);
            Ok(DataBlock {
                status,
                data: Some(data),
            })
        }
        Err(e) => {
            tracing::warn!("{} in {}: {}", meta.name(), path.display(), e);
            Ok(DataBlock::empty(ScanStatus::NoData))
        }
    }
}

fn build_data(meta: &ScanMeta, records: Vec<Vec<f64>>, mca: Option<McaSpectra>) -> Result<ScanData, ScanError> {
    let mut data = ScanData::from_records(meta.column_names.clone(), records)?;
    if let Some(spectra) = mca {
        data.set_mca(meta.number, spectra)?;
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readers::header::{HeaderParser, SPEC};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::path::Path;

    fn parse_file(path: &Path) -> Vec<ScanMeta> {
        let file = BufReader::new(File::open(path).unwrap());
        HeaderParser::new(&SPEC).parse(path, file, 0).unwrap().scans
    }

    fn write(dir: &tempfile::TempDir, text: &str) -> std::path::PathBuf {
        let path = dir.path().join("scan.spec");
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn numbers_with_specials() {
        assert_eq!(parse_numbers("1 -2.5 3e-2 +4"), vec![1.0, -2.5, 0.03, 4.0]);
        let specials = parse_numbers("nan inf -INF");
        assert!(specials[0].is_nan());
        assert_eq!(specials[1], f64::INFINITY);
        assert_eq!(specials[2], f64::NEG_INFINITY);
        assert_eq!(first_number("1  (Seconds)"), Some(1.0));
        assert_eq!(first_number("no numbers"), None);
    }

    proptest! {
        #[test]
        fn formatted_floats_parse_back(values in prop::collection::vec(-1.0e6f64..1.0e6, 1..12)) {
            let line = values.iter().map(|v| format!("{v}")).collect::<Vec<_>>().join(" ");
            prop_assert_eq!(parse_numbers(&line), values);
        }

        #[test]
        fn scientific_notation_parses_back(value in -1.0e12f64..1.0e12) {
            let line = format!("{value:e}");
            prop_assert_eq!(parse_numbers(&line), vec![value]);
        }
    }

    #[test]
    fn reads_plain_block_until_next_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "#S 1 x\n#L a  b\n1 2\n#C comment in block\n3 4\n\n#S 2 y\n#L a  b\n5 6\n",
        );
        let metas = parse_file(&path);
        let block = read_block(&SPEC, &metas[0]).unwrap();
        assert_eq!(block.status, ScanStatus::Ok);
        let data = block.data.unwrap();
        assert_eq!(data.column("a").unwrap(), &[1.0, 3.0]);
        assert_eq!(data.column("b").unwrap(), &[2.0, 4.0]);
    }

    #[test]
    fn abort_then_resume() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "#S 1 x\n#L a\n1\n#C Thu Jun 06 14:40:00 2019.  Scan aborted after 1 points.\n#C Thu Jun 06 14:41:00 2019.  Scan resumed.\n2\n",
        );
        let metas = parse_file(&path);
        let block = read_block(&SPEC, &metas[0]).unwrap();
        assert_eq!(block.status, ScanStatus::Ok);
        assert_eq!(block.data.unwrap().len(), 2);
    }

    #[test]
    fn abort_without_resume_ends_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "#S 1 x\n#L a\n1\n2\n#C Thu Jun 06 14:40:00 2019.  Scan aborted after 2 points.\n3\n",
        );
        let metas = parse_file(&path);
        let block = read_block(&SPEC, &metas[0]).unwrap();
        assert_eq!(block.status, ScanStatus::Aborted);
        assert_eq!(block.data.unwrap().column("a").unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn width_mismatch_is_nodata() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "#S 1 x\n#L a  b  c\n1 2 3\n4 5\n");
        let metas = parse_file(&path);
        let block = read_block(&SPEC, &metas[0]).unwrap();
        assert_eq!(block, DataBlock::empty(ScanStatus::NoData));
    }

    #[test]
    fn duplicate_column_is_nodata() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "#S 1 x\n#L Mon  Mon\n1 2\n3 4\n");
        let metas = parse_file(&path);
        assert_eq!(read_block(&SPEC, &metas[0]).unwrap(), DataBlock::empty(ScanStatus::NoData));
    }

    #[test]
    fn partial_last_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "#S 1 x\n#L a  b\n1 2\n3");
        let metas = parse_file(&path);
        let data = read_block(&SPEC, &metas[0]).unwrap().data.unwrap();
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn mca_records_span_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "#S 1 x\n#@MCA 4C\n#@CHANN 6 0 5 1\n#L a  b\n1 10\n@A 1 2 3 4\n5 6\n2 20\n@A 7 8 9 10\n11 12\n",
        );
        let metas = parse_file(&path);
        let data = read_block(&SPEC, &metas[0]).unwrap().data.unwrap();
        assert_eq!(data.column("b").unwrap(), &[10.0, 20.0]);
        let mca = data.mca().unwrap();
        assert_eq!(mca.rows(), 2);
        assert_eq!(mca.row(1).unwrap(), &[7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn nodata_scan_is_not_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "#S 1 x\n#L a\n#S 2 y\n#L a\n1\n");
        let metas = parse_file(&path);
        assert_eq!(metas[0].status, ScanStatus::NoData);
        assert_eq!(read_block(&SPEC, &metas[0]).unwrap(), DataBlock::empty(ScanStatus::NoData));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "#S 1 x\n#L a\n1\n");
        let metas = parse_file(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(read_block(&SPEC, &metas[0]), Err(ParseError::Io { .. })));
    }
}
