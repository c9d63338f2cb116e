//! Scan header parsing
//!
//! SPEC and PAL-XFEL files share one line-oriented layout: a block of `#`
//! header lines per scan followed by whitespace separated data records. Only
//! the header keywords differ, so one state machine runs over a keyword
//! table per [`Dialect`].
//!
//! ```text
//!             scan start                    data line
//!  Idle ─────────────────────▶ InHeader ─────────────────▶ Idle  (scan OK)
//!   ▲                           │   │ abort notice
//!   │                           │   └─────────────────────▶ Idle  (scan NODATA)
//!   │       scan start          │
//!   └───────────────────────────┘  (previous scan NODATA, new scan begins)
//! ```

use crate::error::ParseError;
use crate::readers::data::{first_number, parse_numbers};
use chrono::NaiveDateTime;
use evaldata_scan::{McaParams, RawLocation, ScanMeta, ScanNumber, ScanStatus};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::BufRead;
use std::path::{Path, PathBuf};

static TIME_OF_DAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d\d:\d\d:\d\d").expect("static regex is valid"));
static MULTI_BLANK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex is valid"));
static MULTI_BLANK2: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s\s+").expect("static regex is valid"));
static SCAN_ABORTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#C[a-zA-Z0-9: .]*Scan aborted").expect("static regex is valid"));
static SCAN_RESUMED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#C[a-zA-Z0-9: .]*Scan resumed").expect("static regex is valid"));
static DATA_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+-]*\d").expect("static regex is valid"));

/// Date layouts tried for the timestamp, after blanks are collapsed
const DATE_FORMATS: &[&str] = &[
    "%a %b %d %H:%M:%S %Y",
    "%a %b %e %H:%M:%S %Y",
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
];

/// Meaning of a header keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Keyword {
    /// Scan start; SPEC carries number and command, PAL-XFEL only the number
    ScanStart,
    Command,
    Date,
    IntTime,
    MotorNames,
    MotorValues,
    ColumnCount,
    ColumnNames,
    McaFormat,
    McaChannels,
    /// Resets the motor names of the file header
    FileReset,
    Comment,
}

/// Classified line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Line<'a> {
    Blank,
    Aborted,
    Resumed,
    Error,
    Header(Keyword, &'a str),
    OtherHeader,
    Data,
    Other,
}

/// Keyword table of a header dialect
#[derive(Debug)]
pub(crate) struct Dialect {
    /// Dialect name for logs
    pub(crate) name: &'static str,
    /// Keyword prefixes, matched in order
    keywords: &'static [(&'static str, Keyword)],
    /// Keywords followed by an index (`#O0`, `#P1`)
    indexed: &'static [&'static str],
    /// Prefix of instrument error lines
    error_prefix: &'static str,
}

/// SPEC file dialect
pub(crate) static SPEC: Dialect = Dialect {
    name: "spec",
    keywords: &[
        ("#S", Keyword::ScanStart),
        ("#D", Keyword::Date),
        ("#T", Keyword::IntTime),
        ("#M", Keyword::IntTime),
        ("#O", Keyword::MotorNames),
        ("#P", Keyword::MotorValues),
        ("#N", Keyword::ColumnCount),
        ("#L", Keyword::ColumnNames),
        ("#@MCA", Keyword::McaFormat),
        ("#@CHANN", Keyword::McaChannels),
        ("#E", Keyword::FileReset),
        ("#C", Keyword::Comment),
    ],
    indexed: &["#O", "#P"],
    error_prefix: "MI:",
};

/// PAL-XFEL meta log dialect
pub(crate) static PAL_XFEL: Dialect = Dialect {
    name: "pal_xfel",
    keywords: &[
        ("#RUN", Keyword::ScanStart),
        ("#CMD", Keyword::Command),
        ("#TIM", Keyword::Date),
        ("#T", Keyword::IntTime),
        ("#MOT", Keyword::MotorNames),
        ("#VAL", Keyword::MotorValues),
        ("#N", Keyword::ColumnCount),
        ("#COL", Keyword::ColumnNames),
        ("#@MCA", Keyword::McaFormat),
        ("#@CHANN", Keyword::McaChannels),
        ("#E", Keyword::FileReset),
        ("#ATT", Keyword::Comment),
    ],
    indexed: &[],
    error_prefix: "MI:",
};

impl Dialect {
    /// Classify a trimmed line
    pub(crate) fn classify<'a>(&self, line: &'a str) -> Line<'a> {
        if line.is_empty() {
            return Line::Blank;
        }
        if SCAN_ABORTED.is_match(line) {
            return Line::Aborted;
        }
        if SCAN_RESUMED.is_match(line) {
            return Line::Resumed;
        }
        if line.starts_with(self.error_prefix) {
            return Line::Error;
        }
        if line.starts_with('#') {
            return self.header(line).map_or(Line::OtherHeader, |(k, rest)| Line::Header(k, rest));
        }
        if DATA_LINE.is_match(line) {
            return Line::Data;
        }
        Line::Other
    }

    /// Whether the line is a comment that may sit inside a data block
    pub(crate) fn is_comment(&self, line: &str) -> bool {
        matches!(self.header(line), Some((Keyword::Comment, _)))
    }

    fn header<'a>(&self, line: &'a str) -> Option<(Keyword, &'a str)> {
        let (prefix, keyword) = self
            .keywords
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix))?;
        let mut rest = &line[prefix.len()..];
        if self.indexed.contains(prefix) {
            rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());
        }
        Some((*keyword, rest.trim()))
    }
}

/// Scan header under construction
#[derive(Debug)]
struct Pending {
    number: ScanNumber,
    command: String,
    header_offset: u64,
    date: String,
    time: String,
    timestamp: Option<NaiveDateTime>,
    int_time: Option<f64>,
    /// Motor names from the scan header, replacing the file header names
    motor_names: Option<Vec<String>>,
    motor_values: Vec<f64>,
    column_count: Option<usize>,
    column_names: Vec<String>,
    mca_columns: Option<usize>,
    mca_channels: Option<(usize, i64, i64)>,
}

impl Pending {
    fn new(number: ScanNumber, command: String, header_offset: u64) -> Self {
        Self {
            number,
            command,
            header_offset,
            date: String::new(),
            time: String::new(),
            timestamp: None,
            int_time: None,
            motor_names: None,
            motor_values: Vec::new(),
            column_count: None,
            column_names: Vec::new(),
            mca_columns: None,
            mca_channels: None,
        }
    }
}

/// Result of one parse run
#[derive(Debug, Default)]
pub(crate) struct ParseOutcome {
    /// Scans completed in this run
    pub(crate) scans: Vec<ScanMeta>,
    /// Offset the next run starts at
    pub(crate) resume_offset: u64,
}

/// Header state machine
///
/// File header motor names survive between runs, everything else is local
/// to one run.
#[derive(Debug)]
pub(crate) struct HeaderParser {
    dialect: &'static Dialect,
    file_motors: Vec<String>,
}

impl HeaderParser {
    pub(crate) fn new(dialect: &'static Dialect) -> Self {
        Self {
            dialect,
            file_motors: Vec::new(),
        }
    }

    pub(crate) fn reset(&mut self) {
        self.file_motors.clear();
    }

    /// Parse from `start_offset` to the end of `reader`
    ///
    /// `reader` must be positioned at `start_offset` within `path`.
    pub(crate) fn parse<R: BufRead>(
        &mut self,
        path: &Path,
        mut reader: R,
        start_offset: u64,
    ) -> Result<ParseOutcome, ParseError> {
        let mut outcome = ParseOutcome::default();
        let mut pending: Option<Pending> = None;
        let mut offset = start_offset;
        let mut complete_end = start_offset;
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| ParseError::io_error(path, e))?;
            if read == 0 {
                break;
            }
            let line_offset = offset;
            offset += read as u64;
            if buf.ends_with(b"\n") {
                complete_end = offset;
            }

            let text = String::from_utf8_lossy(&buf);
            let line = text.trim();

            match self.dialect.classify(line) {
                Line::Header(Keyword::FileReset, _) => {
                    self.file_motors.clear();
                }
                Line::Header(Keyword::MotorNames, rest) => {
                    let names = split_names(rest);
                    match pending.as_mut() {
                        Some(scan) => scan.motor_names.get_or_insert_with(Vec::new).extend(names),
                        None => self.file_motors.extend(names),
                    }
                }
                Line::Header(Keyword::ScanStart, rest) => {
                    if let Some(previous) = pending.take() {
                        tracing::debug!(
                            "Scan #{} in {} has no data before the next scan",
                            previous.number,
                            path.display()
                        );
                        outcome
                            .scans
                            .push(self.finish(previous, path, ScanStatus::NoData, None));
                    }
                    let (number, command) = parse_scan_start(rest)
                        .ok_or_else(|| ParseError::syntax_error(path, line_offset, format!("invalid scan start '{line}'")))?;
                    tracing::trace!("Found scan #{} in {}", number, path.display());
                    pending = Some(Pending::new(number, command, line_offset));
                }
                Line::Header(keyword, rest) => {
                    if let Some(scan) = pending.as_mut() {
                        apply_header(scan, keyword, rest);
                    }
                }
                Line::Aborted => {
                    if let Some(scan) = pending.take() {
                        outcome.scans.push(self.finish(
                            scan,
                            path,
                            ScanStatus::NoData,
                            Some(line_offset),
                        ));
                    }
                }
                Line::Data => {
                    if let Some(scan) = pending.take() {
                        outcome
                            .scans
                            .push(self.finish(scan, path, ScanStatus::Ok, Some(line_offset)));
                    }
                }
                Line::Blank | Line::Resumed | Line::Error | Line::OtherHeader | Line::Other => {}
            }
        }

        outcome.resume_offset = match (&pending, outcome.scans.last()) {
            (Some(scan), _) => scan.header_offset,
            (None, Some(last)) => last
                .location
                .as_ref()
                .map_or(complete_end, |loc| loc.header_offset),
            (None, None) => complete_end,
        };
        Ok(outcome)
    }

    fn finish(&self, scan: Pending, path: &Path, status: ScanStatus, data_offset: Option<u64>) -> ScanMeta {
        let names = scan.motor_names.unwrap_or_else(|| self.file_motors.clone());
        let init_motors: IndexMap<String, f64> =
            names.into_iter().zip(scan.motor_values).collect();

        let mca = scan.mca_columns.map(|columns_per_line| {
            let (channels, start, stop) = scan.mca_channels.unwrap_or((0, 0, 0));
            McaParams {
                columns_per_line,
                channels,
                start,
                stop,
            }
        });

        ScanMeta {
            number: scan.number,
            command: scan.command,
            date: scan.date,
            time: scan.time,
            timestamp: scan.timestamp,
            int_time: scan.int_time,
            init_motors,
            column_names: scan.column_names,
            status,
            mca,
            location: Some(RawLocation {
                file: PathBuf::from(path),
                header_offset: scan.header_offset,
                data_offset,
            }),
        }
    }
}

fn parse_scan_start(rest: &str) -> Option<(ScanNumber, String)> {
    let mut tokens = rest.split_whitespace();
    let number = tokens.next()?.parse().ok()?;
    let command = tokens.collect::<Vec<_>>().join(" ");
    Some((number, command))
}

fn apply_header(scan: &mut Pending, keyword: Keyword, rest: &str) {
    match keyword {
        Keyword::Command => scan.command = rest.to_string(),
        Keyword::Date => {
            scan.time = TIME_OF_DAY
                .find(rest)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            let collapsed = MULTI_BLANK.replace_all(rest, " ");
            scan.timestamp = DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(&collapsed, fmt).ok());
            let date = TIME_OF_DAY.replace(rest, "");
            scan.date = MULTI_BLANK.replace_all(&date, " ").trim().to_string();
        }
        Keyword::IntTime => {
            if scan.int_time.is_none() {
                scan.int_time = first_number(rest);
            }
        }
        Keyword::MotorValues => {
            for token in rest.split_whitespace() {
                match token.parse::<f64>() {
                    Ok(value) => scan.motor_values.push(value),
                    Err(_) => break,
                }
            }
        }
        Keyword::ColumnCount => scan.column_count = rest.split_whitespace().next().and_then(|n| n.parse().ok()),
        Keyword::ColumnNames => {
            let mut names: Vec<String> = MULTI_BLANK
                .split(rest)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if scan.column_count.is_some_and(|n| names.len() > n) {
                names = split_names(rest);
            }
            scan.column_names = names;
        }
        Keyword::McaFormat => {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let columns = first_number(rest).map(|v| v.max(0.0) as usize);
            scan.mca_columns = columns;
        }
        Keyword::McaChannels => {
            let values = parse_numbers(rest);
            if values.len() >= 3 {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let channels = (values[0].max(0.0) as usize, values[1] as i64, values[2] as i64);
                scan.mca_channels = Some(channels);
            }
        }
        Keyword::ScanStart | Keyword::MotorNames | Keyword::FileReset | Keyword::Comment => {}
    }
}

/// Names separated by two or more blanks; single blanks belong to the name
fn split_names(rest: &str) -> Vec<String> {
    MULTI_BLANK2
        .split(rest.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
