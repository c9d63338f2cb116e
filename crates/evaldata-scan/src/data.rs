//! Column-oriented scan data
//!
//! A [`ScanData`] holds one `f64` vector per named column. All columns have
//! the same length (one value per recorded point). Spectra recorded by a
//! multichannel analyser are kept apart in [`McaSpectra`].

use crate::error::ScanError;
use crate::scan::ScanNumber;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::ops::Index;

/// MCA spectra, one row of `channels` counts per recorded point
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct McaSpectra {
    /// Channels per spectrum
    pub channels: usize,
    /// Row-major counts, `rows * channels` values
    pub counts: Vec<u32>,
}

impl McaSpectra {
    /// Number of spectra
    #[must_use]
    pub fn rows(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.counts.len() / self.channels
        }
    }

    /// Spectrum of one point
    #[must_use]
    pub fn row(&self, index: usize) -> Option<&[u32]> {
        let start = index.checked_mul(self.channels)?;
        self.counts.get(start..start + self.channels)
    }
}

/// Named numeric columns of a scan
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScanData {
    columns: IndexMap<String, Vec<f64>>,
    mca: Option<McaSpectra>,
}

impl ScanData {
    /// Create empty data with the given column names
    ///
    /// # Errors
    /// Returns [`ScanError::DuplicateColumn`] if a name repeats
    pub fn new(names: Vec<String>) -> Result<Self, ScanError> {
        let mut columns = IndexMap::with_capacity(names.len());
        for name in names {
            if columns.contains_key(&name) {
                return Err(ScanError::DuplicateColumn(name));
            }
            columns.insert(name, Vec::new());
        }
        Ok(Self { columns, mca: None })
    }

    /// Build data from row records
    ///
    /// # Errors
    /// Returns [`ScanError::RecordWidth`] if a record does not have one value
    /// per column
    pub fn from_records(names: Vec<String>, records: Vec<Vec<f64>>) -> Result<Self, ScanError> {
        let mut data = Self::new(names)?;
        for (index, record) in records.iter().enumerate() {
            data.push_record(record).map_err(|e| match e {
                ScanError::RecordWidth {
                    expected, actual, ..
                } => ScanError::RecordWidth {
                    index,
                    expected,
                    actual,
                },
                other => other,
            })?;
        }
        Ok(data)
    }

    /// Build data from complete columns
    ///
    /// # Errors
    /// Returns [`ScanError::ColumnLength`] if columns differ in length
    pub fn from_columns(columns: IndexMap<String, Vec<f64>>) -> Result<Self, ScanError> {
        let expected = columns.values().next().map_or(0, Vec::len);
        if let Some((name, values)) = columns.iter().find(|(_, v)| v.len() != expected) {
            return Err(ScanError::ColumnLength {
                name: name.clone(),
                expected,
                actual: values.len(),
            });
        }
        Ok(Self { columns, mca: None })
    }

    /// Append one point
    ///
    /// # Errors
    /// Returns [`ScanError::RecordWidth`] if the record width is wrong
    pub fn push_record(&mut self, record: &[f64]) -> Result<(), ScanError> {
        if record.len() != self.columns.len() {
            return Err(ScanError::RecordWidth {
                index: self.len(),
                expected: self.columns.len(),
                actual: record.len(),
            });
        }
        for (column, value) in self.columns.values_mut().zip(record) {
            column.push(*value);
        }
        Ok(())
    }

    /// Number of recorded points
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.values().next().map_or(0, Vec::len)
    }

    /// Whether no points were recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values of one column
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Column names in file order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Iterate over `(name, values)` pairs in file order
    pub fn columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Copy of the data restricted to the given columns, in the given order
    ///
    /// # Errors
    /// Returns [`ScanError::UnknownColumn`] for a missing name
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, ScanError> {
        let mut columns = IndexMap::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let values = self
                .columns
                .get(name)
                .ok_or_else(|| ScanError::UnknownColumn(name.to_string()))?;
            columns.insert(name.to_string(), values.clone());
        }
        Ok(Self { columns, mca: None })
    }

    /// Add a column holding the same value for every point
    ///
    /// Existing columns with the same name are left untouched, so measured
    /// values always win over header values.
    pub fn append_constant_column(&mut self, name: &str, value: f64) {
        if self.columns.contains_key(name) {
            return;
        }
        let len = self.len();
        self.columns.insert(name.to_string(), vec![value; len]);
    }

    /// Iterate over points as rows
    #[must_use]
    pub fn rows(&self) -> Rows<'_> {
        Rows {
            data: self,
            index: 0,
        }
    }

    /// MCA spectra, if the scan recorded any
    #[must_use]
    pub fn mca(&self) -> Option<&McaSpectra> {
        self.mca.as_ref()
    }

    /// Attach MCA spectra
    ///
    /// # Errors
    /// Returns [`ScanError::McaShape`] if the spectra count does not match
    /// the number of points
    pub fn set_mca(&mut self, scan: ScanNumber, mca: McaSpectra) -> Result<(), ScanError> {
        let expected = self.len() * mca.channels;
        if mca.counts.len() != expected {
            return Err(ScanError::McaShape {
                scan,
                expected,
                actual: mca.counts.len(),
            });
        }
        self.mca = Some(mca);
        Ok(())
    }
}

impl Index<&str> for ScanData {
    type Output = [f64];

    /// # Panics
    /// Panics if the column does not exist
    fn index(&self, name: &str) -> &Self::Output {
        match self.columns.get(name) {
            Some(values) => values,
            None => panic!("unknown column '{name}'"),
        }
    }
}

/// Row iterator over [`ScanData`]
#[derive(Debug)]
pub struct Rows<'a> {
    data: &'a ScanData,
    index: usize,
}

impl Iterator for Rows<'_> {
    type Item = Vec<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.data.len() {
            return None;
        }
        let row = self.data.columns.values().map(|c| c[self.index]).collect();
        self.index += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.data.len().saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}
