//! Scan source with write-through cache
//!
//! A [`Source`] owns one raw reader and, unless disabled, a NeXus cache file.
//! The cache records the fingerprint of the raw data it was built from:
//!
//! 1. First update: the cache index is loaded (or deleted with
//!    `force_overwrite`).
//! 2. Every update: the current fingerprint is compared with the recorded
//!    one. Equal means nothing to do.
//! 3. Otherwise the raw source is parsed incrementally. Scans that are new,
//!    changed their header or are missing from the cache get marked dirty,
//!    and so does the last scan known before the parse since it may have
//!    grown.
//! 4. Dirty scans are read from raw and written to the cache in one go,
//!    together with the new fingerprint.
//!
//! Data of clean cached scans is read from the cache, everything else from
//! the raw source.

use crate::config::SourceConfig;
use crate::error::{ConfigError, SourceError, SourceResult};
use crate::mapping::{data_from_group, entry_name, file_attrs, meta_from_group, scan_to_group, stored_fingerprint};
use crate::readers::{default_readers, DataBlock, RawReader, ReaderKind};
use evaldata_nexus::{NexusStore, NxGroup};
use evaldata_scan::{Fingerprint, Scan, ScanData, ScanMeta, ScanNumber, ScanStatus};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::path::Path;

/// Cache bookkeeping of one scan
#[derive(Debug, Clone, Copy, Default)]
struct EntryState {
    /// Scan has an entry in the cache file
    in_cache: bool,
    /// Raw scan changed since the entry was written
    dirty: bool,
}

impl EntryState {
    fn is_clean_cached(self) -> bool {
        self.in_cache && !self.dirty
    }
}

/// What one [`Source::update`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateSummary {
    /// Scans reported by the raw reader
    pub parsed: usize,
    /// Scans written to the cache
    pub written: usize,
    /// Scans loaded from the cache index
    pub from_cache: usize,
}

impl Display for UpdateSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parsed {} scans, wrote {} to cache, loaded {} from cache",
            self.parsed, self.written, self.from_cache
        )
    }
}

/// Scans of one raw source
#[derive(Debug)]
pub struct Source {
    config: SourceConfig,
    reader: Box<dyn RawReader>,
    store: Option<NexusStore>,
    scans: BTreeMap<ScanNumber, Scan>,
    states: BTreeMap<ScanNumber, EntryState>,
    cache_loaded: bool,
    /// Fingerprint the scans are current with
    fingerprint: Option<Fingerprint>,
    last_update: UpdateSummary,
}

impl Source {
    /// Open a source, detecting the reader from the raw path
    ///
    /// Runs a first [`update`](Self::update).
    ///
    /// # Errors
    /// Returns error if the configuration is invalid, no reader matches, or
    /// the first update fails
    pub fn new(config: SourceConfig) -> SourceResult<Self> {
        config.validate()?;
        let reader = default_readers().create(&config)?;
        Self::with_reader(config, reader)
    }

    /// Open a source with an explicit reader
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or the first update fails
    pub fn with_reader(config: SourceConfig, reader: Box<dyn RawReader>) -> SourceResult<Self> {
        config.validate()?;
        let store = if config.use_nexus && reader.supports_cache() {
            Some(NexusStore::open(config.nexus_file(), config.nexus_format)?)
        } else {
            if config.use_nexus {
                tracing::debug!("{} reader runs without cache file", reader.kind());
            }
            None
        };

        let mut source = Self {
            config,
            reader,
            store,
            scans: BTreeMap::new(),
            states: BTreeMap::new(),
            cache_loaded: false,
            fingerprint: None,
            last_update: UpdateSummary::default(),
        };
        let summary = source.update()?;
        tracing::info!("Opened {}: {}", source.name(), summary);
        Ok(source)
    }

    /// Raw file name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.file_name
    }

    /// Options the source was opened with
    #[must_use]
    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Reader kind in use
    #[must_use]
    pub fn reader_kind(&self) -> ReaderKind {
        self.reader.kind()
    }

    /// Cache file path, `None` when running without cache
    #[must_use]
    pub fn nexus_file(&self) -> Option<&Path> {
        self.store.as_ref().map(NexusStore::path)
    }

    /// Whether the cache file exists on disk
    #[must_use]
    pub fn nexus_file_exists(&self) -> bool {
        self.store.as_ref().is_some_and(NexusStore::exists)
    }

    /// Number of known scans
    #[must_use]
    pub fn len(&self) -> usize {
        self.scans.len()
    }

    /// Whether no scans are known
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }

    /// Whether a scan number is known
    #[must_use]
    pub fn contains(&self, number: ScanNumber) -> bool {
        self.scans.contains_key(&number)
    }

    /// Known scan numbers, ascending
    #[must_use]
    pub fn scan_numbers(&self) -> Vec<ScanNumber> {
        self.scans.keys().copied().collect()
    }

    /// Known scans, ascending by number
    pub fn scans(&self) -> impl Iterator<Item = &Scan> {
        self.scans.values()
    }

    /// Summary of the most recent [`update`](Self::update)
    #[must_use]
    pub fn last_update(&self) -> UpdateSummary {
        self.last_update
    }

    /// Scan by number without any IO
    #[must_use]
    pub fn scan(&self, number: ScanNumber) -> Option<&Scan> {
        self.scans.get(&number)
    }

    fn current_fingerprint(&self) -> SourceResult<Fingerprint> {
        let raw = self.reader.fingerprint()?;
        let range = format!(
            "{}:{:?}",
            self.config.start_scan_number, self.config.stop_scan_number
        );
        Ok(Fingerprint::combine([raw, Fingerprint::compute(range.as_bytes())]))
    }

    fn load_cache_index(&mut self) -> SourceResult<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        if self.config.force_overwrite {
            store.reset()?;
            return Ok(0);
        }

        let index = store.read_index()?;
        let mut loaded = 0;
        for group in index.entries.values() {
            let meta = meta_from_group(store.path(), group)?;
            if !self.config.accepts(meta.number) {
                continue;
            }
            self.states.insert(
                meta.number,
                EntryState {
                    in_cache: true,
                    dirty: false,
                },
            );
            self.scans.insert(meta.number, Scan::new(meta));
            loaded += 1;
        }
        self.fingerprint = stored_fingerprint(&index);
        tracing::debug!("Loaded {} scans from {}", loaded, store.path().display());
        Ok(loaded)
    }

    /// Bring the scans in line with the raw source
    ///
    /// # Errors
    /// Returns error if the raw source or the cache cannot be read, or the
    /// cache cannot be written
    pub fn update(&mut self) -> SourceResult<UpdateSummary> {
        let mut summary = UpdateSummary::default();
        if !self.cache_loaded {
            summary.from_cache = self.load_cache_index()?;
            self.cache_loaded = true;
        }

        let fingerprint = self.current_fingerprint()?;
        if self.fingerprint == Some(fingerprint) {
            tracing::debug!("{} unchanged", self.name());
            self.last_update = summary;
            return Ok(summary);
        }

        let metas: Vec<ScanMeta> = self
            .reader
            .parse()?
            .into_iter()
            .filter(|m| self.config.accepts(m.number))
            .collect();
        summary.parsed = metas.len();
        let previous_last = self.scans.keys().next_back().copied();
        for meta in metas {
            let number = meta.number;
            self.merge_meta(meta, Some(number) == previous_last);
        }

        let dirty: Vec<ScanNumber> = self
            .states
            .iter()
            .filter(|(_, state)| state.dirty)
            .map(|(number, _)| *number)
            .collect();
        if self.store.is_some() {
            summary.written = self.write_through(&dirty, fingerprint)?;
        } else {
            if self.config.read_all_data {
                let blocks = self.read_raw_blocks(&dirty)?;
                for (number, block) in blocks {
                    if let Some(scan) = self.scans.get_mut(&number) {
                        apply_block(scan, block);
                    }
                }
            }
            for state in self.states.values_mut() {
                state.dirty = false;
            }
        }

        self.fingerprint = Some(fingerprint);
        self.last_update = summary;
        tracing::debug!("Updated {}: {}", self.name(), summary);
        Ok(summary)
    }

    /// Merge a parsed header into the scan table and mark it dirty if needed
    ///
    /// `may_have_grown` is set for the last scan known before the parse.
    fn merge_meta(&mut self, meta: ScanMeta, may_have_grown: bool) {
        let number = meta.number;
        let state = self.states.entry(number).or_default();
        let changed = match self.scans.get_mut(&number) {
            None => {
                self.scans.insert(number, Scan::new(meta));
                true
            }
            Some(scan) if same_header(scan.meta(), &meta) => {
                if may_have_grown {
                    // status comes from the next block read, not the stale one
                    scan.set_meta(meta);
                    scan.clear_data();
                }
                false
            }
            Some(scan) => {
                tracing::debug!("Header of {} changed", meta.name());
                scan.set_meta(meta);
                scan.clear_data();
                true
            }
        };
        if changed || may_have_grown || !state.in_cache {
            state.dirty = true;
        }
    }

    /// Read data blocks from the raw source in parallel
    fn read_raw_blocks(&self, numbers: &[ScanNumber]) -> SourceResult<Vec<(ScanNumber, DataBlock)>> {
        let reader = &*self.reader;
        let metas: Vec<&ScanMeta> = numbers
            .iter()
            .filter_map(|n| self.scans.get(n))
            .map(Scan::meta)
            .collect();
        let blocks = metas
            .par_iter()
            .map(|meta| reader.read_data(meta).map(|block| (meta.number, block)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(blocks)
    }

    /// Read dirty scans and write them to the cache with the new fingerprint
    fn write_through(&mut self, dirty: &[ScanNumber], fingerprint: Fingerprint) -> SourceResult<usize> {
        let blocks = self.read_raw_blocks(dirty)?;
        let mut entries: Vec<(String, NxGroup)> = Vec::with_capacity(blocks.len());
        for (number, block) in blocks {
            let Some(scan) = self.scans.get_mut(&number) else {
                continue;
            };
            scan.set_status(block.status);
            entries.push((entry_name(number), scan_to_group(scan.meta(), block.data.as_ref())));
            if let (true, Some(data)) = (self.config.read_all_data, block.data) {
                scan.set_data(data);
            }
        }

        if let Some(store) = &self.store {
            let attrs = file_attrs(self.reader.raw_path(), fingerprint);
            store.write_entries(&attrs, &entries)?;
            tracing::info!("Wrote {} scans to {}", entries.len(), store.path().display());
        }
        for number in dirty {
            self.states.insert(
                *number,
                EntryState {
                    in_cache: true,
                    dirty: false,
                },
            );
        }
        Ok(entries.len())
    }

    /// Load the data of a scan unless already held
    ///
    /// Clean cached scans read from the cache, all others from raw.
    ///
    /// # Errors
    /// Returns [`SourceError::ScanNotFound`] for unknown scans, or the read
    /// error
    pub fn read_scan_data(&mut self, number: ScanNumber) -> SourceResult<()> {
        let scan = self.scans.get(&number).ok_or(SourceError::ScanNotFound(number))?;
        if scan.has_data() {
            return Ok(());
        }
        let state = self.states.get(&number).copied().unwrap_or_default();
        let cached = match (&self.store, state.is_clean_cached()) {
            (Some(store), true) => block_from_cache(store, scan.meta())?,
            _ => None,
        };
        let block = match cached {
            Some(block) => block,
            None => self.reader.read_data(scan.meta())?,
        };

        if let Some(scan) = self.scans.get_mut(&number) {
            apply_block(scan, block);
        }
        Ok(())
    }

    /// Load the data of every scan not held yet
    ///
    /// Cached scans come from one read of the cache file, raw scans are
    /// read in parallel.
    ///
    /// # Errors
    /// Returns the first read error
    pub fn read_all_scan_data(&mut self) -> SourceResult<()> {
        let missing: Vec<ScanNumber> = self
            .scans
            .values()
            .filter(|s| !s.has_data())
            .map(Scan::number)
            .collect();
        let (cached, mut raw): (Vec<ScanNumber>, Vec<ScanNumber>) = missing
            .into_iter()
            .partition(|n| self.store.is_some() && self.states.get(n).is_some_and(|s| s.is_clean_cached()));

        let mut from_cache = 0usize;
        if let Some(store) = &self.store {
            if !cached.is_empty() {
                let file = store.read_full()?;
                for number in cached {
                    let Some(group) = file.entry(&entry_name(number)) else {
                        raw.push(number);
                        continue;
                    };
                    let Some(scan) = self.scans.get_mut(&number) else {
                        continue;
                    };
                    let data = data_from_group(store.path(), group, scan.meta())?;
                    let status = if data.is_some() { scan.status() } else { ScanStatus::NoData };
                    apply_block(scan, DataBlock { status, data });
                    from_cache += 1;
                }
            }
        }

        let blocks = self.read_raw_blocks(&raw)?;
        tracing::debug!("Read {} scans from raw, {} from cache", blocks.len(), from_cache);
        for (number, block) in blocks {
            if let Some(scan) = self.scans.get_mut(&number) {
                apply_block(scan, block);
            }
        }
        Ok(())
    }

    /// Scan by number
    ///
    /// Updates first when `update_before_read` is set and `dismiss_update`
    /// is not.
    ///
    /// # Errors
    /// Returns [`SourceError::ScanNotFound`] for unknown scans, or the
    /// update/read error
    pub fn get_scan(&mut self, number: ScanNumber, read_data: bool, dismiss_update: bool) -> SourceResult<&Scan> {
        if self.config.update_before_read && !dismiss_update {
            self.update()?;
        }
        if !self.scans.contains_key(&number) {
            return Err(SourceError::ScanNotFound(number));
        }
        if read_data {
            self.read_scan_data(number)?;
        }
        self.scans.get(&number).ok_or(SourceError::ScanNotFound(number))
    }

    /// Copy of the data of a scan, initial motor positions appended as
    /// constant columns
    ///
    /// With `read_and_forget` the data is dropped from memory afterwards.
    ///
    /// # Errors
    /// Returns [`SourceError::NoData`] if the scan has no data
    pub fn get_scan_data(&mut self, number: ScanNumber, dismiss_update: bool) -> SourceResult<ScanData> {
        self.get_scan(number, true, dismiss_update)?;
        let forget = self.config.read_and_forget;
        let scan = self
            .scans
            .get_mut(&number)
            .ok_or(SourceError::ScanNotFound(number))?;
        let data = if forget { scan.take_data() } else { scan.data().cloned() };
        let mut data = data.ok_or(SourceError::NoData(number))?;
        for (motor, value) in &scan.meta().init_motors {
            data.append_constant_column(motor, *value);
        }
        Ok(data)
    }

    /// Several scans with a single update
    ///
    /// # Errors
    /// Returns [`SourceError::ScanNotFound`] for the first unknown scan
    pub fn get_scan_list(&mut self, numbers: &[ScanNumber], read_data: bool) -> SourceResult<Vec<&Scan>> {
        if self.config.update_before_read {
            self.update()?;
        }
        for &number in numbers {
            self.get_scan(number, read_data, true)?;
        }
        numbers
            .iter()
            .map(|n| self.scans.get(n).ok_or(SourceError::ScanNotFound(*n)))
            .collect()
    }

    /// Drop the data of a scan from memory
    ///
    /// # Errors
    /// Returns [`SourceError::ScanNotFound`] for unknown scans
    pub fn clear_scan_data(&mut self, number: ScanNumber) -> SourceResult<()> {
        self.scans
            .get_mut(&number)
            .ok_or(SourceError::ScanNotFound(number))?
            .clear_data();
        Ok(())
    }

    /// Drop the data of every scan from memory
    pub fn clear_all_scan_data(&mut self) {
        for scan in self.scans.values_mut() {
            scan.clear_data();
        }
    }

    fn cache_store(&self) -> SourceResult<&NexusStore> {
        self.store
            .as_ref()
            .ok_or_else(|| ConfigError::invalid(format!("{} has no cache file", self.name())).into())
    }

    fn save_entries(&mut self, numbers: &[ScanNumber]) -> SourceResult<usize> {
        let store = self.cache_store()?;
        let entries: Vec<(String, NxGroup)> = numbers
            .iter()
            .filter_map(|n| self.scans.get(n))
            .map(|scan| (entry_name(scan.number()), scan_to_group(scan.meta(), scan.data())))
            .collect();
        let attrs = self
            .fingerprint
            .map(|fp| file_attrs(self.reader.raw_path(), fp))
            .unwrap_or_default();
        store.write_entries(&attrs, &entries)?;
        tracing::info!("Saved {} scans to {}", entries.len(), store.path().display());

        for number in numbers {
            self.states.insert(
                *number,
                EntryState {
                    in_cache: true,
                    dirty: false,
                },
            );
        }
        Ok(entries.len())
    }

    /// Write one scan with its data to the cache
    ///
    /// # Errors
    /// Returns [`SourceError::Config`] when running without cache, or the
    /// read/write error
    pub fn save_scan_to_nexus(&mut self, number: ScanNumber) -> SourceResult<()> {
        self.cache_store()?;
        self.read_scan_data(number)?;
        self.save_entries(&[number])?;
        Ok(())
    }

    /// Write every scan with its data to the cache
    ///
    /// # Errors
    /// Returns [`SourceError::Config`] when running without cache, or the
    /// read/write error
    pub fn save_all_scans_to_nexus(&mut self) -> SourceResult<usize> {
        self.cache_store()?;
        self.read_all_scan_data()?;
        let numbers = self.scan_numbers();
        self.save_entries(&numbers)
    }
}

/// Headers equal, ignoring a status derived from reading the data block
///
/// Floats compare by bit pattern so NaN positions match themselves.
fn same_header(held: &ScanMeta, parsed: &ScanMeta) -> bool {
    let same_bits = |a: f64, b: f64| a.to_bits() == b.to_bits();
    (parsed.status == ScanStatus::Ok || parsed.status == held.status)
        && held.number == parsed.number
        && held.command == parsed.command
        && held.date == parsed.date
        && held.time == parsed.time
        && held.timestamp == parsed.timestamp
        && held.int_time.map(f64::to_bits) == parsed.int_time.map(f64::to_bits)
        && held.init_motors.len() == parsed.init_motors.len()
        && held
            .init_motors
            .iter()
            .zip(&parsed.init_motors)
            .all(|((a, x), (b, y))| a == b && same_bits(*x, *y))
        && held.column_names == parsed.column_names
        && held.mca == parsed.mca
        && held.location == parsed.location
}

fn apply_block(scan: &mut Scan, block: DataBlock) {
    scan.set_status(block.status);
    if let Some(data) = block.data {
        scan.set_data(data);
    }
}

/// Data block of a scan from its cache entry; `None` if the entry is gone
fn block_from_cache(store: &NexusStore, meta: &ScanMeta) -> SourceResult<Option<DataBlock>> {
    let Some(group) = store.read_entry(&entry_name(meta.number))? else {
        tracing::debug!("{} missing from {}", meta.name(), store.path().display());
        return Ok(None);
    };
    let data = data_from_group(store.path(), &group, meta)?;
    let status = if data.is_some() { meta.status } else { ScanStatus::NoData };
    Ok(Some(DataBlock { status, data }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readers::SpecReader;
    use evaldata_nexus::ContainerFormat;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const SPEC: &str = "\
#F run.spec
#O0 Theta  Chi

#S 1 ascan th 0 1 1 1
#D Thu Jun 06 14:38:21 2019
#P0 1.5 2
#L th  det
0 10
1 11

#S 2 ascan th 0 1 1 1
#D Thu Jun 06 14:40:00 2019
#P0 2.5 3
#L th  det
0 20
1 21
";

    fn config(dir: &tempfile::TempDir) -> SourceConfig {
        std::fs::write(dir.path().join("run.spec"), SPEC).unwrap();
        SourceConfig::new("run.spec", dir.path()).with_nexus_format(ContainerFormat::JsonGz)
    }

    #[test]
    fn first_update_writes_cache() {
        let dir = tempfile::tempdir().unwrap();
        let source = Source::new(config(&dir)).unwrap();
        assert_eq!(source.scan_numbers(), vec![1, 2]);
        assert_eq!(source.reader_kind(), ReaderKind::Spec);
        assert!(source.nexus_file_exists());
        assert!(source.scans().all(|s| !s.has_data()));
    }

    #[test]
    fn reopen_uses_cache() {
        let dir = tempfile::tempdir().unwrap();
        drop(Source::new(config(&dir)).unwrap());

        let mut source = Source::new(config(&dir).with_update_before_read(false)).unwrap();
        assert_eq!(source.len(), 2);
        let summary = source.update().unwrap();
        assert_eq!(summary, UpdateSummary::default());

        let data = source.get_scan_data(2, false).unwrap();
        assert_eq!(data.column("det").unwrap(), &[20.0, 21.0]);
        assert_eq!(data.column("Chi").unwrap(), &[3.0, 3.0]);
    }

    #[test]
    fn appended_scan_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = Source::new(config(&dir)).unwrap();

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join("run.spec"))
            .unwrap();
        file.write_all(b"\n#S 3 ascan th 0 1 1 1\n#P0 3.5 4\n#L th  det\n0 30\n")
            .unwrap();
        drop(file);

        let summary = source.update().unwrap();
        assert_eq!(summary.parsed, 2);
        assert_eq!(summary.written, 2);
        assert_eq!(source.get_scan(3, false, true).unwrap().meta().motor("Theta"), Some(3.5));
    }

    #[test]
    fn unknown_scan_and_no_data() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("empty.spec"), "#S 1 x\n#L a\n#S 2 y\n#L a\n1\n").unwrap();
        let mut source = Source::new(SourceConfig::new("empty.spec", dir.path()).with_use_nexus(false)).unwrap();

        assert!(matches!(source.get_scan(9, false, false), Err(SourceError::ScanNotFound(9))));
        assert!(matches!(source.get_scan_data(1, false), Err(SourceError::NoData(1))));
        assert_eq!(source.nexus_file(), None);
    }

    #[test]
    fn read_and_forget_drops_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = Source::new(config(&dir).with_read_and_forget(true)).unwrap();
        source.get_scan_data(1, true).unwrap();
        assert!(!source.scan(1).unwrap().has_data());
    }

    #[test]
    fn scan_range_filters() {
        let dir = tempfile::tempdir().unwrap();
        let source = Source::new(config(&dir).with_scan_range(2, None)).unwrap();
        assert_eq!(source.scan_numbers(), vec![2]);
    }

    #[test]
    fn save_without_cache_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = Source::new(config(&dir).with_use_nexus(false)).unwrap();
        assert!(matches!(source.save_scan_to_nexus(1), Err(SourceError::Config(_))));
    }

    #[test]
    fn explicit_reader() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir).with_use_nexus(false).with_read_all_data(true);
        let reader = Box::new(SpecReader::new(config.raw_path()));
        let source = Source::with_reader(config, reader).unwrap();
        assert!(source.scans().all(Scan::has_data));
    }

    #[test]
    fn header_comparison_ignores_data_status() {
        let mut held = ScanMeta::new(1, "x");
        held.status = ScanStatus::Aborted;
        let parsed = ScanMeta::new(1, "x");
        assert!(same_header(&held, &parsed));

        let mut changed = ScanMeta::new(1, "y");
        changed.status = ScanStatus::Ok;
        assert!(!same_header(&held, &changed));
    }

    #[test]
    fn header_comparison_matches_nan_values() {
        let mut held = ScanMeta::new(1, "x");
        held.int_time = Some(f64::NAN);
        held.init_motors.insert("Theta".into(), f64::NAN);
        assert!(same_header(&held, &held.clone()));

        let mut moved = held.clone();
        moved.init_motors.insert("Theta".into(), 1.0);
        assert!(!same_header(&held, &moved));
    }

    #[test]
    fn nan_motor_scan_is_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let text = SPEC.replace("#P0 1.5 2", "#P0 nan 2");
        std::fs::write(dir.path().join("run.spec"), text).unwrap();
        let config = SourceConfig::new("run.spec", dir.path()).with_nexus_format(ContainerFormat::JsonGz);
        drop(Source::new(config.clone()).unwrap());

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join("run.spec"))
            .unwrap();
        file.write_all(b"\n#S 3 ascan th 0 1 1 1\n#L th  det\n0 30\n").unwrap();
        drop(file);

        // reopened source parses from the start; only scans 2 and 3 need writing
        let source = Source::new(config).unwrap();
        let summary = source.last_update();
        assert_eq!(summary.parsed, 3);
        assert_eq!(summary.written, 2);
        assert!(source.scan(1).unwrap().meta().motor("Theta").unwrap().is_nan());
    }
}
