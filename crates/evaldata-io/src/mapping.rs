//! Scan to NeXus layout
//!
//! ```text
//! entry<n> (NXentry)        number, command, date, time, status, ...
//!  ├── init_mopo (NXcollection)   one 1-element dataset per motor
//!  └── data      (NXdata)         one dataset per column, `mca` [rows, channels]
//! ```
//!
//! Dataset names percent-escape `%` and `/`, and a column called `mca`
//! becomes `%6Dca` so it cannot clash with the spectra dataset. The real
//! names travel in the `column_names` and `motor_names` attributes, which
//! also fix the order. Motor positions are repeated in the `motor_values`
//! attribute so header-only reads still see them.

use chrono::NaiveDateTime;
use evaldata_nexus::{AttrValue, Attributes, NexusError, NexusResult, NxDataset, NxFile, NxGroup, NX_CLASS};
use evaldata_scan::{
    Fingerprint, McaParams, McaSpectra, RawLocation, ScanData, ScanMeta, ScanNumber, ScanStatus,
};
use indexmap::IndexMap;
use std::path::Path;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Root attribute holding the raw source fingerprint
pub const RAW_FINGERPRINT: &str = "raw_fingerprint";

/// Entry name of a scan
#[must_use]
pub fn entry_name(number: ScanNumber) -> String {
    format!("entry{number}")
}

const MCA_DATASET: &str = "mca";

fn dataset_name(name: &str) -> String {
    if name == MCA_DATASET {
        return "%6Dca".to_string();
    }
    name.replace('%', "%25").replace('/', "%2F")
}

fn to_int<T: TryInto<i64>>(value: T) -> i64 {
    value.try_into().unwrap_or(i64::MAX)
}

/// Build the entry group of a scan
#[must_use]
pub fn scan_to_group(meta: &ScanMeta, data: Option<&ScanData>) -> NxGroup {
    let mut entry = NxGroup::new("NXentry")
        .with_attr("number", i64::from(meta.number))
        .with_attr("command", meta.command.as_str())
        .with_attr("date", meta.date.as_str())
        .with_attr("time", meta.time.as_str())
        .with_attr("status", meta.status.as_str())
        .with_attr("column_names", meta.column_names.clone())
        .with_attr("has_data", i64::from(data.is_some()));

    if let Some(timestamp) = meta.timestamp {
        entry.set_attr("timestamp", timestamp.format(TIMESTAMP_FORMAT).to_string());
    }
    if let Some(int_time) = meta.int_time {
        entry.set_attr("int_time", int_time);
    }
    if let Some(location) = &meta.location {
        entry.set_attr("raw_file", location.file.to_string_lossy().into_owned());
        entry.set_attr("header_offset", to_int(location.header_offset));
        if let Some(offset) = location.data_offset {
            entry.set_attr("data_offset", to_int(offset));
        }
    }
    if let Some(mca) = meta.mca {
        entry.set_attr("mca_columns_per_line", to_int(mca.columns_per_line));
        entry.set_attr("mca_channels", to_int(mca.channels));
        entry.set_attr("mca_start", mca.start);
        entry.set_attr("mca_stop", mca.stop);
    }

    let mut motors = NxGroup::new("NXcollection")
        .with_attr("motor_names", meta.init_motors.keys().cloned().collect::<Vec<_>>())
        .with_attr("motor_values", meta.init_motors.values().copied().collect::<Vec<_>>());
    for (name, value) in &meta.init_motors {
        motors.insert_dataset(&dataset_name(name), NxDataset::vector(vec![*value]));
    }
    entry.insert_group("init_mopo", motors);

    if let Some(data) = data {
        let mut group = NxGroup::new("NXdata");
        for (name, values) in data.columns() {
            group.insert_dataset(&dataset_name(name), NxDataset::vector(values.to_vec()));
        }
        if let Some(mca) = data.mca() {
            let counts = mca.counts.iter().map(|&c| f64::from(c)).collect();
            group.insert_dataset(MCA_DATASET, NxDataset::matrix(mca.rows(), mca.channels, counts));
        }
        entry.insert_group("data", group);
    }
    entry
}

fn str_attr(group: &NxGroup, name: &str) -> String {
    group
        .attr(name)
        .and_then(AttrValue::as_str)
        .unwrap_or_default()
        .to_string()
}

fn usize_attr(group: &NxGroup, name: &str) -> Option<usize> {
    group
        .attr(name)
        .and_then(AttrValue::as_int)
        .and_then(|v| usize::try_from(v).ok())
}

/// Scan metadata stored in an entry
///
/// # Errors
/// Returns [`NexusError::Format`] if required attributes are missing
pub fn meta_from_group(container: &Path, group: &NxGroup) -> NexusResult<ScanMeta> {
    let number = group
        .attr("number")
        .and_then(AttrValue::as_int)
        .and_then(|v| ScanNumber::try_from(v).ok())
        .ok_or_else(|| NexusError::format(container, "entry without a valid 'number' attribute"))?;
    let status_text = str_attr(group, "status");
    let status = status_text
        .parse::<ScanStatus>()
        .map_err(|_| NexusError::format(container, format!("entry{number}: unknown status '{status_text}'")))?;

    let timestamp = group
        .attr("timestamp")
        .and_then(AttrValue::as_str)
        .and_then(|s| NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok());

    let location = group.attr("raw_file").and_then(AttrValue::as_str).map(|file| RawLocation {
        file: file.into(),
        header_offset: group
            .attr("header_offset")
            .and_then(AttrValue::as_int)
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or_default(),
        data_offset: group
            .attr("data_offset")
            .and_then(AttrValue::as_int)
            .and_then(|v| u64::try_from(v).ok()),
    });

    let mca = usize_attr(group, "mca_columns_per_line").map(|columns_per_line| McaParams {
        columns_per_line,
        channels: usize_attr(group, "mca_channels").unwrap_or_default(),
        start: group.attr("mca_start").and_then(AttrValue::as_int).unwrap_or_default(),
        stop: group.attr("mca_stop").and_then(AttrValue::as_int).unwrap_or_default(),
    });

    let mut init_motors = IndexMap::new();
    if let Some(motors) = group.group("init_mopo") {
        let names = motors
            .attr("motor_names")
            .and_then(AttrValue::as_str_array)
            .unwrap_or_else(|| motors.datasets.keys().cloned().collect());
        // values attr survives header-only reads; datasets are the fallback
        let values = motors
            .attr("motor_values")
            .and_then(AttrValue::as_float_array)
            .filter(|v| v.len() == names.len());
        match values {
            Some(values) => init_motors.extend(names.into_iter().zip(values)),
            None => {
                for name in names {
                    if let Some(value) = motors
                        .dataset(&dataset_name(&name))
                        .and_then(|d| d.values.first().copied())
                    {
                        init_motors.insert(name, value);
                    }
                }
            }
        }
    }

    Ok(ScanMeta {
        number,
        command: str_attr(group, "command"),
        date: str_attr(group, "date"),
        time: str_attr(group, "time"),
        timestamp,
        int_time: group.attr("int_time").and_then(AttrValue::as_float),
        init_motors,
        column_names: group
            .attr("column_names")
            .and_then(AttrValue::as_str_array)
            .unwrap_or_default(),
        status,
        mca,
        location,
    })
}

/// Scan data stored in an entry read with values
///
/// Returns `Ok(None)` for entries written without data.
///
/// # Errors
/// Returns [`NexusError::Format`] if datasets are missing or not loaded
pub fn data_from_group(container: &Path, group: &NxGroup, meta: &ScanMeta) -> NexusResult<Option<ScanData>> {
    let has_data = group.attr("has_data").and_then(AttrValue::as_int).unwrap_or(0) != 0;
    if !has_data {
        return Ok(None);
    }
    let entry = entry_name(meta.number);
    let data = group
        .group("data")
        .ok_or_else(|| NexusError::format(container, format!("{entry}: 'data' group missing")))?;

    let mut columns = IndexMap::new();
    for name in &meta.column_names {
        let dataset = data
            .dataset(&dataset_name(name))
            .ok_or_else(|| NexusError::format(container, format!("{entry}: column '{name}' missing")))?;
        if !dataset.is_loaded() {
            return Err(NexusError::format(
                container,
                format!("{entry}: column '{name}' was read without values"),
            ));
        }
        columns.insert(name.clone(), dataset.values.clone());
    }
    let mut scan_data =
        ScanData::from_columns(columns).map_err(|e| NexusError::format(container, format!("{entry}: {e}")))?;

    if let Some(mca) = data.dataset(MCA_DATASET) {
        let channels = mca.shape.get(1).copied().unwrap_or_default();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let counts = mca.values.iter().map(|&v| v.max(0.0) as u32).collect();
        scan_data
            .set_mca(meta.number, McaSpectra { channels, counts })
            .map_err(|e| NexusError::format(container, format!("{entry}: {e}")))?;
    }
    Ok(Some(scan_data))
}

/// Root attributes of a cache built from `raw_path`
#[must_use]
pub fn file_attrs(raw_path: &Path, fingerprint: Fingerprint) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert(NX_CLASS.to_string(), "NXroot".into());
    attrs.insert("creator".to_string(), "evaldata".into());
    attrs.insert("creator_version".to_string(), crate::VERSION.into());
    attrs.insert("raw_file".to_string(), raw_path.to_string_lossy().into_owned().into());
    attrs.insert(RAW_FINGERPRINT.to_string(), fingerprint.to_string().into());
    attrs
}

/// Raw fingerprint recorded in a cache, if any
#[must_use]
pub fn stored_fingerprint(file: &NxFile) -> Option<Fingerprint> {
    file.attrs
        .get(RAW_FINGERPRINT)
        .and_then(AttrValue::as_str)
        .and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn sample_meta() -> ScanMeta {
        let mut meta = ScanMeta::new(12, "ascan th 0 1 2 1");
        meta.date = "Thu Jun 06 2019".into();
        meta.time = "14:38:21".into();
        meta.timestamp = NaiveDateTime::parse_from_str("2019-06-06 14:38:21", "%Y-%m-%d %H:%M:%S").ok();
        meta.int_time = Some(0.5);
        meta.init_motors.insert("Two Theta".into(), 10.5);
        meta.init_motors.insert("a/b".into(), -1.0);
        meta.column_names = vec!["th".into(), "det".into()];
        meta.mca = Some(McaParams {
            columns_per_line: 2,
            channels: 2,
            start: 0,
            stop: 1,
        });
        meta.location = Some(RawLocation {
            file: PathBuf::from("/data/scans.spec"),
            header_offset: 120,
            data_offset: Some(300),
        });
        meta
    }

    fn sample_data() -> ScanData {
        let mut data = ScanData::from_records(
            vec!["th".into(), "det".into()],
            vec![vec![0.0, 10.0], vec![0.5, 11.0]],
        )
        .unwrap();
        data.set_mca(12, McaSpectra { channels: 2, counts: vec![1, 2, 3, 4] })
            .unwrap();
        data
    }

    #[test]
    fn entry_keeps_meta_and_data() {
        let meta = sample_meta();
        let data = sample_data();
        let group = scan_to_group(&meta, Some(&data));

        assert_eq!(group.nx_class, "NXentry");
        assert!(group.group("init_mopo").unwrap().dataset("a%2Fb").is_some());
        assert_eq!(group.group("data").unwrap().dataset("mca").unwrap().shape, vec![2, 2]);

        let path = Path::new("cache.nxs");
        let restored = meta_from_group(path, &group).unwrap();
        assert_eq!(restored, meta);
        assert_eq!(data_from_group(path, &group, &restored).unwrap(), Some(data));
    }

    #[test]
    fn entry_without_data() {
        let mut meta = ScanMeta::new(3, "timescan");
        meta.status = ScanStatus::NoData;
        let group = scan_to_group(&meta, None);
        assert!(group.group("data").is_none());

        let restored = meta_from_group(Path::new("c"), &group).unwrap();
        assert_eq!(restored.status, ScanStatus::NoData);
        assert_eq!(restored.location, None);
        assert_eq!(data_from_group(Path::new("c"), &group, &restored).unwrap(), None);
    }

    #[test]
    fn missing_number_is_format_error() {
        let group = NxGroup::new("NXentry").with_attr("status", "OK");
        assert!(matches!(
            meta_from_group(Path::new("c"), &group),
            Err(NexusError::Format { .. })
        ));
    }

    #[test]
    fn stripped_values_are_rejected() {
        let meta = sample_meta();
        let mut group = scan_to_group(&meta, Some(&sample_data()));
        group.strip_values();
        assert!(matches!(
            data_from_group(Path::new("c"), &group, &meta),
            Err(NexusError::Format { .. })
        ));
    }

    #[test]
    fn escaped_names_stay_distinct() {
        let names = ["a/b", "a_b", "a%2Fb", "mca"];
        let mut meta = ScanMeta::new(5, "ascan");
        meta.column_names = names.iter().map(ToString::to_string).collect();
        let records = vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]];
        let mut data = ScanData::from_records(meta.column_names.clone(), records).unwrap();
        data.set_mca(5, McaSpectra { channels: 1, counts: vec![9, 10] }).unwrap();

        let group = scan_to_group(&meta, Some(&data));
        assert_eq!(group.group("data").unwrap().datasets.len(), 5);
        let restored = data_from_group(Path::new("c"), &group, &meta).unwrap().unwrap();
        assert_eq!(restored, data);
        assert_eq!(restored.column("a_b").unwrap(), &[2.0, 6.0]);
        assert_eq!(restored.column("mca").unwrap(), &[4.0, 8.0]);
    }

    #[test]
    fn motors_survive_header_only_read() {
        let meta = sample_meta();
        let mut group = scan_to_group(&meta, None);
        group.strip_values();
        let back = meta_from_group(Path::new("c"), &group).unwrap();
        assert_eq!(back.init_motors, meta.init_motors);
    }

    #[test]
    fn fingerprint_in_file_attrs() {
        let fingerprint = Fingerprint::compute(b"raw");
        let mut file = NxFile::new();
        assert_eq!(stored_fingerprint(&file), None);

        file.merge(&file_attrs(Path::new("/data/scans.spec"), fingerprint), &[]);
        assert_eq!(stored_fingerprint(&file), Some(fingerprint));
        assert_eq!(file.attrs[NX_CLASS], AttrValue::Str("NXroot".into()));
        assert_eq!(file.attrs["creator"], AttrValue::Str("evaldata".into()));
    }
}
