//! Native HDF5 container (NeXus)
//!
//! Groups become HDF5 groups with an `NX_class` string attribute, datasets
//! are stored as deflate-compressed `f64` arrays and string attributes as
//! variable-length unicode. Single entries are read without touching the
//! rest of the file; writes rebuild the file in a sibling temp file and
//! rename it over the target.

use crate::backend::{ContainerBackend, ContainerFormat, ReadDepth};
use crate::error::{NexusError, NexusResult};
use crate::tree::{AttrValue, Attributes, NxDataset, NxFile, NxGroup};
use crate::NX_CLASS;
use hdf5::types::{TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::{File, Group, Location};
use std::path::{Path, PathBuf};
use std::str::FromStr;

const DEFLATE_LEVEL: u8 = 9;

/// HDF5 backend
#[derive(Debug, Clone, Copy, Default)]
pub struct Hdf5Backend;

impl Hdf5Backend {
    /// Create new HDF5 backend
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ContainerBackend for Hdf5Backend {
    fn format(&self) -> ContainerFormat {
        ContainerFormat::Hdf5
    }

    fn read(&self, path: &Path, depth: ReadDepth) -> NexusResult<NxFile> {
        let file = File::open(path)?;
        let mut tree = NxFile::new();
        tree.attrs = read_attrs(&file, path)?;
        for group in file.groups()? {
            let name = base_name(&group.name());
            tree.entries.insert(name, read_group(&group, path, depth)?);
        }
        Ok(tree)
    }

    fn read_entry(&self, path: &Path, name: &str) -> NexusResult<Option<NxGroup>> {
        let file = File::open(path)?;
        if !file.link_exists(name) {
            return Ok(None);
        }
        let group = file.group(name)?;
        Ok(Some(read_group(&group, path, ReadDepth::Full)?))
    }

    fn write_entries(
        &self,
        path: &Path,
        attrs: &Attributes,
        entries: &[(String, NxGroup)],
    ) -> NexusResult<()> {
        let mut tree = if path.exists() {
            self.read(path, ReadDepth::Full)?
        } else {
            NxFile::new()
        };
        tree.merge(attrs, entries);

        let tmp = temp_path(path);
        {
            let file = File::create(&tmp)?;
            write_str_attr(&file, NX_CLASS, "NXroot", path)?;
            write_attrs(&file, &tree.attrs, path)?;
            for (name, entry) in &tree.entries {
                let group = file.create_group(name)?;
                write_group(&group, entry, path)?;
            }
            file.flush()?;
        }
        tracing::debug!(
            "Wrote {} entries to {} ({} updated)",
            tree.entries.len(),
            path.display(),
            entries.len()
        );
        std::fs::rename(&tmp, path).map_err(|e| NexusError::io_error(path, e))
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

fn base_name(full: &str) -> String {
    full.rsplit('/').next().unwrap_or(full).to_string()
}

fn read_group(group: &Group, path: &Path, depth: ReadDepth) -> NexusResult<NxGroup> {
    let mut attrs = read_attrs(group, path)?;
    let nx_class = attrs
        .shift_remove(NX_CLASS)
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();

    let mut out = NxGroup::new(nx_class);
    out.attrs = attrs;

    for child in group.groups()? {
        let name = base_name(&child.name());
        out.groups.insert(name, read_group(&child, path, depth)?);
    }
    for dataset in group.datasets()? {
        let name = base_name(&dataset.name());
        let values = match depth {
            ReadDepth::Full => dataset.read_raw::<f64>()?,
            ReadDepth::Headers => Vec::new(),
        };
        out.datasets.insert(
            name,
            NxDataset {
                shape: dataset.shape(),
                values,
                attrs: read_attrs(&dataset, path)?,
            },
        );
    }
    Ok(out)
}

fn read_attrs(location: &Location, path: &Path) -> NexusResult<Attributes> {
    let mut attrs = Attributes::new();
    for name in location.attr_names()? {
        let attr = location.attr(&name)?;
        let scalar = attr.ndim() == 0;
        let value = match attr.dtype()?.to_descriptor()? {
            TypeDescriptor::VarLenUnicode => {
                if scalar {
                    AttrValue::Str(attr.read_scalar::<VarLenUnicode>()?.to_string())
                } else {
                    AttrValue::StrArray(
                        attr.read_raw::<VarLenUnicode>()?
                            .iter()
                            .map(ToString::to_string)
                            .collect(),
                    )
                }
            }
            TypeDescriptor::VarLenAscii => {
                if scalar {
                    AttrValue::Str(attr.read_scalar::<VarLenAscii>()?.to_string())
                } else {
                    AttrValue::StrArray(
                        attr.read_raw::<VarLenAscii>()?
                            .iter()
                            .map(ToString::to_string)
                            .collect(),
                    )
                }
            }
            TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) if scalar => {
                AttrValue::Int(attr.read_scalar::<i64>()?)
            }
            TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) | TypeDescriptor::Float(_) => {
                if scalar {
                    AttrValue::Float(attr.read_scalar::<f64>()?)
                } else {
                    AttrValue::FloatArray(attr.read_raw::<f64>()?)
                }
            }
            other => {
                tracing::warn!(
                    "Skipping attribute '{}' of unsupported type {:?} in {}",
                    name,
                    other,
                    path.display()
                );
                continue;
            }
        };
        attrs.insert(name, value);
    }
    Ok(attrs)
}

fn write_group(group: &Group, tree: &NxGroup, path: &Path) -> NexusResult<()> {
    if !tree.nx_class.is_empty() {
        write_str_attr(group, NX_CLASS, &tree.nx_class, path)?;
    }
    write_attrs(group, &tree.attrs, path)?;

    for (name, dataset) in &tree.datasets {
        if !dataset.is_loaded() {
            return Err(NexusError::format(
                path,
                format!("dataset '{name}' has no values to write"),
            ));
        }
        let mut builder = group.new_dataset::<f64>().shape(dataset.shape.clone());
        if dataset.element_count() > 0 {
            builder = builder.deflate(DEFLATE_LEVEL);
        }
        let ds = builder.create(name.as_str())?;
        ds.write_raw(dataset.values.as_slice())?;
        write_attrs(&ds, &dataset.attrs, path)?;
    }
    for (name, child) in &tree.groups {
        let sub = group.create_group(name)?;
        write_group(&sub, child, path)?;
    }
    Ok(())
}

fn write_attrs(location: &Location, attrs: &Attributes, path: &Path) -> NexusResult<()> {
    for (name, value) in attrs {
        if name == NX_CLASS {
            continue;
        }
        match value {
            AttrValue::Str(s) => write_str_attr(location, name, s, path)?,
            AttrValue::Int(v) => location
                .new_attr::<i64>()
                .create(name.as_str())?
                .write_scalar(v)?,
            AttrValue::Float(v) => location
                .new_attr::<f64>()
                .create(name.as_str())?
                .write_scalar(v)?,
            AttrValue::FloatArray(values) => location
                .new_attr::<f64>()
                .shape(values.len())
                .create(name.as_str())?
                .write_raw(values.as_slice())?,
            AttrValue::StrArray(values) => {
                let encoded = values
                    .iter()
                    .map(|s| to_var_len_unicode(s, path))
                    .collect::<NexusResult<Vec<_>>>()?;
                location
                    .new_attr::<VarLenUnicode>()
                    .shape(encoded.len())
                    .create(name.as_str())?
                    .write_raw(encoded.as_slice())?;
            }
        }
    }
    Ok(())
}

fn write_str_attr(location: &Location, name: &str, value: &str, path: &Path) -> NexusResult<()> {
    let value = to_var_len_unicode(value, path)?;
    location
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn to_var_len_unicode(value: &str, path: &Path) -> NexusResult<VarLenUnicode> {
    VarLenUnicode::from_str(value)
        .map_err(|e| NexusError::format(path, format!("invalid string attribute: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn hdf5_roundtrip_with_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.nxs");
        let backend = Hdf5Backend::new();

        let mut data = NxGroup::new("NXdata");
        data.insert_dataset("delay", NxDataset::vector(vec![-1.0, 0.0, 1.0]));
        data.insert_dataset("mca", NxDataset::matrix(3, 2, vec![1.0; 6]));
        let mut entry = NxGroup::new("NXentry")
            .with_attr("number", 1i64)
            .with_attr("command", "ascan th 0 1 2 1")
            .with_attr("column_names", vec!["delay".to_string()]);
        entry.insert_group("data", data);

        let mut attrs = Attributes::new();
        attrs.insert("creator".to_string(), AttrValue::from("evaldata"));
        backend
            .write_entries(&path, &attrs, &[("entry1".to_string(), entry.clone())])
            .unwrap();

        let tree = backend.read(&path, ReadDepth::Full).unwrap();
        assert_eq!(tree.attrs.get("creator"), Some(&AttrValue::from("evaldata")));
        assert_eq!(tree.attrs.get(NX_CLASS), Some(&AttrValue::from("NXroot")));
        assert_eq!(tree.entry("entry1"), Some(&entry));

        let headers = backend.read(&path, ReadDepth::Headers).unwrap();
        let mca = headers.entry("entry1").unwrap().group("data").unwrap().dataset("mca").unwrap();
        assert_eq!(mca.shape, vec![3, 2]);
        assert!(mca.values.is_empty());
    }
}
