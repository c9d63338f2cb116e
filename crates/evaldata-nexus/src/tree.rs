//! In-memory NeXus tree
//!
//! Groups carry an `NX_class`, attributes and child groups/datasets. All
//! datasets are numeric and stored as flat `f64` vectors with an explicit
//! shape, which covers scan columns (1-D) and MCA spectra (2-D).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    /// UTF-8 string
    Str(String),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(#[serde(with = "json_float")] f64),
    /// 1-D float array
    FloatArray(#[serde(with = "json_floats")] Vec<f64>),
    /// 1-D string array
    StrArray(Vec<String>),
}

impl AttrValue {
    /// String value, if this is a string
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value; floats with no fractional part convert too
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    /// Float value; integers convert too
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// String array; a lone string becomes a one-element array
    #[must_use]
    pub fn as_str_array(&self) -> Option<Vec<String>> {
        match self {
            Self::StrArray(v) => Some(v.clone()),
            Self::Str(s) => Some(vec![s.clone()]),
            _ => None,
        }
    }

    /// Float array; a lone number becomes a one-element array
    #[must_use]
    pub fn as_float_array(&self) -> Option<Vec<f64>> {
        match self {
            Self::FloatArray(v) => Some(v.clone()),
            other => other.as_float().map(|v| vec![v]),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(value: Vec<String>) -> Self {
        Self::StrArray(value)
    }
}

impl From<Vec<f64>> for AttrValue {
    fn from(value: Vec<f64>) -> Self {
        Self::FloatArray(value)
    }
}

/// Ordered attribute set
pub type Attributes = IndexMap<String, AttrValue>;

/// Numeric dataset
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NxDataset {
    /// Dimensions, outermost first
    pub shape: Vec<usize>,
    /// Row-major values; empty when read header-only
    #[serde(default, with = "json_floats")]
    pub values: Vec<f64>,
    /// Dataset attributes (units, ...)
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attrs: Attributes,
}

impl NxDataset {
    /// 1-D dataset
    #[must_use]
    pub fn vector(values: Vec<f64>) -> Self {
        Self {
            shape: vec![values.len()],
            values,
            attrs: Attributes::new(),
        }
    }

    /// 2-D dataset from row-major values
    #[must_use]
    pub fn matrix(rows: usize, cols: usize, values: Vec<f64>) -> Self {
        Self {
            shape: vec![rows, cols],
            values,
            attrs: Attributes::new(),
        }
    }

    /// Number of elements implied by the shape
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Whether values are loaded
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.values.len() == self.element_count()
    }

    /// Drop values, keep the shape
    pub fn strip_values(&mut self) {
        self.values = Vec::new();
    }
}

/// NeXus group
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NxGroup {
    /// NeXus base class, e.g. `NXentry`
    pub nx_class: String,
    /// Group attributes
    #[serde(default)]
    pub attrs: Attributes,
    /// Child groups by name
    #[serde(default)]
    pub groups: IndexMap<String, NxGroup>,
    /// Datasets by name
    #[serde(default)]
    pub datasets: IndexMap<String, NxDataset>,
}

impl NxGroup {
    /// Empty group of a class
    #[must_use]
    pub fn new(nx_class: impl Into<String>) -> Self {
        Self {
            nx_class: nx_class.into(),
            ..Self::default()
        }
    }

    /// Set an attribute, builder style
    #[must_use]
    pub fn with_attr(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    /// Set an attribute
    pub fn set_attr(&mut self, name: &str, value: impl Into<AttrValue>) {
        self.attrs.insert(name.to_string(), value.into());
    }

    /// Attribute by name
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    /// Child group by name
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&NxGroup> {
        self.groups.get(name)
    }

    /// Dataset by name
    #[must_use]
    pub fn dataset(&self, name: &str) -> Option<&NxDataset> {
        self.datasets.get(name)
    }

    /// Insert a child group, replacing any previous one
    pub fn insert_group(&mut self, name: &str, group: NxGroup) {
        self.groups.insert(name.to_string(), group);
    }

    /// Insert a dataset, replacing any previous one
    pub fn insert_dataset(&mut self, name: &str, dataset: NxDataset) {
        self.datasets.insert(name.to_string(), dataset);
    }

    /// Recursively drop dataset values
    pub fn strip_values(&mut self) {
        for dataset in self.datasets.values_mut() {
            dataset.strip_values();
        }
        for group in self.groups.values_mut() {
            group.strip_values();
        }
    }
}

/// Whole container: root attributes plus top-level entries
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NxFile {
    /// Root attributes
    #[serde(default)]
    pub attrs: Attributes,
    /// Top-level groups by name
    #[serde(default)]
    pub entries: IndexMap<String, NxGroup>,
}

impl NxFile {
    /// Empty container
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Top-level entry by name
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&NxGroup> {
        self.entries.get(name)
    }

    /// Merge attributes and upsert entries by name
    pub fn merge(&mut self, attrs: &Attributes, entries: &[(String, NxGroup)]) {
        for (k, v) in attrs {
            self.attrs.insert(k.clone(), v.clone());
        }
        for (name, group) in entries {
            self.entries.insert(name.clone(), group.clone());
        }
    }

    /// Recursively drop dataset values
    pub fn strip_values(&mut self) {
        for entry in self.entries.values_mut() {
            entry.strip_values();
        }
    }
}

/// JSON has no literal for NaN or infinities; those travel as strings.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum JsonFloat {
    Num(f64),
    Text(String),
}

impl JsonFloat {
    fn encode(value: f64) -> Self {
        if value.is_finite() {
            Self::Num(value)
        } else {
            Self::Text(value.to_string())
        }
    }

    fn decode<E: serde::de::Error>(self) -> Result<f64, E> {
        match self {
            Self::Num(v) => Ok(v),
            Self::Text(s) => s
                .parse()
                .map_err(|_| E::custom(format!("invalid float literal '{s}'"))),
        }
    }
}

mod json_float {
    use super::JsonFloat;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        JsonFloat::encode(*value).serialize(serializer)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        JsonFloat::deserialize(deserializer)?.decode()
    }
}

mod json_floats {
    use super::JsonFloat;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        values: &[f64],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|v| JsonFloat::encode(*v)))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<f64>, D::Error> {
        Vec::<JsonFloat>::deserialize(deserializer)?
            .into_iter()
            .map(JsonFloat::decode)
            .collect()
    }
}
