//! Self-describing container files.
//!
//! A container is a JSON document holding a tree of groups. Each group has:
//!
//! - `attrs`: scalar attributes (float / int / bool / text / `empty`)
//! - `datasets`: typed n-dimensional arrays (row-major, with a shape)
//! - `groups`: named child groups
//!
//! `empty` is the explicit "unset" sentinel. Readers decode it (and absent or
//! wrongly typed keys) to `None`; they never substitute zero or "".
//!
//! Non-finite floats are written as `null` and read back as NaN. Finite floats
//! round-trip bit-for-bit (`serde_json` with `float_roundtrip`).
//!
//! Saving is additive: [`save_merged`] reads the file already on disk, merges
//! the new tree into it with [`Group::merge`], and replaces the file
//! atomically. Keys the new tree does not mention survive, and `empty`
//! attributes never overwrite a stored value.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::AppError;

/// Format tag written at the top of every container.
pub const CONTAINER_FORMAT: &str = "betata-container";
pub const CONTAINER_VERSION: u32 = 1;

mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        if v.is_finite() {
            s.serialize_f64(*v)
        } else {
            s.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::NAN))
    }
}

mod nan_vec_as_null {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde::ser::SerializeSeq;

    pub fn serialize<S: Serializer>(v: &[f64], s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(v.len()))?;
        for x in v {
            if x.is_finite() {
                seq.serialize_element(x)?;
            } else {
                seq.serialize_element(&Option::<f64>::None)?;
            }
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<f64>, D::Error> {
        let raw = Vec::<Option<f64>>::deserialize(d)?;
        Ok(raw.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}

/// Scalar attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttrValue {
    Float(#[serde(with = "nan_as_null")] f64),
    Int(i64),
    Bool(bool),
    Text(String),
    /// Explicitly unset.
    Empty,
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Text(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Text(v)
    }
}

impl<T: Into<AttrValue>> From<Option<T>> for AttrValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(AttrValue::Empty, Into::into)
    }
}

/// Typed dataset payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "data", rename_all = "lowercase")]
pub enum DatasetValues {
    F64(#[serde(with = "nan_vec_as_null")] Vec<f64>),
    I64(Vec<i64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
}

impl DatasetValues {
    pub fn len(&self) -> usize {
        match self {
            DatasetValues::F64(v) => v.len(),
            DatasetValues::I64(v) => v.len(),
            DatasetValues::Bool(v) => v.len(),
            DatasetValues::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Row-major array with an explicit shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub shape: Vec<usize>,
    pub values: DatasetValues,
}

impl Dataset {
    /// One-dimensional dataset.
    pub fn vector(values: DatasetValues) -> Self {
        Self {
            shape: vec![values.len()],
            values,
        }
    }

    /// Two-dimensional `rows x cols` float dataset.
    pub fn matrix(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, AppError> {
        if rows * cols != data.len() {
            return Err(AppError::new(
                4,
                format!("Dataset shape {rows}x{cols} does not match {} values.", data.len()),
            ));
        }
        Ok(Self {
            shape: vec![rows, cols],
            values: DatasetValues::F64(data),
        })
    }

    /// Float view (integers are widened).
    pub fn as_f64(&self) -> Option<Vec<f64>> {
        match &self.values {
            DatasetValues::F64(v) => Some(v.clone()),
            DatasetValues::I64(v) => Some(v.iter().map(|x| *x as f64).collect()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<Vec<i64>> {
        match &self.values {
            DatasetValues::I64(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// Booleans; integer datasets are read as `!= 0`.
    pub fn as_bool(&self) -> Option<Vec<bool>> {
        match &self.values {
            DatasetValues::Bool(v) => Some(v.clone()),
            DatasetValues::I64(v) => Some(v.iter().map(|x| *x != 0).collect()),
            _ => None,
        }
    }

    /// Rows of a two-dimensional float dataset.
    pub fn rows(&self) -> Option<Vec<Vec<f64>>> {
        let [rows, cols] = self.shape.as_slice() else {
            return None;
        };
        let flat = self.as_f64()?;
        if flat.len() != rows * cols {
            return None;
        }
        Some(flat.chunks((*cols).max(1)).map(<[f64]>::to_vec).collect())
    }
}

/// A node of the container tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, AttrValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub datasets: BTreeMap<String, Dataset>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub groups: BTreeMap<String, Group>,
}

impl Group {
    pub fn set_attr(&mut self, key: &str, value: impl Into<AttrValue>) {
        self.attrs.insert(key.to_string(), value.into());
    }

    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        match self.attrs.get(key) {
            Some(AttrValue::Empty) | None => None,
            Some(v) => Some(v),
        }
    }

    /// Float attribute; integers are widened, anything else is unset.
    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        match self.attr(key)? {
            AttrValue::Float(v) => Some(*v),
            AttrValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn attr_i64(&self, key: &str) -> Option<i64> {
        match self.attr(key)? {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn attr_bool(&self, key: &str) -> Option<bool> {
        match self.attr(key)? {
            AttrValue::Bool(v) => Some(*v),
            AttrValue::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        match self.attr(key)? {
            AttrValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn set_dataset(&mut self, key: &str, dataset: Dataset) {
        self.datasets.insert(key.to_string(), dataset);
    }

    pub fn set_f64s(&mut self, key: &str, values: Vec<f64>) {
        self.set_dataset(key, Dataset::vector(DatasetValues::F64(values)));
    }

    pub fn set_i64s(&mut self, key: &str, values: Vec<i64>) {
        self.set_dataset(key, Dataset::vector(DatasetValues::I64(values)));
    }

    pub fn set_bools(&mut self, key: &str, values: Vec<bool>) {
        self.set_dataset(key, Dataset::vector(DatasetValues::Bool(values)));
    }

    pub fn dataset(&self, key: &str) -> Option<&Dataset> {
        self.datasets.get(key)
    }

    pub fn f64s(&self, key: &str) -> Option<Vec<f64>> {
        self.dataset(key)?.as_f64()
    }

    pub fn i64s(&self, key: &str) -> Option<Vec<i64>> {
        self.dataset(key)?.as_i64()
    }

    pub fn bools(&self, key: &str) -> Option<Vec<bool>> {
        self.dataset(key)?.as_bool()
    }

    pub fn group(&self, key: &str) -> Option<&Group> {
        self.groups.get(key)
    }

    /// Child group, created if missing.
    pub fn require_group(&mut self, key: &str) -> &mut Group {
        self.groups.entry(key.to_string()).or_default()
    }

    /// Merge `incoming` into `self`.
    ///
    /// - attributes: incoming values replace stored ones, except `empty`,
    ///   which only fills keys that are not stored yet
    /// - datasets: incoming datasets replace stored ones
    /// - groups: merged recursively
    ///
    /// Keys absent from `incoming` are left untouched.
    pub fn merge(&mut self, incoming: Group) {
        for (key, value) in incoming.attrs {
            match value {
                AttrValue::Empty => {
                    self.attrs.entry(key).or_insert(AttrValue::Empty);
                }
                v => {
                    self.attrs.insert(key, v);
                }
            }
        }
        self.datasets.extend(incoming.datasets);
        for (key, group) in incoming.groups {
            self.groups.entry(key).or_default().merge(group);
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ContainerFile {
    format: String,
    version: u32,
    root: Group,
}

/// Read a container file.
pub fn read_container(path: &Path) -> Result<Group, AppError> {
    let file = File::open(path).map_err(|e| AppError::file(path, "open container", e))?;
    let parsed: ContainerFile = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::file(path, "parse container", e))?;
    if parsed.format != CONTAINER_FORMAT {
        return Err(AppError::new(
            2,
            format!(
                "'{}' is not a container file (format tag `{}`).",
                path.display(),
                parsed.format
            ),
        ));
    }
    if parsed.version > CONTAINER_VERSION {
        log::warn!(
            "'{}' has container version {}; newer than supported {}.",
            path.display(),
            parsed.version,
            CONTAINER_VERSION
        );
    }
    Ok(parsed.root)
}

/// Read a container file, or an empty tree if the file does not exist yet.
pub fn read_container_or_default(path: &Path) -> Result<Group, AppError> {
    if path.exists() {
        read_container(path)
    } else {
        Ok(Group::default())
    }
}

/// Replace `path` with `root`, atomically (temp file in the same directory,
/// then rename).
pub fn write_container(path: &Path, root: &Group) -> Result<(), AppError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| AppError::file(dir, "create directory", e))?;

    let tmp = NamedTempFile::new_in(dir).map_err(|e| AppError::file(dir, "create temp file in", e))?;
    let doc = ContainerFile {
        format: CONTAINER_FORMAT.to_string(),
        version: CONTAINER_VERSION,
        root: root.clone(),
    };
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut writer, &doc)
            .map_err(|e| AppError::file(path, "serialize container", e))?;
        writer.flush().map_err(|e| AppError::file(path, "write container", e))?;
    }
    tmp.persist(path)
        .map_err(|e| AppError::file(path, "replace container", e.error))?;
    Ok(())
}

/// Read-modify-write: merge `incoming` into whatever is stored at `path`.
pub fn save_merged(path: &Path, incoming: Group) -> Result<(), AppError> {
    let mut root = read_container_or_default(path)?;
    root.merge(incoming);
    write_container(path, &root)?;
    log::debug!("Saved container '{}'.", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_absent_decode_to_none() {
        let mut g = Group::default();
        g.set_attr("x", AttrValue::Empty);
        g.set_attr("s", "hello");
        assert_eq!(g.attr_f64("x"), None);
        assert_eq!(g.attr_f64("missing"), None);
        // Wrongly typed (legacy) fields are unset, not zero.
        assert_eq!(g.attr_f64("s"), None);
        assert_eq!(g.attr_str("s"), Some("hello"));
    }

    #[test]
    fn round_trip_is_bit_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.json");

        let tricky = [0.1 + 0.2, 1e-300, -0.0, 6.02214076e23, 4.687_123_456_789e9];
        let mut root = Group::default();
        for (i, v) in tricky.iter().enumerate() {
            root.set_attr(&format!("v{i}"), *v);
        }
        root.set_attr("unset", AttrValue::Empty);
        root.set_attr("nan", f64::NAN);
        root.set_attr("n", 42i64);
        root.set_attr("flag", true);
        root.require_group("t1").set_f64s("t1", vec![1.5e-5, f64::INFINITY, 2.25e-5]);
        root.require_group("t1").set_i64s("t1_trace_id", vec![0, 1, 2]);

        write_container(&path, &root).unwrap();
        let back = read_container(&path).unwrap();

        for (i, v) in tricky.iter().enumerate() {
            let got = back.attr_f64(&format!("v{i}")).unwrap();
            assert_eq!(got.to_bits(), v.to_bits());
        }
        assert_eq!(back.attr_f64("unset"), None);
        assert!(back.attr_f64("nan").unwrap().is_nan());
        assert_eq!(back.attr_i64("n"), Some(42));
        assert_eq!(back.attr_bool("flag"), Some(true));
        let t1 = back.group("t1").unwrap().f64s("t1").unwrap();
        assert_eq!(t1[0].to_bits(), 1.5e-5f64.to_bits());
        assert!(t1[1].is_nan());
        assert_eq!(back.group("t1").unwrap().i64s("t1_trace_id"), Some(vec![0, 1, 2]));
    }

    #[test]
    fn save_is_additive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.json");

        let mut first = Group::default();
        first.set_attr("X", 1.0);
        first.set_attr("Y", 2.0);
        save_merged(&path, first).unwrap();

        let mut second = Group::default();
        second.set_attr("X", 5.0);
        second.set_attr("Y", AttrValue::Empty);
        second.set_attr("Z", AttrValue::Empty);
        save_merged(&path, second.clone()).unwrap();

        let back = read_container(&path).unwrap();
        assert_eq!(back.attr_f64("X"), Some(5.0));
        assert_eq!(back.attr_f64("Y"), Some(2.0));
        assert_eq!(back.attr_f64("Z"), None);

        // Saving the same record again changes nothing.
        save_merged(&path, second).unwrap();
        assert_eq!(read_container(&path).unwrap(), back);
    }

    #[test]
    fn unknown_groups_survive_merge() {
        let mut stored = Group::default();
        stored.require_group("custom").set_attr("note", "keep me");
        let mut incoming = Group::default();
        incoming.require_group("t1").set_f64s("t1", vec![1.0]);
        stored.merge(incoming);
        assert_eq!(stored.group("custom").unwrap().attr_str("note"), Some("keep me"));
        assert!(stored.group("t1").is_some());
    }

    #[test]
    fn matrix_rows() {
        let d = Dataset::matrix(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let rows = d.rows().unwrap();
        assert_eq!(rows, vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        assert!(Dataset::matrix(2, 2, vec![1.0]).is_err());
    }

    #[test]
    fn rejects_foreign_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.json");
        std::fs::write(&path, r#"{"format":"something-else","version":1,"root":{}}"#).unwrap();
        assert_eq!(read_container(&path).unwrap_err().exit_code(), 2);
    }
}
