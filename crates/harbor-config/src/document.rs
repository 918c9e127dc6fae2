//! The structured configuration document.
//!
//! A [`StructuredConfig`] is an untyped tree (objects, arrays, scalars)
//! addressed by dotted paths such as `"data.caches"`. Typed sub-configs are
//! bound from a sub-tree on demand with [`StructuredConfig::decode`], so a
//! malformed section only fails the caller that asks for it.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::Path;

use crate::ConfigError;

/// Hierarchical configuration document.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredConfig {
    root: Value,
}

impl Default for StructuredConfig {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Value> for StructuredConfig {
    fn from(root: Value) -> Self {
        Self::new(root)
    }
}

impl StructuredConfig {
    /// Wraps a JSON value. Non-object roots are replaced by an empty object.
    #[must_use]
    pub fn new(root: Value) -> Self {
        match root {
            Value::Object(_) => Self { root },
            _ => Self::empty(),
        }
    }

    /// An empty document.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    /// Parses a document in the given format (`toml` or `json`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on parse failure or unknown format.
    pub fn parse(content: &str, format: &str) -> Result<Self, ConfigError> {
        let root: Value = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        Ok(Self::new(root))
    }

    /// Parses a file, picking the format from its extension.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file is missing, unreadable or malformed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))?;
        Self::parse(&content, &format)
    }

    /// Returns the root value.
    #[must_use]
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Consumes the document and returns the root value.
    #[must_use]
    pub fn into_inner(self) -> Value {
        self.root
    }

    /// Returns the value at a dotted path. The empty path is the root.
    #[must_use]
    pub fn value(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return Some(&self.root);
        }
        path.split('.').try_fold(&self.root, |node, segment| match node {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Returns `true` when a non-null value exists at `path`.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.value(path).is_some_and(|v| !v.is_null())
    }

    /// Binds the sub-tree at `path` to `T`. Absent or null sub-trees yield `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Decode`] if the sub-tree does not fit `T`.
    pub fn decode<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ConfigError> {
        match self.value(path) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::deserialize(value)
                .map(Some)
                .map_err(|e| ConfigError::decode(path, e)),
        }
    }

    /// Like [`decode`](Self::decode), defaulting absent sub-trees.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Decode`] if the sub-tree does not fit `T`.
    pub fn decode_or_default<T: DeserializeOwned + Default>(
        &self,
        path: &str,
    ) -> Result<T, ConfigError> {
        self.decode(path).map(Option::unwrap_or_default)
    }

    /// Binds the sub-tree at the first present path among `paths`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Decode`] if the chosen sub-tree does not fit `T`.
    pub fn decode_first<T: DeserializeOwned>(
        &self,
        paths: &[&str],
    ) -> Result<Option<T>, ConfigError> {
        match paths.iter().find(|p| self.contains(p)) {
            Some(path) => self.decode(path),
            None => Ok(None),
        }
    }

    /// Sets the value at a dotted path, creating intermediate objects.
    ///
    /// Numeric segments index into existing arrays; an index equal to the
    /// array length appends.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a segment traverses a scalar
    /// or an array index is out of bounds.
    pub fn set(&mut self, path: &str, value: Value) -> Result<(), ConfigError> {
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        let Some((last, parents)) = segments.split_last() else {
            self.root = value;
            return Ok(());
        };

        let mut node = &mut self.root;
        for segment in parents {
            node = child_mut(node, segment, path)?;
        }

        match node {
            Value::Object(map) => {
                map.insert((*last).to_string(), value);
                Ok(())
            }
            Value::Array(items) => {
                let index = parse_index(last, items.len(), path)?;
                if index == items.len() {
                    items.push(value);
                } else {
                    items[index] = value;
                }
                Ok(())
            }
            _ => Err(ConfigError::invalid_value(path, "parent is not a table")),
        }
    }

    /// Deep-merges `other` on top of this document. Objects merge key by
    /// key; any other value in `other` replaces the existing one.
    pub fn merge(&mut self, other: Self) {
        merge_values(&mut self.root, other.root);
    }
}

fn parse_index(segment: &str, len: usize, path: &str) -> Result<usize, ConfigError> {
    let index: usize = segment
        .parse()
        .map_err(|_| ConfigError::invalid_value(path, format!("'{segment}' is not an index")))?;
    if index > len {
        return Err(ConfigError::invalid_value(
            path,
            format!("index {index} out of bounds (len {len})"),
        ));
    }
    Ok(index)
}

fn child_mut<'a>(
    node: &'a mut Value,
    segment: &str,
    path: &str,
) -> Result<&'a mut Value, ConfigError> {
    if node.is_null() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => Ok(map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()))),
        Value::Array(items) => {
            let index = parse_index(segment, items.len(), path)?;
            if index == items.len() {
                items.push(Value::Object(Map::new()));
            }
            Ok(&mut items[index])
        }
        _ => Err(ConfigError::invalid_value(path, "parent is not a table")),
    }
}

pub(crate) fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
