//! Class index persistence
//!
//! The index → class-name mapping is written next to the trained model as
//! `class_indices.json`, a JSON object keyed by stringified indices:
//!
//! ```json
//! { "0": "daisy", "1": "roses", "2": "tulips" }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::info;

use crate::utils::error::{Result, ResultExt, TransferError};

/// File name used for the persisted class index
pub const CLASS_INDEX_FILE: &str = "class_indices.json";

/// Ordered mapping from label index to class name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassIndex {
    names: Vec<String>,
}

impl ClassIndex {
    /// Build from names already in label order
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Class name for a label
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(|s| s.as_str())
    }

    /// Label for a class name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Write `class_indices.json` into a directory
    pub fn save_to_dir(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        self.save(&dir.join(CLASS_INDEX_FILE))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!("Class index saved to {:?}", path);
        Ok(())
    }

    /// Load and validate a class index file.
    ///
    /// Keys must be the integers `0..n` with no gaps.
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).with_context(|| format!("Failed to read class index {:?}", path))?;
        let raw: BTreeMap<String, String> = serde_json::from_str(&json)?;

        let mut indexed = BTreeMap::new();
        for (key, name) in raw {
            let index: usize = key.parse().map_err(|_| {
                TransferError::Serialization(format!(
                    "class index key '{}' in {:?} is not an integer",
                    key, path
                ))
            })?;
            indexed.insert(index, name);
        }

        for (expected, &actual) in indexed.keys().enumerate() {
            if expected != actual {
                return Err(TransferError::Serialization(format!(
                    "class indices in {:?} are not contiguous: missing index {}",
                    path, expected
                )));
            }
        }

        Ok(Self::new(indexed.into_values().collect()))
    }
}

impl Serialize for ClassIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        // numeric key order, not lexicographic ("10" after "9")
        let mut map = serializer.serialize_map(Some(self.names.len()))?;
        for (index, name) in self.names.iter().enumerate() {
            map.serialize_entry(&index.to_string(), name)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("class_{:02}", i)).collect()
    }

    #[test]
    fn test_json_shape() {
        let index = ClassIndex::new(vec!["cat".to_string(), "dog".to_string()]);
        let json = serde_json::to_string(&index).unwrap();
        assert_eq!(json, r#"{"0":"cat","1":"dog"}"#);
    }

    #[test]
    fn test_keys_written_in_numeric_order() {
        let index = ClassIndex::new(names(12));
        let json = serde_json::to_string(&index).unwrap();
        let pos_9 = json.find("\"9\"").unwrap();
        let pos_10 = json.find("\"10\"").unwrap();
        assert!(pos_9 < pos_10);
    }

    #[test]
    fn test_lookup() {
        let index = ClassIndex::new(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(index.name(1), Some("b"));
        assert_eq!(index.name(2), None);
        assert_eq!(index.index_of("a"), Some(0));
    }

    #[test]
    fn test_load_rejects_gaps() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CLASS_INDEX_FILE);
        fs::write(&path, r#"{"0":"a","2":"c"}"#).unwrap();
        assert!(ClassIndex::load(&path).is_err());
    }

    #[test]
    fn test_load_rejects_non_integer_keys() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CLASS_INDEX_FILE);
        fs::write(&path, r#"{"zero":"a"}"#).unwrap();
        assert!(matches!(
            ClassIndex::load(&path),
            Err(TransferError::Serialization(_))
        ));
    }

    #[test]
    fn test_save_load_twelve_classes() {
        let tmp = TempDir::new().unwrap();
        let index = ClassIndex::new(names(12));
        index.save_to_dir(tmp.path()).unwrap();

        let loaded = ClassIndex::load(&tmp.path().join(CLASS_INDEX_FILE)).unwrap();
        assert_eq!(loaded, index);
    }
}
