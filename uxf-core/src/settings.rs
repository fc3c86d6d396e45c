use crate::error::SettingsError;
use lazy_static::lazy_static;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

lazy_static! {
    static ref EMPTY: Arc<Settings> = Arc::new(Settings::default());
}

/// Ordered key/value configuration bag.
///
/// Sessions hold their settings behind an `Arc` and never mutate them;
/// blocks and trials own a private instance that callers may fill in
/// before the trial runs. Lookups that should fall back through the
/// trial → block → session chain go through `Session::trial_setting`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings {
    values: Map<String, Value>,
}

impl Settings {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Shared placeholder used when a session begins without settings.
    pub fn empty() -> Arc<Settings> {
        Arc::clone(&EMPTY)
    }

    /// Reads settings from a file holding a single JSON object.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, SettingsError> {
        match serde_json::from_str(text)? {
            Value::Object(values) => Ok(Self { values }),
            _ => Err(SettingsError::NotAnObject),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    /// Underlying mapping, in insertion order.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn get_str(&self, key: &str) -> Result<&str, SettingsError> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| wrong_type(key, "string"))
    }

    pub fn get_i64(&self, key: &str) -> Result<i64, SettingsError> {
        self.require(key)?
            .as_i64()
            .ok_or_else(|| wrong_type(key, "integer"))
    }

    pub fn get_f64(&self, key: &str) -> Result<f64, SettingsError> {
        self.require(key)?
            .as_f64()
            .ok_or_else(|| wrong_type(key, "number"))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, SettingsError> {
        self.require(key)?
            .as_bool()
            .ok_or_else(|| wrong_type(key, "boolean"))
    }

    /// Deserializes a setting into any serde type (lists, nested objects, ...).
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, SettingsError> {
        let value = self.require(key)?.clone();
        serde_json::from_value(value).map_err(SettingsError::from)
    }

    fn require(&self, key: &str) -> Result<&Value, SettingsError> {
        self.values
            .get(key)
            .ok_or_else(|| SettingsError::Missing(key.to_string()))
    }
}

impl From<Map<String, Value>> for Settings {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

fn wrong_type(key: &str, expected: &'static str) -> SettingsError {
    SettingsError::WrongType {
        key: key.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn empty_placeholder_is_shared() {
        let a = Settings::empty();
        let b = Settings::empty();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_empty());
    }

    #[test]
    fn keeps_insertion_order() {
        let mut s = Settings::default();
        s.set("zeta", 1);
        s.set("alpha", 2);
        s.set("mid", 3);
        let keys: Vec<_> = s.keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn typed_getters() {
        let mut s = Settings::default();
        s.set("name", "stroop");
        s.set("n", 12);
        s.set("ratio", 0.5);
        s.set("practice", true);
        s.set("sizes", json!([1, 2, 3]));

        assert_eq!(s.get_str("name").unwrap(), "stroop");
        assert_eq!(s.get_i64("n").unwrap(), 12);
        assert_eq!(s.get_f64("ratio").unwrap(), 0.5);
        assert!(s.get_bool("practice").unwrap());
        assert_eq!(s.get_as::<Vec<u32>>("sizes").unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn getter_errors() {
        let mut s = Settings::default();
        s.set("n", "twelve");
        assert!(matches!(s.get_i64("missing"), Err(SettingsError::Missing(_))));
        assert!(matches!(
            s.get_i64("n"),
            Err(SettingsError::WrongType { expected: "integer", .. })
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"trials": 4, "colour": "red"}}"#).unwrap();
        let s = Settings::from_json_file(file.path()).unwrap();
        assert_eq!(s.get_i64("trials").unwrap(), 4);
        assert_eq!(s.get_str("colour").unwrap(), "red");
    }

    #[test]
    fn rejects_non_object_json() {
        assert!(matches!(
            Settings::from_json_str("[1, 2]"),
            Err(SettingsError::NotAnObject)
        ));
    }
}
