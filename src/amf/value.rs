//! AMF value types
//!
//! Command arguments and stream metadata are carried as AMF0 values. Object
//! properties keep their insertion order: servers and the metadata consumers
//! behind them read keys in the order the client wrote them.

use std::slice;

/// AMF0 type markers
pub mod marker {
    pub const NUMBER: u8 = 0x00;
    pub const BOOLEAN: u8 = 0x01;
    pub const STRING: u8 = 0x02;
    pub const OBJECT: u8 = 0x03;
    pub const NULL: u8 = 0x05;
    pub const UNDEFINED: u8 = 0x06;
    pub const ECMA_ARRAY: u8 = 0x08;
    pub const OBJECT_END: u8 = 0x09;
    pub const STRICT_ARRAY: u8 = 0x0A;
    pub const LONG_STRING: u8 = 0x0C;
}

/// Longest string that fits the 16-bit length prefix
pub const MAX_SHORT_STRING: usize = 0xFFFF;

/// AMF value
#[derive(Debug, Clone, PartialEq)]
pub enum AmfValue {
    /// IEEE 754 double (0x00)
    Number(f64),

    /// Boolean (0x01)
    Boolean(bool),

    /// UTF-8 string (0x02, or 0x0C past 64 KiB)
    String(String),

    /// Key-value object (0x03)
    Object(AmfObject),

    /// Null (0x05)
    Null,

    /// Undefined (0x06)
    Undefined,

    /// Associative array (0x08)
    EcmaArray(AmfObject),

    /// Dense array (0x0A)
    StrictArray(Vec<AmfValue>),
}

impl AmfValue {
    /// The one-byte type marker written before the body
    pub fn marker(&self) -> u8 {
        match self {
            AmfValue::Number(_) => marker::NUMBER,
            AmfValue::Boolean(_) => marker::BOOLEAN,
            AmfValue::String(s) if s.len() > MAX_SHORT_STRING => marker::LONG_STRING,
            AmfValue::String(_) => marker::STRING,
            AmfValue::Object(_) => marker::OBJECT,
            AmfValue::Null => marker::NULL,
            AmfValue::Undefined => marker::UNDEFINED,
            AmfValue::EcmaArray(_) => marker::ECMA_ARRAY,
            AmfValue::StrictArray(_) => marker::STRICT_ARRAY,
        }
    }

    /// Encoded body size in bytes, excluding the type marker.
    ///
    /// Length prefixes are part of the body: `String("AB")` has size 4.
    /// Framing code that writes content lengths relies on this exact count.
    pub fn size(&self) -> usize {
        match self {
            AmfValue::Number(_) => 8,
            AmfValue::Boolean(_) => 1,
            AmfValue::String(s) if s.len() > MAX_SHORT_STRING => 4 + s.len(),
            AmfValue::String(s) => 2 + s.len(),
            AmfValue::Object(obj) => obj.properties_size(),
            AmfValue::Null | AmfValue::Undefined => 0,
            AmfValue::EcmaArray(obj) => 4 + obj.properties_size(),
            AmfValue::StrictArray(items) => 4 + items.iter().map(|v| 1 + v.size()).sum::<usize>(),
        }
    }

    /// Try to get this value as a string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AmfValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AmfValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Try to get this value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AmfValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get this value as an object (objects and ECMA arrays)
    pub fn as_object(&self) -> Option<&AmfObject> {
        match self {
            AmfValue::Object(m) | AmfValue::EcmaArray(m) => Some(m),
            _ => None,
        }
    }

    /// Try to get this value as an array reference
    pub fn as_array(&self) -> Option<&[AmfValue]> {
        match self {
            AmfValue::StrictArray(a) => Some(a),
            _ => None,
        }
    }

    /// Check if this value is null or undefined
    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, AmfValue::Null | AmfValue::Undefined)
    }

    /// Get a property from an object value
    pub fn get(&self, key: &str) -> Option<&AmfValue> {
        self.as_object()?.get(key)
    }

    /// Get a string property from an object value
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    /// Get a number property from an object value
    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_number()
    }
}

impl Default for AmfValue {
    fn default() -> Self {
        AmfValue::Null
    }
}

impl From<bool> for AmfValue {
    fn from(v: bool) -> Self {
        AmfValue::Boolean(v)
    }
}

impl From<f64> for AmfValue {
    fn from(v: f64) -> Self {
        AmfValue::Number(v)
    }
}

impl From<u32> for AmfValue {
    fn from(v: u32) -> Self {
        AmfValue::Number(v as f64)
    }
}

impl From<String> for AmfValue {
    fn from(v: String) -> Self {
        AmfValue::String(v)
    }
}

impl From<&str> for AmfValue {
    fn from(v: &str) -> Self {
        AmfValue::String(v.to_string())
    }
}

impl From<AmfObject> for AmfValue {
    fn from(v: AmfObject) -> Self {
        AmfValue::Object(v)
    }
}

impl<V: Into<AmfValue>> From<Vec<V>> for AmfValue {
    fn from(v: Vec<V>) -> Self {
        AmfValue::StrictArray(v.into_iter().map(Into::into).collect())
    }
}

/// Insertion-ordered string-keyed property list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AmfObject {
    properties: Vec<(String, AmfValue)>,
}

impl AmfObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property. An existing key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AmfValue>) {
        let key = key.into();
        let value = value.into();
        match self.properties.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.properties.push((key, value)),
        }
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AmfValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&AmfValue> {
        self.properties.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<AmfValue> {
        let index = self.properties.iter().position(|(k, _)| k == key)?;
        Some(self.properties.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn clear(&mut self) {
        self.properties.clear();
    }

    pub fn iter(&self) -> slice::Iter<'_, (String, AmfValue)> {
        self.properties.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|(k, _)| k.as_str())
    }

    /// Body size of the property list including the 3-byte end marker
    fn properties_size(&self) -> usize {
        self.properties
            .iter()
            .map(|(k, v)| 2 + k.len().min(MAX_SHORT_STRING) + 1 + v.size())
            .sum::<usize>()
            + 3
    }
}

impl<'a> IntoIterator for &'a AmfObject {
    type Item = &'a (String, AmfValue);
    type IntoIter = slice::Iter<'a, (String, AmfValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.properties.iter()
    }
}

impl<K: Into<String>, V: Into<AmfValue>> FromIterator<(K, V)> for AmfObject {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut obj = AmfObject::new();
        for (k, v) in iter {
            obj.insert(k, v);
        }
        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        let s = AmfValue::String("test".into());
        assert_eq!(s.as_str(), Some("test"));
        assert_eq!(s.as_number(), None);

        let n = AmfValue::Number(42.0);
        assert_eq!(n.as_number(), Some(42.0));
        assert_eq!(n.as_str(), None);

        let o = AmfValue::Object(AmfObject::new().with("key", "value"));
        assert_eq!(o.get_string("key"), Some("value"));
        assert_eq!(o.get_number("key"), None);
        assert!(AmfValue::Null.get("key").is_none());
    }

    #[test]
    fn test_string_size_excludes_marker() {
        let v = AmfValue::String("AB".into());
        assert_eq!(v.size(), 4);
        assert_eq!(v.marker(), marker::STRING);

        assert_eq!(AmfValue::String(String::new()).size(), 2);
    }

    #[test]
    fn test_scalar_sizes() {
        assert_eq!(AmfValue::Number(1.0).size(), 8);
        assert_eq!(AmfValue::Boolean(true).size(), 1);
        assert_eq!(AmfValue::Null.size(), 0);
        assert_eq!(AmfValue::Undefined.size(), 0);
    }

    #[test]
    fn test_container_sizes() {
        // key(2+1) + marker(1) + number(8) + end(3)
        let obj = AmfValue::Object(AmfObject::new().with("a", 1.0));
        assert_eq!(obj.size(), 15);

        // count(4) + same properties
        let ecma = AmfValue::EcmaArray(AmfObject::new().with("a", 1.0));
        assert_eq!(ecma.size(), 19);

        // count(4) + (1 + 1) + (1 + 4)
        let arr = AmfValue::StrictArray(vec![AmfValue::Boolean(false), AmfValue::from("AB")]);
        assert_eq!(arr.size(), 11);
    }

    #[test]
    fn test_long_string_marker() {
        let v = AmfValue::String("x".repeat(MAX_SHORT_STRING + 1));
        assert_eq!(v.marker(), marker::LONG_STRING);
        assert_eq!(v.size(), 4 + MAX_SHORT_STRING + 1);
    }

    #[test]
    fn test_object_preserves_insertion_order() {
        let mut obj = AmfObject::new();
        obj.insert("width", 1280.0);
        obj.insert("height", 720.0);
        obj.insert("framerate", 30.0);
        obj.insert("width", 1920.0);

        let keys: Vec<&str> = obj.keys().collect();
        assert_eq!(keys, vec!["width", "height", "framerate"]);
        assert_eq!(obj.get("width"), Some(&AmfValue::Number(1920.0)));
        assert_eq!(obj.len(), 3);
    }

    #[test]
    fn test_object_remove_and_clear() {
        let mut obj: AmfObject = vec![("a", 1.0), ("b", 2.0)].into_iter().collect();
        assert_eq!(obj.remove("a"), Some(AmfValue::Number(1.0)));
        assert!(!obj.contains_key("a"));
        assert_eq!(obj.remove("a"), None);

        obj.clear();
        assert!(obj.is_empty());
    }

    #[test]
    fn test_from_conversions() {
        let v: AmfValue = "test".into();
        assert!(matches!(v, AmfValue::String(_)));

        let v: AmfValue = 42.0.into();
        assert!(matches!(v, AmfValue::Number(_)));

        let v: AmfValue = true.into();
        assert!(matches!(v, AmfValue::Boolean(true)));

        let v: AmfValue = 7u32.into();
        assert_eq!(v, AmfValue::Number(7.0));

        let v: AmfValue = vec![1.0, 2.0].into();
        assert_eq!(v.as_array().map(|a| a.len()), Some(2));
    }

    #[test]
    fn test_ecma_array_reads_as_object() {
        let ecma = AmfValue::EcmaArray(AmfObject::new().with("duration", 0.0));
        assert!(ecma.as_object().is_some());
        assert_eq!(ecma.get_number("duration"), Some(0.0));
    }

    #[test]
    fn test_is_null_or_undefined() {
        assert!(AmfValue::Null.is_null_or_undefined());
        assert!(AmfValue::Undefined.is_null_or_undefined());
        assert!(!AmfValue::Boolean(false).is_null_or_undefined());
        assert!(!AmfValue::String(String::new()).is_null_or_undefined());
        assert_eq!(AmfValue::default(), AmfValue::Null);
    }
}
