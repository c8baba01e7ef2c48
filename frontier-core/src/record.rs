//! Records of scalar metrics returned by learning updates.
use crate::error::FrontierError;
use std::collections::{
    hash_map::{IntoIter, Iter, Keys},
    HashMap,
};

/// Value in a [`Record`].
#[derive(Debug, Clone)]
pub enum RecordValue {
    /// Scalar metric, typically a loss.
    Scalar(f32),

    /// Text value.
    String(String),
}

/// Key-value pairs of metrics emitted by an update operation.
#[derive(Debug, Clone)]
pub struct Record(HashMap<String, RecordValue>);

impl Record {
    /// Creates an empty record.
    pub fn empty() -> Self {
        Self(HashMap::new())
    }

    /// Creates a record with a single scalar value.
    pub fn from_scalar(name: impl Into<String>, value: f32) -> Self {
        Self(HashMap::from([(name.into(), RecordValue::Scalar(value))]))
    }

    /// Creates a record from a slice of key-value pairs.
    pub fn from_slice<K: Into<String> + Clone>(s: &[(K, RecordValue)]) -> Self {
        Self(
            s.iter()
                .map(|(k, v)| (k.clone().into(), v.clone()))
                .collect(),
        )
    }

    /// Returns the keys of the record.
    pub fn keys(&self) -> Keys<'_, String, RecordValue> {
        self.0.keys()
    }

    /// Inserts a key-value pair.
    pub fn insert(&mut self, k: impl Into<String>, v: RecordValue) {
        self.0.insert(k.into(), v);
    }

    /// Returns an iterator over key-value pairs.
    pub fn iter(&self) -> Iter<'_, String, RecordValue> {
        self.0.iter()
    }

    /// Returns an iterator consuming the record.
    pub fn into_iter_in_record(self) -> IntoIter<String, RecordValue> {
        self.0.into_iter()
    }

    /// Gets the value for the given key.
    pub fn get(&self, k: &str) -> Option<&RecordValue> {
        self.0.get(k)
    }

    /// Merges records, the right-hand side winning on key collisions.
    pub fn merge(self, record: Record) -> Self {
        Record(self.0.into_iter().chain(record.0).collect())
    }

    /// Merges another record into this one in place.
    pub fn merge_inplace(&mut self, record: Record) {
        for (k, v) in record.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Returns `true` if the record has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Gets a scalar value for the given key.
    pub fn get_scalar(&self, k: &str) -> Result<f32, FrontierError> {
        if let Some(v) = self.0.get(k) {
            match v {
                RecordValue::Scalar(v) => Ok(*v),
                _ => Err(FrontierError::RecordValueTypeError("Scalar".to_string())),
            }
        } else {
            Err(FrontierError::RecordKeyError(k.to_string()))
        }
    }

    /// Gets a string value for the given key.
    pub fn get_string(&self, k: &str) -> Result<String, FrontierError> {
        if let Some(v) = self.0.get(k) {
            match v {
                RecordValue::String(s) => Ok(s.clone()),
                _ => Err(FrontierError::RecordValueTypeError("String".to_string())),
            }
        } else {
            Err(FrontierError::RecordKeyError(k.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Record, RecordValue};

    #[test]
    fn test_scalar_access() {
        let mut record = Record::from_scalar("loss", 0.5);
        record.insert("algo", RecordValue::String("dqn".to_string()));

        assert_eq!(record.get_scalar("loss").unwrap(), 0.5);
        assert_eq!(record.get_string("algo").unwrap(), "dqn");
        assert!(record.get_scalar("algo").is_err());
        assert!(record.get_scalar("missing").is_err());
    }

    #[test]
    fn test_merge_overwrites() {
        let r1 = Record::from_slice(&[
            ("critic_loss", RecordValue::Scalar(1.0)),
            ("actor_loss", RecordValue::Scalar(2.0)),
        ]);
        let r2 = Record::from_scalar("critic_loss", 3.0);
        let merged = r1.merge(r2);

        assert_eq!(merged.get_scalar("critic_loss").unwrap(), 3.0);
        assert_eq!(merged.get_scalar("actor_loss").unwrap(), 2.0);
    }
}
