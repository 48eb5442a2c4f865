//! Object identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Namespace + name of a watched object.
///
/// Two updates to the same object always produce the same key, which is what
/// the work queue deduplicates on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key {
    pub namespace: String,
    pub name: String,
}

impl Key {
    /// Build a key from object metadata. An empty namespace means the
    /// object is cluster-scoped.
    pub fn from_meta(namespace: &str, name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::InvalidKey(format!(
                "object in namespace {namespace:?} has no name"
            )));
        }
        if name.contains('/') || namespace.contains('/') {
            return Err(Error::InvalidKey(format!("{namespace}/{name}")));
        }
        Ok(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

impl FromStr for Key {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), None, None) => Self::from_meta("", name),
            (Some(namespace), Some(name), None) => Self::from_meta(namespace, name),
            _ => Err(Error::InvalidKey(s.to_string())),
        }
    }
}
