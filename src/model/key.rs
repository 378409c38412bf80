//! Object identity keys.
//!
//! A key is the `namespace/name` string form of an object's identity, or
//! just `name` for cluster-scoped objects. Keys are the only thing the work
//! queue carries.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::ObjectMeta;

/// Identity of a watched object, as queued for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKey(String);

impl ResourceKey {
    /// Key for a namespaced object.
    pub fn new(namespace: &str, name: &str) -> Self {
        if namespace.is_empty() {
            Self(name.to_string())
        } else {
            Self(format!("{namespace}/{name}"))
        }
    }

    /// Compute the key of a stored object from its metadata.
    pub fn for_object(meta: &ObjectMeta) -> Result<Self> {
        if meta.name.is_empty() {
            return Err(Error::MalformedKey(format!(
                "object in namespace '{}' has no name",
                meta.namespace
            )));
        }
        Ok(Self::new(&meta.namespace, &meta.name))
    }

    /// Split the key back into `(namespace, name)`.
    ///
    /// A key without a slash is cluster-scoped and yields an empty
    /// namespace. More than one slash, or an empty name, is malformed.
    pub fn split(&self) -> Result<(&str, &str)> {
        let mut parts = self.0.split('/');
        let split = match (parts.next(), parts.next(), parts.next()) {
            (Some(name), None, None) => ("", name),
            (Some(namespace), Some(name), None) => (namespace, name),
            _ => return Err(Error::MalformedKey(self.0.clone())),
        };
        if split.1.is_empty() {
            return Err(Error::MalformedKey(self.0.clone()));
        }
        Ok(split)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ResourceKey {
    /// Wrap a raw key string as-is. Validity is checked by [`ResourceKey::split`].
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for ResourceKey {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&self.0)
    }
}
