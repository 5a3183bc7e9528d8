//! Composite cache keys for linear pipelines.
//!
//! A [`PipelineCacheKey`] is the ordered list of per-stage key fragments of the
//! cacheable prefix of a pipeline. Two keys address the same cache slot iff
//! their fragments match element-wise on stage kind, role and key; the
//! cache-point flag only decides which prefixes get cached.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Which kind of stage contributed a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    Generator,
    Transformer,
    Serializer,
}

impl StageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Generator => "generator",
            StageKind::Transformer => "transformer",
            StageKind::Serializer => "serializer",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stage's contribution to a pipeline key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyFragment {
    pub stage: StageKind,
    pub role: String,
    pub key: String,
    /// A cache point begins before this fragment.
    pub cache_point: bool,
}

impl KeyFragment {
    pub fn new(
        stage: StageKind,
        role: impl Into<String>,
        key: impl Into<String>,
        cache_point: bool,
    ) -> Self {
        Self {
            stage,
            role: role.into(),
            key: key.into(),
            cache_point,
        }
    }
}

impl PartialEq for KeyFragment {
    fn eq(&self, other: &Self) -> bool {
        self.stage == other.stage && self.role == other.role && self.key == other.key
    }
}

impl Eq for KeyFragment {}

impl Hash for KeyFragment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.stage.hash(state);
        self.role.hash(state);
        self.key.hash(state);
    }
}

/// Ordered, appendable and truncatable sequence of key fragments.
///
/// The pipeline keeps mutating its own key while it walks back through cache
/// points, so anything handed to a cache store must be a [`copy`](Self::copy).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineCacheKey {
    fragments: Vec<KeyFragment>,
}

impl PipelineCacheKey {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment; fragments arrive in execution order.
    pub fn append(
        &mut self,
        stage: StageKind,
        role: impl Into<String>,
        key: impl Into<String>,
        cache_point: bool,
    ) {
        self.fragments
            .push(KeyFragment::new(stage, role, key, cache_point));
    }

    pub fn size(&self) -> usize {
        self.fragments.len()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn fragments(&self) -> &[KeyFragment] {
        &self.fragments
    }

    pub fn last(&self) -> Option<&KeyFragment> {
        self.fragments.last()
    }

    /// Structurally independent clone, safe to retain in a store.
    pub fn copy(&self) -> Self {
        Self {
            fragments: self.fragments.clone(),
        }
    }

    /// Truncate from the tail through the most recent cache-point fragment.
    ///
    /// Empties the key when no fragment is flagged.
    pub fn remove_until_cache_point(&mut self) {
        match self.fragments.iter().rposition(|f| f.cache_point) {
            Some(index) => self.fragments.truncate(index),
            None => self.fragments.clear(),
        }
    }

    /// Leading `len` fragments as a new key.
    pub fn prefix(&self, len: usize) -> Self {
        Self {
            fragments: self.fragments[..len.min(self.fragments.len())].to_vec(),
        }
    }

    /// Whether the final fragment was contributed by a serializer, i.e. the
    /// key addresses a complete response rather than an event fragment.
    pub fn ends_with_serializer(&self) -> bool {
        self.last()
            .is_some_and(|fragment| fragment.stage == StageKind::Serializer)
    }

    /// Hex SHA-256 over the slot identity, for logs and external stores.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for fragment in &self.fragments {
            hasher.update(fragment.stage.as_str().as_bytes());
            hasher.update([0u8]);
            hasher.update(fragment.role.as_bytes());
            hasher.update([0u8]);
            hasher.update(fragment.key.as_bytes());
            hasher.update([0xffu8]);
        }
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for PipelineCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (index, fragment) in self.fragments.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            if fragment.cache_point {
                f.write_str("*")?;
            }
            write!(
                f,
                "{}:{}={}",
                fragment.stage.as_str(),
                fragment.role,
                fragment.key
            )?;
        }
        f.write_str("]")
    }
}
