//! Per-request options
//!
//! Range setters follow etcd client semantics: the last one applied wins.

use crate::client::types::{LeaseId, Revision};
use crate::common::{prefix_range_end, Error, Result, FROM_KEY_END};
use crate::proto::range_request;

/// Which keys a request covers, relative to the key passed with it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KeyRange {
    /// Exactly the given key
    #[default]
    Single,
    /// Every key sharing the given key as a prefix
    Prefix,
    /// The given key and every key after it
    FromKey,
    /// `[key, end)`
    Until(Vec<u8>),
}

impl KeyRange {
    /// Resolve to etcd's `(key, range_end)` pair
    pub(crate) fn resolve(&self, key: Vec<u8>) -> Result<(Vec<u8>, Vec<u8>)> {
        match self {
            KeyRange::Single => {
                crate::common::validate_key(&key)?;
                Ok((key, Vec::new()))
            }
            // An empty prefix covers the whole keyspace
            KeyRange::Prefix if key.is_empty() => Ok((vec![0], FROM_KEY_END.to_vec())),
            KeyRange::Prefix => {
                let end = prefix_range_end(&key);
                Ok((key, end))
            }
            KeyRange::FromKey if key.is_empty() => Ok((vec![0], FROM_KEY_END.to_vec())),
            KeyRange::FromKey => Ok((key, FROM_KEY_END.to_vec())),
            KeyRange::Until(end) if end.is_empty() => Err(Error::InvalidArgument(
                "explicit range end must not be empty".into(),
            )),
            KeyRange::Until(end) => {
                let key = if key.is_empty() { vec![0] } else { key };
                Ok((key, end.clone()))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    None,
    Ascend,
    Descend,
}

impl From<SortOrder> for range_request::SortOrder {
    fn from(order: SortOrder) -> Self {
        match order {
            SortOrder::None => range_request::SortOrder::None,
            SortOrder::Ascend => range_request::SortOrder::Ascend,
            SortOrder::Descend => range_request::SortOrder::Descend,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortTarget {
    #[default]
    Key,
    Version,
    Create,
    Mod,
    Value,
}

impl From<SortTarget> for range_request::SortTarget {
    fn from(target: SortTarget) -> Self {
        match target {
            SortTarget::Key => range_request::SortTarget::Key,
            SortTarget::Version => range_request::SortTarget::Version,
            SortTarget::Create => range_request::SortTarget::Create,
            SortTarget::Mod => range_request::SortTarget::Mod,
            SortTarget::Value => range_request::SortTarget::Value,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub(crate) lease: Option<LeaseId>,
    pub(crate) prev_kv: bool,
}

impl PutOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope the key's lifetime to `lease`
    pub fn with_lease(mut self, lease: LeaseId) -> Self {
        self.lease = Some(lease);
        self
    }

    /// Return the entry the put replaced
    pub fn with_prev_kv(mut self) -> Self {
        self.prev_kv = true;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    pub(crate) range: KeyRange,
    pub(crate) sort_target: SortTarget,
    pub(crate) sort_order: SortOrder,
    pub(crate) limit: u64,
    pub(crate) revision: Option<Revision>,
    pub(crate) keys_only: bool,
    pub(crate) count_only: bool,
    pub(crate) serializable: bool,
}

impl GetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self) -> Self {
        self.range = KeyRange::Prefix;
        self
    }

    /// Read from the key, inclusive, to the end of the keyspace
    pub fn with_from_key(mut self) -> Self {
        self.range = KeyRange::FromKey;
        self
    }

    /// Read `[key, end)`
    pub fn with_range_end(mut self, end: impl Into<Vec<u8>>) -> Self {
        self.range = KeyRange::Until(end.into());
        self
    }

    pub fn with_sort(mut self, target: SortTarget, order: SortOrder) -> Self {
        self.sort_target = target;
        self.sort_order = order;
        self
    }

    /// Cap the number of returned entries; 0 means no limit
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Read as of a past revision
    pub fn with_revision(mut self, revision: Revision) -> Self {
        self.revision = Some(revision);
        self
    }

    pub fn with_keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }

    pub fn with_count_only(mut self) -> Self {
        self.count_only = true;
        self
    }

    /// Allow a possibly stale read served by any member
    pub fn with_serializable(mut self) -> Self {
        self.serializable = true;
        self
    }

    pub fn range(&self) -> &KeyRange {
        &self.range
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort_order
    }

    pub fn revision(&self) -> Option<Revision> {
        self.revision
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    pub(crate) range: KeyRange,
    pub(crate) prev_kv: bool,
}

impl DeleteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self) -> Self {
        self.range = KeyRange::Prefix;
        self
    }

    pub fn with_from_key(mut self) -> Self {
        self.range = KeyRange::FromKey;
        self
    }

    pub fn with_range_end(mut self, end: impl Into<Vec<u8>>) -> Self {
        self.range = KeyRange::Until(end.into());
        self
    }

    /// Return the deleted entries
    pub fn with_prev_kv(mut self) -> Self {
        self.prev_kv = true;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub(crate) range: KeyRange,
    pub(crate) start_revision: Option<Revision>,
    pub(crate) prev_kv: bool,
    pub(crate) no_put: bool,
    pub(crate) no_delete: bool,
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self) -> Self {
        self.range = KeyRange::Prefix;
        self
    }

    pub fn with_from_key(mut self) -> Self {
        self.range = KeyRange::FromKey;
        self
    }

    pub fn with_range_end(mut self, end: impl Into<Vec<u8>>) -> Self {
        self.range = KeyRange::Until(end.into());
        self
    }

    /// Replay history starting at `revision` before live events
    pub fn with_start_revision(mut self, revision: Revision) -> Self {
        self.start_revision = Some(revision);
        self
    }

    pub fn with_prev_kv(mut self) -> Self {
        self.prev_kv = true;
        self
    }

    pub fn without_puts(mut self) -> Self {
        self.no_put = true;
        self
    }

    pub fn without_deletes(mut self) -> Self {
        self.no_delete = true;
        self
    }
}

/// Revisions in requests must be positive when given
pub(crate) fn validate_revision(revision: Option<Revision>) -> Result<i64> {
    match revision {
        None => Ok(0),
        Some(rev) if rev > 0 => Ok(rev),
        Some(rev) => Err(Error::InvalidArgument(format!(
            "revision must be positive, got {}",
            rev
        ))),
    }
}
