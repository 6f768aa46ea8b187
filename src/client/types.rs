//! Typed results returned by the client

use crate::common::display_bytes;
use crate::proto;
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;

/// Store revision: bumped once per successful mutating request
pub type Revision = i64;

/// Lease identifier assigned by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LeaseId(i64);

impl LeaseId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> i64 {
        self.0
    }

    /// Lease 0 on the wire means "no lease"
    pub(crate) fn from_wire(id: i64) -> Option<Self> {
        (id != 0).then_some(Self(id))
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// A key-value entry as stored at some revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub create_revision: Revision,
    pub mod_revision: Revision,
    pub version: i64,
    pub lease: Option<LeaseId>,
}

impl KeyValue {
    pub fn key_str(&self) -> Cow<'_, str> {
        display_bytes(&self.key)
    }

    pub fn value_str(&self) -> Cow<'_, str> {
        display_bytes(&self.value)
    }
}

impl From<proto::KeyValue> for KeyValue {
    fn from(kv: proto::KeyValue) -> Self {
        Self {
            key: kv.key,
            value: kv.value,
            create_revision: kv.create_revision,
            mod_revision: kv.mod_revision,
            version: kv.version,
            lease: LeaseId::from_wire(kv.lease),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PutResponse {
    /// Revision assigned to this put
    pub revision: Revision,
    pub prev_kv: Option<KeyValue>,
}

#[derive(Debug, Clone)]
pub struct GetResponse {
    pub kvs: Vec<KeyValue>,
    /// Store revision the read was served at
    pub revision: Revision,
    /// More entries matched than the limit returned
    pub more: bool,
    /// Total number of matching entries, regardless of limit
    pub count: i64,
}

impl GetResponse {
    /// Value of the first entry, if any
    pub fn first_value(&self) -> Option<&[u8]> {
        self.kvs.first().map(|kv| kv.value.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.kvs.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct DeleteResponse {
    pub deleted: i64,
    pub revision: Revision,
    pub prev_kvs: Vec<KeyValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    Put,
    Delete,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Put => write!(f, "PUT"),
            EventKind::Delete => write!(f, "DELETE"),
        }
    }
}

/// A change observed by a watch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchEvent {
    pub kind: EventKind,
    /// For deletes, only the key and the deletion revision are set
    pub kv: KeyValue,
    pub prev_kv: Option<KeyValue>,
}

impl WatchEvent {
    /// Revision at which the change happened
    pub fn revision(&self) -> Revision {
        self.kv.mod_revision
    }
}

impl TryFrom<proto::Event> for WatchEvent {
    type Error = crate::Error;

    fn try_from(event: proto::Event) -> crate::Result<Self> {
        let kind = match proto::event::EventType::try_from(event.r#type) {
            Ok(proto::event::EventType::Put) => EventKind::Put,
            Ok(proto::event::EventType::Delete) => EventKind::Delete,
            Err(_) => {
                return Err(crate::Error::Internal(format!(
                    "unknown watch event type {}",
                    event.r#type
                )))
            }
        };
        let kv = event
            .kv
            .ok_or_else(|| crate::Error::Internal("watch event without key-value".into()))?;
        Ok(Self {
            kind,
            kv: kv.into(),
            prev_kv: event.prev_kv.map(Into::into),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseGrant {
    pub id: LeaseId,
    /// TTL granted by the store, in seconds
    pub ttl: i64,
}

#[derive(Debug, Clone)]
pub struct LeaseTtl {
    pub id: LeaseId,
    /// Remaining seconds, -1 once the lease has expired or been revoked
    pub ttl: i64,
    pub granted_ttl: i64,
    pub keys: Vec<Vec<u8>>,
}

impl LeaseTtl {
    pub fn is_expired(&self) -> bool {
        self.ttl < 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_id_wire() {
        assert_eq!(LeaseId::from_wire(0), None);
        assert_eq!(LeaseId::from_wire(7).map(|l| l.get()), Some(7));
        assert_eq!(LeaseId::new(255).to_string(), "ff");
    }

    #[test]
    fn test_event_conversion() {
        let event = proto::Event {
            r#type: proto::event::EventType::Put as i32,
            kv: Some(proto::KeyValue {
                key: b"key_01".to_vec(),
                value: b"1".to_vec(),
                mod_revision: 9,
                lease: 3,
                ..Default::default()
            }),
            prev_kv: None,
        };
        let event = WatchEvent::try_from(event).unwrap();
        assert_eq!(event.kind, EventKind::Put);
        assert_eq!(event.revision(), 9);
        assert_eq!(event.kv.key_str(), "key_01");
        assert_eq!(event.kv.lease, Some(LeaseId::new(3)));
    }

    #[test]
    fn test_event_without_kv_is_rejected() {
        let event = proto::Event {
            r#type: proto::event::EventType::Delete as i32,
            kv: None,
            prev_kv: None,
        };
        assert!(WatchEvent::try_from(event).is_err());

        let event = proto::Event {
            r#type: 9,
            kv: Some(proto::KeyValue::default()),
            prev_kv: None,
        };
        assert!(WatchEvent::try_from(event).is_err());
    }
}
