//! # Backend ports: identity, documents, blobs
//!
//! The hosted backend is consumed through three async traits. Workflows in the
//! `api` crate are generic over them, so the same code runs against the
//! in-process [`crate::MemoryBackend`] in tests, or against the REST adapter
//! [`crate::HostedBackend`] when a hosted project is configured.
//!
//! | Trait | Operations |
//! |-------|-----------|
//! | [`IdentityBackend`] | `sign_in`, `sign_up`, `sign_out`, `current_identity`, `subscribe_auth_state` |
//! | [`DocumentStore`] | `create_document`, `get_all`, `subscribe_document`, `subscribe_collection` |
//! | [`BlobStore`] | `put_object`, `public_url` |
//!
//! ## Live subscriptions
//!
//! `subscribe_*` methods take a listener closure and return a
//! [`Subscription`]. Collection listeners always receive the full ordered
//! snapshot, never a delta. The first emission is delivered right after
//! subscribing. Errors are delivered through the same listener and do not end
//! the subscription; only cancelling the handle does.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::BackendError;
use crate::models::{Identity, ServerTimestamp};
use crate::schema::{CollectionPath, Direction, DocumentPath, OrderBy};
use crate::subscription::Subscription;

/// Stored field map of a document.
pub type Fields = Map<String, Value>;

/// A stored document with its backend-assigned id.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

/// One emission of a document subscription.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentSnapshot {
    pub id: String,
    /// `None` when the document does not exist (never created or deleted).
    pub fields: Option<Fields>,
}

impl DocumentSnapshot {
    pub fn exists(&self) -> bool {
        self.fields.is_some()
    }

    pub fn to_document(&self) -> Option<Document> {
        self.fields.as_ref().map(|fields| Document {
            id: self.id.clone(),
            fields: fields.clone(),
        })
    }
}

/// A value to write. [`FieldValue::ServerTimestamp`] is replaced by the
/// backend's clock at commit time.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Value(Value),
    ServerTimestamp,
}

/// Fields of a document about to be created.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewDocument {
    pub fields: BTreeMap<String, FieldValue>,
}

impl NewDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields
            .insert(field.to_string(), FieldValue::Value(value.into()));
        self
    }

    pub fn server_timestamp(mut self, field: &str) -> Self {
        self.fields
            .insert(field.to_string(), FieldValue::ServerTimestamp);
        self
    }

    /// Resolve server timestamps against `now`.
    pub fn resolve(&self, now: ServerTimestamp) -> Fields {
        self.fields
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    FieldValue::Value(v) => v.clone(),
                    FieldValue::ServerTimestamp => timestamp_value(now),
                };
                (name.clone(), value)
            })
            .collect()
    }
}

/// Result of a successful create: the new id and the commit time.
#[derive(Clone, Debug, PartialEq)]
pub struct CreatedDocument {
    pub path: DocumentPath,
    pub server_time: ServerTimestamp,
}

pub fn timestamp_value(ts: ServerTimestamp) -> Value {
    serde_json::json!({ "seconds": ts.seconds, "nanos": ts.nanos })
}

/// Type rank used when values of different kinds are compared, following the
/// backend's cross-type ordering: null, bool, number, timestamp, string, other.
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::Object(map) if is_timestamp(map) => 3,
        Value::String(_) => 4,
        _ => 5,
    }
}

pub(crate) fn is_timestamp(map: &Map<String, Value>) -> bool {
    map.get("seconds").is_some_and(Value::is_i64) && map.get("nanos").is_some_and(Value::is_u64)
}

fn as_timestamp(map: &Map<String, Value>) -> (i64, u64) {
    (
        map.get("seconds").and_then(Value::as_i64).unwrap_or_default(),
        map.get("nanos").and_then(Value::as_u64).unwrap_or_default(),
    )
}

/// Total order over field values as used by `orderBy`.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::Object(x), Value::Object(y)) if is_timestamp(x) && is_timestamp(y) => {
            as_timestamp(x).cmp(&as_timestamp(y))
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// Apply `orderBy` to a set of documents.
///
/// Documents that lack the ordering field are left out, as the hosted backend
/// does. Ties are broken by document id so snapshots are stable.
pub fn order_documents(docs: impl IntoIterator<Item = Document>, order: &OrderBy) -> Vec<Document> {
    let mut docs: Vec<Document> = docs
        .into_iter()
        .filter(|doc| doc.fields.contains_key(&order.field))
        .collect();
    docs.sort_by(|a, b| {
        let by_field = compare_values(&a.fields[&order.field], &b.fields[&order.field]);
        let by_field = match order.direction {
            Direction::Ascending => by_field,
            Direction::Descending => by_field.reverse(),
        };
        by_field.then_with(|| a.id.cmp(&b.id))
    });
    docs
}

/// Authentication service.
pub trait IdentityBackend {
    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl std::future::Future<Output = Result<Identity, BackendError>>;
    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> impl std::future::Future<Output = Result<Identity, BackendError>>;
    fn sign_out(&self) -> impl std::future::Future<Output = Result<(), BackendError>>;
    fn current_identity(&self) -> Option<Identity>;
    /// Listener fires once with the restored session (or `None`) and again on
    /// every sign-in/sign-out.
    fn subscribe_auth_state(
        &self,
        listener: impl Fn(Option<Identity>) + Send + Sync + 'static,
    ) -> Subscription;
}

/// Document database.
pub trait DocumentStore {
    fn create_document(
        &self,
        collection: &CollectionPath,
        doc: NewDocument,
    ) -> impl std::future::Future<Output = Result<CreatedDocument, BackendError>>;
    fn get_all(
        &self,
        collection: &CollectionPath,
        order: &OrderBy,
    ) -> impl std::future::Future<Output = Result<Vec<Document>, BackendError>>;
    fn subscribe_document(
        &self,
        path: &DocumentPath,
        listener: impl Fn(Result<DocumentSnapshot, BackendError>) + Send + Sync + 'static,
    ) -> Subscription;
    fn subscribe_collection(
        &self,
        collection: &CollectionPath,
        order: &OrderBy,
        listener: impl Fn(Result<Vec<Document>, BackendError>) + Send + Sync + 'static,
    ) -> Subscription;
}

/// Blob storage.
pub trait BlobStore {
    fn put_object(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> impl std::future::Future<Output = Result<(), BackendError>>;
    fn public_url(&self, path: &str) -> impl std::future::Future<Output = Result<String, BackendError>>;
}
