//! # In-process backend
//!
//! [`MemoryBackend`] implements [`IdentityBackend`], [`DocumentStore`] and
//! [`BlobStore`] in memory. The mobile shell uses it when no hosted
//! project is configured, and every workflow test runs against it.
//!
//! It behaves like the hosted service where the client can observe it:
//!
//! - accounts are keyed by lower-cased email, passwords stored as Argon2 hashes;
//!   five wrong passwords in a row lock the account with `auth/too-many-requests`
//!   until [`MemoryBackend::reset_throttle`] is called;
//! - the server clock never repeats a timestamp, so `createdAt` ordering is total;
//! - live listeners get the current state right after subscribing and a full
//!   ordered snapshot after every write;
//! - listeners are invoked after the internal lock is released, so a listener
//!   may call back into the backend.
//!
//! Test hooks: [`fail_on`](MemoryBackend::fail_on) injects an error for a
//! given call, [`calls`](MemoryBackend::calls) lists every call made,
//! [`delete_document`](MemoryBackend::delete_document) and
//! [`insert_document`](MemoryBackend::insert_document) mutate state out of band.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use sha1::{Digest, Sha1};

use crate::backend::{
    order_documents, BlobStore, CreatedDocument, Document, DocumentSnapshot, DocumentStore, Fields,
    IdentityBackend, NewDocument,
};
use crate::error::{BackendError, ErrorCode};
use crate::models::{Identity, ServerTimestamp};
use crate::password::{hash_password, verify_password};
use crate::schema::{CollectionPath, DocumentPath, OrderBy};
use crate::subscription::{ActiveFlag, Subscription};

/// Consecutive wrong passwords before sign-in is throttled.
const MAX_FAILED_SIGN_INS: u32 = 5;

/// Minimum password length accepted by sign-up.
const MIN_PASSWORD_LEN: usize = 6;

/// Backend calls recorded by [`MemoryBackend::calls`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendCall {
    SignIn,
    SignUp,
    SignOut,
    CreateDocument,
    GetAll,
    PutObject,
    PublicUrl,
}

type AuthListener = Arc<dyn Fn(Option<Identity>) + Send + Sync>;
type DocListener = Arc<dyn Fn(Result<DocumentSnapshot, BackendError>) + Send + Sync>;
type CollListener = Arc<dyn Fn(Result<Vec<Document>, BackendError>) + Send + Sync>;

struct Slot<L> {
    active: ActiveFlag,
    listener: L,
}

struct DocSlot {
    path: DocumentPath,
    slot: Slot<DocListener>,
}

struct CollSlot {
    collection: CollectionPath,
    order: OrderBy,
    slot: Slot<CollListener>,
}

/// A listener invocation queued while the lock was held.
type Delivery = Box<dyn FnOnce() + Send>;

fn deliver<T: Send + 'static>(
    active: &ActiveFlag,
    listener: &Arc<dyn Fn(T) + Send + Sync>,
    payload: T,
) -> Delivery {
    let active = active.clone();
    let listener = listener.clone();
    Box::new(move || {
        if active.is_active() {
            listener(payload);
        }
    })
}

fn flush(deliveries: Vec<Delivery>) {
    for delivery in deliveries {
        delivery();
    }
}

struct Account {
    id: String,
    email: String,
    password_hash: String,
    failed_sign_ins: u32,
}

impl Account {
    fn identity(&self) -> Identity {
        Identity::new(self.id.clone(), Some(self.email.clone()))
    }
}

struct Blob {
    bytes: Vec<u8>,
    content_type: String,
}

#[derive(Default)]
struct State {
    accounts: HashMap<String, Account>,
    current: Option<Identity>,
    collections: BTreeMap<CollectionPath, BTreeMap<String, Fields>>,
    blobs: BTreeMap<String, Blob>,
    last_tick: Option<ServerTimestamp>,
    next_slot: u64,
    auth_slots: HashMap<u64, Slot<AuthListener>>,
    doc_slots: HashMap<u64, DocSlot>,
    coll_slots: HashMap<u64, CollSlot>,
    failures: HashMap<BackendCall, BackendError>,
    calls: Vec<BackendCall>,
}

impl State {
    fn begin(&mut self, call: BackendCall) -> Result<(), BackendError> {
        self.calls.push(call);
        match self.failures.get(&call) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn slot_id(&mut self) -> u64 {
        self.next_slot += 1;
        self.next_slot
    }

    fn tick(&mut self) -> ServerTimestamp {
        let now = ServerTimestamp::from_datetime(Utc::now());
        let next = match self.last_tick {
            Some(last) if now <= last => last.next_tick(),
            _ => now,
        };
        self.last_tick = Some(next);
        next
    }

    fn snapshot(&self, path: &DocumentPath) -> DocumentSnapshot {
        DocumentSnapshot {
            id: path.id.clone(),
            fields: self
                .collections
                .get(&path.collection)
                .and_then(|docs| docs.get(&path.id))
                .cloned(),
        }
    }

    fn query(&self, collection: &CollectionPath, order: &OrderBy) -> Vec<Document> {
        let docs = self
            .collections
            .get(collection)
            .into_iter()
            .flatten()
            .map(|(id, fields)| Document {
                id: id.clone(),
                fields: fields.clone(),
            });
        order_documents(docs, order)
    }

    fn auth_deliveries(&self) -> Vec<Delivery> {
        self.auth_slots
            .values()
            .map(|slot| deliver(&slot.active, &slot.listener, self.current.clone()))
            .collect()
    }

    /// Queue document and collection emissions after `path` changed.
    fn change_deliveries(&self, path: &DocumentPath) -> Vec<Delivery> {
        let mut deliveries: Vec<Delivery> = self
            .doc_slots
            .values()
            .filter(|doc| doc.path == *path)
            .map(|doc| deliver(&doc.slot.active, &doc.slot.listener, Ok(self.snapshot(path))))
            .collect();
        deliveries.extend(
            self.coll_slots
                .values()
                .filter(|coll| coll.collection == path.collection)
                .map(|coll| {
                    let docs = self.query(&coll.collection, &coll.order);
                    deliver(&coll.slot.active, &coll.slot.listener, Ok(docs))
                }),
        );
        deliveries
    }

    fn set_current(&mut self, identity: Option<Identity>) -> Vec<Delivery> {
        if self.current == identity {
            return Vec::new();
        }
        self.current = identity;
        self.auth_deliveries()
    }
}

/// In-memory identity, document and blob backend.
#[derive(Clone)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
    public_url_base: String,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryBackend")
            .field("accounts", &state.accounts.len())
            .field("collections", &state.collections.len())
            .field("blobs", &state.blobs.len())
            .finish()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_public_url_base(crate::config::StorageConfig::default().public_url_base)
    }

    pub fn with_public_url_base(base: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            public_url_base: base.into().trim_end_matches('/').to_string(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every subsequent `call` fail with `err` until cleared.
    pub fn fail_on(&self, call: BackendCall, err: BackendError) {
        self.lock().failures.insert(call, err);
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Every backend call made so far, in order.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, call: BackendCall) -> usize {
        self.lock().calls.iter().filter(|c| **c == call).count()
    }

    /// Number of live listeners of any kind.
    pub fn listener_count(&self) -> usize {
        let state = self.lock();
        state.auth_slots.len() + state.doc_slots.len() + state.coll_slots.len()
    }

    pub fn document_count(&self, collection: &CollectionPath) -> usize {
        self.lock()
            .collections
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().blobs.get(path).map(|blob| blob.bytes.clone())
    }

    pub fn object_content_type(&self, path: &str) -> Option<String> {
        self.lock()
            .blobs
            .get(path)
            .map(|blob| blob.content_type.clone())
    }

    pub fn object_paths(&self) -> Vec<String> {
        self.lock().blobs.keys().cloned().collect()
    }

    /// Write a document with raw fields, bypassing server timestamps.
    pub fn insert_document(&self, path: &DocumentPath, fields: Fields) {
        let deliveries = {
            let mut state = self.lock();
            state
                .collections
                .entry(path.collection.clone())
                .or_default()
                .insert(path.id.clone(), fields);
            state.change_deliveries(path)
        };
        flush(deliveries);
    }

    /// Delete a document out of band. Returns whether it existed.
    pub fn delete_document(&self, path: &DocumentPath) -> bool {
        let (existed, deliveries) = {
            let mut state = self.lock();
            let existed = state
                .collections
                .get_mut(&path.collection)
                .and_then(|docs| docs.remove(&path.id))
                .is_some();
            let deliveries = if existed {
                state.change_deliveries(path)
            } else {
                Vec::new()
            };
            (existed, deliveries)
        };
        flush(deliveries);
        existed
    }

    /// Push an error to every listener of `path`.
    pub fn emit_document_error(&self, path: &DocumentPath, err: BackendError) {
        let deliveries: Vec<Delivery> = {
            let state = self.lock();
            state
                .doc_slots
                .values()
                .filter(|doc| doc.path == *path)
                .map(|doc| deliver(&doc.slot.active, &doc.slot.listener, Err(err.clone())))
                .collect()
        };
        flush(deliveries);
    }

    /// Push an error to every listener of `collection`.
    pub fn emit_collection_error(&self, collection: &CollectionPath, err: BackendError) {
        let deliveries: Vec<Delivery> = {
            let state = self.lock();
            state
                .coll_slots
                .values()
                .filter(|coll| coll.collection == *collection)
                .map(|coll| deliver(&coll.slot.active, &coll.slot.listener, Err(err.clone())))
                .collect()
        };
        flush(deliveries);
    }

    /// Clear the wrong-password counter for `email`.
    pub fn reset_throttle(&self, email: &str) {
        if let Some(account) = self.lock().accounts.get_mut(&normalize_email(email)) {
            account.failed_sign_ins = 0;
        }
    }

    /// Detach closure for a slot in one of the listener maps.
    fn detacher(&self, remove: impl FnOnce(&mut State) + Send + 'static) -> impl FnOnce() + Send + 'static {
        let state = Arc::downgrade(&self.state);
        move || {
            if let Some(state) = state.upgrade() {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                remove(&mut state);
            }
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

impl IdentityBackend for MemoryBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        let email = normalize_email(email);
        let hash = {
            let mut state = self.lock();
            state.begin(BackendCall::SignIn)?;
            if !valid_email(&email) {
                return Err(BackendError::new(ErrorCode::InvalidEmail, "The email address is badly formatted"));
            }
            let account = state.accounts.get(&email).ok_or_else(|| {
                BackendError::new(ErrorCode::UserNotFound, "There is no user record for this email")
            })?;
            if account.failed_sign_ins >= MAX_FAILED_SIGN_INS {
                return Err(BackendError::new(
                    ErrorCode::TooManyRequests,
                    "Access to this account has been temporarily disabled due to many failed login attempts",
                ));
            }
            account.password_hash.clone()
        };

        let valid = verify_password(password, &hash)?;

        let (result, deliveries) = {
            let mut state = self.lock();
            let Some(account) = state.accounts.get_mut(&email) else {
                return Err(BackendError::new(ErrorCode::UserNotFound, "There is no user record for this email"));
            };
            if valid {
                account.failed_sign_ins = 0;
                let identity = account.identity();
                let deliveries = state.set_current(Some(identity.clone()));
                (Ok(identity), deliveries)
            } else {
                account.failed_sign_ins += 1;
                tracing::debug!("Wrong password for {} ({} in a row)", email, account.failed_sign_ins);
                (
                    Err(BackendError::new(ErrorCode::WrongPassword, "The password is invalid")),
                    Vec::new(),
                )
            }
        };
        flush(deliveries);
        result
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        let email = normalize_email(email);
        {
            let mut state = self.lock();
            state.begin(BackendCall::SignUp)?;
            if !valid_email(&email) {
                return Err(BackendError::new(ErrorCode::InvalidEmail, "The email address is badly formatted"));
            }
            if password.chars().count() < MIN_PASSWORD_LEN {
                return Err(BackendError::new(
                    ErrorCode::WeakPassword,
                    format!("Password should be at least {MIN_PASSWORD_LEN} characters"),
                ));
            }
            if state.accounts.contains_key(&email) {
                return Err(BackendError::new(
                    ErrorCode::EmailAlreadyInUse,
                    "The email address is already in use by another account",
                ));
            }
        }

        let password_hash = hash_password(password)?;

        let (identity, deliveries) = {
            let mut state = self.lock();
            if state.accounts.contains_key(&email) {
                return Err(BackendError::new(
                    ErrorCode::EmailAlreadyInUse,
                    "The email address is already in use by another account",
                ));
            }
            let account = Account {
                id: uuid::Uuid::new_v4().simple().to_string(),
                email: email.clone(),
                password_hash,
                failed_sign_ins: 0,
            };
            let identity = account.identity();
            state.accounts.insert(email, account);
            let deliveries = state.set_current(Some(identity.clone()));
            (identity, deliveries)
        };
        flush(deliveries);
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let deliveries = {
            let mut state = self.lock();
            state.begin(BackendCall::SignOut)?;
            state.set_current(None)
        };
        flush(deliveries);
        Ok(())
    }

    fn current_identity(&self) -> Option<Identity> {
        self.lock().current.clone()
    }

    fn subscribe_auth_state(
        &self,
        listener: impl Fn(Option<Identity>) + Send + Sync + 'static,
    ) -> Subscription {
        let active = ActiveFlag::new();
        let listener: AuthListener = Arc::new(listener);
        let (id, first) = {
            let mut state = self.lock();
            let id = state.slot_id();
            state.auth_slots.insert(
                id,
                Slot {
                    active: active.clone(),
                    listener: listener.clone(),
                },
            );
            (id, deliver(&active, &listener, state.current.clone()))
        };
        first();
        Subscription::new(
            active,
            self.detacher(move |state| {
                state.auth_slots.remove(&id);
            }),
        )
    }
}

impl DocumentStore for MemoryBackend {
    async fn create_document(
        &self,
        collection: &CollectionPath,
        doc: NewDocument,
    ) -> Result<CreatedDocument, BackendError> {
        let (created, deliveries) = {
            let mut state = self.lock();
            state.begin(BackendCall::CreateDocument)?;
            let server_time = state.tick();
            let path = collection.doc(&uuid::Uuid::new_v4().simple().to_string());
            state
                .collections
                .entry(collection.clone())
                .or_default()
                .insert(path.id.clone(), doc.resolve(server_time));
            let deliveries = state.change_deliveries(&path);
            (CreatedDocument { path, server_time }, deliveries)
        };
        flush(deliveries);
        Ok(created)
    }

    async fn get_all(
        &self,
        collection: &CollectionPath,
        order: &OrderBy,
    ) -> Result<Vec<Document>, BackendError> {
        let mut state = self.lock();
        state.begin(BackendCall::GetAll)?;
        Ok(state.query(collection, order))
    }

    fn subscribe_document(
        &self,
        path: &DocumentPath,
        listener: impl Fn(Result<DocumentSnapshot, BackendError>) + Send + Sync + 'static,
    ) -> Subscription {
        let active = ActiveFlag::new();
        let listener: DocListener = Arc::new(listener);
        let (id, first) = {
            let mut state = self.lock();
            let id = state.slot_id();
            state.doc_slots.insert(
                id,
                DocSlot {
                    path: path.clone(),
                    slot: Slot {
                        active: active.clone(),
                        listener: listener.clone(),
                    },
                },
            );
            (id, deliver(&active, &listener, Ok(state.snapshot(path))))
        };
        first();
        Subscription::new(
            active,
            self.detacher(move |state| {
                state.doc_slots.remove(&id);
            }),
        )
    }

    fn subscribe_collection(
        &self,
        collection: &CollectionPath,
        order: &OrderBy,
        listener: impl Fn(Result<Vec<Document>, BackendError>) + Send + Sync + 'static,
    ) -> Subscription {
        let active = ActiveFlag::new();
        let listener: CollListener = Arc::new(listener);
        let (id, first) = {
            let mut state = self.lock();
            let id = state.slot_id();
            state.coll_slots.insert(
                id,
                CollSlot {
                    collection: collection.clone(),
                    order: order.clone(),
                    slot: Slot {
                        active: active.clone(),
                        listener: listener.clone(),
                    },
                },
            );
            let docs = state.query(collection, order);
            (id, deliver(&active, &listener, Ok(docs)))
        };
        first();
        Subscription::new(
            active,
            self.detacher(move |state| {
                state.coll_slots.remove(&id);
            }),
        )
    }
}

impl BlobStore for MemoryBackend {
    async fn put_object(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.begin(BackendCall::PutObject)?;
        tracing::debug!("Stored {} bytes at {}", bytes.len(), path);
        state.blobs.insert(
            path.to_string(),
            Blob {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn public_url(&self, path: &str) -> Result<String, BackendError> {
        let mut state = self.lock();
        state.begin(BackendCall::PublicUrl)?;
        let blob = state
            .blobs
            .get(path)
            .ok_or_else(|| BackendError::not_found(format!("No object exists at {path}")))?;
        let token: String = Sha1::digest(&blob.bytes)
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        Ok(format!(
            "{}/o/{}?alt=media&token={}",
            self.public_url_base,
            crate::schema::encode_object_path(path),
            token
        ))
    }
}
