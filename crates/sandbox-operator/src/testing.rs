//! In-memory object store for tests
//!
//! Objects are kept as JSON keyed by kind, namespace and name. Deleting an
//! object runs a small garbage collector that honours owner references and
//! namespace containment, mirroring what the cluster does.

use crate::error::{OperatorError, Result};
use crate::store::{ObjectStore, ResourceKind};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::core::ErrorResponse;
use kube::{Resource, ResourceExt};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

type Key = (String, Option<String>, String);

/// A store operation, recorded in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Get { kind: String, name: String },
    Create { kind: String, name: String },
}

impl Call {
    pub fn get(kind: &str, name: &str) -> Self {
        Call::Get {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    pub fn create(kind: &str, name: &str) -> Self {
        Call::Create {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self, Call::Create { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Op {
    Get,
    Create,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    /// Server error, nothing stored
    Server,
    /// Another writer stores the object first; the call sees a conflict
    LostRace,
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<Key, Value>,
    calls: Vec<Call>,
    failures: BTreeMap<(Op, String), Failure>,
    next_uid: u64,
}

/// Recording in-memory [`ObjectStore`]
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

fn key_of<K: ResourceKind>(namespace: Option<&str>, name: &str) -> Key {
    (
        K::kind(&()).to_string(),
        namespace.map(str::to_string),
        name.to_string(),
    )
}

fn server_error(message: &str) -> OperatorError {
    OperatorError::KubeError(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: "InternalError".to_string(),
        code: 500,
    }))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object without recording a call
    pub fn insert<K: ResourceKind>(&self, object: &K) {
        let mut inner = self.inner.lock().unwrap();
        let key = key_of::<K>(object.namespace().as_deref(), &object.name_any());
        inner
            .objects
            .insert(key, serde_json::to_value(object).unwrap());
    }

    /// Make the next `get` of this kind fail with a server error
    pub fn fail_next_get<K: ResourceKind>(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .failures
            .insert((Op::Get, K::kind(&()).to_string()), Failure::Server);
    }

    /// Make the next `create` of this kind fail with a server error
    pub fn fail_next_create<K: ResourceKind>(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .failures
            .insert((Op::Create, K::kind(&()).to_string()), Failure::Server);
    }

    /// Make the next `create` of this kind lose a race: the object is stored
    /// as if by another writer and the call fails with `AlreadyExists`
    pub fn lose_next_create<K: ResourceKind>(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .failures
            .insert((Op::Create, K::kind(&()).to_string()), Failure::LostRace);
    }

    /// Calls recorded so far
    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Creation calls recorded so far
    pub fn creates(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_create).collect()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    /// Read an object without recording a call
    pub fn peek<K: ResourceKind>(&self, namespace: Option<&str>, name: &str) -> Option<K> {
        let inner = self.inner.lock().unwrap();
        inner
            .objects
            .get(&key_of::<K>(namespace, name))
            .map(|v| serde_json::from_value(v.clone()).unwrap())
    }

    /// Number of stored objects of one kind
    pub fn count<K: ResourceKind>(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        let kind = K::kind(&());
        inner.objects.keys().filter(|(k, _, _)| *k == kind).count()
    }

    /// Delete an object and garbage collect its dependents
    ///
    /// Objects whose owner uid no longer exists are removed, as is everything
    /// inside a deleted Namespace, until nothing else qualifies.
    pub fn delete<K: ResourceKind>(&self, namespace: Option<&str>, name: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.objects.remove(&key_of::<K>(namespace, name)).is_none() {
            return false;
        }

        let namespace_kind = Namespace::kind(&()).to_string();
        loop {
            let live_uids: BTreeSet<String> = inner
                .objects
                .values()
                .filter_map(|v| v.pointer("/metadata/uid").and_then(Value::as_str))
                .map(str::to_string)
                .collect();
            let live_namespaces: BTreeSet<String> = inner
                .objects
                .keys()
                .filter(|(kind, _, _)| *kind == namespace_kind)
                .map(|(_, _, name)| name.clone())
                .collect();

            let orphans: Vec<Key> = inner
                .objects
                .iter()
                .filter(|((_, ns, _), value)| {
                    let namespace_gone = ns.as_ref().is_some_and(|ns| !live_namespaces.contains(ns));
                    let owner_gone = value
                        .pointer("/metadata/ownerReferences")
                        .and_then(Value::as_array)
                        .is_some_and(|refs| {
                            refs.iter()
                                .filter_map(|r| r.get("uid").and_then(Value::as_str))
                                .any(|uid| !live_uids.contains(uid))
                        });
                    namespace_gone || owner_gone
                })
                .map(|(key, _)| key.clone())
                .collect();

            if orphans.is_empty() {
                return true;
            }
            for key in orphans {
                inner.objects.remove(&key);
            }
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get<K: ResourceKind>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<K>> {
        let mut inner = self.inner.lock().unwrap();
        let kind = K::kind(&()).to_string();
        inner.calls.push(Call::get(&kind, name));

        if inner.failures.remove(&(Op::Get, kind)).is_some() {
            return Err(server_error("etcdserver: request timed out"));
        }

        inner
            .objects
            .get(&key_of::<K>(namespace, name))
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(OperatorError::from)
    }

    async fn create<K: ResourceKind>(&self, object: &K) -> Result<K> {
        let mut inner = self.inner.lock().unwrap();
        let kind = K::kind(&()).to_string();
        let name = object.name_any();
        inner.calls.push(Call::create(&kind, &name));

        let key = key_of::<K>(object.namespace().as_deref(), &name);
        match inner.failures.remove(&(Op::Create, kind.clone())) {
            Some(Failure::Server) => return Err(server_error("etcdserver: leader changed")),
            Some(Failure::LostRace) => {
                inner.objects.insert(key, serde_json::to_value(object)?);
                return Err(OperatorError::AlreadyExists { kind, name });
            }
            None => {}
        }

        if inner.objects.contains_key(&key) {
            return Err(OperatorError::AlreadyExists { kind, name });
        }

        let mut created = object.clone();
        inner.next_uid += 1;
        created.meta_mut().uid = Some(format!("uid-{}", inner.next_uid));
        inner.objects.insert(key, serde_json::to_value(&created)?);
        Ok(created)
    }
}
