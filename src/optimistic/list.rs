//! Displayed list with optimistic create, update and delete.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::transaction::MutationTransaction;
use crate::accessor::{ListParams, ResourceAccessor};
use crate::error::{Error, Result};

/// Items that carry a stable identifier.
pub trait Identified: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    type Id: Clone + PartialEq + fmt::Debug + fmt::Display + Serialize + Send + Sync;

    /// Serialized name of the id field. Stripped from create bodies, since a
    /// draft's id is only a local placeholder.
    const ID_FIELD: &'static str = "id";

    fn id(&self) -> &Self::Id;
}

/// Decodes `response` as `D`, looking inside a `{ "data": ... }` envelope if
/// the bare body does not fit.
fn decode_payload<D: DeserializeOwned>(response: &Value) -> Option<D> {
    D::deserialize(response).ok().or_else(|| {
        response
            .get("data")
            .and_then(|data| D::deserialize(data).ok())
    })
}

/// RFC 7386 merge patch: objects merge recursively, `null` removes a field,
/// anything else replaces.
fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(changes) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Default::default());
    }
    if let Value::Object(fields) = target {
        for (name, change) in changes {
            if change.is_null() {
                fields.remove(name);
            } else {
                merge_patch(fields.entry(name.clone()).or_insert(Value::Null), change);
            }
        }
    }
}

fn replace_by_id<T: Identified>(items: &mut [T], replacement: T) -> bool {
    match items.iter_mut().find(|item| item.id() == replacement.id()) {
        Some(slot) => {
            *slot = replacement;
            true
        }
        None => false,
    }
}

/// Decrements the pending count even if the mutation future is dropped.
struct PendingGuard(Arc<AtomicUsize>);

impl PendingGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// == Optimistic List ==
/// The list a management view displays.
///
/// Each mutation snapshots the list as it is at trigger time, applies its
/// change at once, and then either keeps it (swapping in the server's copy
/// where one is returned) or restores its own snapshot. Overlapping
/// mutations do not wait for each other.
pub struct OptimisticList<T> {
    items: Arc<RwLock<Vec<T>>>,
    pending: Arc<AtomicUsize>,
}

impl<T> Clone for OptimisticList<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<T: Identified> OptimisticList<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: Arc::new(RwLock::new(items)),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Current displayed state.
    pub async fn items(&self) -> Vec<T> {
        self.items.read().await.clone()
    }

    pub async fn replace(&self, items: Vec<T>) {
        *self.items.write().await = items;
    }

    /// Mutations whose network call has not resolved yet.
    pub fn pending_mutations(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Fills the list from a (possibly cached) listing.
    pub async fn load(&self, accessor: &ResourceAccessor, params: &ListParams) -> Result<usize> {
        let response = accessor.get_all(params).await?;
        let items: Vec<T> = match decode_payload(&response) {
            Some(items) => items,
            None => Vec::<T>::deserialize(&response)?,
        };

        let count = items.len();
        self.replace(items).await;
        Ok(count)
    }

    // == Mutations ==

    /// Appends `draft` (carrying a temporary id) right away and replaces it
    /// with the created entity once the server answers.
    pub async fn create(&self, accessor: &ResourceAccessor, draft: T) -> Result<Value> {
        let mut body = serde_json::to_value(&draft)?;
        if let Value::Object(fields) = &mut body {
            fields.remove(T::ID_FIELD);
        }
        let placeholder = draft.id().clone();

        self.mutate(
            "create",
            move |items| {
                items.push(draft);
                Ok(())
            },
            accessor.create(body),
            move |items, response| match decode_payload::<T>(response) {
                Some(created) => {
                    if let Some(slot) = items.iter_mut().find(|item| *item.id() == placeholder) {
                        *slot = created;
                    }
                }
                None => warn!("create response has no entity, keeping placeholder {}", placeholder),
            },
        )
        .await
    }

    /// Merge-patches the item with `changes` right away, then takes the
    /// server's copy if it returns one.
    pub async fn update(&self, accessor: &ResourceAccessor, id: &T::Id, changes: Value) -> Result<Value> {
        let target = id.clone();
        let patch = changes.clone();

        self.mutate(
            "update",
            move |items| {
                if let Some(item) = items.iter_mut().find(|item| *item.id() == target) {
                    let mut value = serde_json::to_value(&*item)?;
                    merge_patch(&mut value, &patch);
                    *item = serde_json::from_value(value)?;
                }
                Ok(())
            },
            accessor.update(id, changes),
            |items, response| {
                if let Some(updated) = decode_payload::<T>(response) {
                    replace_by_id(items, updated);
                }
            },
        )
        .await
    }

    pub async fn delete(&self, accessor: &ResourceAccessor, id: &T::Id) -> Result<Value> {
        let target = id.clone();

        self.mutate(
            "delete",
            move |items| {
                items.retain(|item| *item.id() != target);
                Ok(())
            },
            accessor.delete(id),
            |_, _| {},
        )
        .await
    }

    pub async fn bulk_delete(&self, accessor: &ResourceAccessor, ids: &[T::Id]) -> Result<Value> {
        let targets = ids.to_vec();

        self.mutate(
            "bulk delete",
            move |items| {
                items.retain(|item| !targets.contains(item.id()));
                Ok(())
            },
            accessor.bulk_delete(ids),
            |_, _| {},
        )
        .await
    }

    /// Sets `status` on every listed item right away. If the server returns
    /// the updated entities they replace the local copies.
    pub async fn bulk_update_status(
        &self,
        accessor: &ResourceAccessor,
        ids: &[T::Id],
        status: &str,
    ) -> Result<Value> {
        let targets = ids.to_vec();
        let patch = serde_json::json!({ "status": status });

        self.mutate(
            "bulk status update",
            move |items| {
                for item in items.iter_mut().filter(|item| targets.contains(item.id())) {
                    let mut value = serde_json::to_value(&*item)?;
                    merge_patch(&mut value, &patch);
                    *item = serde_json::from_value(value)?;
                }
                Ok(())
            },
            accessor.bulk_update_status(ids, status),
            |items, response| {
                if let Some(updated) = decode_payload::<Vec<T>>(response) {
                    for item in updated {
                        replace_by_id(items, item);
                    }
                }
            },
        )
        .await
    }

    // == Internals ==

    /// Runs one optimistic mutation.
    ///
    /// `speculate` works on a copy, so if it fails nothing is displayed and
    /// `call` is never issued.
    async fn mutate<Fut>(
        &self,
        operation: &'static str,
        speculate: impl FnOnce(&mut Vec<T>) -> Result<()>,
        call: Fut,
        reconcile: impl FnOnce(&mut Vec<T>, &Value),
    ) -> Result<Value>
    where
        Fut: Future<Output = Result<Value>>,
    {
        let mut tx = {
            let mut items = self.items.write().await;
            let mut next = items.clone();
            speculate(&mut next)?;
            MutationTransaction::begin(operation, &mut items, move |items| *items = next)
        };

        tx.confirming();
        let outcome = {
            let _pending = PendingGuard::enter(&self.pending);
            call.await
        };

        let mut items = self.items.write().await;
        match outcome {
            Ok(response) => {
                tx.commit(&mut items, |items| reconcile(items, &response));
                info!("{} committed", operation);
                Ok(response)
            }
            Err(err) => {
                tx.rollback(&mut items);
                warn!("{} rolled back: {}", operation, err);
                match err {
                    Error::Api(source) => Err(Error::RolledBack { operation, source }),
                    other => Err(other),
                }
            }
        }
    }
}
