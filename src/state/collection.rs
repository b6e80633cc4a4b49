/// Collection store: the client-side cache of the remote image list
///
/// Deletes are optimistic. The record disappears from `items` before the
/// request is sent, comes back if the request fails, and in both cases the
/// list is refetched afterwards so the server has the last word.
///
/// Loads are numbered by issue order. A load only applies its result if no
/// newer load (or delete) was issued in the meantime, so a slow response can
/// never overwrite fresher state.
use log::{debug, info, warn};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;

use super::data::{CollectionState, ImageRecord, LoadStatus};
use crate::config::RequestPolicy;
use crate::error::GalleryError;
use crate::remote::ImageSource;

/// Where a delete is in its lifecycle. Idle ids have no entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    /// Removed locally, delete request in flight
    Pending,
    /// Committed or rolled back, refetch in flight
    Settling,
}

pub struct CollectionStore<S> {
    source: S,
    policy: RequestPolicy,
    state: watch::Sender<CollectionState>,
    /// Ticket of the most recently issued load
    latest_load: AtomicU64,
    mutations: Mutex<HashMap<i64, MutationPhase>>,
}

impl<S: ImageSource> CollectionStore<S> {
    pub fn new(source: S, policy: RequestPolicy) -> Self {
        let (state, _) = watch::channel(CollectionState::default());
        Self {
            source,
            policy,
            state,
            latest_load: AtomicU64::new(0),
            mutations: Mutex::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Current state (cloned)
    pub fn state(&self) -> CollectionState {
        self.state.borrow().clone()
    }

    /// Observe every state transition
    pub fn subscribe(&self) -> watch::Receiver<CollectionState> {
        self.state.subscribe()
    }

    pub fn phase(&self, id: i64) -> Option<MutationPhase> {
        self.lock_mutations().get(&id).copied()
    }

    /// True while a delete for `id` has not settled
    pub fn is_deleting(&self, id: i64) -> bool {
        self.phase(id).is_some()
    }

    /// Fetch the list from the server and apply it, unless superseded.
    ///
    /// Transient failures are retried `policy.load_retries` times, validation
    /// failures are not. On error the previous items are kept.
    pub async fn load(&self) -> CollectionState {
        let ticket = self.latest_load.fetch_add(1, Ordering::SeqCst) + 1;

        self.state.send_if_modified(|state| {
            if state.status == LoadStatus::Ready {
                // Background revalidation keeps the current list on screen
                false
            } else {
                state.status = LoadStatus::Loading;
                true
            }
        });

        let outcome = self.fetch_with_retry().await;

        if self.latest_load.load(Ordering::SeqCst) != ticket {
            debug!("Discarding stale load #{ticket}");
            return self.state();
        }

        match outcome {
            Ok(items) => {
                let pending = self.ids_in_phase(MutationPhase::Pending);
                let count = items.len();
                self.state.send_modify(|state| {
                    state.items = items
                        .into_iter()
                        .filter(|image| !pending.contains(&image.id))
                        .collect();
                    state.status = LoadStatus::Ready;
                    state.last_error = None;
                });
                info!("Loaded {count} images (load #{ticket})");
            }
            Err(err) => {
                warn!("Loading images failed: {err}");
                self.state.send_modify(|state| {
                    state.status = LoadStatus::Error;
                    state.last_error = Some(err);
                });
            }
        }

        self.state()
    }

    /// Optimistically delete an image.
    ///
    /// Returns `Conflict` straight away if a delete for the same id has not
    /// settled yet. Otherwise returns the outcome of the server request, after
    /// rollback (on failure) and the follow-up refetch have both completed.
    pub async fn delete(&self, id: i64) -> Result<(), GalleryError> {
        let guard = self.begin_mutation(id)?;

        // Anything already in flight would clobber the optimistic removal
        self.latest_load.fetch_add(1, Ordering::SeqCst);

        let snapshot = self.state.borrow().items.clone();
        self.state.send_if_modified(|state| {
            let before = state.items.len();
            state.items.retain(|image| image.id != id);
            state.items.len() != before
        });
        debug!("Image {id} removed optimistically");

        let result = self.request(self.source.delete_image(id)).await;

        match &result {
            Ok(()) => {
                info!("Image {id} deleted");
                self.state.send_if_modified(|state| state.delete_error.take().is_some());
            }
            Err(err) => {
                warn!("Deleting image {id} failed, rolling back: {err}");
                self.rollback(id, snapshot, err.clone());
            }
        }

        guard.advance(MutationPhase::Settling);
        self.load().await;
        drop(guard);

        result
    }

    /// Put the failed record back where it was. Everything else in the list
    /// may have moved on since the snapshot and is left alone.
    fn rollback(&self, id: i64, snapshot: Vec<ImageRecord>, err: GalleryError) {
        let restored = snapshot
            .into_iter()
            .enumerate()
            .find(|(_, image)| image.id == id);

        self.state.send_modify(|state| {
            if let Some((index, image)) = restored {
                if !state.contains(id) {
                    let index = index.min(state.items.len());
                    state.items.insert(index, image);
                }
            }
            state.delete_error = Some(err);
        });
    }

    async fn fetch_with_retry(&self) -> Result<Vec<ImageRecord>, GalleryError> {
        let mut retries = 0;
        loop {
            match self.request(self.source.fetch_images()).await {
                Ok(items) => return Ok(items),
                Err(err) if err.is_retryable() && retries < self.policy.load_retries => {
                    retries += 1;
                    warn!(
                        "Fetching images failed ({err}), retry {retries}/{}",
                        self.policy.load_retries
                    );
                    tokio::time::sleep(self.policy.retry_delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Bound a remote call by the configured timeout
    async fn request<T, F>(&self, call: F) -> Result<T, GalleryError>
    where
        F: Future<Output = Result<T, GalleryError>>,
    {
        tokio::time::timeout(self.policy.timeout, call).await?
    }

    fn begin_mutation(&self, id: i64) -> Result<MutationGuard<'_>, GalleryError> {
        let mut mutations = self.lock_mutations();
        if mutations.contains_key(&id) {
            warn!("Rejecting duplicate delete for image {id}");
            return Err(GalleryError::Conflict { id });
        }
        mutations.insert(id, MutationPhase::Pending);
        Ok(MutationGuard {
            mutations: &self.mutations,
            id,
        })
    }

    fn ids_in_phase(&self, phase: MutationPhase) -> Vec<i64> {
        self.lock_mutations()
            .iter()
            .filter(|(_, p)| **p == phase)
            .map(|(id, _)| *id)
            .collect()
    }

    fn lock_mutations(&self) -> std::sync::MutexGuard<'_, HashMap<i64, MutationPhase>> {
        // The map is never left half-updated, so a poisoned lock is still usable
        self.mutations.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Holds an id's mutation slot; frees it on drop, even if the delete future
/// is cancelled.
struct MutationGuard<'a> {
    mutations: &'a Mutex<HashMap<i64, MutationPhase>>,
    id: i64,
}

impl MutationGuard<'_> {
    fn advance(&self, phase: MutationPhase) {
        let mut mutations = self.mutations.lock().unwrap_or_else(|p| p.into_inner());
        mutations.insert(self.id, phase);
    }
}

impl Drop for MutationGuard<'_> {
    fn drop(&mut self) {
        let mut mutations = self.mutations.lock().unwrap_or_else(|p| p.into_inner());
        mutations.remove(&self.id);
    }
}

impl<S> std::fmt::Debug for CollectionStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionStore")
            .field("policy", &self.policy)
            .field("state", &*self.state.borrow())
            .finish()
    }
}
