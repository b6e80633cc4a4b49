//! Scriptable in-memory image source for store tests.

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use super::ImageSource;
use crate::error::GalleryError;
use crate::state::data::ImageRecord;

pub(crate) fn record(id: i64) -> ImageRecord {
    ImageRecord {
        id,
        title: format!("Image {id}"),
        url: format!("https://img.example.com/{id}.jpg"),
    }
}

#[derive(Default)]
pub(crate) struct FakeSource {
    images: Mutex<Vec<ImageRecord>>,
    fetch_errors: Mutex<VecDeque<GalleryError>>,
    fetch_gate: Mutex<Option<Arc<Notify>>>,
    delete_gate: Mutex<Option<Arc<Notify>>>,
    fetch_delay: Mutex<Option<Duration>>,
    fail_deletes: AtomicBool,
    failing_ids: Mutex<HashSet<i64>>,
    fetch_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl FakeSource {
    pub fn with_ids(ids: &[i64]) -> Self {
        let source = Self::default();
        *source.images.lock().unwrap() = ids.iter().copied().map(record).collect();
        source
    }

    /// Queue an error for the next fetch attempt
    pub fn fail_next_fetch(&self, err: GalleryError) {
        self.fetch_errors.lock().unwrap().push_back(err);
    }

    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    /// Only deletes of this id fail
    pub fn fail_delete_of(&self, id: i64) {
        self.failing_ids.lock().unwrap().insert(id);
    }

    /// Every fetch sleeps this long before answering
    pub fn delay_fetches(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }

    /// The next fetch snapshots the list, then waits for the returned gate
    pub fn hold_next_fetch(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.fetch_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// The next delete waits for the returned gate before doing anything
    pub fn hold_next_delete(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.delete_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageSource for FakeSource {
    async fn fetch_images(&self) -> Result<Vec<ImageRecord>, GalleryError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let queued = self.fetch_errors.lock().unwrap().pop_front();
        if let Some(err) = queued {
            return Err(err);
        }

        let snapshot = self.images.lock().unwrap().clone();
        let gate = self.fetch_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(snapshot)
    }

    async fn delete_image(&self, id: i64) -> Result<(), GalleryError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.delete_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let failing = self.failing_ids.lock().unwrap().contains(&id);
        if failing || self.fail_deletes.load(Ordering::SeqCst) {
            return Err(GalleryError::Transport("connection reset by peer".into()));
        }
        self.images.lock().unwrap().retain(|image| image.id != id);
        Ok(())
    }
}
