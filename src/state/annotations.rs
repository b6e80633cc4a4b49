/// Per-image annotation sets
///
/// Sets are loaded from storage the first time an image is touched and kept
/// in memory for the rest of the session. Every change is written through to
/// storage before the call returns.
///
/// Annotations are best-effort data: storage failures and unreadable payloads
/// are logged and swallowed, never returned to the caller.
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use tokio::sync::watch;
use uuid::Uuid;

use super::data::{is_positive, Annotation, AnnotationView};
use crate::storage::AnnotationStorage;

/// Where the first annotation of an image is placed
pub const DEFAULT_ORIGIN: f64 = 20.0;
/// Each new annotation is shifted by this much from the previous one
pub const OFFSET_STEP: f64 = 6.0;
pub const DEFAULT_WIDTH: f64 = 120.0;
pub const DEFAULT_HEIGHT: f64 = 80.0;

/// Storage key for an image's annotation set
pub fn storage_key(image_id: i64) -> String {
    format!("ann_{image_id}")
}

#[derive(Debug, Default)]
struct AnnotationSet {
    annotations: Vec<Annotation>,
    /// Annotations created so far, drives the placement offset
    created: usize,
}

pub struct AnnotationStore<P> {
    storage: P,
    sets: HashMap<i64, AnnotationSet>,
    changes: watch::Sender<AnnotationView>,
}

impl<P: AnnotationStorage> AnnotationStore<P> {
    pub fn new(storage: P) -> Self {
        let (changes, _) = watch::channel(AnnotationView::default());
        Self {
            storage,
            sets: HashMap::new(),
            changes,
        }
    }

    pub fn storage(&self) -> &P {
        &self.storage
    }

    /// Observe the set of whichever image changed last
    pub fn subscribe(&self) -> watch::Receiver<AnnotationView> {
        self.changes.subscribe()
    }

    /// Annotations of an image, loading them on first access
    pub fn load_for(&mut self, image_id: i64) -> &[Annotation] {
        &self.set_mut(image_id).annotations
    }

    /// Already-loaded annotations, without touching storage
    pub fn annotations(&self, image_id: i64) -> Option<&[Annotation]> {
        self.sets.get(&image_id).map(|set| set.annotations.as_slice())
    }

    /// Create a new annotation with default geometry
    pub fn add(&mut self, image_id: i64, color: Option<String>) -> Annotation {
        let set = self.set_mut(image_id);

        let offset = OFFSET_STEP * set.created as f64;
        let annotation = Annotation {
            id: Uuid::new_v4().to_string(),
            x: DEFAULT_ORIGIN + offset,
            y: DEFAULT_ORIGIN + offset,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            color,
        };
        set.created += 1;
        set.annotations.push(annotation.clone());

        debug!("Added annotation {} to image {image_id}", annotation.id);
        self.commit(image_id);
        annotation
    }

    /// Drag an annotation to a new position. Unknown ids are ignored.
    pub fn move_to(&mut self, image_id: i64, id: &str, x: f64, y: f64) {
        if !x.is_finite() || !y.is_finite() {
            debug!("Ignoring move of {id} to non-finite position");
            return;
        }

        let Some(annotation) = self.find_mut(image_id, id) else {
            return;
        };
        annotation.x = x;
        annotation.y = y;
        self.commit(image_id);
    }

    /// Resize an annotation. Unknown ids and non-positive sizes are ignored.
    pub fn resize_to(&mut self, image_id: i64, id: &str, width: f64, height: f64) {
        if !is_positive(width) || !is_positive(height) {
            debug!("Ignoring resize of {id} to {width}x{height}");
            return;
        }

        let Some(annotation) = self.find_mut(image_id, id) else {
            return;
        };
        annotation.width = width;
        annotation.height = height;
        self.commit(image_id);
    }

    /// Remove an annotation if present. The set is persisted either way.
    pub fn remove(&mut self, image_id: i64, id: &str) {
        let set = self.set_mut(image_id);
        set.annotations.retain(|annotation| annotation.id != id);
        self.commit(image_id);
    }

    fn find_mut(&mut self, image_id: i64, id: &str) -> Option<&mut Annotation> {
        self.set_mut(image_id)
            .annotations
            .iter_mut()
            .find(|annotation| annotation.id == id)
    }

    fn set_mut(&mut self, image_id: i64) -> &mut AnnotationSet {
        let storage = &self.storage;
        self.sets.entry(image_id).or_insert_with(|| {
            let annotations = read_set(storage, image_id);
            AnnotationSet {
                created: annotations.len(),
                annotations,
            }
        })
    }

    /// Write the image's set through to storage, then notify observers
    fn commit(&mut self, image_id: i64) {
        let annotations = self
            .sets
            .get(&image_id)
            .map(|set| set.annotations.clone())
            .unwrap_or_default();

        match Annotation::list_to_json(&annotations) {
            Ok(payload) => {
                if let Err(err) = self.storage.write(&storage_key(image_id), &payload) {
                    warn!("Annotations for image {image_id} were not saved: {err}");
                }
            }
            Err(err) => warn!("Annotations for image {image_id} could not be serialized: {err}"),
        }

        self.changes.send_replace(AnnotationView {
            image_id: Some(image_id),
            annotations,
        });
    }
}

/// Load a stored set, degrading to empty on any problem
fn read_set<P: AnnotationStorage>(storage: &P, image_id: i64) -> Vec<Annotation> {
    let key = storage_key(image_id);

    let payload = match storage.read(&key) {
        Ok(Some(payload)) => payload,
        Ok(None) => return Vec::new(),
        Err(err) => {
            warn!("Could not read annotations for image {image_id}: {err}");
            return Vec::new();
        }
    };

    let annotations = match Annotation::list_from_json(&payload) {
        Ok(annotations) => annotations,
        Err(err) => {
            warn!("Discarding unreadable annotations for image {image_id}: {err}");
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    annotations
        .into_iter()
        .filter(|annotation| {
            let keep = annotation.has_valid_size() && seen.insert(annotation.id.clone());
            if !keep {
                warn!("Dropping invalid annotation {} on image {image_id}", annotation.id);
            }
            keep
        })
        .collect()
}

impl<P> std::fmt::Debug for AnnotationStore<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationStore")
            .field("loaded_images", &self.sets.len())
            .finish()
    }
}
