/// Intent dispatcher between the rendering layer and the stores
///
/// The rendering layer never mutates state. It sends `Intent`s here and
/// reads back `CollectionState` / annotation sets.
///
/// `dispatch` takes `&self`, so intents interleave at await points: an
/// annotation drag is handled while a confirmed delete is still waiting on
/// the server, and a second confirm for the same image gets `Conflict`.
use log::debug;
use std::sync::{Mutex, MutexGuard};

use crate::error::GalleryError;
use crate::remote::ImageSource;
use crate::state::annotations::AnnotationStore;
use crate::state::collection::CollectionStore;
use crate::state::data::{Annotation, CollectionState};
use crate::storage::AnnotationStorage;

/// User actions (events)
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// Reload the image list from the server
    Refresh,
    /// User opened an image
    Select(i64),
    /// User clicked delete on an image; waits for confirmation
    RequestDelete(i64),
    /// User confirmed the pending delete
    ConfirmDelete,
    /// User dismissed the confirmation dialog
    CancelDelete,
    AddAnnotation(Option<String>),
    DragAnnotation { id: String, x: f64, y: f64 },
    ResizeAnnotation { id: String, width: f64, height: f64 },
    DismissAnnotation(String),
}

/// Dialog and selection state owned by the dispatcher
#[derive(Debug, Clone, Copy, Default)]
struct ViewState {
    /// Image whose annotation overlay is open
    selected: Option<i64>,
    /// Image waiting for delete confirmation
    pending_delete: Option<i64>,
}

pub struct Gallery<S, P> {
    collection: CollectionStore<S>,
    annotations: Mutex<AnnotationStore<P>>,
    view: Mutex<ViewState>,
}

impl<S: ImageSource, P: AnnotationStorage> Gallery<S, P> {
    pub fn new(collection: CollectionStore<S>, annotations: AnnotationStore<P>) -> Self {
        Self {
            collection,
            annotations: Mutex::new(annotations),
            view: Mutex::new(ViewState::default()),
        }
    }

    pub fn collection(&self) -> &CollectionStore<S> {
        &self.collection
    }

    pub fn state(&self) -> CollectionState {
        self.collection.state()
    }

    pub fn selected(&self) -> Option<i64> {
        lock(&self.view).selected
    }

    pub fn pending_delete(&self) -> Option<i64> {
        lock(&self.view).pending_delete
    }

    /// Already-loaded annotations of any image
    pub fn annotations_for(&self, image_id: i64) -> Option<Vec<Annotation>> {
        lock(&self.annotations)
            .annotations(image_id)
            .map(|annotations| annotations.to_vec())
    }

    /// Annotations of the selected image
    pub fn overlay(&self) -> Vec<Annotation> {
        self.selected()
            .and_then(|image_id| self.annotations_for(image_id))
            .unwrap_or_default()
    }

    /// Handle one intent.
    ///
    /// Only collection errors are returned; annotation problems are absorbed
    /// by the annotation store. No lock is held across an await.
    pub async fn dispatch(&self, intent: Intent) -> Result<(), GalleryError> {
        match intent {
            Intent::Refresh => {
                let state = self.collection.load().await;
                match state.last_error {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            }
            Intent::Select(image_id) => {
                lock(&self.view).selected = Some(image_id);
                lock(&self.annotations).load_for(image_id);
                Ok(())
            }
            Intent::RequestDelete(id) => {
                lock(&self.view).pending_delete = Some(id);
                Ok(())
            }
            Intent::CancelDelete => {
                lock(&self.view).pending_delete = None;
                Ok(())
            }
            Intent::ConfirmDelete => {
                let pending = lock(&self.view).pending_delete.take();
                let Some(id) = pending else {
                    debug!("Delete confirmed with nothing pending");
                    return Ok(());
                };

                self.collection.delete(id).await?;

                let mut view = lock(&self.view);
                if view.selected == Some(id) {
                    view.selected = None;
                }
                Ok(())
            }
            Intent::AddAnnotation(color) => {
                if let Some(image_id) = self.selected_image("add annotation") {
                    lock(&self.annotations).add(image_id, color);
                }
                Ok(())
            }
            Intent::DragAnnotation { id, x, y } => {
                if let Some(image_id) = self.selected_image("drag annotation") {
                    lock(&self.annotations).move_to(image_id, &id, x, y);
                }
                Ok(())
            }
            Intent::ResizeAnnotation { id, width, height } => {
                if let Some(image_id) = self.selected_image("resize annotation") {
                    lock(&self.annotations).resize_to(image_id, &id, width, height);
                }
                Ok(())
            }
            Intent::DismissAnnotation(id) => {
                if let Some(image_id) = self.selected_image("dismiss annotation") {
                    lock(&self.annotations).remove(image_id, &id);
                }
                Ok(())
            }
        }
    }

    fn selected_image(&self, action: &str) -> Option<i64> {
        let selected = self.selected();
        if selected.is_none() {
            debug!("Ignoring {action}: no image selected");
        }
        selected
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Every critical section is a single assignment or store call
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RequestPolicy;
    use crate::remote::fake::FakeSource;
    use crate::storage::MemoryStorage;
    use std::time::Duration;

    async fn gallery(ids: &[i64]) -> Gallery<FakeSource, MemoryStorage> {
        let policy = RequestPolicy {
            retry_delay: Duration::ZERO,
            ..RequestPolicy::default()
        };
        let gallery = Gallery::new(
            CollectionStore::new(FakeSource::with_ids(ids), policy),
            AnnotationStore::new(MemoryStorage::new()),
        );
        gallery.dispatch(Intent::Refresh).await.unwrap();
        gallery
    }

    #[tokio::test]
    async fn test_delete_needs_confirmation() {
        let gallery = gallery(&[1, 2, 3]).await;

        gallery.dispatch(Intent::RequestDelete(2)).await.unwrap();
        assert_eq!(gallery.pending_delete(), Some(2));
        assert_eq!(gallery.state().ids(), vec![1, 2, 3]);

        gallery.dispatch(Intent::CancelDelete).await.unwrap();
        assert_eq!(gallery.pending_delete(), None);
        gallery.dispatch(Intent::ConfirmDelete).await.unwrap();
        assert_eq!(gallery.state().ids(), vec![1, 2, 3]);
        assert_eq!(gallery.collection().source().delete_calls(), 0);

        gallery.dispatch(Intent::RequestDelete(2)).await.unwrap();
        gallery.dispatch(Intent::ConfirmDelete).await.unwrap();
        assert_eq!(gallery.state().ids(), vec![1, 3]);
        assert_eq!(gallery.pending_delete(), None);
    }

    #[tokio::test]
    async fn test_failed_delete_is_reported() {
        let gallery = gallery(&[1, 2]).await;
        gallery.collection().source().fail_deletes();

        gallery.dispatch(Intent::RequestDelete(1)).await.unwrap();
        let err = gallery.dispatch(Intent::ConfirmDelete).await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(gallery.state().ids(), vec![1, 2]);
        assert!(gallery.state().error_message().is_some());
    }

    #[tokio::test]
    async fn test_deleting_selected_image_closes_overlay() {
        let gallery = gallery(&[1, 2]).await;
        gallery.dispatch(Intent::Select(2)).await.unwrap();

        gallery.dispatch(Intent::RequestDelete(2)).await.unwrap();
        gallery.dispatch(Intent::ConfirmDelete).await.unwrap();

        assert_eq!(gallery.selected(), None);
        assert!(gallery.overlay().is_empty());
    }

    #[tokio::test]
    async fn test_annotation_intents_follow_selection() {
        let gallery = gallery(&[1, 2]).await;

        // Nothing selected yet
        gallery
            .dispatch(Intent::AddAnnotation(Some("#ff0000".into())))
            .await
            .unwrap();
        assert!(gallery.annotations_for(1).is_none());

        gallery.dispatch(Intent::Select(1)).await.unwrap();
        gallery
            .dispatch(Intent::AddAnnotation(Some("#ff0000".into())))
            .await
            .unwrap();
        gallery.dispatch(Intent::AddAnnotation(None)).await.unwrap();
        assert_eq!(gallery.overlay().len(), 2);

        let id = gallery.overlay()[0].id.clone();
        gallery
            .dispatch(Intent::DragAnnotation { id: id.clone(), x: 300.0, y: 120.0 })
            .await
            .unwrap();
        gallery
            .dispatch(Intent::ResizeAnnotation { id: id.clone(), width: 50.0, height: 40.0 })
            .await
            .unwrap();
        let dragged = gallery.overlay()[0].clone();
        assert_eq!((dragged.x, dragged.y), (300.0, 120.0));
        assert_eq!((dragged.width, dragged.height), (50.0, 40.0));

        gallery.dispatch(Intent::DismissAnnotation(id)).await.unwrap();
        assert_eq!(gallery.overlay().len(), 1);

        // Switching images shows that image's own set
        gallery.dispatch(Intent::Select(2)).await.unwrap();
        assert!(gallery.overlay().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_reports_load_errors() {
        let gallery = gallery(&[1]).await;
        gallery
            .collection()
            .source()
            .fail_next_fetch(GalleryError::Validation("not an array".into()));

        let err = gallery.dispatch(Intent::Refresh).await.unwrap_err();
        assert!(matches!(err, GalleryError::Validation(_)));
        assert_eq!(gallery.state().ids(), vec![1]);
    }

    #[tokio::test]
    async fn test_intents_interleave_with_pending_delete() {
        let gallery = gallery(&[1, 2, 3]).await;
        gallery.dispatch(Intent::Select(1)).await.unwrap();
        gallery.dispatch(Intent::AddAnnotation(None)).await.unwrap();
        let id = gallery.overlay()[0].id.clone();

        let gate = gallery.collection().source().hold_next_delete();
        let mut rx = gallery.collection().subscribe();
        gallery.dispatch(Intent::RequestDelete(2)).await.unwrap();

        // While the confirmed delete waits on the server
        let meanwhile = async {
            rx.wait_for(|state| !state.contains(2)).await.unwrap();
            gallery
                .dispatch(Intent::DragAnnotation { id: id.clone(), x: 70.0, y: 80.0 })
                .await
                .unwrap();
            gallery.dispatch(Intent::RequestDelete(2)).await.unwrap();
            let again = gallery.dispatch(Intent::ConfirmDelete).await;
            gate.notify_one();
            again
        };

        let (first, again) = tokio::join!(gallery.dispatch(Intent::ConfirmDelete), meanwhile);

        assert_eq!(first, Ok(()));
        assert_eq!(again, Err(GalleryError::Conflict { id: 2 }));
        assert_eq!(gallery.collection().source().delete_calls(), 1);
        assert_eq!(gallery.state().ids(), vec![1, 3]);
        assert_eq!((gallery.overlay()[0].x, gallery.overlay()[0].y), (70.0, 80.0));
    }
}
