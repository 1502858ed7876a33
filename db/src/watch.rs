use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tracing::warn;

use abi::errors::Result;
use abi::model::{ChangeEvent, CollectionPath, Document};

use crate::document::DocumentStore;

struct Watch {
    store: Arc<dyn DocumentStore>,
    collection: CollectionPath,
    rx: Receiver<ChangeEvent>,
    primed: bool,
}

/// Live view of one collection.
///
/// Yields the current content first, then a fresh snapshot after every
/// change inside the collection. A lagging feed also yields a snapshot so
/// no change is silently dropped. Ends only when the store is gone.
pub fn watch_collection(
    store: Arc<dyn DocumentStore>,
    collection: CollectionPath,
) -> BoxStream<'static, Result<Vec<Document>>> {
    // subscribe before the first read so nothing falls in between
    let rx = store.subscribe();
    let watch = Watch {
        store,
        collection,
        rx,
        primed: false,
    };
    stream::unfold(watch, |mut watch| async move {
        if watch.primed {
            loop {
                match watch.rx.recv().await {
                    Ok(event) if watch.collection.contains(&event.path) => break,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            "watch on {} lagged, {} events skipped",
                            watch.collection, skipped
                        );
                        break;
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        }
        watch.primed = true;
        let snapshot = watch.store.list(&watch.collection).await;
        Some((snapshot, watch))
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use abi::model::{DocPath, FriendRequest, FriendshipEdge};

    use super::*;
    use crate::memory::MemoryStore;

    async fn next<T>(stream: &mut BoxStream<'static, T>) -> T {
        tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("stream stalled")
            .expect("stream ended")
    }

    #[tokio::test]
    async fn watch_should_emit_initial_and_updated_snapshots() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        store
            .set(
                &DocPath::friend_request("b", "a").unwrap(),
                FriendRequest::fields("a"),
            )
            .await
            .unwrap();

        let mut watch = watch_collection(
            store.clone(),
            CollectionPath::friend_requests("b").unwrap(),
        );
        assert_eq!(next(&mut watch).await.unwrap().len(), 1);

        // unrelated collection does not wake the watcher
        store
            .set(
                &DocPath::friend_edge("b", "a").unwrap(),
                FriendshipEdge::fields("a"),
            )
            .await
            .unwrap();
        store
            .delete(&DocPath::friend_request("b", "a").unwrap())
            .await
            .unwrap();
        assert!(next(&mut watch).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lagged_watch_should_resync() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::with_feed_capacity(2));
        let collection = CollectionPath::friends("a").unwrap();
        let mut watch = watch_collection(store.clone(), collection);
        assert!(next(&mut watch).await.unwrap().is_empty());

        for friend in ["b", "c", "d", "e", "f"] {
            store
                .set(
                    &DocPath::friend_edge("a", friend).unwrap(),
                    FriendshipEdge::fields(friend),
                )
                .await
                .unwrap();
        }
        // the overflowed feed still produces a complete snapshot
        assert_eq!(next(&mut watch).await.unwrap().len(), 5);
    }
}
