use log::{debug, error, warn};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use super::{OrderedQuery, SharedStore, SnapshotCallback};

/// Handle to a live snapshot feed. Dropping it stops the feed.
pub struct Subscription {
    cancel_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.cancel_token.is_cancelled()
            && self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    fn cancel(&mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Run `query` against `store` now and again after every change notification
/// naming `query.collection`, handing each full result to `callback`.
pub fn watch_collection(
    store: SharedStore,
    mut changes: broadcast::Receiver<String>,
    query: OrderedQuery,
    callback: SnapshotCallback,
) -> Subscription {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    let handle = tokio::spawn(async move {
        deliver(&store, &query, &callback).await;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("snapshot feed for '{}' cancelled", query.collection);
                    break;
                }
                received = changes.recv() => match received {
                    Ok(collection) if collection == query.collection => {
                        deliver(&store, &query, &callback).await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("snapshot feed lagged by {skipped} notifications; resyncing");
                        deliver(&store, &query, &callback).await;
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    });

    Subscription {
        cancel_token,
        handle: Some(handle),
    }
}

async fn deliver(store: &SharedStore, query: &OrderedQuery, callback: &SnapshotCallback) {
    match store.query_ordered(query).await {
        Ok(documents) => callback(documents),
        Err(err) => error!(
            "failed to refresh snapshot for '{}': {err:?}",
            query.collection
        ),
    }
}
