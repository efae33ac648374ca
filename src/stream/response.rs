//! Pending client requests awaiting their command's response

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::oneshot;

use crate::engine::CommandResponse;

/// Requests are identified by (request stream id, request id); a response is
/// delivered once, after the command's transaction is committed.
#[derive(Default)]
pub struct ResponseRegistry {
    next_request_id: AtomicU64,
    pending: Mutex<HashMap<(i32, u64), oneshot::Sender<CommandResponse>>>,
}

impl ResponseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new request on `request_stream_id`.
    ///
    /// # Returns
    /// The request id to put on the command, and the receiver of its response
    pub fn register(&self, request_stream_id: i32) -> (u64, oneshot::Receiver<CommandResponse>) {
        let request_id = self.next_request_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert((request_stream_id, request_id), tx);
        }
        (request_id, rx)
    }

    /// Deliver a response; responses nobody waits for are dropped.
    pub fn complete(&self, response: CommandResponse) -> bool {
        let (Some(stream_id), Some(request_id)) =
            (response.metadata.request_stream_id, response.metadata.request_id)
        else {
            return false;
        };
        let sender = self
            .pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(&(stream_id, request_id)));
        match sender {
            Some(sender) => sender.send(response).is_ok(),
            None => false,
        }
    }

    pub fn cancel(&self, request_stream_id: i32, request_id: u64) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&(request_stream_id, request_id));
        }
    }

    /// Drop every pending request; their receivers observe a closed channel.
    pub fn clear(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.clear();
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{GroupIntent, GroupRecord, Intent, RecordMetadata};

    fn response(stream_id: i32, request_id: u64) -> CommandResponse {
        CommandResponse {
            key: 1,
            metadata: RecordMetadata::event(Intent::Group(GroupIntent::Created), 1)
                .with_request(stream_id, request_id),
            value: GroupRecord::new("g1").into(),
        }
    }

    #[tokio::test]
    async fn completes_matching_request_once() {
        let registry = ResponseRegistry::new();
        let (request_id, rx) = registry.register(3);

        assert!(!registry.complete(response(4, request_id)));
        assert!(registry.complete(response(3, request_id)));
        assert!(!registry.complete(response(3, request_id)));
        assert_eq!(rx.await.unwrap().key, 1);
        assert_eq!(registry.pending(), 0);
    }

    #[tokio::test]
    async fn clear_closes_waiting_requests() {
        let registry = ResponseRegistry::new();
        let (_, rx) = registry.register(1);
        registry.clear();
        assert!(rx.await.is_err());
    }
}
