//! In-process feedback channel answered by request id.

use super::channel::{FeedbackRequest, HumanFeedbackChannel};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

struct PendingRequest {
    request: FeedbackRequest,
    response_tx: Option<oneshot::Sender<String>>,
}

type Requests = Arc<RwLock<HashMap<Uuid, PendingRequest>>>;

/// Holds open questions until a host answers them with
/// [`respond`](Self::respond).
///
/// Clones share the same set of open questions.
#[derive(Clone, Default)]
pub struct PendingFeedbackChannel {
    requests: Requests,
}

/// Removes the request when the asking future completes or is dropped.
struct Registration {
    requests: Requests,
    id: Uuid,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.requests.write().remove(&self.id);
    }
}

impl PendingFeedbackChannel {
    /// Creates an empty channel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers an open question. Returns false if it is no longer open.
    pub fn respond(&self, id: Uuid, response: impl Into<String>) -> bool {
        let Some(mut pending) = self.requests.write().remove(&id) else {
            return false;
        };
        pending
            .response_tx
            .take()
            .is_some_and(|tx| tx.send(response.into()).is_ok())
    }

    /// Open questions.
    #[must_use]
    pub fn pending(&self) -> Vec<FeedbackRequest> {
        self.requests
            .read()
            .values()
            .map(|p| p.request.clone())
            .collect()
    }

    /// Number of open questions.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.requests.read().len()
    }
}

#[async_trait]
impl HumanFeedbackChannel for PendingFeedbackChannel {
    async fn ask(&self, request: &FeedbackRequest) -> anyhow::Result<String> {
        let (tx, rx) = oneshot::channel();
        self.requests.write().insert(
            request.id,
            PendingRequest {
                request: request.clone(),
                response_tx: Some(tx),
            },
        );
        let _registration = Registration {
            requests: self.requests.clone(),
            id: request.id,
        };
        debug!(request_id = %request.id, "Feedback request registered");

        rx.await
            .map_err(|_| anyhow::anyhow!("feedback request {} was dropped", request.id))
    }
}

impl std::fmt::Debug for PendingFeedbackChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingFeedbackChannel")
            .field("pending_count", &self.pending_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Phase;
    use crate::state::EscalationRequest;
    use std::time::Duration;

    fn request() -> FeedbackRequest {
        FeedbackRequest::from_escalation(
            &EscalationRequest::new(Phase::Testing, "critical_failures", "Ship anyway?"),
            "run-1",
            60,
        )
    }

    #[tokio::test]
    async fn test_respond_delivers_answer() {
        let channel = PendingFeedbackChannel::new();
        let asker = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.ask(&request()).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        let open = channel.pending();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].question, "Ship anyway?");

        assert!(channel.respond(open[0].id, "proceed"));
        assert_eq!(asker.await.unwrap().unwrap(), "proceed");
        assert_eq!(channel.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_ask_cleans_up() {
        let channel = PendingFeedbackChannel::new();
        let result =
            tokio::time::timeout(Duration::from_millis(10), channel.ask(&request())).await;
        assert!(result.is_err());
        assert_eq!(channel.pending_count(), 0);
        assert!(!channel.respond(Uuid::new_v4(), "retry"));
    }
}
