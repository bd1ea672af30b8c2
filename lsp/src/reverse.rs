//! Requests issued by the server that are awaiting a client reply.

use std::collections::VecDeque;

use tokio::sync::mpsc;

use crate::protocol::RequestId;
use crate::transport::InboxMessage;
use crate::types::ApplyWorkspaceEditResponse;

/// Default number of server requests remembered at once.
pub const DEFAULT_REVERSE_REQUEST_CAPACITY: usize = 5;

/// Bounded FIFO of server request ids that may still be answered.
///
/// Once full, tracking another id forgets the oldest one; a late reply to a
/// forgotten id is discarded.
#[derive(Debug)]
pub(crate) struct ReverseRequests {
    capacity: usize,
    ids: VecDeque<RequestId>,
}

impl ReverseRequests {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            ids: VecDeque::with_capacity(capacity),
        }
    }

    pub fn track(&mut self, id: RequestId) {
        if self.ids.len() == self.capacity
            && let Some(evicted) = self.ids.pop_front()
        {
            tracing::debug!("Forgetting unanswered LSP server request {evicted}");
        }
        self.ids.push_back(id);
    }

    /// Stop tracking `id`. Returns whether it was still tracked.
    pub fn take(&mut self, id: &RequestId) -> bool {
        match self.ids.iter().position(|tracked| tracked == id) {
            Some(index) => {
                self.ids.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

/// One-shot reply to a `workspace/applyEdit` request.
///
/// Dropping it without responding leaves the server request unanswered.
#[derive(Debug)]
pub struct ApplyEditResponder {
    id: RequestId,
    generation: u64,
    inbox: mpsc::UnboundedSender<InboxMessage>,
}

impl ApplyEditResponder {
    pub(crate) fn new(
        id: RequestId,
        generation: u64,
        inbox: mpsc::UnboundedSender<InboxMessage>,
    ) -> Self {
        Self {
            id,
            generation,
            inbox,
        }
    }

    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        &self.id
    }

    /// Queue the reply. It is written the next time the client processes its
    /// inbox, provided the session is unchanged and the request has not been
    /// evicted.
    pub fn respond(self, response: ApplyWorkspaceEditResponse) {
        let message = InboxMessage::EditApplied {
            generation: self.generation,
            id: self.id,
            response,
        };
        if self.inbox.send(message).is_err() {
            tracing::debug!("LSP client gone; dropping applyEdit reply");
        }
    }
}
