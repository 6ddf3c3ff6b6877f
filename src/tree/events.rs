use futures_channel::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::tree::NodeId;

/// Notifications the tree sends to whoever keeps bookkeeping alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEvent {
    ChildAdded(NodeId),
    /// A subtree is about to be destroyed. The id is stale once received.
    DeletingChild(NodeId),
    /// Sent right before the directory's local finalize step runs.
    FinalizeLocal(NodeId),
}

#[derive(Debug, Default)]
pub(crate) struct Subscribers {
    senders: Vec<UnboundedSender<TreeEvent>>,
}

impl Subscribers {
    pub(crate) fn subscribe(&mut self) -> UnboundedReceiver<TreeEvent> {
        let (sender, receiver) = mpsc::unbounded();
        self.senders.push(sender);
        receiver
    }

    pub(crate) fn emit(&mut self, event: TreeEvent) {
        // Receivers that went away are dropped here.
        self.senders
            .retain(|sender| sender.unbounded_send(event).is_ok());
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.senders.len()
    }
}
