//! Chain event subscriptions.

use cadence_types::{Block, ConfirmData, Transaction};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

/// Topics a subscriber can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainTopic {
    /// The local miner sealed a block.
    NewMinedBlock,
    /// A block reached its confirm quorum.
    NewStableBlock,
    /// A transaction entered the pool through this node.
    NewTx,
    /// A confirm was applied to a local block.
    NewConfirm,
}

/// An event published on one of the [`ChainTopic`]s.
#[derive(Debug, Clone)]
pub enum ChainEvent {
    MinedBlock(Box<Block>),
    StableBlock(Box<Block>),
    Tx(Box<Transaction>),
    Confirm(Box<ConfirmData>),
}

/// Per-topic fan-out to unbounded channels.
///
/// Senders are registered by subscribers and dropped lazily once their
/// receiver goes away; publishing never blocks.
#[derive(Default)]
pub struct SubscriptionHub {
    senders: Mutex<HashMap<ChainTopic, Vec<UnboundedSender<ChainEvent>>>>,
}

impl SubscriptionHub {
    pub fn new() -> SubscriptionHub {
        SubscriptionHub::default()
    }

    /// Register `sender` for `topic`.
    pub fn subscribe(&self, topic: ChainTopic, sender: UnboundedSender<ChainEvent>) {
        self.senders.lock().entry(topic).or_default().push(sender);
    }

    /// Publish an event to every live subscriber of `topic`.
    pub fn publish(&self, topic: ChainTopic, event: ChainEvent) {
        let mut senders = self.senders.lock();
        if let Some(list) = senders.get_mut(&topic) {
            list.retain(|sender| sender.send(event.clone()).is_ok());
            trace!(?topic, subscribers = list.len(), "event published");
        }
    }
}
