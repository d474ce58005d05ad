//! Chain orchestrator.
//!
//! [`Chain`] ties the consensus core together: it validates and replays
//! incoming blocks, buffers orphans, applies confirms, drives the local
//! miner and publishes chain events to subscribers. All ingress entry points
//! are synchronous; long operations honour a cancellation flag.

mod chain;
mod events;

pub use chain::{Chain, ChainHandles};
pub use events::{ChainEvent, ChainTopic, SubscriptionHub};
