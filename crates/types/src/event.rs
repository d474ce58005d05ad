//! Contract events emitted during transaction execution.

use crate::address::Address;
use crate::hash::Hash;
use serde::{Deserialize, Serialize};

/// An event published by a contract while a transaction ran. Events ride
/// along with the journal for the span of one block and are dropped on
/// revert like any other speculative output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Contract that emitted the event.
    pub address: Address,
    /// Indexed topics.
    pub topics: Vec<Hash>,
    /// Opaque payload.
    pub data: Vec<u8>,
    /// Transaction the event belongs to.
    pub tx_hash: Hash,
    /// Position of the event within its block.
    pub index: u32,
}
