//! Error kinds surfaced by the consensus core.

use cadence_account::JournalError;
use cadence_types::TxError;
use thiserror::Error;

/// What a header failed on. Each validator check maps to one issue.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HeaderIssue {
    #[error("block time is in the future")]
    FutureTime,

    #[error("height does not follow the parent")]
    Height,

    #[error("not this producer's slot window")]
    Slot,

    #[error("signer does not match the registered deputy")]
    Signer,

    #[error("extra data exceeds 256 bytes")]
    ExtraTooLong,

    #[error("deputy root present outside a snapshot block")]
    UnexpectedDeputyRoot,
}

/// What a block body failed on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockIssue {
    #[error("transaction root does not match the body")]
    TxRoot,

    #[error("change log root does not match execution")]
    LogRoot,

    #[error("committee snapshot does not match the local candidates")]
    DeputyRoot,

    #[error("re-execution produced a different block")]
    Replay,

    #[error("transaction pool rejected the block's transactions")]
    PoolRejected,

    #[error(transparent)]
    Tx(#[from] TxError),
}

/// Errors surfaced by the consensus core.
///
/// Everything except [`ConsensusError::Corrupt`] is local to one block or
/// one confirm: the core rejects the input and keeps running. `Corrupt`
/// means the change-log journal no longer matches account state, which is
/// unrecoverable; callers are expected to abort rather than continue on a
/// silently diverged state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("invalid header: {0}")]
    InvalidHeader(HeaderIssue),

    #[error("invalid block: {0}")]
    InvalidBlock(BlockIssue),

    #[error("parent block not found")]
    ParentMissing,

    #[error("not a deputy at this height")]
    NotDeputy,

    #[error("cannot mine the genesis block")]
    MineGenesis,

    #[error("invalid confirm signer")]
    InvalidConfirmSigner,

    #[error("duplicate confirm")]
    DuplicateConfirm,

    #[error("term reward data corrupt: {0}")]
    RewardDataCorrupt(String),

    #[error("trie update failed: {0}")]
    TrieFail(String),

    #[error("store failure: {0}")]
    Store(String),

    #[error("fatal journal corruption: {0}")]
    Corrupt(String),
}

impl ConsensusError {
    /// Whether this error means local state is corrupt and the process
    /// should stop instead of carrying on.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConsensusError::Corrupt(_))
    }
}

impl From<JournalError> for ConsensusError {
    fn from(err: JournalError) -> Self {
        ConsensusError::Corrupt(err.to_string())
    }
}

impl From<cadence_account::StateError> for ConsensusError {
    fn from(err: cadence_account::StateError) -> Self {
        match err {
            cadence_account::StateError::Trie(msg) => ConsensusError::TrieFail(msg),
            cadence_account::StateError::Journal(inner) => inner.into(),
        }
    }
}
