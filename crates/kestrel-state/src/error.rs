use crate::StateTag;

/// Errors raised while resolving batched state reads.
///
/// `Clone` so that a failure terminating a flush can be recorded in every
/// handle that flush had drained.
#[derive(derive_more::Display, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[display(fmt = "state store call failed for work token {_0}")]
    Store(i64),
    #[display(fmt = "expected exactly one computation block in response, got {_0}")]
    ComputationCount(usize),
    #[display(fmt = "expected data for computation '{expected}', got '{actual}'")]
    ComputationMismatch { expected: String, actual: String },
    #[display(fmt = "expected exactly one key block in response, got {_0}")]
    KeyCount(usize),
    #[display(fmt = "response key does not match the bound key")]
    KeyMismatch,
    #[display(fmt = "received response for unrequested tag")]
    UnrequestedTag,
    #[display(fmt = "unexpected kind for returned item: {_0}")]
    KindMismatch(StateTag),
    #[display(fmt = "no registered handle for {_0}")]
    MissingHandle(StateTag),
    #[display(fmt = "no registered decoder for {_0}")]
    MissingDecoder(StateTag),
    #[display(fmt = "missing responses for requested tags: {_0}")]
    IncompleteResponse(String),
    #[display(fmt = "duplicate delivery for already resolved {_0}")]
    DoubleDelivery(StateTag),
    #[display(fmt = "unable to decode stored data for {_0}")]
    Decode(StateTag),
    #[display(fmt = "resolved outcome for {_0} has an unexpected element type")]
    OutcomeType(StateTag),
    #[display(fmt = "timed out awaiting state read")]
    AwaitTimeout,
}

impl error_stack::Context for Error {}
