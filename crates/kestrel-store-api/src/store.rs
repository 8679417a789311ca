use crate::{GetDataRequest, GetDataResponse};

/// Errors raised by the state service transport.
#[derive(derive_more::Display, Debug)]
pub enum StoreError {
    #[display(fmt = "state store get_data call failed")]
    Transport,
}

impl error_stack::Context for StoreError {}

/// Synchronous client for the keyed state service.
///
/// One logical operation: fetch the state named by a composite request.
/// Implementations must be callable from any thread; the reader performs
/// the call on whichever thread first awaits an unresolved handle.
pub trait StateStore: Send + Sync {
    fn get_data(
        &self,
        request: GetDataRequest,
    ) -> error_stack::Result<GetDataResponse, StoreError>;
}
