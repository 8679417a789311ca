//! Scriptable in-memory stand-in for the state service.

use std::collections::VecDeque;

use error_stack::report;
use parking_lot::Mutex;

use crate::{GetDataRequest, GetDataResponse, StateStore, StoreError};

enum Scripted {
    Respond(GetDataResponse),
    Fail,
}

/// A [`StateStore`] that serves pre-scripted responses and records every
/// request it receives.
///
/// Responses are served in script order; a call with nothing scripted
/// fails with a transport error.
#[derive(Default)]
pub struct MockStore {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<GetDataRequest>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next response.
    pub fn respond(&self, response: GetDataResponse) {
        self.script.lock().push_back(Scripted::Respond(response));
    }

    /// Script the next call to fail with a transport error.
    pub fn fail(&self) {
        self.script.lock().push_back(Scripted::Fail);
    }

    /// All requests received so far, in call order.
    pub fn requests(&self) -> Vec<GetDataRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl StateStore for MockStore {
    fn get_data(
        &self,
        request: GetDataRequest,
    ) -> error_stack::Result<GetDataResponse, StoreError> {
        self.requests.lock().push(request);
        match self.script.lock().pop_front() {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail) => Err(report!(StoreError::Transport)),
            None => Err(report!(StoreError::Transport)
                .attach_printable("no scripted response remaining")),
        }
    }
}
