use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use error_stack::report;
use parking_lot::{Condvar, Mutex};

use crate::decoder::ErasedOutcome;
use crate::reader::ReaderCore;
use crate::{Error, HoldTime, StateTag};

/// Single-assignment result cell shared between the registry and every
/// handle issued for its tag.
///
/// Transitions exactly once from `Pending` to `Ready` or `Failed`;
/// terminal states never change.
pub(crate) struct StateCell {
    state: Mutex<CellState>,
    done: Condvar,
}

enum CellState {
    Pending,
    Ready(ErasedOutcome),
    Failed(Error),
}

impl StateCell {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(CellState::Pending),
            done: Condvar::new(),
        })
    }

    pub(crate) fn is_done(&self) -> bool {
        !matches!(*self.state.lock(), CellState::Pending)
    }

    /// Resolve the cell. Returns `false` if it was already terminal.
    pub(crate) fn fulfill(&self, outcome: ErasedOutcome) -> bool {
        let mut state = self.state.lock();
        if !matches!(*state, CellState::Pending) {
            return false;
        }
        *state = CellState::Ready(outcome);
        drop(state);
        self.done.notify_all();
        true
    }

    /// Fail the cell. Returns `false` if it was already terminal.
    pub(crate) fn fail(&self, error: Error) -> bool {
        let mut state = self.state.lock();
        if !matches!(*state, CellState::Pending) {
            return false;
        }
        *state = CellState::Failed(error);
        drop(state);
        self.done.notify_all();
        true
    }

    /// Block until the cell is terminal, then observe its outcome.
    fn wait_outcome(&self, deadline: Option<Instant>) -> error_stack::Result<ErasedOutcome, Error> {
        let mut state = self.state.lock();
        loop {
            match &*state {
                CellState::Ready(outcome) => return Ok(outcome.clone()),
                CellState::Failed(error) => return Err(report!(error.clone())),
                CellState::Pending => {}
            }
            match deadline {
                None => self.done.wait(&mut state),
                Some(deadline) => {
                    if self.done.wait_until(&mut state, deadline).timed_out() {
                        return Err(report!(Error::AwaitTimeout));
                    }
                }
            }
        }
    }
}

/// Shared plumbing of the typed handles.
#[derive(Clone)]
struct HandleInner {
    tag: StateTag,
    cell: Arc<StateCell>,
    reader: Arc<ReaderCore>,
}

impl HandleInner {
    /// Trigger the owning reader's flush if this cell is still pending,
    /// then observe the terminal outcome.
    ///
    /// A flush failure is only surfaced here when it left this cell
    /// unresolved; a cell that already carries its own outcome (value or
    /// recorded failure) reports that outcome instead.
    fn await_outcome(
        &self,
        timeout: Option<Duration>,
    ) -> error_stack::Result<ErasedOutcome, Error> {
        if !self.cell.is_done() {
            if let Err(error) = self.reader.flush() {
                if !self.cell.is_done() {
                    return Err(error);
                }
            }
        }
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        self.cell.wait_outcome(deadline)
    }

    fn downcast<T: Clone + Send + Sync + 'static>(
        &self,
        outcome: ErasedOutcome,
    ) -> error_stack::Result<T, Error> {
        match outcome.downcast::<T>() {
            Ok(outcome) => Ok((*outcome).clone()),
            Err(_) => Err(report!(Error::OutcomeType(self.tag.clone()))),
        }
    }
}

/// Deferred read of a value cell; resolves to the decoded element, or
/// `None` when the cell holds no data.
pub struct ValueHandle<T> {
    inner: HandleInner,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ValueHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ValueHandle<T> {
    pub(crate) fn new(tag: StateTag, cell: Arc<StateCell>, reader: Arc<ReaderCore>) -> Self {
        Self {
            inner: HandleInner { tag, cell, reader },
            _marker: PhantomData,
        }
    }

    /// Resolve the read, fetching the batch on first await.
    pub fn get(&self) -> error_stack::Result<Option<T>, Error> {
        let outcome = self.inner.await_outcome(None)?;
        self.inner.downcast::<Option<T>>(outcome)
    }

    /// As [`get`](Self::get), but give up after `timeout` when another
    /// thread's in-flight fetch has not completed by then.
    pub fn get_timeout(&self, timeout: Duration) -> error_stack::Result<Option<T>, Error> {
        let outcome = self.inner.await_outcome(Some(timeout))?;
        self.inner.downcast::<Option<T>>(outcome)
    }

    pub fn is_done(&self) -> bool {
        self.inner.cell.is_done()
    }
}

/// Deferred read of a list cell; resolves to the decoded elements in
/// store order, empty when the cell holds no data.
pub struct ListHandle<T> {
    inner: HandleInner,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ListHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ListHandle<T> {
    pub(crate) fn new(tag: StateTag, cell: Arc<StateCell>, reader: Arc<ReaderCore>) -> Self {
        Self {
            inner: HandleInner { tag, cell, reader },
            _marker: PhantomData,
        }
    }

    pub fn get(&self) -> error_stack::Result<Vec<T>, Error> {
        let outcome = self.inner.await_outcome(None)?;
        self.inner.downcast::<Vec<T>>(outcome)
    }

    pub fn get_timeout(&self, timeout: Duration) -> error_stack::Result<Vec<T>, Error> {
        let outcome = self.inner.await_outcome(Some(timeout))?;
        self.inner.downcast::<Vec<T>>(outcome)
    }

    pub fn is_done(&self) -> bool {
        self.inner.cell.is_done()
    }
}

/// Deferred read of the watermark holds under one tag; resolves to the
/// earliest hold, or `None` when no holds exist.
#[derive(Clone)]
pub struct WatermarkHandle {
    inner: HandleInner,
}

impl WatermarkHandle {
    pub(crate) fn new(tag: StateTag, cell: Arc<StateCell>, reader: Arc<ReaderCore>) -> Self {
        Self {
            inner: HandleInner { tag, cell, reader },
        }
    }

    pub fn get(&self) -> error_stack::Result<Option<HoldTime>, Error> {
        let outcome = self.inner.await_outcome(None)?;
        self.inner.downcast::<Option<HoldTime>>(outcome)
    }

    pub fn get_timeout(&self, timeout: Duration) -> error_stack::Result<Option<HoldTime>, Error> {
        let outcome = self.inner.await_outcome(Some(timeout))?;
        self.inner.downcast::<Option<HoldTime>>(outcome)
    }

    pub fn is_done(&self) -> bool {
        self.inner.cell.is_done()
    }
}
