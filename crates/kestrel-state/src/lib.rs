#![warn(
    rust_2018_idioms,
    nonstandard_style,
    future_incompatible,
    clippy::mod_module_files,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::undocumented_unsafe_blocks
)]

//! Deferred, batching reads of per-key persistent state.
//!
//! A [`StateReader`] is scoped to one unit of work, identified by a
//! `(computation, key, work_token)` triple. User code requests any number
//! of state cells up front as lazy handles; no call to the state store is
//! made until the first handle is awaited, at which point all pending
//! lookups are fetched in a single round trip.

mod decoder;
mod error;
mod handle;
mod hold_time;
mod reader;
mod registry;
mod state_tag;

pub use decoder::{DecodeError, Decoder};
pub use error::Error;
pub use handle::{ListHandle, ValueHandle, WatermarkHandle};
pub use hold_time::HoldTime;
pub use reader::StateReader;
pub use state_tag::{StateTag, TagKind};
