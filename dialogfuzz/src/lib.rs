//! A structure-aware network protocol fuzzer: a message model built from
//! primitives and compound elements, a dialog graph that sequences
//! requests, and a resumable fuzzing session that drives a target through
//! that graph while watching for crashes.
//!
//! Start with [`request::Request`]/[`request::ElementSpec`] to describe a
//! message, [`graph::Graph`] to sequence requests into a dialog, and
//! [`session::SessionBuilder`] to run the campaign.

pub mod error;
pub mod graph;
pub mod keyed_store;
pub mod logger;
pub mod monitor;
pub mod primitive;
pub mod request;
pub mod session;
pub mod signals;
pub mod transport;

#[cfg(feature = "web")]
pub mod web;

pub use error::{FuzzError, FuzzResult, TransientTargetError};
pub use graph::Graph;
pub use request::{ElementSpec, Request};
pub use session::{Session, SessionBuilder, SessionOptions};
