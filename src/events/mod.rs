//! Event payloads, outcome shapes and the handler registry.
//!
//! Patched host routines call into this module. Each call constructs an [`Event`] payload,
//! hands it to [`Dispatcher::fire`], and branches on the outcome the handlers left behind.
//!
//! - [`outcome`] - [`BinaryGate`] and [`VetoRetry`], the two outcome shapes
//! - [`dispatcher`] - [`Dispatcher`], ordered and failure-isolated invocation

pub mod dispatcher;
pub mod outcome;

pub use dispatcher::{Dispatcher, Event, HandlerId, Priority};
pub use outcome::{BinaryGate, GateDecision, RetryDecision, VetoRetry};
