//! babelstream: streaming engine abstraction for translation and chat backends
//!
//! This library lets a front-end talk to interchangeable backend providers
//! (LLM APIs, workflow APIs, translation APIs) through one uniform contract:
//! a capability trait for adapters, a shared SSE transport, and a
//! minimum-interval throttle. Each send yields an ordered event stream that
//! terminates in exactly one finish reason.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod config;
pub mod engine;
pub mod error;
pub mod streaming;
pub mod throttle;

// Re-exports for convenience
pub use engine::{
    Engine, FinishReason, MessageEvent, MessageIncrement, MessageRequest, MessageStream,
    ModelDescriptor,
};
pub use error::{EngineError, Result};
