//! Shared streaming infrastructure
//!
//! The SSE parser and HTTP transport used by every provider adapter.

pub mod sse;
pub mod transport;

pub use sse::{SseFrame, SseParser};
pub use transport::{FrameStream, SseSession, SseTransport, StreamRequest};
