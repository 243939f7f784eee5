//! Event-source contract.
//!
//! # Data Flow
//! ```text
//! Transport collaborator (real client or sim fakes)
//!     → emits lifecycle signals through events.rs (Emitter / EventSource)
//!     → request.rs (RequestSource, SocketSource, ResponseSource + event enums)
//!     → supervisor subscribes, reacts, and unsubscribes only its own listeners
//! ```
//!
//! # Design Decisions
//! - Sources are shared: several collaborators may subscribe to one source
//! - Listener removal is by ID, never "clear all"
//! - context.rs decides which connection phases apply (IP literal, TLS)

pub mod context;
pub mod events;
pub mod request;

pub use context::ConnectionContext;
pub use events::{Emitter, EventSource, Listener, ListenerId};
pub use request::{
    IdleRelease, RequestEvent, RequestId, RequestSource, ResponseEvent, ResponseSource, SocketEvent,
    SocketSource,
};
