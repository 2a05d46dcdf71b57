//! # Caprun
//!
//! A local capability runtime with promise pipelining. A caller invokes
//! methods on a [`Client`] handle and may immediately issue further calls
//! against fields of the not-yet-arrived result; the runtime buffers those
//! calls and routes them, in order, once the result materialises.
//!
//! ## Architecture
//!
//! Every capability reduces to a [`ClientHook`]; the concrete hooks are the
//! local client (wrapping a [`Server`] object and dispatching it through a
//! deferred event-loop turn), the queued client (buffering calls on an
//! unresolved capability), and the broken client (replaying a recorded
//! failure). All of it is single-threaded and must be driven from inside a
//! `tokio::task::LocalSet`; wire formats, transports and schemas live
//! elsewhere and plug in through the hook traits.

mod broken;
mod client;
mod error;
mod local;
mod message;
mod queued;
mod request;
mod traits;


pub use client::CallContext;
pub use client::Client;
pub use client::Params;
pub use client::Server;
pub use error::Error;
pub use error::Result;
pub use local::Results;
pub use message::pipelined_cap;
pub use message::Message;
pub use message::Value;
pub use message::SUGGESTED_ROOT_CAPACITY;
pub use request::PendingResponse;
pub use request::Pipeline;
pub use request::Request;
pub use request::Response;
pub use traits::resolved;
pub use traits::when_resolved;
pub use traits::Brand;
pub use traits::CallContextHook;
pub use traits::ClientHook;
pub use traits::PipelineHook;
pub use traits::PipelineOp;
pub use traits::Promise;
pub use traits::RequestHook;
pub use traits::ResponseHook;
pub use traits::StartedCall;
