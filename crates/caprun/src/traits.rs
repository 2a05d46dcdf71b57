//! # Hook Interfaces
//!
//! The uniform internal representation of capabilities and in-flight calls.
//! Every capability, however exotic, reduces to a [`ClientHook`]; every
//! response-to-be reduces to a [`PipelineHook`]; every call in flight is a
//! [`CallContextHook`]. The public wrapper types in `client` and `request`
//! are thin shells over these.
//!
//! Hooks are single-threaded and reference counted with `Rc`; shared
//! ownership (`addRef` in capability-speak) is `Rc::clone`. Methods that
//! must retain the hook beyond the call take an `Rc<Self>` receiver.

use std::cell::Ref;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use crate::client::Params;
use crate::error::Result;
use crate::local::Results;
use crate::message::Value;
use crate::request::PendingResponse;
use crate::request::Request;

/// A single-consumer future carrying a call-level result.
pub type Promise<T> = Pin<Box<dyn Future<Output = Result<T>>>>;

/// Boxes an already-settled result as a promise.
pub fn resolved<T: 'static>(result: Result<T>) -> Promise<T> {
    Box::pin(std::future::ready(result))
}

/// Opaque tag a transport layer may use to recognise its own hooks. Hooks
/// native to this runtime carry the null brand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Brand(pub u64);

impl Brand {
    pub const NULL: Brand = Brand(0);
}

/// One structural step towards a sub-capability of a future response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineOp {
    Noop,
    GetField(u16),
}

/// What a dispatched call hands back: a completion signal and the pipeline
/// over its eventual response. The two halves are independent; either may
/// be dropped without affecting the other.
pub struct StartedCall {
    pub completion: Promise<()>,
    pub pipeline: Rc<dyn PipelineHook>,
}

/// The uniform capability interface.
pub trait ClientHook {
    /// Allocates an outbound call on this capability, rooted at a fresh
    /// request message.
    fn new_call(
        self: Rc<Self>,
        interface_id: u64,
        method_id: u16,
        size_hint: Option<usize>,
    ) -> Request;

    /// Low-level dispatch given a pre-built call context.
    fn call(
        self: Rc<Self>,
        interface_id: u64,
        method_id: u16,
        context: Rc<dyn CallContextHook>,
    ) -> StartedCall;

    /// If this hook is a promise that has already resolved, the resolution.
    fn get_resolved(&self) -> Option<Rc<dyn ClientHook>>;

    /// `None` for definitively-resolved hooks; otherwise a future that fires
    /// when the hook has progressed one step closer to resolution.
    fn when_more_resolved(&self) -> Option<Promise<Rc<dyn ClientHook>>>;

    fn brand(&self) -> Brand;
}

/// Chases [`ClientHook::when_more_resolved`] until the hook is settled.
pub fn when_resolved(hook: Rc<dyn ClientHook>) -> Promise<()> {
    match hook.when_more_resolved() {
        None => resolved(Ok(())),
        Some(more) => Box::pin(async move {
            let next = more.await?;
            when_resolved(next).await
        }),
    }
}

/// Maps pipeline op sequences to the capabilities they select out of an
/// eventual response.
pub trait PipelineHook {
    fn get_pipelined_cap(&self, ops: Vec<PipelineOp>) -> Rc<dyn ClientHook>;
}

/// The per-call record owned jointly by the caller and the server.
///
/// Contract violations on this interface panic: params after
/// `release_params`, a tail call after results, or allowing cancellation
/// while the params are still held.
pub trait CallContextHook {
    /// The request payload. Panics after `release_params`.
    fn params(&self) -> Params;

    /// Frees the request message early. Idempotent.
    fn release_params(&self);

    /// The response builder, allocated on first use with the given size
    /// hint. Idempotent: later calls return the same builder. After a tail
    /// call the builder is detached from the response and backs only
    /// pipelined lookups.
    fn results(&self, size_hint: Option<usize>) -> Results;

    /// Forwards this call's obligation to `request`'s target, delivering the
    /// forwarded pipeline to the `on_tail_call` subscriber if one exists.
    fn tail_call(self: Rc<Self>, request: Request) -> Promise<()>;

    /// Like `tail_call`, but hands the forwarded pipeline back to the caller
    /// instead of the subscriber.
    fn direct_tail_call(self: Rc<Self>, request: Request) -> StartedCall;

    /// Fires with the forwarded pipeline if the server tail-calls. Invoked
    /// at most once, by the client driving this context.
    fn on_tail_call(&self) -> Promise<Rc<dyn PipelineHook>>;

    /// Opts in to asynchronous cancellation. Requires the params to have
    /// been released first.
    fn allow_async_cancellation(&self);

    /// Whether the caller has dropped interest in the response.
    fn is_canceled(&self) -> bool;
}

/// An outbound call being assembled.
pub trait RequestHook {
    fn root_mut(&mut self) -> &mut Value;

    /// Consumes the request and dispatches it. Single use is enforced by
    /// ownership.
    fn send(self: Box<Self>) -> PendingResponse;

    fn brand(&self) -> Brand;
}

/// A completed response payload.
pub trait ResponseHook {
    fn root(&self) -> Ref<'_, Value>;
}
