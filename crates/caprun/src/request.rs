//! # Outbound Calls
//!
//! The caller-side wrappers: a [`Request`] being assembled, the
//! [`PendingResponse`] a send returns, the [`Response`] it settles to, and
//! the [`Pipeline`] over the response's sub-capabilities.

use std::cell::Ref;
use std::rc::Rc;

use crate::client::Client;
use crate::message::Value;
use crate::traits::Brand;
use crate::traits::PipelineHook;
use crate::traits::PipelineOp;
use crate::traits::Promise;
use crate::traits::RequestHook;
use crate::traits::ResponseHook;

/// An outbound call being assembled. Consumed by [`send`](Self::send); the
/// builder cannot be reused or sent twice.
pub struct Request {
    hook: Box<dyn RequestHook>,
}

impl Request {
    pub(crate) fn from_hook(hook: Box<dyn RequestHook>) -> Self {
        Self { hook }
    }

    /// Mutable access to the request payload root.
    pub fn root_mut(&mut self) -> &mut Value {
        self.hook.root_mut()
    }

    /// Replaces the request payload root outright.
    pub fn set_root(&mut self, value: Value) {
        *self.hook.root_mut() = value;
    }

    pub fn brand(&self) -> Brand {
        self.hook.brand()
    }

    /// Dispatches the call.
    pub fn send(self) -> PendingResponse {
        self.hook.send()
    }
}

/// A call in flight: the future response plus the pipeline over it.
///
/// The halves are independent. Dropping the response future does not retract
/// the call (see the cancellation policy on `CallContext`); dropping both
/// halves does.
pub struct PendingResponse {
    pub response: Promise<Response>,
    pub pipeline: Pipeline,
}

/// A completed response payload.
#[derive(Clone)]
pub struct Response {
    hook: Rc<dyn ResponseHook>,
}

impl Response {
    pub(crate) fn from_hook(hook: Rc<dyn ResponseHook>) -> Self {
        Self { hook }
    }

    pub fn root(&self) -> Ref<'_, Value> {
        self.hook.root()
    }

    pub fn field(&self, index: u16) -> Option<Ref<'_, Value>> {
        Ref::filter_map(self.hook.root(), |root| root.field(index)).ok()
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response").field("root", &*self.root()).finish()
    }
}

/// The sub-capability view over a response that may not have arrived yet.
#[derive(Clone)]
pub struct Pipeline {
    hook: Rc<dyn PipelineHook>,
}

impl Pipeline {
    pub(crate) fn from_hook(hook: Rc<dyn PipelineHook>) -> Self {
        Self { hook }
    }

    /// The capability at `ops` within the eventual response. The op sequence
    /// is copied; see [`get_pipelined_cap_owned`](Self::get_pipelined_cap_owned)
    /// to hand one over.
    pub fn get_pipelined_cap(&self, ops: &[PipelineOp]) -> Client {
        self.get_pipelined_cap_owned(ops.to_vec())
    }

    pub fn get_pipelined_cap_owned(&self, ops: Vec<PipelineOp>) -> Client {
        Client::from_hook(self.hook.get_pipelined_cap(ops))
    }

    /// Shorthand for the capability in one root field of the response.
    pub fn field(&self, index: u16) -> Client {
        self.get_pipelined_cap_owned(vec![PipelineOp::GetField(index)])
    }

    pub(crate) fn hook(&self) -> Rc<dyn PipelineHook> {
        self.hook.clone()
    }
}
