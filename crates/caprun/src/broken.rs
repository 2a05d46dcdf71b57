//! # Broken Capabilities
//!
//! A broken capability records one failure and replays it from every
//! operation: calls fail with it, and pipelined sub-capabilities are broken
//! with the same cause, recursively.

use std::rc::Rc;

use crate::error::Error;
use crate::local::local_request;
use crate::request::Request;
use crate::traits::resolved;
use crate::traits::Brand;
use crate::traits::CallContextHook;
use crate::traits::ClientHook;
use crate::traits::PipelineHook;
use crate::traits::PipelineOp;
use crate::traits::Promise;
use crate::traits::StartedCall;

pub(crate) fn broken_client(error: Error) -> Rc<dyn ClientHook> {
    Rc::new(BrokenClient { error })
}

pub(crate) fn broken_pipeline(error: Error) -> Rc<dyn PipelineHook> {
    Rc::new(BrokenPipeline { error })
}

struct BrokenClient {
    error: Error,
}

impl ClientHook for BrokenClient {
    fn new_call(
        self: Rc<Self>,
        interface_id: u64,
        method_id: u16,
        size_hint: Option<usize>,
    ) -> Request {
        local_request(self, interface_id, method_id, size_hint)
    }

    fn call(
        self: Rc<Self>,
        _interface_id: u64,
        _method_id: u16,
        _context: Rc<dyn CallContextHook>,
    ) -> StartedCall {
        StartedCall {
            completion: resolved(Err(self.error.clone())),
            pipeline: broken_pipeline(self.error.clone()),
        }
    }

    fn get_resolved(&self) -> Option<Rc<dyn ClientHook>> {
        None
    }

    fn when_more_resolved(&self) -> Option<Promise<Rc<dyn ClientHook>>> {
        // Broken is terminal; there is nothing further to resolve to.
        None
    }

    fn brand(&self) -> Brand {
        Brand::NULL
    }
}

struct BrokenPipeline {
    error: Error,
}

impl PipelineHook for BrokenPipeline {
    fn get_pipelined_cap(&self, _ops: Vec<PipelineOp>) -> Rc<dyn ClientHook> {
        broken_client(self.error.clone())
    }
}
