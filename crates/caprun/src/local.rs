//! # The Local Call Path
//!
//! How a call on an in-process capability is queued, dispatched and
//! completed. A [`LocalClient`] owns the server object; a [`LocalRequest`]
//! carries the outbound message; a [`LocalCallContext`] is the per-call
//! record shared between the caller-side response future and the
//! server-side dispatch future; a [`LocalPipeline`] serves pipelined caps
//! once the response exists.
//!
//! Dispatch is never synchronous: `call` schedules the server through a
//! deferred turn, both to keep re-entrant servers safe and because the
//! queued-client ordering guarantees lean on the extra turn.

use std::cell::Cell;
use std::cell::Ref;
use std::cell::RefCell;
use std::cell::RefMut;
use std::rc::Rc;

use capfut::eval_later;
use capfut::race;
use capfut::spawn_daemon;
use capfut::ForkedPromise;
use tokio::sync::oneshot;

use crate::client::CallContext;
use crate::client::Params;
use crate::client::Server;
use crate::message::pipelined_cap;
use crate::message::Message;
use crate::message::Value;
use crate::queued::QueuedPipeline;
use crate::request::PendingResponse;
use crate::request::Pipeline;
use crate::request::Request;
use crate::request::Response;
use crate::traits::Brand;
use crate::traits::CallContextHook;
use crate::traits::ClientHook;
use crate::traits::PipelineHook;
use crate::traits::PipelineOp;
use crate::traits::Promise;
use crate::traits::RequestHook;
use crate::traits::ResponseHook;
use crate::traits::StartedCall;

/// A capability backed by an in-process server object.
pub(crate) struct LocalClient {
    server: Box<dyn Server>,
}

impl LocalClient {
    pub(crate) fn new(server: impl Server + 'static) -> Rc<dyn ClientHook> {
        Rc::new(Self {
            server: Box::new(server),
        })
    }
}

impl ClientHook for LocalClient {
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
        interface_id: u64,
        method_id: u16,
        context: Rc<dyn CallContextHook>,
    ) -> StartedCall {
        tracing::trace!(interface_id, method_id, "scheduling local dispatch");

        // The server must not run inside the caller's stack frame: it may
        // hold locks the caller also holds, and the queued-client ordering
        // relies on completions landing at least one turn after initiation.
        let dispatch = eval_later({
            let client = self.clone();
            let context = context.clone();
            move || async move {
                client
                    .server
                    .dispatch(interface_id, method_id, CallContext::new(context))
                    .await
            }
        });
        let forked = ForkedPromise::new(dispatch);

        let pipeline_branch = forked.add_branch();
        let pipeline_context = context.clone();
        let pipeline_promise = async move {
            pipeline_branch.await?;
            pipeline_context.release_params();
            let pipeline: Rc<dyn PipelineHook> = Rc::new(LocalPipeline::new(pipeline_context));
            Ok(pipeline)
        };
        // Whichever fires first supplies the pipeline: normal completion, or
        // the server forwarding the call elsewhere.
        let tail_pipeline = context.on_tail_call();
        let pipeline: Rc<dyn PipelineHook> =
            QueuedPipeline::new(race(pipeline_promise, tail_pipeline));

        let completion_branch = forked.add_branch();
        let completion_context = context;
        let completion: Promise<()> = Box::pin(async move {
            let _context = completion_context;
            completion_branch.await
        });

        StartedCall {
            completion,
            pipeline,
        }
    }

    fn get_resolved(&self) -> Option<Rc<dyn ClientHook>> {
        None
    }

    fn when_more_resolved(&self) -> Option<Promise<Rc<dyn ClientHook>>> {
        None
    }

    fn brand(&self) -> Brand {
        Brand::NULL
    }
}

/// Builds a request bound to `client`, to be dispatched through its `call`.
pub(crate) fn local_request(
    client: Rc<dyn ClientHook>,
    interface_id: u64,
    method_id: u16,
    size_hint: Option<usize>,
) -> Request {
    Request::from_hook(Box::new(LocalRequest {
        message: Message::new(size_hint),
        interface_id,
        method_id,
        client,
    }))
}

/// A single-use outbound call.
struct LocalRequest {
    message: Message,
    interface_id: u64,
    method_id: u16,
    client: Rc<dyn ClientHook>,
}

impl RequestHook for LocalRequest {
    fn root_mut(&mut self) -> &mut Value {
        self.message.root_mut()
    }

    fn brand(&self) -> Brand {
        Brand::NULL
    }

    fn send(self: Box<Self>) -> PendingResponse {
        let LocalRequest {
            message,
            interface_id,
            method_id,
            client,
        } = *self;

        let (allow_cancel, cancel_allowed) = oneshot::channel();
        let context = Rc::new(LocalCallContext::new(message, client.clone(), allow_cancel));
        let started = client.call(interface_id, method_id, context.clone());

        // Dropping the caller's half must not cancel an unready server, so
        // the completion is forked and one branch detached. The detached
        // branch ends early only once the server has explicitly allowed
        // async cancellation.
        let forked = ForkedPromise::new(started.completion);
        let daemon_branch = forked.add_branch();
        let daemon_context = context.clone();
        spawn_daemon(async move {
            let _context = daemon_context;
            race(daemon_branch, async move {
                let _ = cancel_allowed.await;
                Ok(())
            })
            .await
        });

        let caller_branch = forked.add_branch();
        let caller_context = context;
        let response: Promise<Response> = Box::pin(async move {
            let _canceler = Canceler::new(caller_context.clone());
            caller_branch.await?;
            caller_context.ensure_response();
            let response = caller_context
                .take_response()
                .expect("completed call left no response");
            Ok(response)
        });

        PendingResponse {
            response,
            pipeline: Pipeline::from_hook(started.pipeline),
        }
    }
}

/// The per-call record.
///
/// Created at send, kept alive by the dispatch future and the caller's
/// response future, dropped when both are done with it.
pub(crate) struct LocalCallContext {
    request: RefCell<Option<Rc<Message>>>,
    response: RefCell<Option<Response>>,
    local_response: RefCell<Option<Rc<LocalResponse>>>,
    /// Keeps the callee alive for the duration of the call.
    _client: Rc<dyn ClientHook>,
    tail_pipeline: RefCell<Option<oneshot::Sender<Rc<dyn PipelineHook>>>>,
    cancel_allowed: RefCell<Option<oneshot::Sender<()>>>,
    cancel_requested: Cell<bool>,
}

impl LocalCallContext {
    pub(crate) fn new(
        message: Message,
        client: Rc<dyn ClientHook>,
        cancel_allowed: oneshot::Sender<()>,
    ) -> Self {
        Self {
            request: RefCell::new(Some(Rc::new(message))),
            response: RefCell::new(None),
            local_response: RefCell::new(None),
            _client: client,
            tail_pipeline: RefCell::new(None),
            cancel_allowed: RefCell::new(Some(cancel_allowed)),
            cancel_requested: Cell::new(false),
        }
    }

    /// Allocates the response if the call produced none, so the caller
    /// always receives one.
    fn ensure_response(&self) {
        let allocated = self.response.borrow().is_some();
        if !allocated {
            self.results(Some(1));
        }
    }

    fn take_response(&self) -> Option<Response> {
        self.response.borrow_mut().take()
    }
}

impl CallContextHook for LocalCallContext {
    fn params(&self) -> Params {
        match &*self.request.borrow() {
            Some(message) => Params::new(message.clone()),
            None => panic!("params() called after release_params()"),
        }
    }

    fn release_params(&self) {
        self.request.borrow_mut().take();
    }

    fn results(&self, size_hint: Option<usize>) -> Results {
        if let Some(existing) = &*self.local_response.borrow() {
            return Results::new(existing.clone());
        }
        let local = Rc::new(LocalResponse::new(size_hint));
        *self.local_response.borrow_mut() = Some(local.clone());
        // After a tail call the response already belongs to the forwarded
        // request; the builder allocated here stays detached and only backs
        // pipelined lookups.
        let mut response = self.response.borrow_mut();
        if response.is_none() {
            *response = Some(Response::from_hook(local.clone()));
        }
        Results::new(local)
    }

    fn tail_call(self: Rc<Self>, request: Request) -> Promise<()> {
        let forwarded = self.clone().direct_tail_call(request);
        if let Some(subscriber) = self.tail_pipeline.borrow_mut().take() {
            // A missing subscriber means nobody asked for the forwarded
            // pipeline; the discard is deliberate.
            let _ = subscriber.send(forwarded.pipeline.clone());
        }
        forwarded.completion
    }

    fn direct_tail_call(self: Rc<Self>, request: Request) -> StartedCall {
        assert!(
            self.response.borrow().is_none(),
            "tail_call() is not allowed after the results have been allocated"
        );
        tracing::debug!("forwarding call via tail call");
        self.release_params();

        let sent = request.send();
        let pipeline = sent.pipeline.hook();
        let context = self;
        let completion: Promise<()> = Box::pin(async move {
            let response = sent.response.await?;
            *context.response.borrow_mut() = Some(response);
            Ok(())
        });

        StartedCall {
            completion,
            pipeline,
        }
    }

    fn on_tail_call(&self) -> Promise<Rc<dyn PipelineHook>> {
        let (sender, receiver) = oneshot::channel();
        *self.tail_pipeline.borrow_mut() = Some(sender);
        Box::pin(async move {
            match receiver.await {
                Ok(pipeline) => Ok(pipeline),
                // The context went away without tail-calling; stay pending
                // so the regular pipeline path wins the race.
                Err(_) => std::future::pending().await,
            }
        })
    }

    fn allow_async_cancellation(&self) {
        assert!(
            self.request.borrow().is_none(),
            "must call release_params() before allow_async_cancellation()"
        );
        if let Some(signal) = self.cancel_allowed.borrow_mut().take() {
            let _ = signal.send(());
        }
    }

    fn is_canceled(&self) -> bool {
        self.cancel_requested.get()
    }
}

/// Flags the context when the caller-side response future goes away, so the
/// server can notice via `is_canceled` and return early voluntarily.
struct Canceler {
    context: Rc<LocalCallContext>,
}

impl Canceler {
    fn new(context: Rc<LocalCallContext>) -> Self {
        Self { context }
    }
}

impl Drop for Canceler {
    fn drop(&mut self) {
        self.context.cancel_requested.set(true);
    }
}

/// A locally allocated response message.
pub(crate) struct LocalResponse {
    message: RefCell<Message>,
}

impl LocalResponse {
    fn new(size_hint: Option<usize>) -> Self {
        Self {
            message: RefCell::new(Message::new(size_hint)),
        }
    }
}

impl ResponseHook for LocalResponse {
    fn root(&self) -> Ref<'_, Value> {
        Ref::map(self.message.borrow(), Message::root)
    }
}

/// The response builder handed to servers. Clones share one response;
/// repeated `results()` calls on a context return the same builder.
#[derive(Clone)]
pub struct Results {
    response: Rc<LocalResponse>,
}

impl Results {
    pub(crate) fn new(response: Rc<LocalResponse>) -> Self {
        Self { response }
    }

    pub fn root(&self) -> Ref<'_, Value> {
        self.response.root()
    }

    pub fn root_mut(&self) -> RefMut<'_, Value> {
        RefMut::map(self.response.message.borrow_mut(), Message::root_mut)
    }

    pub fn set_root(&self, value: Value) {
        *self.root_mut() = value;
    }

    /// Writes one field of the root struct, padding gaps with nulls.
    pub fn set_field(&self, index: u16, value: Value) {
        self.response.message.borrow_mut().set_field(index, value);
    }
}

/// The pipeline over a response that already exists.
struct LocalPipeline {
    /// Held so the response outlives any pipelined handle.
    _context: Rc<dyn CallContextHook>,
    results: Results,
}

impl LocalPipeline {
    fn new(context: Rc<dyn CallContextHook>) -> Self {
        let results = context.results(Some(1));
        Self {
            _context: context,
            results,
        }
    }
}

impl PipelineHook for LocalPipeline {
    fn get_pipelined_cap(&self, ops: Vec<PipelineOp>) -> Rc<dyn ClientHook> {
        let root = self.results.root();
        pipelined_cap(&root, &ops).hook().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::client::Client;
    use crate::error::Error;

    fn context() -> Rc<LocalCallContext> {
        let (cancel_allowed, _cancel_requested) = oneshot::channel();
        let client = Client::broken(Error::failed("test target")).hook().clone();
        Rc::new(LocalCallContext::new(
            Message::new(None),
            client,
            cancel_allowed,
        ))
    }

    #[test]
    fn params_are_readable_until_released() {
        let context = context();
        assert_eq!(context.params().field(0), None);
        context.release_params();
    }

    #[test]
    #[should_panic(expected = "params() called after release_params()")]
    fn params_after_release_is_a_contract_violation() {
        let context = context();
        context.release_params();
        let _ = context.params();
    }

    #[test]
    #[should_panic(expected = "must call release_params() before allow_async_cancellation()")]
    fn cancellation_opt_in_requires_released_params() {
        let context = context();
        context.allow_async_cancellation();
    }

    #[test]
    fn results_builder_is_idempotent() {
        let context = context();
        let first = context.results(None);
        first.set_field(0, Value::U64(11));
        let second = context.results(Some(32));
        assert_eq!(second.root().field(0), Some(&Value::U64(11)));
    }

    #[test]
    #[should_panic(expected = "tail_call() is not allowed after the results have been allocated")]
    fn tail_call_after_results_is_a_contract_violation() {
        let context = context();
        let _ = context.results(None);
        let target = Client::broken(Error::failed("tail target"));
        let request = target.new_call(1, 1, None);
        let _ = context.direct_tail_call(request);
    }
}
