//! # Capability Clients and Servers
//!
//! The public handle types. A [`Client`] is a shared-ownership reference to
//! some capability; a [`Server`] is the application object a local client
//! dispatches into; a [`CallContext`] is the server's view of one call in
//! flight.

use std::future::Future;
use std::rc::Rc;

use async_trait::async_trait;

use crate::broken;
use crate::error::Error;
use crate::error::Result;
use crate::local::LocalClient;
use crate::local::Results;
use crate::message::Message;
use crate::queued::QueuedClient;
use crate::request::Request;
use crate::traits;
use crate::traits::Brand;
use crate::traits::CallContextHook;
use crate::traits::ClientHook;
use crate::traits::Promise;
use crate::traits::StartedCall;

/// A handle to a capability.
///
/// Clones share one underlying hook; the hook dies with the last handle.
#[derive(Clone)]
pub struct Client {
    hook: Rc<dyn ClientHook>,
}

impl Client {
    /// Wraps a server object in a capability hosted on the current event
    /// loop. The server is owned exclusively by the new client.
    pub fn from_server(server: impl Server + 'static) -> Self {
        Self::from_hook(LocalClient::new(server))
    }

    /// Wraps a capability that does not exist yet. Calls made before the
    /// future resolves are buffered and forwarded in order on resolution.
    pub fn from_future(future: impl Future<Output = Result<Client>> + 'static) -> Self {
        Self::from_hook(QueuedClient::new(async move {
            Ok(future.await?.hook)
        }))
    }

    /// A capability that fails every operation with the recorded cause.
    pub fn broken(error: Error) -> Self {
        tracing::debug!(%error, "created broken capability");
        Self::from_hook(broken::broken_client(error))
    }

    /// The null capability: broken, with a cause saying so.
    pub fn null() -> Self {
        Self::from_hook(broken::broken_client(Error::failed("called null capability")))
    }

    /// Adopts an externally built hook, e.g. one supplied by a transport.
    pub fn from_hook(hook: Rc<dyn ClientHook>) -> Self {
        Self { hook }
    }

    /// Begins a call to `method_id` on `interface_id`, returning the request
    /// to fill in and send.
    pub fn new_call(&self, interface_id: u64, method_id: u16, size_hint: Option<usize>) -> Request {
        self.hook.clone().new_call(interface_id, method_id, size_hint)
    }

    /// If this capability is a promise that has already resolved, the
    /// resolution.
    pub fn get_resolved(&self) -> Option<Client> {
        self.hook.get_resolved().map(Self::from_hook)
    }

    /// Settles when this capability is fully resolved (a no-op for concrete
    /// capabilities). Fails if resolution fails.
    pub fn when_resolved(&self) -> Promise<()> {
        traits::when_resolved(self.hook.clone())
    }

    pub fn brand(&self) -> Brand {
        self.hook.brand()
    }

    /// Whether two handles share one hook.
    pub fn is_same(&self, other: &Client) -> bool {
        Rc::ptr_eq(&self.hook, &other.hook)
    }

    pub fn hook(&self) -> &Rc<dyn ClientHook> {
        &self.hook
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("brand", &self.hook.brand())
            .finish_non_exhaustive()
    }
}

/// An application object backing a local capability.
///
/// Dispatch receives the raw interface and method ids plus the call context;
/// decoding params, writing results, tail-calling and cancellation polling
/// all go through the context.
#[async_trait(?Send)]
pub trait Server {
    async fn dispatch(&self, interface_id: u64, method_id: u16, context: CallContext)
        -> Result<()>;

    /// Canned failure for an interface this server does not implement.
    fn unimplemented_interface(&self, interface_id: u64) -> Result<()> {
        Err(Error::unimplemented_interface(interface_id))
    }

    /// Canned failure for a method this server does not implement.
    fn unimplemented_method(&self, interface_id: u64, method_id: u16) -> Result<()> {
        Err(Error::unimplemented_method(interface_id, method_id))
    }
}

/// The server-side view of one call in flight.
#[derive(Clone)]
pub struct CallContext {
    hook: Rc<dyn CallContextHook>,
}

impl CallContext {
    pub(crate) fn new(hook: Rc<dyn CallContextHook>) -> Self {
        Self { hook }
    }

    /// The request payload. Panics if the params have been released.
    pub fn params(&self) -> Params {
        self.hook.params()
    }

    /// Frees the request message before the call completes.
    pub fn release_params(&self) {
        self.hook.release_params();
    }

    /// The response builder, allocated on first use.
    pub fn results(&self) -> Results {
        self.hook.results(None)
    }

    /// Like [`results`](Self::results), with an explicit first-allocation
    /// size hint.
    pub fn results_sized(&self, size_hint: usize) -> Results {
        self.hook.results(Some(size_hint))
    }

    /// Forwards this call to another capability; the returned promise is the
    /// forwarded call's completion and should become the dispatch result.
    pub fn tail_call(&self, request: Request) -> Promise<()> {
        self.hook.clone().tail_call(request)
    }

    /// Like [`tail_call`](Self::tail_call), but hands the forwarded
    /// completion and pipeline back to the server instead of delivering the
    /// pipeline to the caller's subscriber.
    pub fn direct_tail_call(&self, request: Request) -> StartedCall {
        self.hook.clone().direct_tail_call(request)
    }

    /// Permits the runtime to drop the dispatch future if the caller loses
    /// interest. Requires `release_params` first.
    pub fn allow_async_cancellation(&self) {
        self.hook.allow_async_cancellation();
    }

    /// Whether the caller has dropped interest in the response.
    pub fn is_canceled(&self) -> bool {
        self.hook.is_canceled()
    }
}

/// A read-only view of a call's request payload.
#[derive(Clone)]
pub struct Params {
    message: Rc<Message>,
}

impl Params {
    pub(crate) fn new(message: Rc<Message>) -> Self {
        Self { message }
    }

    pub fn root(&self) -> &crate::message::Value {
        self.message.root()
    }

    pub fn field(&self, index: u16) -> Option<&crate::message::Value> {
        self.message.root().field(index)
    }
}
