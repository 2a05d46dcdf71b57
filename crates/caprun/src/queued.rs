//! # Call Queues
//!
//! Buffering for capabilities that do not exist yet. A [`QueuedClient`]
//! fronts a future client hook and forwards buffered calls, in order, once
//! the real hook arrives; a [`QueuedPipeline`] does the same for pipelined
//! sub-capability lookups against a future pipeline.
//!
//! Both lean on the ordered fork: the resolution future is forked into a
//! fixed set of branches consumed in a fixed order, which is what makes the
//! visible interleaving deterministic. Buffered calls are initiated before
//! any resolution watcher fires, and resolution watchers fire before any
//! buffered call's completion becomes observable (the local dispatch defers
//! by at least one extra turn).

use std::cell::RefCell;
use std::rc::Rc;
use std::rc::Weak;

use capfut::Branch;
use capfut::ForkedPromise;
use capfut::ScopedTask;

use crate::broken;
use crate::error::Result;
use crate::local::local_request;
use crate::request::Request;
use crate::traits::Brand;
use crate::traits::CallContextHook;
use crate::traits::ClientHook;
use crate::traits::PipelineHook;
use crate::traits::PipelineOp;
use crate::traits::Promise;
use crate::traits::StartedCall;

type ClientResolution = Result<Rc<dyn ClientHook>>;
type PipelineResolution = Result<Rc<dyn PipelineHook>>;

/// A capability that buffers calls until its resolution future settles.
pub(crate) struct QueuedClient {
    /// Set once the resolution future settles; later operations take the
    /// direct path.
    redirect: RefCell<Option<Rc<dyn ClientHook>>>,
    /// Forwards each buffered call. Branches of this fork fire before any
    /// `resolution_fork` branch, so buffered calls are initiated ahead of
    /// resolution watchers.
    call_fork: ForkedPromise<ClientResolution>,
    /// Fuels `when_more_resolved`.
    resolution_fork: ForkedPromise<ClientResolution>,
    /// Populates `redirect`; aborted if the client is dropped first.
    _self_resolution: ScopedTask,
}

impl QueuedClient {
    /// Wraps a future client hook. The future must not hold a strong
    /// reference back to the returned client, or the pair would leak.
    pub(crate) fn new(
        resolution: impl std::future::Future<Output = ClientResolution> + 'static,
    ) -> Rc<Self> {
        let fork = ForkedPromise::new(resolution);
        // Branch order is load-bearing: self-resolution first, then call
        // forwarding, then watcher resolution.
        let self_branch = fork.add_branch();
        let call_fork = ForkedPromise::new(fork.add_branch());
        let resolution_fork = ForkedPromise::new(fork.add_branch());

        Rc::new_cyclic(|weak: &Weak<QueuedClient>| {
            let weak = weak.clone();
            let self_resolution = ScopedTask::spawn(async move {
                let resolution = self_branch.await;
                let Some(client) = weak.upgrade() else {
                    return;
                };
                let inner = match resolution {
                    Ok(inner) => inner,
                    Err(error) => {
                        tracing::debug!(%error, "queued client resolved to a failure");
                        broken::broken_client(error)
                    }
                };
                *client.redirect.borrow_mut() = Some(inner);
            });
            QueuedClient {
                redirect: RefCell::new(None),
                call_fork,
                resolution_fork,
                _self_resolution: self_resolution,
            }
        })
    }
}

/// The two halves of a forwarded call, shared between the branch that needs
/// the completion and the branch that needs the pipeline. Each half is
/// claimed by exactly one branch.
struct ForwardedCall {
    completion: RefCell<Option<Promise<()>>>,
    pipeline: Rc<dyn PipelineHook>,
}

impl ClientHook for QueuedClient {
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
        // Initiation happens later, when the real client is known, but the
        // completion and the pipeline must exist now. Chain the forwarding
        // off the call fork, then fork the forwarded pair so each half goes
        // to its own consumer.
        let forward_branch = self.call_fork.add_branch();
        let forwarded = ForkedPromise::new(async move {
            let client = forward_branch.await?;
            let started = client.call(interface_id, method_id, context);
            Ok(Rc::new(ForwardedCall {
                completion: RefCell::new(Some(started.completion)),
                pipeline: started.pipeline,
            }))
        });

        let pipeline_branch = forwarded.add_branch();
        let pipeline: Rc<dyn PipelineHook> = QueuedPipeline::new(async move {
            let forwarded = pipeline_branch.await?;
            Ok(forwarded.pipeline.clone())
        });

        let completion_branch = forwarded.add_branch();
        let completion: Promise<()> = Box::pin(async move {
            let forwarded = completion_branch.await?;
            let completion = forwarded
                .completion
                .borrow_mut()
                .take()
                .expect("forwarded completion claimed twice");
            completion.await
        });

        StartedCall {
            completion,
            pipeline,
        }
    }

    fn get_resolved(&self) -> Option<Rc<dyn ClientHook>> {
        self.redirect.borrow().clone()
    }

    fn when_more_resolved(&self) -> Option<Promise<Rc<dyn ClientHook>>> {
        Some(Box::pin(self.resolution_fork.add_branch()))
    }

    fn brand(&self) -> Brand {
        Brand::NULL
    }
}

/// A pipeline that buffers sub-capability lookups until the real pipeline
/// arrives.
pub(crate) struct QueuedPipeline {
    redirect: RefCell<Option<Rc<dyn PipelineHook>>>,
    fork: ForkedPromise<PipelineResolution>,
    _self_resolution: ScopedTask,
}

impl QueuedPipeline {
    pub(crate) fn new(
        resolution: impl std::future::Future<Output = PipelineResolution> + 'static,
    ) -> Rc<Self> {
        let fork = ForkedPromise::new(resolution);
        let self_branch = fork.add_branch();

        Rc::new_cyclic(|weak: &Weak<QueuedPipeline>| {
            let weak = weak.clone();
            let self_resolution = ScopedTask::spawn(async move {
                let resolution = self_branch.await;
                let Some(pipeline) = weak.upgrade() else {
                    return;
                };
                let inner = match resolution {
                    Ok(inner) => inner,
                    // A failed call never fails its pipeline distinctly; the
                    // sub-capabilities break with the originating cause.
                    Err(error) => broken::broken_pipeline(error),
                };
                *pipeline.redirect.borrow_mut() = Some(inner);
            });
            QueuedPipeline {
                redirect: RefCell::new(None),
                fork,
                _self_resolution: self_resolution,
            }
        })
    }
}

impl PipelineHook for QueuedPipeline {
    fn get_pipelined_cap(&self, ops: Vec<PipelineOp>) -> Rc<dyn ClientHook> {
        if let Some(inner) = &*self.redirect.borrow() {
            return inner.get_pipelined_cap(ops);
        }
        let branch: Branch<PipelineResolution> = self.fork.add_branch();
        let client: Rc<dyn ClientHook> = QueuedClient::new(async move {
            let pipeline = branch.await?;
            Ok(pipeline.get_pipelined_cap(ops))
        });
        client
    }
}
