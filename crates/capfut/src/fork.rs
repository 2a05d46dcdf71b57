//! # Ordered Promise Forks
//!
//! A `ForkedPromise` wraps a single-consumer future so that any number of
//! branches can observe its result. The result type must be `Clone`; sharing
//! an expensive value across branches is done by resolving to an `Rc`.
//!
//! Delivery order is part of the contract: when the inner future completes,
//! every branch that is currently waiting is woken in the order the branches
//! were created, and no branch observes the result within the same poll that
//! produced it. Branches created after completion observe the result on
//! their first poll.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::Context;
use std::task::Poll;
use std::task::Waker;

/// A multi-consumer wrapper around a single future.
///
/// The fork itself is just a handle factory; it may be dropped once all
/// desired branches exist. The inner future is dropped (cancelling whatever
/// it was doing) when the fork and every branch are gone.
pub struct ForkedPromise<T> {
    shared: Rc<RefCell<Shared<T>>>,
}

struct Shared<T> {
    state: State<T>,
    wakers: Vec<(u64, Waker)>,
    next_branch: u64,
}

enum State<T> {
    Pending(Pin<Box<dyn Future<Output = T>>>),
    Ready(T),
}

impl<T: Clone + 'static> ForkedPromise<T> {
    pub fn new(future: impl Future<Output = T> + 'static) -> Self {
        Self {
            shared: Rc::new(RefCell::new(Shared {
                state: State::Pending(Box::pin(future)),
                wakers: Vec::new(),
                next_branch: 0,
            })),
        }
    }

    /// Creates a new branch. Branch identity determines wake order on
    /// resolution.
    pub fn add_branch(&self) -> Branch<T> {
        let mut shared = self.shared.borrow_mut();
        let id = shared.next_branch;
        shared.next_branch += 1;
        Branch {
            shared: self.shared.clone(),
            id,
        }
    }
}

/// One consumer of a [`ForkedPromise`].
///
/// Whichever branch polls first drives the inner future. The inner future
/// must not itself poll a branch of the same fork.
pub struct Branch<T> {
    shared: Rc<RefCell<Shared<T>>>,
    id: u64,
}

impl<T: Clone> Future for Branch<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();
        let mut shared = this.shared.borrow_mut();

        if let State::Ready(value) = &shared.state {
            return Poll::Ready(value.clone());
        }

        register(&mut shared.wakers, this.id, cx.waker());

        let State::Pending(future) = &mut shared.state else {
            unreachable!()
        };
        match future.as_mut().poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(value) => {
                shared.state = State::Ready(value);
                let mut waiting = std::mem::take(&mut shared.wakers);
                drop(shared);
                waiting.sort_by_key(|(id, _)| *id);
                for (_, waker) in waiting {
                    waker.wake();
                }
                // The driving branch was woken along with everyone else; all
                // branches observe the value on a later poll, in id order.
                Poll::Pending
            }
        }
    }
}

impl<T> Drop for Branch<T> {
    fn drop(&mut self) {
        let mut shared = self.shared.borrow_mut();
        shared.wakers.retain(|(id, _)| *id != self.id);
    }
}

fn register(wakers: &mut Vec<(u64, Waker)>, id: u64, waker: &Waker) {
    match wakers.iter_mut().find(|(entry, _)| *entry == id) {
        Some(entry) => entry.1 = waker.clone(),
        None => wakers.push((id, waker.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::future::Future;

    use tokio::sync::oneshot;
    use tokio::task::LocalSet;

    async fn local<T>(future: impl Future<Output = T>) -> T {
        LocalSet::new().run_until(future).await
    }

    #[tokio::test]
    async fn every_branch_observes_the_value() {
        local(async {
            let fork = ForkedPromise::new(async { 42u32 });
            let first = fork.add_branch();
            let second = fork.add_branch();
            assert_eq!(first.await, 42);
            assert_eq!(second.await, 42);
        })
        .await;
    }

    #[tokio::test]
    async fn branch_added_after_resolution_fires_immediately() {
        local(async {
            let fork = ForkedPromise::new(async { "done" });
            fork.add_branch().await;
            assert_eq!(fork.add_branch().await, "done");
        })
        .await;
    }

    #[tokio::test]
    async fn branches_fire_in_addition_order() {
        local(async {
            let (tx, rx) = oneshot::channel::<u32>();
            let fork = ForkedPromise::new(async move { rx.await.expect("sender kept") });

            let log = Rc::new(RefCell::new(Vec::new()));
            let mut watchers = Vec::new();
            for expected in 0..4u32 {
                let branch = fork.add_branch();
                let log = log.clone();
                watchers.push(tokio::task::spawn_local(async move {
                    let value = branch.await;
                    log.borrow_mut().push((expected, value));
                }));
            }

            // Let every watcher register before resolving.
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
            tx.send(7).expect("watchers alive");
            for watcher in watchers {
                watcher.await.expect("watcher ran");
            }

            let observed: Vec<u32> = log.borrow().iter().map(|(id, _)| *id).collect();
            assert_eq!(observed, vec![0, 1, 2, 3]);
            assert!(log.borrow().iter().all(|(_, value)| *value == 7));
        })
        .await;
    }

    #[tokio::test]
    async fn dropping_one_branch_does_not_affect_the_rest() {
        local(async {
            let (tx, rx) = oneshot::channel::<u32>();
            let fork = ForkedPromise::new(async move { rx.await.expect("sender kept") });
            let kept = fork.add_branch();
            let dropped = fork.add_branch();
            drop(dropped);
            tx.send(9).expect("branch alive");
            assert_eq!(kept.await, 9);
        })
        .await;
    }

    #[tokio::test]
    async fn dropping_every_handle_cancels_the_inner_future() {
        struct SetOnDrop(Rc<RefCell<bool>>);
        impl Drop for SetOnDrop {
            fn drop(&mut self) {
                *self.0.borrow_mut() = true;
            }
        }

        local(async {
            let cancelled = Rc::new(RefCell::new(false));
            let guard = SetOnDrop(cancelled.clone());
            let fork = ForkedPromise::new(async move {
                let _guard = guard;
                std::future::pending::<()>().await;
            });
            let branch = fork.add_branch();
            drop(fork);
            assert!(!*cancelled.borrow());
            drop(branch);
            assert!(*cancelled.borrow());
        })
        .await;
    }
}
