//! Deferred evaluation.

use std::future::Future;

/// Defers `thunk` to a subsequent event-loop turn.
///
/// The returned future yields once before invoking the thunk, so the thunk
/// never runs inside the stack frame that built it, and anything already
/// scheduled on the local queue runs first. Like any future, the deferral is
/// inert until polled.
pub fn eval_later<F, Fut>(thunk: F) -> impl Future<Output = Fut::Output>
where
    F: FnOnce() -> Fut,
    Fut: Future,
{
    async move {
        tokio::task::yield_now().await;
        thunk().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::Cell;
    use std::rc::Rc;

    use tokio::task::LocalSet;

    #[tokio::test]
    async fn thunk_does_not_run_synchronously() {
        LocalSet::new()
            .run_until(async {
                let ran = Rc::new(Cell::new(false));
                let flag = ran.clone();
                let deferred = eval_later(move || async move {
                    flag.set(true);
                    5u32
                });
                assert!(!ran.get());
                assert_eq!(deferred.await, 5);
                assert!(ran.get());
            })
            .await;
    }

    #[tokio::test]
    async fn already_queued_work_runs_before_the_thunk() {
        LocalSet::new()
            .run_until(async {
                let log = Rc::new(std::cell::RefCell::new(Vec::new()));

                let early = log.clone();
                tokio::task::spawn_local(async move {
                    early.borrow_mut().push("queued");
                });

                let late = log.clone();
                eval_later(move || async move {
                    late.borrow_mut().push("deferred");
                })
                .await;

                assert_eq!(*log.borrow(), vec!["queued", "deferred"]);
            })
            .await;
    }
}
