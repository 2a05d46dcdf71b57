//! Take-first-winner combination.

use std::future::Future;

/// Resolves to the result of whichever future settles first and drops the
/// other. When both are ready on the same poll, `left` wins.
pub async fn race<T>(left: impl Future<Output = T>, right: impl Future<Output = T>) -> T {
    tokio::select! {
        biased;
        value = left => value,
        value = right => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::Cell;
    use std::rc::Rc;

    use tokio::sync::oneshot;
    use tokio::task::LocalSet;

    struct SetOnDrop(Rc<Cell<bool>>);
    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.set(true);
        }
    }

    #[tokio::test]
    async fn first_winner_takes_the_race() {
        LocalSet::new()
            .run_until(async {
                let (_tx, rx) = oneshot::channel::<u32>();
                let slow = async move { rx.await.unwrap_or(0) };
                let value = race(slow, async { 3 }).await;
                assert_eq!(value, 3);
            })
            .await;
    }

    #[tokio::test]
    async fn loser_is_dropped() {
        LocalSet::new()
            .run_until(async {
                let dropped = Rc::new(Cell::new(false));
                let guard = SetOnDrop(dropped.clone());
                let loser = async move {
                    let _guard = guard;
                    std::future::pending::<u32>().await
                };
                assert_eq!(race(async { 1 }, loser).await, 1);
                assert!(dropped.get());
            })
            .await;
    }
}
