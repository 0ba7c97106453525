//! Subscription bookkeeping and stream combinators over `watch` channels.

use std::future::Future;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::trace;

/// Owns every subscription task of one binding. Disposing or dropping aborts them all.
#[derive(Default)]
pub struct DisposeBag {
    tasks: Vec<JoinHandle<()>>,
}

impl DisposeBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, task: JoinHandle<()>) {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(task);
    }

    /// Spawn `future` on the runtime and keep it until disposal.
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.insert(tokio::spawn(future));
    }

    pub fn len(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }

    pub fn dispose(&mut self) {
        if !self.tasks.is_empty() {
            trace!(tasks = self.tasks.len(), "Disposing subscriptions");
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for DisposeBag {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Resolves when `rx` sees a new value; never resolves once its sender is gone.
pub async fn next_change<T>(rx: &mut watch::Receiver<T>) {
    if rx.changed().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Resolves when either receiver sees a new value.
pub async fn either_change<A, B>(a: &mut watch::Receiver<A>, b: &mut watch::Receiver<B>) {
    tokio::select! {
        _ = next_change(a) => {}
        _ = next_change(b) => {}
    }
}

/// Calls `f` with the current value and then with every later value, until the sender is gone.
pub async fn for_each<T, F>(mut rx: watch::Receiver<T>, mut f: F)
where
    T: Clone,
    F: FnMut(T),
{
    loop {
        let value = rx.borrow_and_update().clone();
        f(value);
        if rx.changed().await.is_err() {
            break;
        }
    }
}

/// Calls `f` with the latest pair each time either side updates.
pub async fn combine_latest<A, B, F>(mut a: watch::Receiver<A>, mut b: watch::Receiver<B>, mut f: F)
where
    A: Clone,
    B: Clone,
    F: FnMut(A, B),
{
    let mut a_open = true;
    let mut b_open = true;
    let mut emit = true;
    loop {
        if emit {
            let pair = (a.borrow_and_update().clone(), b.borrow_and_update().clone());
            f(pair.0, pair.1);
        }

        // A closed side keeps its last value and stops being polled.
        tokio::select! {
            changed = a.changed(), if a_open => {
                a_open = changed.is_ok();
                emit = a_open;
            }
            changed = b.changed(), if b_open => {
                b_open = changed.is_ok();
                emit = b_open;
            }
            else => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    #[tokio::test]
    async fn test_dispose_bag_aborts_on_drop() {
        let (tx, rx) = watch::channel(0u32);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut bag = DisposeBag::new();
        let sink = Arc::clone(&seen);
        bag.spawn(for_each(rx, move |v| sink.lock().push(v)));
        tokio::task::yield_now().await;
        assert_eq!(bag.len(), 1);

        drop(bag);
        tokio::task::yield_now().await;
        tx.send_replace(7);
        tokio::task::yield_now().await;

        assert_eq!(*seen.lock(), vec![0]);
    }

    #[tokio::test]
    async fn test_combine_latest_emits_on_either_side() {
        let (a_tx, a_rx) = watch::channel(false);
        let (b_tx, b_rx) = watch::channel("one");
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let task = tokio::spawn(combine_latest(a_rx, b_rx, move |a, b| sink.lock().push((a, b))));

        tokio::task::yield_now().await;
        a_tx.send_replace(true);
        tokio::task::yield_now().await;
        b_tx.send_replace("two");
        tokio::task::yield_now().await;

        drop(a_tx);
        drop(b_tx);
        task.await.unwrap();

        assert_eq!(
            *seen.lock(),
            vec![(false, "one"), (true, "one"), (true, "two")]
        );
    }
}
