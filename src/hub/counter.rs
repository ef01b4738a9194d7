/// Process-wide count of live client connections
///
/// Incremented by a hub when a connection is registered and decremented when it is
/// removed. The value never goes below zero and is only reset when the process
/// (or a test) reinitializes it.
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ConnectionCounter {
    active: AtomicUsize,
}

static ACTIVE_CONNECTIONS: Lazy<Arc<ConnectionCounter>> =
    Lazy::new(|| Arc::new(ConnectionCounter::default()));

/// Counter shared by every hub in the process
pub fn global_counter() -> Arc<ConnectionCounter> {
    ACTIVE_CONNECTIONS.clone()
}

impl ConnectionCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the count after the increment
    pub fn increment(&self) -> usize {
        self.active.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the count after the decrement; stays at zero when already zero
    pub fn decrement(&self) -> usize {
        match self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => 0,
        }
    }

    pub fn get(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.active.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_five_close_two() {
        let counter = ConnectionCounter::new();
        for _ in 0..5 {
            counter.increment();
        }
        counter.decrement();
        assert_eq!(counter.decrement(), 3);
        assert_eq!(counter.get(), 3);
    }

    #[test]
    fn test_never_negative() {
        let counter = ConnectionCounter::new();
        assert_eq!(counter.decrement(), 0);
        counter.increment();
        counter.decrement();
        counter.decrement();
        assert_eq!(counter.get(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_balance() {
        let counter = ConnectionCounter::new();
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let counter = counter.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..1000 {
                    counter.increment();
                    counter.decrement();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(counter.get(), 0);

        counter.increment();
        counter.reset();
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn test_reset_on_reinitialization_counts_from_zero() {
        let counter = ConnectionCounter::new();
        for _ in 0..3 {
            counter.increment();
        }
        // connections of the previous run are gone without decrements
        counter.reset();
        counter.increment();
        assert_eq!(counter.get(), 1);
        counter.decrement();
        counter.decrement();
        assert_eq!(counter.get(), 0);
    }
}
