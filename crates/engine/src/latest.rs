use std::fmt::Debug;

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::Stream;

/// Single-slot broadcast of the most recent value.
///
/// `set` overwrites and wakes every subscriber. Slow subscribers skip
/// intermediate values; a new subscriber starts with the current value.
pub struct LatestValue<T: Clone + Send + Sync + 'static> {
    tx: watch::Sender<T>,
}

impl<T: Clone + Send + Sync + 'static> LatestValue<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Yields the current value immediately, then every later change.
    pub fn subscribe(&self) -> impl Stream<Item = T> + Send + Unpin {
        WatchStream::new(self.tx.subscribe())
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone + Send + Sync + Debug + 'static> Debug for LatestValue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatestValue")
            .field("value", &self.get())
            .finish()
    }
}
