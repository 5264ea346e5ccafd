//! Guarded Provider
//!
//! Serializes overlapping calls of the same operation class against one
//! provider instance while letting different classes run concurrently.

use parking_lot::Mutex;
use tracing::debug;

use super::{Provider, RangeFetch};

/// Wraps a provider with one lock per operation class.
#[derive(Debug, Default)]
pub struct GuardedProvider<P> {
    inner: P,
    count_lock: Mutex<()>,
    range_lock: Mutex<()>,
    latest_id_lock: Mutex<()>,
}

impl<P> GuardedProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            count_lock: Mutex::new(()),
            range_lock: Mutex::new(()),
            latest_id_lock: Mutex::new(()),
        }
    }

    /// Returns the wrapped provider.
    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: Provider> Provider for GuardedProvider<P> {
    type Record = P::Record;

    fn fetch_count(&self) -> anyhow::Result<usize> {
        let _guard = self.count_lock.lock();
        let count = self.inner.fetch_count()?;
        debug!("fetch_count -> {}", count);
        Ok(count)
    }

    fn fetch_range(&self, start: usize, len: usize) -> anyhow::Result<RangeFetch<Self::Record>> {
        let _guard = self.range_lock.lock();
        let fetched = self.inner.fetch_range(start, len)?;
        debug!(
            "fetch_range start={} len={} -> {} records, overall {}",
            start,
            len,
            fetched.records.len(),
            fetched.overall_count
        );
        Ok(fetched)
    }

    fn fetch_latest_id(&self) -> anyhow::Result<i64> {
        let _guard = self.latest_id_lock.lock();
        let id = self.inner.fetch_latest_id()?;
        debug!("fetch_latest_id -> {}", id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    /// Records the peak number of concurrent calls, overall and for counts.
    #[derive(Default)]
    struct Probe {
        counts_active: AtomicUsize,
        counts_peak: AtomicUsize,
        total_active: AtomicUsize,
        total_peak: AtomicUsize,
    }

    impl Probe {
        fn enter(&self, is_count: bool) {
            if is_count {
                let now = self.counts_active.fetch_add(1, Ordering::SeqCst) + 1;
                self.counts_peak.fetch_max(now, Ordering::SeqCst);
            }
            let total = self.total_active.fetch_add(1, Ordering::SeqCst) + 1;
            self.total_peak.fetch_max(total, Ordering::SeqCst);

            thread::sleep(Duration::from_millis(100));

            self.total_active.fetch_sub(1, Ordering::SeqCst);
            if is_count {
                self.counts_active.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    impl Provider for Probe {
        type Record = u32;

        fn fetch_count(&self) -> anyhow::Result<usize> {
            self.enter(true);
            Ok(0)
        }

        fn fetch_range(&self, _start: usize, _len: usize) -> anyhow::Result<RangeFetch<u32>> {
            self.enter(false);
            Ok(RangeFetch::new(Vec::new(), 0))
        }

        fn fetch_latest_id(&self) -> anyhow::Result<i64> {
            Ok(-1)
        }
    }

    #[test]
    fn test_same_class_calls_are_serialized() {
        let provider = Arc::new(GuardedProvider::new(Probe::default()));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let provider = provider.clone();
                thread::spawn(move || provider.fetch_count().unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(provider.inner().counts_peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_different_classes_overlap() {
        let provider = Arc::new(GuardedProvider::new(Probe::default()));

        let count = {
            let provider = provider.clone();
            thread::spawn(move || provider.fetch_count().unwrap())
        };
        let range = {
            let provider = provider.clone();
            thread::spawn(move || provider.fetch_range(0, 10).unwrap())
        };
        count.join().unwrap();
        range.join().unwrap();

        assert!(provider.inner().total_peak.load(Ordering::SeqCst) >= 2);
    }
}
