use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{Receiver, bounded};

/// Pool sizing for one fan-out/fan-in stage. One configuration value
/// drives all stages.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOpts {
    pub serve: usize,
    pub chan_depth: usize,
    pub heap_size: usize,
}

impl Default for PipelineOpts {
    fn default() -> Self {
        PipelineOpts {
            serve: num_cpus::get(),
            chan_depth: 16,
            heap_size: 16,
        }
    }
}

impl From<&crate::core::config::Config> for PipelineOpts {
    fn from(config: &crate::core::config::Config) -> Self {
        PipelineOpts {
            serve: config.serve,
            chan_depth: config.chan_depth,
            heap_size: config.heap_size,
        }
    }
}

struct Tagged<T> {
    index: u64,
    value: T,
}

impl<T> PartialEq for Tagged<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Tagged<T> {}

impl<T> PartialOrd for Tagged<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Tagged<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}

/// Fan records out to a worker pool and fan results back in, restoring the
/// input order with a min-heap keyed by the index assigned at partition
/// time. Bounded channels provide back-pressure throughout; the pipeline
/// drains to completion and a worker panic is fatal to its results.
///
/// Empty results pass through untouched so downstream consumers can count
/// them.
pub fn run<T, U, F>(
    records: impl Iterator<Item = T> + Send + 'static,
    opts: PipelineOpts,
    work: F,
) -> Receiver<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> U + Send + Sync + 'static,
{
    let depth = opts.chan_depth.max(1);
    let (feed_tx, feed_rx) = bounded::<Tagged<T>>(depth);
    let (done_tx, done_rx) = bounded::<Tagged<U>>(depth);
    let (out_tx, out_rx) = bounded::<U>(depth);

    thread::spawn(move || {
        for (index, value) in records.enumerate() {
            let tagged = Tagged {
                index: index as u64,
                value,
            };
            if feed_tx.send(tagged).is_err() {
                break;
            }
        }
    });

    let work = Arc::new(work);
    for _ in 0..opts.serve.max(1) {
        let feed_rx = feed_rx.clone();
        let done_tx = done_tx.clone();
        let work = Arc::clone(&work);
        thread::spawn(move || {
            while let Ok(tagged) = feed_rx.recv() {
                let value = work(tagged.value);
                let result = Tagged {
                    index: tagged.index,
                    value,
                };
                if done_tx.send(result).is_err() {
                    break;
                }
            }
        });
    }
    drop(feed_rx);
    drop(done_tx);

    // unshuffler: release only the next expected index, with a small
    // delay window to reduce push/pop thrash
    let delay = opts.heap_size.max(1);
    thread::spawn(move || {
        let mut heap: BinaryHeap<Reverse<Tagged<U>>> = BinaryHeap::with_capacity(delay * 2);
        let mut next = 0u64;
        while let Ok(tagged) = done_rx.recv() {
            heap.push(Reverse(tagged));
            if heap.len() < delay {
                continue;
            }
            while heap.peek().map(|top| top.0.index) == Some(next) {
                let Reverse(tagged) = heap.pop().unwrap();
                if out_tx.send(tagged.value).is_err() {
                    return;
                }
                next += 1;
            }
        }
        while let Some(Reverse(tagged)) = heap.pop() {
            if out_tx.send(tagged.value).is_err() {
                return;
            }
        }
    });

    out_rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn output_order_matches_input_order() {
        let opts = PipelineOpts {
            serve: 4,
            chan_depth: 8,
            heap_size: 4,
        };
        let out = run(0..200u64, opts, |n| {
            // stagger completion so results arrive out of order
            thread::sleep(Duration::from_micros((n % 7) * 100));
            n * 2
        });
        let collected: Vec<u64> = out.iter().collect();
        assert_eq!(collected.len(), 200);
        for (i, value) in collected.iter().enumerate() {
            assert_eq!(*value, (i as u64) * 2);
        }
    }

    #[test]
    fn empty_results_pass_through() {
        let opts = PipelineOpts {
            serve: 2,
            chan_depth: 4,
            heap_size: 2,
        };
        let out = run(
            vec!["a", "", "c"].into_iter(),
            opts,
            |s: &str| s.to_string(),
        );
        let collected: Vec<String> = out.iter().collect();
        assert_eq!(collected, vec!["a", "", "c"]);
    }

    #[test]
    fn single_worker_preserves_order_trivially() {
        let opts = PipelineOpts {
            serve: 1,
            chan_depth: 1,
            heap_size: 1,
        };
        let out = run(0..50u64, opts, |n| n);
        let collected: Vec<u64> = out.iter().collect();
        assert_eq!(collected, (0..50).collect::<Vec<u64>>());
    }
}
