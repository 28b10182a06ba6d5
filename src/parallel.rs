//! Fixed-stride parallel iteration over an index range.

use std::sync::{Mutex, MutexGuard};
use std::thread;

/// Acquires `mutex`, absorbing poisoning: every guarded region of this crate
/// leaves the shared state either published or absent, never half-written.
pub(crate) fn lock(mutex: &Mutex<()>) -> MutexGuard<'_, ()> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runs `body(i)` for every `i` in `[begin, end)`.
///
/// With `num_threads <= 1`, or a range no larger than one index per worker
/// would get, the body runs serially on the calling thread. Otherwise worker
/// `k` covers `begin + k`, `begin + k + N`, … with stride `N`; all workers
/// are joined before returning. Returns whether every worker was spawned.
pub(crate) fn parallel_for<F>(num_threads: usize, begin: usize, end: usize, body: F) -> bool
where
    F: Fn(usize) + Sync,
{
    if begin >= end {
        return true;
    }

    let num_threads = num_threads.min(end - begin);

    if num_threads <= 1 {
        for i in begin..end {
            body(i);
        }
        return true;
    }

    let body = &body;
    thread::scope(|scope| {
        let mut spawned = 0;
        for k in 0..num_threads {
            let handle = thread::Builder::new().spawn_scoped(scope, move || {
                let mut i = begin + k;
                while i < end {
                    body(i);
                    i += num_threads;
                }
            });
            match handle {
                Ok(_) => spawned += 1,
                Err(_) => break,
            }
        }
        spawned == num_threads
    })
}
