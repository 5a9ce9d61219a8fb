//! Fixed-size worker pool with a quiescence barrier and per-batch first-error capture.

use std::{
    collections::VecDeque,
    marker::PhantomData,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread::JoinHandle,
};

use anyhow::Context as _;

use crate::foundation::error::{FrameError, FrameResult};

type Job = Box<dyn FnOnce() -> FrameResult<()> + Send + 'static>;

struct State {
    queue: VecDeque<Job>,
    active: usize,
    stop: bool,
    first_error: Option<FrameError>,
}

impl State {
    fn is_quiescent(&self) -> bool {
        self.queue.is_empty() && self.active == 0
    }

    fn record(&mut self, err: FrameError) {
        if self.first_error.is_none() {
            self.first_error = Some(err);
        }
    }
}

struct Shared {
    state: Mutex<State>,
    /// Signalled when a job is queued or the pool stops.
    work: Condvar,
    /// Signalled when the pool drains.
    finished: Condvar,
}

impl Shared {
    /// The state stays consistent across a panic under the lock, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A fixed set of long-lived workers draining one FIFO queue.
///
/// Tasks return `FrameResult<()>`; the first failure (or panic) of a batch is kept and handed to
/// the next [`ThreadPool::wait`] caller. Dropping the pool stops and joins every worker and
/// discards tasks that have not started.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Spawn `threads` workers; `0` means one per available hardware thread.
    pub fn new(threads: usize) -> FrameResult<Self> {
        let threads = if threads == 0 {
            default_thread_count()
        } else {
            threads
        };
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                active: 0,
                stop: false,
                first_error: None,
            }),
            work: Condvar::new(),
            finished: Condvar::new(),
        });

        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(threads),
        };
        for index in 0..threads {
            let shared = Arc::clone(&pool.shared);
            let handle = std::thread::Builder::new()
                .name(format!("frameblend-pool-{index}"))
                .spawn(move || worker_loop(&shared))
                .with_context(|| format!("failed to spawn pool worker {index}"))?;
            pool.workers.push(handle);
        }
        tracing::debug!(threads, "thread pool started");
        Ok(pool)
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue a task and wake one worker.
    pub fn enqueue<F>(&self, task: F) -> FrameResult<()>
    where
        F: FnOnce() -> FrameResult<()> + Send + 'static,
    {
        self.push(Box::new(task))
    }

    fn push(&self, job: Job) -> FrameResult<()> {
        let mut state = self.shared.lock();
        if state.stop {
            return Err(FrameError::validation("enqueue on a stopped thread pool"));
        }
        state.queue.push_back(job);
        drop(state);
        self.shared.work.notify_one();
        Ok(())
    }

    /// Block until the queue is empty and no task is running, then return and clear the first
    /// error raised since the previous wait.
    pub fn wait(&self) -> FrameResult<()> {
        let mut state = self.wait_quiescent();
        match state.first_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// `true` when nothing is queued or running.
    pub fn is_idle(&self) -> bool {
        self.shared.lock().is_quiescent()
    }

    /// Run `f` with a [`Scope`] whose tasks may borrow from the caller's stack.
    ///
    /// Returns only after every task spawned in the scope has finished, including when `f`
    /// panics. Task failures surface as the returned error. Must not be called from a pool
    /// worker.
    pub fn scope<'env, F, R>(&self, f: F) -> FrameResult<R>
    where
        F: for<'scope> FnOnce(&'scope Scope<'scope, 'env>) -> R,
    {
        struct QuiesceOnDrop<'a>(&'a ThreadPool);
        impl Drop for QuiesceOnDrop<'_> {
            fn drop(&mut self) {
                drop(self.0.wait_quiescent());
            }
        }

        let scope = Scope {
            pool: self,
            scope: PhantomData,
            env: PhantomData,
        };
        let guard = QuiesceOnDrop(self);
        let out = f(&scope);
        drop(guard);
        self.wait()?;
        Ok(out)
    }

    fn wait_quiescent(&self) -> MutexGuard<'_, State> {
        let mut state = self.shared.lock();
        while !state.is_quiescent() {
            state = self
                .shared
                .finished
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        {
            let mut state = self.shared.lock();
            state.stop = true;
            state.queue.clear();
        }
        self.shared.work.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Spawning handle passed to the closure given to [`ThreadPool::scope`].
pub struct Scope<'scope, 'env: 'scope> {
    pool: &'scope ThreadPool,
    scope: PhantomData<&'scope mut &'scope ()>,
    env: PhantomData<&'env mut &'env ()>,
}

impl<'scope> Scope<'scope, '_> {
    /// Queue a task that may borrow data living at least as long as the scope.
    pub fn spawn<F>(&self, task: F) -> FrameResult<()>
    where
        F: FnOnce() -> FrameResult<()> + Send + 'scope,
    {
        let job: Box<dyn FnOnce() -> FrameResult<()> + Send + 'scope> = Box::new(task);
        // SAFETY: `ThreadPool::scope` does not return or unwind past the borrowed data until the
        // pool is quiescent, so the job has finished (or been dropped unrun) before `'scope` ends.
        // Only the trait-object lifetime bound changes; the layout is identical.
        let job: Job = unsafe {
            std::mem::transmute::<Box<dyn FnOnce() -> FrameResult<()> + Send + 'scope>, Job>(job)
        };
        self.pool.push(job)
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut state = shared.lock();
            loop {
                if state.stop {
                    return;
                }
                if let Some(job) = state.queue.pop_front() {
                    state.active += 1;
                    break job;
                }
                state = shared
                    .work
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        let result = catch_unwind(AssertUnwindSafe(job))
            .unwrap_or_else(|payload| Err(FrameError::task_failed(panic_message(&*payload))));

        let mut state = shared.lock();
        state.active -= 1;
        if let Err(err) = result {
            tracing::debug!(error = %err, "pool task failed");
            state.record(err);
        }
        if state.is_quiescent() {
            shared.finished.notify_all();
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

/// One worker per available hardware thread, at least one.
pub fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn zero_threads_uses_hardware_concurrency() {
        let pool = ThreadPool::new(0).unwrap();
        assert_eq!(pool.size(), default_thread_count());
    }

    #[test]
    fn scope_tasks_can_write_borrowed_slices() {
        let pool = ThreadPool::new(3).unwrap();
        let mut buf = vec![0u8; 64];
        pool.scope(|s| {
            for (i, chunk) in buf.chunks_mut(16).enumerate() {
                s.spawn(move || {
                    chunk.fill(i as u8 + 1);
                    Ok(())
                })
                .unwrap();
            }
        })
        .unwrap();
        assert_eq!(&buf[..16], &[1u8; 16]);
        assert_eq!(&buf[48..], &[4u8; 16]);
    }

    #[test]
    fn scope_waits_for_running_tasks_after_the_lock_is_poisoned() {
        let pool = ThreadPool::new(4).unwrap();
        let shared = Arc::clone(&pool.shared);
        let poisoner = std::thread::spawn(move || {
            let _state = shared.lock();
            panic!("panic while holding the pool lock");
        });
        assert!(poisoner.join().is_err());
        assert!(pool.shared.state.is_poisoned());

        let mut buf = vec![0u8; 64];
        pool.scope(|s| {
            for (i, chunk) in buf.chunks_mut(16).enumerate() {
                s.spawn(move || {
                    std::thread::sleep(std::time::Duration::from_millis(20 * i as u64));
                    chunk.fill(i as u8 + 1);
                    Ok(())
                })
                .unwrap();
            }
        })
        .unwrap();
        for (i, chunk) in buf.chunks(16).enumerate() {
            assert_eq!(chunk, &[i as u8 + 1; 16][..]);
        }
        assert!(pool.is_idle());
    }

    #[test]
    fn panicking_task_becomes_task_failed() {
        let pool = ThreadPool::new(2).unwrap();
        pool.enqueue(|| panic!("kaboom")).unwrap();
        let err = pool.wait().unwrap_err();
        assert!(matches!(err, FrameError::TaskFailed(ref m) if m.contains("kaboom")));
        // The pool keeps working after a failed batch.
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        pool.enqueue(move || {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        pool.wait().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
