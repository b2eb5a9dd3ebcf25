use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread::JoinHandle;

/// The work a pool run executes; the argument is the participant id.
pub type Job = Arc<dyn Fn(usize) + Send + Sync>;

/// A fixed set of long-lived worker threads plus the calling thread.
///
/// `run` publishes a job, releases the workers through a start barrier,
/// executes the caller's share, and collects everyone at a stop barrier, so
/// each run is a cleanly delimited phase. The pool holds no work queue of
/// its own; participants coordinate through whatever shared state the job
/// closes over.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    threads: Vec<JoinHandle<()>>,
}

struct PoolShared {
    start: Barrier,
    stop: Barrier,
    job: Mutex<Option<Job>>,
    shutdown: AtomicBool,
    active: AtomicBool,
}

fn worker_loop(shared: Arc<PoolShared>, id: usize) {
    loop {
        shared.start.wait();
        if shared.shutdown.load(Ordering::Acquire) {
            return;
        }
        let job = shared.job.lock().unwrap().clone();
        if let Some(job) = job {
            job(id);
        }
        shared.stop.wait();
    }
}

impl WorkerPool {
    pub fn new(threads: usize) -> Self {
        let shared = Arc::new(PoolShared {
            start: Barrier::new(threads + 1),
            stop: Barrier::new(threads + 1),
            job: Mutex::new(None),
            shutdown: AtomicBool::new(false),
            active: AtomicBool::new(false),
        });
        let threads = (0..threads)
            .map(|id| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || worker_loop(shared, id))
            })
            .collect();
        WorkerPool { shared, threads }
    }

    /// Number of pool threads, not counting the caller.
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Runs `job(id)` on every worker and `job(thread_count())` on the
    /// caller, returning when all participants have finished. Re-entry is a
    /// bug and panics.
    pub fn run(&self, job: Job) {
        assert!(
            !self.shared.active.swap(true, Ordering::AcqRel),
            "worker pool is already running"
        );
        *self.shared.job.lock().unwrap() = Some(Arc::clone(&job));
        self.shared.start.wait();
        job(self.threads.len());
        self.shared.stop.wait();
        *self.shared.job.lock().unwrap() = None;
        self.shared.active.store(false, Ordering::Release);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.start.wait();
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn every_participant_runs_once() {
        let pool = WorkerPool::new(3);
        let seen = Arc::new(AtomicUsize::new(0));
        let job: Job = {
            let seen = Arc::clone(&seen);
            Arc::new(move |id| {
                seen.fetch_or(1 << id, Ordering::SeqCst);
            })
        };
        pool.run(job);
        // Three workers plus the caller as participant 3.
        assert_eq!(seen.load(Ordering::SeqCst), 0b1111);
    }

    #[test]
    fn runs_can_be_repeated() {
        let pool = WorkerPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let counter = Arc::clone(&counter);
            pool.run(Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 15);
    }

    #[test]
    fn zero_threads_runs_on_the_caller() {
        let pool = WorkerPool::new(0);
        let counter = Arc::new(AtomicUsize::new(0));
        let counter2 = Arc::clone(&counter);
        pool.run(Arc::new(move |id| {
            assert_eq!(id, 0);
            counter2.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
