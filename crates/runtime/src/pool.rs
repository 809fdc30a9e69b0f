//! Worker pool for concurrent callback compilation (section 5 "Across
//! compilation units")
//!
//! Each callback compiles independently, so dispatching them to a fixed
//! pool of OS threads is enough, no work-stealing or priority scheduling
//! is needed. Jobs are boxed closures sent down an `mpsc` channel; workers
//! pull and run them until the pool is dropped, at which point the sender
//! closes and every worker thread joins.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    sender: Option<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// `size` must be at least 1.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "worker pool size must be at least 1");
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..size)
            .map(|_| {
                let receiver = receiver.clone();
                thread::spawn(move || loop {
                    let job = { receiver.lock().unwrap().recv() };
                    match job {
                        Ok(job) => job(),
                        Err(_) => break,
                    }
                })
            })
            .collect();

        WorkerPool { sender: Some(sender), workers }
    }

    /// Submits a job. Panics if the pool's worker threads have already
    /// shut down (never happens before `drop`).
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        self.sender.as_ref().expect("pool sender dropped before pool").send(Box::new(job)).expect("worker threads gone");
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
