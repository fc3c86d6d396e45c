use crate::error::HandlerError;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

pub(crate) type Job = Box<dyn FnOnce() -> Result<(), HandlerError> + Send>;

/// Single background thread draining a FIFO of write jobs.
pub(crate) struct Worker {
    tx: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
    failures: Arc<Mutex<Vec<String>>>,
}

impl Worker {
    pub(crate) fn spawn(name: &str) -> Result<Self, HandlerError> {
        let (tx, rx) = mpsc::channel::<Job>();
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&failures);
        let thread_name = name.to_string();

        let handle = thread::Builder::new()
            .name(format!("{}-writer", name))
            .spawn(move || {
                for job in rx {
                    if let Err(e) = job() {
                        tracing::warn!(handler = %thread_name, error = %e, "background write failed");
                        if let Ok(mut f) = sink.lock() {
                            f.push(e.to_string());
                        }
                    }
                }
            })?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            failures,
        })
    }

    pub(crate) fn submit(&self, job: Job) -> Result<(), HandlerError> {
        self.tx
            .as_ref()
            .ok_or(HandlerError::WorkerGone)?
            .send(job)
            .map_err(|_| HandlerError::WorkerGone)
    }

    /// Closes the queue and waits for every queued job to run.
    pub(crate) fn join(mut self) -> Result<(), HandlerError> {
        self.finish()
    }

    fn finish(&mut self) -> Result<(), HandlerError> {
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| HandlerError::WorkerGone)?;
        }
        let failures = self
            .failures
            .lock()
            .map(|mut f| std::mem::take(&mut *f))
            .unwrap_or_default();
        match failures.first() {
            None => Ok(()),
            Some(first) => Err(HandlerError::Background {
                failed: failures.len(),
                first: first.clone(),
            }),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn join_waits_for_all_jobs() {
        let worker = Worker::spawn("test").unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            let done = Arc::clone(&done);
            worker
                .submit(Box::new(move || {
                    thread::sleep(std::time::Duration::from_millis(1));
                    done.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }))
                .unwrap();
        }
        worker.join().unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn join_reports_failures_after_running_the_rest() {
        let worker = Worker::spawn("test").unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        worker
            .submit(Box::new(|| Err(HandlerError::Rejected("boom".into()))))
            .unwrap();
        let counter = Arc::clone(&done);
        worker
            .submit(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .unwrap();

        match worker.join() {
            Err(HandlerError::Background { failed, first }) => {
                assert_eq!(failed, 1);
                assert_eq!(first, "boom");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
