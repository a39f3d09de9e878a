use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

/// Progress of one job, in the order a job emits them: `Started`, then
/// exactly one of `Finished` or `Failed`.
#[derive(Clone, Debug)]
pub enum JobEvent {
    Started { id: usize, input: PathBuf },
    Finished { id: usize, input: PathBuf, summary: String },
    Failed { id: usize, input: PathBuf, error: String },
}

/// Runs one job per input file on a fixed-size thread pool.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
}

impl WorkerPool {
    pub fn new(jobs: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs.max(1))
            .thread_name(|i| format!("beatpad-worker-{}", i))
            .build()
            .context("Failed to build worker thread pool")?;
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Queue `work` for every input. The returned channel closes once every
    /// job has reported its result.
    pub fn dispatch<F>(&self, inputs: Vec<PathBuf>, work: F) -> Receiver<JobEvent>
    where
        F: Fn(&PathBuf) -> Result<String> + Send + Sync + 'static,
    {
        let (tx, rx) = unbounded();
        let work = Arc::new(work);

        for (id, input) in inputs.into_iter().enumerate() {
            let tx = tx.clone();
            let work = Arc::clone(&work);
            self.pool.spawn(move || {
                let _ = tx.send(JobEvent::Started {
                    id,
                    input: input.clone(),
                });
                // A panic fails only its own job.
                let event = match catch_unwind(AssertUnwindSafe(|| work(&input))) {
                    Ok(Ok(summary)) => JobEvent::Finished { id, input, summary },
                    Ok(Err(e)) => JobEvent::Failed {
                        id,
                        input,
                        error: format!("{:#}", e),
                    },
                    Err(payload) => JobEvent::Failed {
                        id,
                        input,
                        error: format!("job panicked: {}", panic_message(payload.as_ref())),
                    },
                };
                let _ = tx.send(event);
            });
        }

        rx
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown cause"
    }
}
