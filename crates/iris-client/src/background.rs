//! # Background Submitter
//!
//! Runs submissions off the caller's path so a slow FBR gateway does not
//! hold up the sale-completion response.
//!
//! ## Job Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Background Submission Flow                          │
//! │                                                                         │
//! │  BackgroundHandle::enqueue(channel, id)                                 │
//! │        │ mpsc                                                           │
//! │        ▼                                                                │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  BackgroundSubmitter::run                       │   │
//! │  │                                                                 │   │
//! │  │  select! {                                                      │   │
//! │  │    job       ──► spawn task: Pipeline::submit(channel, id)      │   │
//! │  │    finished  ──► reap task                                      │   │
//! │  │    shutdown  ──► stop intake, start queued jobs, wait, ack      │   │
//! │  │  }                                                              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  Each job re-reads the record and writes its outcome through the store │
//! │  on its own. Any failure that was not already persisted by the          │
//! │  pipeline is written as Failed with an empty response.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use iris_core::Channel;

use crate::error::{IrisError, IrisResult};
use crate::pipeline::Pipeline;

/// Queue depth before `enqueue` starts waiting.
const JOB_QUEUE_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
struct SubmitJob {
    channel: Channel,
    id: String,
}

/// Receives jobs and runs each on its own task.
pub struct BackgroundSubmitter {
    pipeline: Pipeline,
    jobs_rx: mpsc::Receiver<SubmitJob>,
    shutdown_rx: mpsc::Receiver<oneshot::Sender<()>>,
    in_flight: JoinSet<()>,
}

/// Handle for queueing jobs and stopping the submitter.
#[derive(Clone)]
pub struct BackgroundHandle {
    jobs_tx: mpsc::Sender<SubmitJob>,
    shutdown_tx: mpsc::Sender<oneshot::Sender<()>>,
}

impl BackgroundHandle {
    /// Queues a record for submission.
    pub async fn enqueue(&self, channel: Channel, id: impl Into<String>) -> IrisResult<()> {
        let job = SubmitJob {
            channel,
            id: id.into(),
        };
        debug!(%channel, id = %job.id, "Queueing background submission");
        self.jobs_tx
            .send(job)
            .await
            .map_err(|_| IrisError::ChannelError("Background submitter is not running".into()))
    }

    /// Stops intake and waits for in-flight submissions to finish.
    pub async fn shutdown(&self) -> IrisResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.shutdown_tx
            .send(ack_tx)
            .await
            .map_err(|_| IrisError::ChannelError("Shutdown channel closed".into()))?;
        ack_rx
            .await
            .map_err(|_| IrisError::ChannelError("Background submitter stopped without ack".into()))
    }
}

impl BackgroundSubmitter {
    /// Creates a submitter and its handle. Call [`run`](Self::run) on a task.
    pub fn new(pipeline: Pipeline) -> (Self, BackgroundHandle) {
        let (jobs_tx, jobs_rx) = mpsc::channel(JOB_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let submitter = BackgroundSubmitter {
            pipeline,
            jobs_rx,
            shutdown_rx,
            in_flight: JoinSet::new(),
        };
        let handle = BackgroundHandle { jobs_tx, shutdown_tx };

        (submitter, handle)
    }

    /// Creates a submitter and spawns it on the current runtime.
    pub fn spawn(pipeline: Pipeline) -> BackgroundHandle {
        let (submitter, handle) = BackgroundSubmitter::new(pipeline);
        tokio::spawn(submitter.run());
        handle
    }

    /// Runs the job loop until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        info!("Background submitter starting");

        let ack = loop {
            tokio::select! {
                biased;

                job = self.jobs_rx.recv() => match job {
                    Some(job) => self.start(job),
                    None => break None,
                },

                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Background submission task panicked");
                    }
                }

                Some(ack) = self.shutdown_rx.recv() => {
                    info!(in_flight = self.in_flight.len(), "Background submitter shutting down");
                    break Some(ack);
                }
            }
        };

        // Jobs already queued when shutdown arrived still get submitted.
        self.jobs_rx.close();
        while let Some(job) = self.jobs_rx.recv().await {
            self.start(job);
        }
        while let Some(joined) = self.in_flight.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Background submission task panicked");
            }
        }

        if let Some(ack) = ack {
            let _ = ack.send(());
        }
        info!("Background submitter stopped");
    }

    fn start(&mut self, job: SubmitJob) {
        let pipeline = self.pipeline.clone();
        self.in_flight.spawn(async move {
            process_job(pipeline, job).await;
        });
    }
}

async fn process_job(pipeline: Pipeline, job: SubmitJob) {
    let SubmitJob { channel, id } = job;

    match pipeline.submit(channel, &id).await {
        Ok(submitted) => {
            info!(%channel, id = %id, invoice_number = %submitted.invoice_number, "Background submission posted");
        }
        // Already written as Failed by the pipeline.
        Err(e @ IrisError::TerminalSubmission { .. }) => {
            warn!(%channel, id = %id, error = %e, "Background submission failed");
        }
        Err(IrisError::NotFound { .. }) => {
            warn!(%channel, id = %id, "Background submission for a record that no longer exists");
        }
        Err(e) => {
            error!(%channel, id = %id, error = %e, "Background submission failed before posting");
            if let Err(write_err) = pipeline.mark_failed(channel, &id, &e.to_string()).await {
                error!(%channel, id = %id, error = %write_err, "Could not record background failure");
            }
        }
    }
}
