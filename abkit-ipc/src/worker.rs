//! Background Worker
//!
//! A single worker context processes one request at a time. Callers queue
//! requests, may cancel them by id, and receive completed responses in order.
//! Cancellation is cooperative: the job polls its token between phases and a
//! cancelled job's result is discarded.

use crate::framing::{FrameError, FrameReader, FrameWriter};
use crate::messages::{Job, JobOutput, WorkerCommand, WorkerRequest, WorkerResponse};
use abkit_cache::LruCache;
use abkit_stats::{
    CancellationToken, Cancelled, SequentialError, analyze_bayesian_cancellable,
    distribution_curves, evaluate_looks,
};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

/// Default capacity of the worker's result cache
pub const DEFAULT_RESULT_CAPACITY: usize = 20;

/// Cancellation tokens remembered by the stdio worker
const STDIO_TOKEN_CAPACITY: usize = 1_024;

/// Worker failures
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Worker thread is no longer running")]
    Disconnected,

    #[error("No requests are pending")]
    NoPendingRequests,

    #[error("Request id {0} is already pending")]
    DuplicateId(u64),

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Timed out waiting for a response")]
    Timeout,
}

/// Request executor with a bounded result cache
pub struct Worker {
    results: LruCache<String, JobOutput>,
}

impl Worker {
    /// Worker whose result cache holds `result_capacity` outputs
    pub fn new(result_capacity: usize) -> Self {
        Self {
            results: LruCache::new(result_capacity),
        }
    }

    /// Number of cached results
    pub fn cached_results(&self) -> usize {
        self.results.len()
    }

    /// Run one request. `None` when the token was cancelled.
    pub fn handle(
        &mut self,
        request: &WorkerRequest,
        token: &CancellationToken,
    ) -> Option<WorkerResponse> {
        if token.is_cancelled() {
            tracing::debug!(id = request.id, "skipping cancelled request");
            return None;
        }

        if let Some(key) = &request.cache_key {
            if let Some(output) = self.results.get(key) {
                tracing::debug!(id = request.id, key = %key, "result cache hit");
                return Some(WorkerResponse {
                    id: request.id,
                    cached: true,
                    output: output.clone(),
                });
            }
        }

        tracing::debug!(id = request.id, job = request.job.kind(), "job started");
        let output = match execute(&request.job, token) {
            Ok(output) => output,
            Err(Cancelled) => {
                tracing::debug!(id = request.id, "job cancelled");
                return None;
            }
        };
        tracing::debug!(id = request.id, "job finished");

        if let Some(key) = &request.cache_key {
            if !matches!(output, JobOutput::Failed(_)) {
                self.results.insert(key.clone(), output.clone());
            }
        }

        Some(WorkerResponse {
            id: request.id,
            cached: false,
            output,
        })
    }
}

impl Default for Worker {
    fn default() -> Self {
        Self::new(DEFAULT_RESULT_CAPACITY)
    }
}

fn execute(job: &Job, token: &CancellationToken) -> Result<JobOutput, Cancelled> {
    match job {
        Job::Bayesian {
            control,
            test,
            config,
        } => analyze_bayesian_cancellable(control, test, config, token).map(JobOutput::Bayesian),
        Job::Curves {
            control,
            test,
            options,
        } => distribution_curves(control, test, options, token).map(JobOutput::Curves),
        Job::SequentialLooks { snapshots, design } => {
            match evaluate_looks(snapshots, design, token) {
                Ok(statuses) => Ok(JobOutput::SequentialLooks(statuses)),
                Err(SequentialError::Cancelled(cancelled)) => Err(cancelled),
                Err(e) => Ok(JobOutput::Failed(e.to_string())),
            }
        }
    }
}

struct Envelope {
    request: WorkerRequest,
    token: CancellationToken,
}

fn spawn_worker_thread(
    result_capacity: usize,
    jobs: Receiver<Envelope>,
    responses: Sender<WorkerResponse>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("abkit-worker".to_string())
        .spawn(move || {
            let mut worker = Worker::new(result_capacity);
            for envelope in jobs {
                if let Some(response) = worker.handle(&envelope.request, &envelope.token) {
                    if responses.send(response).is_err() {
                        break;
                    }
                }
            }
        })
}

/// Worker thread owned by the caller
///
/// ```ignore
/// let mut worker = BackgroundWorker::spawn(20)?;
/// worker.submit(request)?;
/// let response = worker.recv()?;
/// ```
pub struct BackgroundWorker {
    jobs: Option<Sender<Envelope>>,
    responses: Receiver<WorkerResponse>,
    pending: HashMap<u64, CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundWorker {
    /// Start the worker thread
    pub fn spawn(result_capacity: usize) -> Result<Self, WorkerError> {
        let (job_tx, job_rx) = mpsc::channel();
        let (response_tx, response_rx) = mpsc::channel();
        let handle = spawn_worker_thread(result_capacity, job_rx, response_tx)?;
        Ok(Self {
            jobs: Some(job_tx),
            responses: response_rx,
            pending: HashMap::new(),
            handle: Some(handle),
        })
    }

    /// Queue a request and return immediately
    pub fn submit(&mut self, request: WorkerRequest) -> Result<(), WorkerError> {
        if self.pending.contains_key(&request.id) {
            return Err(WorkerError::DuplicateId(request.id));
        }
        let jobs = self.jobs.as_ref().ok_or(WorkerError::Disconnected)?;
        let token = CancellationToken::new();
        let id = request.id;
        jobs.send(Envelope {
            request,
            token: token.clone(),
        })
        .map_err(|_| WorkerError::Disconnected)?;
        self.pending.insert(id, token);
        Ok(())
    }

    /// Cancel a pending request. Returns false if `id` is not pending.
    pub fn cancel(&mut self, id: u64) -> bool {
        match self.pending.remove(&id) {
            Some(token) => {
                token.cancel();
                tracing::debug!(id, "cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Requests submitted and neither answered nor cancelled
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Block until the next response for a pending request
    pub fn recv(&mut self) -> Result<WorkerResponse, WorkerError> {
        loop {
            if self.pending.is_empty() {
                return Err(WorkerError::NoPendingRequests);
            }
            let response = self.responses.recv().map_err(|_| WorkerError::Disconnected)?;
            if self.pending.remove(&response.id).is_some() {
                return Ok(response);
            }
        }
    }

    /// [`recv`](Self::recv) with an upper bound on the wait
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<WorkerResponse, WorkerError> {
        loop {
            if self.pending.is_empty() {
                return Err(WorkerError::NoPendingRequests);
            }
            let response = self.responses.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => WorkerError::Timeout,
                RecvTimeoutError::Disconnected => WorkerError::Disconnected,
            })?;
            if self.pending.remove(&response.id).is_some() {
                return Ok(response);
            }
        }
    }

    /// Next completed response, if one is ready
    pub fn try_recv(&mut self) -> Option<WorkerResponse> {
        loop {
            match self.responses.try_recv() {
                Ok(response) => {
                    if self.pending.remove(&response.id).is_some() {
                        return Some(response);
                    }
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return None,
            }
        }
    }

    /// Finish queued work and join the thread
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Serve [`WorkerCommand`] frames from `input`, writing response frames to `output`
///
/// Returns after a `Shutdown` command or end of input, once queued work is done.
/// Frames that fail to decode are skipped; oversized or truncated frames stop
/// the loop with an error.
pub fn run_stdio<R, W>(input: R, output: W, result_capacity: usize) -> Result<(), FrameError>
where
    R: Read,
    W: Write + Send + 'static,
{
    let (job_tx, job_rx) = mpsc::channel();
    let (response_tx, response_rx) = mpsc::channel::<WorkerResponse>();
    let worker = spawn_worker_thread(result_capacity, job_rx, response_tx)?;

    let writer = std::thread::Builder::new()
        .name("abkit-writer".to_string())
        .spawn(move || -> Result<(), FrameError> {
            let mut frames = FrameWriter::new(output);
            for response in response_rx {
                frames.write(&response)?;
            }
            Ok(())
        })?;

    let mut reader = FrameReader::commands(input);
    let mut tokens: LruCache<u64, CancellationToken> = LruCache::new(STDIO_TOKEN_CAPACITY);
    let read_result = loop {
        match reader.read::<WorkerCommand>() {
            Ok(WorkerCommand::Run(request)) => {
                let token = CancellationToken::new();
                tokens.insert(request.id, token.clone());
                if job_tx.send(Envelope { request, token }).is_err() {
                    break Ok(());
                }
            }
            Ok(WorkerCommand::Cancel { id }) => {
                if let Some(token) = tokens.remove(&id) {
                    token.cancel();
                    tracing::debug!(id, "cancellation requested");
                }
            }
            Ok(WorkerCommand::Shutdown) | Err(FrameError::EndOfStream) => break Ok(()),
            Err(e) if e.is_recoverable() => {
                tracing::warn!(error = %e, "skipping unreadable command");
            }
            Err(e) => break Err(e),
        }
    };

    drop(job_tx);
    let _ = worker.join();
    let write_result = writer
        .join()
        .unwrap_or_else(|_| Err(FrameError::InvalidFrame("writer thread panicked".to_string())));

    read_result.and(write_result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use abkit_stats::{BayesianConfig, CurveOptions, VariantLabel, VariantRecord};
    use crate::framing::MAX_COMMAND_FRAME;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    fn record(label: VariantLabel, visitors: u64, conversions: u64) -> VariantRecord {
        VariantRecord::new(label, visitors, conversions).unwrap()
    }

    fn bayes_request(id: u64, cache_key: Option<&str>) -> WorkerRequest {
        WorkerRequest {
            id,
            cache_key: cache_key.map(str::to_string),
            job: Job::Bayesian {
                control: record(VariantLabel::A, 1_000, 50),
                test: record(VariantLabel::B, 1_000, 70),
                config: BayesianConfig {
                    simulations: 2_000,
                    loss_simulations: 500,
                    seed: Some(1),
                },
            },
        }
    }

    #[test]
    fn test_worker_caches_by_key() {
        let mut worker = Worker::new(2);
        let token = CancellationToken::new();

        let first = worker.handle(&bayes_request(1, Some("k")), &token).unwrap();
        let second = worker.handle(&bayes_request(2, Some("k")), &token).unwrap();
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(second.id, 2);
        assert_eq!(first.output, second.output);

        let uncached = worker.handle(&bayes_request(3, None), &token).unwrap();
        assert!(!uncached.cached);
        assert_eq!(worker.cached_results(), 1);
    }

    #[test]
    fn test_cancelled_request_has_no_response() {
        let mut worker = Worker::default();
        let token = CancellationToken::new();
        token.cancel();
        assert!(worker.handle(&bayes_request(1, Some("k")), &token).is_none());
        assert_eq!(worker.cached_results(), 0);
    }

    #[test]
    fn test_failed_jobs_are_not_cached() {
        let mut worker = Worker::default();
        let request = WorkerRequest {
            id: 7,
            cache_key: Some("bad".to_string()),
            job: Job::SequentialLooks {
                snapshots: vec![abkit_stats::LookSnapshot {
                    look: 9,
                    control: record(VariantLabel::A, 100, 5),
                    test: record(VariantLabel::B, 100, 6),
                }],
                design: Default::default(),
            },
        };
        let response = worker.handle(&request, &CancellationToken::new()).unwrap();
        assert!(matches!(response.output, JobOutput::Failed(_)));
        assert_eq!(worker.cached_results(), 0);
    }

    #[test]
    fn test_background_worker_round_trip() {
        let mut worker = BackgroundWorker::spawn(DEFAULT_RESULT_CAPACITY).unwrap();
        worker.submit(bayes_request(1, None)).unwrap();
        worker
            .submit(WorkerRequest {
                id: 2,
                cache_key: None,
                job: Job::Curves {
                    control: record(VariantLabel::A, 1_000, 50),
                    test: record(VariantLabel::B, 1_000, 70),
                    options: CurveOptions::default(),
                },
            })
            .unwrap();
        assert_eq!(worker.pending(), 2);

        let first = worker.recv().unwrap();
        let second = worker.recv().unwrap();
        assert_eq!((first.id, second.id), (1, 2));
        assert!(matches!(first.output, JobOutput::Bayesian(_)));
        assert!(matches!(second.output, JobOutput::Curves(_)));
        assert!(matches!(worker.recv(), Err(WorkerError::NoPendingRequests)));
        worker.shutdown();
    }

    #[test]
    fn test_background_worker_cancel() {
        let mut worker = BackgroundWorker::spawn(DEFAULT_RESULT_CAPACITY).unwrap();
        worker.submit(bayes_request(1, None)).unwrap();
        worker.submit(bayes_request(2, None)).unwrap();
        worker.submit(bayes_request(3, None)).unwrap();

        assert!(worker.cancel(2));
        assert!(!worker.cancel(2));
        assert!(matches!(
            worker.submit(bayes_request(1, None)),
            Err(WorkerError::DuplicateId(1))
        ));

        let ids: Vec<u64> = std::iter::from_fn(|| worker.recv().ok())
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_stdio_protocol() {
        let mut input = Vec::new();
        {
            let mut frames = FrameWriter::new(&mut input);
            frames.write(&WorkerCommand::Run(bayes_request(10, Some("same")))).unwrap();
            frames.write(&WorkerCommand::Run(bayes_request(11, Some("same")))).unwrap();
            frames.write(&WorkerCommand::Shutdown).unwrap();
        }

        let output = SharedBuffer::default();
        run_stdio(Cursor::new(input), output.clone(), 4).unwrap();

        let bytes = output.0.lock().unwrap().clone();
        let mut reader = FrameReader::new(Cursor::new(bytes));
        let first: WorkerResponse = reader.read().unwrap();
        let second: WorkerResponse = reader.read().unwrap();
        assert_eq!((first.id, first.cached), (10, false));
        assert_eq!((second.id, second.cached), (11, true));
        assert!(matches!(reader.read::<WorkerResponse>(), Err(FrameError::EndOfStream)));
    }

    #[test]
    fn test_stdio_skips_malformed_commands() {
        let mut input = Vec::new();
        {
            let mut frames = FrameWriter::new(&mut input);
            frames.write(&WorkerCommand::Run(bayes_request(20, None))).unwrap();
            frames.write(&serde_json::json!({ "type": "rewind" })).unwrap();
            frames.write(&WorkerCommand::Run(bayes_request(21, None))).unwrap();
        }

        let output = SharedBuffer::default();
        run_stdio(Cursor::new(input), output.clone(), 4).unwrap();

        let bytes = output.0.lock().unwrap().clone();
        let mut reader = FrameReader::new(Cursor::new(bytes));
        let ids: Vec<u64> = std::iter::from_fn(|| reader.read::<WorkerResponse>().ok())
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![20, 21]);
    }

    #[test]
    fn test_stdio_rejects_oversized_command() {
        let mut input = ((MAX_COMMAND_FRAME + 1) as u32).to_le_bytes().to_vec();
        input.extend_from_slice(b"{}");

        let output = SharedBuffer::default();
        let result = run_stdio(Cursor::new(input), output.clone(), 4);
        assert!(matches!(result, Err(FrameError::FrameTooLarge { .. })));
        assert!(output.0.lock().unwrap().is_empty());
    }
}
