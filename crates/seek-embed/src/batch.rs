//! Request queue that coalesces concurrent embedding calls into device batches.
//!
//! The backend is owned by a single worker task. Callers submit jobs over a
//! bounded channel; the worker drains whatever is queued, packs texts from the
//! oldest jobs into batches of at most `batch_size`, and runs one blocking
//! inference pass at a time.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::error::{EmbedError, Result};
use crate::provider::{Embedding, EmbeddingProvider, TextKind};
use crate::template::PromptTemplate;

/// Synchronous model pass over one batch.
pub trait EmbedBackend: Send + Sync + 'static {
    /// Embed every text of `texts`, in order. Called with at most the configured
    /// batch size and never concurrently with itself.
    ///
    /// # Errors
    ///
    /// Returns an error if tokenization or the forward pass fails.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    fn dimension(&self) -> usize;

    fn model_id(&self) -> &str;
}

impl<B: EmbedBackend> EmbedBackend for Arc<B> {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        (**self).embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

struct Job {
    texts: Vec<String>,
    reply: oneshot::Sender<Result<Vec<Embedding>>>,
}

struct InFlight {
    texts: Vec<String>,
    taken: usize,
    results: Vec<Embedding>,
    reply: oneshot::Sender<Result<Vec<Embedding>>>,
}

impl InFlight {
    fn remaining(&self) -> usize {
        self.texts.len() - self.taken
    }
}

/// [`EmbeddingProvider`] that serializes a backend behind a batching queue.
#[derive(Clone)]
pub struct BatchingEmbedder {
    tx: mpsc::Sender<Job>,
    template: PromptTemplate,
    dimension: usize,
    model_id: Arc<str>,
}

impl std::fmt::Debug for BatchingEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchingEmbedder")
            .field("model_id", &self.model_id)
            .field("dimension", &self.dimension)
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

impl BatchingEmbedder {
    /// Start the worker task. Must be called inside a tokio runtime.
    ///
    /// `batch_size` and `queue_capacity` are clamped to at least 1.
    #[must_use]
    pub fn new<B: EmbedBackend>(backend: B, batch_size: usize, queue_capacity: usize) -> Self {
        let template = PromptTemplate::for_model(backend.model_id());
        let dimension = backend.dimension();
        let model_id: Arc<str> = Arc::from(backend.model_id());
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        tokio::spawn(run_worker(Arc::new(backend), rx, batch_size.max(1)));
        Self {
            tx,
            template,
            dimension,
            model_id,
        }
    }

    #[must_use]
    pub fn template(&self) -> PromptTemplate {
        self.template
    }
}

impl EmbeddingProvider for BatchingEmbedder {
    async fn embed(&self, texts: &[String], kind: TextKind) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let texts = texts
            .iter()
            .map(|t| self.template.apply(t, kind))
            .collect();
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Job { texts, reply })
            .await
            .map_err(|_| EmbedError::Closed)?;
        rx.await.map_err(|_| EmbedError::Closed)?
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// How many texts to take from each queued job, oldest first, for one batch.
pub(crate) fn plan_batch(remaining: &[usize], batch_size: usize) -> Vec<usize> {
    let mut room = batch_size;
    let mut plan = Vec::new();
    for &left in remaining {
        if room == 0 {
            break;
        }
        let take = left.min(room);
        plan.push(take);
        room -= take;
    }
    plan
}

async fn run_worker<B: EmbedBackend>(
    backend: Arc<B>,
    mut rx: mpsc::Receiver<Job>,
    batch_size: usize,
) {
    let mut queue: VecDeque<InFlight> = VecDeque::new();

    loop {
        if queue.is_empty() {
            let Some(job) = rx.recv().await else {
                break;
            };
            queue.push_back(InFlight::from(job));
        }
        while let Ok(job) = rx.try_recv() {
            queue.push_back(InFlight::from(job));
        }
        // callers that gave up no longer need their slot in the next batch
        queue.retain(|job| !job.reply.is_closed());
        if queue.is_empty() {
            continue;
        }

        let remaining: Vec<usize> = queue.iter().map(InFlight::remaining).collect();
        let plan = plan_batch(&remaining, batch_size);
        let mut batch = Vec::with_capacity(plan.iter().sum());
        for (job, &take) in queue.iter_mut().zip(&plan) {
            for text in &mut job.texts[job.taken..job.taken + take] {
                batch.push(std::mem::take(text));
            }
            job.taken += take;
        }

        let expected = batch.len();
        let worker_backend = Arc::clone(&backend);
        let outcome = tokio::task::spawn_blocking(move || worker_backend.embed_batch(&batch))
            .await
            .map_err(|e| EmbedError::Inference(format!("embedding task failed: {e}")))
            .and_then(|r| r)
            .and_then(|v| {
                if v.len() == expected {
                    Ok(v)
                } else {
                    Err(EmbedError::Inference(format!(
                        "backend returned {} embeddings for {expected} inputs",
                        v.len()
                    )))
                }
            });

        match outcome {
            Ok(embeddings) => {
                let mut embeddings = embeddings.into_iter();
                for (job, &take) in queue.iter_mut().zip(&plan) {
                    job.results.extend(embeddings.by_ref().take(take));
                }
                while queue.front().is_some_and(|job| job.remaining() == 0) {
                    if let Some(job) = queue.pop_front() {
                        let _ = job.reply.send(Ok(job.results));
                    }
                }
            }
            Err(e) => {
                tracing::warn!(jobs = plan.len(), "embedding batch failed: {e}");
                let message = e.to_string();
                for _ in 0..plan.len() {
                    if let Some(job) = queue.pop_front() {
                        let _ = job
                            .reply
                            .send(Err(EmbedError::Inference(message.clone())));
                    }
                }
            }
        }
    }
}

impl From<Job> for InFlight {
    fn from(job: Job) -> Self {
        let results = Vec::with_capacity(job.texts.len());
        Self {
            texts: job.texts,
            taken: 0,
            results,
            reply: job.reply,
        }
    }
}
