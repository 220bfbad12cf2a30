//! Shared fakes for the pipeline integration suites.

#![allow(dead_code)]

use std::io::Cursor;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use lookbook_core::gateway::{
    ContentBlock, ConverseRequest, ConverseResponse, GatewayError, ModelGateway, TextToImageRequest,
    TokenUsage, TryOnRequest, TryOnResponse,
};
use lookbook_core::job::JobRecord;
use lookbook_core::ledger::{LedgerError, ProgressLedger};
use lookbook_core::memory::{InMemoryBlobStore, InMemoryLedger};
use lookbook_core::patch::PatchDocument;
use lookbook_core::storage::{BlobStore, StorageError};
use lookbook_core::types::JobId;
use lookbook_pipeline::{PipelineConfig, PipelineContext};
use rand::Rng;

pub fn job(id: &str) -> JobId {
    JobId::new(id).unwrap()
}

pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// A real PNG of the given size.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    image::RgbImage::new(width, height)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

/// Payload the fake generator returns for the `n`-th image (1-based).
pub fn generated_model(n: usize) -> Vec<u8> {
    format!("model-{n}").into_bytes()
}

/// Payload the fake try-on returns for `source`.
pub fn composite_of(source: &[u8]) -> Vec<u8> {
    let mut out = b"tryon-".to_vec();
    out.extend_from_slice(source);
    out
}

// ---------------------------------------------------------------------------
// FakeGateway
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeGateway {
    pub generate_calls: AtomicUsize,
    pub try_on_calls: AtomicUsize,
    pub converse_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,

    /// Try-on source payloads that make the call fail.
    failing_sources: Vec<Vec<u8>>,
    /// Random per-call try-on latency, in milliseconds.
    latency_ms: Option<Range<u64>>,
    /// Fixed try-on latency for failing sources (timeout tests).
    stall: Option<Duration>,
    /// Thread-blocking work per try-on call.
    busy: Option<Duration>,
    with_mask: bool,
    /// `None` makes every converse call fail.
    converse_reply: Option<String>,
    generate_fails: bool,

    pub text_requests: Mutex<Vec<TextToImageRequest>>,
    pub converse_prompts: Mutex<Vec<String>>,
    pub converse_image_counts: Mutex<Vec<usize>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(mut self, source: Vec<u8>) -> Self {
        self.failing_sources.push(source);
        self
    }

    pub fn with_latency(mut self, range_ms: Range<u64>) -> Self {
        self.latency_ms = Some(range_ms);
        self
    }

    /// Failing sources hang for `delay` instead of failing immediately.
    pub fn stalling_for(mut self, source: Vec<u8>, delay: Duration) -> Self {
        self.failing_sources.push(source);
        self.stall = Some(delay);
        self
    }

    /// Every try-on call blocks its thread for `work`, like a large decode.
    pub fn busy_for(mut self, work: Duration) -> Self {
        self.busy = Some(work);
        self
    }

    pub fn with_mask(mut self) -> Self {
        self.with_mask = true;
        self
    }

    pub fn replying(mut self, text: impl Into<String>) -> Self {
        self.converse_reply = Some(text.into());
        self
    }

    pub fn failing_generation(mut self) -> Self {
        self.generate_fails = true;
        self
    }

    pub fn generate_count(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn try_on_count(&self) -> usize {
        self.try_on_calls.load(Ordering::SeqCst)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn random_delay(&self) -> Option<Duration> {
        let range = self.latency_ms.clone()?;
        Some(Duration::from_millis(rand::rng().random_range(range)))
    }
}

#[async_trait]
impl ModelGateway for FakeGateway {
    async fn generate_images(
        &self,
        request: &TextToImageRequest,
    ) -> Result<Vec<String>, GatewayError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.text_requests.lock().unwrap().push(request.clone());
        if self.generate_fails {
            return Err(GatewayError::Api {
                status: 500,
                body: "generator down".into(),
            });
        }
        Ok((1..=request.count as usize)
            .map(|n| encode(&generated_model(n)))
            .collect())
    }

    async fn converse(
        &self,
        request: &ConverseRequest<'_>,
    ) -> Result<ConverseResponse, GatewayError> {
        self.converse_calls.fetch_add(1, Ordering::SeqCst);
        let mut images = 0;
        for block in &request.content {
            match block {
                ContentBlock::Text(text) => {
                    self.converse_prompts.lock().unwrap().push(text.clone())
                }
                ContentBlock::Image { .. } => images += 1,
            }
        }
        self.converse_image_counts.lock().unwrap().push(images);
        match &self.converse_reply {
            Some(text) => Ok(ConverseResponse {
                text: text.clone(),
                usage: Some(TokenUsage {
                    input_tokens: 1200,
                    output_tokens: 80,
                }),
            }),
            None => Err(GatewayError::Transport("connection refused".into())),
        }
    }

    async fn virtual_try_on(
        &self,
        request: &TryOnRequest<'_>,
    ) -> Result<TryOnResponse, GatewayError> {
        self.try_on_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let failing = self
            .failing_sources
            .iter()
            .any(|source| source.as_slice() == request.source_image);
        let delay = match (failing, self.stall) {
            (true, Some(stall)) => Some(stall),
            _ => self.random_delay(),
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(work) = self.busy {
            std::thread::sleep(work);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if failing {
            return Err(GatewayError::Model("ValidationException: bad input".into()));
        }
        Ok(TryOnResponse {
            images: vec![encode(&composite_of(request.source_image))],
            mask_image: self.with_mask.then(|| encode(b"mask")),
        })
    }
}

// ---------------------------------------------------------------------------
// Ledger wrapper with injectable failures
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FlakyLedger {
    pub inner: InMemoryLedger,
    pub fail_appends: bool,
}

impl FlakyLedger {
    pub fn failing_appends() -> Self {
        Self {
            inner: InMemoryLedger::new(),
            fail_appends: true,
        }
    }
}

#[async_trait]
impl ProgressLedger for FlakyLedger {
    async fn create(&self, job_id: &JobId, progress: u8, step: &str) -> Result<bool, LedgerError> {
        self.inner.create(job_id, progress, step).await
    }

    async fn apply_patch(&self, job_id: &JobId, patch: &PatchDocument) -> Result<(), LedgerError> {
        self.inner.apply_patch(job_id, patch).await
    }

    async fn append_to_list(
        &self,
        job_id: &JobId,
        field: &str,
        value: &str,
    ) -> Result<(), LedgerError> {
        if self.fail_appends {
            return Err(LedgerError::Backend("throttled".into()));
        }
        self.inner.append_to_list(job_id, field, value).await
    }

    async fn get(&self, job_id: &JobId) -> Result<Option<JobRecord>, LedgerError> {
        self.inner.get(job_id).await
    }
}

// ---------------------------------------------------------------------------
// Blob store wrapper with injectable failures
// ---------------------------------------------------------------------------

/// Fails every `put` whose key ends with `suffix`; everything else goes to
/// the wrapped in-memory store.
pub struct FlakyBlobStore {
    pub inner: InMemoryBlobStore,
    suffix: String,
}

impl FlakyBlobStore {
    pub fn failing_puts_ending_with(suffix: impl Into<String>) -> Self {
        Self {
            inner: InMemoryBlobStore::new(),
            suffix: suffix.into(),
        }
    }
}

#[async_trait]
impl BlobStore for FlakyBlobStore {
    fn namespace(&self) -> &str {
        self.inner.namespace()
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        if key.ends_with(&self.suffix) {
            return Err(StorageError::Backend("disk full".into()));
        }
        self.inner.put(key, bytes, content_type).await
    }
}

/// Context over explicit blob and ledger backends.
pub fn context_with(
    gateway: Arc<FakeGateway>,
    blobs: Arc<dyn BlobStore>,
    ledger: Arc<dyn ProgressLedger>,
) -> PipelineContext {
    PipelineContext::new(gateway, blobs, ledger, PipelineConfig::default())
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness<L> {
    pub gateway: Arc<FakeGateway>,
    pub blobs: Arc<InMemoryBlobStore>,
    pub ledger: Arc<L>,
    pub ctx: PipelineContext,
}

impl<L: ProgressLedger + 'static> Harness<L> {
    pub fn with_ledger(gateway: FakeGateway, ledger: L, config: PipelineConfig) -> Self {
        let gateway = Arc::new(gateway);
        let blobs = Arc::new(InMemoryBlobStore::new());
        let ledger = Arc::new(ledger);
        let ctx = PipelineContext::new(gateway.clone(), blobs.clone(), ledger.clone(), config);
        Self {
            gateway,
            blobs,
            ledger,
            ctx,
        }
    }
}

impl Harness<InMemoryLedger> {
    pub fn new(gateway: FakeGateway) -> Self {
        Self::with_ledger(gateway, InMemoryLedger::new(), PipelineConfig::default())
    }

    pub fn with_config(gateway: FakeGateway, config: PipelineConfig) -> Self {
        Self::with_ledger(gateway, InMemoryLedger::new(), config)
    }
}
