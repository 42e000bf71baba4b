//! Shared fakes for pipeline and route integration tests
//!
//! Nothing here needs a database or object storage: staging goes to a
//! [`MemoryChunkStore`] and the apply step is scripted.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bulkrec_common::types::{ChunkResult, ProgressEvent};
use bulkrec_server::apply::{CanonicalRow, CanonicalStore, ReconcileError, ReconcileSummary};
use bulkrec_server::ingest::{
    ApplyInvoker, ApplyMode, ChunkStore, MemoryChunkStore, PipelineConfig, ProgressSubscriber,
    StageError, StagedObject, StagedReference, StagingBackend,
};

/// Pipeline configuration with no throttling and near-instant retries
pub fn test_config(chunk_size: usize) -> PipelineConfig {
    PipelineConfig {
        chunk_size,
        staging_backend: StagingBackend::Memory,
        apply_mode: ApplyMode::Inline,
        stage_retry_base_ms: 1,
        inter_chunk_delay_ms: 0,
        ..PipelineConfig::default()
    }
}

/// A producer export with a junk header and `rows` data rows
pub fn sample_csv(rows: usize) -> Vec<u8> {
    let mut out = String::from("CODE,NAME,KANA,CAT\r\n");
    for i in 0..rows {
        out.push_str(&format!(
            "R{:06},Name {},NAMAE,C{:02},100-0001,Tokyo,03-0000-0000,{},1000,20240101,00000000,A,\r\n",
            i,
            i,
            i % 7,
            i % 50
        ));
    }
    out.into_bytes()
}

/// Sequence number encoded in a staged object name (`chunk-00003.csv` -> 3)
pub fn sequence_of(reference: &StagedReference) -> u32 {
    reference
        .as_str()
        .rsplit("chunk-")
        .next()
        .and_then(|rest| rest.strip_suffix(".csv"))
        .and_then(|digits| digits.parse().ok())
        .expect("staged reference carries a chunk sequence")
}

/// Drain a subscriber once the job has finished
pub async fn collect_events(mut subscriber: ProgressSubscriber) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Some(event) = subscriber.recv().await {
        events.push(event);
    }
    events
}

/// Apply step that reconciles every staged row, except for chosen chunks
pub struct ScriptedInvoker {
    store: Arc<dyn ChunkStore>,
    failing: HashSet<u32>,
    calls: Mutex<Vec<u32>>,
}

impl ScriptedInvoker {
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self::failing(store, &[])
    }

    pub fn failing(store: Arc<dyn ChunkStore>, sequences: &[u32]) -> Self {
        Self {
            store,
            failing: sequences.iter().copied().collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sequences in the order they were applied
    pub fn calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApplyInvoker for ScriptedInvoker {
    async fn apply(&self, reference: &StagedReference) -> ChunkResult {
        let sequence = sequence_of(reference);
        self.calls.lock().unwrap().push(sequence);

        if self.failing.contains(&sequence) {
            return ChunkResult::failed("apply step returned HTTP 500: constraint violation", 3);
        }

        let bytes = match self.store.get(reference).await {
            Ok(bytes) => bytes,
            Err(e) => return ChunkResult::failed(e.to_string(), 0),
        };
        let rows = bytes.split(|b| *b == b'\n').filter(|l| !l.is_empty()).count() as u64 - 1;

        ChunkResult {
            succeeded: true,
            reconciled_count: rows,
            errors: Vec::new(),
            processing_duration_ms: 2,
        }
    }
}

/// Memory store whose first puts and deletes fail
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryChunkStore,
    put_failures: AtomicUsize,
    delete_failures: AtomicUsize,
    puts: AtomicUsize,
}

impl FlakyStore {
    pub fn new(put_failures: usize, delete_failures: usize) -> Self {
        Self {
            inner: MemoryChunkStore::new(),
            put_failures: AtomicUsize::new(put_failures),
            delete_failures: AtomicUsize::new(delete_failures),
            puts: AtomicUsize::new(0),
        }
    }

    /// Put attempts, failed ones included
    pub fn put_attempts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub async fn staged_count(&self) -> usize {
        self.inner.len().await
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ChunkStore for FlakyStore {
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<StagedReference, StageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.put_failures) {
            return Err(StageError::Backend("connection reset by peer".to_string()));
        }
        self.inner.put(name, bytes).await
    }

    async fn get(&self, reference: &StagedReference) -> Result<Vec<u8>, StageError> {
        self.inner.get(reference).await
    }

    async fn delete(&self, reference: &StagedReference) -> Result<(), StageError> {
        if Self::take_failure(&self.delete_failures) {
            return Err(StageError::Backend("delete throttled".to_string()));
        }
        self.inner.delete(reference).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StagedObject>, StageError> {
        self.inner.list(prefix).await
    }
}

/// Canonical store keeping the last value per record code in memory
#[derive(Default)]
pub struct InMemoryCanonicalStore {
    records: Mutex<std::collections::BTreeMap<String, CanonicalRow>>,
}

impl InMemoryCanonicalStore {
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn get(&self, record_code: &str) -> Option<CanonicalRow> {
        self.records.lock().unwrap().get(record_code).cloned()
    }
}

#[async_trait]
impl CanonicalStore for InMemoryCanonicalStore {
    async fn reconcile(&self, rows: Vec<CanonicalRow>) -> Result<ReconcileSummary, ReconcileError> {
        let mut summary = ReconcileSummary::default();
        let mut records = self.records.lock().unwrap();

        for row in rows {
            let Some(code) = row.record_code.clone() else {
                summary.errors.push(format!("line {}: record_code is empty", row.line));
                continue;
            };
            if records.insert(code, row).is_some() {
                summary.updated += 1;
            } else {
                summary.inserted += 1;
            }
            summary.reconciled += 1;
        }

        Ok(summary)
    }
}
