//! Handlers for chunk reprocessing jobs.
//!
//! Both handlers read the chunk's content at execution time, not from the
//! job payload, so a job queued against an old edit still indexes whatever
//! the chunk says now. That makes at-least-once delivery and deduplicated
//! enqueues safe.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use corpus_core::{CacheInvalidator, ChunkRepository, JobType, SearchIndex};
use corpus_db::Database;

use crate::handler::{JobContext, JobHandler, JobResult};

/// Re-indexes a chunk's current content in the search index and drops any
/// stale cache entries.
pub struct ReindexHandler {
    db: Database,
    index: Arc<dyn SearchIndex>,
    cache: Option<Arc<dyn CacheInvalidator>>,
}

impl ReindexHandler {
    /// Create a new reindex handler.
    pub fn new(db: Database, index: Arc<dyn SearchIndex>) -> Self {
        Self {
            db,
            index,
            cache: None,
        }
    }

    /// Attach a cache invalidator.
    pub fn with_cache(mut self, cache: Arc<dyn CacheInvalidator>) -> Self {
        self.cache = Some(cache);
        self
    }
}

#[async_trait]
impl JobHandler for ReindexHandler {
    fn job_type(&self) -> JobType {
        JobType::Reindex
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let Some(chunk_id) = ctx.chunk_id() else {
            return JobResult::Failed("Reindex job has no chunk_id".into());
        };

        ctx.report_progress(10, Some("Loading chunk"));

        // A chunk deleted after enqueue is not an error; there is nothing
        // left to index.
        let chunk = match self.db.chunks.get(chunk_id).await {
            Ok(chunk) => chunk,
            Err(corpus_core::Error::ChunkNotFound(_)) => {
                debug!(chunk_id = %chunk_id, "Chunk gone before reindex, removing from index");
                if let Err(e) = self.index.remove_chunk(chunk_id).await {
                    return JobResult::Failed(format!("Failed to remove chunk from index: {}", e));
                }
                return JobResult::Success(Some(json!({"removed": true})));
            }
            Err(e) => return JobResult::Failed(format!("Failed to load chunk: {}", e)),
        };

        let content = match self.db.chunk_content(chunk_id).await {
            Ok(content) => content,
            Err(e) => return JobResult::Failed(format!("Failed to resolve chunk content: {}", e)),
        };

        ctx.report_progress(50, Some("Indexing"));

        if let Err(e) = self
            .index
            .index_chunk(chunk_id, chunk.document_id, &content)
            .await
        {
            return JobResult::Failed(format!("Indexing failed: {}", e));
        }

        if let Some(ref cache) = self.cache {
            ctx.report_progress(80, Some("Invalidating cache"));
            if let Err(e) = cache.invalidate_chunk(chunk_id).await {
                return JobResult::Failed(format!("Cache invalidation failed: {}", e));
            }
        }

        ctx.report_progress(100, Some("Done"));
        JobResult::Success(Some(json!({
            "chunk_id": chunk_id,
            "version": chunk.version,
            "content_bytes": content.len(),
        })))
    }
}

/// Recomputes a chunk's vector embedding via the search index.
///
/// Kept separate from [`ReindexHandler`] so embedding backends can run in a
/// dedicated worker process with its own concurrency limits.
pub struct VectorizeHandler {
    db: Database,
    index: Arc<dyn SearchIndex>,
}

impl VectorizeHandler {
    /// Create a new vectorize handler.
    pub fn new(db: Database, index: Arc<dyn SearchIndex>) -> Self {
        Self { db, index }
    }
}

#[async_trait]
impl JobHandler for VectorizeHandler {
    fn job_type(&self) -> JobType {
        JobType::Vectorize
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let Some(chunk_id) = ctx.chunk_id() else {
            return JobResult::Failed("Vectorize job has no chunk_id".into());
        };

        let chunk = match self.db.chunks.get(chunk_id).await {
            Ok(chunk) => chunk,
            Err(corpus_core::Error::ChunkNotFound(_)) => {
                debug!(chunk_id = %chunk_id, "Chunk gone before vectorize, nothing to do");
                return JobResult::Success(Some(json!({"skipped": true})));
            }
            Err(e) => return JobResult::Failed(format!("Failed to load chunk: {}", e)),
        };

        let content = match self.db.chunk_content(chunk_id).await {
            Ok(content) => content,
            Err(e) => return JobResult::Failed(format!("Failed to resolve chunk content: {}", e)),
        };

        ctx.report_progress(50, Some("Embedding"));

        if let Err(e) = self
            .index
            .index_chunk(chunk_id, chunk.document_id, &content)
            .await
        {
            return JobResult::Failed(format!("Embedding failed: {}", e));
        }

        ctx.report_progress(100, Some("Done"));
        JobResult::Success(Some(json!({
            "chunk_id": chunk_id,
            "version": chunk.version,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpus_core::Result;
    use std::sync::Mutex;
    use uuid::Uuid;

    pub(crate) struct RecordingIndex {
        pub indexed: Mutex<Vec<(Uuid, String)>>,
        pub removed: Mutex<Vec<Uuid>>,
    }

    impl RecordingIndex {
        pub fn new() -> Self {
            Self {
                indexed: Mutex::new(Vec::new()),
                removed: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SearchIndex for RecordingIndex {
        async fn index_chunk(
            &self,
            chunk_id: Uuid,
            _document_id: Uuid,
            content: &str,
        ) -> Result<()> {
            self.indexed
                .lock()
                .unwrap()
                .push((chunk_id, content.to_string()));
            Ok(())
        }

        async fn remove_chunk(&self, chunk_id: Uuid) -> Result<()> {
            self.removed.lock().unwrap().push(chunk_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_recording_index_records() {
        let index = RecordingIndex::new();
        let chunk_id = Uuid::new_v4();
        index
            .index_chunk(chunk_id, Uuid::new_v4(), "content")
            .await
            .unwrap();
        let indexed = index.indexed.lock().unwrap();
        assert_eq!(indexed.len(), 1);
        assert_eq!(indexed[0].0, chunk_id);
        assert_eq!(indexed[0].1, "content");
    }
}
