//! Append-only chunk version ledger.
//!
//! Every edit to a chunk produces an immutable `chunk_version` row; the
//! chunk's `chunk_version_id` pointer moves forward and never back. For a
//! given chunk the `version_number` values form a contiguous 1..N sequence
//! matching creation order. Restoring an old version appends a new one with
//! the old content; nothing is ever mutated or deleted.

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use corpus_core::{
    defaults, new_v7, ChunkVersion, Error, Result, VersionRepository, VersionSummary,
};

/// PostgreSQL implementation of [`VersionRepository`].
#[derive(Clone)]
pub struct PgVersionRepository {
    pool: PgPool,
}

impl PgVersionRepository {
    /// Create a new version repository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// SHA-256 content hash, hex-encoded.
    pub fn hash_content(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Transaction-aware variant of `create_version`.
    ///
    /// Callers that also move the chunk pointer must pass the same
    /// transaction so the `max(version_number) + 1` allocation and the
    /// pointer update commit atomically. The caller is expected to hold the
    /// chunk row lock; this keeps concurrent edits from allocating the same
    /// number.
    pub async fn create_version_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        chunk_id: Uuid,
        content: &str,
        modified_by: &str,
        comment: Option<&str>,
    ) -> Result<ChunkVersion> {
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM document_chunk WHERE id = $1")
            .bind(chunk_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)?;
        if exists.is_none() {
            return Err(Error::ChunkNotFound(chunk_id));
        }

        let next_number: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(version_number), 0) + 1 FROM chunk_version WHERE chunk_id = $1",
        )
        .bind(chunk_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(Error::Database)?;

        let version = ChunkVersion {
            id: new_v7(),
            chunk_id,
            version_number: next_number,
            content: content.to_string(),
            hash: Self::hash_content(content),
            modified_by: modified_by.to_string(),
            comment: comment.map(String::from),
            created_at_utc: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO chunk_version (id, chunk_id, version_number, content, hash, modified_by, comment, created_at_utc)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(version.id)
        .bind(version.chunk_id)
        .bind(version.version_number)
        .bind(&version.content)
        .bind(&version.hash)
        .bind(&version.modified_by)
        .bind(&version.comment)
        .bind(version.created_at_utc)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

        debug!(
            chunk_id = %chunk_id,
            version_number = next_number,
            "Appended chunk version"
        );

        Ok(version)
    }
}

#[async_trait]
impl VersionRepository for PgVersionRepository {
    async fn create_version(
        &self,
        chunk_id: Uuid,
        content: &str,
        modified_by: &str,
        comment: Option<&str>,
    ) -> Result<ChunkVersion> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Lock the chunk row so concurrent edits serialize on the number
        // allocation even when called outside the chunk update protocol.
        sqlx::query("SELECT id FROM document_chunk WHERE id = $1 FOR UPDATE")
            .bind(chunk_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        let version = self
            .create_version_tx(&mut tx, chunk_id, content, modified_by, comment)
            .await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(version)
    }

    async fn get_history(&self, chunk_id: Uuid) -> Result<Vec<ChunkVersion>> {
        let versions: Vec<ChunkVersion> = sqlx::query_as(
            r#"
            SELECT id, chunk_id, version_number, content, hash, modified_by, comment, created_at_utc
            FROM chunk_version
            WHERE chunk_id = $1
            ORDER BY version_number ASC
            "#,
        )
        .bind(chunk_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(versions)
    }

    async fn list_summaries(&self, chunk_id: Uuid) -> Result<Vec<VersionSummary>> {
        let current: Option<(Option<Uuid>,)> =
            sqlx::query_as("SELECT chunk_version_id FROM document_chunk WHERE id = $1")
                .bind(chunk_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::Database)?;
        let current_id = current.and_then(|r| r.0);

        let rows: Vec<(Uuid, i32, String, Option<String>, chrono::DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT id, version_number, modified_by, comment, created_at_utc
            FROM chunk_version
            WHERE chunk_id = $1
            ORDER BY version_number ASC
            "#,
        )
        .bind(chunk_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(
                |(id, version_number, modified_by, comment, created_at_utc)| VersionSummary {
                    id,
                    version_number,
                    modified_by,
                    comment,
                    created_at_utc,
                    is_current: Some(id) == current_id,
                },
            )
            .collect())
    }

    async fn get_version(&self, version_id: Uuid) -> Result<Option<ChunkVersion>> {
        let version: Option<ChunkVersion> = sqlx::query_as(
            r#"
            SELECT id, chunk_id, version_number, content, hash, modified_by, comment, created_at_utc
            FROM chunk_version
            WHERE id = $1
            "#,
        )
        .bind(version_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(version)
    }

    async fn restore(&self, version_id: Uuid) -> Result<ChunkVersion> {
        let target = self
            .get_version(version_id)
            .await?
            .ok_or(Error::VersionNotFound(version_id))?;

        let comment = format!("Restored from version {}", target.version_number);

        // Restore goes through the normal edit path: append a new version
        // with the old content and move the chunk pointer forward. The
        // target row and everything after it are left untouched.
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let chunk_row: Option<(i32,)> =
            sqlx::query_as("SELECT version FROM document_chunk WHERE id = $1 FOR UPDATE")
                .bind(target.chunk_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(Error::Database)?;
        let current_version = chunk_row
            .ok_or(Error::ChunkNotFound(target.chunk_id))?
            .0;

        let version = self
            .create_version_tx(
                &mut tx,
                target.chunk_id,
                &target.content,
                defaults::SYSTEM_ACTOR,
                Some(&comment),
            )
            .await?;

        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE document_chunk
            SET content = $1, chunk_version_id = $2, version = $3,
                modification_count = modification_count + 1,
                last_modified_by = $4, last_modified_at = $5
            WHERE id = $6
            "#,
        )
        .bind(&version.content)
        .bind(version.id)
        .bind(current_version + 1)
        .bind(defaults::SYSTEM_ACTOR)
        .bind(now)
        .bind(target.chunk_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(version)
    }

    async fn diff_versions(&self, chunk_id: Uuid, from: i32, to: i32) -> Result<String> {
        let fetch = |number: i32| async move {
            let v: Option<ChunkVersion> = sqlx::query_as(
                r#"
                SELECT id, chunk_id, version_number, content, hash, modified_by, comment, created_at_utc
                FROM chunk_version
                WHERE chunk_id = $1 AND version_number = $2
                "#,
            )
            .bind(chunk_id)
            .bind(number)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
            v.ok_or_else(|| Error::NotFound(format!("Version {} of chunk {}", number, chunk_id)))
        };

        let from_version = fetch(from).await?;
        let to_version = fetch(to).await?;

        let diff = similar::TextDiff::from_lines(&from_version.content, &to_version.content);
        let mut output = String::new();

        output.push_str(&format!("--- version {}\n", from));
        output.push_str(&format!("+++ version {}\n", to));

        for change in diff.iter_all_changes() {
            let sign = match change.tag() {
                similar::ChangeTag::Delete => "-",
                similar::ChangeTag::Insert => "+",
                similar::ChangeTag::Equal => " ",
            };
            output.push_str(&format!("{}{}", sign, change));
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_content_stable() {
        let a = PgVersionRepository::hash_content("hello");
        let b = PgVersionRepository::hash_content("hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // SHA-256 hex
    }

    #[test]
    fn test_hash_content_differs() {
        assert_ne!(
            PgVersionRepository::hash_content("hello"),
            PgVersionRepository::hash_content("hello ")
        );
    }
}
