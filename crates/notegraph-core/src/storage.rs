use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use uuid::Uuid;

use crate::document::Document;
use crate::xref::{CrossReferenceEdge, Fingerprint};
use crate::{Error, Result};

const INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    source_path TEXT NOT NULL,
    format TEXT NOT NULL,
    content TEXT NOT NULL,
    metadata TEXT NOT NULL,
    provenance TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_source ON documents(source_path);

CREATE TABLE IF NOT EXISTS fingerprints (
    doc_id TEXT PRIMARY KEY REFERENCES documents(id) ON DELETE CASCADE,
    data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS edges (
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    score REAL NOT NULL,
    PRIMARY KEY (source_id, target_id, kind)
);

CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);
"#;

/// SQLite persistence for the document index and cross-reference graph.
///
/// Round-trips the data model exactly so the graph survives process
/// restart; richer query facilities are left to external consumers.
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn open(path: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&format!("sqlite:{path}?mode=rwc"))
            .await?;

        sqlx::query(INIT_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::query(INIT_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    // Document operations

    /// Insert or replace a document version. Pipeline runs keep the id, so
    /// the latest version wins.
    pub async fn upsert_document(&self, document: &Document) -> Result<()> {
        let metadata_json = serde_json::to_string(&document.metadata)?;
        let provenance_json = serde_json::to_string(&document.provenance)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO documents (id, source_path, format, content, metadata, provenance, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(document.id.to_string())
        .bind(&document.source_path)
        .bind(document.format.as_str())
        .bind(&document.content)
        .bind(metadata_json)
        .bind(provenance_json)
        .bind(document.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_document(&self, id: Uuid) -> Result<Document> {
        let row: (String, String, String, String, String, String, String) = sqlx::query_as(
            r#"
            SELECT id, source_path, format, content, metadata, provenance, created_at
            FROM documents WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::DocumentNotFound(id))?;

        parse_document_row(row)
    }

    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        let rows: Vec<(String, String, String, String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT id, source_path, format, content, metadata, provenance, created_at
            FROM documents ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_document_row).collect()
    }

    /// Delete a document, its fingerprint, and exactly its incident edges.
    pub async fn delete_document(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let id_str = id.to_string();

        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(&id_str)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(id));
        }

        sqlx::query("DELETE FROM fingerprints WHERE doc_id = ?")
            .bind(&id_str)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM edges WHERE source_id = ? OR target_id = ?")
            .bind(&id_str)
            .bind(&id_str)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    // Fingerprint operations

    pub async fn save_fingerprint(&self, doc_id: Uuid, fingerprint: &Fingerprint) -> Result<()> {
        let data = serde_json::to_string(fingerprint)?;

        sqlx::query("INSERT OR REPLACE INTO fingerprints (doc_id, data) VALUES (?, ?)")
            .bind(doc_id.to_string())
            .bind(data)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn load_fingerprints(&self) -> Result<Vec<(Uuid, Fingerprint)>> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT doc_id, data FROM fingerprints")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|(id, data)| {
                let id = parse_uuid(&id)?;
                let fingerprint = serde_json::from_str(&data)?;
                Ok((id, fingerprint))
            })
            .collect()
    }

    // Edge operations

    /// Replace a document's incident edges in one transaction, matching
    /// the in-memory graph's atomic per-document semantics.
    pub async fn replace_edges(&self, doc_id: Uuid, edges: &[CrossReferenceEdge]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let id_str = doc_id.to_string();

        sqlx::query("DELETE FROM edges WHERE source_id = ? OR target_id = ?")
            .bind(&id_str)
            .bind(&id_str)
            .execute(&mut *tx)
            .await?;

        for edge in edges {
            sqlx::query(
                "INSERT OR REPLACE INTO edges (source_id, target_id, kind, score) VALUES (?, ?, ?, ?)",
            )
            .bind(edge.source_id.to_string())
            .bind(edge.target_id.to_string())
            .bind(edge.kind.as_str())
            .bind(edge.score)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn load_edges(&self) -> Result<Vec<CrossReferenceEdge>> {
        let rows: Vec<(String, String, String, f64)> =
            sqlx::query_as("SELECT source_id, target_id, kind, score FROM edges")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(source, target, kind, score)| {
                CrossReferenceEdge::new(parse_uuid(&source)?, parse_uuid(&target)?, score, kind.parse()?)
            })
            .collect()
    }

    pub async fn edges_for(&self, doc_id: Uuid) -> Result<Vec<CrossReferenceEdge>> {
        let id_str = doc_id.to_string();
        let rows: Vec<(String, String, String, f64)> = sqlx::query_as(
            "SELECT source_id, target_id, kind, score FROM edges WHERE source_id = ? OR target_id = ?",
        )
        .bind(&id_str)
        .bind(&id_str)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(source, target, kind, score)| {
                CrossReferenceEdge::new(parse_uuid(&source)?, parse_uuid(&target)?, score, kind.parse()?)
            })
            .collect()
    }
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    s.parse()
        .map_err(|_| Error::GraphCorruption(format!("invalid uuid in storage: {s}")))
}

fn parse_document_row(
    row: (String, String, String, String, String, String, String),
) -> Result<Document> {
    let (id, source_path, format, content, metadata_json, provenance_json, created_at) = row;

    Ok(Document {
        id: parse_uuid(&id)?,
        source_path,
        format: format.parse()?,
        content,
        metadata: serde_json::from_str(&metadata_json)?,
        provenance: serde_json::from_str(&provenance_json)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|_| Error::GraphCorruption(format!("invalid timestamp in storage: {created_at}")))?
            .with_timezone(&Utc),
    })
}
