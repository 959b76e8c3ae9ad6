// LanceDB persistence for the vector index
// Stores embedded chunks plus a metadata row describing the chunk set


use arrow::array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatchIterator, StringArray,
    UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chunking::Chunk;
use crate::index::{IndexedChunk, VectorIndex};
use crate::{RagError, Result};

const CHUNKS_TABLE: &str = "chunks";
const META_TABLE: &str = "index_meta";

/// Description of a persisted chunk set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    pub fingerprint: String,
    pub embedding_model: String,
    pub dimension: u32,
    pub chunk_count: u32,
    pub created_at: String,
}

/// On-disk home of a [`VectorIndex`]
pub struct IndexStore {
    connection: Connection,
    path: PathBuf,
}

fn db_error(context: &str) -> impl FnOnce(lancedb::Error) -> RagError + '_ {
    move |e| RagError::Index(format!("{}: {}", context, e))
}

/// `file://` URI for an absolute directory. A relative path would have its
/// first component parsed as the URI host.
fn store_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

impl IndexStore {
    #[inline]
    pub async fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path).map_err(|e| {
            RagError::Index(format!(
                "Failed to create index directory {}: {}",
                path.display(),
                e
            ))
        })?;

        let path = std::path::absolute(path).map_err(|e| {
            RagError::Index(format!("Failed to resolve {}: {}", path.display(), e))
        })?;
        let uri = store_uri(&path);
        debug!("Opening index store at {}", uri);

        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(db_error("Failed to connect to LanceDB"))?;

        Ok(Self { connection, path })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn has_table(&self, name: &str) -> Result<bool> {
        let names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(db_error("Failed to list tables"))?;
        Ok(names.iter().any(|n| n == name))
    }

    async fn drop_table_if_exists(&self, name: &str) -> Result<()> {
        if self.has_table(name).await? {
            debug!("Dropping table {}", name);
            self.connection
                .drop_table(name)
                .await
                .map_err(db_error("Failed to drop table"))?;
        }
        Ok(())
    }

    /// Remove any persisted index
    #[inline]
    pub async fn clear(&self) -> Result<()> {
        self.drop_table_if_exists(META_TABLE).await?;
        self.drop_table_if_exists(CHUNKS_TABLE).await
    }

    /// Replace the persisted index with `index`.
    ///
    /// The metadata row is written last, so an interrupted save leaves no
    /// loadable index behind.
    pub async fn save(&self, index: &VectorIndex) -> Result<()> {
        self.clear().await?;

        if !index.is_empty() {
            let batch = chunk_batch(index)?;
            self.write_table(CHUNKS_TABLE, batch).await?;
        }

        let meta = IndexMeta {
            fingerprint: index.fingerprint().to_string(),
            embedding_model: index.embedding_model().to_string(),
            dimension: to_u32(index.dimension(), "dimension")?,
            chunk_count: to_u32(index.len(), "chunk count")?,
            created_at: Utc::now().to_rfc3339(),
        };
        self.write_table(META_TABLE, meta_batch(&meta)?).await?;

        info!(
            "Saved {} chunks to index store at {}",
            index.len(),
            self.path.display()
        );
        Ok(())
    }

    async fn write_table(&self, name: &str, batch: RecordBatch) -> Result<()> {
        let schema = batch.schema();
        let table = self
            .connection
            .create_empty_table(name, Arc::clone(&schema))
            .execute()
            .await
            .map_err(db_error("Failed to create table"))?;

        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(db_error("Failed to write table"))?;
        Ok(())
    }

    /// Metadata of the persisted index, if one is complete
    pub async fn meta(&self) -> Result<Option<IndexMeta>> {
        if !self.has_table(META_TABLE).await? {
            return Ok(None);
        }

        let batches = self.read_table(META_TABLE, 1).await?;
        let Some(batch) = batches.iter().find(|b| b.num_rows() > 0) else {
            warn!("Index metadata table is empty");
            return Ok(None);
        };

        Ok(Some(IndexMeta {
            fingerprint: column::<StringArray>(batch, "fingerprint")?.value(0).to_string(),
            embedding_model: column::<StringArray>(batch, "embedding_model")?
                .value(0)
                .to_string(),
            dimension: column::<UInt32Array>(batch, "dimension")?.value(0),
            chunk_count: column::<UInt32Array>(batch, "chunk_count")?.value(0),
            created_at: column::<StringArray>(batch, "created_at")?.value(0).to_string(),
        }))
    }

    /// Restore the persisted index with identical chunk order and vectors
    pub async fn load(&self) -> Result<Option<VectorIndex>> {
        let Some(meta) = self.meta().await? else {
            debug!("No persisted index at {}", self.path.display());
            return Ok(None);
        };

        let mut entries = Vec::with_capacity(meta.chunk_count as usize);
        if meta.chunk_count > 0 {
            for batch in self
                .read_table(CHUNKS_TABLE, meta.chunk_count as usize)
                .await?
            {
                entries.extend(parse_chunk_batch(&batch)?);
            }
        }

        if entries.len() != meta.chunk_count as usize {
            warn!(
                "Persisted index is incomplete: expected {} chunks, found {}",
                meta.chunk_count,
                entries.len()
            );
            return Ok(None);
        }

        VectorIndex::from_parts(entries, meta.embedding_model, meta.fingerprint).map(Some)
    }

    async fn read_table(&self, name: &str, limit: usize) -> Result<Vec<RecordBatch>> {
        let table = self
            .connection
            .open_table(name)
            .execute()
            .await
            .map_err(db_error("Failed to open table"))?;

        table
            .query()
            .limit(limit)
            .execute()
            .await
            .map_err(db_error("Failed to query table"))?
            .try_collect::<Vec<_>>()
            .await
            .map_err(db_error("Failed to read result stream"))
    }
}

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| RagError::Index(format!("Index {} {} is too large", what, value)))
}

fn chunk_schema(dimension: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("ordinal", DataType::UInt32, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                dimension,
            ),
            false,
        ),
        Field::new("content", DataType::Utf8, false),
        Field::new("overlap", DataType::Utf8, false),
        Field::new("source_path", DataType::Utf8, false),
        Field::new("page", DataType::UInt32, true),
        Field::new("document_id", DataType::Int64, true),
        Field::new("category", DataType::Utf8, true),
        Field::new("chunk_index", DataType::UInt32, false),
    ]))
}

fn meta_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("fingerprint", DataType::Utf8, false),
        Field::new("embedding_model", DataType::Utf8, false),
        Field::new("dimension", DataType::UInt32, false),
        Field::new("chunk_count", DataType::UInt32, false),
        Field::new("created_at", DataType::Utf8, false),
    ]))
}

fn meta_batch(meta: &IndexMeta) -> Result<RecordBatch> {
    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(vec![meta.fingerprint.as_str()])),
        Arc::new(StringArray::from(vec![meta.embedding_model.as_str()])),
        Arc::new(UInt32Array::from(vec![meta.dimension])),
        Arc::new(UInt32Array::from(vec![meta.chunk_count])),
        Arc::new(StringArray::from(vec![meta.created_at.as_str()])),
    ];

    RecordBatch::try_new(meta_schema(), arrays)
        .map_err(|e| RagError::Index(format!("Failed to create metadata batch: {}", e)))
}

fn chunk_batch(index: &VectorIndex) -> Result<RecordBatch> {
    let entries = index.entries();
    let dimension = i32::try_from(index.dimension())
        .map_err(|_| RagError::Index("Vector dimension is too large".to_string()))?;

    let mut flat_values = Vec::with_capacity(entries.len() * index.dimension());
    let mut chunk_indices = Vec::with_capacity(entries.len());
    for entry in entries {
        flat_values.extend_from_slice(&entry.vector);
        chunk_indices.push(to_u32(entry.chunk.chunk_index, "chunk index")?);
    }

    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array = FixedSizeListArray::try_new(
        field,
        dimension,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| RagError::Index(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(UInt32Array::from_iter_values(
            entries.iter().map(|e| e.ordinal),
        )),
        Arc::new(vector_array),
        Arc::new(StringArray::from_iter_values(
            entries.iter().map(|e| e.chunk.content.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            entries.iter().map(|e| e.chunk.overlap_with_predecessor.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            entries.iter().map(|e| e.chunk.source_path.as_str()),
        )),
        Arc::new(UInt32Array::from(
            entries.iter().map(|e| e.chunk.page).collect::<Vec<_>>(),
        )),
        Arc::new(Int64Array::from(
            entries.iter().map(|e| e.chunk.document_id).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            entries
                .iter()
                .map(|e| e.chunk.category.as_deref())
                .collect::<Vec<_>>(),
        )),
        Arc::new(UInt32Array::from(chunk_indices)),
    ];

    RecordBatch::try_new(chunk_schema(dimension), arrays)
        .map_err(|e| RagError::Index(format!("Failed to create chunk batch: {}", e)))
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Index(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| RagError::Index(format!("Invalid {} column type", name)))
}

fn parse_chunk_batch(batch: &RecordBatch) -> Result<Vec<IndexedChunk>> {
    let ordinals = column::<UInt32Array>(batch, "ordinal")?;
    let vectors = column::<FixedSizeListArray>(batch, "vector")?;
    let contents = column::<StringArray>(batch, "content")?;
    let overlaps = column::<StringArray>(batch, "overlap")?;
    let source_paths = column::<StringArray>(batch, "source_path")?;
    let pages = column::<UInt32Array>(batch, "page")?;
    let document_ids = column::<Int64Array>(batch, "document_id")?;
    let categories = column::<StringArray>(batch, "category")?;
    let chunk_indices = column::<UInt32Array>(batch, "chunk_index")?;

    (0..batch.num_rows())
        .map(|row| {
            let values = vectors.value(row);
            let vector = values
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| RagError::Index("Invalid vector item type".to_string()))?
                .values()
                .to_vec();

            Ok(IndexedChunk {
                ordinal: ordinals.value(row),
                vector,
                chunk: Chunk {
                    content: contents.value(row).to_string(),
                    overlap_with_predecessor: overlaps.value(row).to_string(),
                    source_path: source_paths.value(row).to_string(),
                    page: (!pages.is_null(row)).then(|| pages.value(row)),
                    document_id: (!document_ids.is_null(row)).then(|| document_ids.value(row)),
                    category: (!categories.is_null(row))
                        .then(|| categories.value(row).to_string()),
                    chunk_index: chunk_indices.value(row) as usize,
                },
            })
        })
        .collect()
}
