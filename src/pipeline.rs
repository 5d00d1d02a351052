//! Block ingest pipeline: split -> hash -> dedup decision -> upload.
//!
//! One reader splits the input stream into fixed-size blocks and feeds a
//! bounded job channel; a fixed pool of workers hashes each block, consults
//! the metadata store, and uploads new blocks to the object store. The job
//! channel capacity equals the worker count, so the reader blocks while all
//! workers are busy and resident block memory stays O(workers x block size)
//! no matter how large the input is.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::db::entities::block;
use crate::digest::BlockDigest;
use crate::error::{Result, ServerError};
use crate::storage::ObjectStore;
use crate::store::BlockStore;

/// Concurrent block workers per upload.
pub const DEFAULT_WORKERS: usize = 8;

/// One block's worth of input, tagged with its position in the stream.
struct BlockJob {
    index: usize,
    data: Bytes,
}

struct BlockResult {
    index: usize,
    outcome: Result<i64>,
}

pub struct PipelineOutput {
    /// Block ids in input order; index i holds the block at position i.
    pub block_ids: Vec<i64>,
    /// Sum of job lengths, authoritative for `File.total_size`.
    pub total_bytes: u64,
}

pub struct BlockPipeline {
    blocks: BlockStore,
    store: Arc<dyn ObjectStore>,
    block_size: usize,
    workers: usize,
}

impl BlockPipeline {
    pub fn new(
        blocks: BlockStore,
        store: Arc<dyn ObjectStore>,
        block_size: usize,
        workers: usize,
    ) -> Self {
        Self {
            blocks,
            store,
            block_size,
            workers,
        }
    }

    /// Stream `input` through the worker pool, producing the ordered block-id
    /// list for the file record. The first worker error cancels the reader;
    /// remaining workers drain their queue and exit. Nothing is rolled back:
    /// already-uploaded blocks and ref-count bumps from a failed upload stay
    /// behind until reclamation touches them.
    pub async fn process<R>(&self, input: R) -> Result<PipelineOutput>
    where
        R: AsyncRead + Unpin,
    {
        let cancel = CancellationToken::new();
        let (job_tx, job_rx) = mpsc::channel::<BlockJob>(self.workers);
        let (result_tx, mut result_rx) = mpsc::channel::<BlockResult>(self.workers);
        let job_rx = Arc::new(Mutex::new(job_rx));

        // Workers are detached tasks: a dropped request future does not abort
        // a block whose bytes were already read.
        for _ in 0..self.workers {
            tokio::spawn(run_worker(
                self.blocks.clone(),
                self.store.clone(),
                job_rx.clone(),
                result_tx.clone(),
                cancel.clone(),
            ));
        }
        drop(result_tx);

        let reader = read_blocks(input, self.block_size, job_tx, cancel.clone());

        let gather = async {
            let mut done: Vec<(usize, i64)> = Vec::new();
            let mut first_err: Option<(usize, ServerError)> = None;
            while let Some(res) = result_rx.recv().await {
                match res.outcome {
                    Ok(id) => done.push((res.index, id)),
                    Err(e) => {
                        if first_err.is_none() {
                            first_err = Some((res.index, e));
                        }
                    }
                }
            }
            (done, first_err)
        };

        let (read_res, (done, first_err)) = tokio::join!(reader, gather);

        if let Some((index, err)) = first_err {
            tracing::error!(block_index = index, error = %err, "pipeline worker failed");
            return Err(err);
        }
        let total_bytes = read_res?;

        let mut ordered: Vec<Option<i64>> = vec![None; done.len()];
        for (index, id) in done {
            if index >= ordered.len() || ordered[index].is_some() {
                return Err(ServerError::Internal(
                    "pipeline produced an inconsistent block list".to_string(),
                ));
            }
            ordered[index] = Some(id);
        }
        let block_ids = ordered
            .into_iter()
            .map(|slot| {
                slot.ok_or_else(|| {
                    ServerError::Internal("pipeline produced a sparse block list".to_string())
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(PipelineOutput {
            block_ids,
            total_bytes,
        })
    }
}

/// Read the input one block at a time and feed the workers. Blocks on the
/// job channel when all workers are busy, which is what bounds memory.
async fn read_blocks<R: AsyncRead + Unpin>(
    mut input: R,
    block_size: usize,
    jobs: mpsc::Sender<BlockJob>,
    cancel: CancellationToken,
) -> Result<u64> {
    let mut total: u64 = 0;
    let mut index: usize = 0;

    loop {
        let mut buf = vec![0u8; block_size];
        let mut filled = 0;
        while filled < block_size {
            let n = match input.read(&mut buf[filled..]).await {
                Ok(n) => n,
                Err(e) => {
                    cancel.cancel();
                    return Err(ServerError::UploadFailed(format!(
                        "reading upload stream: {e}"
                    )));
                }
            };
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            // EOF on a block boundary produces no final block.
            break;
        }

        buf.truncate(filled);
        total += filled as u64;
        let job = BlockJob {
            index,
            data: Bytes::from(buf),
        };
        index += 1;

        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = jobs.send(job) => {
                if sent.is_err() {
                    break;
                }
            }
        }

        if filled < block_size {
            // A short block only happens at end of stream.
            break;
        }
    }

    Ok(total)
}

async fn run_worker(
    blocks: BlockStore,
    store: Arc<dyn ObjectStore>,
    jobs: Arc<Mutex<mpsc::Receiver<BlockJob>>>,
    results: mpsc::Sender<BlockResult>,
    cancel: CancellationToken,
) {
    loop {
        let job = { jobs.lock().await.recv().await };
        let Some(job) = job else { break };

        if cancel.is_cancelled() {
            // Another worker failed; drain the queue without doing work.
            continue;
        }

        let outcome = process_block(&blocks, store.as_ref(), &job).await;
        if outcome.is_err() {
            cancel.cancel();
        }
        if results
            .send(BlockResult {
                index: job.index,
                outcome,
            })
            .await
            .is_err()
        {
            break;
        }
    }
}

/// Handle one block: dedup check, then either take a reference on the
/// existing block or upload and register a new one.
async fn process_block(
    blocks: &BlockStore,
    store: &dyn ObjectStore,
    job: &BlockJob,
) -> Result<i64> {
    let digest = BlockDigest::from_data(&job.data).to_hex();

    if let Some(existing) = blocks.find_by_digest(&digest).await? {
        let id = claim_existing(blocks, store, &existing, &job.data).await?;
        tracing::debug!(
            block_index = job.index,
            block_id = id,
            digest = %digest,
            size_bytes = job.data.len(),
            "block dedup hit"
        );
        return Ok(id);
    }

    // New digest: upload under key == digest, then register.
    store.put(&digest, job.data.clone()).await.map_err(|e| {
        ServerError::UploadFailed(format!("block upload at index {}: {}", job.index, e))
    })?;

    match blocks
        .try_create(&digest, &digest, job.data.len() as i64)
        .await?
    {
        Some(created) => {
            tracing::debug!(
                block_index = job.index,
                block_id = created.id,
                digest = %digest,
                size_bytes = job.data.len(),
                "new block uploaded"
            );
            Ok(created.id)
        }
        None => {
            // Lost the insert race. The winner's object holds identical
            // bytes, so our upload needs no cleanup; count this as a hit.
            let existing = blocks.find_by_digest(&digest).await?.ok_or_else(|| {
                ServerError::Internal(format!(
                    "block row for digest {digest} vanished after insert conflict"
                ))
            })?;
            blocks.inc_ref(existing.id).await?;
            tracing::debug!(
                block_index = job.index,
                block_id = existing.id,
                digest = %digest,
                "lost insert race, treated as dedup hit"
            );
            Ok(existing.id)
        }
    }
}

async fn claim_existing(
    blocks: &BlockStore,
    store: &dyn ObjectStore,
    existing: &block::Model,
    data: &Bytes,
) -> Result<i64> {
    // A row at zero survived an earlier reclamation whose object delete
    // already ran; restore the bytes before taking a new reference.
    if existing.ref_count <= 0 {
        tracing::warn!(
            block_id = existing.id,
            digest = %existing.digest,
            "re-uploading object for resurrected zero-ref block"
        );
        store
            .put(&existing.object_key, data.clone())
            .await
            .map_err(|e| ServerError::UploadFailed(format!("block re-upload: {e}")))?;
    }
    blocks.inc_ref(existing.id).await?;
    Ok(existing.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::storage::{LocalObjectStore, StorageError, StorageResult};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Fixture {
        pipeline: BlockPipeline,
        blocks: BlockStore,
        store: Arc<LocalObjectStore>,
        _dir: TempDir,
    }

    async fn fixture(block_size: usize) -> Fixture {
        let db = test_db().await;
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalObjectStore::new(dir.path().to_path_buf()));
        let blocks = BlockStore::new(db);
        let pipeline = BlockPipeline::new(blocks.clone(), store.clone(), block_size, 4);
        Fixture {
            pipeline,
            blocks,
            store,
            _dir: dir,
        }
    }

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_short_final_block() {
        let f = fixture(8).await;
        let data = patterned(20);

        let out = f.pipeline.process(&data[..]).await.unwrap();
        assert_eq!(out.total_bytes, 20);
        assert_eq!(out.block_ids.len(), 3);

        let models = f.blocks.by_ids(&out.block_ids).await.unwrap();
        let sizes: Vec<i64> = models.iter().map(|b| b.size_bytes).collect();
        assert_eq!(sizes, vec![8, 8, 4]);

        for b in &models {
            assert!(f.store.head(&b.object_key).await.unwrap());
            assert_eq!(b.ref_count, 1);
        }
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_trailing_block() {
        let f = fixture(8).await;
        let data = patterned(24);

        let out = f.pipeline.process(&data[..]).await.unwrap();
        assert_eq!(out.block_ids.len(), 3);
        assert_eq!(out.total_bytes, 24);

        let sizes: Vec<i64> = f
            .blocks
            .by_ids(&out.block_ids)
            .await
            .unwrap()
            .iter()
            .map(|b| b.size_bytes)
            .collect();
        assert_eq!(sizes, vec![8, 8, 8]);
    }

    #[tokio::test]
    async fn test_single_byte_file() {
        let f = fixture(8).await;

        let out = f.pipeline.process(&b"x"[..]).await.unwrap();
        assert_eq!(out.total_bytes, 1);
        assert_eq!(out.block_ids.len(), 1);

        let b = &f.blocks.by_ids(&out.block_ids).await.unwrap()[0];
        assert_eq!(b.size_bytes, 1);
    }

    #[tokio::test]
    async fn test_empty_input_produces_no_blocks() {
        let f = fixture(8).await;

        let out = f.pipeline.process(&b""[..]).await.unwrap();
        assert_eq!(out.total_bytes, 0);
        assert!(out.block_ids.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_blocks_within_one_file() {
        let f = fixture(8).await;
        // Five identical blocks.
        let data: Vec<u8> = patterned(8).repeat(5);

        let out = f.pipeline.process(&data[..]).await.unwrap();
        assert_eq!(out.block_ids.len(), 5);
        // Every index points at the same physical block.
        assert!(out.block_ids.iter().all(|id| *id == out.block_ids[0]));

        let b = f.blocks.by_ids(&out.block_ids[..1]).await.unwrap();
        assert_eq!(b[0].ref_count, 5);
    }

    #[tokio::test]
    async fn test_reupload_dedups_against_existing_blocks() {
        let f = fixture(8).await;
        let data = patterned(20);

        let first = f.pipeline.process(&data[..]).await.unwrap();
        let second = f.pipeline.process(&data[..]).await.unwrap();

        assert_eq!(first.block_ids, second.block_ids);
        for b in f.blocks.by_ids(&first.block_ids).await.unwrap() {
            assert_eq!(b.ref_count, 2);
        }
    }

    #[tokio::test]
    async fn test_output_order_matches_read_order() {
        // More blocks than workers so completion order scrambles freely.
        let f = fixture(8).await;
        let data = patterned(8 * 32);

        let out = f.pipeline.process(&data[..]).await.unwrap();
        assert_eq!(out.block_ids.len(), 32);

        let models = f.blocks.by_ids(&out.block_ids).await.unwrap();
        for (i, b) in models.iter().enumerate() {
            let expected = BlockDigest::from_data(&data[i * 8..(i + 1) * 8]).to_hex();
            assert_eq!(b.digest, expected, "block at index {i} out of order");
        }
    }

    #[tokio::test]
    async fn test_concurrent_uploads_of_same_content() {
        let f = fixture(8).await;
        let data = patterned(8);

        let (a, b) = tokio::join!(f.pipeline.process(&data[..]), f.pipeline.process(&data[..]));
        let a = a.unwrap();
        let b = b.unwrap();

        assert_eq!(a.block_ids, b.block_ids);
        let model = &f.blocks.by_ids(&a.block_ids).await.unwrap()[0];
        assert_eq!(model.ref_count, 2);
        assert!(f.store.head(&model.object_key).await.unwrap());
    }

    #[tokio::test]
    async fn test_zero_ref_row_gets_its_object_back() {
        let f = fixture(8).await;
        let data = patterned(8);

        let out = f.pipeline.process(&data[..]).await.unwrap();
        let block_id = out.block_ids[0];
        let key = f.blocks.by_ids(&[block_id]).await.unwrap()[0]
            .object_key
            .clone();

        // Simulate a reclamation that removed the object but left the row.
        assert_eq!(f.blocks.dec_ref(block_id).await.unwrap(), 0);
        f.store.delete(&key).await.unwrap();
        assert!(!f.store.head(&key).await.unwrap());

        let again = f.pipeline.process(&data[..]).await.unwrap();
        assert_eq!(again.block_ids, vec![block_id]);
        assert!(f.store.head(&key).await.unwrap());
        assert_eq!(f.blocks.by_ids(&[block_id]).await.unwrap()[0].ref_count, 1);
    }

    /// Object store whose puts always fail, for error-path tests.
    struct BrokenStore;

    #[async_trait]
    impl crate::storage::ObjectStore for BrokenStore {
        async fn put(&self, _key: &str, _data: Bytes) -> StorageResult<()> {
            Err(StorageError::Transport("injected put failure".to_string()))
        }
        async fn get(&self, key: &str) -> StorageResult<crate::storage::BoxReader> {
            Err(StorageError::NotFound(key.to_string()))
        }
        async fn head(&self, _key: &str) -> StorageResult<bool> {
            Ok(false)
        }
        async fn delete(&self, _key: &str) -> StorageResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_first_worker_error_fails_the_upload() {
        let db = test_db().await;
        let blocks = BlockStore::new(db);
        let pipeline = BlockPipeline::new(blocks.clone(), Arc::new(BrokenStore), 8, 4);

        let data = patterned(64);
        match pipeline.process(&data[..]).await {
            Err(ServerError::UploadFailed(msg)) => {
                assert!(msg.contains("injected put failure"));
            }
            other => panic!("expected UploadFailed, got {:?}", other.map(|o| o.block_ids)),
        }

        // No file ever references the failed upload's blocks.
        assert!(blocks.by_ids(&[1]).await.unwrap().is_empty());
    }
}
