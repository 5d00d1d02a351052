//! Reclamation: settle block reference counts after a file disappears.
//!
//! Callers snapshot the file's block ids BEFORE deleting the file row,
//! because the cascade on file_blocks destroys the evidence. Per-block
//! failures are logged and skipped; the enclosing delete never rolls back.

use crate::storage::ObjectStore;
use crate::store::BlockStore;

/// Decrement each snapshotted block reference; physically remove blocks
/// whose count reaches zero from both stores. Returns how many blocks were
/// removed. Duplicate ids in the snapshot decrement once per occurrence.
pub async fn reclaim_blocks(
    blocks: &BlockStore,
    store: &dyn ObjectStore,
    block_ids: &[i64],
) -> usize {
    if block_ids.is_empty() {
        return 0;
    }

    let models = match blocks.by_ids(block_ids).await {
        Ok(models) => models,
        Err(e) => {
            tracing::error!(error = %e, "fetching block metadata for reclamation");
            return 0;
        }
    };

    let mut removed = 0;
    for b in models {
        let new_count = match blocks.dec_ref(b.id).await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(block_id = b.id, error = %e, "block ref count decrement failed");
                continue;
            }
        };

        if new_count > 0 {
            continue;
        }

        // Both deletions are idempotent and may fail independently. A
        // surviving zero-ref row is healed on the next dedup hit.
        if let Err(e) = store.delete(&b.object_key).await {
            tracing::error!(
                object_key = %b.object_key,
                error = %e,
                "deleting reclaimed object from store"
            );
        }
        match blocks.delete_if_zero(b.id).await {
            Ok(true) => {
                removed += 1;
                tracing::info!(block_id = b.id, object_key = %b.object_key, "block reclaimed");
            }
            Ok(false) => {
                tracing::debug!(block_id = b.id, "block resurrected before row delete");
            }
            Err(e) => {
                tracing::error!(block_id = b.id, error = %e, "deleting reclaimed block row");
            }
        }
    }

    removed
}
