use stash_types::{ObjectMetadata, StorageKey};
use tracing::warn;

use crate::error::{PolicyError, StoreError};
use crate::policy::UploadPolicy;
use crate::sniff;
use crate::traits::ObjectStore;

/// Failure of the validate-then-store pipeline.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A successfully stored upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ingested {
    pub key: StorageKey,
    pub metadata: ObjectMetadata,
}

/// Validate an upload against `policy` and store it.
///
/// The size/type check and, if enabled, the content sniff both run before
/// the store is called, so a rejected upload never touches the backing
/// store.
pub fn ingest(
    store: &dyn ObjectStore,
    policy: &UploadPolicy,
    display_name: &str,
    content_type: &str,
    data: &[u8],
) -> Result<Ingested, IngestError> {
    let metadata = ObjectMetadata::new(display_name, content_type, data.len() as u64);

    let checked = policy.check(metadata.size_bytes, content_type).and_then(|()| {
        if policy.sniff_content {
            sniff::verify(content_type, data)
        } else {
            Ok(())
        }
    });
    if let Err(e) = checked {
        warn!(name = %display_name.escape_debug(), %content_type, error = %e, "upload rejected");
        return Err(e.into());
    }

    let key = store.put(&metadata, &mut &data[..])?;
    Ok(Ingested { key, metadata })
}
