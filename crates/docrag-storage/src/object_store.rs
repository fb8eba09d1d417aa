//! Object storage trait.

use async_trait::async_trait;

use crate::error::StorageError;

/// Bucket/key blob storage for uploaded files and index snapshots.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fails with [`StorageError::ObjectNotFound`] when absent.
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Create or replace. Readers never observe a partial object.
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), StorageError>;

    /// Keys under `prefix`, sorted.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Returns false if there was nothing to delete.
    async fn delete(&self, bucket: &str, key: &str) -> Result<bool, StorageError>;
}

/// `get` that maps a missing object to `None`.
pub async fn get_optional(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
) -> Result<Option<Vec<u8>>, StorageError> {
    match store.get(bucket, key).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(StorageError::ObjectNotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Reject empty segments, `.` and `..`, and backslashes.
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    let bad = key.is_empty()
        || key.contains('\\')
        || key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if bad {
        return Err(StorageError::InvalidPath(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("reports/2024/q1.pdf").is_ok());
        assert!(validate_key("notes.txt").is_ok());

        for bad in ["", "/abs", "a//b", "../etc/passwd", "a/./b", "trailing/", "a\\b"] {
            assert!(
                matches!(validate_key(bad), Err(StorageError::InvalidPath(_))),
                "{bad} should be rejected"
            );
        }
    }
}
