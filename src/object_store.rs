// ☁️ Object Storage - cold-storage destinations for finished archive bundles

use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::UploadError;

/// Destination for finished bundles, addressed by bucket and object key.
pub trait ObjectStore: Send + Sync {
    fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<(), UploadError>;
}

// ============================================================================
// LOCAL DIRECTORY
// ============================================================================

/// Copies objects to `<root>/<bucket>/<key>`. Used for local runs and tests.
#[derive(Debug, Clone)]
pub struct LocalDirObjectStore {
    root: PathBuf,
}

impl LocalDirObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalDirObjectStore { root: root.into() }
    }

    pub fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key)
    }
}

impl ObjectStore for LocalDirObjectStore {
    fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<(), UploadError> {
        let destination = self.object_path(bucket, key);
        let io_err = |source| UploadError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| UploadError::Backend {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        }
        let bytes = fs::copy(path, &destination).map_err(io_err)?;

        info!(bucket, key, bytes, "stored object");
        Ok(())
    }
}

// ============================================================================
// S3
// ============================================================================

#[cfg(feature = "s3")]
pub use s3::S3ObjectStore;

#[cfg(feature = "s3")]
mod s3 {
    use super::*;
    use aws_sdk_s3::primitives::ByteStream;
    use aws_sdk_s3::Client as S3Client;

    /// Blocking facade over the async S3 client.
    pub struct S3ObjectStore {
        runtime: tokio::runtime::Runtime,
        client: S3Client,
    }

    impl S3ObjectStore {
        /// Credentials and region come from the standard AWS environment.
        pub fn from_env() -> Result<Self, UploadError> {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|e| UploadError::Backend {
                    key: String::new(),
                    reason: format!("failed to start runtime: {e}"),
                })?;

            let config = runtime
                .block_on(aws_config::load_defaults(aws_config::BehaviorVersion::latest()));
            let client = S3Client::new(&config);

            Ok(S3ObjectStore { runtime, client })
        }
    }

    impl ObjectStore for S3ObjectStore {
        fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<(), UploadError> {
            self.runtime.block_on(async {
                let body = ByteStream::from_path(path)
                    .await
                    .map_err(|e| UploadError::Io {
                        path: path.to_path_buf(),
                        source: std::io::Error::other(e.to_string()),
                    })?;

                self.client
                    .put_object()
                    .bucket(bucket)
                    .key(key)
                    .body(body)
                    .send()
                    .await
                    .map_err(|e| UploadError::Backend {
                        key: key.to_string(),
                        reason: e.to_string(),
                    })?;

                info!(bucket, key, "uploaded object to S3");
                Ok(())
            })
        }
    }
}
