//! Remote storage for run archives

use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use std::future::Future;
use std::path::Path;
use thiserror::Error;

use crate::error::{PatchkitError, Result};

/// Why an upload did not happen
///
/// The tracker tolerates `ArchiveNotFound` and `NoCredentials`; anything
/// else fails the finalize step.
#[derive(Debug, Error)]
pub enum UploadFailure {
    #[error("archive not found: {0}")]
    ArchiveNotFound(String),
    #[error("credentials not available: {0}")]
    NoCredentials(String),
    #[error("{0}")]
    Other(String),
}

/// Something that can receive a local file under a bucket and key
pub trait ArtifactStore {
    fn upload(
        &self,
        local: &Path,
        bucket: &str,
        key: &str,
    ) -> std::result::Result<(), UploadFailure>;
}

/// S3 (or S3-compatible) artifact store
///
/// Region and credentials follow the standard AWS resolution chain.
/// `PATCHKIT_S3_ENDPOINT_URL` overrides the endpoint (MinIO etc.) and
/// `PATCHKIT_S3_FORCE_PATH_STYLE` forces path-style addressing; it
/// defaults to on whenever an endpoint override is set.
#[derive(Debug, Clone)]
pub struct S3ArtifactStore {
    client: aws_sdk_s3::Client,
    credentials: Option<SharedCredentialsProvider>,
}

impl S3ArtifactStore {
    pub fn from_env() -> Result<Self> {
        block_on(async {
            let cfg = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

            let endpoint_url: Option<String> = std::env::var("PATCHKIT_S3_ENDPOINT_URL").ok();
            let force_path_style = match parse_env_bool("PATCHKIT_S3_FORCE_PATH_STYLE")? {
                Some(v) => v,
                None => endpoint_url.is_some(),
            };

            let mut b = aws_sdk_s3::config::Builder::from(&cfg);
            if let Some(url) = endpoint_url {
                b = b.endpoint_url(url);
            }
            if force_path_style {
                b = b.force_path_style(true);
            }

            Ok::<Self, PatchkitError>(Self {
                client: aws_sdk_s3::Client::from_conf(b.build()),
                credentials: cfg.credentials_provider(),
            })
        })?
    }

    async fn put(
        &self,
        local: &Path,
        bucket: &str,
        key: &str,
    ) -> std::result::Result<(), UploadFailure> {
        if !local.is_file() {
            return Err(UploadFailure::ArchiveNotFound(local.display().to_string()));
        }

        // Resolve credentials up front so a missing identity is told apart
        // from a failed transfer.
        let provider = self.credentials.as_ref().ok_or_else(|| {
            UploadFailure::NoCredentials("no credentials provider configured".into())
        })?;
        provider
            .provide_credentials()
            .await
            .map_err(|e| UploadFailure::NoCredentials(DisplayErrorContext(&e).to_string()))?;

        let body = ByteStream::from_path(local).await.map_err(|e| {
            if !local.exists() {
                UploadFailure::ArchiveNotFound(local.display().to_string())
            } else {
                UploadFailure::Other(format!("read {}: {e}", local.display()))
            }
        })?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| UploadFailure::Other(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}

impl ArtifactStore for S3ArtifactStore {
    fn upload(
        &self,
        local: &Path,
        bucket: &str,
        key: &str,
    ) -> std::result::Result<(), UploadFailure> {
        block_on(self.put(local, bucket, key)).map_err(|e| UploadFailure::Other(e.to_string()))?
    }
}

/// Run a future to completion from synchronous code
fn block_on<Fut>(fut: Fut) -> Result<Fut::Output>
where
    Fut: Future,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => Ok(tokio::task::block_in_place(|| handle.block_on(fut))),
        Err(_) => {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| PatchkitError::Task(format!("tokio runtime init failed: {e}")))?;
            Ok(rt.block_on(fut))
        }
    }
}

fn parse_env_bool(key: &str) -> Result<Option<bool>> {
    match std::env::var(key) {
        Ok(v) => {
            let b = match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "y" | "on" => true,
                "0" | "false" | "no" | "n" | "off" => false,
                _ => {
                    return Err(PatchkitError::config(
                        key,
                        format!("invalid boolean {v:?} (expected true/false/1/0)"),
                    ))
                }
            };
            Ok(Some(b))
        }
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(PatchkitError::config(key, format!("unreadable: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_credential_types::provider::error::CredentialsError;
    use aws_credential_types::provider::future;
    use aws_credential_types::Credentials;
    use aws_sdk_s3::config::retry::RetryConfig;
    use aws_sdk_s3::config::{BehaviorVersion, Builder, Region};
    use std::fs;
    use tempfile::tempdir;

    #[derive(Debug)]
    struct Unavailable;

    impl ProvideCredentials for Unavailable {
        fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
        where
            Self: 'a,
        {
            future::ProvideCredentials::ready(Err(CredentialsError::not_loaded("no profile")))
        }
    }

    fn offline_client() -> aws_sdk_s3::Client {
        aws_sdk_s3::Client::from_conf(
            Builder::new()
                .behavior_version(BehaviorVersion::latest())
                .region(Region::new("us-east-1"))
                .build(),
        )
    }

    fn archive(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("run.tgz");
        fs::write(&path, b"archive").unwrap();
        path
    }

    #[test]
    fn test_missing_archive_is_archive_not_found() {
        let dir = tempdir().unwrap();
        let store = S3ArtifactStore {
            client: offline_client(),
            credentials: Some(SharedCredentialsProvider::new(Unavailable)),
        };
        let err = store.upload(&dir.path().join("absent.tgz"), "bucket", "k").unwrap_err();
        assert!(matches!(err, UploadFailure::ArchiveNotFound(_)));
    }

    #[test]
    fn test_absent_provider_is_no_credentials() {
        let dir = tempdir().unwrap();
        let store = S3ArtifactStore {
            client: offline_client(),
            credentials: None,
        };
        let err = store.upload(&archive(dir.path()), "bucket", "k").unwrap_err();
        assert!(matches!(err, UploadFailure::NoCredentials(_)));
    }

    #[test]
    fn test_failing_provider_is_no_credentials() {
        let dir = tempdir().unwrap();
        let store = S3ArtifactStore {
            client: offline_client(),
            credentials: Some(SharedCredentialsProvider::new(Unavailable)),
        };
        let err = store.upload(&archive(dir.path()), "bucket", "k").unwrap_err();
        assert!(matches!(err, UploadFailure::NoCredentials(msg) if msg.contains("no profile")));
    }

    #[test]
    fn test_transfer_error_is_other() {
        let dir = tempdir().unwrap();
        let credentials = Credentials::new("id", "secret", None, None, "static");
        let client = aws_sdk_s3::Client::from_conf(
            Builder::new()
                .behavior_version(BehaviorVersion::latest())
                .region(Region::new("us-east-1"))
                .credentials_provider(credentials.clone())
                .endpoint_url("http://127.0.0.1:9")
                .force_path_style(true)
                .retry_config(RetryConfig::disabled())
                .build(),
        );
        let store = S3ArtifactStore {
            client,
            credentials: Some(SharedCredentialsProvider::new(credentials)),
        };
        let err = store.upload(&archive(dir.path()), "bucket", "k").unwrap_err();
        assert!(matches!(err, UploadFailure::Other(_)));
    }

    #[test]
    fn test_parse_env_bool() {
        std::env::set_var("PATCHKIT_TEST_BOOL_ON", "Yes");
        std::env::set_var("PATCHKIT_TEST_BOOL_OFF", "0");
        std::env::set_var("PATCHKIT_TEST_BOOL_BAD", "maybe");

        assert_eq!(parse_env_bool("PATCHKIT_TEST_BOOL_ON").unwrap(), Some(true));
        assert_eq!(parse_env_bool("PATCHKIT_TEST_BOOL_OFF").unwrap(), Some(false));
        assert_eq!(parse_env_bool("PATCHKIT_TEST_BOOL_UNSET").unwrap(), None);
        assert!(parse_env_bool("PATCHKIT_TEST_BOOL_BAD").is_err());
    }

    #[test]
    fn test_block_on_without_runtime() {
        assert_eq!(block_on(async { 41 + 1 }).unwrap(), 42);
    }
}
