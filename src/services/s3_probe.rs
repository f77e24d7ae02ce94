//! Local staging for the S3 write/delete round trip.

use chrono::Utc;
use serde_json::json;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
};
use tracing::{debug, warn};

/// The probe object: a small JSON file uploaded to `s3://<bucket>/<key>` and
/// removed again straight after.
#[derive(Debug, Clone)]
pub struct S3Probe {
    pub local_path: PathBuf,
    pub key: String,
}

impl S3Probe {
    /// Probe named after the current process id, staged under `dir`.
    pub fn for_process(dir: impl AsRef<Path>) -> Self {
        Self::with_pid(dir, std::process::id())
    }

    pub fn with_pid(dir: impl AsRef<Path>, pid: u32) -> Self {
        let key = format!("test-cred-{}.json", pid);
        Self {
            local_path: dir.as_ref().join(&key),
            key,
        }
    }

    pub fn object_uri(&self, bucket: &str) -> String {
        format!("s3://{}/{}", bucket, self.key)
    }

    /// Write the local payload that the upload check copies to S3.
    ///
    /// The file must not exist yet; an existing file or symlink at
    /// `local_path` is an error and is left untouched.
    pub async fn stage(&self) -> io::Result<()> {
        let payload = json!({
            "probe": "aws-credential-check",
            "pid": std::process::id(),
            "created_at": Utc::now().to_rfc3339(),
        });
        let bytes = serde_json::to_vec_pretty(&payload)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.local_path)
            .await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        debug!(path = %self.local_path.display(), "staged s3 probe");
        Ok(())
    }

    /// Remove the local payload. A missing file is fine.
    pub async fn cleanup(&self) {
        match fs::remove_file(&self.local_path).await {
            Ok(()) => debug!(path = %self.local_path.display(), "removed s3 probe"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(
                path = %self.local_path.display(),
                error = %err,
                "could not remove local probe file"
            ),
        }
    }
}
