use async_trait::async_trait;
use launchguard_core::chain::SignalSink;
use launchguard_core::error::SinkError;
use launchguard_core::types::Signal;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// One JSON object per line: `{mint, strategy, slot, buyerCount, notes, detectedAt}`.
#[derive(Debug)]
pub struct SignalStore {
    path: PathBuf,
    // Serializes appends so lines never interleave.
    write_lock: Mutex<()>,
}

impl SignalStore {
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        // Touch the file so a bad path fails at startup, not at the first signal.
        OpenOptions::new().create(true).append(true).open(&path).await?;
        info!("🗄️ Signal store ready");

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every stored signal back. Intended for reports and tests.
    pub async fn load_all(&self) -> Result<Vec<Signal>, SinkError> {
        let content = fs::read_to_string(&self.path).await?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(SinkError::from))
            .collect()
    }
}

#[async_trait]
impl SignalSink for SignalStore {
    async fn append(&self, signal: &Signal) -> Result<(), SinkError> {
        let mut line = serde_json::to_string(signal)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(mint = %signal.mint, strategy = %signal.strategy, "Signal persisted");
        Ok(())
    }
}
