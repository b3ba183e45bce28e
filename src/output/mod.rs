use std::path::{Path, PathBuf};

use log::error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

pub const DEFAULT_OUTPUT_PATH: &str = "output";

/// Collects result lines from every worker and keeps the backing file equal
/// to the full sequence after each append.
#[derive(Debug)]
pub struct ResultSink {
    path: PathBuf,
    lines: Mutex<Vec<String>>,
}

impl ResultSink {
    /// Creates the backing file if it does not exist yet. A failure here is
    /// logged and the sink keeps working in memory.
    pub async fn create(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        if tokio::fs::metadata(&path).await.is_err() {
            if let Err(e) = tokio::fs::File::create(&path).await {
                error!("failed to create output file '{}': {e}", path.display());
            }
        }
        Self {
            path,
            lines: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `line` verbatim, then rewrites the file from every accepted
    /// line while still holding the lock.
    pub async fn append(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock().await;
        lines.push(line.into());

        let rendered: String = lines.concat();
        if let Err(e) = rewrite(&self.path, rendered.as_bytes()).await {
            error!("failed to write output file '{}': {e}", self.path.display());
        }
    }

    pub async fn lines(&self) -> Vec<String> {
        self.lines.lock().await.clone()
    }
}

async fn rewrite(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut outfile = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .await?;
    outfile.write_all(contents).await?;
    outfile.flush().await?;
    Ok(())
}
