//! JsonlSubmissionLog - 投稿を 1 行 1 JSON でファイルに追記
//!
//! ファイルは都度 append モードで開き、閉じる。プロセスを跨いでも追記になる。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::ports::{SubmissionEntry, SubmissionLog};

/// 1 エントリ 1 行で JSONL ファイルに追記する投稿ログ
#[derive(Debug, Clone)]
pub struct JsonlSubmissionLog {
    path: PathBuf,
}

impl JsonlSubmissionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SubmissionLog for JsonlSubmissionLog {
    async fn append(&self, entry: &SubmissionEntry) -> std::io::Result<()> {
        let mut line = serde_json::to_string(entry).map_err(std::io::Error::other)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}
