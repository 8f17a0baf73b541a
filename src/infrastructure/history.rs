//! Persisted chat histories on the local filesystem

use crate::core::errors::ChatError;
use crate::infrastructure::settings::Settings;
use crate::infrastructure::traits::HistoryRepository;
use async_trait::async_trait;
use chrono::Local;
use di::{Ref, inject, injectable};
use log::{error, info};
use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};

pub struct FsHistoryRepository {
    directory: PathBuf,
}

#[injectable(HistoryRepository)]
impl FsHistoryRepository {
    #[inject]
    pub fn create(settings: Ref<Settings>) -> FsHistoryRepository {
        FsHistoryRepository::new(settings.history_dir.clone())
    }
}

impl FsHistoryRepository {
    pub fn new(directory: impl Into<PathBuf>) -> FsHistoryRepository {
        FsHistoryRepository {
            directory: directory.into(),
        }
    }

    /// `chat_history_<YYYYmmdd_HHMMSS>.json`, with a counter appended if that name is taken.
    fn candidate_name(stamp: &str, attempt: u32) -> String {
        if attempt == 0 {
            format!("chat_history_{stamp}.json")
        } else {
            format!("chat_history_{stamp}_{attempt}.json")
        }
    }

    fn resolve(&self, filename: &str) -> Result<PathBuf, ChatError> {
        let path = Path::new(filename);
        let plain = path.file_name() == Some(OsStr::new(filename));
        let json = path.extension() == Some(OsStr::new("json"));
        if !plain || !json {
            return Err(ChatError::StorageFailure(format!(
                "`{filename}` is not a history file name"
            )));
        }
        Ok(self.directory.join(filename))
    }
}

#[async_trait]
impl HistoryRepository for FsHistoryRepository {
    async fn save(&self, blob: &str) -> Result<String, ChatError> {
        fs::create_dir_all(&self.directory).await.map_err(|e| {
            error!("cannot create {}: {e}", self.directory.display());
            ChatError::from(e)
        })?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut attempt = 0;
        loop {
            let filename = Self::candidate_name(&stamp, attempt);
            let path = self.directory.join(&filename);
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => {
                    write_or_discard(file, &path, blob).await?;
                    info!("chat history saved to {}", path.display());
                    return Ok(filename);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => {
                    error!("cannot write {}: {e}", path.display());
                    return Err(e.into());
                }
            }
        }
    }

    async fn load(&self, filename: &str) -> Result<String, ChatError> {
        let path = self.resolve(filename)?;
        fs::read_to_string(&path).await.map_err(|e| {
            error!("cannot read {}: {e}", path.display());
            ChatError::StorageFailure(format!("cannot read {filename}: {e}"))
        })
    }
}

/// Writes `blob` through `writer`, removing `path` if the write fails so no truncated
/// history is left behind.
async fn write_or_discard<W>(mut writer: W, path: &Path, blob: &str) -> Result<(), ChatError>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        writer.write_all(blob.as_bytes()).await?;
        writer.flush().await
    }
    .await;

    if let Err(e) = written {
        drop(writer);
        error!("cannot write {}: {e}", path.display());
        if let Err(remove_error) = fs::remove_file(path).await {
            error!("cannot remove partial {}: {remove_error}", path.display());
        }
        return Err(e.into());
    }
    Ok(())
}
