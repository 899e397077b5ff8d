//! One file per record under `<base>/<client id>/`.
//!
//! Writes go to a temporary file that is synced and renamed over the record,
//! so a crash leaves either the old or the new value.

use super::{Persistence, StoreFuture};
use bytes::Bytes;
use parking_lot::RwLock;
use relaymq_protocol::{MqttError, Result};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Bump only when the directory layout or record encoding changes.
const STORAGE_VERSION: &str = "1";
const VERSION_FILE: &str = ".storage_version";
const RECORD_EXTENSION: &str = "msg";
const TEMP_EXTENSION: &str = "tmp";

#[derive(Debug)]
pub struct FilePersistence {
    base_dir: PathBuf,
    client_dir: RwLock<Option<PathBuf>>,
}

impl FilePersistence {
    #[must_use]
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            client_dir: RwLock::new(None),
        }
    }

    fn dir(&self) -> Result<PathBuf> {
        self.client_dir
            .read()
            .clone()
            .ok_or_else(|| MqttError::Persistence("Store is not open".to_string()))
    }

    fn record_path(&self, key: &str) -> Result<PathBuf> {
        Ok(self
            .dir()?
            .join(format!("{}.{RECORD_EXTENSION}", encode_component(key))))
    }

    async fn check_storage_version(base_dir: &Path) -> Result<()> {
        let version_file = base_dir.join(VERSION_FILE);
        match fs::read_to_string(&version_file).await {
            Ok(found) if found.trim() == STORAGE_VERSION => {
                debug!(version = STORAGE_VERSION, "Storage version verified");
                Ok(())
            }
            Ok(found) => Err(MqttError::Configuration(format!(
                "Storage version mismatch in {}: found {}, expected {STORAGE_VERSION}",
                base_dir.display(),
                found.trim()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                fs::create_dir_all(base_dir).await.map_err(|e| {
                    MqttError::Configuration(format!("Failed to create storage dir: {e}"))
                })?;
                fs::write(&version_file, STORAGE_VERSION)
                    .await
                    .map_err(|e| {
                        MqttError::Configuration(format!("Failed to write storage version: {e}"))
                    })?;
                info!(dir = %base_dir.display(), "Created new storage with version {STORAGE_VERSION}");
                Ok(())
            }
            Err(e) => Err(MqttError::Configuration(format!(
                "Failed to read storage version: {e}"
            ))),
        }
    }

    async fn write_atomic(path: &Path, value: &[u8]) -> Result<()> {
        let temp_path = path.with_extension(TEMP_EXTENSION);
        let mut file = File::create(&temp_path)
            .await
            .map_err(|e| persistence_error("create temp file", &temp_path, &e))?;
        file.write_all(value)
            .await
            .map_err(|e| persistence_error("write temp file", &temp_path, &e))?;
        file.sync_all()
            .await
            .map_err(|e| persistence_error("sync temp file", &temp_path, &e))?;
        drop(file);

        fs::rename(&temp_path, path)
            .await
            .map_err(|e| persistence_error("rename temp file", path, &e))
    }
}

fn persistence_error(action: &str, path: &Path, error: &std::io::Error) -> MqttError {
    MqttError::Persistence(format!("Failed to {action} {}: {error}", path.display()))
}

/// Percent-encodes everything but ASCII alphanumerics, `-` and `_`.
fn encode_component(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

fn decode_component(encoded: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(encoded.len());
    let mut rest = encoded.as_bytes();
    while let Some((&first, tail)) = rest.split_first() {
        if first == b'%' {
            let hex = std::str::from_utf8(tail.get(..2)?).ok()?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            rest = &tail[2..];
        } else {
            bytes.push(first);
            rest = tail;
        }
    }
    String::from_utf8(bytes).ok()
}

impl Persistence for FilePersistence {
    fn open<'a>(&'a self, client_id: &'a str, server_uri: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            Self::check_storage_version(&self.base_dir).await?;
            let dir = self.base_dir.join(encode_component(client_id));
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| persistence_error("create directory", &dir, &e))?;
            info!(client_id, server_uri, dir = %dir.display(), "Opened file store");
            *self.client_dir.write() = Some(dir);
            Ok(())
        })
    }

    fn put<'a>(&'a self, key: &'a str, value: Bytes) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let path = self.record_path(key)?;
            Self::write_atomic(&path, &value).await
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Bytes>> {
        Box::pin(async move {
            let path = self.record_path(key)?;
            match fs::read(&path).await {
                Ok(data) => Ok(Some(Bytes::from(data))),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(persistence_error("read", &path, &e)),
            }
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let path = self.record_path(key)?;
            match fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(persistence_error("remove", &path, &e)),
            }
        })
    }

    fn contains_key<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let path = self.record_path(key)?;
            fs::try_exists(&path)
                .await
                .map_err(|e| persistence_error("stat", &path, &e))
        })
    }

    fn keys(&self) -> StoreFuture<'_, Vec<String>> {
        Box::pin(async move {
            let dir = self.dir()?;
            let mut entries = fs::read_dir(&dir)
                .await
                .map_err(|e| persistence_error("read directory", &dir, &e))?;

            let mut keys = Vec::new();
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| persistence_error("read directory entry in", &dir, &e))?
            {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == RECORD_EXTENSION) {
                    if let Some(key) = path
                        .file_stem()
                        .and_then(|stem| stem.to_str())
                        .and_then(decode_component)
                    {
                        keys.push(key);
                    }
                }
            }
            Ok(keys)
        })
    }

    fn clear(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            for key in self.keys().await? {
                self.remove(&key).await?;
            }
            Ok(())
        })
    }

    fn close(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            if let Some(dir) = self.client_dir.write().take() {
                debug!(dir = %dir.display(), "Closed file store");
            }
            Ok(())
        })
    }
}
