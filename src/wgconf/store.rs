use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{
    codec::{self, CodecError},
    meta::{Metadata, Sidecar},
    model::{ModelError, WgConfig},
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("config file {0} not found")]
    NotFound(PathBuf),
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("metadata file {path} is malformed: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("metadata does not fit the config: {0}")]
    InvalidMetadata(ModelError),
    #[error("refusing to save invalid config: {0}")]
    Invalid(ModelError),
}

impl StoreError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_owned(),
            source,
        }
    }
}

type Result<T> = std::result::Result<T, StoreError>;

/// The config file plus its metadata sidecar. Nothing is cached: every
/// `load` reads the disk.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meta_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("config"));
        name.push(".meta.json");
        self.path.with_file_name(name)
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn load(&self) -> Result<WgConfig> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(self.path.clone()))
            }
            Err(e) => return Err(StoreError::io(&self.path)(e)),
        };
        let mut config = codec::decode(&text)?;

        match self.read_sidecar().await?.and_then(|s| s.select(&text)) {
            Some(meta) => {
                meta.apply(&mut config);
                config.validate().map_err(StoreError::InvalidMetadata)?;
            }
            None => debug!("no metadata sidecar, peers carry wire fields only"),
        }

        Ok(config)
    }

    async fn read_sidecar(&self) -> Result<Option<Sidecar>> {
        let meta_path = self.meta_path();
        match fs::read(&meta_path).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|source| StoreError::Metadata {
                    path: meta_path,
                    source,
                }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&meta_path)(e)),
        }
    }

    /// Like [`ConfigStore::load`], but a missing file is `None`.
    pub async fn try_load(&self) -> Result<Option<WgConfig>> {
        match self.load().await {
            Ok(config) => Ok(Some(config)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Writes the sidecar, then the config. Each file is replaced by rename.
    /// The sidecar keeps the metadata of the config still on disk next to
    /// the new one, so until the config rename lands `load` returns exactly
    /// the previous state.
    #[instrument(skip(self, config), fields(path = %self.path.display(), peers = config.peers.len()))]
    pub async fn save(&self, config: &WgConfig) -> Result<()> {
        config.validate().map_err(StoreError::Invalid)?;
        let text = codec::encode(config);

        let current = match fs::read_to_string(&self.path).await {
            Ok(current) => Some(current),
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("current config unreadable, keeping all metadata: {e}");
                }
                None
            }
        };
        let sidecar = match self.read_sidecar().await {
            Ok(sidecar) => sidecar.unwrap_or_default(),
            Err(e @ StoreError::Metadata { .. }) => {
                warn!("discarding {e}");
                Sidecar::default()
            }
            Err(e) => return Err(e),
        };
        let sidecar = sidecar.advance(current.as_deref(), &text, Metadata::from_config(config));

        let meta_path = self.meta_path();
        let meta = serde_json::to_vec_pretty(&sidecar).map_err(|source| StoreError::Metadata {
            path: meta_path.clone(),
            source,
        })?;
        write_atomic(&meta_path, &meta).await?;
        write_atomic(&self.path, text.as_bytes()).await?;

        debug!("config saved");
        Ok(())
    }
}

async fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    let dir = target
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).await.map_err(StoreError::io(dir))?;

    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{name}.{}.tmp", Uuid::new_v4().simple()));

    let res = write_then_rename(&tmp, target, bytes).await;
    if res.is_err() {
        let _ = fs::remove_file(&tmp).await;
    }
    res?;

    // make the rename itself durable
    #[cfg(unix)]
    {
        if let Ok(d) = fs::File::open(dir).await {
            let _ = d.sync_all().await;
        }
    }
    Ok(())
}

async fn write_then_rename(tmp: &Path, target: &Path, bytes: &[u8]) -> Result<()> {
    let mut opts = fs::OpenOptions::new();
    opts.write(true).create_new(true);
    #[cfg(unix)]
    {
        opts.mode(0o600);
    }

    let mut file = opts.open(tmp).await.map_err(StoreError::io(tmp))?;
    file.write_all(bytes).await.map_err(StoreError::io(tmp))?;
    file.sync_all().await.map_err(StoreError::io(tmp))?;
    drop(file);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(StoreError::io(tmp))?;
    }

    fs::rename(tmp, target).await.map_err(StoreError::io(target))
}
