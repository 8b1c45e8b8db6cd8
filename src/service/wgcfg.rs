use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::{AddedPeer, NewPeer, Wgcfg};
use crate::{
    control::ControlError,
    keys::KeyError,
    wgconf::{CodecError, Interface, ModelError, StoreError, WgConfig},
};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("malformed config: {0}")]
    MalformedConfig(CodecError),
    #[error("{0}")]
    MissingInterface(CodecError),
    #[error("{0}")]
    IncompletePeer(CodecError),
    #[error("{0}")]
    DuplicatePeer(ModelError),
    #[error("invalid config: {0}")]
    InvalidConfig(ModelError),
    #[error("peer {0} not found")]
    PeerNotFound(u32),
    #[error("config store unavailable: {0}")]
    StoreUnavailable(StoreError),
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(#[from] KeyError),
    #[error("command failed: {0}")]
    CommandFailed(#[from] ControlError),
    #[error("invalid jwt secret")]
    InvalidJwtSecret,
    #[error("invalid token")]
    InvalidToken(#[from] jwt::Error),
    #[error("access denied")]
    AccessDenied,
}

impl ServiceError {
    /// Stable name of the failure class, independent of the message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedConfig(_) => "MalformedConfig",
            Self::MissingInterface(_) => "MissingInterface",
            Self::IncompletePeer(_) => "IncompletePeer",
            Self::DuplicatePeer(_) => "DuplicatePeer",
            Self::InvalidConfig(_) => "InvalidConfig",
            Self::PeerNotFound(_) => "PeerNotFound",
            Self::StoreUnavailable(_) => "StoreUnavailable",
            Self::KeyGenerationFailed(_) => "KeyGenerationFailed",
            Self::CommandFailed(_) => "CommandFailed",
            Self::InvalidJwtSecret => "InvalidJwtSecret",
            Self::InvalidToken(_) => "InvalidToken",
            Self::AccessDenied => "AccessDenied",
        }
    }
}

impl From<ModelError> for ServiceError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::DuplicatePeerId(_) | ModelError::DuplicatePublicKey(_) => {
                Self::DuplicatePeer(e)
            }
            e => Self::InvalidConfig(e),
        }
    }
}

impl From<CodecError> for ServiceError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::MissingInterface | CodecError::IncompleteInterface(_) => {
                Self::MissingInterface(e)
            }
            CodecError::IncompletePeer(_) => Self::IncompletePeer(e),
            CodecError::Invalid(
                m @ (ModelError::DuplicatePeerId(_) | ModelError::DuplicatePublicKey(_)),
            ) => Self::DuplicatePeer(m),
            CodecError::Malformed { .. } | CodecError::Invalid(_) => Self::MalformedConfig(e),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Codec(e) => e.into(),
            StoreError::Invalid(e) => e.into(),
            e => Self::StoreUnavailable(e),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateParams {
    #[serde(default)]
    pub name: String,
    pub address: String,
    pub listen_port: u16,
    #[serde(default)]
    pub peers: Vec<NewPeer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Generated {
    pub status: &'static str,
    pub path: PathBuf,
    pub peers: Vec<AddedPeer>,
}

impl Wgcfg {
    pub fn default_params(&self) -> GenerateParams {
        GenerateParams {
            name: self.interface.clone(),
            address: self.defaults.address.clone(),
            listen_port: self.defaults.listen_port,
            peers: Vec::new(),
        }
    }

    /// Builds a new config with fresh interface keys and replaces whatever
    /// is stored.
    #[instrument(
        skip(self, params),
        fields(address = %params.address, port = params.listen_port, peers = params.peers.len())
    )]
    pub async fn generate_config(&self, params: GenerateParams) -> Result<Generated, ServiceError> {
        let _writer = self.writer.write().await;

        let pair = self.keys.keypair().await?;
        debug!(public_key = %pair.public_key, "interface keys generated");

        let mut config = WgConfig::new(Interface {
            name: params.name,
            private_key: pair.private_key,
            address: params.address,
            listen_port: params.listen_port,
        });
        config.interface.validate()?;
        let mut peers = Vec::with_capacity(params.peers.len());
        for new in params.peers {
            let (peer, private_key) = self.mint_peer(&config, new).await?;
            config.push_peer(peer.clone())?;
            peers.push(AddedPeer {
                peer: peer.into(),
                private_key,
            });
        }

        match self.store.try_load().await {
            Ok(Some(_)) => warn!("replacing existing configuration"),
            Ok(None) => {}
            Err(e) => warn!("replacing unreadable configuration: {e}"),
        }
        self.store.save(&config).await?;

        info!("configuration written");
        Ok(Generated {
            status: "Config created successfully",
            path: self.store.path().to_owned(),
            peers,
        })
    }

    #[instrument(skip(self))]
    pub async fn read_config(&self) -> Result<WgConfig, ServiceError> {
        let _reader = self.writer.read().await;
        Ok(self.store.load().await?)
    }
}
