use std::fmt;

use serde::{Deserialize, Serialize};
use time::{macros::format_description, OffsetDateTime};
use tracing::{debug, info, instrument};

use super::{ServiceError, Wgcfg};
use crate::wgconf::{ModelError, Peer, WgConfig};

/// A peer as a caller submits it. Without a public key one is minted.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPeer {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub public_key: Option<String>,
    pub allowed_ips: String,
    #[serde(default)]
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerInfo {
    pub id: Option<u32>,
    pub name: String,
    pub public_key: String,
    pub allowed_ips: String,
    pub ip_address: Option<String>,
    pub last_seen: Option<String>,
}

impl From<Peer> for PeerInfo {
    fn from(p: Peer) -> Self {
        Self {
            id: p.id,
            name: p.name,
            public_key: p.public_key,
            allowed_ips: p.allowed_ips,
            ip_address: p.ip_address,
            last_seen: p.last_seen.map(format_last_seen),
        }
    }
}

/// A peer as it was stored. When its keys were minted here the private half
/// rides along; it is handed out once and never written to disk.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct AddedPeer {
    #[serde(flatten)]
    pub peer: PeerInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

impl fmt::Debug for AddedPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddedPeer")
            .field("peer", &self.peer)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// `Friday, October 16, 2026 09:30:00`
pub fn format_last_seen(at: OffsetDateTime) -> String {
    let format = format_description!(
        "[weekday], [month repr:long] [day], [year] [hour]:[minute]:[second]"
    );
    at.format(format).unwrap_or_else(|_| at.to_string())
}

impl Wgcfg {
    /// Turns a submitted peer into a model peer, plus the private key when
    /// one was minted. Id collisions are caught here so no key is minted for
    /// a peer that cannot be stored.
    pub(super) async fn mint_peer(
        &self,
        config: &WgConfig,
        new: NewPeer,
    ) -> Result<(Peer, Option<String>), ServiceError> {
        if config.peers.iter().any(|p| p.id == Some(new.id)) {
            return Err(ModelError::DuplicatePeerId(new.id).into());
        }

        let (public_key, private_key) = match new.public_key {
            Some(key) => (key, None),
            None => {
                let pair = self.keys.keypair().await?;
                debug!(id = new.id, "minted peer key");
                (pair.public_key, Some(pair.private_key))
            }
        };

        let peer = Peer {
            id: Some(new.id),
            name: new.name,
            public_key,
            allowed_ips: new.allowed_ips,
            ip_address: new.ip_address,
            last_seen: None,
        };
        Ok((peer, private_key))
    }

    #[instrument(skip(self))]
    pub async fn list_peers(&self) -> Result<Vec<PeerInfo>, ServiceError> {
        let _reader = self.writer.read().await;
        let config = self.store.load().await?;
        Ok(config.peers.into_iter().map(PeerInfo::from).collect())
    }

    #[instrument(skip(self, new), fields(id = new.id))]
    pub async fn add_peer(&self, new: NewPeer) -> Result<AddedPeer, ServiceError> {
        let _writer = self.writer.write().await;

        let mut config = self.store.load().await?;
        let (peer, private_key) = self.mint_peer(&config, new).await?;
        config.push_peer(peer.clone())?;
        self.store.save(&config).await?;

        info!(public_key = %peer.public_key, minted = private_key.is_some(), "peer added");
        Ok(AddedPeer {
            peer: peer.into(),
            private_key,
        })
    }

    /// Removing an absent peer succeeds and leaves the file untouched.
    #[instrument(skip(self))]
    pub async fn remove_peer(&self, id: u32) -> Result<bool, ServiceError> {
        let _writer = self.writer.write().await;

        let mut config = self.store.load().await?;
        let Some(peer) = config.remove_peer(id) else {
            debug!("no such peer");
            return Ok(false);
        };
        self.store.save(&config).await?;

        info!(public_key = %peer.public_key, "peer removed");
        Ok(true)
    }

    #[instrument(skip(self))]
    pub async fn touch_peer(&self, id: u32, at: OffsetDateTime) -> Result<Peer, ServiceError> {
        let _writer = self.writer.write().await;

        let mut config = self.store.load().await?;
        let peer = config.peer_mut(id).ok_or(ServiceError::PeerNotFound(id))?;
        peer.last_seen = Some(at);
        let peer = peer.clone();
        self.store.save(&config).await?;

        Ok(peer)
    }
}
