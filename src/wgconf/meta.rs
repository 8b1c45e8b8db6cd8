use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use super::model::WgConfig;

/// Fingerprint of a config file's exact text.
fn digest(text: &str) -> String {
    STANDARD.encode(Sha256::digest(text.as_bytes()))
}

/// The metadata file. It holds one [`Metadata`] per config text it was
/// written for: the one on disk and, while a save is in flight, the one
/// about to replace it.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sidecar {
    #[serde(default)]
    pub generations: Vec<Generation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub config_sha256: String,
    #[serde(flatten)]
    pub meta: Metadata,
}

impl Sidecar {
    fn position(&self, config_sha256: &str) -> Option<usize> {
        self.generations
            .iter()
            .position(|g| g.config_sha256 == config_sha256)
    }

    /// Metadata for the config `text`. A config edited by hand matches no
    /// generation and gets the newest one, applied by public key.
    pub fn select(mut self, text: &str) -> Option<Metadata> {
        match self.position(&digest(text)) {
            Some(i) => Some(self.generations.swap_remove(i).meta),
            None => self.generations.pop().map(|g| g.meta),
        }
    }

    /// The sidecar to write before `next_text` replaces `current`. Only what
    /// `select` would pick for `current` is kept; when `current` could not
    /// be read nothing is dropped.
    pub fn advance(mut self, current: Option<&str>, next_text: &str, next: Metadata) -> Self {
        let next_sha256 = digest(next_text);
        let mut generations = match current {
            Some(text) => match self.position(&digest(text)) {
                Some(i) => vec![self.generations.swap_remove(i)],
                None => self.generations.pop().into_iter().collect(),
            },
            None => self.generations,
        };
        generations.retain(|g| g.config_sha256 != next_sha256);
        generations.push(Generation {
            config_sha256: next_sha256,
            meta: next,
        });
        Self { generations }
    }
}

/// Fields the text format has no room for, stored next to it as JSON.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interface_name: String,
    #[serde(default)]
    pub peers: Vec<PeerMeta>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMeta {
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_seen: Option<OffsetDateTime>,
}

impl Metadata {
    pub fn from_config(config: &WgConfig) -> Self {
        Self {
            interface_name: config.interface.name.clone(),
            peers: config
                .peers
                .iter()
                .filter(|p| p.has_metadata())
                .map(|p| PeerMeta {
                    public_key: p.public_key.clone(),
                    id: p.id,
                    name: p.name.clone(),
                    ip_address: p.ip_address.clone(),
                    last_seen: p.last_seen,
                })
                .collect(),
        }
    }

    /// Fills metadata into a freshly decoded config. Entries for keys that
    /// are no longer in the config are dropped.
    pub fn apply(self, config: &mut WgConfig) {
        config.interface.name = self.interface_name;

        let mut by_key: HashMap<String, PeerMeta> = self
            .peers
            .into_iter()
            .map(|m| (m.public_key.clone(), m))
            .collect();

        for peer in config.peers.iter_mut() {
            if let Some(meta) = by_key.remove(&peer.public_key) {
                peer.id = meta.id;
                peer.name = meta.name;
                peer.ip_address = meta.ip_address;
                peer.last_seen = meta.last_seen;
            }
        }
    }
}
