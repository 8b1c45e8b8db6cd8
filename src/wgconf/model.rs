use std::{collections::HashSet, fmt, net::IpAddr};

use cidr::IpInet;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("interface private key is empty")]
    EmptyPrivateKey,
    #[error("interface private key contains whitespace")]
    MalformedPrivateKey,
    #[error("invalid interface address {0:?}, expected CIDR like 10.0.0.1/24")]
    InvalidAddress(String),
    #[error("listen port must be in 1..=65535")]
    InvalidListenPort,
    #[error("peer #{index} has no public key")]
    EmptyPublicKey { index: usize },
    #[error("peer public key {0:?} contains whitespace")]
    MalformedPublicKey(String),
    #[error("invalid allowed ips {0:?}")]
    InvalidAllowedIps(String),
    #[error("invalid peer ip address {0:?}")]
    InvalidIpAddress(String),
    #[error("peer name must be a single line")]
    MultilineName,
    #[error("peer with id {0} already exists")]
    DuplicatePeerId(u32),
    #[error("peer with public key {0} already exists")]
    DuplicatePublicKey(String),
}

#[derive(Clone, PartialEq, Eq)]
pub struct Interface {
    /// Display label, kept in the metadata sidecar.
    pub name: String,
    pub private_key: String,
    pub address: String,
    pub listen_port: u16,
}

impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interface")
            .field("name", &self.name)
            .field("private_key", &"<redacted>")
            .field("address", &self.address)
            .field("listen_port", &self.listen_port)
            .finish()
    }
}

impl Interface {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.private_key.is_empty() {
            return Err(ModelError::EmptyPrivateKey);
        }
        if self.private_key.chars().any(char::is_whitespace) {
            return Err(ModelError::MalformedPrivateKey);
        }
        if !is_inet(&self.address) {
            return Err(ModelError::InvalidAddress(self.address.clone()));
        }
        if self.listen_port == 0 {
            return Err(ModelError::InvalidListenPort);
        }
        if self.name.contains(['\n', '\r']) {
            return Err(ModelError::MultilineName);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Peer {
    pub id: Option<u32>,
    pub name: String,
    pub public_key: String,
    pub allowed_ips: String,
    pub ip_address: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_seen: Option<OffsetDateTime>,
}

impl Peer {
    /// A peer carrying only the fields stored in the config file.
    pub fn new(public_key: impl Into<String>, allowed_ips: impl Into<String>) -> Self {
        Self {
            id: None,
            name: String::new(),
            public_key: public_key.into(),
            allowed_ips: allowed_ips.into(),
            ip_address: None,
            last_seen: None,
        }
    }

    pub fn wire_only(&self) -> Self {
        Self::new(self.public_key.clone(), self.allowed_ips.clone())
    }

    pub fn has_metadata(&self) -> bool {
        self.id.is_some()
            || !self.name.is_empty()
            || self.ip_address.is_some()
            || self.last_seen.is_some()
    }

    pub fn validate(&self, index: usize) -> Result<(), ModelError> {
        if self.public_key.is_empty() {
            return Err(ModelError::EmptyPublicKey { index });
        }
        if self.public_key.chars().any(char::is_whitespace) {
            return Err(ModelError::MalformedPublicKey(self.public_key.clone()));
        }
        if !valid_allowed_ips(&self.allowed_ips) {
            return Err(ModelError::InvalidAllowedIps(self.allowed_ips.clone()));
        }
        if let Some(ip) = &self.ip_address {
            if ip.parse::<IpAddr>().is_err() && !is_inet(ip) {
                return Err(ModelError::InvalidIpAddress(ip.clone()));
            }
        }
        if self.name.contains(['\n', '\r']) {
            return Err(ModelError::MultilineName);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WgConfig {
    pub interface: Interface,
    pub peers: Vec<Peer>,
}

impl WgConfig {
    pub fn new(interface: Interface) -> Self {
        Self {
            interface,
            peers: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        self.interface.validate()?;

        let mut ids = HashSet::new();
        let mut keys = HashSet::new();
        for (index, peer) in self.peers.iter().enumerate() {
            peer.validate(index)?;
            if let Some(id) = peer.id {
                if !ids.insert(id) {
                    return Err(ModelError::DuplicatePeerId(id));
                }
            }
            if !keys.insert(peer.public_key.as_str()) {
                return Err(ModelError::DuplicatePublicKey(peer.public_key.clone()));
            }
        }
        Ok(())
    }

    /// Checks that `peer` could be appended without breaking uniqueness.
    pub fn check_new_peer(&self, peer: &Peer) -> Result<(), ModelError> {
        peer.validate(self.peers.len())?;
        for existing in &self.peers {
            if let Some(id) = peer.id.filter(|id| existing.id == Some(*id)) {
                return Err(ModelError::DuplicatePeerId(id));
            }
            if existing.public_key == peer.public_key {
                return Err(ModelError::DuplicatePublicKey(peer.public_key.clone()));
            }
        }
        Ok(())
    }

    pub fn push_peer(&mut self, peer: Peer) -> Result<(), ModelError> {
        self.check_new_peer(&peer)?;
        self.peers.push(peer);
        Ok(())
    }

    pub fn remove_peer(&mut self, id: u32) -> Option<Peer> {
        let pos = self.peers.iter().position(|p| p.id == Some(id))?;
        Some(self.peers.remove(pos))
    }

    pub fn peer_mut(&mut self, id: u32) -> Option<&mut Peer> {
        self.peers.iter_mut().find(|p| p.id == Some(id))
    }

    /// The config as it survives a trip through the text format alone.
    pub fn wire_only(&self) -> Self {
        Self {
            interface: Interface {
                name: String::new(),
                ..self.interface.clone()
            },
            peers: self.peers.iter().map(Peer::wire_only).collect(),
        }
    }
}

pub(crate) fn is_inet(s: &str) -> bool {
    s.contains('/') && s.parse::<IpInet>().is_ok()
}

fn valid_allowed_ips(s: &str) -> bool {
    if s.contains(['\n', '\r']) || s.trim() != s {
        return false;
    }
    if s.is_empty() {
        return true;
    }
    s.split(',').all(|part| is_inet(part.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interface() -> Interface {
        Interface {
            name: "Host 1".into(),
            private_key: "yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=".into(),
            address: "10.0.0.1/24".into(),
            listen_port: 51820,
        }
    }

    fn peer(id: u32, key: &str) -> Peer {
        Peer {
            id: Some(id),
            name: format!("Client {id}"),
            ..Peer::new(key, "10.0.0.0/24")
        }
    }

    #[test]
    fn debug_hides_private_key() {
        let out = format!("{:?}", interface());
        assert!(!out.contains("yAnz5TF"));
        assert!(out.contains("<redacted>"));
    }

    #[test]
    fn interface_invariants() {
        assert_eq!(interface().validate(), Ok(()));

        let mut i = interface();
        i.private_key.clear();
        assert_eq!(i.validate(), Err(ModelError::EmptyPrivateKey));

        let mut i = interface();
        i.address = "10.0.0.1".into();
        assert!(matches!(i.validate(), Err(ModelError::InvalidAddress(_))));

        let mut i = interface();
        i.address = "10.0.0.300/24".into();
        assert!(matches!(i.validate(), Err(ModelError::InvalidAddress(_))));

        let mut i = interface();
        i.listen_port = 0;
        assert_eq!(i.validate(), Err(ModelError::InvalidListenPort));
    }

    #[test]
    fn allowed_ips_accepts_lists() {
        let mut p = peer(1, "key1");
        p.allowed_ips = "10.0.0.2/32, fd00::2/128".into();
        assert_eq!(p.validate(0), Ok(()));
        p.allowed_ips = String::new();
        assert_eq!(p.validate(0), Ok(()));
        p.allowed_ips = "10.0.0.2/32,nope".into();
        assert!(matches!(p.validate(0), Err(ModelError::InvalidAllowedIps(_))));
    }

    #[test]
    fn rejects_duplicates() {
        let mut cfg = WgConfig::new(interface());
        cfg.push_peer(peer(1, "key1")).unwrap();

        assert_eq!(
            cfg.push_peer(peer(1, "key2")),
            Err(ModelError::DuplicatePeerId(1))
        );
        assert_eq!(
            cfg.push_peer(peer(2, "key1")),
            Err(ModelError::DuplicatePublicKey("key1".into()))
        );
        assert_eq!(cfg.peers.len(), 1);

        cfg.peers.push(peer(3, "key1"));
        assert!(matches!(
            cfg.validate(),
            Err(ModelError::DuplicatePublicKey(_))
        ));
    }

    #[test]
    fn peers_without_ids_do_not_collide() {
        let mut cfg = WgConfig::new(interface());
        cfg.push_peer(Peer::new("key1", "10.0.0.2/32")).unwrap();
        cfg.push_peer(Peer::new("key2", "10.0.0.3/32")).unwrap();
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn remove_by_id() {
        let mut cfg = WgConfig::new(interface());
        cfg.push_peer(peer(1, "key1")).unwrap();
        cfg.push_peer(peer(2, "key2")).unwrap();

        assert_eq!(cfg.remove_peer(1).map(|p| p.public_key), Some("key1".into()));
        assert_eq!(cfg.remove_peer(1), None);
        assert_eq!(cfg.peers.len(), 1);
    }
}
