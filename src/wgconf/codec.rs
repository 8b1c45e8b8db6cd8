use thiserror::Error;
use tracing::warn;

use super::model::{is_inet, Interface, ModelError, Peer, WgConfig};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed config at line {line}: {reason}: {content:?}")]
    Malformed {
        line: usize,
        content: String,
        reason: &'static str,
    },
    #[error("config has no [Interface] section")]
    MissingInterface,
    #[error("[Interface] section has no {0}")]
    IncompleteInterface(&'static str),
    #[error("peer #{0} has no PublicKey")]
    IncompletePeer(usize),
    #[error(transparent)]
    Invalid(#[from] ModelError),
}

#[derive(Default)]
struct InterfaceFields {
    private_key: Option<String>,
    address: Option<String>,
    listen_port: Option<u16>,
}

impl InterfaceFields {
    fn touched(&self) -> bool {
        self.private_key.is_some() || self.address.is_some() || self.listen_port.is_some()
    }
}

#[derive(Default)]
struct PeerFields {
    public_key: Option<String>,
    allowed_ips: Option<String>,
}

fn malformed(line: usize, content: &str, reason: &'static str) -> CodecError {
    let content = if content.starts_with("PrivateKey") {
        "PrivateKey <redacted>".to_owned()
    } else {
        content.to_owned()
    };
    CodecError::Malformed {
        line,
        content,
        reason,
    }
}

fn entry(out: &mut String, key: &str, value: impl std::fmt::Display) {
    let line = format!("{key} = {value}");
    out.push_str(line.trim_end());
    out.push('\n');
}

/// Renders the canonical text form. Only wire fields are written.
pub fn encode(config: &WgConfig) -> String {
    let mut out = String::from("[Interface]\n");
    entry(&mut out, "PrivateKey", &config.interface.private_key);
    entry(&mut out, "Address", &config.interface.address);
    entry(&mut out, "ListenPort", config.interface.listen_port);

    for peer in &config.peers {
        out.push_str("\n[Peer]\n");
        entry(&mut out, "PublicKey", &peer.public_key);
        entry(&mut out, "AllowedIPs", &peer.allowed_ips);
    }
    out
}

/// Parses the text form.
///
/// A repeated `[Interface]` section overwrites the fields set by earlier
/// ones. Unknown keys are skipped.
pub fn decode(text: &str) -> Result<WgConfig, CodecError> {
    let mut iface = InterfaceFields::default();
    let mut peers: Vec<PeerFields> = Vec::new();
    let mut current: Option<PeerFields> = None;
    let mut interface_sections = 0usize;

    for (n, raw) in text.lines().enumerate() {
        let lineno = n + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match line {
            "[Interface]" => {
                peers.extend(current.take());
                interface_sections += 1;
                if interface_sections > 1 {
                    warn!(line = lineno, "repeated [Interface] section, later values win");
                }
                continue;
            }
            "[Peer]" => {
                peers.extend(current.replace(PeerFields::default()));
                continue;
            }
            _ => {}
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(malformed(lineno, line, "expected `key = value`"));
        };
        let (key, value) = (key.trim(), value.trim());

        match &mut current {
            Some(peer) => match key {
                "PublicKey" => peer.public_key = Some(value.to_owned()),
                "AllowedIPs" => peer.allowed_ips = Some(value.to_owned()),
                _ => {}
            },
            None => match key {
                "PrivateKey" => iface.private_key = Some(value.to_owned()),
                "Address" => {
                    if !is_inet(value) {
                        return Err(malformed(lineno, line, "Address is not a CIDR"));
                    }
                    iface.address = Some(value.to_owned());
                }
                "ListenPort" => {
                    let port = value
                        .parse::<u16>()
                        .ok()
                        .filter(|p| *p != 0)
                        .ok_or_else(|| malformed(lineno, line, "ListenPort is not a port number"))?;
                    iface.listen_port = Some(port);
                }
                _ => {}
            },
        }
    }
    peers.extend(current);

    if !iface.touched() {
        return Err(CodecError::MissingInterface);
    }
    let interface = Interface {
        name: String::new(),
        private_key: iface
            .private_key
            .ok_or(CodecError::IncompleteInterface("PrivateKey"))?,
        address: iface
            .address
            .ok_or(CodecError::IncompleteInterface("Address"))?,
        listen_port: iface
            .listen_port
            .ok_or(CodecError::IncompleteInterface("ListenPort"))?,
    };

    let peers = peers
        .into_iter()
        .enumerate()
        .map(|(index, p)| {
            let key = p
                .public_key
                .filter(|k| !k.is_empty())
                .ok_or(CodecError::IncompletePeer(index))?;
            Ok(Peer::new(key, p.allowed_ips.unwrap_or_default()))
        })
        .collect::<Result<Vec<_>, CodecError>>()?;

    let config = WgConfig { interface, peers };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "[Interface]
PrivateKey = yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=
Address = 10.0.0.1/24
ListenPort = 51820

[Peer]
PublicKey = xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=
AllowedIPs = 10.0.0.0/24

[Peer]
PublicKey = TrMvSoP4jYQlY6RIzBgbssQqY3vxI2Pi+y71lOWWXX0=
AllowedIPs = 10.0.0.3/32, fd00::3/128
";

    fn sample() -> WgConfig {
        WgConfig {
            interface: Interface {
                name: String::new(),
                private_key: "yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=".into(),
                address: "10.0.0.1/24".into(),
                listen_port: 51820,
            },
            peers: vec![
                Peer::new("xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=", "10.0.0.0/24"),
                Peer::new(
                    "TrMvSoP4jYQlY6RIzBgbssQqY3vxI2Pi+y71lOWWXX0=",
                    "10.0.0.3/32, fd00::3/128",
                ),
            ],
        }
    }

    #[test]
    fn encodes_canonical_text() {
        assert_eq!(encode(&sample()), SAMPLE);
    }

    #[test]
    fn encode_without_peers_has_no_peer_section() {
        let mut cfg = sample();
        cfg.peers.clear();
        let text = encode(&cfg);
        assert!(!text.contains("[Peer]"));
        assert!(text.ends_with("ListenPort = 51820\n"));
    }

    #[test]
    fn encode_is_deterministic() {
        assert_eq!(encode(&sample()), encode(&sample().clone()));
    }

    #[test]
    fn round_trip_keeps_order_and_drops_metadata() {
        let mut cfg = sample();
        cfg.interface.name = "Host 1".into();
        cfg.peers[0].id = Some(7);
        cfg.peers[0].name = "laptop".into();
        cfg.peers[1].ip_address = Some("10.0.0.3".into());

        let decoded = decode(&encode(&cfg)).unwrap();
        assert_eq!(decoded, cfg.wire_only());
        assert_eq!(decode(&encode(&sample())).unwrap(), sample());
    }

    #[test]
    fn edge_configs_round_trip() {
        fn cfg(private_key: &str, address: &str, listen_port: u16, peers: &[(&str, &str)]) -> WgConfig {
            WgConfig {
                interface: Interface {
                    name: String::new(),
                    private_key: private_key.into(),
                    address: address.into(),
                    listen_port,
                },
                peers: peers.iter().map(|(k, ips)| Peer::new(*k, *ips)).collect(),
            }
        }

        let cases = [
            ("no peers", cfg("priv=", "10.0.0.1/24", 51820, &[])),
            ("lowest port", cfg("priv=", "10.0.0.1/24", 1, &[("k1=", "10.0.0.2/32")])),
            ("highest port", cfg("priv=", "10.0.0.1/24", 65535, &[("k1=", "10.0.0.2/32")])),
            (
                "ipv6 only",
                cfg("priv=", "fd00::1/64", 51820, &[("k1=", "fd00::2/128, ::/0")]),
            ),
            (
                "keys with separators",
                cfg(
                    "a=b#c[d]=",
                    "10.0.0.1/24",
                    51820,
                    &[("#k1=", "10.0.0.2/32"), ("[Peer]=", ""), ("k=3#", "0.0.0.0/0")],
                ),
            ),
        ];

        for (name, config) in cases {
            config.validate().unwrap();
            assert_eq!(decode(&encode(&config)).unwrap(), config, "{name}");
        }
    }

    #[test]
    fn empty_allowed_ips_round_trip() {
        let mut cfg = sample();
        cfg.peers[0].allowed_ips.clear();
        let text = encode(&cfg);
        assert!(text.contains("AllowedIPs =\n"));
        assert_eq!(decode(&text).unwrap(), cfg);
    }

    #[test]
    fn skips_comments_blank_lines_and_unknown_keys() {
        let text = "
# managed by wgcfg
  [Interface]
  PrivateKey = abc==
Address = 10.0.0.1/24
ListenPort = 51820
PostUp = iptables -A FORWARD -i %i -j ACCEPT
    # trailing comment

[Peer]
PublicKey = k1=
Endpoint = 203.0.113.1:51820
PersistentKeepalive = 25
";
        let cfg = decode(text).unwrap();
        assert_eq!(cfg.interface.private_key, "abc==");
        assert_eq!(cfg.peers, vec![Peer::new("k1=", "")]);
    }

    #[test]
    fn value_may_contain_equals() {
        let cfg = decode("[Interface]\nPrivateKey = a=b=c=\nAddress = 10.0.0.1/24\nListenPort = 1\n")
            .unwrap();
        assert_eq!(cfg.interface.private_key, "a=b=c=");
    }

    #[test]
    fn bad_listen_port_names_the_line() {
        let text = "[Interface]\nPrivateKey = abc\nAddress = 10.0.0.1/24\nListenPort = notanumber\n";
        match decode(text) {
            Err(CodecError::Malformed { line, content, .. }) => {
                assert_eq!(line, 4);
                assert_eq!(content, "ListenPort = notanumber");
            }
            other => panic!("unexpected {other:?}"),
        }

        let text = "[Interface]\nPrivateKey = abc\nAddress = 10.0.0.1/24\nListenPort = 70000\n";
        assert!(matches!(decode(text), Err(CodecError::Malformed { line: 4, .. })));
    }

    #[test]
    fn line_without_separator_is_malformed() {
        let text = "[Interface]\nPrivateKey abc\n";
        match decode(text) {
            Err(CodecError::Malformed { line, content, .. }) => {
                assert_eq!(line, 2);
                assert!(!content.contains("abc"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn peer_without_public_key_is_incomplete() {
        let text = "[Interface]\nPrivateKey = abc\nAddress = 10.0.0.1/24\nListenPort = 51820\n\n[Peer]\nPublicKey = k1\n\n[Peer]\nAllowedIPs = 10.0.0.0/24\n";
        assert_eq!(decode(text), Err(CodecError::IncompletePeer(1)));
    }

    #[test]
    fn missing_interface() {
        assert_eq!(decode(""), Err(CodecError::MissingInterface));
        assert_eq!(
            decode("[Peer]\nPublicKey = k1\n"),
            Err(CodecError::MissingInterface)
        );
        assert_eq!(
            decode("[Interface]\nAddress = 10.0.0.1/24\nListenPort = 51820\n"),
            Err(CodecError::IncompleteInterface("PrivateKey"))
        );
    }

    #[test]
    fn later_interface_section_wins() {
        let text = "[Interface]\nPrivateKey = first\nAddress = 10.0.0.1/24\nListenPort = 51820\n\n[Peer]\nPublicKey = k1\n\n[Interface]\nPrivateKey = second\n";
        let cfg = decode(text).unwrap();
        assert_eq!(cfg.interface.private_key, "second");
        assert_eq!(cfg.interface.address, "10.0.0.1/24");
        // the peer open before the second header is kept
        assert_eq!(cfg.peers, vec![Peer::new("k1", "")]);
    }

    #[test]
    fn duplicate_keys_in_file_are_rejected() {
        let text = "[Interface]\nPrivateKey = abc\nAddress = 10.0.0.1/24\nListenPort = 51820\n[Peer]\nPublicKey = k1\n[Peer]\nPublicKey = k1\n";
        assert_eq!(
            decode(text),
            Err(CodecError::Invalid(ModelError::DuplicatePublicKey("k1".into())))
        );
    }
}
