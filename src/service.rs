pub mod manage;
pub mod peers;
pub mod token;
pub mod wgcfg;

use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio::sync::RwLock;

use clap::{Parser, ValueEnum};
use hmac::{Hmac, Mac};
pub use peers::*;
use sha2::Sha256;
pub use token::*;
use tracing::{info, instrument};
pub use wgcfg::*;

use crate::{
    control::InterfaceControl,
    keys::{CommandKeyProvider, NativeKeyProvider},
    process::ProcessRunner,
    traits::{CommandRunner, KeyProvider},
    wgconf::ConfigStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Keygen {
    /// Run `--keygen-command` for every key.
    Command,
    /// Generate x25519 keys in process.
    Native,
}

#[derive(Debug, Parser)]
pub struct Config {
    #[clap(short, long, env = "WG_CONFIG", value_parser, default_value = "/etc/wireguard/wg0.conf")]
    config_path: PathBuf,
    #[clap(short, long, env = "WG_INTERFACE", value_parser, default_value = "wg0")]
    interface: String,
    #[clap(long, env = "WG_QUICK", value_parser, default_value = "wg-quick")]
    wg_quick: String,
    #[clap(long, env = "KEYGEN", value_enum, default_value = "command")]
    keygen: Keygen,
    #[clap(long, env = "KEYGEN_COMMAND", value_parser, default_value = "wg genkey")]
    keygen_command: String,
    /// Seconds an external program may run before it is killed.
    #[clap(long, env = "COMMAND_TIMEOUT", value_parser, default_value = "10")]
    command_timeout: u64,
    #[clap(long, env = "WG_ADDRESS", value_parser, default_value = "10.0.0.1/24")]
    address: String,
    #[clap(long, env = "WG_LISTEN_PORT", value_parser, default_value = "51820")]
    listen_port: u16,
    #[clap(short = 's', long, env = "JWT_SECRET", value_parser, hide_env_values = true)]
    jwt_secret: String,
    /// Lifetime of minted tokens, in minutes.
    #[clap(long, env = "TOKEN_TTL", value_parser, default_value = "30")]
    token_ttl: u32,
}

/// Interface parameters used when a generate request brings none.
#[derive(Debug, Clone)]
pub struct Defaults {
    pub address: String,
    pub listen_port: u16,
}

#[derive(Clone)]
pub struct Wgcfg {
    store: ConfigStore,
    keys: Arc<dyn KeyProvider>,
    control: Arc<InterfaceControl>,

    // write-held across every load-mutate-save cycle, read-held by loads
    writer: Arc<RwLock<()>>,

    interface: String,
    defaults: Defaults,

    hmac_key: Hmac<Sha256>,
    token_ttl: time::Duration,
}

impl Wgcfg {
    #[instrument(skip(config))]
    pub fn new(config: Config) -> Result<Self, ServiceError> {
        let timeout = Duration::from_secs(config.command_timeout);
        let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner);

        let keys: Arc<dyn KeyProvider> = match config.keygen {
            Keygen::Command => Arc::new(CommandKeyProvider::new(
                &config.keygen_command,
                timeout,
                runner.clone(),
            )?),
            Keygen::Native => Arc::new(NativeKeyProvider),
        };
        let control = InterfaceControl::new(config.wg_quick, timeout, runner);

        info!(
            path = %config.config_path.display(),
            interface = %config.interface,
            keygen = ?config.keygen,
            "service configured"
        );

        Self::with_parts(
            ConfigStore::new(config.config_path),
            keys,
            control,
            config.interface,
            Defaults {
                address: config.address,
                listen_port: config.listen_port,
            },
            config.jwt_secret.as_bytes(),
        )
        .map(|s| s.with_token_ttl(time::Duration::minutes(config.token_ttl.into())))
    }

    pub fn with_parts(
        store: ConfigStore,
        keys: Arc<dyn KeyProvider>,
        control: InterfaceControl,
        interface: String,
        defaults: Defaults,
        jwt_secret: &[u8],
    ) -> Result<Self, ServiceError> {
        if jwt_secret.is_empty() {
            return Err(ServiceError::InvalidJwtSecret);
        }
        let hmac_key =
            Hmac::new_from_slice(jwt_secret).map_err(|_| ServiceError::InvalidJwtSecret)?;

        Ok(Self {
            store,
            keys,
            control: Arc::new(control),
            writer: Arc::new(RwLock::new(())),
            interface,
            defaults,
            hmac_key,
            token_ttl: time::Duration::minutes(30),
        })
    }

    pub fn with_token_ttl(mut self, ttl: time::Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::{keys::KeyError, process::fake::ScriptedRunner};

    /// Hands out `key-0=`, `key-1=`, ...
    #[derive(Default)]
    pub struct SeqKeys(AtomicUsize);

    #[async_trait]
    impl KeyProvider for SeqKeys {
        async fn generate(&self) -> Result<String, KeyError> {
            Ok(format!("key-{}=", self.0.fetch_add(1, Ordering::SeqCst)))
        }
    }

    pub fn service(dir: &std::path::Path, runner: ScriptedRunner) -> (Wgcfg, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        let service = Wgcfg::with_parts(
            ConfigStore::new(dir.join("wg0.conf")),
            Arc::new(SeqKeys::default()),
            InterfaceControl::new("wg-quick", Duration::from_secs(1), runner.clone()),
            "wg0".into(),
            Defaults {
                address: "10.0.0.1/24".into(),
                listen_port: 51820,
            },
            b"test secret",
        )
        .unwrap();
        (service, runner)
    }
}
