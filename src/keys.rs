use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use thiserror::Error;
use tracing::instrument;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::{
    process::{command_line, ProcessError},
    traits::{CommandRunner, KeyProvider},
};

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key generator command is empty")]
    NoCommand,
    #[error("key generator `{command}` failed with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("key generator `{0}` produced no key")]
    Empty(String),
    #[error(transparent)]
    Process(#[from] ProcessError),
}

#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub private_key: String,
    pub public_key: String,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .finish()
    }
}

/// Asks an external generator (`wg genkey` by default) for every key.
pub struct CommandKeyProvider {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    runner: Arc<dyn CommandRunner>,
}

impl CommandKeyProvider {
    pub fn new(
        command: &str,
        timeout: Duration,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, KeyError> {
        let mut parts = command.split_whitespace().map(str::to_owned);
        let program = parts.next().ok_or(KeyError::NoCommand)?;
        Ok(Self {
            program,
            args: parts.collect(),
            timeout,
            runner,
        })
    }
}

#[async_trait]
impl KeyProvider for CommandKeyProvider {
    #[instrument(skip(self), fields(command = %command_line(&self.program, &self.args)))]
    async fn generate(&self) -> Result<String, KeyError> {
        let out = self
            .runner
            .run(&self.program, &self.args, self.timeout)
            .await?;
        let command = command_line(&self.program, &self.args);
        if !out.success {
            return Err(KeyError::Failed {
                command,
                status: out.status(),
                stderr: out.stderr.trim().to_owned(),
            });
        }

        let key = out.stdout.trim();
        if key.is_empty() {
            return Err(KeyError::Empty(command));
        }
        Ok(key.to_owned())
    }
}

/// Generates x25519 keys in process. Unlike the command provider, the
/// public half of a pair is derived from the private one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeKeyProvider;

impl NativeKeyProvider {
    fn secret() -> StaticSecret {
        StaticSecret::random_from_rng(OsRng)
    }
}

#[async_trait]
impl KeyProvider for NativeKeyProvider {
    async fn generate(&self) -> Result<String, KeyError> {
        Ok(STANDARD.encode(Self::secret().to_bytes()))
    }

    async fn keypair(&self) -> Result<KeyPair, KeyError> {
        let secret = Self::secret();
        let public = PublicKey::from(&secret);
        Ok(KeyPair {
            private_key: STANDARD.encode(secret.to_bytes()),
            public_key: STANDARD.encode(public.as_bytes()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::ScriptedRunner;

    fn provider(runner: ScriptedRunner) -> (CommandKeyProvider, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        let p = CommandKeyProvider::new("wg genkey", Duration::from_secs(1), runner.clone())
            .unwrap();
        (p, runner)
    }

    #[tokio::test]
    async fn trims_generator_output() {
        let (p, runner) = provider(ScriptedRunner::new().ok("  cGs=\n", ""));
        assert_eq!(p.generate().await.unwrap(), "cGs=");
        assert_eq!(runner.calls(), vec!["wg genkey"]);
    }

    #[tokio::test]
    async fn keypair_is_two_calls() {
        let (p, runner) = provider(ScriptedRunner::new().ok("a=\n", "").ok("b=\n", ""));
        let pair = p.keypair().await.unwrap();
        assert_eq!(pair.private_key, "a=");
        assert_eq!(pair.public_key, "b=");
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn nonzero_exit_fails() {
        let (p, _) = provider(ScriptedRunner::new().fail(1, "wg: not found\n"));
        match p.generate().await {
            Err(KeyError::Failed { status, stderr, .. }) => {
                assert_eq!(status, "exit status 1");
                assert_eq!(stderr, "wg: not found");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_output_fails() {
        let (p, _) = provider(ScriptedRunner::new().ok(" \n", ""));
        assert!(matches!(p.generate().await, Err(KeyError::Empty(_))));
    }

    #[tokio::test]
    async fn runner_errors_propagate() {
        let (p, _) = provider(ScriptedRunner::new().push(Err(ProcessError::Timeout {
            command: "wg genkey".into(),
            timeout: Duration::from_secs(1),
        })));
        assert!(matches!(
            p.generate().await,
            Err(KeyError::Process(ProcessError::Timeout { .. }))
        ));
    }

    #[test]
    fn blank_command_is_rejected() {
        let runner = Arc::new(ScriptedRunner::new());
        assert!(matches!(
            CommandKeyProvider::new("  ", Duration::from_secs(1), runner),
            Err(KeyError::NoCommand)
        ));
    }

    #[tokio::test]
    async fn native_pair_is_related() {
        let pair = NativeKeyProvider.keypair().await.unwrap();

        let raw: [u8; 32] = STANDARD
            .decode(&pair.private_key)
            .unwrap()
            .try_into()
            .unwrap();
        let public = PublicKey::from(&StaticSecret::from(raw));
        assert_eq!(STANDARD.encode(public.as_bytes()), pair.public_key);
        assert_ne!(pair.private_key, NativeKeyProvider.generate().await.unwrap());
    }

    #[test]
    fn debug_hides_private_half() {
        let pair = KeyPair {
            private_key: "secret".into(),
            public_key: "public".into(),
        };
        assert!(!format!("{pair:?}").contains("secret"));
    }
}
