use std::time::Duration;

use async_trait::async_trait;

use crate::{
    keys::{KeyError, KeyPair},
    process::{CommandOutput, ProcessError},
};

#[async_trait]
pub trait KeyProvider: Sync + Send {
    async fn generate(&self) -> Result<String, KeyError>;

    /// Two independent calls unless the provider can derive the public half.
    async fn keypair(&self) -> Result<KeyPair, KeyError> {
        let private_key = self.generate().await?;
        let public_key = self.generate().await?;
        Ok(KeyPair {
            private_key,
            public_key,
        })
    }
}

#[async_trait]
pub trait CommandRunner: Sync + Send {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, ProcessError>;
}
