use tracing::instrument;

use super::{ServiceError, Wgcfg};
use crate::control::RestartOutput;

impl Wgcfg {
    #[instrument(skip(self))]
    pub async fn start_interface(&self) -> Result<String, ServiceError> {
        Ok(self.control.start(&self.interface).await?)
    }

    #[instrument(skip(self))]
    pub async fn stop_interface(&self) -> Result<String, ServiceError> {
        Ok(self.control.stop(&self.interface).await?)
    }

    #[instrument(skip(self))]
    pub async fn restart_interface(&self) -> Result<RestartOutput, ServiceError> {
        Ok(self.control.restart(&self.interface).await?)
    }
}
