use tracing::warn;

use crate::service::Wgcfg;

pub mod web;

pub async fn run(
    web: web::Config,
    service: Wgcfg,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let res = web::start(web, service).await;
    warn!("frontend stopped");
    res
}
