use std::net::SocketAddr;

use axum::{
    extract::{Path, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method, StatusCode,
    },
    routing::{delete, get, post, put},
    Json, Router,
};
use clap::Parser;
use time::OffsetDateTime;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use super::{auth::Operator, response::*};
use crate::{
    control::RestartOutput,
    service::{AddedPeer, GenerateParams, Generated, NewPeer, PeerInfo, Wgcfg},
};

type ApiResult<T> = Result<Json<T>, ApiError>;

async fn root() -> Json<Message> {
    Json(Message {
        message: "Welcome to the WireGuard API Manager",
    })
}

async fn generate_default(State(service): State<Wgcfg>) -> ApiResult<Generated> {
    let params = service.default_params();
    Ok(Json(service.generate_config(params).await?))
}

async fn generate(
    State(service): State<Wgcfg>,
    _op: Operator,
    Json(params): Json<GenerateParams>,
) -> ApiResult<Generated> {
    Ok(Json(service.generate_config(params).await?))
}

async fn read_config(State(service): State<Wgcfg>) -> ApiResult<ConfigInfo> {
    Ok(Json(service.read_config().await?.into()))
}

async fn list_peers(State(service): State<Wgcfg>, _op: Operator) -> ApiResult<Peers> {
    Ok(Json(Peers {
        peers: service.list_peers().await?,
    }))
}

async fn add_peer(
    State(service): State<Wgcfg>,
    _op: Operator,
    Json(peer): Json<NewPeer>,
) -> Result<(StatusCode, Json<AddedPeer>), ApiError> {
    let peer = service.add_peer(peer).await?;
    Ok((StatusCode::CREATED, Json(peer)))
}

async fn remove_peer(
    State(service): State<Wgcfg>,
    _op: Operator,
    Path(id): Path<u32>,
) -> ApiResult<Removed> {
    Ok(Json(Removed {
        removed: service.remove_peer(id).await?,
    }))
}

async fn touch_peer(
    State(service): State<Wgcfg>,
    _op: Operator,
    Path(id): Path<u32>,
) -> ApiResult<PeerInfo> {
    let peer = service.touch_peer(id, OffsetDateTime::now_utc()).await?;
    Ok(Json(peer.into()))
}

async fn start_interface(State(service): State<Wgcfg>) -> ApiResult<Managed<String>> {
    let output = service.start_interface().await?;
    Ok(Json(Managed {
        status: "started",
        interface: service.interface().to_owned(),
        output,
    }))
}

async fn stop_interface(State(service): State<Wgcfg>) -> ApiResult<Managed<String>> {
    let output = service.stop_interface().await?;
    Ok(Json(Managed {
        status: "stopped",
        interface: service.interface().to_owned(),
        output,
    }))
}

async fn restart_interface(State(service): State<Wgcfg>) -> ApiResult<Managed<RestartOutput>> {
    let output = service.restart_interface().await?;
    Ok(Json(Managed {
        status: "restarted",
        interface: service.interface().to_owned(),
        output,
    }))
}

pub fn router(service: Wgcfg) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/config/generate", get(generate_default).post(generate))
        .route("/config/read", get(read_config))
        .route("/config/peers", get(list_peers).post(add_peer))
        .route("/config/peers/:id", delete(remove_peer))
        .route("/config/peers/:id/seen", put(touch_peer))
        .route("/manage/start", post(start_interface))
        .route("/manage/stop", post(stop_interface))
        .route("/manage/restart", post(restart_interface))
        .with_state(service)
}

#[derive(Debug, Parser)]
pub struct Config {
    #[clap(long, short, env = "LISTEN_ADDR", value_parser, default_value = "127.0.0.1:8000")]
    listen_addr: SocketAddr,
    /// Browser origin allowed to call the API.
    #[clap(long, env = "CORS_ORIGIN", value_parser, default_value = "http://localhost:3000")]
    cors_origin: String,
}

pub async fn start(
    config: Config,
    service: Wgcfg,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cors = CorsLayer::new()
        .allow_origin(config.cors_origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);
    let app = router(service).layer(cors);

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("listening on {}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
