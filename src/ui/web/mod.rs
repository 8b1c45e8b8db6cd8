mod api;
mod auth;
mod response;

pub use api::{router, start, Config};
