pub mod codec;
pub mod meta;
pub mod model;
pub mod store;

pub use codec::CodecError;
pub use model::{Interface, ModelError, Peer, WgConfig};
pub use store::{ConfigStore, StoreError};
