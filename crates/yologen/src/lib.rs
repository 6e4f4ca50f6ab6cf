//! yologen: client library for the yologen dataset and training platform.
//!
//! Re-exports the domain model from `yologen-core` at the top level and the
//! HTTP adapter and views from `yologen-client` under [`client`].

pub use yologen_client as client;
pub use yologen_core::*;
