pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::CliConfig;

pub use adapters::http::ReqwestTransport;
pub use config::{toml_config::TomlConfig, ClientConfig};
pub use self::core::{
    client::ApiClient,
    refresh::{RefreshCoordinator, RefreshState},
    resources::ResourceClient,
    session::{AuthService, SessionStore},
};
pub use domain::model::{Credentials, Identity, ListQuery, Resource};
pub use utils::error::{ApiError, RefreshFailure, Result};
