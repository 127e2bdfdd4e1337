pub mod config;
pub mod error;

pub use config::{
    load_dotenv, AuthConfig, BalancerConfig, ClientConfig, RuntimeConfig, SessionConfig,
    StrategyKind, TransportConfig, TransportKind,
};
pub use error::ConfigError;
