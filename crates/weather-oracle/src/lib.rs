//! Off-chain relay for the weather oracle.
//!
//! The relay subscribes to `NewRequest` events from the ledger, fetches the
//! current temperature for each request's coordinate from an Open-Meteo
//! compatible endpoint and submits the value back as the configured relayer.
//!
//! # Modules
//!
//! - [`config`]: YAML configuration with `ORACLE_*` environment overrides
//! - [`fetcher`]: weather provider client
//! - [`chain`]: ledger client trait and the in-process chain
//! - [`relay`]: event loop with bounded retries and sentinel fallback
//! - [`gateway`]: HTTP API for consumers
//! - [`runner`]: wires everything together under one shutdown signal

pub mod chain;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod gateway;
pub mod relay;
pub mod runner;
pub mod shutdown;

pub use chain::{ChainError, ChainResult, LedgerClient, LedgerInfo, LocalChain, SignedClient};
pub use config::{Config, ConfigError, RelayConfig, RpcConfig, WeatherConfig};
pub use error::{OracleError, Result};
pub use fetcher::{FetchFailed, OpenMeteoClient, WeatherSource};
pub use gateway::{bind_gateway, create_router, serve_gateway};
pub use relay::{fetch_with_retry, Outcome, Relay, RetryPolicy, Worker};
pub use runner::{run_oracle, run_with_gateway};
pub use shutdown::install_shutdown_handler;
