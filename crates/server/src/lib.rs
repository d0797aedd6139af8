//! drivelog server: HTTP ingestion, background supervisor loops, and the
//! HTTP-backed collaborator implementations the core's trip pipeline
//! depends on.
//!
//! ## Modules
//! - **config**: server-side configuration (bind address, auth, engine tunables)
//! - **state**: shared [`AppState`] handed to every handler and loop
//! - **http**: axum router — webhook ingestion plus operator commands
//! - **supervisor**: dispatcher/reaper/retention background loops
//! - **collaborators_http**: `reqwest`-backed geocoder, road-snapper, upstream provider

pub mod collaborators_http;
pub mod config;
pub mod error;
pub mod http;
pub mod state;
pub mod supervisor;

pub use config::ServerConfig;
pub use state::AppState;
