//! # campus-server
//!
//! Axum HTTP + `WebSocket` event hub for the campus app.
//!
//! - `WebSocket` gateway: handshake verification, heartbeat, room join/leave
//! - Connection registry and room multiplexer, both backed by `DashMap`
//! - Targeted fan-out (user, tenant, role, room, everyone) through [`Dispatcher`]
//! - HTTP endpoints: health check, Prometheus metrics, `POST /publish`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod publish;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use server::CampusServer;
pub use websocket::dispatcher::Dispatcher;
pub use websocket::lifecycle::LifecycleController;
