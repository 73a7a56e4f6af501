//! Real-time market monitoring service
//!
//! Ingests per-symbol trade streams from an upstream exchange, keeps
//! bounded rolling state, evaluates spike and trend alert rules, tracks
//! prediction accuracy and drift, and fans updates out to subscribers
//! over a channel-based publish/subscribe hub. A small axum surface
//! exposes the WebSocket bridge and read endpoints.

pub mod alerts;
pub mod config;
pub mod evaluator;
pub mod hub;
pub mod messages;
pub mod metrics;
pub mod monitor;
pub mod notify;
pub mod persist;
pub mod processor;
pub mod publisher;
pub mod server;
pub mod stream;
pub mod window;
