//! Ingestion and broadcast hub.
//!
//! The hub is the collector side of the pipeline: exporters `POST`
//! newline-delimited log lines to `/logs`, and live consumers follow the
//! stream with an SSE `GET` on the same path. Every ingested line is
//! fanned out to every connected subscriber; nothing is stored.
//!
//! [`Hub::router`] exposes the two endpoints as an [`axum::Router`] so the
//! hub can be mounted inside a larger service, and [`Hub::serve`] runs it
//! standalone (see the `logvine-hub` binary).

pub mod registry;
pub mod server;

pub use registry::{BroadcastError, SubscriberRegistry};
pub use server::{DEFAULT_KEEP_ALIVE, Hub, HubConfig, HubError};
