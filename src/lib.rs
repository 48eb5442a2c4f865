//! # podwatch
//!
//! Watches pods and raises exactly one notification per crash-loop episode.
//!
//! An [`Informer`](cache::Informer) keeps a local cache of pods and feeds
//! their keys into a deduplicating, rate-limited [`queue`]. The
//! [`Controller`](controller::Controller) reconciles each key against the
//! latest cached state and hands an [`Event`](handlers::Event) to the
//! configured [`Handler`](handlers::Handler).

pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod handlers;
pub mod kube;
pub mod model;
pub mod queue;
pub mod telemetry;

pub use error::{Error, Result};
