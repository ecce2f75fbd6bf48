//! `beacon` is a client-side telemetry SDK: application code reports discrete events
//! (identify/track/screen/group/alias) which the SDK buffers, enriches, optionally filters, and
//! delivers to downstream integration sinks without blocking the caller and without losing
//! events across process restarts.
//!
//! # Overview
//!
//! `beacon` is organized as a set of building blocks wired together by the [`Analytics`] client.
//!
//! [`ProjectSettings`] is the heart of routing. It is an immutable snapshot of the
//! server-provided configuration (integration settings and the tracking plan) that decides which
//! integrations receive which events.
//!
//! [`settings_store::SettingsStore`] is a thread-safe multi-reader multi-writer in-memory
//! manager for [`ProjectSettings`]. Whenever settings change, the snapshot is replaced
//! completely; readers keep using the snapshot they grabbed, so one event is routed against one
//! consistent view.
//!
//! [`settings_fetcher::SettingsFetcher`] is an HTTP client that knows how to fetch
//! [`ProjectSettings`] from the server, and [`settings_poller::SettingsPoller`] keeps them
//! up-to-date from a background thread, falling back to the settings cache and compiled-in
//! defaults when the network is unavailable.
//!
//! [`routing`] contains the pure decision pipeline: given a payload, a settings snapshot,
//! per-call [`Options`] and the opt-out flag, it computes the set of integrations allowed to
//! receive the event.
//!
//! [`dispatcher::Dispatcher`] owns the durable [`queue::PayloadQueue`] and the flush scheduler:
//! size- and time-triggered, single-flight, draining batches to the
//! [`uploader::BatchUploader`]. [`registry::IntegrationRegistry`] fans calls out to in-process
//! [`integration::Integration`] sinks.
//!
//! Most hosts only interact with [`AnalyticsConfig`], [`Analytics`], and [`InstanceRegistry`].
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. Only argument validation, registry misuse, and
//! post-shutdown calls surface to callers; queue and network failures are absorbed internally
//! because event reporting is fire-and-forget by design.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages.
//! Consider integrating a `log`-compatible logger implementation for better visibility into SDK
//! operations.

#![warn(rustdoc::missing_crate_level_docs)]

pub mod cache;
pub mod dispatcher;
pub mod integration;
pub mod lifecycle;
pub mod queue;
pub mod registry;
pub mod routing;
pub mod settings_fetcher;
pub mod settings_poller;
pub mod settings_store;
pub mod task_runner;
pub mod transform;
pub mod uploader;

mod client;
mod context;
mod error;
mod instances;
mod options;
mod payload;
mod settings;
mod traits;

pub use client::{Analytics, AnalyticsConfig};
pub use context::{AnalyticsContext, AppInfo, DeviceInfo};
pub use error::{Error, Result};
pub use instances::InstanceRegistry;
pub use lifecycle::LifecycleEvent;
pub use options::{Options, ALL_INTEGRATIONS_KEY};
pub use payload::{Body, JsonMap, Payload, PayloadType, Properties, TimestampPrecision};
pub use settings::{EventPlan, ProjectSettings, TrackingPlan, COLLECTOR_INTEGRATION_KEY};
pub use traits::Traits;
