//! ReelGuard - Resource-Pressure Controller for Media Generation
//!
//! ReelGuard runs next to a media-generation service deployed under a hard
//! memory ceiling. It keeps resident memory under budget by evicting stale
//! generated artifacts, and it guarantees that every generation request
//! ends with *some* usable output by walking an ordered ladder of degraded
//! production strategies.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                       Pressure Monitor (background)                   │
//! │   ┌────────────────┐    ┌──────────────────┐    ┌────────────────┐   │
//! │   │ MetricsSource  │───►│  EvictionPolicy  │───►│   Reclaimer    │   │
//! │   │ (sysinfo)      │    │  full / temp     │    │  (malloc_trim) │   │
//! │   └────────────────┘    └────────┬─────────┘    └────────────────┘   │
//! └──────────────────────────────────┼───────────────────────────────────┘
//!                                    │ scan / delete
//!                     ┌──────────────▼──────────────┐
//!                     │        ArtifactStore         │
//!                     │  tasks · cache · static · tmp│
//!                     └──────────────▲──────────────┘
//!                                    │ reusable artifacts
//! ┌──────────────────────────────────┼───────────────────────────────────┐
//! │                       Generation Controller (per request)             │
//! │   ┌─────────────┐  ┌───────────┐  ┌───────────────┐  ┌─────────────┐ │
//! │   │ ReuseStatic │─►│ Slideshow │─►│ MinimalEncode │─►│ Placeholder │ │
//! │   └─────────────┘  └───────────┘  └───────┬───────┘  └─────────────┘ │
//! └───────────────────────────────────────────┼──────────────────────────┘
//!                                             │
//!                              ┌──────────────▼──────────────┐
//!                              │   VideoEncodingBackend       │
//!                              │   (ffmpeg / ImageMagick)     │
//!                              └─────────────────────────────┘
//! ```
//!
//! The monitor and the controller share the artifact directories without
//! locking. Deletions are best-effort and only target artifacts older than
//! the cutoff, so a race with a fresh write fails quietly and is retried on
//! the next pass.
//!
//! ## Modules
//!
//! - [`config`]: Immutable configuration built once at startup
//! - [`metrics`]: Memory samples and the system metrics source
//! - [`store`]: Artifact discovery and best-effort deletion
//! - [`eviction`]: Threshold/age-driven eviction policy and reclamation
//! - [`monitor`]: Cancellable background pressure monitor
//! - [`backend`]: Video encoding backend interface and ffmpeg implementation
//! - [`ladder`]: Degradation tiers and the ladder that walks them
//! - [`controller`]: Per-request entry point and admission control
//! - [`process`]: Process priority and address-space hardening

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod eviction;
pub mod ladder;
pub mod metrics;
pub mod monitor;
pub mod process;
pub mod store;

pub use config::ReelGuardConfig;
pub use controller::{AdmissionGate, GenerationController, VideoGenerator};
pub use error::{Error, Result};
pub use ladder::{DegradationLadder, DegradationTier, GenerationOptions, GenerationOutcome};
pub use monitor::{MonitorHandle, PressureMonitor};
