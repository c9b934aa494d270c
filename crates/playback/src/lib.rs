//! Proxied adaptive-streaming playback resilience engine.
//!
//! Wires an opaque streaming engine to a same-origin relay: a pure origin
//! classifier decides which fetches must be rerouted, a decorator loader
//! rewrites them without disturbing decryption metadata, and a single
//! recovery policy turns engine error events into bounded retries, one-shot
//! media recovery, or a terminal user-facing failure.

pub mod classifier;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod events;
pub mod loader;
pub mod recovery;

pub use classifier::{ClassifyReason, ProxyDecision, classify, needs_relay};
pub use config::{LoaderTimeouts, PlayerConfig, RelayRoute, RetryConfig};
pub use controller::{PlaybackController, SessionState};
pub use engine::{EngineConfig, EngineFactory, MediaEngine, VideoHandle};
pub use error::{ErrorEvent, ErrorKind, PlaybackError};
pub use events::{EngineEvent, PlayerEvent};
pub use loader::{
    DecryptionContext, EncryptionMethod, HttpLoader, LoadedResource, RelayLoader, ResourceData,
    ResourceKind, ResourceLoader, ResourceRequest, ResponseType,
};
pub use recovery::{RecoveryAction, RecoveryPolicy, SessionCounters};
