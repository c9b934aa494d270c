// Seam around the opaque streaming engine. The controller never touches a
// concrete decoder; it drives whatever implementation the hosting
// application injects through these traits.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::ErrorEvent;
use crate::events::EngineEvent;
use crate::loader::ResourceLoader;

/// Opaque handle to the video surface the engine renders into. Supplied by
/// the hosting application at mount time; the core never looks an element up
/// by ambient identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoHandle(pub String);

impl VideoHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Everything an engine instance needs at construction time. The loader is
/// injected here; the engine performs every manifest/segment/key fetch
/// through it.
pub struct EngineConfig {
    pub source_url: String,
    pub subtitle_url: Option<String>,
    pub video: VideoHandle,
    pub loader: Arc<dyn ResourceLoader>,
}

/// A live streaming-engine instance. Demuxing, decoding and decryption are
/// its business; the controller only nudges its lifecycle.
pub trait MediaEngine: Send + Sync {
    /// Start or restart loading from the current position. Used both for the
    /// initial load and for network-error retries.
    fn start_load(&self);

    /// Invoke the engine's built-in media-error recovery.
    fn recover_media_error(&self);

    /// Stop all work and release decoder resources.
    fn stop(&self);
}

/// Creates engine instances. Fails with a Configuration error when the
/// runtime cannot play the stream format at all.
pub trait EngineFactory: Send + Sync {
    fn create(
        &self,
        config: EngineConfig,
    ) -> Result<(Arc<dyn MediaEngine>, mpsc::Receiver<EngineEvent>), ErrorEvent>;
}
