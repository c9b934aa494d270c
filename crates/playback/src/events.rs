use crate::error::ErrorEvent;

/// Lifecycle events emitted by the streaming engine.
///
/// The engine surface is intentionally small: the controller only reacts to
/// the events that drive the session state machine or the recovery policy.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The top-level manifest was fetched and parsed; playback can start.
    ManifestParsed,
    /// Decoding/rendering is in progress.
    Playing,
    /// Playback stalled waiting for data.
    Stalled,
    /// The stream reached its end.
    Ended,
    /// Something went wrong; routed through the recovery policy.
    Error(ErrorEvent),
}

/// Events surfaced to the UI collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// The session reached `Ready`: the manifest parsed successfully.
    Ready,
    /// Playback stalled; informational.
    Stalled,
    /// The session failed terminally; a single human-readable message plus
    /// the offending resource URL when known.
    FatalError {
        message: String,
        url: Option<String>,
    },
}
