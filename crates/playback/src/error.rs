use crate::loader::ResourceKind;

/// Broad error taxonomy used by the recovery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fetch/transport failure, including CORS rejection surfacing as a
    /// zero-status response.
    Network,
    /// Decoder/parse failure on otherwise successfully fetched bytes.
    Media,
    /// The runtime has no capability to play the stream format at all.
    Configuration,
    /// The relay itself was reachable but reported an upstream failure.
    Relay,
}

/// A single error raised by the engine or the loader stack.
///
/// Consumed once by the recovery policy; never persisted.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub fatal: bool,
    pub detail: String,
    /// URL of the offending resource, when known, for diagnostics.
    pub url: Option<String>,
    /// Which resource kind was being fetched when the error occurred.
    pub resource: Option<ResourceKind>,
    /// HTTP status of the failed response. `None` means the transport
    /// produced no response at all (the "code 0" case).
    pub status: Option<u16>,
    /// True when the failing request had already been rewritten to the relay.
    pub relayed: bool,
}

impl ErrorEvent {
    pub fn new(kind: ErrorKind, fatal: bool, detail: impl Into<String>) -> Self {
        Self {
            kind,
            fatal,
            detail: detail.into(),
            url: None,
            resource: None,
            status: None,
            relayed: false,
        }
    }

    pub fn network(fatal: bool, detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, fatal, detail)
    }

    pub fn media(fatal: bool, detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Media, fatal, detail)
    }

    pub fn configuration(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, true, detail)
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_resource(mut self, resource: ResourceKind) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// A transport failure with no HTTP response on a relayed fragment or key
    /// fetch. The relay exists precisely to avoid CORS failures, so this
    /// indicates a hard network/configuration problem that retrying cannot
    /// fix.
    pub fn is_relay_blocked(&self) -> bool {
        self.kind == ErrorKind::Network
            && self.fatal
            && self.relayed
            && self.status.is_none()
            && matches!(
                self.resource,
                Some(ResourceKind::Segment) | Some(ResourceKind::Key)
            )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("session cancelled")]
    Cancelled,

    #[error("invalid source URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("engine creation failed: {reason}")]
    EngineCreation { reason: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl PlaybackError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }
}
