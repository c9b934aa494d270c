// Proxying loader stack: a pass-through HTTP transport plus a relay-aware
// decorator. The decorator sits between the streaming engine's fetches and
// the network, rewriting cross-origin requests onto the same-origin relay
// while keeping the engine's view of responses indistinguishable from a
// direct fetch.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::{debug, trace, warn};
use url::Url;

use crate::classifier::classify;
use crate::config::{LoaderTimeouts, RelayRoute};
use crate::error::{ErrorEvent, ErrorKind};

/// What the engine is fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Manifest,
    Segment,
    Key,
}

/// How the engine expects the response body decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    Binary,
    Text,
}

/// Encryption scheme announced by the manifest for a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMethod {
    Aes128,
}

/// Decryption metadata attached to a segment or key request by the engine.
///
/// The loader may detach and reattach this across a relayed key fetch but
/// must never mutate its fields; the engine decrypts, not the loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptionContext {
    pub method: EncryptionMethod,
    pub key_uri: String,
    pub iv: [u8; 16],
}

/// One fetch attempt as seen by the loader stack.
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    pub url: String,
    pub kind: ResourceKind,
    pub response_type: ResponseType,
    pub headers: HashMap<String, String>,
    pub decryption: Option<DecryptionContext>,
}

impl ResourceRequest {
    pub fn new(url: impl Into<String>, kind: ResourceKind) -> Self {
        let response_type = match kind {
            ResourceKind::Manifest => ResponseType::Text,
            ResourceKind::Segment | ResourceKind::Key => ResponseType::Binary,
        };
        Self {
            url: url.into(),
            kind,
            response_type,
            headers: HashMap::new(),
            decryption: None,
        }
    }

    pub fn with_decryption(mut self, context: DecryptionContext) -> Self {
        self.decryption = Some(context);
        self
    }
}

/// Decoded response body.
#[derive(Debug, Clone)]
pub enum ResourceData {
    Binary(Bytes),
    Text(String),
}

/// A completed fetch handed back to the engine.
#[derive(Debug, Clone)]
pub struct LoadedResource {
    /// The URL the engine asked for (pre-rewrite for relayed requests).
    pub url: String,
    pub status: u16,
    pub data: ResourceData,
    /// Decryption context travelling with the response, when any.
    pub decryption: Option<DecryptionContext>,
}

/// Loader seam injected into the engine configuration at construction time.
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    async fn load(&self, request: ResourceRequest) -> Result<LoadedResource, ErrorEvent>;
}

// --- HttpLoader: pass-through transport ---

/// Default transport: fetches the request URL directly with reqwest.
pub struct HttpLoader {
    client: Client,
    timeouts: LoaderTimeouts,
    /// Base used to absolutize relative request URLs, e.g. the page origin.
    base: Url,
}

impl HttpLoader {
    pub fn new(client: Client, timeouts: LoaderTimeouts, origin: &str) -> Result<Self, ErrorEvent> {
        let base = Url::parse(origin).map_err(|e| {
            ErrorEvent::configuration(format!("invalid origin `{origin}`: {e}"))
        })?;
        Ok(Self {
            client,
            timeouts,
            base,
        })
    }

    fn resolve(&self, url: &str) -> Result<Url, ErrorEvent> {
        let resolved = if url.contains("://") {
            Url::parse(url)
        } else {
            self.base.join(url)
        };
        resolved.map_err(|e| {
            ErrorEvent::network(true, format!("unresolvable URL `{url}`: {e}")).with_url(url)
        })
    }

    fn timeout_for(&self, kind: ResourceKind) -> std::time::Duration {
        match kind {
            ResourceKind::Manifest => self.timeouts.manifest,
            ResourceKind::Segment => self.timeouts.segment,
            ResourceKind::Key => self.timeouts.key,
        }
    }
}

#[async_trait]
impl ResourceLoader for HttpLoader {
    async fn load(&self, request: ResourceRequest) -> Result<LoadedResource, ErrorEvent> {
        let target = self.resolve(&request.url).map_err(|e| {
            let mut e = e;
            e.resource = Some(request.kind);
            e
        })?;

        let mut builder = self
            .client
            .get(target.clone())
            .timeout(self.timeout_for(request.kind));
        for (name, value) in &request.headers {
            match reqwest::header::HeaderName::from_bytes(name.as_bytes()) {
                Ok(header_name) => match reqwest::header::HeaderValue::from_str(value) {
                    Ok(header_value) => {
                        builder = builder.header(header_name, header_value);
                    }
                    Err(_) => warn!(header = %name, "Skipping header with invalid value"),
                },
                Err(_) => warn!(header = %name, "Skipping invalid header name"),
            }
        }

        let response = builder.send().await.map_err(|e| {
            // No HTTP response at all: connect failure, timeout, DNS. This is
            // the transport "code 0" shape the recovery policy cares about.
            ErrorEvent::network(true, format!("request failed: {e}"))
                .with_url(request.url.clone())
                .with_resource(request.kind)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ErrorEvent::network(
                true,
                format!("HTTP {status} fetching {}", request.url),
            )
            .with_url(request.url.clone())
            .with_resource(request.kind)
            .with_status(status.as_u16()));
        }

        let status_code = status.as_u16();
        let data = match request.response_type {
            ResponseType::Binary => {
                let bytes = response.bytes().await.map_err(|e| {
                    ErrorEvent::network(true, format!("body read failed: {e}"))
                        .with_url(request.url.clone())
                        .with_resource(request.kind)
                })?;
                trace!(url = %request.url, len = bytes.len(), "Fetched binary resource");
                ResourceData::Binary(bytes)
            }
            ResponseType::Text => {
                let text = response.text().await.map_err(|e| {
                    ErrorEvent::network(true, format!("body read failed: {e}"))
                        .with_url(request.url.clone())
                        .with_resource(request.kind)
                })?;
                trace!(url = %request.url, len = text.len(), "Fetched text resource");
                ResourceData::Text(text)
            }
        };

        Ok(LoadedResource {
            url: request.url,
            status: status_code,
            data,
            decryption: request.decryption,
        })
    }
}

// --- RelayLoader: relay-aware decorator ---

/// Wraps any inner loader and reroutes cross-origin requests through the
/// same-origin relay. Injected into the engine configuration in place of the
/// default transport; no engine internals are patched.
pub struct RelayLoader<L> {
    inner: L,
    route: RelayRoute,
    origin: String,
}

impl<L: ResourceLoader> RelayLoader<L> {
    pub fn new(inner: L, route: RelayRoute, origin: impl Into<String>) -> Self {
        Self {
            inner,
            route,
            origin: origin.into(),
        }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }
}

#[async_trait]
impl<L: ResourceLoader> ResourceLoader for RelayLoader<L> {
    async fn load(&self, mut request: ResourceRequest) -> Result<LoadedResource, ErrorEvent> {
        let decision = classify(&request.url, &self.origin);
        if !decision.relay {
            // A URL we already rewrote targets the relay's own origin and
            // lands here too, so re-entrant calls cannot chain proxies.
            return self.inner.load(request).await;
        }

        let original_url = request.url.clone();
        let target = self.route.target_for(&original_url);
        debug!(
            original = %original_url,
            relay = %target,
            reason = ?decision.reason,
            kind = ?request.kind,
            "Rewriting request through relay"
        );

        request.url = target;
        request
            .headers
            .insert("X-Original-URL".to_string(), original_url.clone());
        request
            .headers
            .insert("Access-Control-Allow-Origin".to_string(), "*".to_string());
        request.headers.insert(
            "Access-Control-Allow-Methods".to_string(),
            "GET, HEAD, OPTIONS".to_string(),
        );
        request.headers.insert(
            "Access-Control-Allow-Headers".to_string(),
            "Origin, Content-Type, Accept, Range".to_string(),
        );

        // Key fetches governed by a decryption context: snapshot the context
        // so relay transport details cannot leak into it, force a binary
        // response and defeat intermediary caches for the key material.
        let snapshot = match (&request.kind, &request.decryption) {
            (ResourceKind::Key, Some(context)) if context.key_uri == original_url => {
                request.response_type = ResponseType::Binary;
                request.headers.insert(
                    "Accept".to_string(),
                    "application/octet-stream".to_string(),
                );
                request
                    .headers
                    .insert("Cache-Control".to_string(), "no-cache".to_string());
                request
                    .headers
                    .insert("Pragma".to_string(), "no-cache".to_string());
                Some(context.clone())
            }
            _ => None,
        };

        match self.inner.load(request).await {
            Ok(mut loaded) => {
                if let Some(context) = snapshot {
                    // Bit-identical restore; the engine's decrypt path sees
                    // exactly the metadata it attached.
                    loaded.decryption = Some(context);
                }
                loaded.url = original_url;
                Ok(loaded)
            }
            Err(mut event) => {
                event.relayed = true;
                event.url = Some(original_url);
                if event.status.is_some_and(|s| s >= 500) {
                    // Relay reachable but upstream failed; the recovery
                    // policy treats this as a network error.
                    event.kind = ErrorKind::Relay;
                }
                Err(event)
            }
        }
    }
}
