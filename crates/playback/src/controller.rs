// Playback controller: owns one session per video handle, instantiates the
// streaming engine with the relay-aware loader injected, and pumps engine
// events through the recovery policy.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{DEFAULT_USER_AGENT, PlayerConfig};
use crate::engine::{EngineConfig, EngineFactory, MediaEngine, VideoHandle};
use crate::error::PlaybackError;
use crate::events::{EngineEvent, PlayerEvent};
use crate::loader::{HttpLoader, RelayLoader, ResourceLoader};
use crate::recovery::{RecoveryAction, RecoveryPolicy, SessionCounters};

/// Session lifecycle. `Error` is reachable from any state; `Stalled` is a
/// presentation detail of `Playing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Initializing,
    Ready,
    Playing,
    Stalled,
    Error,
}

/// State shared between the controller and the session's pump task.
struct SessionShared {
    state: Mutex<SessionState>,
    counters: Mutex<SessionCounters>,
}

impl SessionShared {
    fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Initializing),
            counters: Mutex::new(SessionCounters::default()),
        }
    }
}

struct ActiveSession {
    engine: Arc<dyn MediaEngine>,
    token: CancellationToken,
    shared: Arc<SessionShared>,
    _pump: JoinHandle<()>,
}

/// Binds one playback session to one video handle. Mounting a new source
/// tears the previous session down first; at most one engine instance exists
/// per controller at any time.
pub struct PlaybackController {
    factory: Arc<dyn EngineFactory>,
    config: PlayerConfig,
    http_client: reqwest::Client,
    player_tx: mpsc::Sender<PlayerEvent>,
    active: Option<ActiveSession>,
}

impl PlaybackController {
    /// Create a controller and the UI-facing event receiver.
    pub fn new(
        factory: Arc<dyn EngineFactory>,
        config: PlayerConfig,
    ) -> (Self, mpsc::Receiver<PlayerEvent>) {
        let (player_tx, player_rx) = mpsc::channel(32);
        let http_client = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .unwrap_or_default();
        (
            Self {
                factory,
                config,
                http_client,
                player_tx,
                active: None,
            },
            player_rx,
        )
    }

    /// Current session state; `Idle` when nothing is mounted.
    pub fn state(&self) -> SessionState {
        self.active
            .as_ref()
            .map(|session| *session.shared.state.lock())
            .unwrap_or(SessionState::Idle)
    }

    /// Mount a source onto the video handle and start a new session.
    ///
    /// Any prior session is torn down first: its token is cancelled so
    /// in-flight fetches and scheduled retry timers become no-ops, and its
    /// engine is stopped and released before the new one is created.
    pub fn mount(
        &mut self,
        video: VideoHandle,
        source_url: impl Into<String>,
        subtitle_url: Option<String>,
    ) -> Result<(), PlaybackError> {
        self.teardown_active();

        let source_url = source_url.into();
        if source_url.trim().is_empty() {
            return Err(PlaybackError::invalid_url(source_url, "empty source URL"));
        }

        let loader = self.build_loader()?;
        let engine_config = EngineConfig {
            source_url: source_url.clone(),
            subtitle_url,
            video,
            loader,
        };

        let (engine, engine_rx) = match self.factory.create(engine_config) {
            Ok(created) => created,
            Err(event) => {
                // No capability to play the format at all: structural,
                // immediately user-visible, never retried.
                warn!(detail = %event.detail, "Engine creation failed");
                let _ = self.player_tx.try_send(PlayerEvent::FatalError {
                    message: format!("Playback is not supported: {}", event.detail),
                    url: Some(source_url),
                });
                return Ok(());
            }
        };

        debug!(source = %source_url, "Mounted playback session");

        let token = CancellationToken::new();
        let shared = Arc::new(SessionShared::new());
        let pump = tokio::spawn(session_pump(
            Arc::clone(&engine),
            engine_rx,
            Arc::clone(&shared),
            token.clone(),
            RecoveryPolicy::new(self.config.retry.clone()),
            self.player_tx.clone(),
        ));

        self.active = Some(ActiveSession {
            engine,
            token,
            shared,
            _pump: pump,
        });
        Ok(())
    }

    /// Tear down the live session, if any. Valid from any state.
    pub fn destroy(&mut self) {
        self.teardown_active();
    }

    fn teardown_active(&mut self) {
        if let Some(session) = self.active.take() {
            // Synchronous cancellation: any in-flight or scheduled callback
            // observing this token becomes a no-op on arrival.
            session.token.cancel();
            session.engine.stop();
            debug!("Tore down playback session");
        }
    }

    fn build_loader(&self) -> Result<Arc<dyn ResourceLoader>, PlaybackError> {
        let transport = HttpLoader::new(
            self.http_client.clone(),
            self.config.timeouts.clone(),
            &self.config.origin,
        )
        .map_err(|event| PlaybackError::configuration(event.detail))?;
        Ok(Arc::new(RelayLoader::new(
            transport,
            self.config.relay.clone(),
            self.config.origin.clone(),
        )))
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.teardown_active();
    }
}

/// Consumes engine events for one session until teardown.
async fn session_pump(
    engine: Arc<dyn MediaEngine>,
    mut engine_rx: mpsc::Receiver<EngineEvent>,
    shared: Arc<SessionShared>,
    token: CancellationToken,
    policy: RecoveryPolicy,
    player_tx: mpsc::Sender<PlayerEvent>,
) {
    loop {
        let event = tokio::select! {
            _ = token.cancelled() => break,
            received = engine_rx.recv() => match received {
                Some(event) => event,
                None => break,
            },
        };

        if *shared.state.lock() == SessionState::Error {
            // Terminal until the collaborator mounts a new source; a fatal
            // message is surfaced exactly once.
            debug!(?event, "Ignoring engine event after fatal error");
            continue;
        }

        match event {
            EngineEvent::ManifestParsed => {
                *shared.state.lock() = SessionState::Ready;
                shared.counters.lock().note_progress();
                let _ = player_tx.send(PlayerEvent::Ready).await;
            }
            EngineEvent::Playing => {
                *shared.state.lock() = SessionState::Playing;
                shared.counters.lock().note_progress();
            }
            EngineEvent::Stalled => {
                *shared.state.lock() = SessionState::Stalled;
                let _ = player_tx.send(PlayerEvent::Stalled).await;
                // Nudge the engine; stalls usually resolve once loading
                // resumes.
                engine.start_load();
            }
            EngineEvent::Ended => {
                debug!("Stream ended");
            }
            EngineEvent::Error(error) => {
                let action = {
                    let mut counters = shared.counters.lock();
                    policy.decide(&error, &mut counters)
                };
                match action {
                    RecoveryAction::Observe => {}
                    RecoveryAction::RecoverMedia => {
                        warn!(detail = %error.detail, "Media error; invoking engine recovery");
                        engine.recover_media_error();
                    }
                    RecoveryAction::RetryAfter(delay) => {
                        warn!(
                            delay_ms = delay.as_millis() as u64,
                            detail = %error.detail,
                            "Network error; scheduling reload"
                        );
                        let engine = Arc::clone(&engine);
                        let token = token.clone();
                        tokio::spawn(async move {
                            tokio::select! {
                                // A stale timer from a torn-down session must
                                // not touch the engine.
                                _ = token.cancelled() => {}
                                _ = tokio::time::sleep(delay) => engine.start_load(),
                            }
                        });
                    }
                    RecoveryAction::Fatal(message) => {
                        *shared.state.lock() = SessionState::Error;
                        let _ = player_tx
                            .send(PlayerEvent::FatalError {
                                message,
                                url: error.url.clone(),
                            })
                            .await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::error::ErrorEvent;
    use crate::loader::ResourceKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct MockEngine {
        start_load_calls: AtomicU32,
        recover_calls: AtomicU32,
        stop_calls: AtomicU32,
    }

    impl MediaEngine for MockEngine {
        fn start_load(&self) {
            self.start_load_calls.fetch_add(1, Ordering::SeqCst);
        }
        fn recover_media_error(&self) {
            self.recover_calls.fetch_add(1, Ordering::SeqCst);
        }
        fn stop(&self) {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct MockFactory {
        engines: Mutex<Vec<Arc<MockEngine>>>,
        senders: Mutex<Vec<mpsc::Sender<EngineEvent>>>,
        unsupported: bool,
    }

    impl MockFactory {
        fn engine(&self, index: usize) -> Arc<MockEngine> {
            Arc::clone(&self.engines.lock()[index])
        }

        fn sender(&self, index: usize) -> mpsc::Sender<EngineEvent> {
            self.senders.lock()[index].clone()
        }
    }

    impl EngineFactory for MockFactory {
        fn create(
            &self,
            _config: EngineConfig,
        ) -> Result<(Arc<dyn MediaEngine>, mpsc::Receiver<EngineEvent>), ErrorEvent> {
            if self.unsupported {
                return Err(ErrorEvent::configuration("no HLS support"));
            }
            let engine = Arc::new(MockEngine::default());
            let (tx, rx) = mpsc::channel(16);
            self.engines.lock().push(Arc::clone(&engine));
            self.senders.lock().push(tx);
            Ok((engine, rx))
        }
    }

    fn test_config(base_delay_ms: u64) -> PlayerConfig {
        let mut config = PlayerConfig::new("https://site.example");
        config.retry = RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(base_delay_ms),
        };
        config
    }

    fn mount(
        controller: &mut PlaybackController,
    ) -> Result<(), PlaybackError> {
        controller.mount(
            VideoHandle::new("player-1"),
            "https://cdn.other.example/stream/index.m3u8",
            None,
        )
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    fn network_error() -> EngineEvent {
        EngineEvent::Error(
            ErrorEvent::network(true, "segment fetch failed")
                .with_status(503)
                .with_resource(ResourceKind::Segment),
        )
    }

    #[tokio::test]
    async fn manifest_parsed_moves_session_to_ready() {
        let factory = Arc::new(MockFactory::default());
        let (mut controller, mut events) =
            PlaybackController::new(factory.clone(), test_config(10));
        mount(&mut controller).unwrap();
        assert_eq!(controller.state(), SessionState::Initializing);

        factory.sender(0).send(EngineEvent::ManifestParsed).await.unwrap();
        assert_eq!(events.recv().await, Some(PlayerEvent::Ready));
        assert_eq!(controller.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn unsupported_runtime_surfaces_fatal_immediately() {
        let factory = Arc::new(MockFactory {
            unsupported: true,
            ..Default::default()
        });
        let (mut controller, mut events) =
            PlaybackController::new(factory, test_config(10));
        mount(&mut controller).unwrap();

        match events.recv().await {
            Some(PlayerEvent::FatalError { message, .. }) => {
                assert!(message.contains("not supported"));
            }
            other => panic!("expected fatal error, got {other:?}"),
        }
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn network_error_schedules_one_reload() {
        let factory = Arc::new(MockFactory::default());
        let (mut controller, _events) =
            PlaybackController::new(factory.clone(), test_config(10));
        mount(&mut controller).unwrap();

        factory.sender(0).send(network_error()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(
            factory.engine(0).start_load_calls.load(Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn retry_budget_exhausts_into_a_single_fatal() {
        let factory = Arc::new(MockFactory::default());
        let (mut controller, mut events) =
            PlaybackController::new(factory.clone(), test_config(5));
        mount(&mut controller).unwrap();

        let sender = factory.sender(0);
        for _ in 0..4 {
            sender.send(network_error()).await.unwrap();
        }
        // Wait past the longest scheduled delay (5, 10, 15 ms).
        tokio::time::sleep(Duration::from_millis(80)).await;

        // Exactly 3 reloads were scheduled; the 4th error went fatal.
        assert_eq!(
            factory.engine(0).start_load_calls.load(Ordering::SeqCst),
            3
        );
        assert!(matches!(
            events.recv().await,
            Some(PlayerEvent::FatalError { .. })
        ));
        assert_eq!(controller.state(), SessionState::Error);

        // Further errors after the fatal are ignored: no second message.
        sender.send(network_error()).await.unwrap();
        settle().await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn media_recovery_fires_once_then_fatal() {
        let factory = Arc::new(MockFactory::default());
        let (mut controller, mut events) =
            PlaybackController::new(factory.clone(), test_config(10));
        mount(&mut controller).unwrap();

        let media_error =
            EngineEvent::Error(ErrorEvent::media(true, "decode error"));
        let sender = factory.sender(0);

        sender.send(media_error.clone()).await.unwrap();
        settle().await;
        assert_eq!(factory.engine(0).recover_calls.load(Ordering::SeqCst), 1);

        sender.send(media_error).await.unwrap();
        assert!(matches!(
            events.recv().await,
            Some(PlayerEvent::FatalError { .. })
        ));
        assert_eq!(factory.engine(0).recover_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn relay_blocked_error_fails_without_retry() {
        let factory = Arc::new(MockFactory::default());
        let (mut controller, mut events) =
            PlaybackController::new(factory.clone(), test_config(10));
        mount(&mut controller).unwrap();

        let mut error = ErrorEvent::network(true, "code 0 on fragment")
            .with_resource(ResourceKind::Key)
            .with_url("https://cdn.other.example/keys/k1.bin");
        error.relayed = true;
        factory
            .sender(0)
            .send(EngineEvent::Error(error))
            .await
            .unwrap();

        match events.recv().await {
            Some(PlayerEvent::FatalError { url, .. }) => {
                assert_eq!(url.as_deref(), Some("https://cdn.other.example/keys/k1.bin"));
            }
            other => panic!("expected fatal error, got {other:?}"),
        }
        settle().await;
        assert_eq!(
            factory.engine(0).start_load_calls.load(Ordering::SeqCst),
            0
        );
    }

    #[tokio::test]
    async fn teardown_turns_pending_retry_into_a_no_op() {
        let factory = Arc::new(MockFactory::default());
        let (mut controller, _events) =
            PlaybackController::new(factory.clone(), test_config(200));
        mount(&mut controller).unwrap();

        factory.sender(0).send(network_error()).await.unwrap();
        settle().await;
        // The retry timer is pending (200 ms); tear down before it fires.
        controller.destroy();
        assert_eq!(controller.state(), SessionState::Idle);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(
            factory.engine(0).start_load_calls.load(Ordering::SeqCst),
            0
        );
        assert_eq!(factory.engine(0).stop_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn remount_stops_the_prior_engine_first() {
        let factory = Arc::new(MockFactory::default());
        let (mut controller, _events) =
            PlaybackController::new(factory.clone(), test_config(10));
        mount(&mut controller).unwrap();
        mount(&mut controller).unwrap();

        assert_eq!(factory.engines.lock().len(), 2);
        assert_eq!(factory.engine(0).stop_calls.load(Ordering::SeqCst), 1);
        assert_eq!(factory.engine(1).stop_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stalled_event_surfaces_and_nudges_loading() {
        let factory = Arc::new(MockFactory::default());
        let (mut controller, mut events) =
            PlaybackController::new(factory.clone(), test_config(10));
        mount(&mut controller).unwrap();

        factory.sender(0).send(EngineEvent::Stalled).await.unwrap();
        assert_eq!(events.recv().await, Some(PlayerEvent::Stalled));
        assert_eq!(controller.state(), SessionState::Stalled);
        settle().await;
        assert_eq!(
            factory.engine(0).start_load_calls.load(Ordering::SeqCst),
            1
        );
    }
}
