//! Live voice session: microphone out, model speech in.
//!
//! [`LiveSessionController::connect`] acquires the output clock and the
//! microphone, opens the remote channel and wires both directions:
//!
//! - outbound: microphone → [`CapturePipeline`] → channel
//! - inbound: channel → decode → visualize → [`PlaybackScheduler`]
//!
//! Every way a session can end (explicit disconnect, remote close, remote
//! error, dropping the handle) goes through the same one-shot teardown, which
//! releases everything and reports a [`CloseReason`] exactly once.

mod channel;
pub mod gemini;

pub use channel::{ChannelConnector, ChannelEvent, InboundMessage, LiveChannel};
pub use gemini::GeminiLiveConnector;

use crate::audio_capture::{
    CaptureConfig, CaptureError, CapturePipeline, CaptureStats, Microphone,
};
use crate::codec::{
    decode_to_sample_buffer, decode_transport_blob, CodecError, SampleBuffer, TransportBlob,
    SYNTHESIS_SAMPLE_RATE,
};
use crate::config::LiveConfig;
use crate::devices::AudioBackend;
use crate::playback::{OutputClock, PlaybackError, PlaybackScheduler};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("A live session is already connecting or open")]
    AlreadyActive,
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),
    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),
    #[error("Remote channel error: {0}")]
    RemoteChannel(String),
    #[error("Remote did not acknowledge setup within {0:?}")]
    SetupTimeout(Duration),
    #[error("WebSocket connection failed: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("Response parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// `disconnect()` was called or the handle was dropped
    Disconnected,
    RemoteClosed(Option<String>),
    RemoteError(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Disconnected => write!(f, "disconnected"),
            CloseReason::RemoteClosed(Some(reason)) => write!(f, "remote closed: {}", reason),
            CloseReason::RemoteClosed(None) => write!(f, "remote closed"),
            CloseReason::RemoteError(e) => write!(f, "remote error: {}", e),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub capture: CaptureStats,
    pub buffers_played: usize,
    pub messages_without_audio: usize,
    pub decode_failures: usize,
}

type VisualizeFn = Arc<dyn Fn(&SampleBuffer) + Send + Sync>;
type CloseFn = Box<dyn FnOnce(CloseReason) + Send>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct LiveSessionController {
    config: LiveConfig,
    backend: Arc<dyn AudioBackend>,
    connector: Arc<dyn ChannelConnector>,
    state: Arc<Mutex<SessionState>>,
}

impl LiveSessionController {
    pub fn new(
        config: LiveConfig,
        backend: Arc<dyn AudioBackend>,
        connector: Arc<dyn ChannelConnector>,
    ) -> Self {
        Self {
            config,
            backend,
            connector,
            state: Arc::new(Mutex::new(SessionState::Idle)),
        }
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub fn config(&self) -> &LiveConfig {
        &self.config
    }

    /// Open a session. `on_visualize` sees every decoded buffer before it is
    /// scheduled; `on_close` runs exactly once when the session ends.
    pub async fn connect<V, C>(&self, on_visualize: V, on_close: C) -> Result<SessionHandle, SessionError>
    where
        V: Fn(&SampleBuffer) + Send + Sync + 'static,
        C: FnOnce(CloseReason) + Send + 'static,
    {
        {
            let mut state = lock(&self.state);
            if matches!(*state, SessionState::Connecting | SessionState::Open) {
                log::warn!("🎙️ Connect rejected: session is {:?}", *state);
                return Err(SessionError::AlreadyActive);
            }
            *state = SessionState::Connecting;
        }
        let mut guard = ConnectGuard::new(Arc::clone(&self.state));

        log::info!(
            "🎙️ Connecting live session (model: {}, voice: {})",
            self.config.persona.model,
            self.config.persona.voice
        );

        match self.setup(Arc::new(on_visualize), Box::new(on_close)).await {
            Ok(handle) => {
                guard.disarm();
                Ok(handle)
            }
            Err(e) => {
                log::error!("🎙️ Live session setup failed: {}", e);
                Err(e)
            }
        }
    }

    async fn setup(&self, on_visualize: VisualizeFn, on_close: CloseFn) -> Result<SessionHandle, SessionError> {
        // Device opens wait on the audio threads, so they run off the executor
        let backend = Arc::clone(&self.backend);
        let output = tokio::task::spawn_blocking(move || backend.open_output(SYNTHESIS_SAMPLE_RATE))
            .await
            .map_err(|e| PlaybackError::Device(format!("Output open task failed: {}", e)))??;

        let capture_config = CaptureConfig {
            frame_size: self.config.frame_size,
            ..CaptureConfig::default()
        };
        let backend = Arc::clone(&self.backend);
        let microphone_config = capture_config.clone();
        let opened = tokio::task::spawn_blocking(move || backend.open_microphone(&microphone_config))
            .await
            .unwrap_or_else(|e| {
                Err(CaptureError::MicrophoneUnavailable(format!(
                    "Microphone open task failed: {}",
                    e
                )))
            });
        let microphone = match opened {
            Ok(microphone) => microphone,
            Err(e) => {
                release(Some(output), None).await;
                return Err(e.into());
            }
        };

        let channel = match self.connector.open(&self.config.persona).await {
            Ok(channel) => channel,
            Err(e) => {
                release(Some(output), Some(microphone)).await;
                return Err(e);
            }
        };

        let (outbound, inbound, channel_closer) = channel.into_parts();

        let capture = match CapturePipeline::activate(microphone, &capture_config, outbound) {
            Ok(capture) => capture,
            Err(e) => {
                channel_closer.cancel();
                release(Some(output), None).await;
                return Err(e.into());
            }
        };

        let scheduler = PlaybackScheduler::new(output);
        let shared = Arc::new(SessionShared {
            state: Arc::clone(&self.state),
            capture: Mutex::new(Some(capture)),
            final_capture_stats: Mutex::new(CaptureStats::default()),
            channel_closer,
            shutdown: CancellationToken::new(),
            finished: CancellationToken::new(),
            on_close: Mutex::new(Some(on_close)),
            torn_down: AtomicBool::new(false),
            buffers_played: AtomicUsize::new(0),
            messages_without_audio: AtomicUsize::new(0),
            decode_failures: AtomicUsize::new(0),
        });

        *lock(&self.state) = SessionState::Open;
        log::info!("🎙️ Live session open");

        let inbound_task = tokio::spawn(run_inbound(
            Arc::clone(&shared),
            inbound,
            scheduler,
            on_visualize,
        ));

        Ok(SessionHandle {
            shared,
            inbound_task: Mutex::new(Some(inbound_task)),
        })
    }
}

/// Puts the controller back to `Closed` if `connect` is abandoned or fails
/// before the session opens.
struct ConnectGuard {
    state: Arc<Mutex<SessionState>>,
    armed: bool,
}

impl ConnectGuard {
    fn new(state: Arc<Mutex<SessionState>>) -> Self {
        Self { state, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectGuard {
    fn drop(&mut self) {
        if self.armed {
            *lock(&self.state) = SessionState::Closed;
        }
    }
}

/// Close devices acquired by a setup that did not complete.
async fn release(output: Option<Box<dyn OutputClock>>, microphone: Option<Box<dyn Microphone>>) {
    let released = tokio::task::spawn_blocking(move || {
        if let Some(mut microphone) = microphone {
            microphone.stop();
        }
        if let Some(mut output) = output {
            output.close();
        }
    })
    .await;
    if let Err(e) = released {
        log::error!("🎙️ Failed to release audio devices: {}", e);
    }
}

struct SessionShared {
    state: Arc<Mutex<SessionState>>,
    capture: Mutex<Option<CapturePipeline>>,
    final_capture_stats: Mutex<CaptureStats>,
    channel_closer: CancellationToken,
    shutdown: CancellationToken,
    /// Cancelled once teardown has fully completed
    finished: CancellationToken,
    on_close: Mutex<Option<CloseFn>>,
    torn_down: AtomicBool,
    buffers_played: AtomicUsize,
    messages_without_audio: AtomicUsize,
    decode_failures: AtomicUsize,
}

impl SessionShared {
    fn teardown(&self, reason: CloseReason) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        log::info!("🎙️ Tearing down live session ({})", reason);

        self.shutdown.cancel();
        self.channel_closer.cancel();

        if let Some(mut capture) = lock(&self.capture).take() {
            *lock(&self.final_capture_stats) = capture.stop();
        }

        *lock(&self.state) = SessionState::Closed;

        let on_close = lock(&self.on_close).take();
        if let Some(on_close) = on_close {
            on_close(reason);
        }
        self.finished.cancel();
    }

    /// Run [`SessionShared::teardown`] on the blocking pool, since stopping
    /// the microphone joins its capture thread.
    async fn teardown_blocking(self: &Arc<Self>, reason: CloseReason) {
        if self.is_torn_down() {
            self.finished.cancelled().await;
            return;
        }
        let shared = Arc::clone(self);
        if let Err(e) = tokio::task::spawn_blocking(move || shared.teardown(reason)).await {
            log::error!("🎙️ Teardown task failed: {}", e);
        }
        self.finished.cancelled().await;
    }

    fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    fn stats(&self) -> SessionStats {
        let capture = match lock(&self.capture).as_ref() {
            Some(capture) => capture.stats(),
            None => *lock(&self.final_capture_stats),
        };
        SessionStats {
            capture,
            buffers_played: self.buffers_played.load(Ordering::Relaxed),
            messages_without_audio: self.messages_without_audio.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
        }
    }

    fn handle_message(
        &self,
        message: InboundMessage,
        scheduler: &mut PlaybackScheduler,
        on_visualize: &(dyn Fn(&SampleBuffer) + Send + Sync),
    ) {
        if message.interrupted {
            log::debug!("🎙️ Model turn interrupted");
        }

        let Some(blob) = message.audio else {
            self.messages_without_audio.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let buffer = match decode_inbound(&blob) {
            Ok(buffer) => buffer,
            Err(e) => {
                let failures = self.decode_failures.fetch_add(1, Ordering::Relaxed) + 1;
                log::warn!("⚠️  Dropping undecodable audio message ({} so far): {}", failures, e);
                return;
            }
        };

        on_visualize(&buffer);

        match scheduler.enqueue(buffer) {
            Ok(_) => {
                self.buffers_played.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => log::warn!("⚠️  Failed to schedule audio buffer: {}", e),
        }
    }
}

fn decode_inbound(blob: &TransportBlob) -> Result<SampleBuffer, CodecError> {
    let bytes = decode_transport_blob(blob)?;
    let sample_rate = blob.sample_rate().unwrap_or(SYNTHESIS_SAMPLE_RATE);
    decode_to_sample_buffer(&bytes, sample_rate, 1)
}

async fn run_inbound(
    shared: Arc<SessionShared>,
    mut inbound: mpsc::Receiver<ChannelEvent>,
    mut scheduler: PlaybackScheduler,
    on_visualize: VisualizeFn,
) {
    let remote_end = loop {
        tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break None,
            event = inbound.recv() => match event {
                Some(ChannelEvent::Message(message)) => {
                    shared.handle_message(message, &mut scheduler, on_visualize.as_ref());
                }
                Some(ChannelEvent::Closed(reason)) => break Some(CloseReason::RemoteClosed(reason)),
                Some(ChannelEvent::Error(e)) => break Some(CloseReason::RemoteError(e)),
                None => break Some(CloseReason::RemoteClosed(None)),
            }
        }
    };

    // Closing the output clock joins its audio thread
    if let Err(e) = tokio::task::spawn_blocking(move || scheduler.close()).await {
        log::error!("🔈 Failed to close playback: {}", e);
    }

    if let Some(reason) = remote_end {
        log::info!("🎙️ Remote ended the session: {}", reason);
        shared.teardown_blocking(reason).await;
    }
}

/// Handle to an open live session. Dropping it tears the session down.
pub struct SessionHandle {
    shared: Arc<SessionShared>,
    inbound_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionHandle {
    /// Close the channel and release every audio resource. Later calls, or
    /// calls after the remote already closed, only wait for the inbound task.
    pub async fn disconnect(&self) {
        self.shared.teardown_blocking(CloseReason::Disconnected).await;

        let task = lock(&self.inbound_task).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    log::error!("🎙️ Inbound task failed: {}", e);
                }
            }
        }
    }

    /// Resolves once the session has ended for any reason and its resources
    /// have been released.
    pub async fn closed(&self) {
        self.shared.finished.cancelled().await;
    }

    pub fn state(&self) -> SessionState {
        if self.shared.is_torn_down() {
            SessionState::Closed
        } else {
            SessionState::Open
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    pub fn stats(&self) -> SessionStats {
        self.shared.stats()
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.shared.teardown(CloseReason::Disconnected);
    }
}
