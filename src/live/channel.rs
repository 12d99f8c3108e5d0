use super::SessionError;
use crate::codec::TransportBlob;
use crate::config::Persona;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One server message, reduced to what the session acts on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboundMessage {
    pub audio: Option<TransportBlob>,
    pub text: Option<String>,
    pub turn_complete: bool,
    pub interrupted: bool,
}

impl InboundMessage {
    pub fn audio(blob: TransportBlob) -> Self {
        Self {
            audio: Some(blob),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Message(InboundMessage),
    /// Remote side closed, with its reason if it gave one
    Closed(Option<String>),
    Error(String),
}

/// An open bidirectional channel to the remote agent.
pub struct LiveChannel {
    pub outbound: mpsc::Sender<TransportBlob>,
    pub inbound: mpsc::Receiver<ChannelEvent>,
    shutdown: CancellationToken,
}

impl LiveChannel {
    /// `shutdown` is cancelled by [`LiveChannel::close`]; the transport tasks
    /// behind the channel must stop when it fires.
    pub fn new(
        outbound: mpsc::Sender<TransportBlob>,
        inbound: mpsc::Receiver<ChannelEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            outbound,
            inbound,
            shutdown,
        }
    }

    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn into_parts(
        self,
    ) -> (
        mpsc::Sender<TransportBlob>,
        mpsc::Receiver<ChannelEvent>,
        CancellationToken,
    ) {
        (self.outbound, self.inbound, self.shutdown)
    }

    /// Token that closes this channel when cancelled
    pub fn closer(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

#[async_trait::async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Open a channel configured with `persona`. Resolves once the remote
    /// side has accepted the setup.
    async fn open(&self, persona: &Persona) -> Result<LiveChannel, SessionError>;
}
