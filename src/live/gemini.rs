//! Gemini Live (BidiGenerateContent) over a WebSocket.

use super::{ChannelConnector, ChannelEvent, InboundMessage, LiveChannel, SessionError};
use crate::codec::TransportBlob;
use crate::config::{LiveConfig, Persona};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tokio_util::sync::CancellationToken;
use url::Url;

const INBOUND_QUEUE: usize = 64;

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    pub setup_complete: Option<Value>,
    pub server_content: Option<ServerContent>,
    pub go_away: Option<Value>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub inline_data: Option<TransportBlob>,
    pub text: Option<String>,
}

impl ServerMessage {
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// One message per audio part, in order; a content message without audio
    /// still yields one (audio-less) message so turn markers are not lost.
    pub fn into_inbound(self) -> Vec<InboundMessage> {
        let Some(content) = self.server_content else {
            return Vec::new();
        };

        let parts = content.model_turn.map(|turn| turn.parts).unwrap_or_default();
        let text = parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join("");
        let text = (!text.is_empty()).then_some(text);

        let mut messages: Vec<InboundMessage> = parts
            .into_iter()
            .filter_map(|part| part.inline_data)
            .filter(TransportBlob::is_pcm)
            .map(InboundMessage::audio)
            .collect();

        if messages.is_empty() {
            messages.push(InboundMessage::default());
        }

        if let Some(first) = messages.first_mut() {
            first.text = text;
            first.interrupted = content.interrupted;
        }
        if let Some(last) = messages.last_mut() {
            last.turn_complete = content.turn_complete;
        }
        messages
    }
}

pub fn setup_message(persona: &Persona) -> Value {
    json!({
        "setup": {
            "model": format!("models/{}", persona.model),
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": persona.voice }
                    }
                }
            },
            "systemInstruction": {
                "parts": [{ "text": persona.system_instruction }]
            }
        }
    })
}

pub fn realtime_input_message(blob: &TransportBlob) -> Value {
    json!({
        "realtimeInput": {
            "mediaChunks": [blob]
        }
    })
}

pub struct GeminiLiveConnector {
    api_key: String,
    endpoint: String,
    setup_timeout: Duration,
    outbound_queue: usize,
}

impl GeminiLiveConnector {
    pub fn new(api_key: String, config: &LiveConfig) -> Self {
        Self {
            api_key,
            endpoint: config.endpoint.clone(),
            setup_timeout: config.setup_timeout,
            outbound_queue: config.outbound_queue.max(1),
        }
    }

    fn url(&self) -> Result<Url, SessionError> {
        let mut url = Url::parse(&self.endpoint)?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }
}

#[async_trait::async_trait]
impl ChannelConnector for GeminiLiveConnector {
    async fn open(&self, persona: &Persona) -> Result<LiveChannel, SessionError> {
        let url = self.url()?;
        log::info!("🌐 Connecting to Gemini Live ({})", persona.model);

        let (ws_stream, _) = connect_async(url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        write
            .send(Message::Text(setup_message(persona).to_string().into()))
            .await?;

        let handshake = async {
            while let Some(message) = read.next().await {
                let payload = match message? {
                    Message::Text(text) => text.to_string().into_bytes(),
                    Message::Binary(data) => data.as_slice().to_vec(),
                    Message::Close(frame) => {
                        return Err(SessionError::RemoteChannel(format!(
                            "closed during setup: {}",
                            frame.map(|f| f.reason.to_string()).unwrap_or_default()
                        )));
                    }
                    _ => continue,
                };

                match ServerMessage::parse(&payload) {
                    Ok(message) if message.setup_complete.is_some() => return Ok(()),
                    Ok(_) => log::debug!("🌐 Ignoring pre-setup message"),
                    Err(e) => log::warn!("🌐 Unparseable message during setup: {}", e),
                }
            }
            Err::<(), SessionError>(SessionError::RemoteChannel(
                "connection ended during setup".to_string(),
            ))
        };

        tokio::time::timeout(self.setup_timeout, handshake)
            .await
            .map_err(|_| SessionError::SetupTimeout(self.setup_timeout))??;

        log::info!("🌐 Gemini Live setup complete");

        let shutdown = CancellationToken::new();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<TransportBlob>(self.outbound_queue);
        let (events_tx, events_rx) = mpsc::channel::<ChannelEvent>(INBOUND_QUEUE);

        let writer_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut sent = 0usize;
            loop {
                tokio::select! {
                    biased;
                    _ = writer_shutdown.cancelled() => break,
                    blob = outbound_rx.recv() => match blob {
                        Some(blob) => {
                            let message = realtime_input_message(&blob).to_string();
                            if let Err(e) = write.send(Message::Text(message.into())).await {
                                log::warn!("🌐 Failed to send audio chunk {}: {}", sent + 1, e);
                                break;
                            }
                            sent += 1;
                        }
                        None => break,
                    }
                }
            }
            log::debug!("🌐 Writer exiting after {} chunks", sent);
            let _ = write.close().await;
        });

        let reader_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let terminal = loop {
                tokio::select! {
                    biased;
                    _ = reader_shutdown.cancelled() => return,
                    message = read.next() => {
                        let payload = match message {
                            Some(Ok(Message::Text(text))) => text.to_string().into_bytes(),
                            Some(Ok(Message::Binary(data))) => data.as_slice().to_vec(),
                            Some(Ok(Message::Close(frame))) => {
                                log::info!("🌐 Server closed connection: {:?}", frame);
                                break ChannelEvent::Closed(frame.map(|f| f.reason.to_string()));
                            }
                            Some(Ok(_)) => continue,
                            Some(Err(e)) => {
                                log::error!("🌐 WebSocket error: {}", e);
                                break ChannelEvent::Error(e.to_string());
                            }
                            None => break ChannelEvent::Closed(None),
                        };

                        let server_message = match ServerMessage::parse(&payload) {
                            Ok(message) => message,
                            Err(e) => {
                                log::warn!("🌐 Failed to parse server message: {}", e);
                                continue;
                            }
                        };

                        if server_message.go_away.is_some() {
                            log::warn!("🌐 Server announced it will close the connection soon");
                        }

                        for inbound in server_message.into_inbound() {
                            if events_tx.send(ChannelEvent::Message(inbound)).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            };
            let _ = events_tx.send(terminal).await;
        });

        Ok(LiveChannel::new(outbound_tx, events_rx, shutdown))
    }
}
