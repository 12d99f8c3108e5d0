//! # Gemini Live Channel Tests
//!
//! Run [`GeminiLiveConnector`] against a local WebSocket server that plays the
//! BidiGenerateContent side of the conversation.

use futures_util::{SinkExt, StreamExt};
use nusantara_newsroom::codec::TransportBlob;
use nusantara_newsroom::config::LiveConfig;
use nusantara_newsroom::live::{
    ChannelConnector, ChannelEvent, GeminiLiveConnector, InboundMessage, SessionError,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::WebSocketStream;

type ServerSocket = WebSocketStream<tokio::net::TcpStream>;

fn config_for(addr: SocketAddr) -> LiveConfig {
    LiveConfig {
        endpoint: format!("ws://{}/live", addr),
        setup_timeout: Duration::from_millis(500),
        ..LiveConfig::default()
    }
}

/// Accept one connection and hand the socket to `script`.
async fn serve_once<F, Fut, T>(script: F) -> (SocketAddr, JoinHandle<T>)
where
    F: FnOnce(ServerSocket) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = T> + Send,
    T: Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let socket = tokio_tungstenite::accept_async(stream).await.unwrap();
        script(socket).await
    });
    (addr, server)
}

async fn next_text(socket: &mut ServerSocket) -> Value {
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(&text.to_string()).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("expected a text frame, got {:?}", other),
        }
    }
}

async fn next_event(inbound: &mut tokio::sync::mpsc::Receiver<ChannelEvent>) -> ChannelEvent {
    tokio::time::timeout(Duration::from_secs(2), inbound.recv())
        .await
        .expect("event should arrive")
        .expect("inbound open")
}

#[tokio::test]
async fn test_setup_audio_and_close_round() {
    let (addr, server) = serve_once(|mut socket| async move {
        let setup = next_text(&mut socket).await;
        socket
            .send(Message::Text(json!({ "setupComplete": {} }).to_string().into()))
            .await
            .unwrap();

        let reply = json!({
            "serverContent": {
                "modelTurn": { "parts": [
                    { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAA=" } }
                ]}
            }
        });
        socket
            .send(Message::Text(reply.to_string().into()))
            .await
            .unwrap();

        let input = next_text(&mut socket).await;

        socket
            .close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "session over".to_string().into(),
            }))
            .await
            .unwrap();
        while let Some(Ok(_)) = socket.next().await {}

        (setup, input)
    })
    .await;

    let config = config_for(addr);
    let connector = GeminiLiveConnector::new("test-key".to_string(), &config);
    let channel = connector.open(&config.persona).await.unwrap();
    let (outbound, mut inbound, closer) = channel.into_parts();

    assert_eq!(
        next_event(&mut inbound).await,
        ChannelEvent::Message(InboundMessage::audio(TransportBlob {
            mime_type: "audio/pcm;rate=24000".to_string(),
            data: "AAA=".to_string(),
        }))
    );

    outbound
        .send(TransportBlob::from_pcm_bytes(&[1, 0], 16_000))
        .await
        .unwrap();

    assert_eq!(
        next_event(&mut inbound).await,
        ChannelEvent::Closed(Some("session over".to_string()))
    );

    let (setup, input) = server.await.unwrap();
    assert_eq!(
        setup["setup"]["model"],
        format!("models/{}", config.persona.model)
    );
    assert_eq!(
        setup["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
            ["voiceName"],
        config.persona.voice
    );

    let chunk = &input["realtimeInput"]["mediaChunks"][0];
    assert_eq!(chunk["mimeType"], "audio/pcm;rate=16000");
    assert_eq!(chunk["data"], "AQA=");

    closer.cancel();
}

#[tokio::test]
async fn test_setup_timeout() {
    let (addr, server) = serve_once(|mut socket| async move {
        // Read the setup and never acknowledge it
        let _ = next_text(&mut socket).await;
        while let Some(Ok(_)) = socket.next().await {}
    })
    .await;

    let config = LiveConfig {
        setup_timeout: Duration::from_millis(100),
        ..config_for(addr)
    };
    let connector = GeminiLiveConnector::new("test-key".to_string(), &config);

    let result = connector.open(&config.persona).await;
    assert!(matches!(result, Err(SessionError::SetupTimeout(_))));
    server.abort();
}

#[tokio::test]
async fn test_close_during_setup() {
    let (addr, _server) = serve_once(|mut socket| async move {
        let _ = next_text(&mut socket).await;
        socket
            .close(Some(CloseFrame {
                code: CloseCode::Policy,
                reason: "invalid model".to_string().into(),
            }))
            .await
            .unwrap();
        while let Some(Ok(_)) = socket.next().await {}
    })
    .await;

    let config = config_for(addr);
    let connector = GeminiLiveConnector::new("test-key".to_string(), &config);

    match connector.open(&config.persona).await {
        Err(SessionError::RemoteChannel(reason)) => assert!(reason.contains("invalid model")),
        Err(e) => panic!("expected a remote channel error, got {}", e),
        Ok(_) => panic!("setup should not succeed"),
    }
}

#[tokio::test]
async fn test_dropped_socket_ends_channel() {
    let (addr, server) = serve_once(|mut socket| async move {
        let _ = next_text(&mut socket).await;
        socket
            .send(Message::Text(json!({ "setupComplete": {} }).to_string().into()))
            .await
            .unwrap();
        // Drop the TCP connection without a close handshake
        drop(socket);
    })
    .await;

    let config = config_for(addr);
    let connector = GeminiLiveConnector::new("test-key".to_string(), &config);
    let channel = connector.open(&config.persona).await.unwrap();
    let (_outbound, mut inbound, _closer) = channel.into_parts();

    server.await.unwrap();
    match next_event(&mut inbound).await {
        ChannelEvent::Closed(_) | ChannelEvent::Error(_) => {}
        other => panic!("expected the channel to end, got {:?}", other),
    }
}
