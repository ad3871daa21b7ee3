//! WebSocket voice transport against a local tungstenite server

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};

use what3words::error::{Error, ErrorCode};
use what3words::voice::{VoiceEvent, VoiceParams, VoiceTransport, WebSocketVoiceTransport};
use what3words::{AutosuggestOptions, Countries};

const WAIT: Duration = Duration::from_secs(5);

/// Accept one connection, reporting the request URI
async fn accept_one(
    listener: TcpListener,
    uri_tx: oneshot::Sender<String>,
) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    let callback = move |request: &Request, response: Response| {
        let _ = uri_tx.send(request.uri().to_string());
        Ok(response)
    };
    accept_hdr_async(stream, callback).await.unwrap()
}

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> serde_json::Value {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

async fn bind() -> (TcpListener, WebSocketVoiceTransport) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}/v1", listener.local_addr().unwrap());
    let transport = WebSocketVoiceTransport::with_endpoint("test-key", &endpoint).unwrap();
    (listener, transport)
}

#[tokio::test]
async fn test_full_recognition_exchange() {
    let (listener, transport) = bind().await;
    let (uri_tx, uri_rx) = oneshot::channel();

    let server = tokio::spawn(async move {
        let mut ws = accept_one(listener, uri_tx).await;

        let start = next_text(&mut ws).await;
        assert_eq!(start["message"], "StartRecognition");
        assert_eq!(start["audio_format"]["encoding"], "pcm_s16le");
        assert_eq!(start["audio_format"]["sample_rate"], 16000);

        ws.send(Message::Text(
            r#"{"message":"RecognitionStarted","id":"abc"}"#.to_string().into(),
        ))
        .await
        .unwrap();

        let audio = loop {
            match ws.next().await {
                Some(Ok(Message::Binary(data))) => break data.to_vec(),
                Some(Ok(_)) => continue,
                other => panic!("expected audio, got {other:?}"),
            }
        };
        assert_eq!(audio, vec![1, 0, 2, 0]);

        let suggestions = r#"{"message":"Suggestions","suggestions":[
            {"words":"filled.count.soap","country":"GB","nearestPlace":"Bayswater, London","rank":1,"language":"en"}
        ]}"#;
        ws.send(Message::Text(suggestions.to_string().into()))
            .await
            .unwrap();

        // the client hangs up after a terminal message
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(_)) => break,
            }
        }
    });

    let options = AutosuggestOptions::builder()
        .n_results(3)
        .clip_to_country(Countries::new(["gb"]).unwrap())
        .build()
        .unwrap();
    let params = VoiceParams::new("en", options, 16000);
    let mut channel = timeout(WAIT, transport.open(&params))
        .await
        .unwrap()
        .unwrap();

    let uri = uri_rx.await.unwrap();
    assert!(uri.starts_with("/v1/autosuggest?"));
    assert!(uri.contains("voice-language=en"));
    assert!(uri.contains("n-results=3"));
    assert!(uri.contains("clip-to-country=GB"));
    assert!(uri.ends_with("key=test-key"));

    let event = timeout(WAIT, channel.next_event()).await.unwrap();
    assert!(matches!(event, Some(VoiceEvent::RecognitionStarted)));

    channel.audio_sender().send(vec![1, 0, 2, 0]).unwrap();

    match timeout(WAIT, channel.next_event()).await.unwrap() {
        Some(VoiceEvent::Suggestions(list)) => {
            assert_eq!(list.len(), 1);
            assert_eq!(list[0].nearest_place, "Bayswater, London");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    timeout(WAIT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_close_reason_becomes_api_error() {
    let (listener, transport) = bind().await;
    let (uri_tx, _uri_rx) = oneshot::channel();

    let server = tokio::spawn(async move {
        let mut ws = accept_one(listener, uri_tx).await;
        let _start = next_text(&mut ws).await;
        let reason = r#"{"code":"InvalidKey","message":"Authentication failed"}"#;
        let _ = ws
            .close(Some(CloseFrame {
                code: CloseCode::Policy,
                reason: reason.to_string().into(),
            }))
            .await;
        while let Some(Ok(_)) = ws.next().await {}
    });

    let params = VoiceParams::new("en", AutosuggestOptions::default(), 16000);
    let mut channel = timeout(WAIT, transport.open(&params))
        .await
        .unwrap()
        .unwrap();

    match timeout(WAIT, channel.next_event()).await.unwrap() {
        Some(VoiceEvent::Failed(Error::Api(err))) => {
            assert_eq!(err.code, ErrorCode::InvalidKey);
            assert_eq!(err.message, "Authentication failed");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    timeout(WAIT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_streaming_error_message() {
    let (listener, transport) = bind().await;
    let (uri_tx, _uri_rx) = oneshot::channel();

    let server = tokio::spawn(async move {
        let mut ws = accept_one(listener, uri_tx).await;
        let _start = next_text(&mut ws).await;
        let error = r#"{"message":"Error","type":"invalid_audio_type","reason":"unsupported sample rate"}"#;
        ws.send(Message::Text(error.to_string().into()))
            .await
            .unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let params = VoiceParams::new("en", AutosuggestOptions::default(), 16000);
    let mut channel = timeout(WAIT, transport.open(&params))
        .await
        .unwrap()
        .unwrap();

    match timeout(WAIT, channel.next_event()).await.unwrap() {
        Some(VoiceEvent::Failed(Error::Api(err))) => {
            assert_eq!(err.code, ErrorCode::StreamingError);
            assert_eq!(err.message, "invalid_audio_type - unsupported sample rate");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    timeout(WAIT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let (listener, transport) = bind().await;
    drop(listener);

    let params = VoiceParams::new("en", AutosuggestOptions::default(), 16000);
    let result = timeout(WAIT, transport.open(&params)).await.unwrap();
    assert!(matches!(result, Err(Error::Transport(_))));
}

#[tokio::test]
async fn test_unresponsive_server_times_out() {
    let (listener, transport) = bind().await;
    let transport = transport.with_connect_timeout(Duration::from_millis(200));

    // accept the TCP connection but never answer the upgrade
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        drop(stream);
    });

    let params = VoiceParams::new("en", AutosuggestOptions::default(), 16000);
    match timeout(WAIT, transport.open(&params)).await.unwrap() {
        Err(Error::Transport(message)) => assert!(message.contains("timed out")),
        Err(other) => panic!("unexpected error: {other:?}"),
        Ok(_) => panic!("connection should not open"),
    }
    server.abort();
}
