// Push listener: one subscription per session to the poll's question stream.
//
// The listener only frames. Each raw payload is forwarded, in arrival order,
// to the session through a bounded channel; decoding and deduplication happen
// on the session side. A dropped connection ends the listener with a single
// `ListenerEvent::Lost`; there is no reconnect.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{BoxStream, Stream};
use futures_util::StreamExt;
use livepoll_core::PollId;
use reqwest::Url;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::api::endpoint;

const QUESTION_STREAM_PATH: &str = "answers/listen/questions";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListenerError {
    #[error("invalid question stream url: {0}")]
    InvalidUrl(String),

    #[error("failed to connect to question stream: {0}")]
    Connect(String),

    #[error("question stream closed")]
    Closed,

    #[error("question stream error: {0}")]
    Stream(String),
}

/// Events the listener hands to its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    /// One raw question payload, exactly as received.
    Payload(String),
    /// The subscription failed; no further events follow.
    Lost(ListenerError),
}

pub type PayloadStream = BoxStream<'static, Result<String, ListenerError>>;

/// A long-lived subscription to the questions pushed for a poll.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    async fn subscribe(&self, poll_id: PollId) -> Result<PayloadStream, ListenerError>;
}

// ---------------------------------------------------------------------------
// WebSocket source
// ---------------------------------------------------------------------------

/// Subscribes to `{base}/answers/listen/questions?poll_id=<id>` over WebSocket.
pub struct WebSocketSource {
    base: Url,
}

impl WebSocketSource {
    pub fn new(base: Url) -> Self {
        WebSocketSource { base }
    }

    pub fn stream_url(&self, poll_id: PollId) -> Result<Url, ListenerError> {
        endpoint(&self.base, QUESTION_STREAM_PATH, poll_id).map_err(ListenerError::InvalidUrl)
    }
}

#[async_trait]
impl QuestionSource for WebSocketSource {
    async fn subscribe(&self, poll_id: PollId) -> Result<PayloadStream, ListenerError> {
        let url = self.stream_url(poll_id)?;
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ListenerError::Connect(e.to_string()))?;
        info!("Subscribed to question stream for poll {poll_id}");
        Ok(payloads(ws_stream).boxed())
    }
}

/// Turn raw WebSocket messages into question payloads.
///
/// Text frames pass through; binary frames pass through when they are valid
/// UTF-8. Control frames are skipped. A close frame or transport error is
/// yielded as an error, which ends the subscription.
pub fn payloads<St>(stream: St) -> impl Stream<Item = Result<String, ListenerError>>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>,
{
    stream.filter_map(|msg_result| async move {
        match msg_result {
            Ok(Message::Text(text)) => Some(Ok(text.to_string())),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => Some(Ok(text)),
                Err(_) => {
                    warn!("Dropping non-UTF-8 binary frame ({} bytes)", bytes.len());
                    None
                }
            },
            Ok(Message::Close(_)) => Some(Err(ListenerError::Closed)),
            Err(e) => Some(Err(ListenerError::Stream(e.to_string()))),
            // Ping, Pong, Frame
            Ok(_) => None,
        }
    })
}

/// Forward payloads from `stream` to `tx`, one at a time and in order.
///
/// Waits for channel capacity rather than dropping payloads. Returns `Ok`
/// when the receiving session is gone, and an error when the stream fails or
/// ends.
pub async fn pump<St>(mut stream: St, tx: &mpsc::Sender<ListenerEvent>) -> Result<(), ListenerError>
where
    St: Stream<Item = Result<String, ListenerError>> + Unpin,
{
    while let Some(item) = stream.next().await {
        let payload = item?;
        if tx.send(ListenerEvent::Payload(payload)).await.is_err() {
            debug!("Session receiver dropped, stopping listener");
            return Ok(());
        }
    }
    Err(ListenerError::Closed)
}

// ---------------------------------------------------------------------------
// Listener task
// ---------------------------------------------------------------------------

/// Handle to a running listener task.
pub struct ListenerHandle {
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Subscribe to `poll_id` on `source` and forward payloads to `tx` from a
    /// background task.
    pub fn spawn(
        source: Arc<dyn QuestionSource>,
        poll_id: PollId,
        tx: mpsc::Sender<ListenerEvent>,
    ) -> Self {
        let task = tokio::spawn(async move {
            let result = match source.subscribe(poll_id).await {
                Ok(stream) => pump(stream, &tx).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!("Question listener for poll {poll_id} stopped: {e}");
                let _ = tx.send(ListenerEvent::Lost(e)).await;
            }
        });
        ListenerHandle { task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the task and wait until it has stopped. Cancellation itself is
    /// not an error.
    pub async fn shutdown(self) {
        self.task.abort();
        match self.task.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!("Question listener task failed: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Error as WsError;

    /// Helper: create a stream of Message results from a vec.
    fn mock_stream(
        messages: Vec<Result<Message, WsError>>,
    ) -> impl Stream<Item = Result<Message, WsError>> + Unpin {
        stream::iter(messages)
    }

    async fn collect_payloads(
        messages: Vec<Result<Message, WsError>>,
    ) -> Vec<Result<String, ListenerError>> {
        payloads(mock_stream(messages)).collect().await
    }

    /// Source handing out one prepared stream.
    struct OneShotSource(Mutex<Option<PayloadStream>>);

    impl OneShotSource {
        fn new(stream: PayloadStream) -> Arc<Self> {
            Arc::new(OneShotSource(Mutex::new(Some(stream))))
        }
    }

    #[async_trait]
    impl QuestionSource for OneShotSource {
        async fn subscribe(&self, _poll_id: PollId) -> Result<PayloadStream, ListenerError> {
            self.0
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| ListenerError::Connect("already subscribed".into()))
        }
    }

    #[tokio::test]
    async fn text_frames_become_payloads() {
        let out = collect_payloads(vec![Ok(Message::Text("hello".into()))]).await;
        assert_eq!(out, vec![Ok("hello".to_string())]);
    }

    #[tokio::test]
    async fn utf8_binary_frames_become_payloads() {
        let out = collect_payloads(vec![
            Ok(Message::Binary(b"{\"a\":1}".to_vec().into())),
            Ok(Message::Binary(vec![0xff, 0xfe].into())),
        ])
        .await;
        assert_eq!(out, vec![Ok("{\"a\":1}".to_string())]);
    }

    #[tokio::test]
    async fn control_frames_are_ignored() {
        let out = collect_payloads(vec![
            Ok(Message::Ping(vec![].into())),
            Ok(Message::Pong(vec![].into())),
            Ok(Message::Text("after_ignored".into())),
        ])
        .await;
        assert_eq!(out, vec![Ok("after_ignored".to_string())]);
    }

    #[tokio::test]
    async fn close_and_errors_are_terminal() {
        let out = collect_payloads(vec![
            Ok(Message::Close(None)),
            Err(WsError::ConnectionClosed),
        ])
        .await;
        assert_eq!(out[0], Err(ListenerError::Closed));
        assert!(matches!(out[1], Err(ListenerError::Stream(_))));
    }

    #[tokio::test]
    async fn pump_forwards_in_order_then_reports_end_of_stream() {
        let (tx, mut rx) = mpsc::channel(8);
        let items = vec![
            Ok("first".to_string()),
            Ok("second".to_string()),
            Ok("third".to_string()),
        ];

        let result = pump(stream::iter(items), &tx).await;
        assert_eq!(result, Err(ListenerError::Closed));

        assert_eq!(rx.recv().await, Some(ListenerEvent::Payload("first".into())));
        assert_eq!(rx.recv().await, Some(ListenerEvent::Payload("second".into())));
        assert_eq!(rx.recv().await, Some(ListenerEvent::Payload("third".into())));
    }

    #[tokio::test]
    async fn pump_stops_at_first_error() {
        let (tx, mut rx) = mpsc::channel(8);
        let items = vec![
            Ok("before_error".to_string()),
            Err(ListenerError::Stream("reset".into())),
            Ok("after_error_should_not_appear".to_string()),
        ];

        let result = pump(stream::iter(items), &tx).await;
        assert_eq!(result, Err(ListenerError::Stream("reset".into())));
        assert_eq!(rx.recv().await, Some(ListenerEvent::Payload("before_error".into())));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn pump_returns_ok_when_session_gone() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let result = pump(stream::iter(vec![Ok("orphan".to_string())]), &tx).await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn spawned_listener_reports_lost_connection_once() {
        let source = OneShotSource::new(stream::iter(vec![Ok("q1".to_string())]).boxed());
        let (tx, mut rx) = mpsc::channel(8);

        let handle = ListenerHandle::spawn(source, PollId(1), tx);

        assert_eq!(rx.recv().await, Some(ListenerEvent::Payload("q1".into())));
        assert_eq!(rx.recv().await, Some(ListenerEvent::Lost(ListenerError::Closed)));
        assert_eq!(rx.recv().await, None);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_cancels_idle_listener_promptly() {
        let idle = stream::iter(vec![Ok("q1".to_string())]).chain(stream::pending());
        let source = OneShotSource::new(idle.boxed());
        let (tx, mut rx) = mpsc::channel(8);

        let handle = ListenerHandle::spawn(source, PollId(1), tx);
        assert_eq!(rx.recv().await, Some(ListenerEvent::Payload("q1".into())));

        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .expect("shutdown should not hang");

        // The sender went away with the task, and no Lost event was sent.
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn stream_url_appends_path_and_poll_id() {
        let source = WebSocketSource::new(Url::parse("ws://localhost:8000/api").unwrap());
        assert_eq!(
            source.stream_url(PollId(12)).unwrap().as_str(),
            "ws://localhost:8000/api/answers/listen/questions?poll_id=12"
        );
    }
}
