//! Tests for streamed conversation calls and their reservations.

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tollgate::{
    AsyncConversationStreamExecutor, AsyncRateLimitedClient, ConversationAction,
    ConversationEvent, ConversationRequest, ConversationStreamExecutor, EventIter, EventStream,
    LimiterConfig, Message, RateLimitedClient, RemoteError, RemoteErrorKind, TokenEstimator,
    TokenUsage,
};

type Events = Vec<Result<ConversationEvent, RemoteError>>;

#[derive(Debug, Default)]
struct StreamingExecutor {
    opens: Mutex<VecDeque<Result<Events, RemoteError>>>,
    actions: Mutex<Vec<ConversationAction>>,
}

impl StreamingExecutor {
    fn with_opens(opens: Vec<Result<Events, RemoteError>>) -> Self {
        Self {
            opens: Mutex::new(opens.into()),
            ..Self::default()
        }
    }

    fn with_events(events: Events) -> Self {
        Self::with_opens(vec![Ok(events)])
    }

    fn actions(&self) -> Vec<ConversationAction> {
        self.actions.lock().clone()
    }

    fn open(&self, action: &ConversationAction) -> Result<Events, RemoteError> {
        self.actions.lock().push(action.clone());
        let next = self.opens.lock().pop_front();
        next.unwrap_or_else(|| Ok(complete()))
    }
}

impl ConversationStreamExecutor for StreamingExecutor {
    fn send_stream(
        &self,
        action: &ConversationAction,
        _request: &ConversationRequest,
    ) -> Result<EventIter, RemoteError> {
        self.open(action)
            .map(|events| Box::new(events.into_iter()) as EventIter)
    }
}

#[async_trait]
impl AsyncConversationStreamExecutor for StreamingExecutor {
    async fn send_stream(
        &self,
        action: &ConversationAction,
        _request: &ConversationRequest,
    ) -> Result<EventStream, RemoteError> {
        self.open(action)
            .map(|events| Box::pin(futures_util::stream::iter(events)) as EventStream)
    }
}

fn started() -> Result<ConversationEvent, RemoteError> {
    Ok(ConversationEvent::Started {
        conversation_id: "conv-1".to_string(),
    })
}

fn delta(content: &str) -> Result<ConversationEvent, RemoteError> {
    Ok(ConversationEvent::OutputDelta {
        content: content.to_string(),
    })
}

fn complete() -> Events {
    vec![
        started(),
        delta("Hel"),
        delta("lo"),
        Ok(ConversationEvent::Done {
            usage: TokenUsage::new(20, 10),
        }),
    ]
}

fn network_failure() -> RemoteError {
    RemoteError::new(RemoteErrorKind::Network("connection reset".to_string()))
}

fn request() -> ConversationRequest {
    // heuristic estimate: 8 for the prompt plus 50 for the reply
    ConversationRequest::new(vec![Message::user("abcdefgh")])
}

// 60 tokens per minute refills one token per second, so blocking balances stay
// within a token of the expected value for the length of a test.
fn blocking_config() -> LimiterConfig {
    LimiterConfig {
        requests_per_second: 10.0,
        tokens_per_minute: 60,
        base_delay: 0.01,
        max_delay: 0.04,
        ..LimiterConfig::default()
    }
}

fn blocking_client(executor: StreamingExecutor) -> RateLimitedClient<StreamingExecutor> {
    RateLimitedClient::with_estimator(&blocking_config(), executor, TokenEstimator::heuristic())
        .unwrap()
}

fn tokens_available(client: &RateLimitedClient<StreamingExecutor>) -> f64 {
    client.limiter().snapshot().tokens.available
}

fn assert_near(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1.0,
        "expected about {} tokens, found {}",
        expected,
        actual
    );
}

#[test]
fn test_stream_settles_on_done_event() {
    let client = blocking_client(StreamingExecutor::default());

    let mut events = client.start_stream(&request()).unwrap();
    assert!(!events.is_settled());
    assert_near(tokens_available(&client), 2.0);

    let mut text = String::new();
    for event in events.by_ref() {
        if let ConversationEvent::OutputDelta { content } = event.unwrap() {
            text.push_str(&content);
        }
    }

    assert_eq!(text, "Hello");
    assert!(events.is_settled());
    // reserved 58, used 30
    assert_near(tokens_available(&client), 30.0);
}

#[test]
fn test_abandoned_stream_is_released() {
    let client = blocking_client(StreamingExecutor::default());

    let mut events = client.start_stream(&request()).unwrap();
    assert!(events.next().unwrap().is_ok());
    drop(events);

    assert_near(tokens_available(&client), 60.0);
}

#[test]
fn test_failed_stream_is_released() {
    let client = blocking_client(StreamingExecutor::with_events(vec![
        started(),
        Err(network_failure()),
    ]));

    let mut events = client.append_stream("conv-1", &request()).unwrap();
    assert!(events.next().unwrap().is_ok());
    let err = events.next().unwrap().unwrap_err();

    assert!(matches!(err.kind, RemoteErrorKind::Network(_)));
    assert!(events.is_settled());
    assert_near(tokens_available(&client), 60.0);
}

#[test]
fn test_stream_without_usage_is_released() {
    let client = blocking_client(StreamingExecutor::with_events(vec![started(), delta("Hi")]));

    let mut events = client.start_stream(&request()).unwrap();
    assert_eq!(events.by_ref().count(), 2);

    assert!(events.is_settled());
    assert_near(tokens_available(&client), 60.0);
}

#[test]
fn test_rejected_stream_open_is_retried() {
    let client = blocking_client(StreamingExecutor::with_opens(vec![
        Err(RemoteError::rate_limited(None)),
        Ok(complete()),
    ]));

    let events = client.restart_stream("conv-1", "entry-3", &request()).unwrap();
    assert_eq!(events.count(), 4);

    let actions = client.executor().actions();
    assert_eq!(actions.len(), 2);
    assert!(matches!(&actions[1], ConversationAction::Restart { from_entry_id, .. }
        if from_entry_id == "entry-3"));
}

#[test]
fn test_stream_open_failure_is_not_retried() {
    let client = blocking_client(StreamingExecutor::with_opens(vec![Err(network_failure())]));

    let err = client.start_stream(&request()).unwrap_err();

    assert!(err.as_remote().is_some());
    assert_eq!(client.executor().actions().len(), 1);
    assert_near(tokens_available(&client), 60.0);
}

fn async_client(executor: StreamingExecutor) -> AsyncRateLimitedClient<StreamingExecutor> {
    let config = LimiterConfig {
        requests_per_second: 1.0,
        tokens_per_minute: 6_000,
        ..LimiterConfig::default()
    };
    AsyncRateLimitedClient::with_estimator(&config, executor, TokenEstimator::heuristic())
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_async_stream_settles_on_done_event() {
    let client = async_client(StreamingExecutor::default());

    let events = client.start_stream(&request()).await.unwrap();
    assert_eq!(client.limiter().snapshot().tokens.available, 5_942.0);

    let events: Vec<_> = events.collect().await;
    assert_eq!(events.len(), 4);
    assert_eq!(client.limiter().snapshot().tokens.available, 5_970.0);
}

#[tokio::test(start_paused = true)]
async fn test_async_abandoned_stream_is_released() {
    let client = async_client(StreamingExecutor::default());

    let mut events = client.append_stream("conv-1", &request()).await.unwrap();
    assert!(events.next().await.unwrap().is_ok());
    assert!(!events.is_settled());
    drop(events);

    assert_eq!(client.limiter().snapshot().tokens.available, 6_000.0);
}

#[tokio::test(start_paused = true)]
async fn test_async_failed_stream_is_released() {
    let client = async_client(StreamingExecutor::with_events(vec![
        started(),
        delta("Hel"),
        Err(network_failure()),
    ]));

    let mut events = client.start_stream(&request()).await.unwrap();
    let mut failures = 0;
    while let Some(event) = events.next().await {
        if event.is_err() {
            failures += 1;
        }
    }

    assert_eq!(failures, 1);
    assert!(events.is_settled());
    assert_eq!(client.limiter().snapshot().tokens.available, 6_000.0);
}

#[tokio::test(start_paused = true)]
async fn test_async_rejected_stream_open_backs_off() {
    let client = async_client(StreamingExecutor::with_opens(vec![
        Err(RemoteError::rate_limited(None)),
        Ok(complete()),
    ]));
    let start = tokio::time::Instant::now();

    let events = client
        .restart_stream("conv-1", "entry-3", &request())
        .await
        .unwrap();

    // default base_delay of one second
    assert!(start.elapsed() >= std::time::Duration::from_secs(1));
    assert_eq!(client.executor().actions().len(), 2);
    assert_eq!(events.collect::<Vec<_>>().await.len(), 4);
    // the rejected attempt was released; the admitted one used 30
    assert_eq!(client.limiter().snapshot().tokens.available, 5_970.0);
}
