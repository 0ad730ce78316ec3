use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use verse_cli::server::StatusResponse;
use verse_cli::{AppState, app_router};
use verse_rag::{
    Corpus, EmbeddingProvider, IndexBuilder, IndexState, IndexerConfig, InMemoryVectorStore,
    MatchConfig, MatchEngine, MatchResult, Result, Verse, VerseError,
};

const DIM: usize = 64;
const COLLECTION: &str = "bible-verses";

/// Word-count vectors folded into `DIM` buckets.
struct WordEmbedder {
    delay: Option<Duration>,
    fail: bool,
}

#[async_trait]
impl EmbeddingProvider for WordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(VerseError::Embedding { provider: "words".into(), message: "offline".into() });
        }
        let mut v = vec![0.0f32; DIM];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let bucket = word.to_lowercase().bytes().fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize));
            v[bucket % DIM] += 1.0;
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

fn corpus() -> Corpus {
    Corpus::from_verses([
        Verse::new("John", 11, 35, "Jesus wept."),
        Verse::new("Genesis", 1, 1, "In the beginning God created the heaven and the earth."),
    ])
    .unwrap()
}

async fn spawn_server(embedder: WordEmbedder, config: MatchConfig) -> (String, tokio::task::JoinHandle<()>) {
    let store = Arc::new(InMemoryVectorStore::new());
    let loader = WordEmbedder { delay: None, fail: false };
    let indexer_config = IndexerConfig::builder().batch_delay(Duration::ZERO).build().unwrap();
    IndexBuilder::new(Arc::new(loader), store.clone(), COLLECTION)
        .with_config(indexer_config)
        .build(&corpus())
        .await
        .unwrap();

    serve(MatchEngine::new(Arc::new(embedder), store, COLLECTION).with_config(config)).await
}

async fn serve(engine: MatchEngine) -> (String, tokio::task::JoinHandle<()>) {
    let app = app_router(AppState { engine: Arc::new(engine), expected: Some(2) });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });
    (format!("http://{}", addr), handle)
}

fn quick_match_config() -> MatchConfig {
    MatchConfig::builder()
        .retry(verse_rag::RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            jitter: 0.0,
        })
        .build()
        .unwrap()
}

async fn post_check(base: &str, quote: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{base}/check"))
        .json(&serde_json::json!({ "quote": quote }))
        .send()
        .await
        .expect("check response")
}

#[tokio::test]
async fn check_returns_the_matching_reference() {
    let (base, handle) = spawn_server(WordEmbedder { delay: None, fail: false }, quick_match_config()).await;

    let response = post_check(&base, "Jesus wept.").await;
    assert!(response.status().is_success());
    let result: MatchResult = response.json().await.expect("match json");
    assert!(result.matched);
    assert_eq!(result.reference, "John 11:35");

    let response = post_check(&base, "   ").await;
    let result: MatchResult = response.json().await.expect("match json");
    assert!(!result.matched);
    assert_eq!(result.message.as_deref(), Some(verse_rag::EMPTY_QUOTE_MESSAGE));

    handle.abort();
}

#[tokio::test]
async fn overlong_quote_is_a_bad_request() {
    let (base, handle) = spawn_server(WordEmbedder { delay: None, fail: false }, quick_match_config()).await;

    let response = post_check(&base, &"amen ".repeat(300)).await;
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("error json");
    assert!(body["error"].as_str().unwrap().contains("Invalid quote"));

    handle.abort();
}

#[tokio::test]
async fn unreachable_provider_is_service_unavailable() {
    let (base, handle) = spawn_server(WordEmbedder { delay: None, fail: true }, quick_match_config()).await;

    let response = post_check(&base, "Jesus wept.").await;
    assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

    handle.abort();
}

#[tokio::test]
async fn slow_provider_is_a_gateway_timeout() {
    let config = MatchConfig::builder().query_timeout(Duration::from_millis(50)).build().unwrap();
    let slow = WordEmbedder { delay: Some(Duration::from_secs(5)), fail: false };
    let (base, handle) = spawn_server(slow, config).await;

    let response = post_check(&base, "Jesus wept.").await;
    assert_eq!(response.status(), reqwest::StatusCode::GATEWAY_TIMEOUT);

    handle.abort();
}

#[tokio::test]
async fn health_and_status_report_separately_from_checks() {
    let (base, handle) = spawn_server(WordEmbedder { delay: None, fail: false }, quick_match_config()).await;
    let client = reqwest::Client::new();

    let health: Value =
        client.get(format!("{base}/health")).send().await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "ok");

    let status: StatusResponse =
        client.get(format!("{base}/status")).send().await.unwrap().json().await.unwrap();
    assert_eq!(
        status,
        StatusResponse {
            collection: COLLECTION.to_string(),
            stored: 2,
            expected: Some(2),
            state: Some(IndexState::Ready),
        }
    );

    handle.abort();
}

#[tokio::test]
async fn server_without_a_loaded_corpus_answers_instead_of_failing() {
    let store = Arc::new(InMemoryVectorStore::new());
    let embedder = WordEmbedder { delay: None, fail: false };
    let engine = MatchEngine::new(Arc::new(embedder), store, COLLECTION).with_config(quick_match_config());
    let (base, handle) = serve(engine).await;

    let response = post_check(&base, "Jesus wept.").await;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let result: MatchResult = response.json().await.expect("match json");
    assert!(!result.matched);
    assert_eq!(result.message.as_deref(), Some(verse_rag::NO_VERSES_MESSAGE));

    let response = reqwest::Client::new().get(format!("{base}/status")).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let status: StatusResponse = response.json().await.unwrap();
    assert_eq!(
        status,
        StatusResponse {
            collection: COLLECTION.to_string(),
            stored: 0,
            expected: Some(2),
            state: Some(IndexState::Empty),
        }
    );

    handle.abort();
}
