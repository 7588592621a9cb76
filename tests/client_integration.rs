use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::IntoResponse,
    Router,
};
use opencloud_http::{
    ClientOptions, Credential, ListOptions, OpenCloudClient, OpenCloudError, RetryPolicy,
};
use serde_json::{json, Value as JsonValue};

#[derive(Clone)]
struct MockResponse {
    status: StatusCode,
    body: Option<JsonValue>,
    headers: Vec<(&'static str, &'static str)>,
    delay: Duration,
}

impl MockResponse {
    fn json(status: StatusCode, body: JsonValue) -> Self {
        Self {
            status,
            body: Some(body),
            headers: Vec::new(),
            delay: Duration::from_millis(0),
        }
    }

    fn empty(status: StatusCode) -> Self {
        Self {
            body: None,
            ..Self::json(status, JsonValue::Null)
        }
    }

    fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.push((name, value));
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone, Debug)]
struct Recorded {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
}

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    recorded: Arc<Mutex<Vec<Recorded>>>,
    hits: Arc<AtomicUsize>,
}

async fn api_handler(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state
        .recorded
        .lock()
        .expect("recorded mutex must not be poisoned")
        .push(Recorded {
            method,
            uri,
            headers,
            body,
        });

    let response = {
        let mut queue = state
            .responses
            .lock()
            .expect("response queue mutex must not be poisoned");
        queue.pop_front().unwrap_or_else(|| {
            MockResponse::json(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"message": "no mock response available"}),
            )
        })
    };

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    let mut headers = HeaderMap::new();
    for (name, value) in response.headers {
        headers.insert(name, HeaderValue::from_static(value));
    }
    let body = response
        .body
        .map(|body| body.to_string())
        .unwrap_or_default();

    (response.status, headers, body)
}

struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    recorded: Arc<Mutex<Vec<Recorded>>>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    fn client(&self) -> OpenCloudClient {
        OpenCloudClient::new("test-key").with_base_url(&self.base_url)
    }

    fn recorded(&self, index: usize) -> Recorded {
        self.recorded.lock().expect("recorded mutex")[index].clone()
    }
}

async fn spawn_server(responses: Vec<MockResponse>) -> TestServer {
    let state = MockState {
        responses: Arc::new(Mutex::new(responses.into())),
        recorded: Arc::new(Mutex::new(Vec::new())),
        hits: Arc::new(AtomicUsize::new(0)),
    };

    let app = Router::new()
        .fallback(api_handler)
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock server must run");
    });

    TestServer {
        base_url: format!("http://{address}"),
        hits: state.hits,
        recorded: state.recorded,
        task,
    }
}

#[tokio::test]
async fn get_user_sends_api_key_to_user_path() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::OK,
        json!({"path": "users/156", "name": "builderman"}),
    )])
    .await;

    let user = server
        .client()
        .get_user(156)
        .await
        .expect("get_user must succeed")
        .expect("body must be present");

    assert_eq!(user["name"], "builderman");
    let request = server.recorded(0);
    assert_eq!(request.method, Method::GET);
    assert_eq!(request.uri.path(), "/cloud/v2/users/156");
    assert_eq!(request.headers.get("x-api-key").unwrap(), "test-key");
    assert_eq!(
        request.headers.get("content-type").unwrap(),
        "application/json"
    );
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn list_group_memberships_encodes_query() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::OK,
        json!({"groupMemberships": [], "nextPageToken": ""}),
    )])
    .await;

    server
        .client()
        .list_group_memberships(
            7,
            &ListOptions {
                max_page_size: Some(25),
                page_token: None,
                filter: Some("user == 'users/156'".to_owned()),
            },
        )
        .await
        .expect("list must succeed");

    let request = server.recorded(0);
    assert_eq!(request.uri.path(), "/cloud/v2/groups/7/memberships");
    assert_eq!(
        request.uri.query(),
        Some("maxPageSize=25&filter=user+%3D%3D+%27users%2F156%27")
    );
}

#[tokio::test]
async fn retries_on_retryable_http_status() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::INTERNAL_SERVER_ERROR, json!({"message": "boom"})),
        MockResponse::json(StatusCode::OK, json!({"path": "groups/7"})),
    ])
    .await;

    let client = server.client().with_options(ClientOptions {
        timeout_ms: 1_000,
        retry: RetryPolicy::exponential(1, 1),
        deadline_ms: None,
    });

    let group = client
        .get_group(7)
        .await
        .expect("request must succeed after retry");

    assert_eq!(group, Some(json!({"path": "groups/7"})));
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rate_limit_reset_header_reaches_error() {
    let limited = || {
        MockResponse::json(
            StatusCode::TOO_MANY_REQUESTS,
            json!({"message": "Too many requests"}),
        )
        .with_header("x-ratelimit-reset", "0")
    };
    let server = spawn_server(vec![limited(), limited()]).await;

    let err = server
        .client()
        .with_retry_policy(RetryPolicy::fixed(1, 0))
        .get_universe(9)
        .await
        .expect_err("must be rate limited");

    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
    match err {
        OpenCloudError::RateLimit { retry_after, .. } => assert_eq!(retry_after, Some(0)),
        other => panic!("expected rate limit error, got {other:?}"),
    }
}

#[tokio::test]
async fn forbidden_is_auth_error_without_retry() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::FORBIDDEN,
        json!({"message": "Insufficient scope", "code": "PERMISSION_DENIED"}),
    )])
    .await;

    let err = server
        .client()
        .with_retry_policy(RetryPolicy::fixed(3, 0))
        .restart_universe_servers(9)
        .await
        .expect_err("must be forbidden");

    assert!(err.is_auth());
    assert_eq!(err.status(), Some(403));
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn not_found_carries_status_and_code() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::NOT_FOUND,
        json!({"message": "not found", "code": "not_found"}),
    )])
    .await;

    let err = server
        .client()
        .get_user(1)
        .await
        .expect_err("must be not found");

    assert_eq!(err.status(), Some(404));
    assert_eq!(err.code(), Some("not_found"));
    assert_eq!(err.message(), "not found");
}

#[tokio::test]
async fn scoped_oauth2_client_publishes_with_bearer_only() {
    let server = spawn_server(vec![MockResponse::empty(StatusCode::OK)]).await;

    let parent = server.client();
    let scoped = parent.with_credential(Credential::oauth2("access-token"));

    let result = scoped
        .publish_universe_message(9, "announcements", "hello")
        .await
        .expect("publish must succeed");

    assert_eq!(result, None);
    let request = server.recorded(0);
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.uri.path(), "/cloud/v2/universes/9:publishMessage");
    assert!(request.headers.get("x-api-key").is_none());
    assert_eq!(
        request.headers.get("authorization").unwrap(),
        "Bearer access-token"
    );
    let body: JsonValue = serde_json::from_str(&request.body).expect("json body");
    assert_eq!(body, json!({"topic": "announcements", "message": "hello"}));
    assert_eq!(parent.credential(), Some(&Credential::api_key("test-key")));
}

#[tokio::test]
async fn request_timeout_surfaces_transport_error() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::OK, json!({})).with_delay(Duration::from_millis(150))
    ])
    .await;

    let client = server.client().with_options(ClientOptions {
        timeout_ms: 20,
        retry: RetryPolicy::fixed(2, 0),
        deadline_ms: None,
    });

    let err = client
        .get_user(1)
        .await
        .expect_err("request must timeout");

    match err {
        OpenCloudError::Transport(inner) => {
            let inner = inner
                .downcast_ref::<reqwest::Error>()
                .expect("reqwest error");
            assert!(inner.is_timeout());
        }
        other => panic!("expected transport timeout error, got {other:?}"),
    }
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}
