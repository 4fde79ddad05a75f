use crate::config::AppConfig;
use crate::create_app;
use crate::state::AppState;
use axum::body::Body;
use axum::Router;
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tower::ServiceExt;
use wiremock::matchers;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;

/// Test fixture for setting up a complete test environment with mocked services.
///
/// The TestFixture starts mock servers for the authorization engine and the
/// external group feed, builds the application on an in-memory store and
/// provides helper methods for making requests.
///
/// # Examples
///
/// ```rust
/// #[tokio::test]
/// async fn test_endpoint() {
///     let fixture = TestFixture::new().await;
///
///     // Set up a mock engine response
///     fixture.add_engine_mock(
///         Method::POST,
///         "/stores/test-store/check",
///         json!({ "allowed": true }),
///         StatusCode::OK,
///         1,
///     ).await;
///
///     // Send a request to the API
///     let response = fixture.post("/api/v0/hook/token", &payload).await;
///
///     // Verify the response
///     response.assert_ok();
///     let result = response.json_as::<TokenHookResponse>();
/// }
/// ```
pub struct TestFixture {
    /// The application router
    pub app: Router,
    /// Configuration the application was built with
    pub config: AppConfig,
    /// Application state shared with the router
    pub state: AppState,
    /// Mock server for the authorization engine
    pub engine_mock: MockServer,
    /// Mock server for the external group feed
    pub feed_mock: MockServer,
}

impl TestFixture {
    /// Creates a new test fixture with mock servers for the engine and the feed.
    ///
    /// This method sets up:
    /// - Mock servers for the engine and the feed
    /// - Configuration pointing at the mock servers and an in-memory store
    /// - The application router with test state
    pub async fn new() -> Self {
        Self::setup_logger(LevelFilter::Debug);

        // Create mock servers
        let engine_mock = MockServer::start().await;
        let feed_mock = MockServer::start().await;

        // Create config pointing at the mocks
        let config = AppConfig::for_test_with_mocks(&engine_mock, &feed_mock);

        // Create app state
        let state = AppState::for_testing(&config);
        let app = create_app(state.clone()).await;

        Self {
            app,
            config,
            state,
            engine_mock,
            feed_mock,
        }
    }

    /// Initializes the test logger with customized settings.
    ///
    /// Called by `TestFixture::new()` with debug level; only the first call
    /// in a test binary takes effect.
    pub fn setup_logger(level: LevelFilter) {
        let _ = env_logger::builder()
            .filter_level(level)
            .is_test(true)
            .try_init();
    }

    /// Creates a request builder with pre-configured headers.
    ///
    /// The request builder includes standard headers:
    /// - Authorization: Bearer token using the test API key
    /// - Content-Type: application/json
    pub fn request_builder(&self, method: Method, uri: impl AsRef<str>) -> http::request::Builder {
        let mut builder = Request::builder().method(method).uri(uri.as_ref());

        // Add default headers
        builder = builder.header("Authorization", format!("Bearer {}", self.config.api_key));
        builder = builder.header("Content-Type", "application/json");

        builder
    }

    /// Sends a GET request to the specified URI.
    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        let request = self
            .request_builder(Method::GET, uri)
            .body(Body::empty())
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a POST request with a JSON body to the specified URI.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let response = fixture
    ///     .post("/api/v0/groups", &json!({ "name": "eng" }))
    ///     .await;
    ///
    /// response.assert_status(StatusCode::CREATED);
    /// let group = response.json_as::<Group>();
    /// assert_eq!(group.name, "eng");
    /// ```
    pub async fn post<T: Serialize>(&self, uri: impl AsRef<str>, body: &T) -> TestResponse {
        let json_body = serde_json::to_vec(body).expect("Failed to serialize body to JSON");
        let request = self
            .request_builder(Method::POST, uri)
            .body(Body::from(json_body))
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a request and returns a TestResponse.
    ///
    /// This is a lower-level method that is used by the convenience methods
    /// like `get()` and `post()`. Use this method when you need more control
    /// over the request details.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        // Try to parse as JSON, defaulting to empty object if parsing fails or empty body
        let json = if !body.is_empty() {
            serde_json::from_slice(&body).unwrap_or_else(|_| serde_json::json!({}))
        } else {
            serde_json::json!({})
        };

        TestResponse { status, json }
    }

    /// Adds a mock engine route with the given method, path, and response.
    ///
    /// # Parameters
    ///
    /// - `method`: The HTTP method (e.g., Method::POST)
    /// - `path`: The API path to mock (e.g., "/stores/test-store/check")
    /// - `response_body`: The JSON response body to return
    /// - `status_code`: HTTP status code for the response
    /// - `expected_calls`: Number of expected calls to this mock
    pub async fn add_engine_mock(
        &self,
        method: Method,
        path: impl Into<String>,
        response_body: impl Serialize,
        status_code: StatusCode,
        expected_calls: u64,
    ) {
        Mock::given(matchers::method(method.as_str()))
            .and(matchers::path(path.into()))
            .respond_with(ResponseTemplate::new(status_code.as_u16()).set_body_json(response_body))
            .expect(expected_calls)
            .mount(&self.engine_mock)
            .await;
    }

    /// Adds a mock feed query route returning the given body
    pub async fn add_feed_mock(
        &self,
        path: impl Into<String>,
        response_body: impl Serialize,
        status_code: StatusCode,
        expected_calls: u64,
    ) {
        Mock::given(matchers::method("GET"))
            .and(matchers::path(path.into()))
            .respond_with(ResponseTemplate::new(status_code.as_u16()).set_body_json(response_body))
            .expect(expected_calls)
            .mount(&self.feed_mock)
            .await;
    }
}

/// Response from a test request that provides convenient access to status and JSON body.
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response body as JSON (if present and valid JSON)
    pub json: Value,
}

impl TestResponse {
    /// Asserts that the response has the expected status code.
    ///
    /// # Panics
    ///
    /// Panics if the status code doesn't match the expected value.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {} but got {} with body: {}",
            expected,
            self.status,
            serde_json::to_string_pretty(&self.json).unwrap_or_default()
        );
        self
    }

    /// Asserts that the response status is OK (200).
    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    /// Converts the response body to the specified type.
    ///
    /// # Panics
    ///
    /// Panics if deserialization fails.
    pub fn json_as<T: DeserializeOwned>(&self) -> T {
        serde_json::from_value(self.json.clone()).expect("Failed to deserialize response JSON")
    }
}
