//! テスト用の HTTP サーバー
//!
//! 用意したレスポンスを順番に返し、受け取ったリクエストを記録する。
//! レスポンスを返し切るとサーバーは停止する。

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// システムのプロキシ設定を無視するクライアント
pub(crate) fn test_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

pub(crate) struct TestResponse {
    status: StatusCode,
    body: Bytes,
    with_length: bool,
}

pub(crate) fn http_response(status: u16, body: &str) -> TestResponse {
    TestResponse {
        status: StatusCode::from_u16(status).unwrap(),
        body: Bytes::from(body.to_string()),
        with_length: true,
    }
}

pub(crate) fn bytes_response(body: Vec<u8>) -> TestResponse {
    TestResponse {
        status: StatusCode::OK,
        body: Bytes::from(body),
        with_length: true,
    }
}

/// chunked で返し Content-Length を付けないレスポンス
pub(crate) fn http_response_without_length(body: &str) -> TestResponse {
    TestResponse {
        with_length: false,
        ..http_response(200, body)
    }
}

impl IntoResponse for TestResponse {
    fn into_response(self) -> Response {
        let TestResponse {
            status,
            body,
            with_length,
        } = self;
        let body = if with_length {
            Body::from(body)
        } else {
            Body::from_stream(futures_util::stream::once(async move {
                Ok::<_, Infallible>(body)
            }))
        };
        (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: String,
}

impl RecordedRequest {
    /// `GET /path?query` 形式
    pub(crate) fn line(&self) -> String {
        format!("{} {}", self.method, self.uri)
    }

    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub(crate) fn query_param(&self, name: &str) -> Option<String> {
        let query = self.uri.query()?;
        reqwest::Url::parse(&format!("http://localhost/?{}", query))
            .ok()?
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

#[derive(Default)]
struct ServerState {
    responses: Mutex<VecDeque<TestResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
    done: Notify,
}

async fn respond(
    State(state): State<Arc<ServerState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.requests.lock().unwrap().push(RecordedRequest {
        method,
        uri,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    let (next, remaining) = {
        let mut responses = state.responses.lock().unwrap();
        (responses.pop_front(), responses.len())
    };
    if remaining == 0 {
        state.done.notify_one();
    }

    match next {
        Some(response) => response.into_response(),
        None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// エフェメラルポートで起動し、ベースURLと記録したリクエストのハンドルを返す
pub(crate) async fn serve(
    responses: Vec<TestResponse>,
) -> (String, JoinHandle<Vec<RecordedRequest>>) {
    let state = Arc::new(ServerState {
        responses: Mutex::new(responses.into()),
        ..Default::default()
    });
    let app = Router::new().fallback(respond).with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let signal = state.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { signal.done.notified().await })
            .await
            .unwrap();
        let requests = state.requests.lock().unwrap().clone();
        requests
    });

    (format!("http://{}", addr), handle)
}
