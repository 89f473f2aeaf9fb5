//! In-process stand-in for the Leonardo API and its image CDN.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use leonardo::{Config, Leonardo};

#[derive(Clone, Debug)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body is JSON")
    }
}

#[derive(Clone)]
enum Reply {
    Fixed {
        status: u16,
        content_type: &'static str,
        body: Vec<u8>,
    },
    Echo,
    /// Sends `head`, then drops the connection before the declared length.
    Truncated { head: Vec<u8>, declared_len: usize },
    Slow { delay: Duration, body: Vec<u8> },
}

#[derive(Default)]
struct Routes {
    replies: Vec<(String, Reply)>,
    requests: Vec<Recorded>,
}

type Shared = Arc<Mutex<Routes>>;

pub struct MockServer {
    pub base: String,
    state: Shared,
}

impl MockServer {
    pub async fn start() -> Self {
        let state = Shared::default();
        let app = Router::new().fallback(handle).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            base: format!("http://{addr}"),
            state,
        }
    }

    pub fn api_base(&self) -> String {
        format!("{}/api/rest/v1", self.base)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn client(&self, token: &str) -> Leonardo {
        self.client_with_timeout(token, 10)
    }

    pub fn client_with_timeout(&self, token: &str, seconds: u64) -> Leonardo {
        Leonardo::new(
            Config::new(token)
                .with_base_url(self.api_base())
                .with_timeout(seconds),
        )
        .unwrap()
    }

    /// Answers requests to `path` with a JSON body.
    pub fn json(&self, path: &str, status: u16, body: &str) {
        self.reply(path, status, "application/json", body.as_bytes().to_vec());
    }

    pub fn bytes(&self, path: &str, status: u16, body: &[u8]) {
        self.reply(path, status, "image/png", body.to_vec());
    }

    /// Answers requests to `path` with the request body itself.
    pub fn echo(&self, path: &str) {
        self.push(path, Reply::Echo);
    }

    /// Starts a 200 reply with `head` and breaks off mid-body.
    pub fn truncated(&self, path: &str, head: &[u8], declared_len: usize) {
        self.push(
            path,
            Reply::Truncated {
                head: head.to_vec(),
                declared_len,
            },
        );
    }

    /// Answers with a JSON body only after `delay`.
    pub fn slow(&self, path: &str, delay: Duration, body: &str) {
        self.push(
            path,
            Reply::Slow {
                delay,
                body: body.as_bytes().to_vec(),
            },
        );
    }

    fn push(&self, path: &str, reply: Reply) {
        self.state
            .lock()
            .unwrap()
            .replies
            .push((path.to_string(), reply));
    }

    fn reply(&self, path: &str, status: u16, content_type: &'static str, body: Vec<u8>) {
        self.push(
            path,
            Reply::Fixed {
                status,
                content_type,
                body,
            },
        );
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn only_request(&self) -> Recorded {
        let requests = self.requests();
        assert_eq!(requests.len(), 1, "expected exactly one request: {requests:?}");
        requests.into_iter().next().unwrap()
    }
}

async fn handle(
    State(state): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let reply = {
        let mut routes = state.lock().unwrap();
        routes.requests.push(Recorded {
            method: method.to_string(),
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            headers,
            body: body.to_vec(),
        });
        routes
            .replies
            .iter()
            .find(|(path, _)| path == uri.path())
            .map(|(_, reply)| reply.clone())
    };

    match reply {
        Some(Reply::Fixed {
            status,
            content_type,
            body,
        }) => (
            StatusCode::from_u16(status).unwrap(),
            [(header::CONTENT_TYPE, content_type)],
            body,
        )
            .into_response(),
        Some(Reply::Echo) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body.to_vec(),
        )
            .into_response(),
        Some(Reply::Truncated { head, declared_len }) => {
            let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
                Ok(head),
                Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection dropped",
                )),
            ];
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "image/png".to_string()),
                    (header::CONTENT_LENGTH, declared_len.to_string()),
                ],
                Body::from_stream(futures::stream::iter(chunks)),
            )
                .into_response()
        }
        Some(Reply::Slow { delay, body }) => {
            tokio::time::sleep(delay).await;
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/json")],
                body,
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, r#"{"error":"no route"}"#).into_response(),
    }
}
