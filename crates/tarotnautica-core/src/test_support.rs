//! Scripted transport for unit tests.
//!
//! `FakeTransport` answers every request through a closure (or a fixed
//! sequence of replies) and records what was sent and when, using tokio's
//! clock so that paused-time tests can assert on backoff gaps.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use serde_json::Value;
use tokio::time::Instant;

use crate::api::transport::{HttpRequest, HttpResponse, Transport, TransportError};

pub const BASE_URL: &str = "http://api.test";

#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, Vec<u8>),
    Fail(TransportError),
    /// Never answers; only a timeout gets the caller out.
    Hang,
    Slow(Duration, Box<Reply>),
}

impl Reply {
    pub fn json(status: u16, body: Value) -> Self {
        Reply::Status(status, body.to_string().into_bytes())
    }

    pub fn text(status: u16, body: &str) -> Self {
        Reply::Status(status, body.as_bytes().to_vec())
    }

    pub fn slow(delay: Duration, reply: Reply) -> Self {
        Reply::Slow(delay, Box::new(reply))
    }
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub at: Instant,
    pub path: String,
    pub request: HttpRequest,
}

impl Recorded {
    pub fn authorization(&self) -> Option<&str> {
        self.header(AUTHORIZATION.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json_body(&self) -> Option<Value> {
        serde_json::from_slice(self.request.body.as_deref()?).ok()
    }
}

type Handler = dyn Fn(&Recorded) -> Reply + Send + Sync;

pub struct FakeTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<Recorded>>,
}

impl FakeTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Recorded) -> Reply + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer requests with `replies` in order, repeating the last one.
    pub fn sequence(replies: Vec<Reply>) -> Self {
        let replies = Mutex::new(VecDeque::from(replies));
        Self::new(move |_| {
            let mut replies = replies.lock().unwrap();
            if replies.len() > 1 {
                replies.pop_front().unwrap()
            } else {
                replies.front().cloned().unwrap_or(Reply::Hang)
            }
        })
    }

    /// Dispatch on path; `route` also gets how many earlier calls hit that path.
    pub fn routes<F>(route: F) -> Self
    where
        F: Fn(&str, &Recorded, usize) -> Reply + Send + Sync + 'static,
    {
        let counts: Mutex<HashMap<String, usize>> = Mutex::new(HashMap::new());
        Self::new(move |recorded| {
            let n = {
                let mut counts = counts.lock().unwrap();
                let count = counts.entry(recorded.path.clone()).or_insert(0);
                *count += 1;
                *count - 1
            };
            route(&recorded.path, recorded, n)
        })
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let path = Url::parse(&request.url)
            .map(|url| url.path().to_string())
            .unwrap_or_else(|_| request.url.clone());
        let recorded = Recorded {
            at: Instant::now(),
            path,
            request,
        };
        let mut reply = (self.handler)(&recorded);
        self.requests.lock().unwrap().push(recorded);

        loop {
            match reply {
                Reply::Status(status, body) => {
                    let mut headers = HeaderMap::new();
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                    return Ok(HttpResponse {
                        status: StatusCode::from_u16(status).unwrap(),
                        headers,
                        body,
                    });
                }
                Reply::Fail(e) => return Err(e),
                Reply::Hang => return std::future::pending().await,
                Reply::Slow(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
            }
        }
    }
}
