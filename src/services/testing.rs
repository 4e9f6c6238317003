//! Scripted transport double for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::services::http::{RawResponse, RetryPolicy, Transport, TransportError};

type Reply = std::result::Result<RawResponse, TransportError>;

/// Replays a fixed list of replies, then repeats the fallback (if any).
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Option<Reply>,
    calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    /// Answers every request with the same reply.
    pub fn repeating(reply: Reply) -> Self {
        Self {
            fallback: Some(reply),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &Url) -> Reply {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());

        let next = self.replies.lock().unwrap().pop_front();
        match next.or_else(|| self.fallback.clone()) {
            Some(reply) => reply,
            None => Ok(status(404)),
        }
    }
}

/// Routes by a substring of the URL; unmatched URLs get a 404.
pub struct RoutedTransport {
    routes: Vec<(String, Reply)>,
    calls: AtomicUsize,
}

impl RoutedTransport {
    pub fn new(routes: Vec<(&str, Reply)>) -> Self {
        Self {
            routes: routes
                .into_iter()
                .map(|(pattern, reply)| (pattern.to_string(), reply))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for RoutedTransport {
    async fn get(&self, url: &Url) -> Reply {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let url = url.as_str();
        self.routes
            .iter()
            .find(|(pattern, _)| url.contains(pattern.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| Ok(status(404)))
    }
}

pub fn status(code: u16) -> RawResponse {
    RawResponse {
        status: code,
        ..RawResponse::default()
    }
}

pub fn json_response(code: u16, body: Value) -> RawResponse {
    RawResponse {
        status: code,
        body: body.to_string().into_bytes(),
        ..RawResponse::default()
    }
}

/// Retry policy with millisecond delays so tests stay fast.
pub fn quick_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        retry_after_cap: Duration::from_millis(5),
    }
}
