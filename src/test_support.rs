//! In-memory transport used by the unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::fetch::{FetchError, FetchPolicy, Transport, TransportResponse};

#[derive(Debug, Clone)]
enum Reply {
    Response(TransportResponse),
    Failure(String),
}

/// Scripted transport: each URL answers from its queue, repeating the last
/// reply once the queue is down to one. Unknown URLs answer 404.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    replies: Arc<Mutex<HashMap<String, VecDeque<Reply>>>>,
    calls: Arc<Mutex<Vec<(String, Vec<(String, String)>)>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.push(
            url,
            Reply::Response(TransportResponse {
                status,
                body: body.to_string(),
            }),
        );
    }

    pub fn fail(&self, url: &str, message: &str) {
        self.push(url, Reply::Failure(message.to_string()));
    }

    fn push(&self, url: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(called, _)| called == url)
            .count()
    }

    pub fn last_headers(&self) -> Option<Vec<(String, String)>> {
        self.calls.lock().unwrap().last().map(|(_, h)| h.clone())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<TransportResponse, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), headers.to_vec()));

        let reply = {
            let mut replies = self.replies.lock().unwrap();
            match replies.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::Failure(message)) => Err(FetchError::TransientNetwork {
                url: url.to_string(),
                message,
            }),
            None => Ok(TransportResponse {
                status: 404,
                body: String::new(),
            }),
        }
    }
}

/// Policy with no spacing or cooldown so tests run instantly
pub fn quick_policy() -> FetchPolicy {
    FetchPolicy {
        min_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        rate_limit_cooldown: Duration::ZERO,
        ..FetchPolicy::default()
    }
}
