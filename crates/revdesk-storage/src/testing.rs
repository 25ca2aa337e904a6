//! Scripted transport for exercising API clients without a network.
//!
//! Responses are queued per URL and consumed in order; once a URL's queue is
//! drained its sticky response (if any) is returned. Unscripted URLs fail
//! with a connect error, which clients treat like an unreachable host.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::{JsonRequest, JsonResponse, JsonTransport, TransportError};

#[derive(Debug, Clone)]
enum Scripted {
    Respond { status: u16, body: String },
    Fail(TransportError),
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    queued: Mutex<HashMap<String, VecDeque<Scripted>>>,
    sticky: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<JsonRequest>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, body: impl Into<String>) -> &Self {
        self.enqueue(
            url,
            Scripted::Respond {
                status,
                body: body.into(),
            },
        )
    }

    pub fn respond_json(&self, url: &str, status: u16, body: &JsonValue) -> &Self {
        self.respond(url, status, body.to_string())
    }

    pub fn fail(&self, url: &str, err: TransportError) -> &Self {
        self.enqueue(url, Scripted::Fail(err))
    }

    /// Response returned for `url` whenever its queue is empty.
    pub fn respond_always(&self, url: &str, status: u16, body: impl Into<String>) -> &Self {
        locked(&self.sticky).insert(
            url.to_string(),
            Scripted::Respond {
                status,
                body: body.into(),
            },
        );
        self
    }

    pub fn calls(&self) -> Vec<JsonRequest> {
        locked(&self.calls).clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        locked(&self.calls).iter().filter(|c| c.url == url).count()
    }

    pub fn total_calls(&self) -> usize {
        locked(&self.calls).len()
    }

    fn enqueue(&self, url: &str, scripted: Scripted) -> &Self {
        locked(&self.queued)
            .entry(url.to_string())
            .or_default()
            .push_back(scripted);
        self
    }

    fn next_for(&self, url: &str) -> Option<Scripted> {
        let queued = locked(&self.queued)
            .get_mut(url)
            .and_then(|queue| queue.pop_front());
        queued.or_else(|| locked(&self.sticky).get(url).cloned())
    }
}

#[async_trait]
impl JsonTransport for ScriptedTransport {
    async fn post_json(&self, request: &JsonRequest) -> Result<JsonResponse, TransportError> {
        locked(&self.calls).push(request.clone());
        match self.next_for(&request.url) {
            Some(Scripted::Respond { status, body }) => Ok(JsonResponse {
                status,
                url: request.url.clone(),
                body,
            }),
            Some(Scripted::Fail(err)) => Err(err),
            None => Err(TransportError::Connect(format!(
                "no scripted response for {}",
                request.url
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn queued_responses_drain_before_the_sticky_one() {
        let transport = ScriptedTransport::new();
        transport
            .respond("https://a.test", 500, "boom")
            .respond("https://a.test", 200, "{}")
            .respond_always("https://a.test", 404, "gone");

        let req = JsonRequest::new("https://a.test", json!({"limit": 20}));
        assert_eq!(transport.post_json(&req).await.unwrap().status, 500);
        assert_eq!(transport.post_json(&req).await.unwrap().status, 200);
        assert_eq!(transport.post_json(&req).await.unwrap().status, 404);
        assert_eq!(transport.post_json(&req).await.unwrap().status, 404);
        assert_eq!(transport.call_count("https://a.test"), 4);
    }

    #[tokio::test]
    async fn unscripted_urls_fail_like_unreachable_hosts() {
        let transport = ScriptedTransport::new();
        transport.fail("https://b.test", TransportError::Timeout("30s".into()));

        let timed_out = transport
            .post_json(&JsonRequest::new("https://b.test", json!({})))
            .await;
        assert_eq!(timed_out, Err(TransportError::Timeout("30s".into())));

        let missing = transport
            .post_json(&JsonRequest::new("https://c.test", json!({})))
            .await;
        assert!(matches!(missing, Err(TransportError::Connect(_))));
        assert_eq!(transport.total_calls(), 2);
    }
}
