//! Ranked candidate endpoint templates.
//!
//! The marketplace has published the same operations under several paths over
//! time. Each logical call walks its list front to back, so the order is the
//! preference ranking. Templates may use `{base}` and `{review_id}`.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    FetchReviews,
    SendResponse,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FetchReviews => "fetch_reviews",
            Self::SendResponse => "send_response",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointCandidates {
    #[serde(default = "default_fetch_templates")]
    pub fetch_reviews: Vec<String>,
    #[serde(default = "default_send_templates")]
    pub send_response: Vec<String>,
}

fn default_fetch_templates() -> Vec<String> {
    vec![
        "{base}/v1/review/list".to_string(),
        "{base}/v2/review/list".to_string(),
    ]
}

fn default_send_templates() -> Vec<String> {
    vec![
        "{base}/v2/review/comment/create".to_string(),
        "{base}/v1/review/comment".to_string(),
        "{base}/v1/review/{review_id}/comment".to_string(),
    ]
}

impl Default for EndpointCandidates {
    fn default() -> Self {
        Self {
            fetch_reviews: default_fetch_templates(),
            send_response: default_send_templates(),
        }
    }
}

impl EndpointCandidates {
    pub fn templates(&self, operation: Operation) -> &[String] {
        match operation {
            Operation::FetchReviews => &self.fetch_reviews,
            Operation::SendResponse => &self.send_response,
        }
    }

    /// Concrete URLs for `operation`, in rank order.
    pub fn resolve(&self, operation: Operation, base_url: &str, review_id: Option<&str>) -> Vec<String> {
        let base = base_url.trim_end_matches('/');
        self.templates(operation)
            .iter()
            .map(|template| {
                let url = template.replace("{base}", base);
                match review_id {
                    Some(id) => url.replace("{review_id}", id),
                    None => url,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_candidates_resolve_in_rank_order() {
        let candidates = EndpointCandidates::default();
        let urls = candidates.resolve(
            Operation::SendResponse,
            "https://api-seller.ozon.ru/",
            Some("r-77"),
        );
        assert_eq!(
            urls,
            vec![
                "https://api-seller.ozon.ru/v2/review/comment/create",
                "https://api-seller.ozon.ru/v1/review/comment",
                "https://api-seller.ozon.ru/v1/review/r-77/comment",
            ]
        );
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let candidates: EndpointCandidates =
            serde_json::from_str(r#"{"fetch_reviews": ["{base}/v3/review/list"]}"#).unwrap();
        assert_eq!(candidates.fetch_reviews, vec!["{base}/v3/review/list"]);
        assert_eq!(candidates.send_response.len(), 3);
    }
}
