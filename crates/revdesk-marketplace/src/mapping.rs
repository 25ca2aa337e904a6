//! Provider review payload → `IncomingReview`.
//!
//! The review list is loosely specified, so every field is looked up under
//! the handful of keys the provider has been seen to use.

use revdesk_core::{parse_provider_timestamp, IncomingReview};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

const ID_KEYS: &[&str] = &["id", "review_id", "uuid"];
const PRODUCT_ID_KEYS: &[&str] = &["sku", "product_id", "offer_id"];
const PRODUCT_NAME_KEYS: &[&str] = &["product_name", "product_title", "name"];
const RATING_KEYS: &[&str] = &["rating", "score"];
const TEXT_KEYS: &[&str] = &["text", "comment"];
const CUSTOMER_KEYS: &[&str] = &["author_name", "customer_name", "author"];
const CREATED_AT_KEYS: &[&str] = &["published_at", "created_at", "date"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("review payload is not a JSON object")]
    NotAnObject,
    #[error("review payload has none of the id fields ({})", ID_KEYS.join(", "))]
    MissingExternalId,
}

fn json_str(obj: &Map<String, JsonValue>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key)? {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn json_i64(obj: &Map<String, JsonValue>, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|key| match obj.get(*key)? {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        JsonValue::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
        _ => None,
    })
}

pub fn parse_review(raw: &JsonValue) -> Result<IncomingReview, MappingError> {
    let obj = raw.as_object().ok_or(MappingError::NotAnObject)?;
    let external_id = json_str(obj, ID_KEYS).ok_or(MappingError::MissingExternalId)?;

    let mut text = json_str(obj, TEXT_KEYS).unwrap_or_default();
    for (key, label) in [("pros", "Достоинства"), ("cons", "Недостатки")] {
        if let Some(part) = json_str(obj, &[key]) {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&format!("{label}: {part}"));
        }
    }

    let rating = json_i64(obj, RATING_KEYS)
        .unwrap_or_default()
        .clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;

    Ok(IncomingReview {
        external_id,
        product_id: json_str(obj, PRODUCT_ID_KEYS),
        product_name: json_str(obj, PRODUCT_NAME_KEYS),
        rating,
        text,
        customer_name: json_str(obj, CUSTOMER_KEYS),
        created_at: json_str(obj, CREATED_AT_KEYS)
            .as_deref()
            .and_then(parse_provider_timestamp),
    })
}
