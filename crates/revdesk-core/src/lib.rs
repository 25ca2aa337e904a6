//! Core domain model for review ingestion and response drafting.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "revdesk-core";

/// Namespace fragment used when deriving stable review ids.
const REVIEW_ID_NAMESPACE: &str = "revdesk:review:";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} label: {value}")]
pub struct ParseLabelError {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(Self::Positive),
            "neutral" => Ok(Self::Neutral),
            "negative" => Ok(Self::Negative),
            other => Err(ParseLabelError {
                kind: "sentiment",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Quality,
    Delivery,
    Packaging,
    Service,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Delivery => "delivery",
            Self::Packaging => "packaging",
            Self::Service => "service",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quality" => Ok(Self::Quality),
            "delivery" => Ok(Self::Delivery),
            "packaging" => Ok(Self::Packaging),
            "service" => Ok(Self::Service),
            "other" => Ok(Self::Other),
            other => Err(ParseLabelError {
                kind: "category",
                value: other.to_string(),
            }),
        }
    }
}

/// Marketplace review after provider field mapping, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingReview {
    pub external_id: String,
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub rating: i32,
    pub text: String,
    pub customer_name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// AI-derived attributes attached to a review at ingestion time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Enrichment {
    pub sentiment: Option<Sentiment>,
    pub category: Option<Category>,
    pub drafts: Vec<String>,
}

/// Insert payload handed to a review store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReview {
    pub id: Uuid,
    pub external_id: String,
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub rating: i32,
    pub text: String,
    pub customer_name: Option<String>,
    pub sentiment: Option<Sentiment>,
    pub category: Option<Category>,
    pub drafts: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
}

impl NewReview {
    /// Builds the insert payload, filling the derived fields.
    pub fn from_incoming(incoming: IncomingReview, enrichment: Enrichment, now: DateTime<Utc>) -> Self {
        let product_name = incoming
            .product_name
            .or_else(|| incoming.product_id.as_deref().map(synthesize_product_name));
        Self {
            id: review_id_for(&incoming.external_id),
            external_id: incoming.external_id,
            product_id: incoming.product_id,
            product_name,
            rating: incoming.rating.clamp(0, 5),
            text: incoming.text,
            customer_name: incoming.customer_name,
            sentiment: enrichment.sentiment,
            category: enrichment.category,
            drafts: enrichment.drafts,
            created_at: incoming.created_at.unwrap_or(now),
            ingested_at: now,
        }
    }
}

/// Persisted review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub external_id: String,
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub rating: i32,
    pub text: String,
    pub customer_name: Option<String>,
    pub sentiment: Option<Sentiment>,
    pub category: Option<Category>,
    pub answered: bool,
    pub drafts: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
}

impl From<NewReview> for Review {
    fn from(new: NewReview) -> Self {
        Self {
            id: new.id,
            external_id: new.external_id,
            product_id: new.product_id,
            product_name: new.product_name,
            rating: new.rating,
            text: new.text,
            customer_name: new.customer_name,
            sentiment: new.sentiment,
            category: new.category,
            answered: false,
            drafts: new.drafts,
            created_at: new.created_at,
            ingested_at: new.ingested_at,
        }
    }
}

/// Stable review id derived from the marketplace identifier.
pub fn review_id_for(external_id: &str) -> Uuid {
    let key = format!("{REVIEW_ID_NAMESPACE}{external_id}");
    Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes())
}

/// Display name for a product the marketplace did not name.
pub fn synthesize_product_name(product_id: &str) -> String {
    let short: String = product_id.trim().chars().take(8).collect();
    if short.is_empty() {
        "Товар".to_string()
    } else {
        format!("Товар {short}")
    }
}

/// Parses provider timestamps: RFC 3339, or naive ISO datetimes read as UTC.
pub fn parse_provider_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn incoming(external_id: &str) -> IncomingReview {
        IncomingReview {
            external_id: external_id.to_string(),
            product_id: Some("1234567890123".into()),
            product_name: None,
            rating: 9,
            text: "Отличный товар".into(),
            customer_name: None,
            created_at: None,
        }
    }

    #[test]
    fn review_ids_are_stable_per_external_id() {
        assert_eq!(review_id_for("abc"), review_id_for("abc"));
        assert_ne!(review_id_for("abc"), review_id_for("abd"));
    }

    #[test]
    fn new_review_fills_derived_fields() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().unwrap();
        let new = NewReview::from_incoming(incoming("r-1"), Enrichment::default(), now);
        assert_eq!(new.product_name.as_deref(), Some("Товар 12345678"));
        assert_eq!(new.rating, 5);
        assert_eq!(new.created_at, now);
        assert_eq!(new.id, review_id_for("r-1"));
        assert!(new.drafts.is_empty());

        let review = Review::from(new);
        assert!(!review.answered);
    }

    #[test]
    fn provider_name_wins_over_synthesized_one() {
        let mut item = incoming("r-2");
        item.product_name = Some("Чайник".into());
        let new = NewReview::from_incoming(item, Enrichment::default(), Utc::now());
        assert_eq!(new.product_name.as_deref(), Some("Чайник"));
    }

    #[test]
    fn labels_round_trip_through_strings() {
        for s in [Sentiment::Positive, Sentiment::Neutral, Sentiment::Negative] {
            assert_eq!(s.as_str().parse::<Sentiment>().unwrap(), s);
        }
        assert_eq!("Delivery".parse::<Category>().unwrap(), Category::Delivery);
        assert!("shipping".parse::<Category>().is_err());
    }

    #[test]
    fn provider_timestamps_accept_offset_and_naive_forms() {
        let expected = Utc.with_ymd_and_hms(2026, 2, 24, 12, 0, 0).single().unwrap();
        assert_eq!(parse_provider_timestamp("2026-02-24T12:00:00Z"), Some(expected));
        assert_eq!(parse_provider_timestamp("2026-02-24T15:00:00+03:00"), Some(expected));
        assert_eq!(parse_provider_timestamp("2026-02-24T12:00:00.000"), Some(expected));
        assert_eq!(parse_provider_timestamp("yesterday"), None);
    }
}
