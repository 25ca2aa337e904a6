//! Free-text model answers → sentiment / category labels.
//!
//! Models answer in whatever language the prompt nudged them towards, so the
//! keyword tables carry Russian stems next to the English words. Tables are
//! scanned in order; the first hit wins.

use revdesk_core::{Category, Sentiment};

const SENTIMENT_KEYWORDS: &[(&str, Sentiment)] = &[
    ("положительн", Sentiment::Positive),
    ("позитивн", Sentiment::Positive),
    ("positive", Sentiment::Positive),
    ("хорош", Sentiment::Positive),
    ("good", Sentiment::Positive),
    ("отрицательн", Sentiment::Negative),
    ("негативн", Sentiment::Negative),
    ("negative", Sentiment::Negative),
    ("плох", Sentiment::Negative),
    ("bad", Sentiment::Negative),
];

const CATEGORY_KEYWORDS: &[(&str, Category)] = &[
    ("качеств", Category::Quality),
    ("quality", Category::Quality),
    ("доставк", Category::Delivery),
    ("delivery", Category::Delivery),
    ("упаковк", Category::Packaging),
    ("packaging", Category::Packaging),
    ("сервис", Category::Service),
    ("обслуживан", Category::Service),
    ("service", Category::Service),
];

pub fn sentiment_from_answer(answer: &str) -> Sentiment {
    let answer = answer.to_lowercase();
    SENTIMENT_KEYWORDS
        .iter()
        .find(|(needle, _)| answer.contains(needle))
        .map(|(_, sentiment)| *sentiment)
        .unwrap_or(Sentiment::Neutral)
}

pub fn category_from_answer(answer: &str) -> Category {
    let answer = answer.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(needle, _)| answer.contains(needle))
        .map(|(_, category)| *category)
        .unwrap_or(Category::Other)
}
