//! Prompt templates.
//!
//! Placeholders are `{review_text}`, `{tone}`, `{signature}` and `{variant}`.
//! Unknown placeholders are left untouched.

pub const SENTIMENT_PROMPT: &str = "Определи тональность отзыва покупателя. \
Ответь ровно одним словом: положительная, нейтральная или отрицательная.\n\
Отзыв: {review_text}";

pub const CATEGORY_PROMPT: &str = "Определи главную тему отзыва покупателя. \
Ответь ровно одним словом из списка: качество, доставка, упаковка, сервис, другое.\n\
Отзыв: {review_text}";

pub const RESPONSE_PROMPT: &str = "Ты представитель продавца на маркетплейсе. \
Напиши вежливый ответ на отзыв покупателя.\n\
Тон: {tone}\n\
Требования: не длиннее 500 символов, поблагодари за отзыв, \
на критику ответь по существу и предложи решение, без выдуманных фактов.\n\n\
Отзыв: {review_text}\n\
Подпись: {signature}\n\n\
Вариант ответа №{variant}:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub sentiment: String,
    pub category: String,
    pub response: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            sentiment: SENTIMENT_PROMPT.to_string(),
            category: CATEGORY_PROMPT.to_string(),
            response: RESPONSE_PROMPT.to_string(),
        }
    }
}

/// Substitutes placeholders in one pass over the template. Inserted values
/// are copied verbatim, so braces inside a review are never expanded.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let value = tail.find('}').and_then(|close| {
            let key = &tail[1..close];
            vars.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Draft used in place of a variant the backend could not produce.
pub fn fallback_draft(signature: &str) -> String {
    format!("Спасибо за ваш отзыв! {signature}")
}
