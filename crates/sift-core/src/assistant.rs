//! Language-model helpers around a query: rewriting, intent, dates, confirmation text.
//!
//! Each helper has a plain fallback and is used the same way whether or not a model
//! is configured.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dates::{extract_json_object, parse_date_response, DateRange};
use crate::llm::LanguageModel;
use crate::records::QueryResult;

const REWRITE_SYSTEM: &str =
    "You are a helpful assistant that rewrites queries to be more effective for image caption search.";
const DATES_SYSTEM: &str = "You are a helpful assistant that extracts date information from queries.";
const INTENT_SYSTEM: &str = "You help users find and delete images on their desktop. \
    Answer with a JSON object only.";
const CONFIRM_SYSTEM: &str = "You are a helpful assistant that helps users manage their image files.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Find,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryIntent {
    pub intent: Intent,
    pub query: String,
}

impl QueryIntent {
    /// Keyword reading: anything mentioning "delete" is a deletion.
    pub fn from_keywords(query: &str) -> Self {
        let intent = if mentions_delete(query) {
            Intent::Delete
        } else {
            Intent::Find
        };
        Self {
            intent,
            query: query.to_string(),
        }
    }
}

pub fn mentions_delete(text: &str) -> bool {
    text.to_lowercase().contains("delete")
}

#[derive(Deserialize)]
struct RawIntent {
    intent: String,
}

/// Optional language model plus the fallbacks used when it is absent or fails.
#[derive(Clone, Default)]
pub struct Assistant {
    model: Option<Arc<dyn LanguageModel>>,
}

impl Assistant {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model: Some(model) }
    }

    /// No model: every helper takes its fallback.
    pub fn offline() -> Self {
        Self { model: None }
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Rephrases the query for caption search. Returns the original on any failure.
    pub async fn rewrite_query(&self, query: &str) -> String {
        let Some(model) = &self.model else {
            return query.to_string();
        };
        let prompt = format!("Rephrase this as a search query for image captions: {query}");
        match model.complete(REWRITE_SYSTEM, &prompt).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => query.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "query rewrite failed");
                query.to_string()
            }
        }
    }

    /// Asks the model for a date range. No model, a failed call or a bad reply all
    /// mean unconstrained; there is no text-only fallback.
    pub async fn extract_dates(&self, query: &str) -> DateRange {
        let Some(model) = &self.model else {
            return DateRange::unconstrained();
        };
        let prompt = format!(
            "Extract the date information from this query: '{query}'. Return a JSON with \
             start_date and end_date in YYYY-MM-DD format. If no specific end date is mentioned, \
             use the end of the mentioned period. Use null for dates that are not mentioned."
        );
        match model.complete(DATES_SYSTEM, &prompt).await {
            Ok(reply) => parse_date_response(&reply),
            Err(e) => {
                tracing::warn!(error = %e, "date extraction failed");
                DateRange::unconstrained()
            }
        }
    }

    /// Find or delete. Falls back to the keyword reading.
    pub async fn understand_query(&self, query: &str) -> QueryIntent {
        let fallback = QueryIntent::from_keywords(query);
        let Some(model) = &self.model else {
            return fallback;
        };
        let prompt = format!(
            "Parse this query and extract the intent (find or delete) as JSON \
             {{\"intent\": \"find\" | \"delete\"}}: '{query}'"
        );
        let reply = match model.complete(INTENT_SYSTEM, &prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "intent parsing failed");
                return fallback;
            }
        };
        parse_intent_response(&reply, query).unwrap_or(fallback)
    }

    /// Text shown before the `yes` prompt.
    pub async fn confirmation_message(&self, results: &[QueryResult], query: &str) -> String {
        let fallback = format!(
            "Are you sure you want to delete these {} images matching '{}'?",
            results.len(),
            query
        );
        let Some(model) = &self.model else {
            return fallback;
        };
        let list = results
            .iter()
            .map(|r| {
                format!(
                    "- {} (Caption: {}, Date: {})",
                    r.record.path.display(),
                    r.record.caption,
                    r.record.creation_date
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Based on the query '{query}', I found these images:\n{list}\n\nGenerate a confirmation \
             message asking if the user wants to delete these {} images. Mention the date range if applicable.",
            results.len()
        );
        match model.complete(CONFIRM_SYSTEM, &prompt).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => fallback,
            Err(e) => {
                tracing::warn!(error = %e, "confirmation message failed");
                fallback
            }
        }
    }
}

fn parse_intent_response(reply: &str, query: &str) -> Option<QueryIntent> {
    let raw: RawIntent = serde_json::from_str(extract_json_object(reply)?).ok()?;
    let intent = match raw.intent.trim().to_lowercase().as_str() {
        "find" => Intent::Find,
        "delete" => Intent::Delete,
        _ => return None,
    };
    Some(QueryIntent {
        intent,
        query: query.to_string(),
    })
}


#[cfg(test)]
mod tests {
    use super::fakes::ScriptedModel;
    use super::*;
    use crate::records::record;
    use chrono::NaiveDate;

    fn with(model: ScriptedModel) -> Assistant {
        Assistant::new(Arc::new(model))
    }

    #[tokio::test]
    async fn offline_fallbacks() {
        let a = Assistant::offline();
        assert_eq!(a.rewrite_query("cats").await, "cats");
        assert_eq!(a.extract_dates("last week").await, DateRange::unconstrained());
        assert_eq!(a.understand_query("Delete old shots").await.intent, Intent::Delete);
        assert_eq!(a.understand_query("find cats").await.intent, Intent::Find);
        let results = vec![QueryResult::new(record("a.png", "cat", "2024-01-05"), 0.8)];
        assert_eq!(
            a.confirmation_message(&results, "delete cats").await,
            "Are you sure you want to delete these 1 images matching 'delete cats'?"
        );
    }

    #[tokio::test]
    async fn model_replies_are_used() {
        let a = with(ScriptedModel {
            rewrite: Some("  photo of a cat \n".into()),
            dates: Some("Here: {\"start_date\": \"2024-01-08\", \"end_date\": \"2024-01-12\"}".into()),
            intent: Some("{\"intent\": \"DELETE\", \"criteria\": \"cats\"}".into()),
            confirm: Some("Delete 1 cat picture?".into()),
            ..Default::default()
        });
        assert_eq!(a.rewrite_query("cats").await, "photo of a cat");
        let range = a.extract_dates("from jan 8 to jan 12").await;
        assert_eq!(range.start_date, NaiveDate::from_ymd_opt(2024, 1, 8));
        assert_eq!(range.end_date, NaiveDate::from_ymd_opt(2024, 1, 12));
        assert_eq!(a.understand_query("get rid of cats").await.intent, Intent::Delete);
        assert_eq!(a.confirmation_message(&[], "x").await, "Delete 1 cat picture?");
    }

    #[tokio::test]
    async fn failing_or_garbled_model_falls_back() {
        let a = with(ScriptedModel {
            rewrite: Some("   ".into()),
            intent: Some("{\"intent\": \"maybe\"}".into()),
            ..Default::default()
        });
        assert_eq!(a.rewrite_query("cats").await, "cats");
        assert_eq!(a.extract_dates("last week").await, DateRange::unconstrained());
        assert_eq!(a.understand_query("delete cats").await.intent, Intent::Delete);
        assert!(a.confirmation_message(&[], "q").await.starts_with("Are you sure"));
    }
}
