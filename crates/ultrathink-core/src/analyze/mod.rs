//! Grounded AI analysis
//!
//! Question answering, summarization, pattern mining, and temporal
//! progressions over retrieved memories. Answers are grounded: retrieval
//! first, prompt assembly under a character budget, and an explicit
//! "no information available" response when nothing was retrieved. Chat
//! output is untrusted; missing fields become sentinels.

mod singleflight;

pub use singleflight::SingleFlight;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::search::{SearchHit, SearchPlanner, SearchRequest, SearchType};
use crate::services::{ChatMessage, ChatService};

/// Sentinel inserted for fields the chat service failed to produce
pub const PARSING_FAILED: &str = "parsing_failed";

/// Default number of memories pulled into a question's context
const DEFAULT_CONTEXT_LIMIT: usize = 10;
const SUMMARY_LIMIT: usize = 50;
const PATTERN_LIMIT: usize = 30;

/// Character budget for assembled context
const CONTEXT_BUDGET: usize = 6000;

/// Timeframe selector for summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Today,
    #[default]
    Week,
    Month,
    All,
}

impl Timeframe {
    fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Timeframe::Today => now
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|naive| naive.and_utc()),
            Timeframe::Week => Some(now - Duration::days(7)),
            Timeframe::Month => Some(now - Duration::days(30)),
            Timeframe::All => None,
        }
    }
}

/// Retrieval filters shared by every analysis type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisFilters {
    pub session_id: Option<String>,
    pub domain: Option<String>,
    pub tags: Vec<String>,
}

/// Typed analysis request, tagged by operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisRequest {
    Question {
        question: String,
        #[serde(default)]
        filters: AnalysisFilters,
        #[serde(default)]
        context_limit: Option<usize>,
    },
    Summarize {
        #[serde(default)]
        timeframe: Timeframe,
        #[serde(default)]
        filters: AnalysisFilters,
    },
    Analyze {
        query: String,
        #[serde(default)]
        filters: AnalysisFilters,
    },
    TemporalPatterns {
        concept: String,
        #[serde(default)]
        filters: AnalysisFilters,
    },
}

impl AnalysisRequest {
    fn kind(&self) -> &'static str {
        match self {
            AnalysisRequest::Question { .. } => "question",
            AnalysisRequest::Summarize { .. } => "summarize",
            AnalysisRequest::Analyze { .. } => "analyze",
            AnalysisRequest::TemporalPatterns { .. } => "temporal_patterns",
        }
    }

    /// Canonical single-flight key. Serialization order is declaration
    /// order, so identical options always collide.
    fn canonical_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

/// A named recurring pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternInsight {
    pub name: String,
}

/// One step of a temporal progression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalPoint {
    pub period: String,
    pub summary: String,
}

/// Unified analysis response; fields irrelevant to the operation stay empty
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub analysis_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<PatternInsight>,
    #[serde(default)]
    pub key_themes: Vec<String>,
    #[serde(default)]
    pub progression: Vec<TemporalPoint>,
    /// Memory ids actually included in the prompt
    pub sources: Vec<String>,
    pub confidence: f64,
    pub memory_count: usize,
    /// True when semantic retrieval degraded to lexical
    pub degraded: bool,
}

pub struct Analyzer {
    planner: Arc<SearchPlanner>,
    chat: Option<Arc<dyn ChatService>>,
    flights: SingleFlight<AnalysisResponse>,
}

impl Analyzer {
    pub fn new(planner: Arc<SearchPlanner>, chat: Option<Arc<dyn ChatService>>) -> Self {
        Self {
            planner,
            chat,
            flights: SingleFlight::default(),
        }
    }

    /// Run an analysis, coalescing concurrent identical requests into one
    /// upstream chat call.
    pub async fn run(&self, request: AnalysisRequest) -> Result<AnalysisResponse> {
        let key = request.canonical_key();
        let planner = Arc::clone(&self.planner);
        let chat = self.chat.clone();
        self.flights
            .run(key, Self::execute(planner, chat, request))
            .await
    }

    fn retrieval_request(planner: &SearchPlanner, request: &AnalysisRequest) -> SearchRequest {
        let preferred = if planner.semantic_available() {
            SearchType::Hybrid
        } else {
            SearchType::Lexical
        };

        match request {
            AnalysisRequest::Question {
                question,
                filters,
                context_limit,
            } => SearchRequest {
                query: Some(question.clone()),
                search_type: Some(preferred),
                limit: Some(context_limit.unwrap_or(DEFAULT_CONTEXT_LIMIT).clamp(1, 100)),
                session_id: filters.session_id.clone(),
                domain: filters.domain.clone(),
                tags: filters.tags.clone(),
                ..Default::default()
            },
            AnalysisRequest::Summarize { timeframe, filters } => {
                let since = timeframe.since(Utc::now());
                SearchRequest {
                    search_type: Some(if since.is_some() {
                        SearchType::DateRange
                    } else {
                        SearchType::List
                    }),
                    created_after: since,
                    limit: Some(SUMMARY_LIMIT),
                    session_id: filters.session_id.clone(),
                    domain: filters.domain.clone(),
                    tags: filters.tags.clone(),
                    ..Default::default()
                }
            }
            AnalysisRequest::Analyze { query, filters } => SearchRequest {
                query: Some(query.clone()),
                search_type: Some(preferred),
                limit: Some(PATTERN_LIMIT),
                session_id: filters.session_id.clone(),
                domain: filters.domain.clone(),
                tags: filters.tags.clone(),
                ..Default::default()
            },
            AnalysisRequest::TemporalPatterns { concept, filters } => SearchRequest {
                query: Some(concept.clone()),
                search_type: Some(preferred),
                limit: Some(SUMMARY_LIMIT),
                session_id: filters.session_id.clone(),
                domain: filters.domain.clone(),
                tags: filters.tags.clone(),
                ..Default::default()
            },
        }
    }

    async fn execute(
        planner: Arc<SearchPlanner>,
        chat: Option<Arc<dyn ChatService>>,
        request: AnalysisRequest,
    ) -> Result<AnalysisResponse> {
        let retrieval = Self::retrieval_request(&planner, &request);
        let search = planner.search(&retrieval).await?;

        if search.results.is_empty() {
            return Ok(Self::no_information(&request));
        }

        let chat = chat.ok_or_else(|| CoreError::unavailable("no chat service configured"))?;

        let mut hits = search.results;
        if matches!(request, AnalysisRequest::TemporalPatterns { .. }) {
            // Chronological context reads better for progressions
            hits.sort_by(|a, b| a.memory.created_at.cmp(&b.memory.created_at));
        }
        let (context, sources) = build_context(&hits, CONTEXT_BUDGET);
        let messages = Self::build_messages(&request, &context);

        debug!(
            analysis_type = request.kind(),
            context_memories = sources.len(),
            "issuing chat request"
        );
        let raw = chat.chat(&messages).await?;
        let payload = parse_chat_payload(&raw);

        let mut response = Self::extract(&request, &payload);
        response.sources = sources;
        response.memory_count = hits.len();
        response.degraded = search.degraded;
        Ok(response)
    }

    fn no_information(request: &AnalysisRequest) -> AnalysisResponse {
        let notice = "No information available: no memories matched this request.".to_string();
        let mut response = AnalysisResponse {
            analysis_type: request.kind().to_string(),
            confidence: 0.0,
            ..Default::default()
        };
        match request {
            AnalysisRequest::Question { .. } => response.answer = Some(notice),
            AnalysisRequest::Summarize { .. } => response.summary = Some(notice),
            AnalysisRequest::Analyze { .. } | AnalysisRequest::TemporalPatterns { .. } => {
                response.insights = vec![notice];
            }
        }
        response
    }

    fn build_messages(request: &AnalysisRequest, context: &str) -> Vec<ChatMessage> {
        let (instruction, task) = match request {
            AnalysisRequest::Question { question, .. } => (
                "Answer strictly from the provided memories. Respond with one JSON object: \
                 {\"answer\": string, \"insights\": [string], \"confidence\": number in [0,1]}.",
                format!("Question: {question}"),
            ),
            AnalysisRequest::Summarize { timeframe, .. } => (
                "Summarize the provided memories. Respond with one JSON object: \
                 {\"summary\": string, \"key_themes\": [string], \"confidence\": number in [0,1]}.",
                format!("Timeframe: {timeframe:?}"),
            ),
            AnalysisRequest::Analyze { query, .. } => (
                "Identify recurring themes in the provided memories. Respond with one JSON object: \
                 {\"insights\": [string], \"patterns\": [{\"name\": string}], \"confidence\": number in [0,1]}.",
                format!("Focus: {query}"),
            ),
            AnalysisRequest::TemporalPatterns { concept, .. } => (
                "Describe how the concept evolves across the provided memories, oldest first. \
                 Respond with one JSON object: {\"insights\": [string], \
                 \"progression\": [{\"period\": string, \"summary\": string}], \"confidence\": number in [0,1]}.",
                format!("Concept: {concept}"),
            ),
        };

        vec![
            ChatMessage::system(format!(
                "You are a memory analysis assistant. Never invent facts that are not \
                 grounded in the memories below. {instruction}"
            )),
            ChatMessage::user(format!("{task}\n\nMemories:\n{context}")),
        ]
    }

    fn extract(request: &AnalysisRequest, payload: &Value) -> AnalysisResponse {
        let confidence = payload
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.5)
            .clamp(0.0, 1.0);

        let mut response = AnalysisResponse {
            analysis_type: request.kind().to_string(),
            confidence,
            ..Default::default()
        };

        match request {
            AnalysisRequest::Question { .. } => {
                response.answer = Some(
                    str_field(payload, "answer").unwrap_or_else(|| PARSING_FAILED.to_string()),
                );
                response.insights = str_list(payload, "insights").unwrap_or_default();
            }
            AnalysisRequest::Summarize { .. } => {
                response.summary = Some(
                    str_field(payload, "summary").unwrap_or_else(|| PARSING_FAILED.to_string()),
                );
                response.key_themes = str_list(payload, "key_themes")
                    .unwrap_or_else(|| vec![PARSING_FAILED.to_string()]);
            }
            AnalysisRequest::Analyze { .. } => {
                response.insights = str_list(payload, "insights")
                    .unwrap_or_else(|| vec![PARSING_FAILED.to_string()]);
                response.patterns = payload
                    .get("patterns")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|item| {
                                item.get("name")
                                    .and_then(Value::as_str)
                                    .or_else(|| item.as_str())
                                    .map(|name| PatternInsight {
                                        name: name.to_string(),
                                    })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
            }
            AnalysisRequest::TemporalPatterns { .. } => {
                response.insights = str_list(payload, "insights")
                    .unwrap_or_else(|| vec![PARSING_FAILED.to_string()]);
                response.progression = payload
                    .get("progression")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|item| {
                                Some(TemporalPoint {
                                    period: item.get("period")?.as_str()?.to_string(),
                                    summary: item.get("summary")?.as_str()?.to_string(),
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
            }
        }
        response
    }
}

/// Assemble context lines highest-score first under a character budget.
/// Returns the context text and the ids actually included. When even the
/// first memory exceeds the budget its content is truncated so the
/// highest-ranked context is always retained.
fn build_context(hits: &[SearchHit], budget: usize) -> (String, Vec<String>) {
    let mut context = String::new();
    let mut sources = Vec::new();

    for hit in hits {
        let line = format!(
            "- [{}] ({}) {}\n",
            hit.memory.id,
            hit.memory.created_at.format("%Y-%m-%d"),
            hit.memory.content
        );
        if context.len() + line.len() > budget {
            if sources.is_empty() {
                let head: String = line.chars().take(budget).collect();
                context.push_str(&head);
                sources.push(hit.memory.id.clone());
            }
            break;
        }
        context.push_str(&line);
        sources.push(hit.memory.id.clone());
    }
    (context, sources)
}

/// Parse the chat output as JSON, tolerating prose around the object.
fn parse_chat_payload(raw: &str) -> Value {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return value;
    }
    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&raw[start..=end]) {
                return value;
            }
        }
    }
    Value::Null
}

fn str_field(payload: &Value, name: &str) -> Option<String> {
    payload
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn str_list(payload: &Value, name: &str) -> Option<Vec<String>> {
    payload.get(name).and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect()
    })
}

// ============================================================================
// TESTS
// ============================================================================
