//! Search planner
//!
//! Validates a flat request into a tagged plan, dispatches to sub-searches,
//! and fuses scores into one deterministically ranked result set.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tracing::{debug, warn};

use crate::error::{CoreError, Result};
use crate::memory::{Memory, MemoryFilters};
use crate::services::{Embedder, VectorFilter, VectorStore};
use crate::storage::Store;

/// Limit clamp bounds
pub const LIMIT_MAX: usize = 1000;
const LIMIT_DEFAULT: usize = 10;

/// How a result matched the query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Keyword,
    Semantic,
    Hybrid,
    Tag,
    Date,
    List,
}

/// Requested retrieval strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    Lexical,
    Semantic,
    Tags,
    DateRange,
    Hybrid,
    List,
}

/// Tag combination operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TagOperator {
    And,
    #[default]
    Or,
}

/// Flat request shape accepted from transports
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    pub query: Option<String>,
    pub search_type: Option<SearchType>,
    pub limit: Option<usize>,
    pub min_relevance: Option<f64>,
    pub session_id: Option<String>,
    pub domain: Option<String>,
    pub tags: Vec<String>,
    pub tag_operator: Option<TagOperator>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

/// Validated plan, one variant per strategy. Each variant carries only the
/// fields it uses.
#[derive(Debug, Clone)]
enum SearchPlan {
    Lexical { query: String },
    Semantic { query: String },
    Tags { tags: Vec<String>, operator: TagOperator },
    DateRange,
    Hybrid { query: String },
    List,
}

/// One scored result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub memory: Memory,
    /// Fused relevance in [0,1]
    pub score: f64,
    pub match_type: MatchType,
}

/// Ranked result set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub total: usize,
    pub search_type: SearchType,
    /// True when the semantic path failed and lexical stood in
    pub degraded: bool,
}

/// Normalize a raw FTS rank into [0,1].
///
/// bm25 ranks are negative with lower meaning better; the fixed curve is
/// `clamp(1 + raw/10, 0, 1)`. A substituted ranker must document a monotonic
/// equivalent.
pub fn normalize_fts_score(raw: f64) -> f64 {
    (1.0 + raw / 10.0).clamp(0.0, 1.0)
}

/// Fused score for a memory present in both lexical (`a`) and semantic (`b`)
/// sub-results: weighted sum with a co-occurrence boost.
pub fn fuse_scores(a: f64, b: f64) -> f64 {
    ((0.4 * a + 0.6 * b) * 1.2).clamp(0.0, 1.0)
}

/// Deterministic ranking: score desc, created_at desc, id asc.
fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|x, y| {
        y.score
            .total_cmp(&x.score)
            .then_with(|| y.memory.created_at.cmp(&x.memory.created_at))
            .then_with(|| x.memory.id.cmp(&y.memory.id))
    });
}

pub struct SearchPlanner {
    store: Arc<Store>,
    embedder: Option<Arc<dyn Embedder>>,
    vectors: Option<Arc<dyn VectorStore>>,
}

impl SearchPlanner {
    pub fn new(
        store: Arc<Store>,
        embedder: Option<Arc<dyn Embedder>>,
        vectors: Option<Arc<dyn VectorStore>>,
    ) -> Self {
        Self {
            store,
            embedder,
            vectors,
        }
    }

    /// Whether the semantic path is configured at all
    pub fn semantic_available(&self) -> bool {
        self.embedder.is_some() && self.vectors.is_some()
    }

    fn filters_of(request: &SearchRequest, include_tags: bool) -> MemoryFilters {
        MemoryFilters {
            session_id: request.session_id.clone(),
            domain: request.domain.clone(),
            // For tag search the tags are the query, not a filter
            tags: if include_tags {
                request.tags.clone()
            } else {
                vec![]
            },
            created_after: request.created_after,
            created_before: request.created_before,
            ..Default::default()
        }
    }

    fn plan(request: &SearchRequest) -> Result<(SearchPlan, usize, f64)> {
        let limit = request.limit.unwrap_or(LIMIT_DEFAULT).clamp(1, LIMIT_MAX);
        let min_relevance = request.min_relevance.unwrap_or(0.0);
        if !(0.0..=1.0).contains(&min_relevance) {
            return Err(CoreError::validation("min_relevance must be in [0, 1]"));
        }

        let query = request.query.as_deref().map(str::trim).unwrap_or("");
        let search_type = request.search_type.unwrap_or(if query.is_empty() {
            SearchType::List
        } else {
            SearchType::Lexical
        });

        let plan = match search_type {
            SearchType::Lexical | SearchType::Semantic | SearchType::Hybrid => {
                if query.is_empty() {
                    return Err(CoreError::Validation(format!(
                        "{search_type:?} search requires a non-empty query"
                    )));
                }
                match search_type {
                    SearchType::Lexical => SearchPlan::Lexical {
                        query: query.to_string(),
                    },
                    SearchType::Semantic => SearchPlan::Semantic {
                        query: query.to_string(),
                    },
                    _ => SearchPlan::Hybrid {
                        query: query.to_string(),
                    },
                }
            }
            SearchType::Tags => {
                if request.tags.is_empty() {
                    return Err(CoreError::validation("tag search requires at least one tag"));
                }
                SearchPlan::Tags {
                    tags: request.tags.clone(),
                    operator: request.tag_operator.unwrap_or_default(),
                }
            }
            SearchType::DateRange => {
                if request.created_after.is_none() && request.created_before.is_none() {
                    return Err(CoreError::validation(
                        "date_range search requires at least one bound",
                    ));
                }
                SearchPlan::DateRange
            }
            SearchType::List => SearchPlan::List,
        };
        Ok((plan, limit, min_relevance))
    }

    /// Execute a search request end to end.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let (plan, limit, min_relevance) = Self::plan(request)?;
        let filters = Self::filters_of(request, !matches!(&plan, SearchPlan::Tags { .. }));

        let (mut hits, search_type, degraded) = match &plan {
            SearchPlan::Lexical { query } => {
                (self.lexical(query, &filters, limit)?, SearchType::Lexical, false)
            }
            SearchPlan::Semantic { query } => match self.semantic(query, &filters, limit).await {
                Ok(hits) => (hits, SearchType::Semantic, false),
                Err(err) => {
                    warn!("semantic search degraded to lexical: {err}");
                    (self.lexical(query, &filters, limit)?, SearchType::Semantic, true)
                }
            },
            SearchPlan::Tags { tags, operator } => {
                (self.tags(tags, *operator, &filters)?, SearchType::Tags, false)
            }
            SearchPlan::DateRange => (self.date_range(&filters, limit)?, SearchType::DateRange, false),
            SearchPlan::Hybrid { query } => {
                let (hits, degraded) = self.hybrid(query, &filters, limit).await?;
                (hits, SearchType::Hybrid, degraded)
            }
            SearchPlan::List => (self.list(&filters, limit)?, SearchType::List, false),
        };

        sort_hits(&mut hits);
        hits.retain(|h| h.score >= min_relevance);
        hits.truncate(limit);

        debug!(
            search_type = ?search_type,
            result_count = hits.len(),
            degraded,
            "search complete"
        );

        Ok(SearchResponse {
            total: hits.len(),
            results: hits,
            search_type,
            degraded,
        })
    }

    fn lexical(&self, query: &str, filters: &MemoryFilters, limit: usize) -> Result<Vec<SearchHit>> {
        let raw = self.store.search_fts(query, filters, limit)?;
        Ok(raw
            .into_iter()
            .map(|(memory, rank)| SearchHit {
                memory,
                score: normalize_fts_score(rank),
                match_type: MatchType::Keyword,
            })
            .collect())
    }

    async fn semantic(
        &self,
        query: &str,
        filters: &MemoryFilters,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| CoreError::unavailable("no embedder configured"))?;
        let vectors = self
            .vectors
            .as_ref()
            .ok_or_else(|| CoreError::unavailable("no vector index configured"))?;

        let vector = embedder.embed(query).await?;
        let vector_filter = VectorFilter {
            session_id: filters.session_id.clone(),
            domain: filters.domain.clone(),
            min_importance: None,
        };
        let matches = vectors.query(&vector, limit, &vector_filter).await?;

        let ids: Vec<String> = matches.iter().map(|m| m.id.clone()).collect();
        let scores: HashMap<String, f64> =
            matches.into_iter().map(|m| (m.id, m.score)).collect();
        // Absence in the store is tolerated: the index may lag deletes
        let memories = self.store.fetch_memories(&ids)?;

        Ok(memories
            .into_iter()
            .filter(|m| {
                filters.created_after.is_none_or(|t| m.created_at >= t)
                    && filters.created_before.is_none_or(|t| m.created_at <= t)
                    && filters.tags.iter().all(|t| m.has_tag(t))
            })
            .map(|memory| {
                let score = scores.get(&memory.id).copied().unwrap_or(0.0);
                SearchHit {
                    memory,
                    score,
                    match_type: MatchType::Semantic,
                }
            })
            .collect())
    }

    fn tags(
        &self,
        tags: &[String],
        operator: TagOperator,
        filters: &MemoryFilters,
    ) -> Result<Vec<SearchHit>> {
        // filters_of left tags empty here; membership is scored below
        let candidates = self.store.list_memories(filters)?;
        let requested = tags.len() as f64;

        let hits: Vec<SearchHit> = candidates
            .into_iter()
            .filter_map(|memory| {
                let matches = tags.iter().filter(|t| memory.has_tag(t)).count();
                let keep = match operator {
                    TagOperator::And => matches == tags.len(),
                    TagOperator::Or => matches > 0,
                };
                keep.then(|| SearchHit {
                    score: matches as f64 / requested,
                    memory,
                    match_type: MatchType::Tag,
                })
            })
            .collect();
        Ok(hits)
    }

    fn date_range(&self, filters: &MemoryFilters, limit: usize) -> Result<Vec<SearchHit>> {
        let mut filters = filters.clone();
        filters.limit = Some(limit);
        let memories = self.store.list_memories(&filters)?;
        Ok(memories
            .into_iter()
            .map(|memory| SearchHit {
                memory,
                score: 1.0,
                match_type: MatchType::Date,
            })
            .collect())
    }

    fn list(&self, filters: &MemoryFilters, limit: usize) -> Result<Vec<SearchHit>> {
        let mut filters = filters.clone();
        filters.limit = Some(limit);
        let memories = self.store.list_memories(&filters)?;
        Ok(memories
            .into_iter()
            .map(|memory| SearchHit {
                memory,
                score: 1.0,
                match_type: MatchType::List,
            })
            .collect())
    }

    async fn hybrid(
        &self,
        query: &str,
        filters: &MemoryFilters,
        limit: usize,
    ) -> Result<(Vec<SearchHit>, bool)> {
        let lexical = self.lexical(query, filters, limit)?;
        let semantic = match self.semantic(query, filters, limit).await {
            Ok(hits) => Some(hits),
            Err(err) => {
                warn!("hybrid semantic leg failed, continuing lexical-only: {err}");
                None
            }
        };

        let Some(semantic) = semantic else {
            return Ok((lexical, true));
        };

        let mut merged: HashMap<String, SearchHit> = HashMap::new();
        for hit in lexical {
            merged.insert(hit.memory.id.clone(), hit);
        }
        for hit in semantic {
            match merged.remove(&hit.memory.id) {
                Some(existing) => {
                    // Present in both: weighted fusion with co-occurrence boost
                    let fused = fuse_scores(existing.score, hit.score);
                    merged.insert(
                        hit.memory.id.clone(),
                        SearchHit {
                            memory: hit.memory,
                            score: fused,
                            match_type: MatchType::Hybrid,
                        },
                    );
                }
                None => {
                    merged.insert(hit.memory.id.clone(), hit);
                }
            }
        }

        Ok((merged.into_values().collect(), false))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn test_store() -> (Arc<Store>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().join("test.db")).unwrap();
        (Arc::new(store), dir)
    }

    /// Deterministic embedder: maps text to a tiny hash-derived vector
    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        fn dimensions(&self) -> usize {
            4
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let sum: u32 = text.bytes().map(u32::from).sum();
            Ok(vec![sum as f32, text.len() as f32, 1.0, 0.0])
        }
    }

    /// Embedder that is always down
    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        fn dimensions(&self) -> usize {
            4
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(CoreError::unavailable("stub embedder down"))
        }
    }

    /// In-memory vector store with canned answers
    #[derive(Default)]
    struct StubVectors {
        answers: Mutex<Vec<crate::services::VectorMatch>>,
    }

    #[async_trait]
    impl VectorStore for StubVectors {
        async fn upsert(
            &self,
            _id: &str,
            _vector: &[f32],
            _metadata: &crate::services::VectorMetadata,
        ) -> Result<()> {
            Ok(())
        }
        async fn query(
            &self,
            _vector: &[f32],
            k: usize,
            _filter: &VectorFilter,
        ) -> Result<Vec<crate::services::VectorMatch>> {
            let answers = self.answers.lock().unwrap();
            Ok(answers.iter().take(k).cloned().collect())
        }
        async fn delete(&self, _id: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_normalize_fts_score_curve() {
        assert_eq!(normalize_fts_score(0.0), 1.0);
        assert!((normalize_fts_score(-5.0) - 0.5).abs() < 1e-9);
        assert_eq!(normalize_fts_score(-10.0), 0.0);
        assert_eq!(normalize_fts_score(-50.0), 0.0);
        assert_eq!(normalize_fts_score(5.0), 1.0);
    }

    #[test]
    fn test_fuse_scores_formula() {
        // clamp((0.4a + 0.6b) * 1.2, 0, 1)
        let fused = fuse_scores(0.5, 0.5);
        assert!((fused - 0.6).abs() < 1e-9);
        assert_eq!(fuse_scores(1.0, 1.0), 1.0);
        assert_eq!(fuse_scores(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_plan_defaults() {
        let request = SearchRequest {
            query: Some("hello world".to_string()),
            ..Default::default()
        };
        let (plan, limit, min_relevance) = SearchPlanner::plan(&request).unwrap();
        assert!(matches!(plan, SearchPlan::Lexical { .. }));
        assert_eq!(limit, 10);
        assert_eq!(min_relevance, 0.0);

        let (plan, _, _) = SearchPlanner::plan(&SearchRequest::default()).unwrap();
        assert!(matches!(plan, SearchPlan::List));
    }

    #[test]
    fn test_plan_validation() {
        let empty_query = SearchRequest {
            search_type: Some(SearchType::Semantic),
            ..Default::default()
        };
        assert!(matches!(
            SearchPlanner::plan(&empty_query),
            Err(CoreError::Validation(_))
        ));

        let no_tags = SearchRequest {
            search_type: Some(SearchType::Tags),
            ..Default::default()
        };
        assert!(matches!(
            SearchPlanner::plan(&no_tags),
            Err(CoreError::Validation(_))
        ));

        let no_bounds = SearchRequest {
            search_type: Some(SearchType::DateRange),
            ..Default::default()
        };
        assert!(matches!(
            SearchPlanner::plan(&no_bounds),
            Err(CoreError::Validation(_))
        ));

        let bad_relevance = SearchRequest {
            min_relevance: Some(1.5),
            ..Default::default()
        };
        assert!(matches!(
            SearchPlanner::plan(&bad_relevance),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_plan_clamps_limit() {
        let request = SearchRequest {
            limit: Some(100_000),
            ..Default::default()
        };
        let (_, limit, _) = SearchPlanner::plan(&request).unwrap();
        assert_eq!(limit, LIMIT_MAX);

        let request = SearchRequest {
            limit: Some(0),
            ..Default::default()
        };
        let (_, limit, _) = SearchPlanner::plan(&request).unwrap();
        assert_eq!(limit, 1);
    }

    #[tokio::test]
    async fn test_lexical_search_finds_stored_memory() {
        let (store, _dir) = test_store();
        let stored = store
            .create_memory(Memory::new("Go channels are typed conduits"))
            .unwrap();
        let planner = SearchPlanner::new(store, None, None);

        let response = planner
            .search(&SearchRequest {
                query: Some("channels conduits".to_string()),
                search_type: Some(SearchType::Lexical),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(response.results[0].memory.id, stored.id);
        assert!(response.results[0].score > 0.0);
        assert_eq!(response.results[0].match_type, MatchType::Keyword);
    }

    #[tokio::test]
    async fn test_semantic_degrades_to_lexical() {
        let (store, _dir) = test_store();
        store
            .create_memory(Memory::new("fallback lexical content"))
            .unwrap();
        let planner = SearchPlanner::new(
            store,
            Some(Arc::new(DownEmbedder)),
            Some(Arc::new(StubVectors::default())),
        );

        let response = planner
            .search(&SearchRequest {
                query: Some("fallback content".to_string()),
                search_type: Some(SearchType::Semantic),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(response.degraded);
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].match_type, MatchType::Keyword);
    }

    #[tokio::test]
    async fn test_hybrid_fuses_co_occurring() {
        let (store, _dir) = test_store();
        let a = store
            .create_memory(Memory::new("goroutines schedule work"))
            .unwrap();
        let b = store
            .create_memory(Memory::new("channels pass messages"))
            .unwrap();

        let vectors = StubVectors::default();
        vectors.answers.lock().unwrap().push(crate::services::VectorMatch {
            id: a.id.clone(),
            score: 0.9,
        });
        let planner = SearchPlanner::new(
            store,
            Some(Arc::new(StubEmbedder)),
            Some(Arc::new(vectors)),
        );

        let response = planner
            .search(&SearchRequest {
                query: Some("goroutines channels".to_string()),
                search_type: Some(SearchType::Hybrid),
                limit: Some(5),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(!response.degraded);
        let ids: Vec<&str> = response.results.iter().map(|h| h.memory.id.as_str()).collect();
        assert!(ids.contains(&a.id.as_str()));
        assert!(ids.contains(&b.id.as_str()));

        let hit_a = response.results.iter().find(|h| h.memory.id == a.id).unwrap();
        let hit_b = response.results.iter().find(|h| h.memory.id == b.id).unwrap();
        assert_eq!(hit_a.match_type, MatchType::Hybrid);
        // Co-occurrence fusion must match the prescribed formula exactly
        let lexical_a = planner
            .search(&SearchRequest {
                query: Some("goroutines channels".to_string()),
                search_type: Some(SearchType::Lexical),
                limit: Some(5),
                ..Default::default()
            })
            .await
            .unwrap();
        let raw_a = lexical_a
            .results
            .iter()
            .find(|h| h.memory.id == a.id)
            .unwrap()
            .score;
        assert!((hit_a.score - fuse_scores(raw_a, 0.9)).abs() < 1e-9);
        // The co-occurring memory outranks the single-source one
        assert!(hit_a.score > hit_b.score);
    }

    #[tokio::test]
    async fn test_tags_and_semantics() {
        let (store, _dir) = test_store();
        let mut both = Memory::new("both");
        both.tags = vec!["x".to_string(), "y".to_string()];
        let both = store.create_memory(both).unwrap();
        let mut one = Memory::new("one");
        one.tags = vec!["x".to_string()];
        store.create_memory(one).unwrap();

        let planner = SearchPlanner::new(store, None, None);
        let response = planner
            .search(&SearchRequest {
                search_type: Some(SearchType::Tags),
                tags: vec!["x".to_string(), "y".to_string()],
                tag_operator: Some(TagOperator::And),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].memory.id, both.id);
        assert_eq!(response.results[0].score, 1.0);
    }

    #[tokio::test]
    async fn test_tags_or_partial_score() {
        let (store, _dir) = test_store();
        let mut one = Memory::new("one tag of two");
        one.tags = vec!["x".to_string()];
        store.create_memory(one).unwrap();

        let planner = SearchPlanner::new(store, None, None);
        let response = planner
            .search(&SearchRequest {
                search_type: Some(SearchType::Tags),
                tags: vec!["x".to_string(), "y".to_string()],
                tag_operator: Some(TagOperator::Or),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(response.results.len(), 1);
        assert!((response.results[0].score - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_min_relevance_drops_results() {
        let (store, _dir) = test_store();
        store.create_memory(Memory::new("barely matching text")).unwrap();
        let planner = SearchPlanner::new(store, None, None);

        let response = planner
            .search(&SearchRequest {
                query: Some("barely".to_string()),
                min_relevance: Some(1.0),
                ..Default::default()
            })
            .await
            .unwrap();
        // bm25 normalization lands strictly below 1.0 for any real match
        assert!(response.results.is_empty());
    }

    #[tokio::test]
    async fn test_list_returns_newest_first_with_score_one() {
        let (store, _dir) = test_store();
        let mut old = Memory::new("old");
        old.created_at = Utc::now() - chrono::Duration::days(1);
        old.updated_at = old.created_at;
        store.create_memory(old).unwrap();
        store.create_memory(Memory::new("new")).unwrap();

        let planner = SearchPlanner::new(store, None, None);
        let response = planner.search(&SearchRequest::default()).await.unwrap();
        assert_eq!(response.search_type, SearchType::List);
        assert_eq!(response.results[0].memory.content, "new");
        assert!(response.results.iter().all(|h| h.score == 1.0));
    }
}
