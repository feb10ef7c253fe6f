//! Invariant and idempotence properties exercised through the public
//! engine surface.

use std::sync::Arc;

use ultrathink_core::{
    fuse_scores, AnalysisFilters, AnalysisRequest, CoreError, MemoryPatch, RelationshipRequest,
    SearchRequest, SearchType, StoreMemoryRequest,
};
use ultrathink_e2e_tests::{engine_lexical_only, engine_with_stubs};

async fn store(
    engine: &Arc<ultrathink_core::Engine>,
    content: &str,
) -> ultrathink_core::Memory {
    engine
        .ingestor()
        .store(StoreMemoryRequest {
            content: content.to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
        .memory
}

#[tokio::test]
async fn created_content_reads_back_identically() {
    let (engine, _dir) = engine_lexical_only();
    for content in [
        "plain ascii",
        "unicode: héllo wörld 你好",
        "multi\nline\ncontent",
        "trailing spaces   ",
    ] {
        let memory = store(&engine, content).await;
        let fetched = engine.store().require_memory(&memory.id).unwrap();
        assert_eq!(fetched.content, content);
        assert_eq!(fetched.importance, memory.importance);
        assert_eq!(fetched.created_at, memory.created_at);
        let mut expected_tags = fetched.tags.clone();
        expected_tags.sort();
        let mut actual_tags = memory.tags.clone();
        actual_tags.sort();
        assert_eq!(expected_tags, actual_tags);
    }
}

#[tokio::test]
async fn deleting_memory_removes_it_from_related() {
    let (engine, _dir) = engine_lexical_only();
    let m1 = store(&engine, "first").await;
    let m2 = store(&engine, "second").await;

    for relation in ["references", "contradicts", "causes"] {
        engine
            .graph()
            .create_relationship(&RelationshipRequest {
                source_id: m1.id.clone(),
                target_id: m2.id.clone(),
                relation_type: relation.to_string(),
                strength: 0.5,
                context: None,
                auto_generated: false,
            })
            .unwrap();
    }

    engine.store().delete_memory(&m1.id).unwrap();

    let related = engine.graph().find_related(&m2.id, &Default::default()).unwrap();
    assert!(
        related.iter().all(|r| r.memory.id != m1.id),
        "no related entry references the deleted memory"
    );
    assert!(related.is_empty());
}

#[tokio::test]
async fn fts_finds_memories_containing_all_query_terms() {
    let (engine, _dir) = engine_lexical_only();
    let memory = store(&engine, "ownership borrowing lifetimes").await;

    for query in ["ownership", "borrowing lifetimes", "ownership borrowing lifetimes"] {
        let response = engine
            .planner()
            .search(&SearchRequest {
                query: Some(query.to_string()),
                search_type: Some(SearchType::Lexical),
                ..Default::default()
            })
            .await
            .unwrap();
        let hit = response
            .results
            .iter()
            .find(|h| h.memory.id == memory.id)
            .unwrap_or_else(|| panic!("query {query:?} missed the memory"));
        assert!(hit.score > 0.0);
    }
}

#[tokio::test]
async fn hybrid_fused_score_matches_formula() {
    let (engine, _chat, _vectors, _dir) = engine_with_stubs("{}");
    let memory = store(&engine, "fusion formula check").await;

    let lexical = engine
        .planner()
        .search(&SearchRequest {
            query: Some("fusion formula".to_string()),
            search_type: Some(SearchType::Lexical),
            ..Default::default()
        })
        .await
        .unwrap();
    let semantic = engine
        .planner()
        .search(&SearchRequest {
            query: Some("fusion formula".to_string()),
            search_type: Some(SearchType::Semantic),
            ..Default::default()
        })
        .await
        .unwrap();
    let hybrid = engine
        .planner()
        .search(&SearchRequest {
            query: Some("fusion formula".to_string()),
            search_type: Some(SearchType::Hybrid),
            ..Default::default()
        })
        .await
        .unwrap();

    let lex = lexical.results.iter().find(|h| h.memory.id == memory.id);
    let sem = semantic.results.iter().find(|h| h.memory.id == memory.id);
    let hyb = hybrid
        .results
        .iter()
        .find(|h| h.memory.id == memory.id)
        .expect("hybrid returns the memory");

    if let (Some(lex), Some(sem)) = (lex, sem) {
        let expected = fuse_scores(lex.score, sem.score);
        assert!(
            (hyb.score - expected).abs() < 1e-9,
            "fused score {} must equal clamp((0.4*{} + 0.6*{})*1.2, 0, 1) = {}",
            hyb.score,
            lex.score,
            sem.score,
            expected
        );
    }
}

#[tokio::test]
async fn repeated_delete_returns_not_found() {
    let (engine, _dir) = engine_lexical_only();
    let memory = store(&engine, "delete twice").await;
    engine.store().delete_memory(&memory.id).unwrap();
    for _ in 0..3 {
        assert!(matches!(
            engine.store().delete_memory(&memory.id),
            Err(CoreError::NotFound(_))
        ));
    }
}

#[tokio::test]
async fn empty_update_only_bumps_updated_at() {
    let (engine, _dir) = engine_lexical_only();
    let memory = store(&engine, "noop patch").await;

    let updated = engine
        .store()
        .update_memory(&memory.id, &MemoryPatch::default())
        .unwrap();
    assert_eq!(updated.content, memory.content);
    assert_eq!(updated.importance, memory.importance);
    assert_eq!(updated.tags, memory.tags);
    assert_eq!(updated.created_at, memory.created_at);
    assert!(updated.updated_at > memory.updated_at);
}

#[tokio::test]
async fn concurrent_creates_yield_distinct_rows() {
    let (engine, _dir) = engine_lexical_only();
    let mut handles = vec![];
    for i in 0..16 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .ingestor()
                .store(StoreMemoryRequest {
                    content: format!("unique concurrent content {i}"),
                    ..Default::default()
                })
                .await
                .unwrap()
                .memory
                .id
        }));
    }

    let mut ids = std::collections::HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap());
    }
    assert_eq!(ids.len(), 16);
    assert_eq!(engine.store().count_memories().unwrap(), 16);
}

#[tokio::test]
async fn concurrent_identical_analyses_issue_one_chat_call() {
    let (engine, chat, _vectors, _dir) =
        engine_with_stubs(r#"{"answer": "one call", "confidence": 0.9}"#);
    store(&engine, "coalescing subject matter").await;

    let mut handles = vec![];
    for _ in 0..8 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .analyzer()
                .run(AnalysisRequest::Question {
                    question: "coalescing subject".to_string(),
                    filters: AnalysisFilters::default(),
                    context_limit: None,
                })
                .await
        }));
    }
    for handle in handles {
        let response = handle.await.unwrap().unwrap();
        assert_eq!(response.answer.as_deref(), Some("one call"));
    }
    assert_eq!(chat.calls(), 1, "exactly one upstream chat request");
}
