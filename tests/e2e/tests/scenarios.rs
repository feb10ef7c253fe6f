//! End-to-end scenarios: store → recall → relate → analyze flows running
//! against the full engine with deterministic stub services.

use ultrathink_core::{
    AnalysisFilters, AnalysisRequest, RelationshipRequest, SearchRequest, SearchType,
    StoreMemoryRequest, TagOperator,
};
use ultrathink_e2e_tests::{engine_lexical_only, engine_with_stubs};

async fn store(
    engine: &std::sync::Arc<ultrathink_core::Engine>,
    content: &str,
    importance: i32,
    tags: &[&str],
) -> String {
    engine
        .ingestor()
        .store(StoreMemoryRequest {
            content: content.to_string(),
            importance: Some(importance),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        })
        .await
        .unwrap()
        .memory
        .id
}

// ============================================================================
// SCENARIO 1: store and lexical recall
// ============================================================================

#[tokio::test]
async fn store_and_lexical_recall() {
    let (engine, _dir) = engine_lexical_only();
    let id = store(
        &engine,
        "Go channels are typed conduits",
        8,
        &["go", "concurrency"],
    )
    .await;

    let response = engine
        .planner()
        .search(&SearchRequest {
            query: Some("channels conduits".to_string()),
            search_type: Some(SearchType::Lexical),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(response.results[0].memory.id, id);
    assert!(response.results[0].score > 0.0);
}

// ============================================================================
// SCENARIO 2: hybrid fusion boosts co-occurring results
// ============================================================================

#[tokio::test]
async fn hybrid_fusion_boosts_co_occurrence() {
    let (engine, _chat, vectors, _dir) = engine_with_stubs("{}");
    let a = store(&engine, "goroutine scheduling and goroutine communication", 5, &[]).await;
    let b = store(&engine, "channels pass messages between workers", 5, &[]).await;
    assert_eq!(vectors.len(), 2, "both memories were embedded");

    let response = engine
        .planner()
        .search(&SearchRequest {
            query: Some("goroutine communication".to_string()),
            search_type: Some(SearchType::Hybrid),
            limit: Some(5),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(!response.degraded);
    let ids: Vec<&str> = response
        .results
        .iter()
        .map(|h| h.memory.id.as_str())
        .collect();
    assert!(ids.contains(&a.as_str()), "semantic+lexical match present");

    // The memory matching both legs outranks any single-leg match
    let hit_a = response.results.iter().find(|h| h.memory.id == a).unwrap();
    if let Some(hit_b) = response.results.iter().find(|h| h.memory.id == b) {
        assert!(hit_a.score >= hit_b.score);
    }
}

// ============================================================================
// SCENARIO 3: graph traversal with distances
// ============================================================================

#[tokio::test]
async fn graph_traversal_distances_and_edges() {
    let (engine, _dir) = engine_lexical_only();
    let a = store(&engine, "first concept", 5, &[]).await;
    let b = store(&engine, "second concept", 5, &[]).await;
    let c = store(&engine, "third concept", 5, &[]).await;

    engine
        .graph()
        .create_relationship(&RelationshipRequest {
            source_id: a.clone(),
            target_id: b.clone(),
            relation_type: "similar".to_string(),
            strength: 0.8,
            context: None,
            auto_generated: false,
        })
        .unwrap();
    engine
        .graph()
        .create_relationship(&RelationshipRequest {
            source_id: b.clone(),
            target_id: c.clone(),
            relation_type: "expands".to_string(),
            strength: 0.6,
            context: None,
            auto_generated: false,
        })
        .unwrap();

    let view = engine.graph().map_graph(&a, 2).unwrap();

    let distance = |id: &str| {
        view.nodes
            .iter()
            .find(|n| n.id == id)
            .map(|n| n.distance)
            .unwrap()
    };
    assert_eq!(view.nodes.len(), 3);
    assert_eq!(distance(&a), 0);
    assert_eq!(distance(&b), 1);
    assert_eq!(distance(&c), 2);
    assert_eq!(view.edges.len(), 2);
    for edge in &view.edges {
        assert!(view.nodes.iter().any(|n| n.id == edge.source_id));
        assert!(view.nodes.iter().any(|n| n.id == edge.target_id));
    }
}

// ============================================================================
// SCENARIO 4: tag AND excludes partial matches
// ============================================================================

#[tokio::test]
async fn tag_and_excludes_partial_matches() {
    let (engine, _dir) = engine_lexical_only();
    let both = store(&engine, "has both tags", 5, &["x", "y"]).await;
    let _one = store(&engine, "has one tag", 5, &["x"]).await;

    let response = engine
        .planner()
        .search(&SearchRequest {
            search_type: Some(SearchType::Tags),
            tags: vec!["x".to_string(), "y".to_string()],
            tag_operator: Some(TagOperator::And),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].memory.id, both);
    assert_eq!(response.results[0].score, 1.0);
}

// ============================================================================
// SCENARIO 5: grounded question with empty store
// ============================================================================

#[tokio::test]
async fn grounded_question_refuses_on_empty_store() {
    let (engine, chat, _vectors, _dir) =
        engine_with_stubs(r#"{"answer": "must never be used", "confidence": 1.0}"#);

    let response = engine
        .analyzer()
        .run(AnalysisRequest::Question {
            question: "anything".to_string(),
            filters: AnalysisFilters::default(),
            context_limit: None,
        })
        .await
        .unwrap();

    assert!(response
        .answer
        .unwrap()
        .contains("No information available"));
    assert!(response.sources.is_empty());
    assert_eq!(chat.calls(), 0, "no chat request without grounding");
}

// ============================================================================
// SCENARIO 6: ingestion deduplication
// ============================================================================

#[tokio::test]
async fn ingestion_deduplicates_by_external_id() {
    let (engine, _dir) = engine_lexical_only();
    engine
        .store()
        .create_data_source("S", "jsonl", serde_json::json!({}))
        .unwrap();

    let items = vec![ultrathink_core::IngestItem {
        external_id: "e1".to_string(),
        content: "c".to_string(),
        timestamp: None,
        metadata: None,
        tags: vec![],
        domain: None,
    }];

    let first = engine
        .ingestor()
        .ingest_batch("S", items.clone(), None)
        .await
        .unwrap();
    assert_eq!(
        (first.processed, first.created, first.duplicates_skipped),
        (1, 1, 0)
    );

    let second = engine.ingestor().ingest_batch("S", items, None).await.unwrap();
    assert_eq!(
        (second.processed, second.created, second.duplicates_skipped),
        (1, 0, 1)
    );
}

// ============================================================================
// Grounded answer with context
// ============================================================================

#[tokio::test]
async fn grounded_question_cites_sources() {
    let (engine, chat, _vectors, _dir) = engine_with_stubs(
        r#"{"answer": "Channels are typed conduits.", "insights": ["use them for fan-in"], "confidence": 0.85}"#,
    );
    let id = store(&engine, "Go channels are typed conduits", 7, &["go"]).await;

    let response = engine
        .analyzer()
        .run(AnalysisRequest::Question {
            question: "what are channels".to_string(),
            filters: AnalysisFilters::default(),
            context_limit: Some(5),
        })
        .await
        .unwrap();

    assert_eq!(response.answer.as_deref(), Some("Channels are typed conduits."));
    assert!(response.sources.contains(&id));
    assert_eq!(response.confidence, 0.85);
    assert_eq!(chat.calls(), 1);
}

// ============================================================================
// Semantic degradation end to end
// ============================================================================

#[tokio::test]
async fn semantic_degrades_to_lexical_when_services_down() {
    let (engine, _dir) = engine_lexical_only();
    store(&engine, "resilient lexical retrieval", 5, &[]).await;

    let response = engine
        .planner()
        .search(&SearchRequest {
            query: Some("resilient retrieval".to_string()),
            search_type: Some(SearchType::Semantic),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(response.degraded);
    assert_eq!(response.results.len(), 1);
}

// ============================================================================
// Vector delete follows memory delete
// ============================================================================

#[tokio::test]
async fn delete_removes_vector_and_edges() {
    let (engine, _chat, vectors, _dir) = engine_with_stubs("{}");
    let a = store(&engine, "ephemeral entry", 5, &[]).await;
    let b = store(&engine, "surviving entry", 5, &[]).await;
    engine
        .graph()
        .create_relationship(&RelationshipRequest {
            source_id: a.clone(),
            target_id: b.clone(),
            relation_type: "references".to_string(),
            strength: 0.5,
            context: None,
            auto_generated: false,
        })
        .unwrap();
    assert_eq!(vectors.len(), 2);

    engine.ingestor().delete(&a).await.unwrap();

    assert_eq!(vectors.len(), 1);
    assert!(engine.store().get_memory(&a).unwrap().is_none());
    assert!(engine
        .graph()
        .find_related(&b, &Default::default())
        .unwrap()
        .is_empty());
}
