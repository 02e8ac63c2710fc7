//! End-to-end filter runs against the in-memory sink.

use serde_json::{json, Value};
use sift::memory::{MemorySink, Predicate};
use sift::{
    Filter, FilterError, FilterRequest, FilterSettings, HeaderFallback, HeaderSelector, Logical,
    RelationRules,
};

// ============================================================================
// Helpers
// ============================================================================

/// Three 15-row buckets: `stopped`, `active`, `pending`.
fn bucketed_rows() -> Vec<Value> {
    let mut rows = Vec::new();
    for (bucket, status) in ["stopped", "active", "pending"].iter().enumerate() {
        for i in 0..15 {
            rows.push(json!({"id": bucket * 15 + i, "status": status}));
        }
    }
    rows
}

fn compare(field: &str, operator: &str, value: Value) -> Predicate {
    Predicate::Compare {
        field: field.into(),
        operator: operator.into(),
        value,
    }
}

// ============================================================================
// Flat ruleset
// ============================================================================

#[test]
fn ruleset_single_clause() {
    let filter = Filter::builder()
        .settings(
            FilterSettings::builder()
                .allow_fields(["status"])
                .default_operator("eq")
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    let request = FilterRequest::from_json(json!({"status": "pending"})).unwrap();
    let mut sink = MemorySink::new();
    filter.apply(&request, &mut sink).unwrap();

    assert_eq!(sink.predicates(), [compare("status", "=", json!("pending"))]);
    assert_eq!(sink.count(&bucketed_rows()), 15);
}

// ============================================================================
// Tree with nested OR
// ============================================================================

#[test]
fn tree_nested_or_matches_union() {
    let filter = Filter::builder()
        .engine("tree")
        .settings(FilterSettings::builder().allow_fields(["*"]).build().unwrap())
        .build()
        .unwrap();

    let request = FilterRequest::from_json(json!({
        "and": [
            {"field": "status", "operator": "eq", "value": "stopped"},
            {"or": [
                {"field": "status", "operator": "eq", "value": "active"},
                {"field": "status", "operator": "eq", "value": "pending"}
            ]}
        ]
    }))
    .unwrap();
    let mut sink = MemorySink::new();
    filter.apply(&request, &mut sink).unwrap();

    let [Predicate::Group {
        logical: Logical::And,
        children,
    }] = sink.predicates()
    else {
        panic!("expected a single AND group, got {:?}", sink.predicates());
    };
    assert_eq!(children[0], compare("status", "=", json!("stopped")));
    assert!(matches!(
        &children[1],
        Predicate::Group { logical: Logical::Or, children } if children.len() == 2
    ));

    // The OR group joins `stopped` with OR: (stopped) ∪ (active ∪ pending).
    assert_eq!(sink.count(&bucketed_rows()), 45);
}

#[test]
fn tree_and_of_or_groups_intersects() {
    let filter = Filter::builder()
        .engine("tree")
        .settings(FilterSettings::builder().allow_any_field().build().unwrap())
        .build()
        .unwrap();

    // status = stopped AND (id < 5 OR id > 40), spelled with an explicit
    // AND wrapper around the OR group.
    let request = FilterRequest::from_json(json!({
        "and": [
            {"field": "status", "operator": "eq", "value": "stopped"},
            {"and": [{"or": [
                {"field": "id", "operator": "lt", "value": 5},
                {"field": "id", "operator": "gt", "value": 40}
            ]}]}
        ]
    }))
    .unwrap();
    let mut sink = MemorySink::new();
    filter.apply(&request, &mut sink).unwrap();

    assert_eq!(sink.count(&bucketed_rows()), 5);
}

// ============================================================================
// Expression with relation
// ============================================================================

#[test]
fn expression_with_relation() {
    let filter = Filter::builder()
        .engine("expression")
        .settings(
            FilterSettings::builder()
                .allow_fields(["status"])
                .relations(RelationRules::list(["tags"]))
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    let request = FilterRequest::from_json(json!({
        "tags.name": "stopped",
        "status": {"eq": "stopped"}
    }))
    .unwrap();
    let mut sink = MemorySink::new();
    filter.apply(&request, &mut sink).unwrap();

    assert!(sink.predicates().contains(&compare("status", "=", json!("stopped"))));
    assert!(sink.predicates().contains(&Predicate::Has {
        relation: "tags".into(),
        inner: vec![compare("name", "=", json!("stopped"))],
    }));

    let rows = vec![
        json!({"status": "stopped", "tags": [{"name": "stopped"}]}),
        json!({"status": "stopped", "tags": [{"name": "active"}]}),
        json!({"status": "active", "tags": [{"name": "stopped"}]}),
    ];
    assert_eq!(sink.count(&rows), 1);
}

// ============================================================================
// Invalid tree leaf
// ============================================================================

#[test]
fn invalid_tree_leaf_fails_in_both_modes() {
    for strict in [true, false] {
        let filter = Filter::builder()
            .engine("tree")
            .settings(
                FilterSettings::builder()
                    .allow_any_field()
                    .strict(strict)
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();

        let request = FilterRequest::from_json(json!({
            "and": [{"incorrectly": "status", "value": "pending"}]
        }))
        .unwrap();
        let mut sink = MemorySink::new();
        let result = filter.apply(&request, &mut sink);

        assert!(
            matches!(result, Err(FilterError::InvalidDataFormat { .. })),
            "strict={strict}: {result:?}"
        );
        assert!(sink.is_empty());
    }
}

// ============================================================================
// Header-driven engine override
// ============================================================================

#[test]
fn disallowed_header_engine_with_error_fallback() {
    let filter = Filter::builder()
        .settings(FilterSettings::builder().allow_any_field().build().unwrap())
        .header(
            HeaderSelector::new("X-Filter-Mode")
                .allow(["tree", "ruleset"])
                .fallback(HeaderFallback::Error),
        )
        .build()
        .unwrap();

    let request = FilterRequest::from_json(json!({"status": "pending"}))
        .unwrap()
        .with_header("X-Filter-Mode", "expression");
    let mut sink = MemorySink::new();
    let result = filter.apply(&request, &mut sink);

    assert!(matches!(
        result,
        Err(FilterError::EngineNotAllowed { ref value, .. }) if value == "expression"
    ));
    assert!(sink.is_empty());
}

#[test]
fn disallowed_header_engine_with_default_fallback() {
    let filter = Filter::builder()
        .settings(FilterSettings::builder().allow_any_field().build().unwrap())
        .header(HeaderSelector::new("X-Filter-Mode").allow(["tree"]))
        .build()
        .unwrap();

    let request = FilterRequest::from_json(json!({"status": "pending"}))
        .unwrap()
        .with_header("x-filter-mode", "expression");
    let mut sink = MemorySink::new();
    let report = filter.apply(&request, &mut sink).unwrap();

    assert_eq!(report.engine, "ruleset");
    assert_eq!(sink.predicates(), [compare("status", "=", json!("pending"))]);
}

#[test]
fn header_selects_allowed_engine() {
    let filter = Filter::builder()
        .settings(FilterSettings::builder().allow_any_field().build().unwrap())
        .header(HeaderSelector::new("X-Filter-Mode").allow(["tree"]))
        .build()
        .unwrap();

    let request = FilterRequest::from_json(json!({
        "or": [{"field": "status", "operator": "eq", "value": "active"}]
    }))
    .unwrap()
    .with_header("X-Filter-Mode", "tree");
    let mut sink = MemorySink::new();
    let report = filter.apply(&request, &mut sink).unwrap();

    assert_eq!(report.engine, "tree");
    assert_eq!(sink.count(&bucketed_rows()), 15);
}
