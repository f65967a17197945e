//! Known fair distributions on small pools.

use std::collections::HashMap;
use u_sortition::pool::{Candidate, CandidatePool};
use u_sortition::quota::{BoundKind, QuotaTable, QuotaTarget};
use u_sortition::selection::{SelectionRequest, SelectionResult, Selector, Stage};
use u_sortition::{Algorithm, SelectionError};

/// Five cartoon characters, panels of two: one child, one adult, one from
/// each franchise. lisa and scrooge share home 1, louie and dewey home 2.
fn cartoon() -> (CandidatePool, QuotaTable) {
    let people = [
        ("lisa", "child", "simpsons", "1"),
        ("marge", "adult", "simpsons", "3"),
        ("louie", "child", "ducktales", "2"),
        ("dewey", "child", "ducktales", "2"),
        ("scrooge", "adult", "ducktales", "1"),
    ];
    let pool = CandidatePool::new(
        people
            .iter()
            .map(|&(id, age, franchise, home)| {
                Candidate::new(id)
                    .with_feature("age", age)
                    .with_feature("franchise", franchise)
                    .with_address(home)
            })
            .collect(),
    )
    .unwrap();
    let quotas = QuotaTable::new(vec![
        QuotaTarget::new("age", "child", 1, 2),
        QuotaTarget::new("age", "adult", 1, 2),
        QuotaTarget::new("franchise", "simpsons", 1, 2),
        QuotaTarget::new("franchise", "ducktales", 1, 2),
    ])
    .unwrap();
    (pool, quotas)
}

/// Every panel of two needs `a`, the only person with v1 everywhere.
fn forced(exact_v1: bool) -> (CandidatePool, QuotaTable) {
    let rows = [
        ("a", "v1", "v1", "v1"),
        ("b", "v1", "v2", "v2"),
        ("c", "v2", "v1", "v2"),
        ("d", "v2", "v2", "v1"),
    ];
    let pool = CandidatePool::new(
        rows.iter()
            .map(|&(id, f1, f2, f3)| {
                Candidate::new(id)
                    .with_feature("f1", f1)
                    .with_feature("f2", f2)
                    .with_feature("f3", f3)
            })
            .collect(),
    )
    .unwrap();
    let v1_max = if exact_v1 { 1 } else { 2 };
    let mut targets = Vec::new();
    for f in ["f1", "f2", "f3"] {
        targets.push(QuotaTarget::new(f, "v1", 1, v1_max));
        targets.push(QuotaTarget::new(f, "v2", 0, 2));
    }
    (pool, QuotaTable::new(targets).unwrap())
}

/// Four liberal men, a liberal woman, a conservative man and a conservative
/// woman; panels of five with exactly one woman and one conservative.
fn politics() -> (CandidatePool, QuotaTable) {
    let people = [
        ("adam", "male", "liberal"),
        ("brian", "male", "liberal"),
        ("cameron", "male", "liberal"),
        ("dave", "male", "liberal"),
        ("elinor", "female", "liberal"),
        ("frank", "male", "conservative"),
        ("grace", "female", "conservative"),
    ];
    let pool = CandidatePool::new(
        people
            .iter()
            .map(|&(id, gender, political)| {
                Candidate::new(id)
                    .with_feature("gender", gender)
                    .with_feature("political", political)
            })
            .collect(),
    )
    .unwrap();
    let quotas = QuotaTable::new(vec![
        QuotaTarget::new("gender", "female", 1, 1),
        QuotaTarget::new("gender", "male", 4, 4),
        QuotaTarget::new("political", "liberal", 4, 4),
        QuotaTarget::new("political", "conservative", 1, 1),
    ])
    .unwrap();
    (pool, quotas)
}

fn run(pool: &CandidatePool, quotas: &QuotaTable, request: SelectionRequest) -> SelectionResult {
    Selector::new().run(pool, quotas, &request).unwrap()
}

fn marginals(result: &SelectionResult) -> HashMap<String, f64> {
    result.marginals.clone().unwrap().into_iter().collect()
}

fn assert_close(p: &HashMap<String, f64>, id: &str, expected: f64, tolerance: f64) {
    let got = p[id];
    assert!((got - expected).abs() < tolerance, "{id}: got {got}, expected {expected}");
}

#[test]
fn test_maximin_cartoon() {
    let (pool, quotas) = cartoon();
    let request = SelectionRequest::new(2).with_algorithm(Algorithm::Maximin).with_seed(1);
    let result = run(&pool, &quotas, request);
    let p = marginals(&result);
    for id in ["lisa", "scrooge", "louie", "dewey"] {
        assert_close(&p, id, 1.0 / 3.0, 1e-4);
    }
    assert_close(&p, "marge", 2.0 / 3.0, 1e-4);
    assert!(result.is_converged());
}

#[test]
fn test_maximin_cartoon_same_address() {
    let (pool, quotas) = cartoon();
    let request = SelectionRequest::new(2)
        .with_algorithm(Algorithm::Maximin)
        .with_seed(1)
        .with_same_address(vec!["home".into()]);
    let result = run(&pool, &quotas, request);
    let p = marginals(&result);
    assert_close(&p, "lisa", 0.0, 1e-9);
    assert_close(&p, "scrooge", 0.0, 1e-9);
    assert_close(&p, "louie", 0.5, 1e-4);
    assert_close(&p, "dewey", 0.5, 1e-4);
    assert_close(&p, "marge", 1.0, 1e-4);
    assert!(result
        .messages
        .iter()
        .any(|m| m == "Candidate lisa is not contained in any feasible panel."));
    assert!(result.selected_ids().contains(&"marge"));
}

#[test]
fn test_forced_candidate() {
    let (pool, quotas) = forced(false);
    for algorithm in [Algorithm::Maximin, Algorithm::Leximin, Algorithm::Nash] {
        let request = SelectionRequest::new(2).with_algorithm(algorithm).with_seed(4);
        let result = run(&pool, &quotas, request);
        let p = marginals(&result);
        assert_close(&p, "a", 1.0, 1e-3);
        for id in ["b", "c", "d"] {
            assert_close(&p, id, 1.0 / 3.0, 1e-3);
        }
        assert!(result.selected_ids().contains(&"a"), "{algorithm}");
    }
}

#[test]
fn test_infeasible_quotas() {
    let (pool, quotas) = forced(true);
    let err = Selector::new()
        .run(&pool, &quotas, &SelectionRequest::new(2).with_algorithm(Algorithm::Maximin))
        .unwrap_err();
    match err {
        SelectionError::Feasibility { diagnostics } => assert!(!diagnostics.is_empty()),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_maximin_politics() {
    let (pool, quotas) = politics();
    let request = SelectionRequest::new(5).with_algorithm(Algorithm::Maximin).with_seed(2);
    let result = run(&pool, &quotas, request);
    let p = marginals(&result);
    assert!(p.values().all(|&q| q >= 0.5 - 1e-4), "{p:?}");
    assert_close(&p, "elinor", 0.5, 1e-4);
    assert_close(&p, "grace", 0.5, 1e-4);
}

#[test]
fn test_nash_politics() {
    let (pool, quotas) = politics();
    let request = SelectionRequest::new(5).with_algorithm(Algorithm::Nash).with_seed(2);
    let result = run(&pool, &quotas, request);
    let p = marginals(&result);
    for id in ["adam", "brian", "cameron", "dave"] {
        assert_close(&p, id, 6.0 / 7.0, 1e-3);
    }
    assert_close(&p, "elinor", 4.0 / 7.0, 1e-3);
    assert_close(&p, "frank", 4.0 / 7.0, 1e-3);
    assert_close(&p, "grace", 3.0 / 7.0, 1e-3);
}

#[test]
fn test_leximin_politics_dominates_maximin() {
    let (pool, quotas) = politics();
    let sorted = |algorithm| {
        let request = SelectionRequest::new(5).with_algorithm(algorithm).with_seed(3);
        let result = run(&pool, &quotas, request);
        let mut values: Vec<f64> = marginals(&result).into_values().collect();
        values.sort_by(|a, b| a.total_cmp(b));
        values
    };
    let maximin = sorted(Algorithm::Maximin);
    let leximin = sorted(Algorithm::Leximin);
    assert!(leximin[0] >= maximin[0] - 1e-4);
}

#[test]
fn test_sampled_frequencies_follow_marginals() {
    let (pool, quotas) = cartoon();
    let trials = 300;
    let mut marge = 0;
    for seed in 1..=trials {
        let result = run(
            &pool,
            &quotas,
            SelectionRequest::new(2).with_algorithm(Algorithm::Maximin).with_seed(seed),
        );
        if result.selected_ids().contains(&"marge") {
            marge += 1;
        }
    }
    let freq = marge as f64 / trials as f64;
    assert!((freq - 2.0 / 3.0).abs() < 0.1, "marge selected with frequency {freq}");
}

#[test]
fn test_same_seed_same_panel() {
    let (pool, quotas) = politics();
    let request = SelectionRequest::new(5).with_algorithm(Algorithm::Leximin).with_seed(99);
    let first = run(&pool, &quotas, request.clone());
    let second = run(&pool, &quotas, request);
    assert_eq!(first.selected_ids(), second.selected_ids());
}

fn ten_people(male: (usize, usize), female: (usize, usize)) -> (CandidatePool, QuotaTable) {
    let pool = CandidatePool::new(
        (0..10)
            .map(|i| {
                let gender = if i < 5 { "M" } else { "F" };
                Candidate::new(format!("p{i}")).with_feature("gender", gender)
            })
            .collect(),
    )
    .unwrap();
    let quotas = QuotaTable::new(vec![
        QuotaTarget::new("gender", "M", male.0, male.1),
        QuotaTarget::new("gender", "F", female.0, female.1),
    ])
    .unwrap();
    (pool, quotas)
}

#[test]
fn test_ten_people_every_algorithm() {
    let (pool, quotas) = ten_people((2, 3), (2, 3));
    for algorithm in [Algorithm::Legacy, Algorithm::Maximin, Algorithm::Leximin, Algorithm::Nash] {
        let request = SelectionRequest::new(5).with_algorithm(algorithm).with_seed(11);
        let result = run(&pool, &quotas, request);
        assert_eq!(result.selected.len(), 5);
        assert_eq!(result.remaining.len(), 5);
        let men = result.selected.iter().filter(|c| c.feature("gender") == Some("M")).count();
        assert!((2..=3).contains(&men), "{algorithm}: {men} men");
        if algorithm.is_fractional() {
            let p = marginals(&result);
            for q in p.values() {
                assert!((q - 0.5).abs() < 1e-3, "{algorithm}: {p:?}");
            }
        }
    }
}

#[test]
fn test_more_men_than_available() {
    let (pool, quotas) = ten_people((6, 6), (0, 5));
    let err = Selector::new()
        .run(&pool, &quotas, &SelectionRequest::new(6).with_algorithm(Algorithm::Legacy))
        .unwrap_err();
    assert!(matches!(err, SelectionError::Feasibility { .. }), "{err}");
}

#[test]
fn test_legacy_seed_42_repeats() {
    let (pool, quotas) = ten_people((2, 3), (2, 3));
    let request = SelectionRequest::new(5).with_algorithm(Algorithm::Legacy).with_seed(42);
    let first = run(&pool, &quotas, request.clone());
    let second = run(&pool, &quotas, request);
    assert_eq!(first.selected_ids(), second.selected_ids());
}

#[test]
fn test_relaxed_to_flex_bounds() {
    let (pool, _) = ten_people((0, 5), (0, 5));
    let quotas = QuotaTable::new(vec![
        QuotaTarget::new("gender", "M", 6, 6).with_flex(2, 6),
        QuotaTarget::new("gender", "F", 0, 0).with_flex(0, 4),
    ])
    .unwrap();

    for algorithm in [Algorithm::Legacy, Algorithm::Maximin, Algorithm::Leximin, Algorithm::Nash] {
        let request = SelectionRequest::new(6).with_algorithm(algorithm).with_seed(8);
        let result = run(&pool, &quotas, request);
        assert!(result.relaxed, "{algorithm}");
        assert_eq!(result.bound_kind, BoundKind::Flex, "{algorithm}");
        assert!(result.stages.contains(&Stage::Relaxed), "{algorithm}: {:?}", result.stages);
        assert!(result
            .messages
            .iter()
            .any(|m| m == "Quotas required relaxation to flex bounds."));
        for count in &result.category_counts {
            assert!(count.is_within_bounds(), "{algorithm}: {count}");
        }
        let men = result.category_counts.iter().find(|c| c.value == "M").unwrap();
        assert_eq!((men.lower, men.upper), (2, 6));
        assert_eq!(result.selected.len(), 6);
    }
}
