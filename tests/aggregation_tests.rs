use aml_market::decision::classify;
use aml_market::{Action, AggregationEngine, Participant, RunningScore, Vote};
use proptest::prelude::*;

fn institution_votes(weights: &[f64], confidences: &[f64]) -> Vec<Vote> {
    weights
        .iter()
        .zip(confidences)
        .enumerate()
        .map(|(i, (weight, confidence))| {
            let id = format!("Bank_{i}");
            Vote::new(&Participant::institution(&id, &id, *weight), *confidence)
        })
        .collect()
}

fn closed_form(votes: &[Vote]) -> f64 {
    let counted: Vec<&Vote> = votes.iter().filter(|v| !v.is_observer).collect();
    let total: f64 = counted.iter().map(|v| v.weight).sum();
    if total == 0.0 {
        return 0.0;
    }
    let sum: f64 = counted.iter().map(|v| v.confidence / 100.0 * v.weight).sum();
    (sum / total * 1000.0).round() / 10.0
}

#[test]
fn test_reputation_weighted_scenario_blocks() {
    let votes = institution_votes(&[1.8, 1.5, 1.2, 2.0], &[89.0, 85.0, 88.0, 84.0]);
    let engine = AggregationEngine::new();
    assert_eq!(engine.aggregate(&votes), 86.4);
    assert_eq!(classify(engine.aggregate(&votes)), Action::Block);
}

#[test]
fn test_uniform_stakes_land_in_review() {
    let votes = institution_votes(&[200.0, 150.0, 120.0, 250.0], &[70.0; 4]);
    let (score, action) = AggregationEngine::new().aggregate_and_classify(&votes);
    assert_eq!(score, 70.0);
    assert_eq!(action, Action::Review);
}

#[test]
fn test_single_institution_approves() {
    let votes = institution_votes(&[100.0], &[50.0]);
    let (score, action) = AggregationEngine::new().aggregate_and_classify(&votes);
    assert_eq!(score, 50.0);
    assert_eq!(action, Action::Approve);
}

#[test]
fn test_all_zero_weights() {
    let votes = institution_votes(&[0.0, 0.0, 0.0], &[95.0, 90.0, 85.0]);
    let (score, action) = AggregationEngine::new().aggregate_and_classify(&votes);
    assert_eq!(score, 0.0);
    assert_eq!(action, Action::Approve);
}

#[test]
fn test_classification_boundaries() {
    assert_eq!(classify(79.9), Action::Review);
    assert_eq!(classify(80.0), Action::Block);
    assert_eq!(classify(59.9), Action::Approve);
    assert_eq!(classify(60.0), Action::Review);
}

#[test]
fn test_observer_vote_alone_scores_zero() {
    let regulator = Participant::observer("Regulator", "Regulator");
    let mut observer_vote = Vote::new(&regulator, 0.0);
    // Even a hand-built observer vote with weight is ignored.
    observer_vote.weight = 500.0;
    observer_vote.confidence = 99.0;
    assert_eq!(AggregationEngine::new().aggregate(&[observer_vote]), 0.0);
}

fn vote_strategy() -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((0.0f64..300.0, 0.0f64..=100.0), 1..12)
}

proptest! {
    #[test]
    fn prop_score_matches_closed_form_and_is_bounded(pairs in vote_strategy()) {
        let (weights, confidences): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
        let votes = institution_votes(&weights, &confidences);
        let score = AggregationEngine::new().aggregate(&votes);
        prop_assert!((0.0..=100.0).contains(&score));
        prop_assert_eq!(score, closed_form(&votes));
    }

    #[test]
    fn prop_final_running_score_equals_batch(pairs in vote_strategy()) {
        let (weights, confidences): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
        let votes = institution_votes(&weights, &confidences);
        let engine = AggregationEngine::new();
        let running = engine.running_scores(&votes);
        prop_assert_eq!(running.len(), votes.len());
        prop_assert_eq!(running.last().copied(), Some(engine.aggregate(&votes)));

        let mut acc = RunningScore::new();
        for (vote, expected) in votes.iter().zip(&running) {
            acc.push(vote);
            prop_assert_eq!(acc.score(), *expected);
        }
    }

    #[test]
    fn prop_observers_never_move_the_score(
        pairs in vote_strategy(),
        position in 0usize..12,
        confidence in 0.0f64..=100.0,
        weight in 0.0f64..1000.0,
    ) {
        let (weights, confidences): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
        let votes = institution_votes(&weights, &confidences);
        let engine = AggregationEngine::new();
        let baseline = engine.aggregate(&votes);

        let mut observer = Vote::new(&Participant::observer("Regulator", "Regulator"), 0.0);
        observer.confidence = confidence;
        observer.weight = weight;
        let mut with_observer = votes.clone();
        with_observer.insert(position.min(votes.len()), observer);

        prop_assert_eq!(engine.aggregate(&with_observer), baseline);
        prop_assert_eq!(engine.running_scores(&with_observer), engine.running_scores(&votes));
    }
}
