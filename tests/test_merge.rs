use std::collections::BTreeMap;

use serde_json::json;

use gepa_rs::{
    Adapter, AdapterError, Candidate, EvaluationBatch, GEPA, GepaState, InMemoryLoader,
    LanguageModel, LmError, LmOptions, ReflectiveDataset, save_state,
};

/// Two components with a split lineage: one child improved `a`, a sibling
/// improved `b`. The only way to score 1.0 everywhere is to recombine both
/// improvements — which is exactly what the merge proposer exists to do.
/// Reflective rewrites in-run produce `*-two` texts that help the training
/// item but nothing on validation, so the siblings stay the only dominators
/// until the merge lands.
fn lineage_score(candidate: &Candidate, item: &str) -> f32 {
    let a = candidate.get("a").unwrap_or_default();
    let b = candidate.get("b").unwrap_or_default();
    match item {
        "v0" | "v1" => {
            if a == "alpha-one" && b != "beta-two" {
                1.0
            } else {
                0.5
            }
        }
        "v2" | "v3" => {
            if b == "beta-one" && a != "alpha-two" {
                1.0
            } else {
                0.5
            }
        }
        _ => {
            let mut score = 0.4;
            if a == "alpha-two" {
                score += 0.3;
            }
            if b == "beta-two" {
                score += 0.3;
            }
            score
        }
    }
}

#[derive(Clone)]
struct LineageAdapter;

impl Adapter for LineageAdapter {
    type Instance = String;
    type Output = String;
    type Trace = String;

    async fn evaluate(
        &self,
        batch: &[String],
        candidate: &Candidate,
        capture_traces: bool,
    ) -> Result<EvaluationBatch<String, String>, AdapterError> {
        Ok(EvaluationBatch {
            outputs: batch.iter().map(|item| format!("out:{item}")).collect(),
            scores: batch
                .iter()
                .map(|item| lineage_score(candidate, item))
                .collect(),
            trajectories: capture_traces
                .then(|| batch.iter().map(|item| format!("trace:{item}")).collect()),
        })
    }

    fn make_reflective_dataset(
        &self,
        _candidate: &Candidate,
        eval_batch: &EvaluationBatch<String, String>,
        components_to_update: &[String],
    ) -> Result<ReflectiveDataset, AdapterError> {
        let mut dataset = ReflectiveDataset::new();
        for name in components_to_update {
            let records = eval_batch
                .scores
                .iter()
                .map(|score| json!({ "Feedback": format!("scored {score:.2}") }))
                .collect();
            dataset.insert(name.clone(), records);
        }
        Ok(dataset)
    }
}

/// Rewrites whatever component it is shown to its `*-two` variant.
struct VariantLm;

impl LanguageModel for VariantLm {
    async fn complete(&self, prompt: &str, _options: &LmOptions) -> Result<String, LmError> {
        if prompt.contains("beta-") {
            Ok("```\nbeta-two\n```".to_string())
        } else {
            Ok("```\nalpha-two\n```".to_string())
        }
    }
}

/// Seed plus the two divergent siblings, with validation scores matching
/// `lineage_score`, persisted so the engine resumes from it.
fn split_lineage_state() -> GepaState {
    let seed = Candidate::new([("a", "alpha-zero"), ("b", "beta-zero")]);
    let mut state =
        GepaState::new(seed, &[0.5, 0.5, 0.5, 0.5], &[0, 1, 2, 3]).expect("seed state");

    state
        .add_program(
            Candidate::new([("a", "alpha-one"), ("b", "beta-zero")]),
            vec![0],
            BTreeMap::from([(0, 1.0), (1, 1.0), (2, 0.5), (3, 0.5)]),
            Some(1),
        )
        .expect("first sibling");
    state
        .add_program(
            Candidate::new([("a", "alpha-zero"), ("b", "beta-one")]),
            vec![0],
            BTreeMap::from([(0, 0.5), (1, 0.5), (2, 1.0), (3, 1.0)]),
            Some(0),
        )
        .expect("second sibling");
    state
}

#[tokio::test]
async fn merge_recombines_divergent_siblings() {
    let dir = tempfile::tempdir().expect("temp dir");
    save_state(dir.path(), &split_lineage_state()).expect("persist lineage");

    let trainset: InMemoryLoader<String> = ["t0"].iter().map(|s| s.to_string()).collect();
    let valset: InMemoryLoader<String> =
        ["v0", "v1", "v2", "v3"].iter().map(|s| s.to_string()).collect();

    let optimizer = GEPA::builder()
        .adapter(LineageAdapter)
        .reflection_lm(VariantLm)
        .reflection_minibatch_size(1)
        .use_merge(true)
        .max_metric_calls(20)
        .seed(7)
        .run_dir(dir.path().to_path_buf())
        .resume(true)
        .build();

    let seed = Candidate::new([("a", "alpha-zero"), ("b", "beta-zero")]);
    let result = optimizer
        .run(seed, &trainset, &valset)
        .await
        .expect("run should succeed");

    // Exactly one merge happened, and it recombined both improvements.
    let merged: Vec<usize> = (0..result.state.num_programs())
        .filter(|&idx| result.state.parents_of(idx).len() == 2)
        .collect();
    assert_eq!(merged.len(), 1, "expected exactly one merge child");
    let merged = merged[0];

    let mut parents = result.state.parents_of(merged).to_vec();
    parents.sort_unstable();
    assert_eq!(parents, vec![1, 2], "merge parents are the two siblings");

    let child = result.state.candidate(merged);
    assert_eq!(child.get("a"), Some("alpha-one"));
    assert_eq!(child.get("b"), Some("beta-one"));

    // The merged program wins everywhere and is the final best.
    assert!((result.state.aggregate_score(merged) - 1.0).abs() < 1e-6);
    assert_eq!(result.best_idx, merged);
    assert_eq!(result.best_candidate, *child);
    assert!(
        result
            .state
            .pareto_set()
            .values()
            .all(|front| front.contains(&merged)),
        "merged program joins every front"
    );
}

#[tokio::test]
async fn resume_requires_a_snapshot() {
    let dir = tempfile::tempdir().expect("temp dir");
    let trainset: InMemoryLoader<String> = ["t0"].iter().map(|s| s.to_string()).collect();
    let valset: InMemoryLoader<String> = ["v0"].iter().map(|s| s.to_string()).collect();

    let optimizer = GEPA::builder()
        .adapter(LineageAdapter)
        .reflection_lm(VariantLm)
        .max_metric_calls(10)
        .run_dir(dir.path().to_path_buf())
        .resume(true)
        .build();

    let seed = Candidate::new([("a", "alpha-zero"), ("b", "beta-zero")]);
    assert!(
        optimizer.run(seed, &trainset, &valset).await.is_err(),
        "resume without a snapshot must fail"
    );
}

#[tokio::test]
async fn resumed_state_must_match_the_seed_components() {
    let dir = tempfile::tempdir().expect("temp dir");
    save_state(dir.path(), &split_lineage_state()).expect("persist lineage");

    let trainset: InMemoryLoader<String> = ["t0"].iter().map(|s| s.to_string()).collect();
    let valset: InMemoryLoader<String> =
        ["v0", "v1", "v2", "v3"].iter().map(|s| s.to_string()).collect();

    let optimizer = GEPA::builder()
        .adapter(LineageAdapter)
        .reflection_lm(VariantLm)
        .max_metric_calls(10)
        .run_dir(dir.path().to_path_buf())
        .build();

    let mismatched_seed = Candidate::single("different", "components");
    assert!(
        optimizer
            .run(mismatched_seed, &trainset, &valset)
            .await
            .is_err(),
        "component key mismatch must be rejected"
    );
}
