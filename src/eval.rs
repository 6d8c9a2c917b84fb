//! Retrieval-quality evaluation: Precision@K, Recall@K, and MRR over a
//! labeled question set.
//!
//! The evaluator is read-only with respect to the index — it only calls
//! retrieval — so re-running it against an unchanged index and eval set
//! reproduces bit-identical numbers. Questions with an empty relevant set
//! are excluded from the aggregates and surfaced as a note, never counted
//! as zeros.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use tracing::warn;

use crate::answer::create_generator;
use crate::config::Settings;
use crate::embedding::create_embedder;
use crate::models::{EvalQuestion, EvalReport};
use crate::query::process_query;
use crate::retrieve::retrieve;
use crate::store::open_store;

/// Load a labeled eval set from a JSON file: an array of
/// `{ "question": ..., "relevant_docs": [...] }` objects.
pub fn load_eval_questions(path: &Path) -> Result<Vec<EvalQuestion>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read eval set: {}", path.display()))?;
    let questions: Vec<EvalQuestion> =
        serde_json::from_str(&content).with_context(|| "Failed to parse eval set")?;
    Ok(questions)
}

/// Fraction of predicted sources that are relevant. 0 when nothing was
/// predicted.
pub fn precision(predicted: &[String], relevant: &HashSet<&str>) -> f64 {
    if predicted.is_empty() {
        return 0.0;
    }
    let hits = predicted
        .iter()
        .filter(|p| relevant.contains(p.as_str()))
        .count();
    hits as f64 / predicted.len() as f64
}

/// Fraction of relevant sources that were predicted. `None` when the
/// relevant set is empty — undefined, not zero.
pub fn recall(predicted: &[String], relevant: &HashSet<&str>) -> Option<f64> {
    if relevant.is_empty() {
        return None;
    }
    let hits = predicted
        .iter()
        .filter(|p| relevant.contains(p.as_str()))
        .count();
    Some(hits as f64 / relevant.len() as f64)
}

/// `1 / rank` of the first relevant prediction; 0 when none is relevant.
pub fn reciprocal_rank(predicted: &[String], relevant: &HashSet<&str>) -> f64 {
    for (i, p) in predicted.iter().enumerate() {
        if relevant.contains(p.as_str()) {
            return 1.0 / (i as f64 + 1.0);
        }
    }
    0.0
}

/// Pure metric aggregation over already-obtained predictions, one
/// prediction list per question, in question order.
pub fn evaluate_predictions(questions: &[EvalQuestion], predictions: &[Vec<String>]) -> EvalReport {
    debug_assert_eq!(questions.len(), predictions.len());

    let mut p_sum = 0.0;
    let mut r_sum = 0.0;
    let mut rr_sum = 0.0;
    let mut evaluated = 0usize;
    let mut skipped = 0usize;

    for (q, predicted) in questions.iter().zip(predictions.iter()) {
        let relevant: HashSet<&str> = q.relevant_docs.iter().map(String::as_str).collect();
        let r = match recall(predicted, &relevant) {
            Some(r) => r,
            None => {
                skipped += 1;
                continue;
            }
        };
        p_sum += precision(predicted, &relevant);
        r_sum += r;
        rr_sum += reciprocal_rank(predicted, &relevant);
        evaluated += 1;
    }

    let mean = |sum: f64| if evaluated > 0 { sum / evaluated as f64 } else { 0.0 };
    EvalReport {
        precision_at_k: mean(p_sum),
        recall_at_k: mean(r_sum),
        mrr: mean(rr_sum),
        questions_evaluated: evaluated,
        questions_skipped_no_relevant: skipped,
    }
}

/// Run every question through `retrieve_fn` and aggregate the metrics.
/// Retrieval failures abort the run; a partial report never mixes with a
/// complete one.
pub async fn evaluate<F, Fut>(
    questions: &[EvalQuestion],
    mut retrieve_fn: F,
) -> Result<EvalReport>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Vec<String>>>,
{
    let mut predictions = Vec::with_capacity(questions.len());
    for q in questions {
        predictions.push(retrieve_fn(q.question.clone()).await?);
    }
    Ok(evaluate_predictions(questions, &predictions))
}

/// CLI entry point for `rag eval`.
pub async fn run_eval(settings: &Settings, evalset: &Path, k: Option<usize>) -> Result<()> {
    let questions = load_eval_questions(evalset)?;
    if questions.is_empty() {
        anyhow::bail!("Eval set is empty: {}", evalset.display());
    }
    for q in &questions {
        if q.relevant_docs.is_empty() {
            warn!(question = %q.question, "no labeled relevant docs; excluded from aggregates");
        }
    }

    let k = k.unwrap_or(settings.retrieval.k);
    let embedder = create_embedder(&settings.embedding)?;
    let store = open_store(settings).await?;
    let generator = create_generator(&settings.model)?;
    let expand = settings.query.expand && settings.model.is_enabled();

    let embedder_ref = &*embedder;
    let store_ref = &*store;
    let generator_ref = &*generator;
    let report = evaluate(&questions, |question| async move {
        let processed = process_query(generator_ref, &question, expand).await;
        let retrieval = retrieve(embedder_ref, store_ref, &processed.expanded, k).await?;
        Ok(retrieval
            .sources
            .into_iter()
            .map(|s| s.source_id)
            .collect())
    })
    .await?;

    println!("Evaluated {} questions at k={}", report.questions_evaluated, k);
    if report.questions_skipped_no_relevant > 0 {
        println!(
            "  skipped {} question(s) with no labeled relevant docs",
            report.questions_skipped_no_relevant
        );
    }
    println!("  Precision@{}: {:.4}", k, report.precision_at_k);
    println!("  Recall@{}:    {:.4}", k, report.recall_at_k);
    println!("  MRR:          {:.4}", report.mrr);
    Ok(())
}
