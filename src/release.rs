// SPDX-License-Identifier: MPL-2.0

//! Release engine: assembles a differentially private day total and decides
//! which fields cross the trust boundary to the caller.
//!
//! The Laplace mechanism protects only the *released count*. Every
//! diagnostic carried by a [`ReleaseResult`] (the exact total, the
//! sensitivity, the sampled noise, per-source counts) reveals information
//! the mechanism exists to hide, so the whole bundle is gated behind
//! [`DisclosureMode::Debug`] as one atomic unit.
//!
//! Queries are stateless: the engine holds only the immutable disclosure
//! mode and budget policy, [`ReleaseEngine::handle`] takes `&self`, and
//! every invocation draws fresh noise from its own generator. Nothing is
//! cached; a reused noisy count would be both stale and a privacy defect,
//! since repeating an identical disclosure lets callers average the noise
//! away.

use crate::collect::{AttackRecord, CollectError, DayCountSource};
use crate::dp::laplace::Laplace;
use crate::dp::{l1_sensitivity, BudgetPolicy, DpError, PrivacyBudget};
use chrono::{NaiveDate, Utc};
use rand::distr::Distribution;
use rand::rngs::{OsRng, StdRng};
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Maximum number of contributors echoed in debug diagnostics.
pub const TOP_SOURCES: usize = 5;

/// Errors propagated by the release engine.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ReleaseError {
    /// The privacy parameter was rejected before noise calibration.
    #[error("dp error: {0}")]
    Dp(#[from] DpError),

    /// The day-count source could not produce data.
    #[error("collection error: {0}")]
    Collect(#[from] CollectError),

    /// The operating system's randomness source was unavailable. The
    /// request fails; the true count is never released in place of a
    /// noised one.
    #[error("sampling error: {0}")]
    Sampling(#[from] rand_core::OsError),
}

/// Which fields of a release cross the trust boundary.
///
/// Fixed once at engine construction and constant for the engine's
/// lifetime, never switched per request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DisclosureMode {
    /// Callers receive the noised count and the query echo, nothing else.
    Production,

    /// Callers additionally receive the full diagnostic bundle, including
    /// exact per-source counts. For operators only; never production
    /// traffic.
    Debug,
}

/// A query as handed over by the presentation layer.
///
/// Date syntax and epsilon range are validated upstream; the engine still
/// defends its own preconditions and re-checks epsilon before calibration.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct QueryRequest {
    /// UTC day to aggregate.
    pub date: NaiveDate,

    /// Privacy budget for this single release.
    pub epsilon: f64,
}

/// One differentially private release, with all internals attached.
///
/// Constructed fresh per query and discarded after the response is shaped.
/// Only `noisy_count` is safe for unconditional disclosure.
#[derive(Clone, Debug)]
pub struct ReleaseResult {
    /// Exact event total. Sensitive.
    pub true_count: u64,

    /// L1 sensitivity the noise was calibrated to.
    pub sensitivity: u64,

    /// Sampled Laplace perturbation.
    pub noise: f64,

    /// Scale parameter of the sampled distribution, `sensitivity / epsilon`.
    pub noise_scale: f64,

    /// `max(0, round(true_count + noise))`.
    pub noisy_count: u64,

    /// Number of distinct sources observed.
    pub num_sources: usize,

    /// Up to [`TOP_SOURCES`] largest contributors, descending by count,
    /// ties broken by collection order.
    pub top_sources: Vec<AttackRecord>,
}

/// Apply the Laplace mechanism to one day's records.
///
/// Generic over the randomness source so tests can pass a seeded generator
/// and assert distributional properties reproducibly. Degenerate inputs
/// (empty or all-zero collections) do not draw from `rng` at all.
pub fn release<R>(
    records: &[AttackRecord],
    budget: &PrivacyBudget,
    rng: &mut R,
) -> Result<ReleaseResult, DpError>
where
    R: Rng + ?Sized,
{
    let sensitivity = l1_sensitivity(records);
    if sensitivity == 0 {
        return Ok(degenerate(records));
    }

    let true_count: u64 = records.iter().map(|record| record.count).sum();
    let noise_scale = sensitivity as f64 / budget.epsilon();
    let noise = Laplace::new(noise_scale)?.sample(rng);
    let noisy_count = (true_count as f64 + noise).round().max(0.0) as u64;

    Ok(ReleaseResult {
        true_count,
        sensitivity,
        noise,
        noise_scale,
        noisy_count,
        num_sources: records.len(),
        top_sources: top_sources(records),
    })
}

/// All-zero release for a day with no contributing sources.
fn degenerate(records: &[AttackRecord]) -> ReleaseResult {
    ReleaseResult {
        true_count: 0,
        sensitivity: 0,
        noise: 0.0,
        noise_scale: 0.0,
        noisy_count: 0,
        num_sources: records.len(),
        top_sources: top_sources(records),
    }
}

fn top_sources(records: &[AttackRecord]) -> Vec<AttackRecord> {
    let mut ranked = records.to_vec();
    // Stable sort: ties keep the collection order.
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(TOP_SOURCES);
    ranked
}

/// The release engine: fetches one day's counts, applies the mechanism, and
/// shapes the response according to the disclosure mode.
#[derive(Clone, Debug)]
pub struct ReleaseEngine<S> {
    source: S,
    mode: DisclosureMode,
    policy: BudgetPolicy,
}

impl<S: DayCountSource> ReleaseEngine<S> {
    /// Create an engine with the default operational budget policy.
    pub fn new(source: S, mode: DisclosureMode) -> Self {
        Self::with_policy(source, mode, BudgetPolicy::default())
    }

    /// Create an engine with an explicit budget policy.
    pub fn with_policy(source: S, mode: DisclosureMode, policy: BudgetPolicy) -> Self {
        Self {
            source,
            mode,
            policy,
        }
    }

    /// Answer one query.
    ///
    /// Epsilon is admitted against the policy window before anything else,
    /// so a rejected budget never reaches the source or the noise stage. An
    /// empty collection is the defined zero path, not an error, and must
    /// not touch the OS randomness source; only a contributing day seeds a
    /// generator, and a seeding failure fails the request.
    pub fn handle(&self, request: &QueryRequest) -> Result<QueryResponse, ReleaseError> {
        let budget = self.policy.admit(request.epsilon)?;
        let records = self.source.fetch(request.date)?;

        let result = if l1_sensitivity(&records) == 0 {
            degenerate(&records)
        } else {
            let mut rng = StdRng::try_from_rng(&mut OsRng)?;
            release(&records, &budget, &mut rng)?
        };

        Ok(QueryResponse::assemble(request, &result, self.mode))
    }
}

/// Caller-facing response, shaped by the disclosure mode.
///
/// Withheld diagnostics serialize to nothing at all (not `null`), so a
/// production response's key set is exactly the safe subset.
#[derive(Clone, Debug, Serialize)]
pub struct QueryResponse {
    /// Always `true`; failures are serialized as [`ErrorResponse`] instead.
    pub success: bool,

    /// Query echo: the aggregated day.
    pub date: NaiveDate,

    /// Query echo: the admitted privacy budget.
    pub epsilon: f64,

    /// UTC time the query was answered, `%Y-%m-%d %H:%M:%S`.
    pub query_time: String,

    /// The released, noised total.
    pub noisy_count: u64,

    /// Disclosure mode the response was shaped under.
    pub debug_mode: bool,

    /// Diagnostic: L1 sensitivity. Debug mode only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<u64>,

    /// Diagnostic: sampled perturbation. Debug mode only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub noise: Option<f64>,

    /// Diagnostic: Laplace scale parameter. Debug mode only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub noise_scale: Option<f64>,

    /// Diagnostic: number of distinct sources. Debug mode only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_sources: Option<usize>,

    /// Diagnostic: exact event total. Debug mode only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub true_count: Option<u64>,

    /// Diagnostic: largest contributors with exact counts. Debug mode only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_sources: Option<Vec<AttackRecord>>,
}

impl QueryResponse {
    fn assemble(request: &QueryRequest, result: &ReleaseResult, mode: DisclosureMode) -> Self {
        // One boolean gates the whole diagnostic bundle; partial disclosure
        // would have to be an explicit, per-field decision here.
        let debug = mode == DisclosureMode::Debug;
        QueryResponse {
            success: true,
            date: request.date,
            epsilon: request.epsilon,
            query_time: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            noisy_count: result.noisy_count,
            debug_mode: debug,
            sensitivity: debug.then_some(result.sensitivity),
            noise: debug.then_some(result.noise),
            noise_scale: debug.then_some(result.noise_scale),
            num_sources: debug.then_some(result.num_sources),
            true_count: debug.then_some(result.true_count),
            top_sources: debug.then(|| result.top_sources.clone()),
        }
    }
}

/// Error shape returned to callers; carries no partial result fields.
#[derive(Clone, Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable description of the failure.
    pub error: String,
}

impl From<&ReleaseError> for ErrorResponse {
    fn from(err: &ReleaseError) -> Self {
        ErrorResponse {
            error: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> Vec<AttackRecord> {
        vec![
            AttackRecord::new("1.2.3.4", 100),
            AttackRecord::new("5.6.7.8", 20),
        ]
    }

    #[test]
    fn calibration_matches_the_scenario() {
        let budget = PrivacyBudget::new(1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let result = release(&scenario(), &budget, &mut rng).unwrap();

        assert_eq!(result.true_count, 120);
        assert_eq!(result.sensitivity, 100);
        assert_eq!(result.noise_scale, 100.0);
        assert_eq!(result.num_sources, 2);
        assert_eq!(
            result.noisy_count,
            (120.0 + result.noise).round().max(0.0) as u64
        );
    }

    #[test]
    fn top_sources_rank_descending_with_stable_ties() {
        let records = vec![
            AttackRecord::new("a", 5),
            AttackRecord::new("b", 9),
            AttackRecord::new("c", 5),
            AttackRecord::new("d", 12),
            AttackRecord::new("e", 5),
            AttackRecord::new("f", 1),
            AttackRecord::new("g", 5),
        ];

        let top = top_sources(&records);
        assert_eq!(top.len(), TOP_SOURCES);
        let order: Vec<&str> = top.iter().map(|record| record.source.as_str()).collect();
        // Ties at count 5 keep the collection order a, c, e.
        assert_eq!(order, vec!["d", "b", "a", "c", "e"]);
    }

    #[test]
    fn all_zero_day_releases_zero_without_noise() {
        let budget = PrivacyBudget::new(1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let records = vec![
            AttackRecord::new("1.2.3.4", 0),
            AttackRecord::new("5.6.7.8", 0),
        ];

        let result = release(&records, &budget, &mut rng).unwrap();
        assert_eq!(result.true_count, 0);
        assert_eq!(result.noisy_count, 0);
        assert_eq!(result.noise, 0.0);
        assert_eq!(result.noise_scale, 0.0);
        assert_eq!(result.num_sources, 2);
    }

    #[test]
    fn error_response_carries_only_a_message() {
        let err = ReleaseError::Collect(CollectError::Unavailable("backend offline".to_owned()));
        let body = ErrorResponse::from(&err);
        assert_eq!(
            body.error,
            "collection error: count backend unavailable: backend offline"
        );
    }
}
