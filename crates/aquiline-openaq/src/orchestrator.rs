//! Retry orchestrator: fans one fetch out over many entities, isolates
//! per-entity failures, and re-attempts only the failed subset.
//!
//! Retry is an explicit loop over a shrinking pending queue rather than
//! recursion: one [`RunRecord`] per round, oldest first, so the round
//! budget is just a counter and the ledger stays flat.

use aquiline_core::error::FetchError;
use aquiline_core::ledger::{EntityError, RunLog, RunRecord, RunStatus, TimeRange};
use aquiline_core::shutdown::is_shutdown_requested;

pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Run `attempt` over every entity, retrying failures up to
/// `max_retries` additional rounds.
///
/// `attempt` must fetch AND persist one entity, returning the persisted
/// artifact id. Successes are durable the moment they happen, so a
/// later abort loses nothing already staged. Entities are attempted in
/// input order at every round; a round's pending set is exactly the
/// previous round's failures.
///
/// Network- and data-shaped failures are data here, recorded in the
/// returned [`RunLog`] and never raised. The only error path is
/// programmer misuse: an empty entity list.
pub fn run_entities<F>(
    entity_ids: &[i64],
    time_range: TimeRange,
    run_id: &str,
    max_retries: u32,
    mut attempt: F,
) -> anyhow::Result<RunLog>
where
    F: FnMut(i64) -> Result<String, FetchError>,
{
    anyhow::ensure!(
        !entity_ids.is_empty(),
        "no entities to fetch for run {run_id}"
    );

    let mut log = RunLog::new(run_id, time_range);
    let mut pending: Vec<i64> = entity_ids.to_vec();
    let mut round = 0u32;

    while !pending.is_empty() {
        let started = std::time::Instant::now();
        let mut record = RunRecord::start(round);
        let mut failed: Vec<i64> = Vec::new();
        let mut interrupted = false;

        if round > 0 {
            log::info!(
                "{run_id}: retry round {round}/{max_retries}, {} entities pending",
                pending.len()
            );
        }

        for &id in &pending {
            if is_shutdown_requested() {
                log::warn!("{run_id}: interrupted, not starting further fetches");
                interrupted = true;
                break;
            }
            match attempt(id) {
                Ok(artifact) => record.saved.push(artifact),
                Err(e) => {
                    log::warn!("{run_id}: entity {id} failed: {e}");
                    record.errors.push(EntityError::new(id, time_range, &e));
                    failed.push(id);
                }
            }
        }

        record.duration_secs = started.elapsed().as_secs_f64();
        record.status = if interrupted {
            RunStatus::Aborted
        } else if record.errors.is_empty() {
            RunStatus::Downloaded
        } else if round < max_retries {
            RunStatus::Retrying
        } else {
            RunStatus::Aborted
        };

        let aborted = record.status == RunStatus::Aborted;
        log.push(record);
        if aborted {
            break;
        }
        pending = failed;
        round += 1;
    }

    log.finalize(entity_ids.len());
    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aquiline_core::http::ApiError;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;

    fn range() -> TimeRange {
        TimeRange::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 31, 23, 59, 59).unwrap(),
        )
    }

    fn http_500() -> FetchError {
        FetchError::Api(ApiError::Http {
            status: 500,
            body: "server error".into(),
        })
    }

    /// Attempt closure that fails entity `id` for its first
    /// `failures[id]` calls, then succeeds.
    fn flaky(
        failures: HashMap<i64, u32>,
    ) -> impl FnMut(i64) -> Result<String, FetchError> {
        let mut counts: HashMap<i64, u32> = HashMap::new();
        move |id| {
            let attempts = counts.entry(id).or_insert(0);
            *attempts += 1;
            if *attempts <= failures.get(&id).copied().unwrap_or(0) {
                Err(http_500())
            } else {
                Ok(format!("sensor_{id}"))
            }
        }
    }

    #[test]
    fn all_succeed_single_round() {
        let log = run_entities(&[1, 2, 3], range(), "run", 5, flaky(HashMap::new())).unwrap();

        assert_eq!(log.records.len(), 1);
        assert_eq!(log.records[0].status, RunStatus::Downloaded);
        assert_eq!(log.records[0].saved.len(), 3);
        let summary = log.summary.unwrap();
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.retry_rounds, 0);
    }

    #[test]
    fn scenario_one_transient_failure() {
        // 3 entities, B (=2) returns HTTP 500 once, A and C succeed
        let log =
            run_entities(&[1, 2, 3], range(), "run", 5, flaky(HashMap::from([(2, 1)]))).unwrap();

        assert_eq!(log.records.len(), 2);

        let depth0 = &log.records[0];
        assert_eq!(depth0.status, RunStatus::Retrying);
        assert_eq!(depth0.saved, vec!["sensor_1", "sensor_3"]);
        assert_eq!(depth0.errors.len(), 1);
        assert_eq!(depth0.errors[0].entity_id, 2);
        assert_eq!(depth0.errors[0].error_kind, "http");

        let depth1 = &log.records[1];
        assert_eq!(depth1.status, RunStatus::Downloaded);
        assert_eq!(depth1.saved, vec!["sensor_2"]);

        let summary = log.summary.unwrap();
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.retry_rounds, 1);
        assert_eq!(summary.saved, 3);
        assert_eq!(summary.failed, 0);
    }

    #[test]
    fn partial_failure_isolation() {
        // One permanently broken entity never blocks the other N-1
        let mut saved_first_round = Vec::new();
        let log = run_entities(&[1, 2, 3, 4], range(), "run", 0, |id| {
            if id == 3 {
                Err(http_500())
            } else {
                saved_first_round.push(id);
                Ok(format!("sensor_{id}"))
            }
        })
        .unwrap();

        assert_eq!(saved_first_round, vec![1, 2, 4]);
        assert_eq!(log.records[0].saved.len(), 3);
        assert_eq!(log.records[0].errors.len(), 1);
        assert_eq!(log.records[0].errors[0].entity_id, 3);
    }

    #[test]
    fn retry_rounds_never_exceed_budget_plus_one() {
        let mut calls = 0u32;
        let log = run_entities(&[1, 2], range(), "run", 3, |_| {
            calls += 1;
            Err::<String, _>(http_500())
        })
        .unwrap();

        // max_retries = 3 → at most 4 rounds
        assert_eq!(log.records.len(), 4);
        assert_eq!(calls, 8);
        // Deepest record still lists every entity as errored
        let last = log.records.last().unwrap();
        assert_eq!(last.status, RunStatus::Aborted);
        assert_eq!(last.errors.len(), 2);
        assert_eq!(log.summary.unwrap().status, RunStatus::Aborted);
    }

    #[test]
    fn zero_retries_aborts_immediately_on_failure() {
        let log = run_entities(&[1], range(), "run", 0, |_| Err::<String, _>(http_500())).unwrap();
        assert_eq!(log.records.len(), 1);
        assert_eq!(log.records[0].status, RunStatus::Aborted);
    }

    #[test]
    fn retry_preserves_input_order() {
        let mut attempted: Vec<i64> = Vec::new();
        let _ = run_entities(
            &[5, 3, 9],
            range(),
            "run",
            1,
            |id| {
                attempted.push(id);
                if attempted.len() <= 3 {
                    Err(http_500())
                } else {
                    Ok(format!("sensor_{id}"))
                }
            },
        )
        .unwrap();

        // Round 0 in input order, round 1 retries the same order
        assert_eq!(attempted, vec![5, 3, 9, 5, 3, 9]);
    }

    #[test]
    fn deterministic_given_same_failure_script() {
        let run = || {
            run_entities(&[1, 2, 3], range(), "run", 2, flaky(HashMap::from([(1, 2), (3, 9)])))
                .unwrap()
        };
        let a = run();
        let b = run();

        let shape = |log: &RunLog| {
            log.records
                .iter()
                .map(|r| (r.round, r.status, r.saved.clone(), r.errors.len()))
                .collect::<Vec<_>>()
        };
        assert_eq!(shape(&a), shape(&b));
        assert_eq!(a.summary.unwrap().status, RunStatus::Aborted);
    }

    #[test]
    fn empty_entity_list_is_programmer_error() {
        let result = run_entities(&[], range(), "run", 5, |_| Ok::<_, FetchError>("x".into()));
        assert!(result.is_err());
    }

    #[test]
    fn pagination_error_recorded_with_kind() {
        let log = run_entities(&[1], range(), "run", 0, |_| {
            Err::<String, _>(FetchError::Pagination {
                pages: 300,
                collected: 100,
                found: 5000,
            })
        })
        .unwrap();
        assert_eq!(log.records[0].errors[0].error_kind, "pagination_incomplete");
    }
}
