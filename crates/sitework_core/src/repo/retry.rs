//! Bounded optimistic retry loop.
//!
//! Every read-modify-write against a single document goes through
//! [`retry_conflicts`]: the closure re-reads fresh state on each attempt and
//! issues a version-checked write. Lost races and busy locks are retried up to
//! the policy bound, then surface as `RepoError::ConflictExhausted`.

use crate::config::RetryPolicy;
use crate::repo::error::{RepoError, RepoResult};
use log::{debug, warn};

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempt budget is spent.
///
/// `op` receives the 1-based attempt number.
pub fn retry_conflicts<T, F>(
    policy: &RetryPolicy,
    entity: &'static str,
    id: &str,
    mut op: F,
) -> RepoResult<T>
where
    F: FnMut(u32) -> RepoResult<T>,
{
    let attempts = policy.attempts();
    for attempt in 1..=attempts {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => {
                if attempt == attempts {
                    warn!(
                        "event=retry_exhausted module=repo status=error entity={} id={} attempts={} error={}",
                        entity, id, attempts, err
                    );
                    break;
                }
                debug!(
                    "event=retry module=repo status=conflict entity={} id={} attempt={} error_code={}",
                    entity,
                    id,
                    attempt,
                    err.code()
                );
                let pause = policy.backoff(attempt);
                if !pause.is_zero() {
                    std::thread::sleep(pause);
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(RepoError::ConflictExhausted {
        entity,
        id: id.to_string(),
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::retry_conflicts;
    use crate::config::RetryPolicy;
    use crate::repo::error::RepoError;

    #[test]
    fn succeeds_after_transient_conflicts() {
        let mut calls = 0;
        let value = retry_conflicts(&RetryPolicy::immediate(3), "work_item", "wi-1", |_| {
            calls += 1;
            if calls < 3 {
                Err(RepoError::conflict("work_item", "wi-1"))
            } else {
                Ok(calls)
            }
        })
        .unwrap();
        assert_eq!(value, 3);
    }

    #[test]
    fn exhaustion_reports_attempt_count() {
        let mut calls = 0;
        let err = retry_conflicts::<(), _>(&RetryPolicy::immediate(4), "work_item", "wi-1", |_| {
            calls += 1;
            Err(RepoError::conflict("work_item", "wi-1"))
        })
        .unwrap_err();
        assert_eq!(calls, 4);
        assert!(matches!(err, RepoError::ConflictExhausted { attempts: 4, .. }));
    }

    #[test]
    fn non_retryable_errors_return_immediately() {
        let mut calls = 0;
        let err = retry_conflicts::<(), _>(&RetryPolicy::immediate(5), "work_item", "wi-1", |_| {
            calls += 1;
            Err(RepoError::not_found("work_item", "wi-1"))
        })
        .unwrap_err();
        assert_eq!(calls, 1);
        assert!(err.is_not_found());
    }
}
