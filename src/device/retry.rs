// SPDX-License-Identifier: MIT OR Apache-2.0
//! Retry-with-recovery harness and the bounded `sleep` primitive (§4.3, §9).
//!
//! The sleep/retry-delay ceiling is 100_000 ms. The original sources disagree between a
//! 100_000 ms limit in one variant and 1_000_000 in `_full`; per the open-question
//! resolution in the expanded requirements we pick the smaller, stricter ceiling
//! everywhere and reject anything larger rather than silently clamping it.
use std::thread;
use std::time::Duration;

use crate::error::{Error, ErrorKind};

pub const SLEEP_CEILING_MS: u64 = 100_000;

/// A `(domain, code)` pair identifying a recoverable error class, with the recovery action
/// to run before the next retry attempt. Returning `false` (or no match) aborts the retry.
pub struct RetryRecovery<D, C>
{
    pub domain: D,
    pub code: C,
    pub recover: Box<dyn Fn() -> bool>,
}

/// Sleeps for `ms`, bounded by [SLEEP_CEILING_MS]; a no-op for emulated devices.
///
/// Invariant (§8): `sleep(0)` is a no-op, `sleep(100_000)` is the ceiling, beyond that is
/// rejected rather than clamped.
pub fn sleep(ms: u64, emulated: bool) -> Result<(), Error>
{
    if ms > SLEEP_CEILING_MS {
        return Err(ErrorKind::Internal("sleep duration exceeds 100_000ms ceiling").error());
    }
    if ms == 0 || emulated {
        return Ok(());
    }
    thread::sleep(Duration::from_millis(ms));
    Ok(())
}

/// Runs `op` up to `count` times with `delay_ms` before each retry (attempt *i* sleeps
/// before invocation when *i>0*). On error, `recoveries` is scanned for a match on the
/// error's kind tag; if one matches, its `recover` runs and the loop continues (consuming
/// one of the `count` attempts regardless); if nothing matches, the error propagates
/// immediately. The final attempt's error is what propagates on exhaustion.
pub fn retry_full<T, D, C, F, Match>(
    mut op: F,
    count: u32,
    delay_ms: u64,
    recoveries: &[RetryRecovery<D, C>],
    matches: Match,
) -> Result<T, Error>
where
    F: FnMut() -> Result<T, Error>,
    Match: Fn(&RetryRecovery<D, C>, &Error) -> bool,
{
    if count == 0 {
        return Err(ErrorKind::Internal("retry_full called with count == 0").error());
    }

    let mut last_err = None;
    for attempt in 0..count {
        if attempt > 0 {
            sleep(delay_ms, false)?;
        }

        match op() {
            Ok(value) => return Ok(value),
            Err(err) => {
                let recovery = recoveries.iter().find(|r| matches(r, &err));
                match recovery {
                    Some(r) if (r.recover)() => {
                        last_err = Some(err);
                        continue;
                    },
                    Some(_) => return Err(err.with_ctx(&format!("failed after {} retries", attempt + 1))),
                    None if attempt + 1 < count => {
                        last_err = Some(err);
                        continue;
                    },
                    None => return Err(err.with_ctx(&format!("failed after {} retries", attempt + 1))),
                }
            },
        }
    }

    Err(last_err
        .unwrap_or_else(|| ErrorKind::Internal("retry_full exhausted with no recorded error").error()))
}

/// Simpler retry without recovery tuples — matches `retry(fn, n)` from §8's testable
/// properties: calls `fn` at most `n` times and at least once.
pub fn retry<T, F>(mut op: F, count: u32, delay_ms: u64) -> Result<T, Error>
where
    F: FnMut(u32) -> Result<T, Error>,
{
    if count == 0 {
        return Err(ErrorKind::Internal("retry called with count == 0").error());
    }

    let mut last_err = None;
    for attempt in 0..count {
        if attempt > 0 {
            sleep(delay_ms, false)?;
        }
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) => last_err = Some(err),
        }
    }

    Err(last_err.expect("loop ran at least once"))
}

#[cfg(test)]
mod tests
{
    use super::*;
    use std::cell::Cell;

    #[test]
    fn sleep_zero_is_a_noop()
    {
        sleep(0, false).unwrap();
    }

    #[test]
    fn sleep_above_ceiling_is_rejected()
    {
        assert!(sleep(SLEEP_CEILING_MS + 1, false).is_err());
    }

    #[test]
    fn sleep_at_ceiling_is_accepted_when_emulated()
    {
        sleep(SLEEP_CEILING_MS, true).unwrap();
    }

    #[test]
    fn retry_calls_fn_at_most_n_times_and_at_least_once()
    {
        let calls = Cell::new(0);
        let result: Result<(), Error> = retry(
            |_attempt| {
                calls.set(calls.get() + 1);
                Err(ErrorKind::Busy.error())
            },
            3,
            0,
        );
        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn retry_returns_ok_on_eventual_success()
    {
        let calls = Cell::new(0);
        let result = retry(
            |_attempt| {
                calls.set(calls.get() + 1);
                if calls.get() < 2 {
                    Err(ErrorKind::Busy.error())
                } else {
                    Ok(42)
                }
            },
            5,
            0,
        );
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn retry_full_without_matching_recovery_propagates_last_error_only()
    {
        let calls = Cell::new(0);
        let recoveries: &[RetryRecovery<(), ()>] = &[];
        let result: Result<(), Error> = retry_full(
            || {
                calls.set(calls.get() + 1);
                Err(ErrorKind::Busy.error())
            },
            3,
            0,
            recoveries,
            |_, _| false,
        );
        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
    }
}
