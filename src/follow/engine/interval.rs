//! Interval parsing, UTC boundary alignment and the per-follow tick loop.
//!
//! Alignment is plain epoch arithmetic: for an interval of `I` seconds, the
//! interval containing `now` starts at `floor(now_unix / I) * I`. Semantics
//! are exact on whole interval seconds; fractional intervals are not
//! supported.
//!
//! The loop fires slightly *before* each boundary, by an adaptive
//! *headstart* derived from recent callback execution times, so that the
//! venue-side order update lands near the boundary itself.
//!
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::debug;

use crate::follow::error::{FollowError, Result};

// Bounded history of callback execution times and the share of their average
// used as the headstart.
const EXEC_TIME_WINDOW: usize = 5;
const EXEC_TIME_RATIO: f64 = 0.5;

/// Parses an interval string.
///
/// Standard `s`/`m`/`h` segments may concatenate (`"90m"`, `"1h30m"`), plus
/// a fixed extension table (`1d`..`6d`, `1w`, `2w`, `1M` = 30 days) whose
/// units cannot be combined with anything else.
pub fn parse_interval(s: &str) -> Result<Duration> {
    if let Some(d) = predefined_interval(s) {
        return Ok(d);
    }

    let mut total: u64 = 0;
    let mut num = String::new();
    let mut any_segment = false;

    for ch in s.chars() {
        if ch.is_ascii_digit() {
            num.push(ch);
            continue;
        }

        let unit: u64 = match ch {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            _ => return Err(invalid_interval(s)),
        };

        let n: u64 = num.parse().map_err(|_| invalid_interval(s))?;
        total += n * unit;
        num.clear();
        any_segment = true;
    }

    if !num.is_empty() || !any_segment || total == 0 {
        return Err(invalid_interval(s));
    }

    Ok(Duration::from_secs(total))
}

fn invalid_interval(s: &str) -> FollowError {
    FollowError::Parse(format!("invalid interval: {s}"))
}

fn predefined_interval(s: &str) -> Option<Duration> {
    const DAY: u64 = 24 * 3600;
    let secs = match s {
        "1d" => DAY,
        "2d" => 2 * DAY,
        "3d" => 3 * DAY,
        "4d" => 4 * DAY,
        "5d" => 5 * DAY,
        "6d" => 6 * DAY,
        "1w" => 7 * DAY,
        "2w" => 14 * DAY,
        "1M" => 30 * DAY,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}

/// Start of the interval containing `now`: if it is 03:15 and the interval
/// is 2h, this returns 02:00.
pub fn interval_start(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let secs = interval.as_secs() as i64;
    from_unix(now.timestamp().div_euclid(secs) * secs)
}

/// Start of the interval after the one containing `now`: if it is 03:15 and
/// the interval is 2h, this returns 04:00.
pub fn next_interval_start(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let secs = interval.as_secs() as i64;
    from_unix(now.timestamp().div_euclid(secs) * secs + secs)
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    // Aligned timestamps stay within chrono's representable range for any
    // wall-clock input.
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Handle used to terminate a running [`IntervalLoop`].
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }
}

/// Signal end of a stop channel, owned by the loop.
pub type StopSignal = watch::Receiver<bool>;

/// Creates a stop channel for an interval loop.
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, rx)
}

/// A loop that invokes a callback once per aligned interval boundary.
///
/// Ticks never overlap: the next boundary is computed only after the current
/// callback returns, so a late callback delays the next tick instead of
/// stacking a second one on top of it.
pub struct IntervalLoop {
    interval: Duration,
    exec_times: VecDeque<Duration>,
    stop: StopSignal,
}

impl IntervalLoop {
    pub fn new(interval: Duration, stop: StopSignal) -> Self {
        Self {
            interval,
            // Seeded so the very first wake already fires a little early.
            exec_times: VecDeque::from([Duration::from_secs(1)]),
            stop,
        }
    }

    /// Runs until stopped or until the callback returns an error.
    ///
    /// Each iteration sleeps until `next_boundary - headstart`, then invokes
    /// the callback with the boundary instant itself (not the fire time). A
    /// stop signal observed while sleeping terminates the loop without
    /// invoking the callback; a callback error terminates the loop and
    /// surfaces the error.
    pub async fn run<F, Fut>(mut self, mut callback: F) -> Result<()>
    where
        F: FnMut(DateTime<Utc>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        loop {
            let headstart = self.headstart();
            // Advancing by half an interval before aligning skips the
            // boundary the previous (early-fired) tick just handled.
            let reference = Utc::now() + chrono::Duration::seconds(self.interval.as_secs() as i64 / 2);
            let next = next_interval_start(reference, self.interval);
            let fire_at = next - chrono::Duration::milliseconds(headstart.as_millis() as i64);

            debug!(boundary = %next, headstart = ?headstart, "next tick scheduled");

            let sleep_for = (fire_at - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {
                    let started = std::time::Instant::now();
                    callback(next).await?;
                    self.record_exec_time(started.elapsed());
                }
                _ = self.stop.changed() => {
                    debug!("interval loop stopped");
                    return Ok(());
                }
            }
        }
    }

    fn record_exec_time(&mut self, t: Duration) {
        debug!(exec_time = ?t, "tick finished");
        self.exec_times.push_back(t);
        while self.exec_times.len() > EXEC_TIME_WINDOW {
            self.exec_times.pop_front();
        }
    }

    /// Half the moving average of recent execution times, kept strictly
    /// below the interval so the wake never lands inside the previous one.
    fn headstart(&self) -> Duration {
        let n = self.exec_times.len().max(1) as u32;
        let avg = self.exec_times.iter().sum::<Duration>() / n;
        let headstart = avg.mul_f64(EXEC_TIME_RATIO);

        let ceiling = self.interval.saturating_sub(Duration::from_millis(1));
        headstart.min(ceiling)
    }
}
