use std::time::Duration;

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::debug;

use super::error::{LlmError, Usage};

/// Token bucket with continuous refill and burst capacity.
///
/// `acquire(n)` cooperatively suspends until `n` tokens are available, then
/// deducts them under the mutex. Concurrent waiters may be served in any
/// order once tokens exist; FIFO is not guaranteed.
pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_per_sec: f64,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Bucket refilling at `rate_per_sec` tokens per second with the given
    /// burst capacity
    pub fn new(rate_per_sec: f64, burst: f64) -> Result<Self, LlmError> {
        if rate_per_sec <= 0.0 || burst <= 0.0 {
            return Err(LlmError::Config(format!(
                "token bucket rate and burst must be positive (rate={rate_per_sec}, burst={burst})"
            )));
        }
        Ok(Self {
            state: Mutex::new(BucketState {
                tokens: burst,
                last_refill: Instant::now(),
            }),
            capacity: burst,
            refill_per_sec: rate_per_sec,
        })
    }

    /// Bucket expressed as a per-minute rate (RPM/TPM windows); burst equals
    /// the full minute's quota
    pub fn per_minute(rate_per_min: u64) -> Result<Self, LlmError> {
        Self::new(rate_per_min as f64 / 60.0, rate_per_min as f64)
    }

    /// Block until `n` tokens are available, then deduct them.
    ///
    /// Requests larger than the bucket capacity are clamped to the capacity;
    /// they could otherwise never be satisfied.
    pub async fn acquire(&self, n: u64) {
        let need = (n as f64).min(self.capacity);
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);
                if state.tokens >= need {
                    state.tokens -= need;
                    return;
                }
                Duration::from_secs_f64((need - state.tokens) / self.refill_per_sec)
            };
            debug!("rate limit: waiting {:?} for {} tokens", wait, n);
            sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    /// Tokens currently available (after refill)
    pub async fn available(&self) -> f64 {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        state.tokens
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.last_refill = now;
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
    }
}

/// Fixed per-UTC-day quota. Usage resets strictly at UTC midnight; a waiter
/// that cannot fit in the current day sleeps until the boundary passes.
pub struct DayCounter {
    state: Mutex<DayState>,
    capacity: u64,
}

struct DayState {
    day: NaiveDate,
    used: u64,
}

impl DayCounter {
    pub fn new(capacity: u64) -> Result<Self, LlmError> {
        if capacity == 0 {
            return Err(LlmError::Config(
                "day counter capacity must be positive".to_string(),
            ));
        }
        Ok(Self {
            state: Mutex::new(DayState {
                day: Utc::now().date_naive(),
                used: 0,
            }),
            capacity,
        })
    }

    /// Block until `n` units fit in the current UTC day, then consume them.
    /// `n` larger than the whole daily capacity can never be satisfied and is
    /// a configuration error.
    pub async fn acquire(&self, n: u64) -> Result<(), LlmError> {
        if n > self.capacity {
            return Err(LlmError::Config(format!(
                "requested {} units exceeds daily capacity {}",
                n, self.capacity
            )));
        }
        loop {
            let now = Utc::now();
            {
                let mut state = self.state.lock().await;
                if state.day != now.date_naive() {
                    state.day = now.date_naive();
                    state.used = 0;
                }
                if state.used + n <= self.capacity {
                    state.used += n;
                    return Ok(());
                }
            }
            let wait = until_utc_midnight(now) + Duration::from_millis(50);
            debug!("daily quota exhausted, waiting {:?} for UTC midnight", wait);
            sleep(wait).await;
        }
    }

    /// Units consumed so far today
    pub async fn used_today(&self) -> u64 {
        let mut state = self.state.lock().await;
        let today = Utc::now().date_naive();
        if state.day != today {
            state.day = today;
            state.used = 0;
        }
        state.used
    }
}

/// Time remaining until the next UTC midnight
fn until_utc_midnight(now: DateTime<Utc>) -> Duration {
    let secs_today =
        now.hour() as u64 * 3600 + now.minute() as u64 * 60 + now.second() as u64;
    let nanos = now.nanosecond() as u64 % 1_000_000_000;
    let remaining = 86_400 - secs_today;
    Duration::from_secs(remaining).saturating_sub(Duration::from_nanos(nanos))
}

/// Budget knobs for one LLM client
#[derive(Debug, Clone)]
pub struct BudgetConfig {
    /// Requests per second
    pub rps: f64,
    /// Burst size for the RPS bucket; defaults to the rate itself
    pub burst: Option<f64>,
    /// Requests per minute, unlimited when absent
    pub rpm: Option<u64>,
    /// Requests per UTC day, unlimited when absent
    pub rpd: Option<u64>,
    /// Tokens per minute, unlimited when absent
    pub tpm: Option<u64>,
    /// Pre-reserve TPM from token estimates before each call
    pub strict_tokens: bool,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            rps: 2.0,
            burst: None,
            rpm: None,
            rpd: None,
            tpm: None,
            strict_tokens: false,
        }
    }
}

/// Pre-call reservation handed back to `after_call` for reconciliation
#[derive(Debug, Clone, Copy, Default)]
pub struct Reservation {
    reserved_tokens: u64,
}

/// The single budget abstraction gating every outbound LLM call: a day
/// counter, RPM and RPS buckets, and an optional TPM bucket with strict
/// (estimate-based) or lazy (usage-based) accounting.
///
/// One instance per client, constructed explicitly at pipeline start and
/// shared by reference with all concurrent callers.
pub struct BudgetManager {
    rps: TokenBucket,
    rpm: Option<TokenBucket>,
    day: Option<DayCounter>,
    tpm: Option<TokenBucket>,
    strict_tokens: bool,
}

impl BudgetManager {
    pub fn new(config: &BudgetConfig) -> Result<Self, LlmError> {
        let burst = config.burst.unwrap_or(config.rps);
        Ok(Self {
            rps: TokenBucket::new(config.rps, burst)?,
            rpm: config.rpm.map(TokenBucket::per_minute).transpose()?,
            day: config.rpd.map(DayCounter::new).transpose()?,
            tpm: config.tpm.map(TokenBucket::per_minute).transpose()?,
            strict_tokens: config.strict_tokens,
        })
    }

    /// Acquire day, RPM and RPS capacity for one request; with strict token
    /// accounting and an available estimate, pre-reserve TPM as well.
    pub async fn before_call(
        &self,
        token_estimate: Option<u64>,
    ) -> Result<Reservation, LlmError> {
        if let Some(day) = &self.day {
            day.acquire(1).await?;
        }
        if let Some(rpm) = &self.rpm {
            rpm.acquire(1).await;
        }
        self.rps.acquire(1).await;

        let mut reserved = 0;
        if self.strict_tokens {
            if let (Some(tpm), Some(estimate)) = (&self.tpm, token_estimate) {
                tpm.acquire(estimate).await;
                reserved = estimate;
            }
        }
        Ok(Reservation {
            reserved_tokens: reserved,
        })
    }

    /// Reconcile actual token usage against the pre-reservation. Only the
    /// positive delta is acquired; over-reservation is never refunded.
    pub async fn after_call(&self, reservation: Reservation, usage: &Usage) {
        let Some(tpm) = &self.tpm else { return };
        let actual = usage.total();
        if self.strict_tokens {
            let delta = actual.saturating_sub(reservation.reserved_tokens);
            if delta > 0 {
                tpm.acquire(delta).await;
            }
        } else if actual > 0 {
            tpm.acquire(actual).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_bucket_rejects_non_positive_config() {
        assert!(TokenBucket::new(0.0, 10.0).is_err());
        assert!(TokenBucket::new(5.0, 0.0).is_err());
        assert!(TokenBucket::new(-1.0, 1.0).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_refill_is_capped_at_capacity() {
        let bucket = TokenBucket::new(10.0, 10.0).unwrap();
        bucket.acquire(10).await;
        assert!(bucket.available().await < 1.0);

        // Refill for 250ms at 10/s -> 2.5 tokens
        tokio::time::advance(Duration::from_millis(250)).await;
        let available = bucket.available().await;
        assert!((available - 2.5).abs() < 0.1, "available = {}", available);

        // Far longer than needed to refill; capped at capacity
        tokio::time::advance(Duration::from_secs(60)).await;
        let available = bucket.available().await;
        assert!((available - 10.0).abs() < 0.1, "available = {}", available);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_acquire_waits_for_deficit() {
        let bucket = TokenBucket::new(10.0, 10.0).unwrap();
        bucket.acquire(10).await;

        let start = Instant::now();
        bucket.acquire(5).await;
        // 5 tokens at 10/s is 500ms
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_clamps_oversized_request() {
        let bucket = TokenBucket::new(10.0, 10.0).unwrap();
        let start = Instant::now();
        bucket.acquire(100).await;
        // Clamped to capacity, already full, so no wait
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_day_counter_within_capacity() {
        let counter = DayCounter::new(10).unwrap();
        counter.acquire(4).await.unwrap();
        counter.acquire(6).await.unwrap();
        assert_eq!(counter.used_today().await, 10);
    }

    #[tokio::test]
    async fn test_day_counter_rejects_impossible_request() {
        let counter = DayCounter::new(5).unwrap();
        let err = counter.acquire(6).await.unwrap_err();
        assert!(matches!(err, LlmError::Config(_)));
    }

    #[test]
    fn test_day_counter_rejects_zero_capacity() {
        assert!(DayCounter::new(0).is_err());
    }

    #[test]
    fn test_until_utc_midnight() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 23, 59, 0).unwrap();
        assert_eq!(until_utc_midnight(now), Duration::from_secs(60));

        let now = Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap();
        assert_eq!(until_utc_midnight(now), Duration::from_secs(86_400));
    }

    #[tokio::test]
    async fn test_budget_manager_lazy_token_accounting() {
        let manager = BudgetManager::new(&BudgetConfig {
            rps: 100.0,
            tpm: Some(60_000),
            strict_tokens: false,
            ..Default::default()
        })
        .unwrap();

        let reservation = manager.before_call(Some(500)).await.unwrap();
        // Lazy mode: nothing reserved up front
        assert_eq!(reservation.reserved_tokens, 0);
        manager
            .after_call(
                reservation,
                &Usage {
                    input_tokens: 300,
                    output_tokens: 200,
                },
            )
            .await;
        let available = manager.tpm.as_ref().unwrap().available().await;
        assert!(available <= 59_500.0 + 1.0, "available = {}", available);
    }

    #[tokio::test]
    async fn test_budget_manager_strict_reserves_and_never_refunds() {
        let manager = BudgetManager::new(&BudgetConfig {
            rps: 100.0,
            tpm: Some(60_000),
            strict_tokens: true,
            ..Default::default()
        })
        .unwrap();

        let reservation = manager.before_call(Some(1_000)).await.unwrap();
        assert_eq!(reservation.reserved_tokens, 1_000);

        // Actual usage below the estimate: no refund
        manager
            .after_call(
                reservation,
                &Usage {
                    input_tokens: 100,
                    output_tokens: 100,
                },
            )
            .await;
        let available = manager.tpm.as_ref().unwrap().available().await;
        assert!(available <= 59_000.0 + 1.0, "available = {}", available);
    }
}
