//! Reward Ledger.
//!
//! The shield process appends pending rewards; the main app drains them into
//! the gem balance. Both sides also share the per-day change-mind counter that
//! drives the decaying reward curve.
//!
//! ## Reward Curve
//!
//! | changes so far today | gems  |
//! |----------------------|-------|
//! | 0–2                  | 25–30 |
//! | 3–5                  | 20–25 |
//! | 6–8                  | 15–20 |
//! | 9+                   | 10–15 |
//!
//! ## Atomicity
//!
//! Counter increments, appends, and drains each run under the store lock, so
//! concurrent shield decisions cannot under-count and a reward appended while
//! the main app drains lands either in this drain or the next one. A drain
//! clears the queue before crediting the balance: if the process dies between
//! the two, that batch is lost rather than paid twice.
//!
//! ## Counter Storage
//!
//! Counts live in one rolling map (`dailyChangeMindCounts`, day → count) that
//! keeps `counter_retention_days` days. Older builds wrote one
//! `daily_change_mind_<day>` key per day; those seed the map on first use and
//! are removed by [`RewardLedger::prune_legacy_counters`].

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use crate::config::HoldfastConfig;
use crate::error::Result;
use crate::model::{day_start_epoch, DailyChangeMindCounter, PendingReward};
use crate::store::{keys, SharedState};

const SECONDS_PER_DAY: i64 = 86_400;

/// (first daily count in tier, minimum gems, maximum gems)
const REWARD_TIERS: [(u32, u32, u32); 4] = [(0, 25, 30), (3, 20, 25), (6, 15, 20), (9, 10, 15)];

type DailyCounts = BTreeMap<i64, u32>;

/// Gem range for the next reward given how many changes already happened today.
pub fn reward_range(count_so_far: u32) -> RangeInclusive<u32> {
    let (_, min, max) = REWARD_TIERS
        .iter()
        .rev()
        .find(|(first, _, _)| count_so_far >= *first)
        .copied()
        .unwrap_or(REWARD_TIERS[0]);
    min..=max
}

pub fn draw_reward<R: Rng + ?Sized>(count_so_far: u32, rng: &mut R) -> u32 {
    rng.gen_range(reward_range(count_so_far))
}

/// Result of draining the queue into the balance.
#[derive(Debug, Clone, PartialEq, Serialize, uniffi::Record)]
pub struct DrainSummary {
    pub rewards: Vec<PendingReward>,
    pub credited: u64,
    pub balance: u64,
}

/// Pending-reward queue, gem balance, and daily counters.
#[derive(Debug, Clone)]
pub struct RewardLedger {
    state: SharedState,
    retention_days: u32,
}

impl RewardLedger {
    pub fn new(state: SharedState, config: &HoldfastConfig) -> Self {
        Self {
            state,
            retention_days: config.counter_retention_days.max(1),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Daily counter
    // ─────────────────────────────────────────────────────────────────────────────

    /// Today's count without modifying anything.
    pub fn change_mind_count(&self, now: DateTime<Utc>) -> Result<DailyChangeMindCounter> {
        let day_key = day_start_epoch(now);
        let counts = self.load_counts(day_key)?;
        Ok(DailyChangeMindCounter {
            day_key,
            count: counts.get(&day_key).copied().unwrap_or(0),
        })
    }

    /// Increments today's counter. Returns the count *before* this change.
    pub fn record_change_mind(&self, now: DateTime<Utc>) -> Result<DailyChangeMindCounter> {
        self.state.locked(|state| self.increment(state, now))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Pending queue
    // ─────────────────────────────────────────────────────────────────────────────

    /// Appends to the tail of the pending queue.
    pub fn append_pending(
        &self,
        amount: u32,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<PendingReward> {
        let reward = PendingReward::new(amount, reason, now);
        self.state.locked(|state| append(state, reward.clone()))?;
        Ok(reward)
    }

    /// Counts the change, draws the tiered amount, and queues it, all under
    /// one lock.
    pub fn award_change_mind<R: Rng + ?Sized>(
        &self,
        reason: &str,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<(DailyChangeMindCounter, PendingReward)> {
        self.state.locked(|state| {
            let before = self.increment(state, now)?;
            let reward = PendingReward::new(draw_reward(before.count, rng), reason, now);
            append(state, reward.clone())?;
            Ok((before, reward))
        })
    }

    pub fn pending(&self) -> Result<Vec<PendingReward>> {
        Ok(self
            .state
            .get::<Vec<PendingReward>>(keys::PENDING_GEM_REWARDS)?
            .unwrap_or_default())
    }

    /// Takes every pending reward and leaves the queue empty, atomically.
    pub fn drain_all(&self) -> Result<Vec<PendingReward>> {
        self.state
            .update::<Vec<PendingReward>, _>(keys::PENDING_GEM_REWARDS, |current| {
                (Some(Vec::new()), current.unwrap_or_default())
            })
    }

    /// Drains the queue and credits the balance. Each reward is applied once.
    pub fn apply_pending_to_balance(&self) -> Result<DrainSummary> {
        let summary = self.state.locked(|state| {
            let rewards = state
                .get::<Vec<PendingReward>>(keys::PENDING_GEM_REWARDS)?
                .unwrap_or_default();
            let balance = state.get::<u64>(keys::GEM_BALANCE)?.unwrap_or(0);
            if rewards.is_empty() {
                return Ok(DrainSummary {
                    rewards,
                    credited: 0,
                    balance,
                });
            }

            state.put(keys::PENDING_GEM_REWARDS, &Vec::<PendingReward>::new())?;
            let credited: u64 = rewards.iter().map(|r| u64::from(r.amount)).sum();
            let balance = balance.saturating_add(credited);
            state.put(keys::GEM_BALANCE, &balance)?;
            Ok(DrainSummary {
                rewards,
                credited,
                balance,
            })
        })?;

        if summary.credited > 0 {
            tracing::info!(
                rewards = summary.rewards.len(),
                credited = summary.credited,
                balance = summary.balance,
                "Pending rewards applied"
            );
        }
        Ok(summary)
    }

    pub fn balance(&self) -> Result<u64> {
        Ok(self.state.get::<u64>(keys::GEM_BALANCE)?.unwrap_or(0))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Legacy counters
    // ─────────────────────────────────────────────────────────────────────────────

    /// Removes per-day counter keys that fall outside the retention window.
    pub fn prune_legacy_counters(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = self.cutoff(day_start_epoch(now));
        let mut removed = 0;
        for key in self.state.keys()? {
            let Some(day_key) = keys::parse_legacy_daily_counter_key(&key) else {
                continue;
            };
            if day_key < cutoff {
                self.state.remove(&key)?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!(removed, "Pruned legacy change-mind counters");
        }
        Ok(removed)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Internals (callers hold the lock)
    // ─────────────────────────────────────────────────────────────────────────────

    fn cutoff(&self, today: i64) -> i64 {
        today - i64::from(self.retention_days) * SECONDS_PER_DAY
    }

    fn load_counts(&self, today: i64) -> Result<DailyCounts> {
        let mut counts = self
            .state
            .get::<DailyCounts>(keys::DAILY_CHANGE_MIND_COUNTS)?
            .unwrap_or_default();
        if !counts.contains_key(&today) {
            if let Some(legacy) = self
                .state
                .get::<u32>(&keys::legacy_daily_counter_key(today))?
            {
                counts.insert(today, legacy);
            }
        }
        Ok(counts)
    }

    fn increment(&self, state: &SharedState, now: DateTime<Utc>) -> Result<DailyChangeMindCounter> {
        let today = day_start_epoch(now);
        let mut counts = self.load_counts(today)?;
        let before = counts.get(&today).copied().unwrap_or(0);
        counts.insert(today, before.saturating_add(1));

        let cutoff = self.cutoff(today);
        counts.retain(|day, _| *day >= cutoff);
        state.put(keys::DAILY_CHANGE_MIND_COUNTS, &counts)?;

        Ok(DailyChangeMindCounter {
            day_key: today,
            count: before,
        })
    }
}

fn append(state: &SharedState, reward: PendingReward) -> Result<()> {
    let mut queue = state
        .get::<Vec<PendingReward>>(keys::PENDING_GEM_REWARDS)?
        .unwrap_or_default();
    queue.push(reward);
    state.put(keys::PENDING_GEM_REWARDS, &queue)
}
