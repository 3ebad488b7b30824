//! Persisted key names.
//!
//! The first group is read by older builds of the main app; do not rename.

use once_cell::sync::Lazy;
use regex::Regex;

// ═══════════════════════════════════════════════════════════════════════════════
// Usage aggregate
// ═══════════════════════════════════════════════════════════════════════════════

pub const TOTAL_SCREEN_TIME: &str = "totalScreenTime";
pub const TOTAL_APP_COUNT: &str = "totalAppCount";
pub const LAST_SCREEN_TIME_UPDATE: &str = "lastScreenTimeUpdate";
pub const USAGE_SCORE: &str = "usageScore";
pub const DATA_UPDATE_TIMESTAMP: &str = "dataUpdateTimestamp";
pub const APP_REPORTS_DATA: &str = "appReportsData";

// ═══════════════════════════════════════════════════════════════════════════════
// Rewards
// ═══════════════════════════════════════════════════════════════════════════════

pub const PENDING_GEM_REWARDS: &str = "pendingGemRewards";
pub const GEM_BALANCE: &str = "gemBalance";
pub const DAILY_CHANGE_MIND_COUNTS: &str = "dailyChangeMindCounts";
const LEGACY_DAILY_CHANGE_MIND_PREFIX: &str = "daily_change_mind_";

// ═══════════════════════════════════════════════════════════════════════════════
// Shield decisions / monitoring
// ═══════════════════════════════════════════════════════════════════════════════

pub const UNBLOCK_DECISION_REQUESTED: &str = "unblockDecisionRequested";
pub const UNBLOCK_DECISION_APP: &str = "unblockDecisionApp";
pub const MONITORED_ACTIVITIES: &str = "monitoredActivities";

static RE_VALID_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").unwrap());
static RE_LEGACY_DAILY_COUNTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^daily_change_mind_(-?\d+)$").unwrap());

/// Keys become file names, so only a conservative character set is allowed.
pub fn is_valid_key(key: &str) -> bool {
    RE_VALID_KEY.is_match(key) && key != "." && key != ".."
}

/// Per-day counter key written by older builds.
pub fn legacy_daily_counter_key(day_key: i64) -> String {
    format!("{}{}", LEGACY_DAILY_CHANGE_MIND_PREFIX, day_key)
}

/// Extracts the day from a legacy per-day counter key.
pub fn parse_legacy_daily_counter_key(key: &str) -> Option<i64> {
    RE_LEGACY_DAILY_COUNTER
        .captures(key)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_keys() {
        assert!(is_valid_key(TOTAL_SCREEN_TIME));
        assert!(is_valid_key("daily_change_mind_1772323200"));
        assert!(!is_valid_key("../escape"));
        assert!(!is_valid_key(".."));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("a/b"));
    }

    #[test]
    fn test_legacy_counter_key() {
        let key = legacy_daily_counter_key(1_772_323_200);
        assert_eq!(key, "daily_change_mind_1772323200");
        assert_eq!(parse_legacy_daily_counter_key(&key), Some(1_772_323_200));
        assert_eq!(parse_legacy_daily_counter_key("dailyChangeMindCounts"), None);
    }
}
