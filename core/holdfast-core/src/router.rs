//! Decision Router (shield decision process).
//!
//! Classifies the user's choice on a shield and drives its side effects.
//!
//! ```text
//! Continue   × {app, category, web domain} → follow-up prompt later, no ledger effect
//! ChangeMind × {app, category, web domain} → count++, draw reward, queue it,
//!                                            confirmation prompt with the amount
//! legacy signal (app name + "unblock_decision")
//!                                          → ask the main app to show the
//!                                            decision prompt, no ledger effect
//! ```
//!
//! Every path is terminal: one call, one outcome.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::HoldfastConfig;
use crate::error::Result;
use crate::ledger::RewardLedger;
use crate::model::PendingReward;
use crate::store::{keys, SharedState};

/// Marker carried by legacy signals that ask for a decision prompt.
pub const UNBLOCK_DECISION_MARKER: &str = "unblock_decision";

pub const CONTINUE_FOLLOWUP_CATEGORY: &str = "HOLDFAST_CONTINUE_FOLLOWUP";
pub const CHANGE_MIND_REWARD_CATEGORY: &str = "HOLDFAST_CHANGE_MIND_REWARD";

/// What the shield was covering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ShieldScope {
    Application { name: Option<String> },
    Category { name: Option<String> },
    WebDomain { domain: Option<String> },
}

impl ShieldScope {
    pub fn kind(&self) -> &'static str {
        match self {
            ShieldScope::Application { .. } => "application",
            ShieldScope::Category { .. } => "category",
            ShieldScope::WebDomain { .. } => "web-domain",
        }
    }

    /// Human-readable target, with a generic fallback per scope.
    pub fn label(&self) -> String {
        match self {
            ShieldScope::Application { name } => {
                name.clone().unwrap_or_else(|| "this app".to_string())
            }
            ShieldScope::Category { name } => name
                .clone()
                .unwrap_or_else(|| "this category".to_string()),
            ShieldScope::WebDomain { domain } => domain
                .clone()
                .unwrap_or_else(|| "this website".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShieldAction {
    Continue,
    ChangeMind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldDecision {
    pub action: ShieldAction,
    pub scope: ShieldScope,
}

/// Free-form signal from older shield builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacySignal {
    pub app_name: String,
    pub marker: String,
}

/// Structured request for the host notification scheduler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    pub category: String,
    #[serde(rename = "delay_secs", serialize_with = "serialize_secs")]
    pub delay: Duration,
    pub user_info: BTreeMap<String, String>,
}

fn serialize_secs<S: serde::Serializer>(
    delay: &Duration,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(delay.as_secs_f64())
}

/// Host notification scheduler. Implemented outside this crate.
pub trait NotificationScheduler {
    fn schedule(&self, request: NotificationRequest) -> Result<()>;
}

impl<T: NotificationScheduler + ?Sized> NotificationScheduler for &T {
    fn schedule(&self, request: NotificationRequest) -> Result<()> {
        (**self).schedule(request)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecisionOutcome {
    FollowUpScheduled,
    Rewarded {
        reward: PendingReward,
        /// Changes recorded today before this one.
        count_before: u32,
    },
    UnblockPromptRequested {
        app_name: String,
    },
    Ignored,
}

pub struct DecisionRouter<N> {
    state: SharedState,
    ledger: RewardLedger,
    notifier: N,
    followup_delay: Duration,
    confirmation_delay: Duration,
}

impl<N: NotificationScheduler> DecisionRouter<N> {
    pub fn new(state: SharedState, config: &HoldfastConfig, notifier: N) -> Self {
        Self {
            ledger: RewardLedger::new(state.clone(), config),
            state,
            notifier,
            followup_delay: Duration::from_secs(config.continue_followup_delay_secs),
            confirmation_delay: Duration::from_secs(config.change_mind_confirmation_delay_secs),
        }
    }

    pub fn handle<R: Rng + ?Sized>(
        &self,
        decision: &ShieldDecision,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<DecisionOutcome> {
        match decision.action {
            ShieldAction::Continue => {
                self.notify(self.followup_request(&decision.scope));
                tracing::info!(
                    scope = decision.scope.kind(),
                    "Continue chosen; follow-up scheduled"
                );
                Ok(DecisionOutcome::FollowUpScheduled)
            }
            ShieldAction::ChangeMind => {
                let reason = format!("Changed mind about {}", decision.scope.label());
                let (before, reward) = self.ledger.award_change_mind(&reason, now, rng)?;
                self.notify(self.confirmation_request(&decision.scope, &reward));
                tracing::info!(
                    scope = decision.scope.kind(),
                    amount = reward.amount,
                    count_before = before.count,
                    "Change of mind rewarded"
                );
                Ok(DecisionOutcome::Rewarded {
                    reward,
                    count_before: before.count,
                })
            }
        }
    }

    /// Legacy path: never touches the ledger.
    pub fn handle_legacy(&self, signal: &LegacySignal) -> Result<DecisionOutcome> {
        if signal.marker != UNBLOCK_DECISION_MARKER {
            tracing::debug!(marker = %signal.marker, "Ignoring legacy signal with unknown marker");
            return Ok(DecisionOutcome::Ignored);
        }
        request_unblock_prompt(&self.state, &signal.app_name)?;
        Ok(DecisionOutcome::UnblockPromptRequested {
            app_name: signal.app_name.clone(),
        })
    }

    fn notify(&self, request: NotificationRequest) {
        let category = request.category.clone();
        if let Err(e) = self.notifier.schedule(request) {
            tracing::warn!(error = %e, category = %category, "Failed to schedule notification");
        }
    }

    fn followup_request(&self, scope: &ShieldScope) -> NotificationRequest {
        NotificationRequest {
            title: "Still worth it?".to_string(),
            body: format!(
                "You chose to keep going with {}. Take a second to check in.",
                scope.label()
            ),
            category: CONTINUE_FOLLOWUP_CATEGORY.to_string(),
            delay: self.followup_delay,
            user_info: scope_info(scope),
        }
    }

    fn confirmation_request(
        &self,
        scope: &ShieldScope,
        reward: &PendingReward,
    ) -> NotificationRequest {
        let mut user_info = scope_info(scope);
        user_info.insert("amount".to_string(), reward.amount.to_string());
        NotificationRequest {
            title: "Nice save!".to_string(),
            body: format!(
                "You stepped away from {} and earned {} gems.",
                scope.label(),
                reward.amount
            ),
            category: CHANGE_MIND_REWARD_CATEGORY.to_string(),
            delay: self.confirmation_delay,
            user_info,
        }
    }
}

fn scope_info(scope: &ShieldScope) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("scope".to_string(), scope.kind().to_string()),
        ("target".to_string(), scope.label()),
    ])
}

/// Flags that the main app should render the decision prompt for `app_name`.
pub fn request_unblock_prompt(state: &SharedState, app_name: &str) -> Result<()> {
    state.put(keys::UNBLOCK_DECISION_APP, app_name)?;
    state.put(keys::UNBLOCK_DECISION_REQUESTED, &true)
}

/// The app name of a pending prompt request, without consuming it.
pub fn pending_unblock_request(state: &SharedState) -> Result<Option<String>> {
    let requested = state
        .get::<bool>(keys::UNBLOCK_DECISION_REQUESTED)?
        .unwrap_or(false);
    if !requested {
        return Ok(None);
    }
    Ok(Some(
        state
            .get::<String>(keys::UNBLOCK_DECISION_APP)?
            .unwrap_or_default(),
    ))
}

/// Main app side: consumes a pending prompt request, if any.
pub fn take_unblock_request(state: &SharedState) -> Result<Option<String>> {
    state.locked(|state| {
        let pending = pending_unblock_request(state)?;
        if pending.is_some() {
            state.put(keys::UNBLOCK_DECISION_REQUESTED, &false)?;
            state.remove(keys::UNBLOCK_DECISION_APP)?;
        }
        Ok(pending)
    })
}
