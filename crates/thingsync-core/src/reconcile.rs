// ── Subscription reconciliation ──
//
// Diffs the capabilities the devices need against the subscriptions the
// platform currently holds for an installed app, then issues every
// create/delete concurrently. The platform stays the source of truth:
// a pass never assumes its own earlier writes succeeded, so re-running it
// is the retry mechanism.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use thingsync_api::SmartThingsClient;
use thingsync_api::types::{SubscriptionRequest, SubscriptionResponse};

use crate::config::SyncSettings;
use crate::error::CoreError;
use crate::model::{Capability, CapabilityFilter, Device, SUBSCRIPTION_WARNING_LIMIT};

// ── Plan ────────────────────────────────────────────────────────────

/// An existing capability subscription scheduled for removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleSubscription {
    pub subscription_id: String,
    pub capability: Capability,
}

/// Result of diffing desired capabilities against existing subscriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionPlan {
    /// Capabilities already covered by exactly one kept subscription.
    pub keep: Vec<Capability>,
    /// Subscriptions whose capability is no longer wanted (or duplicated).
    pub delete: Vec<StaleSubscription>,
    /// Desired capabilities with no subscription yet.
    pub create: Vec<Capability>,
    /// No device lifecycle subscription exists for the location.
    pub watch_devices: bool,
}

impl SubscriptionPlan {
    /// Partition `existing` against `desired`.
    ///
    /// The first subscription seen for a desired capability satisfies it;
    /// any later one for the same capability is deleted as a duplicate.
    /// A single device lifecycle subscription is required so that device
    /// additions and removals reach the webhook. Subscriptions of other
    /// source types are not ours to manage and are left alone.
    pub fn compute(mut desired: BTreeSet<Capability>, existing: &[SubscriptionResponse]) -> Self {
        let mut plan = Self {
            watch_devices: !existing.iter().any(SubscriptionResponse::is_device_lifecycle),
            ..Self::default()
        };

        for sub in existing {
            let Some(name) = sub.capability_name() else {
                continue;
            };
            let capability = Capability::from(name);
            if desired.remove(&capability) {
                plan.keep.push(capability);
            } else {
                plan.delete.push(StaleSubscription {
                    subscription_id: sub.id.clone(),
                    capability,
                });
            }
        }

        plan.create = desired.into_iter().collect();
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.delete.is_empty() && self.create.is_empty() && !self.watch_devices
    }
}

// ── Report ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionAction {
    Create,
    Delete,
}

impl fmt::Display for SubscriptionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("create"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// Outcome of one create or delete call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionOutcome {
    pub capability: Capability,
    pub action: SubscriptionAction,
    /// Error message when the call failed.
    pub result: Result<(), String>,
}

impl SubscriptionOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Everything one reconciliation pass decided and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub installed_app_id: String,
    pub desired: BTreeSet<Capability>,
    pub kept: Vec<Capability>,
    pub outcomes: Vec<SubscriptionOutcome>,
    /// Result of creating the device lifecycle subscription, when one was
    /// missing.
    pub device_lifecycle: Option<Result<(), String>>,
}

impl ReconcileReport {
    fn outcomes_of(&self, action: SubscriptionAction) -> impl Iterator<Item = &Capability> {
        self.outcomes
            .iter()
            .filter(move |o| o.action == action && o.is_success())
            .map(|o| &o.capability)
    }

    /// Capabilities successfully subscribed in this pass.
    pub fn created(&self) -> Vec<&Capability> {
        self.outcomes_of(SubscriptionAction::Create).collect()
    }

    /// Capabilities successfully unsubscribed in this pass.
    pub fn deleted(&self) -> Vec<&Capability> {
        self.outcomes_of(SubscriptionAction::Delete).collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &SubscriptionOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// Failed calls, the device lifecycle subscription included.
    pub fn failure_count(&self) -> usize {
        self.failures().count() + usize::from(matches!(self.device_lifecycle, Some(Err(_))))
    }

    /// No calls were needed: the remote state already matched.
    pub fn is_up_to_date(&self) -> bool {
        self.outcomes.is_empty() && self.device_lifecycle.is_none()
    }

    /// Every issued call succeeded, so the remote set now equals `desired`.
    pub fn is_converged(&self) -> bool {
        self.failure_count() == 0
    }
}

// ── Reconciler ──────────────────────────────────────────────────────

/// Computes and applies subscription changes for installed apps.
#[derive(Debug, Clone)]
pub struct Reconciler {
    filter: CapabilityFilter,
    warning_limit: usize,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(CapabilityFilter::default(), SUBSCRIPTION_WARNING_LIMIT)
    }
}

impl Reconciler {
    pub fn new(filter: CapabilityFilter, warning_limit: usize) -> Self {
        Self {
            filter,
            warning_limit,
        }
    }

    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self::new(settings.capability_filter(), settings.warning_limit)
    }

    /// Filtered capability union across `devices`.
    pub fn desired_capabilities<'a>(
        &self,
        devices: impl IntoIterator<Item = &'a Device>,
    ) -> BTreeSet<Capability> {
        self.filter.desired(devices)
    }

    /// Run one pass for an installed app.
    ///
    /// `client` must carry a token allowed to manage the installed app's
    /// subscriptions. Only the initial listing can fail the pass; every
    /// create/delete failure is logged and recorded in the report.
    pub async fn reconcile(
        &self,
        client: &SmartThingsClient,
        installed_app_id: &str,
        location_id: &str,
        devices: &[Device],
    ) -> Result<ReconcileReport, CoreError> {
        let desired = self.desired_capabilities(devices);
        debug!(
            installed_app_id,
            capabilities = ?desired,
            "computed desired capabilities"
        );

        if desired.len() > self.warning_limit {
            warn!(
                installed_app_id,
                count = desired.len(),
                limit = self.warning_limit,
                "too many subscriptions required, exceeding limit"
            );
        }

        let existing = client.list_subscriptions(installed_app_id).await?;
        let plan = SubscriptionPlan::compute(desired.clone(), &existing);

        if plan.is_empty() {
            debug!(installed_app_id, "subscriptions are up-to-date");
            return Ok(ReconcileReport {
                installed_app_id: installed_app_id.to_owned(),
                desired,
                kept: plan.keep,
                outcomes: Vec::new(),
                device_lifecycle: None,
            });
        }

        info!(
            installed_app_id,
            create = plan.create.len(),
            delete = plan.delete.len(),
            keep = plan.keep.len(),
            watch_devices = plan.watch_devices,
            "synchronizing subscriptions"
        );

        let deletions = join_all(
            plan.delete
                .iter()
                .map(|stale| delete_subscription(client, installed_app_id, stale)),
        );
        let creations = join_all(
            plan.create
                .iter()
                .map(|cap| create_subscription(client, installed_app_id, location_id, cap)),
        );
        let lifecycle = async {
            if plan.watch_devices {
                Some(watch_devices(client, installed_app_id, location_id).await)
            } else {
                None
            }
        };
        let (deleted, created, device_lifecycle) = tokio::join!(deletions, creations, lifecycle);

        Ok(ReconcileReport {
            installed_app_id: installed_app_id.to_owned(),
            desired,
            kept: plan.keep,
            outcomes: deleted.into_iter().chain(created).collect(),
            device_lifecycle,
        })
    }
}

async fn create_subscription(
    client: &SmartThingsClient,
    installed_app_id: &str,
    location_id: &str,
    capability: &Capability,
) -> SubscriptionOutcome {
    let request = SubscriptionRequest::capability(location_id, capability.as_str());
    let result = match client.create_subscription(installed_app_id, &request).await {
        Ok(_) => {
            debug!(%capability, installed_app_id, "created subscription");
            Ok(())
        }
        Err(e) => {
            warn!(%capability, installed_app_id, error = %e, "failed to create subscription");
            Err(e.to_string())
        }
    };

    SubscriptionOutcome {
        capability: capability.clone(),
        action: SubscriptionAction::Create,
        result,
    }
}

async fn watch_devices(
    client: &SmartThingsClient,
    installed_app_id: &str,
    location_id: &str,
) -> Result<(), String> {
    let request = SubscriptionRequest::device_lifecycle(location_id);
    match client.create_subscription(installed_app_id, &request).await {
        Ok(_) => {
            debug!(installed_app_id, location_id, "created device lifecycle subscription");
            Ok(())
        }
        Err(e) => {
            warn!(installed_app_id, error = %e, "failed to create device lifecycle subscription");
            Err(e.to_string())
        }
    }
}

async fn delete_subscription(
    client: &SmartThingsClient,
    installed_app_id: &str,
    stale: &StaleSubscription,
) -> SubscriptionOutcome {
    let capability = &stale.capability;
    let result = match client
        .delete_subscription(installed_app_id, &stale.subscription_id)
        .await
    {
        Ok(()) => {
            debug!(%capability, installed_app_id, "removed subscription that is no longer needed");
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            debug!(%capability, installed_app_id, "subscription already gone");
            Ok(())
        }
        Err(e) => {
            warn!(%capability, installed_app_id, error = %e, "failed to remove subscription");
            Err(e.to_string())
        }
    };

    SubscriptionOutcome {
        capability: capability.clone(),
        action: SubscriptionAction::Delete,
        result,
    }
}

// ── Failure streaks ─────────────────────────────────────────────────

/// Counts consecutive failed passes per capability.
///
/// A single failure is expected noise (the next pass retries it); a
/// capability that keeps failing pass after pass needs a human.
#[derive(Debug, Clone)]
pub struct FailureStreaks {
    threshold: u32,
    streaks: HashMap<Capability, u32>,
}

impl FailureStreaks {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            streaks: HashMap::new(),
        }
    }

    /// Fold one report in and return capabilities at or past the threshold,
    /// with their streak length, sorted by capability.
    ///
    /// A capability that is neither desired nor touched by the pass has
    /// nothing left to converge, so its streak is dropped.
    pub fn record(&mut self, report: &ReconcileReport) -> Vec<(Capability, u32)> {
        self.streaks.retain(|capability, _| {
            report.desired.contains(capability)
                || report.outcomes.iter().any(|o| &o.capability == capability)
        });
        for cap in &report.kept {
            self.streaks.remove(cap);
        }
        for outcome in &report.outcomes {
            if outcome.is_success() {
                self.streaks.remove(&outcome.capability);
            } else {
                *self.streaks.entry(outcome.capability.clone()).or_insert(0) += 1;
            }
        }

        let mut persistent: Vec<(Capability, u32)> = self
            .streaks
            .iter()
            .filter(|(_, n)| **n >= self.threshold)
            .map(|(c, n)| (c.clone(), *n))
            .collect();
        persistent.sort();
        persistent
    }

    pub fn streak(&self, capability: &Capability) -> u32 {
        self.streaks.get(capability).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn sub(id: &str, capability: &str) -> SubscriptionResponse {
        serde_json::from_value(json!({
            "id": id,
            "installedAppId": "ia",
            "sourceType": "CAPABILITY",
            "capability": { "locationId": "loc", "capability": capability }
        }))
        .unwrap()
    }

    fn caps(names: &[&str]) -> BTreeSet<Capability> {
        names.iter().map(|&n| n.into()).collect()
    }

    #[test]
    fn plan_keeps_matches_and_creates_the_rest() {
        let plan = SubscriptionPlan::compute(
            caps(&["switch", "switchLevel", "thermostatMode"]),
            &[sub("s1", "switch")],
        );
        assert_eq!(plan.keep, vec![Capability::from("switch")]);
        assert!(plan.delete.is_empty());
        assert_eq!(
            plan.create,
            vec![Capability::from("switchLevel"), Capability::from("thermostatMode")]
        );
    }

    #[test]
    fn plan_deletes_unwanted_and_duplicate_subscriptions() {
        let plan = SubscriptionPlan::compute(
            caps(&["switch"]),
            &[sub("s1", "switch"), sub("s2", "switch"), sub("s3", "lock")],
        );
        assert_eq!(plan.keep, vec![Capability::from("switch")]);
        assert_eq!(
            plan.delete
                .iter()
                .map(|s| s.subscription_id.as_str())
                .collect::<Vec<_>>(),
            ["s2", "s3"]
        );
        assert!(plan.create.is_empty());
    }

    #[test]
    fn plan_ignores_non_capability_subscriptions() {
        let lifecycle: SubscriptionResponse = serde_json::from_value(json!({
            "id": "s9",
            "installedAppId": "ia",
            "sourceType": "DEVICE_LIFECYCLE"
        }))
        .unwrap();
        let plan = SubscriptionPlan::compute(BTreeSet::new(), &[lifecycle]);
        assert!(plan.is_empty());
    }

    #[test]
    fn plan_watches_devices_until_a_lifecycle_subscription_exists() {
        let lifecycle: SubscriptionResponse = serde_json::from_value(json!({
            "id": "s9",
            "installedAppId": "ia",
            "sourceType": "DEVICE_LIFECYCLE",
            "deviceLifecycle": { "locationId": "loc" }
        }))
        .unwrap();

        let missing = SubscriptionPlan::compute(caps(&["switch"]), &[sub("s1", "switch")]);
        assert!(missing.watch_devices);
        assert!(!missing.is_empty());

        let present =
            SubscriptionPlan::compute(caps(&["switch"]), &[sub("s1", "switch"), lifecycle]);
        assert!(!present.watch_devices);
        assert!(present.is_empty());
    }

    /// Report of one pass: `action` outcomes over `desired`, keeping `kept`.
    fn report(
        desired: &[&str],
        kept: &[&str],
        action: SubscriptionAction,
        outcomes: &[(&str, bool)],
    ) -> ReconcileReport {
        ReconcileReport {
            installed_app_id: "ia".into(),
            desired: caps(desired),
            kept: kept.iter().map(|&c| c.into()).collect(),
            outcomes: outcomes
                .iter()
                .map(|&(c, ok)| SubscriptionOutcome {
                    capability: c.into(),
                    action,
                    result: if ok { Ok(()) } else { Err("boom".into()) },
                })
                .collect(),
            device_lifecycle: None,
        }
    }

    fn failed_deletes(outcomes: &[(&str, bool)]) -> ReconcileReport {
        report(&[], &[], SubscriptionAction::Delete, outcomes)
    }

    #[test]
    fn streaks_escalate_after_threshold_and_reset_on_success() {
        let mut streaks = FailureStreaks::new(3);

        assert!(streaks.record(&failed_deletes(&[("lock", false)])).is_empty());
        assert!(streaks.record(&failed_deletes(&[("lock", false)])).is_empty());
        assert_eq!(
            streaks.record(&failed_deletes(&[("lock", false), ("switch", false)])),
            vec![(Capability::from("lock"), 3)]
        );

        streaks.record(&failed_deletes(&[("lock", true), ("switch", false)]));
        assert_eq!(streaks.streak(&"lock".into()), 0);
        assert_eq!(streaks.streak(&"switch".into()), 2);
    }

    #[test]
    fn streaks_drop_capabilities_no_longer_desired() {
        let mut streaks = FailureStreaks::new(3);
        let failed_create = report(
            &["lock", "switch"],
            &["switch"],
            SubscriptionAction::Create,
            &[("lock", false)],
        );
        for _ in 0..3 {
            streaks.record(&failed_create);
        }
        assert_eq!(streaks.streak(&"lock".into()), 3);

        let converged = report(&["switch"], &["switch"], SubscriptionAction::Create, &[]);
        for _ in 0..2 {
            assert!(streaks.record(&converged).is_empty());
        }
        assert_eq!(streaks.streak(&"lock".into()), 0);
    }

    #[test]
    fn failed_device_lifecycle_subscription_blocks_convergence() {
        let mut pass = report(&["switch"], &["switch"], SubscriptionAction::Create, &[]);
        assert!(pass.is_converged());
        assert!(pass.is_up_to_date());

        pass.device_lifecycle = Some(Err("boom".into()));
        assert!(!pass.is_converged());
        assert!(!pass.is_up_to_date());
        assert_eq!(pass.failure_count(), 1);
    }
}
