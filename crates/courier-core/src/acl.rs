//! Additive ACL convergence: every desired rule ends up with exactly the
//! desired role, rules nobody asked for are reported and left alone.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{CourierError, ValidationError};
use crate::model::{AclRule, LiveAclRule, RawAclRule, ScopeKey};
use crate::services::CalendarService;

/// A live rule whose role must change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclUpdate {
    pub rule_id: String,
    pub previous_role: String,
    pub rule: AclRule,
}

/// Calls needed to converge the live rules onto the desired ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AclPlan {
    pub updates: Vec<AclUpdate>,
    pub inserts: Vec<AclRule>,
    pub extras: Vec<LiveAclRule>,
}

impl AclPlan {
    pub fn is_converged(&self) -> bool {
        self.updates.is_empty() && self.inserts.is_empty()
    }
}

/// What a completed sync changed. Extras were only reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AclReport {
    pub updated: Vec<AclUpdate>,
    pub inserted: Vec<AclRule>,
    pub extras: Vec<LiveAclRule>,
}

/// Validates every raw rule, stopping at the first invalid one.
pub fn validate(desired: &[RawAclRule]) -> Result<Vec<AclRule>, ValidationError> {
    desired.iter().map(AclRule::try_from).collect()
}

/// Diffs `desired` against `current` without touching the service.
///
/// Duplicate desired scope keys collapse to the last one given. Inserts keep
/// the order in which their scope keys last appeared in `desired`.
pub fn plan(desired: &[AclRule], current: &[LiveAclRule]) -> AclPlan {
    let mut wanted: BTreeMap<ScopeKey, (usize, &AclRule)> = BTreeMap::new();
    for (position, rule) in desired.iter().enumerate() {
        wanted.insert(rule.scope_key(), (position, rule));
    }

    let mut plan = AclPlan::default();
    for live in current {
        match wanted.remove(&live.scope_key()) {
            Some((_, rule)) if rule.role.as_str() != live.role => {
                plan.updates.push(AclUpdate {
                    rule_id: live.id.clone(),
                    previous_role: live.role.clone(),
                    rule: rule.clone(),
                });
            }
            Some(_) => {}
            None => plan.extras.push(live.clone()),
        }
    }

    let mut remaining: Vec<(usize, &AclRule)> = wanted.into_values().collect();
    remaining.sort_by_key(|(position, _)| *position);
    plan.inserts = remaining.into_iter().map(|(_, rule)| rule.clone()).collect();
    plan
}

pub struct AclSynchronizer {
    service: Arc<dyn CalendarService>,
}

impl AclSynchronizer {
    pub fn new(service: Arc<dyn CalendarService>) -> Self {
        Self { service }
    }

    /// Converges the calendar's ACL onto `desired`. Invalid input fails
    /// before the service is contacted at all.
    pub async fn sync(
        &self,
        calendar_id: &str,
        desired: &[RawAclRule],
    ) -> Result<AclReport, CourierError> {
        let desired = validate(desired)?;
        let current = self.service.list_acl(calendar_id).await?;
        self.apply(calendar_id, plan(&desired, &current)).await
    }

    /// Issues every update, then every insert. Never deletes.
    pub async fn apply(&self, calendar_id: &str, plan: AclPlan) -> Result<AclReport, CourierError> {
        for update in &plan.updates {
            info!(
                calendar_id,
                scope = %update.rule.scope_key(),
                from = %update.previous_role,
                to = %update.rule.role,
                "Updating ACL rule"
            );
            self.service
                .update_acl(calendar_id, &update.rule_id, &update.rule)
                .await?;
        }

        for rule in &plan.inserts {
            info!(calendar_id, scope = %rule.scope_key(), role = %rule.role, "Inserting ACL rule");
            self.service.insert_acl(calendar_id, rule).await?;
        }

        for extra in &plan.extras {
            warn!(
                calendar_id,
                scope = %extra.scope_key(),
                role = %extra.role,
                "Leaving unmanaged ACL rule in place"
            );
        }

        Ok(AclReport {
            updated: plan.updates,
            inserted: plan.inserts,
            extras: plan.extras,
        })
    }
}
