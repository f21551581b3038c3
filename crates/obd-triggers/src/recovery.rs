//! Reconciliation of resources left behind by interrupted sagas.
//!
//! A process that dies mid-saga can leave a draft row, a topic and a rule
//! that no committed trigger owns. The sweep removes them. Ids with a saga in
//! flight are skipped, and each candidate is re-read under its lock so a
//! trigger that committed after the listing is never touched.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::broker::Broker;
use crate::error::Result;
use crate::locks::SagaGuard;
use crate::rules::RuleEngine;
use crate::saga::{SagaContext, tolerate_absent};
use crate::store::TriggerStore;
use crate::types::{Trigger, TriggerId};

/// Outcome of one recovery sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Draft rows removed along with their target rows.
    pub drafts_purged: usize,
    /// Rules removed because no committed trigger owns them.
    pub rules_removed: usize,
    /// Topics removed because no committed trigger owns them.
    pub topics_removed: usize,
    /// Candidates skipped because a saga held their id.
    pub skipped_in_flight: usize,
    /// Items whose cleanup failed; they are retried by the next sweep.
    pub failures: usize,
}

impl RecoveryReport {
    /// Returns true if the sweep found nothing to do.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.drafts_purged == 0
            && self.rules_removed == 0
            && self.topics_removed == 0
            && self.skipped_in_flight == 0
            && self.failures == 0
    }
}

enum Claim {
    Orphan(SagaGuard),
    Busy,
    Owned,
}

/// Locks `id` and confirms no committed trigger owns it.
async fn claim<S, B, R>(ctx: &SagaContext<S, B, R>, id: TriggerId) -> Result<Claim>
where
    S: TriggerStore,
    B: Broker,
    R: RuleEngine,
{
    let Ok(guard) = ctx.locks.try_acquire(id) else {
        return Ok(Claim::Busy);
    };
    let row = ctx
        .store_call("store.get_trigger", ctx.store.get_trigger(id))
        .await?;
    if row.as_ref().is_some_and(Trigger::is_provisioned) {
        return Ok(Claim::Owned);
    }
    Ok(Claim::Orphan(guard))
}

/// Runs one sweep.
///
/// # Errors
///
/// Returns an error if the triggers, rules or topics cannot be listed.
pub async fn sweep<S, B, R>(ctx: &SagaContext<S, B, R>) -> Result<RecoveryReport>
where
    S: TriggerStore,
    B: Broker,
    R: RuleEngine,
{
    let mut report = RecoveryReport::default();

    let triggers = ctx
        .store_call("store.list_all_triggers", ctx.store.list_all_triggers())
        .await?;
    let committed: HashSet<TriggerId> = triggers
        .iter()
        .filter(|t| t.is_provisioned())
        .map(|t| t.id)
        .collect();

    for draft in triggers.iter().filter(|t| !t.is_provisioned()) {
        match claim(ctx, draft.id).await {
            Ok(Claim::Orphan(guard)) => match purge_draft(ctx, guard.id()).await {
                Ok(()) => report.drafts_purged += 1,
                Err(error) => {
                    warn!(trigger_id = %guard.id(), error = %error, "draft purge failed");
                    report.failures += 1;
                }
            },
            Ok(Claim::Busy) => report.skipped_in_flight += 1,
            Ok(Claim::Owned) => {}
            Err(error) => {
                warn!(trigger_id = %draft.id, error = %error, "draft lookup failed");
                report.failures += 1;
            }
        }
    }

    let rules = ctx
        .rules_call("rules.list_rules", ctx.rules.list_rules())
        .await?;
    for rule in rules {
        let Some(id) = ctx.config.naming.trigger_for_rule(&rule.name) else {
            continue;
        };
        if committed.contains(&id) {
            continue;
        }
        match claim(ctx, id).await {
            Ok(Claim::Orphan(guard)) => {
                let removed = ctx
                    .rules_call("rules.remove_rule", async {
                        tolerate_absent(ctx.rules.remove_rule(&rule.handle).await)
                    })
                    .await;
                match removed {
                    Ok(()) => {
                        debug!(trigger_id = %guard.id(), rule = %rule.handle, "orphan rule removed");
                        report.rules_removed += 1;
                    }
                    Err(error) => {
                        warn!(rule = %rule.handle, error = %error, "orphan rule removal failed");
                        report.failures += 1;
                    }
                }
            }
            Ok(Claim::Busy) => report.skipped_in_flight += 1,
            Ok(Claim::Owned) => {}
            Err(error) => {
                warn!(rule = %rule.handle, error = %error, "orphan rule lookup failed");
                report.failures += 1;
            }
        }
    }

    let topics = ctx
        .broker_call("broker.list_topics", ctx.broker.list_topics())
        .await?;
    for topic in topics {
        let Some(id) = ctx.config.naming.trigger_for_topic(&topic.name) else {
            continue;
        };
        if committed.contains(&id) {
            continue;
        }
        match claim(ctx, id).await {
            Ok(Claim::Orphan(guard)) => {
                let deleted = ctx
                    .broker_call("broker.delete_topic", async {
                        tolerate_absent(ctx.broker.delete_topic(&topic.handle).await)
                    })
                    .await;
                match deleted {
                    Ok(()) => {
                        debug!(trigger_id = %guard.id(), topic = %topic.handle, "orphan topic removed");
                        report.topics_removed += 1;
                    }
                    Err(error) => {
                        warn!(topic = %topic.handle, error = %error, "orphan topic removal failed");
                        report.failures += 1;
                    }
                }
            }
            Ok(Claim::Busy) => report.skipped_in_flight += 1,
            Ok(Claim::Owned) => {}
            Err(error) => {
                warn!(topic = %topic.handle, error = %error, "orphan topic lookup failed");
                report.failures += 1;
            }
        }
    }

    info!(
        drafts_purged = report.drafts_purged,
        rules_removed = report.rules_removed,
        topics_removed = report.topics_removed,
        skipped_in_flight = report.skipped_in_flight,
        failures = report.failures,
        "recovery sweep finished"
    );
    Ok(report)
}

/// Removes a draft's subscriptions, target rows and the draft row itself.
async fn purge_draft<S, B, R>(ctx: &SagaContext<S, B, R>, id: TriggerId) -> Result<()>
where
    S: TriggerStore,
    B: Broker,
    R: RuleEngine,
{
    let targets = ctx
        .store_call("store.list_targets", ctx.store.list_targets(id))
        .await?;
    for target in &targets {
        ctx.subscriptions.unsubscribe(&target.subscription).await?;
        ctx.store_call("store.delete_target", async {
            tolerate_absent(ctx.store.delete_target(target.id).await)
        })
        .await?;
    }
    ctx.store_call("store.delete_trigger", async {
        tolerate_absent(ctx.store.delete_trigger(id).await)
    })
    .await?;

    debug!(trigger_id = %id, targets = targets.len(), "draft purged");
    Ok(())
}
