//! Diff planning
//!
//! Set-differences the current file's groups against the stored links of
//! the period. Content-hash equality is the sole criterion for
//! "unchanged"; output order is stable regardless of map iteration
//! order, and callers only rely on it for batching.

use std::collections::BTreeMap;

use crate::ingest::InvoiceGroup;
use crate::store::Link;

use super::types::SyncPlan;

/// Compute the create/update/remove plan for one period.
///
/// Links must be read before planning starts; no interleaved mutation is
/// expected. Zero links (first sync of a period) is the trivial case
/// where every group lands in `to_create`.
pub fn build_sync_plan(groups: Vec<InvoiceGroup>, links: Vec<Link>) -> SyncPlan {
    let mut link_map: BTreeMap<String, Link> = links
        .into_iter()
        .map(|l| (l.external_key.clone(), l))
        .collect();

    let mut plan = SyncPlan::default();

    // Groups keep file order, which is deterministic for identical input.
    for group in groups {
        match link_map.remove(&group.external_key) {
            None => plan.to_create.push(group),
            Some(link) if link.content_hash == group.content_hash => {
                plan.unchanged.push(group.external_key);
            }
            Some(link) => plan.to_update.push((group, link)),
        }
    }

    // Whatever is left in the map has no group in the current file.
    // BTreeMap order keeps removals sorted by external key.
    plan.to_remove = link_map.into_values().collect();
    plan
}
