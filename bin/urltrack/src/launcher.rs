//! Traffic emulation: writer tasks plus one sweeper per customer per tier.

use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use urltrack_common::Tier;
use urltrack_core::{SweepReport, SweeperTask};

use crate::services::Services;
use crate::workload::{self, WriterSummary};

/// Spawn one sweeper task for every customer partition of both tiers
pub fn spawn_sweepers(services: &Services, sweepers: &mut JoinSet<SweepReport>) {
    let sweep = &services.config.sweep;
    let mut number = 0u32;
    for customer in 0..services.config.workload.customers {
        for tier in [Tier::Base, Tier::Cache] {
            let task = SweeperTask::new(
                services.sweeper.clone(),
                services.clock.clone(),
                services.partition(tier, customer),
                sweep.interval(tier),
                sweep.run_duration(),
            )
            .with_stagger(sweep.stagger(number));
            sweepers.spawn(task.run());
            number += 1;
        }
    }
    info!("Started {} sweeper tasks ({:?})", number, sweep.strategy);
}

/// Run the full emulation: optional profile load, writers, sweepers.
pub async fn emulate(services: Arc<Services>, load: bool) -> Result<()> {
    let workload = &services.config.workload;

    if load {
        let written = workload::load_profiles(&services)?;
        info!("Load phase complete: {} profile records", written);
    }

    let mut sweepers = JoinSet::new();
    spawn_sweepers(&services, &mut sweepers);

    let mut writers = JoinSet::new();
    for number in 0..workload.writers {
        writers.spawn(workload::run_writer(
            services.clone(),
            number,
            workload.run_duration(),
        ));
    }
    info!(
        "Started {} writers for {}s at {} tps each",
        workload.writers, workload.run_secs, workload.tps_per_writer
    );

    let mut totals = WriterSummary::default();
    let deadline = workload.shutdown_deadline();
    let drained = tokio::time::timeout(deadline, async {
        while let Some(joined) = writers.join_next().await {
            match joined {
                Ok(summary) => {
                    totals.ops += summary.ops;
                    totals.failures += summary.failures;
                    totals.retried += summary.retried;
                }
                Err(e) => error!("Writer task panicked: {}", e),
            }
        }
    })
    .await;
    if drained.is_err() {
        warn!(
            "Writers still running after {}s, aborting {} tasks",
            deadline.as_secs(),
            writers.len()
        );
        writers.abort_all();
    }
    info!(
        "Writers finished: {} ops, {} failed, {} retried after collision",
        totals.ops, totals.failures, totals.retried
    );

    let mut swept = SweepReport::default();
    while let Some(joined) = sweepers.join_next().await {
        match joined {
            Ok(report) => swept.merge(&report),
            Err(e) => error!("Sweeper task panicked: {}", e),
        }
    }
    info!(
        "Sweepers finished: {} cycles, {} entries removed, {} owner failures",
        swept.cycles, swept.removed, swept.failed
    );

    let stats = services.writer.coordinator().stats();
    info!(
        "Cache: {} hits, {} reloads, {} skipped, {} mismatches, {} reload failures",
        stats.hits, stats.reloads, stats.skipped, stats.mismatches, stats.reload_failures
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use urltrack_common::Config;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_short_emulation() {
        let mut config = Config::default();
        config.workload.customers = 2;
        config.workload.users = 5;
        config.workload.writers = 3;
        config.workload.tps_per_writer = 100;
        config.workload.run_secs = 1;
        config.workload.shutdown_grace_secs = 5;
        config.sweep.base_interval_secs = 1;
        config.sweep.cache_interval_secs = 1;
        config.sweep.run_duration_secs = 1;
        config.sweep.stagger_ms = 0;
        let services = Services::open(config).unwrap();

        emulate(services.clone(), true).await.unwrap();

        let stats = services.writer.coordinator().stats();
        assert!(stats.reloads + stats.skipped + stats.hits > 0);
        for customer in 0..2 {
            let base = services.partition(Tier::Base, customer);
            for owner in services.collections.list_owners(&base).unwrap() {
                let audit = services.auditor.audit(&owner, &base).unwrap();
                assert!(audit.matched);
            }
        }
    }

    #[tokio::test]
    async fn test_sweepers_cover_both_tiers() {
        let mut config = Config::default();
        config.workload.customers = 3;
        config.sweep.run_duration_secs = 0;
        config.sweep.stagger_ms = 0;
        config.sweep.base_interval_secs = 1;
        config.sweep.cache_interval_secs = 1;
        let services = Services::open(config).unwrap();

        let mut sweepers = JoinSet::new();
        spawn_sweepers(&services, &mut sweepers);
        assert_eq!(sweepers.len(), 6);
        while let Some(report) = sweepers.join_next().await {
            assert_eq!(report.unwrap().cycles, 0);
        }
    }
}
