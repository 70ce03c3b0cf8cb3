//! Synthetic profile loading and paced visit writers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use urltrack_common::config::WorkloadConfig;
use urltrack_common::{CustomerProfile, OwnerKey, ProfileRecord, Tier, UserProfile, VisitTemplate};

use crate::services::Services;

/// Write every customer profile and its users' profiles into the base
/// partitions. Returns the number of records written.
pub fn load_profiles(services: &Services) -> Result<u64> {
    let workload = &services.config.workload;
    let mut written = 0;
    for customer in 0..workload.customers {
        let profile = CustomerProfile::generated(customer);
        let partition = services.partition(Tier::Base, customer);
        let owner = OwnerKey::new(profile.customer_id.as_str());
        services
            .records
            .put_record(&partition, &owner, &ProfileRecord::Customer(profile.clone()), None)?;
        written += 1;

        for user in 0..workload.users {
            let user_profile = UserProfile::generated(profile.customer_id.as_str(), user);
            let owner = user_profile.user_id.clone();
            services
                .records
                .put_record(&partition, &owner, &ProfileRecord::User(user_profile), None)?;
            written += 1;
        }
        debug!("Loaded customer {} with {} users", customer, workload.users);
    }
    Ok(written)
}

/// Pick a user seed. The first `hot_users` seeds are `hot_multiplier`
/// times likelier than the rest.
pub fn pick_user(rng: &mut impl Rng, workload: &WorkloadConfig) -> u64 {
    let users = workload.users.max(1);
    let hot = workload.hot_users.min(users);
    let extra = hot * workload.hot_multiplier.saturating_sub(1);
    let draw = rng.gen_range(0..users + extra);
    if draw < users {
        draw
    } else {
        (draw - users) % hot
    }
}

/// Totals from one writer task
#[derive(Clone, Copy, Debug, Default)]
pub struct WriterSummary {
    pub ops: u64,
    pub failures: u64,
    pub retried: u64,
}

/// Record visits at the configured rate until `run_for` has elapsed
pub async fn run_writer(services: Arc<Services>, writer_number: u32, run_for: Duration) -> WriterSummary {
    let workload = &services.config.workload;
    let entry_ttl = services.config.write.entry_ttl();
    let mut rng = StdRng::from_entropy();
    let mut summary = WriterSummary::default();

    let period = Duration::from_secs(1) / workload.tps_per_writer.max(1);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let deadline = Instant::now() + run_for;

    info!("Writer {} started ({} tps)", writer_number, workload.tps_per_writer);
    while Instant::now() < deadline {
        ticker.tick().await;

        let customer = rng.gen_range(0..workload.customers.max(1));
        let user = pick_user(&mut rng, workload);
        let owner = UserProfile::id_for(user);
        let template = VisitTemplate::generated(owner, summary.ops, entry_ttl);
        let base = services.partition(Tier::Base, customer);
        let cache = services.partition(Tier::Cache, customer);
        let op_num = summary.ops + u64::from(writer_number);

        match services.writer.record(&template, &base, &cache, op_num).await {
            Ok(report) => {
                if report.attempts > 1 {
                    summary.retried += 1;
                }
            }
            Err(e) => {
                warn!("Writer {} op {} for {} failed: {}", writer_number, summary.ops, template.owner, e);
                summary.failures += 1;
            }
        }
        summary.ops += 1;

        if workload.log_every > 0 && summary.ops % workload.log_every == 0 {
            info!(
                "Writer {}: {} ops ({} failed, {} retried), last {} in {}",
                writer_number, summary.ops, summary.failures, summary.retried, template.owner, base
            );
        }
    }
    info!(
        "Writer {} finished: {} ops, {} failed",
        writer_number, summary.ops, summary.failures
    );
    summary
}
