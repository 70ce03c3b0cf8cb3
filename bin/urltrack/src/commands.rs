//! JSON command file processing.
//!
//! A command file looks like:
//!
//! ```json
//! { "command_file": "smoke",
//!   "commands": [
//!     { "command": "new_customer",
//!       "customer": { "customer_id": "Acme", "contact": "Jo", "set_name": "CustID(1)" } },
//!     { "command": "new_site_visit", "set_name": "CustID(1)", "user_name": "UserName(1)",
//!       "visit_info": { "url": "u", "referrer": "r", "page_title": "t", "date": 10, "expire": 20 } }
//!   ] }
//! ```
//!
//! Each command is applied to the base partition named by its `set_name`.
//! A failing command is logged and processing moves on to the next one.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};
use urltrack_common::{
    CustomerProfile, OwnerKey, ProfileRecord, Timestamp, UserProfile, VisitEntry,
};

use crate::services::Services;

#[derive(Debug, Deserialize)]
pub struct CommandFile {
    #[serde(default)]
    pub command_file: Option<String>,
    pub commands: Vec<Command>,
}

#[derive(Debug, Deserialize)]
pub struct CustomerInfo {
    pub customer_id: String,
    #[serde(default)]
    pub contact: String,
    pub set_name: String,
}

#[derive(Debug, Deserialize)]
pub struct UserInfo {
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub company: String,
}

#[derive(Debug, Deserialize)]
pub struct VisitInfo {
    pub url: String,
    #[serde(default)]
    pub referrer: String,
    #[serde(default)]
    pub page_title: String,
    /// Creation time in nanoseconds; defaults to now
    #[serde(default)]
    pub date: Option<u64>,
    /// Expiry in nanoseconds; defaults to `date` plus the entry TTL
    #[serde(default)]
    pub expire: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    NewCustomer {
        customer: CustomerInfo,
    },
    NewUser {
        set_name: String,
        user: UserInfo,
    },
    NewSiteVisit {
        set_name: String,
        user_name: String,
        visit_info: VisitInfo,
    },
    QueryUser {
        set_name: String,
        user_name: String,
    },
    QuerySet {
        set_name: String,
    },
    RemoveExpired {
        set_name: String,
        user_name: String,
        expire: u64,
    },
    RemoveRecord {
        set_name: String,
        user_name: String,
    },
    RemoveAllRecords {
        set_name: String,
    },
}

/// Counts from one command file
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommandSummary {
    pub processed: usize,
    pub failed: usize,
}

pub fn parse(contents: &str) -> Result<CommandFile> {
    serde_json::from_str(contents).context("invalid command file")
}

pub fn process_file(services: &Services, path: &Path) -> Result<CommandSummary> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read command file {}", path.display()))?;
    let file = parse(&contents)?;
    if let Some(name) = &file.command_file {
        info!("Command file name: {}", name);
    }
    Ok(process(services, &file.commands))
}

pub fn process(services: &Services, commands: &[Command]) -> CommandSummary {
    let mut summary = CommandSummary::default();
    for (i, command) in commands.iter().enumerate() {
        debug!("Process command {}: {:?}", i, command);
        summary.processed += 1;
        if let Err(e) = apply(services, command) {
            warn!("Command {} failed: {:#}", i, e);
            summary.failed += 1;
        }
    }
    summary
}

fn apply(services: &Services, command: &Command) -> Result<()> {
    match command {
        Command::NewCustomer { customer } => {
            let partition = services.base_named(&customer.set_name);
            let profile = CustomerProfile {
                customer_id: customer.customer_id.clone(),
                name: customer.customer_id.clone(),
                contact: customer.contact.clone(),
                index: 0,
            };
            services.records.put_record(
                &partition,
                &OwnerKey::new(customer.set_name.as_str()),
                &ProfileRecord::Customer(profile),
                None,
            )?;
        }
        Command::NewUser { set_name, user } => {
            let partition = services.base_named(set_name);
            let profile = UserProfile {
                user_id: OwnerKey::new(user.name.as_str()),
                customer_id: set_name.clone(),
                email: user.email.clone(),
                phone: user.phone.clone(),
                address: user.address.clone(),
                company: user.company.clone(),
                index: 0,
            };
            services.records.put_record(
                &partition,
                &profile.user_id,
                &ProfileRecord::User(profile.clone()),
                None,
            )?;
        }
        Command::NewSiteVisit {
            set_name,
            user_name,
            visit_info,
        } => {
            let partition = services.base_named(set_name);
            let owner = OwnerKey::new(user_name.as_str());
            let created_at = visit_info
                .date
                .map_or_else(|| services.clock.now(), Timestamp::from_nanos);
            let expire_at = visit_info.expire.map_or_else(
                || created_at.saturating_add(services.config.write.entry_ttl()),
                Timestamp::from_nanos,
            );
            let entry = VisitEntry {
                owner: owner.clone(),
                url: visit_info.url.clone(),
                referrer: visit_info.referrer.clone(),
                page_title: visit_info.page_title.clone(),
                created_at,
                expire_at,
                ordinal: 0,
            };
            services.collections.insert_unique(&partition, &owner, &entry)?;
        }
        Command::QueryUser {
            set_name,
            user_name,
        } => {
            let partition = services.base_named(set_name);
            services.log_collection(&partition, &OwnerKey::new(user_name.as_str()))?;
        }
        Command::QuerySet { set_name } => {
            let partition = services.base_named(set_name);
            for owner in services.records.record_owners(&partition)? {
                info!("{} record: {:?}", partition, services.records.get_record(&partition, &owner)?);
            }
            for owner in services.collections.list_owners(&partition)? {
                services.log_collection(&partition, &owner)?;
            }
        }
        Command::RemoveExpired {
            set_name,
            user_name,
            expire,
        } => {
            let partition = services.base_named(set_name);
            let removed = services.collections.range_delete(
                &partition,
                &OwnerKey::new(user_name.as_str()),
                Timestamp::from_nanos(*expire),
            )?;
            info!("Removed {} expired entries for {} in {}", removed, user_name, partition);
        }
        Command::RemoveRecord {
            set_name,
            user_name,
        } => {
            let partition = services.base_named(set_name);
            let owner = OwnerKey::new(user_name.as_str());
            services.records.delete_record(&partition, &owner)?;
            services.collections.remove_collection(&partition, &owner)?;
        }
        Command::RemoveAllRecords { set_name } => {
            let partition = services.base_named(set_name);
            for owner in services.records.record_owners(&partition)? {
                services.records.delete_record(&partition, &owner)?;
            }
            let removed = services.collections.remove_partition(&partition)?;
            info!("Removed all records in {} ({} entries)", partition, removed);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use urltrack_common::Config;

    const SAMPLE: &str = r#"{
        "command_file": "sample",
        "commands": [
            { "command": "new_customer",
              "customer": { "customer_id": "Acme", "contact": "Jo", "set_name": "CustID(1)" } },
            { "command": "new_user", "set_name": "CustID(1)",
              "user": { "name": "UserName(1)", "email": "a@b", "phone": "Phone(00000001)",
                        "address": "Main St", "company": "Acme" } },
            { "command": "new_site_visit", "set_name": "CustID(1)", "user_name": "UserName(1)",
              "visit_info": { "url": "url(1)", "referrer": "r", "page_title": "t",
                              "date": 10, "expire": 100 } },
            { "command": "new_site_visit", "set_name": "CustID(1)", "user_name": "UserName(1)",
              "visit_info": { "url": "url(2)", "date": 20, "expire": 200 } },
            { "command": "new_site_visit", "set_name": "CustID(1)", "user_name": "UserName(1)",
              "visit_info": { "url": "dup", "date": 30, "expire": 200 } },
            { "command": "query_user", "set_name": "CustID(1)", "user_name": "UserName(1)" },
            { "command": "remove_expired", "set_name": "CustID(1)", "user_name": "UserName(1)",
              "expire": 200 },
            { "command": "query_set", "set_name": "CustID(1)" }
        ]
    }"#;

    #[test]
    fn test_parse_sample() {
        let file = parse(SAMPLE).unwrap();
        assert_eq!(file.command_file.as_deref(), Some("sample"));
        assert_eq!(file.commands.len(), 8);
        assert!(matches!(
            &file.commands[6],
            Command::RemoveExpired { expire: 200, .. }
        ));
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        assert!(parse(r#"{ "commands": [ { "command": "explode" } ] }"#).is_err());
    }

    #[test]
    fn test_process_sample() {
        let services = Services::open(Config::default()).unwrap();
        let file = parse(SAMPLE).unwrap();
        let summary = process(&services, &file.commands);
        // The third visit reuses an existing key
        assert_eq!(summary, CommandSummary { processed: 8, failed: 1 });

        let partition = services.base_named("CustID(1)");
        let owner = OwnerKey::new("UserName(1)");
        let remaining = services.collections.scan(&partition, &owner).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].url, "url(2)");
        assert!(matches!(
            services.records.get_record(&partition, &owner).unwrap(),
            Some(ProfileRecord::User(_))
        ));
    }

    #[test]
    fn test_remove_all_records() {
        let services = Services::open(Config::default()).unwrap();
        process(&services, &parse(SAMPLE).unwrap().commands);
        let summary = process(
            &services,
            &parse(r#"{ "commands": [ { "command": "remove_all_records", "set_name": "CustID(1)" } ] }"#)
                .unwrap()
                .commands,
        );
        assert_eq!(summary.failed, 0);
        let partition = services.base_named("CustID(1)");
        assert!(services.records.record_owners(&partition).unwrap().is_empty());
        assert!(services.collections.list_owners(&partition).unwrap().is_empty());
    }
}
