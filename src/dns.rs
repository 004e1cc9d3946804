//! Ephemeral DNS records in the test zone
//!
//! Test domains are random so repeated runs never contend for certificate
//! issuance on a fixed name. Records are added in one atomic record-set
//! transaction and removed by a zone-wide suffix sweep rather than by
//! remembered names: the harness holds no durable state, so cleanup always
//! re-derives what exists from the live zone.

use rand::Rng;
use tracing::{info, warn};

use crate::command;
use crate::{Error, Result};

/// Length of the random host token.
const RECORD_LENGTH: usize = 20;

/// Every test record lives under this top-level suffix.
const DOMAIN_SUFFIX: &str = "certsbridge.com";

/// TTL for test records; they live for one run.
const RECORD_TTL: u32 = 300;

/// Name of the reserved global address every test domain points at.
const TEST_IP_ADDRESS_NAME: &str = "test-ip-address";

/// The gcloud configuration restored after a scoped DNS context.
const DEFAULT_CONTEXT: &str = "default";

/// One A-record as listed from the zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordSet {
    pub name: String,
    pub ttl: u32,
    pub rrdata: String,
}

/// Provisioner for ephemeral test domains in one DNS zone.
#[derive(Debug, Clone)]
pub struct DnsProvisioner {
    zone: String,
    project: String,
    context: Option<String>,
}

impl DnsProvisioner {
    pub fn new(zone: impl Into<String>, project: impl Into<String>, context: Option<String>) -> Self {
        Self {
            zone: zone.into(),
            project: project.into(),
            context,
        }
    }

    /// Suffix shared by every record this provisioner owns.
    pub fn zone_suffix(&self) -> String {
        format!("{}.{}", self.zone, DOMAIN_SUFFIX)
    }

    /// Allocate `count` random domains bound to the fixed test IP in one
    /// atomic record-set transaction.
    pub async fn create_random_domains(&self, count: usize) -> Result<Vec<String>> {
        let ip = self.resolve_test_ip().await?;
        info!(%ip, count, "creating random test domains");

        let domains: Vec<String> = (0..count)
            .map(|_| domain_name(&random_token(), &self.zone))
            .collect();

        self.enter_context().await?;
        let batch = self.add_records(&domains, &ip).await;
        let restore = self.restore_context().await;
        batch?;
        restore?;

        Ok(domains)
    }

    /// Remove every A-record under the zone suffix. Zero matches is a no-op,
    /// not an error.
    pub async fn clean_up(&self) -> Result<usize> {
        self.enter_context().await?;
        let sweep = self.remove_test_records().await;
        let restore = self.restore_context().await;
        let removed = sweep?;
        restore?;

        Ok(removed)
    }

    /// Address of the fixed global test IP.
    async fn resolve_test_ip(&self) -> Result<String> {
        let cmd = format!(
            "gcloud compute addresses describe {TEST_IP_ADDRESS_NAME} --global --format=\"value(address)\""
        );
        let out = command::run_checked(&cmd).await?;
        out.first_line()
            .map(str::to_string)
            .ok_or_else(|| Error::dns("test address query returned no output"))
    }

    async fn add_records(&self, domains: &[String], ip: &str) -> Result<()> {
        command::run_checked(&self.transaction_cmd("start")).await?;

        let staged = self.stage_and_execute_adds(domains, ip).await;
        if staged.is_err() {
            // Drop whatever was staged so a later run starts from a clean
            // transaction; the run itself still fails.
            self.abort_transaction().await;
        }
        staged
    }

    async fn stage_and_execute_adds(&self, domains: &[String], ip: &str) -> Result<()> {
        for domain in domains {
            let cmd = format!(
                "gcloud dns record-sets transaction add --zone {} --project {} --name='{}' --type=A --ttl={} {}",
                self.zone, self.project, domain, RECORD_TTL, ip
            );
            command::run_labeled(&cmd, &format!("Add DNS record for domain {domain} to ip {ip}"))
                .await?
                .require_success(&cmd)?;
        }
        command::run_checked(&self.transaction_cmd("execute")).await?;
        Ok(())
    }

    async fn remove_test_records(&self) -> Result<usize> {
        let records = self.list_test_records().await?;
        if records.is_empty() {
            info!(zone = %self.zone, "no test records to remove");
            return Ok(0);
        }

        command::run_checked(&self.transaction_cmd("start")).await?;
        let staged = self.stage_and_execute_removes(&records).await;
        if staged.is_err() {
            self.abort_transaction().await;
        }
        staged?;

        Ok(records.len())
    }

    async fn stage_and_execute_removes(&self, records: &[RecordSet]) -> Result<()> {
        for record in records {
            let cmd = format!(
                "gcloud dns record-sets transaction remove --zone {} --project {} --name='{}' --type=A --ttl={} {}",
                self.zone, self.project, record.name, record.ttl, record.rrdata
            );
            command::run_labeled(&cmd, &format!("Remove DNS record {}", record.name))
                .await?
                .require_success(&cmd)?;
        }
        command::run_checked(&self.transaction_cmd("execute")).await?;
        Ok(())
    }

    /// A-records in the zone matching the test suffix.
    async fn list_test_records(&self) -> Result<Vec<RecordSet>> {
        let cmd = format!(
            "gcloud dns record-sets list --zone {} --project {} --filter=type=A --format=\"value(name,ttl,rrdatas)\"",
            self.zone, self.project
        );
        let out = command::run_checked(&cmd).await?;
        let suffix = self.zone_suffix();

        Ok(out
            .lines
            .iter()
            .filter_map(|line| parse_record_line(line))
            .filter(|record| record.name.contains(&suffix))
            .collect())
    }

    fn transaction_cmd(&self, verb: &str) -> String {
        format!(
            "gcloud dns record-sets transaction {verb} --zone {} --project {}",
            self.zone, self.project
        )
    }

    /// Best-effort transaction abort after a failed batch.
    async fn abort_transaction(&self) {
        if let Err(e) = command::run(&self.transaction_cmd("abort")).await {
            warn!(error = %e, "failed to abort dns transaction");
        }
    }

    async fn enter_context(&self) -> Result<()> {
        if let Some(context) = &self.context {
            command::run_checked(&format!("gcloud config configurations activate {context}"))
                .await?;
        }
        Ok(())
    }

    /// Restore the default configuration; runs whether or not the batch
    /// inside the context succeeded.
    async fn restore_context(&self) -> Result<()> {
        if self.context.is_some() {
            command::run_checked(&format!(
                "gcloud config configurations activate {DEFAULT_CONTEXT}"
            ))
            .await?;
        }
        Ok(())
    }
}

/// Random lowercase host token of the fixed record length.
fn random_token() -> String {
    let mut rng = rand::thread_rng();
    (0..RECORD_LENGTH)
        .map(|_| rng.gen_range(b'a'..=b'z') as char)
        .collect()
}

/// Fully-qualified test domain for a host token.
fn domain_name(token: &str, zone: &str) -> String {
    format!("{token}.{zone}.{DOMAIN_SUFFIX}")
}

/// Parse one `value(name,ttl,rrdatas)` output line.
fn parse_record_line(line: &str) -> Option<RecordSet> {
    let mut fields = line.split_whitespace();
    let name = fields.next()?.to_string();
    let ttl = fields.next()?.parse().ok()?;
    let rrdata = fields.next()?.to_string();
    Some(RecordSet { name, ttl, rrdata })
}
