//! mcert-e2e — end-to-end harness for the managed-certificate controller
//!
//! Drives a deployed controller through deploy → exercise → verify →
//! teardown against a live cluster and cloud project, polling until the
//! externally-managed resources (certificate custom objects, DNS records,
//! SSL certificate resources) converge to their expected terminal states.
//! The external platform is the only system of record: every run re-derives
//! current state by querying it, and every delete is idempotent so runs
//! self-heal from whatever a previous run left behind.
//!
//! # Modules
//!
//! - [`command`] - shell command execution (the only process boundary)
//! - [`poll`] - bounded polling with fixed or exponential backoff
//! - [`kubectl`] - idempotent cluster manifest lifecycle
//! - [`gcloud`] - cloud resource cleanup (SSL certificates, firewall rules)
//! - [`dns`] - ephemeral test domains bound to the fixed test IP
//! - [`observe`] - typed convergence observers
//! - [`harness`] - phase orchestration
//! - [`config`] - run configuration, resolved once by the caller
//! - [`error`] - error types

pub mod command;
pub mod config;
pub mod dns;
pub mod error;
pub mod gcloud;
pub mod harness;
pub mod kubectl;
pub mod observe;
pub mod poll;

pub use error::{Error, Result};

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::config::{HarnessConfig, PollBudgets, SERVICE_ACCOUNT_KEY};
use crate::harness::Harness;

/// End-to-end test harness for the managed-certificate controller
#[derive(Parser, Debug)]
#[command(name = "mcert-e2e")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// DNS zone under which test domains are provisioned
    #[arg(long, default_value = "e2e")]
    pub zone: String,

    /// Cloud project owning the DNS zone
    #[arg(long, default_value = "certsbridge-dev")]
    pub project: String,

    /// Directory holding the deployment manifests
    #[arg(long, default_value = "deploy")]
    pub deploy_dir: PathBuf,

    /// Number of test domains (and certificate objects) to provision
    #[arg(long, default_value_t = 2)]
    pub domains: usize,

    /// Skip environment bootstrap even in a recognized CI context
    #[arg(long)]
    pub noinit: bool,

    /// Instance name scoping firewall-rule cleanup
    #[arg(long, env = "E2E_INSTANCE_NAME")]
    pub instance_name: Option<String>,

    /// Named gcloud configuration to activate around DNS operations
    #[arg(long)]
    pub dns_context: Option<String>,
}

impl Cli {
    /// Resolve configuration and drive the full test lifecycle.
    pub async fn run(self) -> Result<()> {
        let run_init = !self.noinit && Path::new(SERVICE_ACCOUNT_KEY).exists();

        let config = HarnessConfig {
            zone: self.zone,
            project: self.project,
            deploy_dir: self.deploy_dir,
            domain_count: self.domains,
            run_init,
            instance_name: self.instance_name,
            dns_context: self.dns_context,
            expected_certificates: self.domains,
            residual_certificates: 0,
            budgets: PollBudgets::default(),
        };

        Harness::new(config).run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["mcert-e2e"]);
        assert_eq!(cli.zone, "e2e");
        assert_eq!(cli.project, "certsbridge-dev");
        assert_eq!(cli.domains, 2);
        assert!(!cli.noinit);
        assert!(cli.dns_context.is_none());
    }

    #[test]
    fn test_cli_flags_override_defaults() {
        let cli = Cli::parse_from([
            "mcert-e2e",
            "--zone",
            "staging",
            "--noinit",
            "--dns-context",
            "dns-admin",
        ]);
        assert_eq!(cli.zone, "staging");
        assert!(cli.noinit);
        assert_eq!(cli.dns_context.as_deref(), Some("dns-admin"));
    }
}
