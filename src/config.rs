//! Harness configuration
//!
//! All environment decisions are resolved once by the caller and passed in
//! here; nothing in the harness consults global state at import time.

use std::path::PathBuf;
use std::time::Duration;

use crate::poll::PollConfig;

/// Fixed location of the CI service-account key. Its presence is what makes
/// a CI context "recognized" for the init phase.
pub const SERVICE_ACCOUNT_KEY: &str = "/etc/service-account/service-account.json";

/// Configuration for one test run.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// DNS zone under which test domains are provisioned.
    pub zone: String,
    /// Cloud project owning the DNS zone.
    pub project: String,
    /// Directory holding the fixed set of deployment manifests.
    pub deploy_dir: PathBuf,
    /// Number of test domains (and certificate objects) to provision.
    pub domain_count: usize,
    /// Run the one-time environment bootstrap before anything else.
    pub run_init: bool,
    /// Scopes firewall-rule cleanup; `None` skips that step entirely.
    pub instance_name: Option<String>,
    /// Named gcloud configuration activated around DNS batches.
    pub dns_context: Option<String>,
    /// SSL certificate resources expected once the controller has reconciled
    /// every certificate object created during setup.
    pub expected_certificates: usize,
    /// SSL certificate resources expected after the certificate objects are
    /// removed again.
    pub residual_certificates: usize,
    /// Retry budgets per convergence check.
    pub budgets: PollBudgets,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            zone: "e2e".to_string(),
            project: "certsbridge-dev".to_string(),
            deploy_dir: PathBuf::from("deploy"),
            domain_count: 2,
            run_init: false,
            instance_name: None,
            dns_context: None,
            expected_certificates: 2,
            residual_certificates: 0,
            budgets: PollBudgets::default(),
        }
    }
}

/// Retry budgets for the four convergence checks a run performs.
#[derive(Debug, Clone, Copy)]
pub struct PollBudgets {
    /// Resource lists converge quickly once the platform acks the API call.
    pub resource_list: PollConfig,
    /// Certificate issuance legitimately takes minutes.
    pub certificate_status: PollConfig,
    /// DNS propagation ahead of the first successful request.
    pub http: PollConfig,
    /// Deleting controller-created resources during teardown.
    pub cleanup: PollConfig,
}

impl Default for PollBudgets {
    fn default() -> Self {
        Self {
            resource_list: PollConfig::exponential(Duration::from_secs(1), 10),
            certificate_status: PollConfig::fixed(Duration::from_secs(30), 30),
            http: PollConfig::fixed(Duration::from_secs(30), 30),
            cleanup: PollConfig::exponential(Duration::from_secs(1), 10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::DelayPolicy;

    #[test]
    fn test_default_targets_follow_domain_count() {
        let config = HarnessConfig::default();
        assert_eq!(config.domain_count, config.expected_certificates);
        assert_eq!(config.residual_certificates, 0);
    }

    #[test]
    fn test_slow_checks_use_fixed_delay() {
        let budgets = PollBudgets::default();
        assert!(matches!(
            budgets.certificate_status.policy,
            DelayPolicy::Fixed(_)
        ));
        assert!(matches!(budgets.http.policy, DelayPolicy::Fixed(_)));
        assert!(matches!(
            budgets.resource_list.policy,
            DelayPolicy::Exponential { .. }
        ));
    }
}
