//! Phase orchestration
//!
//! One run is a linear sequence with no backward transitions:
//! Init → PreTeardown → Setup → Test → PostTeardown. Teardown runs on both
//! sides of the test phase so every run starts and ends clean no matter
//! where a previous run stopped; every delete it performs is idempotent.
//! An unmet convergence fails the run, but only after the post-teardown has
//! executed.

use tracing::{error, info};

use crate::command;
use crate::config::{HarnessConfig, SERVICE_ACCOUNT_KEY};
use crate::dns::DnsProvisioner;
use crate::gcloud::Gcloud;
use crate::kubectl::{self, Kubectl, MANAGED_CERTIFICATES_ANNOTATION};
use crate::observe::Observers;
use crate::poll::{poll, PollOutcome};
use crate::{Error, Result};

/// Controller-side manifests, applied in this order during setup.
const CONTROLLER_MANIFESTS: &[&str] = &[
    "rbac.yaml",
    "managedcertificates-crd.yaml",
    "managed-certificate-controller.yaml",
];

/// Workload manifests applied after the certificate objects exist.
const WORKLOAD_MANIFESTS: &[&str] = &["http-hello.yaml", "ingress.yaml"];

/// Name of the ingress carrying the managed-certificates annotation.
const INGRESS_NAME: &str = "test-ingress";

/// Pinned kubectl fetched during the init phase.
const KUBECTL_URL: &str =
    "https://storage.googleapis.com/kubernetes-release/release/v1.11.0/bin/linux/amd64/kubectl";

/// Orchestrator for one full test run.
pub struct Harness {
    config: HarnessConfig,
    kubectl: Kubectl,
    gcloud: Gcloud,
    dns: DnsProvisioner,
    observers: Observers,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Self {
        let kubectl = Kubectl::new(config.deploy_dir.clone());
        let dns = DnsProvisioner::new(
            config.zone.clone(),
            config.project.clone(),
            config.dns_context.clone(),
        );
        Self {
            config,
            kubectl,
            gcloud: Gcloud,
            dns,
            observers: Observers::default(),
        }
    }

    /// Drive the whole lifecycle.
    ///
    /// The post-teardown runs whether setup and test succeeded or not; the
    /// first failure from those phases takes precedence in the returned
    /// result so the run still exits non-zero.
    pub async fn run(&self) -> Result<()> {
        if self.config.run_init {
            self.init().await?;
        }

        self.teardown().await?;

        let outcome = self.setup_and_test().await;
        let cleanup = self.teardown().await;

        outcome?;
        cleanup
    }

    async fn setup_and_test(&self) -> Result<()> {
        let domains = self.setup().await?;
        self.test(&domains).await
    }

    /// One-time environment bootstrap; only runs in a recognized CI context.
    async fn init(&self) -> Result<()> {
        info!("Configure registry authentication");
        command::run_checked(&format!(
            "gcloud auth activate-service-account --key-file={SERVICE_ACCOUNT_KEY}"
        ))
        .await?;
        command::run_checked("gcloud auth configure-docker").await?;

        info!("Fetch pinned kubectl");
        command::run_checked(&format!("curl -LO {KUBECTL_URL}")).await?;
        command::run_checked("chmod +x kubectl").await?;
        let version = command::run_checked("./kubectl version").await?;
        info!(version = ?version.lines, "kubectl installed");

        info!("Set default namespace");
        command::run_checked(
            "kubectl config set-context $(kubectl config current-context) --namespace=default",
        )
        .await?;

        Ok(())
    }

    /// Remove every test-scoped resource, tolerating whatever subset of them
    /// actually exists. Identical before and after the test phase.
    async fn teardown(&self) -> Result<()> {
        info!("Delete ingress");
        self.kubectl.delete("ingress.yaml").await?;

        info!("Delete http-hello workload");
        self.kubectl.delete("http-hello.yaml").await?;

        // Custom objects go before the CRD so the list query can still
        // enumerate them.
        info!("Delete managed-certificate custom objects");
        let deleted = self.kubectl.delete_managed_certificates().await?;
        if deleted > 0 {
            info!(deleted, "removed leftover certificate objects");
        }

        info!("Delete managed-certificate-controller");
        self.kubectl.delete("managed-certificate-controller.yaml").await?;

        info!("Delete CRD");
        self.kubectl.delete("managedcertificates-crd.yaml").await?;

        info!("Remove RBAC");
        self.kubectl.delete("rbac.yaml").await?;

        info!("Remove test DNS records");
        self.dns.clean_up().await?;

        info!("Remove all SSL certificate resources");
        let gcloud = &self.gcloud;
        let observers = &self.observers;
        let outcome = poll(
            self.config.budgets.cleanup,
            "ssl certificate cleanup",
            || async move {
                gcloud.delete_ssl_certificates().await?;
                observers.certificate_count().await
            },
            |count| *count == 0,
        )
        .await?;
        require_converged(outcome, "ssl certificate cleanup")?;

        if let Some(instance) = &self.config.instance_name {
            info!(%instance, "Delete instance-scoped firewall rules");
            self.gcloud.delete_firewall_rules(instance).await?;
        }

        Ok(())
    }

    /// Deploy the controller and the test fixtures it will reconcile.
    async fn setup(&self) -> Result<Vec<String>> {
        info!("Deploy RBAC, CRD and managed-certificate-controller");
        self.kubectl.create_all(CONTROLLER_MANIFESTS).await?;

        info!("Provision test domains");
        let domains = self
            .dns
            .create_random_domains(self.config.domain_count)
            .await?;

        for (i, domain) in domains.iter().enumerate() {
            let name = format!("test{}-certificate", i + 1);
            info!(%domain, "Deploy {} custom object", name);
            let path = kubectl::write_certificate_manifest(&name, domain).await?;
            self.kubectl.create_path(&path).await?;
        }

        info!("Deploy http-hello workload and ingress");
        self.kubectl.create_all(WORKLOAD_MANIFESTS).await?;

        Ok(domains)
    }

    /// Verify convergence, then verify the controller tears its resources
    /// down again once the certificate objects are removed.
    async fn test(&self, domains: &[String]) -> Result<()> {
        let observers = &self.observers;

        let expected = self.config.expected_certificates;
        info!(expected, "Expect SSL certificate resources");
        let outcome = poll(
            self.config.budgets.resource_list,
            "ssl certificate count",
            || async move { observers.certificate_count().await },
            |count| *count == expected,
        )
        .await?;
        require_converged(outcome, "ssl certificate count")?;

        info!("Wait for certificates to become Active");
        let want_statuses = vec!["Active".to_string(); self.config.domain_count];
        let outcome = poll(
            self.config.budgets.certificate_status,
            "certificate status",
            || async move { observers.certificate_statuses().await },
            |statuses| statuses == &want_statuses,
        )
        .await?;
        require_converged(outcome, "certificate status")?;

        info!("Check HTTPS reachability for each domain");
        let want_codes = vec![Some(200u16); domains.len()];
        let outcome = poll(
            self.config.budgets.http,
            "https status",
            || async move { observers.http_statuses(domains).await },
            |codes| codes == &want_codes,
        )
        .await?;
        require_converged(outcome, "https status")?;

        info!("Remove managed-certificates annotation from ingress");
        self.kubectl
            .remove_ingress_annotation(INGRESS_NAME, MANAGED_CERTIFICATES_ANNOTATION)
            .await?;

        info!("Remove certificate custom objects");
        self.kubectl.delete_managed_certificates().await?;

        let residual = self.config.residual_certificates;
        info!(residual, "Expect the controller to tear down its SSL certificates");
        let outcome = poll(
            self.config.budgets.resource_list,
            "ssl certificate teardown by controller",
            || async move { observers.certificate_count().await },
            |count| *count == residual,
        )
        .await?;
        require_converged(outcome, "ssl certificate teardown by controller")?;

        Ok(())
    }
}

/// Convert an exhausted poll into a failing run, logging the last observed
/// state first.
fn require_converged<T: std::fmt::Debug>(outcome: PollOutcome<T>, check: &str) -> Result<()> {
    match outcome {
        PollOutcome::Satisfied(_) => Ok(()),
        PollOutcome::Exhausted(last) => {
            error!(check, last = ?last, "convergence check failed");
            Err(Error::convergence(check, format!("{last:?}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_converged_passes_satisfied() {
        assert!(require_converged(PollOutcome::Satisfied(2usize), "count").is_ok());
    }

    #[test]
    fn test_require_converged_reports_last_observation() {
        let err = require_converged(PollOutcome::Exhausted(Some(3usize)), "count")
            .expect_err("exhausted poll must fail the run");
        match err {
            Error::Convergence { check, observed } => {
                assert_eq!(check, "count");
                assert!(observed.contains('3'));
            }
            other => panic!("expected Convergence, got {other:?}"),
        }
    }
}
