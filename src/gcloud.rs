//! Cloud resource lifecycle via gcloud
//!
//! SSL certificate resources are created by the controller under test, not
//! by the harness, so cleanup is always list-then-delete-each: query the
//! live platform for matching resources and remove whatever is actually
//! there. Firewall rules follow the same pattern, scoped by instance name.

use tracing::debug;

use crate::command;
use crate::Result;

/// Handle for compute-side gcloud operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gcloud;

impl Gcloud {
    /// URIs of every SSL certificate resource currently in the project.
    pub async fn ssl_certificate_uris(&self) -> Result<Vec<String>> {
        let cmd = "gcloud compute ssl-certificates list --uri";
        Ok(command::run_checked(cmd).await?.lines)
    }

    /// Delete every listed SSL certificate. Safe when the list is empty.
    ///
    /// Individual deletes racing a concurrent removal are tolerated; the
    /// follow-up list in the caller's poll loop is the arbiter.
    pub async fn delete_ssl_certificates(&self) -> Result<usize> {
        let uris = self.ssl_certificate_uris().await?;
        for uri in &uris {
            let cmd = format!("gcloud compute ssl-certificates delete {uri} --quiet");
            let out = command::run(&cmd).await?;
            if !out.success {
                debug!(uri, "ssl certificate delete reported failure");
            }
        }
        Ok(uris.len())
    }

    /// URIs of firewall rules whose names match the given instance scope.
    pub async fn firewall_rule_uris(&self, instance_name: &str) -> Result<Vec<String>> {
        let cmd = format!(
            "gcloud compute firewall-rules list --filter=\"name~{instance_name}\" --uri"
        );
        Ok(command::run_checked(&cmd).await?.lines)
    }

    /// List-then-delete-each over instance-scoped firewall rules.
    pub async fn delete_firewall_rules(&self, instance_name: &str) -> Result<usize> {
        let uris = self.firewall_rule_uris(instance_name).await?;
        for uri in &uris {
            let cmd = format!("gcloud compute firewall-rules delete {uri} --quiet");
            command::run_checked(&cmd).await?;
        }
        Ok(uris.len())
    }
}
