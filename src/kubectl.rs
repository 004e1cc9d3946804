//! Cluster resource lifecycle via kubectl
//!
//! Manifests are applied and removed by name from a fixed deploy directory.
//! Deletes use `--ignore-not-found` so teardown can run against a
//! partially-provisioned or already-clean cluster; creates are checked and
//! a failure propagates instead of being dropped on the floor.

use std::path::{Path, PathBuf};

use crate::command;
use crate::Result;

/// Annotation linking an ingress to its managed certificates.
pub const MANAGED_CERTIFICATES_ANNOTATION: &str = "networking.gke.io/managed-certificates";

/// Plural resource name of the managed-certificate CRD.
const MANAGED_CERTIFICATE_RESOURCE: &str = "managedcertificates";

/// kubectl operations scoped to one manifest directory.
#[derive(Debug, Clone)]
pub struct Kubectl {
    deploy_dir: PathBuf,
}

impl Kubectl {
    pub fn new(deploy_dir: impl Into<PathBuf>) -> Self {
        Self {
            deploy_dir: deploy_dir.into(),
        }
    }

    /// Apply one named manifest from the deploy directory.
    pub async fn create(&self, file_name: &str) -> Result<()> {
        let path = self.deploy_dir.join(file_name);
        self.create_path(&path).await
    }

    /// Apply a manifest by path (used for generated certificate manifests).
    pub async fn create_path(&self, path: &Path) -> Result<()> {
        let cmd = format!("kubectl create -f {}", path.display());
        command::run_checked(&cmd).await?;
        Ok(())
    }

    /// Delete one named manifest; deleting an absent resource is success.
    pub async fn delete(&self, file_name: &str) -> Result<()> {
        let path = self.deploy_dir.join(file_name);
        let cmd = format!(
            "kubectl delete -f {} --ignore-not-found=true",
            path.display()
        );
        command::run_checked(&cmd).await?;
        Ok(())
    }

    /// Apply manifests in the given order.
    pub async fn create_all(&self, file_names: &[&str]) -> Result<()> {
        for file_name in file_names {
            self.create(file_name).await?;
        }
        Ok(())
    }

    /// Delete manifests in the given order; absent resources are tolerated.
    pub async fn delete_all(&self, file_names: &[&str]) -> Result<()> {
        for file_name in file_names {
            self.delete(file_name).await?;
        }
        Ok(())
    }

    /// Names of every managed-certificate custom object on the cluster.
    ///
    /// A kubectl failure (the CRD may already be gone during teardown) reads
    /// as "nothing listed" rather than an error.
    pub async fn managed_certificate_names(&self) -> Result<Vec<String>> {
        let cmd = format!("kubectl get {} -o name", MANAGED_CERTIFICATE_RESOURCE);
        let out = command::run(&cmd).await?;
        if !out.success {
            return Ok(Vec::new());
        }
        Ok(out.lines)
    }

    /// List-then-delete-each over managed-certificate custom objects.
    pub async fn delete_managed_certificates(&self) -> Result<usize> {
        let names = self.managed_certificate_names().await?;
        for name in &names {
            let cmd = format!("kubectl delete {} --ignore-not-found=true", name);
            command::run_checked(&cmd).await?;
        }
        Ok(names.len())
    }

    /// Drop an annotation from an ingress. The trailing dash is kubectl's
    /// removal syntax.
    pub async fn remove_ingress_annotation(&self, ingress: &str, key: &str) -> Result<()> {
        let cmd = format!("kubectl annotate ingress {} {}-", ingress, key);
        command::run_checked(&cmd).await?;
        Ok(())
    }
}

/// Render the manifest for one managed-certificate custom object.
pub fn certificate_manifest(name: &str, domain: &str) -> String {
    format!(
        r#"apiVersion: networking.gke.io/v1
kind: ManagedCertificate
metadata:
  name: {name}
spec:
  domains:
    - {domain}
"#
    )
}

/// Write a generated certificate manifest into the system temp directory and
/// return its path.
pub async fn write_certificate_manifest(name: &str, domain: &str) -> Result<PathBuf> {
    let path = std::env::temp_dir().join(format!("{name}.yaml"));
    tokio::fs::write(&path, certificate_manifest(name, domain)).await?;
    Ok(path)
}
