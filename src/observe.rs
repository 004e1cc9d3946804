//! Typed convergence observers
//!
//! One function per observation kind, each returning a parsed structured
//! value. The external query syntax (jsonpath expressions, URI listings,
//! curl format strings) stays behind this interface so it can change without
//! touching orchestration logic.

use crate::command;
use crate::gcloud::Gcloud;
use crate::Result;

/// jsonpath emitting one certificateStatus per object, one per line.
const STATUS_QUERY: &str =
    r#"kubectl get managedcertificates -o jsonpath='{range .items[*]}{.status.certificateStatus}{"\n"}{end}'"#;

/// Timeout for each reachability probe.
const HTTP_PROBE_TIMEOUT_SECS: u32 = 30;

/// Observers over the externally-managed resources a run converges on.
#[derive(Debug, Clone, Copy, Default)]
pub struct Observers {
    gcloud: Gcloud,
}

impl Observers {
    /// Number of SSL certificate resources currently in the project.
    ///
    /// A failed listing propagates: unlike an unmet condition, it must not
    /// read as "zero certificates".
    pub async fn certificate_count(&self) -> Result<usize> {
        Ok(self.gcloud.ssl_certificate_uris().await?.len())
    }

    /// Ordered certificateStatus strings, one per managed-certificate object.
    ///
    /// Objects without a status yet contribute an empty line, which the
    /// executor drops, so the sequence only matches its target once every
    /// certificate reports. An absent CRD reads as "no statuses yet".
    pub async fn certificate_statuses(&self) -> Result<Vec<String>> {
        let out = command::run(STATUS_QUERY).await?;
        if !out.success {
            return Ok(Vec::new());
        }
        Ok(out.lines)
    }

    /// HTTPS status per domain, in input order. A connection failure records
    /// as `None` instead of aborting the batch.
    pub async fn http_statuses(&self, domains: &[String]) -> Result<Vec<Option<u16>>> {
        let mut codes = Vec::with_capacity(domains.len());
        for domain in domains {
            codes.push(self.http_status(domain).await?);
        }
        Ok(codes)
    }

    async fn http_status(&self, domain: &str) -> Result<Option<u16>> {
        let cmd = format!(
            "curl -s -o /dev/null -w '%{{http_code}}' --max-time {HTTP_PROBE_TIMEOUT_SECS} https://{domain}"
        );
        let out = command::run(&cmd).await?;
        if !out.success {
            return Ok(None);
        }
        Ok(parse_http_code(out.first_line().unwrap_or_default()))
    }
}

/// curl reports 000 when no response was received at all.
fn parse_http_code(raw: &str) -> Option<u16> {
    match raw.trim().parse::<u16>() {
        Ok(0) => None,
        Ok(code) => Some(code),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_http_code_accepts_real_statuses() {
        assert_eq!(parse_http_code("200"), Some(200));
        assert_eq!(parse_http_code("404"), Some(404));
        assert_eq!(parse_http_code(" 301 "), Some(301));
    }

    #[test]
    fn test_parse_http_code_maps_no_response_to_none() {
        assert_eq!(parse_http_code("000"), None);
        assert_eq!(parse_http_code("0"), None);
    }

    #[test]
    fn test_parse_http_code_rejects_garbage() {
        assert_eq!(parse_http_code(""), None);
        assert_eq!(parse_http_code("curl: (6) could not resolve host"), None);
    }
}
