//! Validation helpers for DTOs.

use validator::ValidationError;

/// Validates that every dispute evidence link is a well-formed http(s) URL.
///
/// The check is deliberately shallow (scheme, non-empty host, no embedded
/// whitespace); the service performs its own deep validation. Rejecting the
/// obvious garbage locally keeps malformed evidence off the network entirely.
pub fn validate_evidence_links(links: &Vec<String>) -> Result<(), ValidationError> {
    for link in links {
        let rest = link
            .strip_prefix("https://")
            .or_else(|| link.strip_prefix("http://"))
            .ok_or_else(|| {
                let mut err = ValidationError::new("evidence_link_scheme");
                err.message = Some("Evidence links must start with http:// or https://".into());
                err
            })?;

        let host = rest.split('/').next().unwrap_or_default();
        if host.is_empty() {
            let mut err = ValidationError::new("evidence_link_host");
            err.message = Some("Evidence links must include a host".into());
            return Err(err);
        }

        if link.chars().any(char::is_whitespace) {
            let mut err = ValidationError::new("evidence_link_whitespace");
            err.message = Some("Evidence links must not contain whitespace".into());
            return Err(err);
        }
    }

    Ok(())
}
