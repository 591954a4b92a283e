//! Normalization and syntactic validation of user-supplied domain names.

use thiserror::Error;

/// Minimum length of a normalized domain name.
pub const MIN_DOMAIN_LEN: usize = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid domain name: {0:?}")]
pub struct InvalidDomain(pub String);

/// Lowercases the input and strips an http(s) scheme, any path, query,
/// fragment and port, and the trailing root dot.
pub fn normalize(input: &str) -> String {
    let mut domain = input.trim().to_lowercase();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = domain.strip_prefix(scheme) {
            domain = rest.to_string();
            break;
        }
    }
    let host = domain
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default();
    host.strip_suffix('.').unwrap_or(host).to_string()
}

/// Normalizes the input and checks it looks like a domain name.
///
/// Only basic well-formedness is checked: at least `MIN_DOMAIN_LEN`
/// characters, at least one dot and no empty labels.
pub fn parse(input: &str) -> Result<String, InvalidDomain> {
    let domain = normalize(input);
    if domain.len() < MIN_DOMAIN_LEN
        || !domain.contains('.')
        || domain.split('.').any(str::is_empty)
    {
        return Err(InvalidDomain(input.to_string()));
    }
    Ok(domain)
}
