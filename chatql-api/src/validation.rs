//! Syntactic checks for caller-supplied e-mail addresses and URLs

use url::Url;

const LOCAL_PART_SPECIALS: &str = "!#$%&'*+/=?^_`{|}~.-";
const URL_SCHEMES: [&str; 4] = ["http", "https", "ftp", "ftps"];

/// `local@domain.tld` with a dotted, hostname-shaped domain
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };

    if local.is_empty()
        || local.len() > 64
        || local.starts_with('.')
        || local.ends_with('.')
        || local.contains("..")
        || !local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || LOCAL_PART_SPECIALS.contains(c))
    {
        return false;
    }

    is_domain(domain)
}

/// Absolute URL with a known scheme and a host
pub fn is_valid_url(url: &str) -> bool {
    if url.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return false;
    }

    match Url::parse(url) {
        Ok(parsed) => URL_SCHEMES.contains(&parsed.scheme()) && parsed.host().is_some(),
        Err(_) => false,
    }
}

/// Whether `url` starts with one of the configured origins
pub fn is_allowed_origin(url: &str, allowed_origins: &[String]) -> bool {
    allowed_origins.iter().any(|origin| url.starts_with(origin.as_str()))
}

fn is_domain(domain: &str) -> bool {
    if domain.len() > 253 {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    let label_ok = |label: &&str| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    };

    let tld_ok = labels
        .last()
        .is_some_and(|tld| tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()));

    labels.iter().all(label_ok) && tld_ok
}
