use crate::error::SpiderError;
use std::net::IpAddr;

/// Second-level labels under which registrations happen one level deeper,
/// e.g. `example.co.uk` or `example.com.cn`.
const SECOND_LEVEL: &[&str] = &[
    "ac", "co", "com", "edu", "gov", "gv", "ltd", "me", "mil", "net", "nic", "or", "org", "plc",
    "sch",
];

/// Returns the registrable part of `host`.
///
/// IP addresses are returned unchanged. For names, the result is the last two
/// labels, or the last three when the second-to-last is a generic
/// second-level label under a two-letter country code.
pub fn primary_domain(host: &str) -> Result<String, SpiderError> {
    let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() {
        return Err(SpiderError::illegal("empty host"));
    }

    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if bare.parse::<IpAddr>().is_ok() {
        return Ok(host);
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.iter().any(|label| label.is_empty()) {
        return Err(SpiderError::illegal(format!("unrecognized host: {}", host)));
    }
    if labels.len() <= 2 {
        return Ok(host);
    }

    let n = labels.len();
    let tld = labels[n - 1];
    let second = labels[n - 2];
    let take = if tld.len() == 2 && SECOND_LEVEL.contains(&second) {
        3
    } else {
        2
    };
    Ok(labels[n - take..].join("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_the_last_two_labels() {
        assert_eq!(primary_domain("www.example.com").unwrap(), "example.com");
        assert_eq!(primary_domain("a.b.example.org").unwrap(), "example.org");
        assert_eq!(primary_domain("Example.COM.").unwrap(), "example.com");
        assert_eq!(primary_domain("localhost").unwrap(), "localhost");
    }

    #[test]
    fn understands_country_second_levels() {
        assert_eq!(primary_domain("news.bbc.co.uk").unwrap(), "bbc.co.uk");
        assert_eq!(primary_domain("www.sina.com.cn").unwrap(), "sina.com.cn");
        assert_eq!(primary_domain("www.example.io").unwrap(), "example.io");
    }

    #[test]
    fn ip_hosts_are_their_own_domain() {
        assert_eq!(primary_domain("127.0.0.1").unwrap(), "127.0.0.1");
        assert_eq!(primary_domain("[::1]").unwrap(), "[::1]");
    }

    #[test]
    fn rejects_empty_and_broken_hosts() {
        assert!(primary_domain("").is_err());
        assert!(primary_domain("a..com").is_err());
    }
}
