//! Regular expressions over `"$remote_addr $host"` for the if-block scheme

use ipnet::{IpNet, Ipv4Net};

/// Regex matching the textual form of every address in `net`
///
/// Returns `None` for IPv6 ranges wider than one address: Nginx prints
/// IPv6 sources in compressed form, which a prefix cannot be matched against.
pub fn client_regex(net: &IpNet) -> Option<String> {
    match net {
        IpNet::V4(v4) => Some(ipv4_regex(v4)),
        IpNet::V6(v6) if v6.prefix_len() == 128 => Some(v6.addr().to_string()),
        IpNet::V6(_) => None,
    }
}

fn ipv4_regex(net: &Ipv4Net) -> String {
    let octets = net.network().octets();
    let prefix = net.prefix_len() as usize;
    let fixed = prefix / 8;
    let partial_bits = prefix % 8;

    let mut parts = Vec::with_capacity(4);
    for (i, octet) in octets.iter().enumerate() {
        if i < fixed {
            parts.push(octet.to_string());
        } else if i == fixed && partial_bits > 0 {
            let count = 1u16 << (8 - partial_bits);
            let base = *octet as u16;
            let choices: Vec<String> = (base..base + count).map(|v| v.to_string()).collect();
            parts.push(format!("(?:{})", choices.join("|")));
        } else {
            parts.push(r"\d+".to_string());
        }
    }

    parts.join(r"\.")
}

/// Regex matching a host pattern; `*.` matches one or more leading labels
pub fn host_regex(pattern: &str) -> String {
    let pattern = pattern.trim().to_ascii_lowercase();
    match pattern.strip_prefix("*.") {
        Some(rest) => format!(r"[^ ]+\.{}", escape_dots(rest)),
        None => escape_dots(&pattern),
    }
}

fn escape_dots(s: &str) -> String {
    s.replace('.', r"\.")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> IpNet {
        s.parse::<IpNet>().unwrap().trunc()
    }

    #[test]
    fn test_single_ipv4() {
        assert_eq!(client_regex(&net("10.0.0.5/32")).unwrap(), r"10\.0\.0\.5");
    }

    #[test]
    fn test_octet_aligned_ipv4() {
        assert_eq!(client_regex(&net("10.1.0.0/16")).unwrap(), r"10\.1\.\d+\.\d+");
        assert_eq!(client_regex(&net("0.0.0.0/0")).unwrap(), r"\d+\.\d+\.\d+\.\d+");
    }

    #[test]
    fn test_partial_octet_ipv4() {
        assert_eq!(
            client_regex(&net("192.168.1.4/30")).unwrap(),
            r"192\.168\.1\.(?:4|5|6|7)"
        );
        assert_eq!(
            client_regex(&net("172.16.0.0/15")).unwrap(),
            r"172\.(?:16|17)\.\d+\.\d+"
        );
    }

    #[test]
    fn test_ipv6() {
        assert_eq!(client_regex(&net("2001:db8::1/128")).unwrap(), "2001:db8::1");
        assert!(client_regex(&net("2001:db8::/32")).is_none());
    }

    #[test]
    fn test_host_regex() {
        assert_eq!(host_regex("API.example.com"), r"api\.example\.com");
        assert_eq!(host_regex("*.example.com"), r"[^ ]+\.example\.com");
    }
}
