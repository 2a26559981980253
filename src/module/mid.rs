use super::ModuleType;
use crate::error::SpiderError;
use serde::{Serialize, Serializer};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

/// A module identifier: `{letter}{serial}` optionally followed by `|{ip}:{port}`.
///
/// A `Mid` can only be obtained through [`Mid::new`] or by parsing, so every
/// value in circulation is well formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mid {
    raw: String,
    module_type: ModuleType,
    sn: u64,
    addr: Option<SocketAddr>,
}

impl Mid {
    pub fn new(module_type: ModuleType, sn: u64, addr: Option<SocketAddr>) -> Self {
        let raw = match addr {
            Some(addr) => format!("{}{}|{}", module_type.letter(), sn, addr),
            None => format!("{}{}", module_type.letter(), sn),
        };
        Self {
            raw,
            module_type,
            sn,
            addr,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn module_type(&self) -> ModuleType {
        self.module_type
    }

    pub fn sn(&self) -> u64 {
        self.sn
    }

    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }
}

/// Decodes and validates a raw MID string.
pub fn split_mid(raw: &str) -> Result<Mid, SpiderError> {
    if raw.len() <= 1 {
        return Err(SpiderError::illegal("insufficient MID"));
    }

    let mut chars = raw.chars();
    let letter = chars.next().unwrap_or_default();
    let module_type = ModuleType::from_letter(letter).ok_or_else(|| {
        SpiderError::illegal(format!("illegal module type letter: {}", letter))
    })?;

    let rest = chars.as_str();
    let (sn_str, addr_str) = match rest.rfind('|') {
        Some(index) => (&rest[..index], Some(&rest[index + 1..])),
        None => (rest, None),
    };

    if sn_str.is_empty() || !sn_str.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SpiderError::illegal(format!("illegal module SN: {}", sn_str)));
    }
    let sn = sn_str
        .parse::<u64>()
        .map_err(|_| SpiderError::illegal(format!("illegal module SN: {}", sn_str)))?;

    let addr = match addr_str {
        Some(addr) => Some(addr.parse::<SocketAddr>().map_err(|_| {
            SpiderError::illegal(format!("illegal module address: {}", addr))
        })?),
        None => None,
    };

    Ok(Mid {
        raw: raw.to_string(),
        module_type,
        sn,
        addr,
    })
}

/// Reports whether `raw` is a well-formed MID.
pub fn legal_mid(raw: &str) -> bool {
    split_mid(raw).is_ok()
}

impl FromStr for Mid {
    type Err = SpiderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        split_mid(s)
    }
}

impl fmt::Display for Mid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl AsRef<str> for Mid {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

impl Serialize for Mid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_mids_split_back() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        for module_type in ModuleType::ALL {
            for sn in [0, 1, 42, u64::MAX] {
                for addr in [None, Some(addr)] {
                    let mid = Mid::new(module_type, sn, addr);
                    let parsed: Mid = mid.as_str().parse().unwrap();
                    assert_eq!(parsed.module_type(), module_type);
                    assert_eq!(parsed.sn(), sn);
                    assert_eq!(parsed.addr(), addr);
                    assert_eq!(parsed, mid);
                }
            }
        }
    }

    #[test]
    fn address_separator_is_omitted_without_address() {
        assert_eq!(Mid::new(ModuleType::Downloader, 3, None).as_str(), "D3");
        let addr: SocketAddr = "10.0.0.2:80".parse().unwrap();
        assert_eq!(
            Mid::new(ModuleType::Pipeline, 9, Some(addr)).as_str(),
            "P9|10.0.0.2:80"
        );
    }

    #[test]
    fn malformed_mids_are_rejected() {
        let illegal = [
            "D",
            "DZ",
            "D1|",
            "D1|127.0.0.1:-1",
            "D1|127.0.0.1:",
            "D1|127.0.0.1",
            "D1|127.0.0.",
            "D1|127",
            "D1|127.0.0.0.1:8080",
            "DZ|127.0.0.1:8080",
            "A+1",
            "P1|localhost:80",
            "M1|127.0.0.1:8080",
            "",
        ];
        for raw in illegal {
            assert!(
                matches!(split_mid(raw), Err(SpiderError::IllegalParameter(_))),
                "{raw} should be rejected"
            );
            assert!(!legal_mid(raw));
        }
    }

    #[test]
    fn serializes_as_plain_string() {
        let mid = Mid::new(ModuleType::Analyzer, 12, None);
        assert_eq!(serde_json::to_string(&mid).unwrap(), "\"A12\"");
    }
}
