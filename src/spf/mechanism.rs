//! SPF directive parsing (RFC 7208 Sections 4.6.2 and 5).
//!
//! A directive is `[qualifier]mechanism[:arg][/cidr4][//cidr6]`. Each
//! mechanism is its own variant carrying typed arguments; prefix lengths and
//! IP literals are validated here, so a malformed term never reaches policy
//! construction.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use super::SpfResult;

/// Qualifier prefix on a directive (RFC 7208 Section 4.6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualifier {
    Pass,     // + (default)
    Fail,     // -
    SoftFail, // ~
    Neutral,  // ?
}

impl Qualifier {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Qualifier::Pass),
            '-' => Some(Qualifier::Fail),
            '~' => Some(Qualifier::SoftFail),
            '?' => Some(Qualifier::Neutral),
            _ => None,
        }
    }

    /// The result a matching mechanism with this qualifier produces.
    pub fn to_result(self) -> SpfResult {
        match self {
            Qualifier::Pass => SpfResult::Pass,
            Qualifier::Fail => SpfResult::Fail,
            Qualifier::SoftFail => SpfResult::SoftFail,
            Qualifier::Neutral => SpfResult::Neutral,
        }
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Qualifier::Pass => "+",
            Qualifier::Fail => "-",
            Qualifier::SoftFail => "~",
            Qualifier::Neutral => "?",
        })
    }
}

/// SPF mechanism (RFC 7208 Section 5). Prefix lengths are `None` when absent
/// from the record text; the CIDR builder supplies the /32 and /128 defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mechanism {
    /// `all`
    All,
    /// `include:<domain-spec>`
    Include { domain: String },
    /// `a[:<domain-spec>][/cidr4][//cidr6]`
    A {
        domain: Option<String>,
        cidr4: Option<u8>,
        cidr6: Option<u8>,
    },
    /// `mx[:<domain-spec>][/cidr4][//cidr6]`
    Mx {
        domain: Option<String>,
        cidr4: Option<u8>,
        cidr6: Option<u8>,
    },
    /// `ptr[:<domain-spec>]` (parsed, no policy effect)
    Ptr { domain: Option<String> },
    /// `ip4:<ip4-network>[/cidr]`
    Ip4 { addr: Ipv4Addr, prefix: Option<u8> },
    /// `ip6:<ip6-network>[/cidr]`
    Ip6 { addr: Ipv6Addr, prefix: Option<u8> },
    /// `exists:<domain-spec>` (parsed, no policy effect)
    Exists { domain: String },
}

/// A directive is a qualifier + mechanism pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub qualifier: Qualifier,
    pub mechanism: Mechanism,
}

/// Error type for SPF term parsing. All parse failures map to PermError.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpfParseError {
    #[error("unsupported SPF version: {0:?}")]
    UnsupportedVersion(String),
    #[error("empty term")]
    EmptyTerm,
    #[error("unknown mechanism: {0}")]
    UnknownMechanism(String),
    #[error("{0} requires a domain argument")]
    MissingDomain(&'static str),
    #[error("{0} requires an address argument")]
    MissingAddress(&'static str),
    #[error("all takes no argument")]
    UnexpectedArgument,
    #[error("invalid IPv4 prefix length: {0:?}")]
    InvalidPrefix4(String),
    #[error("invalid IPv6 prefix length: {0:?}")]
    InvalidPrefix6(String),
    #[error("invalid IPv4 address: {0:?}")]
    InvalidIp4(String),
    #[error("invalid IPv6 address: {0:?}")]
    InvalidIp6(String),
}

/// Parse one directive term: `[qualifier]mechanism[:arg][/cidr4][//cidr6]`.
pub fn parse_directive(term: &str) -> Result<Directive, SpfParseError> {
    let (qualifier, rest) = split_qualifier(term);
    if rest.is_empty() {
        return Err(SpfParseError::EmptyTerm);
    }
    let mechanism = parse_mechanism(rest)?;
    Ok(Directive {
        qualifier,
        mechanism,
    })
}

/// Consume an optional leading `+ - ~ ?`, defaulting to Pass.
fn split_qualifier(term: &str) -> (Qualifier, &str) {
    match term.chars().next().and_then(Qualifier::from_char) {
        Some(q) => (q, &term[1..]),
        None => (Qualifier::Pass, term),
    }
}

fn parse_mechanism(term: &str) -> Result<Mechanism, SpfParseError> {
    // The mechanism name runs to the first ':'. Bare forms like "a/24" have
    // no colon; there the name stops at the '/' and the spec keeps it.
    let (name, spec) = match term.find(':') {
        Some(pos) => (&term[..pos], Some(&term[pos + 1..])),
        None => match term.find('/') {
            Some(pos) => (&term[..pos], Some(&term[pos..])),
            None => (term, None),
        },
    };

    match name.to_ascii_lowercase().as_str() {
        "all" => match spec {
            Some(_) => Err(SpfParseError::UnexpectedArgument),
            None => Ok(Mechanism::All),
        },
        "include" => {
            let domain = spec
                .filter(|s| !s.is_empty())
                .ok_or(SpfParseError::MissingDomain("include"))?;
            Ok(Mechanism::Include {
                domain: domain.to_string(),
            })
        }
        "a" => {
            let (domain, cidr4, cidr6) = parse_domain_cidr(spec.unwrap_or(""))?;
            Ok(Mechanism::A {
                domain,
                cidr4,
                cidr6,
            })
        }
        "mx" => {
            let (domain, cidr4, cidr6) = parse_domain_cidr(spec.unwrap_or(""))?;
            Ok(Mechanism::Mx {
                domain,
                cidr4,
                cidr6,
            })
        }
        "ptr" => {
            let domain = spec.filter(|s| !s.is_empty()).map(str::to_string);
            Ok(Mechanism::Ptr { domain })
        }
        "ip4" => {
            let spec = spec
                .filter(|s| !s.is_empty() && !s.starts_with('/'))
                .ok_or(SpfParseError::MissingAddress("ip4"))?;
            parse_ip4(spec)
        }
        "ip6" => {
            let spec = spec
                .filter(|s| !s.is_empty() && !s.starts_with('/'))
                .ok_or(SpfParseError::MissingAddress("ip6"))?;
            parse_ip6(spec)
        }
        "exists" => {
            let domain = spec
                .filter(|s| !s.is_empty())
                .ok_or(SpfParseError::MissingDomain("exists"))?;
            Ok(Mechanism::Exists {
                domain: domain.to_string(),
            })
        }
        other => Err(SpfParseError::UnknownMechanism(other.to_string())),
    }
}

/// Parse `[domain][/cidr4][//cidr6]` as used by `a` and `mx`.
/// Handles `domain`, `domain/24`, `domain//96`, `domain/24//96` and the
/// domain-less forms of each.
fn parse_domain_cidr(
    spec: &str,
) -> Result<(Option<String>, Option<u8>, Option<u8>), SpfParseError> {
    let (head, cidr6) = match spec.find("//") {
        Some(pos) => (&spec[..pos], Some(parse_prefix6(&spec[pos + 2..])?)),
        None => (spec, None),
    };

    let (domain, cidr4) = match head.find('/') {
        Some(pos) => (&head[..pos], Some(parse_prefix4(&head[pos + 1..])?)),
        None => (head, None),
    };

    let domain = (!domain.is_empty()).then(|| domain.to_string());
    Ok((domain, cidr4, cidr6))
}

fn parse_prefix4(s: &str) -> Result<u8, SpfParseError> {
    s.parse::<u8>()
        .ok()
        .filter(|len| *len <= 32)
        .ok_or_else(|| SpfParseError::InvalidPrefix4(s.to_string()))
}

fn parse_prefix6(s: &str) -> Result<u8, SpfParseError> {
    s.parse::<u8>()
        .ok()
        .filter(|len| *len <= 128)
        .ok_or_else(|| SpfParseError::InvalidPrefix6(s.to_string()))
}

fn parse_ip4(spec: &str) -> Result<Mechanism, SpfParseError> {
    let (addr_str, prefix) = match spec.find('/') {
        Some(pos) => (&spec[..pos], Some(parse_prefix4(&spec[pos + 1..])?)),
        None => (spec, None),
    };
    let addr: Ipv4Addr = addr_str
        .parse()
        .map_err(|_| SpfParseError::InvalidIp4(addr_str.to_string()))?;
    Ok(Mechanism::Ip4 { addr, prefix })
}

fn parse_ip6(spec: &str) -> Result<Mechanism, SpfParseError> {
    // An IPv6 literal never contains '/', so the first one starts the prefix.
    let (addr_str, prefix) = match spec.find('/') {
        Some(pos) => (&spec[..pos], Some(parse_prefix6(&spec[pos + 1..])?)),
        None => (spec, None),
    };
    let addr: Ipv6Addr = addr_str
        .parse()
        .map_err(|_| SpfParseError::InvalidIp6(addr_str.to_string()))?;
    Ok(Mechanism::Ip6 { addr, prefix })
}
