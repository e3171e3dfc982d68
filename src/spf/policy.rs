//! Policy construction (RFC 7208 Sections 4.6.4, 5 and 6).
//!
//! [`Policy::build`] fetches a domain's record and expands every mechanism
//! into concrete CIDR ranges, bucketed by qualifier. `include:` directives
//! and the `redirect=` modifier recurse into sub-policies; every
//! DNS-consuming term is charged against one shared [`LookupCounter`] so a
//! reference cycle always terminates in PermError.

use std::fmt;
use std::net::IpAddr;

use ipnet::IpNet;
use tracing::debug;

use crate::common::cidr;
use crate::common::dns::DnsResolver;

use super::mechanism::{Mechanism, Qualifier};
use super::record::SpfRecord;
use super::SpfError;

/// DNS-consuming mechanism limit per evaluation (RFC 7208 Section 4.6.4).
pub const MAX_DNS_LOOKUPS: u32 = 10;

/// Budget for DNS-consuming terms, shared across one recursive build.
/// Never process-global: independent evaluations carry independent counters.
#[derive(Debug)]
pub struct LookupCounter {
    used: u32,
    limit: u32,
}

impl LookupCounter {
    pub fn new(limit: u32) -> Self {
        Self { used: 0, limit }
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    fn charge(&mut self) -> Result<(), SpfError> {
        if self.used == self.limit {
            return Err(SpfError::TooManyLookups(self.limit));
        }
        self.used += 1;
        Ok(())
    }
}

impl Default for LookupCounter {
    fn default() -> Self {
        Self::new(MAX_DNS_LOOKUPS)
    }
}

/// An `include:` slot: the sub-policy plus the qualifier applied when it
/// matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Include {
    pub qualifier: Qualifier,
    pub policy: Policy,
}

/// The fully resolved policy of one domain. Immutable once returned from
/// [`Policy::build`]; checking an IP does no further DNS work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub domain: String,
    /// Ranges whose match yields Pass (`+` or no qualifier).
    pub pass: Vec<IpNet>,
    /// Ranges whose match yields Neutral (`?`).
    pub neutral: Vec<IpNet>,
    /// Ranges whose match yields SoftFail (`~`).
    pub softfail: Vec<IpNet>,
    /// Ranges whose match yields Fail (`-`).
    pub fail: Vec<IpNet>,
    /// Qualifier of the `all` directive, if one was present.
    pub all: Option<Qualifier>,
    /// Sub-policies of `include:` directives, in textual order.
    pub includes: Vec<Include>,
    /// Sub-policy of the `redirect=` modifier. Never set when `all` is.
    pub redirect: Option<Box<Policy>>,
}

impl Policy {
    fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            pass: Vec::new(),
            neutral: Vec::new(),
            softfail: Vec::new(),
            fail: Vec::new(),
            all: None,
            includes: Vec::new(),
            redirect: None,
        }
    }

    /// Fetch, parse and recursively expand the SPF policy of `domain`.
    /// All DNS work happens here, bounded by [`MAX_DNS_LOOKUPS`].
    pub async fn build<R: DnsResolver>(domain: &str, resolver: &R) -> Result<Self, SpfError> {
        let mut lookups = LookupCounter::default();
        let policy = build_policy(domain, resolver, &mut lookups).await?;
        debug!(domain, lookups = lookups.used(), "built SPF policy");
        Ok(policy)
    }

    fn deposit(&mut self, qualifier: Qualifier, nets: Vec<IpNet>) {
        let bucket = match qualifier {
            Qualifier::Pass => &mut self.pass,
            Qualifier::Neutral => &mut self.neutral,
            Qualifier::SoftFail => &mut self.softfail,
            Qualifier::Fail => &mut self.fail,
        };
        bucket.extend(nets);
    }
}

pub(crate) async fn build_policy<R: DnsResolver>(
    domain: &str,
    resolver: &R,
    lookups: &mut LookupCounter,
) -> Result<Policy, SpfError> {
    let text = resolver.get_spf(domain).await?;
    debug!(domain, record = %text, "fetched SPF record");
    let record = SpfRecord::parse(&text)?;

    let mut policy = Policy::new(domain);

    for directive in &record.directives {
        match &directive.mechanism {
            Mechanism::All => {
                policy.all = Some(directive.qualifier);
                // Mechanisms listed after "all" MUST be ignored (RFC 7208 5.1).
                break;
            }
            Mechanism::Include { domain: target } => {
                lookups.charge()?;
                let sub = Box::pin(build_policy(target, resolver, lookups)).await?;
                policy.includes.push(Include {
                    qualifier: directive.qualifier,
                    policy: sub,
                });
            }
            Mechanism::A {
                domain: target,
                cidr4,
                cidr6,
            } => {
                lookups.charge()?;
                let target = target.as_deref().unwrap_or(domain);
                let addrs = resolver.get_a(target).await?;
                policy.deposit(
                    directive.qualifier,
                    cidr::ip_networks(&addrs, *cidr4, *cidr6)?,
                );
            }
            Mechanism::Mx {
                domain: target,
                cidr4,
                cidr6,
            } => {
                lookups.charge()?;
                let target = target.as_deref().unwrap_or(domain);
                // Each MX host needs its own address lookup, charged too.
                for mx in resolver.get_mx(target).await? {
                    lookups.charge()?;
                    let addrs = resolver.get_a(&mx.host).await?;
                    policy.deposit(
                        directive.qualifier,
                        cidr::ip_networks(&addrs, *cidr4, *cidr6)?,
                    );
                }
            }
            Mechanism::Ip4 { addr, prefix } => {
                let nets = cidr::ip_networks(&[IpAddr::V4(*addr)], *prefix, None)?;
                policy.deposit(directive.qualifier, nets);
            }
            Mechanism::Ip6 { addr, prefix } => {
                let nets = cidr::ip_networks(&[IpAddr::V6(*addr)], None, *prefix)?;
                policy.deposit(directive.qualifier, nets);
            }
            Mechanism::Ptr { .. } | Mechanism::Exists { .. } => {
                // Accepted by the grammar; they contribute no ranges.
            }
        }
    }

    let mut redirect_seen = false;
    for modifier in &record.modifiers {
        match modifier.key.as_str() {
            "redirect" => {
                if redirect_seen {
                    return Err(SpfError::DuplicateRedirect);
                }
                redirect_seen = true;
                if modifier.value.is_empty() {
                    return Err(SpfError::BlankRedirect);
                }
                // A redirect MUST be ignored when the record has an "all"
                // mechanism, regardless of term order (RFC 7208 6.1).
                if policy.all.is_none() {
                    lookups.charge()?;
                    let sub = Box::pin(build_policy(&modifier.value, resolver, lookups)).await?;
                    policy.redirect = Some(Box::new(sub));
                }
            }
            "exp" => {
                // Recognized; explanation strings are not retrieved.
            }
            _ => {}
        }
    }

    Ok(policy)
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

impl Policy {
    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        writeln!(f, "{pad}policy {} {{", self.domain)?;
        fmt_bucket(f, &pad, "pass    ", &self.pass)?;
        fmt_bucket(f, &pad, "neutral ", &self.neutral)?;
        fmt_bucket(f, &pad, "softfail", &self.softfail)?;
        fmt_bucket(f, &pad, "fail    ", &self.fail)?;
        match self.all {
            Some(qualifier) => writeln!(f, "{pad}  all      {qualifier}")?,
            None => writeln!(f, "{pad}  all      undefined")?,
        }
        for include in &self.includes {
            writeln!(f, "{pad}  include {}", include.qualifier)?;
            include.policy.fmt_indented(f, depth + 1)?;
        }
        if let Some(redirect) = &self.redirect {
            writeln!(f, "{pad}  redirect")?;
            redirect.fmt_indented(f, depth + 1)?;
        }
        writeln!(f, "{pad}}}")
    }
}

fn fmt_bucket(
    f: &mut fmt::Formatter<'_>,
    pad: &str,
    name: &str,
    nets: &[IpNet],
) -> fmt::Result {
    write!(f, "{pad}  {name} [")?;
    for (i, net) in nets.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{net}")?;
    }
    writeln!(f, "]")
}
