//! SPF policy engine (RFC 7208).
//!
//! [`Policy::build`] compiles a domain's record, recursively, into a tree of
//! qualifier-bucketed CIDR ranges; [`Policy::check_ip`] then classifies
//! candidate IPs without any further DNS work.

use std::fmt;
use std::net::IpAddr;

use tracing::debug;

use crate::common::cidr::CidrError;
use crate::common::dns::{DnsError, DnsResolver};

pub mod mechanism;
pub mod policy;
pub mod record;

mod eval;

pub use mechanism::{Directive, Mechanism, Qualifier};
pub use policy::Policy;
pub use record::SpfRecord;

use mechanism::SpfParseError;

/// SPF evaluation result (RFC 7208 Section 2.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpfResult {
    /// Sender is authorized.
    Pass,
    /// Sender is NOT authorized.
    Fail,
    /// Weak authorization failure.
    SoftFail,
    /// No assertion made.
    Neutral,
    /// No SPF record found, and no rule applied.
    None,
    /// Transient DNS error.
    TempError,
    /// Permanent error (syntax, too many lookups, etc.).
    PermError,
}

impl fmt::Display for SpfResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SpfResult::Pass => "Pass",
            SpfResult::Fail => "Fail",
            SpfResult::SoftFail => "SoftFail",
            SpfResult::Neutral => "Neutral",
            SpfResult::None => "None",
            SpfResult::TempError => "TempError",
            SpfResult::PermError => "PermError",
        })
    }
}

/// Failure during policy construction. Every variant maps onto an RFC 7208
/// result through [`SpfError::result`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpfError {
    #[error("SPF parse error: {0}")]
    Parse(#[from] SpfParseError),
    #[error("invalid CIDR range: {0}")]
    Cidr(#[from] CidrError),
    #[error("DNS error: {0}")]
    Dns(#[from] DnsError),
    #[error("duplicate redirect modifier")]
    DuplicateRedirect,
    #[error("redirect modifier with an empty domain")]
    BlankRedirect,
    #[error("DNS lookup limit of {0} exceeded")]
    TooManyLookups(u32),
}

impl SpfError {
    /// The RFC 7208 result this construction failure stands for.
    pub fn result(&self) -> SpfResult {
        match self {
            SpfError::Dns(DnsError::NoSpfRecord) => SpfResult::None,
            SpfError::Dns(DnsError::TempFail(_)) => SpfResult::TempError,
            _ => SpfResult::PermError,
        }
    }
}

/// Build the policy for `domain` and classify `ip` against it, folding
/// construction failures into their RFC result.
pub async fn evaluate<R: DnsResolver>(resolver: &R, domain: &str, ip: IpAddr) -> SpfResult {
    match Policy::build(domain, resolver).await {
        Ok(policy) => policy.check_ip(ip),
        Err(err) => {
            debug!(domain, error = %err, "SPF policy construction failed");
            err.result()
        }
    }
}
