//! The DNS port of the SPF engine.
//!
//! [`DnsResolver`] is the only dependency the policy builder takes on the
//! outside world: SPF TXT by name, A/AAAA by name, MX by name. The crate
//! ships a production implementation over hickory-resolver and an in-memory
//! mock for tests.

use std::collections::HashMap;
use std::future::Future;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};

use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;

/// DNS-level failures, distinguishable per RFC 7208 Section 2.6: transient
/// transport errors become `TempError`, a missing SPF record becomes `None`,
/// everything else is publisher-fixable and becomes `PermError`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DnsError {
    #[error("host not found")]
    HostNotFound,
    #[error("no SPF record published")]
    NoSpfRecord,
    #[error("unsupported SPF record: {0}")]
    UnsupportedVersion(String),
    #[error("multiple SPF records published")]
    MultipleRecords,
    #[error("transient DNS failure: {0}")]
    TempFail(String),
}

/// One MX answer. Preference is carried for completeness (RFC 1035 3.3.9);
/// policy construction does not order by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MxRecord {
    pub host: String,
    pub preference: u16,
}

impl MxRecord {
    pub fn new(host: impl Into<String>, preference: u16) -> Self {
        Self {
            host: host.into(),
            preference,
        }
    }
}

/// Abstract resolver the policy builder is driven by.
///
/// `get_spf` returns the single supported `v=spf1` TXT record for the domain,
/// `get_a` the union of A and AAAA answers, `get_mx` the MX answers.
pub trait DnsResolver: Send + Sync {
    fn get_spf(&self, domain: &str) -> impl Future<Output = Result<String, DnsError>> + Send;
    fn get_a(&self, domain: &str) -> impl Future<Output = Result<Vec<IpAddr>, DnsError>> + Send;
    fn get_mx(&self, domain: &str)
        -> impl Future<Output = Result<Vec<MxRecord>, DnsError>> + Send;
}

/// True iff the record's first five characters case-fold to `v=spf`.
pub fn is_spf(record: &str) -> bool {
    record
        .get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("v=spf"))
}

/// True iff the record's first six characters case-fold to `v=spf1`.
pub fn is_supported_version(record: &str) -> bool {
    record
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("v=spf1"))
}

/// Pick the SPF record out of a TXT RRset, enforcing the exactly-one rule of
/// RFC 7208 Section 4.5. Shared by every resolver implementation.
pub fn select_spf_record<'a, I>(records: I) -> Result<String, DnsError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut supported: Option<&str> = None;
    let mut unsupported: Option<&str> = None;

    for record in records {
        if !is_spf(record) {
            continue;
        }
        if !is_supported_version(record) {
            unsupported = Some(record);
            continue;
        }
        if supported.is_some() {
            return Err(DnsError::MultipleRecords);
        }
        supported = Some(record);
    }

    match (supported, unsupported) {
        (Some(record), _) => Ok(record.to_string()),
        (None, Some(record)) => Err(DnsError::UnsupportedVersion(record.to_string())),
        (None, None) => Err(DnsError::NoSpfRecord),
    }
}

/// Live resolver over hickory-resolver with Cloudflare upstreams.
#[derive(Clone)]
pub struct HickoryResolver {
    resolver: TokioResolver,
}

impl HickoryResolver {
    pub fn new() -> Self {
        let resolver = TokioResolver::builder_with_config(
            ResolverConfig::cloudflare(),
            TokioConnectionProvider::default(),
        )
        .build();
        Self { resolver }
    }
}

impl Default for HickoryResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DnsResolver for HickoryResolver {
    async fn get_spf(&self, domain: &str) -> Result<String, DnsError> {
        match self.resolver.txt_lookup(domain).await {
            Ok(lookup) => {
                let records: Vec<String> = lookup.iter().map(|txt| txt.to_string()).collect();
                select_spf_record(records.iter().map(String::as_str))
            }
            Err(e) if e.is_nx_domain() => Err(DnsError::HostNotFound),
            Err(e) if e.is_no_records_found() => Err(DnsError::NoSpfRecord),
            Err(e) => Err(DnsError::TempFail(e.to_string())),
        }
    }

    async fn get_a(&self, domain: &str) -> Result<Vec<IpAddr>, DnsError> {
        let mut addrs = Vec::new();

        match self.resolver.ipv4_lookup(domain).await {
            Ok(lookup) => addrs.extend(lookup.iter().map(|a| IpAddr::V4(a.0))),
            Err(e) if e.is_nx_domain() => return Err(DnsError::HostNotFound),
            Err(e) if e.is_no_records_found() => {}
            Err(e) => return Err(DnsError::TempFail(e.to_string())),
        }

        match self.resolver.ipv6_lookup(domain).await {
            Ok(lookup) => addrs.extend(lookup.iter().map(|aaaa| IpAddr::V6(aaaa.0))),
            Err(e) if e.is_nx_domain() || e.is_no_records_found() => {}
            Err(e) => return Err(DnsError::TempFail(e.to_string())),
        }

        Ok(addrs)
    }

    async fn get_mx(&self, domain: &str) -> Result<Vec<MxRecord>, DnsError> {
        match self.resolver.mx_lookup(domain).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|mx| MxRecord::new(mx.exchange().to_string(), mx.preference()))
                .collect()),
            Err(e) if e.is_nx_domain() => Err(DnsError::HostNotFound),
            Err(e) if e.is_no_records_found() => Ok(Vec::new()),
            Err(e) => Err(DnsError::TempFail(e.to_string())),
        }
    }
}

/// In-memory resolver for tests. Names are stored lower-cased; unknown names
/// answer [`DnsError::HostNotFound`]. Errors can be injected per name and
/// record type.
#[derive(Clone, Default)]
pub struct MockResolver {
    txt_records: Arc<RwLock<HashMap<String, Vec<String>>>>,
    a_records: Arc<RwLock<HashMap<String, Vec<IpAddr>>>>,
    mx_records: Arc<RwLock<HashMap<String, Vec<MxRecord>>>>,
    txt_errors: Arc<RwLock<HashMap<String, DnsError>>>,
    a_errors: Arc<RwLock<HashMap<String, DnsError>>>,
    mx_errors: Arc<RwLock<HashMap<String, DnsError>>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_txt(&self, name: &str, records: Vec<String>) {
        self.txt_records
            .write()
            .unwrap()
            .insert(name.to_lowercase(), records);
    }

    pub fn add_a(&self, name: &str, addrs: Vec<IpAddr>) {
        self.a_records
            .write()
            .unwrap()
            .insert(name.to_lowercase(), addrs);
    }

    pub fn add_mx(&self, name: &str, exchanges: Vec<MxRecord>) {
        self.mx_records
            .write()
            .unwrap()
            .insert(name.to_lowercase(), exchanges);
    }

    pub fn fail_txt(&self, name: &str, err: DnsError) {
        self.txt_errors
            .write()
            .unwrap()
            .insert(name.to_lowercase(), err);
    }

    pub fn fail_a(&self, name: &str, err: DnsError) {
        self.a_errors
            .write()
            .unwrap()
            .insert(name.to_lowercase(), err);
    }

    pub fn fail_mx(&self, name: &str, err: DnsError) {
        self.mx_errors
            .write()
            .unwrap()
            .insert(name.to_lowercase(), err);
    }
}

impl DnsResolver for MockResolver {
    async fn get_spf(&self, domain: &str) -> Result<String, DnsError> {
        let name = domain.to_lowercase();
        if let Some(err) = self.txt_errors.read().unwrap().get(&name) {
            return Err(err.clone());
        }
        let records = self
            .txt_records
            .read()
            .unwrap()
            .get(&name)
            .cloned()
            .ok_or(DnsError::HostNotFound)?;
        select_spf_record(records.iter().map(String::as_str))
    }

    async fn get_a(&self, domain: &str) -> Result<Vec<IpAddr>, DnsError> {
        let name = domain.to_lowercase();
        if let Some(err) = self.a_errors.read().unwrap().get(&name) {
            return Err(err.clone());
        }
        self.a_records
            .read()
            .unwrap()
            .get(&name)
            .cloned()
            .ok_or(DnsError::HostNotFound)
    }

    async fn get_mx(&self, domain: &str) -> Result<Vec<MxRecord>, DnsError> {
        let name = domain.to_lowercase();
        if let Some(err) = self.mx_errors.read().unwrap().get(&name) {
            return Err(err.clone());
        }
        self.mx_records
            .read()
            .unwrap()
            .get(&name)
            .cloned()
            .ok_or(DnsError::HostNotFound)
    }
}
