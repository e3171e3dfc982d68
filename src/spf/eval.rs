//! Result evaluation (RFC 7208 Sections 2.6, 5.2 and 6.1).
//!
//! Classification over a built [`Policy`] is pure CIDR membership. Buckets
//! are checked in the fixed precedence fail > softfail > neutral > pass,
//! then includes in textual order, then the redirect (unless an `all`
//! mechanism shadows it), then `all` itself.

use std::net::IpAddr;

use super::policy::Policy;
use super::SpfResult;

impl Policy {
    /// Classify a candidate sender IP against this policy.
    ///
    /// Pure and deterministic: the same policy and IP always produce the
    /// same result.
    pub fn check_ip(&self, ip: IpAddr) -> SpfResult {
        if self.fail.iter().any(|net| net.contains(&ip)) {
            return SpfResult::Fail;
        }
        if self.softfail.iter().any(|net| net.contains(&ip)) {
            return SpfResult::SoftFail;
        }
        if self.neutral.iter().any(|net| net.contains(&ip)) {
            return SpfResult::Neutral;
        }
        if self.pass.iter().any(|net| net.contains(&ip)) {
            return SpfResult::Pass;
        }

        for include in &self.includes {
            // Recursive check_host composition (RFC 7208 5.2): only Pass
            // makes the include match; errors abort the whole evaluation.
            match include.policy.check_ip(ip) {
                SpfResult::Pass => return include.qualifier.to_result(),
                SpfResult::TempError => return SpfResult::TempError,
                SpfResult::PermError => return SpfResult::PermError,
                SpfResult::Fail
                | SpfResult::SoftFail
                | SpfResult::Neutral
                | SpfResult::None => {}
            }
        }

        if self.all.is_none() {
            if let Some(redirect) = &self.redirect {
                return redirect.check_ip(ip);
            }
        }

        match self.all {
            Some(qualifier) => qualifier.to_result(),
            None => SpfResult::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::dns::{MockResolver, MxRecord};
    use crate::spf::evaluate;

    /// The test zone: the reference fixtures plus the records the
    /// end-to-end scenarios name.
    fn test_resolver() -> MockResolver {
        let resolver = MockResolver::new();
        let txt = [
            ("simple.example.com", "v=spf1 ip4:1.2.3.4 -all"),
            ("example.com", "v=spf1 include:_spf.example.com ~all"),
            (
                "_spf.example.com",
                "v=spf1 include:spf1.example.com include:spf2.example.com include:spf3.example.com",
            ),
            ("spf1.example.com", "v=spf1 ip4:1.1.1.1/24 ~all"),
            (
                "spf2.example.com",
                "v=spf1 ip4:2.1.1.2/24 ip4:2.1.1.3/24 ~all",
            ),
            ("spf3.example.com", "v=spf1 ip6:1111::1/48 ~all"),
            (
                "matchall.example.com",
                "v=spf1 ip4:0.0.0.0/0 ip6:0::1/0 -all",
            ),
            (
                "recursive.example.com",
                "v=spf1 include:example.com include:recursive.example.com -all",
            ),
            ("mx-check.example.com", "v=spf1 mx:example.com ~all"),
            ("redirect.example.com", "v=spf1 redirect=example.com"),
            (
                "ignore-redirect.example.com",
                "v=spf1 ip4:3.3.3.3/32 redirect=example.com -all",
            ),
            (
                "reject.example.com",
                "v=spf1 -ip4:1.1.1.1 ~ip4:2.2.2.2 ?ip4:3.3.3.3 +ip4:4.4.4.4 ?all",
            ),
            (
                "dup-redirect.example.com",
                "v=spf1 ip4:3.3.3.3/32 redirect=example.com redirect=example.com -all",
            ),
            (
                "blank-redirect.example.com",
                "v=spf1 ip4:3.3.3.3/32 redirect=",
            ),
            ("case.example.com", "V=SPF1 IP4:1.2.3.4 -ALL"),
        ];
        for (name, record) in txt {
            resolver.add_txt(name, vec![record.to_string()]);
        }

        resolver.add_mx(
            "example.com",
            vec![
                MxRecord::new("mxa.example.com", 10),
                MxRecord::new("mxb.example.com", 10),
            ],
        );
        resolver.add_a("mxa.example.com", vec!["1.2.3.1".parse().unwrap()]);
        resolver.add_a("mxb.example.com", vec!["1.2.3.2".parse().unwrap()]);

        resolver
    }

    async fn check(domain: &str, ip: &str) -> SpfResult {
        let resolver = test_resolver();
        evaluate(&resolver, domain, ip.parse().unwrap()).await
    }

    #[tokio::test]
    async fn simple_pass_and_fail() {
        assert_eq!(check("simple.example.com", "1.2.3.4").await, SpfResult::Pass);
        assert_eq!(check("simple.example.com", "1.2.3.5").await, SpfResult::Fail);
    }

    #[tokio::test]
    async fn nested_includes() {
        assert_eq!(check("example.com", "1.1.1.4").await, SpfResult::Pass);
        assert_eq!(check("example.com", "2.1.1.200").await, SpfResult::Pass);
        assert_eq!(check("example.com", "8.8.8.8").await, SpfResult::SoftFail);
    }

    #[tokio::test]
    async fn nested_include_matches_ipv6() {
        assert_eq!(check("example.com", "1111::abcd").await, SpfResult::Pass);
        assert_eq!(check("example.com", "2222::1").await, SpfResult::SoftFail);
    }

    #[tokio::test]
    async fn recursive_includes_exhaust_the_lookup_budget() {
        assert_eq!(
            check("recursive.example.com", "1.2.3.4").await,
            SpfResult::PermError
        );
        assert_eq!(
            check("recursive.example.com", "8.8.8.8").await,
            SpfResult::PermError
        );
    }

    #[tokio::test]
    async fn mx_hosts_authorize_their_addresses() {
        assert_eq!(
            check("mx-check.example.com", "1.2.3.1").await,
            SpfResult::Pass
        );
        assert_eq!(
            check("mx-check.example.com", "1.2.3.2").await,
            SpfResult::Pass
        );
        assert_eq!(
            check("mx-check.example.com", "8.8.8.8").await,
            SpfResult::SoftFail
        );
    }

    #[tokio::test]
    async fn redirect_adopts_the_target_verdict() {
        assert_eq!(
            check("redirect.example.com", "1.1.1.4").await,
            SpfResult::Pass
        );
        assert_eq!(
            check("redirect.example.com", "8.8.8.8").await,
            SpfResult::SoftFail
        );
    }

    #[tokio::test]
    async fn redirect_is_ignored_when_all_is_present() {
        assert_eq!(
            check("ignore-redirect.example.com", "3.3.3.3").await,
            SpfResult::Pass
        );
        assert_eq!(
            check("ignore-redirect.example.com", "8.8.8.8").await,
            SpfResult::Fail
        );
    }

    #[tokio::test]
    async fn every_qualifier_yields_its_result() {
        assert_eq!(check("reject.example.com", "1.1.1.1").await, SpfResult::Fail);
        assert_eq!(
            check("reject.example.com", "2.2.2.2").await,
            SpfResult::SoftFail
        );
        assert_eq!(
            check("reject.example.com", "3.3.3.3").await,
            SpfResult::Neutral
        );
        assert_eq!(check("reject.example.com", "4.4.4.4").await, SpfResult::Pass);
        assert_eq!(
            check("reject.example.com", "5.5.5.5").await,
            SpfResult::Neutral
        );
    }

    #[tokio::test]
    async fn duplicate_redirect_is_permerror() {
        assert_eq!(
            check("dup-redirect.example.com", "3.3.3.3").await,
            SpfResult::PermError
        );
    }

    #[tokio::test]
    async fn blank_redirect_is_permerror() {
        assert_eq!(
            check("blank-redirect.example.com", "3.3.3.3").await,
            SpfResult::PermError
        );
    }

    #[tokio::test]
    async fn nonexistent_domain_is_permerror() {
        assert_eq!(
            check("does-not-exist.example.com", "1.2.3.4").await,
            SpfResult::PermError
        );
    }

    #[tokio::test]
    async fn zero_prefixes_match_everything_in_their_family() {
        assert_eq!(
            check("matchall.example.com", "77.88.99.1").await,
            SpfResult::Pass
        );
        assert_eq!(
            check("matchall.example.com", "2001:db8::2").await,
            SpfResult::Pass
        );
    }

    #[tokio::test]
    async fn case_folded_record_evaluates_identically() {
        assert_eq!(check("case.example.com", "1.2.3.4").await, SpfResult::Pass);
        assert_eq!(check("case.example.com", "1.2.3.5").await, SpfResult::Fail);
    }

    #[tokio::test]
    async fn check_ip_is_pure() {
        let resolver = test_resolver();
        let policy = Policy::build("example.com", &resolver).await.unwrap();
        let ip: IpAddr = "1.1.1.4".parse().unwrap();
        let first = policy.check_ip(ip);
        let second = policy.check_ip(ip);
        assert_eq!(first, SpfResult::Pass);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn bucket_precedence_is_fail_first() {
        // Overlapping ranges with conflicting qualifiers: the deny buckets
        // win regardless of textual order.
        let resolver = MockResolver::new();
        resolver.add_txt(
            "overlap.example.com",
            vec!["v=spf1 +ip4:10.0.0.0/8 -ip4:10.1.0.0/16 ~ip4:10.1.2.0/24 ?all".into()],
        );
        assert_eq!(
            evaluate(&resolver, "overlap.example.com", "10.1.2.3".parse().unwrap()).await,
            SpfResult::Fail
        );
        assert_eq!(
            evaluate(&resolver, "overlap.example.com", "10.9.9.9".parse().unwrap()).await,
            SpfResult::Pass
        );
        assert_eq!(
            evaluate(&resolver, "overlap.example.com", "192.0.2.1".parse().unwrap()).await,
            SpfResult::Neutral
        );
    }

    #[tokio::test]
    async fn unmatched_ip_without_all_or_redirect_is_none() {
        let resolver = MockResolver::new();
        resolver.add_txt("open.example.com", vec!["v=spf1 ip4:1.2.3.4".into()]);
        assert_eq!(
            evaluate(&resolver, "open.example.com", "9.9.9.9".parse().unwrap()).await,
            SpfResult::None
        );
    }

    #[tokio::test]
    async fn include_qualifier_shapes_the_parent_result() {
        let resolver = MockResolver::new();
        resolver.add_txt(
            "strict.example.com",
            vec!["v=spf1 -include:allowed.example.com ?all".into()],
        );
        resolver.add_txt(
            "allowed.example.com",
            vec!["v=spf1 ip4:5.6.7.8 -all".into()],
        );
        // The include matches (sub-policy passes), so its "-" qualifier
        // turns the parent verdict into Fail.
        assert_eq!(
            evaluate(&resolver, "strict.example.com", "5.6.7.8".parse().unwrap()).await,
            SpfResult::Fail
        );
        // Sub-policy Fail means the include does not match; fall through.
        assert_eq!(
            evaluate(&resolver, "strict.example.com", "9.9.9.9".parse().unwrap()).await,
            SpfResult::Neutral
        );
    }

    #[tokio::test]
    async fn multi_space_record_is_permerror() {
        let resolver = MockResolver::new();
        resolver.add_txt(
            "spaced.example.com",
            vec!["v=spf1  ip4:1.2.3.4 -all".into()],
        );
        assert_eq!(
            evaluate(&resolver, "spaced.example.com", "1.2.3.4".parse().unwrap()).await,
            SpfResult::PermError
        );
    }
}
