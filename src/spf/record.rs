//! SPF record tokenization (RFC 7208 Section 4.6).
//!
//! A record is the version tag `v=spf1` followed by space-separated terms.
//! Terms containing `=` are modifiers, everything else is a directive.
//! Keywords are case-insensitive, so the whole record is folded to lower
//! case before splitting.

use super::mechanism::{parse_directive, Directive, SpfParseError};

const VERSION_TAG: &str = "v=spf1";

/// A `name=value` modifier term. `redirect` and `exp` are the recognized
/// keys; unknown modifiers are carried for forward compatibility and
/// ignored by policy construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modifier {
    pub key: String,
    pub value: String,
}

/// A tokenized SPF record: directives and modifiers in textual order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpfRecord {
    pub directives: Vec<Directive>,
    pub modifiers: Vec<Modifier>,
}

impl SpfRecord {
    /// Parse the TXT string of an SPF record.
    ///
    /// Leading and trailing whitespace is tolerated; interior runs of
    /// multiple spaces are not (the grammar separates terms with exactly one
    /// space), and neither are tabs.
    pub fn parse(record: &str) -> Result<Self, SpfParseError> {
        let record = record.trim().to_ascii_lowercase();
        let mut terms = record.split(' ');

        let version = terms.next().unwrap_or("");
        if version != VERSION_TAG {
            return Err(SpfParseError::UnsupportedVersion(version.to_string()));
        }

        let mut directives = Vec::new();
        let mut modifiers = Vec::new();

        for term in terms {
            if term.is_empty() {
                return Err(SpfParseError::EmptyTerm);
            }
            match term.split_once('=') {
                Some((key, value)) => modifiers.push(Modifier {
                    key: key.to_string(),
                    value: value.to_string(),
                }),
                None => directives.push(parse_directive(term)?),
            }
        }

        Ok(SpfRecord {
            directives,
            modifiers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spf::mechanism::{Mechanism, Qualifier};

    #[test]
    fn minimal_record() {
        let record = SpfRecord::parse("v=spf1 -all").unwrap();
        assert_eq!(record.directives.len(), 1);
        assert_eq!(record.directives[0].qualifier, Qualifier::Fail);
        assert_eq!(record.directives[0].mechanism, Mechanism::All);
        assert!(record.modifiers.is_empty());
    }

    #[test]
    fn version_only_record() {
        let record = SpfRecord::parse("v=spf1").unwrap();
        assert!(record.directives.is_empty());
        assert!(record.modifiers.is_empty());
    }

    #[test]
    fn unsupported_version() {
        assert_eq!(
            SpfRecord::parse("v=spf2 -all").unwrap_err(),
            SpfParseError::UnsupportedVersion("v=spf2".into())
        );
        assert!(SpfRecord::parse("spf1 -all").is_err());
        assert!(SpfRecord::parse("").is_err());
    }

    #[test]
    fn terms_keep_textual_order() {
        let record = SpfRecord::parse("v=spf1 ip4:1.2.3.4 include:a.com mx -all").unwrap();
        assert_eq!(record.directives.len(), 4);
        assert!(matches!(record.directives[0].mechanism, Mechanism::Ip4 { .. }));
        assert!(matches!(
            record.directives[1].mechanism,
            Mechanism::Include { .. }
        ));
        assert!(matches!(record.directives[2].mechanism, Mechanism::Mx { .. }));
        assert_eq!(record.directives[3].mechanism, Mechanism::All);
    }

    #[test]
    fn equals_sign_classifies_modifiers() {
        let record =
            SpfRecord::parse("v=spf1 redirect=_spf.example.com exp=explain.example.com -all")
                .unwrap();
        assert_eq!(record.directives.len(), 1);
        assert_eq!(record.modifiers.len(), 2);
        assert_eq!(record.modifiers[0].key, "redirect");
        assert_eq!(record.modifiers[0].value, "_spf.example.com");
        assert_eq!(record.modifiers[1].key, "exp");
        assert_eq!(record.modifiers[1].value, "explain.example.com");
    }

    #[test]
    fn unknown_modifiers_are_carried() {
        let record = SpfRecord::parse("v=spf1 foo=bar -all").unwrap();
        assert_eq!(record.modifiers.len(), 1);
        assert_eq!(record.modifiers[0].key, "foo");
        assert_eq!(record.modifiers[0].value, "bar");
    }

    #[test]
    fn duplicate_modifiers_are_kept_in_order() {
        // Rejecting duplicates is the policy builder's job.
        let record = SpfRecord::parse("v=spf1 redirect=a.com redirect=b.com").unwrap();
        assert_eq!(record.modifiers.len(), 2);
        assert_eq!(record.modifiers[0].value, "a.com");
        assert_eq!(record.modifiers[1].value, "b.com");
    }

    #[test]
    fn blank_modifier_value_is_kept() {
        let record = SpfRecord::parse("v=spf1 redirect=").unwrap();
        assert_eq!(record.modifiers[0].value, "");
    }

    #[test]
    fn record_is_case_folded() {
        let record = SpfRecord::parse("V=SPF1 IP4:192.0.2.1 -ALL").unwrap();
        assert_eq!(record.directives.len(), 2);
        assert!(matches!(record.directives[0].mechanism, Mechanism::Ip4 { .. }));
        assert_eq!(record.directives[1].mechanism, Mechanism::All);
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        let record = SpfRecord::parse("  v=spf1 -all  ").unwrap();
        assert_eq!(record.directives.len(), 1);
    }

    #[test]
    fn interior_double_space_is_rejected() {
        assert_eq!(
            SpfRecord::parse("v=spf1  -all").unwrap_err(),
            SpfParseError::EmptyTerm
        );
        assert_eq!(
            SpfRecord::parse("v=spf1 ip4:1.2.3.4  -all").unwrap_err(),
            SpfParseError::EmptyTerm
        );
    }

    #[test]
    fn embedded_tab_is_rejected() {
        assert!(SpfRecord::parse("v=spf1\t-all").is_err());
        assert!(SpfRecord::parse("v=spf1 ip4:1.2.3.4\t-all").is_err());
    }

    #[test]
    fn parsing_is_deterministic() {
        let text = "v=spf1 ip4:1.2.3.4/28 include:a.example.com ~all redirect=b.example.com";
        assert_eq!(
            SpfRecord::parse(text).unwrap(),
            SpfRecord::parse(text).unwrap()
        );
    }

    #[test]
    fn malformed_directive_fails_the_record() {
        assert!(SpfRecord::parse("v=spf1 bogus:foo -all").is_err());
        assert!(SpfRecord::parse("v=spf1 ip4:1.2.3.4/33").is_err());
    }
}
