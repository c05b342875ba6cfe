// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Represents XMPP addresses, also known as JIDs.
//!
//! An address is the `localpart@domainpart/resourcepart` triple described in
//! [RFC 7622](https://datatracker.ietf.org/doc/html/rfc7622). Construction
//! canonicalizes every part; an [`Addr`] that exists is always in canonical
//! form, and equality is octet-for-octet on the canonical string.
//!
//! Three types are provided, mirroring the shapes the protocol cares about:
//!
//! - [`Addr`]: any address, with or without a resourcepart;
//! - [`BareAddr`]: an address known to have no resourcepart;
//! - [`FullAddr`]: an address known to have a resourcepart.

#![warn(missing_docs)]

use core::fmt;
use core::num::NonZeroU16;
use core::str::FromStr;
use std::borrow::Cow;
use std::error::Error as StdError;
use std::net::IpAddr;

/// Maximum length of each address part, in octets, after canonicalization.
const MAX_PART_LEN: usize = 1023;

/// An error that signifies that an `Addr` cannot be parsed from an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidAddr {
    /// Happens when the domainpart is empty.
    EmptyDomain,

    /// Happens when the domainpart exceeds the length limit.
    DomainTooLong,

    /// Happens when the localpart is present but empty, as in `@domain`.
    EmptyLocal,

    /// Happens when the localpart exceeds the length limit.
    LocalTooLong,

    /// Happens when the localpart contains characters rejected by the
    /// UsernameCaseMapped-style preparation (forbidden characters, invalid
    /// codepoints).
    LocalPrep,

    /// Happens when the resourcepart is present but empty, as in `domain/`.
    EmptyResource,

    /// Happens when the resourcepart exceeds the length limit.
    ResourceTooLong,

    /// Happens when the resourcepart contains codepoints rejected by the
    /// OpaqueString-style preparation.
    ResourcePrep,

    /// Happens when the domainpart cannot be converted from its A-label
    /// (punycode) form to U-label form.
    Idna,

    /// Happens when a resourcepart is found while parsing a [`BareAddr`].
    ResourceInBare,

    /// Happens when no resourcepart is found while parsing a [`FullAddr`].
    NoResource,
}

impl fmt::Display for InvalidAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            InvalidAddr::EmptyDomain => "domainpart is empty",
            InvalidAddr::DomainTooLong => "domainpart is longer than 1023 bytes",
            InvalidAddr::EmptyLocal => "localpart is empty",
            InvalidAddr::LocalTooLong => "localpart is longer than 1023 bytes",
            InvalidAddr::LocalPrep => "localpart contains forbidden characters",
            InvalidAddr::EmptyResource => "resourcepart is empty",
            InvalidAddr::ResourceTooLong => "resourcepart is longer than 1023 bytes",
            InvalidAddr::ResourcePrep => "resourcepart contains forbidden codepoints",
            InvalidAddr::Idna => "domainpart is not a valid internationalized name",
            InvalidAddr::ResourceInBare => "unexpected resourcepart in bare address",
            InvalidAddr::NoResource => "missing resourcepart in full address",
        })
    }
}

impl StdError for InvalidAddr {}

fn prep_local(local: &str) -> Result<String, InvalidAddr> {
    if local.is_empty() {
        return Err(InvalidAddr::EmptyLocal);
    }
    let prepped = match stringprep::nodeprep(local) {
        Ok(Cow::Borrowed(s)) => s.to_owned(),
        Ok(Cow::Owned(s)) => s,
        Err(_) => return Err(InvalidAddr::LocalPrep),
    };
    if prepped.is_empty() {
        return Err(InvalidAddr::EmptyLocal);
    }
    if prepped.len() > MAX_PART_LEN {
        return Err(InvalidAddr::LocalTooLong);
    }
    Ok(prepped)
}

fn prep_domain(domain: &str) -> Result<String, InvalidAddr> {
    // A single trailing dot is allowed on input (fully-qualified spelling)
    // but never part of the canonical form.
    let domain = domain.strip_suffix('.').unwrap_or(domain);
    if domain.is_empty() {
        return Err(InvalidAddr::EmptyDomain);
    }
    if domain.len() > MAX_PART_LEN {
        return Err(InvalidAddr::DomainTooLong);
    }

    // IPv6 literals in brackets and bare IPv4 literals are valid
    // domainparts and are kept verbatim.
    if domain.starts_with('[') && domain.ends_with(']') {
        let inner = &domain[1..domain.len() - 1];
        if inner.parse::<IpAddr>().is_err() {
            return Err(InvalidAddr::Idna);
        }
        return Ok(domain.to_owned());
    }
    if domain.parse::<IpAddr>().is_ok() {
        return Ok(domain.to_owned());
    }

    // DNS names are canonicalized to U-label form, which also performs the
    // UTS #46 mapping (lowercasing included).
    let (unicode, result) = idna::domain_to_unicode(domain);
    if result.is_err() {
        return Err(InvalidAddr::Idna);
    }
    if unicode.is_empty() {
        return Err(InvalidAddr::EmptyDomain);
    }
    if unicode.len() > MAX_PART_LEN {
        return Err(InvalidAddr::DomainTooLong);
    }
    Ok(unicode)
}

fn prep_resource(resource: &str) -> Result<String, InvalidAddr> {
    if resource.is_empty() {
        return Err(InvalidAddr::EmptyResource);
    }
    let prepped = match stringprep::resourceprep(resource) {
        Ok(Cow::Borrowed(s)) => s.to_owned(),
        Ok(Cow::Owned(s)) => s,
        Err(_) => return Err(InvalidAddr::ResourcePrep),
    };
    if prepped.is_empty() {
        return Err(InvalidAddr::EmptyResource);
    }
    if prepped.len() > MAX_PART_LEN {
        return Err(InvalidAddr::ResourceTooLong);
    }
    Ok(prepped)
}

/// An XMPP address, canonical from construction on.
///
/// The canonical string is stored once; the localpart and resourcepart are
/// recovered through the recorded positions of the `@` and `/` separators.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Addr {
    normalized: String,
    at: Option<NonZeroU16>,
    slash: Option<NonZeroU16>,
}

impl Addr {
    /// Parse and canonicalize an address.
    ///
    /// The input is split on the first `/` into head and resourcepart, the
    /// head on the first `@` into localpart and domainpart. Each part is
    /// prepared separately; any failure rejects the whole input.
    pub fn new(unnormalized: &str) -> Result<Addr, InvalidAddr> {
        let bytes = unnormalized.as_bytes();
        let (head, resource) = match memchr::memchr(b'/', bytes) {
            Some(idx) => (&unnormalized[..idx], Some(&unnormalized[idx + 1..])),
            None => (unnormalized, None),
        };
        let (local, domain) = match memchr::memchr(b'@', head.as_bytes()) {
            Some(idx) => (Some(&head[..idx]), &head[idx + 1..]),
            None => (None, head),
        };
        let local = local.map(prep_local).transpose()?;
        let domain = prep_domain(domain)?;
        let resource = resource.map(prep_resource).transpose()?;
        Ok(Addr::assemble(local, domain, resource))
    }

    /// Build an address from already-split parts.
    ///
    /// Each part is canonicalized as in [`Addr::new`]; `@` and `/` inside
    /// parts are not treated as separators here, so a resourcepart may
    /// legitimately contain both.
    pub fn from_parts(
        local: Option<&str>,
        domain: &str,
        resource: Option<&str>,
    ) -> Result<Addr, InvalidAddr> {
        let local = local.map(prep_local).transpose()?;
        let domain = prep_domain(domain)?;
        let resource = resource.map(prep_resource).transpose()?;
        Ok(Addr::assemble(local, domain, resource))
    }

    fn assemble(local: Option<String>, domain: String, resource: Option<String>) -> Addr {
        let mut normalized = String::with_capacity(
            local.as_deref().map(|l| l.len() + 1).unwrap_or(0)
                + domain.len()
                + resource.as_deref().map(|r| r.len() + 1).unwrap_or(0),
        );
        let at = local.map(|local| {
            normalized.push_str(&local);
            normalized.push('@');
            NonZeroU16::new(local.len() as u16).unwrap()
        });
        normalized.push_str(&domain);
        let slash = resource.map(|resource| {
            let idx = NonZeroU16::new(normalized.len() as u16).unwrap();
            normalized.push('/');
            normalized.push_str(&resource);
            idx
        });
        Addr {
            normalized,
            at,
            slash,
        }
    }

    /// The localpart, if any.
    pub fn local(&self) -> Option<&str> {
        self.at.map(|at| &self.normalized[..at.get() as usize])
    }

    /// The domainpart.
    pub fn domain(&self) -> &str {
        let start = self.at.map(|at| at.get() as usize + 1).unwrap_or(0);
        match self.slash {
            Some(slash) => &self.normalized[start..slash.get() as usize],
            None => &self.normalized[start..],
        }
    }

    /// The resourcepart, if any.
    pub fn resource(&self) -> Option<&str> {
        self.slash
            .map(|slash| &self.normalized[slash.get() as usize + 1..])
    }

    /// Whether this address has no resourcepart.
    pub fn is_bare(&self) -> bool {
        self.slash.is_none()
    }

    /// Whether this address has a resourcepart.
    pub fn is_full(&self) -> bool {
        self.slash.is_some()
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    /// This address with the resourcepart removed.
    pub fn to_bare(&self) -> BareAddr {
        match self.slash {
            None => BareAddr(self.clone()),
            Some(slash) => BareAddr(Addr {
                normalized: self.normalized[..slash.get() as usize].to_owned(),
                at: self.at,
                slash: None,
            }),
        }
    }
}

impl FromStr for Addr {
    type Err = InvalidAddr;

    fn from_str(s: &str) -> Result<Addr, InvalidAddr> {
        Addr::new(s)
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

impl fmt::Debug for Addr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Addr({})", self.normalized)
    }
}

impl From<BareAddr> for Addr {
    fn from(other: BareAddr) -> Addr {
        other.0
    }
}

impl From<FullAddr> for Addr {
    fn from(other: FullAddr) -> Addr {
        other.0
    }
}

/// An address known to carry no resourcepart.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BareAddr(Addr);

impl BareAddr {
    /// Parse and canonicalize a bare address.
    ///
    /// Inputs containing a `/` are rejected with
    /// [`InvalidAddr::ResourceInBare`]; use [`Addr::to_bare`] to strip a
    /// resourcepart instead.
    pub fn new(unnormalized: &str) -> Result<BareAddr, InvalidAddr> {
        let addr = Addr::new(unnormalized)?;
        if addr.is_full() {
            return Err(InvalidAddr::ResourceInBare);
        }
        Ok(BareAddr(addr))
    }

    /// Build a bare address from parts.
    pub fn from_parts(local: Option<&str>, domain: &str) -> Result<BareAddr, InvalidAddr> {
        Ok(BareAddr(Addr::from_parts(local, domain, None)?))
    }

    /// The localpart, if any.
    pub fn local(&self) -> Option<&str> {
        self.0.local()
    }

    /// The domainpart.
    pub fn domain(&self) -> &str {
        self.0.domain()
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Attach a resourcepart, producing a full address.
    pub fn with_resource(&self, resource: &str) -> Result<FullAddr, InvalidAddr> {
        let resource = prep_resource(resource)?;
        Ok(FullAddr(Addr::assemble(
            self.local().map(str::to_owned),
            self.domain().to_owned(),
            Some(resource),
        )))
    }
}

impl TryFrom<Addr> for BareAddr {
    type Error = InvalidAddr;

    fn try_from(addr: Addr) -> Result<BareAddr, InvalidAddr> {
        if addr.is_full() {
            return Err(InvalidAddr::ResourceInBare);
        }
        Ok(BareAddr(addr))
    }
}

impl FromStr for BareAddr {
    type Err = InvalidAddr;

    fn from_str(s: &str) -> Result<BareAddr, InvalidAddr> {
        BareAddr::new(s)
    }
}

impl fmt::Display for BareAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for BareAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BareAddr({})", self.0.normalized)
    }
}

impl PartialEq<Addr> for BareAddr {
    fn eq(&self, other: &Addr) -> bool {
        &self.0 == other
    }
}

/// An address known to carry a resourcepart.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FullAddr(Addr);

impl FullAddr {
    /// Parse and canonicalize a full address.
    ///
    /// Inputs without a `/` are rejected with [`InvalidAddr::NoResource`].
    pub fn new(unnormalized: &str) -> Result<FullAddr, InvalidAddr> {
        let addr = Addr::new(unnormalized)?;
        if addr.is_bare() {
            return Err(InvalidAddr::NoResource);
        }
        Ok(FullAddr(addr))
    }

    /// Build a full address from parts.
    pub fn from_parts(
        local: Option<&str>,
        domain: &str,
        resource: &str,
    ) -> Result<FullAddr, InvalidAddr> {
        Ok(FullAddr(Addr::from_parts(local, domain, Some(resource))?))
    }

    /// The localpart, if any.
    pub fn local(&self) -> Option<&str> {
        self.0.local()
    }

    /// The domainpart.
    pub fn domain(&self) -> &str {
        self.0.domain()
    }

    /// The resourcepart.
    pub fn resource(&self) -> &str {
        self.0.resource().unwrap()
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// This address with the resourcepart removed.
    pub fn to_bare(&self) -> BareAddr {
        self.0.to_bare()
    }
}

impl TryFrom<Addr> for FullAddr {
    type Error = InvalidAddr;

    fn try_from(addr: Addr) -> Result<FullAddr, InvalidAddr> {
        if addr.is_bare() {
            return Err(InvalidAddr::NoResource);
        }
        Ok(FullAddr(addr))
    }
}

impl FromStr for FullAddr {
    type Err = InvalidAddr;

    fn from_str(s: &str) -> Result<FullAddr, InvalidAddr> {
        FullAddr::new(s)
    }
}

impl fmt::Display for FullAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for FullAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FullAddr({})", self.0.normalized)
    }
}

impl PartialEq<Addr> for FullAddr {
    fn eq(&self, other: &Addr) -> bool {
        &self.0 == other
    }
}

#[cfg(feature = "minidom")]
mod minidom_impls {
    use super::{Addr, BareAddr, FullAddr};
    use minidom::IntoAttributeValue;

    impl IntoAttributeValue for Addr {
        fn into_attribute_value(self) -> Option<String> {
            Some(self.normalized)
        }
    }

    impl IntoAttributeValue for BareAddr {
        fn into_attribute_value(self) -> Option<String> {
            self.0.into_attribute_value()
        }
    }

    impl IntoAttributeValue for FullAddr {
        fn into_attribute_value(self) -> Option<String> {
            self.0.into_attribute_value()
        }
    }
}

#[cfg(feature = "serde")]
mod serde_impls {
    use super::{Addr, BareAddr, FullAddr};
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    macro_rules! string_serde {
        ($type:ident) => {
            impl Serialize for $type {
                fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                    serializer.serialize_str(self.as_str())
                }
            }

            impl<'de> Deserialize<'de> for $type {
                fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                    let s = String::deserialize(deserializer)?;
                    s.parse().map_err(de::Error::custom)
                }
            }
        };
    }

    string_serde!(Addr);
    string_serde!(BareAddr);
    string_serde!(FullAddr);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full() {
        let addr = Addr::new("feste@shakespeare.lit/costume").unwrap();
        assert_eq!(addr.local(), Some("feste"));
        assert_eq!(addr.domain(), "shakespeare.lit");
        assert_eq!(addr.resource(), Some("costume"));
        assert!(addr.is_full());
    }

    #[test]
    fn parse_bare() {
        let addr = Addr::new("feste@shakespeare.lit").unwrap();
        assert_eq!(addr.local(), Some("feste"));
        assert_eq!(addr.domain(), "shakespeare.lit");
        assert_eq!(addr.resource(), None);
        assert!(addr.is_bare());
    }

    #[test]
    fn parse_domain_only() {
        let addr = Addr::new("shakespeare.lit").unwrap();
        assert_eq!(addr.local(), None);
        assert_eq!(addr.domain(), "shakespeare.lit");
        assert_eq!(addr.resource(), None);
    }

    #[test]
    fn resource_may_contain_separators() {
        let addr = Addr::new("feste@shakespeare.lit/a@b/c").unwrap();
        assert_eq!(addr.local(), Some("feste"));
        assert_eq!(addr.resource(), Some("a@b/c"));
    }

    #[test]
    fn at_in_domain_only_input_starts_localpart() {
        let addr = Addr::new("a@b").unwrap();
        assert_eq!(addr.local(), Some("a"));
        assert_eq!(addr.domain(), "b");
    }

    #[test]
    fn round_trip_is_identity_on_canonical_forms() {
        for input in [
            "feste@shakespeare.lit",
            "feste@shakespeare.lit/costume",
            "shakespeare.lit",
            "shakespeare.lit/stage",
        ] {
            let addr = Addr::new(input).unwrap();
            assert_eq!(addr.to_string(), input);
            let again = Addr::new(&addr.to_string()).unwrap();
            assert_eq!(addr, again);
        }
    }

    #[test]
    fn localpart_is_case_folded() {
        let addr = Addr::new("FESTE@shakespeare.lit").unwrap();
        assert_eq!(addr.local(), Some("feste"));
        assert_eq!(addr, Addr::new("feste@shakespeare.lit").unwrap());
    }

    #[test]
    fn domain_is_lowercased() {
        let addr = Addr::new("feste@Shakespeare.LIT").unwrap();
        assert_eq!(addr.domain(), "shakespeare.lit");
    }

    #[test]
    fn resource_case_is_preserved() {
        let addr = Addr::new("feste@shakespeare.lit/Costume").unwrap();
        assert_eq!(addr.resource(), Some("Costume"));
    }

    #[test]
    fn trailing_dot_is_stripped() {
        let addr = Addr::new("feste@shakespeare.lit.").unwrap();
        assert_eq!(addr.domain(), "shakespeare.lit");
    }

    #[test]
    fn a_label_is_converted_to_u_label() {
        let addr = Addr::new("gote@xn--brse-5qa.de").unwrap();
        assert_eq!(addr.domain(), "börse.de");
        assert_eq!(addr, Addr::new("gote@börse.de").unwrap());
    }

    #[test]
    fn ip_literals_pass_through() {
        assert_eq!(Addr::new("user@127.0.0.1").unwrap().domain(), "127.0.0.1");
        assert_eq!(Addr::new("user@[2001:db8::1]").unwrap().domain(), "[2001:db8::1]");
        assert_eq!(Addr::new("user@[not-an-ip]").unwrap_err(), InvalidAddr::Idna);
    }

    #[test]
    fn empty_parts_are_rejected() {
        assert_eq!(Addr::new("@shakespeare.lit").unwrap_err(), InvalidAddr::EmptyLocal);
        assert_eq!(
            Addr::new("feste@shakespeare.lit/").unwrap_err(),
            InvalidAddr::EmptyResource
        );
        assert_eq!(Addr::new("feste@").unwrap_err(), InvalidAddr::EmptyDomain);
        assert_eq!(Addr::new("").unwrap_err(), InvalidAddr::EmptyDomain);
    }

    #[test]
    fn forbidden_localpart_characters_are_rejected() {
        for input in [
            "fe\"ste@x.lit",
            "fe&ste@x.lit",
            "fe'ste@x.lit",
            "fe:ste@x.lit",
            "fe<ste@x.lit",
            "fe>ste@x.lit",
        ] {
            assert_eq!(Addr::new(input).unwrap_err(), InvalidAddr::LocalPrep, "{}", input);
        }
    }

    #[test]
    fn oversized_parts_are_rejected() {
        let long = "a".repeat(1024);
        assert_eq!(
            Addr::new(&format!("{}@x.lit", long)).unwrap_err(),
            InvalidAddr::LocalTooLong
        );
        assert_eq!(
            Addr::new(&format!("x@y.lit/{}", long)).unwrap_err(),
            InvalidAddr::ResourceTooLong
        );
        assert_eq!(Addr::new(&long).unwrap_err(), InvalidAddr::DomainTooLong);
    }

    #[test]
    fn to_bare_strips_resource() {
        let addr = Addr::new("feste@shakespeare.lit/costume").unwrap();
        let bare = addr.to_bare();
        assert_eq!(bare.as_str(), "feste@shakespeare.lit");
        assert_eq!(bare.local(), Some("feste"));
        assert_eq!(bare.domain(), "shakespeare.lit");
    }

    #[test]
    fn bare_rejects_resource() {
        assert_eq!(
            BareAddr::new("feste@shakespeare.lit/costume").unwrap_err(),
            InvalidAddr::ResourceInBare
        );
    }

    #[test]
    fn full_requires_resource() {
        assert_eq!(
            FullAddr::new("feste@shakespeare.lit").unwrap_err(),
            InvalidAddr::NoResource
        );
        let full = FullAddr::new("feste@shakespeare.lit/costume").unwrap();
        assert_eq!(full.resource(), "costume");
    }

    #[test]
    fn with_resource() {
        let bare = BareAddr::new("feste@shakespeare.lit").unwrap();
        let full = bare.with_resource("costume").unwrap();
        assert_eq!(full.as_str(), "feste@shakespeare.lit/costume");
    }

    #[test]
    fn equality_is_stable_across_spellings() {
        let a = Addr::new("FESTE@Shakespeare.Lit/costume").unwrap();
        let b = Addr::new("feste@shakespeare.lit/costume").unwrap();
        assert_eq!(a, b);
        let again = Addr::new(&a.to_string()).unwrap();
        assert_eq!(a, again);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_round_trip() {
        use serde_test::{assert_tokens, Token};
        let addr = Addr::new("feste@shakespeare.lit/costume").unwrap();
        assert_tokens(&addr, &[Token::Str("feste@shakespeare.lit/costume")]);
        let bare = BareAddr::new("feste@shakespeare.lit").unwrap();
        assert_tokens(&bare, &[Token::Str("feste@shakespeare.lit")]);
    }
}
