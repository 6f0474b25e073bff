use std::net::{IpAddr, Ipv4Addr};
use std::ops::Range;
use std::str;

use clap::ValueEnum;
use regex_automata::meta::Regex;
use regex_syntax::hir::Hir;

use crate::error::{Error, Result};

// Candidate patterns; every match is confirmed with std::net parsing.
static IPV4_PATTERN: &str = r"(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)";
static IPV6_PATTERN: &str = r"(?:(?:(?:(?:[0-9a-fA-F]){1,4}):){1,4}:(?:(?:(?:25[0-5]|(?:2[0-4]|1{0,1}[0-9]){0,1}[0-9])\.){3,3}(?:25[0-5]|(?:2[0-4]|1{0,1}[0-9]){0,1}[0-9])))|(?:::(?:ffff(?::0{1,4}){0,1}:){0,1}(?:(?:(?:25[0-5]|(?:2[0-4]|1{0,1}[0-9]){0,1}[0-9])\.){3,3}(?:25[0-5]|(?:2[0-4]|1{0,1}[0-9]){0,1}[0-9])))|(?::(?:(?::(?:(?:[0-9a-fA-F]){1,4})){1,7}|:))|(?:(?:(?:[0-9a-fA-F]){1,4}):(?:(?::(?:(?:[0-9a-fA-F]){1,4})){1,6}))|(?:(?:(?:(?:[0-9a-fA-F]){1,4}):){1,2}(?::(?:(?:[0-9a-fA-F]){1,4})){1,5})|(?:(?:(?:(?:[0-9a-fA-F]){1,4}):){1,3}(?::(?:(?:[0-9a-fA-F]){1,4})){1,4})|(?:(?:(?:(?:[0-9a-fA-F]){1,4}):){1,4}(?::(?:(?:[0-9a-fA-F]){1,4})){1,3})|(?:(?:(?:(?:[0-9a-fA-F]){1,4}):){1,5}(?::(?:(?:[0-9a-fA-F]){1,4})){1,2})|(?:(?:(?:(?:[0-9a-fA-F]){1,4}):){1,6}:(?:(?:[0-9a-fA-F]){1,4}))|(?:(?:(?:(?:[0-9a-fA-F]){1,4}):){1,7}:)|(?:(?:(?:(?:[0-9a-fA-F]){1,4}):){7,7}(?:(?:[0-9a-fA-F]){1,4}))";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Family {
    V4,
    V6,
}

impl Family {
    #[inline(always)]
    fn validate(self, haystack: &[u8], range: &Range<usize>) -> Option<IpAddr> {
        let s = str::from_utf8(&haystack[range.clone()]).ok()?;
        match self {
            Family::V4 => {
                if !v4_bounded(haystack, range) {
                    return None;
                }
                parse_v4(s).map(IpAddr::V4)
            }
            Family::V6 => {
                if !v6_bounded(haystack, range) {
                    return None;
                }
                s.parse::<std::net::Ipv6Addr>()
                    .ok()
                    .filter(|ip| !ip.is_unspecified())
                    .map(IpAddr::V6)
            }
        }
    }
}

/// Reject dotted quads that are really a slice of a longer number run,
/// e.g. `1.2.3.256` or `1.2.3.4.5`.
#[inline(always)]
fn v4_bounded(haystack: &[u8], range: &Range<usize>) -> bool {
    if range.start > 0 {
        let before = haystack[range.start - 1];
        if before.is_ascii_digit() || before == b'.' {
            return false;
        }
    }
    match haystack.get(range.end) {
        Some(b) if b.is_ascii_digit() => false,
        Some(b'.') => !haystack
            .get(range.end + 1)
            .is_some_and(|b| b.is_ascii_digit()),
        _ => true,
    }
}

/// Dotted quad with optional zero padding per octet, e.g. `010.000.000.001`.
fn parse_v4(s: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut parts = s.split('.');
    for octet in octets.iter_mut() {
        *octet = parts.next()?.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(Ipv4Addr::from(octets))
}

/// Reject hex-and-colon runs glued to identifiers, e.g. `std::vec` or
/// `Error::`, and truncated mapped forms such as the `::ffff:8` of
/// `::ffff:8.8.8.8`.
#[inline(always)]
fn v6_bounded(haystack: &[u8], range: &Range<usize>) -> bool {
    let glued = |b: &u8| b.is_ascii_alphanumeric() || *b == b':';
    if range.start > 0 && glued(&haystack[range.start - 1]) {
        return false;
    }
    match haystack.get(range.end) {
        Some(b) if glued(b) => false,
        Some(b'.') => !haystack
            .get(range.end + 1)
            .is_some_and(|b| b.is_ascii_digit()),
        _ => true,
    }
}

/// Which address of a multi-address input line is counted.
///
/// Reference (white/black) lines always contribute every address they
/// contain; this rule only narrows input lines.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Primary {
    /// The first address on the line.
    #[default]
    First,
    /// The second address when the line has more than one, otherwise the
    /// only one. Useful for logs that print a reverse-lookup name ahead of
    /// the peer address.
    Second,
    /// Every address on the line.
    All,
}

impl Primary {
    /// Narrow the addresses found on one input line.
    pub fn select(self, mut found: Vec<IpAddr>) -> Vec<IpAddr> {
        match self {
            Primary::All => found,
            Primary::First => {
                found.truncate(1);
                found
            }
            Primary::Second => {
                if found.len() > 1 {
                    vec![found[1]]
                } else {
                    found
                }
            }
        }
    }
}

/// A searcher for finding IPv4 and IPv6 addresses in text.
#[derive(Clone, Debug)]
pub struct Extractor {
    regex: Regex,
    families: Vec<Family>,
}

impl Extractor {
    /// Return an iterator of validated address matches found in the haystack.
    #[inline(always)]
    pub fn find_iter<'a>(&'a self, haystack: &'a [u8]) -> impl Iterator<Item = Range<usize>> + 'a {
        self.matches(haystack).map(|(range, _)| range)
    }

    /// Every address on the line, in the order they appear.
    pub fn addresses(&self, haystack: &[u8]) -> Vec<IpAddr> {
        self.matches(haystack).map(|(_, ip)| ip).collect()
    }

    #[inline(always)]
    fn matches<'a>(
        &'a self,
        haystack: &'a [u8],
    ) -> impl Iterator<Item = (Range<usize>, IpAddr)> + 'a {
        self.regex.find_iter(haystack).filter_map(move |m| {
            let range = m.range();
            let family = self.families[m.pattern().as_usize()];
            family.validate(haystack, &range).map(|ip| (range, ip))
        })
    }
}

/// Builder for constructing an address extractor.
#[derive(Clone, Debug)]
pub struct ExtractorBuilder {
    include_ipv4: bool,
    include_ipv6: bool,
}

impl Default for ExtractorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractorBuilder {
    /// Create a new builder that finds both IPv4 and IPv6 addresses.
    #[inline]
    pub fn new() -> Self {
        Self {
            include_ipv4: true,
            include_ipv6: true,
        }
    }

    /// Include or exclude IPv4 addresses.
    #[inline(always)]
    pub fn ipv4(&mut self, include: bool) -> &mut Self {
        self.include_ipv4 = include;
        self
    }

    /// Include or exclude IPv6 addresses.
    #[inline(always)]
    pub fn ipv6(&mut self, include: bool) -> &mut Self {
        self.include_ipv6 = include;
        self
    }

    /// Build the extractor with the current settings.
    pub fn build(&self) -> Result<Extractor> {
        let mut patterns: Vec<Hir> = Vec::with_capacity(2);
        let mut families = Vec::with_capacity(2);

        if self.include_ipv4 {
            patterns.push(regex_syntax::Parser::new().parse(IPV4_PATTERN)?);
            families.push(Family::V4);
        }
        if self.include_ipv6 {
            patterns.push(regex_syntax::Parser::new().parse(IPV6_PATTERN)?);
            families.push(Family::V6);
        }
        if patterns.is_empty() {
            return Err(Error::NoPatterns);
        }

        let regex = Regex::builder()
            .configure(
                Regex::config()
                    .auto_prefilter(true)
                    .match_kind(regex_automata::MatchKind::LeftmostFirst),
            )
            .build_many_from_hir(&patterns)?;

        Ok(Extractor { regex, families })
    }
}
