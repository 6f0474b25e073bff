//! Classification of log lines.
//!
//! A [`RuleSet`] is an ordered list of regular expressions, each naming a
//! classification tag. The first rule whose pattern matches a line decides
//! the tag. A rule may also name a capture group whose text is kept as
//! auxiliary data (a user name, a request path) for that occurrence.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Shown in place of auxiliary data when a rule's capture group is empty.
const EMPTY_DATA: &str = "-";

/// The outcome of classifying one line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    pub tag: String,
    pub data: Option<String>,
}

impl Classification {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }
}

/// Something that can label a log line.
///
/// Implementations must be deterministic, and a given tag must either always
/// or never carry data.
pub trait Classify {
    fn classify(&self, line: &str) -> Option<Classification>;
}

/// Capture group reference in a rule file: either an index or a name.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum DataGroup {
    Index(usize),
    Name(String),
}

/// A rule as written in a JSON rules file.
#[derive(Clone, Debug, Deserialize)]
pub struct RuleSpec {
    pub tag: String,
    pub pattern: String,
    #[serde(default)]
    pub data: Option<DataGroup>,
}

#[derive(Clone, Debug)]
struct Rule {
    tag: String,
    regex: Regex,
    data: Option<DataGroup>,
}

impl Rule {
    fn compile(spec: RuleSpec) -> Result<Rule> {
        if spec.tag.trim().is_empty() {
            return Err(Error::InvalidRules {
                tag: spec.tag,
                reason: "tag must not be empty".to_string(),
            });
        }
        let regex = Regex::new(&spec.pattern)?;
        match &spec.data {
            Some(DataGroup::Index(i)) if *i == 0 || *i >= regex.captures_len() => {
                return Err(Error::InvalidRules {
                    tag: spec.tag,
                    reason: format!("pattern has no capture group {}", i),
                });
            }
            Some(DataGroup::Name(name)) if !regex.capture_names().flatten().any(|n| n == name) => {
                return Err(Error::InvalidRules {
                    tag: spec.tag,
                    reason: format!("pattern has no capture group named '{}'", name),
                });
            }
            _ => {}
        }
        Ok(Rule {
            tag: spec.tag,
            regex,
            data: spec.data,
        })
    }

    fn apply(&self, line: &str) -> Option<Classification> {
        let group = match &self.data {
            None => {
                return self
                    .regex
                    .is_match(line)
                    .then(|| Classification::new(self.tag.clone()))
            }
            Some(group) => group,
        };
        let caps = self.regex.captures(line)?;
        let text = match group {
            DataGroup::Index(i) => caps.get(*i),
            DataGroup::Name(name) => caps.name(name),
        }
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(EMPTY_DATA);
        Some(Classification::new(self.tag.clone()).with_data(text))
    }
}

/// An ordered, first-match-wins set of classification rules.
#[derive(Clone, Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// A rule set that classifies nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Rules for common sshd, postfix and web server log lines.
    pub fn builtin() -> Self {
        let specs = [
            ("failed-password", r"Failed password for (?:invalid user )?(\S+) from", Some(1)),
            ("invalid-user", r"[Ii]nvalid user (\S*) from", Some(1)),
            ("max-auth-attempts", r"maximum authentication attempts exceeded for (?:invalid user )?(\S+)", Some(1)),
            ("accepted-login", r"Accepted \S+ for (\S+) from", Some(1)),
            ("preauth-disconnect", r"Connection (?:closed|reset) by .*\[preauth\]", None),
            ("bad-protocol", r"Bad protocol version identification", None),
            ("no-identification", r"Did not receive identification string", None),
            ("reverse-mapping", r"reverse mapping checking getaddrinfo", None),
            ("smtp-auth-failed", r"SASL \S+ authentication failed", None),
            ("relay-denied", r"Relay access denied", None),
            ("http-request", r#""(?:GET|POST|HEAD|PUT|DELETE|OPTIONS|PATCH|CONNECT) (\S+)"#, Some(1)),
        ];
        let rules = specs
            .into_iter()
            .map(|(tag, pattern, data)| Rule {
                tag: tag.to_string(),
                regex: Regex::new(pattern).expect("builtin rule must compile"),
                data: data.map(DataGroup::Index),
            })
            .collect();
        Self { rules }
    }

    /// Compile rules from their serialized form.
    pub fn from_specs(specs: Vec<RuleSpec>) -> Result<Self> {
        let rules = specs
            .into_iter()
            .map(Rule::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Load rules from a JSON file containing an array of
    /// `{"tag": ..., "pattern": ..., "data": <group>}` objects.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let specs: Vec<RuleSpec> = serde_json::from_reader(BufReader::new(file))?;
        Self::from_specs(specs)
    }

    /// Append another rule set; its rules are tried after ours.
    pub fn then(mut self, other: RuleSet) -> Self {
        self.rules.extend(other.rules);
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Classify for RuleSet {
    fn classify(&self, line: &str) -> Option<Classification> {
        self.rules.iter().find_map(|rule| rule.apply(line))
    }
}
