use std::net::IpAddr;

/// Error types for the logparse library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A classification tag was stored both as a counter and as a list of
    /// samples within the same record.
    #[error("tag '{tag}' mixes counted and sampled occurrences")]
    TagKindConflict { tag: String },

    /// Two records for different addresses were combined.
    #[error("cannot merge record for {right} into record for {left}")]
    AddressMismatch { left: IpAddr, right: IpAddr },

    /// None of the input sources could be read.
    #[error("no input could be read ({failed} source(s) failed to open)")]
    NoInput { failed: usize },

    /// A classification rule file is malformed.
    #[error("invalid classification rule '{tag}': {reason}")]
    InvalidRules { tag: String, reason: String },

    /// A classification rule pattern failed to compile.
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// An address pattern failed to parse.
    #[error("pattern error: {0}")]
    Syntax(#[from] regex_syntax::Error),

    /// The address extractor could not be built.
    #[error("extractor error: {0}")]
    Extractor(#[from] regex_automata::meta::BuildError),

    /// The extractor was configured without any address family.
    #[error("no IP patterns selected")]
    NoPatterns,

    /// A rules file is not valid JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results using the library error.
pub type Result<T> = std::result::Result<T, Error>;
