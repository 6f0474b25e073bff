//! The logparse library: collect IP addresses from log files, classify
//! each occurrence, drop addresses already known from white or black
//! lists, and report the rest.
//!
//! # Examples
//!
//! ```rust,no_run
//! use logparse::{ExtractorBuilder, Ingest, Primary, Report, ReportOptions, RuleSet, Source};
//!
//! # fn main() -> logparse::Result<()> {
//! let extractor = ExtractorBuilder::new().build()?;
//! let rules = RuleSet::builtin();
//! let mut ingest = Ingest::new(&extractor, &rules, Primary::First);
//! ingest.ingest_all(&[
//!     Source::input("/var/log/auth.log"),
//!     Source::black("/etc/blocked.txt"),
//! ])?;
//! let report = Report::build(&ingest.finish(), &ReportOptions::default(), None)?;
//! print!("{}", report.to_plain_string());
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod error;
pub mod extractor;
pub mod geo;
pub mod index;
pub mod ingest;
pub mod input;
pub mod report;
pub mod sets;
pub mod status;

pub use crate::classify::{Classification, Classify, RuleSet};
pub use crate::error::{Error, Result};
pub use crate::extractor::{Extractor, ExtractorBuilder, Primary};
pub use crate::geo::{Demographics, GeoLookup, MaxMindLookup, PlaceholderLookup};
pub use crate::index::{AddressIndex, AddressRecord, Category, TagEntry};
pub use crate::ingest::{Ingest, Ingested};
pub use crate::input::{FileOrStdin, Source};
pub use crate::report::{Report, ReportOptions, SortOrder, Verbosity};
