//! Ordering and rendering of the final report.

use std::cmp::Reverse;
use std::fmt::Write as _;
use std::io;
use std::net::IpAddr;

use termcolor::{Color, ColorSpec, NoColor, WriteColor};

use crate::error::Result;
use crate::geo::GeoLookup;
use crate::index::{AddressIndex, AddressRecord, TagEntry};
use crate::ingest::Ingested;
use crate::sets::{build_category_sets, build_output_set, remove_overlaps, OutputSet};

const REPORT_HEADER: &str = "## LogParse REPORT ##";
const BODY_HEADING: &str = "## MAIN BODY of OUTPUT ##";
const BODY_LEGEND: &str = "__ IP Address __  _ # _   _Line Type  +/- extra info";

/// How the addresses of the report are ordered.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending numeric address.
    #[default]
    Address,
    /// Descending total count, ties broken by ascending address.
    Frequency,
}

/// How much is shown per address: 0 the address, 1 adds the count, 2 adds
/// the per-tag breakdown.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Verbosity(u8);

impl Verbosity {
    pub const MAX: u8 = 2;

    /// From a repeated flag count; anything above the maximum is capped.
    pub fn from_count(count: u8) -> Self {
        Verbosity(count.min(Self::MAX))
    }

    pub fn level(self) -> u8 {
        self.0
    }

    fn shows_count(self) -> bool {
        self.0 >= 1
    }

    fn shows_tags(self) -> bool {
        self.0 >= 2
    }
}

#[derive(Clone, Debug, Default)]
pub struct ReportOptions {
    pub verbosity: Verbosity,
    pub demographics: bool,
    /// Suppress the opened-files list, access errors and empty-file notices.
    pub quiet: bool,
    /// Include the white/black overlap notice.
    pub verbose: bool,
    pub order: SortOrder,
}

/// Sort the output set for rendering.
pub fn order_addresses(output: &OutputSet, index: &AddressIndex, order: SortOrder) -> Vec<IpAddr> {
    let mut addrs: Vec<IpAddr> = output.iter().copied().collect();
    match order {
        SortOrder::Address => addrs.sort_unstable(),
        SortOrder::Frequency => {
            addrs.sort_unstable_by_key(|addr| (Reverse(index.input_total(addr)), *addr))
        }
    }
    addrs
}

/// Render one address block.
pub fn render_record(
    record: &AddressRecord,
    verbosity: Verbosity,
    geo: Option<&dyn GeoLookup>,
) -> String {
    let mut out = String::new();
    let addr = record.addr().to_string();
    if verbosity.shows_count() {
        let _ = writeln!(out, "{:<16}  {:>5}", addr, record.n());
    } else {
        let _ = writeln!(out, "{}", addr);
    }
    if let Some(geo) = geo {
        let found = geo.lookup(record.addr());
        let _ = writeln!(out, "\t{}  {}", found.country, found.city);
    }
    if verbosity.shows_tags() {
        for (tag, entry) in record.tags() {
            let _ = writeln!(out, "{:>33}:  {}", tag, entry.occurrences());
            if let TagEntry::Samples(items) = entry {
                for item in items {
                    let _ = writeln!(out, "{:>36}{}", "", item);
                }
            }
        }
    }
    out
}

struct Section {
    heading: String,
    color: Option<Color>,
    body: String,
}

/// A rendered report, ready to be written with or without color.
pub struct Report {
    sections: Vec<Section>,
    /// Addresses in the main body, in rendered order.
    pub addresses: Vec<IpAddr>,
}

impl Report {
    /// Derive sets from the ingested index, drop white/black overlaps, and
    /// render everything the options ask for.
    pub fn build(
        ingested: &Ingested,
        opts: &ReportOptions,
        geo: Option<&dyn GeoLookup>,
    ) -> Result<Report> {
        let index = &ingested.index;
        let geo = if opts.demographics { geo } else { None };
        let mut sections = Vec::new();

        if !opts.quiet {
            if !ingested.opened.is_empty() {
                let mut body = String::new();
                for (_, name) in &ingested.opened {
                    let _ = writeln!(body, "\t{}", name);
                }
                sections.push(Section {
                    heading: "The following files were successfully opened for input:".to_string(),
                    color: None,
                    body,
                });
            }
            if !ingested.access_errors.is_empty() {
                let mut body = String::new();
                for err in &ingested.access_errors {
                    let _ = writeln!(body, "'{}' (of type '{}'): {}", err.name, err.category, err.message);
                }
                body.push_str("End of file access errors report.\n");
                sections.push(Section {
                    heading: "FILE ACCESS ERRORS:".to_string(),
                    color: Some(Color::Red),
                    body,
                });
            }
            let mut empties = ingested.status.empties().peekable();
            if empties.peek().is_some() {
                let mut body = String::new();
                for (category, name) in empties {
                    let _ = writeln!(body, "\t'{}' (of type '{}')", name, category);
                }
                sections.push(Section {
                    heading: "FILES WITHOUT IP ADDRESS".to_string(),
                    color: Some(Color::Yellow),
                    body,
                });
            }
        }

        let sets = build_category_sets(index);
        let mut output = build_output_set(&sets);
        let overlaps = remove_overlaps(&sets, &mut output);
        tracing::debug!(
            candidates = output.len() + overlaps.removed.len(),
            removed = overlaps.removed.len(),
            "resolved white/black overlaps"
        );

        if opts.verbose && !overlaps.is_empty() {
            let mut body = overlaps.to_string();
            if opts.verbosity.shows_count() || geo.is_some() {
                body.push_str("Requested details follow:\n");
                for addr in &overlaps.removed {
                    if let Some(record) = index.combined_input(addr)? {
                        body.push_str(&render_record(&record, opts.verbosity, geo));
                    }
                }
            }
            sections.push(Section {
                heading: "REMOVED WHITE/BLACK LISTED ADDRESSES".to_string(),
                color: Some(Color::Cyan),
                body,
            });
        }

        let addresses = order_addresses(&output, index, opts.order);
        let mut body = String::new();
        body.push_str(BODY_LEGEND);
        body.push('\n');
        for addr in &addresses {
            if let Some(record) = index.combined_input(addr)? {
                body.push_str(&render_record(&record, opts.verbosity, geo));
            }
        }
        sections.push(Section {
            heading: BODY_HEADING.to_string(),
            color: Some(Color::Green),
            body,
        });

        Ok(Report {
            sections,
            addresses,
        })
    }

    /// Write the report; headings are colored if the writer supports it.
    pub fn write<W: WriteColor + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{}", REPORT_HEADER)?;
        for section in &self.sections {
            writeln!(out)?;
            let mut spec = ColorSpec::new();
            spec.set_bold(true).set_fg(section.color);
            out.set_color(&spec)?;
            write!(out, "{}", section.heading)?;
            out.reset()?;
            writeln!(out)?;
            out.write_all(section.body.as_bytes())?;
        }
        out.flush()
    }

    /// The report as plain text.
    pub fn to_plain_string(&self) -> String {
        let mut out = NoColor::new(Vec::new());
        // Writing into memory cannot fail.
        let _ = self.write(&mut out);
        String::from_utf8_lossy(&out.into_inner()).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classification;
    use crate::geo::{Demographics, PLACEHOLDER};
    use crate::index::Category;
    use crate::status::FileStatus;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn output_of(addrs: &[&str]) -> OutputSet {
        addrs.iter().map(|s| ip(s)).collect()
    }

    #[test]
    fn address_order_is_numeric() {
        let index = AddressIndex::new();
        let output = output_of(&["1.2.3.40", "1.2.3.5", "1.2.3.4", "10.0.0.1", "9.0.0.1"]);
        let ordered = order_addresses(&output, &index, SortOrder::Address);
        assert_eq!(
            ordered,
            vec![ip("1.2.3.4"), ip("1.2.3.5"), ip("1.2.3.40"), ip("9.0.0.1"), ip("10.0.0.1")]
        );
    }

    #[test]
    fn frequency_order_breaks_ties_numerically() {
        let mut index = AddressIndex::new();
        for (addr, times) in [("1.1.1.20", 5), ("1.1.1.3", 5), ("1.1.1.1", 1)] {
            for _ in 0..times {
                index.record_input(ip(addr), "f", None).unwrap();
            }
        }
        let output = output_of(&["1.1.1.1", "1.1.1.20", "1.1.1.3"]);
        let ordered = order_addresses(&output, &index, SortOrder::Frequency);
        assert_eq!(ordered, vec![ip("1.1.1.3"), ip("1.1.1.20"), ip("1.1.1.1")]);
    }

    #[test]
    fn frequency_counts_span_files() {
        let mut index = AddressIndex::new();
        index.record_input(ip("2.2.2.2"), "a", None).unwrap();
        index.record_input(ip("2.2.2.2"), "b", None).unwrap();
        index.record_input(ip("1.1.1.1"), "a", None).unwrap();
        let output = output_of(&["1.1.1.1", "2.2.2.2"]);
        let ordered = order_addresses(&output, &index, SortOrder::Frequency);
        assert_eq!(ordered, vec![ip("2.2.2.2"), ip("1.1.1.1")]);
    }

    fn sample_record() -> AddressRecord {
        let mut record = AddressRecord::new(ip("10.0.0.5"));
        let failed = Classification::new("failed-password").with_data("root");
        record.add(Some(&failed)).unwrap();
        record.add(Some(&Classification::new("failed-password").with_data("admin"))).unwrap();
        record.add(None).unwrap();
        record.add(Some(&Classification::new("bad-protocol"))).unwrap();
        record
    }

    #[test]
    fn verbosity_levels() {
        let record = sample_record();
        assert_eq!(render_record(&record, Verbosity::from_count(0), None), "10.0.0.5\n");

        let one = render_record(&record, Verbosity::from_count(1), None);
        assert_eq!(one.lines().count(), 1);
        assert_eq!(one.split_whitespace().collect::<Vec<_>>(), vec!["10.0.0.5", "4"]);

        let two = render_record(&record, Verbosity::from_count(2), None);
        let lines: Vec<&str> = two.lines().map(str::trim).collect();
        assert_eq!(
            lines,
            vec![
                lines[0],
                "bad-protocol:  1",
                "failed-password:  2",
                "root",
                "admin",
                "unclassified:  1",
            ]
        );
    }

    #[test]
    fn verbosity_is_capped() {
        assert_eq!(Verbosity::from_count(7).level(), 2);
    }

    struct FixedLookup;

    impl GeoLookup for FixedLookup {
        fn lookup(&self, _ip: IpAddr) -> Demographics {
            Demographics {
                country: "Sweden".to_string(),
                city: PLACEHOLDER.to_string(),
            }
        }
    }

    #[test]
    fn demographics_line_follows_header() {
        let record = sample_record();
        let text = render_record(&record, Verbosity::from_count(0), Some(&FixedLookup));
        assert_eq!(text, "10.0.0.5\n\tSweden  -\n");
    }

    fn scenario() -> Ingested {
        let mut index = AddressIndex::new();
        let mut status = FileStatus::new();
        status.register(Category::Input, "in.log");
        status.register(Category::Black, "black.txt");
        status.register(Category::White, "empty.txt");
        for addr in ["10.0.0.5", "10.0.0.5", "192.168.1.1"] {
            index.record_input(ip(addr), "in.log", None).unwrap();
            status.record(Category::Input, "in.log");
        }
        index.record_reference(ip("192.168.1.1"), Category::Black, "black.txt");
        status.record(Category::Black, "black.txt");
        Ingested {
            index,
            status,
            opened: vec![
                (Category::Input, "in.log".to_string()),
                (Category::White, "empty.txt".to_string()),
                (Category::Black, "black.txt".to_string()),
            ],
            access_errors: Vec::new(),
        }
    }

    fn body_of(text: &str) -> &str {
        &text[text.find(BODY_HEADING).unwrap()..]
    }

    #[test]
    fn overlaps_never_reach_the_body() {
        let opts = ReportOptions {
            verbosity: Verbosity::from_count(1),
            verbose: true,
            ..Default::default()
        };
        let report = Report::build(&scenario(), &opts, None).unwrap();
        assert_eq!(report.addresses, vec![ip("10.0.0.5")]);

        let text = report.to_plain_string();
        assert!(text.starts_with(REPORT_HEADER));
        assert!(text.contains("Contents of file 'black.txt' (type 'black')"));
        assert!(text.contains("Requested details follow:"));
        assert!(text.contains("\t'empty.txt' (of type 'white')"));

        let body = body_of(&text);
        assert!(!body.contains("192.168.1.1"));
        let row = body
            .lines()
            .find(|l| l.starts_with("10.0.0.5"))
            .unwrap();
        assert_eq!(row.split_whitespace().collect::<Vec<_>>(), vec!["10.0.0.5", "2"]);
    }

    #[test]
    fn quiet_and_terse_report() {
        let opts = ReportOptions {
            quiet: true,
            ..Default::default()
        };
        let text = Report::build(&scenario(), &opts, None)
            .unwrap()
            .to_plain_string();
        assert!(!text.contains("successfully opened"));
        assert!(!text.contains("FILES WITHOUT IP ADDRESS"));
        assert!(!text.contains("192.168.1.1"));
        assert!(body_of(&text).lines().any(|l| l == "10.0.0.5"));
    }

    #[test]
    fn demographics_need_the_flag() {
        let opts = ReportOptions::default();
        let text = Report::build(&scenario(), &opts, Some(&FixedLookup))
            .unwrap()
            .to_plain_string();
        assert!(!text.contains("Sweden"));

        let opts = ReportOptions {
            demographics: true,
            ..Default::default()
        };
        let text = Report::build(&scenario(), &opts, Some(&FixedLookup))
            .unwrap()
            .to_plain_string();
        assert!(body_of(&text).contains("\tSweden  -\n"));
    }
}
