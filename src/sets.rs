//! Per-file address sets, the output set, and white/black overlap removal.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use rustc_hash::FxHashSet;

use crate::index::{AddressIndex, Category};

/// Distinct addresses per (category, file).
pub type CategorySets = BTreeMap<(Category, String), FxHashSet<IpAddr>>;

/// Addresses destined for the report.
pub type OutputSet = FxHashSet<IpAddr>;

/// Group every address of the index by the (category, file) pairs it
/// occurred in.
pub fn build_category_sets(index: &AddressIndex) -> CategorySets {
    let mut sets = CategorySets::new();
    for (addr, entry) in index.iter() {
        for (category, file) in entry.files() {
            sets.entry((category, file.to_string()))
                .or_default()
                .insert(*addr);
        }
    }
    sets
}

/// Union of every input file's set. Addresses only found in white or black
/// files are not part of it.
pub fn build_output_set(sets: &CategorySets) -> OutputSet {
    sets.iter()
        .filter(|((category, _), _)| *category == Category::Input)
        .flat_map(|(_, set)| set.iter().copied())
        .collect()
}

/// Addresses removed from the output set, listed per offending file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OverlapReport {
    /// Each white/black file with at least one overlap, and its overlapping
    /// addresses in ascending order.
    pub by_file: BTreeMap<(Category, String), Vec<IpAddr>>,
    /// Every removed address, ascending, each once.
    pub removed: Vec<IpAddr>,
}

impl OverlapReport {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
    }
}

impl fmt::Display for OverlapReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        writeln!(
            f,
            "The following IP addresses are being removed from the output\n \
             because they appear in white or black input files as shown:"
        )?;
        for ((category, file), addrs) in &self.by_file {
            writeln!(f, "#     Contents of file '{}' (type '{}'):", file, category)?;
            for addr in addrs {
                writeln!(f, "        {}", addr)?;
            }
        }
        Ok(())
    }
}

/// Remove from `output` every address that also occurs in a white or black
/// file, and report what was removed where.
pub fn remove_overlaps(sets: &CategorySets, output: &mut OutputSet) -> OverlapReport {
    let mut report = OverlapReport::default();
    let mut overlaps = FxHashSet::default();
    for ((category, file), set) in sets {
        if !category.is_reference() {
            continue;
        }
        let mut common: Vec<IpAddr> = set.intersection(output).copied().collect();
        if common.is_empty() {
            continue;
        }
        common.sort_unstable();
        overlaps.extend(common.iter().copied());
        report.by_file.insert((*category, file.clone()), common);
    }
    output.retain(|addr| !overlaps.contains(addr));
    report.removed = overlaps.into_iter().collect();
    report.removed.sort_unstable();
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn sample_index() -> AddressIndex {
        let mut index = AddressIndex::new();
        for (addr, file) in [
            ("10.0.0.5", "a.log"),
            ("10.0.0.5", "a.log"),
            ("192.168.1.1", "a.log"),
            ("9.9.9.9", "b.log"),
            ("172.16.0.1", "b.log"),
        ] {
            index.record_input(ip(addr), file, None).unwrap();
        }
        index.record_reference(ip("192.168.1.1"), Category::Black, "black.txt");
        index.record_reference(ip("192.168.1.1"), Category::White, "white.txt");
        index.record_reference(ip("9.9.9.9"), Category::White, "white.txt");
        index.record_reference(ip("8.8.8.8"), Category::White, "white.txt");
        index
    }

    #[test]
    fn category_sets_per_file() {
        let sets = build_category_sets(&sample_index());
        assert_eq!(sets.len(), 4);
        assert_eq!(sets[&(Category::Input, "a.log".to_string())].len(), 2);
        assert_eq!(sets[&(Category::White, "white.txt".to_string())].len(), 3);
    }

    #[test]
    fn output_set_excludes_reference_only_addresses() {
        let sets = build_category_sets(&sample_index());
        let output = build_output_set(&sets);
        assert_eq!(output.len(), 4);
        assert!(!output.contains(&ip("8.8.8.8")));
    }

    #[test]
    fn overlaps_are_removed_once_and_listed_per_file() {
        let sets = build_category_sets(&sample_index());
        let mut output = build_output_set(&sets);
        let report = remove_overlaps(&sets, &mut output);

        let mut left: Vec<_> = output.into_iter().collect();
        left.sort();
        assert_eq!(left, vec![ip("10.0.0.5"), ip("172.16.0.1")]);

        assert_eq!(report.removed, vec![ip("9.9.9.9"), ip("192.168.1.1")]);
        assert_eq!(
            report.by_file[&(Category::Black, "black.txt".to_string())],
            vec![ip("192.168.1.1")]
        );
        assert_eq!(
            report.by_file[&(Category::White, "white.txt".to_string())],
            vec![ip("9.9.9.9"), ip("192.168.1.1")]
        );
    }

    #[test]
    fn overlap_notice_names_files() {
        let sets = build_category_sets(&sample_index());
        let mut output = build_output_set(&sets);
        let text = remove_overlaps(&sets, &mut output).to_string();
        assert!(text.contains("Contents of file 'black.txt' (type 'black')"));
        assert!(text.contains("        192.168.1.1\n"));
        let white = text.find("white.txt").unwrap();
        assert!(text[white..].find("9.9.9.9") < text[white..].find("192.168.1.1"));
    }

    #[test]
    fn no_references_no_report() {
        let mut index = AddressIndex::new();
        index.record_input(ip("1.1.1.1"), "in", None).unwrap();
        let sets = build_category_sets(&index);
        let mut output = build_output_set(&sets);
        let report = remove_overlaps(&sets, &mut output);
        assert!(report.is_empty());
        assert_eq!(report.to_string(), "");
        assert_eq!(output.len(), 1);
    }
}
