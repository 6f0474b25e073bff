use std::collections::BTreeMap;

use crate::index::Category;

/// Number of address occurrences contributed by each opened file.
///
/// Files are registered with a count of zero when they are opened, so a
/// file that was read but held no addresses stays visible as zero.
#[derive(Clone, Debug, Default)]
pub struct FileStatus {
    counts: BTreeMap<(Category, String), u64>,
}

impl FileStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note that a file was opened. Registering twice keeps the count.
    pub fn register(&mut self, category: Category, file: &str) {
        self.counts.entry((category, file.to_string())).or_insert(0);
    }

    /// Count one address occurrence, duplicates included.
    pub fn record(&mut self, category: Category, file: &str) {
        *self.counts.entry((category, file.to_string())).or_insert(0) += 1;
    }

    pub fn count(&self, category: Category, file: &str) -> Option<u64> {
        self.counts.get(&(category, file.to_string())).copied()
    }

    /// Files that were read but yielded no address.
    pub fn empties(&self) -> impl Iterator<Item = (Category, &str)> + '_ {
        self.counts
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|((category, file), _)| (*category, file.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &str, u64)> + '_ {
        self.counts
            .iter()
            .map(|((category, file), n)| (*category, file.as_str(), *n))
    }
}
