//! The address index: every address seen, by category and file.
//!
//! Input occurrences are aggregated into an [`AddressRecord`] holding the
//! occurrence count and what the classifier said about each occurrence.
//! White and black occurrences only keep a count.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use rustc_hash::FxHashMap;

use crate::classify::Classification;
use crate::error::{Error, Result};

/// Tag used for occurrences the classifier had nothing to say about.
pub const UNCLASSIFIED: &str = "unclassified";

/// The role a file plays in a run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    /// Log files whose addresses are reported.
    Input,
    /// Addresses known to be safe.
    White,
    /// Addresses that are already blocked.
    Black,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Input => "input",
            Category::White => "white",
            Category::Black => "black",
        }
    }

    /// White and black files are references: their addresses are excluded
    /// from the report rather than reported.
    pub fn is_reference(&self) -> bool {
        !matches!(self, Category::Input)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What is kept for one classification tag within a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagEntry {
    /// Occurrences that came without auxiliary data.
    Count(u64),
    /// Auxiliary data of each occurrence, in processing order.
    Samples(Vec<String>),
}

impl TagEntry {
    /// Number of occurrences this entry accounts for.
    pub fn occurrences(&self) -> u64 {
        match self {
            TagEntry::Count(n) => *n,
            TagEntry::Samples(items) => items.len() as u64,
        }
    }

    fn same_kind(&self, other: &TagEntry) -> bool {
        matches!(
            (self, other),
            (TagEntry::Count(_), TagEntry::Count(_)) | (TagEntry::Samples(_), TagEntry::Samples(_))
        )
    }

    fn absorb(&mut self, other: &TagEntry) {
        match (self, other) {
            (TagEntry::Count(a), TagEntry::Count(b)) => *a += b,
            (TagEntry::Samples(a), TagEntry::Samples(b)) => a.extend(b.iter().cloned()),
            _ => unreachable!("kinds are checked before absorbing"),
        }
    }
}

/// Aggregated occurrences of one address in one or more input files.
///
/// `n` always equals the sum of [`TagEntry::occurrences`] over `tags`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressRecord {
    addr: IpAddr,
    n: u64,
    tags: BTreeMap<String, TagEntry>,
}

impl AddressRecord {
    pub fn new(addr: IpAddr) -> Self {
        Self {
            addr,
            n: 0,
            tags: BTreeMap::new(),
        }
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// Total occurrences.
    pub fn n(&self) -> u64 {
        self.n
    }

    /// Per-tag data, ordered by tag name.
    pub fn tags(&self) -> &BTreeMap<String, TagEntry> {
        &self.tags
    }

    /// Record one occurrence. `None` files the occurrence as unclassified.
    ///
    /// A tag keeps the storage kind of its first occurrence; an occurrence of
    /// the other kind is rejected and leaves the record unchanged.
    pub fn add(&mut self, classification: Option<&Classification>) -> Result<()> {
        let (tag, data) = match classification {
            Some(c) => (c.tag.as_str(), c.data.as_deref()),
            None => (UNCLASSIFIED, None),
        };
        match (self.tags.entry(tag.to_string()), data) {
            (Entry::Vacant(slot), None) => {
                slot.insert(TagEntry::Count(1));
            }
            (Entry::Vacant(slot), Some(item)) => {
                slot.insert(TagEntry::Samples(vec![item.to_string()]));
            }
            (Entry::Occupied(mut slot), None) => match slot.get_mut() {
                TagEntry::Count(n) => *n += 1,
                TagEntry::Samples(_) => return Err(conflict(tag)),
            },
            (Entry::Occupied(mut slot), Some(item)) => match slot.get_mut() {
                TagEntry::Samples(items) => items.push(item.to_string()),
                TagEntry::Count(_) => return Err(conflict(tag)),
            },
        }
        self.n += 1;
        Ok(())
    }

    /// Fold `other` into this record.
    ///
    /// Counts add up and sample lists are concatenated with this record's
    /// samples first, so merging is commutative in counts but not in sample
    /// order. Records for different addresses, or a tag stored as a counter
    /// on one side and as samples on the other, are rejected before anything
    /// is modified.
    pub fn merge(&mut self, other: &AddressRecord) -> Result<()> {
        if self.addr != other.addr {
            return Err(Error::AddressMismatch {
                left: self.addr,
                right: other.addr,
            });
        }
        for (tag, theirs) in &other.tags {
            if let Some(ours) = self.tags.get(tag) {
                if !ours.same_kind(theirs) {
                    return Err(conflict(tag));
                }
            }
        }
        for (tag, theirs) in &other.tags {
            match self.tags.get_mut(tag) {
                Some(ours) => ours.absorb(theirs),
                None => {
                    self.tags.insert(tag.clone(), theirs.clone());
                }
            }
        }
        self.n += other.n;
        Ok(())
    }
}

fn conflict(tag: &str) -> Error {
    Error::TagKindConflict {
        tag: tag.to_string(),
    }
}

/// Everything known about one address, keyed by file display name.
#[derive(Clone, Debug, Default)]
pub struct AddressEntry {
    pub input: BTreeMap<String, AddressRecord>,
    pub white: BTreeMap<String, u64>,
    pub black: BTreeMap<String, u64>,
}

impl AddressEntry {
    /// Every (category, file) pair this address occurred in.
    pub fn files(&self) -> impl Iterator<Item = (Category, &str)> + '_ {
        let input = self.input.keys().map(|f| (Category::Input, f.as_str()));
        let white = self.white.keys().map(|f| (Category::White, f.as_str()));
        let black = self.black.keys().map(|f| (Category::Black, f.as_str()));
        input.chain(white).chain(black)
    }

    fn reference_mut(&mut self, category: Category) -> &mut BTreeMap<String, u64> {
        match category {
            Category::White => &mut self.white,
            Category::Black => &mut self.black,
            Category::Input => unreachable!("input occurrences are kept as records"),
        }
    }
}

/// Map of address → category → file → occurrences.
///
/// Entries are only ever created by the `record_*` methods; lookups never
/// insert.
#[derive(Clone, Debug, Default)]
pub struct AddressIndex {
    entries: FxHashMap<IpAddr, AddressEntry>,
}

impl AddressIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence of `addr` on an input line of `file`.
    pub fn record_input(
        &mut self,
        addr: IpAddr,
        file: &str,
        classification: Option<&Classification>,
    ) -> Result<()> {
        let entry = self.entries.entry(addr).or_default();
        if let Some(record) = entry.input.get_mut(file) {
            return record.add(classification);
        }
        let mut record = AddressRecord::new(addr);
        record.add(classification)?;
        entry.input.insert(file.to_string(), record);
        Ok(())
    }

    /// Record one occurrence of `addr` in a white or black file.
    ///
    /// # Panics
    ///
    /// If `category` is [`Category::Input`]; use [`AddressIndex::record_input`].
    pub fn record_reference(&mut self, addr: IpAddr, category: Category, file: &str) {
        let entry = self.entries.entry(addr).or_default();
        *entry
            .reference_mut(category)
            .entry(file.to_string())
            .or_insert(0) += 1;
    }

    pub fn get(&self, addr: &IpAddr) -> Option<&AddressEntry> {
        self.entries.get(addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IpAddr, &AddressEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total input occurrences of `addr` across all input files.
    pub fn input_total(&self, addr: &IpAddr) -> u64 {
        self.entries
            .get(addr)
            .map_or(0, |e| e.input.values().map(AddressRecord::n).sum())
    }

    /// One record combining every input file's record for `addr`.
    ///
    /// Files are merged in ascending name order, so sample order is
    /// deterministic: by file name, then by line within each file.
    pub fn combined_input(&self, addr: &IpAddr) -> Result<Option<AddressRecord>> {
        let Some(entry) = self.entries.get(addr) else {
            return Ok(None);
        };
        if entry.input.is_empty() {
            return Ok(None);
        }
        let mut combined = AddressRecord::new(*addr);
        for record in entry.input.values() {
            combined.merge(record)?;
        }
        Ok(Some(combined))
    }
}
