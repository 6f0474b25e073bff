//! Line-by-line ingestion of input and reference files.

use bstr::ByteSlice;
use ripline::{
    line_buffer::{LineBufferBuilder, LineBufferReader},
    lines::LineIter,
};

use crate::classify::Classify;
use crate::error::{Error, Result};
use crate::extractor::{Extractor, Primary};
use crate::index::{AddressIndex, Category};
use crate::input::Source;
use crate::status::FileStatus;

/// A file that could not be opened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessError {
    pub category: Category,
    pub name: String,
    pub message: String,
}

/// Mutable state of the ingestion phase.
pub struct Ingest<'a, C: Classify> {
    extractor: &'a Extractor,
    classifier: &'a C,
    primary: Primary,
    index: AddressIndex,
    status: FileStatus,
    opened: Vec<(Category, String)>,
    access_errors: Vec<AccessError>,
}

/// The outcome of ingestion, read-only from here on.
#[derive(Clone, Debug, Default)]
pub struct Ingested {
    pub index: AddressIndex,
    pub status: FileStatus,
    /// Sources that were read, in processing order.
    pub opened: Vec<(Category, String)>,
    pub access_errors: Vec<AccessError>,
}

impl<'a, C: Classify> Ingest<'a, C> {
    pub fn new(extractor: &'a Extractor, classifier: &'a C, primary: Primary) -> Self {
        Self {
            extractor,
            classifier,
            primary,
            index: AddressIndex::new(),
            status: FileStatus::new(),
            opened: Vec::new(),
            access_errors: Vec::new(),
        }
    }

    /// Process one line of a file. Blank lines are ignored.
    pub fn process_line(&mut self, line: &[u8], category: Category, file: &str) -> Result<()> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        let found = self.extractor.addresses(line);
        if found.is_empty() {
            return Ok(());
        }
        match category {
            Category::Input => {
                let text = line.to_str_lossy();
                let classification = self.classifier.classify(&text);
                for addr in self.primary.select(found) {
                    self.index
                        .record_input(addr, file, classification.as_ref())?;
                    self.status.record(category, file);
                }
            }
            Category::White | Category::Black => {
                for addr in found {
                    self.index.record_reference(addr, category, file);
                    self.status.record(category, file);
                }
            }
        }
        Ok(())
    }

    /// Read a whole source. A source that cannot be opened is remembered as
    /// an access error and skipped; a failure while reading is returned.
    pub fn ingest_source(&mut self, source: &Source) -> Result<()> {
        let name = source.name();
        let reader = match source.input.reader() {
            Ok(reader) => reader,
            Err(err) => {
                tracing::warn!(file = %name, category = %source.category, error = %err, "cannot open");
                self.access_errors.push(AccessError {
                    category: source.category,
                    name,
                    message: err.to_string(),
                });
                return Ok(());
            }
        };
        self.status.register(source.category, &name);

        let mut line_buffer = LineBufferBuilder::new().capacity(65536).build();
        let mut lb_reader = LineBufferReader::new(reader, &mut line_buffer);
        let mut lines = 0usize;
        while lb_reader.fill()? {
            for line in LineIter::new(b'\n', lb_reader.buffer()) {
                self.process_line(line, source.category, &name)?;
                lines += 1;
            }
            lb_reader.consume_all();
        }

        tracing::debug!(
            file = %name,
            category = %source.category,
            lines,
            addresses = self.status.count(source.category, &name).unwrap_or(0),
            "ingested"
        );
        self.opened.push((source.category, name));
        Ok(())
    }

    /// Ingest every source in order.
    ///
    /// Fails with [`Error::NoInput`] when input sources were given but none
    /// of them could be opened. Stdin always opens, so reading it never
    /// counts as a failure: a closed or empty stdin gives an empty report.
    pub fn ingest_all(&mut self, sources: &[Source]) -> Result<()> {
        for source in sources {
            self.ingest_source(source)?;
        }
        let wanted = sources
            .iter()
            .filter(|s| s.category == Category::Input)
            .count();
        let read = self
            .opened
            .iter()
            .filter(|(category, _)| *category == Category::Input)
            .count();
        if wanted > 0 && read == 0 {
            return Err(Error::NoInput { failed: wanted });
        }
        Ok(())
    }

    pub fn index(&self) -> &AddressIndex {
        &self.index
    }

    pub fn status(&self) -> &FileStatus {
        &self.status
    }

    pub fn finish(self) -> Ingested {
        Ingested {
            index: self.index,
            status: self.status,
            opened: self.opened,
            access_errors: self.access_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Classification, RuleSet};
    use crate::extractor::ExtractorBuilder;
    use crate::index::TagEntry;
    use std::net::IpAddr;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn input_lines_are_classified() {
        let extractor = ExtractorBuilder::new().build().unwrap();
        let rules = RuleSet::builtin();
        let mut ingest = Ingest::new(&extractor, &rules, Primary::First);
        let lines: [&[u8]; 3] = [
            b"sshd[1]: Failed password for root from 1.2.3.4 port 22 ssh2\n",
            b"sshd[1]: Failed password for admin from 1.2.3.4 port 22 ssh2\n",
            b"attempt from 1.2.3.4 failed\n",
        ];
        for line in lines {
            ingest.process_line(line, Category::Input, "auth.log").unwrap();
        }
        let record = &ingest.index().get(&ip("1.2.3.4")).unwrap().input["auth.log"];
        assert_eq!(record.n(), 3);
        assert_eq!(
            record.tags()["failed-password"],
            TagEntry::Samples(vec!["root".to_string(), "admin".to_string()])
        );
        assert_eq!(record.tags()["unclassified"], TagEntry::Count(1));
        assert_eq!(ingest.status().count(Category::Input, "auth.log"), Some(3));
    }

    #[test]
    fn primary_rule_only_narrows_input_lines() {
        let extractor = ExtractorBuilder::new().build().unwrap();
        let rules = RuleSet::empty();
        let mut ingest = Ingest::new(&extractor, &rules, Primary::Second);
        let line = b"reverse 5.5.5.5 [6.6.6.6] failed";
        ingest.process_line(line, Category::Input, "in").unwrap();
        ingest.process_line(line, Category::White, "w").unwrap();

        assert!(ingest.index().get(&ip("5.5.5.5")).unwrap().input.is_empty());
        assert_eq!(ingest.index().input_total(&ip("6.6.6.6")), 1);
        assert_eq!(ingest.index().get(&ip("5.5.5.5")).unwrap().white["w"], 1);
        assert_eq!(ingest.status().count(Category::White, "w"), Some(2));
    }

    struct Inconsistent;

    impl Classify for Inconsistent {
        fn classify(&self, line: &str) -> Option<Classification> {
            let c = Classification::new("flaky");
            Some(if line.contains("sampled") { c.with_data("x") } else { c })
        }
    }

    #[test]
    fn inconsistent_classifier_fails_fast() {
        let extractor = ExtractorBuilder::new().build().unwrap();
        let mut ingest = Ingest::new(&extractor, &Inconsistent, Primary::First);
        ingest.process_line(b"1.1.1.1 sampled", Category::Input, "f").unwrap();
        let err = ingest
            .process_line(b"1.1.1.1 counted", Category::Input, "f")
            .unwrap_err();
        assert!(matches!(err, Error::TagKindConflict { .. }));
    }

    #[test]
    fn missing_file_is_recorded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.log");
        std::fs::write(&present, "from 10.0.0.1\n").unwrap();
        let present = present.to_str().unwrap().to_string();
        let missing = dir.path().join("missing.log").to_str().unwrap().to_string();

        let extractor = ExtractorBuilder::new().build().unwrap();
        let rules = RuleSet::empty();
        let mut ingest = Ingest::new(&extractor, &rules, Primary::First);
        ingest
            .ingest_all(&[Source::input(missing.as_str()), Source::input(present.as_str())])
            .unwrap();
        let done = ingest.finish();
        assert_eq!(done.access_errors.len(), 1);
        assert_eq!(done.access_errors[0].name, missing);
        assert_eq!(done.opened, vec![(Category::Input, present)]);
        assert_eq!(done.index.input_total(&ip("10.0.0.1")), 1);
    }

    #[test]
    fn no_readable_input_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.log").to_str().unwrap().to_string();
        let extractor = ExtractorBuilder::new().build().unwrap();
        let rules = RuleSet::empty();
        let mut ingest = Ingest::new(&extractor, &rules, Primary::First);
        let err = ingest.ingest_all(&[Source::input(missing.as_str())]).unwrap_err();
        assert!(matches!(err, Error::NoInput { failed: 1 }));
    }

    #[test]
    fn file_without_addresses_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boring.log");
        std::fs::write(&path, "nothing here\n\nstill nothing\n").unwrap();
        let name = path.to_str().unwrap().to_string();

        let extractor = ExtractorBuilder::new().build().unwrap();
        let rules = RuleSet::empty();
        let mut ingest = Ingest::new(&extractor, &rules, Primary::First);
        ingest.ingest_all(&[Source::input(name.as_str())]).unwrap();
        let done = ingest.finish();
        assert_eq!(
            done.status.empties().collect::<Vec<_>>(),
            vec![(Category::Input, name.as_str())]
        );
        assert!(done.index.is_empty());
    }
}
