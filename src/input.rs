use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};

use camino::{Utf8Path, Utf8PathBuf};

use crate::index::Category;

/// A source that can be either a file or stdin.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub enum FileOrStdin {
    /// Input from a file.
    File(Utf8PathBuf),
    /// Input from stdin.
    #[default]
    Stdin,
}

impl fmt::Display for FileOrStdin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOrStdin::File(path) => write!(f, "{}", path),
            FileOrStdin::Stdin => write!(f, "<stdin>"),
        }
    }
}

impl FileOrStdin {
    /// Create a new FileOrStdin from a path.
    ///
    /// If the path is "-", stdin is used.
    pub fn from_path(path: Utf8PathBuf) -> Self {
        if path.as_str() == "-" {
            FileOrStdin::Stdin
        } else {
            FileOrStdin::File(path)
        }
    }

    /// Open the source for sequential reading.
    pub fn reader(&self) -> io::Result<InputReader> {
        match self {
            FileOrStdin::File(path) => Ok(InputReader::File(File::open(path)?)),
            FileOrStdin::Stdin => Ok(InputReader::Stdin(io::stdin())),
        }
    }
}

/// A reader for input from either a file or stdin.
///
/// Unbuffered; callers read through a line buffer.
pub enum InputReader {
    File(File),
    Stdin(io::Stdin),
}

impl Read for InputReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            InputReader::File(f) => f.read(buf),
            InputReader::Stdin(s) => s.read(buf),
        }
    }
}

/// A file to ingest and the role it plays.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Source {
    pub category: Category,
    pub input: FileOrStdin,
}

impl Source {
    pub fn new(category: Category, input: FileOrStdin) -> Self {
        Self { category, input }
    }

    pub fn input(path: impl Into<Utf8PathBuf>) -> Self {
        Self::new(Category::Input, FileOrStdin::from_path(path.into()))
    }

    pub fn white(path: impl Into<Utf8PathBuf>) -> Self {
        Self::new(Category::White, FileOrStdin::from_path(path.into()))
    }

    pub fn black(path: impl Into<Utf8PathBuf>) -> Self {
        Self::new(Category::Black, FileOrStdin::from_path(path.into()))
    }

    /// Name used for this source in the index and in reports.
    pub fn name(&self) -> String {
        self.input.to_string()
    }
}

/// Regular files directly inside `dir` whose name contains "log",
/// sorted by path.
pub fn log_files_in(dir: &Utf8Path) -> io::Result<Vec<Utf8PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        match Utf8PathBuf::from_path_buf(entry.path()) {
            Ok(path) => {
                if path.file_name().is_some_and(|name| name.contains("log")) {
                    found.push(path);
                }
            }
            Err(path) => {
                tracing::warn!(path = %path.display(), "skipping non UTF-8 file name");
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Assemble the ordered source list for a run: inputs (explicit files, then
/// log directory files), then white files, then black files. Without any
/// input, stdin is read.
pub fn collect_sources(
    inputs: &[Utf8PathBuf],
    logdirs: &[Utf8PathBuf],
    white: &[Utf8PathBuf],
    black: &[Utf8PathBuf],
) -> io::Result<Vec<Source>> {
    let mut sources: Vec<Source> = inputs.iter().cloned().map(Source::input).collect();
    for dir in logdirs {
        sources.extend(log_files_in(dir)?.into_iter().map(Source::input));
    }
    if sources.is_empty() {
        sources.push(Source::new(Category::Input, FileOrStdin::Stdin));
    }
    sources.extend(white.iter().cloned().map(Source::white));
    sources.extend(black.iter().cloned().map(Source::black));
    Ok(sources)
}
