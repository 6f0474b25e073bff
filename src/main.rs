use anyhow::{Context, Error, Result};
use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use std::fs::File;
use std::io::{self, BufWriter, IsTerminal, Write};
use std::process::ExitCode;
use termcolor::{BufferedStandardStream, ColorChoice, NoColor};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use logparse::{
    input, ExtractorBuilder, GeoLookup, Ingest, MaxMindLookup, PlaceholderLookup, Primary,
    Report, ReportOptions, RuleSet, SortOrder, Verbosity,
};

/// Check if the error chain contains a broken pipe error.
#[inline(always)]
fn is_broken_pipe(err: &Error) -> bool {
    for cause in err.chain() {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::BrokenPipe {
                return true;
            }
        }
    }
    false
}

/// Collect the IP addresses found in log files into a report suitable for
/// feeding address filtering tools. Addresses found in white or black files
/// are left out of the report.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// How much to report about each address: -r adds the number of
    /// appearances, -rr also lists the type of each appearance and any
    /// extra information
    #[clap(short = 'r', action = clap::ArgAction::Count)]
    report: u8,

    /// Include the location/origin of each address if possible
    #[clap(short, long)]
    demographics: bool,

    /// Suppress the list of opened files, file access errors and files
    /// devoid of addresses
    #[clap(short, long)]
    quiet: bool,

    /// Report white or black listed addresses that were removed from the output
    #[clap(short, long)]
    verbose: bool,

    /// Sort by frequency of appearance instead of by address
    #[clap(short, long)]
    frequency: bool,

    /// Files containing white listed addresses
    #[clap(short, long, value_name = "WFILE", num_args = 1.., value_hint = clap::ValueHint::FilePath)]
    white: Vec<Utf8PathBuf>,

    /// Files containing black listed addresses
    #[clap(short, long, value_name = "BFILE", num_args = 1.., value_hint = clap::ValueHint::FilePath)]
    black: Vec<Utf8PathBuf>,

    /// Input (log) files. Without any, stdin is read; "-" also means stdin
    #[clap(short, long, value_name = "IFILE", num_args = 1.., value_hint = clap::ValueHint::FilePath)]
    input: Vec<Utf8PathBuf>,

    /// Directories whose files with "log" in their name are added to the inputs
    #[clap(short, long, value_name = "DIR", num_args = 1.., value_hint = clap::ValueHint::DirPath)]
    logdir: Vec<Utf8PathBuf>,

    /// Write the report here instead of stdout
    #[clap(short, long, value_name = "OFILE", value_hint = clap::ValueHint::FilePath)]
    output: Option<Utf8PathBuf>,

    /// Which address of a multi-address input line is counted
    #[clap(long, value_enum, default_value_t = Primary::First)]
    primary: Primary,

    /// JSON file of extra classification rules, tried before the built-in ones
    #[clap(long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    rules: Option<Utf8PathBuf>,

    /// Only look for IPv4 addresses
    #[clap(short = '4', long)]
    ipv4_only: bool,

    /// Directory containing GeoLite2-City.mmdb, used with --demographics
    #[clap(
        short = 'I',
        value_name = "DIR",
        value_hint = clap::ValueHint::DirPath,
        env = "GEOIP_MMDB_DIR"
    )]
    include: Option<Utf8PathBuf>,

    /// Use color for report headings
    #[clap(short = 'C', long, value_enum, default_value_t = ArgsColorChoice::Auto)]
    color: ArgsColorChoice,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
enum ArgsColorChoice {
    Always,
    Never,
    Auto,
}

fn main() -> ExitCode {
    let err = match run_main() {
        Ok(code) => return code,
        Err(err) => err,
    };

    if is_broken_pipe(&err) {
        return ExitCode::SUCCESS;
    }

    if std::env::var("RUST_BACKTRACE").is_ok_and(|v| v == "1")
        && std::env::var("RUST_LIB_BACKTRACE").map_or(true, |v| v == "1")
    {
        let _ = writeln!(&mut std::io::stderr(), "{:?}", err);
    } else {
        let _ = writeln!(&mut std::io::stderr(), "{:#}", err);
    }

    ExitCode::FAILURE
}

fn run_main() -> Result<ExitCode> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if args.quiet { "error" } else { "warn" })
    });
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    // auto colors only when the report goes to a terminal
    let colormode = match args.color {
        ArgsColorChoice::Auto => {
            if args.output.is_none() && std::io::stdout().is_terminal() {
                ColorChoice::Always
            } else {
                ColorChoice::Never
            }
        }
        ArgsColorChoice::Always => ColorChoice::Always,
        ArgsColorChoice::Never => ColorChoice::Never,
    };

    run(args, colormode)?;

    Ok(ExitCode::SUCCESS)
}

fn run(args: Args, colormode: ColorChoice) -> Result<()> {
    let mut builder = ExtractorBuilder::new();
    if args.ipv4_only {
        builder.ipv6(false);
    }
    let extractor = builder.build()?;

    let rules = match &args.rules {
        Some(path) => RuleSet::from_json_file(path.as_std_path())
            .with_context(|| format!("failed to load rules from {}", path))?
            .then(RuleSet::builtin()),
        None => RuleSet::builtin(),
    };

    let sources = input::collect_sources(&args.input, &args.logdir, &args.white, &args.black)
        .context("failed to list log directory")?;

    let mut ingest = Ingest::new(&extractor, &rules, args.primary);
    ingest.ingest_all(&sources)?;
    let ingested = ingest.finish();

    let geo: Option<Box<dyn GeoLookup>> = if args.demographics {
        match MaxMindLookup::open(args.include.as_deref()) {
            Ok(lookup) => Some(Box::new(lookup) as Box<dyn GeoLookup>),
            Err(err) => {
                tracing::warn!("{:#}; origins will not be shown", err);
                Some(Box::new(PlaceholderLookup) as Box<dyn GeoLookup>)
            }
        }
    } else {
        None
    };

    let opts = ReportOptions {
        verbosity: Verbosity::from_count(args.report),
        demographics: args.demographics,
        quiet: args.quiet,
        verbose: args.verbose,
        order: if args.frequency {
            SortOrder::Frequency
        } else {
            SortOrder::Address
        },
    };
    let report = Report::build(&ingested, &opts, geo.as_deref())?;

    if let Some(path) = &args.output {
        match File::create(path) {
            Ok(file) => {
                let mut out = NoColor::new(BufWriter::with_capacity(65536, file));
                report
                    .write(&mut out)
                    .with_context(|| format!("failed to write report to {}", path))?;
                return Ok(());
            }
            Err(err) => {
                let _ = writeln!(
                    io::stderr(),
                    "Unable to open output file '{}': {}. Output is being sent to stdout instead.",
                    path,
                    err
                );
            }
        }
    }

    let mut out = BufferedStandardStream::stdout(colormode);
    report.write(&mut out)?;
    Ok(())
}
