use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::LazyLock;

use anyhow::Context;
use clap::{Args, ValueEnum};
use mcstrings_world::extract::{self, RowSink, StringRow};
use regex::Regex;

static PAGES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r".*/pages\[\d+\]$").unwrap());
static SIGN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r".*/text\d+$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum OutputFilter {
    /// Keep every string
    All,
    /// Keep only strings that look like user-generated text
    UserText,
}

#[derive(Args)]
pub struct ExtractArgs {
    /// Path to the world to scan (the directory containing level.dat)
    pub world: PathBuf,

    /// Only include entries matching a filter
    #[arg(long, value_enum, default_value = "all")]
    pub filter: OutputFilter,

    /// Output entries *not* matching the filter
    #[arg(long)]
    pub invert: bool,

    /// Include a header row in the output
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub header: bool,

    /// File to write results to (if absent, results are written to stdout)
    #[arg(long)]
    pub output: Option<PathBuf>,
}

/// Canonicalizes a string for comparisons by trimming whitespace and
/// lowercasing it.
fn clean(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Whether an entry likely contains user-generated text: sign text, book
/// contents and titles, renamed items, and the like. Entries whose value is
/// empty (empty strings, null JSON objects, signs with empty text) never
/// qualify.
fn contains_user_text(path: &str, value: &str) -> bool {
    let value = clean(value);
    if value.is_empty() || value == "null" || value == r#"{"text":""}"# {
        return false;
    }

    let path = clean(path);
    path.ends_with("/display/name")
        || path.ends_with("/customname")
        || path.ends_with("/title")
        || PAGES_RE.is_match(&path)
        || SIGN_RE.is_match(&path)
}

struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> RowSink for CsvSink<W> {
    fn write_row(&mut self, row: &StringRow) -> io::Result<()> {
        self.writer.serialize(row).map_err(io::Error::other)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

pub fn run(args: &ExtractArgs) -> anyhow::Result<()> {
    let base: fn(&str, &str) -> bool = match args.filter {
        OutputFilter::All => |_, _| true,
        OutputFilter::UserText => contains_user_text,
    };
    let invert = args.invert;
    let keep = move |path: &str, value: &str| base(path, value) != invert;

    let output: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(
            File::create(path)
                .with_context(|| format!("cannot open file {:?} for writing", path))?,
        ),
        None => Box::new(io::stdout()),
    };

    let mut sink = CsvSink {
        writer: csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(output),
    };
    if args.header {
        sink.writer
            .write_record(["dimension", "chunk_x", "chunk_z", "nbt_path", "value"])
            .context("cannot write output")?;
    }

    extract::extract_world(&args.world, &keep, &mut sink).context("cannot read world")?;
    sink.writer.flush().context("cannot write output")?;
    Ok(())
}
