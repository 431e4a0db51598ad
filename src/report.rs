use crate::nodes::Extraction;
use crate::tally::Tally;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::ser::{Formatter, PrettyFormatter};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlainCounts {
    pub with_geo: usize,
    pub without_geo: usize,
    pub within_boundary: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitCounts {
    pub with_geo: usize,
    pub without_geo: usize,
    pub online_within_boundary: usize,
    pub known_within_boundary: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitDistricts {
    pub online: BTreeMap<String, usize>,
    pub known: BTreeMap<String, usize>,
}

/// The statistics document written at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Statistics {
    Plain {
        counts: PlainCounts,
        districts: BTreeMap<String, usize>,
    },
    Split {
        counts: SplitCounts,
        districts: SplitDistricts,
        timestamp: String,
    },
}

impl Statistics {
    pub fn plain(extraction: &Extraction, known: &Tally) -> Self {
        Statistics::Plain {
            counts: PlainCounts {
                with_geo: extraction.with_geo,
                without_geo: extraction.without_geo,
                within_boundary: known.within_boundary(),
            },
            districts: known.counts().clone(),
        }
    }

    pub fn split(extraction: &Extraction, online: &Tally, known: &Tally, generated_at: DateTime<Utc>) -> Self {
        Statistics::Split {
            counts: SplitCounts {
                with_geo: extraction.with_geo,
                without_geo: extraction.without_geo,
                online_within_boundary: online.within_boundary(),
                known_within_boundary: known.within_boundary(),
            },
            districts: SplitDistricts {
                online: online.counts().clone(),
                known: known.counts().clone(),
            },
            timestamp: iso8601(generated_at),
        }
    }

    /// Pretty JSON with sorted keys, 4-space indent and `"key":value` pairs.
    pub fn to_json(&self) -> Result<String> {
        // serde_json::Map is ordered by key, which sorts nested objects too.
        let value = serde_json::to_value(self).context("Failed to build statistics JSON")?;

        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, CompactKeyFormatter::new());
        value.serialize(&mut ser).context("Failed to serialize statistics")?;

        Ok(String::from_utf8(buf)?)
    }
}

/// `2024-03-01T12:30:05+00:00`, with a 6-digit fraction only when the
/// microseconds are non-zero.
fn iso8601(at: DateTime<Utc>) -> String {
    let precision = if at.timestamp_subsec_micros() == 0 {
        SecondsFormat::Secs
    } else {
        SecondsFormat::Micros
    };
    at.to_rfc3339_opts(precision, false)
}

/// Write the statistics to `path`, or print them when no path is configured.
/// A failed write is logged and otherwise ignored.
pub fn write_statistics(stats: &Statistics, path: Option<&Path>) -> Result<()> {
    let json = stats.to_json()?;

    match path {
        Some(path) => match fs::write(path, format!("{}\n", json)) {
            Ok(()) => info!("Statistics written to {:?}", path),
            Err(e) => warn!("Could not write JSON to {:?}: {}", path, e),
        },
        None => println!("{}", json),
    }

    Ok(())
}

/// PrettyFormatter with no space after the key separator.
struct CompactKeyFormatter<'a> {
    inner: PrettyFormatter<'a>,
}

impl<'a> CompactKeyFormatter<'a> {
    fn new() -> Self {
        CompactKeyFormatter {
            inner: PrettyFormatter::with_indent(b"    "),
        }
    }
}

impl<'a> Formatter for CompactKeyFormatter<'a> {
    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_array(writer)
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.inner.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_object(writer)
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.inner.begin_object_key(writer, first)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b":")
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object_value(writer)
    }
}
