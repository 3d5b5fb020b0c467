use std::fs;
use std::io::{self, Write};

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::app::{OutcomeStatus, ProgressEvent, ProgressSink, RunReport};
use crate::domain::CollectionRecord;
use crate::error::Stac2IsoError;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Console,
    Json,
}

/// Directory receiving one metadata document per collection.
#[derive(Debug, Clone)]
pub struct OutputDir {
    root: Utf8PathBuf,
}

impl OutputDir {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8PathBuf {
        &self.root
    }

    pub fn ensure_root(&self) -> Result<(), Stac2IsoError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| Stac2IsoError::Filesystem(err.to_string()))
    }

    /// Writes through a temp file in the same directory so readers never see a partial file.
    pub fn write_document(
        &self,
        file_name: &str,
        content: &[u8],
    ) -> Result<Utf8PathBuf, Stac2IsoError> {
        self.ensure_root()?;
        let dest = self.root.join(file_name);
        let mut temp = tempfile::Builder::new()
            .prefix(".stac2iso")
            .suffix(".xml.tmp")
            .tempfile_in(self.root.as_std_path())
            .map_err(|err| Stac2IsoError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| Stac2IsoError::Filesystem(err.to_string()))?;
        temp.persist(dest.as_std_path())
            .map_err(|err| Stac2IsoError::Filesystem(err.to_string()))?;
        Ok(dest)
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &RunReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_record(record: &CollectionRecord) -> io::Result<()> {
        Self::print_json(record)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn print_summary(report: &RunReport) {
        let green = "\x1b[32m";
        let yellow = "\x1b[33m";
        let red = "\x1b[31m";
        let reset = "\x1b[0m";

        let written = report.written().count();
        let failed = report.failed().count();
        println!("{green}documents written: {written}{reset}");
        if failed > 0 {
            println!("{red}collections failed: {failed}{reset}");
        }
        if let Some(error) = &report.catalog_error {
            println!("{red}catalog request failed: {error}{reset}");
        }

        for outcome in &report.collections {
            match &outcome.status {
                OutcomeStatus::Written { warnings, .. } if !warnings.is_empty() => {
                    println!(
                        "{yellow}{}: {} field(s) skipped{reset}",
                        outcome.id,
                        warnings.len()
                    );
                    for warning in warnings {
                        println!("{yellow}   {}: {}{reset}", warning.field, warning.message);
                    }
                }
                OutcomeStatus::Written { .. } => {}
                OutcomeStatus::Failed { error } => {
                    println!("{red}{}: {error}{reset}", display_id(&outcome.id));
                }
            }
        }
    }
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => println!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => println!("{}", event.message),
        }
    }
}

fn display_id(id: &str) -> &str {
    if id.is_empty() { "<no id>" } else { id }
}
