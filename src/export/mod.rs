pub mod csv;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::domain::email::ExportRow;
use crate::error::Result;
use crate::mail::mailbox::{Connector, Mailbox, address_query};

use self::csv::CsvWriter;

const SEPARATOR_WIDTH: usize = 150;

/// Searches a mailbox for one address and writes the matches to CSV,
/// echoing each row to the console.
pub struct Exporter<C> {
    connector: C,
    output_path: PathBuf,
    pacing: Duration,
}

impl<C: Connector> Exporter<C> {
    pub fn new(connector: C, output_path: impl Into<PathBuf>) -> Self {
        Self {
            connector,
            output_path: output_path.into(),
            pacing: Duration::ZERO,
        }
    }

    pub fn from_config(cfg: &Config, connector: C) -> Self {
        Self::new(connector, cfg.output_path.clone()).with_pacing(cfg.pacing())
    }

    /// Cosmetic delay between console steps.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Run the export and report any failure on `console` instead of
    /// returning it.
    pub fn export_for_address(&self, address: &str, console: &mut dyn Write) {
        if let Err(e) = self.run(address, console) {
            log::debug!("export for {address} failed: {e:?}");
            let _ = writeln!(console, "Error: {e}");
        }
    }

    /// Returns the number of rows written. No file is created when the
    /// search has no hits.
    pub fn run(&self, address: &str, console: &mut dyn Write) -> Result<usize> {
        let mailbox = self.connector.connect()?;
        writeln!(console, "\nAPI Connected\n")?;
        self.pause();

        let query = address_query(address);
        log::debug!("searching with query {query:?}");
        let hits = mailbox.search(&query)?;

        if hits.is_empty() {
            writeln!(console, "No matching emails found for '{address}'.")?;
            return Ok(0);
        }

        for n in 1..=hits.len() {
            writeln!(console, "Matched Email #{n} decoded!...")?;
            self.pause();
        }

        let mut csv = CsvWriter::create(&self.output_path)?;
        writeln!(console, "\nList of matching emails for '{address}':")?;
        writeln!(console, "{}", "_".repeat(SEPARATOR_WIDTH))?;

        for hit in &hits {
            let detail = mailbox.fetch(&hit.id)?;
            let row = ExportRow::from_detail(&detail)?;
            csv.write_row(&row)?;
            self.pause();
            print_row(console, &row)?;
        }
        csv.finish()?;

        self.pause();
        writeln!(
            console,
            "\nExported {} emails to {}",
            hits.len(),
            self.output_path.display()
        )?;
        writeln!(console, "\nEmail Extraction Done!...")?;
        log::info!("wrote {} rows to {}", hits.len(), self.output_path.display());
        Ok(hits.len())
    }

    fn pause(&self) {
        if !self.pacing.is_zero() {
            thread::sleep(self.pacing);
        }
    }
}

fn print_row(console: &mut dyn Write, row: &ExportRow) -> std::io::Result<()> {
    writeln!(console, "SENDER: {}", row.sender)?;
    writeln!(console, "DATE: {}", row.date)?;
    writeln!(console, "SUBJECT: {}", row.subject)?;
    writeln!(console, "MAIL BODY: {}", row.body)?;
    writeln!(console, "HISTORY ID: {}", row.history_id)?;
    writeln!(console, "THREAD ID: {}", row.thread_id)?;
    writeln!(console, "{}", "_".repeat(SEPARATOR_WIDTH))
}
