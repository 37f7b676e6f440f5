use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::domain::email::{EXPORT_HEADER, ExportRow};
use crate::error::Result;

const LINE_END: &str = "\r\n";

/// Row-oriented CSV output. The header is written on construction, so a
/// writer never exists without it.
pub struct CsvWriter<W: Write> {
    out: W,
}

impl CsvWriter<BufWriter<File>> {
    /// Create or truncate `path`.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> CsvWriter<W> {
    pub fn new(out: W) -> Result<Self> {
        let mut w = Self { out };
        w.write_record(&EXPORT_HEADER)?;
        Ok(w)
    }

    pub fn write_row(&mut self, row: &ExportRow) -> Result<()> {
        self.write_record(&row.fields())?;
        Ok(())
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }

    fn write_record(&mut self, fields: &[&str]) -> io::Result<()> {
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                self.out.write_all(b",")?;
            }
            self.out.write_all(quote(field).as_bytes())?;
        }
        self.out.write_all(LINE_END.as_bytes())
    }
}

/// Quote only when the field would otherwise be ambiguous.
fn quote(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\r', '\n']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}
