use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook};

use crate::domain::SchoolRecord;

const WORKBOOK_HEADERS: [&str; 5] = ["country", "city", "name", "link", "emails"];

/// Streams records into a file that is a well-formed JSON array once
/// `finish` has run. The opening bracket is written up front and every
/// append is flushed, so a crash loses at most the record being written.
pub struct JsonArraySink {
    writer: BufWriter<File>,
    path: PathBuf,
    count: usize,
}

impl JsonArraySink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create output directory {}", parent.display())
                })?;
            }
        }

        let file =
            File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(b"[")?;
        writer.flush()?;

        Ok(JsonArraySink {
            writer,
            path,
            count: 0,
        })
    }

    pub fn append(&mut self, record: &SchoolRecord) -> Result<()> {
        let json = serde_json::to_string(record).context("failed to serialize record")?;
        if self.count > 0 {
            self.writer.write_all(b",")?;
        }
        self.writer.write_all(b"\n")?;
        self.writer.write_all(json.as_bytes())?;
        self.writer.flush()?;
        self.count += 1;
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn finish(mut self) -> Result<PathBuf> {
        self.writer.write_all(b"\n]\n")?;
        self.writer.flush()?;
        Ok(self.path)
    }
}

/// Buffers every record in memory and writes the workbook once at the end
/// of the run, instead of re-reading and rewriting the file per record.
pub struct WorkbookSink {
    records: Vec<SchoolRecord>,
    path: PathBuf,
}

impl WorkbookSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        WorkbookSink {
            records: Vec::new(),
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn add(&mut self, record: &SchoolRecord) {
        self.records.push(record.clone());
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn save(&self) -> Result<()> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();

        let bold = Format::new().set_bold();
        for (col, header) in WORKBOOK_HEADERS.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, *header, &bold)?;
        }

        for (row, record) in self.records.iter().enumerate() {
            let row = row as u32 + 1;
            worksheet.write_string(row, 0, record.country.as_str())?;
            worksheet.write_string(row, 1, record.city.as_str())?;
            worksheet.write_string(row, 2, record.name.as_str())?;
            worksheet.write_string(row, 3, record.link.as_str())?;
            if let Some(emails) = &record.emails {
                // The emails column carries the list as a literal sequence.
                worksheet.write_string(row, 4, serde_json::to_string(emails)?)?;
            }
        }

        workbook
            .save(&self.path)
            .with_context(|| format!("failed to write workbook {}", self.path.display()))?;
        Ok(())
    }
}

/// Whole-array load for the retroactive fix pass. The file must be a valid
/// JSON array, which is exactly what `JsonArraySink` leaves behind.
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<SchoolRecord>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let records = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("{} is not a JSON array of records", path.display()))?;
    Ok(records)
}

pub fn save_records(path: impl AsRef<Path>, records: &[SchoolRecord]) -> Result<()> {
    let path = path.as_ref();
    let file =
        File::create(path).with_context(|| format!("failed to rewrite {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, records)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
