use chrono::{DateTime, NaiveDateTime};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use super::pipeline::Frame;
use super::row::{CandleRow, Column};
use crate::api::candles::Granularity;
use crate::error::{Error, Result};

/// Rendering of decoded timestamp columns in CSV output.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// On-disk table formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Csv,
    /// bincode-encoded `Vec<CandleRow>`.
    Bincode,
}

impl Format {
    pub const ALL: [Format; 2] = [Format::Csv, Format::Bincode];

    pub fn extension(&self) -> &'static str {
        match self {
            Format::Csv => "csv",
            Format::Bincode => "bin",
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("csv") => Ok(Format::Csv),
            Some("bin") => Ok(Format::Bincode),
            _ => Err(Error::config(format!(
                "unsupported file format {}: use .csv or .bin",
                path.display()
            ))),
        }
    }
}

/// `<dir>/nfl_historic_candlestick_<granularity>.<ext>`
pub fn output_path(dir: &Path, granularity: Granularity, format: Format) -> PathBuf {
    dir.join(format!(
        "nfl_historic_candlestick_{}.{}",
        granularity,
        format.extension()
    ))
}

/// Write `rows` in every format under `dir`, creating it if needed.
pub fn save_all(dir: &Path, granularity: Granularity, rows: &[CandleRow]) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let frame = Frame::new(rows.to_vec());
    let mut written = Vec::new();

    for format in Format::ALL {
        let path = output_path(dir, granularity, format);
        match format {
            Format::Csv => write_csv(&path, &frame)?,
            Format::Bincode => write_bin(&path, rows)?,
        }
        info!(path = %path.display(), rows = rows.len(), "historic {} data saved", granularity);
        written.push(path);
    }
    Ok(written)
}

// =========================================================================
// CSV
// =========================================================================

pub fn write_csv(path: &Path, frame: &Frame) -> Result<()> {
    let file = File::create(path)?;
    write_csv_to(BufWriter::new(file), frame)
}

pub fn write_csv_to<W: Write>(writer: W, frame: &Frame) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(Column::ALL.iter().map(|c| c.name()))?;

    for row in &frame.rows {
        let mut record = Vec::with_capacity(Column::ALL.len());
        for column in Column::ALL {
            if frame.is_datetime(column) {
                record.push(render_datetime(column, &row.field(column))?);
            } else {
                record.push(row.field(column));
            }
        }
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

pub fn read_csv(path: &Path) -> Result<Vec<CandleRow>> {
    let file = File::open(path)?;
    read_csv_from(BufReader::new(file))
}

/// Read rows back. Unknown columns are ignored; timestamp columns may be
/// epoch seconds or rendered datetimes.
pub fn read_csv_from<R: Read>(reader: R) -> Result<Vec<CandleRow>> {
    let mut reader = csv::Reader::from_reader(reader);

    let columns: Vec<Option<Column>> = reader
        .headers()?
        .iter()
        .map(|name| name.parse::<Column>().ok())
        .collect();
    for required in [Column::EndPeriodTs, Column::Market] {
        if !columns.contains(&Some(required)) {
            return Err(Error::decode("csv table", format!("missing column {}", required)));
        }
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row = CandleRow::default();
        for (column, raw) in columns.iter().zip(record.iter()) {
            let Some(column) = *column else { continue };
            if column.is_timestamp() && raw.contains(['-', ':']) && !raw.starts_with('-') {
                let parsed = NaiveDateTime::parse_from_str(raw.trim(), DATETIME_FORMAT)
                    .map_err(|e| Error::decode(format!("column {}", column), format!("{:?}: {}", raw, e)))?;
                row.set_field(column, &parsed.and_utc().timestamp().to_string())?;
            } else {
                row.set_field(column, raw)?;
            }
        }
        rows.push(row);
    }
    Ok(rows)
}

fn render_datetime(column: Column, epoch: &str) -> Result<String> {
    let secs: i64 = epoch
        .parse()
        .map_err(|e| Error::decode(format!("column {}", column), e))?;
    let dt = DateTime::from_timestamp(secs, 0).ok_or_else(|| {
        Error::decode(format!("column {}", column), format!("{} out of range", secs))
    })?;
    Ok(dt.format(DATETIME_FORMAT).to_string())
}

// =========================================================================
// bincode
// =========================================================================

pub fn write_bin(path: &Path, rows: &[CandleRow]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut writer, rows)?;
    writer.flush()?;
    Ok(())
}

pub fn read_bin(path: &Path) -> Result<Vec<CandleRow>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(bincode::deserialize_from(reader)?)
}

/// Loads a persisted table, picking the reader from the file extension.
#[derive(Debug, Clone)]
pub struct DataLoader {
    path: PathBuf,
    format: Format,
}

impl DataLoader {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let format = Format::from_path(&path)?;
        Ok(Self { path, format })
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn load(&self) -> Result<Vec<CandleRow>> {
        match self.format {
            Format::Csv => read_csv(&self.path),
            Format::Bincode => read_bin(&self.path),
        }
    }
}
