use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::row::{CandleRow, Column};
use super::store::{output_path, DataLoader, Format};
use crate::api::candles::Granularity;
use crate::error::{Error, Result};

/// The combined table plus which timestamp columns are decoded datetimes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub rows: Vec<CandleRow>,
    datetime_columns: BTreeSet<Column>,
}

impl Frame {
    pub fn new(rows: Vec<CandleRow>) -> Self {
        Self {
            rows,
            datetime_columns: BTreeSet::new(),
        }
    }

    pub fn mark_datetime(&mut self, column: Column) {
        self.datetime_columns.insert(column);
    }

    pub fn is_datetime(&self, column: Column) -> bool {
        self.datetime_columns.contains(&column)
    }

    /// Decoded value of a datetime column for row `idx`.
    pub fn datetime(&self, idx: usize, column: Column) -> Option<DateTime<Utc>> {
        if !self.is_datetime(column) {
            return None;
        }
        let row = self.rows.get(idx)?;
        let secs = match column {
            Column::EndPeriodTs => row.end_period_ts,
            Column::StartPeriodTs => row.start_period_ts,
            _ => return None,
        };
        DateTime::from_timestamp(secs, 0)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One step of a processing pipeline.
pub trait Transform {
    fn name(&self) -> &'static str;
    fn apply(&self, frame: Frame) -> Result<Frame>;
}

/// Decode epoch-second columns into UTC datetimes.
#[derive(Debug, Clone)]
pub struct DateTimeTransform {
    columns: Vec<Column>,
}

impl DateTimeTransform {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }
}

impl Transform for DateTimeTransform {
    fn name(&self) -> &'static str {
        "datetime_transformer"
    }

    fn apply(&self, mut frame: Frame) -> Result<Frame> {
        for &column in &self.columns {
            if !column.is_timestamp() {
                return Err(Error::config(format!("{} is not a timestamp column", column)));
            }
            frame.mark_datetime(column);
            for idx in 0..frame.len() {
                if frame.datetime(idx, column).is_none() {
                    return Err(Error::decode(
                        format!("column {}", column),
                        format!("row {} is not a valid epoch timestamp", idx),
                    ));
                }
            }
        }
        Ok(frame)
    }
}

/// Fill missing values downward with the last value seen in the same column.
///
/// `limit` caps how many consecutive gaps are filled; the rest stay missing.
/// Filling runs straight down the combined table, across market boundaries.
#[derive(Debug, Clone, Default)]
pub struct ForwardFill {
    /// `None` fills every nullable column.
    columns: Option<Vec<Column>>,
    limit: Option<usize>,
}

impl ForwardFill {
    pub fn new(columns: Option<Vec<Column>>, limit: Option<usize>) -> Self {
        Self { columns, limit }
    }
}

impl Transform for ForwardFill {
    fn name(&self) -> &'static str {
        "ffill_imputer"
    }

    fn apply(&self, mut frame: Frame) -> Result<Frame> {
        let columns: Vec<Column> = match &self.columns {
            Some(columns) => columns.clone(),
            None => Column::nullable().collect(),
        };

        for column in columns {
            let filled = if CandleRow::default().int_mut(column).is_some() {
                fill_column(&mut frame.rows, self.limit, |row| row.int_mut(column))
            } else {
                fill_column(&mut frame.rows, self.limit, |row| row.float_mut(column))
            };
            if filled > 0 {
                debug!(column = column.name(), filled, "forward filled");
            }
        }
        Ok(frame)
    }
}

fn fill_column<T: Copy>(
    rows: &mut [CandleRow],
    limit: Option<usize>,
    slot: impl Fn(&mut CandleRow) -> Option<&mut Option<T>>,
) -> usize {
    let mut last: Option<T> = None;
    let mut gap = 0;
    let mut filled = 0;

    for row in rows.iter_mut() {
        let Some(cell) = slot(row) else { return filled };
        match *cell {
            Some(value) => {
                last = Some(value);
                gap = 0;
            }
            None => {
                gap += 1;
                if limit.map_or(true, |n| gap <= n) {
                    if let Some(value) = last {
                        *cell = Some(value);
                        filled += 1;
                    }
                }
            }
        }
    }
    filled
}

/// Named transforms applied in order.
#[derive(Default)]
pub struct Pipeline {
    steps: Vec<Box<dyn Transform>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, transform: impl Transform + 'static) -> Self {
        self.steps.push(Box::new(transform));
        self
    }

    pub fn run(&self, mut frame: Frame) -> Result<Frame> {
        for step in &self.steps {
            frame = step.apply(frame)?;
            debug!(step = step.name(), rows = frame.len(), "pipeline step done");
        }
        Ok(frame)
    }
}

/// Loads saved candlestick history and runs the standard cleanup:
/// datetime decoding, then forward fill.
pub struct Processor {
    data_path: PathBuf,
    pipeline: Pipeline,
}

impl Processor {
    /// Only day and hour history have a default data file.
    pub fn new(
        granularity: Granularity,
        datetime_cols: Vec<Column>,
        ffill_cols: Option<Vec<Column>>,
    ) -> Result<Self> {
        Self::in_dir(Path::new("data"), granularity, datetime_cols, ffill_cols, None)
    }

    /// Processor over the bincode file `fetch` saved in `dir` for `granularity`.
    pub fn in_dir(
        dir: &Path,
        granularity: Granularity,
        datetime_cols: Vec<Column>,
        ffill_cols: Option<Vec<Column>>,
        ffill_limit: Option<usize>,
    ) -> Result<Self> {
        if granularity == Granularity::Minute {
            return Err(Error::config(
                "unsupported time resolution minute: use day or hour",
            ));
        }
        let data_path = output_path(dir, granularity, Format::Bincode);
        Ok(Self::for_path(data_path, datetime_cols, ffill_cols, ffill_limit))
    }

    /// Processor over an explicit file, with an optional forward-fill limit.
    pub fn for_path(
        data_path: impl Into<PathBuf>,
        datetime_cols: Vec<Column>,
        ffill_cols: Option<Vec<Column>>,
        ffill_limit: Option<usize>,
    ) -> Self {
        let pipeline = Pipeline::new()
            .step(DateTimeTransform::new(datetime_cols))
            .step(ForwardFill::new(ffill_cols, ffill_limit));
        Self {
            data_path: data_path.into(),
            pipeline,
        }
    }

    /// Default timestamp column decoded by the processor.
    pub fn default_datetime_cols() -> Vec<Column> {
        vec![Column::EndPeriodTs]
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn load(&self) -> Result<Vec<CandleRow>> {
        DataLoader::new(&self.data_path)?.load()
    }

    pub fn process(&self, rows: Vec<CandleRow>) -> Result<Frame> {
        self.pipeline.run(Frame::new(rows))
    }
}
