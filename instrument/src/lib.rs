//! Collects `tracing` events from a model run into column tables, one table
//! per event target, and hands them out as polars DataFrames.
//!
//! Columns appear as fields are first seen. A field an event does not carry is
//! a null in that row, so tables from heterogeneous events stay aligned.
//!
//! ```ignore
//! // In model code:
//! tracing::info!(target: "period_summary", period, region = %name, gdp);
//!
//! // In a test:
//! let (outcome, tables) = instrument::capture(TableSubscriber::new(), || scenario.run());
//! let summary = tables.table("period_summary").unwrap().to_dataframe()?;
//! ```

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Record};
use tracing::subscriber::Interest;
use tracing::{Event, Id, Level, Metadata, Subscriber};

/// Name of the column holding an event's message, if it has one.
pub const MESSAGE_COLUMN: &str = "message";
/// Name of the column holding each event's level.
pub const LEVEL_COLUMN: &str = "level";

// === TABLES ===

/// Nullable column. The variant is fixed by the first value recorded.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    UInt(Vec<Option<u64>>),
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::UInt(v) => v.len(),
            ColumnData::Int(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fill_nulls_to(&mut self, rows: usize) {
        match self {
            ColumnData::UInt(v) => v.resize(rows, None),
            ColumnData::Int(v) => v.resize(rows, None),
            ColumnData::Float(v) => v.resize(rows, None),
            ColumnData::Bool(v) => v.resize(rows, None),
            ColumnData::Text(v) => v.resize(rows, None),
        }
    }

    /// Float view of numeric columns.
    pub fn as_f64(&self) -> Option<Vec<Option<f64>>> {
        match self {
            ColumnData::UInt(v) => Some(v.iter().map(|x| x.map(|x| x as f64)).collect()),
            ColumnData::Int(v) => Some(v.iter().map(|x| x.map(|x| x as f64)).collect()),
            ColumnData::Float(v) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&[Option<String>]> {
        match self {
            ColumnData::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// Events of one target, column by column.
#[derive(Debug, Clone, Default)]
pub struct EventTable {
    pub columns: BTreeMap<String, ColumnData>,
    pub rows: usize,
    /// Fields dropped because their type differed from the column's.
    pub type_conflicts: usize,
}

impl EventTable {
    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.columns.get(name)
    }

    /// Close the current row: every column gets a null where no value arrived.
    fn finish_row(&mut self) {
        self.rows += 1;
        for column in self.columns.values_mut() {
            column.fill_nulls_to(self.rows);
        }
    }
}

/// All tables captured from a run, keyed by target.
#[derive(Debug, Clone, Default)]
pub struct TableSet {
    pub tables: BTreeMap<String, EventTable>,
}

impl TableSet {
    pub fn table(&self, target: &str) -> Option<&EventTable> {
        self.tables.get(target)
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

thread_local! {
    static TABLES: RefCell<TableSet> = RefCell::default();
}

/// Take everything recorded on this thread so far.
pub fn take() -> TableSet {
    TABLES.with(|t| std::mem::take(&mut *t.borrow_mut()))
}

/// Discard everything recorded on this thread.
pub fn reset() {
    TABLES.with(|t| *t.borrow_mut() = TableSet::default());
}

// === SUBSCRIBER ===

struct RowVisitor<'a> {
    table: &'a mut EventTable,
    row: usize,
}

impl RowVisitor<'_> {
    fn push<T>(
        &mut self,
        field: &str,
        value: T,
        make: fn(Vec<Option<T>>) -> ColumnData,
        slot: fn(&mut ColumnData) -> Option<&mut Vec<Option<T>>>,
    ) {
        let row = self.row;
        let column = self
            .table
            .columns
            .entry(field.to_string())
            .or_insert_with(|| make(Vec::new()));
        match slot(column) {
            Some(values) => {
                values.resize_with(row, || None);
                values.push(Some(value));
            }
            None => self.table.type_conflicts += 1,
        }
    }
}

fn uint_slot(c: &mut ColumnData) -> Option<&mut Vec<Option<u64>>> {
    match c {
        ColumnData::UInt(v) => Some(v),
        _ => None,
    }
}

fn int_slot(c: &mut ColumnData) -> Option<&mut Vec<Option<i64>>> {
    match c {
        ColumnData::Int(v) => Some(v),
        _ => None,
    }
}

fn float_slot(c: &mut ColumnData) -> Option<&mut Vec<Option<f64>>> {
    match c {
        ColumnData::Float(v) => Some(v),
        _ => None,
    }
}

fn bool_slot(c: &mut ColumnData) -> Option<&mut Vec<Option<bool>>> {
    match c {
        ColumnData::Bool(v) => Some(v),
        _ => None,
    }
}

fn text_slot(c: &mut ColumnData) -> Option<&mut Vec<Option<String>>> {
    match c {
        ColumnData::Text(v) => Some(v),
        _ => None,
    }
}

impl Visit for RowVisitor<'_> {
    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field.name(), value, ColumnData::UInt, uint_slot);
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field.name(), value, ColumnData::Int, int_slot);
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field.name(), value, ColumnData::Float, float_slot);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field.name(), value, ColumnData::Bool, bool_slot);
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field.name(), value.to_string(), ColumnData::Text, text_slot);
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field.name(), format!("{value:?}"), ColumnData::Text, text_slot);
    }
}

/// Subscriber that appends each enabled event as a row of its target's table.
///
/// Spans are ignored.
#[derive(Debug, Clone)]
pub struct TableSubscriber {
    max_level: Level,
    targets: Option<BTreeSet<String>>,
}

impl Default for TableSubscriber {
    fn default() -> Self {
        Self::new()
    }
}

impl TableSubscriber {
    /// Records INFO and above from every target.
    pub fn new() -> Self {
        Self {
            max_level: Level::INFO,
            targets: None,
        }
    }

    pub fn with_max_level(mut self, level: Level) -> Self {
        self.max_level = level;
        self
    }

    /// Only record events whose target is listed.
    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = Some(targets.into_iter().map(Into::into).collect());
        self
    }
}

impl Subscriber for TableSubscriber {
    // Filters differ between captures in one process, so never cache a callsite.
    fn register_callsite(&self, _metadata: &'static Metadata<'static>) -> Interest {
        Interest::sometimes()
    }

    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.is_event()
            && *metadata.level() <= self.max_level
            && self
                .targets
                .as_ref()
                .is_none_or(|targets| targets.contains(metadata.target()))
    }

    fn new_span(&self, _span: &Attributes<'_>) -> Id {
        Id::from_u64(1)
    }

    fn record(&self, _span: &Id, _values: &Record<'_>) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event<'_>) {
        let metadata = event.metadata();
        TABLES.with(|t| {
            let mut set = t.borrow_mut();
            let table = set.tables.entry(metadata.target().to_string()).or_default();
            let row = table.rows;

            let mut visitor = RowVisitor { table, row };
            visitor.push(
                LEVEL_COLUMN,
                metadata.level().as_str().to_string(),
                ColumnData::Text,
                text_slot,
            );
            event.record(&mut visitor);

            table.finish_row();
        });
    }

    fn enter(&self, _span: &Id) {}

    fn exit(&self, _span: &Id) {}
}

/// Run `f` with `subscriber` as this thread's default and return what it recorded.
pub fn capture<R>(subscriber: TableSubscriber, f: impl FnOnce() -> R) -> (R, TableSet) {
    reset();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, take())
}

/// Install `subscriber` process-wide. Has no effect if one is already set.
pub fn install_global(subscriber: TableSubscriber) -> bool {
    tracing::subscriber::set_global_default(subscriber).is_ok()
}

// === POLARS ===

use polars::prelude::*;

impl EventTable {
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let columns = self
            .columns
            .iter()
            .map(|(name, data)| {
                let name: PlSmallStr = name.as_str().into();
                match data {
                    ColumnData::UInt(v) => Column::new(name, v),
                    ColumnData::Int(v) => Column::new(name, v),
                    ColumnData::Float(v) => Column::new(name, v),
                    ColumnData::Bool(v) => Column::new(name, v),
                    ColumnData::Text(v) => Column::new(name, v),
                }
            })
            .collect();
        DataFrame::new(columns)
    }
}

impl TableSet {
    pub fn to_dataframes(&self) -> PolarsResult<HashMap<String, DataFrame>> {
        self.tables
            .iter()
            .map(|(target, table)| Ok((target.clone(), table.to_dataframe()?)))
            .collect()
    }
}

fn io_error(error: std::io::Error) -> PolarsError {
    PolarsError::IO {
        error: error.into(),
        msg: None,
    }
}

/// Write each frame to `{dir}/{target}.parquet`.
pub fn write_parquet(frames: &mut HashMap<String, DataFrame>, dir: &Path) -> PolarsResult<()> {
    std::fs::create_dir_all(dir).map_err(io_error)?;
    for (target, df) in frames.iter_mut() {
        let file = std::fs::File::create(dir.join(format!("{target}.parquet"))).map_err(io_error)?;
        ParquetWriter::new(file).finish(df)?;
    }
    Ok(())
}

/// Keep ASCII alphanumerics, replace everything else with `_`.
fn sanitize(name: &str) -> String {
    name.chars()
        .take(60)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Records a whole run and persists it as parquet when dropped.
///
/// Installs a global [`TableSubscriber`] on creation. Output goes to
/// `{parent}/{run_name}_{unix_seconds}/` with one file per target and an empty
/// `_ready` file written last.
pub struct RunRecorder {
    run_dir: PathBuf,
    run_name: String,
    frames: Option<HashMap<String, DataFrame>>,
}

impl RunRecorder {
    pub fn new(parent: impl Into<PathBuf>, run_name: &str, subscriber: TableSubscriber) -> Self {
        let stamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let run_name = sanitize(run_name);
        let run_dir = parent.into().join(format!("{run_name}_{stamp}"));
        reset();
        install_global(subscriber);
        Self {
            run_dir,
            run_name,
            frames: None,
        }
    }

    /// Frames recorded so far. The first call takes them from the recorder;
    /// later calls return the same frames.
    pub fn frames(&mut self) -> PolarsResult<&HashMap<String, DataFrame>> {
        if self.frames.is_none() {
            self.frames = Some(take().to_dataframes()?);
        }
        Ok(self.frames.get_or_insert_with(HashMap::new))
    }

    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }
}

impl Drop for RunRecorder {
    fn drop(&mut self) {
        let frames = match self.frames.take() {
            Some(frames) => Ok(frames),
            None => take().to_dataframes(),
        };
        let mut frames = match frames {
            Ok(frames) if !frames.is_empty() => frames,
            Ok(_) => return,
            Err(e) => {
                eprintln!("RunRecorder({}): failed to build frames: {e}", self.run_name);
                return;
            }
        };
        if let Err(e) = write_parquet(&mut frames, &self.run_dir) {
            eprintln!("RunRecorder({}): failed to write parquet: {e}", self.run_name);
            return;
        }
        if let Err(e) = std::fs::File::create(self.run_dir.join("_ready")) {
            eprintln!("RunRecorder({}): failed to write _ready: {e}", self.run_name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_align_with_nulls() {
        let ((), tables) = capture(TableSubscriber::new(), || {
            tracing::info!(target: "gdp", period = 1u64, gdp = 10.5);
            tracing::info!(target: "gdp", period = 2u64, region = "USA");
        });

        let table = tables.table("gdp").unwrap();
        assert_eq!(table.rows, 2);
        assert_eq!(
            table.column("gdp"),
            Some(&ColumnData::Float(vec![Some(10.5), None]))
        );
        assert_eq!(
            table.column("region"),
            Some(&ColumnData::Text(vec![None, Some("USA".to_string())]))
        );
        assert_eq!(
            table.column("period"),
            Some(&ColumnData::UInt(vec![Some(1), Some(2)]))
        );
    }

    #[test]
    fn test_level_and_message_columns() {
        let ((), tables) = capture(TableSubscriber::new(), || {
            tracing::warn!(target: "solver", period = 3u64, "did not converge");
        });

        let table = tables.table("solver").unwrap();
        assert_eq!(
            table.column(LEVEL_COLUMN).and_then(ColumnData::as_text),
            Some(&[Some("WARN".to_string())][..])
        );
        assert_eq!(
            table.column(MESSAGE_COLUMN).and_then(ColumnData::as_text),
            Some(&[Some("did not converge".to_string())][..])
        );
    }

    #[test]
    fn test_filters_by_level_and_target() {
        let subscriber = TableSubscriber::new().with_targets(["period_summary"]);
        let ((), tables) = capture(subscriber, || {
            tracing::info!(target: "period_summary", period = 0u64);
            tracing::debug!(target: "period_summary", period = 1u64);
            tracing::info!(target: "solver", iterations = 4u64);
        });

        assert_eq!(tables.targets().collect::<Vec<_>>(), vec!["period_summary"]);
        assert_eq!(tables.table("period_summary").unwrap().rows, 1);
    }

    #[test]
    fn test_type_conflict_becomes_null() {
        let ((), tables) = capture(TableSubscriber::new(), || {
            tracing::info!(target: "t", value = 1.5);
            tracing::info!(target: "t", value = "text");
        });

        let table = tables.table("t").unwrap();
        assert_eq!(table.type_conflicts, 1);
        assert_eq!(
            table.column("value"),
            Some(&ColumnData::Float(vec![Some(1.5), None]))
        );
    }

    #[test]
    fn test_dataframe_conversion() {
        let ((), tables) = capture(TableSubscriber::new(), || {
            tracing::info!(target: "gdp", period = 0u64, gdp = 1.0);
            tracing::info!(target: "gdp", period = 1u64);
        });

        let frames = tables.to_dataframes().unwrap();
        let df = &frames["gdp"];
        assert_eq!(df.height(), 2);
        assert_eq!(df.column("gdp").unwrap().null_count(), 1);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("ref run/1"), "ref_run_1");
    }
}
