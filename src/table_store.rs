use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::DateTime;
use parquet::basic::{ConvertedType, Repetition, Type as PhysicalType};
use parquet::data_type::{BoolType, ByteArray, ByteArrayType, DoubleType, Int64Type};
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::file::writer::{SerializedColumnWriter, SerializedFileWriter};
use parquet::record::Field;
use parquet::schema::types::Type;
use tracing::debug;

use crate::games::{SeasonType, format_timestamp};
use crate::table::{Cell, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Raw,
    Processed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    Games,
    Basic,
    Advanced,
    Lines,
}

impl RawKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RawKind::Games => "games",
            RawKind::Basic => "basic",
            RawKind::Advanced => "advanced",
            RawKind::Lines => "lines",
        }
    }
}

/// Logical table key: entity kind, year, season and optionally week.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    layer: Layer,
    stem: String,
}

impl TableName {
    pub fn raw(kind: RawKind, year: u32, season: SeasonType) -> Self {
        Self {
            layer: Layer::Raw,
            stem: format!("{}_{year}_{season}", kind.as_str()),
        }
    }

    pub fn raw_week(kind: RawKind, year: u32, week: u32, season: SeasonType) -> Self {
        Self {
            layer: Layer::Raw,
            stem: format!("{}_{year}_week{week}_{season}", kind.as_str()),
        }
    }

    pub fn team_level(year: u32, season: SeasonType) -> Self {
        Self {
            layer: Layer::Processed,
            stem: format!("team_stats_{year}_{season}"),
        }
    }

    pub fn game_level(year: u32, season: SeasonType) -> Self {
        Self {
            layer: Layer::Processed,
            stem: format!("game_stats_{year}_{season}"),
        }
    }

    pub fn weekly(year: u32, week: u32, season: SeasonType) -> Self {
        Self {
            layer: Layer::Processed,
            stem: format!("weekly_{year}_week{week}_{season}"),
        }
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stem)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub write_csv: bool,
}

impl StoreConfig {
    pub fn from_data_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            raw_dir: data_dir.join("raw"),
            processed_dir: data_dir.join("processed"),
            write_csv: true,
        }
    }
}

/// Whole-table parquet storage keyed by [`TableName`].
#[derive(Debug, Clone)]
pub struct TableStore {
    config: StoreConfig,
}

impl TableStore {
    pub fn new(config: StoreConfig) -> Result<Self> {
        for dir in [&config.raw_dir, &config.processed_dir] {
            fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn path_for(&self, name: &TableName) -> PathBuf {
        self.dir_for(name).join(format!("{}.parquet", name.stem))
    }

    pub fn csv_path_for(&self, name: &TableName) -> PathBuf {
        self.dir_for(name).join(format!("{}.csv", name.stem))
    }

    fn dir_for(&self, name: &TableName) -> &Path {
        match name.layer {
            Layer::Raw => &self.config.raw_dir,
            Layer::Processed => &self.config.processed_dir,
        }
    }

    pub fn exists(&self, name: &TableName) -> bool {
        self.path_for(name).is_file()
    }

    /// `Ok(None)` when no table has been written under `name`.
    pub fn read_table(&self, name: &TableName) -> Result<Option<Table>> {
        let path = self.path_for(name);
        if !path.is_file() {
            return Ok(None);
        }
        read_parquet(&path)
            .with_context(|| format!("read table {name}"))
            .map(Some)
    }

    /// Overwrites `name` with `table`. Processed tables also get a CSV copy
    /// when enabled.
    pub fn write_table(&self, name: &TableName, table: &Table) -> Result<PathBuf> {
        let path = self.path_for(name);
        write_parquet(&path, table).with_context(|| format!("write table {name}"))?;
        if name.layer == Layer::Processed && self.config.write_csv {
            write_csv(&self.csv_path_for(name), table)
                .with_context(|| format!("export csv for {name}"))?;
        }
        debug!(table = %name, rows = table.len(), columns = table.width(), "table written");
        Ok(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int,
    Double,
    Bool,
    Text,
}

fn column_kind(table: &Table, idx: usize) -> ColumnKind {
    let mut kind = None;
    for row in table.rows() {
        let next = match &row[idx] {
            Cell::Null => continue,
            Cell::Int(_) => ColumnKind::Int,
            Cell::Float(_) => ColumnKind::Double,
            Cell::Bool(_) => ColumnKind::Bool,
            Cell::Text(_) => return ColumnKind::Text,
        };
        kind = Some(match (kind, next) {
            (None, k) => k,
            (Some(a), b) if a == b => a,
            (
                Some(ColumnKind::Int | ColumnKind::Double),
                ColumnKind::Int | ColumnKind::Double,
            ) => ColumnKind::Double,
            _ => return ColumnKind::Text,
        });
    }
    kind.unwrap_or(ColumnKind::Text)
}

fn schema_field(name: &str, kind: ColumnKind) -> Result<Arc<Type>> {
    let physical = match kind {
        ColumnKind::Int => PhysicalType::INT64,
        ColumnKind::Double => PhysicalType::DOUBLE,
        ColumnKind::Bool => PhysicalType::BOOLEAN,
        ColumnKind::Text => PhysicalType::BYTE_ARRAY,
    };
    let mut builder =
        Type::primitive_type_builder(name, physical).with_repetition(Repetition::OPTIONAL);
    if kind == ColumnKind::Text {
        builder = builder.with_converted_type(ConvertedType::UTF8);
    }
    let field = builder
        .build()
        .with_context(|| format!("schema for column {name}"))?;
    Ok(Arc::new(field))
}

fn levels<T>(cells: &[&Cell], value: impl Fn(&Cell) -> Option<T>) -> (Vec<T>, Vec<i16>) {
    let mut values = Vec::with_capacity(cells.len());
    let mut defs = Vec::with_capacity(cells.len());
    for cell in cells {
        match value(cell) {
            Some(v) => {
                values.push(v);
                defs.push(1);
            }
            None => defs.push(0),
        }
    }
    (values, defs)
}

fn write_column(
    column: &mut SerializedColumnWriter<'_>,
    kind: ColumnKind,
    cells: &[&Cell],
) -> Result<()> {
    match kind {
        ColumnKind::Int => {
            let (values, defs) = levels(cells, |c| match c {
                Cell::Int(v) => Some(*v),
                _ => None,
            });
            column
                .typed::<Int64Type>()
                .write_batch(&values, Some(&defs), None)?;
        }
        ColumnKind::Double => {
            let (values, defs) = levels(cells, Cell::as_f64);
            column
                .typed::<DoubleType>()
                .write_batch(&values, Some(&defs), None)?;
        }
        ColumnKind::Bool => {
            let (values, defs) = levels(cells, |c| match c {
                Cell::Bool(b) => Some(*b),
                _ => None,
            });
            column
                .typed::<BoolType>()
                .write_batch(&values, Some(&defs), None)?;
        }
        ColumnKind::Text => {
            let (values, defs) = levels(cells, |c| match c {
                Cell::Null => None,
                other => Some(ByteArray::from(other.to_string().into_bytes())),
            });
            column
                .typed::<ByteArrayType>()
                .write_batch(&values, Some(&defs), None)?;
        }
    }
    Ok(())
}

/// Writes `table` as a single-row-group parquet file via a temp file and
/// rename. Column types are inferred: all-integer columns are INT64, mixed
/// numeric DOUBLE, booleans BOOLEAN, everything else UTF8.
pub fn write_parquet(path: &Path, table: &Table) -> Result<()> {
    if table.width() == 0 {
        return Err(anyhow!("refusing to write a table with no columns"));
    }
    let kinds: Vec<ColumnKind> = (0..table.width()).map(|i| column_kind(table, i)).collect();
    let fields = table
        .columns()
        .iter()
        .zip(&kinds)
        .map(|(name, kind)| schema_field(name, *kind))
        .collect::<Result<Vec<_>>>()?;
    let schema = Type::group_type_builder("schema")
        .with_fields(fields)
        .build()
        .context("build parquet schema")?;

    let tmp = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
    let props = Arc::new(WriterProperties::builder().build());
    let mut writer =
        SerializedFileWriter::new(file, Arc::new(schema), props).context("open parquet writer")?;

    if !table.is_empty() {
        let mut row_group = writer.next_row_group().context("start row group")?;
        let mut idx = 0usize;
        while let Some(mut column) = row_group.next_column().context("next column")? {
            let cells: Vec<&Cell> = table.rows().iter().map(|row| &row[idx]).collect();
            write_column(&mut column, kinds[idx], &cells)
                .with_context(|| format!("write column {}", table.columns()[idx]))?;
            column.close().context("close column")?;
            idx += 1;
        }
        row_group.close().context("close row group")?;
    }
    writer.close().context("finish parquet file")?;

    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

fn cell_from_field(field: &Field) -> Cell {
    match field {
        Field::Null => Cell::Null,
        Field::Bool(b) => Cell::Bool(*b),
        Field::Byte(v) => Cell::Int(i64::from(*v)),
        Field::Short(v) => Cell::Int(i64::from(*v)),
        Field::Int(v) => Cell::Int(i64::from(*v)),
        Field::Long(v) => Cell::Int(*v),
        Field::UByte(v) => Cell::Int(i64::from(*v)),
        Field::UShort(v) => Cell::Int(i64::from(*v)),
        Field::UInt(v) => Cell::Int(i64::from(*v)),
        Field::ULong(v) => i64::try_from(*v)
            .map(Cell::Int)
            .unwrap_or(Cell::Float(*v as f64)),
        Field::Float(v) => Cell::Float(f64::from(*v)),
        Field::Double(v) => Cell::Float(*v),
        Field::Str(s) => Cell::Text(s.clone()),
        Field::TimestampMillis(ms) => DateTime::from_timestamp_millis(*ms)
            .map(format_timestamp)
            .into(),
        Field::TimestampMicros(us) => DateTime::from_timestamp_micros(*us)
            .map(format_timestamp)
            .into(),
        other => Cell::Text(other.to_string()),
    }
}

pub fn read_parquet(path: &Path) -> Result<Table> {
    let file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = SerializedFileReader::new(file)
        .with_context(|| format!("open parquet reader {}", path.display()))?;
    let columns: Vec<String> = reader
        .metadata()
        .file_metadata()
        .schema_descr()
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let mut table = Table::new(&columns);
    let rows = reader.get_row_iter(None).context("iterate parquet rows")?;
    for row in rows {
        let row = row.context("decode parquet row")?;
        table.push_named(
            row.get_column_iter()
                .map(|(name, field)| (name.as_str(), cell_from_field(field)))
                .collect(),
        );
    }
    Ok(table)
}

pub fn write_csv(path: &Path, table: &Table) -> Result<()> {
    let tmp = path.with_extension("csv.tmp");
    let mut writer =
        csv::Writer::from_path(&tmp).with_context(|| format!("create {}", tmp.display()))?;
    writer
        .write_record(table.columns())
        .context("write csv header")?;
    for row in table.rows() {
        writer
            .write_record(row.iter().map(ToString::to_string))
            .context("write csv row")?;
    }
    writer.flush().context("flush csv")?;
    drop(writer);
    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_names_encode_key() {
        let name = TableName::raw_week(RawKind::Basic, 2023, 4, SeasonType::Regular);
        assert_eq!(name.to_string(), "basic_2023_week4_regular");
        assert_eq!(name.layer(), Layer::Raw);
        assert_eq!(
            TableName::game_level(2019, SeasonType::Postseason).stem(),
            "game_stats_2019_postseason"
        );
    }

    #[test]
    fn mixed_numeric_columns_widen_to_double() {
        let mut t = Table::new(["a", "b", "c"]);
        t.push_row(vec![1.into(), 1.into(), true.into()]);
        t.push_row(vec![Cell::Null, 2.5.into(), "x".into()]);
        assert_eq!(column_kind(&t, 0), ColumnKind::Int);
        assert_eq!(column_kind(&t, 1), ColumnKind::Double);
        assert_eq!(column_kind(&t, 2), ColumnKind::Text);
    }
}
