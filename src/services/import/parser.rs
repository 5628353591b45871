use std::collections::HashMap;
use std::io::Cursor;
use std::str::FromStr;

use calamine::{Data, Reader, Xlsx};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, IntoEnumIterator};
use utoipa::ToSchema;

use crate::errors::ServiceError;

/// Spreadsheet formats accepted by the importer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SourceFormat {
    Csv,
    Xlsx,
}

impl SourceFormat {
    /// Picks the format from the file extension, case-insensitively.
    pub fn from_file_name(name: &str) -> Result<Self, ServiceError> {
        let extension = std::path::Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("csv") => Ok(Self::Csv),
            Some("xlsx") => Ok(Self::Xlsx),
            _ => Err(ServiceError::BadRequest(format!(
                "Unsupported file type for '{}'; expected .csv or .xlsx",
                name
            ))),
        }
    }
}

/// Columns the importer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Field {
    Material,
    Branch,
    State,
    Technology,
    Tonnage,
    StarRating,
    Price,
    FactoryStock,
    Billing,
    MonthlyPlan,
    OpeningStock,
    AvailableStock,
    InTransitStock,
    MarketShare,
    Penetration,
}

impl Field {
    /// Normalized header spellings that map onto this field.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            Field::Material => &[
                "material",
                "materialcode",
                "materialno",
                "sku",
                "model",
                "modelno",
                "productcode",
            ],
            Field::Branch => &["branch", "branchname", "salesoffice", "office"],
            Field::State => &["state", "statename"],
            Field::Technology => &["technology", "tech", "compressortype"],
            Field::Tonnage => &["tonnage", "ton", "tons", "capacity"],
            Field::StarRating => &["starrating", "star", "stars", "rating"],
            Field::Price => &["price", "mrp", "unitprice"],
            Field::FactoryStock => &["factorystock", "plantstock"],
            Field::Billing => &["billing", "billed", "sales", "billingqty", "salesqty", "actual"],
            Field::MonthlyPlan => &["plan", "monthlyplan", "target", "monthlytarget"],
            Field::OpeningStock => &["openingstock", "opening"],
            Field::AvailableStock => &["availablestock", "available", "closingstock"],
            Field::InTransitStock => &["intransit", "intransitstock", "transit"],
            Field::MarketShare => &["marketshare"],
            Field::Penetration => &["penetration"],
        }
    }

    fn from_header(header: &str) -> Option<Self> {
        let normalized = normalize_header(header);
        if normalized.is_empty() {
            return None;
        }
        Field::iter().find(|field| field.aliases().contains(&normalized.as_str()))
    }
}

/// Lower-cases and drops everything but letters and digits, so
/// "Material Code", "material_code" and "MATERIAL-CODE" compare equal.
pub fn normalize_header(header: &str) -> String {
    header
        .trim_start_matches('\u{feff}')
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Header position of every recognised column
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    indices: HashMap<Field, usize>,
}

impl ColumnMap {
    pub fn from_headers<S: AsRef<str>>(headers: &[S]) -> Result<Self, ServiceError> {
        let mut indices = HashMap::new();
        for (idx, header) in headers.iter().enumerate() {
            if let Some(field) = Field::from_header(header.as_ref()) {
                // first matching column wins
                indices.entry(field).or_insert(idx);
            }
        }

        let missing: Vec<String> = [Field::Material, Field::Branch]
            .into_iter()
            .filter(|field| !indices.contains_key(field))
            .map(|field| field.as_ref().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ServiceError::ImportError(format!(
                "Missing required column(s): {}",
                missing.join(", ")
            )));
        }

        Ok(Self { indices })
    }

    fn cell<'a>(&self, cells: &'a [String], field: Field) -> Option<&'a str> {
        self.indices
            .get(&field)
            .and_then(|idx| cells.get(*idx))
            .map(|cell| cell.trim())
            .filter(|cell| !cell.is_empty())
    }
}

/// A row the importer could not use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RowError {
    /// 1-based line in the sheet, counting the header
    pub row: usize,
    pub message: String,
}

/// One validated data row
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SalesRecord {
    pub row: usize,
    pub material: String,
    pub branch: String,
    pub state: Option<String>,
    pub technology: Option<String>,
    pub tonnage: Option<f64>,
    pub star_rating: Option<i32>,
    pub price: Option<Decimal>,
    pub factory_stock: Option<i64>,
    pub billing: i64,
    pub monthly_plan: i64,
    pub opening_stock: Option<i64>,
    pub available_stock: Option<i64>,
    pub in_transit_stock: Option<i64>,
    pub market_share: Option<f64>,
    pub penetration: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedSheet {
    /// Non-blank data rows seen
    pub rows_read: usize,
    pub records: Vec<SalesRecord>,
    pub errors: Vec<RowError>,
}

/// Parses a CSV or XLSX payload into validated records.
///
/// Fails only when the sheet is unreadable or lacks a required column;
/// bad rows are collected in [`ParsedSheet::errors`].
pub fn parse(format: SourceFormat, bytes: &[u8]) -> Result<ParsedSheet, ServiceError> {
    let table = match format {
        SourceFormat::Csv => read_csv(bytes)?,
        SourceFormat::Xlsx => read_xlsx(bytes)?,
    };
    parse_table(table)
}

/// Sheet rows paired with their 1-based line number in the source file.
type Table = Vec<(usize, Vec<String>)>;

fn read_csv(bytes: &[u8]) -> Result<Table, ServiceError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    reader
        .records()
        .enumerate()
        .map(|(idx, record)| {
            let record = record
                .map_err(|e| ServiceError::ImportError(format!("Unreadable CSV: {}", e)))?;
            let line = record
                .position()
                .map_or(idx + 1, |pos| record_line(bytes, pos));
            Ok((line, record.iter().map(str::to_string).collect()))
        })
        .collect()
}

/// A record's position points just past the previous record, before any
/// empty lines the reader skipped; those are added back here.
fn record_line(bytes: &[u8], pos: &csv::Position) -> usize {
    let skipped = bytes
        .get(pos.byte() as usize..)
        .unwrap_or_default()
        .iter()
        .take_while(|&&b| b == b'\n' || b == b'\r')
        .filter(|&&b| b == b'\n')
        .count();
    pos.line() as usize + skipped
}

fn read_xlsx(bytes: &[u8]) -> Result<Table, ServiceError> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| ServiceError::ImportError(format!("Unreadable workbook: {}", e)))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ServiceError::ImportError("Workbook has no worksheets".to_string()))?
        .map_err(|e| ServiceError::ImportError(format!("Unreadable worksheet: {}", e)))?;

    // The range begins at the first used cell, not at row 1.
    let first_row = range.start().map_or(0, |(row, _)| row as usize);
    Ok(range
        .rows()
        .enumerate()
        .map(|(idx, row)| (first_row + idx + 1, row.iter().map(cell_text).collect()))
        .collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

fn is_blank(cells: &[String]) -> bool {
    cells.iter().all(|c| c.trim().is_empty())
}

fn parse_table(table: Table) -> Result<ParsedSheet, ServiceError> {
    let mut lines = table.into_iter().filter(|(_, cells)| !is_blank(cells));

    let (_, headers) = lines
        .next()
        .ok_or_else(|| ServiceError::ImportError("File is empty".to_string()))?;
    let columns = ColumnMap::from_headers(headers.as_slice())?;

    let mut sheet = ParsedSheet::default();
    for (row, cells) in lines {
        sheet.rows_read += 1;
        match parse_record(&columns, row, &cells) {
            Ok(record) => sheet.records.push(record),
            Err(message) => sheet.errors.push(RowError { row, message }),
        }
    }
    Ok(sheet)
}

fn parse_record(columns: &ColumnMap, row: usize, cells: &[String]) -> Result<SalesRecord, String> {
    let material = columns
        .cell(cells, Field::Material)
        .ok_or_else(|| "material is blank".to_string())?
        .to_uppercase();
    let branch = columns
        .cell(cells, Field::Branch)
        .ok_or_else(|| "branch is blank".to_string())?
        .to_string();

    let text = |field| columns.cell(cells, field).map(str::to_string);

    let star_rating = match columns.cell(cells, Field::StarRating) {
        Some(raw) => {
            let stars = parse_quantity(raw, Field::StarRating)?;
            if stars > 5 {
                return Err(format!("star_rating {} is outside 0..=5", stars));
            }
            Some(stars as i32)
        }
        None => None,
    };
    let tonnage = match columns.cell(cells, Field::Tonnage) {
        Some(raw) => {
            let tons = parse_float(raw, Field::Tonnage)?;
            if tons <= 0.0 {
                return Err("tonnage must be greater than 0".to_string());
            }
            Some(tons)
        }
        None => None,
    };
    let price = match columns.cell(cells, Field::Price) {
        Some(raw) => {
            let cleaned = strip_number(raw);
            let price = Decimal::from_str(&cleaned)
                .or_else(|_| Decimal::from_scientific(&cleaned))
                .map_err(|_| invalid(raw, Field::Price))?;
            if price.is_sign_negative() && !price.is_zero() {
                return Err("price cannot be negative".to_string());
            }
            Some(price.round_dp(2))
        }
        None => None,
    };

    let quantity = |field| -> Result<Option<i64>, String> {
        columns
            .cell(cells, field)
            .map(|raw| parse_quantity(raw, field))
            .transpose()
    };
    let percent = |field| -> Result<Option<f64>, String> {
        match columns.cell(cells, field) {
            Some(raw) => {
                let value = parse_float(raw.trim_end_matches('%'), field)?;
                if !(0.0..=100.0).contains(&value) {
                    return Err(format!("{} {} is outside 0..=100", field.as_ref(), value));
                }
                Ok(Some(value))
            }
            None => Ok(None),
        }
    };

    Ok(SalesRecord {
        row,
        material,
        branch,
        state: text(Field::State),
        technology: text(Field::Technology),
        tonnage,
        star_rating,
        price,
        factory_stock: quantity(Field::FactoryStock)?,
        billing: quantity(Field::Billing)?.unwrap_or(0),
        monthly_plan: quantity(Field::MonthlyPlan)?.unwrap_or(0),
        opening_stock: quantity(Field::OpeningStock)?,
        available_stock: quantity(Field::AvailableStock)?,
        in_transit_stock: quantity(Field::InTransitStock)?,
        market_share: percent(Field::MarketShare)?,
        penetration: percent(Field::Penetration)?,
    })
}

fn strip_number(raw: &str) -> String {
    raw.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect()
}

fn invalid(raw: &str, field: Field) -> String {
    format!("invalid number '{}' in column {}", raw, field.as_ref())
}

fn parse_float(raw: &str, field: Field) -> Result<f64, String> {
    strip_number(raw)
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| invalid(raw, field))
}

/// Whole, non-negative quantity; spreadsheet decimals are rounded.
fn parse_quantity(raw: &str, field: Field) -> Result<i64, String> {
    let value = parse_float(raw, field)?.round();
    if value < 0.0 {
        return Err(format!("{} cannot be negative", field.as_ref()));
    }
    if value > i32::MAX as f64 {
        return Err(format!("{} is too large", field.as_ref()));
    }
    Ok(value as i64)
}
