//! CSV listing loader
//!
//! Reads the listing CSV, enforces the required columns and turns each
//! usable row into a [`Listing`]. Rows that cannot be used are skipped and
//! counted in a [`LoadReport`] rather than aborting the load.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::{info, warn};

use crate::errors::{PricingError, Result};
use crate::listing::{Listing, NumericColumn, PropertyType};

/// Target column name
pub const PRICE_COLUMN: &str = "Price";
/// Categorical property-type column name
pub const TYPE_COLUMN: &str = "Type";

/// Columns that must be present in the CSV header, checked in this order
pub const REQUIRED_COLUMNS: [&str; 5] = [PRICE_COLUMN, "Rooms", TYPE_COLUMN, "Postcode", "Distance"];

/// One CSV row as JSON values, keyed by header name
pub type RawRecord = Map<String, Value>;

/// Options applied while loading
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Fill missing prices with the median of the present ones
    pub impute_missing_price: bool,
}

/// Row accounting for a single load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub total_rows: usize,
    pub skipped_invalid: usize,
    pub skipped_unknown_type: usize,
    pub skipped_missing_price: usize,
    pub imputed_prices: usize,
}

/// Loaded listing dataset
#[derive(Debug, Clone)]
pub struct Dataset {
    pub listings: Vec<Listing>,
    /// Numeric feature columns in CSV header order
    pub numeric_columns: Vec<NumericColumn>,
    pub report: LoadReport,
}

struct ColumnIndex {
    price: usize,
    rooms: usize,
    property_type: usize,
    postcode: usize,
    distance: usize,
}

/// Row parsed before price imputation
struct PendingRow {
    rooms: u32,
    property_type: PropertyType,
    postcode: u32,
    distance: f64,
    price: Option<f64>,
}

impl Dataset {
    /// Load the listing CSV at `path`
    pub fn load<P: AsRef<Path>>(path: P, options: LoadOptions) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PricingError::DatasetNotFound(path.to_path_buf()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(path)?;

        let headers = reader.headers()?.clone();
        let columns = resolve_columns(&headers)?;
        let numeric_columns: Vec<NumericColumn> =
            headers.iter().filter_map(NumericColumn::from_name).collect();

        let mut report = LoadReport::default();
        let mut pending = Vec::new();

        for record in reader.records() {
            let record = record?;
            report.total_rows += 1;

            let field = |idx: usize| record.get(idx).unwrap_or("");

            let property_type = match PropertyType::from_code(field(columns.property_type)) {
                Some(ty) => ty,
                None => {
                    report.skipped_unknown_type += 1;
                    continue;
                }
            };

            let (rooms, postcode, distance) = match (
                parse_count(field(columns.rooms)),
                parse_count(field(columns.postcode)),
                parse_distance(field(columns.distance)),
            ) {
                (Some(r), Some(p), Some(d)) => (r, p, d),
                _ => {
                    report.skipped_invalid += 1;
                    continue;
                }
            };

            let price = match field(columns.price) {
                "" => None,
                raw => match parse_float(raw) {
                    Some(price) => Some(price),
                    None => {
                        report.skipped_invalid += 1;
                        continue;
                    }
                },
            };

            pending.push(PendingRow {
                rooms,
                property_type,
                postcode,
                distance,
                price,
            });
        }

        let listings = resolve_prices(pending, options, &mut report)?;

        if report.skipped_invalid > 0 || report.skipped_unknown_type > 0 {
            warn!(
                "Skipped {} malformed rows and {} rows with unknown property type",
                report.skipped_invalid, report.skipped_unknown_type
            );
        }
        if report.imputed_prices > 0 {
            info!("Imputed {} missing prices with the median", report.imputed_prices);
        }
        info!(
            "Loaded {} listings from {} ({} rows read)",
            listings.len(),
            path.display(),
            report.total_rows
        );

        Ok(Self {
            listings,
            numeric_columns,
            report,
        })
    }

    /// Get number of listings
    pub fn len(&self) -> usize {
        self.listings.len()
    }

    /// Check if dataset is empty
    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    /// Target values in row order
    pub fn prices(&self) -> Vec<f64> {
        self.listings.iter().map(|l| l.price).collect()
    }
}

fn resolve_columns(headers: &csv::StringRecord) -> Result<ColumnIndex> {
    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| PricingError::MissingColumn(name.to_string()))
    };

    for name in REQUIRED_COLUMNS {
        find(name)?;
    }

    Ok(ColumnIndex {
        price: find(PRICE_COLUMN)?,
        rooms: find("Rooms")?,
        property_type: find(TYPE_COLUMN)?,
        postcode: find("Postcode")?,
        distance: find("Distance")?,
    })
}

fn resolve_prices(
    pending: Vec<PendingRow>,
    options: LoadOptions,
    report: &mut LoadReport,
) -> Result<Vec<Listing>> {
    let present: Vec<f64> = pending.iter().filter_map(|row| row.price).collect();
    let fill = if options.impute_missing_price && present.len() < pending.len() {
        if present.is_empty() {
            return Err(PricingError::EmptyDataset(
                "no prices available to impute from".to_string(),
            ));
        }
        Some(median(&present))
    } else {
        None
    };

    let mut listings = Vec::with_capacity(pending.len());
    for row in pending {
        let price = match (row.price, fill) {
            (Some(price), _) => price,
            (None, Some(median)) => {
                report.imputed_prices += 1;
                median
            }
            (None, None) => {
                report.skipped_missing_price += 1;
                continue;
            }
        };
        listings.push(Listing::new(
            row.rooms,
            row.property_type,
            row.postcode,
            row.distance,
            price,
        ));
    }

    if listings.is_empty() {
        return Err(PricingError::EmptyDataset("no usable listing rows".to_string()));
    }

    Ok(listings)
}

/// Median with the midpoint convention for even lengths
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Parse a non-negative whole number; accepts `3` and `3.0`
fn parse_count(raw: &str) -> Option<u32> {
    if let Ok(v) = raw.parse::<u32>() {
        return Some(v);
    }
    let v = raw.parse::<f64>().ok()?;
    if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= u32::MAX as f64 {
        Some(v as u32)
    } else {
        None
    }
}

fn parse_float(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Finite and non-negative, the same range the predictor accepts
fn parse_distance(raw: &str) -> Option<f64> {
    parse_float(raw).filter(|&v| v >= 0.0)
}

/// Read every row of the CSV as JSON objects, without any cleaning
pub fn read_raw_records<P: AsRef<Path>>(path: P) -> Result<Vec<RawRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PricingError::DatasetNotFound(path.to_path_buf()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row = Map::with_capacity(headers.len());
        for (idx, name) in headers.iter().enumerate() {
            row.insert(name.to_string(), raw_value(record.get(idx).unwrap_or("")));
        }
        rows.push(row);
    }

    Ok(rows)
}

fn raw_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(int) = raw.parse::<i64>() {
        return Value::Number(int.into());
    }
    if let Some(number) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(number);
    }
    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_csv() {
        let file = write_csv(&[
            "Rooms,Type,Price,Postcode,Distance",
            "2,h,1035000,3067,2.5",
            "3,t,1465000,3067,2.5",
            "1,u,300000.0,3000,1.0",
        ]);
        let dataset = Dataset::load(file.path(), LoadOptions::default()).unwrap();

        assert_eq!(dataset.len(), 3);
        assert_eq!(
            dataset.numeric_columns,
            vec![NumericColumn::Rooms, NumericColumn::Postcode, NumericColumn::Distance]
        );
        assert_eq!(dataset.listings[1].property_type, PropertyType::Townhouse);
        assert_eq!(dataset.listings[2].price, 300_000.0);
    }

    #[test]
    fn test_missing_price_column_is_fatal() {
        let file = write_csv(&["Rooms,Type,Postcode,Distance", "2,h,3067,2.5"]);
        let err = Dataset::load(file.path(), LoadOptions::default()).unwrap_err();
        assert!(matches!(err, PricingError::MissingColumn(ref c) if c == "Price"));
    }

    #[test]
    fn test_missing_file() {
        let err = Dataset::load("/nonexistent/listings.csv", LoadOptions::default()).unwrap_err();
        assert!(matches!(err, PricingError::DatasetNotFound(_)));
    }

    #[test]
    fn test_skips_bad_rows() {
        let file = write_csv(&[
            "Rooms,Type,Price,Postcode,Distance",
            "2,h,1035000,3067,2.5",
            "x,h,1035000,3067,2.5",
            "2,z,1035000,3067,2.5",
            "2,u,,3067,2.5",
            "3,t,880000,3067,-1",
            "3,t,880000,3067,0",
        ]);
        let dataset = Dataset::load(file.path(), LoadOptions::default()).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.report.skipped_invalid, 2);
        assert!(dataset.listings.iter().all(|l| l.distance >= 0.0));
        assert_eq!(dataset.report.skipped_unknown_type, 1);
        assert_eq!(dataset.report.skipped_missing_price, 1);
    }

    #[test]
    fn test_median_imputation() {
        let file = write_csv(&[
            "Rooms,Type,Price,Postcode,Distance",
            "2,h,100,3067,2.5",
            "2,h,300,3067,2.5",
            "2,u,,3067,2.5",
        ]);
        let options = LoadOptions {
            impute_missing_price: true,
        };
        let dataset = Dataset::load(file.path(), options).unwrap();

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.listings[2].price, 200.0);
        assert_eq!(dataset.report.imputed_prices, 1);
    }

    #[test]
    fn test_header_order_drives_numeric_columns() {
        let file = write_csv(&["Distance,Price,Type,Postcode,Rooms", "2.5,100,h,3067,2"]);
        let dataset = Dataset::load(file.path(), LoadOptions::default()).unwrap();
        assert_eq!(
            dataset.numeric_columns,
            vec![NumericColumn::Distance, NumericColumn::Postcode, NumericColumn::Rooms]
        );
    }

    #[test]
    fn test_raw_records() {
        let file = write_csv(&[
            "Suburb,Rooms,Type,Price,Postcode,Distance",
            "Abbotsford,2,h,1035000,3067,2.5",
            "Richmond,3,t,,3121,",
        ]);
        let rows = read_raw_records(file.path()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Suburb"], Value::String("Abbotsford".into()));
        assert_eq!(rows[0]["Rooms"], Value::from(2));
        assert_eq!(rows[0]["Distance"], Value::from(2.5));
        assert_eq!(rows[1]["Price"], Value::Null);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert!(median(&[]).is_nan());
    }
}
