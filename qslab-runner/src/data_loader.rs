//! Daily bar loading from CSV files.
//!
//! Each asset reads `<csv_dir>/<TICKER>.csv` with the columns
//! `Date,Open,High,Low,Close,Adj Close,Volume`. The ticker is the asset id
//! with any `EQ:`-style prefix removed, so `EQ:SPY` reads `SPY.csv`.
//!
//! Every bar becomes two quotes: the open at 14:30 UTC and the close at
//! 21:00 UTC, each with bid = ask. Non-business-day rows are skipped.

use chrono::{NaiveDate, NaiveDateTime};
use qslab_core::calendar::{self, MARKET_CLOSE, MARKET_OPEN};
use qslab_core::{Quote, QuoteBook};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no price file for '{asset}' at {path}")]
    MissingFile { asset: String, path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} row {row}: invalid date '{value}'")]
    BadDate {
        path: PathBuf,
        row: usize,
        value: String,
    },

    #[error("{path} row {row}: invalid price {price}")]
    BadPrice { path: PathBuf, row: usize, price: f64 },

    #[error("no usable rows in {0}")]
    Empty(PathBuf),
}

/// One row of a daily bar file.
#[derive(Debug, Clone, Deserialize)]
struct DailyBarRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Open")]
    open: f64,
    #[serde(rename = "Close")]
    close: f64,
}

/// Quotes loaded for a set of assets, with provenance.
#[derive(Debug)]
pub struct LoadedQuotes {
    pub book: QuoteBook,
    /// Bars read per asset.
    pub bar_counts: BTreeMap<String, usize>,
    /// BLAKE3 over every file's bytes, in asset order.
    pub dataset_hash: String,
}

/// Reads daily bar CSV files from one directory.
#[derive(Debug, Clone)]
pub struct CsvDailyBarSource {
    dir: PathBuf,
}

impl CsvDailyBarSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that holds bars for `asset`.
    pub fn path_for(&self, asset: &str) -> PathBuf {
        let ticker = asset.rsplit(':').next().unwrap_or(asset);
        self.dir.join(format!("{ticker}.csv"))
    }

    /// Load every asset into one quote book.
    pub fn load(&self, assets: &[String]) -> Result<LoadedQuotes, LoadError> {
        let mut book = QuoteBook::new();
        let mut bar_counts = BTreeMap::new();
        let mut hasher = blake3::Hasher::new();

        let mut sorted: Vec<&String> = assets.iter().collect();
        sorted.sort();
        sorted.dedup();

        for asset in sorted {
            let path = self.path_for(asset);
            if !path.exists() {
                return Err(LoadError::MissingFile {
                    asset: asset.clone(),
                    path,
                });
            }
            let bytes = std::fs::read(&path).map_err(|source| LoadError::Io {
                path: path.clone(),
                source,
            })?;
            hasher.update(asset.as_bytes());
            hasher.update(&bytes);

            let count = load_bars_into(&mut book, asset, &path, &bytes)?;
            debug!(
                asset = %asset,
                bars = count,
                quotes = book.len_for(asset),
                path = %path.display(),
                "loaded daily bars"
            );
            bar_counts.insert(asset.clone(), count);
        }

        let dataset_hash = hasher.finalize().to_hex().to_string();
        info!(assets = bar_counts.len(), %dataset_hash, "quote data loaded");
        Ok(LoadedQuotes {
            book,
            bar_counts,
            dataset_hash,
        })
    }
}

fn load_bars_into(
    book: &mut QuoteBook,
    asset: &str,
    path: &Path,
    bytes: &[u8],
) -> Result<usize, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(bytes);
    let mut count = 0;

    for (i, rec) in rdr.deserialize::<DailyBarRow>().enumerate() {
        let row_no = i + 2;
        let row = rec.map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let date = parse_date(&row.date).ok_or_else(|| LoadError::BadDate {
            path: path.to_path_buf(),
            row: row_no,
            value: row.date.clone(),
        })?;
        for price in [row.open, row.close] {
            if !price.is_finite() || price <= 0.0 {
                return Err(LoadError::BadPrice {
                    path: path.to_path_buf(),
                    row: row_no,
                    price,
                });
            }
        }
        if !calendar::is_business_day(date) {
            continue;
        }
        book.insert(asset, calendar::at(date, MARKET_OPEN), Quote::flat(row.open));
        book.insert(asset, calendar::at(date, MARKET_CLOSE), Quote::flat(row.close));
        count += 1;
    }

    if count == 0 {
        return Err(LoadError::Empty(path.to_path_buf()));
    }
    Ok(count)
}

/// Accepts `YYYY-MM-DD` with an optional ` HH:MM:SS` suffix.
fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use qslab_core::QuoteSource;

    const SPY: &str = "\
Date,Open,High,Low,Close,Adj Close,Volume
2019-01-02,245.98,251.21,245.95,250.18,238.07,126925200
2019-01-03,248.23,248.57,243.67,244.21,232.39,144140700
2019-01-05,1.0,1.0,1.0,1.0,1.0,0
";

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn loads_open_and_close_quotes() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "SPY.csv", SPY);
        let source = CsvDailyBarSource::new(tmp.path());
        let loaded = source.load(&["EQ:SPY".to_string()]).unwrap();

        // The Saturday row is skipped.
        assert_eq!(loaded.bar_counts["EQ:SPY"], 2);
        assert_eq!(loaded.book.len_for("EQ:SPY"), 4);
        assert_eq!(loaded.book.len_for("EQ:QQQ"), 0);
        let open = Utc.with_ymd_and_hms(2019, 1, 2, 14, 30, 0).unwrap();
        let close = Utc.with_ymd_and_hms(2019, 1, 2, 21, 0, 0).unwrap();
        assert_eq!(loaded.book.bid_ask("EQ:SPY", open).unwrap(), Quote::flat(245.98));
        assert_eq!(loaded.book.bid_ask("EQ:SPY", close).unwrap(), Quote::flat(250.18));

        // Between the close and next open the close is still the latest quote.
        let overnight = Utc.with_ymd_and_hms(2019, 1, 3, 10, 0, 0).unwrap();
        assert_eq!(loaded.book.bid_ask("EQ:SPY", overnight).unwrap().mid(), 250.18);
    }

    #[test]
    fn prefix_is_stripped_from_file_name() {
        let source = CsvDailyBarSource::new("/data");
        assert_eq!(source.path_for("EQ:SPY"), PathBuf::from("/data/SPY.csv"));
        assert_eq!(source.path_for("AGG"), PathBuf::from("/data/AGG.csv"));
    }

    #[test]
    fn missing_file_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let err = CsvDailyBarSource::new(tmp.path())
            .load(&["EQ:NOPE".to_string()])
            .unwrap_err();
        assert!(matches!(err, LoadError::MissingFile { ref asset, .. } if asset == "EQ:NOPE"));
    }

    #[test]
    fn bad_date_reports_row_number() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "BAD.csv",
            "Date,Open,High,Low,Close,Adj Close,Volume\n2019-01-02,1,1,1,1,1,1\n02/01/2019,1,1,1,1,1,1\n",
        );
        let err = CsvDailyBarSource::new(tmp.path())
            .load(&["BAD".to_string()])
            .unwrap_err();
        assert!(matches!(err, LoadError::BadDate { row: 3, .. }));
    }

    #[test]
    fn non_positive_price_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "ZERO.csv",
            "Date,Open,High,Low,Close,Adj Close,Volume\n2019-01-02,0,1,1,1,1,1\n",
        );
        let err = CsvDailyBarSource::new(tmp.path())
            .load(&["ZERO".to_string()])
            .unwrap_err();
        assert!(matches!(err, LoadError::BadPrice { row: 2, .. }));
    }

    #[test]
    fn dataset_hash_tracks_content() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "SPY.csv", SPY);
        let source = CsvDailyBarSource::new(tmp.path());
        let assets = ["EQ:SPY".to_string()];
        let a = source.load(&assets).unwrap().dataset_hash;
        let b = source.load(&assets).unwrap().dataset_hash;
        assert_eq!(a, b);

        write(tmp.path(), "SPY.csv", &SPY.replace("250.18", "250.19"));
        let c = source.load(&assets).unwrap().dataset_hash;
        assert_ne!(a, c);
    }

    #[test]
    fn datetime_suffix_is_accepted() {
        assert_eq!(
            parse_date("2019-01-02 00:00:00"),
            NaiveDate::from_ymd_opt(2019, 1, 2)
        );
        assert_eq!(parse_date("2019-13-02"), None);
    }
}
