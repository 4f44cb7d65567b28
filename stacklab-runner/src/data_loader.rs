//! Bar loading from CSV files.
//!
//! Two layouts are accepted:
//! - single-symbol OHLCV files (`Date,Open,High,Low,Close,Volume`, with
//!   common aliases for the date column and `Adj Close` as a fallback close)
//! - panel files with one row per `(Date, Ticker)`, where the requested
//!   symbol is matched after dropping its exchange suffix and leading zeros
//!
//! Both paths end in [`canonicalize`], so callers always receive a sorted,
//! de-duplicated, finite bar table.

use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use csv::StringRecord;
use stacklab_core::data::{canonicalize, DataError};
use stacklab_core::domain::Bar;
use thiserror::Error;
use tracing::info;

use crate::config::{DataSource, Window};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("line {line}: cannot parse date '{value}'")]
    BadDate { line: u64, value: String },

    #[error("line {line}: cannot parse {column} value '{value}'")]
    BadNumber {
        line: u64,
        column: &'static str,
        value: String,
    },

    #[error("no rows for symbol '{0}' in panel file")]
    SymbolNotFound(String),

    #[error("data error: {0}")]
    Data(#[from] DataError),
}

const DATE_ALIASES: [&str; 4] = ["date", "datetime", "timestamp", "time"];
const PANEL_DATE_ALIASES: [&str; 2] = ["date", "time"];
const TICKER_ALIASES: [&str; 2] = ["ticker", "symbol"];

/// Column positions resolved from a header row.
#[derive(Debug, Clone, Copy)]
struct Columns {
    date: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
}

fn find(headers: &StringRecord, names: &[&str]) -> Option<usize> {
    names.iter().find_map(|name| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    })
}

fn require(headers: &StringRecord, name: &'static str) -> Result<usize, LoadError> {
    find(headers, &[name]).ok_or(LoadError::MissingColumn(name))
}

fn resolve_columns(
    headers: &StringRecord,
    date_aliases: &[&str],
    require_volume: bool,
) -> Result<Columns, LoadError> {
    let date = find(headers, date_aliases).ok_or(LoadError::MissingColumn("Date"))?;
    // Close wins over Adj Close when both are present
    let close = find(headers, &["close"])
        .or_else(|| find(headers, &["adj close", "adjclose"]))
        .ok_or(LoadError::MissingColumn("Close"))?;
    let volume = match find(headers, &["volume"]) {
        None if require_volume => return Err(LoadError::MissingColumn("Volume")),
        v => v,
    };
    Ok(Columns {
        date,
        open: require(headers, "Open")?,
        high: require(headers, "High")?,
        low: require(headers, "Low")?,
        close,
        volume,
    })
}

/// Parse the calendar date at the start of a date or datetime string.
///
/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD` and `YYYYMMDD`, optionally followed by
/// a time part (which is discarded).
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let s = value.trim();
    let head = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(head, "%Y/%m/%d"))
        .or_else(|_| NaiveDate::parse_from_str(s.get(..8).unwrap_or(s), "%Y%m%d"))
        .ok()
}

/// Empty cells read as NaN and are rejected later by canonicalization.
fn parse_number(
    record: &StringRecord,
    idx: usize,
    column: &'static str,
    line: u64,
) -> Result<f64, LoadError> {
    let raw = record.get(idx).unwrap_or("").trim();
    if raw.is_empty() {
        return Ok(f64::NAN);
    }
    raw.parse().map_err(|_| LoadError::BadNumber {
        line,
        column,
        value: raw.to_string(),
    })
}

fn parse_bar(record: &StringRecord, cols: &Columns) -> Result<Bar, LoadError> {
    let line = record.position().map_or(0, |p| p.line());
    let raw_date = record.get(cols.date).unwrap_or("");
    let date = parse_date(raw_date).ok_or_else(|| LoadError::BadDate {
        line,
        value: raw_date.to_string(),
    })?;
    Ok(Bar {
        date,
        open: parse_number(record, cols.open, "Open", line)?,
        high: parse_number(record, cols.high, "High", line)?,
        low: parse_number(record, cols.low, "Low", line)?,
        close: parse_number(record, cols.close, "Close", line)?,
        volume: match cols.volume {
            Some(idx) => parse_number(record, idx, "Volume", line)?,
            None => 0.0,
        },
    })
}

fn reader<R: Read>(source: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(source)
}

// ─── Single-symbol files ─────────────────────────────────────────────

/// Read a single-symbol OHLCV table from any reader.
pub fn read_csv<R: Read>(source: R) -> Result<Vec<Bar>, LoadError> {
    let mut rdr = reader(source);
    let headers = rdr.headers()?.clone();
    let cols = resolve_columns(&headers, &DATE_ALIASES, true)?;

    let mut bars = Vec::new();
    for record in rdr.records() {
        bars.push(parse_bar(&record?, &cols)?);
    }
    Ok(canonicalize(bars)?)
}

/// Load a single-symbol OHLCV CSV file.
pub fn load_csv(path: &Path, symbol: &str) -> Result<Vec<Bar>, LoadError> {
    let file = std::fs::File::open(path).map_err(csv::Error::from)?;
    let bars = read_csv(file)?;
    log_loaded(symbol, &bars);
    Ok(bars)
}

// ─── Panel files ─────────────────────────────────────────────────────

/// `"005930.KS"` and `"5930"` both normalize to `"5930"`.
pub fn normalize_ticker(ticker: &str) -> &str {
    let base = ticker.trim().split('.').next().unwrap_or("");
    base.trim_start_matches('0')
}

/// Read the rows of one symbol from a panel table, restricted to `range`.
pub fn read_panel_csv<R: Read>(
    source: R,
    symbol: &str,
    range: Window,
) -> Result<Vec<Bar>, LoadError> {
    let mut rdr = reader(source);
    let headers = rdr.headers()?.clone();
    let cols = resolve_columns(&headers, &PANEL_DATE_ALIASES, false)?;
    let ticker_col = find(&headers, &TICKER_ALIASES).ok_or(LoadError::MissingColumn("Ticker"))?;
    let wanted = normalize_ticker(symbol);

    let mut bars = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let ticker = record.get(ticker_col).unwrap_or("").trim();
        if ticker.trim_start_matches('0') != wanted {
            continue;
        }
        let bar = parse_bar(&record, &cols)?;
        if range.contains(bar.date) {
            bars.push(bar);
        }
    }

    if bars.is_empty() {
        return Err(LoadError::SymbolNotFound(symbol.to_string()));
    }
    Ok(canonicalize(bars)?)
}

/// Load one symbol from a panel CSV file.
pub fn load_panel_csv(path: &Path, symbol: &str, range: Window) -> Result<Vec<Bar>, LoadError> {
    let file = std::fs::File::open(path).map_err(csv::Error::from)?;
    let bars = read_panel_csv(file, symbol, range)?;
    log_loaded(symbol, &bars);
    Ok(bars)
}

/// Load bars for `symbol` from either layout, restricted to `range`.
pub fn load_source(source: &DataSource, symbol: &str, range: Window) -> Result<Vec<Bar>, LoadError> {
    match source {
        DataSource::Csv(path) => {
            let mut bars = load_csv(path, symbol)?;
            bars.retain(|b| range.contains(b.date));
            if bars.is_empty() {
                return Err(DataError::Empty.into());
            }
            Ok(bars)
        }
        DataSource::Panel(path) => load_panel_csv(path, symbol, range),
    }
}

fn log_loaded(symbol: &str, bars: &[Bar]) {
    if let (Some(first), Some(last)) = (bars.first(), bars.last()) {
        info!(
            symbol,
            bars = bars.len(),
            first = %first.date,
            last = %last.date,
            "loaded bars"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn single_file_sorts_and_dedups() {
        let data = "\
Date,Open,High,Low,Close,Volume
2020-01-03,3,4,2,3.5,100
2020-01-02,1,2,0.5,1.5,100
2020-01-03,5,6,4,5.5,200
";
        let bars = read_csv(data.as_bytes()).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, date(2020, 1, 2));
        // last row of the duplicated date wins
        assert_eq!(bars[1].close, 5.5);
        assert_eq!(bars[1].volume, 200.0);
    }

    #[test]
    fn case_insensitive_headers_and_datetime_alias() {
        let data = "\
timestamp,OPEN,high,Low,close,VOLUME
2020-01-02 00:00:00,1,2,0.5,1.5,10
";
        let bars = read_csv(data.as_bytes()).unwrap();
        assert_eq!(bars[0].date, date(2020, 1, 2));
        assert_eq!(bars[0].open, 1.0);
    }

    #[test]
    fn adj_close_only_used_without_close() {
        let both = "\
Date,Open,High,Low,Close,Adj Close,Volume
2020-01-02,1,2,0.5,1.5,1.2,10
";
        assert_eq!(read_csv(both.as_bytes()).unwrap()[0].close, 1.5);

        let adj_only = "\
Date,Open,High,Low,Adj Close,Volume
2020-01-02,1,2,0.5,1.2,10
";
        assert_eq!(read_csv(adj_only.as_bytes()).unwrap()[0].close, 1.2);
    }

    #[test]
    fn missing_volume_is_an_error_for_single_files() {
        let data = "Date,Open,High,Low,Close\n2020-01-02,1,2,0.5,1.5\n";
        assert!(matches!(
            read_csv(data.as_bytes()),
            Err(LoadError::MissingColumn("Volume"))
        ));
    }

    #[test]
    fn empty_cell_is_rejected_as_non_finite() {
        let data = "Date,Open,High,Low,Close,Volume\n2020-01-02,1,2,0.5,,10\n";
        assert!(matches!(
            read_csv(data.as_bytes()),
            Err(LoadError::Data(DataError::NonFinite { field: "Close", .. }))
        ));
    }

    #[test]
    fn garbage_number_reports_line() {
        let data = "Date,Open,High,Low,Close,Volume\n2020-01-02,1,2,x,1.5,10\n";
        match read_csv(data.as_bytes()) {
            Err(LoadError::BadNumber { line, column, .. }) => {
                assert_eq!(line, 2);
                assert_eq!(column, "Low");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn header_only_file_is_empty() {
        let data = "Date,Open,High,Low,Close,Volume\n";
        assert!(matches!(
            read_csv(data.as_bytes()),
            Err(LoadError::Data(DataError::Empty))
        ));
    }

    #[test]
    fn ticker_normalization() {
        assert_eq!(normalize_ticker("005930.KS"), "5930");
        assert_eq!(normalize_ticker("5930"), "5930");
        assert_eq!(normalize_ticker(" 000660 "), "660");
        assert_eq!(normalize_ticker("AAPL"), "AAPL");
    }

    #[test]
    fn panel_filters_symbol_and_range() {
        let data = "\
Date,Ticker,Open,High,Low,Close
2020-01-02,5930,1,2,0.5,1.5
2020-01-02,660,9,9,9,9
2020-01-03,005930,2,3,1.5,2.5
2020-01-06,5930,3,4,2.5,3.5
";
        let range = Window::new(None, Some(date(2020, 1, 3)));
        let bars = read_panel_csv(data.as_bytes(), "005930.KS", range).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].close, 2.5);
        // Volume column absent: zero-filled
        assert!(bars.iter().all(|b| b.volume == 0.0));
    }

    #[test]
    fn panel_unknown_symbol() {
        let data = "Date,Ticker,Open,High,Low,Close\n2020-01-02,5930,1,2,0.5,1.5\n";
        assert!(matches!(
            read_panel_csv(data.as_bytes(), "000660.KS", Window::unbounded()),
            Err(LoadError::SymbolNotFound(_))
        ));
    }

    #[test]
    fn date_formats() {
        assert_eq!(parse_date("2020-01-02"), Some(date(2020, 1, 2)));
        assert_eq!(parse_date("2020/01/02"), Some(date(2020, 1, 2)));
        assert_eq!(parse_date("20200102"), Some(date(2020, 1, 2)));
        assert_eq!(parse_date("2020-01-02T09:00:00+09:00"), Some(date(2020, 1, 2)));
        assert_eq!(parse_date("yesterday"), None);
    }
}
