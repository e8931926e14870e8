/*!
CSV bar storage: one `<SYMBOL>.csv` file per symbol, with a `date,open,high,low,close,volume` header
*/
use super::{clean_bars, Bar, DataError, MarketData};
use chrono::NaiveDate;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use tracing::debug;

/// Read bar data from a Reader, skipping records which fail to parse
pub fn read_bars<R: Read>(rdr: R) -> Result<Vec<Bar>, DataError> {
    let mut bars = Vec::new();
    let mut skipped = 0;
    for result in deserialize_bars(rdr) {
        match result {
            Ok(bar) => bars.push(bar),
            Err(err) if err.is_io_error() => return Err(err.into()),
            Err(_) => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!("skipped {} malformed bar records", skipped);
    }
    Ok(bars)
}

/// Deserialize bar data
pub fn deserialize_bars<R: Read>(rdr: R) -> impl Iterator<Item = Result<Bar, ::csv::Error>> {
    ::csv::Reader::from_reader(rdr).into_deserialize()
}

/// Write bar data to a Writer
/// On success, return how many bars were written
pub fn write_bars<W, I>(wtr: W, bars: I) -> Result<usize, DataError>
where
    W: Write,
    I: IntoIterator<Item = Bar>,
{
    let mut wtr = ::csv::Writer::from_writer(wtr);
    let mut written = 0;
    for bar in bars {
        wtr.serialize(bar)?;
        written += 1;
    }
    wtr.flush()?;
    Ok(written)
}

/// A directory of per-symbol CSV files
#[derive(Debug, Clone)]
pub struct CsvDirectory {
    /// The directory holding the files
    pub dir: PathBuf,
}

impl CsvDirectory {
    /// Use the given directory
    pub fn new(dir: impl Into<PathBuf>) -> CsvDirectory {
        CsvDirectory { dir: dir.into() }
    }
    /// The file holding a symbol's bars
    pub fn path(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", symbol))
    }
    /// Overwrite a symbol's file with the given bars
    pub fn store(&self, symbol: &str, bars: &[Bar]) -> Result<usize, DataError> {
        std::fs::create_dir_all(&self.dir)?;
        let file = File::create(self.path(symbol))?;
        write_bars(file, bars.iter().copied())
    }
}

impl MarketData for CsvDirectory {
    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Bar>, DataError> {
        let path = self.path(symbol);
        if !path.exists() {
            return Err(DataError::Unavailable {
                symbol: symbol.to_string(),
            });
        }
        let bars = clean_bars(read_bars(File::open(&path)?)?, start, end);
        if bars.is_empty() {
            return Err(DataError::NoData {
                symbol: symbol.to_string(),
            });
        }
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "date,open,high,low,close,volume
2024-01-02,10.0,11.0,9.5,10.5,1000
2024-01-03,10.5,12.0,10.0,11.5,1500
not-a-date,1,1,1,1,1
2024-01-04,11.5,11.5,10.5,11.0,900
";

    #[test]
    fn malformed_records_are_skipped() {
        let bars = read_bars(SAMPLE.as_bytes()).unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[1].close, 11.5);
        assert_eq!(bars[2].volume, 900.0);
    }

    #[test]
    fn directory_filters_range() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvDirectory::new(dir.path());
        let bars = read_bars(SAMPLE.as_bytes()).unwrap();
        assert_eq!(store.store("TEST", &bars).unwrap(), 3);

        let start = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 4).unwrap();
        let fetched = store.fetch("TEST", start, end).unwrap();
        assert_eq!(fetched, vec![bars[1]]);

        let late = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert!(matches!(
            store.fetch("TEST", late, late.succ_opt().unwrap()),
            Err(DataError::NoData { .. })
        ));
        assert!(matches!(
            store.fetch("MISSING", start, end),
            Err(DataError::Unavailable { .. })
        ));
    }
}
