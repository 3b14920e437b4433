// 📂 Source Tables - typed raw records loaded from CSV exports
//
// Format adapters only produce parsed record values; resolution into
// canonical entities happens in each adapter's `resolve`/`to_stop`.

pub mod naptan;
pub mod noc;

pub use naptan::{load_stop_points, StopPointRecord};
pub use noc::{
    GroupRecord, ManagementDivisionRecord, NocLineRecord, NocTableRecord, NocTables,
    OperatorRecord, PublicNameRecord,
};

use csv::ReaderBuilder;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::path::Path;

use crate::error::SourceError;

/// Deserialize every row of a headered CSV file.
pub fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, SourceError> {
    if !path.exists() {
        return Err(SourceError::MissingTable(path.to_path_buf()));
    }

    let csv_err = |source| SourceError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(|e| csv_err(csv::Error::from(e)))?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(file);

    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(csv_err)
}
