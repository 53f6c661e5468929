//! Country identifier tables built from the ISO-2 keyed JSON maps.

use std::collections::BTreeMap;
use std::path::Path;

use log::info;
use polars::prelude::*;

use crate::error::TransRiskResult;
use crate::io::{read_json_mapping, require_file};
use crate::COL;

/// ISO-2 to ISO-3 and ISO-2 to country name tables.
#[derive(Debug, Clone)]
pub struct CountryIdentifiers {
    pub iso2_to_iso3: DataFrame,
    pub iso2_to_name: DataFrame,
}

fn mapping_frame(mapping: &BTreeMap<String, String>, value_column: &str) -> PolarsResult<DataFrame> {
    let (keys, values): (Vec<&str>, Vec<&str>) = mapping
        .iter()
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .unzip();
    DataFrame::new(vec![
        Series::new(COL::ISO2, keys),
        Series::new(value_column, values),
    ])
}

/// Reads both identifier files. Both must exist; the first missing one is reported before any
/// parsing happens.
pub fn import_country_identifiers(
    iso3_path: &Path,
    names_path: &Path,
) -> TransRiskResult<CountryIdentifiers> {
    require_file("country identifiers (iso3)", iso3_path)?;
    require_file("country identifiers (names)", names_path)?;
    let iso3 = read_json_mapping("country identifiers (iso3)", iso3_path)?;
    let names = read_json_mapping("country identifiers (names)", names_path)?;
    let identifiers = CountryIdentifiers {
        iso2_to_iso3: mapping_frame(&iso3, COL::ISO3)?,
        iso2_to_name: mapping_frame(&names, COL::COUNTRY_NAME)?,
    };
    info!(
        "Imported {} ISO-3 codes and {} country names",
        identifiers.iso2_to_iso3.height(),
        identifiers.iso2_to_name.height()
    );
    Ok(identifiers)
}
