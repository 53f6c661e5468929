//! World Bank GDP import: country shares of world GDP for a single year.

use std::path::Path;

use log::info;
use polars::prelude::*;

use crate::error::TransRiskResult;
use crate::io::{read_table, ColumnContract, ColumnType};
use crate::COL;

pub const GDP_YEAR: i32 = 2019;

const CONTRACT: ColumnContract = ColumnContract {
    dataset: "worldbank gdp",
    columns: &[
        (COL::WB_COUNTRY_NAME, ColumnType::Text),
        (COL::WB_TIME, ColumnType::Int),
        (COL::WB_GDP, ColumnType::Float),
    ],
};

/// Regional and income-group aggregates published alongside countries.
const AGGREGATES: &[&str] = &[
    "Africa Eastern and Southern",
    "Africa Western and Central",
    "Arab World",
    "Caribbean small states",
    "Central Europe and the Baltics",
    "Early-demographic dividend",
    "East Asia & Pacific",
    "East Asia & Pacific (excluding high income)",
    "East Asia & Pacific (IDA & IBRD countries)",
    "Euro area",
    "Europe & Central Asia",
    "Europe & Central Asia (excluding high income)",
    "Europe & Central Asia (IDA & IBRD countries)",
    "European Union",
    "Fragile and conflict affected situations",
    "Heavily indebted poor countries (HIPC)",
    "High income",
    "IBRD only",
    "IDA & IBRD total",
    "IDA blend",
    "IDA only",
    "IDA total",
    "Late-demographic dividend",
    "Latin America & Caribbean",
    "Latin America & Caribbean (excluding high income)",
    "Latin America & the Caribbean (IDA & IBRD countries)",
    "Least developed countries: UN classification",
    "Low & middle income",
    "Low income",
    "Lower middle income",
    "Middle East & North Africa",
    "Middle East & North Africa (excluding high income)",
    "Middle East & North Africa (IDA & IBRD countries)",
    "Middle income",
    "North America",
    "Not classified",
    "OECD members",
    "Other small states",
    "Pacific island small states",
    "Post-demographic dividend",
    "Pre-demographic dividend",
    "Small states",
    "South Asia",
    "South Asia (IDA & IBRD)",
    "Sub-Saharan Africa",
    "Sub-Saharan Africa (excluding high income)",
    "Sub-Saharan Africa (IDA & IBRD countries)",
    "Upper middle income",
    "World",
];

/// Maps World Bank country names to the names used in the rest of the pipeline.
pub fn canonical_country_name(name: &str) -> &str {
    match name {
        "Egypt, Arab Rep." => "Egypt",
        "Hong Kong SAR, China" => "Hong Kong",
        "Russian Federation" => "Russia",
        "Korea, Rep." => "South Korea",
        "Virgin Islands (U.S.)" => "U.S. Virgin Islands",
        "Turkiye" => "Turkey",
        "Iran, Islamic Rep." => "Iran",
        other => other,
    }
}

/// Reads the World Bank download and returns `country_name, gdp, share` for `GDP_YEAR`.
pub fn import_gdp(path: &Path) -> TransRiskResult<DataFrame> {
    let raw = read_table(path, &CONTRACT)?;
    let aggregates = Series::new("aggregates", AGGREGATES);
    let mut gdp = raw
        .lazy()
        .select([
            col(COL::WB_COUNTRY_NAME).alias(COL::COUNTRY_NAME),
            col(COL::WB_TIME).alias(COL::YEAR),
            col(COL::WB_GDP).alias(COL::GDP),
        ])
        .filter(
            col(COL::COUNTRY_NAME)
                .is_in(lit(aggregates))
                .fill_null(lit(false))
                .not(),
        )
        .drop_nulls(None)
        .filter(col(COL::YEAR).eq(lit(GDP_YEAR)))
        .collect()?;

    let renamed: StringChunked = gdp
        .column(COL::COUNTRY_NAME)?
        .str()?
        .into_iter()
        .map(|name| name.map(canonical_country_name))
        .collect();
    gdp.with_column(renamed.into_series().with_name(COL::COUNTRY_NAME))?;

    let gdp = gdp
        .lazy()
        .select([
            col(COL::COUNTRY_NAME),
            col(COL::GDP),
            (col(COL::GDP) / col(COL::GDP).sum()).alias(COL::SHARE),
        ])
        .collect()?;
    info!("Imported GDP for {} countries in {GDP_YEAR}", gdp.height());
    Ok(gdp)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::io::{f64_values, str_values};

    const DOWNLOAD: &str = "\
Country Name,Country Code,Time,GDP (constant 2015 US$) [NY.GDP.MKTP.KD]
Egypt, Arab Rep.,EGY,2019,300
Germany,DEU,2019,700
World,WLD,2019,1000
Germany,DEU,2018,650
Russian Federation,RUS,2019,..
";

    #[test]
    fn aggregates_and_missing_values_are_dropped() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("gdp.csv");
        // Quote names containing commas as the World Bank export does
        std::fs::write(&path, DOWNLOAD.replace("Egypt, Arab Rep.", "\"Egypt, Arab Rep.\""))?;
        let gdp = import_gdp(&path)?;
        assert_eq!(gdp.get_column_names(), vec!["country_name", "gdp", "share"]);
        assert_eq!(
            str_values(&gdp, COL::COUNTRY_NAME)?,
            vec![Some("Egypt".to_string()), Some("Germany".to_string())]
        );
        let shares = f64_values(&gdp, COL::SHARE)?;
        assert_relative_eq!(shares[0].unwrap(), 0.3);
        assert_relative_eq!(shares[1].unwrap(), 0.7);
        Ok(())
    }

    #[test]
    fn african_aggregates_are_dropped() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("gdp.csv");
        std::fs::write(
            &path,
            "\
Country Name,Country Code,Time,GDP (constant 2015 US$) [NY.GDP.MKTP.KD]
Germany,DEU,2019,700
Africa Eastern and Southern,AFE,2019,900
Africa Western and Central,AFW,2019,800
",
        )?;
        let gdp = import_gdp(&path)?;
        assert_eq!(gdp.height(), 1);
        assert_eq!(
            str_values(&gdp, COL::COUNTRY_NAME)?,
            vec![Some("Germany".to_string())]
        );
        assert_relative_eq!(f64_values(&gdp, COL::SHARE)?[0].unwrap(), 1.0);
        Ok(())
    }

    #[test]
    fn names_are_mapped() {
        assert_eq!(canonical_country_name("Korea, Rep."), "South Korea");
        assert_eq!(canonical_country_name("Turkiye"), "Turkey");
        assert_eq!(canonical_country_name("France"), "France");
    }
}
