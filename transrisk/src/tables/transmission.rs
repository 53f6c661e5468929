//! Table 6: top sources of transmission risk for large destinations, and top destinations for
//! crisis-prone sources.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use itertools::izip;
use polars::prelude::*;

use crate::error::{TransRiskError, TransRiskResult};
use crate::io::{f64_values, str_values, ColumnContract, ColumnType};
use crate::COL;

pub const TOP_N: usize = 5;
/// Destinations need more than this many firms to rank as a top destination.
pub const MIN_DESTINATION_FIRMS: f64 = 25.0;

pub const TRANSMISSION_CONTRACT: ColumnContract = ColumnContract {
    dataset: "transmission risk",
    columns: &[
        (COL::COUNTRY_ISO2, ColumnType::Text),
        (COL::LOC_ISO2, ColumnType::Text),
        (COL::COUNTRY_NAME, ColumnType::Text),
        (COL::TRANSMISSION_RISK_ALL, ColumnType::Float),
        (COL::NR_OF_FIRMS_ALL, ColumnType::Float),
    ],
};

#[derive(Clone, Debug, PartialEq)]
struct Link {
    origin: String,
    destination: String,
    risk: f64,
    firms: Option<f64>,
}

/// Average transmission risk between the analysis countries.
#[derive(Clone, Debug, PartialEq)]
pub struct TransmissionMatrix {
    links: Vec<Link>,
    /// Origin codes in order of first appearance.
    origins: Vec<String>,
    names: BTreeMap<String, String>,
}

/// One block of the table: a country and its top partners.
#[derive(Clone, Debug, PartialEq)]
pub struct RankedBlock {
    pub country: String,
    pub partners: Vec<String>,
}

impl TransmissionMatrix {
    /// Keeps destinations that are also origins of the panel.
    pub fn from_frame(df: DataFrame) -> TransRiskResult<Self> {
        let df = TRANSMISSION_CONTRACT.conform(df)?;
        let mut origins: Vec<String> = Vec::new();
        let mut names = BTreeMap::new();
        let mut rows = Vec::with_capacity(df.height());
        for (origin, destination, name, risk, firms) in izip!(
            str_values(&df, COL::COUNTRY_ISO2)?,
            str_values(&df, COL::LOC_ISO2)?,
            str_values(&df, COL::COUNTRY_NAME)?,
            f64_values(&df, COL::TRANSMISSION_RISK_ALL)?,
            f64_values(&df, COL::NR_OF_FIRMS_ALL)?,
        ) {
            let (Some(origin), Some(destination)) = (origin, destination) else {
                continue;
            };
            if !origins.contains(&origin) {
                origins.push(origin.clone());
            }
            if let Some(name) = name {
                names.entry(origin.clone()).or_insert(name);
            }
            rows.push((origin, destination, risk, firms));
        }
        let origin_set: BTreeSet<&String> = origins.iter().collect();
        let links = rows
            .into_iter()
            .filter(|(_, destination, _, _)| origin_set.contains(destination))
            .filter_map(|(origin, destination, risk, firms)| {
                Some(Link {
                    risk: risk?,
                    origin,
                    destination,
                    firms,
                })
            })
            .collect();
        Ok(Self {
            links,
            origins,
            names,
        })
    }

    fn code(&self, name: &str) -> TransRiskResult<&str> {
        self.names
            .iter()
            .find(|(_, country)| country.as_str() == name)
            .map(|(code, _)| code.as_str())
            .ok_or_else(|| TransRiskError::DataContract(format!("unknown country `{name}`")))
    }

    fn name(&self, code: &str) -> String {
        self.names.get(code).cloned().unwrap_or_else(|| code.to_string())
    }

    fn top(&self, mut links: Vec<&Link>, partner: impl Fn(&Link) -> &str) -> Vec<String> {
        links.sort_by(|a, b| b.risk.partial_cmp(&a.risk).unwrap_or(Ordering::Equal));
        links
            .into_iter()
            .take(TOP_N)
            .map(|link| self.name(partner(link)))
            .collect()
    }

    /// The origins with the highest risk perceived in `destination`.
    pub fn top_sources(&self, destination: &str) -> TransRiskResult<RankedBlock> {
        let code = self.code(destination)?;
        let links = self
            .links
            .iter()
            .filter(|link| link.destination == code && link.origin != code)
            .collect();
        Ok(RankedBlock {
            country: destination.to_string(),
            partners: self.top(links, |link| link.origin.as_str()),
        })
    }

    /// The destinations (with enough firms) perceiving the highest risk from `origin`.
    pub fn top_destinations(&self, origin: &str) -> TransRiskResult<RankedBlock> {
        let code = self.code(origin)?;
        let links = self
            .links
            .iter()
            .filter(|link| link.origin == code && link.destination != code)
            .filter(|link| link.firms.is_some_and(|firms| firms > MIN_DESTINATION_FIRMS))
            .filter(|link| self.origins.contains(&link.destination))
            .collect();
        Ok(RankedBlock {
            country: origin.to_string(),
            partners: self.top(links, |link| link.destination.as_str()),
        })
    }
}

/// One row per partner; the country name only on the first row of its block and
/// `\addlinespace` after every full block except the last.
pub fn render_table_6(blocks: &[RankedBlock]) -> String {
    let mut out = String::new();
    for (block_nr, block) in blocks.iter().enumerate() {
        let last_block = block_nr + 1 == blocks.len();
        for (nr, partner) in block.partners.iter().enumerate() {
            let separator = if nr + 1 == TOP_N && !last_block {
                "\\addlinespace"
            } else {
                ""
            };
            if nr == 0 {
                out.push_str(&format!("{} & {partner}\\\\{separator}\n", block.country));
            } else {
                out.push_str(&format!(" & {partner}\\\\{separator}\n"));
            }
        }
    }
    out
}
