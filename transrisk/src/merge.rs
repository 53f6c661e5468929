//! Validated joins with merge indicators.

use log::{debug, info};
use polars::prelude::*;
use serde::Serialize;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::error::{TransRiskError, TransRiskResult};

const LEFT_MARKER: &str = "__merge_left";
const RIGHT_MARKER: &str = "__merge_right";
const KEY_COUNT: &str = "__merge_key_count";

/// Which side(s) of a join must be unique on the join keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Validate {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
}

impl Validate {
    fn left_unique(self) -> bool {
        matches!(self, Validate::OneToOne | Validate::OneToMany)
    }

    fn right_unique(self) -> bool {
        matches!(self, Validate::OneToOne | Validate::ManyToOne)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum How {
    Inner,
    Left,
    Full,
}

impl From<How> for JoinArgs {
    fn from(how: How) -> Self {
        match how {
            How::Inner => JoinArgs::new(JoinType::Inner),
            How::Left => JoinArgs::new(JoinType::Left),
            How::Full => {
                JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns)
            }
        }
    }
}

/// Value of the indicator column for each merged row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum MergeSide {
    LeftOnly,
    RightOnly,
    Both,
}

#[derive(Clone, Debug)]
pub struct MergeSpec<'a> {
    pub name: &'a str,
    pub left_name: &'a str,
    pub right_name: &'a str,
    pub left_on: &'a [&'a str],
    pub right_on: &'a [&'a str],
    pub how: How,
    pub validate: Validate,
    pub indicator: Option<&'a str>,
}

/// Row counts per merge side, reported to the orchestrator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MergeDiagnostics {
    pub name: String,
    pub left_only: usize,
    pub right_only: usize,
    pub both: usize,
}

impl MergeDiagnostics {
    pub fn total(&self) -> usize {
        self.left_only + self.right_only + self.both
    }
}

/// Fails with `DuplicateKey` when `df` has more than one row for some combination of `keys`.
pub fn ensure_unique(df: &DataFrame, dataset: &str, keys: &[&str]) -> TransRiskResult<()> {
    let key_exprs: Vec<Expr> = keys.iter().map(|key| col(key)).collect();
    let duplicates = df
        .clone()
        .lazy()
        .group_by(key_exprs)
        .agg([len().alias(KEY_COUNT)])
        .filter(col(KEY_COUNT).gt(lit(1)))
        .collect()?
        .height();
    if duplicates > 0 {
        return Err(TransRiskError::DuplicateKey {
            dataset: dataset.to_string(),
            keys: keys.iter().map(|key| key.to_string()).collect(),
            duplicates,
        });
    }
    Ok(())
}

/// Joins `left` and `right` after checking the uniqueness required by `spec.validate`. When
/// `spec.indicator` is set, a string column with the `MergeSide` of each row is added.
pub fn merge(
    left: &DataFrame,
    right: &DataFrame,
    spec: &MergeSpec,
) -> TransRiskResult<(DataFrame, MergeDiagnostics)> {
    if spec.validate.left_unique() {
        ensure_unique(left, spec.left_name, spec.left_on)?;
    }
    if spec.validate.right_unique() {
        ensure_unique(right, spec.right_name, spec.right_on)?;
    }
    let left_on: Vec<Expr> = spec.left_on.iter().map(|key| col(key)).collect();
    let right_on: Vec<Expr> = spec.right_on.iter().map(|key| col(key)).collect();
    let merged = left
        .clone()
        .lazy()
        .with_column(lit(true).alias(LEFT_MARKER))
        .join(
            right.clone().lazy().with_column(lit(true).alias(RIGHT_MARKER)),
            left_on,
            right_on,
            spec.how.into(),
        )
        .with_column(
            when(col(RIGHT_MARKER).is_null())
                .then(lit(MergeSide::LeftOnly.as_ref()))
                .when(col(LEFT_MARKER).is_null())
                .then(lit(MergeSide::RightOnly.as_ref()))
                .otherwise(lit(MergeSide::Both.as_ref()))
                .alias(spec.indicator.unwrap_or(KEY_COUNT)),
        )
        .select([col("*").exclude([LEFT_MARKER, RIGHT_MARKER])])
        .collect()?;

    let indicator_name = spec.indicator.unwrap_or(KEY_COUNT);
    let diagnostics = diagnostics(&merged, spec.name, indicator_name)?;
    info!(
        "Merged `{}` ({} with {}): both={}, left_only={}, right_only={}",
        spec.name,
        spec.left_name,
        spec.right_name,
        diagnostics.both,
        diagnostics.left_only,
        diagnostics.right_only
    );
    debug!("Merged `{}` with shape: {:?}", spec.name, merged.shape());
    let merged = match spec.indicator {
        Some(_) => merged,
        None => merged.drop(KEY_COUNT)?,
    };
    Ok((merged, diagnostics))
}

fn diagnostics(df: &DataFrame, name: &str, indicator: &str) -> TransRiskResult<MergeDiagnostics> {
    let mut counts = MergeDiagnostics {
        name: name.to_string(),
        ..Default::default()
    };
    for side in df.column(indicator)?.str()?.into_iter().flatten() {
        match side.parse::<MergeSide>() {
            Ok(MergeSide::LeftOnly) => counts.left_only += 1,
            Ok(MergeSide::RightOnly) => counts.right_only += 1,
            Ok(MergeSide::Both) => counts.both += 1,
            Err(_) => {
                return Err(TransRiskError::DataContract(format!(
                    "unexpected merge indicator `{side}` in `{name}`"
                )))
            }
        }
    }
    Ok(counts)
}
