//! Crisis regression curves: how strongly the transmission risk an origin country poses to each
//! destination moves during a crisis, relative to normal times.
//!
//! For a crisis in an origin country, each destination contributes one observation with the
//! baseline risk (crisis windows excluded) as `x`, the risk during the crisis window as `y` and
//! the number of firms as weight. A WLS line is fitted and predicted over an extended design so
//! the plotted line spans the whole axis.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use itertools::izip;
use log::{debug, info};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::{TransRiskError, TransRiskResult};
use crate::io::{f64_values, i32_values, read_table, str_values, ColumnContract, ColumnType};
use crate::regression::{fit_wls, WlsFit};
use crate::COL;

/// Crisis number holding the baseline (no crisis) values.
pub const BASELINE_CRISIS: i32 = 0;
/// `x` of the synthetic point at the left edge of the axis.
pub const X_ZERO: f64 = -0.1;
/// `x` of the synthetic point beyond the right edge of the axis.
pub const X_MAX: f64 = 100.0;

pub const PANEL_CONTRACT: ColumnContract = ColumnContract {
    dataset: "transmission risk",
    columns: &[
        (COL::COUNTRY_ISO2, ColumnType::Text),
        (COL::LOC_ISO2, ColumnType::Text),
        (COL::CRISIS_NR, ColumnType::Int),
        (COL::FIRM_TYPE, ColumnType::Text),
        (COL::TRANSMISSION_RISK_EXCL, ColumnType::Float),
        (COL::TRANSMISSION_RISK_CRISIS, ColumnType::Float),
        (COL::NR_OF_FIRMS, ColumnType::Float),
    ],
};

/// Firms whose perception of the origin is measured.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, EnumString, Display, Serialize, Deserialize,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum FirmType {
    All,
    Fin,
    Nfc,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct PanelKey {
    origin: String,
    destination: String,
    crisis: i32,
    firm_type: FirmType,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct PanelMeasures {
    baseline: Option<f64>,
    crisis: Option<f64>,
    firms: Option<f64>,
}

/// The transmission risk panel in long format, keyed by origin, destination, crisis number and
/// firm type.
#[derive(Clone, Debug, Default)]
pub struct TransmissionPanel {
    cells: BTreeMap<PanelKey, PanelMeasures>,
}

/// One destination's values for a given origin, crisis and firm type.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub destination: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub weight: Option<f64>,
}

impl TransmissionPanel {
    pub fn read(path: &Path) -> TransRiskResult<Self> {
        Self::from_frame(read_table(path, &PANEL_CONTRACT)?)
    }

    pub fn from_frame(df: DataFrame) -> TransRiskResult<Self> {
        let df = PANEL_CONTRACT.conform(df)?;
        let mut cells = BTreeMap::new();
        let mut duplicates = 0;
        for (origin, destination, crisis, firm_type, baseline, during, firms) in izip!(
            str_values(&df, COL::COUNTRY_ISO2)?,
            str_values(&df, COL::LOC_ISO2)?,
            i32_values(&df, COL::CRISIS_NR)?,
            str_values(&df, COL::FIRM_TYPE)?,
            f64_values(&df, COL::TRANSMISSION_RISK_EXCL)?,
            f64_values(&df, COL::TRANSMISSION_RISK_CRISIS)?,
            f64_values(&df, COL::NR_OF_FIRMS)?,
        ) {
            let (Some(origin), Some(destination), Some(crisis), Some(firm_type)) =
                (origin, destination, crisis, firm_type)
            else {
                return Err(TransRiskError::DataContract(format!(
                    "`{}` has a row with a missing key",
                    PANEL_CONTRACT.dataset
                )));
            };
            let firm_type = firm_type.parse::<FirmType>().map_err(|_| {
                TransRiskError::DataContract(format!("unknown firm type `{firm_type}`"))
            })?;
            let key = PanelKey {
                origin,
                destination,
                crisis,
                firm_type,
            };
            let measures = PanelMeasures {
                baseline,
                crisis: during,
                firms,
            };
            if cells.insert(key, measures).is_some() {
                duplicates += 1;
            }
        }
        if duplicates > 0 {
            return Err(TransRiskError::DuplicateKey {
                dataset: PANEL_CONTRACT.dataset.to_string(),
                keys: [
                    COL::COUNTRY_ISO2,
                    COL::LOC_ISO2,
                    COL::CRISIS_NR,
                    COL::FIRM_TYPE,
                ]
                .map(String::from)
                .to_vec(),
                duplicates,
            });
        }
        debug!("Transmission panel with {} cells", cells.len());
        Ok(Self { cells })
    }

    fn get(&self, origin: &str, destination: &str, crisis: i32, firm_type: FirmType) -> PanelMeasures {
        let key = PanelKey {
            origin: origin.to_string(),
            destination: destination.to_string(),
            crisis,
            firm_type,
        };
        self.cells.get(&key).copied().unwrap_or_default()
    }

    fn destinations(&self, origin: &str) -> BTreeSet<&str> {
        self.cells
            .keys()
            .filter(|key| key.origin == origin)
            .map(|key| key.destination.as_str())
            .collect()
    }

    /// Baseline and crisis values of `firm_type` for every destination of `origin`, sorted by
    /// destination. Weights are the crisis firm counts of all firms.
    pub fn observations(&self, origin: &str, crisis: i32, firm_type: FirmType) -> Vec<Observation> {
        self.destinations(origin)
            .into_iter()
            .map(|destination| Observation {
                destination: destination.to_string(),
                x: self
                    .get(origin, destination, BASELINE_CRISIS, firm_type)
                    .baseline,
                y: self.get(origin, destination, crisis, firm_type).crisis,
                weight: self.get(origin, destination, crisis, FirmType::All).firms,
            })
            .collect()
    }
}

/// Connector drawn between an annotated point and its label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrowStyle {
    pub style: String,
    pub shrink_a: f64,
    pub shrink_b: f64,
    pub color: String,
}

impl Default for ArrowStyle {
    fn default() -> Self {
        Self {
            style: "-".into(),
            shrink_a: 5.0,
            shrink_b: 12.0,
            color: "grey".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxStyle {
    pub pad: f64,
    pub facecolor: String,
    pub edgecolor: String,
}

impl Default for BoxStyle {
    fn default() -> Self {
        Self {
            pad: 0.0,
            facecolor: "none".into(),
            edgecolor: "none".into(),
        }
    }
}

/// Label for one destination, placed at a pixel `offset` from the point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub destination: String,
    pub text: String,
    pub offset: (i32, i32),
    #[serde(default)]
    pub arrow: ArrowStyle,
    #[serde(default)]
    pub bbox: BoxStyle,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrisisSpec {
    pub origin: String,
    pub crisis: i32,
    pub color: String,
    pub name: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl CrisisSpec {
    pub fn id(&self) -> String {
        format!("{}_crisis{}", self.origin, self.crisis)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub firm_type: FirmType,
    pub color: String,
    pub legend: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

/// A crisis fitted separately for several firm types on a common set of destinations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitCrisisSpec {
    pub origin: String,
    pub crisis: i32,
    pub name: String,
    pub groups: Vec<GroupSpec>,
}

impl SplitCrisisSpec {
    pub fn id(&self) -> String {
        let types: Vec<String> = self.groups.iter().map(|g| g.firm_type.to_string()).collect();
        format!("{}_{}_crisis{}", self.origin, types.join("vs"), self.crisis)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PointKey {
    XZero,
    Destination(String),
    XMax,
}

impl fmt::Display for PointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointKey::XZero => write!(f, "x=0"),
            PointKey::Destination(code) => write!(f, "{code}"),
            PointKey::XMax => write!(f, "x=max"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CurvePoint {
    pub key: PointKey,
    pub y: Option<f64>,
    pub y_pred: f64,
    pub x: f64,
    pub weight: Option<f64>,
    pub annotation: Option<Annotation>,
}

impl CurvePoint {
    pub fn is_synthetic(&self) -> bool {
        !matches!(self.key, PointKey::Destination(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CrisisCurve {
    pub id: String,
    pub name: String,
    pub color: String,
    pub label: String,
    pub fit: WlsFit,
    pub points: Vec<CurvePoint>,
}

impl CrisisCurve {
    /// The observed points, synthetic ones excluded.
    pub fn observed(&self) -> impl Iterator<Item = &CurvePoint> {
        self.points.iter().filter(|point| !point.is_synthetic())
    }

    /// `index, y, y_pred, x, weights, color, label, annotation`
    pub fn to_frame(&self) -> TransRiskResult<DataFrame> {
        let index: Vec<String> = self.points.iter().map(|p| p.key.to_string()).collect();
        let y: Vec<Option<f64>> = self.points.iter().map(|p| p.y).collect();
        let y_pred: Vec<f64> = self.points.iter().map(|p| p.y_pred).collect();
        let x: Vec<f64> = self.points.iter().map(|p| p.x).collect();
        let weights: Vec<Option<f64>> = self.points.iter().map(|p| p.weight).collect();
        let annotation: Vec<Option<&str>> = self
            .points
            .iter()
            .map(|p| p.annotation.as_ref().map(|a| a.text.as_str()))
            .collect();
        let n = self.points.len();
        Ok(DataFrame::new(vec![
            Series::new(COL::CURVE_INDEX, index),
            Series::new(COL::Y, y),
            Series::new(COL::Y_PRED, y_pred),
            Series::new(COL::X, x),
            Series::new(COL::WEIGHTS, weights),
            Series::new(COL::COLOR, vec![self.color.as_str(); n]),
            Series::new(COL::LABEL, vec![self.label.as_str(); n]),
            Series::new(COL::ANNOTATION, annotation),
        ])?)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroupCurve {
    pub group: FirmType,
    pub legend: String,
    pub curve: CrisisCurve,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SplitCrisisCurve {
    pub id: String,
    pub name: String,
    pub groups: Vec<GroupCurve>,
}

impl SplitCrisisCurve {
    /// Long format: the frames of every group stacked, with a `group` column.
    pub fn to_frame(&self) -> TransRiskResult<DataFrame> {
        let mut stacked: Option<DataFrame> = None;
        for group in &self.groups {
            let mut frame = group.curve.to_frame()?;
            let tag = Series::new(COL::GROUP, vec![group.group.to_string(); frame.height()]);
            frame.with_column(tag)?;
            stacked = Some(match stacked {
                Some(mut acc) => {
                    acc.vstack_mut(&frame)?;
                    acc
                }
                None => frame,
            });
        }
        stacked.ok_or_else(|| TransRiskError::DataContract(format!("`{}` has no groups", self.id)))
    }
}

pub fn fit_label(fit: &WlsFit) -> String {
    format!(
        "β̂ = {:.2} (s.e.={:.2}); R² = {:.2}",
        fit.slope, fit.slope_se, fit.r_squared
    )
}

/// Observations with both `x` and `y`, each required to carry a weight.
fn fit_rows(
    observations: Vec<Observation>,
    context: &str,
) -> TransRiskResult<Vec<(String, f64, f64, f64)>> {
    observations
        .into_iter()
        .filter_map(|obs| match (obs.x, obs.y) {
            (Some(x), Some(y)) => Some((obs.destination, x, y, obs.weight)),
            _ => None,
        })
        .map(|(destination, x, y, weight)| match weight {
            Some(weight) => Ok((destination, x, y, weight)),
            None => Err(TransRiskError::MissingWeight {
                context: context.to_string(),
                destination,
            }),
        })
        .collect()
}

fn curve_from_rows(
    id: String,
    name: &str,
    color: &str,
    rows: &[(String, f64, f64, f64)],
    annotations: &[Annotation],
) -> TransRiskResult<CrisisCurve> {
    let x: Vec<f64> = rows.iter().map(|row| row.1).collect();
    let y: Vec<f64> = rows.iter().map(|row| row.2).collect();
    let weights: Vec<f64> = rows.iter().map(|row| row.3).collect();
    let fit = fit_wls(&x, &y, &weights).map_err(|source| TransRiskError::DegenerateFit {
        context: id.clone(),
        source,
    })?;
    info!(
        "Fitted `{id}` on {} destinations: slope = {:.3}, R² = {:.3}",
        fit.observations, fit.slope, fit.r_squared
    );

    let annotation_for = |destination: &str| {
        annotations
            .iter()
            .find(|annotation| annotation.destination == destination)
            .cloned()
    };
    let synthetic = |key, x| CurvePoint {
        key,
        y: None,
        y_pred: fit.predict(x),
        x,
        weight: None,
        annotation: None,
    };
    let mut points = Vec::with_capacity(rows.len() + 2);
    points.push(synthetic(PointKey::XZero, X_ZERO));
    points.extend(rows.iter().map(|(destination, x, y, weight)| CurvePoint {
        key: PointKey::Destination(destination.clone()),
        y: Some(*y),
        y_pred: fit.predict(*x),
        x: *x,
        weight: Some(*weight),
        annotation: annotation_for(destination.as_str()),
    }));
    points.push(synthetic(PointKey::XMax, X_MAX));

    Ok(CrisisCurve {
        id,
        name: name.to_string(),
        color: color.to_string(),
        label: fit_label(&fit),
        fit,
        points,
    })
}

/// Fits the crisis regression for all firms perceiving `spec.origin`.
pub fn build_crisis_curve(
    panel: &TransmissionPanel,
    spec: &CrisisSpec,
) -> TransRiskResult<CrisisCurve> {
    let id = spec.id();
    let observations = panel.observations(&spec.origin, spec.crisis, FirmType::All);
    let rows = fit_rows(observations, &id)?;
    curve_from_rows(id, &spec.name, &spec.color, &rows, &spec.annotations)
}

/// Fits one curve per group of `spec` using only destinations observed for every group.
pub fn build_split_curve(
    panel: &TransmissionPanel,
    spec: &SplitCrisisSpec,
) -> TransRiskResult<SplitCrisisCurve> {
    let id = spec.id();
    let mut per_group = Vec::with_capacity(spec.groups.len());
    for group in &spec.groups {
        let observations = panel.observations(&spec.origin, spec.crisis, group.firm_type);
        per_group.push(fit_rows(observations, &id)?);
    }
    let common: BTreeSet<String> = per_group
        .iter()
        .map(|rows| rows.iter().map(|row| row.0.clone()).collect::<BTreeSet<_>>())
        .reduce(|acc, destinations| &acc & &destinations)
        .unwrap_or_default();

    let mut groups = Vec::with_capacity(spec.groups.len());
    for (group, rows) in spec.groups.iter().zip(per_group) {
        let rows: Vec<_> = rows
            .into_iter()
            .filter(|row| common.contains(&row.0))
            .collect();
        let curve = curve_from_rows(
            format!("{id}_{}", group.firm_type),
            &spec.name,
            &group.color,
            &rows,
            &group.annotations,
        )?;
        groups.push(GroupCurve {
            group: group.firm_type,
            legend: group.legend.clone(),
            curve,
        });
    }
    Ok(SplitCrisisCurve {
        id,
        name: spec.name.clone(),
        groups,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    /// Rows of (destination, crisis, type, baseline, crisis value, firms) for origin GR.
    #[rustfmt::skip]
    fn panel(rows: &[(&str, i32, &str, Option<f64>, Option<f64>, Option<f64>)]) -> TransmissionPanel {
        let df = df!(
            COL::COUNTRY_ISO2 => vec!["GR"; rows.len()],
            COL::LOC_ISO2 => rows.iter().map(|r| r.0).collect::<Vec<_>>(),
            COL::CRISIS_NR => rows.iter().map(|r| r.1).collect::<Vec<_>>(),
            COL::FIRM_TYPE => rows.iter().map(|r| r.2).collect::<Vec<_>>(),
            COL::TRANSMISSION_RISK_EXCL => rows.iter().map(|r| r.3).collect::<Vec<_>>(),
            COL::TRANSMISSION_RISK_CRISIS => rows.iter().map(|r| r.4).collect::<Vec<_>>(),
            COL::NR_OF_FIRMS => rows.iter().map(|r| r.5).collect::<Vec<_>>()
        )
        .unwrap();
        TransmissionPanel::from_frame(df).unwrap()
    }

    /// Crisis values lie exactly on y = 2x.
    #[rustfmt::skip]
    fn greek_panel() -> TransmissionPanel {
        panel(&[
            ("DE", 0, "ALL", Some(1.0), None, Some(50.0)),
            ("DE", 1, "ALL", None, Some(2.0), Some(40.0)),
            ("FR", 0, "ALL", Some(2.0), None, Some(30.0)),
            ("FR", 1, "ALL", None, Some(4.0), Some(20.0)),
            ("IT", 0, "ALL", Some(3.0), None, Some(10.0)),
            ("IT", 1, "ALL", None, Some(6.0), Some(10.0)),
            ("US", 0, "ALL", None, None, Some(10.0)),
            ("US", 1, "ALL", None, Some(1.0), Some(10.0)),
        ])
    }

    fn spec() -> CrisisSpec {
        CrisisSpec {
            origin: "GR".into(),
            crisis: 1,
            color: "#ef476f".into(),
            name: "Start of European debt crisis in Greece (2010q2)".into(),
            annotations: vec![Annotation {
                destination: "FR".into(),
                text: "France".into(),
                offset: (30, 20),
                arrow: ArrowStyle::default(),
                bbox: BoxStyle::default(),
            }],
        }
    }

    #[test]
    fn curve_has_two_synthetic_points() -> anyhow::Result<()> {
        let curve = build_crisis_curve(&greek_panel(), &spec())?;
        assert_eq!(curve.id, "GR_crisis1");
        assert_eq!(curve.points.len(), 5);
        let first = &curve.points[0];
        let last = &curve.points[4];
        assert_eq!(first.key, PointKey::XZero);
        assert_eq!(last.key, PointKey::XMax);
        assert_eq!(curve.points.iter().filter(|p| p.is_synthetic()).count(), 2);
        for point in [first, last] {
            assert_eq!(point.y, None);
            assert_eq!(point.weight, None);
            assert!(point.y_pred.is_finite());
        }
        assert_relative_eq!(first.y_pred, -0.2, epsilon = 1e-9);
        assert_relative_eq!(last.y_pred, 200.0, epsilon = 1e-9);
        assert_eq!(curve.label, "β̂ = 2.00 (s.e.=0.00); R² = 1.00");
        Ok(())
    }

    #[test]
    fn weights_come_from_crisis_rows() -> anyhow::Result<()> {
        let curve = build_crisis_curve(&greek_panel(), &spec())?;
        let weights: Vec<Option<f64>> = curve.observed().map(|p| p.weight).collect();
        assert_eq!(weights, vec![Some(40.0), Some(20.0), Some(10.0)]);
        Ok(())
    }

    #[test]
    fn annotations_attach_by_destination() -> anyhow::Result<()> {
        let curve = build_crisis_curve(&greek_panel(), &spec())?;
        let annotated: Vec<String> = curve
            .points
            .iter()
            .filter(|p| p.annotation.is_some())
            .map(|p| p.key.to_string())
            .collect();
        assert_eq!(annotated, vec!["FR"]);
        let frame = curve.to_frame()?;
        assert_eq!(frame.shape(), (5, 8));
        assert_eq!(
            str_values(&frame, COL::CURVE_INDEX)?,
            ["x=0", "DE", "FR", "IT", "x=max"]
                .map(|s| Some(s.to_string()))
                .to_vec()
        );
        Ok(())
    }

    #[test]
    #[rustfmt::skip]
    fn missing_weight_is_a_contract_violation() {
        let panel = panel(&[
            ("DE", 0, "ALL", Some(1.0), None, None),
            ("DE", 1, "ALL", None, Some(2.0), None),
            ("FR", 0, "ALL", Some(2.0), None, Some(1.0)),
            ("FR", 1, "ALL", None, Some(4.0), Some(1.0)),
        ]);
        let err = build_crisis_curve(&panel, &spec()).unwrap_err();
        assert!(matches!(
            err,
            TransRiskError::MissingWeight { ref destination, .. } if destination == "DE"
        ));
    }

    #[test]
    #[rustfmt::skip]
    fn too_few_destinations_is_degenerate() {
        let panel = panel(&[
            ("DE", 0, "ALL", Some(1.0), None, Some(1.0)),
            ("DE", 1, "ALL", None, Some(2.0), Some(1.0)),
        ]);
        let err = build_crisis_curve(&panel, &spec()).unwrap_err();
        assert!(matches!(err, TransRiskError::DegenerateFit { .. }));
    }

    #[test]
    #[rustfmt::skip]
    fn duplicate_panel_keys_are_rejected() {
        let df = df!(
            COL::COUNTRY_ISO2 => &["GR", "GR"],
            COL::LOC_ISO2 => &["DE", "DE"],
            COL::CRISIS_NR => &[0, 0],
            COL::FIRM_TYPE => &["ALL", "ALL"],
            COL::TRANSMISSION_RISK_EXCL => &[1.0, 2.0],
            COL::TRANSMISSION_RISK_CRISIS => &[1.0, 2.0],
            COL::NR_OF_FIRMS => &[1.0, 2.0]
        )
        .unwrap();
        let err = TransmissionPanel::from_frame(df).unwrap_err();
        assert!(matches!(err, TransRiskError::DuplicateKey { duplicates: 1, .. }));
    }

    #[test]
    #[rustfmt::skip]
    fn split_curve_uses_common_destinations() -> anyhow::Result<()> {
        let panel = panel(&[
            ("AT", 0, "ALL", None, None, Some(5.0)),
            ("AT", 1, "ALL", None, None, Some(5.0)),
            ("AT", 0, "FIN", Some(1.0), None, None),
            ("AT", 1, "FIN", None, Some(1.5), None),
            ("AT", 0, "NFC", Some(1.0), None, None),
            ("AT", 1, "NFC", None, Some(1.2), None),
            ("DE", 0, "ALL", None, None, Some(5.0)),
            ("DE", 1, "ALL", None, None, Some(8.0)),
            ("DE", 0, "FIN", Some(2.0), None, None),
            ("DE", 1, "FIN", None, Some(3.5), None),
            ("DE", 0, "NFC", Some(2.0), None, None),
            ("DE", 1, "NFC", None, Some(2.1), None),
            ("FR", 0, "ALL", None, None, Some(5.0)),
            ("FR", 1, "ALL", None, None, Some(3.0)),
            ("FR", 0, "FIN", Some(3.0), None, None),
            ("FR", 1, "FIN", None, Some(4.0), None),
            ("FR", 0, "NFC", Some(3.0), None, None),
            ("FR", 1, "NFC", None, Some(3.9), None),
            // Only observed for financials
            ("US", 0, "ALL", None, None, Some(5.0)),
            ("US", 1, "ALL", None, None, Some(9.0)),
            ("US", 0, "FIN", Some(4.0), None, None),
            ("US", 1, "FIN", None, Some(9.0), None),
        ]);
        let group = |firm_type, color: &str| GroupSpec {
            firm_type,
            color: color.to_string(),
            legend: format!("Perceived by {firm_type}"),
            annotations: vec![],
        };
        let spec = SplitCrisisSpec {
            origin: "GR".into(),
            crisis: 1,
            name: "Test".into(),
            groups: vec![group(FirmType::Nfc, "#009ffd"), group(FirmType::Fin, "#ffa400")],
        };
        let split = build_split_curve(&panel, &spec)?;
        assert_eq!(split.id, "GR_NFCvsFIN_crisis1");
        assert_eq!(split.groups.len(), 2);
        for group in &split.groups {
            let destinations: Vec<String> =
                group.curve.observed().map(|p| p.key.to_string()).collect();
            assert_eq!(destinations, vec!["AT", "DE", "FR"]);
            let weights: Vec<Option<f64>> = group.curve.observed().map(|p| p.weight).collect();
            assert_eq!(weights, vec![Some(5.0), Some(8.0), Some(3.0)]);
        }
        let frame = split.to_frame()?;
        assert_eq!(frame.height(), 10);
        Ok(())
    }
}
