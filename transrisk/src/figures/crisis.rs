//! Figures 7 and 8: crisis against mean transmission risk per destination, with the weighted fit.

use std::path::Path;

use anyhow::bail;
use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use polars::prelude::DataFrame;

use crate::curve::{CrisisCurve, CurvePoint, FirmType, SplitCrisisCurve};
use crate::error::TransRiskResult;
use crate::figures::{annotate, parse_color, Figure, FigureStyle, Plane};
use crate::regression::WlsFit;

const X_DESC: &str = "Mean transmission risk o→d";
const Y_DESC: &str = "Transmission risk o→d during crisis";
/// Points at or above this value do not stretch the axes.
const OUTLIER: f64 = 100.0;
const AXIS_HEADROOM: f64 = 1.1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Marker {
    Circle,
    Triangle,
    Diamond,
}

impl Marker {
    fn of(firm_type: FirmType) -> Self {
        match firm_type {
            FirmType::All => Marker::Circle,
            FirmType::Fin => Marker::Triangle,
            FirmType::Nfc => Marker::Diamond,
        }
    }

    /// Closed outline in pixels around the marker's center; circles become a 12-gon.
    fn outline(self, size: i32) -> Vec<(i32, i32)> {
        match self {
            Marker::Circle => (0..=12)
                .map(|i| {
                    let angle = f64::from(i) * std::f64::consts::PI / 6.0;
                    let r = f64::from(size);
                    ((r * angle.cos()).round() as i32, (r * angle.sin()).round() as i32)
                })
                .collect(),
            Marker::Triangle => vec![(0, -size), (size, size), (-size, size), (0, -size)],
            Marker::Diamond => vec![(0, -size), (size, 0), (0, size), (-size, 0), (0, -size)],
        }
    }
}

/// Upper end of both axes.
fn axis_limit<'a>(points: impl Iterator<Item = &'a CurvePoint>) -> anyhow::Result<f64> {
    let widest = points
        .flat_map(|point| [Some(point.x), point.y])
        .flatten()
        .filter(|v| v.is_finite() && *v < OUTLIER)
        .fold(f64::NEG_INFINITY, f64::max);
    if !widest.is_finite() || widest <= 0.0 {
        bail!("no positive observations below {OUTLIER} to scale the axes");
    }
    Ok(widest * AXIS_HEADROOM)
}

/// The part of the fitted line inside the square `[0, lim]²`.
pub fn clip_line(fit: &WlsFit, lim: f64) -> Option<[(f64, f64); 2]> {
    let (a, b) = (fit.intercept, fit.slope);
    let (lo, hi) = if b == 0.0 {
        if !(0.0..=lim).contains(&a) {
            return None;
        }
        (0.0, lim)
    } else {
        let at_bottom = -a / b;
        let at_top = (lim - a) / b;
        (
            at_bottom.min(at_top).max(0.0),
            at_bottom.max(at_top).min(lim),
        )
    };
    (lo < hi).then(|| [(lo, fit.predict(lo)), (hi, fit.predict(hi))])
}

fn tick_label(value: &f64) -> String {
    if *value == 0.0 {
        "0".to_string()
    } else if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

fn square_chart<'a, 'b>(
    root: &'a DrawingArea<SVGBackend<'b>, plotters::coord::Shift>,
    lim: f64,
    style: &FigureStyle,
) -> anyhow::Result<Plane<'a, 'b>> {
    let mut chart = ChartBuilder::on(root)
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(70)
        .build_cartesian_2d(0.0..lim, 0.0..lim)?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(6)
        .y_labels(6)
        .label_style((style.font.as_str(), style.label_font_size))
        .x_label_formatter(&tick_label)
        .y_label_formatter(&tick_label)
        .x_desc(X_DESC)
        .y_desc(Y_DESC)
        .draw()?;
    chart.draw_series(DashedLineSeries::new(
        [(0.0, 0.0), (lim, lim)],
        6,
        4,
        RGBColor(128, 128, 128).stroke_width(1),
    ))?;
    Ok(chart)
}

fn draw_markers<'a, 'b>(
    chart: &mut Plane<'a, 'b>,
    points: &[(f64, f64)],
    marker: Marker,
    fill: RGBColor,
    edged: bool,
    size: u32,
) -> anyhow::Result<()> {
    let radius = size as i32;
    match marker {
        Marker::Circle => {
            chart.draw_series(points.iter().map(|p| Circle::new(*p, size, fill.filled())))?;
            if edged {
                chart.draw_series(
                    points.iter().map(|p| Circle::new(*p, size, BLACK.stroke_width(1))),
                )?;
            }
        }
        Marker::Triangle | Marker::Diamond => {
            let outline = marker.outline(radius);
            chart.draw_series(points.iter().map(|p| {
                EmptyElement::at(*p) + Polygon::new(outline.clone(), fill.filled())
            }))?;
            if edged {
                chart.draw_series(points.iter().map(|p| {
                    EmptyElement::at(*p) + PathElement::new(outline.clone(), BLACK.stroke_width(1))
                }))?;
            }
        }
    }
    Ok(())
}

/// Scatter, fitted line and labels of one curve; returns the curve's color for the legend.
fn draw_curve<'a, 'b>(
    chart: &mut Plane<'a, 'b>,
    curve: &CrisisCurve,
    marker: Marker,
    lim: f64,
    style: &FigureStyle,
) -> anyhow::Result<RGBColor> {
    let color = parse_color(&curve.color)?;
    if let Some(segment) = clip_line(&curve.fit, lim) {
        chart.draw_series(LineSeries::new(segment, color.stroke_width(style.line_width)))?;
    }
    let observed = |annotated: bool| -> Vec<(f64, f64)> {
        curve
            .observed()
            .filter(|point| point.annotation.is_some() == annotated)
            .filter_map(|point| point.y.map(|y| (point.x, y)))
            .collect()
    };
    draw_markers(chart, &observed(false), marker, color, false, style.marker_size)?;
    draw_markers(chart, &observed(true), marker, color, true, style.marker_size)?;
    for point in curve.observed() {
        if let (Some(annotation), Some(y)) = (&point.annotation, point.y) {
            annotate(
                chart,
                (point.x, y),
                &annotation.text,
                annotation.offset,
                &annotation.arrow,
                &annotation.bbox,
                style,
            )?;
        }
    }
    Ok(color)
}

#[derive(Clone, Debug, PartialEq)]
pub struct CrisisFigure {
    name: String,
    pub curve: CrisisCurve,
}

impl CrisisFigure {
    pub fn new(curve: CrisisCurve) -> Self {
        Self {
            name: format!("Figure7_transmissionrisk_scatter_{}", curve.id),
            curve,
        }
    }
}

impl Figure for CrisisFigure {
    fn name(&self) -> &str {
        &self.name
    }

    fn data(&self) -> TransRiskResult<DataFrame> {
        self.curve.to_frame()
    }

    fn draw(&self, path: &Path, style: &FigureStyle) -> anyhow::Result<()> {
        let lim = axis_limit(self.curve.observed())?;
        let root = SVGBackend::new(path, style.square_size).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = square_chart(&root, lim, style)?;
        draw_curve(&mut chart, &self.curve, Marker::Circle, lim, style)?;

        // Slope and fit statistics on two lines in the lower right corner
        let font = (style.font.as_str(), style.label_font_size + 1)
            .into_font()
            .color(&BLACK)
            .pos(Pos::new(HPos::Right, VPos::Bottom));
        let positions = [(0.98, 0.09), (0.695, 0.03)];
        for (part, (fx, fy)) in self.curve.label.splitn(2, "; ").zip(positions) {
            chart.draw_series(std::iter::once(Text::new(
                part.to_string(),
                (fx * lim, fy * lim),
                font.clone(),
            )))?;
        }
        root.present()?;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SplitCrisisFigure {
    name: String,
    pub curve: SplitCrisisCurve,
}

impl SplitCrisisFigure {
    pub fn new(curve: SplitCrisisCurve) -> Self {
        Self {
            name: format!("Figure8_transmissionrisk_scatter_{}", curve.id),
            curve,
        }
    }
}

impl Figure for SplitCrisisFigure {
    fn name(&self) -> &str {
        &self.name
    }

    fn data(&self) -> TransRiskResult<DataFrame> {
        self.curve.to_frame()
    }

    fn draw(&self, path: &Path, style: &FigureStyle) -> anyhow::Result<()> {
        let lim = axis_limit(self.curve.groups.iter().flat_map(|g| g.curve.observed()))?;
        let root = SVGBackend::new(path, style.square_size).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = square_chart(&root, lim, style)?;
        let size = style.marker_size as i32;
        for group in &self.curve.groups {
            let marker = Marker::of(group.group);
            let color = draw_curve(&mut chart, &group.curve, marker, lim, style)?;
            // Invisible series carrying the legend entry
            chart
                .draw_series(std::iter::empty::<Circle<(f64, f64), u32>>())?
                .label(group.legend.as_str())
                .legend(move |(x, y)| {
                    EmptyElement::at((x + 10, y))
                        + Polygon::new(marker.outline(size), color.filled())
                });
        }
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::LowerRight)
            .label_font((style.font.as_str(), style.legend_font_size))
            .background_style(WHITE)
            .border_style(BLACK)
            .draw()?;
        root.present()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::curve::{build_crisis_curve, build_split_curve, fit_label, GroupSpec, SplitCrisisSpec};
    use crate::curve::{Annotation, ArrowStyle, BoxStyle, CrisisSpec, TransmissionPanel};
    use crate::figures::{render_figure, PreparedFigure};
    use crate::COL;
    use polars::prelude::*;

    fn fit(intercept: f64, slope: f64) -> WlsFit {
        WlsFit {
            intercept,
            slope,
            intercept_se: 0.0,
            slope_se: 0.0,
            r_squared: 1.0,
            observations: 3,
        }
    }

    #[test]
    fn fitted_line_is_clipped_to_the_square() {
        let [start, end] = clip_line(&fit(0.0, 2.0), 10.0).unwrap();
        assert_eq!(start, (0.0, 0.0));
        assert_eq!(end, (5.0, 10.0));

        let [start, end] = clip_line(&fit(5.0, -1.0), 10.0).unwrap();
        assert_eq!(start, (0.0, 5.0));
        assert_eq!(end, (5.0, 0.0));

        let [start, end] = clip_line(&fit(3.0, 0.0), 10.0).unwrap();
        assert_eq!((start, end), ((0.0, 3.0), (10.0, 3.0)));

        assert!(clip_line(&fit(20.0, 1.0), 10.0).is_none());
        assert!(clip_line(&fit(-1.0, 0.0), 10.0).is_none());
    }

    #[test]
    fn outliers_do_not_stretch_the_axes() -> anyhow::Result<()> {
        let point = |x: f64, y: Option<f64>| CurvePoint {
            key: crate::curve::PointKey::Destination("DE".into()),
            y,
            y_pred: 0.0,
            x,
            weight: Some(1.0),
            annotation: None,
        };
        let points = [point(2.0, Some(4.0)), point(150.0, Some(3.0)), point(1.0, None)];
        assert_relative_eq!(axis_limit(points.iter())?, 4.4, epsilon = 1e-12);
        assert!(axis_limit([point(200.0, None)].iter()).is_err());
        Ok(())
    }

    #[test]
    fn tick_labels_drop_trailing_zeros() {
        assert_eq!(tick_label(&0.0), "0");
        assert_eq!(tick_label(&2.0), "2");
        assert_eq!(tick_label(&2.5), "2.5");
    }

    /// Origin GR: values for crisis 1 sit near the diagonal for every firm type.
    #[rustfmt::skip]
    fn panel() -> TransmissionPanel {
        let rows: &[(&str, i32, &str, Option<f64>, Option<f64>, Option<f64>)] = &[
            ("DE", 0, "ALL", Some(1.0), None, Some(50.0)),
            ("DE", 1, "ALL", None, Some(1.5), Some(40.0)),
            ("FR", 0, "ALL", Some(2.0), None, Some(30.0)),
            ("FR", 1, "ALL", None, Some(2.5), Some(20.0)),
            ("IT", 0, "ALL", Some(3.0), None, Some(10.0)),
            ("IT", 1, "ALL", None, Some(2.5), Some(10.0)),
            ("DE", 0, "FIN", Some(1.0), None, None),
            ("DE", 1, "FIN", None, Some(2.0), None),
            ("FR", 0, "FIN", Some(2.0), None, None),
            ("FR", 1, "FIN", None, Some(2.5), None),
            ("IT", 0, "FIN", Some(3.0), None, None),
            ("IT", 1, "FIN", None, Some(3.5), None),
            ("DE", 0, "NFC", Some(1.0), None, None),
            ("DE", 1, "NFC", None, Some(0.5), None),
            ("FR", 0, "NFC", Some(2.0), None, None),
            ("FR", 1, "NFC", None, Some(2.5), None),
            ("IT", 0, "NFC", Some(3.0), None, None),
            ("IT", 1, "NFC", None, Some(2.0), None),
        ];
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

    fn annotation(destination: &str, text: &str) -> Annotation {
        Annotation {
            destination: destination.into(),
            text: text.into(),
            offset: (30, 20),
            arrow: ArrowStyle::default(),
            bbox: BoxStyle::default(),
        }
    }

    #[test]
    fn renders_crisis_scatter() -> anyhow::Result<()> {
        let spec = CrisisSpec {
            origin: "GR".into(),
            crisis: 1,
            color: "#ef476f".into(),
            name: "Greece (2010q2)".into(),
            annotations: vec![annotation("FR", "France")],
        };
        let curve = build_crisis_curve(&panel(), &spec)?;
        let label = fit_label(&curve.fit);
        let figure = CrisisFigure::new(curve);
        assert_eq!(figure.name(), "Figure7_transmissionrisk_scatter_GR_crisis1");

        let dir = TempDir::new()?;
        let output = render_figure(
            &PreparedFigure::from(figure),
            dir.path(),
            &FigureStyle::default(),
        )?;
        let svg = std::fs::read_to_string(&output.svg)?;
        assert!(svg.contains("France"));
        let (slope, r2) = label.split_once("; ").unwrap();
        assert!(svg.contains(slope) && svg.contains(r2));
        Ok(())
    }

    #[test]
    fn renders_split_scatter_with_a_legend_per_group() -> anyhow::Result<()> {
        let group = |firm_type, color: &str, legend: &str| GroupSpec {
            firm_type,
            color: color.into(),
            legend: legend.into(),
            annotations: vec![annotation("IT", "Italy")],
        };
        let spec = SplitCrisisSpec {
            origin: "GR".into(),
            crisis: 1,
            name: "Greece (2010q2)".into(),
            groups: vec![
                group(FirmType::Nfc, "#118ab2", "Non-financial firms"),
                group(FirmType::Fin, "#ef476f", "Financial firms"),
            ],
        };
        let figure = SplitCrisisFigure::new(build_split_curve(&panel(), &spec)?);
        assert_eq!(figure.name(), "Figure8_transmissionrisk_scatter_GR_NFCvsFIN_crisis1");

        let dir = TempDir::new()?;
        let output = render_figure(
            &PreparedFigure::from(figure),
            dir.path(),
            &FigureStyle::default(),
        )?;
        let svg = std::fs::read_to_string(&output.svg)?;
        assert!(svg.contains("Non-financial firms") && svg.contains("Financial firms"));
        let data = std::fs::read_to_string(&output.data)?;
        assert_eq!(data.lines().count(), 1 + 2 * 5);
        Ok(())
    }
}
