use std::io::Write;

use comfy_table::{presets::NOTHING, *};
use transrisk::error::MissingInput;
use transrisk::pipeline::{Stage, StageReport};

use crate::error::TransRiskCliResult;

fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            header
                .iter()
                .map(|name| Cell::new(name).add_attribute(Attribute::Bold)),
        )
        .set_style(comfy_table::TableComponent::BottomBorder, '─')
        .set_style(comfy_table::TableComponent::MiddleHeaderIntersections, '─')
        .set_style(comfy_table::TableComponent::HeaderLines, '─')
        .set_style(comfy_table::TableComponent::BottomBorderIntersections, '─')
        .set_style(comfy_table::TableComponent::TopBorder, '─')
        .set_style(comfy_table::TableComponent::TopBorderIntersections, '─');
    table
}

pub fn display_report(out: &mut impl Write, report: &StageReport) -> TransRiskCliResult<()> {
    writeln!(
        out,
        "\nStage `{}` wrote {} file(s).",
        report.stage,
        report.outputs.len()
    )?;

    if !report.merges.is_empty() {
        let mut table = new_table(&["Merge", "Left only", "Right only", "Matched"]);
        for merge in &report.merges {
            table.add_row(vec![
                Cell::new(&merge.name),
                Cell::new(merge.left_only).set_alignment(CellAlignment::Right),
                Cell::new(merge.right_only).set_alignment(CellAlignment::Right),
                Cell::new(merge.both).set_alignment(CellAlignment::Right),
            ]);
        }
        writeln!(out, "\n{}", table)?;
    }

    if !report.external.is_empty() {
        let mut table = new_table(&["External stage", "Status", "Diagnostic"]);
        for outcome in &report.external {
            let status = if outcome.success {
                Cell::new("ok").fg(Color::Green)
            } else {
                Cell::new("failed").fg(Color::Red)
            };
            table.add_row(vec![
                Cell::new(&outcome.name),
                status,
                Cell::new(outcome.diagnostic.as_deref().unwrap_or_default()),
            ]);
        }
        writeln!(out, "\n{}", table)?;
    }
    Ok(())
}

pub fn display_missing_inputs(
    out: &mut impl Write,
    missing: &[(Stage, MissingInput)],
) -> TransRiskCliResult<()> {
    let mut table = new_table(&["Stage", "Input", "Path"]);
    for (stage, input) in missing {
        table.add_row(vec![
            stage.to_string(),
            input.name.clone(),
            input.path.display().to_string(),
        ]);
    }
    writeln!(out, "\nThe following inputs are missing:")?;
    writeln!(out, "\n{}", table)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::error::TransRiskCliError;

    /// A sink that refuses every write.
    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn missing() -> Vec<(Stage, MissingInput)> {
        vec![(
            Stage::Data,
            MissingInput {
                name: "World Bank GDP".to_string(),
                path: PathBuf::from("raw/worldbank/gdp.csv"),
            },
        )]
    }

    #[test]
    fn missing_inputs_are_listed() -> anyhow::Result<()> {
        let mut out = Vec::new();
        display_missing_inputs(&mut out, &missing())?;
        let text = String::from_utf8(out)?;
        assert!(text.contains("The following inputs are missing:"));
        assert!(text.contains("World Bank GDP"));
        assert!(text.contains("raw/worldbank/gdp.csv"));
        Ok(())
    }

    #[test]
    fn write_failures_are_io_errors() {
        let result = display_missing_inputs(&mut ClosedPipe, &missing());
        assert!(matches!(result, Err(TransRiskCliError::IOError(_))));
    }
}
