//! Stages delegated to external programs (the statistical package, LaTeX).

use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{TransRiskError, TransRiskResult};

/// Lines of standard error kept in a failure diagnostic.
const STDERR_TAIL: usize = 20;

/// An external script run as `<executable> <base_args> <script> <args>`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalStage {
    pub name: String,
    pub script: PathBuf,
    /// Arguments after the script; `{raw}`, `{final}`, `{temp}`, `{logs}`, `{figures}`,
    /// `{tables}` and `{root}` are replaced by the configured directories.
    #[serde(default)]
    pub args: Vec<String>,
    /// A failing optional stage is reported but does not stop the pipeline.
    #[serde(default)]
    pub optional: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StageOutcome {
    pub name: String,
    pub success: bool,
    pub diagnostic: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ExternalRunner {
    pub executable: PathBuf,
    pub base_args: Vec<String>,
    pub working_dir: PathBuf,
    /// `(name, value)` pairs substituted for `{name}` in stage arguments.
    pub placeholders: Vec<(String, String)>,
}

impl ExternalRunner {
    pub fn new(executable: impl Into<PathBuf>, base_args: &[String], working_dir: &Path) -> Self {
        Self {
            executable: executable.into(),
            base_args: base_args.to_vec(),
            working_dir: working_dir.to_path_buf(),
            placeholders: Vec::new(),
        }
    }

    pub fn with_placeholder(mut self, name: &str, value: &Path) -> Self {
        self.placeholders
            .push((name.to_string(), value.to_string_lossy().into_owned()));
        self
    }

    fn expand(&self, arg: &str) -> String {
        self.placeholders
            .iter()
            .fold(arg.to_string(), |arg, (name, value)| {
                arg.replace(&format!("{{{name}}}"), value)
            })
    }

    fn command(&self, stage: &ExternalStage) -> Command {
        let mut command = Command::new(&self.executable);
        command
            .args(&self.base_args)
            .arg(&stage.script)
            .args(stage.args.iter().map(|arg| self.expand(arg)))
            .current_dir(&self.working_dir);
        command
    }

    /// Runs `stage` to completion. Failures of required stages are errors.
    pub fn run(&self, stage: &ExternalStage) -> TransRiskResult<StageOutcome> {
        std::fs::create_dir_all(&self.working_dir)?;
        let mut command = self.command(stage);
        info!("Running external stage `{}`", stage.name);
        debug!("{command:?}");
        let diagnostic = match command.output() {
            Ok(output) if output.status.success() => None,
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let lines: Vec<&str> = stderr.lines().collect();
                let tail = lines[lines.len().saturating_sub(STDERR_TAIL)..].join("\n");
                Some(if tail.is_empty() {
                    output.status.to_string()
                } else {
                    format!("{}: {tail}", output.status)
                })
            }
            Err(err) => Some(format!(
                "could not start {}: {err}",
                self.executable.display()
            )),
        };
        let outcome = StageOutcome {
            name: stage.name.clone(),
            success: diagnostic.is_none(),
            diagnostic,
        };
        match (&outcome.diagnostic, stage.optional) {
            (None, _) => Ok(outcome),
            (Some(diagnostic), true) => {
                warn!(
                    "Optional external stage `{}` failed: {diagnostic}",
                    stage.name
                );
                Ok(outcome)
            }
            (Some(diagnostic), false) => Err(TransRiskError::ExternalStage {
                name: stage.name.clone(),
                diagnostic: diagnostic.clone(),
            }),
        }
    }

    /// Runs the stages in order, stopping at the first required failure.
    pub fn run_all(&self, stages: &[ExternalStage]) -> TransRiskResult<Vec<StageOutcome>> {
        stages.iter().map(|stage| self.run(stage)).collect()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn stage(name: &str, script: &Path, args: &[&str], optional: bool) -> ExternalStage {
        ExternalStage {
            name: name.into(),
            script: script.to_path_buf(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            optional,
        }
    }

    fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn placeholders_are_expanded_in_arguments() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let logs = dir.path().join("logs");
        let script = script(&dir, "write.sh", "printf '%s' \"$1\" > out.txt\n");
        let runner = ExternalRunner::new("sh", &[], &logs)
            .with_placeholder("final", Path::new("/data/final"));
        let outcome = runner.run(&stage("write", &script, &["{final}/panel.csv"], false))?;
        assert!(outcome.success);
        assert_eq!(outcome.diagnostic, None);
        // Runs inside the working directory
        assert_eq!(
            std::fs::read_to_string(logs.join("out.txt"))?,
            "/data/final/panel.csv"
        );
        Ok(())
    }

    #[test]
    fn required_failure_is_an_error() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let script = script(&dir, "fail.sh", "echo 'r(601): file not found' >&2\nexit 3\n");
        let runner = ExternalRunner::new("sh", &[], dir.path());
        let err = runner
            .run(&stage("table7_prepare", &script, &[], false))
            .unwrap_err();
        match err {
            TransRiskError::ExternalStage { name, diagnostic } => {
                assert_eq!(name, "table7_prepare");
                assert!(diagnostic.contains("r(601): file not found"));
            }
            other => panic!("unexpected error {other}"),
        }
        Ok(())
    }

    #[test]
    fn optional_failure_is_reported() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let failing = script(&dir, "fail.sh", "exit 1\n");
        let passing = script(&dir, "pass.sh", "exit 0\n");
        let runner = ExternalRunner::new("sh", &[], dir.path());
        let outcomes = runner.run_all(&[
            stage("figure5", &failing, &[], true),
            stage("figure6", &passing, &[], false),
        ])?;
        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].success);
        assert!(outcomes[0].diagnostic.is_some());
        assert!(outcomes[1].success);
        Ok(())
    }

    #[test]
    fn missing_executable_is_diagnosed() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let runner = ExternalRunner::new(dir.path().join("no-such-program"), &[], dir.path());
        let outcome = runner.run(&stage("figure5", Path::new("figure5.do"), &[], true))?;
        assert!(!outcome.success);
        assert!(outcome
            .diagnostic
            .is_some_and(|diagnostic| diagnostic.starts_with("could not start")));
        Ok(())
    }
}
