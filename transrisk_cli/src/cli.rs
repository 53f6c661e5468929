use std::io::Write;
use std::path::PathBuf;

use clap::{command, ArgAction, Args, Parser, Subcommand};
use enum_dispatch::enum_dispatch;
use log::info;
use spinners::{Spinner, Spinners};
use transrisk::config::Config;
use transrisk::error::{MissingInput, TransRiskResult};
use transrisk::pipeline::{RunOptions, Stage, StageReport};
use transrisk::TransRisk;

use crate::display::{display_missing_inputs, display_report};
use crate::error::{TransRiskCliError, TransRiskCliResult};

const DEFAULT_PROGRESS_SPINNER: Spinners = Spinners::Dots;
const COMPLETE_PROGRESS_STRING: &str = "✔";
const FAILED_PROGRESS_STRING: &str = "✘";
const RUNNING_TAIL_STRING: &str = "...";

/// Runs `f` behind a spinner unless `quiet`.
fn with_spinner<T>(
    quiet: bool,
    message: &str,
    f: impl FnOnce() -> TransRiskResult<T>,
) -> TransRiskResult<T> {
    let sp = (!quiet).then(|| {
        Spinner::with_timer(
            DEFAULT_PROGRESS_SPINNER,
            message.to_string() + RUNNING_TAIL_STRING,
        )
    });
    let result = f();
    if let Some(mut s) = sp {
        if result.is_ok() {
            s.stop_with_symbol(COMPLETE_PROGRESS_STRING);
        } else {
            s.stop_with_symbol(FAILED_PROGRESS_STRING);
        }
    }
    result
}

/// Trait that defines what to run when a given subcommand is invoked.
#[enum_dispatch]
pub trait RunCommand {
    fn run(&self, config: Config) -> TransRiskCliResult<()>;
}

#[derive(Args, Debug, Clone)]
struct StageArgs {
    #[arg(
        long,
        action = ArgAction::Set,
        default_value_t = true,
        value_name = "BOOL",
        help = "Remove the outputs of previous runs before starting"
    )]
    clean_slate: bool,
}

#[derive(Args, Debug, Clone)]
struct CompileArgs {
    #[arg(long, help = "Compile the paper with LaTeX after the analysis stage")]
    also_compile: bool,
}

/// The `data` command builds the final datasets from the raw inputs.
#[derive(Args, Debug)]
pub struct DataCommand {
    #[command(flatten)]
    stage_args: StageArgs,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for DataCommand {
    fn run(&self, config: Config) -> TransRiskCliResult<()> {
        info!("Running `data` subcommand");
        let transrisk = TransRisk::new(config);
        let options = RunOptions {
            clean_slate: self.stage_args.clean_slate,
            also_compile: false,
        };
        let report = with_spinner(self.quiet, "Building final datasets", || {
            transrisk.data(&options)
        })?;
        display_report(&mut std::io::stdout().lock(), &report)?;
        Ok(())
    }
}

/// The `analysis` command renders the figures and tables from the final datasets.
#[derive(Args, Debug)]
pub struct AnalysisCommand {
    #[command(flatten)]
    stage_args: StageArgs,
    #[command(flatten)]
    compile_args: CompileArgs,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for AnalysisCommand {
    fn run(&self, config: Config) -> TransRiskCliResult<()> {
        info!("Running `analysis` subcommand");
        let transrisk = TransRisk::new(config);
        let options = RunOptions {
            clean_slate: self.stage_args.clean_slate,
            also_compile: self.compile_args.also_compile,
        };
        let report = with_spinner(self.quiet, "Rendering figures and tables", || {
            transrisk.analysis(&options)
        })?;
        display_report(&mut std::io::stdout().lock(), &report)?;
        Ok(())
    }
}

/// The `all` command runs the data stage followed by the analysis stage.
#[derive(Args, Debug)]
pub struct AllCommand {
    #[command(flatten)]
    stage_args: StageArgs,
    #[command(flatten)]
    compile_args: CompileArgs,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for AllCommand {
    fn run(&self, config: Config) -> TransRiskCliResult<()> {
        info!("Running `all` subcommand");
        let transrisk = TransRisk::new(config);
        let options = RunOptions {
            clean_slate: self.stage_args.clean_slate,
            also_compile: self.compile_args.also_compile,
        };
        let reports: Vec<StageReport> =
            with_spinner(self.quiet, "Running the pipeline", || transrisk.all(&options))?;
        let mut stdout_lock = std::io::stdout().lock();
        for report in &reports {
            display_report(&mut stdout_lock, report)?;
        }
        Ok(())
    }
}

/// The `check` command lists the inputs of each stage that do not exist yet.
#[derive(Args, Debug)]
pub struct CheckCommand {
    #[arg(
        long,
        value_name = "data|analysis",
        help = "Only check the inputs of this stage"
    )]
    stage: Option<Stage>,
}

impl RunCommand for CheckCommand {
    fn run(&self, config: Config) -> TransRiskCliResult<()> {
        info!("Running `check` subcommand");
        let stages = match self.stage {
            Some(stage) => vec![stage],
            None => vec![Stage::Data, Stage::Analysis],
        };
        let missing: Vec<(Stage, MissingInput)> = stages
            .into_iter()
            .flat_map(|stage| {
                let inputs = match stage {
                    Stage::Data => config.data_inputs(),
                    Stage::Analysis => config.analysis_inputs(),
                };
                inputs
                    .into_iter()
                    .filter(|input| !input.path.exists())
                    .map(move |input| (stage, input))
            })
            .collect();
        if missing.is_empty() {
            writeln!(std::io::stdout().lock(), "All inputs found.")?;
            return Ok(());
        }
        display_missing_inputs(&mut std::io::stdout().lock(), &missing)?;
        Err(TransRiskCliError::MissingInputs(missing.len()))
    }
}

/// The entrypoint for the CLI.
#[derive(Parser, Debug)]
#[command(version, about="Runs the transmission risk pipeline: data preparation, figures and tables.", long_about = None, name="transrisk")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    #[arg(
        short = 'c',
        long = "config",
        value_name = "PATH",
        help = "\
            Config file. Defaults to `./transrisk.toml`, then `transrisk/config.toml` in the\n\
            user config directory.",
        global = true
    )]
    pub config: Option<PathBuf>,
    #[arg(
        short = 'q',
        long = "quiet",
        help = "\
            Do not print progress bar to stdout. Results and logs (when `RUST_LOG` is set)\n\
            will still be printed.",
        global = true
    )]
    quiet: bool,
}

/// Commands contains the list of subcommands avaliable for use in the CLI.
/// Each command should implmement the RunCommand trait and specify the list
/// of required args for that command.
#[derive(Subcommand, Debug)]
#[enum_dispatch(RunCommand)]
pub enum Commands {
    /// Build the final datasets from the raw inputs
    Data(DataCommand),
    /// Render figures and tables from the final datasets
    Analysis(AnalysisCommand),
    /// Run the data stage followed by the analysis stage
    All(AllCommand),
    /// List missing inputs without running anything
    Check(CheckCommand),
}
