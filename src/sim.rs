use sim_lib::cpu::{CPUPolicy, Implementation};
use sim_lib::error::{SimulatorError, SimulatorResult};
use sim_lib::loader;
use sim_lib::memory::MainMemory;
use sim_lib::pipelined::branch_predictor::PredictorHeuristic;
use sim_lib::pipelined::Pipeline;
use sim_lib::run_wrapper::{self, RunStats, DEFAULT_MAX_CYCLES};
use sim_lib::shell;
use std::env;
use std::error::Error;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: sim <program> [-v] [-h] [-i P|S] [-p GS|ANT] [-n] [-s] [-m <max-cycles>]";

struct Options {
    program: PathBuf,
    policy: CPUPolicy,
    max_cycles: u64,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> SimulatorResult<Options> {
    let config = |message: &str| SimulatorError::ConfigError(format!("{}\n{}", message, USAGE));

    let program = args.next().ok_or_else(|| config("You should specify exactly one program file"))?;
    let mut policy = CPUPolicy::default();
    let mut max_cycles = DEFAULT_MAX_CYCLES;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-v" => policy.verbose = true,
            "-h" => policy.history = true,
            "-n" => policy.forwarding = false,
            "-s" => policy.interactive = true,
            "-i" => {
                let impl_arg = args
                    .next()
                    .ok_or_else(|| config("You should specify an implementation after -i"))?;
                policy.implementation = match impl_arg.as_str() {
                    "S" => Implementation::SingleCycle,
                    "P" => Implementation::Pipelined,
                    _ => return Err(config("Invalid implementation specified after -i")),
                };
            }
            "-p" => {
                let heuristic_arg = args
                    .next()
                    .ok_or_else(|| config("You should specify a BP heuristic after -p"))?;
                policy.heuristic = match heuristic_arg.as_str() {
                    "GS" => PredictorHeuristic::Gshare,
                    "ANT" => PredictorHeuristic::AlwaysNotTaken,
                    _ => return Err(config("Invalid BP heuristic specified after -p")),
                };
            }
            "-m" => {
                max_cycles = args
                    .next()
                    .and_then(|n| n.parse().ok())
                    .ok_or_else(|| config("You should specify a cycle count after -m"))?;
            }
            _ => return Err(config(&format!("Unknown parameter: {}", arg))),
        }
    }

    if policy.interactive && policy.implementation == Implementation::SingleCycle {
        return Err(config("The shell drives the pipelined implementation only"));
    }

    Ok(Options { program: PathBuf::from(program), policy, max_cycles })
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn Error>> {
    let options = parse_args(env::args().skip(1))?;
    init_tracing(options.policy.verbose);

    if !options.policy.interactive {
        run_wrapper::run(&options.program, options.policy, options.max_cycles)?;
        return Ok(());
    }

    let mut memory = MainMemory::make();
    let entry = loader::load_program(&options.program, &mut memory)?;
    let mut pipeline = Pipeline::new(options.policy, memory);
    pipeline.init(entry);
    shell::run_shell(&mut pipeline, io::stdin().lock(), io::stdout(), options.max_cycles)?;

    if options.policy.history {
        RunStats::from_pipeline(&pipeline).report();
    }
    Ok(())
}
