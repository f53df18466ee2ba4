use std::path::Path;
use std::process;

use sim_lib::cpu::CPUPolicy;
use sim_lib::error::{SimulatorError, SimulatorResult};
use sim_lib::pipelined::branch_predictor::PredictorHeuristic;
use sim_lib::run_wrapper::{run, DEFAULT_MAX_CYCLES};

const PROGRAMS: [&str; 5] = ["countdown", "fibonacci", "array_sum", "odd_count", "calls"];

fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    if let Err(e) = run_eval() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn csv_error(e: csv::Error) -> SimulatorError {
    SimulatorError::IoError(std::io::Error::other(format!("CSV output failed: {}", e)))
}

fn run_eval() -> SimulatorResult<()> {
    let output_path = "eval/sim_eval.csv";
    std::fs::create_dir_all("eval")?;
    let mut writer = csv::Writer::from_path(output_path).map_err(csv_error)?;

    writer
        .write_record([
            "Program",
            "Heuristic",
            "Cycles",
            "Instructions",
            "CPI",
            "Hazard stalls",
            "D-cache stalls",
            "I-cache stalls",
            "Branches",
            "Mispredictions",
        ])
        .map_err(csv_error)?;

    for program in PROGRAMS {
        let program_path = format!("programs/{}.hex", program);
        for (name, heuristic) in
            [("GS", PredictorHeuristic::Gshare), ("ANT", PredictorHeuristic::AlwaysNotTaken)]
        {
            eprintln!("Running program: {} ({})", program_path, name);
            let policy = CPUPolicy { heuristic, ..Default::default() };

            match run(Path::new(&program_path), policy, DEFAULT_MAX_CYCLES) {
                Ok(stats) => {
                    let h = stats.history;
                    writer
                        .write_record([
                            program.to_string(),
                            name.to_string(),
                            h.cycle_count.to_string(),
                            h.inst_count.to_string(),
                            format!("{:.3}", stats.cpi()),
                            h.hazard_stall_count.to_string(),
                            h.mem_stall_count.to_string(),
                            h.fetch_stall_count.to_string(),
                            h.branch_count.to_string(),
                            h.mispredict_count.to_string(),
                        ])
                        .map_err(csv_error)?;
                }
                Err(e) => {
                    eprintln!("Warning: Failed to run program '{}': {}", program, e);
                    let mut record = vec![program.to_string(), name.to_string()];
                    record.resize(10, "Error".to_string());
                    writer.write_record(&record).map_err(csv_error)?;
                }
            }
        }
    }

    writer.flush()?;
    Ok(())
}
