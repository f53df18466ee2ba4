use std::error::Error;
use std::path::Path;

use plotters::prelude::*;
use sim_lib::cpu::CPUPolicy;
use sim_lib::pipelined::branch_predictor::PredictorHeuristic;
use sim_lib::run_wrapper::{run, DEFAULT_MAX_CYCLES};

const PROGRAMS: [&str; 5] = ["countdown", "fibonacci", "array_sum", "odd_count", "calls"];
const BAR_WIDTH: f64 = 0.35;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    // CPI per program, one series per heuristic
    let heuristics = [
        ("Gshare", PredictorHeuristic::Gshare),
        ("Always not taken", PredictorHeuristic::AlwaysNotTaken),
    ];
    let mut data: Vec<Vec<f64>> = vec![vec![]; heuristics.len()];
    let mut y_max: f64 = 0.;
    for program in PROGRAMS {
        let program_path = format!("programs/{}.hex", program);
        for (i, (_, heuristic)) in heuristics.iter().enumerate() {
            let policy = CPUPolicy { heuristic: *heuristic, ..Default::default() };
            let cpi = run(Path::new(&program_path), policy, DEFAULT_MAX_CYCLES)?.cpi();
            data[i].push(cpi);
            y_max = y_max.max(cpi);
        }
    }

    std::fs::create_dir_all("eval")?;
    let output_path = "eval/bp_eval.svg";
    let root = SVGBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut ctx = ChartBuilder::on(&root)
        .caption("Branch predictor evaluation (CPI)", ("sans-serif", 40).into_font())
        .margin(5)
        .x_label_area_size(40)
        .y_label_area_size(40)
        .build_cartesian_2d(-0.5..PROGRAMS.len() as f64 - 0.5, 0.0..y_max * 1.1)?;
    ctx.configure_mesh()
        .disable_x_mesh()
        .x_labels(PROGRAMS.len())
        .x_label_formatter(&|x| {
            let i = x.round();
            if i >= 0.0 && (i as usize) < PROGRAMS.len() {
                PROGRAMS[i as usize].to_string()
            } else {
                String::new()
            }
        })
        .x_desc("Program")
        .y_desc("CPI")
        .draw()?;

    for (i, (label, _)) in heuristics.iter().enumerate() {
        let color = Palette99::pick(i).to_rgba();
        let offset = (i as f64 - 1.0) * BAR_WIDTH;
        let bars = data[i].iter().enumerate().map(|(x, cpi)| {
            let left = x as f64 + offset;
            Rectangle::new([(left, 0.0), (left + BAR_WIDTH, *cpi)], color.filled())
        });
        ctx.draw_series(bars)?
            .label(*label)
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], color.filled()));
    }

    ctx.configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;

    Ok(())
}
