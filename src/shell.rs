//! Interactive shell
//!
//! Reads one command per line and drives a [`Pipeline`] between them.
//! Bad input and fatal simulator conditions are reported and the shell
//! keeps going; only `quit` or end of input leaves it.

use std::io::{BufRead, Write};

use text_io::try_read;

use crate::cpu::NUM_REGS;
use crate::error::{ShellError, SimulatorResult};
use crate::memory::MemoryInterface;
use crate::pipelined::Pipeline;
use crate::run_wrapper::run_to_completion;

const PROMPT: &str = "ARM-SIM> ";

const HELP: &str = "\
go                 run until HLT retires
run <n>            simulate n cycles
rdump              dump PC, flags and registers
mdump <lo> <hi>    dump memory words from lo to hi
input <reg> <val>  set a general purpose register
stats              print cycle statistics
?, help            print this message
quit               leave the shell";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Go,
    Run(u64),
    RegDump,
    MemDump(u64, u64),
    Input(u8, i64),
    Stats,
    Help,
    Quit,
}

/// Parses a decimal or `0x`-prefixed hexadecimal number
fn parse_number(token: &str) -> Result<u64, ShellError> {
    let invalid = || ShellError::InvalidNumber(token.to_string());
    match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(digits) => u64::from_str_radix(digits, 16).map_err(|_| invalid()),
        None => {
            let value: Result<u64, text_io::Error> = try_read!("{}", token.bytes());
            value.map_err(|_| invalid())
        }
    }
}

/// Like [`parse_number`] but accepts a leading minus sign
fn parse_value(token: &str) -> Result<i64, ShellError> {
    match token.strip_prefix('-') {
        Some(rest) => parse_number(rest).and_then(|magnitude| {
            0i64.checked_sub_unsigned(magnitude)
                .ok_or_else(|| ShellError::InvalidNumber(token.to_string()))
        }),
        None => parse_number(token).map(|v| v as i64),
    }
}

/// Parses one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>, ShellError> {
    let mut tokens = line.split_whitespace();
    let Some(name) = tokens.next() else {
        return Ok(None);
    };
    let mut arg = |what: &'static str| tokens.next().ok_or(ShellError::MissingArgument(what));

    let command = match name.to_ascii_lowercase().as_str() {
        "go" | "g" => Command::Go,
        "run" | "r" => Command::Run(parse_number(arg("run")?)?),
        "rdump" => Command::RegDump,
        "mdump" => {
            let lo = parse_number(arg("mdump")?)?;
            let hi = parse_number(arg("mdump")?)?;
            Command::MemDump(lo, hi)
        }
        "input" | "i" => {
            let reg = parse_number(arg("input")?)?;
            if reg >= NUM_REGS as u64 {
                return Err(ShellError::InvalidRegister(reg));
            }
            Command::Input(reg as u8, parse_value(arg("input")?)?)
        }
        "stats" => Command::Stats,
        "?" | "help" | "h" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        _ => return Err(ShellError::UnknownCommand(name.to_string())),
    };
    Ok(Some(command))
}

/// Runs the shell over `input` until `quit` or end of input
pub fn run_shell<M: MemoryInterface, R: BufRead, W: Write>(
    pipeline: &mut Pipeline<M>,
    mut input: R,
    mut output: W,
    max_cycles: u64,
) -> SimulatorResult<()> {
    let mut line = String::new();
    loop {
        write!(output, "{}", PROMPT)?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            return Ok(());
        }

        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                writeln!(output, "Error: {}", e)?;
                continue;
            }
        };
        if command == Command::Quit {
            pipeline.halt();
            writeln!(output, "Bye.")?;
            return Ok(());
        }
        execute_command(pipeline, command, &mut output, max_cycles)?;
    }
}

/// Carries out one command. Simulator errors are written to `output`;
/// only I/O errors on `output` are returned.
pub fn execute_command<M: MemoryInterface, W: Write>(
    pipeline: &mut Pipeline<M>,
    command: Command,
    output: &mut W,
    max_cycles: u64,
) -> SimulatorResult<()> {
    match command {
        Command::Go | Command::Run(_) if !pipeline.is_running() => {
            writeln!(output, "Simulator halted")?;
        }
        Command::Go => {
            writeln!(output, "Simulating...")?;
            if let Err(e) = run_to_completion(pipeline, max_cycles) {
                writeln!(output, "Error: {}", e)?;
            }
        }
        Command::Run(cycles) => {
            writeln!(output, "Simulating for {} cycles...", cycles)?;
            if let Err(e) = pipeline.run(cycles) {
                writeln!(output, "Error: {}", e)?;
            }
        }
        Command::RegDump => dump_registers(pipeline, output)?,
        Command::MemDump(lo, hi) => {
            writeln!(output, "Memory content [{:#010x}..{:#010x}]:", lo, hi)?;
            let mut address = lo;
            while address <= hi {
                let word = pipeline.memory_mut().read_word(address);
                writeln!(output, "  {:#010x} (0d{:>10}) : {:#010x}", address, address, word)?;
                match address.checked_add(4) {
                    Some(next) => address = next,
                    None => break,
                }
            }
        }
        Command::Input(reg, value) => {
            pipeline.cpu_mut().regs.write(reg, value);
            writeln!(output, "X{} <- {:#x}", reg, value)?;
        }
        Command::Stats => {
            let h = pipeline.cpu().history;
            writeln!(output, "Cycles: {}", h.cycle_count)?;
            writeln!(output, "Instructions retired: {}", h.inst_count)?;
            writeln!(output, "CPI: {:.3}", h.cpi())?;
            writeln!(
                output,
                "Stall cycles: hazard {}, data cache {}, instruction cache {}",
                h.hazard_stall_count, h.mem_stall_count, h.fetch_stall_count
            )?;
            writeln!(output, "Branches: {}, mispredicted: {}", h.branch_count, h.mispredict_count)?;
            let (i, d) = (pipeline.icache_history(), pipeline.dcache_history());
            writeln!(output, "I-cache: {} accesses, {} misses", i.accesses, i.misses)?;
            writeln!(output, "D-cache: {} accesses, {} misses", d.accesses, d.misses)?;
        }
        Command::Help => writeln!(output, "{}", HELP)?,
        Command::Quit => {}
    }
    Ok(())
}

fn dump_registers<M: MemoryInterface, W: Write>(
    pipeline: &Pipeline<M>,
    output: &mut W,
) -> SimulatorResult<()> {
    let cpu = pipeline.cpu();
    writeln!(output, "Current register/bus values:")?;
    writeln!(output, "-------------------------------------")?;
    writeln!(output, "Instruction Count : {}", cpu.history.inst_count)?;
    writeln!(output, "PC                : {:#018x}", cpu.pc)?;
    writeln!(output, "Flags             : N={} Z={}", cpu.flags.n as u8, cpu.flags.z as u8)?;
    writeln!(output, "Registers:")?;
    for reg in 0..NUM_REGS as u8 {
        writeln!(output, "X{}:\t{:#018x} ({})", reg, cpu.regs.read(reg), cpu.regs.read(reg))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::{CPUPolicy, TEXT_START};
    use crate::instruction::HLT;
    use crate::memory::MainMemory;
    use rstest::rstest;
    use std::io::Cursor;

    fn pipeline_with(words: &[u32]) -> Pipeline<MainMemory> {
        let mut memory = MainMemory::make();
        memory.load_words(TEXT_START, words).unwrap();
        let mut pipeline = Pipeline::new(CPUPolicy::default(), memory);
        pipeline.init(TEXT_START);
        pipeline
    }

    fn session(pipeline: &mut Pipeline<MainMemory>, script: &str) -> String {
        let mut output = Vec::new();
        run_shell(pipeline, Cursor::new(script), &mut output, 10_000).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[rstest]
    #[case("go", Command::Go)]
    #[case("run 25", Command::Run(25))]
    #[case("RUN 0x10", Command::Run(16))]
    #[case("rdump", Command::RegDump)]
    #[case("mdump 0x400000 0x40000c", Command::MemDump(0x40_0000, 0x40_000c))]
    #[case("input 3 -7", Command::Input(3, -7))]
    #[case("input 1 0x1000", Command::Input(1, 0x1000))]
    #[case("input 2 -9223372036854775808", Command::Input(2, i64::MIN))]
    #[case("input 2 -0x8000000000000000", Command::Input(2, i64::MIN))]
    #[case("stats", Command::Stats)]
    #[case("?", Command::Help)]
    #[case("quit", Command::Quit)]
    fn parses_commands(#[case] line: &str, #[case] expected: Command) {
        assert_eq!(parse_command(line), Ok(Some(expected)));
    }

    #[rstest]
    #[case("jump", ShellError::UnknownCommand("jump".into()))]
    #[case("run", ShellError::MissingArgument("run"))]
    #[case("run ten", ShellError::InvalidNumber("ten".into()))]
    #[case("mdump 0x10", ShellError::MissingArgument("mdump"))]
    #[case("input 32 1", ShellError::InvalidRegister(32))]
    #[case("input 2 -9223372036854775809", ShellError::InvalidNumber("-9223372036854775809".into()))]
    fn rejects_bad_input(#[case] line: &str, #[case] expected: ShellError) {
        assert_eq!(parse_command(line), Err(expected));
    }

    #[test]
    fn blank_line_is_no_command() {
        assert_eq!(parse_command("   \n"), Ok(None));
    }

    #[test]
    fn go_runs_to_halt() {
        // MOVZ X1, #42; HLT
        let mut pipeline = pipeline_with(&[0xd280_0541, HLT]);
        let out = session(&mut pipeline, "go\nrdump\ngo\nquit\n");
        assert!(!pipeline.is_running());
        assert_eq!(pipeline.cpu().regs.read(1), 42);
        assert!(out.contains("X1:\t0x000000000000002a (42)"));
        assert!(out.contains("Simulator halted"));
        assert!(out.ends_with("Bye.\n"));
    }

    #[test]
    fn run_advances_exact_cycles() {
        let mut pipeline = pipeline_with(&[HLT]);
        session(&mut pipeline, "run 10\n");
        assert_eq!(pipeline.cpu().history.cycle_count, 10);
        assert!(pipeline.is_running());
    }

    #[test]
    fn input_sets_register() {
        let mut pipeline = pipeline_with(&[HLT]);
        let out = session(&mut pipeline, "input 5 0x20\n");
        assert_eq!(pipeline.cpu().regs.read(5), 0x20);
        assert!(out.contains("X5 <- 0x20"));
    }

    #[test]
    fn errors_do_not_end_the_session() {
        let mut pipeline = pipeline_with(&[0]);
        let out = session(&mut pipeline, "bogus\ngo\nmdump 0x400000 0x400004\n");
        assert!(out.contains("Error: Unknown command 'bogus'"));
        assert!(out.contains("Error: CPU execution error"));
        assert!(out.contains("0x00400004"));
        assert!(!pipeline.is_running());
    }
}
