use crate::interpreter::{Interpreter, RunReport, RunState};
use std::error::Error;
use std::io::{self, Write};
use std::path::Path;
use stepper_common::CommandInput;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Clone, Copy)]
pub struct OutputHandlers {
    pub out: fn(&str),
    pub err: fn(&str),
}

pub struct ReplOptions<'a> {
    pub banner_lines: &'a [&'a str],
    pub prompt: &'a str,
    pub exit_commands: &'a [&'a str],
    pub handle_ctrl_c: bool,
    pub ctrl_c_message: Option<&'a str>,
}

fn print_report(report: &RunReport, output: OutputHandlers) {
    for entry in &report.log {
        let text = entry.result.as_text();
        if entry.result.is_error() {
            (output.err)(&format!("{} -> {}", entry.command, text));
        } else {
            (output.out)(&format!("{} -> {}", entry.command, text));
        }
    }
    if report.status == RunState::Halted {
        (output.err)("Run halted");
    }
}

/// Run a script file as a single run. Parse errors abort before anything executes.
pub async fn run_file(
    interpreter: &Interpreter,
    output: OutputHandlers,
    path: &Path,
) -> Result<RunReport, Box<dyn Error>> {
    let content = tokio::fs::read_to_string(path).await?;
    let report = interpreter.run_script(&content).await?;
    print_report(&report, output);
    Ok(report)
}

/// Possible outcomes from reading a single REPL line.
enum ReadLineResult {
    /// A non-empty input line to process.
    Input(String),
    /// Empty line or no input yet -- skip and re-prompt.
    Skip,
    /// EOF or exit command -- terminate the loop.
    Exit,
    /// I/O error while reading.
    Error(io::Error),
}

async fn read_line(
    reader: &mut tokio::io::Lines<BufReader<tokio::io::Stdin>>,
    exit_commands: &[&str],
    handle_ctrl_c: bool,
    ctrl_c_message: Option<&str>,
    output: OutputHandlers,
) -> ReadLineResult {
    if handle_ctrl_c {
        tokio::select! {
            line = reader.next_line() => {
                classify_line(line, exit_commands)
            }
            _ = tokio::signal::ctrl_c() => {
                if let Some(message) = ctrl_c_message {
                    (output.out)(message);
                }
                ReadLineResult::Exit
            }
        }
    } else {
        classify_line(reader.next_line().await, exit_commands)
    }
}

fn classify_line(
    result: Result<Option<String>, io::Error>,
    exit_commands: &[&str],
) -> ReadLineResult {
    match result {
        Ok(Some(input)) => {
            let trimmed = input.trim().to_string();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                ReadLineResult::Skip
            } else if exit_commands.contains(&trimmed.as_str()) {
                ReadLineResult::Exit
            } else {
                ReadLineResult::Input(trimmed)
            }
        }
        Ok(None) => ReadLineResult::Exit,
        Err(e) => ReadLineResult::Error(e),
    }
}

/// Each line is its own single-command run.
pub async fn run_repl(
    interpreter: &Interpreter,
    output: OutputHandlers,
    options: ReplOptions<'_>,
) -> Result<(), Box<dyn Error>> {
    for line in options.banner_lines {
        (output.out)(line);
    }

    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin).lines();
    let mut stdout = io::stdout();

    loop {
        print!("{}", options.prompt);
        stdout.flush()?;

        match read_line(
            &mut reader,
            options.exit_commands,
            options.handle_ctrl_c,
            options.ctrl_c_message,
            output,
        )
        .await
        {
            ReadLineResult::Input(line) => {
                match interpreter.run_inputs(vec![CommandInput::Text(line)]).await {
                    Ok(report) => print_report(&report, output),
                    Err(err) => (output.err)(&format!("Error: {}", err)),
                }
            }
            ReadLineResult::Skip => continue,
            ReadLineResult::Exit => break,
            ReadLineResult::Error(e) => return Err(e.into()),
        }
    }
    Ok(())
}
