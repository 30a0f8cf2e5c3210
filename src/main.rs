use clap::Parser;
use log::{LevelFilter, info};
use std::error::Error;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use traceflow::trace::stream::spawn_trace;
use traceflow::{DEMO_SOURCE, ExecutionMode, ExecutionResult, ExecutionSnapshot, TracerConfig};

#[derive(Debug, Parser)]
#[command(name = "traceflow", version, about = "Step through a small JavaScript program")]
struct Cli {
    /// Source file to trace. Reads stdin when omitted.
    file: Option<PathBuf>,

    /// Print the trace as JSON
    #[arg(long)]
    json: bool,

    /// Print snapshots as they are recorded
    #[arg(long)]
    stream: bool,

    /// Maximum call depth
    #[arg(long, value_name = "N")]
    max_depth: Option<usize>,

    /// Maximum number of steps
    #[arg(long, value_name = "N")]
    max_steps: Option<usize>,

    /// Hide the `return value` entry at return statements
    #[arg(long)]
    no_return_values: bool,

    #[arg(long, value_name = "LEVEL", default_value = "warn")]
    log_level: LevelFilter,
}

impl Cli {
    fn config(&self) -> TracerConfig {
        let defaults = TracerConfig::default();
        TracerConfig {
            max_call_depth: self.max_depth.unwrap_or(defaults.max_call_depth),
            max_steps: self.max_steps.unwrap_or(defaults.max_steps),
            record_return_values: !self.no_return_values,
            ..defaults
        }
    }

    fn source(&self) -> Result<String, Box<dyn Error>> {
        let source = match &self.file {
            Some(path) => std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?,
            None if io::stdin().is_terminal() => String::new(),
            None => {
                let mut input = String::new();
                io::stdin().read_to_string(&mut input)?;
                input
            }
        };
        if source.trim().is_empty() {
            info!(target: "trace", "No source given, tracing the demo program");
            return Ok(DEMO_SOURCE.to_string());
        }
        Ok(source)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    traceflow::logger::init(cli.log_level)
        .map_err(|e| format!("Failed to initialize logger: {}", e))?;

    let source = cli.source()?;
    let config = cli.config();
    let start = std::time::Instant::now();

    let result = if cli.stream {
        let mut stream = spawn_trace(source.clone(), config);
        let lines: Vec<&str> = source.lines().collect();
        let (mut step, mut seen_console) = (0, 0);
        while let Some(snapshot) = stream.snapshots.recv().await {
            step += 1;
            if cli.json {
                println!("{}", serde_json::to_string(&snapshot)?);
            } else {
                print_snapshot(step, &lines, &snapshot, seen_console);
                seen_console = snapshot.console_output.len();
            }
        }
        stream.handle.await?
    } else {
        let result = traceflow::trace_source(&source, &config);
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            print_listing(&source, &result);
        }
        result
    };

    info!(target: "trace", "Traced {} steps in {:.2?}", result.total_steps, start.elapsed());
    if !cli.json {
        print_summary(&result);
    }
    Ok(())
}

fn print_listing(source: &str, result: &ExecutionResult) {
    let lines: Vec<&str> = source.lines().collect();
    let mut printed_console = 0;
    for (i, snapshot) in result.states.iter().enumerate() {
        print_snapshot(i + 1, &lines, snapshot, printed_console);
        printed_console = snapshot.console_output.len();
    }
}

/// Print one step. Console records before `seen_console` were already shown.
fn print_snapshot(step: usize, lines: &[&str], snapshot: &ExecutionSnapshot, seen_console: usize) {
    let text = lines.get(snapshot.source_line).map_or("", |l| l.trim());
    println!("[{:>4}] line {:>3} | {}", step, snapshot.source_line + 1, text);
    if !snapshot.call_stack.is_empty() {
        println!("       stack: {}", snapshot.call_stack.join(" > "));
    }
    for var in &snapshot.variables {
        println!("       {}.{} = {} ({})", var.scope, var.name, var.value, var.type_tag);
    }
    for record in snapshot.console_output.iter().skip(seen_console) {
        println!("       console: {}", record.content);
    }
}

fn print_summary(result: &ExecutionResult) {
    println!("{}", "=".repeat(50));
    match (result.mode, &result.failure) {
        (ExecutionMode::Fallback, Some(reason)) => {
            println!("[!] Approximated {} steps ({})", result.total_steps, reason)
        }
        (_, Some(reason)) => println!("[!] Run failed after {} steps: {}", result.total_steps, reason),
        _ => println!("[+] Completed in {} steps", result.total_steps),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_log_level_and_limits() {
        let cli = Cli::try_parse_from(["traceflow", "--log-level", "debug", "--max-depth", "12", "demo.js"])
            .expect("valid arguments");
        assert_eq!(cli.log_level, LevelFilter::Debug);
        assert_eq!(cli.file, Some(PathBuf::from("demo.js")));
        assert_eq!(cli.config().max_call_depth, 12);

        assert!(Cli::try_parse_from(["traceflow", "--log-level", "loud"]).is_err());
    }
}
