use anyhow::{Context, Result};
use clap::Parser;
use gerg_core::{HistoryRecord, Plan, RunStatus, Settings};
use gerg_llm::{OllamaClient, PlannerClient};
use gerg_policy::SafetyScreener;
use gerg_store::HistoryStore;
use gerg_tools::{ExecContext, Executor, is_actionable};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "gerg")]
#[command(about = "Plan and run shell commands for a natural-language goal", long_about = None)]
struct Cli {
    /// Run the planned commands without asking for confirmation.
    #[arg(short = 'y', long)]
    yes: bool,

    /// Print the plan and exit without executing anything.
    #[arg(short = 'p', long = "print-only")]
    print_only: bool,

    /// Override the configured model for this invocation.
    #[arg(long)]
    model: Option<String>,

    /// Directory to start execution from (defaults to the current directory).
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Skip the dangerous-command screen. Only for plans you have read and
    /// trust; the screen exists for a reason.
    #[arg(long = "unsafe-ok")]
    unsafe_ok: bool,

    /// Enable verbose diagnostics on stderr.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// The goal, in plain language (remaining arguments are joined with spaces).
    #[arg(trailing_var_arg = true, required = true)]
    goal: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => ExitCode::from(code.clamp(0, 255) as u8),
        Err(err) => {
            eprintln!("gerg: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<i32> {
    let mut settings = Settings::load().context("failed to load configuration")?;
    if let Some(model) = &cli.model {
        settings.model = model.clone();
    }
    let goal = cli.goal.join(" ");
    let start_dir = match &cli.cwd {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("cannot determine current directory")?,
    };

    verbose_log(
        cli.verbose,
        &format!(
            "model={} base_url={} history_dir={}",
            settings.model,
            settings.ollama_base_url,
            settings.history_dir.display()
        ),
    );

    let store = HistoryStore::new(&settings.history_dir)?;
    let record =
        |status: RunStatus, plan: &Plan| HistoryRecord::new(&goal, &settings.model, plan, status);

    // Planner failure aborts before any history line: there is no plan to record.
    let client = OllamaClient::new(&settings.ollama_base_url, &settings.model)?;
    verbose_log(cli.verbose, &format!("requesting plan for: {goal}"));
    let plan = client.request_plan(&goal).context("planning failed")?;
    verbose_log(
        cli.verbose,
        &format!("received plan with {} command(s)", plan.commands.len()),
    );

    if !cli.unsafe_ok {
        let screener = SafetyScreener::new();
        for command in &plan.commands {
            if let Some(rule) = screener.assess(command) {
                eprintln!("Refusing to run: {command}");
                eprintln!("  matched safety rule: {}", rule.description);
                eprintln!(
                    "Rephrase the goal, or re-run with --unsafe-ok if you are certain this is what you want."
                );
                store.append(&record(RunStatus::BlockedUnsafe, &plan))?;
                return Ok(2);
            }
        }
    }

    if !plan.commands.iter().any(|command| is_actionable(command)) {
        if !plan.explanation.is_empty() {
            println!("{}", plan.explanation);
        }
        println!(
            "The plan contains no runnable commands. Try rephrasing the goal with a concrete outcome."
        );
        store.append(&record(RunStatus::NoActionableCommands, &plan))?;
        return Ok(0);
    }

    println!();
    print_plan(&plan);

    if cli.print_only {
        store.append(&record(RunStatus::Printed, &plan))?;
        return Ok(0);
    }

    if plan.require_confirmation && !cli.yes && !confirm("\nProceed to run these commands? [y/N] ")?
    {
        println!("Aborted.");
        store.append(&record(RunStatus::Aborted, &plan))?;
        return Ok(0);
    }

    let executor = Executor::new();
    let mut ctx = ExecContext::new(start_dir);
    let rc = match executor.run(&plan.commands, &mut ctx) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("gerg: {err}");
            1
        }
    };

    let status = if rc == 0 {
        RunStatus::Success
    } else {
        RunStatus::Failed
    };
    store.append(&record(status, &plan).with_return_code(rc))?;
    Ok(rc)
}

fn print_plan(plan: &Plan) {
    if !plan.explanation.is_empty() {
        println!("{}", plan.explanation);
    }
    println!("Planned commands:");
    for (idx, command) in plan.commands.iter().enumerate() {
        println!("  {}. {command}", idx + 1);
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

fn verbose_log(enabled: bool, msg: &str) {
    if enabled {
        eprintln!("[gerg] {msg}");
    }
}
