// 🧮 Voice Calculator - command line front end

use anyhow::{bail, Context, Result};
use std::env;
use std::process;

use voice_calculator::{
    evaluate_expression, get_history, get_statistics, normalize_voice_text, open_database,
    CalcError, CalculationRequest, CalculatorService, Config, ExportFormat, ServiceError,
    SpeechServices, AudioStore,
};

const USAGE: &str = "Usage:
  voice-calculator eval <expression>
  voice-calculator voice <spoken text...>
  voice-calculator history [--session ID] [--limit N]
  voice-calculator export [json|csv]
  voice-calculator stats";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        eprintln!("{}", USAGE);
        process::exit(2);
    };

    match command.as_str() {
        "eval" => run_eval(&rest.join(" ")),
        "voice" => run_voice(&rest.join(" ")),
        "history" => run_history(rest),
        "export" => run_export(rest.first().map(String::as_str).unwrap_or("json")),
        "stats" => run_stats(),
        "-h" | "--help" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => {
            eprintln!("❌ Unknown command: {}\n\n{}", other, USAGE);
            process::exit(2);
        }
    }
}

/// Evaluation runs without speech backends; the CLI never plays audio
fn open_service(config: &Config) -> Result<CalculatorService> {
    let conn = open_database(&config.db_path)?;
    let audio = AudioStore::new(&config.audio_dir, config.audio_max_age_hours)?;
    Ok(CalculatorService::new(
        conn,
        SpeechServices::unavailable(),
        audio,
        &config.export_dir,
    ))
}

fn report(err: CalcError) -> ! {
    eprintln!("❌ {} ({})", err, err.kind());
    process::exit(1);
}

fn calculate(request: CalculationRequest) -> Result<()> {
    let config = Config::from_env()?;
    let service = open_service(&config)?;

    match service.calculate(request) {
        Ok(outcome) => {
            println!("{}", outcome.result);
            Ok(())
        }
        Err(ServiceError::Calculation(err)) => report(err),
        Err(ServiceError::Internal(err)) => Err(err),
    }
}

fn run_eval(expression: &str) -> Result<()> {
    if expression.trim().is_empty() {
        bail!("eval needs an expression\n\n{}", USAGE);
    }
    calculate(CalculationRequest::new(expression))
}

fn run_voice(text: &str) -> Result<()> {
    let expression = normalize_voice_text(text);
    println!("🎙️  {} → {}", text.trim(), expression);

    // Validate before touching the history file
    if let Err(err) = evaluate_expression(&expression) {
        report(err);
    }

    let mut request = CalculationRequest::new(expression);
    request.voice_input = Some(text.to_string());
    calculate(request)
}

fn run_history(args: &[String]) -> Result<()> {
    let mut session: Option<String> = None;
    let mut limit: u32 = 20;

    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "--session" => {
                session = Some(iter.next().context("--session needs a value")?.clone());
            }
            "--limit" => {
                let raw = iter.next().context("--limit needs a value")?;
                limit = raw
                    .parse()
                    .with_context(|| format!("--limit is not a number: {}", raw))?;
            }
            other => bail!("Unknown history option: {}", other),
        }
    }

    let config = Config::from_env()?;
    let conn = open_database(&config.db_path)?;
    let records = get_history(&conn, 1, limit, session.as_deref())?;

    if records.is_empty() {
        println!("No calculations yet");
        return Ok(());
    }

    println!("📜 Last {} calculations", records.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for record in records {
        println!(
            "#{:<5} {}  {} = {}",
            record.id,
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.expression,
            record.result
        );
    }

    Ok(())
}

fn run_export(format: &str) -> Result<()> {
    let format: ExportFormat = format.parse()?;
    let config = Config::from_env()?;
    let service = open_service(&config)?;

    let path = service.export(format, None)?;
    println!("✓ Exported history to {}", path.display());
    Ok(())
}

fn run_stats() -> Result<()> {
    let config = Config::from_env()?;
    let conn = open_database(&config.db_path)?;
    let stats = get_statistics(&conn)?;

    println!("📊 Calculator statistics");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Total calculations: {}", stats.total_calculations);
    println!("Today:              {}", stats.today_calculations);
    println!("Sessions:           {}", stats.total_sessions);

    if !stats.popular_expressions.is_empty() {
        println!("\nMost common expressions:");
        for entry in stats.popular_expressions {
            println!("  {:>4}×  {}", entry.count, entry.expression);
        }
    }

    Ok(())
}
