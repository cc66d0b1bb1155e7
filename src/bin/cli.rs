#![cfg(not(tarpaulin_include))]

use env_logger::Env;
use serde::Serialize;
use sheetchart::error::ChartResult;
use sheetchart::graph::{DEFAULT_ROW_LIMIT, extract_3d_series, extract_series};
use sheetchart::summary::summarize;
use sheetchart::workbook::Workbook;
use std::env;
use std::process::ExitCode;

const USAGE: &str = "\
Usage:
  cli <file>                                        parse every sheet
  cli <file> summary <sheet>                        column statistics
  cli <file> series <sheet> <x> <y> [limit]         2D chart data
  cli <file> series3d <sheet> <x> <y> [z|-] [limit] 3D chart data";

enum Command {
    Parse,
    Summary { sheet: String },
    Series { sheet: String, x: String, y: String, limit: usize },
    Series3d { sheet: String, x: String, y: String, z: Option<String>, limit: usize },
}

fn parse_limit(arg: Option<&String>) -> Result<usize, String> {
    match arg {
        Some(text) => text
            .parse()
            .map_err(|_| format!("limit must be a whole number, got \"{}\"", text)),
        None => Ok(DEFAULT_ROW_LIMIT),
    }
}

fn parse_args(args: &[String]) -> Result<(String, Command), String> {
    let file = args.get(1).ok_or_else(|| USAGE.to_string())?.clone();
    let rest = &args[2..];

    let command = match rest.first().map(String::as_str) {
        None => Command::Parse,
        Some("summary") if rest.len() == 2 => Command::Summary {
            sheet: rest[1].clone(),
        },
        Some("series") if (4..=5).contains(&rest.len()) => Command::Series {
            sheet: rest[1].clone(),
            x: rest[2].clone(),
            y: rest[3].clone(),
            limit: parse_limit(rest.get(4))?,
        },
        Some("series3d") if (4..=6).contains(&rest.len()) => Command::Series3d {
            sheet: rest[1].clone(),
            x: rest[2].clone(),
            y: rest[3].clone(),
            z: rest.get(4).filter(|z| z.as_str() != "-").cloned(),
            limit: parse_limit(rest.get(5))?,
        },
        _ => return Err(USAGE.to_string()),
    };
    Ok((file, command))
}

fn to_json<T: Serialize>(value: &T) -> ChartResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| sheetchart::error::ChartError::Validation(e.to_string()))
}

fn execute(file: &str, command: Command) -> ChartResult<String> {
    let workbook = Workbook::open(file)?;
    match command {
        Command::Parse => to_json(&workbook.parse()),
        Command::Summary { sheet } => to_json(&summarize(workbook.sheet(&sheet)?)),
        Command::Series { sheet, x, y, limit } => {
            to_json(&extract_series(workbook.sheet(&sheet)?, &x, &y, Some(limit))?)
        }
        Command::Series3d { sheet, x, y, z, limit } => to_json(&extract_3d_series(
            workbook.sheet(&sheet)?,
            &x,
            &y,
            z.as_deref(),
            Some(limit),
        )?),
    }
}

/// Inspects a workbook from the command line and prints JSON.
fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();
    let (file, command) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::from(2);
        }
    };

    match execute(&file, command) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
