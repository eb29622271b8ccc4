use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{anyhow, bail, Result};
use chrono::NaiveDate;
use tracing::{debug, info};

use crate::chart::{build_figure, write_figure};
use crate::config::{check_window, parse_prominence_factor};
use crate::market::{ConfiguredSource, FetchRequest, MarketDataSource};
use crate::output::{print_report, summarize};
use crate::pipeline::{run_pipeline, AnalysisRequest};

/// One line of interactive input.
#[derive(Debug, Clone)]
pub enum Command {
    Run(AnalysisRequest),
    Repeat,
    ClearCache,
    Quit,
}

/// Parse `TICKER [START [END [FACTOR]]]`, falling back to `base` for omitted fields.
pub fn parse_command(line: &str, base: &AnalysisRequest) -> Result<Command> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(first) = tokens.first() else {
        return Ok(Command::Repeat);
    };
    match first.to_ascii_lowercase().as_str() {
        "quit" | "exit" => return Ok(Command::Quit),
        "clear" => return Ok(Command::ClearCache),
        _ => {}
    }
    if tokens.len() > 4 {
        bail!("expected TICKER [START [END [FACTOR]]], got {} fields", tokens.len());
    }

    let parse_date = |value: &str| {
        value
            .parse::<NaiveDate>()
            .map_err(|_| anyhow!("'{value}' is not a YYYY-MM-DD date"))
    };
    let start = tokens
        .get(1)
        .map(|value| parse_date(value))
        .transpose()?
        .unwrap_or(base.fetch.start);
    let end = tokens
        .get(2)
        .map(|value| parse_date(value))
        .transpose()?
        .unwrap_or(base.fetch.end);
    check_window(start, end)?;
    let prominence_factor = match tokens.get(3) {
        Some(value) => parse_prominence_factor(value).map_err(|msg| anyhow!(msg))?,
        None => base.prominence_factor,
    };

    Ok(Command::Run(AnalysisRequest {
        fetch: FetchRequest::new(first.to_ascii_uppercase(), start, end),
        prominence_factor,
        ..base.clone()
    }))
}

/// Run the pipeline once and present its result.
pub fn activate<S: MarketDataSource + ?Sized>(
    source: &S,
    request: &AnalysisRequest,
    chart_path: Option<&Path>,
) -> Result<()> {
    let outcome = run_pipeline(source, request)?;
    debug!(stages = ?outcome.stages, "pipeline finished");
    let summary = summarize(&outcome.frame, &outcome.minima, &outcome.maxima);
    print_report(&outcome, &summary);

    if let Some(path) = chart_path {
        let figure = build_figure(&outcome.frame, &outcome.minima, &outcome.maxima);
        write_figure(&figure, path)?;
    }
    Ok(())
}

/// Serve activations from `input` until it ends or a `quit` line arrives.
///
/// A failed activation is reported and the loop carries on; nothing from it
/// is kept for the next one.
pub fn run_interactive<R: BufRead>(
    input: R,
    source: &ConfiguredSource,
    initial: AnalysisRequest,
    chart_path: Option<&Path>,
) -> Result<()> {
    let mut last = initial;
    prompt()?;
    for line in input.lines() {
        let line = line?;
        match parse_command(&line, &last) {
            Ok(Command::Quit) => break,
            Ok(Command::ClearCache) => {
                if source.clear_cache() {
                    println!("Cache cleared!");
                } else {
                    println!("Caching is disabled; nothing to clear.");
                }
            }
            Ok(Command::Repeat) => report(activate(source, &last, chart_path)),
            Ok(Command::Run(request)) => {
                info!(request = %request.fetch, "activation");
                report(activate(source, &request, chart_path));
                last = request;
            }
            Err(err) => report(Err(err)),
        }
        prompt()?;
    }
    Ok(())
}

fn prompt() -> io::Result<()> {
    print!("ticker [start [end [factor]]] > ");
    io::stdout().flush()
}

pub fn report(result: Result<()>) {
    if let Err(err) = result {
        debug!(error = ?err, "activation failed");
        println!("An error occurred: {err:#}");
    }
}
