//!
//! scriptscan CLI
//! --------------
//! Runs one scripted scan outside the query engine and prints the rows as a
//! table. Useful for developing wrapper scripts.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

use scriptscan::config::{self, WRAPPER_CLASS, WRAPPER_PATH};
use scriptscan::diagnostics::{CollectingSink, TracingSink};
use scriptscan::frame::{collect_frame, FrameOptions};
use scriptscan::settings::Settings;
use scriptscan::{HostInfo, LuaRuntime, ScanSession};

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} --path <wrapper.lua> [options]\n  {program} --class <Qualified.Name> [options]\n\nOptions:\n  --option <key=value>   pass a parameter to the wrapper constructor (repeatable)\n  --columns <a,b,c>      names for the leading columns\n  --limit <N>            stop after N rows\n  --strict               reject options the scan does not know\n  --settings <file>      JSON settings file (defaults come from SCRIPTSCAN_* env vars)\n  --explain              print the scan description before the rows\n\nExamples:\n  {program} --path scripts/samples/producer.lua --option limit=3\n  {program} --class Builtin.Series --option start=1 --option stop=5 --columns n"
    );
}

fn usage_error(program: &str, msg: &str) -> ! {
    eprintln!("{}", msg);
    print_usage(program);
    std::process::exit(2);
}

fn main() -> Result<()> {
    let mut args: Vec<String> = env::args().collect();
    let program = args.remove(0);

    let mut options: Vec<(String, String)> = Vec::new();
    let mut columns: Vec<String> = Vec::new();
    let mut limit: Option<usize> = None;
    let mut strict: Option<bool> = None;
    let mut settings_file: Option<PathBuf> = None;
    let mut explain = false;

    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = matches!(flag, "--path" | "--class" | "--option" | "-o" | "--columns" | "--limit" | "--settings");
        if needs_value && i + 1 >= args.len() {
            usage_error(&program, &format!("{} requires a value", flag));
        }
        match flag {
            "--path" => options.push((WRAPPER_PATH.to_string(), args[i + 1].clone())),
            "--class" => options.push((WRAPPER_CLASS.to_string(), args[i + 1].clone())),
            "--option" | "-o" => match args[i + 1].split_once('=') {
                Some((k, v)) => options.push((k.trim().to_string(), v.to_string())),
                None => usage_error(&program, "--option expects key=value"),
            },
            "--columns" => columns = args[i + 1].split(',').map(|c| c.trim().to_string()).filter(|c| !c.is_empty()).collect(),
            "--limit" => match args[i + 1].parse::<usize>() {
                Ok(n) => limit = Some(n),
                Err(_) => usage_error(&program, "--limit expects a non-negative integer"),
            },
            "--settings" => settings_file = Some(PathBuf::from(&args[i + 1])),
            "--strict" => strict = Some(true),
            "--explain" => explain = true,
            "--help" | "-h" => {
                print_usage(&program);
                return Ok(());
            }
            other => usage_error(&program, &format!("unknown argument: {}", other)),
        }
        i += if needs_value { 2 } else { 1 };
    }

    let mut settings = match &settings_file {
        Some(p) => Settings::from_json_file(p)?,
        None => Settings::from_env()?,
    };
    if let Some(s) = strict {
        settings.strict_options = s;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .context("invalid log filter")?;
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let descriptor = match config::resolve(&options, settings.strict_options) {
        Ok(d) => d,
        Err(e) => usage_error(&program, &e.to_string()),
    };
    let host = HostInfo::from_settings(&settings);
    if !Settings::install(settings) {
        return Err(anyhow!("settings were already installed"));
    }

    info!(target: "scriptscan", "scanning {} with {} parameter(s)", descriptor.label(), descriptor.parameters.len());
    let diagnostics = Arc::new(CollectingSink::forwarding_to(Box::new(TracingSink)));
    let mut session = ScanSession::open(descriptor, diagnostics.clone(), &host, LuaRuntime::open)
        .map_err(|e| {
            let (code, severity, msg) = e.pg_fields();
            anyhow!("{} [{}] {}", severity, code, msg)
        })?;

    if explain {
        for (k, v) in session.explain() {
            println!("{}: {}", k, v);
        }
    }

    let frame_options = FrameOptions { columns, limit };
    let df = collect_frame(&mut session, &frame_options).map_err(|e| {
        let (code, severity, msg) = e.pg_fields();
        anyhow!("{} [{}] {}", severity, code, msg)
    })?;
    session.end();

    println!("{}", df);
    let warnings = diagnostics.count(Level::WARN);
    if warnings > 0 {
        eprintln!("{} warning(s) during scan", warnings);
    }
    Ok(())
}
