// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 CAB Ingénierie / Christophe ABOULICAM
//! Compliance Policy Engine CLI
//!
//! A command-line interface for listing policies and validating resources
//! against a selected policy pack.

use std::fs;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use compliance_policy_engine::catalog::{load_catalog, register_builtin};
use compliance_policy_engine::config::Settings;
use compliance_policy_engine::host::{AnalyzeRequest, Resource};
use compliance_policy_engine::pack::PolicyPack;
use compliance_policy_engine::policy::{
    EnforcementLevel, PolicyRegistry, RawPolicyConfig, SelectionQuery,
};

const HELP: &str = r#"
Compliance Policy Engine CLI

USAGE:
    compliance-policy [OPTIONS] <COMMAND>

COMMANDS:
    list        List policies matching the selection filters
    stats       Print policy counts per vendor, service, severity, topic and framework
    check       Check that the catalog and policy config are valid
    analyze     Validate resources against the selected policies
    repl        Start interactive REPL mode

OPTIONS:
    -c, --catalog <FILE>         Declarative rule catalog (YAML)
        --config <FILE>          Per-policy overrides (YAML or JSON)
        --vendor <LIST>          Comma-separated vendor filter
        --service <LIST>         Comma-separated service filter
        --severity <LIST>        Comma-separated severity filter
        --topic <LIST>           Comma-separated topic filter
        --framework <LIST>       Comma-separated framework filter
        --include <LIST>         Keep only these policy names
        --exclude <LIST>         Policy names to remove from the selection
        --enforcement <LEVEL>    Force advisory, mandatory or disabled on the selection
        --json                   Print policy metadata as JSON (list)
    -h, --help                   Print help information
    -V, --version                Print version information

ENVIRONMENT:
    COMPLIANCE_LOG_LEVEL, COMPLIANCE_LOG_FORMAT, COMPLIANCE_CALLBACK_DEADLINE_MS,
    COMPLIANCE_POLICY_CONFIG_FILE, COMPLIANCE_POLICY_CONFIG, COMPLIANCE_CATALOG_FILE

EXAMPLES:
    # List critical AWS policies
    compliance-policy list --vendor aws --severity critical

    # Analyze resources from a file
    compliance-policy analyze --config policy-config.yaml resources.json

    # Analyze a single resource given inline
    compliance-policy analyze '{"urn": "urn:bucket", "type": "aws:s3/bucket:Bucket", "properties": {"acl": "public-read"}}'
"#;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("{}", HELP);
        return ExitCode::FAILURE;
    }

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid environment settings: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&settings);

    let result = match args[1].as_str() {
        "-h" | "--help" | "help" => {
            println!("{}", HELP);
            return ExitCode::SUCCESS;
        }
        "-V" | "--version" | "version" => {
            println!("compliance-policy {}", compliance_policy_engine::VERSION);
            return ExitCode::SUCCESS;
        }
        "list" => run_list(&settings, &args[2..]),
        "stats" => run_stats(&settings, &args[2..]),
        "check" => run_check(&settings, &args[2..]),
        "analyze" => run_analyze(&settings, &args[2..]),
        "repl" => run_repl(&settings, &args[2..]),
        cmd => {
            eprintln!("Unknown command: {}", cmd);
            eprintln!("{}", HELP);
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(settings: &Settings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level));

    // stdout carries command output, logs go to stderr
    if settings.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(io::stderr))
            .init();
    }
}

// =============================================================================
// Argument parsing
// =============================================================================

fn flag_value<'a>(args: &'a [String], names: &[&str]) -> Option<&'a str> {
    for i in 0..args.len() {
        if names.contains(&args[i].as_str()) && i + 1 < args.len() {
            return Some(&args[i + 1]);
        }
    }
    None
}

fn list_flag(args: &[String], name: &str) -> Option<Vec<String>> {
    flag_value(args, &[name]).map(|list| list.split(',').map(|v| v.trim().to_string()).collect())
}

/// Arguments that are neither flags nor flag values
fn positional(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--json" {
            i += 1;
        } else if args[i].starts_with("--") || args[i] == "-c" {
            i += 2;
        } else {
            out.push(args[i].as_str());
            i += 1;
        }
    }
    out
}

fn parse_query(args: &[String]) -> SelectionQuery {
    SelectionQuery {
        vendors: list_flag(args, "--vendor"),
        services: list_flag(args, "--service"),
        severities: list_flag(args, "--severity"),
        topics: list_flag(args, "--topic"),
        frameworks: list_flag(args, "--framework"),
        include: list_flag(args, "--include"),
        exclude: list_flag(args, "--exclude"),
    }
}

fn parse_enforcement(args: &[String]) -> Result<Option<EnforcementLevel>> {
    match flag_value(args, &["--enforcement"]) {
        None => Ok(None),
        Some(level) => match EnforcementLevel::parse(level) {
            Some(level) => Ok(Some(level)),
            None => bail!("unknown enforcement level '{}'", level),
        },
    }
}

// =============================================================================
// Engine setup
// =============================================================================

fn load_registry(settings: &Settings, args: &[String]) -> Result<PolicyRegistry> {
    let mut registry = PolicyRegistry::new();
    register_builtin(&mut registry).context("failed to register built-in policies")?;

    let catalog = flag_value(args, &["-c", "--catalog"]).or(settings.catalog_file.as_deref());
    if let Some(path) = catalog {
        let yaml = fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog file '{}'", path))?;
        load_catalog(&mut registry, &yaml)
            .with_context(|| format!("failed to load catalog '{}'", path))?;
    }
    Ok(registry)
}

fn load_overrides(settings: &Settings, args: &[String]) -> Result<RawPolicyConfig> {
    let mut settings = settings.clone();
    if let Some(path) = flag_value(args, &["--config"]) {
        settings.policy_config_file = Some(path.to_string());
    }
    Ok(settings.policy_overrides()?)
}

fn build_pack(settings: &Settings, registry: &PolicyRegistry, args: &[String]) -> Result<PolicyPack> {
    let mut builder = PolicyPack::builder("cli", registry);
    builder.select(&parse_query(args), parse_enforcement(args)?)?;
    let pack = builder
        .config(load_overrides(settings, args)?)
        .deadline(settings.callback_deadline())
        .build()?;
    Ok(pack)
}

fn read_resources(input: &str) -> Result<Vec<Resource>> {
    let json = if input.trim_start().starts_with(['{', '[']) {
        input.to_string()
    } else {
        fs::read_to_string(input).with_context(|| format!("failed to read resources file '{}'", input))?
    };

    let value: serde_json::Value = serde_json::from_str(&json).context("invalid resources JSON")?;
    let resources = if value.is_array() {
        serde_json::from_value(value)?
    } else if value.get("resources").is_some() {
        serde_json::from_value::<AnalyzeRequest>(value)?.resources
    } else {
        vec![serde_json::from_value::<Resource>(value)?]
    };
    Ok(resources)
}

// =============================================================================
// Commands
// =============================================================================

fn run_list(settings: &Settings, args: &[String]) -> Result<ExitCode> {
    let registry = load_registry(settings, args)?;
    let selected = registry.filter_policies(&parse_query(args))?;

    if args.iter().any(|a| a == "--json") {
        let infos: Vec<_> = selected.iter().map(|handle| handle.info()).collect();
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(ExitCode::SUCCESS);
    }

    for handle in &selected {
        println!(
            "{:<9} {:<10} {}",
            handle.severity.as_str(),
            handle.enforcement_level.as_str(),
            handle.name()
        );
    }
    println!("\n{} of {} policies selected", selected.len(), registry.len());
    Ok(ExitCode::SUCCESS)
}

fn run_stats(settings: &Settings, args: &[String]) -> Result<ExitCode> {
    let registry = load_registry(settings, args)?;
    println!("{}", serde_json::to_string_pretty(&registry.stats())?);
    Ok(ExitCode::SUCCESS)
}

fn run_check(settings: &Settings, args: &[String]) -> Result<ExitCode> {
    let registry = load_registry(settings, args)?;
    let pack = build_pack(settings, &registry, args)?;
    let stats = pack.stats();
    println!(
        "OK: {} policies registered, {} selected, configuration valid",
        stats.registered, stats.selected
    );
    Ok(ExitCode::SUCCESS)
}

fn run_analyze(settings: &Settings, args: &[String]) -> Result<ExitCode> {
    let input = match positional(args).last() {
        Some(input) => input.to_string(),
        None => bail!("resources JSON or file path required"),
    };
    let resources = read_resources(&input)?;

    let registry = load_registry(settings, args)?;
    let pack = build_pack(settings, &registry, args)?;
    let response = pack.analyze(&resources)?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    if response.is_blocking() {
        eprintln!(
            "BLOCKED: {} mandatory violation(s)",
            response.summary.mandatory_violations
        );
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn run_repl(settings: &Settings, args: &[String]) -> Result<ExitCode> {
    let registry = load_registry(settings, args)?;
    let pack = build_pack(settings, &registry, args)?;

    println!("Compliance Policy Engine REPL");
    println!(
        "Selected {} of {} policies",
        pack.stats().selected,
        pack.stats().registered
    );
    println!("Enter resources as JSON, or 'quit' to exit.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line == "quit" || line == "exit" {
            break;
        }

        let resources = match read_resources(line) {
            Ok(resources) => resources,
            Err(e) => {
                eprintln!("Parse error: {:#}", e);
                continue;
            }
        };

        let response = pack.analyze(&resources)?;
        if response.diagnostics.is_empty() {
            println!("OK");
        }
        for diagnostic in &response.diagnostics {
            println!(
                "{} [{}/{}] {}: {}",
                diagnostic.urn,
                diagnostic.severity,
                diagnostic.enforcement_level.as_str(),
                diagnostic.policy_name,
                diagnostic.message
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}
