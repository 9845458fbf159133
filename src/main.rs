mod cli;
mod output;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use mediameta_probe::{sniff, CancellationToken, Config, ExtractionResult, Extractor, FileHandle, Locator};
use rayon::prelude::*;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mediameta=debug,mediameta_probe=trace".to_string()
        } else {
            "mediameta=info,mediameta_probe=warn".to_string()
        }
    });

    // Logs go to stderr so JSON on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Extract {
            files,
            json,
            budget_ms,
            jobs,
        } => extract_files(&files, cli.config.as_deref(), json, budget_ms, jobs),
        Commands::Sniff { files } => sniff_files(&files, cli.config.as_deref()),
        Commands::Records { file, json } => show_records(&file, cli.config.as_deref(), json),
        Commands::Vocab { json } => show_vocabulary(json),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
    }
}

fn extract_files(
    files: &[String],
    config_path: Option<&Path>,
    json: bool,
    budget_ms: Option<u64>,
    jobs: Option<usize>,
) -> Result<()> {
    let mut config = Config::load_or_default(config_path);
    if let Some(budget_ms) = budget_ms {
        config.limits.time_budget_ms = budget_ms;
    }
    let extractor = Extractor::from_config(&config);
    let cancel = CancellationToken::new();

    let threads = jobs.unwrap_or_else(num_cpus::get).max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .context("Failed to build worker pool")?;
    tracing::debug!(files = files.len(), threads, "Extracting");

    let results: Vec<ExtractionResult> = pool.install(|| {
        files
            .par_iter()
            .map(|file| {
                let mut sink = BTreeMap::new();
                match Locator::parse(file) {
                    Ok(locator) => extractor.extract(&locator, &mut sink, &cancel),
                    // Same result shape as the library's free function
                    Err(_) => mediameta_probe::extract(file, &mut sink, &cancel),
                }
            })
            .collect()
    });

    let mut failed = 0usize;
    for (file, result) in files.iter().zip(&results) {
        if result.is_failure() {
            failed += 1;
            eprintln!("{file}: {}", output::status_label(&result.status));
        }
    }

    if json {
        let reports: Vec<_> = files
            .iter()
            .zip(&results)
            .map(|(file, result)| output::FileReport { file, result })
            .collect();
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for (i, (file, result)) in files.iter().zip(&results).enumerate() {
            if i > 0 {
                println!();
            }
            output::print_result(file, result);
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} files failed", files.len());
    }
    Ok(())
}

fn sniff_files(files: &[String], config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_or_default(config_path);

    for file in files {
        let locator = Locator::parse(file)?;
        let mut handle = FileHandle::open(locator.path()).with_context(|| format!("Failed to open {file}"))?;
        let kind = sniff::classify(&mut handle, &config.limits).with_context(|| format!("Failed to read {file}"))?;
        handle.close();
        println!("{file}: {} ({kind})", kind.display_name());
    }

    Ok(())
}

fn show_records(file: &str, config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let extractor = Extractor::from_config(&config);
    let locator = Locator::parse(file)?;
    let inspection = extractor
        .inspect(&locator, &CancellationToken::new())
        .with_context(|| format!("Failed to inspect {file}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&inspection)?);
    } else {
        output::print_inspection(file, &inspection);
    }
    Ok(())
}

fn show_vocabulary(json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&output::vocabulary())?);
    } else {
        output::print_vocabulary();
    }
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            Config::load(p).with_context(|| format!("Invalid config {}", p.display()))?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    let warnings = config.validate();
    for warning in &warnings {
        println!("⚠ {warning}");
    }
    if warnings.is_empty() {
        println!("✓ Configuration is valid");
    }
    println!("  Time budget: {} ms", config.limits.time_budget_ms);
    println!("  Max depth: {}", config.limits.max_depth);
    println!("  Extra rules: {}", config.rules.len());
    println!("  Mapping rules total: {}", config.mapping_table().len());

    if !warnings.is_empty() {
        anyhow::bail!("{} configuration warning(s)", warnings.len());
    }
    Ok(())
}
