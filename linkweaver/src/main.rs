use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;
use commands::command_argument_builder;
use indicatif::{ProgressBar, ProgressStyle};
use linkweaver::handlers::{
    expand_output_path, load_records_from_file, progress_callback, select_generator,
};
use linkweaver_core::report::{ReportFormat, generate_report, save_report};
use linkweaver_core::{Pipeline, PipelineConfig, print_banner};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{Level, info};
use url::Url;

mod commands;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");
    init_tracing(chosen_command.get_count("verbose"));

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    if chosen_command.subcommand().is_none() {
        // No subcommand provided, just show the banner
        return;
    }

    match chosen_command.subcommand() {
        Some(("analyze", primary_command)) => {
            if let Err(e) = handle_analyze(primary_command, quiet).await {
                eprintln!("{} {:#}", "✗ Analysis failed:".red().bold(), e);
                std::process::exit(1);
            }
        }
        _ => unreachable!("clap should ensure we don't get here"),
    }
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn config_from_args(args: &ArgMatches) -> PipelineConfig {
    let defaults = PipelineConfig::default();
    PipelineConfig {
        max_links: args.get_one::<usize>("max-links").copied().unwrap_or(defaults.max_links),
        concurrency: args
            .get_one::<usize>("concurrency")
            .copied()
            .unwrap_or(defaults.concurrency),
        priority_threshold: args
            .get_one::<f64>("priority-threshold")
            .copied()
            .unwrap_or(defaults.priority_threshold),
        similarity_threshold: args
            .get_one::<f64>("similarity-threshold")
            .copied()
            .unwrap_or(defaults.similarity_threshold),
        output_cap: args.get_one::<usize>("output-cap").copied().unwrap_or(defaults.output_cap),
        default_priority: args
            .get_one::<f64>("default-priority")
            .copied()
            .unwrap_or(defaults.default_priority),
        timeout_secs: args.get_one::<u64>("timeout").copied().unwrap_or(defaults.timeout_secs),
        exclude_patterns: args
            .get_many::<String>("exclude")
            .map(|patterns| patterns.cloned().collect())
            .unwrap_or_default(),
        excerpt_chars: defaults.excerpt_chars,
    }
}

fn progress_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} {prefix:>8.bold} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

async fn handle_analyze(sub_matches: &ArgMatches, quiet: bool) -> Result<()> {
    let base_url = sub_matches
        .get_one::<Url>("base-url")
        .context("--base-url is required")?;
    let input = sub_matches
        .get_one::<PathBuf>("input")
        .context("--input is required")?;
    let format = sub_matches
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text);
    let output = sub_matches
        .get_one::<String>("output")
        .map(|path| expand_output_path(path))
        .transpose()?;
    let embedding_cache = sub_matches
        .get_one::<String>("embedding-cache")
        .map(|dir| expand_output_path(dir))
        .transpose()?;

    let records = load_records_from_file(input)?;
    let config = config_from_args(sub_matches);

    if !quiet {
        eprintln!("{} Analyzing {}", "→".blue(), base_url.as_str().bright_white());
        eprintln!("  Pages: {}", records.len());
        eprintln!("  Workers: {}", config.concurrency);
        eprintln!(
            "  Thresholds: priority > {}, similarity > {}\n",
            config.priority_threshold, config.similarity_threshold
        );
    }

    let generator = select_generator(
        sub_matches.get_one::<String>("openai-api-key").map(String::as_str),
        sub_matches
            .get_one::<String>("openai-base-url")
            .map(String::as_str)
            .unwrap_or(linkweaver_core::generator::DEFAULT_OPENAI_BASE_URL),
        sub_matches
            .get_one::<String>("model")
            .map(String::as_str)
            .unwrap_or(linkweaver_core::generator::DEFAULT_MODEL),
    );

    let bar = progress_bar(quiet);
    let mut pipeline = Pipeline::new(config)
        .with_snippet_generator(generator)
        .with_event_callback(progress_callback(bar.clone()));
    if let Some(dir) = embedding_cache {
        pipeline = pipeline.with_embedding_cache_dir(dir);
    }

    let result = pipeline.run(base_url.as_str(), &records).await;
    bar.finish_and_clear();
    let report = result?;
    info!(
        "Analysis produced {} recommendations",
        report.recommendations.len()
    );

    if !quiet {
        eprintln!(
            "{} Analysis complete! {} recommendations\n",
            "✓".green().bold(),
            report.recommendations.len()
        );
    }

    match output {
        Some(path) => {
            // No terminal escapes in saved files
            colored::control::set_override(false);
            let content = generate_report(&report, format)?;
            save_report(&content, &path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            if !quiet {
                eprintln!("{} Report saved to {}", "✓".green().bold(), path.display());
            }
        }
        None => {
            let content = generate_report(&report, format)?;
            print!("{}", content);
        }
    }

    Ok(())
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
