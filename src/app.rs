use std::path::PathBuf;
use std::time::Duration;

use clap::{error::ErrorKind, CommandFactory, Parser};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::cli::args::CliArgs;
use crate::cli::validation;
use crate::config::{self, ConfigFile};
use crate::logger;
use crate::matcher::{self, MatchLocation};
use crate::output;
use crate::runner::{Options, Runner, ScanResult, TargetSource, TemplateSource};

const BANNER: &str = r#"
            __                        __
  ___ __ __/ /  ___  _______  ___ ___/ /  ___
 (_-</ // / _ \/ _ \/ __/ _ \/ _ \/ _  / -_)
/___/\_,_/_.__/ .__/_/  \___/_.__/\_,_/\__/
             /_/
       v0.1.0 - templated request prober
    "#;

fn banner(no_color: bool) -> String {
    if no_color {
        BANNER.to_string()
    } else {
        BANNER.bright_cyan().to_string()
    }
}

fn print_banner(no_color: bool) {
    print!("{}", banner(no_color));
    println!();
}

fn format_kv_line(label: &str, value: &str) {
    println!(":: {:<10}: {}", label, value);
}

fn format_bool(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

#[derive(Clone, Debug)]
struct RunConfig {
    requests: PathBuf,
    subdomains: PathBuf,
    grep_location: MatchLocation,
    grep_header: Option<String>,
    grep: String,
    grep_status_code: u16,
    output: PathBuf,
    trace_redirects: bool,
    proxy: Option<String>,
    workers: Option<usize>,
    verbose: u8,
    no_color: bool,
}

fn usage() -> String {
    format!(
        "missing required inputs\nUsage: {} --requests <FILE> --subdomains <FILE> [OPTIONS]",
        CliArgs::command().get_name()
    )
}

fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<RunConfig, String> {
    validation::validate(&args)?;

    let requests = args.requests.or(cfg.requests).filter(|p| !p.trim().is_empty());
    let subdomains = args
        .subdomains
        .or(cfg.subdomains)
        .filter(|p| !p.trim().is_empty());
    let (requests, subdomains) = match (requests, subdomains) {
        (Some(r), Some(s)) => (config::expand_tilde(&r), config::expand_tilde(&s)),
        _ => return Err(usage()),
    };

    let grep_location_raw = args
        .grep_location
        .or(cfg.grep_location)
        .unwrap_or_else(|| "default".to_string());
    let grep_location = grep_location_raw
        .parse::<MatchLocation>()
        .map_err(|e| e.to_string())?;

    let grep = args
        .grep
        .or(cfg.grep)
        .unwrap_or_else(|| matcher::DEFAULT_PATTERN.to_string());
    let output = config::expand_tilde(
        &args
            .output
            .or(cfg.output)
            .unwrap_or_else(|| output::DEFAULT_OUTPUT_PATH.to_string()),
    );

    Ok(RunConfig {
        requests,
        subdomains,
        grep_location,
        grep_header: args.grep_header.or(cfg.grep_header),
        grep,
        grep_status_code: args.grep_status_code.or(cfg.grep_status_code).unwrap_or(0),
        output,
        trace_redirects: args.trace_redirects || cfg.trace_redirects.unwrap_or(false),
        proxy: args.proxy.or(cfg.proxy).filter(|p| !p.trim().is_empty()),
        workers: args.workers.or(cfg.workers),
        verbose: args.verbose,
        no_color: args.no_color || cfg.no_color.unwrap_or(false),
    })
}

impl RunConfig {
    fn options(&self) -> Options {
        Options {
            template: Some(TemplateSource::FilePath(self.requests.clone())),
            targets: Some(TargetSource::FilePath(self.subdomains.clone())),
            grep_location: self.grep_location,
            grep_header: self.grep_header.clone(),
            grep: self.grep.clone(),
            grep_status_code: self.grep_status_code,
            output: self.output.clone(),
            trace_redirects: self.trace_redirects,
            proxy: self.proxy.clone(),
        }
    }
}

async fn run_async(run: RunConfig) -> Result<ScanResult, String> {
    let runner = Runner::new(run.options()).map_err(|e| e.to_string())?;

    format_kv_line("Requests", &run.requests.display().to_string());
    format_kv_line("Subdomains", &run.subdomains.display().to_string());
    format_kv_line(
        "Match",
        &format!(
            "location={} header={} grep={} status={}",
            run.grep_location.as_str(),
            run.grep_header.as_deref().unwrap_or("all"),
            run.grep,
            run.grep_status_code
        ),
    );
    format_kv_line(
        "HTTP",
        &format!(
            "trace-redirects={} proxy={}",
            format_bool(run.trace_redirects),
            if run.proxy.is_some() { "inert" } else { "off" }
        ),
    );
    format_kv_line("Output", &run.output.display().to_string());
    println!();

    let pb = ProgressBar::new(1);
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.enable_steady_tick(Duration::from_millis(200));
    pb.set_style(
        ProgressStyle::with_template(
            ":: Progress: [{pos}/{len}] :: {per_sec} :: Duration: [{elapsed_precise}] :: {msg}",
        )
        .map_err(|e| format!("failed to build progress bar style: {e}"))?
        .progress_chars(r#"#>-"#),
    );

    runner
        .run_with_progress(pb)
        .await
        .map_err(|e| e.to_string())
}

pub fn run_cli() -> Result<(), String> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{e}");
                return Ok(());
            }
            _ => return Err(e.to_string()),
        },
    };

    let cfg = match args.config.as_ref() {
        Some(path) => config::load_config(&config::expand_tilde(path), false)?,
        None => match config::default_config_path() {
            Some(path) => config::load_config(&path, true)?,
            None => ConfigFile::default(),
        },
    };

    let run = build_run_config(args, cfg)?;
    logger::init_logger(logger::level_from_verbosity(run.verbose), run.no_color)
        .map_err(|e| format!("failed to initialize logger: {e}"))?;

    print_banner(run.no_color);

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(workers) = run.workers {
        builder.worker_threads(workers);
    }
    let rt = builder
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    let result = rt.block_on(run_async(run))?;

    println!();
    println!(
        ":: {} :: {} targets, {} requests, {} results in {}s ::",
        "Completed".green(),
        result.summary.targets,
        result.summary.requests,
        result.summary.matches,
        result.elapsed.as_secs()
    );
    Ok(())
}
