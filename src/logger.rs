use std::io::Write;

use colored::*;
use log::LevelFilter;

/// Maps `-v` occurrences onto a level filter.
pub fn level_from_verbosity(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Installs the process logger. `RUST_LOG` is read first and the explicit
/// level overrides it for this crate.
pub fn init_logger(level: LevelFilter, no_color: bool) -> Result<(), log::SetLoggerError> {
    if no_color {
        colored::control::set_override(false);
    }

    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);
    builder.filter_module("reqwest", LevelFilter::Info);
    builder.filter_module("hyper", LevelFilter::Info);
    builder.filter_module("subprobe", level);

    builder.format(|buf, record| {
        let level = record.level();
        let colored_level = match level {
            log::Level::Error => level.to_string().red(),
            log::Level::Warn => level.to_string().yellow(),
            log::Level::Info => level.to_string().green(),
            log::Level::Debug => level.to_string().blue(),
            log::Level::Trace => level.to_string().purple(),
        };
        writeln!(buf, ":: [{}] {}", colored_level, record.args())
    });

    builder.try_init()
}
