//! Logging setup: env_logger behind the `log` facade, routed through
//! indicatif on a terminal so log lines do not tear progress bars.

use indicatif::MultiProgress;

/// Dependencies that are chatty at debug level
const NOISY_TARGETS: &[&str] = &["reqwest", "hyper", "hyper_util", "h2", "rustls"];

fn level_label(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN ",
        log::Level::Info => "INFO ",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    }
}

fn level_color(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "\x1b[31m",
        log::Level::Warn => "\x1b[33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug => "\x1b[36m",
        log::Level::Trace => "\x1b[35m",
    }
}

/// Logger that prints through indicatif MultiProgress to avoid mixing with progress bars.
pub struct IndicatifLogger {
    inner: env_logger::Logger,
    multi: MultiProgress,
}

impl IndicatifLogger {
    pub fn new(inner: env_logger::Logger, multi: MultiProgress) -> Self {
        Self { inner, multi }
    }
}

impl log::Log for IndicatifLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.inner.matches(record) {
            return;
        }
        let level = record.level();
        let line = format!(
            "[{}{}\x1b[0m] {}",
            level_color(level),
            level_label(level),
            record.args()
        );
        self.multi.suspend(|| eprintln!("{line}"));
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

fn builder(default_level: &str) -> env_logger::Builder {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));
    if std::env::var_os("RUST_LOG").is_none() {
        for target in NOISY_TARGETS {
            builder.filter_module(target, log::LevelFilter::Warn);
        }
    }
    builder
}

/// Initialize logging.
///
/// `multi` is the terminal's progress container; pass `None` when stderr
/// is not a TTY to get plain `[LEVEL] message` lines for log collectors.
pub fn init_logging(quiet: bool, debug: bool, multi: Option<&MultiProgress>) {
    use std::io::Write;

    let default_level = if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };

    match multi {
        Some(multi) => {
            let logger = builder(default_level).build();
            let max_level = logger.filter();
            if log::set_boxed_logger(Box::new(IndicatifLogger::new(logger, multi.clone()))).is_ok()
            {
                log::set_max_level(max_level);
            }
        }
        None => {
            let _ = builder(default_level)
                .format(|buf, record| {
                    writeln!(buf, "[{}] {}", level_label(record.level()), record.args())
                })
                .try_init();
        }
    }
}
