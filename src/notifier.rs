//! Logging setup and progress UI for the command line.
//!
//! [`Notifier`] installs the global `env_logger` logger (the library logs through `log`) and
//! owns an `indicatif` spinner under a single verbosity switch:
//! - [`VerbosityLevel::Quiet`] → only warnings are logged; stages show on a live spinner.
//! - [`VerbosityLevel::Info`]/[`VerbosityLevel::Debug`]/[`VerbosityLevel::Trace`] → stages are
//!   logged as text at info level and no spinner is drawn.

use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn, LevelFilter};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VerbosityLevel {
    Quiet = 0, // Spinner, no text logs
    Info = 1,  // Text logs at info level
    Debug = 2, // Text logs at debug level
    Trace = 3, // Text logs at trace level
}

impl From<u8> for VerbosityLevel {
    fn from(level: u8) -> Self {
        match level {
            0 => VerbosityLevel::Quiet,
            1 => VerbosityLevel::Info,
            2 => VerbosityLevel::Debug,
            _ => VerbosityLevel::Trace,
        }
    }
}

impl VerbosityLevel {
    pub fn to_log_level(self) -> LevelFilter {
        match self {
            VerbosityLevel::Quiet => LevelFilter::Warn,
            VerbosityLevel::Info => LevelFilter::Info,
            VerbosityLevel::Debug => LevelFilter::Debug,
            VerbosityLevel::Trace => LevelFilter::Trace,
        }
    }
}

pub struct Notifier {
    verbosity: VerbosityLevel,
    spinner: Option<ProgressBar>,
}

impl Notifier {
    /// Creates a notifier and installs the global logger. If a logger is already installed it
    /// is kept.
    pub fn new(verbosity_level: u8) -> Self {
        let verbosity = VerbosityLevel::from(verbosity_level);

        let logger = env_logger::Builder::from_env(Env::default())
            .filter_level(verbosity.to_log_level())
            .build();
        let max_level = logger.filter();
        match log::set_boxed_logger(Box::new(logger)) {
            Ok(()) => log::set_max_level(max_level),
            Err(_) => debug!("Logger already installed, keeping it"),
        }

        let spinner = if verbosity == VerbosityLevel::Quiet {
            let style = ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(style);
            spinner.enable_steady_tick(Duration::from_millis(100));
            Some(spinner)
        } else {
            None
        };

        Self { verbosity, spinner }
    }

    /// Reports the start of a pipeline stage.
    pub fn stage(&self, message: &str) {
        match &self.spinner {
            Some(spinner) => spinner.set_message(message.to_string()),
            None => info!("{}", message),
        }
    }

    pub fn warn(&self, message: &str) {
        match &self.spinner {
            Some(spinner) => spinner.suspend(|| warn!("{}", message)),
            None => warn!("{}", message),
        }
    }

    /// Clears the spinner, leaving `message` behind in quiet mode.
    pub fn finish(&self, message: &str) {
        match &self.spinner {
            Some(spinner) => spinner.finish_with_message(message.to_string()),
            None => info!("{}", message),
        }
    }

    /// Clears the spinner without a trailing message, for error exits.
    pub fn abandon(&self) {
        if let Some(spinner) = &self.spinner {
            spinner.finish_and_clear();
        }
    }

    pub fn use_spinner(&self) -> bool {
        self.spinner.is_some()
    }

    pub fn verbosity_level(&self) -> VerbosityLevel {
        self.verbosity
    }
}
