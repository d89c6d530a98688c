//! External tool descriptors.
//!
//! An [`ExternalTool`] is static metadata about a program some component shells out to: where
//! it lives on this platform, how to check that it works, and how to install it. Descriptors
//! are built once (usually as `Lazy` statics next to the component that needs them) and never
//! mutated afterwards. Availability answers are cached per process by [`ToolAvailability`].
//!
//! Path resolution is a small strategy table keyed by [`PlatformClass`]; the rule for the
//! running platform is applied once at construction and the result stored as a plain path.

use crate::error::{Error, Result};
use crate::process::{self, CommandLine};
use log::debug;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Coarse platform classes that tool locations differ across.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformClass {
    Windows,
    /// Linux and macOS.
    Unix,
    Other,
}

impl PlatformClass {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            PlatformClass::Windows
        } else if cfg!(any(target_os = "linux", target_os = "macos")) {
            PlatformClass::Unix
        } else {
            PlatformClass::Other
        }
    }
}

/// How to turn a tool name into a path on one platform class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRule {
    /// Search `PATH`, falling back to the bare name (left for the OS to resolve at spawn).
    Search(String),
    /// A conventional install location.
    Fixed(PathBuf),
    /// A path relative to the user's home directory.
    Home(PathBuf),
}

impl PathRule {
    pub fn resolve(&self) -> PathBuf {
        match self {
            PathRule::Search(name) => which::which(name).unwrap_or_else(|_| PathBuf::from(name)),
            PathRule::Fixed(path) => path.clone(),
            PathRule::Home(rel) => match dirs::home_dir() {
                Some(home) => home.join(rel),
                None => rel.clone(),
            },
        }
    }
}

/// One [`PathRule`] per platform class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStrategy {
    pub windows: PathRule,
    pub unix: PathRule,
    pub other: PathRule,
}

impl PathStrategy {
    /// The same `PATH` lookup everywhere.
    pub fn search(name: &str) -> Self {
        Self {
            windows: PathRule::Search(name.to_string()),
            unix: PathRule::Search(name.to_string()),
            other: PathRule::Search(name.to_string()),
        }
    }

    pub fn rule_for(&self, platform: PlatformClass) -> &PathRule {
        match platform {
            PlatformClass::Windows => &self.windows,
            PlatformClass::Unix => &self.unix,
            PlatformClass::Other => &self.other,
        }
    }
}

/// How a tool is started.
#[derive(Debug, Clone)]
pub enum Invocation {
    /// The resolved path is an executable.
    Direct,
    /// The resolved path is a jar run through `<runtime> -jar <path>`.
    Jar { runtime: Box<ExternalTool> },
}

#[derive(Debug, Clone)]
pub struct ExternalTool {
    name: String,
    url: String,
    install_check_arg: Option<String>,
    apt_package: Option<String>,
    brew_package: Option<String>,
    path: PathBuf,
    invocation: Invocation,
}

impl ExternalTool {
    /// A directly executable tool found through `PATH`.
    pub fn new(name: &str, url: &str, install_check_arg: &str) -> Self {
        Self::with_strategy(name, url, install_check_arg, &PathStrategy::search(name))
    }

    pub fn with_strategy(
        name: &str,
        url: &str,
        install_check_arg: &str,
        strategy: &PathStrategy,
    ) -> Self {
        let path = strategy.rule_for(PlatformClass::current()).resolve();
        Self {
            name: name.to_string(),
            url: url.to_string(),
            install_check_arg: (!install_check_arg.is_empty())
                .then(|| install_check_arg.to_string()),
            apt_package: None,
            brew_package: None,
            path,
            invocation: Invocation::Direct,
        }
    }

    /// A jar started through `runtime`.
    pub fn jar(
        name: &str,
        url: &str,
        install_check_arg: &str,
        strategy: &PathStrategy,
        runtime: ExternalTool,
    ) -> Self {
        let mut tool = Self::with_strategy(name, url, install_check_arg, strategy);
        tool.invocation = Invocation::Jar {
            runtime: Box::new(runtime),
        };
        tool
    }

    pub fn apt_package(mut self, package: &str) -> Self {
        self.apt_package = Some(package.to_string());
        self
    }

    pub fn brew_package(mut self, package: &str) -> Self {
        self.brew_package = Some(package.to_string());
        self
    }

    /// Overrides the resolved location.
    pub fn at_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn resolve_path(&self) -> &Path {
        &self.path
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    /// The command prefix every stage using this tool starts from.
    pub fn command(&self) -> CommandLine {
        match &self.invocation {
            Invocation::Direct => CommandLine::new(&self.path),
            Invocation::Jar { runtime } => runtime.command().arg("-jar").arg(&self.path),
        }
    }

    fn check_command(&self) -> CommandLine {
        let cmd = self.command();
        match &self.install_check_arg {
            Some(arg) => cmd.arg(arg),
            None => cmd,
        }
    }

    /// Whether the tool can be run.
    ///
    /// A missing binary and a check invocation that exits non-zero are both `Ok(false)`. Other
    /// spawn failures (permissions, resource exhaustion) are errors.
    pub async fn is_installed(&self) -> Result<bool> {
        if let Invocation::Jar { runtime } = &self.invocation {
            if !probe(&runtime.check_command()).await? {
                debug!("{}: runtime '{}' unavailable", self.name, runtime.name);
                return Ok(false);
            }
            if !self.path.exists() {
                debug!("{}: {} does not exist", self.name, self.path.display());
                return Ok(false);
            }
        }
        probe(&self.check_command()).await
    }

    /// A short suffix telling the user how to get the tool.
    pub fn install_hint(&self) -> String {
        let mut hints = Vec::new();
        if let Some(apt) = &self.apt_package {
            hints.push(format!("`apt install {}`", apt));
        }
        if let Some(brew) = &self.brew_package {
            hints.push(format!("`brew install {}`", brew));
        }
        if hints.is_empty() {
            format!(" (see {})", self.url)
        } else {
            format!(" (install with {}; see {})", hints.join(" or "), self.url)
        }
    }

    pub(crate) fn not_installed(&self) -> Error {
        Error::ToolNotInstalled {
            tool: self.name.clone(),
            hint: self.install_hint(),
        }
    }
}

async fn probe(cmd: &CommandLine) -> Result<bool> {
    match process::probe(cmd).await {
        Ok(ok) => Ok(ok),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io(format!("Failed to probe `{}`", cmd), e)),
    }
}

/// Process-wide cache of install checks, keyed by tool name.
#[derive(Debug, Default)]
pub struct ToolAvailability {
    known: Mutex<HashMap<String, bool>>,
}

impl ToolAvailability {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_installed(&self, tool: &ExternalTool) -> Result<bool> {
        if let Some(known) = self.lookup(tool) {
            return Ok(known);
        }
        let installed = tool.is_installed().await?;
        self.known
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(tool.name.clone(), installed);
        Ok(installed)
    }

    /// Fails with [`Error::ToolNotInstalled`] for the first unavailable tool.
    pub async fn ensure(&self, tools: &[&ExternalTool]) -> Result<()> {
        for tool in tools {
            if !self.is_installed(tool).await? {
                return Err(tool.not_installed());
            }
        }
        Ok(())
    }

    fn lookup(&self, tool: &ExternalTool) -> Option<bool> {
        self.known
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&tool.name)
            .copied()
    }
}
