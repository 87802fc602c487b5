//! Start page override resolution
//!
//! An explicit start page can come from the command line, the
//! `GREENBOOK_START_PAGE` environment variable, or a sidecar file, checked
//! in that order. Values that are not positive integers are ignored with a
//! warning and the next source is consulted.

use std::fmt;
use std::path::Path;

/// Environment variable consulted for a start page override
pub const START_PAGE_ENV: &str = "GREENBOOK_START_PAGE";

/// Where an explicit start page came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPageSource {
    CommandLine,
    Environment,
    SidecarFile,
}

impl fmt::Display for StartPageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartPageSource::CommandLine => write!(f, "command line"),
            StartPageSource::Environment => write!(f, "{}", START_PAGE_ENV),
            StartPageSource::SidecarFile => write!(f, "start page file"),
        }
    }
}

/// An explicit start page and its origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartPage {
    pub page: u32,
    pub source: StartPageSource,
}

fn parse_page(raw: &str, source: StartPageSource) -> Option<StartPage> {
    match raw.trim().parse::<u32>() {
        Ok(page) if page >= 1 => Some(StartPage { page, source }),
        _ => {
            tracing::warn!("Ignoring invalid start page {:?} from {}", raw.trim(), source);
            None
        }
    }
}

/// Resolves the start page override from already-read sources
///
/// # Arguments
///
/// * `cli` - Value of `--start-page`, if given
/// * `env` - Value of the environment variable, if set
/// * `sidecar` - Contents of the sidecar file, if it exists
pub fn resolve_start_page(
    cli: Option<&str>,
    env: Option<&str>,
    sidecar: Option<&str>,
) -> Option<StartPage> {
    cli.and_then(|raw| parse_page(raw, StartPageSource::CommandLine))
        .or_else(|| env.and_then(|raw| parse_page(raw, StartPageSource::Environment)))
        .or_else(|| sidecar.and_then(|raw| parse_page(raw, StartPageSource::SidecarFile)))
}

/// Reads the environment variable and sidecar file, then resolves
pub fn start_page_override(cli: Option<&str>, sidecar_path: &Path) -> Option<StartPage> {
    let env = std::env::var(START_PAGE_ENV).ok();
    let sidecar = std::fs::read_to_string(sidecar_path).ok();
    resolve_start_page(cli, env.as_deref(), sidecar.as_deref())
}
