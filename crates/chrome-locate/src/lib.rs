//! # chrome-locate
//!
//! Find a Chrome or Chromium executable on the current host so a headless
//! renderer can be launched without the caller knowing where the browser
//! lives.
//!
//! ## How it works
//!
//! On the first call to [`locate_browser`]:
//!
//! 1. An explicit path (argument or `CHROME_PATH`) wins if it is a file.
//! 2. Well-known install locations for the current OS are checked.
//! 3. Every directory on `PATH` is searched for the usual binary names.
//! 4. Browser builds downloaded by puppeteer into
//!    `~/.cache/puppeteer/chrome/<version>/` are checked last.
//!
//! The first hit is cached for the lifetime of the process.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chrome_locate::{locate_browser, is_browser_available};
//!
//! if is_browser_available() {
//!     let path = locate_browser().expect("checked above");
//!     println!("using {}", path.display());
//! }
//! ```
//!
//! ## Environment variable overrides
//!
//! - `CHROME_PATH` — path to a browser executable; skips the search.
//! - `CHROME_LOCATE_SKIP` — when set to anything, report no browser at all.
//!   Useful for forcing a fallback renderer in constrained environments.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable holding an explicit browser path.
pub const ENV_CHROME_PATH: &str = "CHROME_PATH";

/// Environment variable that disables discovery entirely.
pub const ENV_SKIP: &str = "CHROME_LOCATE_SKIP";

/// Binary names searched for on `PATH`, most specific first.
const PATH_NAMES: &[&str] = &[
    "google-chrome-stable",
    "google-chrome",
    "chromium",
    "chromium-browser",
    "chrome",
    "chrome.exe",
    "msedge",
];

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by chrome-locate operations.
#[derive(Error, Debug)]
pub enum LocateError {
    /// Discovery was disabled through `CHROME_LOCATE_SKIP`.
    #[error("Browser discovery disabled by {ENV_SKIP}")]
    Disabled,

    /// An explicit path was given but nothing usable exists there.
    #[error("Browser path '{path}' does not exist or is not executable")]
    InvalidPath { path: PathBuf },

    /// No candidate location held a browser.
    #[error("No Chrome/Chromium executable found ({searched} locations searched)")]
    NotFound { searched: usize },
}

// ── Thread-safe singleton path cache ─────────────────────────────────────────

static RESOLVED_PATH: OnceLock<PathBuf> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Returns `true` if a browser executable can be found.
///
/// Never downloads anything and never launches the browser; it only looks.
pub fn is_browser_available() -> bool {
    locate_browser().is_ok()
}

/// Locate a browser executable, honouring `CHROME_PATH`.
///
/// # Thread safety
///
/// Safe to call from multiple threads; the search runs at most once per
/// process once it has succeeded.
pub fn locate_browser() -> Result<PathBuf, LocateError> {
    locate_browser_with(None)
}

/// Locate a browser executable, preferring `explicit` when given.
///
/// An explicit path that does not point at an executable file is an error;
/// it is never silently replaced by a discovered one.
pub fn locate_browser_with(explicit: Option<&Path>) -> Result<PathBuf, LocateError> {
    if std::env::var_os(ENV_SKIP).is_some() {
        return Err(LocateError::Disabled);
    }

    if let Some(path) = explicit {
        return if is_executable(path) {
            Ok(path.to_path_buf())
        } else {
            Err(LocateError::InvalidPath {
                path: path.to_path_buf(),
            })
        };
    }

    // Fast path: already resolved in this process.
    if let Some(path) = RESOLVED_PATH.get() {
        return Ok(path.clone());
    }

    if let Some(env_path) = std::env::var_os(ENV_CHROME_PATH) {
        let p = PathBuf::from(env_path);
        if is_executable(&p) {
            return Ok(p);
        }
        return Err(LocateError::InvalidPath { path: p });
    }

    let candidates = candidate_paths();
    let found = candidates.iter().find(|p| is_executable(p)).cloned();

    match found {
        Some(path) => {
            // Best-effort cache (ignore race; both threads found the same file).
            let _ = RESOLVED_PATH.set(path.clone());
            Ok(path)
        }
        None => Err(LocateError::NotFound {
            searched: candidates.len(),
        }),
    }
}

/// All locations checked for a browser, in search order.
///
/// Exposed so callers can print a helpful "looked in …" message.
pub fn candidate_paths() -> Vec<PathBuf> {
    let mut out = well_known_paths();

    if let Some(path_var) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path_var) {
            for name in PATH_NAMES {
                out.push(dir.join(name));
            }
        }
    }

    out.extend(puppeteer_cache_paths());
    out
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn well_known_paths() -> Vec<PathBuf> {
    match std::env::consts::OS {
        "macos" => vec![
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
            PathBuf::from("/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge"),
        ],
        "windows" => {
            let mut v = Vec::new();
            for var in ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"] {
                if let Some(base) = std::env::var_os(var) {
                    let base = PathBuf::from(base);
                    v.push(base.join(r"Google\Chrome\Application\chrome.exe"));
                    v.push(base.join(r"Chromium\Application\chrome.exe"));
                    v.push(base.join(r"Microsoft\Edge\Application\msedge.exe"));
                }
            }
            v
        }
        _ => vec![
            PathBuf::from("/usr/bin/google-chrome-stable"),
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/chromium"),
            PathBuf::from("/usr/bin/chromium-browser"),
            PathBuf::from("/snap/bin/chromium"),
            PathBuf::from("/opt/google/chrome/chrome"),
        ],
    }
}

/// Browser builds downloaded by puppeteer, newest version directory first.
fn puppeteer_cache_paths() -> Vec<PathBuf> {
    let Some(home) = dirs::home_dir() else {
        return Vec::new();
    };
    let root = home.join(".cache").join("puppeteer").join("chrome");
    let Ok(entries) = std::fs::read_dir(&root) else {
        return Vec::new();
    };

    let mut versions: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    versions.sort();
    versions.reverse();

    let inner = match std::env::consts::OS {
        "macos" => "chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
        "windows" => r"chrome-win64\chrome.exe",
        _ => "chrome-linux64/chrome",
    };

    versions.into_iter().map(|v| v.join(inner)).collect()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
