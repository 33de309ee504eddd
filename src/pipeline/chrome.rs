//! Headless-browser rasterizer built on `headless_chrome`.
//!
//! Each call launches its own browser with the page width as window width,
//! loads the table HTML from a temporary file, measures the content height
//! when the layout needs it, and prints a single page to PDF with
//! backgrounds on.
//!
//! The `Browser` value owns the child process and kills it on drop, so every
//! exit path tears the browser down. Tab waits are bounded by the render
//! timeout. While a page renders, a [`Watchdog`] thread polls the run's
//! [`CancelFlag`] and force-kills the browser process the moment it trips,
//! which makes the blocked tab call return at once.

use crate::error::RasterError;
use crate::pipeline::layout::{RenderedDocument, VIEWPORT_HEIGHT_PX};
use crate::pipeline::raster::{CancelFlag, Rasterizer};
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

const ENGINE: &str = "chrome";

const WATCHDOG_POLL: Duration = Duration::from_millis(25);

const MEASURE_CONTENT_JS: &str = "Math.max(\
document.body.scrollHeight, document.body.offsetHeight, \
document.documentElement.clientHeight, document.documentElement.scrollHeight, \
document.documentElement.offsetHeight)";

/// Rasterizer that prints pages with a local Chrome/Chromium.
#[derive(Debug, Clone)]
pub struct ChromeRasterizer {
    executable: PathBuf,
    timeout: Duration,
}

impl ChromeRasterizer {
    pub fn new(executable: PathBuf, timeout_secs: u64) -> Self {
        Self {
            executable,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    fn launch(&self, width_px: u32) -> Result<Browser, RasterError> {
        let options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .window_size(Some((width_px, VIEWPORT_HEIGHT_PX)))
            .path(Some(self.executable.clone()))
            .idle_browser_timeout(self.timeout)
            .build()
            .map_err(|e| unavailable(e.to_string()))?;

        Browser::new(options).map_err(|e| unavailable(e.to_string()))
    }

    fn print(
        &self,
        browser: &Browser,
        url: &str,
        doc: &RenderedDocument,
    ) -> Result<Vec<u8>, RasterError> {
        let tab = browser
            .new_tab()
            .map_err(|e| unavailable(format!("new tab: {e}")))?;
        tab.set_default_timeout(self.timeout);

        tab.navigate_to(url)
            .map_err(|e| failed(format!("navigate: {e}")))?
            .wait_until_navigated()
            .map_err(|e| failed(format!("load: {e}")))?;

        let content_height = if doc.layout.needs_measurement() {
            let measured = tab
                .evaluate(MEASURE_CONTENT_JS, false)
                .map_err(|e| failed(format!("measure: {e}")))?
                .value
                .and_then(|v| v.as_f64())
                .ok_or_else(|| failed("content height was not a number".to_string()))?;
            measured.max(0.0).ceil() as u32
        } else {
            0
        };

        let geometry = doc.layout.geometry(content_height);
        debug!(
            "Printing '{}' at {}x{} px (margin {})",
            doc.key, geometry.width_px, geometry.height_px, geometry.margin_px
        );

        let margin = geometry.margin_in();
        tab.print_to_pdf(Some(PrintToPdfOptions {
            print_background: Some(true),
            paper_width: Some(geometry.width_in()),
            paper_height: Some(geometry.height_in()),
            margin_top: Some(margin),
            margin_bottom: Some(margin),
            margin_left: Some(margin),
            margin_right: Some(margin),
            ..Default::default()
        }))
        .map_err(|e| failed(format!("print: {e}")))
    }
}

impl Rasterizer for ChromeRasterizer {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn rasterize(
        &self,
        doc: &RenderedDocument,
        cancel: &CancelFlag,
    ) -> Result<Vec<u8>, RasterError> {
        if cancel.is_cancelled() {
            return Err(RasterError::Cancelled);
        }

        let mut page = tempfile::Builder::new()
            .prefix("sheet-split-")
            .suffix(".html")
            .tempfile()
            .map_err(|e| failed(format!("temp file: {e}")))?;
        page.write_all(doc.html.as_bytes())
            .map_err(|e| failed(format!("temp file write: {e}")))?;
        let url = reqwest::Url::from_file_path(page.path())
            .map_err(|_| failed(format!("bad temp path {}", page.path().display())))?;

        let browser = self.launch(doc.layout.width_px)?;
        // Dropped before `browser`, so the watchdog never outlives the process.
        let _watchdog = browser
            .get_process_id()
            .map(|pid| Watchdog::spawn(pid, cancel.clone()));

        let result = self.print(&browser, url.as_str(), doc);
        if cancel.is_cancelled() {
            return Err(RasterError::Cancelled);
        }
        result
    }
}

/// Kills a browser process if the run is cancelled while it renders.
///
/// Stops polling when dropped.
struct Watchdog {
    done: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    fn spawn(pid: u32, cancel: CancelFlag) -> Self {
        let done = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&done);
        let handle = std::thread::Builder::new()
            .name("chrome-watchdog".into())
            .spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    if cancel.is_cancelled() {
                        warn!("Run cancelled; killing browser process {}", pid);
                        kill_process(pid);
                        return;
                    }
                    std::thread::sleep(WATCHDOG_POLL);
                }
            })
            .map_err(|e| warn!("Could not start browser watchdog: {}", e))
            .ok();
        Self { done, handle }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.done.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(unix)]
fn kill_process(pid: u32) {
    let status = std::process::Command::new("kill")
        .args(["-KILL", &pid.to_string()])
        .status();
    if let Err(e) = status {
        warn!("kill {} failed: {}", pid, e);
    }
}

#[cfg(windows)]
fn kill_process(pid: u32) {
    let status = std::process::Command::new("taskkill")
        .args(["/F", "/T", "/PID", &pid.to_string()])
        .status();
    if let Err(e) = status {
        warn!("taskkill {} failed: {}", pid, e);
    }
}

#[cfg(not(any(unix, windows)))]
fn kill_process(_pid: u32) {}

fn unavailable(detail: String) -> RasterError {
    RasterError::Unavailable {
        engine: ENGINE,
        detail,
    }
}

fn failed(detail: String) -> RasterError {
    RasterError::Failed {
        engine: ENGINE,
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::layout::PageLayout;

    fn doc() -> RenderedDocument {
        RenderedDocument {
            key: "1".into(),
            columns: vec!["a".into()],
            cells: vec![vec!["x".into()]],
            html: "<table><tr><td>x</td></tr></table>".into(),
            layout: PageLayout::for_row_count(1),
        }
    }

    #[test]
    fn missing_executable_is_unavailable() {
        let r = ChromeRasterizer::new(PathBuf::from("/definitely/not/chrome"), 5);
        assert!(matches!(
            r.rasterize(&doc(), &CancelFlag::new()),
            Err(RasterError::Unavailable { engine: "chrome", .. })
        ));
    }

    #[test]
    fn cancelled_run_never_launches() {
        let r = ChromeRasterizer::new(PathBuf::from("/definitely/not/chrome"), 5);
        let cancel = CancelFlag::new();
        cancel.cancel();
        assert!(matches!(
            r.rasterize(&doc(), &cancel),
            Err(RasterError::Cancelled)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn watchdog_kills_process_on_cancel() {
        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let cancel = CancelFlag::new();
        let watchdog = Watchdog::spawn(child.id(), cancel.clone());

        cancel.cancel();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let status = loop {
            if let Some(status) = child.try_wait().unwrap() {
                break Some(status);
            }
            if std::time::Instant::now() > deadline {
                break None;
            }
            std::thread::sleep(Duration::from_millis(20));
        };
        drop(watchdog);

        let status = status.unwrap_or_else(|| {
            let _ = child.kill();
            panic!("process survived cancellation");
        });
        assert!(!status.success());
    }

    #[cfg(unix)]
    #[test]
    fn dropped_watchdog_leaves_process_alone() {
        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let cancel = CancelFlag::new();
        drop(Watchdog::spawn(child.id(), cancel.clone()));

        cancel.cancel();
        std::thread::sleep(Duration::from_millis(100));
        assert!(child.try_wait().unwrap().is_none());
        child.kill().unwrap();
        let _ = child.wait();
    }

    #[test]
    fn timeout_has_a_floor() {
        let r = ChromeRasterizer::new(PathBuf::from("chrome"), 0);
        assert_eq!(r.timeout, Duration::from_secs(1));
    }
}
