//! Rasterizer selection: primary engine with a transparent fallback.
//!
//! A [`RasterEngine`] holds an optional primary [`Rasterizer`] (normally the
//! headless browser) and a fallback that is always present. A primary
//! failure is logged and absorbed; only when the fallback fails too does the
//! group see an error.
//!
//! Rasterizers are synchronous; the driver calls them from
//! `spawn_blocking`. Each call gets the run's [`CancelFlag`]: once it trips,
//! a rasterizer must stop and tear down any engine process it started.

use crate::config::SplitConfig;
use crate::error::RasterError;
use crate::pipeline::fallback::FallbackRasterizer;
use crate::pipeline::layout::RenderedDocument;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Turns a laid-out page into single-page PDF bytes.
pub trait Rasterizer: Send + Sync {
    /// Short engine name recorded in the report, e.g. `"chrome"`.
    fn name(&self) -> &'static str;

    /// Render `doc`, returning [`RasterError::Cancelled`] promptly once
    /// `cancel` trips.
    fn rasterize(&self, doc: &RenderedDocument, cancel: &CancelFlag)
        -> Result<Vec<u8>, RasterError>;
}

/// Run-wide stop signal shared with every in-flight render.
///
/// Tripped when the run that owns it is dropped: a run timeout, or a
/// caller abandoning a group stream.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Which slot of the engine produced a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Primary,
    Fallback,
}

/// PDF bytes plus the engine that produced them.
#[derive(Debug, Clone)]
pub struct RasterOutput {
    pub bytes: Vec<u8>,
    pub kind: EngineKind,
    pub renderer: &'static str,
}

/// Primary + fallback rasterizer pair.
#[derive(Clone)]
pub struct RasterEngine {
    primary: Option<Arc<dyn Rasterizer>>,
    fallback: Arc<dyn Rasterizer>,
}

impl fmt::Debug for RasterEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterEngine")
            .field("primary", &self.primary.as_ref().map(|p| p.name()))
            .field("fallback", &self.fallback.name())
            .finish()
    }
}

impl RasterEngine {
    pub fn new(primary: Option<Arc<dyn Rasterizer>>, fallback: Arc<dyn Rasterizer>) -> Self {
        Self { primary, fallback }
    }

    /// An engine with no primary; every document goes through the fallback.
    pub fn fallback_only() -> Self {
        Self::new(None, Arc::new(FallbackRasterizer::new()))
    }

    /// Pick engines for this host and configuration.
    ///
    /// Order: an injected primary, then a discovered headless browser (when
    /// the `chrome` feature is built and `use_browser` is set), else none.
    pub fn detect(config: &SplitConfig) -> Self {
        let fallback = config
            .fallback_rasterizer
            .clone()
            .unwrap_or_else(|| Arc::new(FallbackRasterizer::new()));

        let primary = match config.primary_rasterizer {
            Some(ref p) => Some(Arc::clone(p)),
            None if config.use_browser => detect_browser(config),
            None => None,
        };

        match primary {
            Some(ref p) => info!("Primary renderer: {}", p.name()),
            None => info!("No primary renderer; using {} for every group", fallback.name()),
        }
        Self::new(primary, fallback)
    }

    pub fn primary_name(&self) -> Option<&'static str> {
        self.primary.as_ref().map(|p| p.name())
    }

    pub fn fallback_name(&self) -> &'static str {
        self.fallback.name()
    }

    /// Rasterize with the primary, falling back on any primary error.
    ///
    /// A cancelled run never falls back.
    pub fn rasterize(
        &self,
        doc: &RenderedDocument,
        cancel: &CancelFlag,
    ) -> Result<RasterOutput, RasterError> {
        if cancel.is_cancelled() {
            return Err(RasterError::Cancelled);
        }

        let primary_err = match self.primary {
            Some(ref primary) => match primary.rasterize(doc, cancel) {
                Ok(bytes) => {
                    debug!(
                        "'{}' rasterized by {} ({} bytes)",
                        doc.key,
                        primary.name(),
                        bytes.len()
                    );
                    return Ok(RasterOutput {
                        bytes,
                        kind: EngineKind::Primary,
                        renderer: primary.name(),
                    });
                }
                Err(RasterError::Cancelled) => return Err(RasterError::Cancelled),
                Err(e) => {
                    warn!(
                        "{} failed for '{}', using {}: {}",
                        primary.name(),
                        doc.key,
                        self.fallback.name(),
                        e
                    );
                    Some(e)
                }
            },
            None => None,
        };

        if cancel.is_cancelled() {
            return Err(RasterError::Cancelled);
        }

        match self.fallback.rasterize(doc, cancel) {
            Ok(bytes) => Ok(RasterOutput {
                bytes,
                kind: EngineKind::Fallback,
                renderer: self.fallback.name(),
            }),
            Err(fallback_err) => Err(match primary_err {
                Some(p) => RasterError::Exhausted {
                    primary: p.to_string(),
                    fallback: fallback_err.to_string(),
                },
                None => fallback_err,
            }),
        }
    }
}

#[cfg(feature = "chrome")]
fn detect_browser(config: &SplitConfig) -> Option<Arc<dyn Rasterizer>> {
    use crate::pipeline::chrome::ChromeRasterizer;

    match chrome_locate::locate_browser_with(config.browser_path.as_deref()) {
        Ok(path) => {
            debug!("Found browser at {}", path.display());
            Some(Arc::new(ChromeRasterizer::new(
                path,
                config.render_timeout_secs,
            )))
        }
        Err(e) => {
            warn!("Headless browser unavailable: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "chrome"))]
fn detect_browser(_config: &SplitConfig) -> Option<Arc<dyn Rasterizer>> {
    debug!("Built without the `chrome` feature; browser rendering disabled");
    None
}
