//! Resource readiness gate
//!
//! Holds the gold card expansion back until its hero image and fonts are
//! paintable. The gate always resolves: an image that fails to load yields
//! `false` (the caller continues anyway), while a probe that errors out or
//! exceeds the timeout yields `true`.

use crate::config::ReadinessConfig;
use crate::error::ProbeError;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Boxed probe result
pub type ProbeFuture = Pin<Box<dyn Future<Output = Result<bool, ProbeError>> + Send + 'static>>;

/// Checks whether an image can be displayed
pub trait ImageProbe: Send + Sync {
    /// Resolve `true` once the image decodes, `false` if it cannot be loaded
    fn probe(&self, url: &str) -> ProbeFuture;
}

/// Checks whether the page fonts are loaded
pub trait FontProbe: Send + Sync {
    fn ready(&self) -> ProbeFuture;
}

// ============================================================================
// Probes
// ============================================================================

/// Decodes images from the local file system
#[derive(Clone, Debug)]
pub struct FileImageProbe {
    root: PathBuf,
}

impl FileImageProbe {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a site-relative url (`/avatars/a.jpg`) against the root
    pub fn resolve(&self, url: &str) -> PathBuf {
        self.root.join(url.trim_start_matches('/'))
    }
}

impl ImageProbe for FileImageProbe {
    fn probe(&self, url: &str) -> ProbeFuture {
        if url.trim().is_empty() {
            return Box::pin(async { Err(ProbeError::EmptyUrl) });
        }
        let path = self.resolve(url);
        Box::pin(async move {
            tokio::task::spawn_blocking(move || decode_image(&path))
                .await
                .map_err(|e| ProbeError::Task(e.to_string()))
        })
    }
}

fn decode_image(path: &Path) -> bool {
    match image::open(path) {
        Ok(_) => {
            tracing::trace!("Image ready: {}", path.display());
            true
        }
        Err(err) => {
            tracing::debug!("Image {} failed to load: {}", path.display(), err);
            false
        }
    }
}

/// Parses font files to confirm they are usable
#[derive(Clone, Debug, Default)]
pub struct FileFontProbe {
    paths: Vec<PathBuf>,
}

impl FileFontProbe {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

impl FontProbe for FileFontProbe {
    fn ready(&self) -> ProbeFuture {
        let paths = self.paths.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || -> Result<bool, ProbeError> {
                for path in &paths {
                    parse_font(path)?;
                }
                Ok(true)
            })
            .await
            .map_err(|e| ProbeError::Task(e.to_string()))?
        })
    }
}

fn parse_font(path: &Path) -> Result<(), ProbeError> {
    let data = std::fs::read(path)?;
    let face = ttf_parser::Face::parse(&data, 0)
        .map_err(|e| ProbeError::Font(format!("{}: {}", path.display(), e)))?;
    tracing::trace!(
        "Font ready: {} ({} glyphs)",
        path.display(),
        face.number_of_glyphs()
    );
    Ok(())
}

/// Font readiness signalled by the host once its fonts are loaded
#[derive(Clone, Debug)]
pub struct FontsReady {
    ready: Arc<watch::Sender<bool>>,
}

impl FontsReady {
    pub fn pending() -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            ready: Arc::new(ready),
        }
    }

    /// Fonts that are already available
    pub fn loaded() -> Self {
        let fonts = Self::pending();
        fonts.signal();
        fonts
    }

    pub fn signal(&self) {
        self.ready.send_replace(true);
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }
}

impl FontProbe for FontsReady {
    fn ready(&self) -> ProbeFuture {
        let mut receiver = self.ready.subscribe();
        Box::pin(async move {
            receiver
                .wait_for(|ready| *ready)
                .await
                .map(|_| true)
                .map_err(|e| ProbeError::Task(e.to_string()))
        })
    }
}

// ============================================================================
// Gate
// ============================================================================

/// Combined image and font readiness check
#[derive(Clone)]
pub struct ResourceReadinessGate {
    image: Arc<dyn ImageProbe>,
    fonts: Arc<dyn FontProbe>,
    timeout: Option<Duration>,
}

impl ResourceReadinessGate {
    pub fn new(image: Arc<dyn ImageProbe>, fonts: Arc<dyn FontProbe>) -> Self {
        Self {
            image,
            fonts,
            timeout: ReadinessConfig::default().timeout(),
        }
    }

    /// File-system probes rooted at the configured asset directory
    pub fn from_config(config: &ReadinessConfig) -> Self {
        let fonts = config
            .fonts
            .iter()
            .map(|font| config.asset_root.join(font))
            .collect();
        Self {
            image: Arc::new(FileImageProbe::new(&config.asset_root)),
            fonts: Arc::new(FileFontProbe::new(fonts)),
            timeout: config.timeout(),
        }
    }

    /// Bound the whole check; `None` waits as long as the probes take
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Wait for the image at `image_url` and the fonts
    ///
    /// Returns whether the image loaded. Never fails: probe errors and
    /// timeouts are logged and reported as ready.
    pub async fn check_ready(&self, image_url: &str) -> bool {
        let image = self.image.probe(image_url);
        let fonts = self.fonts.ready();
        let probes = async { tokio::join!(image, fonts) };

        let outcome = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, probes).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(
                        "Resource readiness check timed out after {:?}, continuing",
                        timeout
                    );
                    return true;
                }
            },
            None => probes.await,
        };

        match outcome {
            (Ok(image_ready), Ok(_)) => {
                if !image_ready {
                    tracing::warn!("Image '{}' failed to load, continuing", image_url);
                }
                image_ready
            }
            (Err(err), _) | (_, Err(err)) => {
                tracing::warn!("Resource readiness check failed: {}", err);
                true
            }
        }
    }
}
