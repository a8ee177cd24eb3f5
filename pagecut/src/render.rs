//! Render coordination: at most one active render for the page raster.
//!
//! Starting a render cancels the one in flight. A render that completes after
//! a newer one started is stale and is reported as cancelled.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use image::RgbaImage;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::document::PageSource;
use crate::error::RenderError;

/// Handle for one started render
#[derive(Debug, Clone)]
pub struct RenderTicket {
    generation: u64,
    token: CancellationToken,
    pub page_number: u32,
    pub scale: f32,
}

impl RenderTicket {
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug, Default)]
pub struct RenderCoordinator {
    generation: AtomicU64,
    active: Mutex<Option<CancellationToken>>,
}

impl RenderCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new render, cancelling whatever was in flight.
    pub fn begin(&self, page_number: u32, scale: f32) -> RenderTicket {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();

        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = active.replace(token.clone()) {
            previous.cancel();
            debug!(generation, "Cancelled in-flight render");
        }

        RenderTicket {
            generation,
            token,
            page_number,
            scale,
        }
    }

    pub fn is_current(&self, ticket: &RenderTicket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.generation && !ticket.is_cancelled()
    }

    /// Accept a completed render only if no newer render has started.
    pub fn finish(
        &self,
        ticket: &RenderTicket,
        result: Result<RgbaImage, RenderError>,
    ) -> Result<RgbaImage, RenderError> {
        if !self.is_current(ticket) {
            debug!(page = ticket.page_number, "Discarded stale render");
            return Err(RenderError::Cancelled);
        }

        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        *active = None;
        result
    }

    /// Cancel the render in flight, if any.
    pub fn cancel(&self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = active.take() {
            token.cancel();
        }
    }

    /// Render a page on the blocking pool and accept it if still current.
    pub async fn render(
        &self,
        source: Arc<dyn PageSource>,
        page_number: u32,
        scale: f32,
    ) -> Result<RgbaImage, RenderError> {
        let ticket = self.begin(page_number, scale);
        let result = self.run(&ticket, source).await;
        self.finish(&ticket, result)
    }

    /// Run the render for `ticket` without accepting it.
    ///
    /// Callers that install the raster somewhere shared call [`Self::finish`]
    /// while holding that resource, so a newer render cannot be overwritten.
    pub async fn run(
        &self,
        ticket: &RenderTicket,
        source: Arc<dyn PageSource>,
    ) -> Result<RgbaImage, RenderError> {
        let (page_number, scale) = (ticket.page_number, ticket.scale);
        let handle =
            tokio::task::spawn_blocking(move || source.render_page(page_number, scale));

        tokio::select! {
            _ = ticket.token.cancelled() => Err(RenderError::Cancelled),
            joined = handle => joined.unwrap_or_else(|e| {
                Err(RenderError::Backend {
                    page: page_number,
                    message: format!("render task failed: {}", e),
                })
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct SlowSource;

    impl PageSource for SlowSource {
        fn name(&self) -> &str {
            "slow.pdf"
        }

        fn page_count(&self) -> u32 {
            2
        }

        fn render_page(&self, page_number: u32, _scale: f32) -> Result<RgbaImage, RenderError> {
            std::thread::sleep(Duration::from_millis(50));
            Ok(RgbaImage::new(10, 10 * page_number))
        }
    }

    #[test]
    fn test_begin_cancels_previous() {
        let coordinator = RenderCoordinator::new();
        let first = coordinator.begin(1, 1.0);
        let second = coordinator.begin(2, 1.0);

        assert!(first.is_cancelled());
        assert!(!coordinator.is_current(&first));
        assert!(coordinator.is_current(&second));
    }

    #[test]
    fn test_stale_completion_is_discarded() {
        let coordinator = RenderCoordinator::new();
        let first = coordinator.begin(1, 1.0);
        let second = coordinator.begin(2, 1.0);

        let stale = coordinator.finish(&first, Ok(RgbaImage::new(1, 1)));
        assert!(matches!(stale, Err(RenderError::Cancelled)));

        let fresh = coordinator.finish(&second, Ok(RgbaImage::new(2, 2)));
        assert_eq!(fresh.unwrap().dimensions(), (2, 2));
    }

    #[tokio::test]
    async fn test_run_leaves_acceptance_to_finish() {
        let coordinator = RenderCoordinator::new();
        let source: Arc<dyn PageSource> = Arc::new(SlowSource);

        let older = coordinator.begin(1, 1.0);
        let newer = coordinator.begin(2, 1.0);
        let newer_result = coordinator.run(&newer, source.clone()).await;
        assert_eq!(
            coordinator.finish(&newer, newer_result).unwrap().dimensions(),
            (10, 20)
        );

        let older_result = coordinator.run(&older, source).await;
        assert!(matches!(
            coordinator.finish(&older, older_result),
            Err(RenderError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_newer_render_wins() {
        let coordinator = RenderCoordinator::new();
        let source: Arc<dyn PageSource> = Arc::new(SlowSource);

        let (first, second) = tokio::join!(
            coordinator.render(source.clone(), 1, 1.0),
            coordinator.render(source.clone(), 2, 1.0)
        );

        assert!(matches!(first, Err(RenderError::Cancelled)));
        assert_eq!(second.unwrap().dimensions(), (10, 20));
    }
}
