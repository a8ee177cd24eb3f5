//! Async capture service.
//!
//! Wraps a [`CaptureSession`] behind an async mutex so user actions are handled
//! one at a time, and moves page rendering and compositing onto the blocking
//! pool. Loading, navigation, zoom, persistence and export are wired here.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::collection::RemoveOutcome;
use crate::config::AppConfig;
use crate::controller::SectionType;
use crate::db::{Database, NewScreenshot, Screenshot};
use crate::document::{DocumentLoader, PageSource};
use crate::error::{CaptureError, CaptureResult, RenderError};
use crate::export::{Archiver, ZipArchiver, archive_name};
use crate::geometry::Margins;
use crate::render::RenderCoordinator;
use crate::section::{SectionId, SectionSummary};
use crate::selection::CapturePoint;
use crate::session::{CaptureOutcome, CaptureSession, PageSurface, SessionStatus};

/// The page currently on screen
#[derive(Debug, Clone, Serialize)]
pub struct PageView {
    pub page_number: u32,
    pub page_count: u32,
    pub scale: f32,
    pub width: u32,
    pub height: u32,
}

/// A packaged export ready to be written or downloaded
#[derive(Debug, Clone)]
pub struct ExportArchive {
    pub name: String,
    pub bytes: Vec<u8>,
    pub file_count: usize,
}

struct ViewState {
    document: Option<Arc<dyn PageSource>>,
    /// Bumped whenever the document changes so late renders can be dropped
    document_generation: u64,
    page_number: u32,
    scale: f32,
}

pub struct CaptureService {
    config: AppConfig,
    loader: Arc<dyn DocumentLoader>,
    view: Mutex<ViewState>,
    renders: RenderCoordinator,
    session: Arc<tokio::sync::Mutex<CaptureSession>>,
    database: Option<Arc<Database>>,
    documents_loaded: AtomicU64,
}

impl CaptureService {
    pub fn new(
        config: AppConfig,
        loader: Arc<dyn DocumentLoader>,
        database: Option<Database>,
    ) -> CaptureResult<Self> {
        config.validate()?;
        let session = CaptureSession::new(&config.capture)?;
        let scale = config.render.clamp_scale(config.render.scale);

        Ok(Self {
            loader,
            view: Mutex::new(ViewState {
                document: None,
                document_generation: 0,
                page_number: 1,
                scale,
            }),
            renders: RenderCoordinator::new(),
            session: Arc::new(tokio::sync::Mutex::new(session)),
            database: database.map(Arc::new),
            documents_loaded: AtomicU64::new(0),
            config,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn view(&self) -> MutexGuard<'_, ViewState> {
        self.view.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current_document(&self) -> CaptureResult<(Arc<dyn PageSource>, u64, u32, f32)> {
        let view = self.view();
        let document = view.document.clone().ok_or(CaptureError::NoDocument)?;
        Ok((document, view.document_generation, view.page_number, view.scale))
    }

    pub fn document_name(&self) -> Option<String> {
        self.view().document.as_ref().map(|d| d.name().to_string())
    }

    /// Load a document and show its first page.
    ///
    /// The previous document, its sections and its surface are discarded first,
    /// so a failed load leaves an empty workspace rather than stale state.
    pub async fn open_document(
        &self,
        name: &str,
        bytes: Vec<u8>,
    ) -> CaptureResult<Option<PageView>> {
        self.renders.cancel();

        let loader = self.loader.clone();
        let owned_name = name.to_string();
        let loaded = tokio::task::spawn_blocking(move || loader.load_document(&owned_name, bytes))
            .await
            .map_err(|e| CaptureError::Task {
                message: format!("document load task failed: {}", e),
            })?;

        let scale = self.config.render.clamp_scale(self.config.render.scale);
        let generation = {
            let mut view = self.view();
            view.document = None;
            view.document_generation += 1;
            view.page_number = 1;
            view.scale = scale;
            view.document_generation
        };
        self.session
            .lock()
            .await
            .reset_document(&self.config.capture)?;

        let document = match loaded {
            Ok(document) => document,
            Err(e) => {
                warn!(name, error = %e, "Document load failed");
                return Err(e);
            }
        };

        info!(name, pages = document.page_count(), "Document loaded");
        self.documents_loaded.fetch_add(1, Ordering::Relaxed);
        {
            let mut view = self.view();
            if view.document_generation == generation {
                view.document = Some(document.clone());
            }
        }

        self.render_into_session(document, generation, 1, scale).await
    }

    /// Render `page_number` at the current scale.
    ///
    /// Returns `Ok(None)` when a newer render superseded this one.
    pub async fn show_page(&self, page_number: u32) -> CaptureResult<Option<PageView>> {
        let (document, generation, _, scale) = self.current_document()?;
        self.render_into_session(document, generation, page_number, scale)
            .await
    }

    pub async fn next_page(&self) -> CaptureResult<Option<PageView>> {
        let (document, generation, page_number, scale) = self.current_document()?;
        if page_number >= document.page_count() {
            debug!(page = page_number, "Already on the last page");
            return Ok(None);
        }
        self.render_into_session(document, generation, page_number + 1, scale)
            .await
    }

    pub async fn previous_page(&self) -> CaptureResult<Option<PageView>> {
        let (document, generation, page_number, scale) = self.current_document()?;
        if page_number <= 1 {
            debug!(page = page_number, "Already on the first page");
            return Ok(None);
        }
        self.render_into_session(document, generation, page_number - 1, scale)
            .await
    }

    pub async fn zoom_in(&self) -> CaptureResult<Option<PageView>> {
        let scale = self.view().scale + self.config.render.scale_step;
        self.set_scale(scale).await
    }

    pub async fn zoom_out(&self) -> CaptureResult<Option<PageView>> {
        let scale = self.view().scale - self.config.render.scale_step;
        self.set_scale(scale).await
    }

    /// Re-render the current page at `scale`, clamped to the configured bounds.
    pub async fn set_scale(&self, scale: f32) -> CaptureResult<Option<PageView>> {
        let (document, generation, page_number, _) = self.current_document()?;
        let scale = self.config.render.clamp_scale(scale);
        self.render_into_session(document, generation, page_number, scale)
            .await
    }

    async fn render_into_session(
        &self,
        document: Arc<dyn PageSource>,
        generation: u64,
        page_number: u32,
        scale: f32,
    ) -> CaptureResult<Option<PageView>> {
        let ticket = self.renders.begin(page_number, scale);
        let result = self.renders.run(&ticket, document.clone()).await;

        // Accepted under the session lock: a stale render must not replace a
        // newer surface.
        let mut session = self.session.lock().await;
        let raster = match self.renders.finish(&ticket, result) {
            Ok(raster) => raster,
            Err(RenderError::Cancelled) => {
                debug!(page = page_number, "Render superseded");
                return Ok(None);
            }
            Err(e) => {
                warn!(page = page_number, error = %e, "Page render failed");
                return Err(e.into());
            }
        };

        {
            let mut view = self.view();
            if view.document_generation != generation {
                debug!(page = page_number, "Render belongs to a closed document");
                return Ok(None);
            }
            view.page_number = page_number;
            view.scale = scale;
        }

        let page = PageView {
            page_number,
            page_count: document.page_count(),
            scale,
            width: raster.width(),
            height: raster.height(),
        };
        session.set_surface(PageSurface {
            page_number,
            scale,
            raster,
        });
        drop(session);
        debug!(
            page = page_number,
            width = page.width,
            height = page.height,
            scale,
            "Page shown"
        );

        Ok(Some(page))
    }

    /// Run a session action on the blocking pool while holding the session.
    async fn with_session<T, F>(&self, action: F) -> CaptureResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut CaptureSession) -> CaptureResult<T> + Send + 'static,
    {
        let mut session = self.session.clone().lock_owned().await;
        tokio::task::spawn_blocking(move || action(&mut session))
            .await
            .map_err(|e| CaptureError::Task {
                message: format!("capture task failed: {}", e),
            })?
    }

    async fn pointer<F>(&self, action: F) -> CaptureResult<CaptureOutcome>
    where
        F: FnOnce(&mut CaptureSession) -> CaptureResult<CaptureOutcome> + Send + 'static,
    {
        let persistence = match (&self.database, self.config.storage.persist_captures) {
            (Some(database), true) => self
                .document_name()
                .map(|name| (database.clone(), name)),
            _ => None,
        };

        self.with_session(move |session| {
            let outcome = action(session)?;
            if let (Some((database, name)), CaptureOutcome::SectionCreated { section, .. }) =
                (&persistence, &outcome)
                && let Some(created) = session.collection().get(section.id)
            {
                // A storage failure does not undo the capture
                if let Err(e) = database.save_screenshot(NewScreenshot::from_section(name, created))
                {
                    warn!(id = %section.id, error = %e, "Failed to persist section");
                }
            }
            Ok(outcome)
        })
        .await
    }

    pub async fn click(&self, y: u32) -> CaptureResult<CaptureOutcome> {
        self.pointer(move |session| session.click(y)).await
    }

    pub async fn press(&self, y: u32) -> CaptureResult<CaptureOutcome> {
        self.pointer(move |session| session.press(y)).await
    }

    pub async fn drag_to(&self, y: u32) -> CaptureResult<CaptureOutcome> {
        self.pointer(move |session| session.drag_to(y)).await
    }

    pub async fn release(&self, y: u32) -> CaptureResult<CaptureOutcome> {
        self.pointer(move |session| session.release(y)).await
    }

    /// Press at `from`, move and release at `to`.
    pub async fn drag(&self, from: u32, to: u32) -> CaptureResult<CaptureOutcome> {
        self.pointer(move |session| {
            let pressed = session.press(from)?;
            if !matches!(pressed, CaptureOutcome::Dragging { .. }) {
                return Ok(pressed);
            }
            session.drag_to(to)?;
            session.release(to)
        })
        .await
    }

    pub async fn select_section_type(&self, section_type: SectionType) -> CaptureResult<()> {
        self.session.lock().await.select_section_type(section_type)
    }

    pub async fn set_capture_active(&self, active: bool) {
        self.session.lock().await.set_capture_active(active);
    }

    pub async fn set_margins(&self, margins: Margins) -> CaptureResult<()> {
        self.session.lock().await.set_margins(margins)
    }

    pub async fn cancel_selection(&self) {
        self.session.lock().await.cancel_selection();
    }

    pub async fn remove_point(&self, index: usize) -> Option<CapturePoint> {
        self.session.lock().await.remove_point(index)
    }

    pub async fn remove_section(&self, id: SectionId) -> RemoveOutcome {
        self.session.lock().await.remove_section(id)
    }

    /// Remove the section at `index` in collection order.
    pub async fn remove_section_at(&self, index: usize) -> RemoveOutcome {
        let mut session = self.session.lock().await;
        let Some(id) = session.sections().get(index).map(|s| s.id) else {
            return RemoveOutcome::NotFound;
        };
        session.remove_section(id)
    }

    pub async fn sections(&self) -> Vec<SectionSummary> {
        let session = self.session.lock().await;
        session.sections().iter().map(|s| s.summary()).collect()
    }

    pub async fn status(&self) -> SessionStatus {
        self.session.lock().await.status()
    }

    /// Package every section into one archive named after the document.
    pub async fn export_archive(&self) -> CaptureResult<ExportArchive> {
        let name = archive_name(&self.document_name().ok_or(CaptureError::NoDocument)?);
        let archive = self
            .with_session(move |session| {
                let files = session.export();
                let bytes = ZipArchiver.archive(&files)?;
                Ok(ExportArchive {
                    name,
                    bytes,
                    file_count: files.len(),
                })
            })
            .await?;

        info!(
            archive = %archive.name,
            files = archive.file_count,
            bytes = archive.bytes.len(),
            "Sections exported"
        );
        Ok(archive)
    }

    /// Write the export archive into `dir`, returning its path.
    pub async fn export_to_dir(&self, dir: &Path) -> CaptureResult<PathBuf> {
        let archive = self.export_archive().await?;
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(&archive.name);
        tokio::fs::write(&path, &archive.bytes).await?;
        Ok(path)
    }

    /// Screenshots saved for the current document.
    pub async fn saved_screenshots(&self) -> CaptureResult<Vec<Screenshot>> {
        let Some(database) = self.database.clone() else {
            return Ok(Vec::new());
        };
        let name = self.document_name();
        tokio::task::spawn_blocking(move || database.list_screenshots(name.as_deref()))
            .await
            .map_err(|e| CaptureError::Task {
                message: format!("screenshot query failed: {}", e),
            })?
    }

    pub fn documents_loaded(&self) -> u64 {
        self.documents_loaded.load(Ordering::Relaxed)
    }
}
