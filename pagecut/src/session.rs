//! Capture session: the explicit state object behind one capture workspace.
//!
//! A session owns the pointer selection machine, the section type controller,
//! the section collection, the margins, and the raster of the page currently on
//! screen. Every operation runs to completion before the next one is accepted.

use image::RgbaImage;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::collection::{RemoveOutcome, SectionCollection};
use crate::compositor::Compositor;
use crate::config::CaptureConfig;
use crate::controller::{
    CaptureRequest, CasePhase, SectionMode, SectionType, SectionTypeController,
};
use crate::error::{CaptureError, CaptureResult};
use crate::export::{ExportFile, export_all};
use crate::geometry::Margins;
use crate::section::{Section, SectionId, SectionRole, SectionSummary};
use crate::selection::{
    CapturePoint, CompletedSelection, IgnoreReason, SelectionEvent, SelectionMachine,
    SelectionState,
};

/// The rendered page that captures are cut from
#[derive(Debug, Clone)]
pub struct PageSurface {
    pub page_number: u32,
    pub scale: f32,
    pub raster: RgbaImage,
}

/// What a single user action did
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CaptureOutcome {
    /// Capture mode is off; pointer events are not interpreted
    Inactive,
    Ignored {
        reason: IgnoreReason,
    },
    PointRecorded {
        y: u32,
    },
    Dragging {
        from: u32,
        to: u32,
    },
    SectionCreated {
        section: SectionSummary,
        case_completed: bool,
    },
}

/// Snapshot of the session for status displays
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub mode: SectionMode,
    pub case_phase: CasePhase,
    pub case_question_count: u32,
    pub case_questions_captured: usize,
    pub next_question_number: u32,
    pub selection: SelectionState,
    pub pending_points: usize,
    pub capture_active: bool,
    pub margins: Margins,
    pub page_number: Option<u32>,
    pub sections: usize,
}

#[derive(Debug)]
pub struct CaptureSession {
    selection: SelectionMachine,
    controller: SectionTypeController,
    collection: SectionCollection,
    compositor: Compositor,
    margins: Margins,
    surface: Option<PageSurface>,
    capture_active: bool,
}

impl CaptureSession {
    pub fn new(config: &CaptureConfig) -> CaptureResult<Self> {
        let mut controller = SectionTypeController::new();
        controller.select(config.section_type()?)?;

        Ok(Self {
            selection: SelectionMachine::new(
                controller.descent_policy(),
                config.drag_threshold_px,
            ),
            controller,
            collection: SectionCollection::new(),
            compositor: Compositor::new(config.jpeg_quality)?,
            margins: config.margins,
            surface: None,
            capture_active: false,
        })
    }

    pub fn status(&self) -> SessionStatus {
        let pending = self.controller.pending_case();
        SessionStatus {
            mode: self.controller.mode(),
            case_phase: self.controller.phase(),
            case_question_count: self.controller.question_count(),
            case_questions_captured: pending.map_or(0, |p| p.questions_captured.len()),
            next_question_number: self.controller.next_question_number(),
            selection: self.selection.state(),
            pending_points: self.selection.points().len(),
            capture_active: self.capture_active,
            margins: self.margins,
            page_number: self.surface.as_ref().map(|s| s.page_number),
            sections: self.collection.len(),
        }
    }

    pub fn mode(&self) -> SectionMode {
        self.controller.mode()
    }

    pub fn controller(&self) -> &SectionTypeController {
        &self.controller
    }

    pub fn selection(&self) -> &SelectionMachine {
        &self.selection
    }

    pub fn points(&self) -> &[CapturePoint] {
        self.selection.points()
    }

    pub fn sections(&self) -> &[Section] {
        self.collection.sections()
    }

    pub fn collection(&self) -> &SectionCollection {
        &self.collection
    }

    pub fn margins(&self) -> Margins {
        self.margins
    }

    pub fn surface(&self) -> Option<&PageSurface> {
        self.surface.as_ref()
    }

    pub fn is_capture_active(&self) -> bool {
        self.capture_active
    }

    /// Show a new page raster. Unpaired points belong to the old raster and
    /// are dropped.
    pub fn set_surface(&mut self, surface: PageSurface) {
        debug!(
            page = surface.page_number,
            width = surface.raster.width(),
            height = surface.raster.height(),
            "Page surface updated"
        );
        self.selection.reset();
        self.surface = Some(surface);
    }

    /// Forget the current document: surface, sections, numbering and mode state.
    pub fn reset_document(&mut self, config: &CaptureConfig) -> CaptureResult<()> {
        let fresh = Self::new(config)?;
        let margins = self.margins;
        *self = fresh;
        self.margins = margins;
        Ok(())
    }

    /// Choose the section type and enter capture mode.
    ///
    /// Invalid configurations are rejected before anything changes.
    pub fn select_section_type(&mut self, section_type: SectionType) -> CaptureResult<()> {
        self.controller.select(section_type)?;
        self.selection.set_policy(self.controller.descent_policy());
        self.capture_active = true;
        info!(mode = ?self.controller.mode(), "Capture mode entered");
        Ok(())
    }

    /// Enter or leave capture mode. Either way unpaired points are discarded.
    pub fn set_capture_active(&mut self, active: bool) {
        self.selection.reset();
        self.capture_active = active;
        debug!(active, "Capture mode toggled");
    }

    /// Update margins for captures made from now on.
    pub fn set_margins(&mut self, margins: Margins) -> CaptureResult<()> {
        if let Some(surface) = &self.surface {
            margins.effective_width(surface.raster.width())?;
        }
        self.margins = margins;
        debug!(left = margins.left, right = margins.right, "Margins updated");
        Ok(())
    }

    pub fn click(&mut self, y: u32) -> CaptureResult<CaptureOutcome> {
        self.apply(|machine| machine.click(y))
    }

    pub fn press(&mut self, y: u32) -> CaptureResult<CaptureOutcome> {
        self.apply(|machine| machine.press(y))
    }

    pub fn drag_to(&mut self, y: u32) -> CaptureResult<CaptureOutcome> {
        self.apply(|machine| machine.drag_to(y))
    }

    pub fn release(&mut self, y: u32) -> CaptureResult<CaptureOutcome> {
        self.apply(|machine| machine.release(y))
    }

    pub fn remove_point(&mut self, index: usize) -> Option<CapturePoint> {
        self.selection.remove_point(index)
    }

    /// Abandon unpaired points and any drag in progress.
    pub fn cancel_selection(&mut self) {
        self.selection.cancel();
    }

    /// Remove a section. Removing the paragraph of the case being captured
    /// abandons that case, so no question can be created for a missing group.
    pub fn remove_section(&mut self, id: SectionId) -> RemoveOutcome {
        let removed_group = self.collection.get(id).and_then(|section| match section.role {
            SectionRole::Case { case_group_id, .. } => Some(case_group_id),
            _ => None,
        });

        let outcome = self.collection.remove(id);
        if let (RemoveOutcome::Removed(_), Some(group)) = (&outcome, removed_group)
            && self
                .controller
                .pending_case()
                .is_some_and(|pending| pending.case_group_id == group)
        {
            self.controller.cancel_case();
            self.selection.cancel();
            info!(group = %group, "Abandoned case in progress after its paragraph was removed");
        }
        outcome
    }

    pub fn export(&self) -> Vec<ExportFile> {
        export_all(self.collection.sections())
    }

    fn apply(
        &mut self,
        event: impl FnOnce(&mut SelectionMachine) -> SelectionEvent,
    ) -> CaptureResult<CaptureOutcome> {
        if !self.capture_active {
            return Ok(CaptureOutcome::Inactive);
        }
        if self.surface.is_none() {
            return Err(CaptureError::NoPageRendered);
        }

        let snapshot = self.selection.clone();
        match event(&mut self.selection) {
            SelectionEvent::Ignored(reason) => Ok(CaptureOutcome::Ignored { reason }),
            SelectionEvent::StartRecorded(y) => Ok(CaptureOutcome::PointRecorded { y }),
            SelectionEvent::Dragging { from, to } => Ok(CaptureOutcome::Dragging { from, to }),
            SelectionEvent::Completed(selection) => match self.materialize(&selection) {
                Ok(outcome) => Ok(outcome),
                Err(e) => {
                    // Keep the pending start point so the user can retry
                    self.selection = snapshot;
                    self.selection.abort_drag();
                    warn!(error = %e, "Capture failed, selection preserved");
                    Err(e)
                }
            },
        }
    }

    fn materialize(&mut self, selection: &CompletedSelection) -> CaptureResult<CaptureOutcome> {
        let surface = self.surface.as_ref().ok_or(CaptureError::NoPageRendered)?;
        let output = self.controller.handle_selection(
            selection,
            CaptureRequest {
                surface: &surface.raster,
                page_number: surface.page_number,
                margins: self.margins,
                compositor: &self.compositor,
            },
        )?;

        if output.case_completed {
            // Case finished: back to standalone questions, capture UI off
            self.selection.set_policy(self.controller.descent_policy());
            self.capture_active = false;
        }

        let summary = output.section.summary();
        info!(
            id = %summary.id,
            kind = %output.section.kind(),
            page = summary.page_number,
            question_number = ?output.section.question_number(),
            "Section created"
        );
        self.collection.append(output.section);

        Ok(CaptureOutcome::SectionCreated {
            section: summary,
            case_completed: output.case_completed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SectionTypeSetting;
    use crate::section::SectionKind;
    use image::Rgba;
    use std::collections::HashSet;

    fn session() -> CaptureSession {
        let mut session = CaptureSession::new(&CaptureConfig::default()).unwrap();
        session.set_surface(PageSurface {
            page_number: 1,
            scale: 1.0,
            raster: RgbaImage::from_pixel(300, 800, Rgba([255, 255, 255, 255])),
        });
        session
    }

    fn created(outcome: CaptureOutcome) -> (SectionSummary, bool) {
        match outcome {
            CaptureOutcome::SectionCreated {
                section,
                case_completed,
            } => (section, case_completed),
            other => panic!("expected section, got {:?}", other),
        }
    }

    #[test]
    fn test_clicks_ignored_until_capture_active() {
        let mut session = session();
        assert!(matches!(session.click(10).unwrap(), CaptureOutcome::Inactive));
        assert!(session.points().is_empty());
    }

    #[test]
    fn test_click_pair_creates_question() {
        let mut session = session();
        session.select_section_type(SectionType::Question).unwrap();

        assert!(matches!(
            session.click(10).unwrap(),
            CaptureOutcome::PointRecorded { y: 10 }
        ));
        let (section, completed) = created(session.click(50).unwrap());
        assert_eq!(section.role.kind(), SectionKind::Question);
        assert_eq!(section.role.question_number(), Some(1));
        assert_eq!((section.width, section.height), (300, 40));
        assert!(!completed);
        assert!(session.is_capture_active());
    }

    #[test]
    fn test_sequential_descent_between_sections() {
        let mut session = session();
        session.select_section_type(SectionType::Question).unwrap();
        session.click(10).unwrap();
        session.click(50).unwrap();

        assert!(matches!(
            session.click(40).unwrap(),
            CaptureOutcome::Ignored {
                reason: IgnoreReason::StartAbovePreviousEnd
            }
        ));
        assert!(matches!(
            session.click(60).unwrap(),
            CaptureOutcome::PointRecorded { y: 60 }
        ));
    }

    #[test]
    fn test_case_workflow_creates_linked_sections() {
        let mut session = session();
        session.select_section_type(SectionType::Question).unwrap();
        session.click(0).unwrap();
        session.click(30).unwrap();

        session
            .select_section_type(SectionType::Case { question_count: 2 })
            .unwrap();
        let (paragraph, _) = created({
            session.click(100).unwrap();
            session.click(200).unwrap()
        });
        assert_eq!(paragraph.role.kind(), SectionKind::Case);

        // Case questions do not need to descend below the paragraph
        session.click(400).unwrap();
        let (first, done) = created(session.click(450).unwrap());
        assert!(!done);
        session.click(50).unwrap();
        let (second, done) = created(session.click(90).unwrap());
        assert!(done);

        let group = paragraph.role.case_group_id().unwrap();
        assert_eq!(first.role.case_group_id(), Some(group));
        assert_eq!(second.role.case_group_id(), Some(group));
        assert_eq!(first.role.question_number(), Some(2));
        assert_eq!(second.role.question_number(), Some(3));
        assert_eq!(first.height, 100 + 50);

        let case_sections = session
            .sections()
            .iter()
            .filter(|s| s.kind() == SectionKind::Case)
            .count();
        assert_eq!(case_sections, 1);
        assert_eq!(session.mode(), SectionMode::Question);
        assert!(!session.is_capture_active());
    }

    #[test]
    fn test_invalid_case_configuration_changes_nothing() {
        let mut session = session();
        let err = session
            .select_section_type(SectionType::Case { question_count: 0 })
            .unwrap_err();
        assert!(matches!(err, CaptureError::InvalidConfiguration { .. }));
        assert!(!session.is_capture_active());
        assert_eq!(session.mode(), SectionMode::Question);
    }

    #[test]
    fn test_failed_capture_preserves_pending_start() {
        let mut session = session();
        session.select_section_type(SectionType::Question).unwrap();
        session.click(700).unwrap();

        // Past the bottom of the 800px page
        let err = session.click(900).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidGeometry { .. }));
        assert!(session.sections().is_empty());
        assert_eq!(session.points().len(), 1);
        assert_eq!(session.selection().state(), SelectionState::AwaitingEnd);

        let (section, _) = created(session.click(780).unwrap());
        assert_eq!(section.height, 80);
    }

    #[test]
    fn test_short_drag_creates_nothing() {
        let mut session = session();
        session.select_section_type(SectionType::Instruction).unwrap();
        session.press(100).unwrap();
        session.drag_to(105).unwrap();
        assert!(matches!(
            session.release(108).unwrap(),
            CaptureOutcome::Ignored {
                reason: IgnoreReason::DragTooShort
            }
        ));
        assert!(session.sections().is_empty());
        assert!(session.points().is_empty());
    }

    #[test]
    fn test_drag_creates_instruction() {
        let mut session = session();
        session.select_section_type(SectionType::Instruction).unwrap();
        session.press(100).unwrap();
        let (section, _) = created(session.release(220).unwrap());
        assert_eq!(section.role.kind(), SectionKind::Instruction);
        assert_eq!(section.role.question_number(), None);
        assert_eq!(section.height, 120);
    }

    #[test]
    fn test_margins_apply_to_later_captures_only() {
        let mut session = session();
        session.select_section_type(SectionType::Question).unwrap();
        session.click(0).unwrap();
        let (before, _) = created(session.click(10).unwrap());

        session.set_margins(Margins::new(20, 30)).unwrap();
        session.click(20).unwrap();
        let (after, _) = created(session.click(30).unwrap());

        assert_eq!(before.width, 300);
        assert_eq!(after.width, 250);
        assert_eq!(session.sections()[0].image.width, 300);
    }

    #[test]
    fn test_margins_wider_than_page_rejected() {
        let mut session = session();
        assert!(session.set_margins(Margins::new(200, 100)).is_err());
        assert_eq!(session.margins(), Margins::default());
    }

    #[test]
    fn test_toggling_capture_clears_points() {
        let mut session = session();
        session.select_section_type(SectionType::Question).unwrap();
        session.click(100).unwrap();
        session.set_capture_active(false);
        session.set_capture_active(true);
        assert!(session.points().is_empty());
        assert_eq!(session.selection().state(), SelectionState::Idle);
    }

    #[test]
    fn test_remove_case_cascades() {
        let mut session = session();
        session.select_section_type(SectionType::Question).unwrap();
        session.click(0).unwrap();
        let (standalone, _) = created(session.click(20).unwrap());

        session
            .select_section_type(SectionType::Case { question_count: 1 })
            .unwrap();
        session.click(100).unwrap();
        let (paragraph, _) = created(session.click(150).unwrap());
        session.click(200).unwrap();
        let (question, _) = created(session.click(260).unwrap());

        assert_eq!(session.remove_section(question.id), RemoveOutcome::Refused);
        match session.remove_section(paragraph.id) {
            RemoveOutcome::Removed(ids) => {
                let ids: HashSet<_> = ids.into_iter().collect();
                assert_eq!(ids, HashSet::from([paragraph.id, question.id]));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(session.sections().len(), 1);
        assert_eq!(session.sections()[0].id, standalone.id);
    }

    #[test]
    fn test_removing_pending_case_paragraph_abandons_case() {
        let mut session = session();
        session
            .select_section_type(SectionType::Case { question_count: 2 })
            .unwrap();
        session.click(100).unwrap();
        let (paragraph, _) = created(session.click(150).unwrap());
        session.click(200).unwrap();

        assert!(matches!(
            session.remove_section(paragraph.id),
            RemoveOutcome::Removed(_)
        ));
        assert!(session.sections().is_empty());
        assert!(!session.controller().is_case_in_progress());
        assert_eq!(session.controller().phase(), CasePhase::Paragraph);
        assert!(session.points().is_empty());

        // The next pair starts a fresh case instead of a question for the removed group
        session.click(300).unwrap();
        let (next, _) = created(session.click(360).unwrap());
        assert_eq!(next.role.kind(), SectionKind::Case);
        assert_ne!(next.role.case_group_id(), paragraph.role.case_group_id());
        assert!(
            session
                .sections()
                .iter()
                .all(|s| s.kind() != SectionKind::CaseQuestion)
        );
    }

    #[test]
    fn test_removing_finished_case_keeps_new_case_in_progress() {
        let mut session = session();
        session
            .select_section_type(SectionType::Case { question_count: 1 })
            .unwrap();
        session.click(0).unwrap();
        let (first, _) = created(session.click(40).unwrap());
        session.click(50).unwrap();
        session.click(90).unwrap();

        session
            .select_section_type(SectionType::Case { question_count: 2 })
            .unwrap();
        session.click(100).unwrap();
        let (second, _) = created(session.click(150).unwrap());

        assert!(matches!(
            session.remove_section(first.id),
            RemoveOutcome::Removed(ids) if ids.len() == 2
        ));
        let pending = session.controller().pending_case().unwrap();
        assert_eq!(Some(pending.case_group_id), second.role.case_group_id());
    }

    #[test]
    fn test_export_one_file_per_section() {
        let mut session = session();
        session.select_section_type(SectionType::Question).unwrap();
        for start in [0, 100, 200] {
            session.click(start).unwrap();
            session.click(start + 50).unwrap();
        }

        let files = session.export();
        assert_eq!(files.len(), 3);
        let names: HashSet<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names.len(), 3);
        assert!(files.iter().all(|f| !f.name.contains(':')));
    }

    #[test]
    fn test_reset_document_restarts_numbering() {
        let mut session = session();
        session.select_section_type(SectionType::Question).unwrap();
        session.click(0).unwrap();
        session.click(20).unwrap();
        session.set_margins(Margins::new(5, 5)).unwrap();

        let config = CaptureConfig {
            section_type: SectionTypeSetting::Question,
            ..CaptureConfig::default()
        };
        session.reset_document(&config).unwrap();
        assert!(session.sections().is_empty());
        assert!(session.surface().is_none());
        assert_eq!(session.controller().next_question_number(), 1);
        assert_eq!(session.margins(), Margins::new(5, 5));
    }

    #[test]
    fn test_click_without_page_fails() {
        let mut session = CaptureSession::new(&CaptureConfig::default()).unwrap();
        session.select_section_type(SectionType::Question).unwrap();
        assert!(matches!(
            session.click(10),
            Err(CaptureError::NoPageRendered)
        ));
    }
}
