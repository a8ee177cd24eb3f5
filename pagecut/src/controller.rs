//! Section type controller.
//!
//! Decides what a completed selection means: an instruction, a standalone
//! question, or one step of the case workflow (one shared paragraph followed by
//! a fixed number of linked questions).

use chrono::Utc;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::compositor::{Compositor, EncodedImage};
use crate::error::{CaptureError, CaptureResult};
use crate::geometry::{Interval, Margins, crop};
use crate::section::{CaseGroupId, Section, SectionId, SectionRole};
use crate::selection::{CompletedSelection, DescentPolicy};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionMode {
    Instruction,
    #[default]
    Question,
    Case,
}

/// A section type as chosen by the user, with the case question target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionType {
    Instruction,
    Question,
    Case { question_count: u32 },
}

impl SectionType {
    pub fn mode(&self) -> SectionMode {
        match self {
            SectionType::Instruction => SectionMode::Instruction,
            SectionType::Question => SectionMode::Question,
            SectionType::Case { .. } => SectionMode::Case,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CasePhase {
    Paragraph,
    Questions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaseQuestionRecord {
    pub interval: Interval,
    pub question_number: u32,
}

/// State held between capturing a case paragraph and its last question
#[derive(Debug, Clone)]
pub struct PendingCaseContext {
    pub case_group_id: CaseGroupId,
    pub paragraph_raster: RgbaImage,
    pub paragraph_image: EncodedImage,
    pub interval: Interval,
    pub questions_captured: Vec<CaseQuestionRecord>,
}

/// Inputs needed to turn a selection into a section
#[derive(Debug, Clone, Copy)]
pub struct CaptureRequest<'a> {
    pub surface: &'a RgbaImage,
    pub page_number: u32,
    pub margins: Margins,
    pub compositor: &'a Compositor,
}

/// A created section plus whether it finished a case group
#[derive(Debug, Clone)]
pub struct ControllerOutput {
    pub section: Section,
    pub case_completed: bool,
}

#[derive(Debug, Clone)]
pub struct SectionTypeController {
    mode: SectionMode,
    question_count: u32,
    phase: CasePhase,
    pending: Option<PendingCaseContext>,
    next_question_number: u32,
}

impl SectionTypeController {
    pub fn new() -> Self {
        Self {
            mode: SectionMode::Question,
            question_count: 0,
            phase: CasePhase::Paragraph,
            pending: None,
            next_question_number: 1,
        }
    }

    pub fn mode(&self) -> SectionMode {
        self.mode
    }

    pub fn phase(&self) -> CasePhase {
        self.phase
    }

    /// Number of linked questions expected per case group
    pub fn question_count(&self) -> u32 {
        self.question_count
    }

    pub fn pending_case(&self) -> Option<&PendingCaseContext> {
        self.pending.as_ref()
    }

    pub fn next_question_number(&self) -> u32 {
        self.next_question_number
    }

    pub fn is_case_in_progress(&self) -> bool {
        self.pending.is_some()
    }

    /// Case pairs stand alone; everything else descends the page.
    pub fn descent_policy(&self) -> DescentPolicy {
        match self.mode {
            SectionMode::Case => DescentPolicy::Independent,
            SectionMode::Instruction | SectionMode::Question => DescentPolicy::Sequential,
        }
    }

    /// Switch section type. Any pending case context is discarded.
    pub fn select(&mut self, section_type: SectionType) -> CaptureResult<()> {
        if let SectionType::Case { question_count } = section_type {
            if question_count < 1 {
                return Err(CaptureError::invalid_configuration(
                    "a case needs at least one linked question",
                ));
            }
            self.question_count = question_count;
        }

        if let Some(pending) = self.pending.take() {
            info!(
                group = %pending.case_group_id,
                captured = pending.questions_captured.len(),
                "Abandoned case group on section type change"
            );
        }
        self.mode = section_type.mode();
        self.phase = CasePhase::Paragraph;
        debug!(mode = ?self.mode, question_count = self.question_count, "Section type selected");
        Ok(())
    }

    /// Drop the pending case context without changing mode.
    pub fn cancel_case(&mut self) {
        self.pending = None;
        self.phase = CasePhase::Paragraph;
    }

    /// Turn a completed selection into exactly one section.
    ///
    /// All fallible work happens before any state changes, so an error leaves
    /// the controller exactly as it was.
    pub fn handle_selection(
        &mut self,
        selection: &CompletedSelection,
        request: CaptureRequest<'_>,
    ) -> CaptureResult<ControllerOutput> {
        let interval = selection.interval()?;

        match (self.mode, self.phase) {
            (SectionMode::Instruction, _) => {
                let image = request
                    .compositor
                    .compose_single(request.surface, interval, request.margins)?;
                Ok(self.finish(selection, interval, image, request, SectionRole::Instruction))
            }
            (SectionMode::Question, _) => {
                let image = request
                    .compositor
                    .compose_single(request.surface, interval, request.margins)?;
                let role = SectionRole::Question {
                    question_number: self.next_question_number,
                };
                self.next_question_number += 1;
                Ok(self.finish(selection, interval, image, request, role))
            }
            (SectionMode::Case, CasePhase::Paragraph) => {
                self.capture_paragraph(selection, interval, request)
            }
            (SectionMode::Case, CasePhase::Questions) => {
                self.capture_case_question(selection, interval, request)
            }
        }
    }

    fn capture_paragraph(
        &mut self,
        selection: &CompletedSelection,
        interval: Interval,
        request: CaptureRequest<'_>,
    ) -> CaptureResult<ControllerOutput> {
        let raster = crop(request.surface, interval, request.margins)?;
        let image = request.compositor.encode(&raster)?;
        let case_group_id = CaseGroupId::new();

        // The paragraph shares the number of the first question beneath it
        let role = SectionRole::Case {
            question_number: self.next_question_number,
            case_group_id,
        };

        self.pending = Some(PendingCaseContext {
            case_group_id,
            paragraph_raster: raster,
            paragraph_image: image.clone(),
            interval,
            questions_captured: Vec::with_capacity(self.question_count as usize),
        });
        self.phase = CasePhase::Questions;

        info!(
            group = %case_group_id,
            page = request.page_number,
            questions = self.question_count,
            "Captured case paragraph"
        );

        Ok(self.finish(selection, interval, image, request, role))
    }

    fn capture_case_question(
        &mut self,
        selection: &CompletedSelection,
        interval: Interval,
        request: CaptureRequest<'_>,
    ) -> CaptureResult<ControllerOutput> {
        let Some(pending) = self.pending.as_ref() else {
            return Err(CaptureError::invalid_configuration(
                "no case paragraph has been captured",
            ));
        };

        let image = request.compositor.compose_case_question(
            &pending.paragraph_raster,
            interval,
            request.surface,
            request.margins,
        )?;
        let case_group_id = pending.case_group_id;
        let question_number = self.next_question_number;
        self.next_question_number += 1;

        let mut case_completed = false;
        if let Some(pending) = self.pending.as_mut() {
            pending.questions_captured.push(CaseQuestionRecord {
                interval,
                question_number,
            });
            if pending.questions_captured.len() >= self.question_count as usize {
                case_completed = true;
            }
        }

        if case_completed {
            self.pending = None;
            self.phase = CasePhase::Paragraph;
            self.mode = SectionMode::Question;
            info!(group = %case_group_id, "Case group complete, switching to questions");
        }

        let role = SectionRole::CaseQuestion {
            question_number,
            case_group_id,
        };
        let mut output = self.finish(selection, interval, image, request, role);
        output.case_completed = case_completed;
        Ok(output)
    }

    fn finish(
        &self,
        selection: &CompletedSelection,
        interval: Interval,
        image: EncodedImage,
        request: CaptureRequest<'_>,
        role: SectionRole,
    ) -> ControllerOutput {
        ControllerOutput {
            section: Section {
                id: SectionId::new(),
                page_number: request.page_number,
                interval,
                capture_start_time: selection.start.captured_at,
                capture_end_time: selection.end.captured_at,
                created_at: Utc::now(),
                image,
                role,
            },
            case_completed: false,
        }
    }
}

impl Default for SectionTypeController {
    fn default() -> Self {
        Self::new()
    }
}
