//! JSON capture scripts: a recorded sequence of user actions replayed through
//! the [`CaptureService`].
//!
//! ```json
//! {
//!   "actions": [
//!     { "action": "section_type", "type": "question" },
//!     { "action": "click", "y": 40 },
//!     { "action": "click", "y": 180 },
//!     { "action": "case", "questions": 2 },
//!     { "action": "drag", "from": 200, "to": 320 }
//!   ]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::collection::RemoveOutcome;
use crate::config::SectionTypeSetting;
use crate::controller::SectionType;
use crate::error::{CaptureError, CaptureResult};
use crate::geometry::Margins;
use crate::section::SectionSummary;
use crate::selection::CapturePoint;
use crate::service::{CaptureService, PageView};
use crate::session::CaptureOutcome;

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureScript {
    pub actions: Vec<ScriptAction>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScriptAction {
    Page {
        number: u32,
    },
    Zoom {
        scale: f32,
    },
    ZoomIn,
    ZoomOut,
    NextPage,
    PreviousPage,
    SectionType {
        #[serde(rename = "type")]
        section_type: SectionTypeSetting,
        #[serde(default)]
        questions: u32,
    },
    Case {
        questions: u32,
    },
    Margins {
        #[serde(default)]
        left: u32,
        #[serde(default)]
        right: u32,
    },
    Capture {
        active: bool,
    },
    Click {
        y: u32,
    },
    Drag {
        from: u32,
        to: u32,
    },
    Cancel,
    RemovePoint {
        index: usize,
    },
    RemoveSection {
        index: usize,
    },
}

impl ScriptAction {
    pub fn name(&self) -> &'static str {
        match self {
            ScriptAction::Page { .. } => "page",
            ScriptAction::Zoom { .. } => "zoom",
            ScriptAction::ZoomIn => "zoom_in",
            ScriptAction::ZoomOut => "zoom_out",
            ScriptAction::NextPage => "next_page",
            ScriptAction::PreviousPage => "previous_page",
            ScriptAction::SectionType { .. } => "section_type",
            ScriptAction::Case { .. } => "case",
            ScriptAction::Margins { .. } => "margins",
            ScriptAction::Capture { .. } => "capture",
            ScriptAction::Click { .. } => "click",
            ScriptAction::Drag { .. } => "drag",
            ScriptAction::Cancel => "cancel",
            ScriptAction::RemovePoint { .. } => "remove_point",
            ScriptAction::RemoveSection { .. } => "remove_section",
        }
    }
}

/// Result of one replayed action
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StepResult {
    Page { page: Option<PageView> },
    Pointer { outcome: CaptureOutcome },
    PointRemoved { point: Option<CapturePoint> },
    SectionRemoved { outcome: RemoveOutcome },
    Done,
    Failed { code: &'static str, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub action: &'static str,
    #[serde(flatten)]
    pub result: StepResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptReport {
    pub document: Option<String>,
    pub steps: Vec<StepReport>,
    pub sections: Vec<SectionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive: Option<String>,
}

impl ScriptReport {
    pub fn failures(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.result, StepResult::Failed { .. }))
            .count()
    }
}

pub fn parse_script(source: &str) -> CaptureResult<CaptureScript> {
    serde_json::from_str(source).map_err(|e| CaptureError::Script {
        message: e.to_string(),
    })
}

pub async fn load_script(path: &Path) -> CaptureResult<CaptureScript> {
    let source = tokio::fs::read_to_string(path).await?;
    parse_script(&source)
}

/// Replay every action in order.
///
/// Recoverable failures are recorded in the report and replay continues, the
/// same way the interactive surface would show an error and keep its state.
/// Anything else aborts the replay.
pub async fn run_script(
    service: &CaptureService,
    script: &CaptureScript,
) -> CaptureResult<ScriptReport> {
    let mut steps = Vec::with_capacity(script.actions.len());

    for (index, action) in script.actions.iter().enumerate() {
        debug!(index, action = action.name(), "Replaying action");
        let result = match apply(service, action).await {
            Ok(result) => result,
            Err(e) if e.is_recoverable() => {
                warn!(index, action = action.name(), error = %e, "Action failed");
                StepResult::Failed {
                    code: e.error_code(),
                    message: e.to_string(),
                }
            }
            Err(e) => return Err(e),
        };
        steps.push(StepReport {
            index,
            action: action.name(),
            result,
        });
    }

    Ok(ScriptReport {
        document: service.document_name(),
        steps,
        sections: service.sections().await,
        archive: None,
    })
}

async fn apply(service: &CaptureService, action: &ScriptAction) -> CaptureResult<StepResult> {
    let result = match *action {
        ScriptAction::Page { number } => StepResult::Page {
            page: service.show_page(number).await?,
        },
        ScriptAction::Zoom { scale } => StepResult::Page {
            page: service.set_scale(scale).await?,
        },
        ScriptAction::ZoomIn => StepResult::Page {
            page: service.zoom_in().await?,
        },
        ScriptAction::ZoomOut => StepResult::Page {
            page: service.zoom_out().await?,
        },
        ScriptAction::NextPage => StepResult::Page {
            page: service.next_page().await?,
        },
        ScriptAction::PreviousPage => StepResult::Page {
            page: service.previous_page().await?,
        },
        ScriptAction::SectionType {
            section_type,
            questions,
        } => {
            let section_type = match section_type {
                SectionTypeSetting::Instruction => SectionType::Instruction,
                SectionTypeSetting::Question => SectionType::Question,
                SectionTypeSetting::Case => SectionType::Case {
                    question_count: questions,
                },
            };
            service.select_section_type(section_type).await?;
            StepResult::Done
        }
        ScriptAction::Case { questions } => {
            service
                .select_section_type(SectionType::Case {
                    question_count: questions,
                })
                .await?;
            StepResult::Done
        }
        ScriptAction::Margins { left, right } => {
            service.set_margins(Margins::new(left, right)).await?;
            StepResult::Done
        }
        ScriptAction::Capture { active } => {
            service.set_capture_active(active).await;
            StepResult::Done
        }
        ScriptAction::Click { y } => StepResult::Pointer {
            outcome: service.click(y).await?,
        },
        ScriptAction::Drag { from, to } => StepResult::Pointer {
            outcome: service.drag(from, to).await?,
        },
        ScriptAction::Cancel => {
            service.cancel_selection().await;
            StepResult::Done
        }
        ScriptAction::RemovePoint { index } => StepResult::PointRemoved {
            point: service.remove_point(index).await,
        },
        ScriptAction::RemoveSection { index } => StepResult::SectionRemoved {
            outcome: service.remove_section_at(index).await,
        },
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::document::testing::GradientLoader;
    use crate::section::SectionKind;
    use std::sync::Arc;

    async fn service() -> CaptureService {
        let loader = Arc::new(GradientLoader {
            pages: 2,
            width: 200,
            height: 400,
        });
        let service = CaptureService::new(AppConfig::default(), loader, None).unwrap();
        service
            .open_document("exam.pdf", b"%PDF-1.4".to_vec())
            .await
            .unwrap();
        service
    }

    #[test]
    fn test_parse_actions() {
        let script = parse_script(
            r#"{"actions": [
                {"action": "section_type", "type": "case", "questions": 2},
                {"action": "click", "y": 10},
                {"action": "drag", "from": 30, "to": 90},
                {"action": "next_page"},
                {"action": "margins", "left": 15},
                {"action": "remove_section", "index": 0}
            ]}"#,
        )
        .unwrap();

        assert_eq!(
            script.actions,
            vec![
                ScriptAction::SectionType {
                    section_type: SectionTypeSetting::Case,
                    questions: 2
                },
                ScriptAction::Click { y: 10 },
                ScriptAction::Drag { from: 30, to: 90 },
                ScriptAction::NextPage,
                ScriptAction::Margins { left: 15, right: 0 },
                ScriptAction::RemoveSection { index: 0 },
            ]
        );
    }

    #[test]
    fn test_unknown_action_rejected() {
        let err = parse_script(r#"{"actions": [{"action": "rotate"}]}"#).unwrap_err();
        assert!(matches!(err, CaptureError::Script { .. }));
    }

    #[tokio::test]
    async fn test_replay_case_workflow() {
        let service = service().await;
        let script = parse_script(
            r#"{"actions": [
                {"action": "section_type", "type": "question"},
                {"action": "click", "y": 10},
                {"action": "click", "y": 60},
                {"action": "case", "questions": 2},
                {"action": "click", "y": 100},
                {"action": "click", "y": 160},
                {"action": "drag", "from": 300, "to": 350},
                {"action": "click", "y": 20},
                {"action": "click", "y": 80}
            ]}"#,
        )
        .unwrap();

        let report = run_script(&service, &script).await.unwrap();
        assert_eq!(report.failures(), 0);
        assert_eq!(report.document.as_deref(), Some("exam.pdf"));

        let kinds: Vec<_> = report.sections.iter().map(|s| s.role.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                SectionKind::Question,
                SectionKind::Case,
                SectionKind::CaseQuestion,
                SectionKind::CaseQuestion,
            ]
        );
        let numbers: Vec<_> = report
            .sections
            .iter()
            .map(|s| s.role.question_number())
            .collect();
        assert_eq!(numbers, vec![Some(1), Some(2), Some(2), Some(3)]);
    }

    #[tokio::test]
    async fn test_recoverable_failures_are_recorded() {
        let service = service().await;
        let script = parse_script(
            r#"{"actions": [
                {"action": "case", "questions": 0},
                {"action": "page", "number": 7},
                {"action": "section_type", "type": "instruction"},
                {"action": "click", "y": 10},
                {"action": "click", "y": 50}
            ]}"#,
        )
        .unwrap();

        let report = run_script(&service, &script).await.unwrap();
        assert_eq!(report.failures(), 2);
        assert!(matches!(
            report.steps[0].result,
            StepResult::Failed {
                code: "invalid_configuration",
                ..
            }
        ));
        assert!(matches!(
            report.steps[1].result,
            StepResult::Failed {
                code: "page_out_of_range",
                ..
            }
        ));
        assert_eq!(report.sections.len(), 1);
        assert_eq!(report.sections[0].role.kind(), SectionKind::Instruction);
    }

    #[test]
    fn test_report_serializes_step_results() {
        let report = ScriptReport {
            document: Some("exam.pdf".to_string()),
            steps: vec![StepReport {
                index: 0,
                action: "capture",
                result: StepResult::Done,
            }],
            sections: Vec::new(),
            archive: None,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["steps"][0]["action"], "capture");
        assert_eq!(json["steps"][0]["result"], "done");
        assert!(json.get("archive").is_none());
    }
}
