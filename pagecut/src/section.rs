//! Captured section records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::compositor::EncodedImage;
use crate::geometry::Interval;

/// Unique identifier of a captured section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionId(Uuid);

impl SectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Links a case paragraph to the questions captured beneath it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseGroupId(Uuid);

impl CaseGroupId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CaseGroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CaseGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SectionKind {
    Instruction,
    Question,
    Case,
    CaseQuestion,
}

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Instruction => "instruction",
            SectionKind::Question => "question",
            SectionKind::Case => "case",
            SectionKind::CaseQuestion => "case-question",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a section is, with the numbering and linkage each kind carries.
///
/// Instructions never carry a question number; case paragraphs and case
/// questions always carry their group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SectionRole {
    Instruction,
    Question {
        question_number: u32,
    },
    Case {
        question_number: u32,
        case_group_id: CaseGroupId,
    },
    CaseQuestion {
        question_number: u32,
        case_group_id: CaseGroupId,
    },
}

impl SectionRole {
    pub fn kind(&self) -> SectionKind {
        match self {
            SectionRole::Instruction => SectionKind::Instruction,
            SectionRole::Question { .. } => SectionKind::Question,
            SectionRole::Case { .. } => SectionKind::Case,
            SectionRole::CaseQuestion { .. } => SectionKind::CaseQuestion,
        }
    }

    pub fn question_number(&self) -> Option<u32> {
        match self {
            SectionRole::Instruction => None,
            SectionRole::Question { question_number }
            | SectionRole::Case {
                question_number, ..
            }
            | SectionRole::CaseQuestion {
                question_number, ..
            } => Some(*question_number),
        }
    }

    pub fn case_group_id(&self) -> Option<CaseGroupId> {
        match self {
            SectionRole::Case { case_group_id, .. }
            | SectionRole::CaseQuestion { case_group_id, .. } => Some(*case_group_id),
            _ => None,
        }
    }
}

/// One labeled, rasterized region of a page. Immutable once created.
#[derive(Debug, Clone)]
pub struct Section {
    pub id: SectionId,
    pub page_number: u32,
    pub interval: Interval,
    pub capture_start_time: DateTime<Utc>,
    pub capture_end_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub image: EncodedImage,
    pub role: SectionRole,
}

impl Section {
    pub fn kind(&self) -> SectionKind {
        self.role.kind()
    }

    pub fn question_number(&self) -> Option<u32> {
        self.role.question_number()
    }

    pub fn case_group_id(&self) -> Option<CaseGroupId> {
        self.role.case_group_id()
    }

    /// Human-readable label shown next to the section preview
    pub fn label(&self) -> String {
        match self.role {
            SectionRole::Instruction => "Instructions".to_string(),
            SectionRole::Question { question_number } => format!("Question {}", question_number),
            SectionRole::Case {
                question_number, ..
            } => format!("Case {}", question_number),
            SectionRole::CaseQuestion {
                question_number, ..
            } => format!("Case {} question", question_number),
        }
    }

    pub fn summary(&self) -> SectionSummary {
        SectionSummary {
            id: self.id,
            label: self.label(),
            page_number: self.page_number,
            interval: self.interval,
            role: self.role,
            width: self.image.width,
            height: self.image.height,
            created_at: self.created_at,
        }
    }
}

/// Serializable view of a section without its image bytes
#[derive(Debug, Clone, Serialize)]
pub struct SectionSummary {
    pub id: SectionId,
    pub label: String,
    pub page_number: u32,
    pub interval: Interval,
    #[serde(flatten)]
    pub role: SectionRole,
    pub width: u32,
    pub height: u32,
    pub created_at: DateTime<Utc>,
}
