//! Region capture and composition for rendered document pages.
//!
//! A page is rendered to a raster, the user marks vertical intervals on it, and
//! each interval becomes a labeled [`section::Section`] image. Case paragraphs
//! are stacked above each of their linked questions. Sections are exported as
//! one archive of JPEG files.

pub mod collection;
pub mod compositor;
pub mod config;
pub mod controller;
pub mod db;
pub mod document;
pub mod error;
pub mod export;
pub mod geometry;
pub mod render;
pub mod script;
pub mod section;
pub mod selection;
pub mod service;
pub mod session;

pub use error::{CaptureError, CaptureResult};
pub use service::CaptureService;
pub use session::{CaptureOutcome, CaptureSession};
