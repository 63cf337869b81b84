//! Filedrop Processing Library
//!
//! This crate provides intake validation (extension filter, capacity planning) and the
//! transform stages that turn raw selected files into upload-ready payloads.

pub mod transform;
pub mod validator;

// Re-export commonly used types
pub use transform::{
    InteractiveStage, PassthroughStage, TransformRequest, TransformStage, TransformStream,
    TransformedFile,
};
pub use validator::{plan_intake, truncate_to_capacity, ExtensionFilter, IntakePlan, ValidationError};
