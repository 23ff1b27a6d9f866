//! The resilient BWS client and the results it returns.

pub mod bws_client;
pub mod models;

pub use bws_client::{BwsClient, PROBE_CLASS_ID};
pub use models::{
    ClassId, EnrollmentAction, EnrollmentResult, TemplateStatus, Thumbnail, VerificationOutcome,
};
