#![allow(
    clippy::cognitive_complexity,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod context;
pub mod fence;
pub mod handlers;
pub mod jobs;
pub mod macros;
pub mod worker;
