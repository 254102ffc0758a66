#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::struct_excessive_bools
)]
mod face;
mod job_outcome;
mod media;
mod object;
mod record_id;
mod worker_payload;

pub use face::*;
pub use job_outcome::*;
pub use media::*;
pub use object::*;
pub use record_id::*;
pub use worker_payload::*;
