pub mod jobs;
mod utils;

pub use utils::*;
