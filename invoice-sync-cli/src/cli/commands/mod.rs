pub mod jobs;
pub mod sync;
