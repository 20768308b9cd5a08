pub mod history;
pub mod job;
pub mod media;
