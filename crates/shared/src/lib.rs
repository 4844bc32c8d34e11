pub mod domain;
pub mod error;
pub mod pipeline;
pub mod protocol;
pub mod workflow;
