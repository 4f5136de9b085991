//! Agent services
//!
//! The scan-and-ingest pipeline: classification, fingerprinting, video
//! probing, traversal, worker permits, batching/upload, and the
//! orchestrator that ties them together.

pub mod classifier;
pub mod hasher;
pub mod orchestrator;
pub mod permits;
pub mod prober;
pub mod scanner;
pub mod uploader;

pub use classifier::Classifier;
pub use orchestrator::Orchestrator;
pub use permits::PermitPool;
pub use uploader::Uploader;
