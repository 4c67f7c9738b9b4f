//! Pairpost - scheduled image-pair publishing for Threads
//!
//! This library selects content per user, uploads media to Cloudinary,
//! creates and publishes post containers, and drives the whole thing for
//! many users on a daily schedule.

pub mod config;
pub mod content;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod media;
pub mod mock;
pub mod pipeline;
pub mod schedule;
pub mod scheduler;
pub mod threads;
pub mod types;
pub mod users;

// Re-export commonly used types
pub use config::Config;
pub use content::{ContentSource, FilesystemContent};
pub use coordinator::{Coordinator, Pacing, RunSummary};
pub use error::{PairpostError, Result};
pub use media::{CloudinaryStore, MediaStore};
pub use pipeline::{PostPipeline, ReadinessDelays};
pub use schedule::{ScheduleEntry, ScheduleStore};
pub use scheduler::Scheduler;
pub use threads::{ApiConnector, HttpConnector, PostingApi, ThreadsClient};
pub use types::{PostResult, PostStatus, User};
pub use users::UserStore;
