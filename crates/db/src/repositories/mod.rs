//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods
//! that accept `&PgPool` as the first argument.

pub mod daily_stat_repo;
pub mod study_session_repo;

pub use daily_stat_repo::DailyStatRepo;
pub use study_session_repo::StudySessionRepo;
