//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument. Methods suffixed `_on`
//! take a `&mut PgConnection` instead so they can be composed into a
//! caller-owned transaction; the `store` module owns those compositions.

pub mod batch_repo;
pub mod job_repo;
pub mod ledger_repo;
pub mod subject_repo;
pub mod user_repo;
pub mod video_repo;

pub use batch_repo::BatchRepo;
pub use job_repo::JobRepo;
pub use ledger_repo::{LedgerError, LedgerRepo};
pub use subject_repo::SubjectRepo;
pub use user_repo::UserRepo;
pub use video_repo::VideoRepo;
