//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - `Deserialize` DTOs for the writes the API accepts
//! - Code enums (`status`) mapping to the seeded SMALLINT lookup tables

pub mod batch;
pub mod credit;
pub mod job;
pub mod status;
pub mod subject;
pub mod user;
pub mod video;
