//! Storage is organized through [activity_storage::ActivityStore].
//! The basic idea is:
//!  - There is a single file per log, chosen on startup.
//!  - Activities are stored as text records with a pre-formatted duration and date.
//!  - The file is either a CSV table or an indented JSON array, see [activity_storage::StorageFormat].

pub mod activity_storage;
pub mod csv_storage;
pub mod entities;
pub mod error;
pub mod json_storage;
