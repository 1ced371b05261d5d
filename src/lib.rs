//! Question and grading tickets between students and a teacher, served from
//! a cache kept in sync with a remote realtime database or, without one, with
//! a local SQLite file.

pub mod config;
pub mod db;
pub mod error;
pub mod gate;
pub mod model;
pub mod remote;
pub mod rules;
pub mod session;
pub mod students;
pub mod sync;
pub mod tickets;

pub use error::{Error, Result};
