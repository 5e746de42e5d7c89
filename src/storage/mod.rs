pub mod database;
pub mod models;

pub use database::Database;
pub use models::{LinkStatus, Links, NewReport, Report};
