pub mod database;
pub mod eventbrite;
pub mod loader;
pub mod sql;
pub mod transform;

pub use crate::domain::model::{Record, TableColumn};
pub use crate::domain::ports::{ConfigProvider, EventSource, Warehouse};
pub use crate::utils::error::Result;
