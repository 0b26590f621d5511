pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::{Cli, Command};
pub use config::{load_dotenv, Settings, TomlOverrides};

pub use core::{
    database::PgWarehouse,
    eventbrite::EventbriteClient,
    loader::{EventbriteLoader, LoaderOptions},
};
pub use domain::model::{LoadSummary, Record};
pub use utils::error::{EtlError, Result};
