pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod journaling;
pub mod quantity;
pub mod storage;
pub mod table;
pub mod ui;
pub mod workspace;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use error::{EditError, PersistError, ProjectionError};
pub use table::{Column, MaterialRecord, MaterialRow, MaterialTable};
pub use workspace::{Notice, NoticeLevel, Workspace};
