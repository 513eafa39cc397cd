mod error;
mod storage;

pub use error::StorageError;
pub use storage::{SqliteWatermarkStore, WatermarkStore};
