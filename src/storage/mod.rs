pub mod postgres;
pub mod sqlite;
pub mod trait_def;

pub use postgres::PostgresTenantDirectory;
pub use sqlite::{SqliteTenantConnector, SqliteTenantDirectory, SqliteTenantStore};
pub use trait_def::{
    StorageError, StorageResult, TenantConnector, TenantDirectory, TenantStore,
};
