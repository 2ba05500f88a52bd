mod dialect;
mod purge;

pub use dialect::SqliteDialect;
pub use purge::SqlitePurgeRepo;
