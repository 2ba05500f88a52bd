mod dialect;
mod purge;

pub use dialect::PostgresDialect;
pub use purge::PostgresPurgeRepo;
