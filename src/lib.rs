//! Retention and purge engine for change-data-capture replication tables.
//!
//! The engine records captured changes (`data`), their routing to outgoing
//! batches (`data_event`), and the batches themselves (`outgoing_batch`).
//! This crate deletes the history of those tables once it is no longer needed
//! by replication, in bounded and independently committed batches.
//!
//! The entry point is [`purge::PurgeService`], which exposes the four purge
//! operations. It is assembled from:
//! - a [`parameters::ParameterService`] supplying retention windows and tuning,
//! - a [`db::PurgeRepo`] (one per database backend) that owns the connection
//!   pool and executes statements built by its [`db::Dialect`].

pub mod config;
pub mod db;
pub mod observability;
pub mod parameters;
pub mod purge;
pub mod retention;
