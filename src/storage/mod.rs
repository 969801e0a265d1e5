pub mod engine;
pub mod keyspace;
