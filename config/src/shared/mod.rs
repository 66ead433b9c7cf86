//! Shared configuration types for the replicator and the sync engine.

mod base;
mod batch;
mod channel;
mod cluster;
mod connection;
mod datasource;
mod replicator;
mod schema;
mod time_zone;

pub use base::ValidationError;
pub use batch::BatchConfig;
pub use channel::ChannelConfig;
pub use cluster::ClusterConfig;
pub use connection::{IntoConnectOptions, PgConnectionConfig, SOURCE_CONNECTION_OPTIONS, TlsConfig};
pub use datasource::{DatasourceConfig, SqlDialectConfig};
pub use replicator::ReplicatorConfig;
pub use schema::{
    FieldConfig, FieldType, JoinConfig, JoinKind, Relation, SchemaConfig, SortFieldConfig,
    SortOrder, TableConfig, TypeConfig, UpdateConfig,
};
pub use time_zone::parse_utc_offset;
