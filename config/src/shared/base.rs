use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A field holds a value outside of its allowed range.
    #[error("invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
    /// No channel is configured.
    #[error("at least one channel must be configured")]
    NoChannels,
    /// Two channels share the same name.
    #[error("channel `{0}` is declared more than once")]
    DuplicateChannel(String),
    /// A channel points to a datasource that is not declared.
    #[error("channel `{channel}` references unknown datasource `{datasource}`")]
    UnknownDatasource { channel: String, datasource: String },
    /// A channel points to a search cluster that is not declared.
    #[error("channel `{channel}` references unknown cluster `{cluster}`")]
    UnknownCluster { channel: String, cluster: String },
    /// A channel declares neither an inline schema nor a schema file, or both.
    #[error("channel `{0}` must declare exactly one of `schema` or `schema_file`")]
    SchemaSource(String),
    /// The source time zone could not be parsed as a fixed UTC offset.
    #[error("channel `{channel}` has an invalid `source_time_zone` `{value}`")]
    InvalidTimeZone { channel: String, value: String },
    /// TLS is enabled but no trusted root certificates are provided.
    #[error("Invalid TLS config: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts,
    /// A join declares mismatched or empty column lists.
    #[error("table `{table}` in channel `{channel}` has an invalid join: {reason}")]
    InvalidJoin {
        channel: String,
        table: String,
        reason: String,
    },
}
