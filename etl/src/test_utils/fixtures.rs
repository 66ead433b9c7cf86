use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use config::shared::{
    BatchConfig, ChannelConfig, ClusterConfig, DatasourceConfig, FieldConfig, FieldType,
    JoinConfig, JoinKind, PgConnectionConfig, Relation, ReplicatorConfig, SchemaConfig,
    SqlDialectConfig, TableConfig, TlsConfig, TypeConfig, UpdateConfig,
};
use serde_json::Value;

use crate::destination::memory::MemorySearchIndex;
use crate::error::EtlResult;
use crate::types::{Cell, SourceRow};

pub const DATASOURCE: &str = "erp";
pub const CLUSTER: &str = "main";
pub const ORDERS_CHANNEL: &str = "orders";
pub const ORDERS_INDEX: &str = "orders";
pub const CHECKPOINT_INDEX: &str = "etlconfig_";

pub const ORDER_ID: &str = "orders___orderId";
pub const PLACED_DATE: &str = "orders___placedDate";
pub const CUSTOMER_NAME: &str = "orders___customerName";
pub const LINE_ID: &str = "orders___lines___lineId";
pub const LINE_SKU: &str = "orders___lines___sku";
pub const LINE_QUANTITY: &str = "orders___lines___quantity";
pub const LINE_MODIFIED_DATE: &str = "orders___lines___modifiedDate";

pub fn field(name: &str, sql_expression: &str, field_type: FieldType) -> FieldConfig {
    FieldConfig {
        name: name.to_string(),
        sql_expression: sql_expression.to_string(),
        field_type,
        mappings: None,
    }
}

pub fn root_table(name: &str, alias: &str) -> TableConfig {
    TableConfig {
        name: name.to_string(),
        alias: alias.to_string(),
        primary_key_fields: vec![],
        join: None,
    }
}

/// A type with no fields, tables or update rules.
pub fn type_config(name: &str, relation: Option<Relation>, id_field: &str) -> TypeConfig {
    TypeConfig {
        name: name.to_string(),
        relation,
        id_field: id_field.to_string(),
        ref_field: None,
        sort_fields: vec![],
        where_filters: vec![],
        tables: vec![],
        fields: vec![],
        updates: vec![],
    }
}

/// Orders keyed by `orderId` and watermarked by `placedDate`, with order lines joined one to
/// many. Lines carry a `lines_modified` update rule on `modifiedDate`.
pub fn orders_schema() -> SchemaConfig {
    let mut orders = type_config("orders", None, "orderId");
    orders.ref_field = Some("placedDate".to_string());
    orders.tables = vec![root_table("orders", "o")];
    orders.fields = vec![
        field("orderId", "o.id", FieldType::Long),
        field("placedDate", "o.placed_date", FieldType::DateTime),
        field("customerName", "o.customer_name", FieldType::String),
    ];

    let mut lines = type_config("orders.lines", Some(Relation::Many), "lineId");
    lines.tables = vec![TableConfig {
        name: "order_lines".to_string(),
        alias: "l".to_string(),
        primary_key_fields: vec!["id".to_string()],
        join: Some(JoinConfig {
            kind: JoinKind::LeftOuter,
            parent_columns: vec!["o.id".to_string()],
            child_columns: vec!["l.order_id".to_string()],
        }),
    }];
    lines.fields = vec![
        field("lineId", "l.id", FieldType::Long),
        field("sku", "l.sku", FieldType::String),
        field("quantity", "l.quantity", FieldType::Int),
        field("modifiedDate", "l.modified_date", FieldType::DateTime),
    ];
    lines.updates = vec![UpdateConfig {
        name: "lines_modified".to_string(),
        ref_field: "modifiedDate".to_string(),
        where_filters: vec![],
    }];

    SchemaConfig {
        types: vec![orders, lines],
    }
}

pub fn orders_channel(batch_size: i64) -> ChannelConfig {
    ChannelConfig {
        name: ORDERS_CHANNEL.to_string(),
        datasource: DATASOURCE.to_string(),
        cluster: CLUSTER.to_string(),
        index: ORDERS_INDEX.to_string(),
        doc_type: ChannelConfig::DEFAULT_DOC_TYPE.to_string(),
        batch_size,
        max_records: ChannelConfig::DEFAULT_MAX_RECORDS,
        source_time_zone: None,
        schema: Some(orders_schema()),
        schema_file: None,
    }
}

pub fn replicator_config(channels: Vec<ChannelConfig>) -> ReplicatorConfig {
    let mut datasources = BTreeMap::new();
    datasources.insert(
        DATASOURCE.to_string(),
        DatasourceConfig {
            connection: PgConnectionConfig {
                host: "localhost".to_string(),
                port: 5432,
                name: "erp".to_string(),
                username: "postgres".to_string(),
                password: None,
                tls: TlsConfig::disabled(),
            },
            dialect: SqlDialectConfig::default(),
        },
    );

    let mut clusters = BTreeMap::new();
    clusters.insert(
        CLUSTER.to_string(),
        ClusterConfig {
            url: "http://localhost:9200".to_string(),
            username: None,
            password: None,
            timeout_secs: ClusterConfig::DEFAULT_TIMEOUT_SECS,
        },
    );

    ReplicatorConfig {
        run_interval_secs: ReplicatorConfig::DEFAULT_RUN_INTERVAL_SECS,
        run_once: true,
        batch: BatchConfig::default(),
        datasources,
        clusters,
        checkpoint_index: CHECKPOINT_INDEX.to_string(),
        checkpoint_doc_type: ReplicatorConfig::DEFAULT_CHECKPOINT_DOC_TYPE.to_string(),
        channels,
    }
}

/// Connector handing out clones of `index` for every cluster.
pub fn memory_cluster(
    index: MemorySearchIndex,
) -> impl Fn(&str, &ClusterConfig) -> EtlResult<MemorySearchIndex> {
    move |_, _| Ok(index.clone())
}

/// Midnight-based timestamp on `day` of January 2024, at `hour`.
pub fn january(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, day)
        .and_then(|date| date.and_hms_opt(hour, 0, 0))
        .unwrap_or_default()
}

/// One joined row of the orders channel, as the source returns it.
///
/// `line` is `(lineId, sku, quantity)`; `None` stands for an order without lines.
pub fn order_row(
    order_id: i64,
    placed_date: NaiveDateTime,
    customer_name: &str,
    line: Option<(i64, &str, i32)>,
) -> SourceRow {
    let row = SourceRow::new()
        .with(ORDER_ID, order_id)
        .with(PLACED_DATE, placed_date)
        .with(CUSTOMER_NAME, customer_name)
        .with(LINE_MODIFIED_DATE, Cell::Null);

    match line {
        Some((line_id, sku, quantity)) => row
            .with(LINE_ID, line_id)
            .with(LINE_SKU, sku)
            .with(LINE_QUANTITY, quantity),
        None => row
            .with(LINE_ID, Cell::Null)
            .with(LINE_SKU, Cell::Null)
            .with(LINE_QUANTITY, Cell::Null),
    }
}

/// Three orders placed on consecutive days: order 1 with line 4, order 2 with lines 5 and 6,
/// order 3 with line 7.
pub fn seed_orders() -> Vec<SourceRow> {
    vec![
        order_row(1, january(1, 10), "Ada", Some((4, "SKU-4", 1))),
        order_row(2, january(2, 10), "Bob", Some((5, "SKU-5", 2))),
        order_row(2, january(2, 10), "Bob", Some((6, "SKU-6", 1))),
        order_row(3, january(3, 10), "Cy", Some((7, "SKU-7", 4))),
    ]
}

/// Returns the `lineId`s listed under `lines` of an indexed order document.
pub fn line_ids(document: &Value) -> Vec<i64> {
    document["lines"]
        .as_array()
        .map(|lines| {
            lines
                .iter()
                .filter_map(|line| line["lineId"].as_i64())
                .collect()
        })
        .unwrap_or_default()
}
