#![cfg(feature = "test-utils")]

use chrono::NaiveDateTime;
use etl::channel::{Channel, ChannelRunner, run_channel};
use etl::destination::memory::MemorySearchIndex;
use etl::query::{PARAM_LAST_REF_VALUE, PARAM_ROOT_IDS, SqlDialect};
use etl::source::memory::MemorySource;
use etl::state::CheckpointStore;
use etl::test_utils::fixtures::{
    CHECKPOINT_INDEX, LINE_ID, LINE_MODIFIED_DATE, ORDERS_INDEX, january, line_ids, order_row,
    orders_channel, seed_orders,
};
use etl::types::{Cell, SourceRow};
use telemetry::tracing::init_test_tracing;

fn channel() -> Channel {
    Channel::resolve(orders_channel(2), SqlDialect::default(), 50_000).unwrap()
}

fn checkpoints() -> CheckpointStore {
    CheckpointStore::new(CHECKPOINT_INDEX, "channels_")
}

fn watermark(day: u32) -> Cell {
    Cell::TimestampTz(january(day, 10).and_utc())
}

/// Sets `modifiedDate` on the source rows of `line_id`.
fn touch_line(line_id: i64, modified: NaiveDateTime) -> impl FnMut(&mut SourceRow) -> bool {
    move |row| {
        if row.get(LINE_ID) != Some(&Cell::I64(line_id)) {
            return false;
        }
        row.insert(LINE_MODIFIED_DATE, modified);
        true
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn changed_child_reindexes_its_whole_root() {
    init_test_tracing();

    let source = MemorySource::with_rows(seed_orders());
    let index = MemorySearchIndex::new();
    let channel = channel();
    let checkpoints = checkpoints();

    run_channel(&channel, &source, &index, &checkpoints)
        .await
        .unwrap();

    let touched = source.update_rows(touch_line(5, january(5, 12))).await;
    assert_eq!(touched, 1);
    source.clear_executed().await;

    let runner = ChannelRunner::new(&channel, &source, &index, &checkpoints);
    assert_eq!(runner.detect_updates(&watermark(3)).await.unwrap(), (1, 0));

    let order = index.document(ORDERS_INDEX, "2").await.unwrap();
    assert_eq!(line_ids(&order), vec![5, 6]);
    assert_eq!(order["lines"][0]["modifiedDate"], "2024-01-05T12:00:00.000Z");
    assert_eq!(order["lines"][1]["modifiedDate"], serde_json::Value::Null);
    assert_eq!(order["channel_"], "orders");

    let refetch = source
        .executed()
        .await
        .into_iter()
        .find(|query| query.params.list(PARAM_ROOT_IDS).is_some())
        .unwrap();
    assert_eq!(
        refetch.params.list(PARAM_ROOT_IDS),
        Some([Cell::I64(2)].as_slice())
    );

    // The index now holds the change, so the same rows no longer count as updated.
    assert_eq!(runner.detect_updates(&watermark(3)).await.unwrap(), (0, 0));
}

#[tokio::test(flavor = "multi_thread")]
async fn changed_roots_are_refetched_a_page_at_a_time() {
    init_test_tracing();

    let source = MemorySource::with_rows(seed_orders());
    let index = MemorySearchIndex::new();
    let channel = channel();
    let checkpoints = checkpoints();

    run_channel(&channel, &source, &index, &checkpoints)
        .await
        .unwrap();

    for line_id in [4, 5, 7] {
        source
            .update_rows(touch_line(line_id, january(5, 12)))
            .await;
    }
    source.clear_executed().await;

    let runner = ChannelRunner::new(&channel, &source, &index, &checkpoints);
    assert_eq!(runner.detect_updates(&watermark(3)).await.unwrap(), (3, 0));

    let refetched: Vec<Vec<Cell>> = source
        .executed()
        .await
        .into_iter()
        .filter_map(|query| query.params.list(PARAM_ROOT_IDS).map(<[Cell]>::to_vec))
        .collect();
    assert_eq!(
        refetched,
        vec![
            vec![Cell::I64(1), Cell::I64(2)],
            vec![Cell::I64(3)],
        ]
    );

    for id in ["1", "2", "3"] {
        let order = index.document(ORDERS_INDEX, id).await.unwrap();
        assert!(
            order["lines"]
                .as_array()
                .unwrap()
                .iter()
                .any(|line| line["modifiedDate"] == "2024-01-05T12:00:00.000Z")
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn changes_past_the_watermark_are_left_to_the_main_fetch() {
    init_test_tracing();

    let source = MemorySource::with_rows(seed_orders());
    let index = MemorySearchIndex::new();
    let channel = channel();
    let checkpoints = checkpoints();

    run_channel(&channel, &source, &index, &checkpoints)
        .await
        .unwrap();

    source
        .insert_rows([order_row(8, january(9, 10), "Dee", Some((9, "SKU-9", 1)))])
        .await;
    source.update_rows(touch_line(9, january(9, 11))).await;
    source.clear_executed().await;

    let runner = ChannelRunner::new(&channel, &source, &index, &checkpoints);
    assert_eq!(runner.detect_updates(&watermark(3)).await.unwrap(), (0, 0));
    assert!(index.document(ORDERS_INDEX, "8").await.is_none());

    for query in source.executed().await {
        assert!(query.statement.sql.contains("<= :last_ref_value"));
        assert_eq!(
            query.params.scalar(PARAM_LAST_REF_VALUE),
            Some(&Cell::Timestamp(january(3, 10)))
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn channel_run_reports_updated_documents() {
    init_test_tracing();

    let source = MemorySource::with_rows(seed_orders());
    let index = MemorySearchIndex::new();
    let channel = channel();
    let checkpoints = checkpoints();

    run_channel(&channel, &source, &index, &checkpoints)
        .await
        .unwrap();
    source.update_rows(touch_line(4, january(6, 8))).await;

    let summary = run_channel(&channel, &source, &index, &checkpoints)
        .await
        .unwrap();

    assert_eq!(summary.updated_count, 1);
    assert_eq!(summary.inserted_count, 1);
    let order = index.document(ORDERS_INDEX, "1").await.unwrap();
    assert_eq!(order["lines"][0]["modifiedDate"], "2024-01-06T08:00:00.000Z");
}

#[tokio::test(flavor = "multi_thread")]
async fn first_run_skips_update_detection() {
    init_test_tracing();

    let source = MemorySource::new();
    let index = MemorySearchIndex::new();

    run_channel(&channel(), &source, &index, &checkpoints())
        .await
        .unwrap();

    let executed = source.executed().await;
    assert_eq!(executed.len(), 1);
    assert!(executed[0].params.list(PARAM_ROOT_IDS).is_none());
}
