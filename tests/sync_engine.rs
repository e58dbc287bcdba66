mod common;

use chain_mirror::chain::ChainSource;
use chain_mirror::error::SyncError;
use chain_mirror::store::{LedgerStore, SqliteStore};
use chain_mirror::sync::{SyncConfig, SyncEngine, SyncStatus};
use common::{MockChain, addr, block_hash, failing_store, memory_store, tx_hash};
use std::sync::Arc;
use std::time::Duration;

fn engine(chain: &Arc<MockChain>, store: &Arc<SqliteStore>, config: SyncConfig) -> SyncEngine {
    let chain: Arc<dyn ChainSource> = chain.clone();
    let store: Arc<dyn LedgerStore> = store.clone();
    SyncEngine::new(chain, store, config)
}

#[tokio::test]
async fn sync_appends_new_blocks_after_checkpoint() {
    let chain = Arc::new(MockChain::with_tx_counts(&[2; 100]));
    let store = memory_store();
    let engine = engine(&chain, &store, SyncConfig::default());

    let first = engine.run_sync().await.unwrap();
    assert_eq!(first.status, SyncStatus::Completed);
    assert_eq!(first.checkpoint, Some(99));

    for _ in 100..=105 {
        chain.push_block(vec![(addr(0xaa), Some(addr(0xbb))); 2]);
    }

    let report = engine.run_sync().await.unwrap();
    assert_eq!(report.status, SyncStatus::Completed);
    assert_eq!(report.from_block, Some(100));
    assert_eq!(report.to_block, Some(105));
    assert_eq!(report.blocks_written, 6);
    assert_eq!(report.transactions_written, 12);
    assert_eq!(report.checkpoint, Some(105));

    assert_eq!(store.max_block_number().await.unwrap(), Some(105));
    assert_eq!(store.count_blocks().await.unwrap(), 106);
    assert_eq!(store.count_transactions().await.unwrap(), 212);
    assert_eq!(store.transactions_in_block(103).await.unwrap().len(), 2);
}

#[tokio::test]
async fn second_run_without_new_blocks_writes_nothing() {
    let chain = Arc::new(MockChain::with_tx_counts(&[1, 3, 0, 2]));
    let store = memory_store();
    let engine = engine(&chain, &store, SyncConfig::default());

    let first = engine.run_sync().await.unwrap();
    assert_eq!(first.blocks_written, 4);
    assert_eq!(first.transactions_written, 6);

    let second = engine.run_sync().await.unwrap();
    assert_eq!(second.status, SyncStatus::UpToDate);
    assert_eq!(second.blocks_written, 0);
    assert_eq!(second.transactions_written, 0);
    assert_eq!(second.checkpoint, Some(3));
    assert_eq!(store.count_transactions().await.unwrap(), 6);
}

#[tokio::test]
async fn re_persisting_a_block_is_a_no_op() {
    let chain = Arc::new(MockChain::with_tx_counts(&[2, 2]));
    let store = memory_store();
    engine(&chain, &store, SyncConfig::default())
        .run_sync()
        .await
        .unwrap();

    let block = store.block_by_number(1).await.unwrap().unwrap();
    let transactions = store.transactions_in_block(1).await.unwrap();
    let outcome = store.persist_block(block, transactions).await.unwrap();

    assert_eq!(outcome.blocks_written, 0);
    assert_eq!(outcome.transactions_written, 0);
    assert_eq!(store.count_blocks().await.unwrap(), 2);
    assert_eq!(store.count_transactions().await.unwrap(), 4);
}

#[tokio::test]
async fn empty_store_starts_at_genesis_block() {
    let chain = Arc::new(MockChain::with_empty_blocks(20));
    let store = memory_store();
    let config = SyncConfig {
        genesis_block: 15,
        ..SyncConfig::default()
    };

    let report = engine(&chain, &store, config).run_sync().await.unwrap();
    assert_eq!(report.from_block, Some(15));
    assert_eq!(report.blocks_written, 5);
    assert_eq!(store.count_blocks().await.unwrap(), 5);
}

#[tokio::test]
async fn missing_block_stops_run_without_gaps() {
    let chain = Arc::new(MockChain::with_tx_counts(&[1; 10]));
    chain.hide_block(6);
    let store = memory_store();
    let engine = engine(&chain, &store, SyncConfig::default());

    let report = engine.run_sync().await.unwrap();
    assert_eq!(report.status, SyncStatus::Partial);
    assert_eq!(report.checkpoint, Some(5));
    assert_eq!(report.stopped_before, Some(6));
    let shortfall = report.shortfall().unwrap();
    assert!(shortfall.contains("block 6"));
    assert_eq!(store.max_block_number().await.unwrap(), Some(5));
    assert!(store.block_by_number(7).await.unwrap().is_none());

    chain.reveal_block(6);
    let resumed = engine.run_sync().await.unwrap();
    assert_eq!(resumed.status, SyncStatus::Completed);
    assert!(resumed.shortfall().is_none());
    assert_eq!(resumed.from_block, Some(6));
    assert_eq!(resumed.checkpoint, Some(9));
    assert_eq!(store.count_blocks().await.unwrap(), 10);
}

#[tokio::test]
async fn checkpoint_never_moves_backwards_on_failure() {
    let chain = Arc::new(MockChain::with_tx_counts(&[1; 5]));
    let store = memory_store();
    let engine = engine(&chain, &store, SyncConfig::default());
    engine.run_sync().await.unwrap();

    chain.push_empty_blocks(3);
    chain.set_failing(true);
    let err = engine.run_sync().await.unwrap_err();
    assert!(matches!(err, SyncError::Head(_)));
    assert_eq!(store.max_block_number().await.unwrap(), Some(4));

    chain.set_failing(false);
    let report = engine.run_sync().await.unwrap();
    assert_eq!(report.checkpoint, Some(7));
}

#[tokio::test]
async fn max_blocks_per_run_caps_progress() {
    let chain = Arc::new(MockChain::with_empty_blocks(25));
    let store = memory_store();
    let config = SyncConfig {
        max_blocks_per_run: Some(10),
        ..SyncConfig::default()
    };
    let engine = engine(&chain, &store, config);

    assert_eq!(engine.run_sync().await.unwrap().checkpoint, Some(9));
    assert_eq!(engine.run_sync().await.unwrap().checkpoint, Some(19));
    let last = engine.run_sync().await.unwrap();
    assert_eq!(last.to_block, Some(24));
    assert_eq!(last.checkpoint, Some(24));
}

#[tokio::test]
async fn overlapping_triggers_are_coalesced() {
    let chain = Arc::new(MockChain::with_tx_counts(&[1; 8]));
    chain.set_delay(Duration::from_millis(50));
    let store = memory_store();
    let engine = Arc::new(engine(&chain, &store, SyncConfig::default()));

    let running = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run_sync().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(engine.is_running());

    let skipped = engine.run_sync().await.unwrap();
    assert_eq!(skipped.status, SyncStatus::Skipped);
    assert_eq!(skipped.blocks_written, 0);

    let report = running.await.unwrap().unwrap();
    assert_eq!(report.status, SyncStatus::Completed);
    assert_eq!(report.blocks_written, 8);
    assert!(!engine.is_running());
}

#[tokio::test]
async fn hash_only_bodies_are_resolved() {
    let chain = Arc::new(MockChain::with_tx_counts(&[0, 3]));
    chain.set_hash_only(true);
    let store = memory_store();

    let report = engine(&chain, &store, SyncConfig::default())
        .run_sync()
        .await
        .unwrap();
    assert_eq!(report.transactions_written, 3);

    let stored = store.transaction_by_hash(tx_hash(1, 2)).await.unwrap().unwrap();
    assert_eq!(stored.block_number, 1);
    assert_eq!(stored.transaction_index, 2);
    assert_eq!(stored.from, addr(0xaa));
}

#[tokio::test]
async fn receipts_fill_in_transaction_status() {
    let chain = Arc::new(MockChain::with_tx_counts(&[2]));
    chain.fail_transaction(tx_hash(0, 1));
    let store = memory_store();
    let config = SyncConfig {
        fetch_receipts: true,
        ..SyncConfig::default()
    };

    engine(&chain, &store, config).run_sync().await.unwrap();

    let ok = store.transaction_by_hash(tx_hash(0, 0)).await.unwrap().unwrap();
    let failed = store.transaction_by_hash(tx_hash(0, 1)).await.unwrap().unwrap();
    assert_eq!(ok.status, Some(true));
    assert_eq!(failed.status, Some(false));
}

#[tokio::test]
async fn parent_mismatch_aborts_run() {
    let chain = Arc::new(MockChain::with_empty_blocks(3));
    let store = memory_store();
    let engine = engine(&chain, &store, SyncConfig::default());
    engine.run_sync().await.unwrap();

    chain.push_empty_blocks(2);
    chain.set_parent_hash(3, block_hash(999));

    let err = engine.run_sync().await.unwrap_err();
    match err {
        SyncError::ParentMismatch {
            block,
            parent,
            stored,
        } => {
            assert_eq!(block, 3);
            assert_eq!(parent, block_hash(999));
            assert_eq!(stored, block_hash(2));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.max_block_number().await.unwrap(), Some(2));
}

#[tokio::test]
async fn unavailable_store_fails_the_run() {
    let chain: Arc<dyn ChainSource> = Arc::new(MockChain::with_empty_blocks(3));
    let engine = SyncEngine::new(chain, failing_store(), SyncConfig::default());

    let err = engine.run_sync().await.unwrap_err();
    assert!(matches!(err, SyncError::Checkpoint(_)));
}

#[tokio::test]
async fn block_fetches_stay_within_concurrency_limit() {
    let chain = Arc::new(MockChain::with_tx_counts(&[1; 30]));
    chain.set_delay(Duration::from_millis(10));
    let store = memory_store();
    let config = SyncConfig {
        fetch_concurrency: 3,
        ..SyncConfig::default()
    };

    let report = engine(&chain, &store, config).run_sync().await.unwrap();

    assert_eq!(report.blocks_written, 30);
    assert!(chain.max_in_flight() <= 3);
    assert!(chain.max_in_flight() > 1);
}
