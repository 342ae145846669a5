//! Integration test for the write-ahead-logged store.
//!
//! Verifies that committed batches survive a restart and that checkpointing
//! preserves player state.

mod common;

use std::fs;
use std::sync::Arc;

use common::{catalog, temp_wal_path, FixedRolls, LIMITED};
use chrono::{TimeDelta, Utc};
use stellar_gacha::{CurrencyKind, DrawEngine, EngineConfig, GachaError, PlayerStore, WalStore};

fn open_engine(path: &std::path::Path, seed: u64) -> DrawEngine<WalStore> {
    let store = WalStore::open(path).unwrap();
    DrawEngine::new(Arc::new(catalog()), store, EngineConfig::default())
        .unwrap()
        .with_seed(seed)
}

#[test]
fn test_batches_survive_restart() {
    let path = temp_wal_path("restart");

    let before = {
        let engine = open_engine(&path, 11);
        engine.register_player("1001", "Stelle").unwrap();
        engine.register_player("1002", "Caelus").unwrap();
        engine.grant_currency("1001", CurrencyKind::Standard, 40).unwrap();
        engine.grant_currency("1002", CurrencyKind::Special, 10).unwrap();
        engine.set_active_banner("1002", LIMITED).unwrap();

        for _ in 0..5 {
            engine.run_draws("1001", 10).unwrap();
        }
        engine.run_draws("1002", 10).unwrap();
        engine.store().snapshot()
    };

    let engine = open_engine(&path, 12);
    assert_eq!(engine.store().snapshot(), before);

    let profile = engine.profile("1001").unwrap();
    assert_eq!(profile.total_draws, 50);
    assert_eq!(profile.wallet.standard, 0);
    assert_eq!(engine.history("1001", Some(100)).unwrap().len(), 50);
    assert_eq!(engine.profile("1002").unwrap().pity.active_banner, LIMITED);

    assert!(matches!(
        engine.register_player("1001", "Stelle"),
        Err(GachaError::AlreadyRegistered(_))
    ));

    fs::remove_file(&path).ok();
}

#[test]
fn test_rejected_batch_leaves_no_log_entry() {
    let path = temp_wal_path("rejected");

    let before = {
        let engine = open_engine(&path, 1);
        engine.register_player("1001", "Stelle").unwrap();
        let len = fs::metadata(&path).unwrap().len();

        assert!(engine.run_draws("1001", 11).is_err());
        assert_eq!(fs::metadata(&path).unwrap().len(), len);
        engine.store().snapshot()
    };

    let engine = open_engine(&path, 1);
    assert_eq!(engine.store().snapshot(), before);
    assert_eq!(engine.profile("1001").unwrap().wallet.standard, 10);

    fs::remove_file(&path).ok();
}

#[test]
fn test_checkpoint_then_keep_drawing() {
    let path = temp_wal_path("checkpoint");

    {
        let engine = open_engine(&path, 5);
        engine.register_player("1001", "Stelle").unwrap();
        engine.grant_currency("1001", CurrencyKind::Standard, 190).unwrap();
        for _ in 0..20 {
            engine.run_draws("1001", 10).unwrap();
        }
        let uncompacted = fs::metadata(&path).unwrap().len();

        let before = engine.store().snapshot();
        engine.store().checkpoint().unwrap();
        assert!(fs::metadata(&path).unwrap().len() < uncompacted);
        assert_eq!(engine.store().snapshot(), before);
    }

    let engine = open_engine(&path, 6);
    assert_eq!(engine.profile("1001").unwrap().total_draws, 200);

    // The compacted log still accepts appends.
    engine.grant_currency("1001", CurrencyKind::Standard, 1).unwrap();
    let mut rolls = FixedRolls::new(&[0.99]);
    engine.run_draws_with("1001", 1, &mut rolls).unwrap();
    let after = engine.store().snapshot();
    drop(engine);

    let engine = open_engine(&path, 7);
    assert_eq!(engine.store().snapshot(), after);
    assert_eq!(engine.history("1001", Some(1)).unwrap().len(), 1);
    assert_eq!(engine.profile("1001").unwrap().total_draws, 201);

    fs::remove_file(&path).ok();
}

#[test]
fn test_daily_claim_survives_restart() {
    let path = temp_wal_path("daily");
    let claimed_at = Utc::now();

    {
        let engine = open_engine(&path, 3);
        engine.register_player("1001", "Stelle").unwrap();
        assert_eq!(engine.claim_daily("1001", claimed_at).unwrap().standard, 12);
    }

    let engine = open_engine(&path, 3);
    let record = engine.store().load("1001").unwrap().unwrap();
    assert_eq!(record.last_daily_at, Some(claimed_at));
    assert!(matches!(
        engine.claim_daily("1001", claimed_at + TimeDelta::hours(1)),
        Err(GachaError::DailyCooldown { .. })
    ));
    assert_eq!(engine.profile("1001").unwrap().wallet.standard, 12);

    // Compaction keeps the claim time.
    engine.store().checkpoint().unwrap();
    drop(engine);

    let engine = open_engine(&path, 3);
    assert!(engine.claim_daily("1001", claimed_at + TimeDelta::hours(2)).is_err());
    let wallet = engine.claim_daily("1001", claimed_at + TimeDelta::hours(24)).unwrap();
    assert_eq!(wallet.standard, 14);

    fs::remove_file(&path).ok();
}
