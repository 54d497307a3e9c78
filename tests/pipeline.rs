//! End-to-end: block commitment → commit-reveal → cards → rounds → replay.

use std::sync::Arc;
use std::time::Duration;

use battle_dinghy::core::clock::ManualClock;
use battle_dinghy::game::card::verify_card;
use battle_dinghy::game::feed::{ChannelFeed, VecFeed};
use battle_dinghy::game::registry::GameRegistry;
use battle_dinghy::proof::block_commitment::{
    FailureReason, OreBlockCommitmentManager, OreCommitmentConfig, WaitError,
};
use battle_dinghy::proof::commit_reveal::{
    create_commitment, CommitRevealConfig, CommitRevealManager, RevealPhase,
};
use battle_dinghy::proof::oracle::MockOracle;
use battle_dinghy::{Digest32, GameConfig, GameEngine, GameId, PlayerId, RoundEvent, MAX_ROUNDS};

const T0: u64 = 1_700_000_000_000;

fn wallets() -> Vec<PlayerId> {
    ["alice", "bob", "carol"]
        .iter()
        .map(|w| PlayerId::new(*w).unwrap())
        .collect()
}

fn round_events(seed_byte: u8) -> Vec<RoundEvent> {
    (1..=MAX_ROUNDS)
        .map(|r| {
            let block = ((r as u8).wrapping_mul(seed_byte | 1).wrapping_add(seed_byte)) % 25;
            RoundEvent::new(r, block, format!("ore-{seed_byte}-{r}"))
        })
        .collect()
}

/// Runs the fairness protocols and returns the finalized seed.
async fn derive_seed(game_id: &GameId, clock: &ManualClock, oracle: &MockOracle) -> Digest32 {
    let shared = Arc::new(clock.clone());
    let ore = OreBlockCommitmentManager::new(
        OreCommitmentConfig::default(),
        oracle.clone(),
        shared.clone(),
    )
    .unwrap();
    let commitment = ore.create_commitment(game_id, "operator", None).await.unwrap();

    let mut session =
        CommitRevealManager::new(game_id.clone(), CommitRevealConfig::default(), shared).unwrap();
    for wallet in wallets() {
        let secret = format!("secret-of-{wallet}");
        let hash = create_commitment(&secret, wallet.as_str());
        session.submit_commitment(wallet.as_str(), &hash.to_hex()).unwrap();
    }
    assert!(session.start_reveal_phase());
    for wallet in wallets().iter().take(2) {
        session
            .reveal_secret(wallet.as_str(), &format!("secret-of-{wallet}"))
            .unwrap();
    }

    // Block not mined yet: no entropy available
    assert!(ore.verify_commitment(game_id).await.is_err());
    assert_eq!(ore.get_verified_block_hash(game_id).await, None);

    clock.advance(60_000);
    oracle.mine_block(
        commitment.target_block_height,
        Digest32::new([0xab; 32]),
        commitment.committed_at + 45_000,
    );
    let verification = ore
        .wait_for_block(game_id, Duration::from_millis(10))
        .await
        .unwrap();
    assert!(verification.verified);

    let block_hash = ore.get_verified_block_hash(game_id).await.unwrap();
    let seed = session.finalize(&block_hash.to_hex()).unwrap();
    assert_eq!(session.phase(), RevealPhase::Finalized);
    seed
}

#[tokio::test]
async fn test_full_pipeline_is_reproducible() {
    let game_id = GameId::new("e2e-game").unwrap();

    let clock = ManualClock::new(T0);
    let oracle = MockOracle::new(500);
    let seed = derive_seed(&game_id, &clock, &oracle).await;

    // A second, independent run over the same inputs reaches the same seed
    let clock2 = ManualClock::new(T0);
    let oracle2 = MockOracle::new(500);
    assert_eq!(derive_seed(&game_id, &clock2, &oracle2).await, seed);

    let config = GameConfig::new(game_id.clone(), seed, wallets());
    let mut engine = GameEngine::new(config.clone()).unwrap();
    for (index, wallet) in wallets().iter().enumerate() {
        let card = engine.get_generated_card(wallet).unwrap();
        assert!(verify_card(&seed, wallet, index as u32, card));
    }

    let events = round_events(seed.as_bytes()[0]);
    let mut feed = VecFeed::new(events.clone());
    let played = engine.run_feed(&mut feed).await.unwrap();

    assert!(engine.is_game_complete());
    assert!(played <= MAX_ROUNDS);
    let winner = engine.get_winner().unwrap().clone();
    assert!(wallets().contains(&winner));

    let replayed = GameEngine::recover(config, &events[..played as usize]).unwrap();
    assert_eq!(replayed.state_hash(), engine.state_hash());
    assert_eq!(replayed.get_winner(), Some(&winner));
    for wallet in wallets() {
        assert_eq!(
            replayed.get_player_card(&wallet).unwrap().eliminated_at_round,
            engine.get_player_card(&wallet).unwrap().eliminated_at_round
        );
    }
}

#[tokio::test]
async fn test_late_commitment_is_rejected() {
    let game_id = GameId::new("late").unwrap();
    let clock = ManualClock::new(T0);
    let oracle = MockOracle::new(10);
    let ore = OreBlockCommitmentManager::new(
        OreCommitmentConfig::default(),
        oracle.clone(),
        Arc::new(clock.clone()),
    )
    .unwrap();
    let commitment = ore.create_commitment(&game_id, "operator", None).await.unwrap();

    // Block mined only 10s after the commitment, inside the 30s buffer
    oracle.mine_block(commitment.target_block_height, Digest32::new([1; 32]), T0 + 10_000);
    let err = ore
        .wait_for_block(&game_id, Duration::from_millis(10))
        .await
        .unwrap_err();
    assert_eq!(err, WaitError::Failed(FailureReason::CommitmentAfterBlock));
    assert_eq!(ore.get_verified_block_hash(&game_id).await, None);
}

#[tokio::test]
async fn test_live_feed_matches_precomputed_feed() {
    let config = GameConfig::new(GameId::new("feeds").unwrap(), Digest32::new([4; 32]), wallets());
    let events = round_events(4);

    let mut from_list = GameEngine::new(config.clone()).unwrap();
    from_list.run_feed(&mut VecFeed::new(events.clone())).await.unwrap();

    let (tx, mut live_feed) = ChannelFeed::new(8);
    let producer = tokio::spawn({
        let events = events.clone();
        async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        }
    });
    let mut from_channel = GameEngine::new(config).unwrap();
    from_channel.run_feed(&mut live_feed).await.unwrap();
    drop(live_feed);
    producer.await.unwrap();

    assert_eq!(from_channel.state(), from_list.state());
}

#[tokio::test]
async fn test_registry_snapshot_restores_into_new_registry() {
    let config = GameConfig::new(GameId::new("persist").unwrap(), Digest32::new([9; 32]), wallets());
    let registry = GameRegistry::new();
    registry.create_game(config.clone()).await.unwrap();

    let events = round_events(9);
    for event in &events[..10] {
        if registry.process_round(&config.game_id, event).await.is_err() {
            break;
        }
    }

    let handle = registry.get(&config.game_id).await.unwrap();
    let stored = handle.read().await.serialize().unwrap();

    let restored = GameEngine::deserialize(&stored).unwrap();
    let fresh = GameRegistry::new();
    fresh.adopt(restored).await.unwrap();
    for event in &events[10..] {
        let live = registry.process_round(&config.game_id, event).await;
        let resumed = fresh.process_round(&config.game_id, event).await;
        assert_eq!(live.is_ok(), resumed.is_ok());
        if live.is_err() {
            break;
        }
    }

    assert_eq!(
        registry.snapshot(&config.game_id).await,
        fresh.snapshot(&config.game_id).await
    );
}
