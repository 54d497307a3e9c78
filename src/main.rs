//! Battle Dinghy Demo
//!
//! Runs the full pipeline against the mock block oracle: operator block
//! commitment, player commit-reveal, card derivation, round resolution,
//! replay check and escrow settlement.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use battle_dinghy::{
    core::clock::{Clock, SharedClock, SystemClock},
    game::{
        engine::{GameConfig, GameEngine},
        events::{GameEvent, RoundEvent},
        feed::VecFeed,
        lifecycle::{GameEscrow, MINIMUM_GAME_TIME_SECS},
    },
    proof::{
        block_commitment::{OreBlockCommitmentManager, OreCommitmentConfig},
        commit_reveal::{create_commitment, generate_secret, CommitRevealConfig, CommitRevealManager},
        oracle::MockOracle,
    },
    GameId, PlayerId, GRID_CELLS, MAX_ROUNDS, VERSION,
};

const OPERATOR: &str = "operator-wallet";
const PLAYERS: [&str; 4] = ["wallet-anchor", "wallet-bosun", "wallet-cutter", "wallet-dory"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Battle Dinghy v{}", VERSION);

    let clock: SharedClock = Arc::new(SystemClock);
    let oracle = MockOracle::new(1_000);
    let game_id = GameId::generate();
    let players: Vec<PlayerId> = PLAYERS
        .iter()
        .map(|p| PlayerId::new(*p))
        .collect::<Result<_, _>>()?;

    // Escrow: players buy in, operator starts
    let operator = PlayerId::new(OPERATOR)?;
    let start_secs = clock.now_ms() / 1000;
    let mut escrow = GameEscrow::create(
        game_id.as_str(),
        operator.clone(),
        1_000_000,
        PLAYERS.len() as u8,
        1,
        battle_dinghy::Digest32::ZERO,
        start_secs,
    )?;
    for player in &players {
        escrow.join(player.clone(), start_secs)?;
    }

    // 1. Operator commits to a future block
    let ore_config = OreCommitmentConfig::from_env()?;
    let buffer_ms = ore_config.commitment_buffer_ms;
    let ore = Arc::new(OreBlockCommitmentManager::new(ore_config, oracle.clone(), clock.clone())?);
    let commitment = ore.create_commitment(&game_id, OPERATOR, None).await?;
    info!(
        game_id = %game_id,
        target = commitment.target_block_height,
        "operator committed to future block"
    );

    // 2. Players commit, then reveal (one player abstains)
    let mut session =
        CommitRevealManager::new(game_id.clone(), CommitRevealConfig::from_env()?, clock.clone())?;
    let secrets: Vec<String> = players.iter().map(|_| generate_secret()).collect();
    for (player, secret) in players.iter().zip(&secrets) {
        let hash = create_commitment(secret, player.as_str());
        session.submit_commitment(player.as_str(), &hash.to_hex())?;
    }
    if !session.start_reveal_phase() {
        bail!("not enough commitments to start the reveal phase");
    }
    for (player, secret) in players.iter().zip(&secrets).take(players.len() - 1) {
        session.reveal_secret(player.as_str(), secret)?;
    }
    for missing in session.get_missing_reveals() {
        warn!(player = %missing, "player did not reveal; commitment used as entropy");
    }

    // 3. Blocks arrive; wait for the committed one
    let miner = {
        let oracle = oracle.clone();
        let committed_at = commitment.committed_at;
        let target = commitment.target_block_height;
        tokio::spawn(async move {
            let mut mined_at = committed_at + buffer_ms;
            loop {
                tokio::time::sleep(Duration::from_millis(20)).await;
                mined_at += 400;
                let (height, _) = oracle.mine_next(mined_at);
                if height >= target {
                    break;
                }
            }
        })
    };
    let verification = ore.wait_for_block(&game_id, Duration::from_millis(10)).await?;
    miner.await?;
    info!(
        block = verification.commitment.target_block_height,
        verified = verification.verified,
        "committed block verified"
    );

    // 4. Seed from player entropy and the verified block
    let block_hash = ore
        .get_verified_block_hash(&game_id)
        .await
        .context("block hash not verified")?;
    let seed = session.finalize(&block_hash.to_hex())?;
    escrow.seed = seed;
    info!(seed = %seed, "seed finalized");

    // 5. Cards
    escrow.start(&operator, start_secs)?;
    let config: GameConfig = escrow.engine_config();
    let mut engine = GameEngine::new(config.clone())?;
    for player in &players {
        if let Some(card) = engine.get_generated_card(player) {
            info!("Card for {}:\n{}", player, card.render(&Default::default()));
        }
    }
    engine.subscribe(|event| {
        if let GameEvent::PlayerEliminated { player_id, round, remaining } = event {
            info!(player = %player_id, round, remaining, ">> eliminated");
        }
    });

    // 6. Rounds, one mined block each
    let events: Vec<RoundEvent> = (1..=MAX_ROUNDS)
        .map(|round| {
            let (height, hash) = oracle.mine_next(clock.now_ms());
            let winning_block = (hash.as_bytes()[0] as u32 % GRID_CELLS) as u8;
            RoundEvent::new(round, winning_block, format!("{height}:{hash}"))
        })
        .collect();
    let mut feed = VecFeed::new(events.clone());
    let played = engine.run_feed(&mut feed).await?;

    let winner = engine
        .get_winner()
        .cloned()
        .context("game ended without a winner")?;
    info!(winner = %winner, rounds = played, "=== Game Complete ===");
    for player in &players {
        if let Some(card) = engine.get_player_card(player) {
            info!(
                "{}: {} hits, eliminated at {:?}\n{}",
                player,
                card.hits_taken(),
                card.eliminated_at_round,
                card.card.render(&card.hit_cells)
            );
        }
    }

    // 7. Replay check
    let replayed = GameEngine::recover(config, &events[..played as usize])?;
    let live_hash = engine.state_hash();
    if replayed.state_hash() != live_hash {
        bail!("replay diverged from live game");
    }
    info!(state_hash = %live_hash, "replay matches live game");

    // 8. Settle
    let payout = escrow.declare_winner(
        &operator,
        winner.clone(),
        live_hash,
        start_secs + MINIMUM_GAME_TIME_SECS,
    )?;
    info!(winner = %winner, payout, "escrow settled");

    ore.stop();
    Ok(())
}
