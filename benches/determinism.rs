use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use battle_dinghy::game::card::generate_card;
use battle_dinghy::proof::commit_reveal::{compute_final_seed, create_commitment, PlayerCommitment};
use battle_dinghy::{Digest32, GameConfig, GameEngine, GameId, PlayerId, RoundEvent, MAX_ROUNDS};

fn players(count: usize) -> Vec<PlayerId> {
    (0..count)
        .map(|i| PlayerId::new(format!("wallet-{i}")).expect("non-empty"))
        .collect()
}

fn events() -> Vec<RoundEvent> {
    (1..=MAX_ROUNDS)
        .map(|r| RoundEvent::new(r, ((r * 11 + 3) % 25) as u8, format!("proof-{r}")))
        .collect()
}

fn card_generation(c: &mut Criterion) {
    let seed = Digest32::new([7; 32]);
    let player = PlayerId::new("wallet-0").expect("non-empty");
    c.bench_function("generate_card", |b| {
        b.iter(|| black_box(generate_card(&seed, &player, 0)))
    });
}

fn seed_derivation(c: &mut Criterion) {
    let commitments: Vec<PlayerCommitment> = players(10)
        .into_iter()
        .map(|wallet| PlayerCommitment {
            commitment_hash: create_commitment("secret", wallet.as_str()),
            revealed_secret: Some("secret".into()),
            wallet_id: wallet,
            committed_at: 0,
            revealed_at: Some(0),
        })
        .collect();
    let external = Digest32::new([1; 32]);
    c.bench_function("compute_final_seed_10", |b| {
        b.iter(|| black_box(compute_final_seed(&commitments, &external)))
    });
}

fn replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("recover");
    let events = events();
    for count in [2usize, 5, 10] {
        let config = GameConfig::new(
            GameId::new("bench").expect("valid id"),
            Digest32::new([count as u8; 32]),
            players(count),
        );
        // Only the rounds the game actually accepts
        let mut live = GameEngine::new(config.clone()).expect("valid config");
        let played: Vec<RoundEvent> = events
            .iter()
            .take_while(|e| live.process_round(e).is_ok())
            .cloned()
            .collect();

        group.bench_function(BenchmarkId::from_parameter(count), |b| {
            b.iter(|| black_box(GameEngine::recover(config.clone(), &played).expect("replays")))
        });
    }
    group.finish();
}

criterion_group!(benches, card_generation, seed_derivation, replay);
criterion_main!(benches);
