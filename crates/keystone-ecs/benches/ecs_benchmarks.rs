//! Store throughput benchmarks.
//!
//! Measures the hot paths of a server tick at game-sized populations:
//!
//! - **Spawn:** flushing a batch of `AddEntity` commands into archetypes.
//! - **Tick:** one full tick with a movement system over every entity.
//! - **Iteration:** raw chunk iteration through a query.
//! - **Churn:** random removals followed by respawns, exercising swap-remove
//!   and slot recycling.
//!
//! Run with: `cargo bench --bench ecs_benchmarks`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use keystone_ecs::prelude::*;

// ---------------------------------------------------------------------------
// Benchmark component types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, PartialEq)]
struct Velocity {
    dx: f32,
    dy: f32,
}

#[derive(Debug, Clone, PartialEq)]
struct Health(u32);

#[derive(Clone, Copy)]
struct Types {
    position: ComponentType<EntityDomain, Position>,
    velocity: ComponentType<EntityDomain, Velocity>,
    health: ComponentType<EntityDomain, Health>,
}

struct Movement {
    position: ComponentType<EntityDomain, Position>,
    velocity: ComponentType<EntityDomain, Velocity>,
}

impl System<EntityDomain> for Movement {
    fn query(&self) -> Query<EntityDomain> {
        Query::has(&self.position) & Query::has(&self.velocity)
    }

    fn tick(&mut self, dt: f32, ctx: &mut SystemContext<'_, EntityDomain>) -> Result<(), EcsError> {
        let (position, velocity) = (self.position, self.velocity);
        ctx.for_each_chunk(|chunk, _| {
            if let Some((positions, velocities)) = chunk.column_pair_mut(&position, &velocity) {
                for (p, v) in positions.iter_mut().zip(velocities.iter()) {
                    p.x += v.dx * dt;
                    p.y += v.dy * dt;
                }
            }
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_store() -> (EntityStore, Types) {
    let mut store = EntityStore::new(StoreConfig::named("bench")).unwrap();
    let types = Types {
        position: store.register_component("position").unwrap(),
        velocity: store.register_component("velocity").unwrap(),
        health: store.register_component("health").unwrap(),
    };
    (store, types)
}

/// Queue `count` entities; a third of them lack a velocity so the population
/// spans two archetypes.
fn queue_population(store: &mut EntityStore, t: &Types, rng: &mut Pcg64, count: usize) -> Vec<Ref> {
    (0..count)
        .map(|i| {
            let mut holder = Holder::new()
                .with(&t.position, Position { x: rng.gen(), y: rng.gen() })
                .with(&t.health, Health(100));
            if i % 3 != 0 {
                holder.insert(
                    &t.velocity,
                    Velocity {
                        dx: rng.gen_range(-1.0..1.0),
                        dy: rng.gen_range(-1.0..1.0),
                    },
                );
            }
            store.commands().add_entity(holder, AddReason::Spawn)
        })
        .collect()
}

fn populated_store(count: usize) -> (EntityStore, Types, Vec<Ref>, Pcg64) {
    let (mut store, types) = new_store();
    let mut rng = Pcg64::seed_from_u64(0x5eed);
    let entities = queue_population(&mut store, &types, &mut rng, count);
    store.tick(0.0).unwrap();
    (store, types, entities, rng)
}

// ---------------------------------------------------------------------------
// Benchmark 1: Spawn flush
// ---------------------------------------------------------------------------

fn bench_spawn(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn_flush");
    for count in [1_000usize, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || {
                    let (mut store, types) = new_store();
                    let mut rng = Pcg64::seed_from_u64(1);
                    queue_population(&mut store, &types, &mut rng, count);
                    store
                },
                |mut store| {
                    store.tick(0.0).unwrap();
                    black_box(store.entity_count());
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark 2: Full tick with one system
// ---------------------------------------------------------------------------

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick_movement");
    for count in [1_000usize, 10_000, 100_000] {
        let (mut store, types, _entities, _rng) = populated_store(count);
        store
            .register_system(Movement {
                position: types.position,
                velocity: types.velocity,
            })
            .unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                store.tick(1.0 / 60.0).unwrap();
                black_box(store.tick_count());
            });
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark 3: Chunk iteration without a tick
// ---------------------------------------------------------------------------

fn bench_iteration(c: &mut Criterion) {
    let (store, types, _entities, _rng) = populated_store(100_000);
    let query = Query::has(&types.health);

    c.bench_function("iterate_health_100k", |b| {
        b.iter(|| {
            let total: u64 = store
                .query_chunks(&query)
                .filter_map(|chunk| chunk.column(&types.health))
                .flat_map(|column| column.iter())
                .map(|h| u64::from(h.0))
                .sum();
            black_box(total);
        });
    });
}

// ---------------------------------------------------------------------------
// Benchmark 4: Random removal and respawn
// ---------------------------------------------------------------------------

fn bench_churn(c: &mut Criterion) {
    let churn = 1_000;
    let (mut store, types, mut entities, mut rng) = populated_store(10_000);

    c.bench_function("churn_1k_of_10k", |b| {
        b.iter(|| {
            entities.shuffle(&mut rng);
            for entity in entities.drain(..churn) {
                store.commands().remove_entity(&entity, RemoveReason::Remove);
            }
            let fresh = queue_population(&mut store, &types, &mut rng, churn);
            store.tick(0.0).unwrap();
            entities.extend(fresh);
            black_box(store.entity_count());
        });
    });
}

criterion_group!(
    benches,
    bench_spawn,
    bench_tick,
    bench_iteration,
    bench_churn
);
criterion_main!(benches);
