//! Criterion benchmarks for the hot ECS paths: spawning, query iteration,
//! direct column iteration, and archetype migration churn.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use strata_ecs::prelude::*;

#[derive(Debug, Clone, PartialEq)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Debug, Clone, PartialEq)]
struct Velocity {
    dx: f32,
    dy: f32,
    dz: f32,
}

#[derive(Debug, Clone, PartialEq)]
struct Health {
    current: f32,
    max: f32,
    regen: f32,
}

fn setup_world() -> World {
    let mut world = World::new();
    world.register_component::<Position>("position");
    world.register_component::<Velocity>("velocity");
    world.register_component::<Health>("health");
    world
}

fn populate(world: &mut World, count: u32) -> Vec<EntityId> {
    let mut rng = Pcg64::seed_from_u64(42);
    (0..count)
        .map(|_| {
            let mut bundle = ComponentBundle::new();
            bundle.add(
                world.registry(),
                Position {
                    x: rng.gen_range(-512.0..512.0),
                    y: rng.gen_range(0.0..256.0),
                    z: rng.gen_range(-512.0..512.0),
                },
            );
            bundle.add(
                world.registry(),
                Velocity {
                    dx: rng.gen_range(-1.0..1.0),
                    dy: 0.0,
                    dz: rng.gen_range(-1.0..1.0),
                },
            );
            world.spawn_bundle(bundle)
        })
        .collect()
}

fn bench_spawn(c: &mut Criterion) {
    c.bench_function("spawn_10k_pos_vel", |b| {
        b.iter(|| {
            let mut world = setup_world();
            let entities = populate(&mut world, 10_000);
            black_box(entities.len())
        })
    });
}

fn bench_query_iteration(c: &mut Criterion) {
    let mut world = setup_world();
    populate(&mut world, 10_000);

    c.bench_function("query_iter_10k", |b| {
        b.iter(|| {
            let mut sum = 0.0f32;
            for (_entity, (pos, vel)) in world.query::<(&Position, &Velocity)>() {
                sum += pos.x + vel.dx;
            }
            black_box(sum)
        })
    });
}

fn bench_column_iteration(c: &mut Criterion) {
    let mut world = setup_world();
    populate(&mut world, 10_000);
    let pos_id = world.registry().lookup::<Position>().unwrap();
    let vel_id = world.registry().lookup::<Velocity>().unwrap();
    let filter = QueryFilter::new().with(pos_id).with(vel_id);

    c.bench_function("column_iter_10k", |b| {
        b.iter(|| {
            let mut sum = 0.0f32;
            for arch_id in world.match_archetypes(&filter) {
                let archetype = world.archetype(arch_id).unwrap();
                let positions = archetype.column::<Position>(pos_id).unwrap();
                let velocities = archetype.column::<Velocity>(vel_id).unwrap();
                for (pos, vel) in positions.iter().zip(velocities) {
                    sum += pos.x + vel.dx;
                }
            }
            black_box(sum)
        })
    });
}

fn bench_migration_churn(c: &mut Criterion) {
    c.bench_function("migration_churn_1k", |b| {
        b.iter(|| {
            let mut world = setup_world();
            let entities = populate(&mut world, 1_000);
            for e in &entities {
                world
                    .insert_component(
                        *e,
                        Health {
                            current: 20.0,
                            max: 20.0,
                            regen: 0.5,
                        },
                    )
                    .unwrap();
            }
            for e in &entities {
                world.remove_component::<Health>(*e).unwrap();
            }
            black_box(world.entity_count())
        })
    });
}

criterion_group!(
    benches,
    bench_spawn,
    bench_query_iteration,
    bench_column_iteration,
    bench_migration_churn
);
criterion_main!(benches);
