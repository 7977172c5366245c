//! Property tests for the ECS store.
//!
//! Random operation sequences run against the world and a simple shadow
//! model; afterwards the structural invariants must hold:
//!
//! - every live entity's directory entry points at the row that holds it,
//! - every archetype's columns are exactly as long as its entity vector,
//! - predicate matching returns exactly the superset archetypes,
//! - failed operations leave the entity untouched.

use std::collections::HashMap;

use proptest::prelude::*;
use strata_ecs::prelude::*;

#[derive(Debug, Clone, PartialEq)]
struct Pos {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Debug, Clone, PartialEq)]
struct Vel {
    dx: f32,
    dy: f32,
    dz: f32,
}

/// Shadow state for one spawned entity.
#[derive(Debug, Clone)]
struct ModelEntity {
    alive: bool,
    x: f32,
    vel: Option<f32>,
}

/// Operations the property test can perform.
#[derive(Debug, Clone)]
enum EcsOp {
    SpawnPos(f32),
    SpawnPosVel(f32, f32),
    Despawn(usize),
    InsertVel(usize, f32),
    RemoveVel(usize),
}

/// Finite (non-NaN, non-Inf) f32 values, so equality comparisons stay exact.
fn finite_f32() -> impl Strategy<Value = f32> {
    (-1_000_000i32..1_000_000i32).prop_map(|v| v as f32 * 0.01)
}

fn ecs_op_strategy() -> impl Strategy<Value = EcsOp> {
    prop_oneof![
        finite_f32().prop_map(EcsOp::SpawnPos),
        (finite_f32(), finite_f32()).prop_map(|(x, dx)| EcsOp::SpawnPosVel(x, dx)),
        (0..100usize).prop_map(EcsOp::Despawn),
        (0..100usize, finite_f32()).prop_map(|(i, dx)| EcsOp::InsertVel(i, dx)),
        (0..100usize).prop_map(EcsOp::RemoveVel),
    ]
}

fn setup_world() -> World {
    let mut world = World::new();
    world.register_component::<Pos>("position");
    world.register_component::<Vel>("velocity");
    world
}

fn pos(x: f32) -> Pos {
    Pos { x, y: 0.0, z: 0.0 }
}

fn vel(dx: f32) -> Vel {
    Vel { dx, dy: 0.0, dz: 0.0 }
}

/// Directory consistency: each live entity is exactly where the directory
/// says, and the row really holds it.
fn check_directory(world: &World, model: &HashMap<u64, ModelEntity>, spawned: &[EntityId]) {
    for entity in spawned {
        let entry = &model[&entity.to_raw()];
        if !entry.alive {
            assert!(world.locate(*entity).is_err(), "dead entity still located");
            continue;
        }
        let (arch_id, row) = world.locate(*entity).expect("live entity must locate");
        let archetype = world.archetype(arch_id).expect("located archetype exists");
        assert_eq!(
            archetype.entity_at(row),
            Some(*entity),
            "directory row does not hold the entity"
        );
    }
}

/// Row-count invariant: every column is as long as the entity vector.
fn check_row_counts(world: &World) {
    for archetype in world.archetypes() {
        for type_id in archetype.component_types() {
            assert_eq!(
                archetype.column_len(*type_id),
                Some(archetype.len()),
                "column length diverged from row count"
            );
        }
    }
}

/// Query completeness: `{all: S}` matches exactly the archetypes whose
/// component set contains S.
fn check_query_completeness(world: &World, required: &[ComponentTypeId]) {
    let mut filter = QueryFilter::new();
    for id in required {
        filter = filter.with(*id);
    }
    let matched: Vec<ArchetypeId> = world.match_archetypes(&filter).iter().collect();

    let expected: Vec<ArchetypeId> = world
        .archetypes()
        .filter(|a| required.iter().all(|id| a.has_component(*id)))
        .map(|a| a.id())
        .collect();

    assert_eq!(matched, expected, "matched set diverged from superset rule");
}

/// Component values survived all the churn.
fn check_values(world: &World, model: &HashMap<u64, ModelEntity>, spawned: &[EntityId]) {
    for entity in spawned {
        let entry = &model[&entity.to_raw()];
        if !entry.alive {
            assert_eq!(world.get_component::<Pos>(*entity), None);
            continue;
        }
        assert_eq!(world.get_component::<Pos>(*entity), Some(&pos(entry.x)));
        match entry.vel {
            Some(dx) => {
                assert_eq!(world.get_component::<Vel>(*entity), Some(&vel(dx)));
            }
            None => assert!(!world.has_component::<Vel>(*entity)),
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn world_invariants_hold_under_random_ops(ops in prop::collection::vec(ecs_op_strategy(), 1..80)) {
        let mut world = setup_world();
        let mut spawned: Vec<EntityId> = Vec::new();
        let mut model: HashMap<u64, ModelEntity> = HashMap::new();

        for op in ops {
            match op {
                EcsOp::SpawnPos(x) => {
                    let e = world.spawn_with(pos(x));
                    model.insert(e.to_raw(), ModelEntity { alive: true, x, vel: None });
                    spawned.push(e);
                }
                EcsOp::SpawnPosVel(x, dx) => {
                    let mut b = ComponentBundle::new();
                    b.add(world.registry(), pos(x));
                    b.add(world.registry(), vel(dx));
                    let e = world.spawn_bundle(b);
                    model.insert(e.to_raw(), ModelEntity { alive: true, x, vel: Some(dx) });
                    spawned.push(e);
                }
                EcsOp::Despawn(i) => {
                    if spawned.is_empty() { continue; }
                    let e = spawned[i % spawned.len()];
                    let entry = model.get_mut(&e.to_raw()).unwrap();
                    let result = world.despawn(e);
                    prop_assert_eq!(result.is_ok(), entry.alive);
                    entry.alive = false;
                }
                EcsOp::InsertVel(i, dx) => {
                    if spawned.is_empty() { continue; }
                    let e = spawned[i % spawned.len()];
                    let entry = model.get_mut(&e.to_raw()).unwrap();
                    let result = world.insert_component(e, vel(dx));
                    prop_assert_eq!(result.is_ok(), entry.alive);
                    if entry.alive {
                        entry.vel = Some(dx);
                    }
                }
                EcsOp::RemoveVel(i) => {
                    if spawned.is_empty() { continue; }
                    let e = spawned[i % spawned.len()];
                    let entry = model.get_mut(&e.to_raw()).unwrap();
                    let location_before = world.locate(e).ok();
                    let result = world.remove_component::<Vel>(e);
                    match (&result, entry.alive, entry.vel) {
                        (Ok(()), true, Some(_)) => { entry.vel = None; }
                        (Err(EcsError::MissingComponent { .. }), true, None) => {
                            // A failed removal must be a no-op.
                            prop_assert_eq!(world.locate(e).ok(), location_before);
                        }
                        (Err(EcsError::EntityNotFound { .. }), false, _) => {}
                        _ => prop_assert!(false, "unexpected removal outcome: {:?}", result),
                    }
                }
            }
        }

        // Invariants after the full sequence.
        check_directory(&world, &model, &spawned);
        check_row_counts(&world);
        check_values(&world, &model, &spawned);

        let pos_id = world.registry().lookup::<Pos>().unwrap();
        let vel_id = world.registry().lookup::<Vel>().unwrap();
        check_query_completeness(&world, &[pos_id]);
        check_query_completeness(&world, &[vel_id]);
        check_query_completeness(&world, &[pos_id, vel_id]);

        let live = model.values().filter(|m| m.alive).count();
        prop_assert_eq!(world.entity_count(), live);

        // Typed query row counts agree with the model.
        let with_vel = model.values().filter(|m| m.alive && m.vel.is_some()).count();
        prop_assert_eq!(world.query::<(&Pos, &Vel)>().count(), with_vel);
    }
}
