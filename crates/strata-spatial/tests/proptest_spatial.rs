//! Property tests for the spatial index.
//!
//! - AABB intersection is symmetric.
//! - The grid never produces false negatives: any registered entity whose
//!   bounds overlap a query region appears in the region's candidate set,
//!   including after arbitrary updates.
//! - Grid raycasts agree with brute-force slab tests over all registered
//!   entities.

use glam::Vec3;
use proptest::prelude::*;
use strata_ecs::entity::EntityId;
use strata_spatial::prelude::*;

/// Finite f32 coordinates on a lattice, so comparisons stay exact.
fn coord() -> impl Strategy<Value = f32> {
    (-4_000i32..4_000i32).prop_map(|v| v as f32 * 0.25)
}

/// Strictly positive half-extent.
fn half_extent() -> impl Strategy<Value = f32> {
    (1i32..40i32).prop_map(|v| v as f32 * 0.25)
}

fn aabb_strategy() -> impl Strategy<Value = Aabb> {
    (coord(), coord(), coord(), half_extent(), half_extent(), half_extent()).prop_map(
        |(x, y, z, hx, hy, hz)| {
            Aabb::from_center_half_extents(Vec3::new(x, y, z), Vec3::new(hx, hy, hz))
        },
    )
}

fn cell_size_strategy() -> impl Strategy<Value = f32> {
    prop_oneof![Just(2.0f32), Just(8.0), Just(16.0), Just(64.0)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn aabb_intersection_is_symmetric(a in aabb_strategy(), b in aabb_strategy()) {
        prop_assert_eq!(a.intersects(&b), b.intersects(&a));
    }

    #[test]
    fn aabb_intersects_itself(a in aabb_strategy()) {
        prop_assert!(a.intersects(&a));
    }

    #[test]
    fn query_region_has_no_false_negatives(
        cell_size in cell_size_strategy(),
        bounds in prop::collection::vec(aabb_strategy(), 1..60),
        region in aabb_strategy(),
    ) {
        let mut grid = SpatialGrid::new(cell_size);
        for (index, b) in bounds.iter().enumerate() {
            grid.insert(EntityId::new(index as u32, 0), *b).unwrap();
        }

        let candidates = grid.query_region(&region);
        for (index, b) in bounds.iter().enumerate() {
            if b.intersects(&region) {
                prop_assert!(
                    candidates.contains(&EntityId::new(index as u32, 0)),
                    "false negative: entity {} with bounds {:?} missing from query over {:?}",
                    index, b, region
                );
            }
        }
    }

    #[test]
    fn updates_preserve_soundness(
        cell_size in cell_size_strategy(),
        start in prop::collection::vec(aabb_strategy(), 1..40),
        moved in prop::collection::vec(aabb_strategy(), 1..40),
        region in aabb_strategy(),
    ) {
        let mut grid = SpatialGrid::new(cell_size);
        for (index, b) in start.iter().enumerate() {
            grid.insert(EntityId::new(index as u32, 0), *b).unwrap();
        }

        // Move each entity that has a replacement bound.
        let mut current = start.clone();
        for (index, b) in moved.iter().enumerate().take(current.len()) {
            grid.update(EntityId::new(index as u32, 0), *b).unwrap();
            current[index] = *b;
        }

        let candidates = grid.query_region(&region);
        for (index, b) in current.iter().enumerate() {
            if b.intersects(&region) {
                prop_assert!(
                    candidates.contains(&EntityId::new(index as u32, 0)),
                    "false negative after update: entity {}",
                    index
                );
            }
        }
    }

    #[test]
    fn raycast_matches_brute_force(
        cell_size in cell_size_strategy(),
        bounds in prop::collection::vec(aabb_strategy(), 1..40),
        ox in coord(), oy in coord(), oz in coord(),
        dx in -10i32..10i32, dy in -10i32..10i32, dz in -10i32..10i32,
    ) {
        prop_assume!(dx != 0 || dy != 0 || dz != 0);
        let origin = Vec3::new(ox, oy, oz);
        let dir = Vec3::new(dx as f32, dy as f32, dz as f32).normalize();
        let max_distance = 500.0f32;

        let mut grid = SpatialGrid::new(cell_size);
        for (index, b) in bounds.iter().enumerate() {
            grid.insert(EntityId::new(index as u32, 0), *b).unwrap();
        }

        let expected = bounds
            .iter()
            .filter_map(|b| b.intersect_ray(origin, dir))
            .filter(|t| *t <= max_distance)
            .fold(None::<f32>, |best, t| {
                Some(best.map_or(t, |b| b.min(t)))
            });

        let hit = grid.raycast(origin, dir, max_distance);
        match (hit, expected) {
            (Some(hit), Some(t)) => prop_assert!(
                (hit.distance - t).abs() < 1e-3,
                "grid hit at {} but nearest brute-force hit is {}",
                hit.distance, t
            ),
            (None, None) => {}
            (got, want) => prop_assert!(
                false,
                "raycast disagreement: grid={:?} brute-force={:?}",
                got, want
            ),
        }
    }
}
