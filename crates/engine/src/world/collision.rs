//! Collision resolution for a single mover after it stepped.

use tracing::trace;

use super::entity::EntityId;
use super::geometry::{CollisionBox, Vec2};
use super::SimWorld;

/// A detected overlap. `target` is the collided-with entity whose reaction runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collision {
    pub target: EntityId,
    pub mover: EntityId,
    pub swept: bool,
}

pub trait CollisionHandler {
    fn on_collision(&mut self, world: &mut SimWorld, collision: Collision);
}

impl<F> CollisionHandler for F
where
    F: FnMut(&mut SimWorld, Collision),
{
    fn on_collision(&mut self, world: &mut SimWorld, collision: Collision) {
        self(world, collision)
    }
}

/// Finds and reports the collisions of `mover`.
///
/// Candidates come from the tiles under the mover's box. When the mover travels
/// at least its own box width per step, the box is swept from `old_box` so thin
/// targets cannot be skipped. Candidates are resolved nearest-first from the
/// reference point, ties by id. Entities deleted by an earlier handler in the
/// same pass are skipped, and a handler that relocates the mover ends the pass.
pub fn look_for_collisions<H>(
    world: &mut SimWorld,
    mover: EntityId,
    old_box: Option<CollisionBox>,
    teleported: bool,
    handler: &mut H,
) -> usize
where
    H: CollisionHandler + ?Sized,
{
    let Some(entity) = world.registry.get_live(mover) else {
        return 0;
    };
    let Some(current) = entity.collision_box() else {
        return 0;
    };
    let distance_per_tick = entity
        .movement()
        .map(|movement| movement.distance_per_tick())
        .unwrap_or(0.0);
    let mover_kind = entity.kind();
    let start_position = entity.position();

    let (region, reference, swept) = match old_box {
        Some(old) if !teleported && distance_per_tick >= current.width() => {
            (old.union(&current), old.center(), true)
        }
        _ => (current, current.center(), false),
    };

    let range = world.geometry().tile_range(&region);
    let candidates = world.grid.entities_in(range);
    let ordered = nearest_first(world, &candidates, reference);

    let mut hits = 0;
    for target in ordered {
        if target == mover {
            continue;
        }
        let Some(mover_entity) = world.registry.get_live(mover) else {
            break;
        };
        if mover_entity.position() != start_position {
            break;
        }
        let Some(other) = world.registry.get_live(target) else {
            continue;
        };
        let Some(collider) = other.collider() else {
            continue;
        };
        if !collider.accepts(mover_kind) {
            continue;
        }
        let Some(other_box) = other.collision_box() else {
            continue;
        };
        if !region.overlaps(&other_box) {
            continue;
        }
        trace!(mover = %mover, target = %target, swept, "collision");
        handler.on_collision(
            world,
            Collision {
                target,
                mover,
                swept,
            },
        );
        hits += 1;
    }
    hits
}

/// Orders candidates by distance from `reference` to their collision box, then by id.
pub fn nearest_first(world: &SimWorld, candidates: &[EntityId], reference: Vec2) -> Vec<EntityId> {
    let mut scored: Vec<(f32, EntityId)> = candidates
        .iter()
        .filter_map(|id| {
            let collision_box = world.registry.get(*id)?.collision_box()?;
            Some((collision_box.distance_to_point(reference), *id))
        })
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    scored.into_iter().map(|(_, id)| id).collect()
}
