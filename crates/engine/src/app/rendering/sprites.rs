use std::collections::BTreeMap;

use crate::world::{Entity, EntityId, RenderSurface, Size, Vec2};

/// What the renderer knows about one entity since its last commit.
#[derive(Debug, Clone, PartialEq)]
pub struct Sprite {
    pub kind: &'static str,
    pub position: Vec2,
    pub size: Size,
    pub frame: u32,
}

/// Committed draw state, keyed by entity id so drawing order is stable.
#[derive(Debug, Default)]
pub struct SpriteList {
    sprites: BTreeMap<EntityId, Sprite>,
}

impl SpriteList {
    pub fn get(&self, id: EntityId) -> Option<&Sprite> {
        self.sprites.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Sprite)> {
        self.sprites.iter().map(|(id, sprite)| (*id, sprite))
    }

    pub fn len(&self) -> usize {
        self.sprites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty()
    }

    pub fn clear(&mut self) {
        self.sprites.clear();
    }
}

impl RenderSurface for SpriteList {
    fn commit(&mut self, entity: &Entity) {
        let frame = entity.animation().map(|animation| animation.frame()).unwrap_or(0);
        self.sprites.insert(
            entity.id(),
            Sprite {
                kind: entity.kind(),
                position: entity.render_position(),
                size: entity.size(),
                frame,
            },
        );
    }

    fn detach(&mut self, id: EntityId) {
        self.sprites.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::world::{Board, BoardData, Collision, Direction, EntityDesc, Movement, SimWorld};

    fn world() -> SimWorld {
        let data = BoardData {
            columns: 6,
            rows: 3,
            tile_size: 16,
            layout: vec![
                "######".to_string(),
                "#    #".to_string(),
                "######".to_string(),
            ],
            turns: None,
        };
        SimWorld::new(Board::from_data(&data).expect("board"), Duration::from_millis(100))
    }

    #[test]
    fn commit_uses_the_interpolated_position() {
        let mut world = world();
        let id = world
            .spawn(
                EntityDesc::new("runner", "runner", Size::square(16.0), Vec2::new(16.0, 16.0))
                    .with_movement(Movement::new(40.0, 1.0)),
            )
            .expect("runner");
        world.start_moving(id, Direction::Right, None);
        let mut hooks = |_: &mut SimWorld, _: Collision| {};
        world.step(&mut hooks);
        world.interpolate(0.5);

        let mut sprites = SpriteList::default();
        world.flush_renders(&mut sprites);
        let sprite = sprites.get(id).expect("sprite");
        assert_eq!(sprite.position, Vec2::new(18.0, 16.0));
        assert_eq!(sprite.kind, "runner");
    }

    #[test]
    fn detach_removes_the_sprite() {
        let mut world = world();
        let id = world
            .spawn(EntityDesc::new("dot", "dot", Size::square(4.0), Vec2::new(20.0, 20.0)))
            .expect("dot");
        let mut sprites = SpriteList::default();
        world.flush_renders(&mut sprites);
        assert_eq!(sprites.len(), 1);

        world.mark_deleted(id);
        world.flush_deletions(&mut sprites);
        assert!(sprites.is_empty());
    }
}
