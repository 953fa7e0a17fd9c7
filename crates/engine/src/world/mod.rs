//! Simulation world: board, entity registry and spatial grid for one game session.

use std::time::Duration;

use tracing::{debug, warn};

pub mod board;
pub mod collision;
pub mod entity;
pub mod geometry;
pub mod grid;
pub mod movement;
pub mod registry;

pub use board::{
    load_board, load_board_data, Board, BoardData, BoardError, Cell, Teleporter, Turn, TurnData,
    TurnId,
};
pub use collision::{look_for_collisions, nearest_first, Collision, CollisionHandler};
pub use entity::{Animation, Collider, Countdown, Entity, EntityDesc, EntityId};
pub use geometry::{CollisionBox, Direction, DirectionSet, Size, Vec2};
pub use grid::{BoardGeometry, GeometryError, SpatialGrid, TileKey, TileRange};
pub use movement::{InputOutcome, MotionState, Movement, QueuedTurn, StepOutcome};
pub use registry::{EntityRegistry, RegistryError};

/// Where committed entity state becomes visible.
pub trait RenderSurface {
    /// Makes the entity's position and transform authoritative.
    fn commit(&mut self, entity: &Entity);
    fn detach(&mut self, id: EntityId);
}

/// Surface that draws nothing, for headless runs and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSurface;

impl RenderSurface for NullSurface {
    fn commit(&mut self, _entity: &Entity) {}

    fn detach(&mut self, _id: EntityId) {}
}

/// Per-step callbacks from the world into game logic.
pub trait StepHooks: CollisionHandler {
    fn on_countdown_expired(&mut self, _world: &mut SimWorld, _id: EntityId, _label: &'static str) {}
}

impl<F> StepHooks for F where F: FnMut(&mut SimWorld, Collision) {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    pub moved: usize,
    pub teleported: usize,
    pub collisions: usize,
    pub expired: usize,
}

/// Read-only snapshot of one collider for debug views.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugBox {
    pub id: EntityId,
    pub kind: &'static str,
    pub collision_box: CollisionBox,
    pub tiles: Vec<TileKey>,
}

#[derive(Debug)]
pub struct SimWorld {
    board: Board,
    pub(crate) registry: EntityRegistry,
    pub(crate) grid: SpatialGrid,
    fixed_step: Duration,
    render_queue: Vec<EntityId>,
    step_count: u64,
}

impl SimWorld {
    pub fn new(board: Board, fixed_step: Duration) -> Self {
        Self {
            board,
            registry: EntityRegistry::new(),
            grid: SpatialGrid::new(),
            fixed_step,
            render_queue: Vec::new(),
            step_count: 0,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn geometry(&self) -> BoardGeometry {
        self.board.geometry()
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    pub fn fixed_step(&self) -> Duration {
        self.fixed_step
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.registry.get(id)
    }

    pub fn id_by_name(&self, name: &str) -> Option<EntityId> {
        self.registry.id_by_name(name)
    }

    /// Live entities, skipping ones awaiting deletion.
    pub fn live_entities(&self) -> impl Iterator<Item = &Entity> {
        self.registry.iter().filter(|entity| !entity.is_deleted())
    }

    pub fn spawn(&mut self, mut desc: EntityDesc) -> Result<EntityId, RegistryError> {
        if let Some(movement) = desc.movement.as_mut() {
            movement.set_fixed_step_seconds(self.fixed_step.as_secs_f32());
        }
        let id = self.registry.register(desc)?;
        self.sync_tiles(id);
        self.queue_render(id);
        debug!(entity = %id, "entity_spawned");
        Ok(id)
    }

    /// Places an entity without interpolating from its old spot. Non-finite
    /// positions are refused.
    pub fn set_position(&mut self, id: EntityId, position: Vec2) -> bool {
        if !position.is_finite() {
            warn!(entity = %id, x = position.x, y = position.y, "non_finite_position_skipped");
            return false;
        }
        let Some(entity) = self.registry.get_mut(id) else {
            return false;
        };
        entity.position = position;
        entity.previous_position = position;
        entity.transform = Vec2::ZERO;
        self.sync_tiles(id);
        self.queue_render(id);
        true
    }

    pub fn start_moving(&mut self, id: EntityId, direction: Direction, from_turn: Option<TurnId>) {
        let Some(entity) = self.registry.get_mut(id) else {
            return;
        };
        let turn = from_turn.and_then(|turn| self.board.turn(turn));
        let before = entity.position;
        movement::start_moving(entity, direction, turn);
        if entity.position != before {
            entity.previous_position = entity.position;
            self.sync_tiles(id);
            self.queue_render(id);
        }
    }

    pub fn stop_moving(&mut self, id: EntityId) {
        if let Some(entity) = self.registry.get_mut(id) {
            movement::stop_moving(entity);
            self.queue_render(id);
        }
    }

    /// Respawn placement: the entity stops on the waypoint and may only leave
    /// it through that waypoint's exits.
    pub fn park(&mut self, id: EntityId, turn: TurnId) -> bool {
        let Some(turn) = self.board.turn(turn) else {
            return false;
        };
        let Some(entity) = self.registry.get_mut(id) else {
            return false;
        };
        if entity.movement.is_none() {
            return false;
        }
        movement::park(entity, turn);
        self.sync_tiles(id);
        self.queue_render(id);
        true
    }

    pub fn queue_turn(&mut self, id: EntityId, direction: Direction, turn: Option<TurnId>) {
        if let Some(movement) = self
            .registry
            .get_mut(id)
            .and_then(|entity| entity.movement.as_mut())
        {
            movement.queue_turn(direction, turn);
        }
    }

    pub fn clear_queued_turn(&mut self, id: EntityId) {
        if let Some(movement) = self
            .registry
            .get_mut(id)
            .and_then(|entity| entity.movement.as_mut())
        {
            movement.clear_queued_turn();
        }
    }

    pub fn set_speed(&mut self, id: EntityId, speed: f32) {
        if let Some(movement) = self
            .registry
            .get_mut(id)
            .and_then(|entity| entity.movement.as_mut())
        {
            movement.set_speed(speed);
        }
    }

    /// Steering entry point for input-driven movers.
    pub fn handle_input(&mut self, id: EntityId, direction: Direction) -> InputOutcome {
        let Some(entity) = self.registry.get_mut(id) else {
            return InputOutcome::Ignored;
        };
        if entity.deleted {
            return InputOutcome::Ignored;
        }
        let before = entity.position;
        let outcome = movement::handle_input(entity, &self.board, direction);
        if entity.position != before {
            entity.previous_position = entity.position;
            self.sync_tiles(id);
            self.queue_render(id);
        }
        outcome
    }

    pub fn mark_deleted(&mut self, id: EntityId) -> bool {
        let marked = self.registry.mark_deleted(id);
        if marked {
            debug!(entity = %id, "entity_marked_deleted");
        }
        marked
    }

    pub fn set_countdown(&mut self, id: EntityId, countdown: Countdown) -> bool {
        self.registry.set_countdown(id, countdown)
    }

    pub fn clear_countdown(&mut self, id: EntityId) -> Option<Countdown> {
        self.registry.clear_countdown(id)
    }

    /// One fixed simulation step: movers tick in registry order and each
    /// resolves its collisions before the next one moves; countdowns run last.
    pub fn step<H>(&mut self, hooks: &mut H) -> StepReport
    where
        H: StepHooks + ?Sized,
    {
        self.step_count = self.step_count.saturating_add(1);
        let mut report = StepReport::default();

        let movers = self.registry.moveable_ids().to_vec();
        for id in movers {
            let Some(entity) = self.registry.get_mut(id) else {
                continue;
            };
            if entity.deleted {
                continue;
            }
            let old_box = entity.collision_box();
            entity.previous_position = entity.position;
            let outcome = movement::tick(entity, &self.board);
            if !outcome.moved {
                continue;
            }
            report.moved += 1;
            if outcome.teleported {
                report.teleported += 1;
                debug!(entity = %id, "entity_teleported");
            }
            if let Some(turn) = outcome.stopped_at {
                debug!(entity = %id, turn = turn.0, "entity_stopped");
            }
            self.sync_tiles(id);
            self.queue_render(id);
            report.collisions +=
                look_for_collisions(self, id, old_box, outcome.teleported, &mut *hooks);
        }

        let step_ms = self.fixed_step.as_secs_f64() * 1000.0;
        let tickable = self.registry.tickable_ids().to_vec();
        for id in tickable {
            let Some(entity) = self.registry.get_mut(id) else {
                continue;
            };
            if entity.deleted {
                continue;
            }
            let Some(countdown) = entity.countdown.as_mut() else {
                continue;
            };
            if !countdown.tick(step_ms) {
                continue;
            }
            let label = countdown.label;
            self.registry.clear_countdown(id);
            report.expired += 1;
            hooks.on_countdown_expired(self, id, label);
        }
        report
    }

    /// Blends every moving entity between its pre-step and post-step position.
    pub fn interpolate(&mut self, alpha: f32) -> usize {
        let mut blended = 0;
        let movers = self.registry.moveable_ids().to_vec();
        for id in movers {
            let Some(entity) = self.registry.get_mut(id) else {
                continue;
            };
            if entity.deleted {
                continue;
            }
            let old = entity.previous_position;
            if movement::interpolate(entity, alpha, old) {
                blended += 1;
                self.queue_render(id);
            }
        }
        blended
    }

    /// Animations follow real frame time rather than the fixed step.
    pub fn advance_animations(&mut self, delta: Duration) {
        let delta_ms = delta.as_secs_f64() * 1000.0;
        let animated = self.registry.animated_ids().to_vec();
        for id in animated {
            let changed = self
                .registry
                .get_mut(id)
                .and_then(|entity| entity.animation.as_mut())
                .is_some_and(|animation| animation.advance(delta_ms));
            if changed {
                self.queue_render(id);
            }
        }
    }

    pub fn halt_animations(&mut self) {
        self.for_each_animation(Animation::halt);
    }

    pub fn resume_animations(&mut self) {
        self.for_each_animation(Animation::resume);
    }

    fn for_each_animation(&mut self, apply: impl Fn(&mut Animation)) {
        let animated = self.registry.animated_ids().to_vec();
        for id in animated {
            if let Some(animation) = self
                .registry
                .get_mut(id)
                .and_then(|entity| entity.animation.as_mut())
            {
                apply(animation);
            }
        }
    }

    pub fn queue_render(&mut self, id: EntityId) {
        if let Some(entity) = self.registry.get_mut(id) {
            if !entity.render_queued {
                entity.render_queued = true;
                self.render_queue.push(id);
            }
        }
    }

    pub fn pending_renders(&self) -> usize {
        self.render_queue.len()
    }

    pub fn flush_renders(&mut self, surface: &mut dyn RenderSurface) -> usize {
        let mut committed = 0;
        for id in std::mem::take(&mut self.render_queue) {
            let Some(entity) = self.registry.get_mut(id) else {
                continue;
            };
            entity.render_queued = false;
            if entity.deleted {
                continue;
            }
            surface.commit(entity);
            committed += 1;
        }
        committed
    }

    /// Purges entities marked during the frame from the registry and the grid.
    pub fn flush_deletions(&mut self, surface: &mut dyn RenderSurface) -> usize {
        let purged = self.registry.flush_deletions();
        for entity in &purged {
            if let Some(range) = entity.collider.as_ref().and_then(|collider| collider.occupied) {
                self.grid.remove_range(entity.id, range);
            }
            surface.detach(entity.id);
            debug!(entity = %entity.id, name = %entity.name, "entity_deleted");
        }
        purged.len()
    }

    /// Drops every entity and grid record; the board is kept.
    pub fn teardown(&mut self) -> usize {
        let count = self.registry.len();
        self.registry = EntityRegistry::new();
        self.grid.clear();
        self.render_queue.clear();
        count
    }

    pub fn debug_boxes(&self) -> Vec<DebugBox> {
        self.live_entities()
            .filter_map(|entity| {
                let collision_box = entity.collision_box()?;
                Some(DebugBox {
                    id: entity.id,
                    kind: entity.kind,
                    collision_box,
                    tiles: self.grid.tiles_of(entity.id),
                })
            })
            .collect()
    }

    pub(crate) fn sync_tiles(&mut self, id: EntityId) {
        let geometry = self.board.geometry();
        let Some(entity) = self.registry.get_mut(id) else {
            return;
        };
        let Some(collision_box) = entity.collision_box() else {
            return;
        };
        let Some(collider) = entity.collider.as_mut() else {
            return;
        };
        let next = geometry.tile_range(&collision_box);
        self.grid.relocate(id, collider.occupied, next);
        collider.occupied = Some(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: Duration = Duration::from_millis(100);

    fn world() -> SimWorld {
        let data = BoardData {
            columns: 8,
            rows: 5,
            tile_size: 16,
            layout: vec![
                "########".to_string(),
                "#      #".to_string(),
                "# #### #".to_string(),
                "T      T".to_string(),
                "########".to_string(),
            ],
            turns: None,
        };
        SimWorld::new(Board::from_data(&data).expect("board"), STEP)
    }

    fn actor(world: &SimWorld, name: &str, col: i32, layout_row: i32, speed: f32) -> EntityDesc {
        let key = TileKey::new(col, world.geometry().invert_row(layout_row));
        let size = Size::square(16.0);
        let position = world.board().place_at_tile(key, size).expect("placement");
        EntityDesc::new(name, "actor", size, position)
            .with_movement(Movement::new(speed, 1.0))
            .with_collider(Collider::new(&["actor"]).with_percent(50))
    }

    fn assert_tiles_match(world: &SimWorld) {
        for entity in world.live_entities() {
            let Some(collision_box) = entity.collision_box() else {
                continue;
            };
            let mut expected = world.geometry().tiles_for(&collision_box);
            expected.sort();
            assert_eq!(world.grid().tiles_of(entity.id()), expected, "{}", entity.name());
        }
    }

    fn no_hooks() -> impl StepHooks {
        |_: &mut SimWorld, _: Collision| {}
    }

    #[test]
    fn spawn_rescales_movement_to_the_world_step() {
        let mut world = world();
        let id = world.spawn(actor(&world, "a", 1, 1, 40.0)).expect("spawn");
        let movement = world.entity(id).and_then(Entity::movement).expect("movement");
        assert_eq!(movement.distance_per_tick(), 4.0);
    }

    #[test]
    fn grid_tracks_every_collider_while_moving() {
        let mut world = world();
        let a = world.spawn(actor(&world, "a", 1, 1, 30.0)).expect("a");
        let b = world.spawn(actor(&world, "b", 6, 3, 50.0)).expect("b");
        world.start_moving(a, Direction::Right, None);
        world.start_moving(b, Direction::Left, None);
        let mut hooks = no_hooks();
        for _ in 0..80 {
            world.step(&mut hooks);
            assert_tiles_match(&world);
        }
    }

    #[test]
    fn identical_runs_end_in_identical_positions() {
        let run = || {
            let mut world = world();
            let a = world.spawn(actor(&world, "a", 1, 1, 30.0)).expect("a");
            let b = world.spawn(actor(&world, "b", 1, 3, 45.0)).expect("b");
            world.start_moving(a, Direction::Right, None);
            world.handle_input(b, Direction::Right);
            let mut hooks = no_hooks();
            for step in 0..60 {
                if step == 20 {
                    world.handle_input(a, Direction::Down);
                }
                world.step(&mut hooks);
            }
            (
                world.entity(a).map(Entity::position),
                world.entity(b).map(Entity::position),
            )
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn tunnel_mouth_teleports_and_keeps_direction() {
        let mut world = world();
        let id = world.spawn(actor(&world, "a", 1, 3, 40.0)).expect("a");
        world.start_moving(id, Direction::Left, None);
        let mut hooks = no_hooks();
        let mut teleported = 0;
        for _ in 0..8 {
            teleported += world.step(&mut hooks).teleported;
        }
        assert_eq!(teleported, 1);
        let entity = world.entity(id).expect("a");
        assert!(entity.center().x > 100.0);
        assert_eq!(
            entity.movement().and_then(Movement::current_direction),
            Some(Direction::Left)
        );
    }

    #[test]
    fn parked_mover_rests_on_the_waypoint_and_leaves_through_its_exits() {
        let mut world = world();
        let id = world.spawn(actor(&world, "a", 3, 1, 40.0)).expect("a");
        world.start_moving(id, Direction::Right, None);
        let mut hooks = no_hooks();
        world.step(&mut hooks);

        let corner = TileKey::new(1, world.geometry().invert_row(1));
        let turn = world.board().turn_at(corner).map(|turn| turn.id).expect("corner turn");
        assert!(world.park(id, turn));
        let entity = world.entity(id).expect("a");
        assert_eq!(entity.center(), world.geometry().tile_center(corner));
        let movement = entity.movement().expect("movement");
        assert_eq!(movement.stopped_at(), Some(turn));
        assert!(!movement.is_moving());

        assert_eq!(world.handle_input(id, Direction::Up), InputOutcome::Ignored);
        assert_eq!(world.handle_input(id, Direction::Right), InputOutcome::Started);
        assert!(!world.park(id, TurnId(u32::MAX)));
    }

    #[test]
    fn countdown_expiry_fires_once_and_leaves_the_tickable_index() {
        struct Recorder(Vec<&'static str>);
        impl CollisionHandler for Recorder {
            fn on_collision(&mut self, _: &mut SimWorld, _: Collision) {}
        }
        impl StepHooks for Recorder {
            fn on_countdown_expired(&mut self, _: &mut SimWorld, _: EntityId, label: &'static str) {
                self.0.push(label);
            }
        }

        let mut world = world();
        let id = world
            .spawn(
                EntityDesc::new("timer", "timer", Size::square(4.0), Vec2::ZERO)
                    .with_countdown(Countdown::new("frightened", 250.0)),
            )
            .expect("timer");
        let mut recorder = Recorder(Vec::new());
        for _ in 0..5 {
            world.step(&mut recorder);
        }
        assert_eq!(recorder.0, vec!["frightened"]);
        assert!(world.registry().tickable_ids().is_empty());
        assert!(world.entity(id).and_then(Entity::countdown).is_none());
    }

    #[test]
    fn renders_are_queued_once_and_deleted_entities_detach() {
        #[derive(Default)]
        struct Recording {
            committed: Vec<EntityId>,
            detached: Vec<EntityId>,
        }
        impl RenderSurface for Recording {
            fn commit(&mut self, entity: &Entity) {
                self.committed.push(entity.id());
            }
            fn detach(&mut self, id: EntityId) {
                self.detached.push(id);
            }
        }

        let mut world = world();
        let id = world.spawn(actor(&world, "a", 1, 1, 40.0)).expect("a");
        world.queue_render(id);
        world.set_position(id, Vec2::new(20.0, 16.0));
        let mut surface = Recording::default();
        assert_eq!(world.flush_renders(&mut surface), 1);

        assert!(!world.set_position(id, Vec2::new(f32::INFINITY, 0.0)));
        world.mark_deleted(id);
        assert_eq!(world.flush_renders(&mut surface), 0);
        assert_eq!(world.flush_deletions(&mut surface), 1);
        assert_eq!(surface.committed, vec![id]);
        assert_eq!(surface.detached, vec![id]);
        assert_eq!(world.grid().occupied_tile_count(), 0);
    }

    #[test]
    fn interpolation_skips_movers_marked_deleted() {
        struct Discard;
        impl RenderSurface for Discard {
            fn commit(&mut self, _: &Entity) {}
            fn detach(&mut self, _: EntityId) {}
        }

        let mut world = world();
        let a = world.spawn(actor(&world, "a", 1, 1, 40.0)).expect("a");
        let b = world.spawn(actor(&world, "b", 6, 3, 40.0)).expect("b");
        world.start_moving(a, Direction::Right, None);
        world.start_moving(b, Direction::Left, None);
        world.step(&mut no_hooks());
        world.flush_renders(&mut Discard);

        world.mark_deleted(b);
        assert_eq!(world.interpolate(0.5), 1);
        assert_eq!(world.pending_renders(), 1);
        assert_eq!(world.entity(b).map(Entity::transform), Some(Vec2::ZERO));
    }

    #[test]
    fn teardown_empties_registry_and_grid() {
        let mut world = world();
        world.spawn(actor(&world, "a", 1, 1, 40.0)).expect("a");
        world.spawn(actor(&world, "b", 2, 1, 40.0)).expect("b");
        assert_eq!(world.teardown(), 2);
        assert!(world.registry().is_empty());
        assert_eq!(world.grid().occupied_tile_count(), 0);
        assert!(world.debug_boxes().is_empty());
    }

    #[test]
    fn halted_animations_ignore_frame_time() {
        let mut world = world();
        let id = world
            .spawn(
                EntityDesc::new("blinker", "blinker", Size::square(4.0), Vec2::ZERO)
                    .with_animation(Animation::new(2, 100.0)),
            )
            .expect("blinker");
        world.halt_animations();
        world.advance_animations(Duration::from_millis(500));
        assert_eq!(world.entity(id).and_then(Entity::animation).map(Animation::frame), Some(0));
        world.resume_animations();
        world.advance_animations(Duration::from_millis(100));
        assert_eq!(world.entity(id).and_then(Entity::animation).map(Animation::frame), Some(1));
    }
}
