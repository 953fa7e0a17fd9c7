//! Movement and turn state machine shared by every mobile entity.
//!
//! A mover is either stopped or moving in one direction. Each fixed step it
//! advances `distance_per_tick` pixels, unless a teleporter or waypoint lies
//! within reach ahead, in which case that transition is applied in place of
//! the plain advance so no committed position straddles it.

use super::board::{Board, Turn, TurnId};
use super::entity::Entity;
use super::geometry::{Direction, Vec2};

/// Extra arrival tolerance on top of the per-tick distance. Tuned, not derived.
pub const DEFAULT_COLLISION_PADDING: f32 = 1.5;

const AT_POINT_EPSILON: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    Stopped,
    Moving(Direction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedTurn {
    pub direction: Direction,
    /// Waypoint the turn is meant for; `None` applies at the first legal waypoint.
    pub turn: Option<TurnId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Movement {
    speed: f32,
    fixed_step_seconds: f32,
    distance_per_tick: f32,
    padding: f32,
    state: MotionState,
    requested: Option<Direction>,
    queued: Option<QueuedTurn>,
    frame: u64,
    stopped_at: Option<TurnId>,
    last_turn: Option<TurnId>,
}

impl Movement {
    pub fn new(speed: f32, fixed_step_seconds: f32) -> Self {
        Self {
            speed,
            fixed_step_seconds,
            distance_per_tick: speed * fixed_step_seconds,
            padding: DEFAULT_COLLISION_PADDING,
            state: MotionState::Stopped,
            requested: None,
            queued: None,
            frame: 0,
            stopped_at: None,
            last_turn: None,
        }
    }

    pub fn with_padding(mut self, padding: f32) -> Self {
        self.padding = padding.max(0.0);
        self
    }

    /// Parks the mover on `turn`, as if it had stopped there.
    pub fn resting_at(mut self, turn: TurnId) -> Self {
        self.stopped_at = Some(turn);
        self.last_turn = Some(turn);
        self
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
        self.distance_per_tick = speed * self.fixed_step_seconds;
    }

    pub(crate) fn set_fixed_step_seconds(&mut self, fixed_step_seconds: f32) {
        self.fixed_step_seconds = fixed_step_seconds;
        self.distance_per_tick = self.speed * fixed_step_seconds;
    }

    pub fn distance_per_tick(&self) -> f32 {
        self.distance_per_tick
    }

    pub fn padding(&self) -> f32 {
        self.padding
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    pub fn is_moving(&self) -> bool {
        matches!(self.state, MotionState::Moving(_))
    }

    pub fn current_direction(&self) -> Option<Direction> {
        match self.state {
            MotionState::Moving(direction) => Some(direction),
            MotionState::Stopped => None,
        }
    }

    pub fn requested_direction(&self) -> Option<Direction> {
        self.requested
    }

    pub fn queued_turn(&self) -> Option<QueuedTurn> {
        self.queued
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Waypoint the mover last came to rest on.
    pub fn stopped_at(&self) -> Option<TurnId> {
        self.stopped_at
    }

    /// Waypoint most recently passed, turned at, or stopped on.
    pub fn last_turn(&self) -> Option<TurnId> {
        self.last_turn
    }

    /// Single-slot queue: a newer request replaces whatever was pending.
    pub fn queue_turn(&mut self, direction: Direction, turn: Option<TurnId>) {
        self.requested = Some(direction);
        self.queued = Some(QueuedTurn { direction, turn });
    }

    pub fn clear_queued_turn(&mut self) {
        self.queued = None;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub moved: bool,
    pub teleported: bool,
    pub turned_at: Option<TurnId>,
    pub stopped_at: Option<TurnId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    Ignored,
    Started,
    Continued,
    Reversed,
    Turned(TurnId),
    Queued(Option<TurnId>),
}

/// Switches the mover into `direction`. With `from_turn` the mover is snapped
/// onto the waypoint center so repeated turns never accumulate drift.
pub(crate) fn start_moving(entity: &mut Entity, direction: Direction, from_turn: Option<&Turn>) {
    let half = entity.size().half();
    let Some(movement) = entity.movement.as_mut() else {
        return;
    };
    movement.state = MotionState::Moving(direction);
    movement.stopped_at = None;
    if movement
        .queued
        .is_some_and(|queued| queued.direction == direction)
    {
        movement.queued = None;
    }
    match from_turn {
        Some(turn) => {
            movement.last_turn = Some(turn.id);
            entity.position = turn.center - half;
        }
        None => movement.last_turn = None,
    }
}

pub(crate) fn stop_moving(entity: &mut Entity) {
    let Some(movement) = entity.movement.as_mut() else {
        return;
    };
    movement.state = MotionState::Stopped;
    movement.queued = None;
    movement.requested = None;
    entity.transform = Vec2::ZERO;
}

/// Stops the mover on `turn`'s center and marks it as resting there.
pub(crate) fn park(entity: &mut Entity, turn: &Turn) {
    let half = entity.size().half();
    stop_moving(entity);
    let Some(movement) = entity.movement.as_mut() else {
        return;
    };
    movement.stopped_at = Some(turn.id);
    movement.last_turn = Some(turn.id);
    entity.position = turn.center - half;
    entity.previous_position = entity.position;
}

/// One fixed step for a single mover.
///
/// Waypoints inside the step are handled in path order: the advance is capped
/// at each waypoint center, and the leftover distance carries past any
/// waypoint that lets the mover through.
pub(crate) fn tick(entity: &mut Entity, board: &Board) -> StepOutcome {
    let half = entity.size().half();
    let Some(movement) = entity.movement.as_mut() else {
        return StepOutcome::default();
    };
    movement.frame = movement.frame.saturating_add(1);
    let MotionState::Moving(direction) = movement.state else {
        return StepOutcome::default();
    };
    let padding = movement.padding;
    let mut remaining = movement.distance_per_tick;
    let moved = StepOutcome {
        moved: true,
        ..StepOutcome::default()
    };

    loop {
        let center = entity.position + half;
        if let Some(teleporter) = board.teleporter_ahead(center, direction, remaining, padding) {
            movement.last_turn = None;
            entity.position = teleporter.destination - half;
            entity.previous_position = entity.position;
            entity.transform = Vec2::ZERO;
            return StepOutcome {
                moved: true,
                teleported: true,
                ..StepOutcome::default()
            };
        }

        let Some(turn) = board.turn_ahead(center, direction, remaining + padding, movement.last_turn)
        else {
            entity.position = direction.step(entity.position, remaining);
            return moved;
        };

        if let Some(queued) = movement.queued {
            let meant_here = queued.turn.is_none() || queued.turn == Some(turn.id);
            if meant_here && queued.direction == direction {
                movement.queued = None;
            } else if meant_here && turn.allows(queued.direction) {
                start_moving(entity, queued.direction, Some(turn));
                return StepOutcome {
                    moved: true,
                    turned_at: Some(turn.id),
                    ..StepOutcome::default()
                };
            } else if queued.turn == Some(turn.id) {
                movement.queued = None;
            }
        }

        if !turn.allows(direction) {
            movement.last_turn = Some(turn.id);
            entity.position = turn.center - half;
            stop_moving(entity);
            if let Some(movement) = entity.movement.as_mut() {
                movement.stopped_at = Some(turn.id);
            }
            return StepOutcome {
                moved: true,
                stopped_at: Some(turn.id),
                ..StepOutcome::default()
            };
        }

        movement.last_turn = Some(turn.id);
        let to_turn = direction.ahead(center, turn.center).max(0.0);
        if to_turn >= remaining {
            entity.position = direction.step(entity.position, remaining);
            return moved;
        }
        entity.position = direction.step(entity.position, to_turn);
        remaining -= to_turn;
    }
}

/// Steering for input-driven movers.
///
/// Reversal is always legal. A perpendicular request turns immediately when
/// the mover sits on a waypoint that allows it, otherwise it is queued for the
/// next waypoint ahead.
pub(crate) fn handle_input(entity: &mut Entity, board: &Board, direction: Direction) -> InputOutcome {
    let center = entity.center();
    let Some(movement) = entity.movement.as_mut() else {
        return InputOutcome::Ignored;
    };
    movement.requested = Some(direction);
    let padding = movement.padding;

    match movement.state {
        MotionState::Stopped => match movement.stopped_at {
            Some(turn_id) => match board.turn(turn_id) {
                Some(turn) if turn.allows(direction) => {
                    start_moving(entity, direction, Some(turn));
                    InputOutcome::Started
                }
                _ => InputOutcome::Ignored,
            },
            None => {
                start_moving(entity, direction, None);
                InputOutcome::Started
            }
        },
        MotionState::Moving(current) if current == direction => {
            movement.queued = None;
            InputOutcome::Continued
        }
        MotionState::Moving(current) if current.opposite() == direction => {
            start_moving(entity, direction, None);
            InputOutcome::Reversed
        }
        MotionState::Moving(current) => {
            if let Some(turn) = board.turn_near(center, padding) {
                if turn.allows(direction) {
                    start_moving(entity, direction, Some(turn));
                    return InputOutcome::Turned(turn.id);
                }
            }
            let next = board.next_turn_ahead(center, current).map(|turn| turn.id);
            movement.queue_turn(direction, next);
            InputOutcome::Queued(next)
        }
    }
}

/// Blends the rendered offset between `old` and the committed position.
/// Returns false without touching the transform when there is nothing to blend.
pub(crate) fn interpolate(entity: &mut Entity, alpha: f32, old: Vec2) -> bool {
    if old == entity.position {
        return false;
    }
    let Some(movement) = entity.movement.as_ref() else {
        return false;
    };
    if movement.current_direction().is_none() {
        return false;
    }
    let alpha = alpha.clamp(0.0, 1.0);
    let blended = old.lerp(entity.position, alpha);
    entity.transform = blended - entity.position;
    true
}

pub(crate) fn at_point(a: Vec2, b: Vec2) -> bool {
    (a.x - b.x).abs() <= AT_POINT_EPSILON && (a.y - b.y).abs() <= AT_POINT_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::board::{Board, BoardData};
    use crate::world::entity::{EntityDesc, EntityId};
    use crate::world::geometry::Size;
    use crate::world::grid::TileKey;

    const STEP_SECONDS: f32 = 0.1;

    // 16px tiles. Row 1 (layout) is a corridor with a junction at column 3.
    fn board() -> Board {
        let data = BoardData {
            columns: 7,
            rows: 5,
            tile_size: 16,
            layout: vec![
                "#######".to_string(),
                "#     #".to_string(),
                "###.###".to_string(),
                "###.###".to_string(),
                "#######".to_string(),
            ],
            turns: None,
        };
        Board::from_data(&data).expect("board")
    }

    fn mover_at(board: &Board, col: i32, layout_row: i32, speed: f32) -> Entity {
        let key = TileKey::new(col, board.geometry().invert_row(layout_row));
        let size = Size::square(16.0);
        let position = board.geometry().tile_center(key) - size.half();
        Entity::from_desc(
            EntityId(0),
            EntityDesc::new("mover", "mover", size, position)
                .with_movement(Movement::new(speed, STEP_SECONDS)),
        )
    }

    fn movement(entity: &Entity) -> &Movement {
        entity.movement().expect("movement")
    }

    #[test]
    fn distance_per_tick_follows_speed_changes() {
        let mut movement = Movement::new(80.0, 0.1);
        assert_eq!(movement.distance_per_tick(), 8.0);
        movement.set_speed(40.0);
        assert_eq!(movement.distance_per_tick(), 4.0);
    }

    #[test]
    fn stopped_mover_only_counts_frames() {
        let board = board();
        let mut entity = mover_at(&board, 2, 1, 40.0);
        let before = entity.position();
        let outcome = tick(&mut entity, &board);
        assert!(!outcome.moved);
        assert_eq!(entity.position(), before);
        assert_eq!(movement(&entity).frame(), 1);
    }

    #[test]
    fn moving_left_decrements_x_by_distance_per_tick() {
        let board = board();
        let mut entity = mover_at(&board, 5, 1, 40.0);
        start_moving(&mut entity, Direction::Left, None);
        let before = entity.position();
        tick(&mut entity, &board);
        assert_eq!(entity.position().x, before.x - 4.0);
        assert_eq!(entity.position().y, before.y);
    }

    #[test]
    fn queue_keeps_only_the_latest_request() {
        let mut movement = Movement::new(40.0, STEP_SECONDS);
        movement.queue_turn(Direction::Up, None);
        movement.queue_turn(Direction::Down, Some(TurnId(2)));
        assert_eq!(
            movement.queued_turn(),
            Some(QueuedTurn {
                direction: Direction::Down,
                turn: Some(TurnId(2)),
            })
        );
    }

    #[test]
    fn queued_turn_is_taken_at_the_waypoint_and_snaps_to_its_center() {
        let board = board();
        let junction = board
            .turn_at(TileKey::new(3, board.geometry().invert_row(1)))
            .expect("junction")
            .clone();
        let mut entity = mover_at(&board, 5, 1, 40.0);
        start_moving(&mut entity, Direction::Left, None);
        let outcome = handle_input(&mut entity, &board, Direction::Down);
        assert_eq!(outcome, InputOutcome::Queued(Some(junction.id)));

        let mut turned = None;
        for _ in 0..20 {
            let step = tick(&mut entity, &board);
            if step.turned_at.is_some() {
                turned = step.turned_at;
                break;
            }
        }
        assert_eq!(turned, Some(junction.id));
        assert_eq!(entity.center(), junction.center);
        assert_eq!(movement(&entity).current_direction(), Some(Direction::Down));
        assert_eq!(movement(&entity).queued_turn(), None);
    }

    #[test]
    fn mover_stops_at_a_waypoint_that_blocks_its_direction() {
        let board = board();
        let mut entity = mover_at(&board, 3, 1, 40.0);
        start_moving(&mut entity, Direction::Right, None);
        let mut stopped = None;
        for _ in 0..30 {
            let step = tick(&mut entity, &board);
            if step.stopped_at.is_some() {
                stopped = step.stopped_at;
                break;
            }
        }
        let corner = board
            .turn_at(TileKey::new(5, board.geometry().invert_row(1)))
            .expect("corner");
        assert_eq!(stopped, Some(corner.id));
        assert_eq!(entity.center(), corner.center);
        assert_eq!(movement(&entity).state(), MotionState::Stopped);
        assert_eq!(movement(&entity).stopped_at(), Some(corner.id));

        assert_eq!(
            handle_input(&mut entity, &board, Direction::Right),
            InputOutcome::Ignored
        );
        assert_eq!(
            handle_input(&mut entity, &board, Direction::Left),
            InputOutcome::Started
        );
    }

    #[test]
    fn fast_mover_stops_at_a_blocking_waypoint_past_an_open_one() {
        let board = board();
        // 40px per tick, more than two tiles.
        let mut entity = mover_at(&board, 3, 1, 400.0);
        entity.position = entity.position - Vec2::new(2.0, 0.0);
        start_moving(&mut entity, Direction::Right, None);

        let outcome = tick(&mut entity, &board);
        let corner = board
            .turn_at(TileKey::new(5, board.geometry().invert_row(1)))
            .expect("corner");
        assert_eq!(outcome.stopped_at, Some(corner.id));
        assert_eq!(entity.center(), corner.center);
        assert_eq!(entity.center().x, 88.0);
        assert_eq!(movement(&entity).state(), MotionState::Stopped);

        for _ in 0..5 {
            tick(&mut entity, &board);
            let key = board.geometry().tile_key_at(entity.center());
            assert!(board.is_walkable(key));
        }
        assert_eq!(entity.center(), corner.center);
    }

    #[test]
    fn fast_mover_takes_a_queued_turn_at_the_second_waypoint_in_reach() {
        let board = board();
        let junction = board
            .turn_at(TileKey::new(3, board.geometry().invert_row(1)))
            .expect("junction")
            .clone();
        let mut entity = mover_at(&board, 5, 1, 400.0);
        entity.position = entity.position + Vec2::new(2.0, 0.0);
        start_moving(&mut entity, Direction::Left, None);
        entity
            .movement
            .as_mut()
            .expect("movement")
            .queue_turn(Direction::Down, Some(junction.id));

        let outcome = tick(&mut entity, &board);
        assert_eq!(outcome.turned_at, Some(junction.id));
        assert_eq!(entity.center(), junction.center);
        assert_eq!(movement(&entity).current_direction(), Some(Direction::Down));
    }

    #[test]
    fn leftover_distance_carries_past_an_open_waypoint() {
        let board = board();
        let mut entity = mover_at(&board, 2, 1, 200.0);
        entity.position = entity.position + Vec2::new(4.0, 0.0);
        start_moving(&mut entity, Direction::Right, None);
        let before = entity.center().x;

        let outcome = tick(&mut entity, &board);
        assert_eq!(outcome.stopped_at, None);
        assert_eq!(entity.center().x, before + 20.0);
        let junction = board
            .turn_at(TileKey::new(3, board.geometry().invert_row(1)))
            .expect("junction");
        assert_eq!(movement(&entity).last_turn(), Some(junction.id));
    }

    #[test]
    fn reversal_is_immediate_without_a_waypoint() {
        let board = board();
        let mut entity = mover_at(&board, 4, 1, 40.0);
        start_moving(&mut entity, Direction::Left, None);
        tick(&mut entity, &board);
        assert_eq!(
            handle_input(&mut entity, &board, Direction::Right),
            InputOutcome::Reversed
        );
        assert_eq!(movement(&entity).current_direction(), Some(Direction::Right));
    }

    #[test]
    fn stop_clears_queue_and_is_idempotent() {
        let board = board();
        let mut entity = mover_at(&board, 5, 1, 40.0);
        start_moving(&mut entity, Direction::Left, None);
        handle_input(&mut entity, &board, Direction::Down);
        stop_moving(&mut entity);
        stop_moving(&mut entity);
        let movement = movement(&entity);
        assert_eq!(movement.state(), MotionState::Stopped);
        assert_eq!(movement.queued_turn(), None);
        assert_eq!(movement.requested_direction(), None);
    }

    #[test]
    fn interpolation_blends_and_skips_when_nothing_moved() {
        let board = board();
        let mut entity = mover_at(&board, 5, 1, 40.0);
        start_moving(&mut entity, Direction::Left, None);
        let old = entity.position();
        tick(&mut entity, &board);

        assert!(interpolate(&mut entity, 0.25, old));
        assert_eq!(entity.transform(), Vec2::new(3.0, 0.0));
        assert_eq!(entity.render_position().x, old.x - 1.0);

        let current = entity.position();
        assert!(!interpolate(&mut entity, 0.9, current));
        assert_eq!(entity.transform(), Vec2::new(3.0, 0.0));
    }

    #[test]
    fn interpolation_skips_stopped_movers() {
        let board = board();
        let mut entity = mover_at(&board, 5, 1, 40.0);
        let old = entity.position() - Vec2::new(4.0, 0.0);
        assert!(!interpolate(&mut entity, 0.5, old));
        assert_eq!(entity.transform(), Vec2::ZERO);
    }
}
