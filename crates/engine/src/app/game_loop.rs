use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::world::{Direction, RenderSurface, SimWorld};

use super::scene::{Scene, SceneCommand, SceneError};
use super::LoopConfig;

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("scene setup failed: {0}")]
    Setup(#[from] SceneError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
    Paused,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameReport {
    pub delta: Duration,
    pub clamped: bool,
    pub steps: u32,
    pub alpha: f32,
    pub committed: usize,
    pub deleted: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StepPlan {
    pub(crate) steps: u32,
    pub(crate) remaining_accumulator: Duration,
}

/// Whole fixed steps available in `accumulator` and what is left over.
pub(crate) fn plan_sim_steps(accumulator: Duration, fixed_step: Duration) -> StepPlan {
    if fixed_step.is_zero() {
        return StepPlan {
            steps: 0,
            remaining_accumulator: accumulator,
        };
    }
    let steps = (accumulator.as_nanos() / fixed_step.as_nanos()) as u32;
    StepPlan {
        steps,
        remaining_accumulator: accumulator.saturating_sub(fixed_step * steps),
    }
}

pub(crate) fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

/// Fixed-timestep driver for one scene.
///
/// The host calls [`GameLoop::frame`] once per display refresh. Time is banked
/// in an accumulator and spent in whole fixed steps; the remainder becomes the
/// interpolation factor for rendering.
pub struct GameLoop<S: Scene> {
    scene: S,
    world: Option<SimWorld>,
    state: LoopState,
    fixed_step: Duration,
    max_frame_delta: Duration,
    accumulator: Duration,
    last_timestamp: Option<Instant>,
    frame_count: u64,
}

impl<S: Scene> GameLoop<S> {
    pub fn new(scene: S, config: &LoopConfig) -> Self {
        Self {
            scene,
            world: None,
            state: LoopState::Stopped,
            fixed_step: config.fixed_step(),
            max_frame_delta: config.max_frame_delta(),
            accumulator: Duration::ZERO,
            last_timestamp: None,
            frame_count: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn fixed_step(&self) -> Duration {
        self.fixed_step
    }

    pub fn accumulator(&self) -> Duration {
        self.accumulator
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    /// World of the current session; kept after a full stop for inspection.
    pub fn world(&self) -> Option<&SimWorld> {
        self.world.as_ref()
    }

    pub fn world_mut(&mut self) -> Option<&mut SimWorld> {
        self.world.as_mut()
    }

    /// No-op while running. Resumes a paused loop with a zero first delta, or
    /// builds a fresh session from `Stopped`.
    pub fn run(&mut self) -> Result<(), LoopError> {
        match self.state {
            LoopState::Running => Ok(()),
            LoopState::Paused => {
                self.state = LoopState::Running;
                self.last_timestamp = None;
                if let Some(world) = self.world.as_mut() {
                    world.resume_animations();
                }
                info!(accumulator_ms = self.accumulator.as_secs_f64() * 1000.0, "loop_resumed");
                Ok(())
            }
            LoopState::Stopped => {
                if let Some(mut previous) = self.world.take() {
                    self.scene.unload(&mut previous);
                    previous.teardown();
                }
                let world = match self.scene.load(self.fixed_step) {
                    Ok(world) => world,
                    Err(source) => {
                        error!(error = %source, "scene_setup_failed");
                        return Err(LoopError::Setup(source));
                    }
                };
                info!(
                    fixed_step_ms = self.fixed_step.as_secs_f64() * 1000.0,
                    entity_count = world.registry().len(),
                    "loop_started"
                );
                self.world = Some(world);
                self.accumulator = Duration::ZERO;
                self.last_timestamp = None;
                self.frame_count = 0;
                self.state = LoopState::Running;
                Ok(())
            }
        }
    }

    /// Pausing keeps the banked time; a full stop discards it. Both halt animations.
    pub fn stop_game(&mut self, paused: bool) {
        match (self.state, paused) {
            (LoopState::Running, true) => {
                self.state = LoopState::Paused;
                info!(accumulator_ms = self.accumulator.as_secs_f64() * 1000.0, "loop_paused");
            }
            (LoopState::Running, false) | (LoopState::Paused, false) => {
                self.state = LoopState::Stopped;
                self.accumulator = Duration::ZERO;
                info!(frames = self.frame_count, "loop_stopped");
            }
            _ => return,
        }
        self.last_timestamp = None;
        if let Some(world) = self.world.as_mut() {
            world.halt_animations();
        }
    }

    /// Full stop followed by releasing the session's world.
    pub fn shutdown(&mut self) {
        self.stop_game(false);
        if let Some(mut world) = self.world.take() {
            self.scene.unload(&mut world);
            let dropped = world.teardown();
            info!(dropped, "world_torn_down");
        }
    }

    pub fn handle_input(&mut self, direction: Direction) {
        if self.state != LoopState::Running {
            return;
        }
        if let Some(world) = self.world.as_mut() {
            self.scene.handle_input(world, direction);
        }
    }

    /// One display frame at host time `now`. The first frame after start or
    /// resume sees a zero delta.
    pub fn frame(&mut self, now: Instant, surface: &mut dyn RenderSurface) -> FrameReport {
        if self.state != LoopState::Running {
            return FrameReport::default();
        }
        let raw_delta = match self.last_timestamp {
            Some(last) => now.saturating_duration_since(last),
            None => Duration::ZERO,
        };
        self.last_timestamp = Some(now);
        self.advance(raw_delta, surface)
    }

    /// Runs a frame with an explicit delta.
    pub fn advance(&mut self, raw_delta: Duration, surface: &mut dyn RenderSurface) -> FrameReport {
        if self.state != LoopState::Running {
            return FrameReport::default();
        }
        let delta = clamp_frame_delta(raw_delta, self.max_frame_delta);
        let clamped = delta < raw_delta;
        if clamped {
            warn!(
                raw_delta_ms = raw_delta.as_millis() as u64,
                max_frame_delta_ms = self.max_frame_delta.as_millis() as u64,
                "sim_clamp_triggered"
            );
        }
        self.accumulator = self.accumulator.saturating_add(delta);
        self.frame_count = self.frame_count.saturating_add(1);

        let Some(world) = self.world.as_mut() else {
            return FrameReport::default();
        };

        let plan = plan_sim_steps(self.accumulator, self.fixed_step);
        let mut steps = 0;
        let mut command = SceneCommand::None;
        while steps < plan.steps {
            self.scene.before_step(world);
            world.step(&mut self.scene);
            self.accumulator = self.accumulator.saturating_sub(self.fixed_step);
            steps += 1;
            command = self.scene.after_step(world);
            if command != SceneCommand::None {
                break;
            }
        }

        let alpha = if self.fixed_step.is_zero() {
            0.0
        } else {
            (self.accumulator.as_secs_f64() / self.fixed_step.as_secs_f64()) as f32
        };
        if command == SceneCommand::None {
            world.interpolate(alpha);
            world.advance_animations(delta);
        }
        let committed = world.flush_renders(surface);
        let deleted = world.flush_deletions(surface);
        debug!(steps, alpha, committed, deleted, "frame_done");

        match command {
            SceneCommand::None => {}
            SceneCommand::Pause => self.stop_game(true),
            SceneCommand::Stop => self.stop_game(false),
        }

        FrameReport {
            delta,
            clamped,
            steps,
            alpha,
            committed,
            deleted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{
        Board, BoardData, Collider, Collision, CollisionHandler, EntityDesc, EntityId, Movement,
        NullSurface, Size, StepHooks, TileKey, Vec2,
    };

    const FIXED_STEP: Duration = Duration::from_micros(33_330);

    #[derive(Default)]
    struct CorridorScene {
        player: Option<EntityId>,
        fail_setup: bool,
        stop_after_steps: Option<u64>,
        collisions: usize,
        loads: usize,
    }

    impl CollisionHandler for CorridorScene {
        fn on_collision(&mut self, _world: &mut SimWorld, _collision: Collision) {
            self.collisions += 1;
        }
    }

    impl StepHooks for CorridorScene {}

    impl Scene for CorridorScene {
        fn load(&mut self, fixed_step: Duration) -> Result<SimWorld, SceneError> {
            self.loads += 1;
            let data = BoardData {
                columns: 12,
                rows: 3,
                tile_size: 16,
                layout: vec![
                    "############".to_string(),
                    "#P         #".to_string(),
                    "############".to_string(),
                ],
                turns: None,
            };
            if self.fail_setup {
                return Err(SceneError::MissingSpawn("player".to_string()));
            }
            let board = Board::from_data(&data)?;
            let spawn = board
                .player_spawn()
                .ok_or_else(|| SceneError::MissingSpawn("player".to_string()))?;
            let size = Size::square(16.0);
            let position = board.place_at_tile(spawn, size)?;
            let mut world = SimWorld::new(board, fixed_step);
            let player = world.spawn(
                EntityDesc::new("player", "player", size, position)
                    .with_movement(Movement::new(120.0, 1.0))
                    .with_collider(Collider::new(&[])),
            )?;
            let pellet_position = world.board().place_at_tile(TileKey::new(6, 1), Size::square(4.0))?;
            world.spawn(
                EntityDesc::new("pellet", "pellet", Size::square(4.0), pellet_position)
                    .with_collider(Collider::new(&["player"])),
            )?;
            world.start_moving(player, Direction::Right, None);
            self.player = Some(player);
            Ok(world)
        }

        fn after_step(&mut self, world: &mut SimWorld) -> SceneCommand {
            match self.stop_after_steps {
                Some(limit) if world.step_count() >= limit => SceneCommand::Stop,
                _ => SceneCommand::None,
            }
        }
    }

    fn config() -> LoopConfig {
        LoopConfig {
            fixed_step: Some(FIXED_STEP),
            ..LoopConfig::default()
        }
    }

    fn running_loop(scene: CorridorScene) -> GameLoop<CorridorScene> {
        let mut game_loop = GameLoop::new(scene, &config());
        game_loop.run().expect("run");
        game_loop
    }

    fn player_position(game_loop: &GameLoop<CorridorScene>) -> Vec2 {
        let id = game_loop.scene().player.expect("player");
        game_loop
            .world()
            .and_then(|world| world.entity(id))
            .map(|entity| entity.position())
            .expect("player entity")
    }

    #[test]
    fn one_long_frame_runs_four_whole_steps() {
        let mut game_loop = running_loop(CorridorScene::default());
        let report = game_loop.advance(Duration::from_micros(133_330), &mut NullSurface);
        assert_eq!(report.steps, 4);
        assert_eq!(game_loop.accumulator(), Duration::from_micros(10));
        assert!(report.alpha < 0.001);
    }

    #[test]
    fn accumulator_is_conserved_across_frames() {
        let mut game_loop = running_loop(CorridorScene::default());
        let deltas = [7u64, 41, 19, 60, 3, 88, 33, 34];
        let mut total_steps = 0u32;
        let mut fed = Duration::ZERO;
        for millis in deltas {
            let delta = Duration::from_millis(millis);
            fed += delta;
            total_steps += game_loop.advance(delta, &mut NullSurface).steps;
            assert!(game_loop.accumulator() < FIXED_STEP);
        }
        assert_eq!(
            game_loop.accumulator(),
            fed - FIXED_STEP * total_steps
        );
        assert_eq!(plan_sim_steps(fed, FIXED_STEP).steps, total_steps);
    }

    #[test]
    fn long_stalls_are_clamped() {
        let mut game_loop = running_loop(CorridorScene::default());
        let report = game_loop.advance(Duration::from_secs(2), &mut NullSurface);
        assert!(report.clamped);
        assert_eq!(report.delta, Duration::from_millis(250));
        assert_eq!(report.steps, 7);
    }

    #[test]
    fn first_frame_after_start_has_zero_delta() {
        let mut game_loop = running_loop(CorridorScene::default());
        let start = Instant::now();
        let first = game_loop.frame(start, &mut NullSurface);
        assert_eq!(first.delta, Duration::ZERO);
        assert_eq!(first.steps, 0);
        let second = game_loop.frame(start + Duration::from_millis(70), &mut NullSurface);
        assert_eq!(second.delta, Duration::from_millis(70));
        assert_eq!(second.steps, 2);
    }

    #[test]
    fn identical_delta_sequences_give_identical_positions() {
        let deltas = [16u64, 17, 16, 50, 9, 33, 16, 120, 16, 16];
        let run = || {
            let mut game_loop = running_loop(CorridorScene::default());
            for millis in deltas {
                game_loop.advance(Duration::from_millis(millis), &mut NullSurface);
            }
            player_position(&game_loop)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn pause_keeps_the_accumulator_and_full_stop_clears_it() {
        let mut game_loop = running_loop(CorridorScene::default());
        game_loop.advance(Duration::from_millis(50), &mut NullSurface);
        let banked = game_loop.accumulator();
        assert!(banked > Duration::ZERO);

        game_loop.stop_game(true);
        assert_eq!(game_loop.state(), LoopState::Paused);
        assert_eq!(game_loop.accumulator(), banked);
        let paused = game_loop.advance(Duration::from_millis(100), &mut NullSurface);
        assert_eq!(paused.steps, 0);

        game_loop.run().expect("resume");
        assert_eq!(game_loop.state(), LoopState::Running);
        assert_eq!(game_loop.accumulator(), banked);
        assert_eq!(game_loop.scene().loads, 1);

        game_loop.stop_game(false);
        assert_eq!(game_loop.state(), LoopState::Stopped);
        assert_eq!(game_loop.accumulator(), Duration::ZERO);
        assert!(game_loop.world().is_some());
    }

    #[test]
    fn run_while_running_is_a_no_op_and_run_after_stop_reloads() {
        let mut game_loop = running_loop(CorridorScene::default());
        game_loop.advance(Duration::from_millis(100), &mut NullSurface);
        let moved = player_position(&game_loop);
        game_loop.run().expect("no-op");
        assert_eq!(game_loop.scene().loads, 1);
        assert_eq!(player_position(&game_loop), moved);

        game_loop.stop_game(false);
        game_loop.run().expect("fresh session");
        assert_eq!(game_loop.scene().loads, 2);
        assert_ne!(player_position(&game_loop), moved);
    }

    #[test]
    fn setup_failure_leaves_the_loop_stopped() {
        let mut game_loop = GameLoop::new(
            CorridorScene {
                fail_setup: true,
                ..CorridorScene::default()
            },
            &config(),
        );
        assert!(matches!(game_loop.run(), Err(LoopError::Setup(_))));
        assert_eq!(game_loop.state(), LoopState::Stopped);
        assert!(game_loop.world().is_none());
    }

    #[test]
    fn scene_stop_command_ends_the_frame_early() {
        let mut game_loop = running_loop(CorridorScene {
            stop_after_steps: Some(2),
            ..CorridorScene::default()
        });
        let report = game_loop.advance(Duration::from_millis(200), &mut NullSurface);
        assert_eq!(report.steps, 2);
        assert_eq!(game_loop.state(), LoopState::Stopped);
        assert_eq!(game_loop.accumulator(), Duration::ZERO);
    }

    #[test]
    fn player_reaches_the_pellet_and_collides() {
        let mut game_loop = running_loop(CorridorScene::default());
        for _ in 0..30 {
            game_loop.advance(Duration::from_millis(34), &mut NullSurface);
        }
        assert!(game_loop.scene().collisions > 0);
    }
}
