use std::time::Duration;

use thiserror::Error;

use crate::world::{BoardError, Direction, EntityId, RegistryError, SimWorld, StepHooks};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneCommand {
    None,
    Pause,
    Stop,
}

#[derive(Debug, Error)]
pub enum SceneError {
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("board has no {0} spawn tile")]
    MissingSpawn(String),
}

/// Game logic driven by the loop. Collision and countdown reactions arrive
/// through the [`StepHooks`] supertrait while a step runs.
pub trait Scene: StepHooks {
    /// Builds the board and every entity of a fresh session.
    fn load(&mut self, fixed_step: Duration) -> Result<SimWorld, SceneError>;

    /// A decoded movement request from the player.
    fn handle_input(&mut self, _world: &mut SimWorld, _direction: Direction) {}

    /// Runs before the world steps; autonomous movers decide here.
    fn before_step(&mut self, _world: &mut SimWorld) {}

    /// Runs after each step, once collisions and countdowns have been handled.
    fn after_step(&mut self, _world: &mut SimWorld) -> SceneCommand {
        SceneCommand::None
    }

    fn unload(&mut self, _world: &mut SimWorld) {}

    /// Fill colour for an entity; `None` falls back to the placeholder colour.
    fn palette_color(&self, _id: EntityId, _kind: &str) -> Option<[u8; 4]> {
        None
    }

    fn debug_title(&self) -> Option<String> {
        None
    }
}
