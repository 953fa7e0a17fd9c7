use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pacman_engine::world::movement::DEFAULT_COLLISION_PADDING;
use pacman_engine::world::{
    load_board, Animation, BoardGeometry, Cell, Collider, Countdown, DirectionSet, Movement, Size,
    TileKey,
};
use pacman_engine::{
    Board, BoardData, BoardError, Collision, CollisionHandler, Direction, Entity, EntityDesc,
    EntityId, Scene, SceneCommand, SceneError, SimWorld, StepHooks, Vec2,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

const KIND_PACMAN: &str = "pacman";
const KIND_GHOST: &str = "ghost";
const KIND_PELLET: &str = "pellet";
const KIND_POWER_PELLET: &str = "power_pellet";

const GHOST_COUNT: u8 = 4;
const GHOST_BOX_PERCENT: u8 = 50;
const FRIGHTENED_COUNTDOWN: &str = "frightened";

const PELLET_SCALE: f32 = 0.25;
const POWER_PELLET_SCALE: f32 = 0.5;
const POWER_PELLET_FRAMES: u32 = 2;
const POWER_PELLET_FRAME_MS: f64 = 250.0;

const PACMAN_COLOR: [u8; 4] = [255, 255, 0, 255];
const PELLET_COLOR: [u8; 4] = [255, 184, 151, 255];
const FRIGHTENED_COLOR: [u8; 4] = [33, 33, 255, 255];

include!("types.rs");
include!("systems.rs");
include!("scene_impl.rs");
include!("util.rs");

pub(crate) fn build_scene(board_path: PathBuf, rules: Rules) -> PacmanScene {
    PacmanScene::new(BoardSource::File(board_path), rules)
}

#[cfg(test)]
mod tests {
    include!("tests.rs");
}
