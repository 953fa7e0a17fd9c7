mod game_loop;
mod input;
mod loop_runner;
mod metrics;
mod rendering;
mod scene;

pub use game_loop::{FrameReport, GameLoop, LoopError, LoopState};
pub use input::InputAction;
pub use loop_runner::{run_app, run_app_with_metrics, AppError, LoopConfig, SLOW_FRAME_ENV_VAR};
pub use metrics::{LoopMetricsSnapshot, MetricsHandle};
pub use rendering::{
    integer_scale, DebugLayer, FrameInputs, PixelRect, Renderer, Sprite, SpriteList, Viewport,
};
pub use scene::{Scene, SceneCommand, SceneError};
