use std::env;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pixels::Error as PixelsError;
use thiserror::Error;
use tracing::{error, info, warn};
use winit::dpi::LogicalSize;
use winit::error::{EventLoopError, OsError};
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::{Window, WindowBuilder};

use super::game_loop::{GameLoop, LoopError, LoopState};
use super::input::{InputAction, InputCollector};
use super::metrics::MetricsAccumulator;
use super::rendering::{integer_scale, DebugLayer, FrameInputs, Renderer, Viewport};
use super::{MetricsHandle, Scene};
use crate::world::EntityId;

pub const SLOW_FRAME_ENV_VAR: &str = "PACMAN_SLOW_FRAME_MS";

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    pub target_tps: u32,
    /// Overrides the step derived from `target_tps` when set and non-zero.
    pub fixed_step: Option<Duration>,
    pub max_frame_delta: Duration,
    pub metrics_log_interval: Duration,
    pub simulated_slow_frame_ms: u64,
    pub max_render_fps: Option<u32>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            window_title: "Pac-Man".to_string(),
            window_width: 896,
            window_height: 992,
            target_tps: 30,
            fixed_step: None,
            max_frame_delta: Duration::from_millis(250),
            metrics_log_interval: Duration::from_secs(1),
            simulated_slow_frame_ms: 0,
            max_render_fps: None,
        }
    }
}

impl LoopConfig {
    pub fn fixed_step(&self) -> Duration {
        match self.fixed_step.filter(|step| !step.is_zero()) {
            Some(step) => step,
            None => Duration::from_secs_f64(1.0 / self.target_tps.max(1) as f64),
        }
    }

    pub fn max_frame_delta(&self) -> Duration {
        normalize_non_zero_duration(self.max_frame_delta, Duration::from_millis(250))
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Loop(#[from] LoopError),
    #[error("scene produced no world to render")]
    MissingWorld,
    #[error("failed to create event loop: {0}")]
    CreateEventLoop(#[source] EventLoopError),
    #[error("failed to create application window: {0}")]
    CreateWindow(#[source] OsError),
    #[error("failed to initialize renderer: {0}")]
    CreateRenderer(#[source] PixelsError),
    #[error("event loop failed: {0}")]
    EventLoopRun(#[source] EventLoopError),
}

pub fn run_app<S: Scene>(config: LoopConfig, scene: S) -> Result<(), AppError> {
    let metrics_handle = MetricsHandle::default();
    run_app_with_metrics(config, scene, metrics_handle)
}

pub fn run_app_with_metrics<S: Scene>(
    config: LoopConfig,
    scene: S,
    metrics_handle: MetricsHandle,
) -> Result<(), AppError> {
    let mut game_loop = GameLoop::new(scene, &config);
    game_loop.run()?;
    let board_viewport = game_loop
        .world()
        .map(|world| Viewport::of_board(&world.geometry()))
        .ok_or(AppError::MissingWorld)?;
    let scale = integer_scale(
        board_viewport,
        Viewport {
            width: config.window_width,
            height: config.window_height,
        },
    );

    let event_loop = EventLoop::new().map_err(AppError::CreateEventLoop)?;
    let window: Arc<Window> = Arc::new(
        WindowBuilder::new()
            .with_title(config.window_title.clone())
            .with_inner_size(LogicalSize::new(
                (board_viewport.width * scale) as f64,
                (board_viewport.height * scale) as f64,
            ))
            .build(&event_loop)
            .map_err(AppError::CreateWindow)?,
    );
    let window_for_loop = Arc::clone(&window);
    let mut renderer = {
        let world = game_loop.world().ok_or(AppError::MissingWorld)?;
        Renderer::new(window, world.board()).map_err(AppError::CreateRenderer)?
    };

    event_loop.set_control_flow(ControlFlow::Poll);

    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    let slow_frame_delay = resolve_slow_frame_delay(config.simulated_slow_frame_ms);
    let effective_render_cap = normalize_render_fps_cap(config.max_render_fps);
    let render_frame_target = target_frame_duration(effective_render_cap);

    info!(
        target_tps = config.target_tps,
        fixed_step_ms = game_loop.fixed_step().as_secs_f64() * 1000.0,
        max_frame_delta_ms = config.max_frame_delta().as_millis() as u64,
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        slow_frame_delay_ms = slow_frame_delay.as_millis() as u64,
        render_fps_cap = %format_render_cap(effective_render_cap),
        window_scale = scale,
        "loop_config"
    );

    let mut input_collector = InputCollector::default();
    let mut last_present_instant = Instant::now();
    let mut metrics_accumulator = MetricsAccumulator::new(metrics_log_interval);
    let mut last_applied_title: Option<String> = None;
    let mut debug_visible = false;
    let mut paused_by_focus = false;

    event_loop
        .run(move |event, window_target| match event {
            Event::WindowEvent { window_id, event } if window_id == window_for_loop.id() => {
                match event {
                    WindowEvent::CloseRequested => {
                        info!(reason = "window_close", "shutdown_requested");
                        window_target.exit();
                    }
                    WindowEvent::Resized(new_size) => {
                        if let Err(error) = renderer.resize(new_size.width, new_size.height) {
                            warn!(error = %error, "renderer_resize_failed");
                            window_target.exit();
                        }
                    }
                    WindowEvent::ScaleFactorChanged { .. } => {
                        let size = window_for_loop.inner_size();
                        if let Err(error) = renderer.resize(size.width, size.height) {
                            warn!(error = %error, "renderer_resize_failed");
                            window_target.exit();
                        }
                    }
                    WindowEvent::Focused(false) => {
                        input_collector.release_all();
                        if game_loop.state() == LoopState::Running {
                            game_loop.stop_game(true);
                            paused_by_focus = true;
                        }
                    }
                    WindowEvent::Focused(true) => {
                        if paused_by_focus && game_loop.state() == LoopState::Paused {
                            resume(&mut game_loop);
                            window_for_loop.request_redraw();
                        }
                        paused_by_focus = false;
                    }
                    WindowEvent::KeyboardInput { event, .. } => {
                        input_collector.handle_key(event.physical_key, event.state);
                        for action in input_collector.drain_pressed() {
                            match action {
                                InputAction::Quit => {
                                    info!(reason = "escape_key", "shutdown_requested");
                                    window_target.exit();
                                }
                                InputAction::TogglePause => {
                                    paused_by_focus = false;
                                    match game_loop.state() {
                                        LoopState::Running => game_loop.stop_game(true),
                                        LoopState::Paused => resume(&mut game_loop),
                                        LoopState::Stopped => {}
                                    }
                                }
                                InputAction::ToggleDebug => {
                                    debug_visible = !debug_visible;
                                    info!(debug_visible, "debug_layer_toggled");
                                }
                                InputAction::Restart => {
                                    if game_loop.state() != LoopState::Stopped {
                                        continue;
                                    }
                                    match game_loop.run() {
                                        Ok(()) => {
                                            if let Some(world) = game_loop.world() {
                                                renderer.reset(world.board());
                                            }
                                        }
                                        Err(error) => {
                                            error!(error = %error, "restart_failed");
                                            window_target.exit();
                                        }
                                    }
                                }
                                InputAction::MoveUp
                                | InputAction::MoveDown
                                | InputAction::MoveLeft
                                | InputAction::MoveRight => {
                                    if let Some(direction) = action.direction() {
                                        game_loop.handle_input(direction);
                                    }
                                }
                            }
                        }
                        window_for_loop.request_redraw();
                    }
                    WindowEvent::RedrawRequested => {
                        if slow_frame_delay > Duration::ZERO && game_loop.is_running() {
                            // Debug stall only; the render cap below is separate.
                            thread::sleep(slow_frame_delay);
                        }

                        let now = Instant::now();
                        let report = game_loop.frame(now, &mut renderer);

                        let elapsed_since_last_present =
                            Instant::now().saturating_duration_since(last_present_instant);
                        let cap_sleep =
                            compute_cap_sleep(elapsed_since_last_present, render_frame_target);
                        if cap_sleep > Duration::ZERO {
                            thread::sleep(cap_sleep);
                        }

                        let debug_layer = if debug_visible {
                            game_loop.world().map(DebugLayer::capture)
                        } else {
                            None
                        };
                        let scene = game_loop.scene();
                        let palette = |id: EntityId, kind: &str| scene.palette_color(id, kind);
                        let inputs = FrameInputs {
                            palette: &palette,
                            debug: debug_layer.as_ref(),
                        };
                        if let Err(error) = renderer.render(&inputs) {
                            warn!(error = %error, "renderer_draw_failed");
                            window_target.exit();
                        }
                        last_present_instant = Instant::now();

                        let next_title = scene.debug_title();
                        if next_title != last_applied_title {
                            match &next_title {
                                Some(title) => window_for_loop.set_title(title),
                                None => window_for_loop.set_title(&config.window_title),
                            }
                            last_applied_title = next_title;
                        }

                        if game_loop.is_running() {
                            metrics_accumulator.record_frame(
                                report.delta,
                                report.steps,
                                report.clamped,
                            );
                        }
                        let live_entities = game_loop
                            .world()
                            .map(|world| world.live_entities().count())
                            .unwrap_or(0);
                        if let Some(snapshot) =
                            metrics_accumulator.maybe_snapshot(now, live_entities)
                        {
                            metrics_handle.publish(snapshot);
                            if game_loop.is_running() {
                                info!(
                                    fps = snapshot.fps,
                                    tps = snapshot.tps,
                                    frame_time_ms = snapshot.frame_time_ms,
                                    live_entities = snapshot.live_entities,
                                    clamped_frames = snapshot.clamped_frames,
                                    "loop_metrics"
                                );
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => {
                if game_loop.is_running() {
                    window_target.set_control_flow(ControlFlow::Poll);
                    window_for_loop.request_redraw();
                } else {
                    window_target.set_control_flow(ControlFlow::Wait);
                }
            }
            Event::LoopExiting => {
                game_loop.shutdown();
                info!("shutdown");
            }
            _ => {}
        })
        .map_err(AppError::EventLoopRun)
}

fn resume<S: Scene>(game_loop: &mut GameLoop<S>) {
    if let Err(error) = game_loop.run() {
        error!(error = %error, "resume_failed");
    }
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn normalize_render_fps_cap(cap: Option<u32>) -> Option<u32> {
    cap.filter(|value| *value > 0)
}

fn target_frame_duration(max_render_fps: Option<u32>) -> Option<Duration> {
    max_render_fps.map(|fps| Duration::from_secs_f64(1.0 / fps as f64))
}

fn compute_cap_sleep(elapsed: Duration, target: Option<Duration>) -> Duration {
    match target {
        Some(frame_target) if elapsed < frame_target => frame_target - elapsed,
        _ => Duration::ZERO,
    }
}

fn format_render_cap(cap: Option<u32>) -> String {
    match cap {
        Some(value) => value.to_string(),
        None => "off".to_string(),
    }
}

fn resolve_slow_frame_delay(config_slow_frame_ms: u64) -> Duration {
    parse_slow_frame_delay(env::var(SLOW_FRAME_ENV_VAR), config_slow_frame_ms)
}

fn parse_slow_frame_delay(
    value: Result<String, env::VarError>,
    config_slow_frame_ms: u64,
) -> Duration {
    match value {
        Ok(value) => match value.parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                warn!(
                    env_var = SLOW_FRAME_ENV_VAR,
                    value = value.as_str(),
                    "invalid slow-frame env var value; falling back to config"
                );
                Duration::from_millis(config_slow_frame_ms)
            }
        },
        Err(env::VarError::NotPresent) => Duration::from_millis(config_slow_frame_ms),
        Err(err) => {
            warn!(
                env_var = SLOW_FRAME_ENV_VAR,
                error = %err,
                "unable to read slow-frame env var; falling back to config"
            );
            Duration::from_millis(config_slow_frame_ms)
        }
    }
}
