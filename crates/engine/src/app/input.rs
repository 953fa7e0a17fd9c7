use winit::event::ElementState;
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::world::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputAction {
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    TogglePause,
    ToggleDebug,
    Restart,
    Quit,
}

const ACTION_COUNT: usize = 8;

impl InputAction {
    const fn index(self) -> usize {
        match self {
            InputAction::MoveUp => 0,
            InputAction::MoveDown => 1,
            InputAction::MoveLeft => 2,
            InputAction::MoveRight => 3,
            InputAction::TogglePause => 4,
            InputAction::ToggleDebug => 5,
            InputAction::Restart => 6,
            InputAction::Quit => 7,
        }
    }

    pub fn direction(self) -> Option<Direction> {
        match self {
            InputAction::MoveUp => Some(Direction::Up),
            InputAction::MoveDown => Some(Direction::Down),
            InputAction::MoveLeft => Some(Direction::Left),
            InputAction::MoveRight => Some(Direction::Right),
            _ => None,
        }
    }

    pub fn from_physical_key(key: PhysicalKey) -> Option<Self> {
        match key {
            PhysicalKey::Code(KeyCode::KeyW) | PhysicalKey::Code(KeyCode::ArrowUp) => {
                Some(InputAction::MoveUp)
            }
            PhysicalKey::Code(KeyCode::KeyS) | PhysicalKey::Code(KeyCode::ArrowDown) => {
                Some(InputAction::MoveDown)
            }
            PhysicalKey::Code(KeyCode::KeyA) | PhysicalKey::Code(KeyCode::ArrowLeft) => {
                Some(InputAction::MoveLeft)
            }
            PhysicalKey::Code(KeyCode::KeyD) | PhysicalKey::Code(KeyCode::ArrowRight) => {
                Some(InputAction::MoveRight)
            }
            PhysicalKey::Code(KeyCode::KeyP) => Some(InputAction::TogglePause),
            PhysicalKey::Code(KeyCode::F3) => Some(InputAction::ToggleDebug),
            PhysicalKey::Code(KeyCode::Enter) => Some(InputAction::Restart),
            PhysicalKey::Code(KeyCode::Escape) => Some(InputAction::Quit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ActionStates {
    down: [bool; ACTION_COUNT],
}

impl ActionStates {
    pub(crate) fn set(&mut self, action: InputAction, is_down: bool) {
        self.down[action.index()] = is_down;
    }

    pub(crate) fn is_down(&self, action: InputAction) -> bool {
        self.down[action.index()]
    }
}

/// Turns raw key events into press edges; holding a key does not repeat.
#[derive(Debug, Default)]
pub(crate) struct InputCollector {
    action_states: ActionStates,
    pressed: Vec<InputAction>,
}

impl InputCollector {
    pub(crate) fn handle_key(&mut self, key: PhysicalKey, state: ElementState) {
        let Some(action) = InputAction::from_physical_key(key) else {
            return;
        };
        match state {
            ElementState::Pressed => {
                if !self.action_states.is_down(action) {
                    self.pressed.push(action);
                }
                self.action_states.set(action, true);
            }
            ElementState::Released => self.action_states.set(action, false),
        }
    }

    /// Press edges since the last drain, oldest first.
    pub(crate) fn drain_pressed(&mut self) -> Vec<InputAction> {
        std::mem::take(&mut self.pressed)
    }

    /// Forgets held keys, e.g. after focus loss swallowed the releases.
    pub(crate) fn release_all(&mut self) {
        self.action_states = ActionStates::default();
    }
}
