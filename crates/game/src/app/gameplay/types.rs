/// Gameplay tunables. Every field falls back to its default when absent from
/// `rules.json`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Rules {
    pub(crate) lives: u32,
    /// Pixels per second.
    pub(crate) pacman_speed: f32,
    pub(crate) ghost_speed: f32,
    pub(crate) frightened_speed: f32,
    /// Added to `ghost_speed` for every level after the first.
    pub(crate) ghost_speed_per_level: f32,
    pub(crate) frightened_ms: f64,
    pub(crate) pellet_points: u32,
    pub(crate) power_pellet_points: u32,
    pub(crate) ghost_points: u32,
    pub(crate) collision_padding: f32,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            lives: 3,
            pacman_speed: 120.0,
            ghost_speed: 110.0,
            frightened_speed: 60.0,
            ghost_speed_per_level: 5.0,
            frightened_ms: 6000.0,
            pellet_points: 10,
            power_pellet_points: 50,
            ghost_points: 200,
            collision_padding: DEFAULT_COLLISION_PADDING,
        }
    }
}

impl Rules {
    fn ghost_speed_for_level(&self, level: u32) -> f32 {
        self.ghost_speed + self.ghost_speed_per_level * level.saturating_sub(1) as f32
    }
}

#[derive(Debug, Error)]
pub(crate) enum RulesError {
    #[error("failed to read rules file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid rules file {path} at {json_path}: {source}")]
    Parse {
        path: PathBuf,
        json_path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Where a session gets its board from.
#[derive(Debug, Clone)]
pub(crate) enum BoardSource {
    File(PathBuf),
    Inline(BoardData),
}

impl BoardSource {
    fn build(&self) -> Result<Board, BoardError> {
        match self {
            Self::File(path) => load_board(path),
            Self::Inline(data) => Board::from_data(data),
        }
    }
}

/// Targeting style of a ghost, picked by its spawn slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GhostPersona {
    /// Heads straight for Pac-Man.
    Chaser,
    /// Aims four tiles ahead of Pac-Man.
    Ambusher,
    /// Aims two tiles behind Pac-Man.
    Flanker,
    /// Chases from afar, retreats to its corner when close.
    Shy,
}

impl GhostPersona {
    fn for_slot(slot: u8) -> Self {
        match slot {
            1 => Self::Chaser,
            2 => Self::Ambusher,
            3 => Self::Flanker,
            _ => Self::Shy,
        }
    }

    fn token(self) -> &'static str {
        match self {
            Self::Chaser => "chaser",
            Self::Ambusher => "ambusher",
            Self::Flanker => "flanker",
            Self::Shy => "shy",
        }
    }

    fn color(self) -> [u8; 4] {
        match self {
            Self::Chaser => [255, 0, 0, 255],
            Self::Ambusher => [255, 184, 255, 255],
            Self::Flanker => [0, 255, 255, 255],
            Self::Shy => [255, 184, 82, 255],
        }
    }
}

#[derive(Debug, Clone)]
struct Ghost {
    id: EntityId,
    persona: GhostPersona,
    spawn: TileKey,
    frightened: bool,
}

/// Mutable state of one play session; rebuilt on every `load`.
#[derive(Debug, Default)]
struct Session {
    pacman: Option<EntityId>,
    pacman_spawn: Option<TileKey>,
    ghosts: Vec<Ghost>,
    pellets_remaining: usize,
    score: u32,
    lives: u32,
    level: u32,
    caught: bool,
    cleared: bool,
    game_over: bool,
}

impl Session {
    fn ghost(&self, id: EntityId) -> Option<&Ghost> {
        self.ghosts.iter().find(|ghost| ghost.id == id)
    }

    fn ghost_mut(&mut self, id: EntityId) -> Option<&mut Ghost> {
        self.ghosts.iter_mut().find(|ghost| ghost.id == id)
    }
}
