use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::geometry::{Direction, DirectionSet, Size, Vec2};
use super::grid::{BoardGeometry, GeometryError, TileKey};
use super::movement::at_point;

pub const DEFAULT_TILE_SIZE: u32 = 16;

const AHEAD_EPSILON: f32 = 1e-3;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("failed to read board file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("board file {path} is empty")]
    Empty { path: PathBuf },
    #[error("failed to parse board file {path} at {json_path}: {source}")]
    Parse {
        path: PathBuf,
        json_path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("layout has {found} rows, expected {expected}")]
    LayoutRows { expected: u32, found: usize },
    #[error("layout row {row} has {found} columns, expected {expected}")]
    LayoutColumns {
        row: usize,
        expected: u32,
        found: usize,
    },
    #[error("unknown layout character '{ch}' at row {row}, column {col}")]
    UnknownCell { row: usize, col: usize, ch: char },
    #[error("layout row {row} has {found} tunnel mouths, expected 0 or 2")]
    UnpairedTunnel { row: usize, found: usize },
    #[error("tile ({col}, {row}) is outside the {columns}x{rows} board")]
    OffBoard {
        col: i32,
        row: i32,
        columns: u32,
        rows: u32,
    },
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Wall,
    Void,
    Door,
    Empty,
    Pellet,
    PowerPellet,
    Tunnel,
    PlayerSpawn,
    GhostSpawn(u8),
}

impl Cell {
    fn parse(ch: char) -> Option<Cell> {
        let cell = match ch {
            '#' => Cell::Wall,
            '_' => Cell::Void,
            '=' => Cell::Door,
            ' ' => Cell::Empty,
            '.' => Cell::Pellet,
            'o' => Cell::PowerPellet,
            'T' => Cell::Tunnel,
            'P' => Cell::PlayerSpawn,
            '1'..='4' => Cell::GhostSpawn(ch as u8 - b'0'),
            _ => return None,
        };
        Some(cell)
    }

    pub fn is_walkable(self) -> bool {
        !matches!(self, Cell::Wall | Cell::Void | Cell::Door)
    }

    pub fn is_spawn(self) -> bool {
        matches!(self, Cell::PlayerSpawn | Cell::GhostSpawn(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardData {
    pub columns: u32,
    pub rows: u32,
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
    pub layout: Vec<String>,
    #[serde(default)]
    pub turns: Option<Vec<TurnData>>,
}

fn default_tile_size() -> u32 {
    DEFAULT_TILE_SIZE
}

/// Explicit waypoint in tile coordinates, row 0 at the bottom.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnData {
    pub x: i32,
    pub y: i32,
    pub directions: Vec<Direction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TurnId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub id: TurnId,
    pub key: TileKey,
    pub center: Vec2,
    pub directions: DirectionSet,
}

impl Turn {
    pub fn allows(&self, direction: Direction) -> bool {
        self.directions.contains(direction)
    }
}

/// Tunnel mouth. Movers heading `accepts` are sent to `destination`, keeping their direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Teleporter {
    pub key: TileKey,
    pub center: Vec2,
    pub accepts: Direction,
    pub destination: Vec2,
}

#[derive(Debug, Clone)]
pub struct Board {
    geometry: BoardGeometry,
    cells: Vec<Cell>,
    turns: Vec<Turn>,
    turn_index: HashMap<TileKey, TurnId>,
    teleporters: Vec<Teleporter>,
}

pub fn load_board_data(path: &Path) -> Result<BoardData, BoardError> {
    let raw = fs::read_to_string(path).map_err(|source| BoardError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if raw.trim().is_empty() {
        return Err(BoardError::Empty {
            path: path.to_path_buf(),
        });
    }
    let mut deserializer = serde_json::Deserializer::from_str(&raw);
    serde_path_to_error::deserialize::<_, BoardData>(&mut deserializer).map_err(|error| {
        let json_path = error.path().to_string();
        BoardError::Parse {
            path: path.to_path_buf(),
            json_path,
            source: error.into_inner(),
        }
    })
}

pub fn load_board(path: &Path) -> Result<Board, BoardError> {
    let data = load_board_data(path)?;
    let board = Board::from_data(&data)?;
    info!(
        path = %path.display(),
        columns = board.geometry.columns(),
        rows = board.geometry.rows(),
        turns = board.turns.len(),
        teleporters = board.teleporters.len(),
        "board_loaded"
    );
    Ok(board)
}

impl Board {
    pub fn from_data(data: &BoardData) -> Result<Self, BoardError> {
        let geometry = BoardGeometry::with_tile_size(data.tile_size, data.columns, data.rows)?;
        if data.layout.len() != data.rows as usize {
            return Err(BoardError::LayoutRows {
                expected: data.rows,
                found: data.layout.len(),
            });
        }

        let mut cells = Vec::with_capacity((data.columns * data.rows) as usize);
        for (row, line) in data.layout.iter().enumerate() {
            let found = line.chars().count();
            if found != data.columns as usize {
                return Err(BoardError::LayoutColumns {
                    row,
                    expected: data.columns,
                    found,
                });
            }
            for (col, ch) in line.chars().enumerate() {
                let cell = Cell::parse(ch).ok_or(BoardError::UnknownCell { row, col, ch })?;
                cells.push(cell);
            }
        }

        let mut board = Self {
            geometry,
            cells,
            turns: Vec::new(),
            turn_index: HashMap::new(),
            teleporters: Vec::new(),
        };
        board.teleporters = board.pair_tunnels()?;
        match &data.turns {
            Some(turns) => {
                for turn in turns {
                    let key = TileKey::new(turn.x, turn.y);
                    board.check_on_board(key)?;
                    board.push_turn(key, turn.directions.iter().copied().collect());
                }
            }
            None => board.derive_turns(),
        }
        Ok(board)
    }

    pub fn geometry(&self) -> BoardGeometry {
        self.geometry
    }

    pub fn cell(&self, key: TileKey) -> Option<Cell> {
        if !self.geometry.contains(key) {
            return None;
        }
        let layout_row = self.geometry.invert_row(key.row) as usize;
        let index = layout_row * self.geometry.columns() as usize + key.col as usize;
        self.cells.get(index).copied()
    }

    pub fn is_walkable(&self, key: TileKey) -> bool {
        self.cell(key).is_some_and(Cell::is_walkable)
    }

    /// Keys of every cell matching `predicate`, bottom row first.
    pub fn keys_where(&self, predicate: impl Fn(Cell) -> bool) -> Vec<TileKey> {
        let mut keys = Vec::new();
        for row in 0..self.geometry.rows() as i32 {
            for col in 0..self.geometry.columns() as i32 {
                let key = TileKey::new(col, row);
                if self.cell(key).is_some_and(&predicate) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    pub fn walls(&self) -> Vec<TileKey> {
        self.keys_where(|cell| matches!(cell, Cell::Wall | Cell::Door))
    }

    pub fn player_spawn(&self) -> Option<TileKey> {
        self.keys_where(|cell| cell == Cell::PlayerSpawn)
            .into_iter()
            .next()
    }

    pub fn ghost_spawn(&self, slot: u8) -> Option<TileKey> {
        self.keys_where(|cell| cell == Cell::GhostSpawn(slot))
            .into_iter()
            .next()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn turn(&self, id: TurnId) -> Option<&Turn> {
        self.turns.get(id.0 as usize)
    }

    pub fn turn_at(&self, key: TileKey) -> Option<&Turn> {
        self.turn_index.get(&key).and_then(|id| self.turn(*id))
    }

    pub fn teleporters(&self) -> &[Teleporter] {
        &self.teleporters
    }

    /// Top-left position that centers an entity of `size` on the tile.
    pub fn place_at_tile(&self, key: TileKey, size: Size) -> Result<Vec2, BoardError> {
        self.check_on_board(key)?;
        Ok(self.geometry.tile_center(key) - size.half())
    }

    /// First waypoint strictly ahead of `center` along its lane, stopping at walls.
    pub fn next_turn_ahead(&self, center: Vec2, direction: Direction) -> Option<&Turn> {
        let mut key = self.geometry.tile_key_at(center);
        if let Some(turn) = self.turn_at(key) {
            if direction.ahead(center, turn.center) > AHEAD_EPSILON {
                return Some(turn);
            }
        }
        let limit = self.geometry.columns() + self.geometry.rows();
        for _ in 0..limit {
            key = neighbour(key, direction);
            if !self.is_walkable(key) {
                return None;
            }
            if let Some(turn) = self.turn_at(key) {
                return Some(turn);
            }
        }
        None
    }

    /// Nearest waypoint ahead within `reach` on both axes. `exclude` is the
    /// waypoint the mover already handled.
    pub(crate) fn turn_ahead(
        &self,
        center: Vec2,
        direction: Direction,
        reach: f32,
        exclude: Option<TurnId>,
    ) -> Option<&Turn> {
        let tile = self.geometry.tile_size() as f32;
        let span = (reach / tile).ceil() as i32 + 1;
        let origin = self.geometry.tile_key_at(center);
        let mut best: Option<(&Turn, f32)> = None;
        for row in origin.row - span..=origin.row + span {
            for col in origin.col - span..=origin.col + span {
                let Some(turn) = self.turn_at(TileKey::new(col, row)) else {
                    continue;
                };
                if Some(turn.id) == exclude {
                    continue;
                }
                let ahead = direction.ahead(center, turn.center);
                let lateral = if direction.is_horizontal() {
                    (turn.center.y - center.y).abs()
                } else {
                    (turn.center.x - center.x).abs()
                };
                if ahead < -AHEAD_EPSILON || ahead > reach || lateral > reach {
                    continue;
                }
                let closer = match best {
                    Some((current, distance)) => {
                        ahead < distance || (ahead == distance && turn.id < current.id)
                    }
                    None => true,
                };
                if closer {
                    best = Some((turn, ahead));
                }
            }
        }
        best.map(|(turn, _)| turn)
    }

    /// Waypoint whose center lies within `tolerance` of `center` on both axes.
    pub(crate) fn turn_near(&self, center: Vec2, tolerance: f32) -> Option<&Turn> {
        self.turn_at(self.geometry.tile_key_at(center)).filter(|turn| {
            at_point(turn.center, center)
                || ((turn.center.x - center.x).abs() <= tolerance
                    && (turn.center.y - center.y).abs() <= tolerance)
        })
    }

    pub(crate) fn teleporter_ahead(
        &self,
        center: Vec2,
        direction: Direction,
        distance: f32,
        lane_tolerance: f32,
    ) -> Option<&Teleporter> {
        self.teleporters.iter().find(|teleporter| {
            if teleporter.accepts != direction {
                return false;
            }
            let ahead = direction.ahead(center, teleporter.center);
            let lateral = if direction.is_horizontal() {
                (teleporter.center.y - center.y).abs()
            } else {
                (teleporter.center.x - center.x).abs()
            };
            ahead >= -AHEAD_EPSILON && ahead <= distance && lateral <= lane_tolerance
        })
    }

    fn check_on_board(&self, key: TileKey) -> Result<(), BoardError> {
        if self.geometry.contains(key) {
            Ok(())
        } else {
            Err(BoardError::OffBoard {
                col: key.col,
                row: key.row,
                columns: self.geometry.columns(),
                rows: self.geometry.rows(),
            })
        }
    }

    fn push_turn(&mut self, key: TileKey, directions: DirectionSet) {
        let id = TurnId(self.turns.len() as u32);
        self.turns.push(Turn {
            id,
            key,
            center: self.geometry.tile_center(key),
            directions,
        });
        self.turn_index.insert(key, id);
    }

    fn pair_tunnels(&self) -> Result<Vec<Teleporter>, BoardError> {
        let columns = self.geometry.columns() as usize;
        let mut teleporters = Vec::new();
        for (layout_row, cells) in self.cells.chunks(columns).enumerate() {
            let mouths: Vec<usize> = cells
                .iter()
                .enumerate()
                .filter(|(_, cell)| **cell == Cell::Tunnel)
                .map(|(col, _)| col)
                .collect();
            match mouths.as_slice() {
                [] => {}
                [left, right] => {
                    let row = self.geometry.invert_row(layout_row as i32);
                    let left_key = TileKey::new(*left as i32, row);
                    let right_key = TileKey::new(*right as i32, row);
                    let left_center = self.geometry.tile_center(left_key);
                    let right_center = self.geometry.tile_center(right_key);
                    teleporters.push(Teleporter {
                        key: left_key,
                        center: left_center,
                        accepts: Direction::Left,
                        destination: right_center,
                    });
                    teleporters.push(Teleporter {
                        key: right_key,
                        center: right_center,
                        accepts: Direction::Right,
                        destination: left_center,
                    });
                }
                _ => {
                    return Err(BoardError::UnpairedTunnel {
                        row: layout_row,
                        found: mouths.len(),
                    })
                }
            }
        }
        Ok(teleporters)
    }

    /// Corners, junctions, dead ends and spawn tiles become waypoints whose
    /// directions are the walkable neighbours.
    fn derive_turns(&mut self) {
        for row in (0..self.geometry.rows() as i32).rev() {
            for col in 0..self.geometry.columns() as i32 {
                let key = TileKey::new(col, row);
                let Some(cell) = self.cell(key) else {
                    continue;
                };
                if !cell.is_walkable() {
                    continue;
                }
                let open: DirectionSet = Direction::ALL
                    .into_iter()
                    .filter(|direction| self.opens_towards(key, cell, *direction))
                    .collect();
                let horizontal = open.contains(Direction::Left) || open.contains(Direction::Right);
                let vertical = open.contains(Direction::Up) || open.contains(Direction::Down);
                let dead_end = open.len() <= 1;
                if (horizontal && vertical) || dead_end || cell.is_spawn() {
                    self.push_turn(key, open);
                }
            }
        }
    }

    fn opens_towards(&self, key: TileKey, cell: Cell, direction: Direction) -> bool {
        let next = neighbour(key, direction);
        if self.geometry.contains(next) {
            return self.is_walkable(next);
        }
        // Tunnel mouths wrap through the board edge.
        cell == Cell::Tunnel && direction.is_horizontal()
    }
}

fn neighbour(key: TileKey, direction: Direction) -> TileKey {
    match direction {
        Direction::Up => TileKey::new(key.col, key.row + 1),
        Direction::Down => TileKey::new(key.col, key.row - 1),
        Direction::Left => TileKey::new(key.col - 1, key.row),
        Direction::Right => TileKey::new(key.col + 1, key.row),
    }
}
