use std::collections::{HashMap, HashSet};

use thiserror::Error;

use super::entity::EntityId;
use super::geometry::{CollisionBox, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("board must have at least one column and one row, got {columns}x{rows}")]
    EmptyBoard { columns: u32, rows: u32 },
    #[error("board width {width}px does not divide evenly into {columns} columns")]
    ColumnsDoNotDivide { width: u32, columns: u32 },
    #[error("board height {height}px does not divide evenly into {rows} rows")]
    RowsDoNotDivide { height: u32, rows: u32 },
    #[error("tiles are not square: {tile_width}px wide but {tile_height}px tall")]
    NonSquareTiles { tile_width: u32, tile_height: u32 },
}

/// Tile coordinate. Row 0 is the bottom row of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub col: i32,
    pub row: i32,
}

impl TileKey {
    pub const fn new(col: i32, row: i32) -> Self {
        Self { col, row }
    }
}

/// Inclusive rectangle of tile keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub min_col: i32,
    pub max_col: i32,
    pub min_row: i32,
    pub max_row: i32,
}

impl TileRange {
    pub fn contains(&self, key: TileKey) -> bool {
        key.col >= self.min_col
            && key.col <= self.max_col
            && key.row >= self.min_row
            && key.row <= self.max_row
    }

    /// Row-major walk over every key in the range.
    pub fn keys(&self) -> impl Iterator<Item = TileKey> {
        let (min_col, max_col) = (self.min_col, self.max_col);
        (self.min_row..=self.max_row)
            .flat_map(move |row| (min_col..=max_col).map(move |col| TileKey { col, row }))
    }

    pub fn len(&self) -> usize {
        let cols = (self.max_col - self.min_col + 1).max(0) as usize;
        let rows = (self.max_row - self.min_row + 1).max(0) as usize;
        cols * rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardGeometry {
    columns: u32,
    rows: u32,
    tile_size: u32,
}

impl BoardGeometry {
    /// Tile size is `board_width / columns` and must divide both dimensions exactly.
    pub fn new(
        board_width: u32,
        board_height: u32,
        columns: u32,
        rows: u32,
    ) -> Result<Self, GeometryError> {
        if columns == 0 || rows == 0 {
            return Err(GeometryError::EmptyBoard { columns, rows });
        }
        if board_width % columns != 0 {
            return Err(GeometryError::ColumnsDoNotDivide {
                width: board_width,
                columns,
            });
        }
        if board_height % rows != 0 {
            return Err(GeometryError::RowsDoNotDivide {
                height: board_height,
                rows,
            });
        }
        let tile_width = board_width / columns;
        let tile_height = board_height / rows;
        if tile_width != tile_height || tile_width == 0 {
            return Err(GeometryError::NonSquareTiles {
                tile_width,
                tile_height,
            });
        }
        Ok(Self {
            columns,
            rows,
            tile_size: tile_width,
        })
    }

    pub fn with_tile_size(tile_size: u32, columns: u32, rows: u32) -> Result<Self, GeometryError> {
        Self::new(
            tile_size.saturating_mul(columns),
            tile_size.saturating_mul(rows),
            columns,
            rows,
        )
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn width_px(&self) -> u32 {
        self.columns * self.tile_size
    }

    pub fn height_px(&self) -> u32 {
        self.rows * self.tile_size
    }

    pub fn contains(&self, key: TileKey) -> bool {
        key.col >= 0 && key.row >= 0 && key.col < self.columns as i32 && key.row < self.rows as i32
    }

    pub fn tile_key_at(&self, point: Vec2) -> TileKey {
        let tile = self.tile_size as f32;
        let col = (point.x / tile).floor() as i32;
        let pixel_row = (point.y / tile).floor() as i32;
        TileKey {
            col,
            row: self.invert_row(pixel_row),
        }
    }

    /// Every tile the box intersects, including partially covered edge tiles.
    pub fn tile_range(&self, collision_box: &CollisionBox) -> TileRange {
        let tile = self.tile_size as f32;
        let min_col = (collision_box.left / tile).floor() as i32;
        let max_col = ((collision_box.right / tile).ceil() as i32 - 1).max(min_col);
        let top_pixel_row = (collision_box.top / tile).floor() as i32;
        let bottom_pixel_row = ((collision_box.bottom / tile).ceil() as i32 - 1).max(top_pixel_row);
        TileRange {
            min_col,
            max_col,
            min_row: self.invert_row(bottom_pixel_row),
            max_row: self.invert_row(top_pixel_row),
        }
    }

    pub fn tiles_for(&self, collision_box: &CollisionBox) -> Vec<TileKey> {
        self.tile_range(collision_box).keys().collect()
    }

    pub fn tile_origin(&self, key: TileKey) -> Vec2 {
        let tile = self.tile_size as f32;
        Vec2 {
            x: key.col as f32 * tile,
            y: self.invert_row(key.row) as f32 * tile,
        }
    }

    pub fn tile_center(&self, key: TileKey) -> Vec2 {
        let half = self.tile_size as f32 * 0.5;
        let origin = self.tile_origin(key);
        Vec2 {
            x: origin.x + half,
            y: origin.y + half,
        }
    }

    /// Layout rows count from the top; tile keys count from the bottom.
    pub fn invert_row(&self, row: i32) -> i32 {
        self.rows as i32 - 1 - row
    }
}

/// Tile-keyed index of collidable entities.
#[derive(Debug, Default)]
pub struct SpatialGrid {
    cells: HashMap<TileKey, Vec<EntityId>>,
}

impl SpatialGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: EntityId, key: TileKey) {
        let cell = self.cells.entry(key).or_default();
        if !cell.contains(&id) {
            cell.push(id);
        }
    }

    pub fn remove(&mut self, id: EntityId, key: TileKey) {
        if let Some(cell) = self.cells.get_mut(&key) {
            cell.retain(|existing| *existing != id);
            if cell.is_empty() {
                self.cells.remove(&key);
            }
        }
    }

    pub fn entities_at(&self, key: TileKey) -> &[EntityId] {
        self.cells.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Moves `id` from `previous` to `next`. Returns false on the unchanged fast path.
    pub fn relocate(&mut self, id: EntityId, previous: Option<TileRange>, next: TileRange) -> bool {
        if previous == Some(next) {
            return false;
        }
        if let Some(previous) = previous {
            self.remove_range(id, previous);
        }
        for key in next.keys() {
            self.insert(id, key);
        }
        true
    }

    pub fn remove_range(&mut self, id: EntityId, range: TileRange) {
        for key in range.keys() {
            self.remove(id, key);
        }
    }

    /// Distinct entities recorded anywhere in `range`, in first-seen row-major order.
    pub fn entities_in(&self, range: TileRange) -> Vec<EntityId> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for key in range.keys() {
            for id in self.entities_at(key) {
                if seen.insert(*id) {
                    found.push(*id);
                }
            }
        }
        found
    }

    /// Every tile key recording `id`. Full scan, meant for checks and debug views.
    pub fn tiles_of(&self, id: EntityId) -> Vec<TileKey> {
        let mut keys: Vec<TileKey> = self
            .cells
            .iter()
            .filter(|(_, ids)| ids.contains(&id))
            .map(|(key, _)| *key)
            .collect();
        keys.sort();
        keys
    }

    pub fn occupied_tile_count(&self) -> usize {
        self.cells.len()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> BoardGeometry {
        BoardGeometry::with_tile_size(24, 10, 8).expect("geometry")
    }

    #[test]
    fn tile_size_comes_from_width_over_columns() {
        let geometry = BoardGeometry::new(448, 496, 28, 31).expect("geometry");
        assert_eq!(geometry.tile_size(), 16);
        assert_eq!(geometry.width_px(), 448);
        assert_eq!(geometry.height_px(), 496);
    }

    #[test]
    fn uneven_board_dimensions_are_rejected() {
        assert_eq!(
            BoardGeometry::new(450, 496, 28, 31),
            Err(GeometryError::ColumnsDoNotDivide {
                width: 450,
                columns: 28
            })
        );
        assert_eq!(
            BoardGeometry::new(448, 500, 28, 31),
            Err(GeometryError::RowsDoNotDivide {
                height: 500,
                rows: 31
            })
        );
        assert_eq!(
            BoardGeometry::new(448, 0, 28, 0),
            Err(GeometryError::EmptyBoard {
                columns: 28,
                rows: 0
            })
        );
    }

    #[test]
    fn rows_are_counted_from_the_bottom() {
        let geometry = geometry();
        assert_eq!(geometry.tile_key_at(Vec2::new(1.0, 1.0)), TileKey::new(0, 7));
        assert_eq!(
            geometry.tile_key_at(Vec2::new(30.0, 8.0 * 24.0 - 1.0)),
            TileKey::new(1, 0)
        );
        assert_eq!(geometry.tile_center(TileKey::new(0, 7)), Vec2::new(12.0, 12.0));
    }

    #[test]
    fn box_spanning_partial_tiles_covers_each_edge_tile() {
        let geometry = geometry();
        let collision_box = CollisionBox::new(20.0, 20.0, 24.0, 24.0);
        let range = geometry.tile_range(&collision_box);
        assert_eq!(
            range,
            TileRange {
                min_col: 0,
                max_col: 1,
                min_row: 6,
                max_row: 7,
            }
        );
        assert_eq!(range.len(), 4);
    }

    #[test]
    fn box_ending_on_a_tile_boundary_does_not_claim_the_next_tile() {
        let geometry = geometry();
        let collision_box = CollisionBox::new(0.0, 0.0, 24.0, 24.0);
        assert_eq!(geometry.tiles_for(&collision_box), vec![TileKey::new(0, 7)]);
    }

    #[test]
    fn range_keys_are_row_major() {
        let range = TileRange {
            min_col: 0,
            max_col: 1,
            min_row: 3,
            max_row: 4,
        };
        let keys: Vec<TileKey> = range.keys().collect();
        assert_eq!(
            keys,
            vec![
                TileKey::new(0, 3),
                TileKey::new(1, 3),
                TileKey::new(0, 4),
                TileKey::new(1, 4),
            ]
        );
    }

    #[test]
    fn relocate_skips_unchanged_range_and_moves_otherwise() {
        let mut grid = SpatialGrid::new();
        let id = EntityId(3);
        let first = TileRange {
            min_col: 0,
            max_col: 1,
            min_row: 0,
            max_row: 0,
        };
        let second = TileRange {
            min_col: 1,
            max_col: 2,
            min_row: 0,
            max_row: 0,
        };

        assert!(grid.relocate(id, None, first));
        assert!(!grid.relocate(id, Some(first), first));
        assert!(grid.relocate(id, Some(first), second));

        assert!(grid.entities_at(TileKey::new(0, 0)).is_empty());
        assert_eq!(grid.tiles_of(id), vec![TileKey::new(1, 0), TileKey::new(2, 0)]);
    }

    #[test]
    fn entities_in_deduplicates_multi_tile_entities() {
        let mut grid = SpatialGrid::new();
        grid.insert(EntityId(1), TileKey::new(0, 0));
        grid.insert(EntityId(1), TileKey::new(1, 0));
        grid.insert(EntityId(2), TileKey::new(1, 0));
        grid.insert(EntityId(2), TileKey::new(1, 0));

        let found = grid.entities_in(TileRange {
            min_col: 0,
            max_col: 1,
            min_row: 0,
            max_row: 0,
        });
        assert_eq!(found, vec![EntityId(1), EntityId(2)]);
        assert_eq!(grid.entities_at(TileKey::new(1, 0)).len(), 2);
    }
}
