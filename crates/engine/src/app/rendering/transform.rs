use crate::world::{BoardGeometry, CollisionBox, TileKey, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn of_board(geometry: &BoardGeometry) -> Self {
        Self {
            width: geometry.width_px(),
            height: geometry.height_px(),
        }
    }
}

/// Inclusive pixel rectangle in frame-buffer coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl PixelRect {
    /// Covers the pixels whose centres fall inside the half-open board rectangle.
    pub fn from_board(origin: Vec2, width: f32, height: f32) -> Option<Self> {
        if !origin.is_finite() || width <= 0.0 || height <= 0.0 {
            return None;
        }
        let left = origin.x.round() as i32;
        let top = origin.y.round() as i32;
        let right = (origin.x + width).round() as i32 - 1;
        let bottom = (origin.y + height).round() as i32 - 1;
        (right >= left && bottom >= top).then_some(Self {
            left,
            top,
            right,
            bottom,
        })
    }

    pub fn from_box(collision_box: &CollisionBox) -> Option<Self> {
        Self::from_board(
            Vec2::new(collision_box.left, collision_box.top),
            collision_box.width(),
            collision_box.height(),
        )
    }

    pub fn from_tile(geometry: &BoardGeometry, key: TileKey) -> Option<Self> {
        let tile = geometry.tile_size() as f32;
        Self::from_board(geometry.tile_origin(key), tile, tile)
    }

    pub fn width(&self) -> i32 {
        self.right - self.left + 1
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top + 1
    }
}

/// Largest whole-number scale at which the board still fits `available`.
pub fn integer_scale(board: Viewport, available: Viewport) -> u32 {
    if board.width == 0 || board.height == 0 {
        return 1;
    }
    (available.width / board.width)
        .min(available.height / board.height)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_rect_covers_exactly_one_tile() {
        let geometry = BoardGeometry::with_tile_size(16, 4, 3).expect("geometry");
        let rect = PixelRect::from_tile(&geometry, TileKey::new(1, 2)).expect("rect");
        assert_eq!(rect.left, 16);
        assert_eq!(rect.top, 0);
        assert_eq!(rect.width(), 16);
        assert_eq!(rect.height(), 16);
    }

    #[test]
    fn degenerate_rects_are_skipped() {
        assert!(PixelRect::from_board(Vec2::ZERO, 0.0, 4.0).is_none());
        assert!(PixelRect::from_board(Vec2::new(f32::NAN, 0.0), 4.0, 4.0).is_none());
    }

    #[test]
    fn integer_scale_fits_the_smaller_axis() {
        let board = Viewport {
            width: 448,
            height: 496,
        };
        let window = Viewport {
            width: 1400,
            height: 1000,
        };
        assert_eq!(integer_scale(board, window), 2);
        assert_eq!(
            integer_scale(
                board,
                Viewport {
                    width: 100,
                    height: 100
                }
            ),
            1
        );
    }
}
