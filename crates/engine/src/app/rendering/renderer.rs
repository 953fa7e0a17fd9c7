use std::sync::Arc;

use pixels::{Error, Pixels, SurfaceTexture};
use winit::window::Window;

use crate::world::{Board, DebugBox, Entity, EntityId, RenderSurface};

use super::sprites::{Sprite, SpriteList};
use super::transform::{PixelRect, Viewport};

const CLEAR_COLOR: [u8; 4] = [0, 0, 0, 255];
const WALL_COLOR: [u8; 4] = [33, 33, 222, 255];
const PLACEHOLDER_COLOR: [u8; 4] = [220, 220, 240, 255];
const DEBUG_BOX_COLOR: [u8; 4] = [255, 64, 64, 255];
const DEBUG_TILE_COLOR: [u8; 4] = [64, 200, 96, 255];
const DEBUG_TURN_COLOR: [u8; 4] = [255, 210, 70, 255];
const DEBUG_TURN_HALF_SIZE_PX: i32 = 1;

/// Everything besides committed sprites that one frame needs.
pub struct FrameInputs<'a> {
    pub palette: &'a dyn Fn(EntityId, &str) -> Option<[u8; 4]>,
    pub debug: Option<&'a DebugLayer>,
}

/// Collider and grid state captured from the world when debug view is on.
#[derive(Debug, Default, Clone)]
pub struct DebugLayer {
    pub boxes: Vec<DebugBox>,
    pub turn_centers: Vec<(i32, i32)>,
}

impl DebugLayer {
    pub fn capture(world: &crate::world::SimWorld) -> Self {
        let turn_centers = world
            .board()
            .turns()
            .iter()
            .map(|turn| (turn.center.x.floor() as i32, turn.center.y.floor() as i32))
            .collect();
        Self {
            boxes: world.debug_boxes(),
            turn_centers,
        }
    }
}

/// Pixel-buffer renderer. The buffer is board-sized and scaled to the window
/// surface by `pixels`.
pub struct Renderer {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    buffer: Viewport,
    board: Option<BoardSurface>,
    sprites: SpriteList,
}

#[derive(Debug, Clone)]
struct BoardSurface {
    geometry: crate::world::BoardGeometry,
    walls: Vec<PixelRect>,
}

impl Renderer {
    pub fn new(window: Arc<Window>, board: &Board) -> Result<Self, Error> {
        let buffer = Viewport::of_board(&board.geometry());
        let size = window.inner_size();
        let pixels = Self::build_pixels(Arc::clone(&window), buffer, size.width, size.height)?;
        let mut renderer = Self {
            window,
            pixels,
            buffer,
            board: None,
            sprites: SpriteList::default(),
        };
        renderer.reset(board);
        Ok(renderer)
    }

    /// Forgets every committed sprite and redraws the walls of `board`.
    pub fn reset(&mut self, board: &Board) {
        let geometry = board.geometry();
        let walls = board
            .walls()
            .into_iter()
            .filter_map(|key| PixelRect::from_tile(&geometry, key))
            .collect();
        self.board = Some(BoardSurface { geometry, walls });
        self.sprites.clear();
    }

    pub fn sprites(&self) -> &SpriteList {
        &self.sprites
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), Error> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.pixels = Self::build_pixels(Arc::clone(&self.window), self.buffer, width, height)?;
        Ok(())
    }

    fn build_pixels(
        window: Arc<Window>,
        buffer: Viewport,
        width: u32,
        height: u32,
    ) -> Result<Pixels<'static>, Error> {
        let surface = SurfaceTexture::new(width, height, window);
        Pixels::new(buffer.width.max(1), buffer.height.max(1), surface)
    }

    pub fn render(&mut self, inputs: &FrameInputs<'_>) -> Result<(), Error> {
        let frame = self.pixels.frame_mut();
        draw_frame(
            frame,
            self.buffer,
            self.board.as_ref().map(|board| board.walls.as_slice()).unwrap_or(&[]),
            &self.sprites,
            inputs,
        );
        if let (Some(debug), Some(board)) = (inputs.debug, self.board.as_ref()) {
            draw_debug_layer(frame, self.buffer, &board.geometry, debug);
        }
        self.pixels.render()
    }
}

impl RenderSurface for Renderer {
    fn commit(&mut self, entity: &Entity) {
        self.sprites.commit(entity);
    }

    fn detach(&mut self, id: EntityId) {
        self.sprites.detach(id);
    }
}

fn draw_frame(
    frame: &mut [u8],
    buffer: Viewport,
    walls: &[PixelRect],
    sprites: &SpriteList,
    inputs: &FrameInputs<'_>,
) {
    for chunk in frame.chunks_exact_mut(4) {
        chunk.copy_from_slice(&CLEAR_COLOR);
    }
    for wall in walls {
        fill_rect(frame, buffer, *wall, WALL_COLOR);
    }
    for (id, sprite) in sprites.iter() {
        draw_sprite(frame, buffer, id, sprite, inputs.palette);
    }
}

fn draw_sprite(
    frame: &mut [u8],
    buffer: Viewport,
    id: EntityId,
    sprite: &Sprite,
    palette: &dyn Fn(EntityId, &str) -> Option<[u8; 4]>,
) {
    let Some(rect) = PixelRect::from_board(sprite.position, sprite.size.width, sprite.size.height)
    else {
        return;
    };
    let color = palette(id, sprite.kind).unwrap_or(PLACEHOLDER_COLOR);
    let color = if sprite.frame % 2 == 1 {
        dim(color)
    } else {
        color
    };
    fill_rect(frame, buffer, rect, color);
}

fn draw_debug_layer(
    frame: &mut [u8],
    buffer: Viewport,
    geometry: &crate::world::BoardGeometry,
    debug: &DebugLayer,
) {
    for debug_box in &debug.boxes {
        for key in &debug_box.tiles {
            if let Some(rect) = PixelRect::from_tile(geometry, *key) {
                draw_rect_outline(frame, buffer, rect, DEBUG_TILE_COLOR);
            }
        }
    }
    for debug_box in &debug.boxes {
        if let Some(rect) = PixelRect::from_box(&debug_box.collision_box) {
            draw_rect_outline(frame, buffer, rect, DEBUG_BOX_COLOR);
        }
    }
    for (x, y) in &debug.turn_centers {
        draw_square(frame, buffer, *x, *y, DEBUG_TURN_HALF_SIZE_PX, DEBUG_TURN_COLOR);
    }
}

fn dim(color: [u8; 4]) -> [u8; 4] {
    [color[0] / 3, color[1] / 3, color[2] / 3, color[3]]
}

fn write_pixel_rgba_clipped(frame: &mut [u8], width: usize, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 || x as usize >= width {
        return;
    }
    let x = x as usize;
    let y = y as usize;
    let Some(pixel_offset) = y.checked_mul(width).and_then(|row| row.checked_add(x)) else {
        return;
    };
    let Some(byte_offset) = pixel_offset.checked_mul(4) else {
        return;
    };
    let Some(end) = byte_offset.checked_add(4) else {
        return;
    };
    if end > frame.len() {
        return;
    }
    frame[byte_offset..end].copy_from_slice(&color);
}

fn fill_rect(frame: &mut [u8], buffer: Viewport, rect: PixelRect, color: [u8; 4]) {
    let left = rect.left.max(0);
    let top = rect.top.max(0);
    let right = rect.right.min(buffer.width as i32 - 1);
    let bottom = rect.bottom.min(buffer.height as i32 - 1);
    for y in top..=bottom {
        for x in left..=right {
            write_pixel_rgba_clipped(frame, buffer.width as usize, x, y, color);
        }
    }
}

fn draw_square(
    frame: &mut [u8],
    buffer: Viewport,
    cx: i32,
    cy: i32,
    half_size: i32,
    color: [u8; 4],
) {
    fill_rect(
        frame,
        buffer,
        PixelRect {
            left: cx - half_size,
            top: cy - half_size,
            right: cx + half_size,
            bottom: cy + half_size,
        },
        color,
    );
}

fn draw_rect_outline(frame: &mut [u8], buffer: Viewport, rect: PixelRect, color: [u8; 4]) {
    let width = buffer.width as usize;
    for x in rect.left..=rect.right {
        write_pixel_rgba_clipped(frame, width, x, rect.top, color);
        write_pixel_rgba_clipped(frame, width, x, rect.bottom, color);
    }
    for y in rect.top..=rect.bottom {
        write_pixel_rgba_clipped(frame, width, rect.left, y, color);
        write_pixel_rgba_clipped(frame, width, rect.right, y, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{BoardData, CollisionBox, TileKey, Vec2};

    const BUFFER: Viewport = Viewport {
        width: 8,
        height: 4,
    };

    fn blank_frame() -> Vec<u8> {
        vec![0; (BUFFER.width * BUFFER.height * 4) as usize]
    }

    fn pixel(frame: &[u8], x: usize, y: usize) -> [u8; 4] {
        let offset = (y * BUFFER.width as usize + x) * 4;
        [
            frame[offset],
            frame[offset + 1],
            frame[offset + 2],
            frame[offset + 3],
        ]
    }

    #[test]
    fn renderer_type_is_non_generic() {
        let _renderer: Option<Renderer> = None;
    }

    #[test]
    fn clipped_writes_never_wrap_to_the_next_row() {
        let mut frame = blank_frame();
        write_pixel_rgba_clipped(&mut frame, BUFFER.width as usize, 8, 0, WALL_COLOR);
        write_pixel_rgba_clipped(&mut frame, BUFFER.width as usize, -1, 2, WALL_COLOR);
        write_pixel_rgba_clipped(&mut frame, BUFFER.width as usize, 0, 9, WALL_COLOR);
        assert!(frame.iter().all(|byte| *byte == 0));
    }

    #[test]
    fn fill_rect_is_clipped_to_the_buffer() {
        let mut frame = blank_frame();
        let rect = PixelRect {
            left: 6,
            top: -2,
            right: 12,
            bottom: 1,
        };
        fill_rect(&mut frame, BUFFER, rect, WALL_COLOR);
        assert_eq!(pixel(&frame, 7, 0), WALL_COLOR);
        assert_eq!(pixel(&frame, 6, 1), WALL_COLOR);
        assert_eq!(pixel(&frame, 5, 1), [0; 4]);
        assert_eq!(pixel(&frame, 6, 2), [0; 4]);
    }

    #[test]
    fn frame_draws_walls_then_sprites_in_palette_colours() {
        let data = BoardData {
            columns: 2,
            rows: 1,
            tile_size: 4,
            layout: vec!["# ".to_string()],
            turns: None,
        };
        let board = Board::from_data(&data).expect("board");
        let geometry = board.geometry();
        let walls: Vec<_> = board
            .walls()
            .into_iter()
            .filter_map(|key| PixelRect::from_tile(&geometry, key))
            .collect();

        let mut world = crate::world::SimWorld::new(board, std::time::Duration::from_millis(100));
        world
            .spawn(crate::world::EntityDesc::new(
                "dot",
                "dot",
                crate::world::Size::square(2.0),
                Vec2::new(5.0, 1.0),
            ))
            .expect("dot");
        let mut sprites = SpriteList::default();
        world.flush_renders(&mut sprites);

        let palette = |_: EntityId, kind: &str| (kind == "dot").then_some([255, 255, 0, 255]);
        let inputs = FrameInputs {
            palette: &palette,
            debug: None,
        };
        let mut frame = vec![7; 8 * 4 * 4];
        let buffer = Viewport {
            width: 8,
            height: 4,
        };
        draw_frame(&mut frame, buffer, &walls, &sprites, &inputs);
        assert_eq!(pixel(&frame, 0, 0), WALL_COLOR);
        assert_eq!(pixel(&frame, 3, 3), WALL_COLOR);
        assert_eq!(pixel(&frame, 4, 0), CLEAR_COLOR);
        assert_eq!(pixel(&frame, 5, 1), [255, 255, 0, 255]);
        assert_eq!(pixel(&frame, 6, 2), [255, 255, 0, 255]);
        assert_eq!(pixel(&frame, 7, 3), CLEAR_COLOR);
    }

    #[test]
    fn debug_layer_outlines_boxes_and_their_tiles() {
        let geometry = crate::world::BoardGeometry::with_tile_size(4, 2, 1).expect("geometry");
        let debug = DebugLayer {
            boxes: vec![DebugBox {
                id: crate::world::EntityId(1),
                kind: "dot",
                collision_box: CollisionBox::new(5.0, 1.0, 2.0, 2.0),
                tiles: vec![TileKey::new(1, 0)],
            }],
            turn_centers: Vec::new(),
        };
        let mut frame = blank_frame();
        draw_debug_layer(&mut frame, BUFFER, &geometry, &debug);
        assert_eq!(pixel(&frame, 4, 0), DEBUG_TILE_COLOR);
        assert_eq!(pixel(&frame, 5, 1), DEBUG_BOX_COLOR);
        assert_eq!(pixel(&frame, 0, 0), [0; 4]);
    }
}
