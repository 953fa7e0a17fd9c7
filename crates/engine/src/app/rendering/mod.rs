mod renderer;
mod sprites;
mod transform;

pub use renderer::{DebugLayer, FrameInputs, Renderer};
pub use sprites::{Sprite, SpriteList};
pub use transform::{integer_scale, PixelRect, Viewport};
