use super::geometry::{CollisionBox, Size, Vec2};
use super::grid::TileRange;
use super::movement::Movement;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct EntityIdAllocator {
    next: u64,
}

impl EntityIdAllocator {
    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

pub const DEFAULT_COLLISION_PERCENT: u8 = 100;

/// Collision capability: box scale and the entity kinds allowed to hit this entity.
#[derive(Debug, Clone)]
pub struct Collider {
    percent: u8,
    accepts: Vec<&'static str>,
    pub(crate) occupied: Option<TileRange>,
}

impl Collider {
    pub fn new(accepts: &[&'static str]) -> Self {
        Self {
            percent: DEFAULT_COLLISION_PERCENT,
            accepts: accepts.to_vec(),
            occupied: None,
        }
    }

    pub fn with_percent(mut self, percent: u8) -> Self {
        self.percent = percent;
        self
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn accepts(&self, kind: &str) -> bool {
        self.accepts.iter().any(|accepted| *accepted == kind)
    }

    pub fn accepted_kinds(&self) -> &[&'static str] {
        &self.accepts
    }

    pub fn occupied(&self) -> Option<TileRange> {
        self.occupied
    }
}

/// Frame cycling driven by real frame time, not the fixed step.
#[derive(Debug, Clone, PartialEq)]
pub struct Animation {
    frame_count: u32,
    frame_duration_ms: f64,
    elapsed_ms: f64,
    frame: u32,
    running: bool,
}

impl Animation {
    pub fn new(frame_count: u32, frame_duration_ms: f64) -> Self {
        Self {
            frame_count: frame_count.max(1),
            frame_duration_ms: frame_duration_ms.max(1.0),
            elapsed_ms: 0.0,
            frame: 0,
            running: true,
        }
    }

    pub fn advance(&mut self, delta_ms: f64) -> bool {
        if !self.running {
            return false;
        }
        self.elapsed_ms += delta_ms;
        let mut changed = false;
        while self.elapsed_ms >= self.frame_duration_ms {
            self.elapsed_ms -= self.frame_duration_ms;
            self.frame = (self.frame + 1) % self.frame_count;
            changed = true;
        }
        changed
    }

    pub fn halt(&mut self) {
        self.running = false;
    }

    pub fn resume(&mut self) {
        self.running = true;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }
}

/// Per-step timer. Expiry is reported once, then the countdown is dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Countdown {
    pub label: &'static str,
    pub remaining_ms: f64,
}

impl Countdown {
    pub fn new(label: &'static str, remaining_ms: f64) -> Self {
        Self {
            label,
            remaining_ms,
        }
    }

    pub(crate) fn tick(&mut self, step_ms: f64) -> bool {
        self.remaining_ms -= step_ms;
        self.remaining_ms <= 0.0
    }
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub(crate) id: EntityId,
    pub(crate) name: String,
    pub(crate) kind: &'static str,
    size: Size,
    pub(crate) position: Vec2,
    pub(crate) previous_position: Vec2,
    pub(crate) transform: Vec2,
    pub(crate) deleted: bool,
    pub(crate) render_queued: bool,
    pub(crate) movement: Option<Movement>,
    pub(crate) collider: Option<Collider>,
    pub(crate) animation: Option<Animation>,
    pub(crate) countdown: Option<Countdown>,
}

impl Entity {
    pub(crate) fn from_desc(id: EntityId, desc: EntityDesc) -> Self {
        Self {
            id,
            name: desc.name,
            kind: desc.kind,
            size: desc.size,
            position: desc.position,
            previous_position: desc.position,
            transform: Vec2::ZERO,
            deleted: false,
            render_queued: false,
            movement: desc.movement,
            collider: desc.collider,
            animation: desc.animation,
            countdown: desc.countdown,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// Top-left layout position in board pixels.
    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn center(&self) -> Vec2 {
        self.position + self.size.half()
    }

    /// Render-only offset applied on top of the layout position.
    pub fn transform(&self) -> Vec2 {
        self.transform
    }

    pub fn render_position(&self) -> Vec2 {
        self.position + self.transform
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn movement(&self) -> Option<&Movement> {
        self.movement.as_ref()
    }

    pub fn collider(&self) -> Option<&Collider> {
        self.collider.as_ref()
    }

    pub fn animation(&self) -> Option<&Animation> {
        self.animation.as_ref()
    }

    pub fn countdown(&self) -> Option<&Countdown> {
        self.countdown.as_ref()
    }

    pub fn collision_box(&self) -> Option<CollisionBox> {
        self.collider
            .as_ref()
            .map(|collider| CollisionBox::for_entity(self.position, self.size, collider.percent))
    }

    pub fn is_moving(&self) -> bool {
        self.movement
            .as_ref()
            .is_some_and(|movement| movement.is_moving())
    }
}

/// Construction parameters for [`super::SimWorld::spawn`].
#[derive(Debug, Clone)]
pub struct EntityDesc {
    pub name: String,
    pub kind: &'static str,
    pub size: Size,
    pub position: Vec2,
    pub movement: Option<Movement>,
    pub collider: Option<Collider>,
    pub animation: Option<Animation>,
    pub countdown: Option<Countdown>,
}

impl EntityDesc {
    pub fn new(name: impl Into<String>, kind: &'static str, size: Size, position: Vec2) -> Self {
        Self {
            name: name.into(),
            kind,
            size,
            position,
            movement: None,
            collider: None,
            animation: None,
            countdown: None,
        }
    }

    pub fn with_movement(mut self, movement: Movement) -> Self {
        self.movement = Some(movement);
        self
    }

    pub fn with_collider(mut self, collider: Collider) -> Self {
        self.collider = Some(collider);
        self
    }

    pub fn with_animation(mut self, animation: Animation) -> Self {
        self.animation = Some(animation);
        self
    }

    pub fn with_countdown(mut self, countdown: Countdown) -> Self {
        self.countdown = Some(countdown);
        self
    }
}
