/// Reads gameplay rules. A missing file means defaults.
pub(crate) fn load_rules(path: &Path) -> Result<Rules, RulesError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "rules_file_missing_using_defaults");
            return Ok(Rules::default());
        }
        Err(source) => {
            return Err(RulesError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let mut deserializer = serde_json::Deserializer::from_str(&raw);
    let rules: Rules =
        serde_path_to_error::deserialize(&mut deserializer).map_err(|error| RulesError::Parse {
            path: path.to_path_buf(),
            json_path: error.path().to_string(),
            source: error.into_inner(),
        })?;
    info!(
        path = %path.display(),
        lives = rules.lives,
        pacman_speed = rules.pacman_speed,
        ghost_speed = rules.ghost_speed,
        "rules_loaded"
    );
    Ok(rules)
}

fn tile_size(world: &SimWorld) -> f32 {
    world.geometry().tile_size() as f32
}

fn spawn_pacman(world: &mut SimWorld, spawn: TileKey, rules: &Rules) -> Result<EntityId, SceneError> {
    let size = Size::square(tile_size(world));
    let position = world.board().place_at_tile(spawn, size)?;
    let mut movement = Movement::new(rules.pacman_speed, world.fixed_step().as_secs_f32())
        .with_padding(rules.collision_padding);
    if let Some(turn) = world.board().turn_at(spawn) {
        movement = movement.resting_at(turn.id);
    }
    let desc = EntityDesc::new("pacman", KIND_PACMAN, size, position)
        .with_movement(movement)
        .with_collider(Collider::new(&[KIND_GHOST]));
    Ok(world.spawn(desc)?)
}

fn spawn_ghost(
    world: &mut SimWorld,
    persona: GhostPersona,
    spawn: TileKey,
    speed: f32,
    rules: &Rules,
) -> Result<EntityId, SceneError> {
    let size = Size::square(tile_size(world));
    let position = world.board().place_at_tile(spawn, size)?;
    let mut movement =
        Movement::new(speed, world.fixed_step().as_secs_f32()).with_padding(rules.collision_padding);
    if let Some(turn) = world.board().turn_at(spawn) {
        movement = movement.resting_at(turn.id);
    }
    let desc = EntityDesc::new(format!("ghost_{}", persona.token()), KIND_GHOST, size, position)
        .with_movement(movement)
        .with_collider(Collider::new(&[KIND_PACMAN]).with_percent(GHOST_BOX_PERCENT));
    Ok(world.spawn(desc)?)
}

/// Spawns one pellet per pellet tile. Names carry the level so a new level
/// never collides with pellets still awaiting deletion.
fn spawn_pellets(world: &mut SimWorld, level: u32) -> Result<usize, SceneError> {
    let tile = tile_size(world);
    let mut placements = Vec::new();
    for key in world.board().keys_where(|cell| cell == Cell::Pellet) {
        placements.push((key, KIND_PELLET, tile * PELLET_SCALE, None));
    }
    for key in world.board().keys_where(|cell| cell == Cell::PowerPellet) {
        let blink = Animation::new(POWER_PELLET_FRAMES, POWER_PELLET_FRAME_MS);
        placements.push((key, KIND_POWER_PELLET, tile * POWER_PELLET_SCALE, Some(blink)));
    }

    let count = placements.len();
    for (key, kind, side, animation) in placements {
        let size = Size::square(side);
        let position = world.board().place_at_tile(key, size)?;
        let mut desc = EntityDesc::new(
            format!("{kind}_L{level}_{}_{}", key.col, key.row),
            kind,
            size,
            position,
        )
        .with_collider(Collider::new(&[KIND_PACMAN]));
        if let Some(animation) = animation {
            desc = desc.with_animation(animation);
        }
        world.spawn(desc)?;
    }
    debug!(level, count, "pellets_spawned");
    Ok(count)
}

/// Parks an actor on its spawn waypoint, or just places it when the spawn
/// tile has none.
fn send_home(world: &mut SimWorld, id: EntityId, spawn: TileKey) {
    if let Some(turn) = world.board().turn_at(spawn).map(|turn| turn.id) {
        world.park(id, turn);
        return;
    }
    let Some(size) = world.entity(id).map(Entity::size) else {
        return;
    };
    world.stop_moving(id);
    if let Ok(position) = world.board().place_at_tile(spawn, size) {
        world.set_position(id, position);
    }
}
