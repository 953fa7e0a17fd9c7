/// Picks the exit of a waypoint whose next tile lies closest to `target`, or
/// farthest when `flee` is set. Reversing is only chosen when nothing else is
/// open; ties resolve in `Direction::ALL` order.
fn choose_direction(
    options: DirectionSet,
    from: Vec2,
    heading: Option<Direction>,
    target: Vec2,
    tile: f32,
    flee: bool,
) -> Option<Direction> {
    let reverse = heading.map(Direction::opposite);
    let forward_only = options.iter().any(|direction| Some(direction) != reverse);
    let mut best: Option<(Direction, f32)> = None;
    for direction in options.iter() {
        if forward_only && Some(direction) == reverse {
            continue;
        }
        let distance = direction.step(from, tile).distance(target);
        let better = match best {
            None => true,
            Some((_, current)) if flee => distance > current,
            Some((_, current)) => distance < current,
        };
        if better {
            best = Some((direction, distance));
        }
    }
    best.map(|(direction, _)| direction)
}

fn ghost_target(
    persona: GhostPersona,
    pacman_center: Vec2,
    pacman_heading: Option<Direction>,
    ghost_center: Vec2,
    home_corner: Vec2,
    tile: f32,
) -> Vec2 {
    match persona {
        GhostPersona::Chaser => pacman_center,
        GhostPersona::Ambusher => pacman_heading
            .map(|direction| direction.step(pacman_center, tile * 4.0))
            .unwrap_or(pacman_center),
        GhostPersona::Flanker => pacman_heading
            .map(|direction| direction.opposite().step(pacman_center, tile * 2.0))
            .unwrap_or(pacman_center),
        GhostPersona::Shy => {
            if ghost_center.distance(pacman_center) < tile * 8.0 {
                home_corner
            } else {
                pacman_center
            }
        }
    }
}

fn home_corner(persona: GhostPersona, geometry: &BoardGeometry) -> Vec2 {
    let width = geometry.width_px() as f32;
    let height = geometry.height_px() as f32;
    match persona {
        GhostPersona::Chaser => Vec2::new(width, 0.0),
        GhostPersona::Ambusher => Vec2::ZERO,
        GhostPersona::Flanker => Vec2::new(width, height),
        GhostPersona::Shy => Vec2::new(0.0, height),
    }
}

/// Whether a queued turn still refers to a waypoint the ghost has yet to reach.
fn queued_turn_is_fresh(board: &Board, movement: &Movement, center: Vec2) -> bool {
    let Some(queued) = movement.queued_turn() else {
        return false;
    };
    let (Some(turn_id), Some(heading)) = (queued.turn, movement.current_direction()) else {
        return false;
    };
    if movement.last_turn() == Some(turn_id) {
        return false;
    }
    board
        .turn(turn_id)
        .is_some_and(|turn| heading.ahead(center, turn.center) >= 0.0)
}

/// Queues the ghost's decision for its next waypoint, or sets a parked ghost
/// moving again from the waypoint it rests on.
fn steer_ghost(world: &mut SimWorld, id: EntityId, target: Vec2, flee: bool) {
    let tile = world.geometry().tile_size() as f32;
    let decision = {
        let Some(entity) = world.entity(id) else {
            return;
        };
        let Some(movement) = entity.movement() else {
            return;
        };
        let center = entity.center();
        let board = world.board();
        match movement.current_direction() {
            Some(heading) => {
                if queued_turn_is_fresh(board, movement, center) {
                    return;
                }
                let Some(mut turn) = board.next_turn_ahead(center, heading) else {
                    return;
                };
                if movement.last_turn() == Some(turn.id) {
                    let Some(next) = board.next_turn_ahead(turn.center, heading) else {
                        return;
                    };
                    turn = next;
                }
                choose_direction(turn.directions, turn.center, Some(heading), target, tile, flee)
                    .map(|direction| (direction, turn.id, false))
            }
            None => {
                let resting = movement
                    .stopped_at()
                    .and_then(|turn| board.turn(turn))
                    .or_else(|| board.turn_at(world.geometry().tile_key_at(center)));
                let Some(turn) = resting else {
                    return;
                };
                choose_direction(turn.directions, turn.center, None, target, tile, flee)
                    .map(|direction| (direction, turn.id, true))
            }
        }
    };
    match decision {
        Some((direction, turn, true)) => world.start_moving(id, direction, Some(turn)),
        Some((direction, turn, false)) => world.queue_turn(id, direction, Some(turn)),
        None => {}
    }
}

/// Turns every ghost around and drops its pending decision.
fn reverse_ghosts(world: &mut SimWorld, ghosts: &[Ghost]) {
    for ghost in ghosts {
        let heading = world
            .entity(ghost.id)
            .and_then(Entity::movement)
            .and_then(Movement::current_direction);
        if let Some(heading) = heading {
            world.clear_queued_turn(ghost.id);
            world.start_moving(ghost.id, heading.opposite(), None);
        }
    }
}
