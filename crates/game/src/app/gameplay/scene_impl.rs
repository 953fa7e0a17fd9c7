pub(crate) struct PacmanScene {
    board_source: BoardSource,
    rules: Rules,
    session: Session,
}

impl PacmanScene {
    pub(crate) fn new(board_source: BoardSource, rules: Rules) -> Self {
        Self {
            board_source,
            rules,
            session: Session::default(),
        }
    }

    pub(crate) fn score(&self) -> u32 {
        self.session.score
    }

    pub(crate) fn lives(&self) -> u32 {
        self.session.lives
    }

    pub(crate) fn level(&self) -> u32 {
        self.session.level
    }

    pub(crate) fn pacman(&self) -> Option<EntityId> {
        self.session.pacman
    }

    pub(crate) fn pellets_remaining(&self) -> usize {
        self.session.pellets_remaining
    }

    pub(crate) fn is_game_over(&self) -> bool {
        self.session.game_over
    }

    fn eat_pellet(&mut self, world: &mut SimWorld, pellet: EntityId, points: u32) {
        if !world.mark_deleted(pellet) {
            return;
        }
        self.session.score = self.session.score.saturating_add(points);
        self.session.pellets_remaining = self.session.pellets_remaining.saturating_sub(1);
        debug!(
            pellet = %pellet,
            points,
            score = self.session.score,
            remaining = self.session.pellets_remaining,
            "pellet_eaten"
        );
        if self.session.pellets_remaining == 0 {
            self.session.cleared = true;
        }
    }

    fn frighten_ghosts(&mut self, world: &mut SimWorld) {
        for ghost in &mut self.session.ghosts {
            ghost.frightened = true;
            world.set_speed(ghost.id, self.rules.frightened_speed);
            world.set_countdown(
                ghost.id,
                Countdown::new(FRIGHTENED_COUNTDOWN, self.rules.frightened_ms),
            );
        }
        reverse_ghosts(world, &self.session.ghosts);
        info!(
            duration_ms = self.rules.frightened_ms,
            ghosts = self.session.ghosts.len(),
            "ghosts_frightened"
        );
    }

    fn calm_ghost(&mut self, world: &mut SimWorld, id: EntityId) {
        let speed = self.rules.ghost_speed_for_level(self.session.level);
        if let Some(ghost) = self.session.ghost_mut(id) {
            ghost.frightened = false;
            world.set_speed(id, speed);
        }
    }

    fn resolve_encounter(&mut self, world: &mut SimWorld, ghost_id: EntityId) {
        if self.session.caught {
            return;
        }
        let Some(ghost) = self.session.ghost(ghost_id).cloned() else {
            return;
        };
        if ghost.frightened {
            world.clear_countdown(ghost.id);
            self.calm_ghost(world, ghost.id);
            self.session.score = self.session.score.saturating_add(self.rules.ghost_points);
            send_home(world, ghost.id, ghost.spawn);
            info!(
                ghost = ghost.persona.token(),
                score = self.session.score,
                "ghost_eaten"
            );
            return;
        }
        self.session.caught = true;
        self.session.lives = self.session.lives.saturating_sub(1);
        info!(
            ghost = ghost.persona.token(),
            lives = self.session.lives,
            "pacman_caught"
        );
    }

    /// Puts Pac-Man and every ghost back on their spawn tiles.
    fn reset_actors(&mut self, world: &mut SimWorld) {
        if let (Some(pacman), Some(spawn)) = (self.session.pacman, self.session.pacman_spawn) {
            send_home(world, pacman, spawn);
        }
        let ghosts: Vec<(EntityId, TileKey)> = self
            .session
            .ghosts
            .iter()
            .map(|ghost| (ghost.id, ghost.spawn))
            .collect();
        for (id, spawn) in ghosts {
            world.clear_countdown(id);
            self.calm_ghost(world, id);
            send_home(world, id, spawn);
        }
    }

    fn spawn_session(&mut self, world: &mut SimWorld) -> Result<(), SceneError> {
        let pacman_spawn = world
            .board()
            .player_spawn()
            .ok_or_else(|| SceneError::MissingSpawn("player".to_string()))?;
        let pacman = spawn_pacman(world, pacman_spawn, &self.rules)?;
        self.session.pacman = Some(pacman);
        self.session.pacman_spawn = Some(pacman_spawn);

        for slot in 1..=GHOST_COUNT {
            let spawn = world
                .board()
                .ghost_spawn(slot)
                .ok_or_else(|| SceneError::MissingSpawn(format!("ghost {slot}")))?;
            let persona = GhostPersona::for_slot(slot);
            let speed = self.rules.ghost_speed_for_level(self.session.level);
            let id = spawn_ghost(world, persona, spawn, speed, &self.rules)?;
            self.session.ghosts.push(Ghost {
                id,
                persona,
                spawn,
                frightened: false,
            });
        }
        self.session.pellets_remaining = spawn_pellets(world, self.session.level)?;
        Ok(())
    }

    fn start_next_level(&mut self, world: &mut SimWorld) {
        self.session.level = self.session.level.saturating_add(1);
        self.session.cleared = false;
        self.reset_actors(world);
        match spawn_pellets(world, self.session.level) {
            Ok(count) => self.session.pellets_remaining = count,
            Err(error) => warn!(error = %error, "pellet_respawn_failed"),
        }
        info!(
            level = self.session.level,
            score = self.session.score,
            pellets = self.session.pellets_remaining,
            "level_cleared"
        );
    }
}

impl CollisionHandler for PacmanScene {
    fn on_collision(&mut self, world: &mut SimWorld, collision: Collision) {
        let Some(kind) = world.entity(collision.target).map(Entity::kind) else {
            return;
        };
        match kind {
            KIND_PELLET => {
                self.eat_pellet(world, collision.target, self.rules.pellet_points);
            }
            KIND_POWER_PELLET => {
                self.eat_pellet(world, collision.target, self.rules.power_pellet_points);
                self.frighten_ghosts(world);
            }
            KIND_GHOST => self.resolve_encounter(world, collision.target),
            KIND_PACMAN => self.resolve_encounter(world, collision.mover),
            other => debug!(kind = other, target = %collision.target, "collision_unhandled"),
        }
    }
}

impl StepHooks for PacmanScene {
    fn on_countdown_expired(&mut self, world: &mut SimWorld, id: EntityId, label: &'static str) {
        if label == FRIGHTENED_COUNTDOWN {
            self.calm_ghost(world, id);
            debug!(ghost = %id, "ghost_calmed");
        }
    }
}

impl Scene for PacmanScene {
    fn load(&mut self, fixed_step: Duration) -> Result<SimWorld, SceneError> {
        let board = self.board_source.build()?;
        let mut world = SimWorld::new(board, fixed_step);
        self.session = Session {
            lives: self.rules.lives,
            level: 1,
            ..Session::default()
        };
        if let Err(error) = self.spawn_session(&mut world) {
            world.teardown();
            self.session = Session::default();
            return Err(error);
        }
        info!(
            entities = world.registry().len(),
            pellets = self.session.pellets_remaining,
            lives = self.session.lives,
            "scene_loaded"
        );
        Ok(world)
    }

    fn handle_input(&mut self, world: &mut SimWorld, direction: Direction) {
        if let Some(pacman) = self.pacman() {
            let outcome = world.handle_input(pacman, direction);
            debug!(direction = direction.token(), ?outcome, "pacman_input");
        }
    }

    fn before_step(&mut self, world: &mut SimWorld) {
        let Some(pacman) = self.session.pacman.and_then(|id| world.entity(id)) else {
            return;
        };
        let pacman_center = pacman.center();
        let pacman_heading = pacman.movement().and_then(Movement::current_direction);
        let geometry = world.geometry();
        let tile = geometry.tile_size() as f32;
        for ghost in &self.session.ghosts {
            let Some(ghost_center) = world.entity(ghost.id).map(Entity::center) else {
                continue;
            };
            let target = if ghost.frightened {
                pacman_center
            } else {
                ghost_target(
                    ghost.persona,
                    pacman_center,
                    pacman_heading,
                    ghost_center,
                    home_corner(ghost.persona, &geometry),
                    tile,
                )
            };
            steer_ghost(world, ghost.id, target, ghost.frightened);
        }
    }

    fn after_step(&mut self, world: &mut SimWorld) -> SceneCommand {
        if self.session.caught {
            self.session.caught = false;
            if self.session.lives == 0 {
                self.session.game_over = true;
                info!(
                    score = self.session.score,
                    level = self.session.level,
                    "game_over"
                );
                return SceneCommand::Stop;
            }
            self.reset_actors(world);
        }
        if self.session.cleared {
            self.start_next_level(world);
        }
        SceneCommand::None
    }

    fn unload(&mut self, _world: &mut SimWorld) {
        debug!(score = self.session.score, "scene_unloaded");
    }

    fn palette_color(&self, id: EntityId, kind: &str) -> Option<[u8; 4]> {
        match kind {
            KIND_PACMAN => Some(PACMAN_COLOR),
            KIND_PELLET | KIND_POWER_PELLET => Some(PELLET_COLOR),
            KIND_GHOST => self.session.ghost(id).map(|ghost| {
                if ghost.frightened {
                    FRIGHTENED_COLOR
                } else {
                    ghost.persona.color()
                }
            }),
            _ => None,
        }
    }

    fn debug_title(&self) -> Option<String> {
        let status = if self.is_game_over() {
            " | GAME OVER (Enter to restart)"
        } else {
            ""
        };
        Some(format!(
            "Pac-Man | score {} | lives {} | level {} | pellets {}{}",
            self.score(),
            self.lives(),
            self.level(),
            self.pellets_remaining(),
            status
        ))
    }
}
