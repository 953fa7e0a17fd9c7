use pacman_engine::{resolve_app_paths, LoopConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use super::gameplay::{self, PacmanScene};

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) scene: PacmanScene,
}

/// Resolves assets and builds the scene. Failures are logged here; `None`
/// means startup cannot continue.
pub(crate) fn build_app() -> Option<AppWiring> {
    init_tracing();
    info!(version = env!("CARGO_PKG_VERSION"), "=== Pac-Man Startup ===");

    let paths = match resolve_app_paths() {
        Ok(paths) => paths,
        Err(err) => {
            error!(error = %err, "startup_failed");
            return None;
        }
    };
    info!(
        root = %paths.root.display(),
        board = %paths.board_path.display(),
        "paths_resolved"
    );

    let rules = match gameplay::load_rules(&paths.rules_path) {
        Ok(rules) => rules,
        Err(err) => {
            error!(error = %err, "startup_failed");
            return None;
        }
    };

    Some(AppWiring {
        config: LoopConfig::default(),
        scene: gameplay::build_scene(paths.board_path, rules),
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}
