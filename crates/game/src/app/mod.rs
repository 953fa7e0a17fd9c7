use std::process::ExitCode;

mod bootstrap;
mod gameplay;
mod loop_runner;

pub(crate) fn run() -> ExitCode {
    match bootstrap::build_app() {
        Some(app) => loop_runner::run(app),
        None => ExitCode::FAILURE,
    }
}
