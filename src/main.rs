use editor_stats::app_config::AppConfig;
use editor_stats::app_state::AppState;
use editor_stats::command_line::{run_command, RunOptions};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let options = RunOptions::from_env()?;
    let config = AppConfig::load()?;
    let app_state = AppState::new_from_config(config)?;
    run_command(&app_state, &options).await
}
