mod agent;

use stoppable_shared::config::AgentConfig;
use stoppable_shared::system::API_GROUP;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    env_logger::try_init()?;
    log::info!("{API_GROUP} mount-agent starting");

    let cfg = AgentConfig::from_env();

    let metrics = tokio::spawn(agent::metrics::run_metrics_server());
    let poll_loop = tokio::spawn(agent::run(cfg));

    tokio::select! {
        res = poll_loop => { res?; }
        res = metrics => { res?; }
    }

    log::info!("{API_GROUP} mount-agent stopped");
    Ok(())
}
