//! Client builders for mock-server and live tests

use jobwatch::{Config, JobClient};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::MockServer;

/// Config pointed at `server`, saving into `dir`
///
/// Poll intervals are long so tests drive fetches explicitly.
pub fn mock_config(server: &MockServer, dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.server.base_url = server.uri();
    config.materialize.download_dir = dir.path().to_path_buf();
    config.polling.mine_interval = Duration::from_secs(60);
    config.polling.global_interval = Duration::from_secs(60);
    config.cleanup.signal_timeout = Duration::from_secs(2);
    config.cleanup.teardown_grace = Duration::from_millis(100);
    config
}

/// Client against `server`
///
/// Returns the client and temp directory (keep temp_dir alive for test duration)
pub async fn create_test_client(server: &MockServer) -> (JobClient, TempDir) {
    let dir = TempDir::new().unwrap();
    let client = JobClient::new(mock_config(server, &dir)).await.unwrap();
    (client, dir)
}

/// Config for a running job service, from `JOBWATCH_*` variables (and `.env`)
///
/// Returns `None` when `JOBWATCH_API_URL` is not set.
pub fn load_live_config() -> Option<(Config, TempDir)> {
    dotenvy::dotenv().ok();
    std::env::var(jobwatch::config::ENV_API_URL).ok()?;

    let dir = TempDir::new().ok()?;
    let mut config = Config::from_env().ok()?;
    config.materialize.download_dir = dir.path().to_path_buf();
    Some((config, dir))
}

/// Skip the current test when no live service is configured
#[macro_export]
macro_rules! skip_if_no_service {
    () => {
        if common::load_live_config().is_none() {
            eprintln!("JOBWATCH_API_URL not set, skipping live test");
            return;
        }
    };
}
