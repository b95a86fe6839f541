use anyhow::Context;

/// Load `.env` from the working directory (if any), then the layered config.
pub fn load_config() -> anyhow::Result<tether_config::TetherConfig> {
    let cwd = std::env::current_dir().context("failed to determine current directory")?;
    let env_path = cwd.join(".env");
    if env_path.exists() {
        dotenvy::from_path(&env_path)
            .with_context(|| format!("failed to load dotenv file at {}", env_path.display()))?;
    }

    tether_config::TetherConfig::load().context("failed to load tether configuration")
}
