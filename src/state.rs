use log::info;

use crate::config::GeneralConfig;
use crate::config_io;

pub struct AppState {
    pub session: AppSession,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            session: AppSession::load(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AppSession {
    pub config: GeneralConfig,
}

impl AppSession {
    pub fn load() -> Self {
        let config_root_path = config_io::ensure_config_root();
        info!("Config root path: {}", config_root_path.display());

        Self {
            config: GeneralConfig::load_from_disk(),
        }
    }
}
