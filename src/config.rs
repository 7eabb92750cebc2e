use crate::config_io;
use crate::config_io::get_conf_d_path;
use crate::config_io::CONFIG_ROOT_PATH;
use config::Config;
use config::File;
use log::error;
use serde::Deserialize;
use serde::Serialize;

fn def_near_plane() -> f32 {
    0.05
}

fn def_far_plane() -> f32 {
    100.0
}

fn def_one() -> f32 {
    1.0
}

fn def_false() -> bool {
    false
}

fn def_true() -> bool {
    true
}

fn def_ipd() -> f32 {
    0.064
}

fn def_camera_count() -> u32 {
    1
}

fn def_camera_size() -> [u32; 2] {
    [1440, 1440]
}

fn def_frame_interval_ms() -> u64 {
    11
}

#[derive(Deserialize, Serialize)]
pub struct GeneralConfig {
    #[serde(default = "def_near_plane")]
    pub near_plane: f32,

    #[serde(default = "def_far_plane")]
    pub far_plane: f32,

    #[serde(default = "def_one")]
    pub render_frame_scaling: f32,

    #[serde(default = "def_false")]
    pub require_mirror: bool,

    #[serde(default = "def_camera_count")]
    pub sim_cameras: u32,

    #[serde(default = "def_camera_size")]
    pub sim_camera_size: [u32; 2],

    #[serde(default = "def_true")]
    pub sim_camera_stereo: bool,

    #[serde(default = "def_frame_interval_ms")]
    pub sim_frame_interval_ms: u64,

    #[serde(default = "def_ipd")]
    pub sim_ipd: f32,
}

impl GeneralConfig {
    fn sanitize_range(name: &str, val: f32, from: f32, to: f32) {
        if !val.is_normal() || val < from || val > to {
            panic!(
                "GeneralConfig: {} needs to be between {} and {}",
                name, from, to
            );
        }
    }

    pub fn load_from_disk() -> GeneralConfig {
        let config = load_general();
        config.post_load();
        config
    }

    fn post_load(&self) {
        GeneralConfig::sanitize_range("near_plane", self.near_plane, 0.001, 10.0);
        GeneralConfig::sanitize_range("far_plane", self.far_plane, 1.0, 100000.0);
        GeneralConfig::sanitize_range(
            "render_frame_scaling",
            self.render_frame_scaling,
            0.05,
            5.0,
        );
    }
}

const FALLBACK_SETTINGS: &str = include_str!("res/settings.yaml");

pub fn load_general() -> GeneralConfig {
    let mut settings_builder = Config::builder();

    // Add files from conf.d directory
    let path_conf_d = get_conf_d_path();

    for mut base_conf in [CONFIG_ROOT_PATH.clone(), path_conf_d.clone()] {
        base_conf.push("config.yaml");
        if base_conf.exists() {
            log::info!("Loading config file: {}", base_conf.to_string_lossy());
            settings_builder = settings_builder.add_source(File::from(base_conf));
        }
    }

    if let Ok(paths_unsorted) = std::fs::read_dir(path_conf_d) {
        let mut paths: Vec<_> = paths_unsorted
            .filter_map(|r| match r {
                Ok(entry) => Some(entry),
                Err(e) => {
                    error!("Failed to read conf.d directory: {}", e);
                    None
                }
            })
            .collect();
        // Sort paths alphabetically
        paths.sort_by_key(|dir| dir.path());
        for path in paths {
            log::info!("Loading config file: {}", path.path().to_string_lossy());
            settings_builder = settings_builder.add_source(File::from(path.path()));
        }
    }

    match settings_builder.build() {
        Ok(settings) => match settings.try_deserialize::<GeneralConfig>() {
            Ok(config) => return config,
            Err(e) => {
                error!("Failed to parse config, falling back to defaults.");
                error!("{}", e);
            }
        },
        Err(e) => {
            error!("Failed to load config, falling back to defaults.");
            error!("{}", e);
        }
    }

    match serde_yaml::from_str::<GeneralConfig>(FALLBACK_SETTINGS) {
        Ok(config) => config,
        // can only get here if the internal fallback is broken
        Err(_) => panic!("No usable config found."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_fallback_parses() {
        let config: GeneralConfig = serde_yaml::from_str(FALLBACK_SETTINGS).unwrap();
        config.post_load();
        assert_eq!(config.sim_cameras, 1);
        assert!(config.near_plane < config.far_plane);
    }
}
