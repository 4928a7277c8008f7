use bevy::prelude::*;
use bevy_args::{Deserialize, Parser, Serialize};


#[derive(
    Debug,
    Resource,
    Serialize,
    Deserialize,
    Parser,
)]
#[command(about = "bevy_progressive_points viewer", version, long_about = None)]
pub struct PointCloudViewer {
    #[arg(long, default_value = "true")]
    pub editor: bool,

    #[arg(long, default_value = "true")]
    pub press_esc_close: bool,

    #[arg(long, default_value = "true")]
    pub show_fps: bool,

    #[arg(long, default_value = "1920.0")]
    pub width: f32,

    #[arg(long, default_value = "1080.0")]
    pub height: f32,

    #[arg(long, default_value = "bevy_progressive_points")]
    pub name: String,

    /// viewer config json, relative to the asset directory
    #[arg(long, default_value = "")]
    pub config: String,

    /// overrides the config file resolution factor
    #[arg(long)]
    pub resolution: Option<f32>,

    /// overrides the config file progressive loading flag
    #[arg(long)]
    pub progressive_loading: Option<bool>,

    /// generates a random cloud with this many points when no config is given
    #[arg(long, default_value = "0")]
    pub point_count: usize,
}

impl Default for PointCloudViewer {
    fn default() -> PointCloudViewer {
        PointCloudViewer {
            editor: true,
            press_esc_close: true,
            show_fps: true,
            width: 1920.0,
            height: 1080.0,
            name: "bevy_progressive_points".to_string(),
            config: "".to_string(),
            resolution: None,
            progressive_loading: None,
            point_count: 0,
        }
    }
}


pub fn setup_hooks() {
    #[cfg(debug_assertions)]
    #[cfg(target_arch = "wasm32")]
    {
        console_error_panic_hook::set_once();
    }
}
