use std::path::PathBuf;
use std::time::Duration;

use crate::raster::orchestrator::RasterBackend;

/// Renderer settings that persist across sessions
#[derive(Clone, Debug, PartialEq)]
pub struct RenderSettings {
    /// Worker threads in the render pool (0 = one per logical CPU)
    pub worker_threads: usize,
    /// Render on the calling thread only
    pub single_threaded: bool,
    /// Square block edge, in pixels
    pub block_width: i32,
    /// Blocks handed to a worker at once
    pub blocks_per_group: usize,
    /// Initial per-worker arena size, in `f32` elements
    pub initial_arena_size: usize,
    /// Arena growth stops here; past it the session dies
    pub max_arena_size: usize,
    /// Opaque canvas background, RGB
    pub background: [u8; 3],
    /// Use the 4-wide rasterizer
    pub simd: bool,
    /// Time budget per frame for progressive rendering, in milliseconds
    pub iterative_budget_ms: u64,
    /// Largest supported window edge, in pixels
    pub max_screen_dim: i32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            single_threaded: false,
            block_width: 32,
            blocks_per_group: 4,
            initial_arena_size: 1 << 20,
            max_arena_size: 1 << 28,
            background: [255, 255, 255],
            simd: true,
            iterative_budget_ms: 30,
            max_screen_dim: 16384,
        }
    }
}

impl RenderSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/inkfe/inkfe_render.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\InkFE\inkfe_render.cfg
    /// On macOS:   ~/Library/Application Support/InkFE/inkfe_render.cfg
    /// Fallback:   same directory as the executable.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("inkfe");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("inkfe_render.cfg"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).unwrap_or_default();
            let config_dir = PathBuf::from(appdata).join("InkFE");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("inkfe_render.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            let config_dir = PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("InkFE");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("inkfe_render.cfg"));
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join("inkfe_render.cfg")))
        }
    }

    pub fn backend(&self) -> RasterBackend {
        if self.simd { RasterBackend::Simd } else { RasterBackend::Scalar }
    }

    pub fn iterative_budget(&self) -> Duration {
        Duration::from_millis(self.iterative_budget_ms)
    }

    /// Serialize as `key=value` lines
    pub fn to_config_string(&self) -> String {
        let [r, g, b] = self.background;
        format!(
            "worker_threads={}\n\
             single_threaded={}\n\
             block_width={}\n\
             blocks_per_group={}\n\
             initial_arena_size={}\n\
             max_arena_size={}\n\
             background={r},{g},{b}\n\
             simd={}\n\
             iterative_budget_ms={}\n\
             max_screen_dim={}\n",
            self.worker_threads,
            self.single_threaded,
            self.block_width,
            self.blocks_per_group,
            self.initial_arena_size,
            self.max_arena_size,
            self.simd,
            self.iterative_budget_ms,
            self.max_screen_dim,
        )
    }

    /// Parse `key=value` lines.  Unknown keys are ignored, malformed values
    /// keep their defaults.
    pub fn from_config_str(content: &str) -> Self {
        let mut s = Self::default();
        let d = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "worker_threads" => s.worker_threads = val.parse().unwrap_or(d.worker_threads),
                "single_threaded" => s.single_threaded = val == "true",
                "block_width" => {
                    s.block_width = val.parse().ok().filter(|&w: &i32| w > 0).unwrap_or(d.block_width);
                }
                "blocks_per_group" => {
                    s.blocks_per_group = val.parse().ok().filter(|&n: &usize| n > 0).unwrap_or(d.blocks_per_group);
                }
                "initial_arena_size" => {
                    s.initial_arena_size = val.parse().ok().filter(|&n: &usize| n > 0).unwrap_or(d.initial_arena_size);
                }
                "max_arena_size" => s.max_arena_size = val.parse().unwrap_or(d.max_arena_size),
                "background" => {
                    if let Some(c) = Self::str_to_rgb(val) {
                        s.background = c;
                    }
                }
                "simd" => s.simd = val != "false",
                "iterative_budget_ms" => s.iterative_budget_ms = val.parse().unwrap_or(d.iterative_budget_ms),
                "max_screen_dim" => {
                    s.max_screen_dim = val.parse().ok().filter(|&n: &i32| n > 0).unwrap_or(d.max_screen_dim);
                }
                _ => {}
            }
        }
        if s.max_arena_size < s.initial_arena_size {
            s.max_arena_size = s.initial_arena_size;
        }
        s
    }

    /// Parse "r,g,b"
    fn str_to_rgb(s: &str) -> Option<[u8; 3]> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() == 3 {
            let r = parts[0].trim().parse::<u8>().ok()?;
            let g = parts[1].trim().parse::<u8>().ok()?;
            let b = parts[2].trim().parse::<u8>().ok()?;
            Some([r, g, b])
        } else {
            None
        }
    }

    /// Save settings to disk
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = std::fs::write(&path, self.to_config_string()) {
            crate::log_warn!("could not write settings to {}: {}", path.display(), e);
        }
    }

    /// Load settings from disk (returns default if file missing or corrupt)
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        let Ok(content) = std::fs::read_to_string(&path) else { return Self::default() };
        Self::from_config_str(&content)
    }
}
