use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result, anyhow};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub districts: DistrictConfig,
    pub nodes: NodeSourceConfig,
    pub output: OutputConfig,
    pub map: MapConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DistrictConfig {
    pub shapefile: PathBuf, // .shp, .json or .geojson, WGS84
    pub name_property: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NodeSourceConfig {
    pub uri: String,
    pub cache_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Detail {
    /// One counter per district.
    Plain,
    /// Separate "online" and "known" counters, plus a timestamp.
    #[default]
    Split,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    /// None prints the statistics to stdout.
    pub statistics: Option<PathBuf>,
    #[serde(default)]
    pub detail: Detail,
    pub map: Option<PathBuf>,
    pub bar_chart: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MapConfig {
    pub bounds_lat: [f64; 2],
    pub bounds_lon: [f64; 2],
    pub title: String,
    #[serde(default = "default_map_width")]
    pub width: u32,
    #[serde(default = "default_map_height")]
    pub height: u32,
    #[serde(default = "default_chart_width")]
    pub chart_width: u32,
    #[serde(default = "default_chart_height")]
    pub chart_height: u32,
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let [lat_min, lat_max] = self.map.bounds_lat;
        let [lon_min, lon_max] = self.map.bounds_lon;
        if !(lat_min < lat_max) || !(lon_min < lon_max) {
            return Err(anyhow!(
                "Map bounds must be [min, max] with min < max (lat {:?}, lon {:?})",
                self.map.bounds_lat,
                self.map.bounds_lon
            ));
        }
        if self.map.width == 0 || self.map.height == 0 {
            return Err(anyhow!("Map image size must be non-zero"));
        }
        if self.map.chart_width == 0 || self.map.chart_height == 0 {
            return Err(anyhow!("Bar chart image size must be non-zero"));
        }
        Ok(())
    }
}

fn default_map_width() -> u32 {
    800
}

fn default_map_height() -> u32 {
    800
}

// 12 x 10.5 inches at 300 dpi
fn default_chart_width() -> u32 {
    3600
}

fn default_chart_height() -> u32 {
    3150
}
