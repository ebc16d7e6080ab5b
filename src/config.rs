use crate::classify::ClassifyDefaults;
use crate::types::SpatialUnit;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub classify: ClassifyConfig,
    #[serde(default)]
    pub sources: SourcePaths,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig { port: 8080 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DataConfig {
    /// Root of the dataset store (uploads land under `choropleth/` inside it).
    pub root: PathBuf,
    /// Directory with the viewer's static assets.
    pub assets: PathBuf,
}

impl Default for DataConfig {
    fn default() -> DataConfig {
        DataConfig {
            root: PathBuf::from("data_crime"),
            assets: PathBuf::from("docs"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClassifyConfig {
    /// Palette endpoints used when a dataset file brings none of its own.
    pub default_palette: [String; 2],
    pub default_buckets: usize,
    /// Color the rendering expression falls back to for zero or unmatched
    /// units.
    pub no_data_color: String,
    /// Dataset file backing the static prediction overlay, relative to the
    /// data root.
    pub prediction_file: PathBuf,
    pub prediction_property: String,
}

impl Default for ClassifyConfig {
    fn default() -> ClassifyConfig {
        ClassifyConfig {
            default_palette: ["#f7fbff".to_string(), "#08306b".to_string()],
            default_buckets: 5,
            no_data_color: "rgba(0,0,0,0)".to_string(),
            prediction_file: PathBuf::from("choropleth/lcl/choropleth_predictability_localidades.geojson"),
            prediction_property: "constancy".to_string(),
        }
    }
}

impl ClassifyConfig {
    pub fn defaults(&self) -> ClassifyDefaults {
        ClassifyDefaults {
            palette: self.default_palette.clone(),
            buckets: self.default_buckets,
            no_data_color: self.no_data_color.clone(),
        }
    }
}

/// URLs the renderer fetches the base map data from, relative to the served
/// site root.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SourcePaths {
    pub localities: String,
    pub sub_zones: String,
    pub cadastral_zones: String,
    pub locality_names: String,
    pub sub_zone_names: String,
    pub cadastral_zone_names: String,
    pub heatmap: String,
    pub heatmap_points: String,
}

impl Default for SourcePaths {
    fn default() -> SourcePaths {
        SourcePaths {
            localities: "data/poligonos-localidades.geojson".to_string(),
            sub_zones: "data/upz.json".to_string(),
            cadastral_zones: "data/scatgeojson.geojson".to_string(),
            locality_names: "data/lcl_names.geojson".to_string(),
            sub_zone_names: "data/upz_names.geojson".to_string(),
            cadastral_zone_names: "data/zc_names.geojson".to_string(),
            heatmap: "data/heatmap/heatmap_nuse.geojson".to_string(),
            heatmap_points: "data/heatmap/pts_nuse.geojson".to_string(),
        }
    }
}

impl SourcePaths {
    pub fn polygons(&self, unit: SpatialUnit) -> &str {
        match unit {
            SpatialUnit::Locality => &self.localities,
            SpatialUnit::SubZone => &self.sub_zones,
            SpatialUnit::CadastralZone => &self.cadastral_zones,
        }
    }

    pub fn names(&self, unit: SpatialUnit) -> &str {
        match unit {
            SpatialUnit::Locality => &self.locality_names,
            SpatialUnit::SubZone => &self.sub_zone_names,
            SpatialUnit::CadastralZone => &self.cadastral_zone_names,
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}
