use crate::config::SourcePaths;
use crate::types::SpatialUnit;
use serde_json::{json, Value};

pub const ID_HEATMAP_SOURCE: &str = "hp-nuse";
pub const ID_HEATMAP_PTS_SOURCE: &str = "pts-nuse";
pub const ID_HEATMAP_LAYER: &str = "heatmap-nuse";
pub const ID_HEATMAP_PTS_LAYER: &str = "pts-hp-nuse";
pub const ID_PREDICTION_LAYER: &str = "choro-predic-layer";

const DEFAULT_FILL_COLOR: &str = "#3CB8FB";
const DEFAULT_OUTLINE_COLOR: &str = "#FFFFFF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Visible => "visible",
            Visibility::Hidden => "none",
        }
    }
}

/// Data handed to the renderer when registering a source: a URL it fetches
/// itself, or inline GeoJSON.
#[derive(Debug, Clone)]
pub enum SourceData {
    Url(String),
    Inline(Value),
}

/// A complete layer definition in the renderer's style-spec shape.
#[derive(Debug, Clone)]
pub struct LayerSpec {
    pub id: String,
    pub spec: Value,
}

/// The slice of the external map engine the viewer drives. Implemented by
/// the real renderer bridge in production and by a recording stand-in under
/// test.
pub trait MapSurface {
    fn add_source(&mut self, id: &str, data: SourceData);
    fn add_layer(&mut self, spec: LayerSpec);
    fn has_layer(&self, id: &str) -> bool;
    fn set_layout_property(&mut self, layer: &str, property: &str, value: Value);
    fn set_paint_property(&mut self, layer: &str, property: &str, value: Value);
    fn remove_layer(&mut self, id: &str);
}

/// Toggle a layer's visibility.
pub fn set_visibility(surface: &mut dyn MapSurface, layer: &str, visibility: Visibility) {
    surface.set_layout_property(layer, "visibility", json!(visibility.as_str()));
}

/// Polygon fill layer for a spatial unit, slightly more opaque under the
/// pointer.
pub fn fill_layer(id: &str, source: &str, visibility: Visibility) -> LayerSpec {
    LayerSpec {
        id: id.to_string(),
        spec: json!({
            "id": id,
            "type": "fill",
            "source": source,
            "layout": {"visibility": visibility.as_str()},
            "paint": {
                "fill-color": DEFAULT_FILL_COLOR,
                "fill-outline-color": DEFAULT_OUTLINE_COLOR,
                "fill-opacity": [
                    "case",
                    ["boolean", ["feature-state", "hover"], false],
                    0.7,
                    0.5
                ]
            }
        }),
    }
}

/// Line layer tracing a unit's borders.
pub fn border_layer(id: &str, source: &str, visibility: Visibility, width: f64) -> LayerSpec {
    LayerSpec {
        id: id.to_string(),
        spec: json!({
            "id": id,
            "type": "line",
            "source": source,
            "layout": {"visibility": visibility.as_str()},
            "paint": {
                "line-color": DEFAULT_OUTLINE_COLOR,
                "line-width": width
            }
        }),
    }
}

/// Symbol layer printing unit names from the label-point source.
pub fn names_layer(id: &str, source: &str, visibility: Visibility, unit: SpatialUnit) -> LayerSpec {
    let params = unit.label_params();
    LayerSpec {
        id: id.to_string(),
        spec: json!({
            "id": id,
            "type": "symbol",
            "source": source,
            "minzoom": params.min_zoom,
            "maxzoom": params.max_zoom,
            "layout": {
                "visibility": visibility.as_str(),
                "text-field": ["format", ["upcase", ["get", unit.name_property()]],
                    {"font-scale": params.font_scale}],
                "text-variable-anchor": ["top", "bottom", "left", "right"],
                "text-radial-offset": 0.5,
                "text-justify": "auto",
                "text-max-width": 3,
                "text-font": ["Open Sans Semibold", "Arial Unicode MS Bold"]
            },
            "paint": {"text-color": "#FFFFFF"}
        }),
    }
}

/// The data-driven fill-color expression: ordered match pairs against the
/// unit's match key, then the trailing default for anything unmatched.
pub fn fill_color_expression(match_key: &str, table: &[(String, String)], default_color: &str) -> Value {
    let mut expr = vec![json!("match"), json!(["get", match_key])];
    for (key, color) in table {
        expr.push(json!(key));
        expr.push(json!(color));
    }
    expr.push(json!(default_color));
    Value::Array(expr)
}

/// Choropleth fill over a unit's polygon source. Opacity drops under the
/// pointer so the base map shows through.
pub fn choropleth_layer(id: &str, source: &str, visibility: Visibility, fill_color: Value) -> LayerSpec {
    LayerSpec {
        id: id.to_string(),
        spec: json!({
            "id": id,
            "type": "fill",
            "source": source,
            "layout": {"visibility": visibility.as_str()},
            "paint": {
                "fill-color": fill_color,
                "fill-outline-color": "#FFFFFF",
                "fill-opacity": [
                    "case",
                    ["boolean", ["feature-state", "hover"], false],
                    0.5,
                    0.8
                ]
            }
        }),
    }
}

pub fn heatmap_layer() -> LayerSpec {
    LayerSpec {
        id: ID_HEATMAP_LAYER.to_string(),
        spec: json!({
            "id": ID_HEATMAP_LAYER,
            "type": "heatmap",
            "source": ID_HEATMAP_SOURCE,
            "layout": {"visibility": "none"},
            "minzoom": 8,
            "paint": {
                "heatmap-radius": ["interpolate", ["linear"], ["zoom"],
                    9, 100, 10, 100, 11, 100, 12, 100, 13, 100, 14, 100, 15, 100],
                "heatmap-weight": ["interpolate", ["linear"], ["get", "incidents"],
                    0, 0, 10000, 0.5, 20000, 0.75, 40000, 1, 60000, 1.5, 80000, 2],
                "heatmap-color": ["interpolate", ["linear"], ["heatmap-density"],
                    0, "rgba(33,102,172,0)",
                    0.2, "rgba(51, 153, 255, 0.7)",
                    0.5, "rgba(51, 204, 51,0.7)",
                    0.8, "rgba(255, 204, 102, 0.7)",
                    1, "rgba(204, 0, 0,0.7)"],
                "heatmap-opacity": ["interpolate", ["linear"], ["zoom"], 12, 1, 18, 0]
            }
        }),
    }
}

/// Individual incident points, fading in where the heatmap fades out.
pub fn heatmap_points_layer() -> LayerSpec {
    LayerSpec {
        id: ID_HEATMAP_PTS_LAYER.to_string(),
        spec: json!({
            "id": ID_HEATMAP_PTS_LAYER,
            "type": "circle",
            "source": ID_HEATMAP_PTS_SOURCE,
            "layout": {"visibility": "none"},
            "minzoom": 13,
            "paint": {
                "circle-radius": 4,
                "circle-color": "#1AA1F3",
                "circle-stroke-color": "white",
                "circle-stroke-width": 1,
                "circle-opacity": ["interpolate", ["linear"], ["zoom"], 13, 0, 14.5, 1]
            }
        }),
    }
}

fn border_width(unit: SpatialUnit) -> f64 {
    match unit {
        SpatialUnit::CadastralZone => 1.0,
        _ => 1.2,
    }
}

/// Register every default source and layer: three unit fills (localities
/// start visible), three borders, three name layers, and the heatmap pair.
pub fn load_defaults(surface: &mut dyn MapSurface, paths: &SourcePaths) {
    for unit in SpatialUnit::ALL {
        surface.add_source(unit.source_id(), SourceData::Url(paths.polygons(unit).to_string()));
        let fill_visibility = if unit == SpatialUnit::Locality {
            Visibility::Visible
        } else {
            Visibility::Hidden
        };
        surface.add_layer(fill_layer(unit.fill_layer(), unit.source_id(), fill_visibility));
    }

    for unit in SpatialUnit::ALL {
        surface.add_layer(border_layer(
            unit.border_layer(),
            unit.source_id(),
            Visibility::Hidden,
            border_width(unit),
        ));
    }

    for unit in SpatialUnit::ALL {
        surface.add_source(unit.names_source_id(), SourceData::Url(paths.names(unit).to_string()));
        surface.add_layer(names_layer(
            unit.names_layer(),
            unit.names_source_id(),
            Visibility::Hidden,
            unit,
        ));
    }

    surface.add_source(ID_HEATMAP_SOURCE, SourceData::Url(paths.heatmap.clone()));
    surface.add_source(ID_HEATMAP_PTS_SOURCE, SourceData::Url(paths.heatmap_points.clone()));
    surface.add_layer(heatmap_layer());
    surface.add_layer(heatmap_points_layer());
}

#[cfg(test)]
pub mod recording {
    use super::*;
    use std::collections::HashMap;

    /// Records every call so tests can assert on what reached the renderer.
    #[derive(Default)]
    pub struct RecordingSurface {
        pub sources: Vec<String>,
        pub layers: Vec<LayerSpec>,
        pub layout: HashMap<(String, String), Value>,
        pub paint: HashMap<(String, String), Value>,
        pub removed: Vec<String>,
    }

    impl RecordingSurface {
        pub fn new() -> RecordingSurface {
            RecordingSurface::default()
        }

        /// Effective visibility: layout overrides first, then the spec the
        /// layer was created with.
        pub fn visibility(&self, layer: &str) -> Option<String> {
            if let Some(value) = self.layout.get(&(layer.to_string(), "visibility".to_string())) {
                return value.as_str().map(str::to_string);
            }
            self.layers
                .iter()
                .find(|l| l.id == layer)
                .and_then(|l| l.spec["layout"]["visibility"].as_str())
                .map(str::to_string)
        }

        pub fn paint_property(&self, layer: &str, property: &str) -> Option<&Value> {
            self.paint.get(&(layer.to_string(), property.to_string()))
        }
    }

    impl MapSurface for RecordingSurface {
        fn add_source(&mut self, id: &str, _data: SourceData) {
            self.sources.push(id.to_string());
        }

        fn add_layer(&mut self, spec: LayerSpec) {
            self.layers.push(spec);
        }

        fn has_layer(&self, id: &str) -> bool {
            self.layers.iter().any(|l| l.id == id)
        }

        fn set_layout_property(&mut self, layer: &str, property: &str, value: Value) {
            self.layout.insert((layer.to_string(), property.to_string()), value);
        }

        fn set_paint_property(&mut self, layer: &str, property: &str, value: Value) {
            self.paint.insert((layer.to_string(), property.to_string()), value);
        }

        fn remove_layer(&mut self, id: &str) {
            self.layers.retain(|l| l.id != id);
            self.layout.retain(|(layer, _), _| layer != id);
            self.paint.retain(|(layer, _), _| layer != id);
            self.removed.push(id.to_string());
        }
    }
}
