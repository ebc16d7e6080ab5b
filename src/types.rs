use geojson::{Feature, GeoJson};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// The three spatial-unit granularities the viewer knows about. Every
/// identifier tied to a granularity (source ids, layer ids, match keys,
/// directory names) hangs off this enum so menu handling never has to
/// string-match display text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpatialUnit {
    Locality,
    SubZone,
    CadastralZone,
}

/// Text parameters for a unit's name (symbol) layer.
#[derive(Debug, Clone, Copy)]
pub struct LabelParams {
    pub font_scale: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

impl SpatialUnit {
    pub const ALL: [SpatialUnit; 3] = [
        SpatialUnit::Locality,
        SpatialUnit::SubZone,
        SpatialUnit::CadastralZone,
    ];

    /// Numeric id used on the wire by the upload form and the listing API.
    pub fn wire_id(self) -> u8 {
        match self {
            SpatialUnit::Locality => 1,
            SpatialUnit::SubZone => 2,
            SpatialUnit::CadastralZone => 3,
        }
    }

    pub fn from_wire_id(id: u8) -> Option<SpatialUnit> {
        match id {
            1 => Some(SpatialUnit::Locality),
            2 => Some(SpatialUnit::SubZone),
            3 => Some(SpatialUnit::CadastralZone),
            _ => None,
        }
    }

    /// Id of the polygon source registered with the renderer.
    pub fn source_id(self) -> &'static str {
        match self {
            SpatialUnit::Locality => "lcl",
            SpatialUnit::SubZone => "upz",
            SpatialUnit::CadastralZone => "cat_zone",
        }
    }

    /// Property that joins an uploaded dataset to the base polygons.
    pub fn match_key(self) -> &'static str {
        match self {
            SpatialUnit::Locality => "COD_LCL",
            SpatialUnit::SubZone => "COD_UPZ",
            SpatialUnit::CadastralZone => "COD_ZC",
        }
    }

    pub fn fill_layer(self) -> &'static str {
        match self {
            SpatialUnit::Locality => "lcl-layer",
            SpatialUnit::SubZone => "upz-layer",
            SpatialUnit::CadastralZone => "zc-layer",
        }
    }

    pub fn border_layer(self) -> &'static str {
        match self {
            SpatialUnit::Locality => "lcl-brd-layer",
            SpatialUnit::SubZone => "upz-brd-layer",
            SpatialUnit::CadastralZone => "zc-brd-layer",
        }
    }

    pub fn names_layer(self) -> &'static str {
        match self {
            SpatialUnit::Locality => "lcl-name-layer",
            SpatialUnit::SubZone => "upz-name-layer",
            SpatialUnit::CadastralZone => "zc-name-layer",
        }
    }

    pub fn names_source_id(self) -> &'static str {
        match self {
            SpatialUnit::Locality => "lcl-name",
            SpatialUnit::SubZone => "upz-name",
            SpatialUnit::CadastralZone => "zc-name",
        }
    }

    /// Property on the base polygons holding the unit's human-readable name.
    pub fn name_property(self) -> &'static str {
        match self {
            SpatialUnit::Locality => "NOM_LCL",
            SpatialUnit::SubZone => "UPlNombre",
            SpatialUnit::CadastralZone => "ZC_NOM",
        }
    }

    /// Label prefix shown in the hover panel next to the unit code.
    pub fn code_label(self) -> &'static str {
        match self {
            SpatialUnit::Locality => "Location code",
            SpatialUnit::SubZone => "UPZ code",
            SpatialUnit::CadastralZone => "C. Zone code",
        }
    }

    /// Subdirectory of the choropleth store holding this unit's datasets.
    pub fn dir_name(self) -> &'static str {
        match self {
            SpatialUnit::Locality => "lcl",
            SpatialUnit::SubZone => "upz",
            SpatialUnit::CadastralZone => "cat_zone",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            SpatialUnit::Locality => "Localities",
            SpatialUnit::SubZone => "UPZ",
            SpatialUnit::CadastralZone => "Catastral zones",
        }
    }

    pub fn border_display_name(self) -> &'static str {
        match self {
            SpatialUnit::Locality => "Locality limits",
            SpatialUnit::SubZone => "UPZ limits",
            SpatialUnit::CadastralZone => "Catastral limits",
        }
    }

    pub fn names_display_name(self) -> &'static str {
        match self {
            SpatialUnit::Locality => "Localities names",
            SpatialUnit::SubZone => "UPZ names",
            SpatialUnit::CadastralZone => "Catastral zone names",
        }
    }

    pub fn label_params(self) -> LabelParams {
        match self {
            SpatialUnit::Locality => LabelParams { font_scale: 0.68, min_zoom: 10.0, max_zoom: 20.0 },
            SpatialUnit::SubZone => LabelParams { font_scale: 0.58, min_zoom: 10.0, max_zoom: 20.0 },
            SpatialUnit::CadastralZone => LabelParams { font_scale: 0.5, min_zoom: 13.0, max_zoom: 22.0 },
        }
    }
}

/// Presentation settings carried inside a dataset file as a top-level
/// `config` member next to the feature collection. Wire names follow the
/// established file format.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Presentation {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "c_palete")]
    pub palette: Option<[String; 2]>,
    #[serde(default, alias = "qcolors")]
    pub buckets: Option<usize>,
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to parse GeoJSON: {0}")]
    Parse(#[from] geojson::Error),
    #[error("dataset must be a GeoJSON FeatureCollection")]
    NotFeatureCollection,
}

/// A statistical dataset bound to one spatial-unit granularity: the parsed
/// features plus whatever presentation settings the file carried.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub features: Vec<Feature>,
    pub presentation: Presentation,
}

impl Dataset {
    pub fn from_slice(bytes: &[u8]) -> Result<Dataset, DatasetError> {
        let geojson = GeoJson::from_reader(bytes).map_err(geojson::Error::from)?;
        let collection = match geojson {
            GeoJson::FeatureCollection(fc) => fc,
            _ => return Err(DatasetError::NotFeatureCollection),
        };

        let presentation = collection
            .foreign_members
            .as_ref()
            .and_then(|members| members.get("config"))
            .map(|raw| match serde_json::from_value::<Presentation>(raw.clone()) {
                Ok(p) => p,
                Err(e) => {
                    warn!("ignoring malformed dataset config: {e}");
                    Presentation::default()
                }
            })
            .unwrap_or_default();

        Ok(Dataset { features: collection.features, presentation })
    }

    /// Candidate properties for classification: every property on the first
    /// feature that is not the match key and holds a finite number. Schema is
    /// deliberately inferred from the first feature alone; heterogeneous
    /// collections are not validated.
    pub fn numeric_properties(&self, match_key: &str) -> Vec<String> {
        let Some(first) = self.features.first() else {
            return Vec::new();
        };
        let Some(props) = first.properties.as_ref() else {
            return Vec::new();
        };

        props
            .iter()
            .filter(|(name, value)| name.as_str() != match_key && is_numeric(value))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// The property an activated choropleth starts out on.
    pub fn default_property(&self, match_key: &str) -> Option<String> {
        self.numeric_properties(match_key).into_iter().next()
    }

    /// All finite values of `property` across the collection, in feature
    /// order. Features missing the property contribute nothing.
    pub fn sample(&self, property: &str) -> Vec<f64> {
        self.features
            .iter()
            .filter_map(|feature| property_value(feature, property))
            .collect()
    }

    pub fn title(&self) -> Option<&str> {
        self.presentation.title.as_deref()
    }
}

/// Finite numeric value of a feature property, if present.
pub fn property_value(feature: &Feature, property: &str) -> Option<f64> {
    feature
        .properties
        .as_ref()
        .and_then(|props| props.get(property))
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
}

/// Match-key value of a feature as a string. Keys appear as strings in some
/// files and as bare numbers in others, so both are accepted.
pub fn match_value(feature: &Feature, match_key: &str) -> Option<String> {
    match feature.properties.as_ref()?.get(match_key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_numeric(value: &Value) -> bool {
    value.as_f64().is_some_and(f64::is_finite)
}
