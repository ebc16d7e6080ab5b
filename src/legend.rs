use crate::classify::{format_break_label, Classification};
use crate::types::{match_value, property_value, Dataset, SpatialUnit};
use geojson::JsonObject;
use serde::Serialize;

/// Swatch used for the zero entry so "no data" reads as blank rather than as
/// the lowest bucket.
pub const NO_DATA_SWATCH: &str = "rgba(255, 255, 255, 1)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegendEntry {
    pub label: String,
    pub color: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Legend {
    pub entries: Vec<LegendEntry>,
}

/// One legend row per breakpoint, in ascending order.
pub fn build_legend(classification: &Classification) -> Legend {
    let entries = classification
        .breaks
        .iter()
        .enumerate()
        .map(|(i, brk)| {
            let color = if *brk == 0.0 {
                NO_DATA_SWATCH.to_string()
            } else {
                classification
                    .colors
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| classification.no_data_color.clone())
            };
            LegendEntry { label: format_break_label(*brk), color }
        })
        .collect();
    Legend { entries }
}

/// Live panel contents for the unit under the pointer.
#[derive(Debug, Clone, PartialEq)]
pub struct HoverInfo {
    pub code_label: &'static str,
    pub code: String,
    pub unit_name: Option<String>,
    pub property: String,
    pub value: f64,
}

impl HoverInfo {
    pub fn value_text(&self) -> String {
        format!("{:.4}", self.value)
    }
}

/// Resolve the hovered base polygon against the active dataset. The code and
/// unit name come from the base feature; the value comes from the dataset
/// feature with the same match key, scanned linearly (fine for a few hundred
/// polygons, an index would be warranted beyond that). A unit absent from
/// the dataset reads as 0.
pub fn hover_info(
    dataset: &Dataset,
    unit: SpatialUnit,
    property: &str,
    base_properties: &JsonObject,
) -> Option<HoverInfo> {
    let code = match base_properties.get(unit.match_key())? {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };

    let unit_name = base_properties
        .get(unit.name_property())
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let value = dataset
        .features
        .iter()
        .find(|feature| match_value(feature, unit.match_key()).as_deref() == Some(code.as_str()))
        .and_then(|feature| property_value(feature, property))
        .unwrap_or(0.0);

    Some(HoverInfo {
        code_label: unit.code_label(),
        code,
        unit_name,
        property: property.to_string(),
        value,
    })
}
