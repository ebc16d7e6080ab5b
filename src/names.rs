use anyhow::{anyhow, Context, Result};
use geo::Centroid;
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject};
use std::fs;
use std::path::Path;
use tracing::info;

/// One label point per polygon, placed at the centroid and carrying the
/// name property. This is how the name-layer source files for the symbol
/// layers are produced.
pub fn derive_label_points(
    collection: &FeatureCollection,
    name_property: &str,
) -> Result<FeatureCollection> {
    let mut features = Vec::new();
    let mut skipped = 0usize;

    for feature in &collection.features {
        let name = feature
            .properties
            .as_ref()
            .and_then(|props| props.get(name_property));
        let (Some(name), Some(geometry)) = (name, feature.geometry.as_ref()) else {
            skipped += 1;
            continue;
        };

        let geo_geometry: geo::Geometry<f64> = geometry
            .value
            .clone()
            .try_into()
            .map_err(|e| anyhow!("failed to convert geometry: {e}"))?;
        let Some(point) = geo_geometry.centroid() else {
            skipped += 1;
            continue;
        };

        let mut properties = JsonObject::new();
        properties.insert(name_property.to_string(), name.clone());
        features.push(Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&point))),
            id: feature.id.clone(),
            properties: Some(properties),
            foreign_members: None,
        });
    }

    if skipped > 0 {
        info!(skipped, "features without name or usable geometry left out");
    }

    Ok(FeatureCollection { bbox: None, features, foreign_members: None })
}

pub fn run(input: &Path, name_property: &str, output: &Path) -> Result<()> {
    let raw = fs::read_to_string(input)
        .with_context(|| format!("Failed to read polygon file: {:?}", input))?;
    let geojson: GeoJson = raw.parse().context("Failed to parse GeoJSON")?;
    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("Input must be a FeatureCollection")),
    };

    let labels = derive_label_points(&collection, name_property)?;
    info!(points = labels.features.len(), "derived label points");

    fs::write(output, serde_json::to_string(&labels)?)
        .with_context(|| format!("Failed to write label points: {:?}", output))?;
    Ok(())
}
