use crate::classify::{classify, Classification, ClassifyDefaults, ClassifyError};
use crate::config::SourcePaths;
use crate::data::{display_name, property_label};
use crate::layers::{
    self, choropleth_layer, fill_color_expression, set_visibility, MapSurface, Visibility,
    ID_HEATMAP_LAYER, ID_HEATMAP_PTS_LAYER, ID_PREDICTION_LAYER,
};
use crate::legend::{build_legend, hover_info, HoverInfo, Legend};
use crate::types::{Dataset, SpatialUnit};
use geojson::JsonObject;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, warn};

pub const HEATMAP_MENU_NAME: &str = "Incident heatmap";
pub const PREDICTION_MENU_NAME: &str = "Predictability map";

#[derive(Debug, Error)]
pub enum StateError {
    #[error("no dataset menu entry named {0:?}")]
    UnknownEntry(String),
    #[error("dataset has no numeric properties to display")]
    NoNumericProperties,
    #[error("property {0:?} is not part of the active dataset")]
    UnknownProperty(String),
    #[error("no choropleth layer is active")]
    NothingActive,
    #[error(transparent)]
    Classify(#[from] ClassifyError),
}

/// The three per-unit layer families toggled from the default menus. Each is
/// its own exclusivity group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitLayerKind {
    Fill,
    Border,
    Names,
}

impl UnitLayerKind {
    pub fn layer_id(self, unit: SpatialUnit) -> &'static str {
        match self {
            UnitLayerKind::Fill => unit.fill_layer(),
            UnitLayerKind::Border => unit.border_layer(),
            UnitLayerKind::Names => unit.names_layer(),
        }
    }

    fn display(self, unit: SpatialUnit) -> &'static str {
        match self {
            UnitLayerKind::Fill => unit.display_name(),
            UnitLayerKind::Border => unit.border_display_name(),
            UnitLayerKind::Names => unit.names_display_name(),
        }
    }
}

fn show_label(name: &str) -> String {
    format!("Show: {name}")
}

fn hide_label(name: &str) -> String {
    format!("Hide: {name}")
}

/// One option of a choropleth menu. The formatted display name doubles as
/// the map layer id, as the menus have always worked.
#[derive(Debug, Clone)]
pub struct MenuEntry {
    pub name: String,
    pub file: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRow {
    pub property: String,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct PropertyList {
    pub rows: Vec<PropertyRow>,
    pub active: usize,
}

/// Side-panel contents derived from the visible choropleth: title, legend,
/// live hover info and the property switch list (present only when there is
/// something to switch between).
#[derive(Debug, Clone)]
pub struct Panels {
    pub title: String,
    pub legend: Legend,
    pub info: Option<HoverInfo>,
    pub properties: Option<PropertyList>,
}

/// Ticket for an in-flight dataset read. Carries the generation stamp that
/// lets a response landing after a newer selection be recognized and dropped
/// instead of clobbering it.
#[derive(Debug, Clone)]
pub struct ChoroplethLoad {
    pub unit: SpatialUnit,
    pub name: String,
    pub file: String,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied,
    /// A newer selection superseded this load; nothing was changed.
    Stale,
}

#[derive(Debug)]
struct ActiveChoropleth {
    unit: SpatialUnit,
    name: String,
    dataset: Dataset,
    property: String,
    classification: Classification,
}

#[derive(Debug)]
struct PredictionOverlay {
    dataset: Dataset,
    property: String,
    classification: Classification,
    title: String,
}

#[derive(Debug)]
struct DefaultGroup {
    active: Option<SpatialUnit>,
    labels: HashMap<SpatialUnit, String>,
}

impl DefaultGroup {
    fn new(kind: UnitLayerKind, active: Option<SpatialUnit>) -> DefaultGroup {
        let labels = SpatialUnit::ALL
            .iter()
            .map(|&unit| {
                let display = kind.display(unit);
                let label = if active == Some(unit) {
                    hide_label(display)
                } else {
                    show_label(display)
                };
                (unit, label)
            })
            .collect();
        DefaultGroup { active, labels }
    }

    fn activate(&mut self, surface: &mut dyn MapSurface, kind: UnitLayerKind, unit: SpatialUnit) {
        if self.active == Some(unit) {
            return;
        }
        if let Some(prev) = self.active.take() {
            set_visibility(surface, kind.layer_id(prev), Visibility::Hidden);
            self.labels.insert(prev, show_label(kind.display(prev)));
        }
        set_visibility(surface, kind.layer_id(unit), Visibility::Visible);
        self.labels.insert(unit, hide_label(kind.display(unit)));
        self.active = Some(unit);
    }

    fn deactivate(&mut self, surface: &mut dyn MapSurface, kind: UnitLayerKind, unit: SpatialUnit) {
        if self.active != Some(unit) {
            return;
        }
        set_visibility(surface, kind.layer_id(unit), Visibility::Hidden);
        self.labels.insert(unit, show_label(kind.display(unit)));
        self.active = None;
    }
}

/// All viewer-side state behind the menus: one active member per exclusivity
/// group, the lazily built dataset catalogs, the visible choropleth with its
/// side panels, and the overlay toggles. Every mutation goes through here.
pub struct ViewerState {
    defaults: ClassifyDefaults,
    fill: DefaultGroup,
    border: DefaultGroup,
    names: DefaultGroup,
    catalogs: HashMap<SpatialUnit, Vec<MenuEntry>>,
    active: Option<ActiveChoropleth>,
    panels: Option<Panels>,
    generation: u64,
    prediction: Option<PredictionOverlay>,
    prediction_visible: bool,
    prediction_label: String,
    heatmap_visible: bool,
    heatmap_label: String,
}

impl ViewerState {
    /// Fresh session state: localities fill visible, everything else off.
    pub fn new(defaults: ClassifyDefaults) -> ViewerState {
        ViewerState {
            defaults,
            fill: DefaultGroup::new(UnitLayerKind::Fill, Some(SpatialUnit::Locality)),
            border: DefaultGroup::new(UnitLayerKind::Border, None),
            names: DefaultGroup::new(UnitLayerKind::Names, None),
            catalogs: HashMap::new(),
            active: None,
            panels: None,
            generation: 0,
            prediction: None,
            prediction_visible: false,
            prediction_label: show_label(PREDICTION_MENU_NAME),
            heatmap_visible: false,
            heatmap_label: show_label(HEATMAP_MENU_NAME),
        }
    }

    /// Attach the static prediction dataset shown by the overlay toggle.
    pub fn set_prediction(&mut self, dataset: Dataset, property: &str) -> Result<(), StateError> {
        let classification = classify(&dataset, property, &self.defaults)?;
        let title = dataset
            .title()
            .unwrap_or(PREDICTION_MENU_NAME)
            .to_string();
        self.prediction = Some(PredictionOverlay {
            dataset,
            property: property.to_string(),
            classification,
            title,
        });
        Ok(())
    }

    /// Register every default source and layer with the renderer, including
    /// the prediction overlay when one was attached.
    pub fn init_map(&mut self, surface: &mut dyn MapSurface, paths: &SourcePaths) {
        layers::load_defaults(surface, paths);

        if let Some(prediction) = &self.prediction {
            let match_key = SpatialUnit::Locality.match_key();
            let table =
                prediction
                    .classification
                    .match_table(&prediction.dataset, match_key, &prediction.property);
            let expr =
                fill_color_expression(match_key, &table, &prediction.classification.no_data_color);
            surface.add_layer(choropleth_layer(
                ID_PREDICTION_LAYER,
                SpatialUnit::Locality.source_id(),
                Visibility::Hidden,
                expr,
            ));
        }
    }

    fn group_mut(&mut self, kind: UnitLayerKind) -> &mut DefaultGroup {
        match kind {
            UnitLayerKind::Fill => &mut self.fill,
            UnitLayerKind::Border => &mut self.border,
            UnitLayerKind::Names => &mut self.names,
        }
    }

    fn group(&self, kind: UnitLayerKind) -> &DefaultGroup {
        match kind {
            UnitLayerKind::Fill => &self.fill,
            UnitLayerKind::Border => &self.border,
            UnitLayerKind::Names => &self.names,
        }
    }

    /// Make `unit` the group's single visible member. No-op when it already
    /// is.
    pub fn activate(&mut self, surface: &mut dyn MapSurface, kind: UnitLayerKind, unit: SpatialUnit) {
        self.group_mut(kind).activate(surface, kind, unit);
    }

    /// Hide `unit` without a replacement. No-op when it is not the active
    /// member.
    pub fn deactivate(&mut self, surface: &mut dyn MapSurface, kind: UnitLayerKind, unit: SpatialUnit) {
        self.group_mut(kind).deactivate(surface, kind, unit);
    }

    /// Menu-click semantics on a default layer entry.
    pub fn toggle(&mut self, surface: &mut dyn MapSurface, kind: UnitLayerKind, unit: SpatialUnit) {
        if self.group(kind).active == Some(unit) {
            self.deactivate(surface, kind, unit);
        } else {
            self.activate(surface, kind, unit);
        }
    }

    pub fn active_member(&self, kind: UnitLayerKind) -> Option<SpatialUnit> {
        self.group(kind).active
    }

    pub fn menu_label(&self, kind: UnitLayerKind, unit: SpatialUnit) -> &str {
        self.group(kind).labels[&unit].as_str()
    }

    /// Whether the choropleth menu for `unit` still needs a directory
    /// listing.
    pub fn needs_catalog(&self, unit: SpatialUnit) -> bool {
        !self.catalogs.contains_key(&unit)
    }

    /// Build the menu catalog from a directory listing. Only the first
    /// non-empty listing sticks; later calls are ignored so the menu stays
    /// stable for the session. An empty listing leaves the catalog
    /// unpopulated and a later expansion retries.
    pub fn ensure_catalog(&mut self, unit: SpatialUnit, files: &[String]) -> &[MenuEntry] {
        if !self.catalogs.contains_key(&unit) {
            if files.is_empty() {
                info!(unit = unit.dir_name(), "no dataset files found for menu");
                return &[];
            }
            let entries = files
                .iter()
                .map(|file| {
                    let name = display_name(file);
                    MenuEntry {
                        label: show_label(&name),
                        name,
                        file: file.clone(),
                    }
                })
                .collect();
            self.catalogs.insert(unit, entries);
        }
        self.catalogs[&unit].as_slice()
    }

    pub fn catalog(&self, unit: SpatialUnit) -> &[MenuEntry] {
        self.catalogs.get(&unit).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Menu-click on a choropleth entry. Clicking the visible entry hides it
    /// and returns `None`; anything else supersedes in-flight loads and
    /// returns the ticket the caller uses to fetch the file.
    pub fn choropleth_click(
        &mut self,
        surface: &mut dyn MapSurface,
        unit: SpatialUnit,
        name: &str,
    ) -> Result<Option<ChoroplethLoad>, StateError> {
        let entry = self
            .catalogs
            .get(&unit)
            .and_then(|entries| entries.iter().find(|e| e.name == name))
            .ok_or_else(|| StateError::UnknownEntry(name.to_string()))?;
        let file = entry.file.clone();

        if self
            .active
            .as_ref()
            .is_some_and(|active| active.unit == unit && active.name == name)
        {
            self.deactivate_choropleth(surface);
            return Ok(None);
        }

        self.generation += 1;
        Ok(Some(ChoroplethLoad {
            unit,
            name: name.to_string(),
            file,
            generation: self.generation,
        }))
    }

    /// Apply a finished dataset read. A stale ticket (superseded by a newer
    /// click) changes nothing. Classification runs before any teardown so a
    /// failure leaves the previous view intact.
    pub fn complete_choropleth_load(
        &mut self,
        surface: &mut dyn MapSurface,
        load: ChoroplethLoad,
        dataset: Dataset,
    ) -> Result<LoadOutcome, StateError> {
        if load.generation != self.generation {
            warn!(name = %load.name, "dropping stale dataset response");
            return Ok(LoadOutcome::Stale);
        }

        let match_key = load.unit.match_key();
        let property = dataset
            .default_property(match_key)
            .ok_or(StateError::NoNumericProperties)?;
        let classification = classify(&dataset, &property, &self.defaults)?;

        self.deactivate_choropleth(surface);

        let table = classification.match_table(&dataset, match_key, &property);
        let expr = fill_color_expression(match_key, &table, &classification.no_data_color);
        if surface.has_layer(&load.name) {
            surface.set_paint_property(&load.name, "fill-color", expr);
            surface.set_paint_property(&load.name, "fill-outline-color", serde_json::json!("#FFFFFF"));
        } else {
            surface.add_layer(choropleth_layer(
                &load.name,
                load.unit.source_id(),
                Visibility::Visible,
                expr,
            ));
        }

        if let Some(entry) = self.entry_mut(load.unit, &load.name) {
            entry.label = hide_label(&load.name);
        }

        let active = ActiveChoropleth {
            unit: load.unit,
            name: load.name,
            dataset,
            property,
            classification,
        };
        self.panels = Some(build_panels(&active, match_key));
        info!(layer = %active.name, property = %active.property, "choropleth activated");
        self.active = Some(active);
        Ok(LoadOutcome::Applied)
    }

    /// Remove the visible choropleth layer outright and drop its panels.
    /// User layers are rebuilt from their file on the next activation, so
    /// there is nothing to keep hidden.
    pub fn deactivate_choropleth(&mut self, surface: &mut dyn MapSurface) {
        if let Some(active) = self.active.take() {
            surface.remove_layer(&active.name);
            if let Some(entry) = self.entry_mut(active.unit, &active.name) {
                entry.label = show_label(&active.name);
            }
            self.panels = None;
        }
    }

    fn entry_mut(&mut self, unit: SpatialUnit, name: &str) -> Option<&mut MenuEntry> {
        self.catalogs
            .get_mut(&unit)
            .and_then(|entries| entries.iter_mut().find(|e| e.name == name))
    }

    /// Switch the visible choropleth to another property of its dataset.
    pub fn select_property(
        &mut self,
        surface: &mut dyn MapSurface,
        property: &str,
    ) -> Result<(), StateError> {
        let active = self.active.as_mut().ok_or(StateError::NothingActive)?;
        let match_key = active.unit.match_key();
        if !active
            .dataset
            .numeric_properties(match_key)
            .iter()
            .any(|p| p == property)
        {
            return Err(StateError::UnknownProperty(property.to_string()));
        }

        let classification = classify(&active.dataset, property, &self.defaults)?;
        let table = classification.match_table(&active.dataset, match_key, property);
        let expr = fill_color_expression(match_key, &table, &classification.no_data_color);
        surface.set_paint_property(&active.name, "fill-color", expr);

        active.property = property.to_string();
        active.classification = classification;

        if let Some(panels) = self.panels.as_mut() {
            panels.legend = build_legend(&active.classification);
            panels.info = None;
            if let Some(list) = panels.properties.as_mut() {
                if let Some(index) = list.rows.iter().position(|row| row.property == property) {
                    list.active = index;
                }
            }
        }
        Ok(())
    }

    /// Pointer moved over a choropleth: refresh the live info panel from the
    /// hovered base polygon's properties.
    pub fn hover(&mut self, base_properties: &JsonObject) -> Option<&HoverInfo> {
        let (dataset, unit, property) = if let Some(active) = self.active.as_ref() {
            (&active.dataset, active.unit, active.property.as_str())
        } else if self.prediction_visible {
            let prediction = self.prediction.as_ref()?;
            (&prediction.dataset, SpatialUnit::Locality, prediction.property.as_str())
        } else {
            return None;
        };

        let info = hover_info(dataset, unit, property, base_properties)?;
        let panels = self.panels.as_mut()?;
        panels.info = Some(info);
        panels.info.as_ref()
    }

    /// The heatmap toggle drives the density layer and its point layer as
    /// one unit.
    pub fn toggle_heatmap(&mut self, surface: &mut dyn MapSurface) {
        let visibility = if self.heatmap_visible {
            Visibility::Hidden
        } else {
            Visibility::Visible
        };
        set_visibility(surface, ID_HEATMAP_LAYER, visibility);
        set_visibility(surface, ID_HEATMAP_PTS_LAYER, visibility);
        self.heatmap_visible = !self.heatmap_visible;
        self.heatmap_label = if self.heatmap_visible {
            hide_label(HEATMAP_MENU_NAME)
        } else {
            show_label(HEATMAP_MENU_NAME)
        };
    }

    /// Show or hide the static prediction overlay. Showing it takes over the
    /// side panels; hiding hands them back to the active user choropleth, if
    /// any.
    pub fn toggle_prediction(&mut self, surface: &mut dyn MapSurface) {
        let Some(prediction) = self.prediction.as_ref() else {
            warn!("prediction overlay toggled but no prediction dataset is configured");
            return;
        };

        if !self.prediction_visible {
            set_visibility(surface, ID_PREDICTION_LAYER, Visibility::Visible);
            self.prediction_visible = true;
            self.prediction_label = hide_label(PREDICTION_MENU_NAME);

            let match_key = SpatialUnit::Locality.match_key();
            let rows: Vec<PropertyRow> = prediction
                .dataset
                .numeric_properties(match_key)
                .into_iter()
                .map(|property| PropertyRow {
                    label: property_label(&property),
                    property,
                })
                .collect();
            let active_row = rows.iter().position(|row| row.property == prediction.property);
            self.panels = Some(Panels {
                title: prediction.title.clone(),
                legend: build_legend(&prediction.classification),
                info: None,
                properties: (rows.len() > 1).then(|| PropertyList {
                    active: active_row.unwrap_or(0),
                    rows,
                }),
            });
        } else {
            set_visibility(surface, ID_PREDICTION_LAYER, Visibility::Hidden);
            self.prediction_visible = false;
            self.prediction_label = show_label(PREDICTION_MENU_NAME);
            self.panels = self.active.as_ref().map(|active| build_panels(active, active.unit.match_key()));
        }
    }

    pub fn panels(&self) -> Option<&Panels> {
        self.panels.as_ref()
    }

    pub fn heatmap_label(&self) -> &str {
        &self.heatmap_label
    }

    pub fn prediction_label(&self) -> &str {
        &self.prediction_label
    }

    pub fn active_choropleth(&self) -> Option<(&str, SpatialUnit, &str)> {
        self.active
            .as_ref()
            .map(|active| (active.name.as_str(), active.unit, active.property.as_str()))
    }
}

fn build_panels(active: &ActiveChoropleth, match_key: &str) -> Panels {
    let rows: Vec<PropertyRow> = active
        .dataset
        .numeric_properties(match_key)
        .into_iter()
        .map(|property| PropertyRow {
            label: property_label(&property),
            property,
        })
        .collect();
    let active_row = rows.iter().position(|row| row.property == active.property);

    Panels {
        title: active
            .dataset
            .title()
            .unwrap_or(active.name.as_str())
            .to_string(),
        legend: build_legend(&active.classification),
        info: None,
        properties: (rows.len() > 1).then(|| PropertyList {
            active: active_row.unwrap_or(0),
            rows,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::recording::RecordingSurface;
    use crate::types::Dataset;

    fn defaults() -> ClassifyDefaults {
        ClassifyDefaults {
            palette: ["#ffffff".to_string(), "#ff0000".to_string()],
            buckets: 5,
            no_data_color: "rgba(0,0,0,0)".to_string(),
        }
    }

    fn viewer() -> (ViewerState, RecordingSurface) {
        let mut state = ViewerState::new(defaults());
        let mut surface = RecordingSurface::new();
        state.init_map(&mut surface, &SourcePaths::default());
        (state, surface)
    }

    fn locality_dataset() -> Dataset {
        Dataset::from_slice(
            br#"{
                "type": "FeatureCollection",
                "config": {"title": "Thefts per capita"},
                "features": [
                    {"type": "Feature", "properties": {"COD_LCL": "01", "rate": 0.5, "count": 120.0}, "geometry": null},
                    {"type": "Feature", "properties": {"COD_LCL": "02", "rate": 1.5, "count": 80.0}, "geometry": null},
                    {"type": "Feature", "properties": {"COD_LCL": "03", "rate": 2.5, "count": 45.0}, "geometry": null},
                    {"type": "Feature", "properties": {"COD_LCL": "04", "rate": 3.5, "count": 0.0}, "geometry": null},
                    {"type": "Feature", "properties": {"COD_LCL": "05", "rate": 4.5, "count": 33.0}, "geometry": null}
                ]
            }"#,
        )
        .unwrap()
    }

    fn files() -> Vec<String> {
        vec!["thefts_2019.geojson".to_string(), "assaults.json".to_string()]
    }

    #[test]
    fn fill_group_starts_on_localities() {
        let (state, _) = viewer();
        assert_eq!(state.active_member(UnitLayerKind::Fill), Some(SpatialUnit::Locality));
        assert_eq!(state.menu_label(UnitLayerKind::Fill, SpatialUnit::Locality), "Hide: Localities");
        assert_eq!(state.menu_label(UnitLayerKind::Fill, SpatialUnit::SubZone), "Show: UPZ");
        assert_eq!(state.active_member(UnitLayerKind::Border), None);
        assert_eq!(state.active_member(UnitLayerKind::Names), None);
    }

    #[test]
    fn activating_another_member_deactivates_the_previous_one() {
        let (mut state, mut surface) = viewer();
        state.toggle(&mut surface, UnitLayerKind::Fill, SpatialUnit::SubZone);

        assert_eq!(state.active_member(UnitLayerKind::Fill), Some(SpatialUnit::SubZone));
        assert_eq!(surface.visibility("upz-layer").as_deref(), Some("visible"));
        assert_eq!(surface.visibility("lcl-layer").as_deref(), Some("none"));
        assert_eq!(state.menu_label(UnitLayerKind::Fill, SpatialUnit::Locality), "Show: Localities");
        assert_eq!(state.menu_label(UnitLayerKind::Fill, SpatialUnit::SubZone), "Hide: UPZ");
    }

    #[test]
    fn activating_the_active_member_is_a_no_op() {
        let (mut state, mut surface) = viewer();
        state.activate(&mut surface, UnitLayerKind::Fill, SpatialUnit::Locality);
        assert_eq!(state.menu_label(UnitLayerKind::Fill, SpatialUnit::Locality), "Hide: Localities");
        assert_eq!(state.active_member(UnitLayerKind::Fill), Some(SpatialUnit::Locality));
    }

    #[test]
    fn deactivating_an_inactive_member_is_a_no_op() {
        let (mut state, mut surface) = viewer();
        state.deactivate(&mut surface, UnitLayerKind::Border, SpatialUnit::SubZone);
        assert_eq!(state.active_member(UnitLayerKind::Border), None);
        assert_eq!(state.menu_label(UnitLayerKind::Border, SpatialUnit::SubZone), "Show: UPZ limits");
    }

    #[test]
    fn toggling_the_only_active_member_clears_the_group() {
        let (mut state, mut surface) = viewer();
        state.toggle(&mut surface, UnitLayerKind::Names, SpatialUnit::CadastralZone);
        assert_eq!(state.active_member(UnitLayerKind::Names), Some(SpatialUnit::CadastralZone));

        state.toggle(&mut surface, UnitLayerKind::Names, SpatialUnit::CadastralZone);
        assert_eq!(state.active_member(UnitLayerKind::Names), None);
        assert_eq!(surface.visibility("zc-name-layer").as_deref(), Some("none"));
    }

    #[test]
    fn catalog_is_populated_once() {
        let (mut state, _) = viewer();
        assert!(state.needs_catalog(SpatialUnit::Locality));

        let entries = state.ensure_catalog(SpatialUnit::Locality, &files());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "Thefts 2019");
        assert_eq!(entries[0].label, "Show: Thefts 2019");

        // a later listing must not reshuffle the menu
        state.ensure_catalog(SpatialUnit::Locality, &["other.json".to_string()]);
        assert_eq!(state.catalog(SpatialUnit::Locality).len(), 2);
        assert!(!state.needs_catalog(SpatialUnit::Locality));
    }

    #[test]
    fn empty_listing_leaves_the_catalog_retryable() {
        let (mut state, _) = viewer();
        state.ensure_catalog(SpatialUnit::SubZone, &[]);
        assert!(state.needs_catalog(SpatialUnit::SubZone));

        state.ensure_catalog(SpatialUnit::SubZone, &files());
        assert!(!state.needs_catalog(SpatialUnit::SubZone));
    }

    fn activate_thefts(state: &mut ViewerState, surface: &mut RecordingSurface) {
        state.ensure_catalog(SpatialUnit::Locality, &files());
        let load = state
            .choropleth_click(surface, SpatialUnit::Locality, "Thefts 2019")
            .unwrap()
            .expect("should start a load");
        assert_eq!(load.file, "thefts_2019.geojson");
        let outcome = state
            .complete_choropleth_load(surface, load, locality_dataset())
            .unwrap();
        assert_eq!(outcome, LoadOutcome::Applied);
    }

    #[test]
    fn completing_a_load_builds_layer_and_panels() {
        let (mut state, mut surface) = viewer();
        activate_thefts(&mut state, &mut surface);

        assert!(surface.has_layer("Thefts 2019"));
        let (name, unit, property) = state.active_choropleth().unwrap();
        assert_eq!(name, "Thefts 2019");
        assert_eq!(unit, SpatialUnit::Locality);
        assert_eq!(property, "rate");

        let panels = state.panels().unwrap();
        assert_eq!(panels.title, "Thefts per capita");
        assert_eq!(panels.legend.entries.len(), 4);
        let list = panels.properties.as_ref().unwrap();
        assert_eq!(list.rows.len(), 2);
        assert_eq!(list.rows[0].label, "Rate");
        assert_eq!(list.active, 0);

        let entry = &state.catalog(SpatialUnit::Locality)[0];
        assert_eq!(entry.label, "Hide: Thefts 2019");
    }

    #[test]
    fn switching_datasets_removes_the_previous_layer() {
        let (mut state, mut surface) = viewer();
        activate_thefts(&mut state, &mut surface);

        let load = state
            .choropleth_click(&mut surface, SpatialUnit::Locality, "Assaults")
            .unwrap()
            .unwrap();
        state
            .complete_choropleth_load(&mut surface, load, locality_dataset())
            .unwrap();

        assert!(!surface.has_layer("Thefts 2019"));
        assert!(surface.has_layer("Assaults"));
        assert!(surface.removed.contains(&"Thefts 2019".to_string()));
        let catalog = state.catalog(SpatialUnit::Locality);
        assert_eq!(catalog[0].label, "Show: Thefts 2019");
        assert_eq!(catalog[1].label, "Hide: Assaults");
    }

    #[test]
    fn clicking_the_active_entry_tears_it_down() {
        let (mut state, mut surface) = viewer();
        activate_thefts(&mut state, &mut surface);

        let outcome = state
            .choropleth_click(&mut surface, SpatialUnit::Locality, "Thefts 2019")
            .unwrap();
        assert!(outcome.is_none());
        assert!(!surface.has_layer("Thefts 2019"));
        assert!(state.panels().is_none());
        assert!(state.active_choropleth().is_none());
        assert_eq!(state.catalog(SpatialUnit::Locality)[0].label, "Show: Thefts 2019");
    }

    #[test]
    fn stale_responses_are_dropped() {
        let (mut state, mut surface) = viewer();
        state.ensure_catalog(SpatialUnit::Locality, &files());

        let first = state
            .choropleth_click(&mut surface, SpatialUnit::Locality, "Thefts 2019")
            .unwrap()
            .unwrap();
        let second = state
            .choropleth_click(&mut surface, SpatialUnit::Locality, "Assaults")
            .unwrap()
            .unwrap();

        state
            .complete_choropleth_load(&mut surface, second, locality_dataset())
            .unwrap();
        let outcome = state
            .complete_choropleth_load(&mut surface, first, locality_dataset())
            .unwrap();

        assert_eq!(outcome, LoadOutcome::Stale);
        let (name, _, _) = state.active_choropleth().unwrap();
        assert_eq!(name, "Assaults");
        assert!(surface.has_layer("Assaults"));
        assert!(!surface.has_layer("Thefts 2019"));
    }

    #[test]
    fn classification_failure_keeps_the_previous_view() {
        let (mut state, mut surface) = viewer();
        activate_thefts(&mut state, &mut surface);

        let load = state
            .choropleth_click(&mut surface, SpatialUnit::Locality, "Assaults")
            .unwrap()
            .unwrap();
        let no_numbers = Dataset::from_slice(
            br#"{
                "type": "FeatureCollection",
                "features": [
                    {"type": "Feature", "properties": {"COD_LCL": "01", "label": "x"}, "geometry": null}
                ]
            }"#,
        )
        .unwrap();

        let err = state.complete_choropleth_load(&mut surface, load, no_numbers);
        assert!(matches!(err, Err(StateError::NoNumericProperties)));
        // the previous choropleth is untouched
        assert!(surface.has_layer("Thefts 2019"));
        let (name, _, _) = state.active_choropleth().unwrap();
        assert_eq!(name, "Thefts 2019");
    }

    #[test]
    fn unknown_menu_entry_is_an_error() {
        let (mut state, mut surface) = viewer();
        state.ensure_catalog(SpatialUnit::Locality, &files());
        let err = state.choropleth_click(&mut surface, SpatialUnit::Locality, "Nope");
        assert!(matches!(err, Err(StateError::UnknownEntry(_))));
    }

    #[test]
    fn property_switch_repaints_and_updates_panels() {
        let (mut state, mut surface) = viewer();
        activate_thefts(&mut state, &mut surface);

        state.select_property(&mut surface, "count").unwrap();

        let (_, _, property) = state.active_choropleth().unwrap();
        assert_eq!(property, "count");
        assert!(surface.paint_property("Thefts 2019", "fill-color").is_some());
        let panels = state.panels().unwrap();
        assert_eq!(panels.properties.as_ref().unwrap().active, 1);
        assert!(panels.info.is_none());

        let err = state.select_property(&mut surface, "label");
        assert!(matches!(err, Err(StateError::UnknownProperty(_))));
    }

    #[test]
    fn hover_fills_the_info_panel() {
        let (mut state, mut surface) = viewer();
        activate_thefts(&mut state, &mut surface);

        let base: JsonObject =
            serde_json::from_str(r#"{"COD_LCL": "02", "NOM_LCL": "CHAPINERO"}"#).unwrap();
        let info = state.hover(&base).unwrap();
        assert_eq!(info.code, "02");
        assert_eq!(info.value_text(), "1.5000");
        assert_eq!(info.unit_name.as_deref(), Some("CHAPINERO"));
        assert!(state.panels().unwrap().info.is_some());
    }

    #[test]
    fn hover_without_an_active_layer_does_nothing() {
        let (mut state, _) = viewer();
        let base: JsonObject = serde_json::from_str(r#"{"COD_LCL": "02"}"#).unwrap();
        assert!(state.hover(&base).is_none());
    }

    #[test]
    fn heatmap_toggle_drives_both_layers() {
        let (mut state, mut surface) = viewer();
        assert_eq!(state.heatmap_label(), "Show: Incident heatmap");

        state.toggle_heatmap(&mut surface);
        assert_eq!(surface.visibility(ID_HEATMAP_LAYER).as_deref(), Some("visible"));
        assert_eq!(surface.visibility(ID_HEATMAP_PTS_LAYER).as_deref(), Some("visible"));
        assert_eq!(state.heatmap_label(), "Hide: Incident heatmap");

        state.toggle_heatmap(&mut surface);
        assert_eq!(surface.visibility(ID_HEATMAP_LAYER).as_deref(), Some("none"));
        assert_eq!(surface.visibility(ID_HEATMAP_PTS_LAYER).as_deref(), Some("none"));
        assert_eq!(state.heatmap_label(), "Show: Incident heatmap");
    }

    fn prediction_dataset() -> Dataset {
        Dataset::from_slice(
            br#"{
                "type": "FeatureCollection",
                "config": {"title": "Predictability"},
                "features": [
                    {"type": "Feature", "properties": {"COD_LCL": "01", "constancy": 0.4, "entropy": 0.9}, "geometry": null},
                    {"type": "Feature", "properties": {"COD_LCL": "02", "constancy": 0.6, "entropy": 0.2}, "geometry": null},
                    {"type": "Feature", "properties": {"COD_LCL": "03", "constancy": 0.8, "entropy": 0.5}, "geometry": null}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn prediction_toggle_shows_overlay_and_panels() {
        let mut state = ViewerState::new(defaults());
        state.set_prediction(prediction_dataset(), "constancy").unwrap();
        let mut surface = RecordingSurface::new();
        state.init_map(&mut surface, &SourcePaths::default());
        assert!(surface.has_layer(ID_PREDICTION_LAYER));
        assert_eq!(surface.visibility(ID_PREDICTION_LAYER).as_deref(), Some("none"));

        state.toggle_prediction(&mut surface);
        assert_eq!(surface.visibility(ID_PREDICTION_LAYER).as_deref(), Some("visible"));
        assert_eq!(state.prediction_label(), "Hide: Predictability map");
        let panels = state.panels().unwrap();
        assert_eq!(panels.title, "Predictability");
        assert!(panels.properties.is_some());

        // hiding targets the prediction layer itself, not some other overlay
        state.toggle_prediction(&mut surface);
        assert_eq!(surface.visibility(ID_PREDICTION_LAYER).as_deref(), Some("none"));
        assert_eq!(surface.visibility(ID_HEATMAP_LAYER).as_deref(), Some("none"));
        assert!(state.panels().is_none());
        assert_eq!(state.prediction_label(), "Show: Predictability map");
    }

    #[test]
    fn prediction_toggle_without_dataset_is_ignored() {
        let (mut state, mut surface) = viewer();
        state.toggle_prediction(&mut surface);
        assert_eq!(state.prediction_label(), "Show: Predictability map");
    }

    #[test]
    fn hover_works_over_the_prediction_overlay() {
        let mut state = ViewerState::new(defaults());
        state.set_prediction(prediction_dataset(), "constancy").unwrap();
        let mut surface = RecordingSurface::new();
        state.init_map(&mut surface, &SourcePaths::default());
        state.toggle_prediction(&mut surface);

        let base: JsonObject =
            serde_json::from_str(r#"{"COD_LCL": "03", "NOM_LCL": "SANTA FE"}"#).unwrap();
        let info = state.hover(&base).unwrap();
        assert_eq!(info.property, "constancy");
        assert_eq!(info.value_text(), "0.8000");
    }
}
