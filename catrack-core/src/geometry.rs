//! Static detector geometry: planar layers of equally spaced wires or strips.
//!
//! Loaded once per geometry version and shared read-only between events.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Channel identifier: layer id plus wire index within the layer.
///
/// The derived ordering `(layer, wire)` is the construction order that keeps
/// every relation graph acyclic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WireId {
    /// Layer id.
    pub layer: u16,
    /// Wire index within the layer.
    pub wire: u16,
}

impl WireId {
    /// Creates a new wire id.
    #[inline]
    #[must_use]
    pub fn new(layer: u16, wire: u16) -> Self {
        Self { layer, wire }
    }
}

/// Sub-system a layer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subdetector {
    /// Drift chamber: local finding with facets and segments.
    Drift,
    /// Strip/pixel tracker: target of the CKF extension.
    Strip,
}

/// Wire orientation of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    /// Wires parallel to the field.
    Axial,
    /// Wires inclined with respect to the field.
    Stereo,
}

/// One detector plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerGeometry {
    /// Layer id, increasing with `x`.
    pub id: u16,
    /// Super-layer id.
    pub super_layer: u16,
    /// Sub-system.
    pub subdetector: Subdetector,
    /// Axial or stereo.
    pub kind: LayerKind,
    /// Plane position along the layer normal.
    pub x: f64,
    /// Position of wire 0.
    pub first_y: f64,
    /// Wire spacing.
    pub pitch: f64,
    /// Number of wires.
    pub count: u16,
}

impl LayerGeometry {
    /// Measured coordinate of a wire.
    #[inline]
    #[must_use]
    pub fn wire_y(&self, wire: u16) -> f64 {
        self.first_y + self.pitch * f64::from(wire)
    }

    /// Position `[x, y]` of a wire.
    #[inline]
    #[must_use]
    pub fn wire_position(&self, wire: u16) -> [f64; 2] {
        [self.x, self.wire_y(wire)]
    }

    /// Returns true if the wire index exists in this layer.
    #[inline]
    #[must_use]
    pub fn contains(&self, wire: u16) -> bool {
        wire < self.count
    }

    fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(Error::InvalidGeometry(format!(
                "layer {} has no wires",
                self.id
            )));
        }
        if !(self.pitch.is_finite() && self.pitch > 0.0) {
            return Err(Error::InvalidGeometry(format!(
                "layer {} has pitch {}",
                self.id, self.pitch
            )));
        }
        if !(self.x.is_finite() && self.first_y.is_finite()) {
            return Err(Error::InvalidGeometry(format!(
                "layer {} has non-finite position",
                self.id
            )));
        }
        Ok(())
    }
}

/// Serialized form of the geometry table.
#[derive(Debug, Deserialize, Serialize)]
struct GeometryTable {
    layers: Vec<LayerGeometry>,
}

/// Immutable geometry lookup table.
#[derive(Debug, Clone, Serialize)]
pub struct WireGeometry {
    layers: Vec<LayerGeometry>,
    #[serde(skip)]
    index: HashMap<u16, usize>,
}

impl WireGeometry {
    /// Builds and validates a geometry from its layers.
    ///
    /// Layers are sorted by `x`. Ids must be unique and increase with `x`,
    /// and all layers of a super-layer must share sub-system and kind.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] for malformed tables.
    pub fn new(mut layers: Vec<LayerGeometry>) -> Result<Self> {
        if layers.is_empty() {
            return Err(Error::InvalidGeometry("no layers".to_string()));
        }
        for layer in &layers {
            layer.validate()?;
        }
        layers.sort_by(|a, b| a.x.total_cmp(&b.x));

        for pair in layers.windows(2) {
            if pair[0].x == pair[1].x {
                return Err(Error::InvalidGeometry(format!(
                    "layers {} and {} share plane x = {}",
                    pair[0].id, pair[1].id, pair[0].x
                )));
            }
            if pair[0].id >= pair[1].id {
                return Err(Error::InvalidGeometry(format!(
                    "layer ids must increase with x ({} before {})",
                    pair[0].id, pair[1].id
                )));
            }
        }

        let mut super_layers: HashMap<u16, (Subdetector, LayerKind)> = HashMap::new();
        for layer in &layers {
            let entry = super_layers
                .entry(layer.super_layer)
                .or_insert((layer.subdetector, layer.kind));
            if *entry != (layer.subdetector, layer.kind) {
                return Err(Error::InvalidGeometry(format!(
                    "super-layer {} mixes sub-systems or wire kinds",
                    layer.super_layer
                )));
            }
        }

        let index = layers
            .iter()
            .enumerate()
            .map(|(i, layer)| (layer.id, i))
            .collect();
        Ok(Self { layers, index })
    }

    /// Parses a geometry table from JSON.
    ///
    /// # Errors
    /// Returns an error for malformed JSON or an invalid table.
    pub fn from_json(json: &str) -> Result<Self> {
        let table: GeometryTable = serde_json::from_str(json)?;
        Self::new(table.layers)
    }

    /// Parses a geometry table from JSON bytes.
    ///
    /// # Errors
    /// Returns an error for malformed JSON or an invalid table.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let table: GeometryTable = serde_json::from_slice(bytes)?;
        Self::new(table.layers)
    }

    /// Loads a geometry table from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is invalid.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref()).map_err(|e| {
            Error::InvalidGeometry(format!("{}: {e}", path.as_ref().display()))
        })?;
        Self::from_slice(&bytes)
    }

    /// Generates a planar geometry from one or more layouts placed one after
    /// another. Layer and super-layer ids are assigned sequentially.
    ///
    /// # Errors
    /// Returns an error if the generated layers are invalid (e.g. overlapping layouts).
    pub fn planar(layouts: &[PlanarLayout]) -> Result<Self> {
        let mut layers = Vec::new();
        let mut layer_id = 0u16;
        let mut super_layer = 0u16;
        for layout in layouts {
            let mut x = layout.x0;
            for (sl, kind) in layout.super_layers.iter().enumerate() {
                if sl > 0 {
                    x += layout.super_layer_gap;
                }
                for l in 0..layout.layers_per_super_layer {
                    let shift = if layout.stagger && l % 2 == 1 {
                        0.5 * layout.pitch
                    } else {
                        0.0
                    };
                    layers.push(LayerGeometry {
                        id: layer_id,
                        super_layer,
                        subdetector: layout.subdetector,
                        kind: *kind,
                        x,
                        first_y: layout.first_y + shift,
                        pitch: layout.pitch,
                        count: layout.wires_per_layer,
                    });
                    layer_id += 1;
                    x += layout.layer_spacing;
                }
                x -= layout.layer_spacing;
                super_layer += 1;
            }
        }
        Self::new(layers)
    }

    /// All layers sorted by `x`.
    #[must_use]
    pub fn layers(&self) -> &[LayerGeometry] {
        &self.layers
    }

    /// Looks up a layer by id.
    #[must_use]
    pub fn layer(&self, id: u16) -> Option<&LayerGeometry> {
        self.index.get(&id).map(|&i| &self.layers[i])
    }

    /// Position of a layer in the `x`-sorted order.
    #[must_use]
    pub fn layer_index(&self, id: u16) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// Wire position, `None` for unknown channels.
    #[must_use]
    pub fn wire_position(&self, id: WireId) -> Option<[f64; 2]> {
        self.layer(id.layer)
            .filter(|layer| layer.contains(id.wire))
            .map(|layer| layer.wire_position(id.wire))
    }

    /// Layers of one sub-system, sorted by `x`.
    pub fn layers_of(&self, subdetector: Subdetector) -> impl Iterator<Item = &LayerGeometry> {
        self.layers
            .iter()
            .filter(move |layer| layer.subdetector == subdetector)
    }

    /// Wire kind shared by the layers of a super-layer.
    #[must_use]
    pub fn super_layer_kind(&self, super_layer: u16) -> Option<LayerKind> {
        self.layers
            .iter()
            .find(|layer| layer.super_layer == super_layer)
            .map(|layer| layer.kind)
    }

    /// Total number of channels.
    #[must_use]
    pub fn n_wires(&self) -> usize {
        self.layers.iter().map(|layer| usize::from(layer.count)).sum()
    }
}

/// Parameters for generating regular planar geometries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanarLayout {
    /// Sub-system of all generated layers.
    pub subdetector: Subdetector,
    /// One entry per super-layer.
    pub super_layers: Vec<LayerKind>,
    /// Layers in each super-layer.
    pub layers_per_super_layer: u16,
    /// Plane position of the first layer.
    pub x0: f64,
    /// Distance between consecutive layers of a super-layer.
    pub layer_spacing: f64,
    /// Distance between the last layer of one super-layer and the first of the next.
    pub super_layer_gap: f64,
    /// Wires per layer.
    pub wires_per_layer: u16,
    /// Wire spacing.
    pub pitch: f64,
    /// Position of wire 0.
    pub first_y: f64,
    /// Shift odd layers by half a pitch.
    pub stagger: bool,
}

impl Default for PlanarLayout {
    fn default() -> Self {
        Self {
            subdetector: Subdetector::Drift,
            super_layers: vec![
                LayerKind::Axial,
                LayerKind::Stereo,
                LayerKind::Axial,
                LayerKind::Stereo,
            ],
            layers_per_super_layer: 6,
            x0: 20.0,
            layer_spacing: 1.0,
            super_layer_gap: 3.0,
            wires_per_layer: 64,
            pitch: 1.0,
            first_y: -32.0,
            stagger: false,
        }
    }
}

impl PlanarLayout {
    /// Strip tracker layout: one layer per super-layer.
    #[must_use]
    pub fn strip(n_layers: usize, x0: f64, spacing: f64) -> Self {
        Self {
            subdetector: Subdetector::Strip,
            super_layers: vec![LayerKind::Axial; n_layers],
            layers_per_super_layer: 1,
            x0,
            layer_spacing: spacing,
            super_layer_gap: spacing,
            wires_per_layer: 640,
            pitch: 0.1,
            first_y: -32.0,
            stagger: false,
        }
    }

    /// Sets the super-layer kinds.
    #[must_use]
    pub fn with_super_layers(mut self, kinds: Vec<LayerKind>) -> Self {
        self.super_layers = kinds;
        self
    }

    /// Sets the number of layers per super-layer.
    #[must_use]
    pub fn with_layers_per_super_layer(mut self, layers: u16) -> Self {
        self.layers_per_super_layer = layers;
        self
    }

    /// Sets the first plane position.
    #[must_use]
    pub fn with_x0(mut self, x0: f64) -> Self {
        self.x0 = x0;
        self
    }

    /// Sets the wire layout.
    #[must_use]
    pub fn with_wires(mut self, count: u16, pitch: f64, first_y: f64) -> Self {
        self.wires_per_layer = count;
        self.pitch = pitch;
        self.first_y = first_y;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_layer(id: u16, x: f64) -> LayerGeometry {
        LayerGeometry {
            id,
            super_layer: 0,
            subdetector: Subdetector::Drift,
            kind: LayerKind::Axial,
            x,
            first_y: 0.0,
            pitch: 1.0,
            count: 8,
        }
    }

    #[test]
    fn test_planar_default() {
        let geometry = WireGeometry::planar(&[PlanarLayout::default()]).unwrap();
        assert_eq!(geometry.layers().len(), 24);
        assert_eq!(geometry.n_wires(), 24 * 64);

        let first = &geometry.layers()[0];
        let seventh = &geometry.layers()[6];
        assert_eq!(seventh.super_layer, 1);
        assert_eq!(seventh.kind, LayerKind::Stereo);
        // gap of 3.0 between super-layers
        assert!((seventh.x - first.x - 8.0).abs() < 1e-12);
        assert_eq!(geometry.super_layer_kind(2), Some(LayerKind::Axial));
    }

    #[test]
    fn test_wire_lookup() {
        let geometry = WireGeometry::new(vec![single_layer(3, 1.0), single_layer(5, 2.0)]).unwrap();
        assert_eq!(geometry.wire_position(WireId::new(5, 2)), Some([2.0, 2.0]));
        assert_eq!(geometry.wire_position(WireId::new(5, 8)), None);
        assert_eq!(geometry.wire_position(WireId::new(4, 0)), None);
        assert_eq!(geometry.layer_index(5), Some(1));
    }

    #[test]
    fn test_rejects_malformed_tables() {
        assert!(WireGeometry::new(Vec::new()).is_err());
        assert!(WireGeometry::new(vec![single_layer(1, 1.0), single_layer(1, 2.0)]).is_err());
        assert!(WireGeometry::new(vec![single_layer(2, 1.0), single_layer(1, 2.0)]).is_err());

        let mut zero_pitch = single_layer(0, 0.0);
        zero_pitch.pitch = 0.0;
        assert!(matches!(
            WireGeometry::new(vec![zero_pitch]),
            Err(Error::InvalidGeometry(_))
        ));

        let mut stereo = single_layer(2, 3.0);
        stereo.kind = LayerKind::Stereo;
        assert!(WireGeometry::new(vec![single_layer(1, 1.0), stereo]).is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let geometry = WireGeometry::planar(&[PlanarLayout::strip(2, 1.0, 2.0)]).unwrap();
        let json = serde_json::to_string(&geometry).unwrap();
        let parsed = WireGeometry::from_json(&json).unwrap();
        assert_eq!(parsed.layers(), geometry.layers());
    }
}
