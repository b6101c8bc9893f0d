//! Layer ordering engine: z-index and parentage maintenance over a [`Design`] arena.
//!
//! Every mutating operation leaves two invariants holding when it returns:
//!
//! - z-indices form the contiguous range `0..N` with no duplicates;
//! - the parent relation is acyclic and only references layers of the same design.

use std::collections::VecDeque;

use crate::design::model::{
    Animation, Background, Design, Layer, LayerKind, LayerProps, Mask,
};
use crate::foundation::core::{Canvas, LayerId, Rect};
use crate::foundation::error::{StratumError, StratumResult};

/// Partial update of a layer's geometry. `None` leaves a field unchanged.
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransformPatch {
    /// New left edge.
    pub x: Option<f64>,
    /// New top edge.
    pub y: Option<f64>,
    /// New width.
    pub width: Option<f64>,
    /// New height.
    pub height: Option<f64>,
    /// New rotation in degrees.
    pub rotation: Option<f64>,
    /// New horizontal scale.
    pub scale_x: Option<f64>,
    /// New vertical scale.
    pub scale_y: Option<f64>,
    /// New opacity (clamped to `[0, 1]`).
    pub opacity: Option<f64>,
}

#[derive(Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LayerExtras {
    name: Option<String>,
    animations: Vec<Animation>,
    mask: Option<Mask>,
}

impl Design {
    /// Add a layer from an untyped kind tag and JSON property bag.
    ///
    /// The bag carries both common attributes (`x`, `y`, `width`, `height`, `rotation`,
    /// `scaleX`, `scaleY`, `opacity`, `visible`, `locked`, `name`, `animations`, `mask`) and the
    /// kind-specific ones. The new layer is placed on top (`max z + 1`, or 0 when empty).
    pub fn add_layer(
        &mut self,
        kind: &str,
        properties: serde_json::Value,
        parent: Option<LayerId>,
    ) -> StratumResult<LayerId> {
        let properties = match properties {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            v @ serde_json::Value::Object(_) => v,
            _ => {
                return Err(StratumError::validation(
                    "layer properties must be a JSON object",
                ));
            }
        };

        let kind = LayerKind::from_parts(kind, &properties)?;
        let props: LayerProps = serde_json::from_value(properties.clone())
            .map_err(|e| StratumError::validation(format!("invalid layer attributes: {e}")))?;
        let extras: LayerExtras = serde_json::from_value(properties)
            .map_err(|e| StratumError::validation(format!("invalid layer attributes: {e}")))?;
        if let Some(mask) = &extras.mask {
            validate_mask(mask)?;
        }

        let id = self.add_typed_layer(kind, props, parent)?;
        let layer = self.layer_mut(id)?;
        layer.name = extras.name.unwrap_or_default();
        layer.animations = extras.animations;
        layer.mask = extras.mask;
        Ok(id)
    }

    /// Add a layer from typed parts. See [`Design::add_layer`].
    pub fn add_typed_layer(
        &mut self,
        kind: LayerKind,
        props: LayerProps,
        parent: Option<LayerId>,
    ) -> StratumResult<LayerId> {
        if let Some(p) = parent
            && !self.contains(p)
        {
            return Err(StratumError::validation(format!(
                "parent {p} does not exist in design"
            )));
        }
        let props = props.normalized()?;

        let id = LayerId(self.next_layer_id);
        self.next_layer_id += 1;
        let z_index = self.max_z().map_or(0, |z| z + 1);

        tracing::debug!(design = %self.id, layer = %id, kind = kind.tag(), z_index, "layer added");
        self.layers.insert(
            id,
            Layer {
                id,
                name: String::new(),
                kind,
                props,
                z_index,
                parent,
                animations: Vec::new(),
                mask: None,
            },
        );
        Ok(id)
    }

    /// Change a layer's parent (`None` detaches it to the root).
    ///
    /// Fails with [`StratumError::Cycle`] when `new_parent` is `layer` itself or one of its
    /// descendants. The check walks the ancestor chain from `new_parent` up to the root.
    pub fn reparent(&mut self, layer: LayerId, new_parent: Option<LayerId>) -> StratumResult<()> {
        self.layer(layer)?;
        if let Some(p) = new_parent {
            self.layer(p)?;
            if p == layer {
                return Err(StratumError::cycle(format!(
                    "{layer} cannot be its own parent"
                )));
            }
            let mut cursor = Some(p);
            let mut steps = 0usize;
            while let Some(current) = cursor {
                if current == layer {
                    return Err(StratumError::cycle(format!(
                        "{p} is a descendant of {layer}"
                    )));
                }
                steps += 1;
                if steps > self.layers.len() {
                    return Err(StratumError::render(
                        "parent chain does not terminate (corrupt layer tree)",
                    ));
                }
                cursor = self.layer(current)?.parent;
            }
        }

        self.layer_mut(layer)?.parent = new_parent;
        tracing::debug!(design = %self.id, layer = %layer, parent = ?new_parent, "layer reparented");
        Ok(())
    }

    /// Move a layer to z-slot `new_z`, shifting every layer between the old and new slot by one.
    ///
    /// Targets past the top are clamped to the topmost slot.
    pub fn move_to_index(&mut self, layer: LayerId, new_z: u32) -> StratumResult<()> {
        let old = self.layer(layer)?.z_index;
        let top = (self.layers.len() as u32).saturating_sub(1);
        let target = new_z.min(top);
        if target == old {
            return Ok(());
        }

        for l in self.layers.values_mut() {
            if l.id == layer {
                continue;
            }
            if old < target && l.z_index > old && l.z_index <= target {
                l.z_index -= 1;
            } else if target < old && l.z_index >= target && l.z_index < old {
                l.z_index += 1;
            }
        }
        self.layer_mut(layer)?.z_index = target;
        tracing::debug!(design = %self.id, layer = %layer, from = old, to = target, "layer moved");
        Ok(())
    }

    /// Swap with the layer directly above. No-op for the topmost layer.
    pub fn move_up(&mut self, layer: LayerId) -> StratumResult<()> {
        let z = self.layer(layer)?.z_index;
        self.swap_with_z(layer, z.checked_add(1))
    }

    /// Swap with the layer directly below. No-op for the bottommost layer.
    pub fn move_down(&mut self, layer: LayerId) -> StratumResult<()> {
        let z = self.layer(layer)?.z_index;
        self.swap_with_z(layer, z.checked_sub(1))
    }

    /// Move a layer above every other layer.
    pub fn move_to_top(&mut self, layer: LayerId) -> StratumResult<()> {
        let top = self.max_z().map_or(0, |z| z + 1);
        self.move_to_index(layer, top)
    }

    /// Move a layer below every other layer.
    pub fn move_to_bottom(&mut self, layer: LayerId) -> StratumResult<()> {
        self.move_to_index(layer, 0)
    }

    fn swap_with_z(&mut self, layer: LayerId, other_z: Option<u32>) -> StratumResult<()> {
        let Some(other_z) = other_z else {
            return Ok(());
        };
        let Some(other) = self
            .layers
            .values()
            .find(|l| l.z_index == other_z)
            .map(|l| l.id)
        else {
            return Ok(());
        };
        let z = self.layer(layer)?.z_index;
        self.layer_mut(other)?.z_index = z;
        self.layer_mut(layer)?.z_index = other_z;
        Ok(())
    }

    /// Bounding box of a layer unioned with all of its descendants.
    ///
    /// Uses each layer's untransformed `x, y, width, height` box: rotation and scale are not
    /// applied, so the result is an approximation for transformed layers.
    pub fn compute_bounds(&self, layer: LayerId) -> StratumResult<Rect> {
        let mut bounds = self.layer(layer)?.rect();
        for id in self.descendants(layer)? {
            bounds = bounds.union(self.layer(id)?.rect());
        }
        Ok(bounds)
    }

    /// Delete a layer.
    ///
    /// With `cascade` the whole subtree is removed; otherwise direct children are re-parented
    /// to the deleted layer's parent. Remaining z-indices are compacted in order.
    pub fn delete_layer(&mut self, layer: LayerId, cascade: bool) -> StratumResult<Vec<LayerId>> {
        let parent = self.layer(layer)?.parent;
        let mut removed = vec![layer];
        if cascade {
            removed.extend(self.descendants(layer)?);
        } else {
            for l in self.layers.values_mut() {
                if l.parent == Some(layer) {
                    l.parent = parent;
                }
            }
        }

        for id in &removed {
            self.layers.remove(id);
        }
        self.compact_z();
        tracing::debug!(design = %self.id, layer = %layer, cascade, removed = removed.len(), "layer deleted");
        Ok(removed)
    }

    /// Copy a layer (without its children) onto the top of the stack, under the same parent.
    pub fn duplicate_layer(&mut self, layer: LayerId) -> StratumResult<LayerId> {
        let src = self.layer(layer)?.clone();
        let id = self.add_typed_layer(src.kind, src.props, src.parent)?;
        let copy = self.layer_mut(id)?;
        copy.name = if src.name.is_empty() {
            String::new()
        } else {
            format!("{} copy", src.name)
        };
        copy.animations = src.animations;
        copy.mask = src.mask;
        Ok(id)
    }

    /// Apply a geometry patch.
    pub fn set_transform(&mut self, layer: LayerId, patch: &TransformPatch) -> StratumResult<()> {
        let l = self.layer_mut(layer)?;
        let mut props = l.props.clone();
        let fields = [
            (&mut props.x, patch.x),
            (&mut props.y, patch.y),
            (&mut props.width, patch.width),
            (&mut props.height, patch.height),
            (&mut props.rotation, patch.rotation),
            (&mut props.scale_x, patch.scale_x),
            (&mut props.scale_y, patch.scale_y),
            (&mut props.opacity, patch.opacity),
        ];
        for (slot, value) in fields {
            if let Some(v) = value {
                *slot = v;
            }
        }
        l.props = props.normalized()?;
        Ok(())
    }

    /// Show or hide a layer.
    pub fn set_visibility(&mut self, layer: LayerId, visible: bool) -> StratumResult<()> {
        self.layer_mut(layer)?.props.visible = visible;
        Ok(())
    }

    /// Lock or unlock a layer.
    pub fn set_locked(&mut self, layer: LayerId, locked: bool) -> StratumResult<()> {
        self.layer_mut(layer)?.props.locked = locked;
        Ok(())
    }

    /// Merge a JSON object into the layer's kind-specific properties.
    ///
    /// The kind itself never changes; `null` values reset a property to its default.
    pub fn update_properties(
        &mut self,
        layer: LayerId,
        patch: &serde_json::Value,
    ) -> StratumResult<()> {
        let serde_json::Value::Object(patch) = patch else {
            return Err(StratumError::validation(
                "property patch must be a JSON object",
            ));
        };
        let l = self.layer_mut(layer)?;
        let tag = l.kind.tag();
        let mut current = match &l.kind {
            LayerKind::Text(p) => serde_json::to_value(p),
            LayerKind::Image(p) => serde_json::to_value(p),
            LayerKind::Shape(p) => serde_json::to_value(p),
            LayerKind::Group => Ok(serde_json::Value::Object(Default::default())),
        }
        .map_err(|e| StratumError::Other(e.into()))?;

        if let serde_json::Value::Object(map) = &mut current {
            for (k, v) in patch {
                if v.is_null() {
                    map.remove(k);
                } else {
                    map.insert(k.clone(), v.clone());
                }
            }
        }
        l.kind = LayerKind::from_parts(tag, &current)?;
        Ok(())
    }

    /// Replace a layer's animation list.
    pub fn set_animations(
        &mut self,
        layer: LayerId,
        animations: Vec<Animation>,
    ) -> StratumResult<()> {
        self.layer_mut(layer)?.animations = animations;
        Ok(())
    }

    /// Set or clear a layer's clip mask.
    pub fn set_mask(&mut self, layer: LayerId, mask: Option<Mask>) -> StratumResult<()> {
        if let Some(m) = &mask {
            validate_mask(m)?;
        }
        self.layer_mut(layer)?.mask = mask;
        Ok(())
    }

    /// Resize the canvas and optionally replace the background.
    pub fn update_canvas(
        &mut self,
        canvas: Canvas,
        background: Option<Background>,
    ) -> StratumResult<()> {
        canvas.validate()?;
        self.canvas = canvas;
        if let Some(bg) = background {
            self.background = bg;
        }
        Ok(())
    }

    /// Direct children of a layer in ascending z-order.
    pub fn children(&self, layer: LayerId) -> StratumResult<Vec<LayerId>> {
        self.layer(layer)?;
        let mut out: Vec<&Layer> = self
            .layers
            .values()
            .filter(|l| l.parent == Some(layer))
            .collect();
        out.sort_by_key(|l| l.z_index);
        Ok(out.into_iter().map(|l| l.id).collect())
    }

    /// All descendants of a layer, breadth-first.
    pub fn descendants(&self, layer: LayerId) -> StratumResult<Vec<LayerId>> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([layer]);
        while let Some(current) = queue.pop_front() {
            for child in self.children(current)? {
                if out.len() > self.layers.len() {
                    return Err(StratumError::render("layer tree contains a cycle"));
                }
                out.push(child);
                queue.push_back(child);
            }
        }
        Ok(out)
    }

    /// Ancestors of a layer, nearest first.
    pub fn ancestors(&self, layer: LayerId) -> StratumResult<Vec<LayerId>> {
        let mut out = Vec::new();
        let mut cursor = self.layer(layer)?.parent;
        while let Some(current) = cursor {
            if out.len() > self.layers.len() {
                return Err(StratumError::render("layer tree contains a cycle"));
            }
            out.push(current);
            cursor = self.layer(current)?.parent;
        }
        Ok(out)
    }

    /// Verify the z-index and parentage invariants.
    pub fn check_integrity(&self) -> StratumResult<()> {
        let mut zs: Vec<u32> = self.layers.values().map(|l| l.z_index).collect();
        zs.sort_unstable();
        for (expected, z) in zs.iter().enumerate() {
            if *z as usize != expected {
                return Err(StratumError::render(format!(
                    "z-indices are not a contiguous 0..{} range",
                    self.layers.len()
                )));
            }
        }

        for l in self.layers.values() {
            if let Some(p) = l.parent
                && !self.layers.contains_key(&p)
            {
                return Err(StratumError::render(format!(
                    "{} references missing parent {p}",
                    l.id
                )));
            }
            self.ancestors(l.id)?;
        }
        Ok(())
    }

    fn compact_z(&mut self) {
        let mut order: Vec<(u32, LayerId)> =
            self.layers.values().map(|l| (l.z_index, l.id)).collect();
        order.sort_unstable();
        for (z, (_, id)) in order.into_iter().enumerate() {
            if let Some(l) = self.layers.get_mut(&id) {
                l.z_index = z as u32;
            }
        }
    }
}

fn validate_mask(mask: &Mask) -> StratumResult<()> {
    let ok = [mask.x, mask.y, mask.width, mask.height]
        .iter()
        .all(|v| v.is_finite());
    if !ok || mask.width <= 0.0 || mask.height <= 0.0 {
        return Err(StratumError::validation(
            "mask must have finite coordinates and positive width/height",
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/design/tree.rs"]
mod tests;
