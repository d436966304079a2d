//! Rigid parts and models.
//!
//! A rigid part points at its mesh through one `VMeshRef`, or through a
//! `MultiLevel` folder holding one reference per level of detail and the
//! `Switch2` distance table that selects between them.

use std::collections::BTreeMap;

use cgmath::{InnerSpace, Matrix4, SquareMatrix, Vector3};

use crate::data_structures::compound::{CompoundModel, ModelPart, PartId, SimpleModel};
use crate::data_structures::hardpoint::Hardpoint;
use crate::error::{Error, Result};
use crate::math::range_index;
use crate::resources::mesh::{VMeshRef, VMeshWire};
use crate::utf::{Entry, UtfReader};

const TAG_COMPOUND: &str = "cmpnd";
const TAG_SPHERE: &str = "sphere";
const TAG_MULTILEVEL: &str = "multilevel";
const TAG_LOD_SWITCH: &str = "switch2";
const TAG_LEVEL_PREFIX: &str = "level";
const TAG_MESH_PART: &str = "vmeshpart";
const TAG_MESH_REFERENCE: &str = "vmeshref";
const TAG_WIRE_PART: &str = "vmeshwire";
const TAG_WIRE_REFERENCE: &str = "vwiredata";

/// Level of detail references with their switch distances.
#[derive(Clone, Debug, PartialEq)]
pub struct MultiLevel {
    pub ranges: Vec<f32>,
    pub references: Vec<VMeshRef>,
}

impl Default for MultiLevel {
    fn default() -> Self {
        Self {
            ranges: vec![0.0],
            references: Vec::new(),
        }
    }
}

fn level_number(tag: &str) -> Option<usize> {
    let digits = tag.strip_prefix(TAG_LEVEL_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn read_mesh_reference(part: Option<Entry<'_>>) -> Result<Option<VMeshRef>> {
    let Some(part) = part else { return Ok(None) };
    match part.find_one(TAG_MESH_REFERENCE)? {
        Some(reference) => Ok(Some(VMeshRef::read(reference.data()?)?)),
        None => Ok(None),
    }
}

impl MultiLevel {
    /// Reads `LevelN\VMeshPart\VMeshRef` entries and the `Switch2` ranges.
    pub fn load(folder: Entry<'_>) -> Result<Self> {
        let mut lods = Self::default();
        let mut levels = BTreeMap::new();

        for child in folder.children() {
            let (tag, entry) = child?;
            if tag == TAG_LOD_SWITCH {
                lods.ranges = entry.data()?.read_f32s(0)?;
                continue;
            }
            let Some(level) = level_number(&tag) else { continue };
            if let Some(reference) = read_mesh_reference(entry.find_one(TAG_MESH_PART)?)? {
                levels.insert(level, reference);
            }
        }

        for (expected, (&level, reference)) in levels.iter().enumerate() {
            if level != expected {
                return Err(Error::range(format!("missing reference data for LOD {expected}")));
            }
            lods.references.push(reference.clone());
        }

        Ok(lods)
    }

    pub fn lod_reference(&self, distance: f32) -> Option<&VMeshRef> {
        self.references.get(range_index(distance, &self.ranges, 1.0))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PartMesh {
    Single(VMeshRef),
    Levels(MultiLevel),
}

/// Rigid model part.
#[derive(Clone, Debug, PartialEq)]
pub struct RigidPart {
    pub mesh: PartMesh,
    /// HUD wireframe.
    pub wireframe: Option<VMeshWire>,
}

impl ModelPart for RigidPart {
    fn load(fragment: Entry<'_>) -> Result<Self> {
        let [wire, part, lods] = fragment.find([TAG_WIRE_PART, TAG_MESH_PART, TAG_MULTILEVEL])?;

        let mesh = match lods {
            Some(lods) => PartMesh::Levels(MultiLevel::load(lods)?),
            None => match read_mesh_reference(part)? {
                Some(reference) => PartMesh::Single(reference),
                None => return Err(Error::structure("part is missing mesh reference")),
            },
        };

        let wireframe = match wire {
            Some(wire) => match wire.find_one(TAG_WIRE_REFERENCE)? {
                Some(data) => Some(VMeshWire::read(data.data()?)?),
                None => None,
            },
            None => None,
        };

        Ok(Self { mesh, wireframe })
    }
}

impl RigidPart {
    /// Mesh reference chosen by distance from the part's own switch ranges.
    pub fn lod_reference(&self, distance: f32) -> Option<&VMeshRef> {
        match &self.mesh {
            PartMesh::Single(reference) => Some(reference),
            PartMesh::Levels(lods) => lods.lod_reference(distance),
        }
    }

    pub fn lod(&self, level: usize) -> Option<&VMeshRef> {
        match &self.mesh {
            PartMesh::Single(reference) => (level == 0).then_some(reference),
            PartMesh::Levels(lods) => lods.references.get(level),
        }
    }

    pub fn level_count(&self) -> usize {
        match &self.mesh {
            PartMesh::Single(_) => 1,
            PartMesh::Levels(lods) => lods.references.len(),
        }
    }
}

#[derive(Debug)]
pub enum RigidModel {
    Compound(CompoundModel<RigidPart>),
    Simple(SimpleModel<RigidPart>),
}

impl RigidModel {
    /// Parts with their arena ids; a simple model has its root at id 0.
    pub fn parts(&self) -> Box<dyn Iterator<Item = (PartId, &RigidPart)> + '_> {
        match self {
            Self::Compound(model) => Box::new(model.parts().map(|(id, _, part)| (id, part))),
            Self::Simple(model) => Box::new(std::iter::once((0, model.root()))),
        }
    }

    pub fn part_transform(&self, part: PartId) -> Matrix4<f32> {
        match self {
            Self::Compound(model) => model.part_transform(part),
            Self::Simple(_) => Matrix4::identity(),
        }
    }

    pub fn hardpoint(&self, name: &str) -> Option<&Hardpoint> {
        match self {
            Self::Compound(model) => model.hardpoint(name),
            Self::Simple(model) => model.hardpoint(name),
        }
    }

    /// Model space placement of a hardpoint, through the part that owns it.
    pub fn hardpoint_transform(&self, name: &str) -> Option<Matrix4<f32>> {
        match self {
            Self::Compound(model) => {
                let hardpoint = model.hardpoint(name)?;
                let parent = model.hardpoint_parent(name)?;
                Some(model.part_transform(parent) * hardpoint.transform)
            }
            Self::Simple(model) => model.hardpoint(name).map(|hardpoint| hardpoint.transform),
        }
    }

    /// Every part that has a mesh at `distance`, with the chosen reference.
    pub fn meshes(&self, distance: f32) -> impl Iterator<Item = (PartId, &VMeshRef)> + '_ {
        self.parts().filter_map(move |(id, part)| {
            part.lod_reference(distance).map(|reference| (id, reference))
        })
    }

    /// Radius enclosing every part at rest, used to frame the idle view.
    pub fn radius(&self) -> f32 {
        match self {
            Self::Simple(model) => model.root().lod_reference(0.0).map_or(0.0, |r| r.sphere.radius),
            Self::Compound(model) => self
                .meshes(0.0)
                .map(|(id, reference)| {
                    let center = Vector3::from(reference.sphere.center);
                    let placed = model.part_transform(id) * Matrix4::from_translation(center);
                    placed.w.truncate().magnitude() + center.magnitude() + reference.sphere.radius
                })
                .fold(0.0, f32::max),
        }
    }
}

/// Builds a compound model when the container has `Cmpnd`, otherwise a
/// simple model rooted at the container root.
pub fn load_rigid_model(reader: &UtfReader) -> Result<RigidModel> {
    let root = reader.root()?;
    let [compound, sphere] = root.find([TAG_COMPOUND, TAG_SPHERE])?;

    if let Some(compound) = compound {
        return Ok(RigidModel::Compound(CompoundModel::load(compound, root)?));
    }
    if sphere.is_some() {
        return Err(Error::unsupported("sphere models are not supported"));
    }
    Ok(RigidModel::Simple(SimpleModel::load(root)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_tags() {
        assert_eq!(level_number("level0"), Some(0));
        assert_eq!(level_number("level12"), Some(12));
        assert_eq!(level_number("level"), None);
        assert_eq!(level_number("levelx"), None);
        assert_eq!(level_number("switch2"), None);
    }
}
