//! Compound models.
//!
//! Rigid `.cmp` models are a tree of parts with a `Root` part at the base.
//! Parts are stored in a dense arena; parent links, constraints and hardpoint
//! owners are indices into it, so no part ever owns another.
//!
//! Simple models (`.3db` without `Cmpnd`) have a single root part.

use std::collections::{BTreeMap, HashMap};

use cgmath::{Matrix4, SquareMatrix};

use crate::data_structures::constraint::{load_constraints, Constraint};
use crate::data_structures::hardpoint::{load_hardpoints, Hardpoint};
use crate::error::{Error, Result};
use crate::utf::Entry;

const TAG_ROOT: &str = "root";
/// Object name of the base part, compared exactly.
const ROOT_PART_NAME: &str = "Root";
const TAG_PART_PREFIX: &str = "part_";
const TAG_OBJECT_NAME: &str = "object name";
const TAG_INDEX: &str = "index";
const TAG_FILE_NAME: &str = "file name";

/// Position of a part in its model's arena.
pub type PartId = usize;

/// A model segment that can be built from an embedded fragment entry.
pub trait ModelPart: Sized {
    fn load(fragment: Entry<'_>) -> Result<Self>;
}

/// Hardpoints of one model keyed by name, with insertion order kept.
#[derive(Debug, Default)]
struct HardpointTable {
    entries: Vec<(String, Hardpoint, PartId)>,
    by_name: HashMap<String, usize>,
}

impl HardpointTable {
    fn attach(&mut self, name: String, hardpoint: Hardpoint, owner: PartId) -> Result<()> {
        if name.is_empty() {
            return Err(Error::structure("hardpoint name is empty"));
        }
        if self.by_name.contains_key(&name) {
            return Err(Error::structure(format!("hardpoint {name} already exists")));
        }
        self.by_name.insert(name.clone(), self.entries.len());
        self.entries.push((name, hardpoint, owner));
        Ok(())
    }

    fn get(&self, name: &str) -> Option<&(String, Hardpoint, PartId)> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }
}

/// A model with a single root part.
#[derive(Debug)]
pub struct SimpleModel<P> {
    root: P,
    hardpoints: HardpointTable,
}

impl<P: ModelPart> SimpleModel<P> {
    /// Builds the root part from `fragment` and attaches its hardpoints.
    pub fn load(fragment: Entry<'_>) -> Result<Self> {
        let root = P::load(fragment)?;
        let mut hardpoints = HardpointTable::default();
        for (name, hardpoint) in load_hardpoints(fragment)? {
            hardpoints.attach(name, hardpoint, 0)?;
        }
        Ok(Self { root, hardpoints })
    }
}

impl<P> SimpleModel<P> {
    pub fn root(&self) -> &P {
        &self.root
    }

    pub fn hardpoint(&self, name: &str) -> Option<&Hardpoint> {
        self.hardpoints.get(name).map(|(_, hp, _)| hp)
    }

    pub fn hardpoints(&self) -> impl Iterator<Item = (&str, &Hardpoint)> {
        self.hardpoints.entries.iter().map(|(name, hp, _)| (name.as_str(), hp))
    }
}

/// A tree of parts joined by constraints.
#[derive(Debug)]
pub struct CompoundModel<P> {
    names: Vec<String>,
    parts: Vec<P>,
    by_name: HashMap<String, PartId>,
    indices: BTreeMap<i32, PartId>,
    root: PartId,
    parents: Vec<Option<PartId>>,
    constraints: Vec<Option<Constraint>>,
    hardpoints: HardpointTable,
    fixed_transforms: Vec<Option<Matrix4<f32>>>,
}

struct PartRecord<'r> {
    name: String,
    index: i32,
    fragment: Entry<'r>,
}

fn read_part_record<'r>(
    tag: &str,
    entry: Entry<'r>,
    fragments: Entry<'r>,
) -> Result<PartRecord<'r>> {
    let [name, index, filename] = entry.find([TAG_OBJECT_NAME, TAG_INDEX, TAG_FILE_NAME])?;

    let name = name
        .ok_or_else(|| Error::structure(format!("compound part ({tag}) is missing object name")))?
        .data()?
        .read_string(0)?;
    let filename = filename
        .ok_or_else(|| {
            Error::structure(format!("compound part ({tag}) is missing fragment file name"))
        })?
        .data()?
        .read_string(0)?;
    let index = match index {
        Some(index) => index.data()?.read_i32()?,
        None => 0,
    };

    let fragment = fragments.find_one(&filename)?.ok_or_else(|| {
        Error::structure(format!("referenced fragment ({filename}) for part ({name}) is missing"))
    })?;
    if !fragment.has_child() {
        return Err(Error::structure(format!("fragment ({filename}) for part ({name}) is empty")));
    }

    Ok(PartRecord { name, index, fragment })
}

impl<P: ModelPart> CompoundModel<P> {
    /// Loads the part hierarchy of `compound` (a `Cmpnd` folder), resolving
    /// part fragments inside `fragments` (the container root by convention).
    ///
    /// Nothing is returned unless every part, hardpoint and constraint loaded.
    pub fn load(compound: Entry<'_>, fragments: Entry<'_>) -> Result<Self> {
        if !compound.has_child() {
            return Err(Error::structure("compound entry is empty"));
        }

        let mut names = Vec::new();
        let mut parts = Vec::new();
        let mut by_name = HashMap::new();
        let mut indices = BTreeMap::new();
        let mut hardpoints = HardpointTable::default();
        let mut root = None;

        for child in compound.children() {
            let (tag, entry) = child?;
            if !(tag == TAG_ROOT || tag.starts_with(TAG_PART_PREFIX)) || !entry.has_child() {
                continue;
            }

            let record = read_part_record(&tag, entry, fragments)?;
            if record.name.is_empty() {
                return Err(Error::structure(format!("compound part ({tag}) has an empty name")));
            }
            if by_name.contains_key(&record.name) {
                let message = format!("compound part {} already exists", record.name);
                return Err(Error::structure(message));
            }

            let part = P::load(record.fragment)?;
            let id = parts.len();
            if record.name == ROOT_PART_NAME {
                root = Some(id);
            }
            for (name, hardpoint) in load_hardpoints(record.fragment)? {
                hardpoints.attach(name, hardpoint, id)?;
            }

            log::trace!("compound part {} ({}) loaded", record.name, record.index);
            by_name.insert(record.name.clone(), id);
            indices.insert(record.index, id);
            names.push(record.name);
            parts.push(part);
        }

        let root = root.ok_or_else(|| Error::structure("compound model is missing Root part"))?;

        let mut parents = vec![None; parts.len()];
        let mut constraints = vec![None; parts.len()];
        for (child, parent, constraint) in load_constraints(compound)? {
            let lookup = |name: &str| {
                by_name
                    .get(name)
                    .copied()
                    .ok_or_else(|| {
                        Error::structure(format!("constraint references unknown part {name}"))
                    })
            };
            let child = lookup(&child)?;
            parents[child] = Some(lookup(&parent)?);
            constraints[child] = Some(constraint);
        }

        let mut model = Self {
            names,
            parts,
            by_name,
            indices,
            root,
            parents,
            constraints,
            hardpoints,
            fixed_transforms: Vec::new(),
        };
        model.fixed_transforms = (0..model.parts.len())
            .map(|id| {
                let (transform, fixed) = model.stack_transforms(id);
                fixed.then_some(transform)
            })
            .collect();

        Ok(model)
    }
}

impl<P> CompoundModel<P> {
    pub fn root(&self) -> PartId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn part(&self, name: &str) -> Option<&P> {
        self.part_index(name).map(|id| &self.parts[id])
    }

    pub fn part_index(&self, name: &str) -> Option<PartId> {
        self.by_name.get(name).copied()
    }

    pub fn part_at(&self, id: PartId) -> Option<&P> {
        self.parts.get(id)
    }

    pub fn part_name(&self, id: PartId) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    /// Part registered under the `Index` value of its `Cmpnd` entry.
    pub fn indexed(&self, index: i32) -> Option<PartId> {
        self.indices.get(&index).copied()
    }

    /// Parts in registration order.
    pub fn parts(&self) -> impl Iterator<Item = (PartId, &str, &P)> {
        self.names
            .iter()
            .zip(&self.parts)
            .enumerate()
            .map(|(id, (name, part))| (id, name.as_str(), part))
    }

    pub fn parent(&self, part: PartId) -> Option<PartId> {
        self.parents.get(part).copied().flatten()
    }

    /// Part a hardpoint is mounted on.
    pub fn hardpoint_parent(&self, name: &str) -> Option<PartId> {
        self.hardpoints.get(name).map(|&(_, _, owner)| owner)
    }

    pub fn hardpoint(&self, name: &str) -> Option<&Hardpoint> {
        self.hardpoints.get(name).map(|(_, hp, _)| hp)
    }

    pub fn constraint(&self, part: PartId) -> Option<&Constraint> {
        self.constraints.get(part).and_then(Option::as_ref)
    }

    pub fn children(&self, parent: PartId) -> impl Iterator<Item = (PartId, &str)> + '_ {
        self.names
            .iter()
            .enumerate()
            .filter(move |&(id, _)| self.parent(id) == Some(parent))
            .map(|(id, name)| (id, name.as_str()))
    }

    pub fn hardpoints_of(&self, parent: PartId) -> impl Iterator<Item = (&str, &Hardpoint)> + '_ {
        self.hardpoints
            .entries
            .iter()
            .filter(move |&&(_, _, owner)| owner == parent)
            .map(|(name, hp, _)| (name.as_str(), hp))
    }

    pub fn hardpoints(&self) -> impl Iterator<Item = (&str, &Hardpoint)> {
        self.hardpoints.entries.iter().map(|(name, hp, _)| (name.as_str(), hp))
    }

    /// Walks from `part` up to the root, applying each constraint before
    /// the running result. Also reports whether every link was fixed.
    pub fn stack_transforms(&self, part: PartId) -> (Matrix4<f32>, bool) {
        let mut out = Matrix4::identity();
        let mut fixed = true;
        let mut current = part;
        let mut steps = 0;

        while current != self.root && steps < self.parts.len() {
            let Some(constraint) = self.constraint(current) else { break };
            fixed &= constraint.is_fixed();
            out = constraint.transform() * out;
            if let Some(offset) = constraint.offset() {
                out = out * Matrix4::from_translation(offset);
            }
            let Some(parent) = self.parent(current) else { break };
            current = parent;
            steps += 1;
        }

        (out, fixed)
    }

    /// Model-space transform of a part, precomputed for fixed chains.
    pub fn part_transform(&self, part: PartId) -> Matrix4<f32> {
        match self.fixed_transforms.get(part).copied().flatten() {
            Some(transform) => transform,
            None => self.stack_transforms(part).0,
        }
    }
}
