//! Hardpoints: named attachment transforms on model parts.
//!
//! A part fragment may carry `Hardpoints\Fixed`, `Hardpoints\Revolute` and
//! `Hardpoints\Prismatic`, each holding one folder per hardpoint.

use cgmath::{Matrix4, Vector3};

use crate::error::{Error, Result};
use crate::math::mat4_from_position_rotation;
use crate::utf::Entry;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HardpointKind {
    Fixed,
    Revolute,
    Prismatic,
}

/// Motion envelope of revolute and prismatic hardpoints.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HardpointMotion {
    pub axis: Vector3<f32>,
    pub min: f32,
    pub max: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hardpoint {
    pub kind: HardpointKind,
    pub transform: Matrix4<f32>,
    pub motion: Option<HardpointMotion>,
}

fn required<'r>(entry: Option<Entry<'r>>, field: &str, name: &str) -> Result<Entry<'r>> {
    entry.ok_or_else(|| Error::structure(format!("hardpoint {name} is missing {field} entry")))
}

impl Hardpoint {
    fn read(folder: Entry<'_>, kind: HardpointKind, name: &str) -> Result<Self> {
        let [position, orientation, axis, min, max] =
            folder.find(["position", "orientation", "axis", "min", "max"])?;

        let position = required(position, "position", name)?.data()?.read_vec3()?;
        let orientation = required(orientation, "orientation", name)?.data()?.read_matrix3x3()?;
        let transform = mat4_from_position_rotation(position, orientation);

        let motion = match kind {
            HardpointKind::Fixed => None,
            HardpointKind::Revolute | HardpointKind::Prismatic => Some(HardpointMotion {
                axis: required(axis, "axis", name)?.data()?.read_vec3()?.into(),
                min: required(min, "min", name)?.data()?.read_f32()?,
                max: required(max, "max", name)?.data()?.read_f32()?,
            }),
        };

        Ok(Self {
            kind,
            transform,
            motion,
        })
    }
}

/// Reads the hardpoints of a part fragment as `(name, hardpoint)` pairs.
pub fn load_hardpoints(fragment: Entry<'_>) -> Result<Vec<(String, Hardpoint)>> {
    let mut hardpoints = Vec::new();
    let Some(folder) = fragment.find_one("hardpoints")? else {
        return Ok(hardpoints);
    };

    let [fixed, revolute, prismatic] = folder.find(["fixed", "revolute", "prismatic"])?;
    let groups = [
        (fixed, HardpointKind::Fixed),
        (revolute, HardpointKind::Revolute),
        (prismatic, HardpointKind::Prismatic),
    ];

    for (group, kind) in groups {
        let Some(group) = group else { continue };
        for child in group.children() {
            let (_, entry) = child?;
            let name = entry.name();
            if !entry.has_child() {
                log::debug!("skipping empty hardpoint {name}");
                continue;
            }
            hardpoints.push((name.clone(), Hardpoint::read(entry, kind, &name)?));
        }
    }

    Ok(hardpoints)
}
