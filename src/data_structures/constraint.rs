//! Constraints linking a child part to its parent.
//!
//! `Cmpnd\Cons` holds one entry per constraint kind; each packs fixed-size
//! records back to back. Every record starts with the 64-byte parent and
//! child part names followed by the kind's own parameters.

use cgmath::{Matrix4, Vector3};

use crate::error::Result;
use crate::math::mat4_from_position_rotation;
use crate::utf::{Cursor, Entry};

const TAG_CONS: &str = "cons";
const NAME_LENGTH: usize = 0x40;

const LENGTH_FIXED: usize = 0xB0;
const LENGTH_REVOLUTE: usize = 0xD0;
const LENGTH_PRISMATIC: usize = 0xD0;
const LENGTH_CYLINDRIC: usize = 0xCC;
const LENGTH_SPHERICAL: usize = 0xD4;
const LENGTH_LOOSE: usize = 0xB0;

/// Single axis motion shared by revolute and prismatic constraints.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisLimits {
    pub transform: Matrix4<f32>,
    pub offset: Vector3<f32>,
    pub axis: Vector3<f32>,
    pub min: f32,
    pub max: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Constraint {
    /// No motion; resting transforms of fixed chains are cached.
    Fixed { transform: Matrix4<f32> },
    /// Moved freely by animations.
    Loose { transform: Matrix4<f32> },
    /// Swings about the axis between two angles.
    Revolute(AxisLimits),
    /// Slides along the axis between two offsets.
    Prismatic(AxisLimits),
    /// Rotation and translation about one axis, `[rotation, translation]` limits.
    Cylindric {
        transform: Matrix4<f32>,
        axis: Vector3<f32>,
        min: [f32; 2],
        max: [f32; 2],
    },
    /// Per-axis rotation limits.
    Spherical {
        transform: Matrix4<f32>,
        offset: Vector3<f32>,
        min: [f32; 3],
        max: [f32; 3],
    },
}

impl Constraint {
    pub fn transform(&self) -> Matrix4<f32> {
        match *self {
            Self::Fixed { transform } | Self::Loose { transform } => transform,
            Self::Revolute(limits) | Self::Prismatic(limits) => limits.transform,
            Self::Cylindric { transform, .. } | Self::Spherical { transform, .. } => transform,
        }
    }

    /// Translation applied after the transform, for kinds that carry one.
    pub fn offset(&self) -> Option<Vector3<f32>> {
        match *self {
            Self::Revolute(limits) | Self::Prismatic(limits) => Some(limits.offset),
            Self::Spherical { offset, .. } => Some(offset),
            _ => None,
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, Self::Fixed { .. })
    }

    fn read_fixed(data: &mut Cursor) -> Result<Matrix4<f32>> {
        let position = data.read_vec3()?;
        let rotation = data.read_matrix3x3()?;
        Ok(mat4_from_position_rotation(position, rotation))
    }

    fn read_axis(data: &mut Cursor) -> Result<AxisLimits> {
        let position = data.read_vec3()?;
        let offset = data.read_vec3()?;
        let rotation = data.read_matrix3x3()?;
        let axis = data.read_vec3()?;
        let [min, max] = data.read_vec2()?;
        Ok(AxisLimits {
            transform: mat4_from_position_rotation(position, rotation),
            offset: offset.into(),
            axis: axis.into(),
            min,
            max,
        })
    }

    fn read_cylindric(data: &mut Cursor) -> Result<Self> {
        let position = data.read_vec3()?;
        let rotation = data.read_matrix3x3()?;
        let axis = data.read_vec3()?;
        let limits = data.read_vec4()?;
        Ok(Self::Cylindric {
            transform: mat4_from_position_rotation(position, rotation),
            axis: axis.into(),
            min: [limits[0], limits[2]],
            max: [limits[1], limits[3]],
        })
    }

    fn read_spherical(data: &mut Cursor) -> Result<Self> {
        let position = data.read_vec3()?;
        let offset = data.read_vec3()?;
        let rotation = data.read_matrix3x3()?;
        let limits = data.read_f32s(6)?;
        Ok(Self::Spherical {
            transform: mat4_from_position_rotation(position, rotation),
            offset: offset.into(),
            min: [limits[0], limits[2], limits[4]],
            max: [limits[1], limits[3], limits[5]],
        })
    }
}

fn read_fixed_record(data: &mut Cursor) -> Result<Constraint> {
    Ok(Constraint::Fixed { transform: Constraint::read_fixed(data)? })
}

fn read_loose_record(data: &mut Cursor) -> Result<Constraint> {
    Ok(Constraint::Loose { transform: Constraint::read_fixed(data)? })
}

fn read_revolute_record(data: &mut Cursor) -> Result<Constraint> {
    Ok(Constraint::Revolute(Constraint::read_axis(data)?))
}

fn read_prismatic_record(data: &mut Cursor) -> Result<Constraint> {
    Ok(Constraint::Prismatic(Constraint::read_axis(data)?))
}

/// A constraint record: `(child, parent, constraint)`.
pub type ConstraintLink = (String, String, Constraint);

fn read_records(
    mut data: Cursor,
    length: usize,
    read: fn(&mut Cursor) -> Result<Constraint>,
    links: &mut Vec<ConstraintLink>,
) -> Result<()> {
    while data.remaining() >= length {
        let mut record = data.sub_cursor(length)?;
        let parent = record.read_string(NAME_LENGTH)?;
        let child = record.read_string(NAME_LENGTH)?;
        links.push((child, parent, read(&mut record)?));
    }
    Ok(())
}

/// Reads every constraint under `Cmpnd\Cons`, grouped by kind.
///
/// A compound without a `Cons` folder (a lone root part) has none.
pub fn load_constraints(compound: Entry<'_>) -> Result<Vec<ConstraintLink>> {
    let mut links = Vec::new();
    let Some(cons) = compound.find_one(TAG_CONS)? else {
        return Ok(links);
    };

    let [fixed, revolute, prismatic, cylindric, spherical, loose] =
        cons.find(["fix", "rev", "pris", "cyl", "sphere", "loose"])?;

    if let Some(entry) = fixed {
        read_records(entry.data()?, LENGTH_FIXED, read_fixed_record, &mut links)?;
    }
    if let Some(entry) = revolute {
        read_records(entry.data()?, LENGTH_REVOLUTE, read_revolute_record, &mut links)?;
    }
    if let Some(entry) = prismatic {
        read_records(entry.data()?, LENGTH_PRISMATIC, read_prismatic_record, &mut links)?;
    }
    if let Some(entry) = cylindric {
        read_records(entry.data()?, LENGTH_CYLINDRIC, Constraint::read_cylindric, &mut links)?;
    }
    if let Some(entry) = spherical {
        read_records(entry.data()?, LENGTH_SPHERICAL, Constraint::read_spherical, &mut links)?;
    }
    if let Some(entry) = loose {
        read_records(entry.data()?, LENGTH_LOOSE, read_loose_record, &mut links)?;
    }

    Ok(links)
}
