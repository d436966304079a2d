//! Line shapes.
//!
//! Shapes are drawn with lines only, so they carry indices, positions and
//! optional colors. Instead of mesh groups there are splines.

use std::f32::consts::PI;

use crate::error::{Error, Result};
use crate::utf::Entry;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SplineKind {
    #[default]
    Lines,
    Strip,
    Loop,
}

/// A run of indices drawn with one line primitive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShapeSpline {
    pub start: usize,
    pub count: usize,
    pub kind: SplineKind,
    pub color: [f32; 4],
}

impl ShapeSpline {
    pub fn new(start: usize, count: usize, kind: SplineKind) -> Self {
        Self {
            start,
            count,
            kind,
            color: [1.0; 4],
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShapeMeshData {
    pub splines: Vec<ShapeSpline>,
    pub indices: Vec<u16>,
    pub positions: Vec<f32>,
    pub colors: Option<Vec<u8>>,
}

impl ShapeMeshData {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Mirrored cone marker drawn as one line loop. The first vertex is the
    /// top, the last one the bottom and the rest form the rim.
    pub fn marker(sides: usize, height: f32, radius: f32) -> Result<Self> {
        if sides % 2 != 0 {
            return Err(Error::range("amount of sides must be even"));
        }
        if sides < 4 {
            return Err(Error::range("amount of sides must be at least four"));
        }

        let angle = 2.0 * PI / sides as f32;
        let mut positions = Vec::with_capacity((sides + 2) * 3);
        positions.extend([0.0, height, 0.0]);
        for s in 0..sides {
            let a = s as f32 * angle;
            positions.extend([a.sin() * radius, 0.0, a.cos() * radius]);
        }
        positions.extend([0.0, -height, 0.0]);

        let bottom = (sides + 1) as u16;
        let n = sides as u16;
        let mut indices = Vec::with_capacity(sides * 3);
        for s in (0..n).step_by(2) {
            indices.extend([0, s + 1, s + 2, bottom, 1 + (s + 2) % n, s + 2]);
        }

        Ok(Self {
            splines: vec![ShapeSpline::new(0, indices.len(), SplineKind::Loop)],
            indices,
            positions,
            colors: None,
        })
    }
}

/// Decodes a `shape library` entry. All indices form a single spline.
pub fn load_shape(folder: Entry<'_>) -> Result<Option<ShapeMeshData>> {
    if !folder.has_child() {
        return Err(Error::structure(format!("shape {} is empty", folder.name())));
    }

    let [splines, indices, positions, colors] =
        folder.find(["splines", "indices", "positions", "colors"])?;
    let missing = |what: &str| {
        Error::structure(format!("shape {} is missing {what} entry", folder.name()))
    };

    splines.ok_or_else(|| missing("splines"))?;
    let indices = indices.ok_or_else(|| missing("indices"))?.data()?.read_u16s(0)?;
    let positions = positions.ok_or_else(|| missing("positions"))?.data()?.read_f32s(0)?;
    let colors = match colors {
        Some(colors) => Some(colors.data()?.read_u8s(0)?),
        None => None,
    };

    Ok(Some(ShapeMeshData {
        splines: vec![ShapeSpline::new(0, indices.len(), SplineKind::Lines)],
        indices,
        positions,
        colors,
    }))
}
