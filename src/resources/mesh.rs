//! Rigid meshes.
//!
//! Mesh libraries hold `VMeshData` entries: one interleaved vertex buffer
//! described by a Direct3D flexible vertex format mask, one `u16` index
//! buffer and a list of material groups. Model parts point into them
//! through `VMeshRef` sub-ranges. Group indices are relative to the group's
//! own vertex range, which is why the renderer realigns them before the
//! first draw.

use crate::error::{Error, Result};
use crate::utf::{Cursor, Entry};

bitflags::bitflags! {
    /// Direct3D flexible vertex format bits used by mesh libraries.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Fvf: u16 {
        const POSITION = 0x2;
        const NORMAL = 0x10;
        const DIFFUSE = 0x40;
        const SPECULAR = 0x80;
        /// Count of texture coordinate sets, shifted by 8.
        const MAP_COUNT = 0xF00;
    }
}

const MAP_COUNT_SHIFT: u16 = 8;

const POSITION_SIZE: usize = 12;
const NORMAL_SIZE: usize = 12;
const DIFFUSE_SIZE: usize = 4;
const SPECULAR_SIZE: usize = 4;
const MAP_SIZE: usize = 8;

pub const VMESHREF_SIZE: u32 = 0x3C;
pub const VMESHWIRE_SIZE: u32 = 0x10;

const TAG_MESH_DATA: &str = "vmeshdata";

/// How an index range is assembled into primitives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Primitive {
    Points,
    LineStrip,
    LineLoop,
    Lines,
    TriangleStrip,
    TriangleFan,
    #[default]
    Triangles,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBox {
    pub minimum: [f32; 3],
    pub maximum: [f32; 3],
}

impl BoundingBox {
    /// Stored as max X, min X, max Y, min Y, max Z, min Z.
    fn read(data: &mut Cursor) -> Result<Self> {
        let [max_x, min_x, max_y, min_y, max_z, min_z] = {
            let v = data.read_f32s(6)?;
            [v[0], v[1], v[2], v[3], v[4], v[5]]
        };
        Ok(Self {
            minimum: [min_x, min_y, min_z],
            maximum: [max_x, max_y, max_z],
        })
    }

    pub fn size(&self) -> [f32; 3] {
        [
            self.maximum[0] - self.minimum[0],
            self.maximum[1] - self.minimum[1],
            self.maximum[2] - self.minimum[2],
        ]
    }
}

/// Sphere around every vertex of a reference, relative to the part origin.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingSphere {
    pub center: [f32; 3],
    pub radius: f32,
}

impl BoundingSphere {
    /// Radius seen from the part origin.
    pub fn max_radius(&self) -> f32 {
        let [x, y, z] = self.center;
        (x * x + y * y + z * z).sqrt() + self.radius
    }
}

/// Sub-range of a [`VMeshData`] drawn for one part at one level of detail.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VMeshRef {
    pub mesh_id: u32,
    pub vertex_start: u16,
    pub vertex_count: u16,
    pub index_start: u16,
    pub index_count: u16,
    pub group_start: u16,
    pub group_count: u16,
    pub bounding_box: BoundingBox,
    pub sphere: BoundingSphere,
}

impl VMeshRef {
    pub fn read(mut data: Cursor) -> Result<Self> {
        let size = data.read_u32()?;
        if size != VMESHREF_SIZE {
            return Err(Error::range(format!("invalid mesh reference size {size:#x}")));
        }
        let mesh_id = data.read_u32()?;
        let counts = data.read_u16s(6)?;
        let bounding_box = BoundingBox::read(&mut data)?;
        let [x, y, z, radius] = data.read_vec4()?;

        Ok(Self {
            mesh_id,
            vertex_start: counts[0],
            vertex_count: counts[1],
            index_start: counts[2],
            index_count: counts[3],
            group_start: counts[4],
            group_count: counts[5],
            bounding_box,
            sphere: BoundingSphere {
                center: [x, y, z],
                radius,
            },
        })
    }
}

/// Material group: a material and its slice of the index buffer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VMeshGroup {
    pub material_id: u32,
    pub vertex_start: u16,
    pub vertex_end: u16,
    pub index_count: u16,
    /// Some tools treat this as padding.
    pub unknown: u16,
    pub primitive: Primitive,
}

impl VMeshGroup {
    fn read(data: &mut Cursor) -> Result<Self> {
        let material_id = data.read_u32()?;
        let fields = data.read_u16s(4)?;
        Ok(Self {
            material_id,
            vertex_start: fields[0],
            vertex_end: fields[1],
            index_count: fields[2],
            unknown: fields[3],
            primitive: Primitive::Triangles,
        })
    }

    pub fn vertex_count(&self) -> u32 {
        (self.vertex_end as u32 + 1).saturating_sub(self.vertex_start as u32)
    }
}

/// Vertex layout decoded from a flexible vertex format mask.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VertexFormat {
    pub has_position: bool,
    pub has_normal: bool,
    pub has_diffuse: bool,
    pub has_specular: bool,
    pub map_count: usize,
    pub vertex_length: usize,
    pub position_offset: Option<usize>,
    pub normal_offset: Option<usize>,
    pub diffuse_offset: Option<usize>,
    pub specular_offset: Option<usize>,
    pub map_offset: Option<usize>,
}

impl VertexFormat {
    pub fn from_mask(mask: Fvf) -> Self {
        let mut format = Self {
            has_position: mask.contains(Fvf::POSITION),
            has_normal: mask.contains(Fvf::NORMAL),
            has_diffuse: mask.contains(Fvf::DIFFUSE),
            has_specular: mask.contains(Fvf::SPECULAR),
            map_count: (mask.intersection(Fvf::MAP_COUNT).bits() >> MAP_COUNT_SHIFT) as usize,
            ..Default::default()
        };

        let mut offset = 0;
        let mut place = |present: bool, size: usize| {
            present.then(|| {
                let at = offset;
                offset += size;
                at
            })
        };
        format.position_offset = place(format.has_position, POSITION_SIZE);
        format.normal_offset = place(format.has_normal, NORMAL_SIZE);
        format.diffuse_offset = place(format.has_diffuse, DIFFUSE_SIZE);
        format.specular_offset = place(format.has_specular, SPECULAR_SIZE);
        format.map_offset = place(format.map_count > 0, format.map_count * MAP_SIZE);
        format.vertex_length = offset;
        format
    }

    pub fn mask(&self) -> Fvf {
        let mut mask = Fvf::from_bits_truncate((self.map_count as u16) << MAP_COUNT_SHIFT);
        mask.set(Fvf::POSITION, self.has_position);
        mask.set(Fvf::NORMAL, self.has_normal);
        mask.set(Fvf::DIFFUSE, self.has_diffuse);
        mask.set(Fvf::SPECULAR, self.has_specular);
        mask
    }

    /// Byte offset of texture coordinate set `index`.
    pub fn map_offset(&self, index: usize) -> Option<usize> {
        (index < self.map_count).then(|| self.map_offset.unwrap_or(0) + index * MAP_SIZE)
    }
}

/// One vertex with every optional attribute filled in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub diffuse: [u8; 4],
    pub specular: [u8; 4],
    pub maps: [[f32; 2]; 2],
}

fn f32_at(bytes: &[u8], at: usize) -> f32 {
    f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn vec_at<const N: usize>(bytes: &[u8], at: usize) -> [f32; N] {
    std::array::from_fn(|i| f32_at(bytes, at + i * 4))
}

#[derive(Clone, Debug, PartialEq)]
pub struct VMeshData {
    pub mesh_type: u32,
    pub surface: u32,
    pub format: VertexFormat,
    pub scale: f32,
    pub groups: Vec<VMeshGroup>,
    pub indices: Vec<u16>,
    pub vertices: Vec<u8>,
}

impl Default for VMeshData {
    fn default() -> Self {
        Self {
            mesh_type: 1,
            surface: 4,
            format: VertexFormat::default(),
            scale: 1.0,
            groups: Vec::new(),
            indices: Vec::new(),
            vertices: Vec::new(),
        }
    }
}

impl VMeshData {
    pub fn read(mut data: Cursor) -> Result<Self> {
        let mesh_type = data.read_u32()?;
        let surface = data.read_u32()?;
        if mesh_type != 0x1 {
            return Err(Error::unsupported(format!("mesh type {mesh_type:#x}")));
        }
        if surface != 0x4 {
            return Err(Error::unsupported(format!("surface type {surface:#x}")));
        }

        let header = data.read_u16s(4)?;
        let (group_count, index_count, vertex_count) = (header[0], header[1], header[3]);
        let mask = Fvf::from_bits_retain(header[2]);
        let format = VertexFormat::from_mask(mask);
        if !format.has_position {
            let bits = mask.bits();
            return Err(Error::unsupported(format!("vertex format {bits:#x} has no position")));
        }

        let groups = (0..group_count)
            .map(|_| VMeshGroup::read(&mut data))
            .collect::<Result<Vec<_>>>()?;
        let indices = if index_count > 0 {
            data.read_u16s(index_count as usize)?
        } else {
            Vec::new()
        };
        let length = vertex_count as usize * format.vertex_length;
        let vertices = if length > 0 { data.copy(length)? } else { Vec::new() };

        let mesh = Self {
            mesh_type,
            surface,
            format,
            scale: 1.0,
            groups,
            indices,
            vertices,
        };
        if mesh.vertex_count() != vertex_count as usize {
            return Err(Error::range("mesh has invalid number of vertices"));
        }
        Ok(mesh)
    }

    pub fn vertex_count(&self) -> usize {
        match self.format.vertex_length {
            0 => 0,
            length => self.vertices.len() / length,
        }
    }

    /// Material groups a reference draws, in order.
    pub fn groups_by_reference<'a>(
        &'a self,
        reference: &VMeshRef,
    ) -> impl Iterator<Item = &'a VMeshGroup> + 'a {
        let start = reference.group_start as usize;
        let end = start + reference.group_count as usize;
        self.groups.get(start..end).unwrap_or_default().iter()
    }

    /// Decodes vertex `index`; absent attributes default to zero, white and opaque.
    pub fn vertex(&self, index: usize) -> Option<Vertex> {
        let length = self.format.vertex_length;
        let bytes = self.vertices.get(index * length..(index + 1) * length)?;
        let color = |offset: Option<usize>| {
            offset.map_or([0xFF; 4], |at| [bytes[at + 2], bytes[at + 1], bytes[at], bytes[at + 3]])
        };

        Some(Vertex {
            position: self.format.position_offset.map_or([0.0; 3], |at| vec_at(bytes, at)),
            normal: self.format.normal_offset.map_or([0.0; 3], |at| vec_at(bytes, at)),
            diffuse: color(self.format.diffuse_offset),
            specular: color(self.format.specular_offset),
            maps: [
                self.format.map_offset(0).map_or([0.0; 2], |at| vec_at(bytes, at)),
                self.format.map_offset(1).map_or([0.0; 2], |at| vec_at(bytes, at)),
            ],
        })
    }

    /// Flat list of vertex positions, used for wireframes.
    pub fn positions(&self) -> Option<Vec<f32>> {
        let at = self.format.position_offset?;
        let length = self.format.vertex_length;
        Some(
            self.vertices
                .chunks_exact(length)
                .flat_map(|vertex| vec_at::<3>(vertex, at))
                .collect(),
        )
    }
}

/// HUD wireframe drawn as line pairs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VMeshWire {
    pub mesh_id: u32,
    pub vertex_start: u16,
    pub vertex_count: u16,
    pub index_count: u16,
    pub vertex_range: u16,
    pub indices: Vec<u16>,
}

impl VMeshWire {
    pub fn read(mut data: Cursor) -> Result<Self> {
        let size = data.read_u32()?;
        if size != VMESHWIRE_SIZE {
            return Err(Error::range(format!("invalid wire reference size {size:#x}")));
        }
        let mesh_id = data.read_u32()?;
        let fields = data.read_u16s(4)?;
        let index_count = fields[2];
        let indices = if index_count > 0 {
            data.read_u16s(index_count as usize)?
        } else {
            Vec::new()
        };

        Ok(Self {
            mesh_id,
            vertex_start: fields[0],
            vertex_count: fields[1],
            index_count,
            vertex_range: fields[3],
            indices,
        })
    }
}

/// Decodes one mesh library entry, `None` when it holds no `VMeshData`.
pub fn load_mesh(folder: Entry<'_>) -> Result<Option<VMeshData>> {
    match folder.find_one(TAG_MESH_DATA)? {
        Some(entry) => VMeshData::read(entry.data()?).map(Some),
        None => Ok(None),
    }
}
