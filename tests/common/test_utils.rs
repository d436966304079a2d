#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use glancer::render::{DrawCall, GraphicsContext, ProgramHandle, TextureHandle, VertexArrayHandle};
use glancer::resources::Resources;
use glancer::resources::hash::flcrc32;
use glancer::resources::loader::{AssetProvider, FileLoader};
use glancer::resources::mesh::VMeshData;
use glancer::resources::shader::Shader;
use glancer::resources::texture::Texture;

/// Entry of a container built in memory.
pub(crate) enum Node {
    Folder(String, Vec<Node>),
    File(String, Vec<u8>),
}

pub(crate) fn folder(name: &str, children: Vec<Node>) -> Node {
    Node::Folder(name.to_string(), children)
}

pub(crate) fn file(name: &str, bytes: impl Into<Vec<u8>>) -> Node {
    Node::File(name.to_string(), bytes.into())
}

struct FlatEntry {
    name_offset: u32,
    folder: bool,
    data: Vec<u8>,
    children: Vec<usize>,
}

fn flatten(node: &Node, names: &mut Vec<u8>, out: &mut Vec<FlatEntry>) -> usize {
    let (name, folder, data) = match node {
        Node::Folder(name, _) => (name, true, Vec::new()),
        Node::File(name, data) => (name, false, data.clone()),
    };
    let name_offset = names.len() as u32;
    names.extend_from_slice(name.as_bytes());
    names.push(0);

    let index = out.len();
    out.push(FlatEntry {
        name_offset,
        folder,
        data,
        children: Vec::new(),
    });
    if let Node::Folder(_, children) = node {
        let ids: Vec<usize> = children.iter().map(|child| flatten(child, names, out)).collect();
        out[index].children = ids;
    }
    index
}

/// Serializes a container whose root folder holds `children`.
pub(crate) fn build_utf(children: Vec<Node>) -> Vec<u8> {
    const HEADER: usize = 0x38;
    const ENTRY: usize = 0x2C;

    let root = folder("\\", children);
    // Offset 0 of the dictionary is the empty name.
    let mut names = vec![0u8];
    let mut entries = Vec::new();
    flatten(&root, &mut names, &mut entries);

    let mut next_sibling = vec![0u32; entries.len()];
    for entry in &entries {
        for pair in entry.children.windows(2) {
            next_sibling[pair[0]] = (pair[1] * ENTRY) as u32;
        }
    }

    let mut data = Vec::new();
    let mut tree = Vec::with_capacity(entries.len() * ENTRY);
    for (index, entry) in entries.iter().enumerate() {
        let (attributes, offset, size) = if entry.folder {
            let first = entry.children.first().map_or(0, |&child| (child * ENTRY) as u32);
            (0x10u32, first, 0u32)
        } else {
            let offset = data.len() as u32;
            data.extend_from_slice(&entry.data);
            (0x80u32, offset, entry.data.len() as u32)
        };
        let fields = [
            next_sibling[index],
            entry.name_offset,
            attributes,
            0,
            offset,
            size,
            size,
            size,
            0,
            0,
            0,
        ];
        fields.iter().for_each(|field| tree.extend_from_slice(&field.to_le_bytes()));
    }

    let tree_offset = HEADER as u32;
    let names_offset = tree_offset + tree.len() as u32;
    let data_offset = names_offset + names.len() as u32;
    let header = [
        0x2046_5455u32,
        0x101,
        tree_offset,
        tree.len() as u32,
        0,
        ENTRY as u32,
        names_offset,
        names.len() as u32,
        names.len() as u32,
        data_offset,
        0,
        0,
        0,
        0,
    ];

    let mut bytes = Vec::new();
    header.iter().for_each(|field| bytes.extend_from_slice(&field.to_le_bytes()));
    bytes.extend_from_slice(&tree);
    bytes.extend_from_slice(&names);
    bytes.extend_from_slice(&data);
    bytes
}

/// NUL-terminated string entry contents.
pub(crate) fn text(value: &str) -> Vec<u8> {
    let mut bytes = value.as_bytes().to_vec();
    bytes.push(0);
    bytes
}

pub(crate) fn floats(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub(crate) fn words(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub(crate) fn shorts(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// 64-byte zero padded part name used by constraint records.
pub(crate) fn part_name(name: &str) -> Vec<u8> {
    let mut bytes = name.as_bytes().to_vec();
    bytes.resize(0x40, 0);
    bytes
}

pub(crate) const IDENTITY3: [f32; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

/// Constraint record of `length` bytes: both part names, then `fields`.
pub(crate) fn constraint_record(
    parent: &str,
    child: &str,
    fields: &[f32],
    length: usize,
) -> Vec<u8> {
    let mut record = part_name(parent);
    record.extend(part_name(child));
    record.extend(floats(fields));
    assert_eq!(record.len(), length);
    record
}

/// Fixed constraint record placing `child` at `position` on `parent`.
pub(crate) fn fixed_constraint(parent: &str, child: &str, position: [f32; 3]) -> Vec<u8> {
    constraint_record(parent, child, &[&position[..], &IDENTITY3[..]].concat(), 0xB0)
}

/// Loose constraint record, laid out like a fixed one.
pub(crate) fn loose_constraint(parent: &str, child: &str, position: [f32; 3]) -> Vec<u8> {
    constraint_record(parent, child, &[&position[..], &IDENTITY3[..]].concat(), 0xB0)
}

/// Single axis motion shared by revolute and prismatic records.
pub(crate) struct Axis {
    pub position: [f32; 3],
    pub offset: [f32; 3],
    pub rotation: [f32; 9],
    pub axis: [f32; 3],
    pub min: f32,
    pub max: f32,
}

impl Axis {
    fn fields(&self) -> Vec<f32> {
        let mut fields = self.position.to_vec();
        fields.extend(self.offset);
        fields.extend(self.rotation);
        fields.extend(self.axis);
        fields.extend([self.min, self.max]);
        fields
    }
}

pub(crate) fn revolute_constraint(parent: &str, child: &str, axis: &Axis) -> Vec<u8> {
    constraint_record(parent, child, &axis.fields(), 0xD0)
}

pub(crate) fn prismatic_constraint(parent: &str, child: &str, axis: &Axis) -> Vec<u8> {
    constraint_record(parent, child, &axis.fields(), 0xD0)
}

/// Cylindric record; `limits` are min and max rotation then min and max translation.
pub(crate) fn cylindric_constraint(
    parent: &str,
    child: &str,
    axis: [f32; 3],
    limits: [f32; 4],
) -> Vec<u8> {
    let fields = [&[0.0; 3][..], &IDENTITY3[..], &axis[..], &limits[..]].concat();
    constraint_record(parent, child, &fields, 0xCC)
}

/// Spherical record; `limits` pair min and max for each axis in turn.
pub(crate) fn spherical_constraint(
    parent: &str,
    child: &str,
    offset: [f32; 3],
    limits: [f32; 6],
) -> Vec<u8> {
    let fields = [&[0.0; 3][..], &offset[..], &IDENTITY3[..], &limits[..]].concat();
    constraint_record(parent, child, &fields, 0xD4)
}

/// Material group record.
pub(crate) struct Group {
    pub material: &'static str,
    pub vertex_start: u16,
    pub vertex_end: u16,
    pub index_count: u16,
}

/// `VMeshData` with position-only vertices.
pub(crate) fn mesh_data(groups: &[Group], indices: &[u16], positions: &[[f32; 3]]) -> Vec<u8> {
    let mut bytes = words(&[1, 4]);
    bytes.extend(shorts(&[groups.len() as u16, indices.len() as u16, 0x2, positions.len() as u16]));
    for group in groups {
        bytes.extend(words(&[flcrc32(group.material)]));
        bytes.extend(shorts(&[group.vertex_start, group.vertex_end, group.index_count, 0xCC]));
    }
    bytes.extend(shorts(indices));
    for position in positions {
        bytes.extend(floats(position));
    }
    bytes
}

/// Fields of a `VMeshRef` record.
#[derive(Clone, Copy)]
pub(crate) struct Reference {
    pub mesh: &'static str,
    pub vertex_start: u16,
    pub vertex_count: u16,
    pub index_start: u16,
    pub index_count: u16,
    pub group_start: u16,
    pub group_count: u16,
    pub radius: f32,
}

pub(crate) fn mesh_reference(reference: Reference) -> Vec<u8> {
    let mut bytes = words(&[0x3C, flcrc32(reference.mesh)]);
    bytes.extend(shorts(&[
        reference.vertex_start,
        reference.vertex_count,
        reference.index_start,
        reference.index_count,
        reference.group_start,
        reference.group_count,
    ]));
    let r = reference.radius;
    bytes.extend(floats(&[r, -r, r, -r, r, -r]));
    bytes.extend(floats(&[0.0, 0.0, 0.0, r]));
    assert_eq!(bytes.len(), 0x3C);
    bytes
}

/// Part fragment contents pointing at one mesh reference.
pub(crate) fn mesh_part(reference: Reference) -> Node {
    folder("VMeshPart", vec![file("VMeshRef", mesh_reference(reference))])
}

/// Uncompressed 24-bit DirectDraw Surface with a single level.
pub(crate) fn dds_rgb24(width: u32, height: u32, bgr: &[u8]) -> Vec<u8> {
    let mut header = vec![0u32; 32];
    header[0] = 0x2053_4444;
    header[1] = 124;
    header[2] = 0x1 | 0x2 | 0x4 | 0x1000;
    header[3] = height;
    header[4] = width;
    header[5] = width * 3;
    // Pixel format
    header[19] = 32;
    header[20] = 0x40;
    header[22] = 24;
    header[23] = 0xFF_0000;
    header[24] = 0xFF00;
    header[25] = 0xFF;
    let mut bytes = words(&header);
    bytes.extend_from_slice(bgr);
    bytes
}

/// Everything a recorded frame asked of the context.
#[derive(Debug, Default)]
pub(crate) struct RecordingContext {
    pub size: (u32, u32),
    next: u32,
    pub clears: Vec<(Option<[f32; 4]>, bool)>,
    pub programs: Vec<String>,
    pub vertex_arrays: Vec<VertexArrayHandle>,
    pub deleted_vertex_arrays: Vec<VertexArrayHandle>,
    pub rewrites: Vec<(VertexArrayHandle, u32, Vec<u16>)>,
    pub textures: Vec<(TextureHandle, u32, u32)>,
    pub deleted_textures: Vec<TextureHandle>,
    pub draws: Vec<DrawCall>,
    pub finished: u32,
}

impl RecordingContext {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            ..Self::default()
        }
    }

    fn handle(&mut self) -> u32 {
        self.next += 1;
        self.next
    }

    /// Forgets what earlier frames recorded.
    pub fn reset(&mut self) {
        self.clears.clear();
        self.rewrites.clear();
        self.draws.clear();
        self.finished = 0;
    }
}

impl GraphicsContext for RecordingContext {
    fn surface_size(&self) -> (u32, u32) {
        self.size
    }

    fn clear(&mut self, color: Option<[f32; 4]>, depth: bool) {
        self.clears.push((color, depth));
    }

    fn create_program(&mut self, name: &str, _shader: &Shader) -> anyhow::Result<ProgramHandle> {
        self.programs.push(name.to_string());
        Ok(ProgramHandle(self.handle()))
    }

    fn delete_program(&mut self, _program: ProgramHandle) {}

    fn create_vertex_array(&mut self, mesh: &VMeshData) -> anyhow::Result<VertexArrayHandle> {
        anyhow::ensure!(!mesh.indices.is_empty(), "mesh has no indices");
        let handle = VertexArrayHandle(self.handle());
        self.vertex_arrays.push(handle);
        Ok(handle)
    }

    fn delete_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        self.deleted_vertex_arrays.push(vertex_array);
    }

    fn rewrite_indices(&mut self, vertex_array: VertexArrayHandle, start: u32, indices: &[u16]) {
        self.rewrites.push((vertex_array, start, indices.to_vec()));
    }

    fn create_texture(&mut self, texture: &Texture, _alpha: bool) -> anyhow::Result<TextureHandle> {
        let handle = TextureHandle(self.handle());
        self.textures.push((handle, texture.width, texture.height));
        Ok(handle)
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.deleted_textures.push(texture);
    }

    fn draw(&mut self, call: &DrawCall) {
        self.draws.push(call.clone());
    }

    fn finish(&mut self) {
        self.finished += 1;
    }
}

/// Serves files from memory and counts every fetch.
#[derive(Debug, Default)]
pub(crate) struct MemoryProvider {
    files: HashMap<String, Vec<u8>>,
    never: HashSet<String>,
    fetches: RefCell<HashMap<String, usize>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(path.to_string(), bytes);
        self
    }

    /// A path whose fetch never completes.
    pub fn with_stalled(mut self, path: &str) -> Self {
        self.never.insert(path.to_string());
        self
    }

    pub fn fetches(&self, path: &str) -> usize {
        self.fetches.borrow().get(path).copied().unwrap_or(0)
    }
}

impl AssetProvider for MemoryProvider {
    fn fetch(&self, path: &str) -> LocalBoxFuture<'static, anyhow::Result<Vec<u8>>> {
        *self.fetches.borrow_mut().entry(path.to_string()).or_default() += 1;
        if self.never.contains(path) {
            return Box::pin(futures::future::pending());
        }
        let result = self
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("{path} not found"));
        Box::pin(futures::future::ready(result))
    }
}

/// A resource library over `provider`.
pub(crate) fn resources(provider: &Rc<MemoryProvider>) -> Rc<Resources> {
    let provider: Rc<dyn AssetProvider> = provider.clone();
    Rc::new(Resources::new(FileLoader::new(provider)))
}

/// Two triangles, one per material group.
pub(crate) const PANEL: [[f32; 3]; 6] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 1.0, 0.0],
    [0.0, 1.0, 1.0],
];

/// `hull.dds`, two texels: red then blue.
pub(crate) fn texture_library() -> Node {
    folder(
        "Texture library",
        vec![folder("Hull.dds", vec![file("MIPS", dds_rgb24(2, 1, &[0, 0, 255, 255, 0, 0]))])],
    )
}

/// `Hull`, a `DcDt` material of `color` textured with `hull.dds`.
pub(crate) fn material_library(color: [f32; 3]) -> Node {
    folder(
        "Material library",
        vec![folder(
            "Hull",
            vec![
                file("Type", text("DcDt")),
                file("Dc", floats(&color)),
                file("Dt_name", text("hull.dds")),
                file("Dt_flags", words(&[64])),
            ],
        )],
    )
}

/// `ship.lod0.vms`: the panel split into two groups of group relative indices.
pub(crate) fn mesh_library() -> Node {
    let groups = [
        Group {
            material: "Hull",
            vertex_start: 0,
            vertex_end: 2,
            index_count: 3,
        },
        Group {
            material: "Hull",
            vertex_start: 3,
            vertex_end: 5,
            index_count: 3,
        },
    ];
    folder(
        "VMeshLibrary",
        vec![folder(
            "ship.lod0.vms",
            vec![file("VMeshData", mesh_data(&groups, &[0, 1, 2, 0, 1, 2], &PANEL))],
        )],
    )
}

pub(crate) fn ship_libraries(color: [f32; 3]) -> Vec<Node> {
    vec![texture_library(), material_library(color), mesh_library()]
}

/// Reference to the whole of `ship.lod0.vms`.
pub(crate) fn ship_reference(radius: f32) -> Reference {
    Reference {
        mesh: "ship.lod0.vms",
        vertex_start: 0,
        vertex_count: 6,
        index_start: 0,
        index_count: 6,
        group_start: 0,
        group_count: 2,
        radius,
    }
}

/// Simple model over the whole mesh with a fixed `HpMount` at the origin.
/// `extra` nodes are added to the root, such as libraries.
pub(crate) fn ship_model(radius: f32, extra: Vec<Node>) -> Vec<u8> {
    let mut nodes = extra;
    nodes.push(mesh_part(ship_reference(radius)));
    nodes.push(folder(
        "Hardpoints",
        vec![folder(
            "Fixed",
            vec![folder(
                "HpMount",
                vec![file("Position", floats(&[0.0; 3])), file("Orientation", floats(&IDENTITY3))],
            )],
        )],
    ));
    build_utf(nodes)
}
