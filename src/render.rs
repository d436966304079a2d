//! Frame rendering.
//!
//! The [`Renderer`] walks a [`Scene`] once per frame and turns every visible
//! model part into [`DrawCall`]s on a [`GraphicsContext`]. It owns no GPU
//! objects itself, only handles the context gave out, cached by shader name,
//! mesh id and texture id.
//!
//! A frame runs through [`RenderStatus`] in order: the backdrop (stars and
//! nebulae, camera rotation only, full ambient) is drawn first and the depth
//! buffer cleared behind it, then the scene objects with lights, level of
//! detail selection, culling and cursor picking.
//!
//! Mesh group indices are stored relative to the group's vertex range. The
//! first time a group is drawn its slice of the index buffer is rewritten to
//! absolute indices, once per vertex array.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use bytemuck::{Pod, Zeroable};
use cgmath::{InnerSpace, Matrix3, Matrix4, SquareMatrix, Vector2, Vector3};

use crate::config::{DrawMode, Settings};
use crate::data_structures::compound::PartId;
use crate::data_structures::rigid::RigidModel;
use crate::data_structures::scene_graph::Scene;
use crate::math::{normal_from_mat4, range_index, transform_point};
use crate::resources::Resources;
use crate::resources::hash::ResourceId;
use crate::resources::mesh::{Primitive, VMeshData, VMeshGroup, VMeshRef};
use crate::resources::shader::Shader;
use crate::resources::texture::Texture;

/// Lights passed to a draw at most.
pub const MAX_LIGHTS: usize = 6;

/// Texture mode bits.
pub const MAP_DIFFUSE: u32 = 1;
pub const MAP_EMISSION: u32 = 2;
pub const MAP_DETAIL: u32 = 4;
/// Texture mode of nebula materials.
pub const MAP_NEBULA: u32 = 10;

const WHITE: [f32; 3] = [1.0; 3];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexArrayHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Source alpha over destination.
    #[default]
    Alpha,
    /// Source alpha added onto destination.
    Additive,
}

/// Per draw uniform block, laid out for WGSL.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DrawUniforms {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    /// Columns of the 3x3 normal matrix, each padded to four floats.
    pub normal: [[f32; 4]; 3],
    /// Diffuse color and opacity.
    pub diffuse: [f32; 4],
    pub ambient: [f32; 4],
    pub light_positions: [[f32; 4]; MAX_LIGHTS],
    pub light_colors: [[f32; 4]; MAX_LIGHTS],
    pub texture_mode: u32,
    pub light_count: u32,
    pub _padding: [u32; 2],
}

fn pad3(v: [f32; 3]) -> [f32; 4] {
    [v[0], v[1], v[2], 0.0]
}

fn normal_columns(m: Matrix3<f32>) -> [[f32; 4]; 3] {
    [pad3(m.x.into()), pad3(m.y.into()), pad3(m.z.into())]
}

#[derive(Clone, Debug, PartialEq)]
pub struct DrawCall {
    pub program: ProgramHandle,
    pub vertex_array: VertexArrayHandle,
    /// First index, counted in indices.
    pub index_start: u32,
    pub index_count: u32,
    pub primitive: Primitive,
    pub blend: BlendMode,
    pub two_sided: bool,
    pub diffuse: Option<TextureHandle>,
    /// Emission or detail map, whichever the texture mode says.
    pub secondary: Option<TextureHandle>,
    pub highlight: bool,
    pub uniforms: DrawUniforms,
}

/// What the renderer needs from a graphics backend.
///
/// Depth testing, back face culling and blending are always on. Handles are
/// only meaningful to the context that created them.
pub trait GraphicsContext {
    /// Drawable size in pixels.
    fn surface_size(&self) -> (u32, u32);

    /// Clears the color buffer when `color` is given and the depth buffer when
    /// `depth` is set.
    fn clear(&mut self, color: Option<[f32; 4]>, depth: bool);

    fn create_program(&mut self, name: &str, shader: &Shader) -> anyhow::Result<ProgramHandle>;

    fn delete_program(&mut self, program: ProgramHandle);

    /// Uploads the vertex and index buffers of a mesh as they are stored.
    fn create_vertex_array(&mut self, mesh: &VMeshData) -> anyhow::Result<VertexArrayHandle>;

    fn delete_vertex_array(&mut self, vertex_array: VertexArrayHandle);

    /// Replaces indices starting at index `start` of the vertex array.
    fn rewrite_indices(&mut self, vertex_array: VertexArrayHandle, start: u32, indices: &[u16]);

    fn create_texture(&mut self, texture: &Texture, alpha: bool) -> anyhow::Result<TextureHandle>;

    fn delete_texture(&mut self, texture: TextureHandle);

    fn draw(&mut self, call: &DrawCall);

    /// End of frame; submit whatever was recorded.
    fn finish(&mut self) {}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum RenderStatus {
    /// No context bound yet.
    #[default]
    Uninitialized = 0,
    Initialized = 1,
    Started = 2,
    Backdrop = 3,
    Objects = 4,
    Overlays = 5,
    Finished = 10,
}

/// A part under the cursor in the last frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Picked {
    /// Index into the scene's object list.
    pub object: usize,
    pub part: PartId,
}

/// Pixel position of a screen space point on a `width` by `height` target.
pub fn screen_space_to_pixels(width: u32, height: u32, v: [f32; 2]) -> [f32; 2] {
    let (half_width, half_height) = (width as f32 * 0.5, height as f32 * 0.5);
    [
        (half_width * v[0] + half_width).round(),
        (half_height * v[1] + half_height).round(),
    ]
}

/// Screen space position of a cursor given in pixels from the top left.
pub fn cursor_to_screen_space(width: u32, height: u32, pixels: [f32; 2]) -> [f32; 2] {
    [
        pixels[0] / (width as f32 * 0.5) - 1.0,
        1.0 - pixels[1] / (height as f32 * 0.5),
    ]
}

struct CachedTexture {
    handle: TextureHandle,
    source: Rc<Texture>,
}

/// State shared by every draw of one pass.
struct Frame {
    projection: Matrix4<f32>,
    view: Matrix4<f32>,
    ambient: [f32; 3],
    light_positions: [[f32; 4]; MAX_LIGHTS],
    light_colors: [[f32; 4]; MAX_LIGHTS],
    light_count: u32,
    cursor: Option<Vector2<f32>>,
}

/// Matrices of the part being drawn.
struct PartMatrices {
    model: Matrix4<f32>,
    normal: Matrix3<f32>,
}

pub struct Renderer {
    pub mode: DrawMode,
    /// Multiplier on object LOD override ranges.
    pub lod_bias: f32,
    pub backdrop_scalar: f32,
    pub viewport_scale: f32,
    /// Clear alpha.
    pub alpha: f32,
    status: RenderStatus,
    width: u32,
    height: u32,
    aspect_ratio: f32,
    frame_count: u64,
    draw_count: u32,
    programs: HashMap<String, ProgramHandle>,
    vertex_arrays: HashMap<u32, VertexArrayHandle>,
    textures: HashMap<ResourceId, CachedTexture>,
    aligned_groups: HashSet<(u32, usize)>,
    picked: Vec<Picked>,
    reported: HashSet<String>,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("status", &self.status)
            .field("size", &(self.width, self.height))
            .field("frame_count", &self.frame_count)
            .field("draw_count", &self.draw_count)
            .field("programs", &self.programs.len())
            .field("vertex_arrays", &self.vertex_arrays.len())
            .field("textures", &self.textures.len())
            .finish()
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(&Settings::default())
    }
}

impl Renderer {
    pub fn new(settings: &Settings) -> Self {
        Self {
            mode: settings.mode,
            lod_bias: settings.lod_bias,
            backdrop_scalar: settings.backdrop_scalar,
            viewport_scale: settings.viewport_scale,
            alpha: settings.alpha,
            status: RenderStatus::Uninitialized,
            width: 0,
            height: 0,
            aspect_ratio: 0.0,
            frame_count: 0,
            draw_count: 0,
            programs: HashMap::new(),
            vertex_arrays: HashMap::new(),
            textures: HashMap::new(),
            aligned_groups: HashSet::new(),
            picked: Vec::new(),
            reported: HashSet::new(),
        }
    }

    /// Binds the renderer to a context. Handles cached for an earlier context
    /// are forgotten.
    pub fn initialize(&mut self, ctx: &dyn GraphicsContext) {
        self.programs.clear();
        self.vertex_arrays.clear();
        self.textures.clear();
        self.aligned_groups.clear();
        self.reported.clear();
        self.status = RenderStatus::Initialized;

        let (width, height) = ctx.surface_size();
        self.setup_viewport(width, height);
    }

    /// Sets the drawing size from the visible size in pixels.
    pub fn setup_viewport(&mut self, width: u32, height: u32) {
        self.width = (width as f32 * self.viewport_scale) as u32;
        self.height = (height as f32 * self.viewport_scale) as u32;
        if height > 0 {
            self.aspect_ratio = width as f32 / height as f32;
        }
    }

    pub fn status(&self) -> RenderStatus {
        self.status
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Draw calls issued by the last frame.
    pub fn draw_count(&self) -> u32 {
        self.draw_count
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.aspect_ratio
    }

    /// Drawing size after the viewport scale.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn picked(&self) -> &[Picked] {
        &self.picked
    }

    pub fn screen_space_to_pixels(&self, v: [f32; 2]) -> [f32; 2] {
        screen_space_to_pixels(self.width, self.height, v)
    }

    /// Cursor pixel position in the visible window to screen space.
    pub fn cursor_to_screen_space(&self, pixels: [f32; 2]) -> [f32; 2] {
        let scale = self.viewport_scale;
        cursor_to_screen_space(self.width, self.height, [pixels[0] * scale, pixels[1] * scale])
    }

    fn report(&mut self, key: String, message: impl FnOnce() -> String) {
        if self.reported.insert(key) {
            log::warn!("{}", message());
        }
    }

    /// Draws one frame of `scene`. `cursor` is in screen space.
    ///
    /// Returns `false` when there is nothing to draw for lack of a context.
    /// A scene without a camera is cleared and left at
    /// [`RenderStatus::Started`].
    pub fn draw_scene(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        resources: &Resources,
        scene: &dyn Scene,
        cursor: Option<[f32; 2]>,
    ) -> bool {
        if self.status == RenderStatus::Uninitialized {
            log::warn!("draw_scene called before initialize");
            return false;
        }

        self.status = RenderStatus::Started;
        self.draw_count = 0;
        self.picked.clear();

        let [r, g, b] = scene.color();
        ctx.clear(Some([r, g, b, self.alpha]), true);

        let Some(camera) = scene.camera() else {
            ctx.finish();
            return true;
        };

        let mut frame = Frame {
            projection: cgmath::perspective(camera.fov, self.aspect_ratio, camera.near, camera.far),
            view: Matrix4::from(camera.object.rotation),
            ambient: WHITE,
            light_positions: [[0.0; 4]; MAX_LIGHTS],
            light_colors: [[0.0; 4]; MAX_LIGHTS],
            light_count: 0,
            cursor: cursor.map(Vector2::from),
        };

        self.status = RenderStatus::Backdrop;
        let parallax = camera.object.position * self.backdrop_scalar;
        frame.view = frame.view * Matrix4::from_translation(parallax);

        if self.mode.contains(DrawMode::STARS) {
            if let Some(stars) = scene.stars() {
                self.draw_rigid_model(ctx, resources, &frame, stars, None, None, None);
            }
        }
        if self.mode.contains(DrawMode::NEBULAE) {
            if let Some(nebulae) = scene.nebulae() {
                self.draw_rigid_model(ctx, resources, &frame, nebulae, None, None, None);
            }
        }
        ctx.clear(None, true);

        self.status = RenderStatus::Objects;
        frame.view = frame.view * Matrix4::from_translation(camera.object.position);
        frame.ambient = scene.ambient();

        let lights = scene.lights();
        if lights.len() > MAX_LIGHTS {
            self.report("lights".into(), || {
                format!("scene has {} lights, only {MAX_LIGHTS} are used", lights.len())
            });
        }
        for light in lights.iter().take(MAX_LIGHTS) {
            let slot = frame.light_count as usize;
            frame.light_positions[slot] = pad3(light.object.position.into());
            frame.light_colors[slot] = pad3(light.color);
            frame.light_count += 1;
        }

        if self.mode.contains(DrawMode::OBJECTS) {
            for (index, object) in scene.objects().into_iter().enumerate() {
                let transform = object.object.transform();
                self.draw_rigid_model(
                    ctx,
                    resources,
                    &frame,
                    &object.model,
                    Some(transform),
                    object.ranges.as_deref(),
                    Some(index),
                );

                for (hardpoint, attachment) in object.attachments() {
                    let Some(mount) = object.model.hardpoint_transform(hardpoint) else { continue };
                    self.draw_rigid_model(
                        ctx,
                        resources,
                        &frame,
                        attachment,
                        Some(transform * mount),
                        None,
                        Some(index),
                    );
                }
            }
        }

        self.status = RenderStatus::Overlays;
        ctx.finish();

        self.status = RenderStatus::Finished;
        self.frame_count += 1;
        true
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_rigid_model(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        resources: &Resources,
        frame: &Frame,
        model: &RigidModel,
        transform: Option<Matrix4<f32>>,
        ranges: Option<&[f32]>,
        owner: Option<usize>,
    ) {
        for (id, part) in model.parts() {
            let mut matrix = model.part_transform(id);
            if let Some(transform) = transform {
                matrix = transform * matrix;
            }
            let model_view = frame.view * matrix;
            let result = frame.projection * model_view;
            let depth = result.w.z.max(0.0);

            let reference = match ranges {
                Some(ranges) => part.lod(range_index(depth, ranges, self.lod_bias)),
                None => part.lod_reference(depth),
            };
            let Some(reference) = reference else { continue };

            let mut draw = true;
            let mut highlight = false;
            if self.status == RenderStatus::Objects {
                let center = Vector3::from(reference.sphere.center);
                let radius = reference.sphere.radius;

                let eye = transform_point(&model_view, center);
                let inside = eye.magnitude2() <= radius * radius;

                let boundary = transform_point(&result, center);
                let projected = (radius * (1.0 - boundary.z)).abs();
                let on_screen = boundary.z < 1.0
                    && boundary.x.abs() < 1.0 + projected
                    && boundary.y.abs() < 1.0 + projected;

                draw = inside || on_screen;
                if draw {
                    if let Some(cursor) = frame.cursor {
                        let distance = (cursor - boundary.truncate()).magnitude2();
                        highlight = distance < projected * projected;
                    }
                }
                if highlight {
                    if let Some(object) = owner {
                        self.picked.push(Picked { object, part: id });
                    }
                }
            }

            if draw {
                let normal = normal_from_mat4(&model_view).unwrap_or_else(Matrix3::identity);
                let matrices = PartMatrices { model: matrix, normal };
                self.draw_rigid_part(ctx, resources, frame, reference, &matrices, highlight);
            }
        }
    }

    fn vertex_array(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        mesh_id: u32,
        mesh: &VMeshData,
    ) -> Option<VertexArrayHandle> {
        if let Some(&handle) = self.vertex_arrays.get(&mesh_id) {
            return Some(handle);
        }
        match ctx.create_vertex_array(mesh) {
            Ok(handle) => {
                self.vertex_arrays.insert(mesh_id, handle);
                Some(handle)
            }
            Err(error) => {
                self.report(format!("mesh {mesh_id}"), || {
                    format!("failed to upload mesh {}: {error:#}", ResourceId(mesh_id))
                });
                None
            }
        }
    }

    fn draw_rigid_part(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        resources: &Resources,
        frame: &Frame,
        reference: &VMeshRef,
        matrices: &PartMatrices,
        highlight: bool,
    ) {
        if reference.mesh_id == 0 {
            return;
        }
        let Some(mesh) = resources.get_mesh(reference.mesh_id) else {
            self.report(format!("mesh {}", reference.mesh_id), || {
                format!("skipping draw, mesh {} is not loaded", ResourceId(reference.mesh_id))
            });
            return;
        };
        let Some(vertex_array) = self.vertex_array(ctx, reference.mesh_id, &mesh) else { return };

        let mut index_start = reference.index_start as u32;
        for (offset, group) in mesh.groups_by_reference(reference).enumerate() {
            let key = (reference.mesh_id, reference.group_start as usize + offset);
            if self.aligned_groups.insert(key) {
                align_group(ctx, vertex_array, &mesh, group, reference, index_start);
            }

            self.draw_mesh_group(
                ctx,
                resources,
                frame,
                group,
                vertex_array,
                index_start,
                matrices,
                highlight,
            );
            index_start += group.index_count as u32;
        }
    }

    fn program(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        resources: &Resources,
        name: &str,
    ) -> Option<ProgramHandle> {
        if let Some(&program) = self.programs.get(name) {
            return Some(program);
        }
        let Some(shader) = resources.get_shader(name) else {
            self.report(format!("shader {name}"), || {
                format!("skipping draw, shader {name} is not loaded")
            });
            return None;
        };
        match ctx.create_program(name, &shader) {
            Ok(program) => {
                self.programs.insert(name.to_string(), program);
                Some(program)
            }
            Err(error) => {
                self.report(format!("shader {name}"), || {
                    format!("failed to build shader {name}: {error:#}")
                });
                None
            }
        }
    }

    /// GPU texture for a library texture. A texture that replaced the one
    /// uploaded earlier under the same id, such as the placeholder, is
    /// uploaded again.
    fn texture(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        resources: &Resources,
        id: ResourceId,
        alpha: bool,
    ) -> Option<TextureHandle> {
        let texture = resources.get_texture(id);
        if let Some(cached) = self.textures.get(&id) {
            if Rc::ptr_eq(&cached.source, &texture) {
                return Some(cached.handle);
            }
        }
        if let Some(stale) = self.textures.remove(&id) {
            ctx.delete_texture(stale.handle);
        }

        match ctx.create_texture(&texture, alpha) {
            Ok(handle) => {
                self.textures.insert(id, CachedTexture { handle, source: texture });
                Some(handle)
            }
            Err(error) => {
                self.report(format!("texture {id}"), || {
                    format!("failed to upload texture {id}: {error:#}")
                });
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_mesh_group(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        resources: &Resources,
        frame: &Frame,
        group: &VMeshGroup,
        vertex_array: VertexArrayHandle,
        index_start: u32,
        matrices: &PartMatrices,
        highlight: bool,
    ) {
        let material = resources.get_material(group.material_id);
        let Some(program) = self.program(ctx, resources, &material.shader) else { return };

        let ambient = if self.status == RenderStatus::Backdrop || highlight {
            WHITE
        } else {
            frame.ambient
        };

        let (blend, mut render_mode) = if material.is_nebula() {
            (BlendMode::Additive, MAP_NEBULA)
        } else {
            (BlendMode::Alpha, 0)
        };

        let textured = !self.mode.is_empty();
        let mut diffuse = None;
        let mut secondary = None;
        if textured {
            if let Some(id) = material.diffuse_texture {
                diffuse = self.texture(ctx, resources, id, material.alpha);
                if diffuse.is_some() {
                    render_mode |= MAP_DIFFUSE;
                }
            }
            if let Some(id) = material.emission_texture {
                secondary = self.texture(ctx, resources, id, false);
                if secondary.is_some() {
                    render_mode |= MAP_EMISSION;
                }
            } else if let Some(id) = material.detail_texture {
                secondary = self.texture(ctx, resources, id, false);
                if secondary.is_some() {
                    render_mode |= MAP_DETAIL;
                }
            }
        }

        let lit = self.status == RenderStatus::Objects && self.mode.contains(DrawMode::LIGHTING);
        let light_count = if lit {
            frame.light_count
        } else {
            0
        };

        let [dr, dg, db] = material.diffuse_color;
        let uniforms = DrawUniforms {
            model: matrices.model.into(),
            view: frame.view.into(),
            projection: frame.projection.into(),
            normal: normal_columns(matrices.normal),
            diffuse: [dr, dg, db, material.opacity],
            ambient: pad3(ambient),
            light_positions: frame.light_positions,
            light_colors: frame.light_colors,
            texture_mode: if self.mode.contains(DrawMode::TEXTURES) { render_mode } else { 0 },
            light_count,
            _padding: [0; 2],
        };

        ctx.draw(&DrawCall {
            program,
            vertex_array,
            index_start,
            index_count: group.index_count as u32,
            primitive: group.primitive,
            blend,
            two_sided: material.two_sided,
            diffuse,
            secondary,
            highlight,
            uniforms,
        });
        self.draw_count += 1;
    }

    /// Forgets a compiled program; returns whether it existed.
    pub fn delete_program(&mut self, ctx: &mut dyn GraphicsContext, name: &str) -> bool {
        match self.programs.remove(name) {
            Some(program) => {
                ctx.delete_program(program);
                true
            }
            None => false,
        }
    }

    /// Forgets an uploaded mesh. Its groups get realigned if it is uploaded again.
    pub fn delete_vertex_array(&mut self, ctx: &mut dyn GraphicsContext, mesh_id: u32) -> bool {
        match self.vertex_arrays.remove(&mesh_id) {
            Some(vertex_array) => {
                ctx.delete_vertex_array(vertex_array);
                self.aligned_groups.retain(|(mesh, _)| *mesh != mesh_id);
                true
            }
            None => false,
        }
    }

    pub fn delete_texture(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        id: impl Into<ResourceId>,
    ) -> bool {
        match self.textures.remove(&id.into()) {
            Some(cached) => {
                ctx.delete_texture(cached.handle);
                true
            }
            None => false,
        }
    }
}

/// Rewrites a group's index slice from group relative to absolute indices.
fn align_group(
    ctx: &mut dyn GraphicsContext,
    vertex_array: VertexArrayHandle,
    mesh: &VMeshData,
    group: &VMeshGroup,
    reference: &VMeshRef,
    index_start: u32,
) {
    let start = (index_start as usize).min(mesh.indices.len());
    let end = (start + group.index_count as usize).min(mesh.indices.len());
    let offset = reference.vertex_start.wrapping_add(group.vertex_start);
    let aligned: Vec<u16> = mesh.indices[start..end]
        .iter()
        .map(|&i| i.wrapping_add(offset))
        .collect();
    ctx.rewrite_indices(vertex_array, index_start, &aligned);
}
