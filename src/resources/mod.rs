//! Resource library.
//!
//! One [`Resources`] instance caches every decoded texture, material, shader,
//! mesh, shape and model by hashed name for the whole application. Textures
//! and materials never miss: an unknown name yields a shared placeholder that
//! a later library load replaces in place.
//!
//! - `loader` fetches asset bytes and tracks progress
//! - `texture`, `material`, `shader`, `mesh`, `shape` decode library entries
//! - `dxt` decompresses block textures
//! - `hash` turns names into resource ids

pub mod dxt;
pub mod hash;
pub mod loader;
pub mod material;
pub mod mesh;
pub mod shader;
pub mod shape;
pub mod texture;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use anyhow::Context as _;
use futures::future::{FutureExt, LocalBoxFuture, Shared};

use crate::data_structures::rigid::{RigidModel, load_rigid_model};
use crate::error::{Error, ModelError, Result};
use crate::utf::{Entry, UtfReader};

use hash::ResourceId;
use loader::FileLoader;
use material::{Material, load_material};
use mesh::{VMeshData, VMeshRef, load_mesh};
use shader::{Shader, load_shader};
use shape::{ShapeMeshData, load_shape};
use texture::{Texture, load_texture};

pub const TAG_TEXTURES: &str = "texture library";
pub const TAG_MATERIALS: &str = "material library";
pub const TAG_SHADERS: &str = "shader library";
pub const TAG_MESHES: &str = "vmeshlibrary";
pub const TAG_SHAPES: &str = "shape library";

bitflags::bitflags! {
    /// Selects which libraries of a container get loaded.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ResourceMask: u32 {
        const TEXTURES = 1;
        const MATERIALS = 2;
        const SHADERS = 4;
        const MESHES = 8;
        const SHAPES = 16;
        const ALL = 31;
    }
}

pub type ModelResult = std::result::Result<Rc<RigidModel>, ModelError>;

/// Model load shared by every caller that asked for the same path.
pub type ModelFuture = Shared<LocalBoxFuture<'static, ModelResult>>;

enum ModelSlot {
    Pending(ModelFuture),
    Ready(Rc<RigidModel>),
}

type Cache<T> = RefCell<HashMap<ResourceId, Rc<T>>>;

pub struct Resources {
    loader: FileLoader,
    placeholder_texture: Rc<Texture>,
    placeholder_material: Rc<Material>,
    textures: Cache<Texture>,
    materials: Cache<Material>,
    shaders: Cache<Shader>,
    meshes: Cache<VMeshData>,
    shapes: Cache<ShapeMeshData>,
    models: RefCell<HashMap<ResourceId, ModelSlot>>,
}

impl std::fmt::Debug for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resources")
            .field("textures", &self.textures.borrow().len())
            .field("materials", &self.materials.borrow().len())
            .field("shaders", &self.shaders.borrow().len())
            .field("meshes", &self.meshes.borrow().len())
            .field("shapes", &self.shapes.borrow().len())
            .field("models", &self.models.borrow().len())
            .finish()
    }
}

/// Inserts every decodable child of `folder` into `cache`. Existing entries
/// win unless they are the placeholder.
fn add_resources<T>(
    folder: Entry<'_>,
    cache: &Cache<T>,
    placeholder: Option<&Rc<T>>,
    load: fn(Entry<'_>) -> Result<Option<T>>,
) -> Result<usize> {
    let mut added = 0;
    for child in folder.children() {
        let (tag, entry) = child?;
        if !entry.has_child() {
            continue;
        }

        let id = ResourceId::from(tag.as_str());
        let taken = cache
            .borrow()
            .get(&id)
            .is_some_and(|existing| !placeholder.is_some_and(|p| Rc::ptr_eq(p, existing)));
        if taken {
            continue;
        }

        match load(entry) {
            Ok(Some(resource)) => {
                cache.borrow_mut().insert(id, Rc::new(resource));
                added += 1;
            }
            Ok(None) => {}
            Err(Error::Unsupported(reason)) => log::warn!("skipping {}: {reason}", entry.name()),
            Err(error) => return Err(error),
        }
    }
    Ok(added)
}

impl Resources {
    pub fn new(loader: FileLoader) -> Self {
        Self {
            loader,
            placeholder_texture: Rc::new(Texture::default()),
            placeholder_material: Rc::new(Material::placeholder()),
            textures: RefCell::default(),
            materials: RefCell::default(),
            shaders: RefCell::default(),
            meshes: RefCell::default(),
            shapes: RefCell::default(),
            models: RefCell::default(),
        }
    }

    pub fn loader(&self) -> &FileLoader {
        &self.loader
    }

    /// Cached texture, or the placeholder registered under `id` until the
    /// real one loads.
    pub fn get_texture(&self, id: impl Into<ResourceId>) -> Rc<Texture> {
        self.textures
            .borrow_mut()
            .entry(id.into())
            .or_insert_with(|| self.placeholder_texture.clone())
            .clone()
    }

    pub fn get_material(&self, id: impl Into<ResourceId>) -> Rc<Material> {
        self.materials
            .borrow_mut()
            .entry(id.into())
            .or_insert_with(|| self.placeholder_material.clone())
            .clone()
    }

    pub fn is_placeholder_texture(&self, texture: &Rc<Texture>) -> bool {
        Rc::ptr_eq(texture, &self.placeholder_texture)
    }

    pub fn is_placeholder_material(&self, material: &Rc<Material>) -> bool {
        Rc::ptr_eq(material, &self.placeholder_material)
    }

    pub fn get_shader(&self, id: impl Into<ResourceId>) -> Option<Rc<Shader>> {
        self.shaders.borrow().get(&id.into()).cloned()
    }

    pub fn get_mesh(&self, id: impl Into<ResourceId>) -> Option<Rc<VMeshData>> {
        self.meshes.borrow().get(&id.into()).cloned()
    }

    pub fn get_shape(&self, id: impl Into<ResourceId>) -> Option<Rc<ShapeMeshData>> {
        self.shapes.borrow().get(&id.into()).cloned()
    }

    /// Registers a shader under `name`, replacing any previous one.
    pub fn add_shader(&self, name: &str, shader: Shader) {
        self.shaders.borrow_mut().insert(ResourceId::from(name), Rc::new(shader));
    }

    pub fn add_shape(&self, name: &str, shape: ShapeMeshData) {
        self.shapes.borrow_mut().insert(ResourceId::from(name), Rc::new(shape));
    }

    /// Part of a mesh covered by `reference`: its groups, indices and vertices.
    pub fn get_mesh_by_reference(&self, reference: &VMeshRef) -> Result<Option<VMeshData>> {
        let Some(mesh) = self.get_mesh(reference.mesh_id) else {
            return Ok(None);
        };

        let span = |start: u16, count: u16| {
            let start = usize::from(start);
            start..start + usize::from(count)
        };
        let groups = span(reference.group_start, reference.group_count);
        let indices = span(reference.index_start, reference.index_count);
        let vertex_span = span(reference.vertex_start, reference.vertex_count);
        let length = mesh.format.vertex_length;
        let vertices = vertex_span.start * length..vertex_span.end * length;

        let out_of_range = |what: &str| {
            let mesh_id = reference.mesh_id;
            Error::range(format!("mesh reference {what} exceed mesh {mesh_id:#010x}"))
        };
        Ok(Some(VMeshData {
            groups: mesh.groups.get(groups).ok_or_else(|| out_of_range("groups"))?.to_vec(),
            indices: mesh.indices.get(indices).ok_or_else(|| out_of_range("indices"))?.to_vec(),
            vertices: mesh.vertices.get(vertices).ok_or_else(|| out_of_range("vertices"))?.to_vec(),
            mesh_type: mesh.mesh_type,
            surface: mesh.surface,
            format: mesh.format,
            scale: mesh.scale,
        }))
    }

    /// Decodes the requested libraries of a parsed container into the caches.
    pub fn load_libraries(&self, reader: &UtfReader, mask: ResourceMask) -> Result<()> {
        let root = reader.root()?;
        let [textures, materials, shaders, meshes, shapes] =
            root.find([TAG_TEXTURES, TAG_MATERIALS, TAG_SHADERS, TAG_MESHES, TAG_SHAPES])?;
        let file = reader.filename().unwrap_or("<memory>");

        if let Some(folder) = textures.filter(|_| mask.contains(ResourceMask::TEXTURES)) {
            let placeholder = Some(&self.placeholder_texture);
            let count = add_resources(folder, &self.textures, placeholder, load_texture)?;
            log::debug!("{file}: {count} textures");
        }
        if let Some(folder) = materials.filter(|_| mask.contains(ResourceMask::MATERIALS)) {
            let placeholder = Some(&self.placeholder_material);
            let count = add_resources(folder, &self.materials, placeholder, load_material)?;
            log::debug!("{file}: {count} materials");
        }
        if let Some(folder) = shaders.filter(|_| mask.contains(ResourceMask::SHADERS)) {
            let count = add_resources(folder, &self.shaders, None, load_shader)?;
            log::debug!("{file}: {count} shaders");
        }
        if let Some(folder) = meshes.filter(|_| mask.contains(ResourceMask::MESHES)) {
            let count = add_resources(folder, &self.meshes, None, load_mesh)?;
            log::debug!("{file}: {count} meshes");
        }
        if let Some(folder) = shapes.filter(|_| mask.contains(ResourceMask::SHAPES)) {
            let count = add_resources(folder, &self.shapes, None, load_shape)?;
            log::debug!("{file}: {count} shapes");
        }
        Ok(())
    }

    /// Fetches a container and loads the libraries selected by `mask`.
    pub async fn get_resources(&self, path: &str, mask: ResourceMask) -> anyhow::Result<()> {
        let reader = self.loader.load_utf(path, 1.0).await?;
        self.load_libraries(&reader, mask).with_context(|| format!("loading libraries of {path}"))?;
        Ok(())
    }

    async fn load_model(&self, path: &str) -> anyhow::Result<RigidModel> {
        let reader = self.loader.load_utf(path, 1.0).await?;
        let mask = ResourceMask::TEXTURES | ResourceMask::MATERIALS | ResourceMask::MESHES;
        self.load_libraries(&reader, mask)
            .with_context(|| format!("loading libraries of {path}"))?;
        let model = load_rigid_model(&reader).with_context(|| format!("building model {path}"))?;
        Ok(model)
    }

    /// Model stored at `path`, loaded at most once.
    ///
    /// The pending load is registered before this returns, so every request
    /// for the same path made before it resolves joins the same load and
    /// receives the same model or the same error. A failed load is evicted
    /// so a later request retries.
    pub fn get_model(self: &Rc<Self>, path: &str) -> ModelFuture {
        let id = ResourceId::from(path);

        match self.models.borrow().get(&id) {
            Some(ModelSlot::Pending(pending)) => return pending.clone(),
            Some(ModelSlot::Ready(model)) => {
                let ready: ModelResult = Ok(model.clone());
                return futures::future::ready(ready).boxed_local().shared();
            }
            None => {}
        }

        let this: Weak<Self> = Rc::downgrade(self);
        let path = path.to_string();
        let pending = async move {
            let Some(resources) = this.upgrade() else {
                let error = anyhow::anyhow!("resource library dropped while loading {path}");
                return Err(ModelError::new(error));
            };
            match resources.load_model(&path).await {
                Ok(model) => {
                    let model = Rc::new(model);
                    resources.models.borrow_mut().insert(id, ModelSlot::Ready(model.clone()));
                    Ok(model)
                }
                Err(error) => {
                    log::warn!("evicting failed model {path}: {error:#}");
                    resources.models.borrow_mut().remove(&id);
                    Err(ModelError::new(error))
                }
            }
        }
        .boxed_local()
        .shared();

        self.models.borrow_mut().insert(id, ModelSlot::Pending(pending.clone()));
        pending
    }

    /// Model at `path` if it has finished loading.
    pub fn cached_model(&self, path: &str) -> Option<Rc<RigidModel>> {
        match self.models.borrow().get(&ResourceId::from(path)) {
            Some(ModelSlot::Ready(model)) => Some(model.clone()),
            _ => None,
        }
    }
}
