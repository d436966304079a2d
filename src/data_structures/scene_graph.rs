//! Scenes and the objects placed in them.
//!
//! A [`Scene`] hands the renderer a camera, lights, rigid objects and the
//! optional backdrop models. [`SpaceScene`] is a star system;
//! [`ShowRoomScene`] spins a single model in front of the camera.

use std::collections::BTreeMap;
use std::rc::Rc;

use cgmath::{Matrix4, One, Quaternion, Rad, Rotation3, Vector3, Zero};
use instant::Duration;

use crate::data_structures::rigid::RigidModel;
use crate::error::{Error, Result};

/// Position and orientation shared by everything placed in a scene.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneObject {
    pub position: Vector3<f32>,
    pub rotation: Quaternion<f32>,
}

impl Default for SceneObject {
    fn default() -> Self {
        Self {
            position: Vector3::zero(),
            rotation: Quaternion::one(),
        }
    }
}

impl SceneObject {
    pub fn rotate(&mut self, rotation: Quaternion<f32>) {
        self.rotation = rotation;
    }

    /// Moves by half of `step` in world space.
    pub fn move_by(&mut self, step: Vector3<f32>) {
        self.position += step * 0.5;
    }

    /// Moves by `step` given in the object's own frame.
    pub fn move_local(&mut self, step: Vector3<f32>) {
        self.position += self.rotation * step;
    }

    pub fn transform(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.position) * Matrix4::from(self.rotation)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LightKind {
    #[default]
    Directional,
    Spot,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightSource {
    pub object: SceneObject,
    pub color: [f32; 3],
    pub range: f32,
    pub kind: LightKind,
}

impl Default for LightSource {
    fn default() -> Self {
        Self {
            object: SceneObject::default(),
            color: [0.0; 3],
            range: 1000.0,
            kind: LightKind::Directional,
        }
    }
}

/// Perspective camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub object: SceneObject,
    /// Vertical field of view.
    pub fov: Rad<f32>,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            object: SceneObject::default(),
            fov: Rad(60f32.to_radians()),
            near: 1.0,
            far: 10000.0,
        }
    }
}

/// Scene object drawn with a rigid model.
#[derive(Clone, Debug)]
pub struct RigidObject {
    pub object: SceneObject,
    pub model: Rc<RigidModel>,
    /// LOD switch distances overriding the parts' own, scaled by the LOD bias.
    pub ranges: Option<Vec<f32>>,
    attachments: BTreeMap<String, Rc<RigidModel>>,
}

impl RigidObject {
    pub fn new(model: Rc<RigidModel>) -> Self {
        Self {
            object: SceneObject::default(),
            model,
            ranges: None,
            attachments: BTreeMap::new(),
        }
    }

    /// Mounts `attachment` on the hardpoint `hardpoint` of this object's model.
    pub fn attach(&mut self, hardpoint: &str, attachment: Rc<RigidModel>) -> Result<()> {
        if self.model.hardpoint(hardpoint).is_none() {
            return Err(Error::structure(format!("model has no hardpoint {hardpoint}")));
        }
        self.attachments.insert(hardpoint.to_string(), attachment);
        Ok(())
    }

    pub fn detach(&mut self, hardpoint: &str) -> Option<Rc<RigidModel>> {
        self.attachments.remove(hardpoint)
    }

    pub fn attachments(&self) -> impl Iterator<Item = (&str, &Rc<RigidModel>)> {
        self.attachments.iter().map(|(name, model)| (name.as_str(), model))
    }

    pub fn update(&mut self, _dt: Duration) {}
}

/// What the renderer needs from a scene each frame.
pub trait Scene {
    /// Clear color.
    fn color(&self) -> [f32; 3];

    fn ambient(&self) -> [f32; 3];

    fn camera(&self) -> Option<&Camera>;

    fn lights(&self) -> Vec<&LightSource>;

    fn objects(&self) -> Vec<&RigidObject>;

    fn stars(&self) -> Option<&RigidModel> {
        None
    }

    fn nebulae(&self) -> Option<&RigidModel> {
        None
    }

    fn update(&mut self, dt: Duration);
}

/// Star system.
#[derive(Debug)]
pub struct SpaceScene {
    pub title: String,
    /// Space color of the system.
    pub color: [f32; 3],
    pub ambient: [f32; 3],
    pub nebulae: Option<Rc<RigidModel>>,
    pub stars: Option<Rc<RigidModel>>,
    pub objects: BTreeMap<String, RigidObject>,
    pub lights: BTreeMap<String, LightSource>,
    pub zones: BTreeMap<String, SceneObject>,
    pub camera: Option<Camera>,
    pub elapsed: Duration,
}

impl SpaceScene {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            color: [0.0; 3],
            ambient: [0.0; 3],
            nebulae: None,
            stars: None,
            objects: BTreeMap::new(),
            lights: BTreeMap::new(),
            zones: BTreeMap::new(),
            camera: Some(Camera::default()),
            elapsed: Duration::ZERO,
        }
    }
}

impl Scene for SpaceScene {
    fn color(&self) -> [f32; 3] {
        self.color
    }

    fn ambient(&self) -> [f32; 3] {
        self.ambient
    }

    fn camera(&self) -> Option<&Camera> {
        self.camera.as_ref()
    }

    fn lights(&self) -> Vec<&LightSource> {
        self.lights.values().collect()
    }

    fn objects(&self) -> Vec<&RigidObject> {
        self.objects.values().collect()
    }

    fn stars(&self) -> Option<&RigidModel> {
        self.stars.as_deref()
    }

    fn nebulae(&self) -> Option<&RigidModel> {
        self.nebulae.as_deref()
    }

    fn update(&mut self, dt: Duration) {
        self.elapsed += dt;
        for object in self.objects.values_mut() {
            object.update(dt);
        }
    }
}

/// One model turning slowly in front of the camera.
#[derive(Debug)]
pub struct ShowRoomScene {
    pub color: [f32; 3],
    pub ambient: [f32; 3],
    pub target: RigidObject,
    pub camera: Camera,
    pub light: LightSource,
    pub elapsed: Duration,
}

impl ShowRoomScene {
    /// Radians per second the subject turns about its Y axis.
    pub const SPIN: f32 = 0.25;

    pub fn new(model: Rc<RigidModel>) -> Self {
        let mut camera = Camera::default();
        camera.object.position.z = -model.radius();

        let light = LightSource {
            object: SceneObject {
                position: Vector3::new(4000.0, 4000.0, 0.0),
                ..SceneObject::default()
            },
            color: [1.0; 3],
            ..LightSource::default()
        };

        Self {
            color: [0.0; 3],
            ambient: [0.125; 3],
            target: RigidObject::new(model),
            camera,
            light,
            elapsed: Duration::ZERO,
        }
    }
}

impl Scene for ShowRoomScene {
    fn color(&self) -> [f32; 3] {
        self.color
    }

    fn ambient(&self) -> [f32; 3] {
        self.ambient
    }

    fn camera(&self) -> Option<&Camera> {
        Some(&self.camera)
    }

    fn lights(&self) -> Vec<&LightSource> {
        vec![&self.light]
    }

    fn objects(&self) -> Vec<&RigidObject> {
        vec![&self.target]
    }

    fn update(&mut self, dt: Duration) {
        self.elapsed += dt;
        let turn = Quaternion::from_angle_y(Rad(Self::SPIN * dt.as_secs_f32()));
        self.target.object.rotation = self.target.object.rotation * turn;
    }
}
