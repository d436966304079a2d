//! glancer
//!
//! Reads Freelancer UTF containers and draws the models inside them, natively
//! or in the browser. Containers are decoded lazily into a resource library
//! of textures, materials, shaders, meshes and models shared by the whole
//! application; a renderer walks a scene of model instances each frame and
//! issues draws on a WGPU context.
//!
//! High-level modules
//! - `utf`: binary cursor and container reader
//! - `resources`: leaf resource decoders, asset loading and the resource library
//! - `data_structures`: compound models, constraints, hardpoints, scenes and GPU textures
//! - `render`: the renderer and the graphics context it draws on
//! - `context`: the WGPU graphics context
//! - `pipelines`: built-in WGSL programs and render pipelines
//! - `flow`: the frame loop and the window event loop
//! - `config`: renderer and loader settings
//!

pub mod config;
pub mod context;
pub mod data_structures;
pub mod error;
pub mod flow;
pub mod math;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod utf;

// Re-exports commonly used types for convenience in downstream code.
pub use config::{DrawMode, Settings};
pub use error::{Error, ModelError, Result};
pub use render::{GraphicsContext, Renderer};
pub use resources::Resources;
pub use utf::UtfReader;
