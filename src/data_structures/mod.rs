//! Model and scene data structures.
//!
//! - `compound` holds part trees joined by constraints, with cached transforms
//! - `constraint` decodes the joint records connecting parts
//! - `hardpoint` decodes mount points on parts
//! - `rigid` builds renderable models from a container
//! - `scene_graph` holds scenes, cameras, lights and placed objects
//! - `texture` wraps GPU textures

pub mod compound;
pub mod constraint;
pub mod hardpoint;
pub mod rigid;
pub mod scene_graph;
pub mod texture;
