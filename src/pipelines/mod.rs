//! Render pipelines and built-in shader programs.
//!
//! A program is a WGSL vertex and fragment source pair registered in the
//! resource library under a shader name; materials select one by name.
//! `basic` builds a pipeline per program and render state.

pub mod basic;

use crate::resources::Resources;
use crate::resources::material::{DEFAULT_SHADER, GLASS_SHADER};
use crate::resources::shader::Shader;

/// Uniforms, bindings, the vertex stage and shared lighting.
pub const COMMON_WGSL: &str = include_str!("common.wgsl");

pub const STANDARD_WGSL: &str = concat!(include_str!("common.wgsl"), include_str!("standard.wgsl"));

pub const GLASS_WGSL: &str = concat!(include_str!("common.wgsl"), include_str!("glass.wgsl"));

/// Registers the shaders materials name by default.
pub fn register_builtin_shaders(resources: &Resources) {
    resources.add_shader(DEFAULT_SHADER, Shader::new(STANDARD_WGSL, STANDARD_WGSL));
    resources.add_shader(GLASS_SHADER, Shader::new(GLASS_WGSL, GLASS_WGSL));
}
