//! Shader sources stored in `shader library` folders.

use crate::error::{Error, Result};
use crate::utf::Entry;

/// Vertex and fragment source of one program.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Shader {
    pub vertex: String,
    pub fragment: String,
    pub version: f32,
}

impl Shader {
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
            version: 0.0,
        }
    }
}

pub fn load_shader(folder: Entry<'_>) -> Result<Option<Shader>> {
    if !folder.has_child() {
        return Ok(None);
    }

    let [vertex, fragment, version] = folder.find(["vertexshader", "fragmentshader", "version"])?;
    let (Some(vertex), Some(fragment)) = (vertex, fragment) else {
        return Err(Error::structure(format!(
            "shader {} needs both vertex and fragment sources",
            folder.name()
        )));
    };

    Ok(Some(Shader {
        vertex: vertex.data()?.read_string(0)?,
        fragment: fragment.data()?.read_string(0)?,
        version: match version {
            Some(version) => version.data()?.read_f32()?,
            None => 0.0,
        },
    }))
}
