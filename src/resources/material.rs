//! Materials.
//!
//! A material names its shading model in a `type` entry, but a handful of
//! name patterns override the type outright. At most two textures are used
//! at once (diffuse and emission, or a single detail/nomad map).

use crate::error::{Error, Result};
use crate::resources::hash::ResourceId;
use crate::utf::Entry;

pub const DEFAULT_SHADER: &str = "standard-vertex";
pub const GLASS_SHADER: &str = "glass";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MaterialKind {
    #[default]
    Null,
    SinglePass,
    Detail,
    Nebula,
    Nomad,
    Glass,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub kind: MaterialKind,
    /// Shading type after replacements, such as `DcDtOcOt`.
    pub type_name: Option<String>,
    pub shader: String,
    pub two_sided: bool,
    pub alpha: bool,
    pub diffuse_color: [f32; 3],
    pub opacity: f32,
    pub diffuse_texture: Option<ResourceId>,
    pub diffuse_flags: u32,
    pub emission_color: Option<[f32; 3]>,
    pub emission_texture: Option<ResourceId>,
    pub emission_flags: u32,
    pub detail_texture: Option<ResourceId>,
    pub detail_flags: u32,
    pub nomad_texture: Option<ResourceId>,
    pub nomad_flags: u32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            kind: MaterialKind::Null,
            type_name: None,
            shader: DEFAULT_SHADER.to_string(),
            two_sided: false,
            alpha: false,
            diffuse_color: [1.0; 3],
            opacity: 1.0,
            diffuse_texture: None,
            diffuse_flags: 0,
            emission_color: None,
            emission_texture: None,
            emission_flags: 0,
            detail_texture: None,
            detail_flags: 0,
            nomad_texture: None,
            nomad_flags: 0,
        }
    }
}

impl Material {
    /// Material handed out for names the library does not hold yet.
    pub fn placeholder() -> Self {
        Self {
            diffuse_texture: Some(ResourceId::from("null")),
            ..Self::default()
        }
    }

    pub fn is_nebula(&self) -> bool {
        self.kind == MaterialKind::Nebula
    }

    fn has_type(&self, channel: &str) -> bool {
        self.type_name.as_deref().is_some_and(|t| t.contains(channel))
    }
}

/// Material kind forced by the material name, plus whether it is two-sided.
fn pattern_override(tag: &str) -> Option<(MaterialKind, bool)> {
    const GLASS: [&str; 7] = [
        "c_glass", "cv_glass", "b_glass", "k_glass", "l_glass", "r_glass", "bw_glass",
    ];

    if let Some(rest) = tag.strip_prefix("alpha_mask") {
        return Some((MaterialKind::SinglePass, rest.contains("2side")));
    }
    if tag.starts_with("detailmap_") {
        return Some((MaterialKind::Detail, false));
    }
    if tag == "tlr_material" || tag == "tlr_energy" {
        return Some((MaterialKind::Nebula, true));
    }
    if tag.starts_with("nomad") || tag.starts_with("n-texture") {
        return Some((MaterialKind::Nomad, false));
    }
    if tag.starts_with("exclusion_") {
        return Some((MaterialKind::SinglePass, false));
    }
    let planet_glass = tag.starts_with("planet") && tag.ends_with("_glass");
    if GLASS.contains(&tag) || tag == "o_glass" || planet_glass {
        return Some((MaterialKind::Glass, false));
    }
    None
}

fn replace_type(type_name: &str) -> &str {
    match type_name {
        "EcEtOcOt" => "DcDtOcOt",
        "DcDtEcEt" => "DcDtEt",
        other => other,
    }
}

/// Material kind for a `type` value, plus two-sidedness and alpha.
fn kind_of_type(type_name: &str) -> (MaterialKind, bool, bool) {
    match type_name {
        "DcDtTwo" | "DcDtEcTwo" | "DcDtOcOtTwo" | "DcDtEcOcOtTwo" => {
            (MaterialKind::SinglePass, true, false)
        }
        "EcEt" | "DcDt" | "DcDtEc" | "DcDtEt" | "DcDtEcEt" | "DcDtOcOt" | "DcDtEcOcOt" => {
            (MaterialKind::SinglePass, false, false)
        }
        "BtDetailMapMaterial" => (MaterialKind::Detail, false, false),
        "NebulaTwo" => (MaterialKind::Nebula, true, true),
        "Nebula" => (MaterialKind::Nebula, false, true),
        "NomadMaterial" => (MaterialKind::Nomad, false, true),
        _ => (MaterialKind::Null, false, false),
    }
}

fn read_color(entry: Option<Entry<'_>>) -> Result<Option<[f32; 3]>> {
    entry.map(|e| e.data()?.read_vec3()).transpose()
}

fn read_f32(entry: Option<Entry<'_>>) -> Result<Option<f32>> {
    entry.map(|e| e.data()?.read_f32()).transpose()
}

fn read_flags(entry: Option<Entry<'_>>) -> Result<u32> {
    Ok(entry.map(|e| e.data()?.read_u32()).transpose()?.unwrap_or(0))
}

fn read_texture(entry: Option<Entry<'_>>) -> Result<Option<ResourceId>> {
    entry
        .map(|e| Ok(ResourceId::from(e.data()?.read_string(0)?.as_str())))
        .transpose()
}

fn load_single_pass(material: &mut Material, folder: Entry<'_>) -> Result<()> {
    let [dc, dt_name, dt_flags, oc, ec, et_name, et_flags] =
        folder.find(["dc", "dt_name", "dt_flags", "oc", "ec", "et_name", "et_flags"])?;

    if material.has_type("Dc") {
        if let Some(color) = read_color(dc)? {
            material.diffuse_color = color;
        }
    }
    if material.has_type("Dt") && dt_name.is_some() {
        material.diffuse_texture = read_texture(dt_name)?;
        material.diffuse_flags = read_flags(dt_flags)?;
    }
    if material.has_type("Oc") {
        if let Some(opacity) = read_f32(oc)? {
            material.alpha = true;
            material.opacity = opacity;
        }
    }
    if material.has_type("Ec") {
        material.emission_color = read_color(ec)?;
    }
    if material.has_type("Et") && et_name.is_some() {
        material.emission_texture = read_texture(et_name)?;
        material.emission_flags = read_flags(et_flags)?;
    }
    Ok(())
}

fn load_nebula(material: &mut Material, folder: Entry<'_>) -> Result<()> {
    let [dc, dt_name, dt_flags, oc, ec] = folder.find(["dc", "dt_name", "dt_flags", "oc", "ec"])?;

    if let Some(color) = read_color(dc)? {
        material.diffuse_color = color;
    }
    if dt_name.is_some() {
        material.diffuse_texture = read_texture(dt_name)?;
        material.diffuse_flags = read_flags(dt_flags)?;
    }
    if let Some(opacity) = read_f32(oc)? {
        material.alpha = true;
        material.opacity = opacity;
    }
    material.emission_color = read_color(ec)?;
    Ok(())
}

fn load_glass(material: &mut Material, folder: Entry<'_>) -> Result<()> {
    let [dc, oc] = folder.find(["dc", "oc"])?;
    if let Some(color) = read_color(dc)? {
        material.diffuse_color = color;
    }
    if let Some(opacity) = read_f32(oc)? {
        material.opacity = opacity;
    }
    Ok(())
}

/// Decodes one material library entry, `None` when it is not a material.
pub fn load_material(folder: Entry<'_>) -> Result<Option<Material>> {
    if !folder.has_child() {
        return Ok(None);
    }

    let tag = folder.tag();
    let type_entry = folder.find_one("type")?;
    let type_name = match type_entry {
        Some(entry) => Some(replace_type(&entry.data()?.read_string(0)?).to_string()),
        None => None,
    };

    let mut material = Material::default();
    match pattern_override(&tag) {
        Some((kind, two_sided)) => {
            material.kind = kind;
            material.two_sided = two_sided;
            // Pattern overrides of the single pass kind shade as DcDt unless typed.
            material.type_name = type_name
                .or_else(|| (kind == MaterialKind::SinglePass).then(|| "DcDt".to_string()));
            if kind == MaterialKind::Nebula || kind == MaterialKind::Nomad {
                material.alpha = true;
            }
        }
        None => {
            let Some(type_name) = type_name else {
                return Ok(None);
            };
            let (kind, two_sided, alpha) = kind_of_type(&type_name);
            material.kind = kind;
            material.two_sided = two_sided;
            material.alpha = alpha;
            material.type_name = Some(type_name);
        }
    }

    match material.kind {
        MaterialKind::Null => {}
        MaterialKind::SinglePass => load_single_pass(&mut material, folder)?,
        MaterialKind::Nebula => load_nebula(&mut material, folder)?,
        MaterialKind::Glass => {
            material.alpha = true;
            material.shader = GLASS_SHADER.to_string();
            load_glass(&mut material, folder)?;
        }
        MaterialKind::Detail => {
            let [bt_name, bt_flags] = folder.find(["bt_name", "bt_flags"])?;
            if bt_name.is_none() {
                return Err(Error::structure(format!("detail material {tag} is missing bt_name")));
            }
            material.detail_texture = read_texture(bt_name)?;
            material.detail_flags = read_flags(bt_flags)?;
        }
        MaterialKind::Nomad => {
            let [nt_name, nt_flags] = folder.find(["nt_name", "nt_flags"])?;
            if nt_name.is_none() {
                return Err(Error::structure(format!("nomad material {tag} is missing nt_name")));
            }
            material.nomad_texture = read_texture(nt_name)?;
            material.nomad_flags = read_flags(nt_flags)?;
        }
    }

    Ok(Some(material))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_patterns_override_type() {
        assert_eq!(
            pattern_override("alpha_mask_hull2side"),
            Some((MaterialKind::SinglePass, true))
        );
        assert_eq!(pattern_override("planet_earth_glass"), Some((MaterialKind::Glass, false)));
        assert_eq!(pattern_override("tlr_energy"), Some((MaterialKind::Nebula, true)));
        assert_eq!(pattern_override("tlr_energy2"), None);
        assert_eq!(pattern_override("li_elite_hull"), None);
    }

    #[test]
    fn type_replacements_and_kinds() {
        assert_eq!(replace_type("EcEtOcOt"), "DcDtOcOt");
        assert_eq!(replace_type("DcDtEcEt"), "DcDtEt");
        assert_eq!(kind_of_type("DcDtOcOtTwo"), (MaterialKind::SinglePass, true, false));
        assert_eq!(kind_of_type("Nebula"), (MaterialKind::Nebula, false, true));
        assert_eq!(kind_of_type("Whatever").0, MaterialKind::Null);
    }
}
