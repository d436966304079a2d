use std::rc::Rc;

use futures::executor::block_on;
use futures::future::join;
use glancer::error::Error;
use glancer::resources::ResourceMask;
use glancer::resources::hash::flcrc32;
use glancer::resources::mesh::{BoundingBox, BoundingSphere, VMeshRef};
use glancer::utf::UtfReader;

use crate::common::test_utils::{
    MemoryProvider, build_utf, file, folder, mesh_part, resources, ship_libraries, ship_model,
    ship_reference, text,
};

mod common;

fn simple_model() -> Vec<u8> {
    ship_model(3.0, ship_libraries([1.0, 0.0, 0.0]))
}

/// Compound folder without a root part.
fn rootless_model() -> Vec<u8> {
    let wing = folder(
        "Part_wing",
        vec![file("Object name", text("Wing")), file("File name", text("wing.3db"))],
    );
    build_utf(vec![
        folder("Cmpnd", vec![wing]),
        folder("wing.3db", vec![mesh_part(ship_reference(1.0))]),
    ])
}

#[test]
fn concurrent_requests_share_one_load() {
    let provider = Rc::new(MemoryProvider::new().with_file("ship.cmp", simple_model()));
    let resources = resources(&provider);

    let (a, b) = block_on(join(resources.get_model("ship.cmp"), resources.get_model("SHIP.cmp")));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(Rc::ptr_eq(&a, &b));
    assert_eq!(provider.fetches("ship.cmp"), 1);

    let again = block_on(resources.get_model("ship.cmp")).unwrap();
    assert!(Rc::ptr_eq(&a, &again));
    assert!(resources.cached_model("ship.cmp").is_some_and(|cached| Rc::ptr_eq(&a, &cached)));
    assert_eq!(provider.fetches("ship.cmp"), 1);
    assert_eq!(a.radius(), 3.0);
}

#[test]
fn failures_are_shared_then_evicted() {
    let provider = Rc::new(MemoryProvider::new());
    let resources = resources(&provider);

    let (a, b) = block_on(join(resources.get_model("gone.cmp"), resources.get_model("gone.cmp")));
    let (a, b) = (a.unwrap_err(), b.unwrap_err());
    assert!(a.ptr_eq(&b));
    assert!(a.parse_error().is_none());
    assert_eq!(provider.fetches("gone.cmp"), 1);
    assert!(resources.cached_model("gone.cmp").is_none());

    assert!(block_on(resources.get_model("gone.cmp")).is_err());
    assert_eq!(provider.fetches("gone.cmp"), 2);
}

#[test]
fn parse_failures_keep_their_kind() {
    let provider = Rc::new(MemoryProvider::new().with_file("broken.cmp", rootless_model()));
    let resources = resources(&provider);

    let error = block_on(resources.get_model("broken.cmp")).unwrap_err();
    assert!(matches!(error.parse_error(), Some(Error::Structure(_))), "{error}");
}

#[test]
fn models_load_their_libraries() {
    let provider = Rc::new(MemoryProvider::new().with_file("ship.cmp", simple_model()));
    let resources = resources(&provider);

    let placeholder = resources.get_material("hull");
    assert!(resources.is_placeholder_material(&placeholder));

    block_on(resources.get_model("ship.cmp")).unwrap();

    let hull = resources.get_material("HULL");
    assert!(!resources.is_placeholder_material(&hull));
    assert_eq!(hull.diffuse_color, [1.0, 0.0, 0.0]);
    assert_eq!(hull.diffuse_texture, Some("hull.dds".into()));
    assert_eq!(hull.diffuse_flags, 64);

    let texture = resources.get_texture("hull.dds");
    assert!(!resources.is_placeholder_texture(&texture));
    assert_eq!((texture.width, texture.height), (2, 1));
    assert_eq!(texture.mipmaps[0], vec![255, 0, 0, 0, 0, 255]);

    assert_eq!(resources.get_mesh(flcrc32("ship.lod0.vms")).unwrap().indices.len(), 6);
}

#[test]
fn unknown_names_share_the_placeholder() {
    let provider = Rc::new(MemoryProvider::new());
    let resources = resources(&provider);

    let a = resources.get_texture("missing.dds");
    let b = resources.get_texture("other.dds");
    assert!(Rc::ptr_eq(&a, &b));
    assert!(resources.is_placeholder_texture(&a));
    assert_eq!((a.width, a.height), (1, 1));
    assert!(resources.get_mesh("missing.vms").is_none());
    assert!(resources.get_shader("missing").is_none());
}

#[test]
fn first_loaded_resource_wins() {
    let provider = Rc::new(MemoryProvider::new());
    let resources = resources(&provider);

    let red = UtfReader::from_bytes(&build_utf(ship_libraries([1.0, 0.0, 0.0]))).unwrap();
    let blue = UtfReader::from_bytes(&build_utf(ship_libraries([0.0, 0.0, 1.0]))).unwrap();
    resources.load_libraries(&red, ResourceMask::ALL).unwrap();
    resources.load_libraries(&blue, ResourceMask::ALL).unwrap();

    assert_eq!(resources.get_material("hull").diffuse_color, [1.0, 0.0, 0.0]);
}

#[test]
fn mask_selects_libraries() {
    let provider = Rc::new(MemoryProvider::new());
    let resources = resources(&provider);

    let reader = UtfReader::from_bytes(&build_utf(ship_libraries([1.0, 0.0, 0.0]))).unwrap();
    resources.load_libraries(&reader, ResourceMask::TEXTURES).unwrap();

    assert!(!resources.is_placeholder_texture(&resources.get_texture("hull.dds")));
    assert!(resources.is_placeholder_material(&resources.get_material("hull")));
    assert!(resources.get_mesh("ship.lod0.vms").is_none());
}

#[test]
fn get_resources_fetches_a_library_file() {
    let library = build_utf(ship_libraries([0.0, 1.0, 0.0]));
    let provider = Rc::new(MemoryProvider::new().with_file("ships.mat", library));
    let resources = resources(&provider);

    block_on(resources.get_resources("ships.mat", ResourceMask::MATERIALS)).unwrap();
    assert_eq!(resources.get_material("hull").diffuse_color, [0.0, 1.0, 0.0]);
    assert!(block_on(resources.get_resources("nothing.mat", ResourceMask::ALL)).is_err());
}

fn reference(group_start: u16, index_start: u16, vertex_start: u16) -> VMeshRef {
    VMeshRef {
        mesh_id: flcrc32("ship.lod0.vms"),
        vertex_start,
        vertex_count: 3,
        index_start,
        index_count: 3,
        group_start,
        group_count: 1,
        bounding_box: BoundingBox::default(),
        sphere: BoundingSphere::default(),
    }
}

#[test]
fn mesh_references_slice_the_mesh() {
    let provider = Rc::new(MemoryProvider::new());
    let resources = resources(&provider);
    let reader = UtfReader::from_bytes(&build_utf(ship_libraries([1.0, 0.0, 0.0]))).unwrap();
    resources.load_libraries(&reader, ResourceMask::MESHES).unwrap();

    let part = resources.get_mesh_by_reference(&reference(1, 3, 3)).unwrap().unwrap();
    assert_eq!(part.groups.len(), 1);
    assert_eq!(part.groups[0].vertex_start, 3);
    assert_eq!(part.indices, vec![0, 1, 2]);
    assert_eq!(part.vertex_count(), 3);
    assert_eq!(part.vertex(0).unwrap().position, [0.0, 0.0, 1.0]);

    let mut outside = reference(1, 3, 3);
    outside.group_count = 4;
    assert!(matches!(resources.get_mesh_by_reference(&outside), Err(Error::Range(_))));

    let mut unknown = reference(0, 0, 0);
    unknown.mesh_id = flcrc32("other.vms");
    assert!(resources.get_mesh_by_reference(&unknown).unwrap().is_none());
}
