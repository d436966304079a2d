use cgmath::{Matrix4, SquareMatrix, Vector3, Vector4};
use glancer::data_structures::compound::CompoundModel;
use glancer::data_structures::constraint::Constraint;
use glancer::data_structures::hardpoint::{HardpointKind, HardpointMotion};
use glancer::data_structures::rigid::{PartMesh, RigidModel, RigidPart, load_rigid_model};
use glancer::error::Error;
use glancer::utf::UtfReader;

use crate::common::test_utils::{
    Axis, IDENTITY3, Node, Reference, build_utf, cylindric_constraint, file, fixed_constraint,
    floats, folder, loose_constraint, mesh_part, prismatic_constraint, revolute_constraint,
    spherical_constraint, text, words,
};

mod common;

fn reference(mesh: &'static str, radius: f32) -> Reference {
    Reference {
        mesh,
        vertex_start: 0,
        vertex_count: 3,
        index_start: 0,
        index_count: 3,
        group_start: 0,
        group_count: 1,
        radius,
    }
}

fn part_entry(entry: &str, name: &str, index: u32, fragment: &str) -> Node {
    folder(
        entry,
        vec![
            file("Object name", text(name)),
            file("Index", words(&[index])),
            file("File name", text(fragment)),
        ],
    )
}

fn hardpoint(name: &str, position: [f32; 3]) -> Node {
    folder(
        "Hardpoints",
        vec![folder(
            "Fixed",
            vec![folder(
                name,
                vec![file("Position", floats(&position)), file("Orientation", floats(&IDENTITY3))],
            )],
        )],
    )
}

/// Hull at the root with a wing fixed at (1, 2, 3).
fn ship(root_name: &str) -> Vec<u8> {
    build_utf(vec![
        folder(
            "Cmpnd",
            vec![
                part_entry("Root", root_name, 0, "hull.3db"),
                part_entry("Part_wing", "Wing", 1, "wing.3db"),
                folder(
                    "Cons",
                    vec![file("Fix", fixed_constraint(root_name, "Wing", [1.0, 2.0, 3.0]))],
                ),
            ],
        ),
        folder(
            "hull.3db",
            vec![
                mesh_part(reference("ship.lod0.vms", 10.0)),
                hardpoint("HpMount", [0.0, 0.0, 5.0]),
            ],
        ),
        folder(
            "wing.3db",
            vec![
                mesh_part(reference("ship.lod0.vms", 2.0)),
                hardpoint("HpWingtip", [0.0, 1.0, 0.0]),
            ],
        ),
    ])
}

fn load(bytes: &[u8]) -> glancer::Result<RigidModel> {
    load_rigid_model(&UtfReader::from_bytes(bytes)?)
}

#[test]
fn fixed_constraint_places_child_part() {
    let RigidModel::Compound(model) = load(&ship("Root")).unwrap() else {
        panic!("expected a compound model");
    };

    let root = model.root();
    let wing = model.part_index("Wing").unwrap();
    assert_eq!(model.len(), 2);
    assert_eq!(model.parent(wing), Some(root));
    assert_eq!(model.indexed(1), Some(wing));

    let transform = model.part_transform(wing);
    assert_eq!(transform.w, Vector4::new(1.0, 2.0, 3.0, 1.0));
    assert_eq!(transform.x, Vector4::unit_x());
    assert_eq!(transform.y, Vector4::unit_y());
    assert_eq!(transform.z, Vector4::unit_z());
    assert_eq!(model.part_transform(root), Matrix4::identity());
}

#[test]
fn hardpoints_follow_their_part() {
    let model = load(&ship("Root")).unwrap();

    let mount = model.hardpoint_transform("HpMount").unwrap();
    assert_eq!(mount.w, Vector4::new(0.0, 0.0, 5.0, 1.0));

    let wingtip = model.hardpoint_transform("HpWingtip").unwrap();
    assert_eq!(wingtip.w, Vector4::new(1.0, 3.0, 3.0, 1.0));

    assert!(model.hardpoint_transform("HpMissing").is_none());
}

#[test]
fn radius_encloses_placed_parts() {
    let model = load(&ship("Root")).unwrap();
    let wing_reach = 14.0f32.sqrt() + 2.0;
    assert_eq!(model.radius(), 10.0f32.max(wing_reach));
    assert_eq!(model.meshes(0.0).count(), 2);
}

#[test]
fn missing_root_is_a_structure_error() {
    let error = load(&ship("Hull")).unwrap_err();
    assert!(matches!(error, Error::Structure(_)), "{error:?}");
}

#[test]
fn missing_fragment_is_a_structure_error() {
    let bytes = build_utf(vec![folder(
        "Cmpnd",
        vec![part_entry("Root", "Root", 0, "gone.3db")],
    )]);
    assert!(matches!(load(&bytes), Err(Error::Structure(_))));
}

#[test]
fn sphere_models_are_unsupported() {
    let bytes = build_utf(vec![folder("Sphere", vec![file("Radius", floats(&[1.0]))])]);
    assert!(matches!(load(&bytes), Err(Error::Unsupported(_))));
}

#[test]
fn containers_without_compound_are_simple() {
    let bytes = build_utf(vec![mesh_part(reference("rock.lod0.vms", 4.0))]);
    let model = load(&bytes).unwrap();

    assert!(matches!(model, RigidModel::Simple(_)));
    assert_eq!(model.parts().count(), 1);
    assert_eq!(model.part_transform(0), Matrix4::identity());
    assert_eq!(model.radius(), 4.0);
}

fn level(name: &str, radius: f32) -> Node {
    folder(name, vec![mesh_part(reference("rock.lod0.vms", radius))])
}

#[test]
fn switch_distances_pick_the_level() {
    let bytes = build_utf(vec![folder(
        "MultiLevel",
        vec![
            level("Level0", 1.0),
            level("Level1", 2.0),
            file("Switch2", floats(&[0.0, 100.0, 1000.0])),
        ],
    )]);
    let model = load(&bytes).unwrap();
    let (_, part) = model.parts().next().unwrap();

    assert!(matches!(part.mesh, PartMesh::Levels(_)));
    assert_eq!(part.level_count(), 2);
    assert_eq!(part.lod_reference(50.0).unwrap().sphere.radius, 1.0);
    assert_eq!(part.lod_reference(500.0).unwrap().sphere.radius, 2.0);
    assert_eq!(part.lod_reference(5000.0).unwrap().sphere.radius, 2.0);
}

#[test]
fn gaps_between_levels_are_range_errors() {
    let bytes = build_utf(vec![folder(
        "MultiLevel",
        vec![level("Level0", 1.0), level("Level2", 2.0)],
    )]);
    assert!(matches!(load(&bytes), Err(Error::Range(_))));
}

#[test]
fn root_part_name_is_case_sensitive() {
    for name in ["root", "ROOT"] {
        let error = load(&ship(name)).unwrap_err();
        assert!(matches!(error, Error::Structure(_)), "{name}: {error:?}");
    }
}

/// Rotation of a quarter turn about Z, stored row by row.
const QUARTER_TURN_Z: [f32; 9] = [0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0];

/// Root on the hull fragment, every other part on a fragment without hardpoints.
fn assembly(parts: &[&str], cons: Vec<Node>) -> CompoundModel<RigidPart> {
    let mut compound = vec![part_entry("Root", "Root", 0, "hull.3db")];
    for (index, name) in parts.iter().enumerate() {
        compound.push(part_entry(&format!("Part_{name}"), name, index as u32 + 1, "plain.3db"));
    }
    compound.push(folder("Cons", cons));

    let bytes = build_utf(vec![
        folder("Cmpnd", compound),
        folder("hull.3db", vec![mesh_part(reference("ship.lod0.vms", 10.0))]),
        folder("plain.3db", vec![mesh_part(reference("ship.lod0.vms", 1.0))]),
    ]);
    match load(&bytes).unwrap() {
        RigidModel::Compound(model) => model,
        RigidModel::Simple(_) => panic!("expected a compound model"),
    }
}

#[test]
fn revolute_offset_turns_with_the_part() {
    let hinge = Axis {
        position: [0.0, 1.0, 0.0],
        offset: [2.0, 0.0, 0.0],
        rotation: QUARTER_TURN_Z,
        axis: [0.0, 0.0, 1.0],
        min: -0.5,
        max: 1.5,
    };
    let model = assembly(
        &["Arm", "Claw"],
        vec![
            file("Fix", fixed_constraint("Root", "Arm", [1.0, 2.0, 3.0])),
            file("Rev", revolute_constraint("Arm", "Claw", &hinge)),
        ],
    );
    let arm = model.part_index("Arm").unwrap();
    let claw = model.part_index("Claw").unwrap();
    assert_eq!(model.parent(claw), Some(arm));

    let Some(Constraint::Revolute(limits)) = model.constraint(claw) else {
        panic!("expected a revolute constraint");
    };
    assert_eq!(limits.axis, Vector3::unit_z());
    assert_eq!(limits.offset, Vector3::new(2.0, 0.0, 0.0));
    assert_eq!((limits.min, limits.max), (-0.5, 1.5));

    // The offset is rotated by the hinge before the arm moves it.
    let (transform, fixed) = model.stack_transforms(claw);
    assert!(!fixed);
    assert_eq!(transform.w, Vector4::new(1.0, 5.0, 3.0, 1.0));
    assert_eq!(transform.x, Vector4::new(0.0, 1.0, 0.0, 0.0));
    assert_eq!(transform.y, Vector4::new(-1.0, 0.0, 0.0, 0.0));
    assert_eq!(model.part_transform(claw), transform);

    assert!(model.stack_transforms(arm).1);
}

#[test]
fn every_constraint_kind_reads_its_record() {
    let hinge = Axis {
        position: [0.0; 3],
        offset: [0.0; 3],
        rotation: IDENTITY3,
        axis: [1.0, 0.0, 0.0],
        min: -1.0,
        max: 1.0,
    };
    let flap = Axis { min: 0.0, max: 0.25, ..hinge };
    let slide = Axis {
        position: [0.0, 0.0, 1.0],
        offset: [0.0, 2.0, 0.0],
        axis: [0.0, 1.0, 0.0],
        min: 0.0,
        max: 4.0,
        ..hinge
    };
    let piston = [0.1, 0.2, 0.3, 0.4];
    let ball = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    let mut revolute = revolute_constraint("Root", "Hinge", &hinge);
    revolute.extend(revolute_constraint("Root", "Flap", &flap));
    // A trailing partial record is not read.
    revolute.extend([0; 16]);

    let model = assembly(
        &["Hinge", "Flap", "Slide", "Piston", "Ball", "Debris"],
        vec![
            file("Rev", revolute),
            file("Pris", prismatic_constraint("Root", "Slide", &slide)),
            file("Cyl", cylindric_constraint("Root", "Piston", [1.0, 0.0, 0.0], piston)),
            file("Sphere", spherical_constraint("Root", "Ball", [0.0, 0.0, 3.0], ball)),
            file("Loose", loose_constraint("Root", "Debris", [7.0, 8.0, 9.0])),
        ],
    );
    let constraint = |name: &str| *model.constraint(model.part_index(name).unwrap()).unwrap();
    let translation = |name: &str| model.part_transform(model.part_index(name).unwrap()).w;

    let limits = |name: &str| match constraint(name) {
        Constraint::Revolute(limits) => Some((limits.min, limits.max)),
        _ => None,
    };
    assert_eq!(limits("Hinge"), Some((-1.0, 1.0)));
    assert_eq!(limits("Flap"), Some((0.0, 0.25)));

    let Constraint::Prismatic(limits) = constraint("Slide") else {
        panic!("expected a prismatic constraint");
    };
    assert_eq!(limits.axis, Vector3::unit_y());
    assert_eq!((limits.min, limits.max), (0.0, 4.0));
    assert_eq!(translation("Slide"), Vector4::new(0.0, 2.0, 1.0, 1.0));

    let Constraint::Cylindric { axis, min, max, .. } = constraint("Piston") else {
        panic!("expected a cylindric constraint");
    };
    assert_eq!(axis, Vector3::unit_x());
    assert_eq!(min, [0.1, 0.3]);
    assert_eq!(max, [0.2, 0.4]);

    let Constraint::Spherical { offset, min, max, .. } = constraint("Ball") else {
        panic!("expected a spherical constraint");
    };
    assert_eq!(offset, Vector3::new(0.0, 0.0, 3.0));
    assert_eq!(min, [1.0, 3.0, 5.0]);
    assert_eq!(max, [2.0, 4.0, 6.0]);
    assert_eq!(translation("Ball"), Vector4::new(0.0, 0.0, 3.0, 1.0));

    assert!(matches!(constraint("Debris"), Constraint::Loose { .. }));
    assert_eq!(translation("Debris"), Vector4::new(7.0, 8.0, 9.0, 1.0));

    for name in ["Hinge", "Flap", "Slide", "Piston", "Ball", "Debris"] {
        assert!(!model.stack_transforms(model.part_index(name).unwrap()).1, "{name}");
    }
}

fn moving_hardpoint(name: &str, axis: [f32; 3], limits: Option<[f32; 2]>) -> Node {
    let mut fields = vec![
        file("Position", floats(&[0.0, 0.0, 2.0])),
        file("Orientation", floats(&IDENTITY3)),
        file("Axis", floats(&axis)),
    ];
    if let Some([min, max]) = limits {
        fields.push(file("Min", floats(&[min])));
        fields.push(file("Max", floats(&[max])));
    }
    folder(name, fields)
}

#[test]
fn moving_hardpoints_keep_axis_and_limits() {
    let (turret, rail) = (Some([-1.5, 1.5]), Some([0.0, 6.0]));
    let bytes = build_utf(vec![
        mesh_part(reference("rock.lod0.vms", 4.0)),
        folder(
            "Hardpoints",
            vec![
                folder("Revolute", vec![moving_hardpoint("HpTurret", [0.0, 1.0, 0.0], turret)]),
                folder("Prismatic", vec![moving_hardpoint("HpRail", [0.0, 0.0, 1.0], rail)]),
            ],
        ),
    ]);
    let RigidModel::Simple(model) = load(&bytes).unwrap() else {
        panic!("expected a simple model");
    };

    let turret = model.hardpoint("HpTurret").unwrap();
    assert_eq!(turret.kind, HardpointKind::Revolute);
    assert_eq!(
        turret.motion,
        Some(HardpointMotion {
            axis: Vector3::unit_y(),
            min: -1.5,
            max: 1.5,
        })
    );
    assert_eq!(turret.transform.w, Vector4::new(0.0, 0.0, 2.0, 1.0));

    let rail = model.hardpoint("HpRail").unwrap();
    assert_eq!(rail.kind, HardpointKind::Prismatic);
    assert_eq!(rail.motion.map(|m| (m.axis, m.min, m.max)), Some((Vector3::unit_z(), 0.0, 6.0)));
}

#[test]
fn moving_hardpoint_without_limits_is_a_structure_error() {
    let bytes = build_utf(vec![
        mesh_part(reference("rock.lod0.vms", 4.0)),
        folder(
            "Hardpoints",
            vec![folder("Revolute", vec![moving_hardpoint("HpTurret", [0.0, 1.0, 0.0], None)])],
        ),
    ]);
    assert!(matches!(load(&bytes), Err(Error::Structure(_))));
}
