use super::*;

use crate::foundation::core::{FrameSize, InterpolationMode};

fn scratch(name: &str) -> PathBuf {
    let dir = PathBuf::from("target").join("unit_loader").join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write(dir: &Path, json: &str) -> PathBuf {
    let path = dir.join("project.json");
    std::fs::write(&path, json).unwrap();
    path
}

#[test]
fn synthetic_project_loads_with_render_settings() {
    let dir = scratch("synthetic");
    let path = write(
        &dir,
        r#"{
            "version": 2,
            "frames": { "kind": "synthetic", "width": 16, "height": 8, "frames": 48, "fps": 24.0 },
            "nodes": [ { "x": 0.0, "y": 0.0 }, { "x": 10.0, "y": 2.0 } ],
            "render": { "fps": 25.0, "interpolation": "nearest", "size": "small" }
        }"#,
    );
    let (project, warnings) = load_project(&path).unwrap();
    assert!(warnings.is_empty(), "{warnings:?}");
    assert_eq!(project.nodes().len(), 2);
    assert_eq!(project.frames().frame_count(), 48);
    assert!(project.flow_source().is_none());
    assert_eq!(project.render_settings().fps.get(), 25.0);
    assert_eq!(project.render_settings().interpolation, InterpolationMode::Nearest);
    assert_eq!(project.render_settings().size, FrameSize::Small);
}

#[test]
fn missing_render_section_uses_defaults() {
    let dir = scratch("defaults");
    let path = write(
        &dir,
        r#"{
            "frames": { "kind": "synthetic", "width": 4, "height": 4, "frames": 24, "fps": 24.0 },
            "nodes": [ { "x": 0.0, "y": 0.0 }, { "x": 1.0, "y": 1.0 } ]
        }"#,
    );
    let (project, _) = load_project(&path).unwrap();
    assert_eq!(project.render_settings(), &RenderSettings::default());
}

#[test]
fn relative_flow_paths_resolve_against_project_dir() {
    let dir = scratch("flow_paths");
    let file = ProjectFile {
        version: PROJECT_VERSION,
        frames: FrameSourceDef::Synthetic {
            width: 4,
            height: 4,
            frames: 24,
            fps: 24.0,
        },
        nodes: vec![Node::new(0.0, 0.0), Node::new(1.0, 1.0)],
        flow_source: Some(FlowSourceDef::V3d {
            lambda: 5.0,
            builder: None,
            cache_dir: None,
        }),
        render: RenderSettings::default(),
    };
    let (project, _) = file.into_project(&dir).unwrap();
    let flow = project.flow_source().unwrap();
    assert_eq!(flow.name(), "v3d");

    let file = ProjectFile {
        flow_source: Some(FlowSourceDef::Precomputed { dir: "flow".into() }),
        ..ProjectFile {
            version: PROJECT_VERSION,
            frames: FrameSourceDef::Synthetic {
                width: 4,
                height: 4,
                frames: 24,
                fps: 24.0,
            },
            nodes: vec![Node::new(0.0, 0.0), Node::new(1.0, 1.0)],
            flow_source: None,
            render: RenderSettings::default(),
        }
    };
    let (mut project, _) = file.into_project(&dir).unwrap();
    let flow = project.flow_source_mut().unwrap();
    assert_eq!(flow.name(), "precomputed");
    assert!(flow.tunable_lambda().is_none());
}

#[test]
fn warnings_cover_order_version_and_source_overrun() {
    let dir = scratch("warnings");
    let path = write(
        &dir,
        r#"{
            "version": 1,
            "frames": { "kind": "synthetic", "width": 4, "height": 4, "frames": 24, "fps": 24.0 },
            "nodes": [ { "x": 5.0, "y": 3.0 }, { "x": 0.0, "y": 0.0 } ]
        }"#,
    );
    let (project, warnings) = load_project(&path).unwrap();
    assert_eq!(project.nodes().start_time(), 0.0);
    assert_eq!(warnings.len(), 3, "{warnings:?}");
    assert!(warnings.iter().any(|w| w.contains("version 1")));
    assert!(warnings.iter().any(|w| w.contains("sorted")));
    assert!(warnings.iter().any(|w| w.contains("repeated")));
}

#[test]
fn single_node_graph_is_a_warning() {
    let dir = scratch("single_node");
    let path = write(
        &dir,
        r#"{
            "frames": { "kind": "synthetic", "width": 4, "height": 4, "frames": 24, "fps": 24.0 },
            "nodes": [ { "x": 0.0, "y": 0.0 } ]
        }"#,
    );
    let (_, warnings) = load_project(&path).unwrap();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("1 node"));
}

#[test]
fn load_failures_are_load_errors() {
    let dir = scratch("failures");
    let missing = dir.join("nope.json");
    assert!(matches!(
        load_project(&missing),
        Err(SlowmoError::Load { .. })
    ));

    let garbage = write(&dir, "{ not json");
    assert!(matches!(load_project(&garbage), Err(SlowmoError::Load { .. })));

    let newer = write(
        &dir,
        r#"{
            "version": 99,
            "frames": { "kind": "synthetic", "width": 4, "height": 4, "frames": 24, "fps": 24.0 },
            "nodes": []
        }"#,
    );
    assert!(matches!(load_project(&newer), Err(SlowmoError::Load { .. })));

    let missing_frames = write(
        &dir,
        r#"{
            "frames": { "kind": "images", "dir": "no_such_frames", "fps": 24.0 },
            "nodes": [ { "x": 0.0, "y": 0.0 }, { "x": 1.0, "y": 1.0 } ]
        }"#,
    );
    assert!(matches!(
        load_project(&missing_frames),
        Err(SlowmoError::Load { .. })
    ));

    let bad_nodes = write(
        &dir,
        r#"{
            "frames": { "kind": "synthetic", "width": 4, "height": 4, "frames": 24, "fps": 24.0 },
            "nodes": [ { "x": 1.0, "y": 0.0 }, { "x": 1.0, "y": 1.0 } ]
        }"#,
    );
    assert!(matches!(load_project(&bad_nodes), Err(SlowmoError::Load { .. })));
}

#[test]
fn saved_file_reads_back() {
    let dir = scratch("save");
    let file = ProjectFile {
        version: PROJECT_VERSION,
        frames: FrameSourceDef::Images {
            dir: "frames".into(),
            fps: 30.0,
        },
        nodes: vec![Node::new(0.0, 0.0), Node::new(2.0, 1.0)],
        flow_source: Some(FlowSourceDef::V3d {
            lambda: 10.0,
            builder: Some("flowBuilder".into()),
            cache_dir: None,
        }),
        render: RenderSettings::default(),
    };
    let path = dir.join("saved.json");
    file.save(&path).unwrap();
    assert_eq!(ProjectFile::from_path(&path).unwrap(), file);
}
