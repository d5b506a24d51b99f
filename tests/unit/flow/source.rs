use super::*;

#[test]
fn v3d_exposes_lambda_capability() {
    let mut src = V3dFlowSource::new(10.0, "target/unit_v3d_cache").unwrap();
    let tunable = src.tunable_lambda().expect("v3d is tunable");
    tunable.set_lambda(2.5).unwrap();
    assert_eq!(tunable.lambda(), 2.5);
}

#[test]
fn v3d_rejects_invalid_lambda_and_keeps_previous() {
    assert!(V3dFlowSource::new(-1.0, "c").is_err());
    let mut src = V3dFlowSource::new(4.0, "c").unwrap();
    assert!(src.set_lambda(f32::NAN).is_err());
    assert!(src.set_lambda(-0.5).is_err());
    assert_eq!(TunableLambda::lambda(&src), 4.0);
}

#[test]
fn precomputed_is_not_tunable() {
    let mut src = PrecomputedFlowSource::new("flow");
    assert!(src.tunable_lambda().is_none());
    assert_eq!(src.name(), "precomputed");
}

#[test]
fn precomputed_reads_named_files_and_checks_size() {
    let dir = std::path::PathBuf::from("target").join("unit_precomputed_flow");
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();

    let mut src = PrecomputedFlowSource::new(&dir);
    let mut field = FlowField::zero(4, 2);
    field.set(1, 1, (2.0, 0.0));
    field
        .save(&src.flow_path(3, 4, FrameSize::Original))
        .unwrap();
    FlowField::zero(2, 1)
        .save(&src.flow_path(3, 4, FrameSize::Small))
        .unwrap();

    let frame = FrameRGBA::filled(4, 2, [0, 0, 0, 255]);
    let pair = FramePair {
        left_index: 3,
        right_index: 4,
        left: &frame,
        right: &frame,
        size: FrameSize::Original,
    };
    assert_eq!(src.forward_flow(pair).unwrap(), field);

    let small_pair = FramePair {
        size: FrameSize::Small,
        ..pair
    };
    assert!(matches!(
        src.forward_flow(small_pair),
        Err(SlowmoError::Flow(_))
    ));

    let missing = FramePair {
        left_index: 7,
        right_index: 8,
        ..pair
    };
    assert!(src.forward_flow(missing).is_err());
}

#[test]
fn v3d_reports_missing_builder_as_flow_error() {
    let dir = std::path::PathBuf::from("target").join("unit_v3d_missing_builder");
    let _ = std::fs::remove_dir_all(&dir);
    let mut src = V3dFlowSource::new(1.0, &dir)
        .unwrap()
        .with_builder("definitely-not-a-flow-builder-binary");
    let frame = FrameRGBA::filled(2, 2, [1, 2, 3, 255]);
    let pair = FramePair {
        left_index: 0,
        right_index: 1,
        left: &frame,
        right: &frame,
        size: FrameSize::Original,
    };
    assert!(matches!(src.forward_flow(pair), Err(SlowmoError::Flow(_))));
}

#[test]
fn v3d_cache_key_distinguishes_close_lambdas() {
    let frame = FrameRGBA::filled(2, 2, [0, 0, 0, 255]);
    let pair = FramePair {
        left_index: 0,
        right_index: 1,
        left: &frame,
        right: &frame,
        size: FrameSize::Original,
    };
    let mut src = V3dFlowSource::new(0.001, "cache").unwrap();
    let first = src.flow_path(&pair);
    src.set_lambda(0.004).unwrap();
    let second = src.flow_path(&pair);
    assert_ne!(first, second);
    assert!(second.to_string_lossy().ends_with("-l0.004.sVflow"));
}

/// Shell script standing in for the flow builder. It logs its arguments and copies a
/// prepared 4x2 field to the output path.
#[cfg(unix)]
fn stub_builder(dir: &std::path::Path) -> (std::path::PathBuf, std::path::PathBuf) {
    use std::os::unix::fs::PermissionsExt as _;

    std::fs::create_dir_all(dir).unwrap();
    let dir = dir.canonicalize().unwrap();
    let fixture = dir.join("fixture.sVflow");
    FlowField::zero(4, 2).save(&fixture).unwrap();
    let calls = dir.join("calls.log");
    let script = dir.join("builder.sh");
    std::fs::write(
        &script,
        format!(
            "#!/bin/sh\necho \"$1 $2 $3 $4\" >> '{}'\ncp '{}' \"$3\"\n",
            calls.display(),
            fixture.display()
        ),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    (script, calls)
}

#[cfg(unix)]
fn logged_calls(calls: &std::path::Path) -> Vec<Vec<String>> {
    std::fs::read_to_string(calls)
        .unwrap_or_default()
        .lines()
        .map(|l| l.split(' ').map(str::to_string).collect())
        .collect()
}

#[cfg(unix)]
#[test]
fn v3d_runs_builder_once_per_pair_and_lambda() {
    let root = std::path::PathBuf::from("target").join("unit_v3d_builder");
    let _ = std::fs::remove_dir_all(&root);
    let (script, calls) = stub_builder(&root.join("bin"));

    let mut src = V3dFlowSource::new(2.5, root.join("cache"))
        .unwrap()
        .with_builder(&script);
    let left = FrameRGBA::filled(4, 2, [10, 0, 0, 255]);
    let right = FrameRGBA::filled(4, 2, [0, 10, 0, 255]);
    let pair = FramePair {
        left_index: 3,
        right_index: 4,
        left: &left,
        right: &right,
        size: FrameSize::Original,
    };

    assert_eq!(src.forward_flow(pair).unwrap(), FlowField::zero(4, 2));
    let log = logged_calls(&calls);
    assert_eq!(log.len(), 1);
    let args = &log[0];
    assert!(args[0].ends_with("frame-00003-orig.png"), "{args:?}");
    assert!(args[1].ends_with("frame-00004-orig.png"), "{args:?}");
    assert!(args[2].ends_with(".sVflow"), "{args:?}");
    assert_eq!(args[3], "2.5");
    assert!(std::path::Path::new(&args[0]).is_file());

    // Same pair and lambda comes from the cache.
    src.forward_flow(pair).unwrap();
    assert_eq!(logged_calls(&calls).len(), 1);

    src.set_lambda(0.75).unwrap();
    src.forward_flow(pair).unwrap();
    let log = logged_calls(&calls);
    assert_eq!(log.len(), 2);
    assert_eq!(log[1][3], "0.75");
    assert_ne!(log[0][2], log[1][2]);
}

#[cfg(unix)]
#[test]
fn v3d_rejects_builder_output_of_the_wrong_size() {
    let root = std::path::PathBuf::from("target").join("unit_v3d_builder_size");
    let _ = std::fs::remove_dir_all(&root);
    let (script, calls) = stub_builder(&root.join("bin"));

    let mut src = V3dFlowSource::new(1.0, root.join("cache"))
        .unwrap()
        .with_builder(&script);
    let frame = FrameRGBA::filled(2, 2, [0, 0, 0, 255]);
    let pair = FramePair {
        left_index: 5,
        right_index: 6,
        left: &frame,
        right: &frame,
        size: FrameSize::Original,
    };
    let err = src.forward_flow(pair).unwrap_err();
    assert!(matches!(err, SlowmoError::Flow(ref m) if m.contains("is 4x2")), "{err}");
    assert_eq!(logged_calls(&calls).len(), 1);

    // A cached field of the wrong size is rejected as well.
    assert!(matches!(src.forward_flow(pair), Err(SlowmoError::Flow(_))));
    assert_eq!(logged_calls(&calls).len(), 1);
}
