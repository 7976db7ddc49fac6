// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn mount_forms() {
    let mount = parse_mount("/src:/dst").unwrap();
    assert_eq!(mount.source, "/src");
    assert_eq!(mount.target, "/dst");
    assert!(!mount.read_only);

    let mount = parse_mount("/src:/dst:ro").unwrap();
    assert!(mount.read_only);

    assert!(parse_mount("justonepart").is_err());
    assert!(parse_mount("/a:/b:rw").is_err());
}

#[test]
fn docker_args_build_destination() {
    let args = DockerArgs {
        image: "dev:latest".to_string(),
        container_name: None,
        profile: Some("full-dev".to_string()),
        workdir: None,
        env_passthrough: vec!["CODEX_API_KEY".to_string()],
        env: vec!["TERM=xterm".to_string()],
        mounts: vec!["/a:/b:ro".to_string()],
    };
    let destination = parse_docker(args).unwrap();
    match destination {
        Destination::Docker {
            image,
            profile,
            env,
            mounts,
            ..
        } => {
            assert_eq!(image, "dev:latest");
            assert_eq!(profile.as_deref(), Some("full-dev"));
            assert_eq!(env.get("TERM").map(|s| s.as_str()), Some("xterm"));
            assert_eq!(mounts.len(), 1);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn bad_env_pair_is_rejected() {
    let args = DockerArgs {
        image: "dev".to_string(),
        container_name: None,
        profile: None,
        workdir: None,
        env_passthrough: Vec::new(),
        env: vec!["NOEQUALS".to_string()],
        mounts: Vec::new(),
    };
    assert!(parse_docker(args).is_err());
}
