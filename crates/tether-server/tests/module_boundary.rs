#![allow(missing_docs)]

use std::path::{Path, PathBuf};

fn collect_rs_files(root: &Path, out: &mut Vec<PathBuf>) {
    if let Ok(entries) = std::fs::read_dir(root) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                collect_rs_files(&path, out);
            } else if path.extension().and_then(std::ffi::OsStr::to_str) == Some("rs") {
                out.push(path);
            }
        }
    }
}

/// Source text before the `#[cfg(test)]` module.
fn non_test_source(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    Some(match content.find("#[cfg(test)]") {
        Some(idx) => content[..idx].to_string(),
        None => content,
    })
}

#[test]
fn gateway_only_talks_to_relay_through_frame_delivery() {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let mut files = Vec::new();
    collect_rs_files(&manifest_dir.join("src").join("gateway"), &mut files);
    assert!(!files.is_empty());

    let forbidden = ["SignalingRelay", "ConnectionRegistry", "ClientConnection", "RemoteRelay"];
    let offenders: Vec<String> = files
        .iter()
        .filter_map(|file| {
            let source = non_test_source(file)?;
            forbidden
                .iter()
                .any(|name| source.contains(name))
                .then(|| file.display().to_string())
        })
        .collect();

    assert!(
        offenders.is_empty(),
        "gateway must deliver through FrameDelivery only: {offenders:?}"
    );
}

#[test]
fn registry_lock_is_not_held_across_await() {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let registry = manifest_dir.join("src").join("relay").join("registry.rs");
    let source = non_test_source(&registry).expect("registry source");
    assert!(
        !source.contains(".await"),
        "registry operations must stay synchronous"
    );
}
