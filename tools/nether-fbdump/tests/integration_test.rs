//! Integration tests for nether-fbdump
//!
//! Writes fixture buffers into a temp dir and runs the binary on them.

use std::path::Path;
use std::process::Output;

use tempfile::tempdir;

use nether_fb::{Buffer, BufferBuilder};
use nether_fb::scene::{MATERIAL_PROP_SIZE, MaterialView, NameView, SceneView, TRANSFORM_SIZE};

const ITEM_SCHEMA: &str = r#"
root_type = "Item"
file_identifier = "ITEM"

[tables.Item]
fields = [
    { name = "id", slot = 0, type = "u32" },
    { name = "values", slot = 1, type = "[u32]" },
]
"#;

/// Small scene: one transform, one material, one name.
fn scene_bytes() -> Vec<u8> {
    let mut b = BufferBuilder::new();

    let text = b.create_string("root");
    let name = b
        .table(|t| {
            t.add_scalar::<u64>(NameView::H, 77, 0);
            t.add_offset(NameView::V, text);
        })
        .unwrap();
    let names = b.create_offset_vector(&[name]);

    let mut prop = b.struct_data(MATERIAL_PROP_SIZE);
    prop.set(0, 5u32).unwrap().set(4, 0x0000_0002u32).unwrap();
    let props = b.create_struct_vector(&[prop], 4).unwrap();
    let material = b
        .table(|t| {
            t.add_scalar::<u32>(MaterialView::ID, 1, 0);
            t.add_offset(MaterialView::PROPS, props);
        })
        .unwrap();
    let materials = b.create_offset_vector(&[material]);

    let floats = b.create_vector(&[0.25f32]);
    let transform = b.struct_data(TRANSFORM_SIZE);
    let transforms = b.create_struct_vector(&[transform], 4).unwrap();

    let root = b
        .table(|t| {
            t.add_scalar::<u8>(SceneView::VERSION, 3, 0);
            t.add_offset(SceneView::TRANSFORMS, transforms);
            t.add_offset(SceneView::MATERIALS, materials);
            t.add_offset(SceneView::FLOAT_VALUES, floats);
            t.add_offset(SceneView::NAMES, names);
        })
        .unwrap();
    b.finish(root, None)
}

/// Item with `values = [10, 20, 30]`, optionally with its last element cut off.
fn item_bytes(identifier: [u8; 4], truncate: bool) -> Vec<u8> {
    let mut b = BufferBuilder::new();
    let values = b.create_vector(&[10u32, 20, 30]);
    let root = b
        .table(|t| {
            t.add_scalar::<u32>(0, 9, 0);
            t.add_offset(1, values);
        })
        .unwrap();
    let mut bytes = b.finish(root, Some(identifier));
    if truncate {
        bytes.truncate(bytes.len() - 4);
    }
    bytes
}

/// Scene whose `bool_values` length prefix claims `u32::MAX` elements.
fn oversized_pool_scene() -> Vec<u8> {
    let mut b = BufferBuilder::new();
    // Written first, so the pool sits at the very end of the buffer.
    let bools = b.create_vector(&[true]);
    let text = b.create_string("root");
    let name = b
        .table(|t| {
            t.add_scalar::<u64>(NameView::H, 77, 0);
            t.add_offset(NameView::V, text);
        })
        .unwrap();
    let names = b.create_offset_vector(&[name]);
    let root = b
        .table(|t| {
            t.add_scalar::<u8>(SceneView::VERSION, 3, 0);
            t.add_offset(SceneView::BOOL_VALUES, bools);
            t.add_offset(SceneView::NAMES, names);
        })
        .unwrap();
    let mut bytes = b.finish(root, None);

    let scene = SceneView::open(&Buffer::new(bytes.clone())).unwrap();
    let pool = scene.bool_values().unwrap().present().unwrap().position();
    bytes[pool..pool + 4].copy_from_slice(&u32::MAX.to_le_bytes());
    bytes
}

const LEVEL_SCHEMA: &str = r#"
root_type = "Level"

[tables.Level]
fields = [
    { name = "depth", slot = 0, type = "u32" },
    { name = "children", slot = 1, type = "[table:Level]" },
]
"#;

/// `levels` tables, each listing the one below it twice.
fn shared_levels(levels: u32) -> Vec<u8> {
    let mut b = BufferBuilder::new();
    let mut below = b.table(|t| t.add_scalar::<u32>(0, 0, 0)).unwrap();
    for level in 1..levels {
        let children = b.create_offset_vector(&[below, below]);
        below = b
            .table(|t| {
                t.add_scalar::<u32>(0, level, 0);
                t.add_offset(1, children);
            })
            .unwrap();
    }
    b.finish(below, None)
}

fn fbdump(args: &[&str], file: &Path) -> Output {
    std::process::Command::new(env!("CARGO_BIN_EXE_nether-fbdump"))
        .args(args)
        .arg(file)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run nether-fbdump")
}

fn stdout(output: &Output) -> String {
    String::from_utf8(output.stdout.clone()).expect("stdout should be UTF-8")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_dump_scene_text() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("level.nczxscene");
    std::fs::write(&path, scene_bytes()).unwrap();

    let output = fbdump(&[], &path);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let text = stdout(&output);
    assert!(text.starts_with("Scene @ "));
    assert!(text.contains("\n  version: 3\n"));
    assert!(text.contains("\n  lights: absent\n"));
    assert!(text.contains("Transform (144 bytes) 0000"));
    assert!(text.contains("v: \"root\""));
    assert!(text.contains("value_id: 2"));
    assert!(text.contains("\n    [0] 0.25\n"));
}

#[test]
fn test_dump_scene_json() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("level.nczxscene");
    std::fs::write(&path, scene_bytes()).unwrap();

    let output = fbdump(&["--format", "json"], &path);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["type"], "Scene");
    let fields = &json["fields"];
    assert_eq!(fields["version"], 3);
    assert_eq!(fields["skins"], serde_json::Value::Null);
    assert_eq!(fields["names"][0]["fields"]["h"], 77);
    assert_eq!(fields["names"][0]["fields"]["v"], "root");
    assert_eq!(fields["materials"][0]["fields"]["props"][0]["fields"]["name_id"], 5);
    assert_eq!(fields["float_values"][0], 0.25);
}

#[test]
fn test_max_elements() {
    let dir = tempdir().expect("Failed to create temp dir");
    let schema = dir.path().join("item.toml");
    let path = dir.path().join("item.bin");
    std::fs::write(&schema, ITEM_SCHEMA).unwrap();
    std::fs::write(&path, item_bytes(*b"ITEM", false)).unwrap();

    let output = fbdump(
        &["--schema", schema.to_str().unwrap(), "--max-elements", "1"],
        &path,
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("values: [3]\n    [0] 10\n    ... 2 more\n"));
}

#[test]
fn test_identifier_check() {
    let dir = tempdir().expect("Failed to create temp dir");
    let schema = dir.path().join("item.toml");
    let path = dir.path().join("item.bin");
    std::fs::write(&schema, ITEM_SCHEMA).unwrap();
    std::fs::write(&path, item_bytes(*b"XXXX", false)).unwrap();
    let schema = schema.to_str().unwrap();

    let output = fbdump(&["--schema", schema], &path);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("identifier"));

    let output = fbdump(&["--schema", schema, "--no-identifier-check"], &path);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("id: 9"));
}

#[test]
fn test_truncated_vector_lazy_and_strict() {
    let dir = tempdir().expect("Failed to create temp dir");
    let schema = dir.path().join("item.toml");
    let path = dir.path().join("item.bin");
    std::fs::write(&schema, ITEM_SCHEMA).unwrap();
    std::fs::write(&path, item_bytes(*b"ITEM", true)).unwrap();
    let schema = schema.to_str().unwrap();

    // Lazily, the dump succeeds and shows the broken element inline.
    let output = fbdump(&["--schema", schema], &path);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("[1] 20"));
    assert!(text.contains("[2] <error: read of 4 bytes"));
    let log = stderr(&output);
    assert!(log.contains("WARN"));
    assert!(log.contains("Item.values[2]"));

    let output = fbdump(&["--schema", schema, "--strict"], &path);
    assert!(!output.status.success());
    assert!(stdout(&output).is_empty());
    assert!(stderr(&output).contains("Item.values"));
}

#[test]
fn test_short_file_fails() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("short.nczxscene");
    std::fs::write(&path, [0u8; 3]).unwrap();

    let output = fbdump(&[], &path);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("too short"));
}

#[test]
fn test_missing_inputs_fail() {
    let dir = tempdir().expect("Failed to create temp dir");
    let missing = dir.path().join("missing.nczxscene");
    let output = fbdump(&[], &missing);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Failed to read"));

    let path = dir.path().join("level.nczxscene");
    std::fs::write(&path, scene_bytes()).unwrap();
    let bad_schema = dir.path().join("bad.toml");
    std::fs::write(&bad_schema, "root_type = \"Nope\"\n").unwrap();
    let output = fbdump(&["--schema", bad_schema.to_str().unwrap()], &path);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Failed to load schema"));
}

#[test]
fn test_oversized_vector_length_is_a_field_error() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("pool.nczxscene");
    std::fs::write(&path, oversized_pool_scene()).unwrap();

    let output = fbdump(&[], &path);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let text = stdout(&output);
    assert!(text.contains("\n  bool_values: [4294967295]\n    [0] true\n"));
    assert!(text.contains("] <error: read of 1 bytes at offset"));
    // Fields after the broken pool are still dumped.
    assert!(text.contains("\n  names: [1]\n"));
    assert!(text.contains("v: \"root\""));
    assert!(text.len() < 4096, "dump should not enumerate the claimed length");

    let log = stderr(&output);
    assert!(log.contains("WARN"));
    assert!(log.contains("Scene.bool_values["));

    let output = fbdump(&["--strict"], &path);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Scene.bool_values"));
}

#[test]
fn test_max_tables_bounds_shared_subtables() {
    let dir = tempdir().expect("Failed to create temp dir");
    let schema = dir.path().join("level.toml");
    let path = dir.path().join("levels.bin");
    std::fs::write(&schema, LEVEL_SCHEMA).unwrap();
    std::fs::write(&path, shared_levels(40)).unwrap();

    let output = fbdump(
        &["--schema", schema.to_str().unwrap(), "--max-tables", "10"],
        &path,
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.starts_with("Level @ "));
    assert!(text.contains("depth: 39"));
    assert!(text.contains("... (not expanded)"));
    assert_eq!(text.matches("depth: ").count(), 10);
}
