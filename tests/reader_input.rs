#![cfg(feature = "reader")]

use std::io::{Cursor, Write};

use indoc::indoc;
use schema_saphyr::{
    CountField, Error, Field, Options, SchemaNode, load_from_file, load_from_reader, options,
};

/// struct { char name[16]; uint32 port_count; uint16 *ports; }
fn service() -> SchemaNode {
    SchemaNode::mapping(
        32,
        vec![
            Field::new("name", 0, SchemaNode::string_inline(16)),
            Field::new(
                "ports",
                24,
                SchemaNode::sequence(SchemaNode::uint(2), CountField::new(16, 4)),
            ),
        ],
    )
}

const SERVICE: &str = indoc! {"
    name: gateway
    ports:
      - 80
      - 443
"};

fn ports(tree: &schema_saphyr::DestinationTree, schema: &SchemaNode) -> Vec<u64> {
    tree.view(schema)
        .field("ports")
        .unwrap()
        .iter()
        .filter_map(|v| v.as_u64())
        .collect()
}

#[test]
fn reader_matches_string_load() -> anyhow::Result<()> {
    let schema = service();
    let tree = load_from_reader(Cursor::new(SERVICE.as_bytes()), &Options::default(), &schema)?;
    let from_str = schema_saphyr::load_from_str(SERVICE, &Options::default(), &schema)?;
    assert_eq!(tree.root_bytes()[..20], from_str.root_bytes()[..20]);
    assert_eq!(ports(&tree, &schema), [80, 443]);
    Ok(())
}

#[test]
fn utf16_input_is_decoded() -> anyhow::Result<()> {
    let schema = service();
    let mut bytes = vec![0xFF, 0xFE];
    for unit in "name: café\n".encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    let tree = load_from_reader(Cursor::new(bytes), &Options::default(), &schema)?;
    assert_eq!(tree.view(&schema).field("name").and_then(|v| v.as_str()), Some("café"));
    Ok(())
}

#[test]
fn input_limit_is_an_io_error() {
    let schema = service();
    let mut yaml = String::from("name: big\nports:\n");
    for port in 0..2_000 {
        yaml.push_str(&format!("  - {port}\n"));
    }
    let opts = options! { input_limit: Some(256) };
    let err = load_from_reader(Cursor::new(yaml.into_bytes()), &opts, &schema).unwrap_err();
    assert!(matches!(err, Error::Io { .. }), "{err}");
}

#[test]
fn file_round_trip() -> anyhow::Result<()> {
    let schema = service();
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(SERVICE.as_bytes())?;
    file.flush()?;

    let tree = load_from_file(file.path(), &Options::default(), &schema)?;
    assert_eq!(tree.view(&schema).field("name").and_then(|v| v.as_str()), Some("gateway"));
    assert_eq!(ports(&tree, &schema), [80, 443]);
    Ok(())
}

#[test]
fn missing_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.yaml");
    let err = load_from_file(&path, &Options::default(), &service()).unwrap_err();
    match err {
        Error::FileOpen { path: reported, cause } => {
            assert_eq!(reported, path);
            assert_eq!(cause.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("expected file open error, got {other}"),
    }
}

#[test]
fn schema_is_checked_before_the_file_is_opened() {
    let path = "/definitely/not/here.yaml";
    let err = load_from_file(path, &Options::default(), &SchemaNode::int(4)).unwrap_err();
    assert!(matches!(err, Error::TopLevelType { .. }), "{err}");
}
