//! Configuration loading from files, with strict ACL validation.

use std::io::Write;

use docgate::config;

#[tokio::test]
async fn loads_a_yaml_config_file() {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .unwrap();
    write!(
        file,
        r#"
gateway:
  host: 127.0.0.1
  port: 9090
buffers:
  segmentSizeBytes: 4096
  maxSegments: 8
identity:
  users:
    ada: [admin]
acl:
  admin:
    whitelistBulkDelete: false
pluginsArgs:
  hiddenPropsFilter:
    toggle-enabled: true
"#
    )
    .unwrap();

    let config = config::load_from_path(file.path()).await.unwrap();
    assert_eq!(config.gateway.host, "127.0.0.1");
    assert_eq!(config.gateway.port, 9090);
    assert_eq!(config.buffers.segment_size_bytes, 4096);
    assert_eq!(config.buffers.max_segments, 8);
    assert_eq!(
        config.identity.users.get("ada"),
        Some(&vec!["admin".to_string()])
    );
    assert!(config.acl.contains_key("admin"));
    assert!(config
        .plugin_args("hiddenPropsFilter")
        .contains_key("toggle-enabled"));
    // absent plugins resolve to an empty map
    assert!(config.plugin_args("missing").is_empty());
}

#[tokio::test]
async fn a_malformed_acl_entry_fails_the_load() {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .unwrap();
    write!(
        file,
        r#"
acl:
  ops:
    whitelistBulkDelete: "yes"
"#
    )
    .unwrap();

    let err = config::load_from_path(file.path()).await.unwrap_err();
    assert!(err.to_string().contains("whitelistBulkDelete"));
}

#[tokio::test]
async fn unsupported_extensions_are_rejected() {
    let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
    assert!(config::load_from_path(file.path()).await.is_err());
}
