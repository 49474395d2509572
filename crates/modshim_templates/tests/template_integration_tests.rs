//! Integration tests for override templates.

use std::fs;

use modshim_core::Value;
use modshim_templates::{load_overrides, TemplateError};
use serde_json::json;
use tempfile::tempdir;

#[test]
fn test_missing_root_is_optional() {
    let temp = tempdir().unwrap();
    let overrides = load_overrides(temp.path().join("nope"), "local", json!({})).unwrap();
    assert!(overrides.is_empty());
}

#[test]
fn test_overrides_keyed_by_relative_path() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("cluster")).unwrap();
    fs::write(
        root.join("cluster/talos.tera"),
        r#"{
  "cluster_name": "{{ context.name }}-cluster",
  "nodes": {
    "controlplanes": {{ context.controlplanes }},
    "workers": []
  }
}"#,
    )
    .unwrap();
    fs::write(root.join("dns.tera"), r#"{"zone": "{{ context.domain }}"}"#).unwrap();

    let overrides = load_overrides(
        root,
        "staging",
        json!({"controlplanes": 3, "domain": "stg.example.com"}),
    )
    .unwrap();

    assert_eq!(overrides.len(), 2);
    let talos = &overrides["cluster/talos"];
    assert_eq!(talos["cluster_name"], Value::from("staging-cluster"));
    let nodes = talos["nodes"].as_map().unwrap();
    assert_eq!(nodes["controlplanes"], Value::Int(3));
    assert_eq!(nodes["workers"], Value::List(vec![]));
    assert_eq!(overrides["dns"]["zone"], Value::from("stg.example.com"));
}

#[test]
fn test_one_bad_template_aborts() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("good.tera"), "{}").unwrap();
    fs::write(temp.path().join("bad.tera"), "\"just a string\"").unwrap();

    let err = load_overrides(temp.path(), "local", json!({})).unwrap_err();
    match err {
        TemplateError::InvalidOutput { template, .. } => assert_eq!(template, "bad"),
        other => panic!("unexpected error: {other}"),
    }
}
