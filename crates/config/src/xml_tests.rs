// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parses_nested_elements_attributes_and_text() {
    let root = Element::parse(
        r#"<?xml version="1.0"?>
        <config>
          <servers>
            <server name="origin" transporter="symlink_or_copy">
              <location>/var/www</location>
              <url>http://static.example.com/</url>
            </server>
          </servers>
        </config>"#,
    )
    .unwrap();

    assert_eq!(root.name, "config");
    let server = root.child("servers").unwrap().child("server").unwrap();
    assert_eq!(server.attr("name"), Some("origin"));
    assert_eq!(server.attr("transporter"), Some("symlink_or_copy"));
    assert_eq!(server.child("location").unwrap().text, "/var/www");
    assert_eq!(server.child("url").unwrap().text, "http://static.example.com/");
}

#[test]
fn self_closing_elements_are_children() {
    let root = Element::parse(r#"<a><b x="1"/><b x="2"/></a>"#).unwrap();
    let xs: Vec<&str> = root.children_named("b").filter_map(|b| b.attr("x")).collect();
    assert_eq!(xs, vec!["1", "2"]);
}

#[test]
fn unescapes_entities() {
    let root = Element::parse(r#"<a note="x &amp; y">1 &lt; 2</a>"#).unwrap();
    assert_eq!(root.attr("note"), Some("x & y"));
    assert_eq!(root.text, "1 < 2");
}

#[test]
fn rejects_mismatched_tags() {
    assert!(Element::parse("<a><b></a></b>").is_err());
}

#[test]
fn rejects_empty_documents() {
    let err = Element::parse("  ").unwrap_err();
    assert!(matches!(err, XmlError::NoRoot));
}
