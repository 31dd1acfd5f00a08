// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! conveyor-config: XML configuration loading and validation
//!
//! The configuration is a single XML document with three sections: sources
//! (watched roots), servers (destinations) and rules (what goes where, after
//! which processing). Loading validates everything it can without touching
//! the network and reports every problem found, not just the first.

pub mod xml;

use conveyor_core::filter::is_valid_ignored_dirs;
use conveyor_core::{
    Destination, Filter, FilterConditions, Rule, Server, SizeBound, SizeCondition, Source,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use xml::{Element, XmlError};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Xml(#[from] XmlError),
    #[error("invalid configuration: {}", .problems.join("; "))]
    Invalid { problems: Vec<String> },
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Directory names never descended into, for every source.
    pub ignored_dirs: Vec<String>,
    pub sources: BTreeMap<String, Source>,
    pub servers: BTreeMap<String, Server>,
    pub rules: Vec<Rule>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Config, ConfigError> {
        let root = Element::parse(text)?;
        let mut problems = Vec::new();
        let mut config = Config::default();

        match root.child("sources") {
            Some(sources) => parse_sources(sources, &mut config, &mut problems),
            None => problems.push("missing <sources> section".to_string()),
        }
        match root.child("servers") {
            Some(servers) => parse_servers(servers, &mut config, &mut problems),
            None => problems.push("missing <servers> section".to_string()),
        }
        match root.child("rules") {
            Some(rules) => parse_rules(rules, &mut config, &mut problems),
            None => problems.push("missing <rules> section".to_string()),
        }

        if problems.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError::Invalid { problems })
        }
    }
}

fn valid_source_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn parse_sources(sources: &Element, config: &mut Config, problems: &mut Vec<String>) {
    if let Some(ignored) = sources.attr("ignoredDirs") {
        if !ignored.is_empty() {
            if is_valid_ignored_dirs(ignored) {
                config.ignored_dirs = ignored.split(':').map(str::to_string).collect();
            } else {
                problems
                    .push(format!("invalid ignoredDirs attribute on <sources>: {:?}", ignored));
            }
        }
    }

    for node in sources.children_named("source") {
        let name = node.attr("name").unwrap_or_default().to_string();
        if !valid_source_name(&name) {
            problems.push(format!(
                "invalid source name {:?}: only alphanumerics, dash and underscore are allowed",
                name
            ));
            continue;
        }

        let scan_path = match node.attr("scanPath") {
            Some(p) if !p.is_empty() => PathBuf::from(p),
            _ => {
                problems.push(format!("source '{}': scanPath is not configured", name));
                continue;
            }
        };
        if !scan_path.exists() {
            problems.push(format!(
                "source '{}': scan path '{}' does not exist",
                name,
                scan_path.display()
            ));
        }

        let document_root = node.attr("documentRoot").map(PathBuf::from);
        if let Some(document_root) = &document_root {
            if !document_root.exists() {
                problems.push(format!(
                    "source '{}': document root '{}' does not exist",
                    name,
                    document_root.display()
                ));
            }
        }

        let base_path = node.attr("basePath").map(str::to_string);
        if let Some(base_path) = &base_path {
            if !base_path.starts_with('/') || !base_path.ends_with('/') {
                problems.push(format!(
                    "source '{}': base path {:?} needs both a leading and a trailing slash",
                    name, base_path
                ));
            } else if let Some(document_root) = &document_root {
                let site_path = document_root.join(&base_path[1..]);
                if !site_path.exists() {
                    tracing::warn!(
                        source = %name,
                        site_path = %site_path.display(),
                        "base path does not exist within the document root; \
                         assuming a logical base path behind symbolic links"
                    );
                }
            }
        }

        config.sources.insert(
            name.clone(),
            Source { name, scan_path, document_root, base_path },
        );
    }
}

fn parse_servers(servers: &Element, config: &mut Config, problems: &mut Vec<String>) {
    for node in servers.children_named("server") {
        let name = match node.attr("name") {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => {
                problems.push("a <server> is missing its name attribute".to_string());
                continue;
            }
        };
        let transporter = match node.attr("transporter") {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => {
                problems.push(format!("server '{}': missing transporter attribute", name));
                continue;
            }
        };
        let max_connections = match node.attr("maxConnections") {
            None => 0,
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) => n,
                Err(_) => {
                    problems
                        .push(format!("server '{}': invalid maxConnections {:?}", name, raw));
                    continue;
                }
            },
        };
        let settings = node
            .children
            .iter()
            .map(|child| (child.name.clone(), child.text.clone()))
            .collect();

        config
            .servers
            .insert(name.clone(), Server { name, transporter, max_connections, settings });
    }
}

fn parse_rules(rules: &Element, config: &mut Config, problems: &mut Vec<String>) {
    for node in rules.children_named("rule") {
        let source = node.attr("for").unwrap_or_default().to_string();
        let label = node.attr("label").unwrap_or_default().to_string();
        if label.is_empty() {
            problems.push(format!("a rule for source '{}' is missing its label", source));
        }
        if !config.sources.contains_key(&source) {
            problems.push(format!(
                "rule '{}': references a non-existing source '{}'",
                label, source
            ));
        }

        let filter = node.child("filter").map(|f| parse_filter(f, &label, problems));

        let processor_chain = node.child("processorChain").map(|chain| {
            chain
                .children_named("processor")
                .filter_map(|p| p.attr("name"))
                .map(str::to_string)
                .collect::<Vec<_>>()
        });

        let mut destinations = BTreeMap::new();
        match node.child("destinations") {
            Some(parent) if parent.children_named("destination").count() > 0 => {
                for dest in parent.children_named("destination") {
                    let server = match dest.attr("server") {
                        Some(s) if !s.is_empty() => s.to_string(),
                        _ => {
                            problems.push(format!(
                                "rule '{}': a destination is missing its server attribute",
                                label
                            ));
                            continue;
                        }
                    };
                    if !config.servers.contains_key(&server) {
                        problems.push(format!(
                            "rule '{}': destination references a non-existing server '{}'",
                            label, server
                        ));
                    }
                    destinations.insert(
                        server,
                        Destination { path: dest.attr("path").map(str::to_string) },
                    );
                }
            }
            _ => {
                problems.push(format!(
                    "rule '{}': at least one destination must be configured",
                    label
                ));
            }
        }

        let deletion_delay = match node.child("deletionDelay") {
            None => None,
            Some(delay) => match delay.text.parse::<u64>() {
                Ok(seconds) => Some(seconds),
                Err(_) => {
                    problems.push(format!(
                        "rule '{}': invalid deletionDelay {:?}",
                        label, delay.text
                    ));
                    None
                }
            },
        };

        config.rules.push(Rule {
            source,
            label,
            filter,
            processor_chain,
            destinations,
            deletion_delay,
        });
    }
}

fn parse_filter(node: &Element, rule_label: &str, problems: &mut Vec<String>) -> FilterConditions {
    let mut conditions = FilterConditions {
        paths: node.child("paths").map(|c| c.text.clone()),
        extensions: node.child("extensions").map(|c| c.text.clone()),
        ignored_dirs: node.child("ignoredDirs").map(|c| c.text.clone()),
        pattern: node.child("pattern").map(|c| c.text.clone()),
        size: None,
    };

    if let Some(size) = node.child("size") {
        let condition_type = match size.attr("conditionType") {
            Some("minimum") => Some(SizeBound::Minimum),
            Some("maximum") => Some(SizeBound::Maximum),
            other => {
                problems.push(format!(
                    "rule '{}': size condition has an invalid conditionType {:?}, \
                     valid values are 'minimum' and 'maximum'",
                    rule_label, other
                ));
                None
            }
        };
        let threshold = match size.text.parse::<u64>() {
            Ok(t) => Some(t),
            Err(_) => {
                problems.push(format!(
                    "rule '{}': size condition has an invalid threshold {:?}",
                    rule_label, size.text
                ));
                None
            }
        };
        if let (Some(condition_type), Some(threshold)) = (condition_type, threshold) {
            conditions.size = Some(SizeCondition { condition_type, threshold });
        }
    }

    // Compile once to surface condition errors at load time.
    if let Err(e) = Filter::new(&conditions) {
        problems.push(format!("rule '{}': invalid filter condition: {}", rule_label, e));
    }

    conditions
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
