// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Attribute-path resolution and wildcard expansion.
//!
//! A fully concrete path that fails to resolve yields a status for that
//! path; a path with any wildcard dimension silently skips whatever does
//! not exist.

use crate::{
    clusters::Registry,
    errors::CoreError,
    models::im::AttributePath,
};

/// One expansion result: a readable concrete path, or the status a
/// concrete input path earned.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Concrete(AttributePath),
    Unresolved { path: AttributePath, error: CoreError },
}

/// Expand one request path over the registry.
pub fn expand(registry: &Registry, path: &AttributePath) -> Vec<Resolution> {
    let wildcard = !path.is_concrete();
    let mut out = Vec::new();

    let endpoints: Vec<u16> = match path.endpoint {
        Some(e) => {
            if !registry.has_endpoint(e) {
                if !wildcard {
                    out.push(Resolution::Unresolved {
                        path: *path,
                        error: CoreError::UnsupportedEndpoint,
                    });
                }
                return out;
            }
            vec![e]
        },
        None => registry.endpoint_ids(),
    };

    for endpoint in endpoints {
        let clusters: Vec<u32> = match path.cluster {
            Some(c) => {
                if registry.instance(endpoint, c).is_none() {
                    if !wildcard {
                        out.push(Resolution::Unresolved {
                            path: *path,
                            error: CoreError::UnsupportedCluster,
                        });
                    }
                    continue;
                }
                vec![c]
            },
            None => registry.cluster_ids(endpoint),
        };

        for cluster in clusters {
            let Some(instance) = registry.instance(endpoint, cluster) else {
                continue;
            };
            let declared = instance.def.attribute_ids();
            match path.attribute {
                Some(a) => {
                    if declared.contains(&a) {
                        out.push(Resolution::Concrete(AttributePath::concrete(
                            endpoint, cluster, a,
                        )));
                    } else if !wildcard {
                        out.push(Resolution::Unresolved {
                            path: *path,
                            error: CoreError::UnsupportedAttribute,
                        });
                    }
                },
                None => {
                    for a in declared {
                        out.push(Resolution::Concrete(AttributePath::concrete(
                            endpoint, cluster, a,
                        )));
                    }
                },
            }
        }
    }
    out
}

/// The status code a non-concrete write/invoke path earns, picked by its
/// first wildcard dimension.
pub fn wildcard_error(path: &AttributePath) -> CoreError {
    if path.endpoint.is_none() {
        CoreError::UnsupportedEndpoint
    } else if path.cluster.is_none() {
        CoreError::UnsupportedCluster
    } else {
        CoreError::UnsupportedAttribute
    }
}
