//! Lazily populated artifact directory trees and artifact path matching.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{Result, TrackviewError};
use crate::models::{ArtifactFile, ModelVersion};

/// One node of a run's artifact tree.
///
/// `children` is `None` until the directory has been listed.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct ArtifactNode {
    pub is_root: bool,
    pub file_info: Option<ArtifactFile>,
    pub children: Option<BTreeMap<String, ArtifactNode>>,
}

impl ArtifactNode {
    pub fn root() -> Self {
        Self {
            is_root: true,
            file_info: None,
            children: None,
        }
    }

    fn leaf(file: ArtifactFile) -> Self {
        Self {
            is_root: false,
            file_info: Some(file),
            children: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.is_root || self.file_info.as_ref().is_some_and(|f| f.is_dir)
    }

    pub fn is_loaded(&self) -> bool {
        self.children.is_some()
    }

    pub fn name(&self) -> &str {
        self.file_info.as_ref().map(|f| f.name()).unwrap_or("")
    }

    /// Children with directories first, then by name.
    pub fn listing(&self) -> Vec<&ArtifactNode> {
        let mut nodes: Vec<&ArtifactNode> = self
            .children
            .as_ref()
            .map(|c| c.values().collect())
            .unwrap_or_default();
        nodes.sort_by(|a, b| b.is_dir().cmp(&a.is_dir()).then_with(|| a.name().cmp(b.name())));
        nodes
    }

    /// Look up the node addressed by a slash-delimited path; `""` is this node.
    pub fn find(&self, path: &str) -> Option<&ArtifactNode> {
        let mut node = self;
        for segment in path_segments(path) {
            node = node.children.as_ref()?.get(segment)?;
        }
        Some(node)
    }

    /// Return a copy of this tree with the directory at `path` populated by
    /// `files`. The receiver is never modified; an address that does not
    /// resolve to a listed directory is an error.
    pub fn with_listing(
        &self,
        run_uuid: &str,
        path: Option<&str>,
        files: &[ArtifactFile],
    ) -> Result<ArtifactNode> {
        let path = path.unwrap_or("");
        let invalid = |reason: &str| TrackviewError::ArtifactPath {
            run_uuid: run_uuid.to_string(),
            path: path.to_string(),
            reason: reason.to_string(),
        };

        let mut tree = self.clone();
        let mut node = &mut tree;
        for segment in path_segments(path) {
            node = node
                .children
                .as_mut()
                .ok_or_else(|| invalid("parent directory has not been listed"))?
                .get_mut(segment)
                .ok_or_else(|| invalid("no such entry"))?;
        }
        if !node.is_dir() {
            return Err(invalid("not a directory"));
        }

        let children = files
            .iter()
            .map(|f| (f.name().to_string(), ArtifactNode::leaf(f.clone())))
            .collect();
        node.children = Some(children);
        Ok(tree)
    }
}

fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Collapse repeated slashes and drop trailing ones. A leading URI scheme
/// (`dbfs:`, `s3:`) is kept as is.
pub fn normalize_artifact_path(path: &str) -> String {
    let (scheme, rest) = match path.find(':') {
        Some(idx)
            if idx > 0
                && path[..idx]
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.') =>
        {
            path.split_at(idx + 1)
        }
        _ => ("", path),
    };

    let mut out = String::with_capacity(path.len());
    out.push_str(scheme);
    let mut prev_slash = false;
    for c in rest.chars() {
        if c == '/' {
            if !prev_slash {
                out.push(c);
            }
            prev_slash = true;
        } else {
            out.push(c);
            prev_slash = false;
        }
    }
    while out.len() > scheme.len() + 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

/// Path of `source` relative to `artifact_root`, normalized, or `None` when
/// the source lies outside the root.
pub fn relative_artifact_path(source: &str, artifact_root: &str) -> Option<String> {
    let source = normalize_artifact_path(source);
    let root = normalize_artifact_path(artifact_root);
    let rest = source.strip_prefix(&root)?;
    if rest.is_empty() {
        return Some(String::new());
    }
    rest.strip_prefix('/').map(str::to_string)
}

/// Model versions whose source is the artifact at `path` under `artifact_root`.
pub fn model_versions_for_artifact<'a>(
    versions: &'a [ModelVersion],
    artifact_root: &str,
    path: &str,
) -> Vec<&'a ModelVersion> {
    let wanted = normalize_artifact_path(path);
    versions
        .iter()
        .filter(|mv| relative_artifact_path(&mv.source, artifact_root).as_deref() == Some(wanted.as_str()))
        .collect()
}
