//! The immutable descriptor value tree: plug-in, imports, extension points,
//! extensions, and the configuration-element tree nested inside extensions.
//!
//! A [`Descriptor`] is built once by the loader and never mutated again; it
//! is shared via `Arc` so the registry, callers holding a plug-in-info
//! handle, and the use-count bookkeeping in the context can each hold an
//! independent strong reference.

pub mod loader;
pub mod xml;

use crate::version::{MatchRule, Version};
use std::path::PathBuf;
use std::sync::{Arc, Weak};

/// A node in an extension's configuration-element tree.
///
/// Built with `Arc::new_cyclic` so each child can carry a `Weak` pointer
/// back to its parent without the tree owning any interior mutability —
/// the whole structure is frozen at construction time.
pub struct ConfigElementData {
    name: String,
    attributes: Vec<(String, String)>,
    value: Option<String>,
    parent: Option<Weak<ConfigElementData>>,
    children: Vec<ConfigElement>,
}

pub type ConfigElement = Arc<ConfigElementData>;

impl ConfigElementData {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn parent(&self) -> Option<ConfigElement> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn children(&self) -> &[ConfigElement] {
        &self.children
    }
}

/// A plain specification used while building a configuration tree bottom-up
/// during parsing, before it is frozen into the `Arc` tree above.
#[derive(Debug, Default)]
pub struct ConfigElementSpec {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub value: Option<String>,
    pub children: Vec<ConfigElementSpec>,
}

impl ConfigElementSpec {
    /// Freeze this spec (and its descendants) into the immutable `Arc` tree,
    /// stripping leading/trailing whitespace from non-empty text values per
    /// the configuration-subtree rules.
    pub fn freeze(self) -> ConfigElement {
        Self::build(self, None)
    }

    fn build(spec: ConfigElementSpec, parent: Option<Weak<ConfigElementData>>) -> ConfigElement {
        Arc::new_cyclic(|weak_self| {
            let children = spec
                .children
                .into_iter()
                .map(|c| ConfigElementSpec::build(c, Some(weak_self.clone())))
                .collect();
            ConfigElementData {
                name: spec.name,
                attributes: spec.attributes,
                value: spec.value,
                parent,
                children,
            }
        })
    }
}

/// A declared dependency of one plug-in on another.
#[derive(Debug, Clone)]
pub struct Import {
    pub plugin_id: String,
    pub version: Option<Version>,
    pub match_rule: MatchRule,
    pub optional: bool,
}

/// A named hook a plug-in declares so other plug-ins may contribute to it.
#[derive(Debug, Clone)]
pub struct ExtensionPoint {
    pub local_id: String,
    pub global_id: String,
    pub name: Option<String>,
    pub schema: Option<String>,
}

/// A contribution to a named extension point.
pub struct Extension {
    pub point_id: String,
    pub local_id: Option<String>,
    pub global_id: Option<String>,
    pub name: Option<String>,
    pub configuration: ConfigElement,
}

/// The immutable plug-in metadata tree produced by the descriptor loader.
pub struct Descriptor {
    pub id: String,
    pub name: Option<String>,
    pub version: Version,
    pub provider_name: Option<String>,
    pub path: Option<PathBuf>,
    pub abi_compatibility: Option<Version>,
    pub api_compatibility: Option<Version>,
    pub required_framework_version: Option<Version>,
    pub runtime_library: Option<String>,
    pub runtime_funcs_symbol: Option<String>,
    pub imports: Vec<Import>,
    pub extension_points: Vec<ExtensionPoint>,
    pub extensions: Vec<Extension>,
}

impl Descriptor {
    pub fn extension_point(&self, global_id: &str) -> Option<&ExtensionPoint> {
        self.extension_points
            .iter()
            .find(|ep| ep.global_id == global_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_tree_parent_links_resolve() {
        let tree = ConfigElementSpec {
            name: "extension".into(),
            attributes: vec![],
            value: None,
            children: vec![ConfigElementSpec {
                name: "child".into(),
                attributes: vec![("k".into(), "v".into())],
                value: Some("text".into()),
                children: vec![],
            }],
        }
        .freeze();

        assert_eq!(tree.name(), "extension");
        assert!(tree.parent().is_none());
        let child = &tree.children()[0];
        assert_eq!(child.name(), "child");
        assert_eq!(child.attribute("k"), Some("v"));
        assert_eq!(child.value(), Some("text"));
        let parent = child.parent().expect("child has a parent");
        assert_eq!(parent.name(), "extension");
    }
}
