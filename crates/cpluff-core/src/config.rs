//! Per-context configuration. Deliberately small: almost everything the
//! framework does is either a compile-time invariant or a per-call
//! argument, so there is little left to put behind a config knob.

#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Filename the default filesystem source looks for in each plug-in
    /// directory. Defaults to `"plugin.xml"`.
    pub descriptor_filename: String,
    /// When `true`, a descriptor with unrecognized elements or attributes
    /// is rejected outright instead of loading with a warning.
    pub strict_unknown_elements: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            descriptor_filename: "plugin.xml".to_string(),
            strict_unknown_elements: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_descriptor_filename_is_plugin_xml() {
        assert_eq!(ContextConfig::default().descriptor_filename, "plugin.xml");
    }
}
