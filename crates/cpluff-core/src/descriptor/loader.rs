//! The push-parser state machine that turns a stream of [`XmlEvent`]s into
//! a [`Descriptor`]. Driven entirely by `(state, event, element-name)`
//! transitions; never touches an XML library directly.

use super::xml::{XmlEvent, XmlEventSource};
use super::{ConfigElementSpec, Descriptor, Extension, ExtensionPoint, Import};
use crate::error::{Error, Result};
use crate::version::{MatchRule, Version};
use std::path::PathBuf;
use std::str::FromStr;

fn attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

#[derive(Default)]
struct PluginBuilder {
    id: Option<String>,
    name: Option<String>,
    version: Option<Version>,
    provider_name: Option<String>,
    abi_compatibility: Option<Version>,
    api_compatibility: Option<Version>,
    required_framework_version: Option<Version>,
    runtime_library: Option<String>,
    runtime_funcs_symbol: Option<String>,
    imports: Vec<Import>,
    extension_points: Vec<ExtensionPoint>,
    extensions: Vec<Extension>,
}

struct OpenConfigElement {
    name: String,
    attributes: Vec<(String, String)>,
    raw_text: String,
    children: Vec<ConfigElementSpec>,
}

struct ExtensionFrame {
    point_id: String,
    local_id: Option<String>,
    name: Option<String>,
    config_stack: Vec<OpenConfigElement>,
}

enum State {
    Begin,
    Plugin,
    Requires,
    Extension(ExtensionFrame),
    /// Swallows an unrecognized or structurally-opaque subtree `depth`
    /// elements deep, then resumes the state it was pushed from.
    Skip { depth: u32, resume: Box<State> },
    End,
}

struct Loader {
    state: State,
    builder: PluginBuilder,
    structural_errors: u32,
    resource_errors: u32,
    warnings: Vec<String>,
}

impl Loader {
    fn new() -> Self {
        Loader {
            state: State::Begin,
            builder: PluginBuilder::default(),
            structural_errors: 0,
            resource_errors: 0,
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    fn error(&mut self, msg: impl Into<String>) {
        self.structural_errors += 1;
        self.warn(msg);
    }

    fn handle(&mut self, event: XmlEvent) {
        let state = std::mem::replace(&mut self.state, State::End);
        self.state = match state {
            State::Begin => self.on_begin(event),
            State::Plugin => self.on_plugin(event),
            State::Requires => self.on_requires(event),
            State::Extension(frame) => self.on_extension(event, frame),
            State::Skip { depth, resume } => self.on_skip(event, depth, resume),
            State::End => State::End,
        };
    }

    fn on_begin(&mut self, event: XmlEvent) -> State {
        match event {
            XmlEvent::ElementStart { name, attributes } if name == "plugin" => {
                match attr(&attributes, "id") {
                    Some(id) => self.builder.id = Some(id.to_string()),
                    None => self.error("plugin element missing required 'id' attribute"),
                }
                match attr(&attributes, "version").map(Version::from_str) {
                    Some(Ok(v)) => self.builder.version = Some(v),
                    Some(Err(e)) => self.error(format!("invalid plugin version: {e}")),
                    None => self.error("plugin element missing required 'version' attribute"),
                }
                self.builder.name = attr(&attributes, "name").map(str::to_string);
                self.builder.provider_name =
                    attr(&attributes, "provider-name").map(str::to_string);
                State::Plugin
            }
            XmlEvent::ElementStart { name, .. } => {
                self.error(format!("expected root element 'plugin', found '{name}'"));
                State::Skip {
                    depth: 1,
                    resume: Box::new(State::Begin),
                }
            }
            _ => State::Begin,
        }
    }

    fn on_plugin(&mut self, event: XmlEvent) -> State {
        match event {
            XmlEvent::ElementStart { name, attributes } => match name.as_str() {
                "backwards-compatibility" => {
                    self.builder.abi_compatibility = self.parse_opt_version(&attributes, "abi");
                    self.builder.api_compatibility = self.parse_opt_version(&attributes, "api");
                    State::Skip {
                        depth: 1,
                        resume: Box::new(State::Plugin),
                    }
                }
                "requires" => State::Requires,
                "runtime" => {
                    match attr(&attributes, "library") {
                        Some(lib) => self.builder.runtime_library = Some(lib.to_string()),
                        None => self.error("runtime element missing required 'library' attribute"),
                    }
                    self.builder.runtime_funcs_symbol =
                        attr(&attributes, "funcs").map(str::to_string);
                    State::Skip {
                        depth: 1,
                        resume: Box::new(State::Plugin),
                    }
                }
                "extension-point" => {
                    let local_id = attr(&attributes, "id").map(str::to_string);
                    if local_id.is_none() {
                        self.error("extension-point missing required 'id' attribute");
                    }
                    if let (Some(local_id), Some(plugin_id)) = (local_id, self.builder.id.clone())
                    {
                        self.builder.extension_points.push(ExtensionPoint {
                            global_id: format!("{plugin_id}.{local_id}"),
                            local_id,
                            name: attr(&attributes, "name").map(str::to_string),
                            schema: attr(&attributes, "schema").map(str::to_string),
                        });
                    }
                    State::Skip {
                        depth: 1,
                        resume: Box::new(State::Plugin),
                    }
                }
                "extension" => {
                    let point_id = match attr(&attributes, "point") {
                        Some(p) => p.to_string(),
                        None => {
                            self.error("extension missing required 'point' attribute");
                            String::new()
                        }
                    };
                    let local_id = attr(&attributes, "id").map(str::to_string);
                    State::Extension(ExtensionFrame {
                        point_id,
                        local_id,
                        name: attr(&attributes, "name").map(str::to_string),
                        config_stack: vec![OpenConfigElement {
                            name: "extension".to_string(),
                            attributes: attributes.clone(),
                            raw_text: String::new(),
                            children: Vec::new(),
                        }],
                    })
                }
                other => {
                    self.warn(format!("ignoring unrecognized element '{other}'"));
                    State::Skip {
                        depth: 1,
                        resume: Box::new(State::Plugin),
                    }
                }
            },
            XmlEvent::ElementEnd { name } if name == "plugin" => State::End,
            _ => State::Plugin,
        }
    }

    fn parse_opt_version(&mut self, attrs: &[(String, String)], key: &str) -> Option<Version> {
        match attr(attrs, key).map(Version::from_str) {
            Some(Ok(v)) => Some(v),
            Some(Err(e)) => {
                self.error(format!("invalid '{key}' version: {e}"));
                None
            }
            None => None,
        }
    }

    fn on_requires(&mut self, event: XmlEvent) -> State {
        match event {
            XmlEvent::ElementStart { name, attributes } if name == "import" => {
                self.handle_import(&attributes);
                State::Skip {
                    depth: 1,
                    resume: Box::new(State::Requires),
                }
            }
            XmlEvent::ElementStart { .. } => State::Skip {
                depth: 1,
                resume: Box::new(State::Requires),
            },
            XmlEvent::ElementEnd { name } if name == "requires" => State::Plugin,
            _ => State::Requires,
        }
    }

    fn handle_import(&mut self, attributes: &[(String, String)]) {
        let plugin_id = match attr(attributes, "plugin") {
            Some(p) => p.to_string(),
            None => {
                self.error("import missing required 'plugin' attribute");
                return;
            }
        };
        let match_rule = match attr(attributes, "match") {
            Some(s) => match MatchRule::parse(s) {
                Some(m) => m,
                None => {
                    self.error(format!("unknown match rule '{s}'"));
                    MatchRule::None
                }
            },
            None => MatchRule::None,
        };
        let version_str = attr(attributes, "version");
        if match_rule != MatchRule::None && version_str.map(str::is_empty).unwrap_or(true) {
            self.error("non-'none' match rule requires a non-empty 'version' attribute");
            return;
        }
        let version = match version_str.map(Version::from_str) {
            Some(Ok(v)) => Some(v),
            Some(Err(e)) => {
                self.error(format!("invalid import version: {e}"));
                None
            }
            None => None,
        };
        let optional = match attr(attributes, "optional") {
            Some("true") | Some("1") => true,
            Some("false") | Some("0") | None => false,
            Some(other) => {
                self.error(format!("invalid 'optional' value '{other}'"));
                false
            }
        };
        self.builder.imports.push(Import {
            plugin_id,
            version,
            match_rule,
            optional,
        });
    }

    fn on_extension(&mut self, event: XmlEvent, mut frame: ExtensionFrame) -> State {
        match event {
            XmlEvent::ElementStart { name, attributes } => {
                frame.config_stack.push(OpenConfigElement {
                    name,
                    attributes,
                    raw_text: String::new(),
                    children: Vec::new(),
                });
                State::Extension(frame)
            }
            XmlEvent::CharacterData(text) => {
                if let Some(top) = frame.config_stack.last_mut() {
                    top.raw_text.push_str(&text);
                }
                State::Extension(frame)
            }
            XmlEvent::ElementEnd { name } => {
                let open = frame
                    .config_stack
                    .pop()
                    .expect("config_stack always has the extension root while in Extension state");
                let trimmed = open.raw_text.trim();
                let spec = ConfigElementSpec {
                    name: open.name,
                    attributes: open.attributes,
                    value: if trimmed.is_empty() {
                        None
                    } else {
                        Some(trimmed.to_string())
                    },
                    children: open.children,
                };

                if frame.config_stack.is_empty() {
                    // This was the synthetic extension root, closed by the
                    // matching </extension>.
                    debug_assert_eq!(name, "extension");
                    let local_id = frame.local_id.clone();
                    let global_id = match (&self.builder.id, &local_id) {
                        (Some(pid), Some(lid)) => Some(format!("{pid}.{lid}")),
                        _ => None,
                    };
                    self.builder.extensions.push(Extension {
                        point_id: frame.point_id,
                        local_id,
                        global_id,
                        name: frame.name,
                        configuration: spec.freeze(),
                    });
                    State::Plugin
                } else {
                    frame.config_stack.last_mut().unwrap().children.push(spec);
                    State::Extension(frame)
                }
            }
        }
    }

    fn on_skip(&mut self, event: XmlEvent, depth: u32, resume: Box<State>) -> State {
        match event {
            XmlEvent::ElementStart { .. } => State::Skip {
                depth: depth + 1,
                resume,
            },
            XmlEvent::ElementEnd { .. } => {
                if depth <= 1 {
                    *resume
                } else {
                    State::Skip {
                        depth: depth - 1,
                        resume,
                    }
                }
            }
            XmlEvent::CharacterData(_) => State::Skip { depth, resume },
        }
    }
}

/// Parse a descriptor from a streaming event source. `install_path`, if
/// given, becomes the descriptor's `path` and is not otherwise interpreted.
pub fn load_descriptor(
    source: &mut dyn XmlEventSource,
    install_path: Option<PathBuf>,
) -> Result<Descriptor> {
    let mut loader = Loader::new();

    loop {
        match source.next_event() {
            Ok(Some(event)) => loader.handle(event),
            Ok(None) => break,
            Err(io_err) => return Err(Error::Io(io_err)),
        }
    }

    if !matches!(loader.state, State::End) {
        loader.error("descriptor stream ended before '</plugin>'");
    }

    for w in &loader.warnings {
        tracing::warn!(target: "cpluff_core::descriptor", "{w}");
    }

    if loader.structural_errors > 0 {
        return Err(Error::Malformed(loader.warnings.join("; ")));
    }
    if loader.resource_errors > 0 {
        return Err(Error::Resource("allocation failure while loading descriptor".into()));
    }

    let b = loader.builder;
    Ok(Descriptor {
        id: b.id.expect("checked non-empty by structural_errors == 0"),
        name: b.name,
        version: b.version.expect("checked non-empty by structural_errors == 0"),
        provider_name: b.provider_name,
        path: install_path,
        abi_compatibility: b.abi_compatibility,
        api_compatibility: b.api_compatibility,
        required_framework_version: b.required_framework_version,
        runtime_library: b.runtime_library,
        runtime_funcs_symbol: b.runtime_funcs_symbol,
        imports: b.imports,
        extension_points: b.extension_points,
        extensions: b.extensions,
    })
}
