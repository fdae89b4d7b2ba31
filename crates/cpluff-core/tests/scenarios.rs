//! End-to-end scenarios against the public `Context` API, covering the
//! install/inspect, version-selection, circular-resolve, conflict, and
//! restart-active-upgrade cases.

use cpluff_core::config::ContextConfig;
use cpluff_core::context::Context;
use cpluff_core::descriptor::Descriptor;
use cpluff_core::error::Status;
use cpluff_core::lifecycle::PluginState;
use cpluff_core::observer::{EventListener, Severity};
use cpluff_core::source::{PluginSource, ScanFlags};
use std::sync::{Arc, Mutex};

fn descriptor(id: &str, version: &str) -> Descriptor {
    Descriptor {
        id: id.to_string(),
        name: None,
        version: version.parse().unwrap(),
        provider_name: None,
        path: None,
        abi_compatibility: None,
        api_compatibility: None,
        required_framework_version: None,
        runtime_library: None,
        runtime_funcs_symbol: None,
        imports: vec![],
        extension_points: vec![],
        extensions: vec![],
    }
}

fn descriptor_importing(id: &str, version: &str, import: &str) -> Descriptor {
    let mut d = descriptor(id, version);
    d.imports.push(cpluff_core::descriptor::Import {
        plugin_id: import.to_string(),
        version: None,
        match_rule: cpluff_core::version::MatchRule::None,
        optional: false,
    });
    d
}

struct OneShotSource(Vec<Option<Descriptor>>);
impl PluginSource for OneShotSource {
    fn scan(&mut self) -> Vec<Descriptor> {
        self.0.iter_mut().filter_map(|d| d.take()).collect()
    }
}

#[derive(Default)]
struct EventLog(Mutex<Vec<(String, PluginState, PluginState)>>);
impl EventListener for EventLog {
    fn on_event(&self, id: &str, old: PluginState, new: PluginState) {
        self.0.lock().unwrap().push((id.to_string(), old, new));
    }
}

#[test]
fn scenario_install_and_inspect() {
    let ctx = Context::new(ContextConfig::default());
    assert!(ctx.get_state("minimal").is_err());
    ctx.install(descriptor("minimal", "1.0")).unwrap();
    assert_eq!(ctx.get_state("minimal").unwrap(), PluginState::Installed);
    ctx.uninstall("minimal").unwrap();
    assert!(ctx.get_state("minimal").is_err());
}

#[test]
fn scenario_version_selection() {
    let ctx = Context::new(ContextConfig::default());
    ctx.register_source(Box::new(OneShotSource(vec![Some(descriptor("p", "1.0.0"))])));
    ctx.register_source(Box::new(OneShotSource(vec![Some(descriptor("p", "1.0.1"))])));
    ctx.scan(ScanFlags {
        install: true,
        ..Default::default()
    })
    .unwrap();
    assert_eq!(ctx.plugin_info("p").unwrap().version.to_string(), "1.0.1.0");
}

#[test]
fn scenario_circular_resolve() {
    let ctx = Context::new(ContextConfig::default());
    let events = Arc::new(EventLog::default());
    ctx.add_event_listener(events.clone()).unwrap();

    ctx.install(descriptor_importing("a", "1.0", "b")).unwrap();
    ctx.install(descriptor_importing("b", "1.0", "c")).unwrap();
    ctx.install(descriptor_importing("c", "1.0", "a")).unwrap();

    ctx.start("a").unwrap();
    assert_eq!(ctx.get_state("a").unwrap(), PluginState::Active);
    assert_eq!(ctx.get_state("b").unwrap(), PluginState::Active);
    assert_eq!(ctx.get_state("c").unwrap(), PluginState::Active);

    let log = events.0.lock().unwrap();
    for id in ["a", "b", "c"] {
        let resolved = log
            .iter()
            .filter(|(eid, old, new)| eid == id && *old == PluginState::Installed && *new == PluginState::Resolved)
            .count();
        let starting = log
            .iter()
            .filter(|(eid, old, new)| eid == id && *old == PluginState::Resolved && *new == PluginState::Starting)
            .count();
        let active = log
            .iter()
            .filter(|(eid, old, new)| eid == id && *old == PluginState::Starting && *new == PluginState::Active)
            .count();
        assert_eq!(resolved, 1, "{id} should resolve exactly once");
        assert_eq!(starting, 1, "{id} should enter starting exactly once");
        assert_eq!(active, 1, "{id} should become active exactly once");
    }
    drop(log);

    let before = events.0.lock().unwrap().len();
    ctx.start("a").unwrap();
    assert_eq!(events.0.lock().unwrap().len(), before, "repeat start emits no events");
}

#[test]
fn scenario_conflict() {
    let ctx = Context::new(ContextConfig::default());
    ctx.install(descriptor("d", "1.0")).unwrap();
    let err = ctx.install(descriptor("d", "2.0")).unwrap_err();
    assert_eq!(err.status(), Status::Conflict);
    assert_eq!(ctx.plugin_info("d").unwrap().version.to_string(), "1.0.0.0");
    assert_eq!(ctx.get_state("d").unwrap(), PluginState::Installed);
}

#[test]
fn scenario_restart_active_upgrade() {
    let ctx = Context::new(ContextConfig::default());
    ctx.install(descriptor("u", "1.0")).unwrap();
    ctx.start("u").unwrap();
    assert_eq!(ctx.get_state("u").unwrap(), PluginState::Active);

    ctx.register_source(Box::new(OneShotSource(vec![Some(descriptor("u", "2.0"))])));
    ctx.scan(ScanFlags {
        install: true,
        upgrade: true,
        restart_active: true,
        ..Default::default()
    })
    .unwrap();

    assert_eq!(ctx.plugin_info("u").unwrap().version.to_string(), "2.0.0.0");
    assert_eq!(ctx.get_state("u").unwrap(), PluginState::Active);
}

#[test]
fn stop_on_resolved_plugin_emits_no_events() {
    let ctx = Context::new(ContextConfig::default());
    ctx.install(descriptor("a", "1.0")).unwrap();
    ctx.resolve("a").unwrap();

    let events = Arc::new(EventLog::default());
    ctx.add_event_listener(events.clone()).unwrap();
    ctx.stop("a").unwrap();
    assert!(events.0.lock().unwrap().is_empty());
}

#[test]
fn uninstall_all_empties_the_identifier_map() {
    let ctx = Context::new(ContextConfig::default());
    ctx.install(descriptor_importing("a", "1.0", "b")).unwrap();
    ctx.install(descriptor("b", "1.0")).unwrap();
    ctx.start("a").unwrap();
    ctx.uninstall_all().unwrap();
    assert!(ctx.get_state("a").is_err());
    assert!(ctx.get_state("b").is_err());
    assert!(ctx.plugins_info().is_empty());
}

#[test]
fn logger_mirrors_to_tracing_and_registered_loggers() {
    struct Seen(Mutex<Vec<String>>);
    impl cpluff_core::observer::Logger for Seen {
        fn log(&self, _s: Severity, message: &str, _p: Option<&str>) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }
    let ctx = Context::new(ContextConfig::default());
    let seen = Arc::new(Seen(Mutex::new(Vec::new())));
    ctx.add_logger(seen.clone(), Severity::Info).unwrap();
    ctx.log(Severity::Error, "something went wrong", Some("a"));
    assert_eq!(seen.0.lock().unwrap().as_slice(), ["something went wrong"]);
}
