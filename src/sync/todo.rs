//! Todo-list assembly: pure diffs of desired against actual state.
//!
//! # Responsibilities
//! - Correlate entities by name (API id, route name, plugin name, username)
//! - Split the result into add / update / delete work items
//! - Never propose ignored plugins or consumers for update or delete
//!
//! # Design Decisions
//! - Work items borrow from the fetched collections; nothing is cloned
//! - Lists are rebuilt from scratch every pass, never persisted
//! - Plugins on routes that cannot be resolved to a name are skipped

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::control_plane::{ApiConfig, ApiDefinition, PluginConfig, RouteDefinition};
use crate::gateway::{GatewayApi, GatewayConsumer, GatewayPlugin, GatewayRoute};
use crate::sync::desired::ConsumerDefinition;
use crate::sync::matching::{fields_match, plugin_matches, IgnoreList};

/// Work items of one reconciliation step.
#[derive(Debug)]
pub struct TodoList<A, U, D> {
    pub add: Vec<A>,
    pub update: Vec<U>,
    pub delete: Vec<D>,
}

impl<A, U, D> Default for TodoList<A, U, D> {
    fn default() -> Self {
        Self {
            add: Vec::new(),
            update: Vec::new(),
            delete: Vec::new(),
        }
    }
}

impl<A, U, D> TodoList<A, U, D> {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    pub fn len(&self) -> usize {
        self.add.len() + self.update.len() + self.delete.len()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ApiUpdate<'a> {
    pub desired: &'a ApiDefinition,
    pub actual: &'a GatewayApi,
}

pub type ApiTodos<'a> = TodoList<&'a ApiDefinition, ApiUpdate<'a>, &'a GatewayApi>;

/// A plugin to create, on the service or on the named route.
#[derive(Debug, Clone, Copy)]
pub struct PluginAdd<'a> {
    pub route: Option<&'a str>,
    pub plugin: &'a PluginConfig,
}

#[derive(Debug, Clone, Copy)]
pub struct PluginUpdate<'a> {
    pub desired: &'a PluginConfig,
    pub actual: &'a GatewayPlugin,
}

pub type PluginTodos<'a> = TodoList<PluginAdd<'a>, PluginUpdate<'a>, &'a GatewayPlugin>;

#[derive(Debug, Clone, Copy)]
pub struct RouteUpdate<'a> {
    pub desired: &'a RouteDefinition,
    pub actual: &'a GatewayRoute,
}

pub type RouteTodos<'a> = TodoList<&'a RouteDefinition, RouteUpdate<'a>, &'a GatewayRoute>;

#[derive(Debug, Clone, Copy)]
pub struct ConsumerUpdate<'a> {
    pub desired: &'a ConsumerDefinition,
    pub actual: &'a GatewayConsumer,
}

pub type ConsumerTodos<'a> =
    TodoList<&'a ConsumerDefinition, ConsumerUpdate<'a>, &'a GatewayConsumer>;

/// Diff APIs by `service.name == api.id`.
///
/// With `changed` set, only APIs in it become update candidates; additions
/// and deletions are always reported.
pub fn assemble_api_todos<'a>(
    desired: &'a [ApiDefinition],
    actual: &'a [GatewayApi],
    changed: Option<&HashSet<String>>,
) -> ApiTodos<'a> {
    let by_name: HashMap<&str, &GatewayApi> = actual.iter().map(|a| (a.name(), a)).collect();
    let mut matched = HashSet::new();
    let mut todos = ApiTodos::default();

    for api in desired {
        match by_name.get(api.id.as_str()) {
            Some(&existing) => {
                matched.insert(api.id.as_str());
                if changed.map_or(true, |ids| ids.contains(&api.id)) {
                    todos.update.push(ApiUpdate {
                        desired: api,
                        actual: existing,
                    });
                }
            }
            None => todos.add.push(api),
        }
    }

    todos.delete.extend(actual.iter().filter(|a| !matched.contains(a.name())));
    todos
}

/// Diff the plugins of one API.
///
/// `route_names` maps gateway route ids to route names; `None` means the
/// lookup failed and route-level plugins are left alone this pass.
pub fn assemble_plugin_todos<'a>(
    desired: &'a ApiConfig,
    actual: &'a [GatewayPlugin],
    route_names: Option<&HashMap<String, String>>,
    ignore: &IgnoreList,
) -> PluginTodos<'a> {
    let (route_plugins, service_plugins): (Vec<&GatewayPlugin>, Vec<&GatewayPlugin>) =
        actual.iter().partition(|p| p.is_route_scoped());

    let mut todos = PluginTodos::default();
    diff_by_name(&desired.plugins, &service_plugins, None, ignore, &mut todos);

    if desired.api.route_scoped_plugins() {
        if let Some(names) = route_names {
            diff_route_plugins(&desired.api.routes, &route_plugins, names, ignore, &mut todos);
        }
    } else {
        // Left over from route-scoped mode.
        todos
            .delete
            .extend(route_plugins.into_iter().filter(|p| !ignore.is_ignored(&p.name)));
    }
    todos
}

/// Diff the consumer-specific plugins of one consumer.
pub fn assemble_consumer_plugin_todos<'a>(
    desired: &'a [PluginConfig],
    actual: &'a [GatewayPlugin],
    ignore: &IgnoreList,
) -> PluginTodos<'a> {
    let actual: Vec<&GatewayPlugin> = actual.iter().collect();
    let mut todos = PluginTodos::default();
    diff_by_name(desired, &actual, None, ignore, &mut todos);
    todos
}

/// Diff the routes of one service by route name. Unnamed routes are not managed.
pub fn assemble_route_todos<'a>(
    desired: &'a [RouteDefinition],
    actual: &'a [GatewayRoute],
) -> RouteTodos<'a> {
    let by_name: HashMap<&str, &GatewayRoute> = actual
        .iter()
        .filter_map(|r| r.name.as_deref().map(|n| (n, r)))
        .collect();
    let mut handled = HashSet::new();
    let mut todos = RouteTodos::default();

    for route in desired {
        handled.insert(route.name.as_str());
        match by_name.get(route.name.as_str()) {
            Some(&existing) if !fields_match(&route.fields, &existing.fields) => {
                todos.update.push(RouteUpdate {
                    desired: route,
                    actual: existing,
                })
            }
            Some(_) => {}
            None => todos.add.push(route),
        }
    }

    todos.delete.extend(
        actual
            .iter()
            .filter(|r| r.name.as_deref().is_some_and(|n| !handled.contains(n))),
    );
    todos
}

/// Diff consumers by username.
///
/// Every consumer on both sides is an update candidate; the update step
/// decides whether anything changes.
pub fn assemble_consumer_todos<'a>(
    desired: &'a [ConsumerDefinition],
    actual: &'a [GatewayConsumer],
    ignore: &IgnoreList,
) -> ConsumerTodos<'a> {
    let by_username: HashMap<&str, &GatewayConsumer> =
        actual.iter().map(|c| (c.username.as_str(), c)).collect();
    let mut handled = HashSet::new();
    let mut todos = ConsumerTodos::default();

    for consumer in desired {
        match by_username.get(consumer.username.as_str()) {
            Some(&existing) => {
                handled.insert(consumer.username.as_str());
                if !ignore.ignores_consumer(existing) {
                    todos.update.push(ConsumerUpdate {
                        desired: consumer,
                        actual: existing,
                    });
                }
            }
            None => todos.add.push(consumer),
        }
    }

    todos.delete.extend(
        actual
            .iter()
            .filter(|c| !handled.contains(c.username.as_str()) && !ignore.ignores_consumer(c)),
    );
    todos
}

fn diff_by_name<'a>(
    desired: &'a [PluginConfig],
    actual: &[&'a GatewayPlugin],
    route: Option<&'a str>,
    ignore: &IgnoreList,
    todos: &mut PluginTodos<'a>,
) {
    let mut by_name: BTreeMap<&str, &'a GatewayPlugin> = BTreeMap::new();
    for &plugin in actual {
        if by_name.contains_key(plugin.name.as_str()) {
            // A second instance of the same plugin can never be matched.
            if !ignore.is_ignored(&plugin.name) {
                todos.delete.push(plugin);
            }
        } else {
            by_name.insert(plugin.name.as_str(), plugin);
        }
    }

    let mut handled = HashSet::new();
    for plugin in desired {
        handled.insert(plugin.name.as_str());
        match by_name.get(plugin.name.as_str()) {
            Some(&existing) => {
                if !ignore.is_ignored(&plugin.name) && !plugin_matches(plugin, existing) {
                    todos.update.push(PluginUpdate {
                        desired: plugin,
                        actual: existing,
                    });
                }
            }
            None => todos.add.push(PluginAdd { route, plugin }),
        }
    }

    todos.delete.extend(
        by_name
            .into_iter()
            .filter(|(name, _)| !handled.contains(name) && !ignore.is_ignored(name))
            .map(|(_, plugin)| plugin),
    );
}

fn diff_route_plugins<'a>(
    routes: &'a [RouteDefinition],
    actual: &[&'a GatewayPlugin],
    route_names: &HashMap<String, String>,
    ignore: &IgnoreList,
    todos: &mut PluginTodos<'a>,
) {
    let mut by_route: BTreeMap<&str, Vec<&'a GatewayPlugin>> = BTreeMap::new();
    for &plugin in actual {
        let Some(route_id) = plugin.route.as_ref().map(|r| r.id.as_str()) else {
            continue;
        };
        match route_names.get(route_id) {
            Some(name) => by_route.entry(name.as_str()).or_default().push(plugin),
            None => tracing::debug!(
                plugin = %plugin.id,
                route_id = %route_id,
                "Skipping plugin on unresolvable route"
            ),
        }
    }

    for route in routes {
        let existing = by_route.remove(route.name.as_str()).unwrap_or_default();
        diff_by_name(&route.plugins, &existing, Some(route.name.as_str()), ignore, todos);
    }

    // Routes that no longer declare plugins.
    for (_, orphaned) in by_route {
        todos
            .delete
            .extend(orphaned.into_iter().filter(|p| !ignore.is_ignored(&p.name)));
    }
}
