//! Turns a set of actors into an immutable, acyclic workflow graph
//!
//! Every input port not bound by an explicit connection is matched by type
//! against all output ports. Single/Any ports need exactly one candidate;
//! All ports take every candidate. Any problem aborts the whole build.

use checkcore::port::require_type;
use checkcore::{
    ActorNode, Cardinality, Connection, ConstructionError, InputPort, TypeRegistry, Value,
};
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// One producer output feeding a consumer input
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProducerRef {
    pub actor: String,
    pub port: String,
}

impl ProducerRef {
    fn label(&self) -> String {
        format!("{}.{}", self.actor, self.port)
    }
}

/// How an input port is fed at run time
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Single(ProducerRef),
    /// Producers keyed by actor name (or `actor.port` when one actor
    /// contributes several outputs)
    All(BTreeMap<String, ProducerRef>),
    Initial(Value),
}

impl Binding {
    pub fn producers(&self) -> Vec<&ProducerRef> {
        match self {
            Binding::Single(p) => vec![p],
            Binding::All(map) => map.values().collect(),
            Binding::Initial(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub producer: String,
    pub producer_port: String,
    pub consumer: String,
    pub consumer_port: String,
}

/// Immutable result of wiring: actors, bindings and a topological order
#[derive(Debug)]
pub struct WorkflowGraph {
    name: String,
    registry: Arc<TypeRegistry>,
    actors: BTreeMap<String, ActorNode>,
    bindings: BTreeMap<String, BTreeMap<String, Binding>>,
    edges: Vec<Edge>,
    graph: DiGraph<String, ()>,
    indices: HashMap<String, NodeIndex>,
    order: Vec<String>,
}

impl WorkflowGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn actors(&self) -> impl Iterator<Item = &ActorNode> {
        self.actors.values()
    }

    pub fn actor(&self, name: &str) -> Option<&ActorNode> {
        self.actors.get(name)
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    pub fn bindings(&self, actor: &str) -> Option<&BTreeMap<String, Binding>> {
        self.bindings.get(actor)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Actors in an order consistent with every edge
    pub fn topological_order(&self) -> &[String] {
        &self.order
    }

    /// Names of the actors `actor` directly depends on
    pub fn dependencies(&self, actor: &str) -> Vec<&str> {
        let Some(idx) = self.indices.get(actor) else {
            return Vec::new();
        };
        let mut deps: Vec<&str> = self
            .graph
            .neighbors_directed(*idx, petgraph::Direction::Incoming)
            .map(|dep| self.graph[dep].as_str())
            .collect();
        deps.sort_unstable();
        deps
    }

    /// `(port, actor)` for every output marked final
    pub fn final_ports(&self) -> Vec<(&str, &str)> {
        self.actors
            .values()
            .flat_map(|actor| {
                actor
                    .outports()
                    .iter()
                    .filter(|(_, out)| out.is_final)
                    .map(move |(port, _)| (port.as_str(), actor.name()))
            })
            .collect()
    }
}

/// Builds a [`WorkflowGraph`] against a resolved type registry
pub struct WiringResolver {
    registry: Arc<TypeRegistry>,
}

impl WiringResolver {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    /// Wire `actors` into a graph.
    ///
    /// `connections` pin specific inputs to specific outputs; everything else
    /// is matched by type. `initial` supplies values for Initial ports, keyed
    /// by port name.
    pub fn resolve(
        &self,
        name: impl Into<String>,
        actors: Vec<ActorNode>,
        connections: &[Connection],
        initial: &BTreeMap<String, Value>,
    ) -> Result<WorkflowGraph, ConstructionError> {
        let actors = self.index_actors(actors)?;
        self.check_port_types(&actors)?;

        let explicit = self.explicit_bindings(&actors, connections)?;

        let mut bindings: BTreeMap<String, BTreeMap<String, Binding>> = BTreeMap::new();
        for actor in actors.values() {
            let mut actor_bindings = BTreeMap::new();
            for (port, spec) in actor.inports() {
                let binding = match spec {
                    InputPort::Initial => {
                        let value = initial.get(port).ok_or_else(|| {
                            ConstructionError::MissingInitialValue {
                                actor: actor.name().to_string(),
                                port: port.clone(),
                            }
                        })?;
                        Binding::Initial(value.clone())
                    }
                    InputPort::Wired(contract) => {
                        let key = (actor.name().to_string(), port.clone());
                        let producers = match explicit.get(&key) {
                            Some(pinned) => pinned.clone(),
                            None => self.candidates(&actors, &contract.accepted_type),
                        };
                        self.bind(
                            actor.name(),
                            port,
                            contract.cardinality,
                            &contract.accepted_type,
                            producers,
                        )?
                    }
                };
                actor_bindings.insert(port.clone(), binding);
            }
            bindings.insert(actor.name().to_string(), actor_bindings);
        }

        let mut graph = DiGraph::new();
        let mut indices = HashMap::new();
        for name in actors.keys() {
            indices.insert(name.clone(), graph.add_node(name.clone()));
        }

        let mut edges = Vec::new();
        for (consumer, ports) in &bindings {
            for (consumer_port, binding) in ports {
                for producer in binding.producers() {
                    graph.update_edge(indices[&producer.actor], indices[consumer], ());
                    edges.push(Edge {
                        producer: producer.actor.clone(),
                        producer_port: producer.port.clone(),
                        consumer: consumer.clone(),
                        consumer_port: consumer_port.clone(),
                    });
                }
            }
        }

        check_acyclic(&graph)?;
        let order = toposort(&graph, None)
            .map_err(|cycle| ConstructionError::CyclicDependency {
                actors: vec![graph[cycle.node_id()].clone()],
            })?
            .into_iter()
            .map(|idx| graph[idx].clone())
            .collect();

        Ok(WorkflowGraph {
            name: name.into(),
            registry: self.registry.clone(),
            actors,
            bindings,
            edges,
            graph,
            indices,
            order,
        })
    }

    fn index_actors(
        &self,
        actors: Vec<ActorNode>,
    ) -> Result<BTreeMap<String, ActorNode>, ConstructionError> {
        let mut indexed = BTreeMap::new();
        for actor in actors {
            let name = actor.name().to_string();
            if indexed.insert(name.clone(), actor).is_some() {
                return Err(ConstructionError::DuplicateActor(name));
            }
        }
        Ok(indexed)
    }

    fn check_port_types(
        &self,
        actors: &BTreeMap<String, ActorNode>,
    ) -> Result<(), ConstructionError> {
        let mut finals: BTreeMap<&str, &str> = BTreeMap::new();
        for actor in actors.values() {
            for (port, spec) in actor.inports() {
                if let Some(contract) = spec.contract() {
                    require_type(&self.registry, actor.name(), port, &contract.accepted_type)?;
                }
            }
            for (port, out) in actor.outports() {
                require_type(&self.registry, actor.name(), port, &out.msg_type)?;
                if out.is_final {
                    if let Some(first) = finals.insert(port.as_str(), actor.name()) {
                        return Err(ConstructionError::DuplicateFinalPort {
                            port: port.clone(),
                            first: first.to_string(),
                            second: actor.name().to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn explicit_bindings(
        &self,
        actors: &BTreeMap<String, ActorNode>,
        connections: &[Connection],
    ) -> Result<HashMap<(String, String), Vec<ProducerRef>>, ConstructionError> {
        let mut pinned: HashMap<(String, String), Vec<ProducerRef>> = HashMap::new();

        for conn in connections {
            let producer = actors
                .get(&conn.from_actor)
                .ok_or_else(|| ConstructionError::ActorNotFound(conn.from_actor.clone()))?;
            let consumer = actors
                .get(&conn.to_actor)
                .ok_or_else(|| ConstructionError::ActorNotFound(conn.to_actor.clone()))?;

            let out = producer.outports().get(&conn.from_port).ok_or_else(|| {
                ConstructionError::PortNotFound {
                    actor: conn.from_actor.clone(),
                    port: conn.from_port.clone(),
                }
            })?;
            let contract = match consumer.inports().get(&conn.to_port) {
                Some(InputPort::Wired(contract)) => contract,
                Some(InputPort::Initial) => {
                    return Err(ConstructionError::InitialPortConnected {
                        actor: conn.to_actor.clone(),
                        port: conn.to_port.clone(),
                    })
                }
                None => {
                    return Err(ConstructionError::PortNotFound {
                        actor: conn.to_actor.clone(),
                        port: conn.to_port.clone(),
                    })
                }
            };

            if !contract.accepts(&self.registry, &out.msg_type) {
                return Err(ConstructionError::PortTypeMismatch {
                    producer: conn.from_actor.clone(),
                    producer_port: conn.from_port.clone(),
                    produced: out.msg_type.clone(),
                    consumer: conn.to_actor.clone(),
                    consumer_port: conn.to_port.clone(),
                    accepted: contract.accepted_type.clone(),
                });
            }

            let entry = pinned
                .entry((conn.to_actor.clone(), conn.to_port.clone()))
                .or_default();
            let producer_ref = ProducerRef {
                actor: conn.from_actor.clone(),
                port: conn.from_port.clone(),
            };
            if entry.contains(&producer_ref)
                || (!contract.cardinality.binds_many() && !entry.is_empty())
            {
                return Err(ConstructionError::PortAlreadyBound {
                    actor: conn.to_actor.clone(),
                    port: conn.to_port.clone(),
                });
            }
            entry.push(producer_ref);
        }

        Ok(pinned)
    }

    /// Every output port, across all actors, compatible with `accepted`
    fn candidates(&self, actors: &BTreeMap<String, ActorNode>, accepted: &str) -> Vec<ProducerRef> {
        let registry: &TypeRegistry = &self.registry;
        actors
            .values()
            .flat_map(|actor| {
                actor
                    .outports()
                    .iter()
                    .filter(move |(_, out)| registry.is_subtype(&out.msg_type, accepted))
                    .map(move |(port, _)| ProducerRef {
                        actor: actor.name().to_string(),
                        port: port.clone(),
                    })
            })
            .collect()
    }

    fn bind(
        &self,
        actor: &str,
        port: &str,
        cardinality: Cardinality,
        accepted: &str,
        mut producers: Vec<ProducerRef>,
    ) -> Result<Binding, ConstructionError> {
        producers.sort();

        if cardinality.binds_many() {
            debug!(actor, port, producers = ?producers, "bound all compatible producers");
            return keyed_by_actor(actor, port, producers).map(Binding::All);
        }

        match producers.len() {
            0 => Err(ConstructionError::UnsatisfiedDependency {
                actor: actor.to_string(),
                port: port.to_string(),
                accepted: accepted.to_string(),
            }),
            1 => {
                let producer = producers.remove(0);
                debug!(actor, port, producer = %producer.label(), "bound single producer");
                Ok(Binding::Single(producer))
            }
            _ => Err(ConstructionError::AmbiguousWiring {
                actor: actor.to_string(),
                port: port.to_string(),
                accepted: accepted.to_string(),
                candidates: producers.iter().map(ProducerRef::label).collect(),
            }),
        }
    }
}

/// Keys an All port's producers by actor name, or by `actor.port` when one
/// actor contributes several outputs. Two producers landing on the same key
/// (actor `a.b` next to actor `a` port `b`) are rejected.
fn keyed_by_actor(
    actor: &str,
    port: &str,
    producers: Vec<ProducerRef>,
) -> Result<BTreeMap<String, ProducerRef>, ConstructionError> {
    let mut per_actor: HashMap<&str, usize> = HashMap::new();
    for p in &producers {
        *per_actor.entry(p.actor.as_str()).or_default() += 1;
    }
    let shared: Vec<bool> = producers
        .iter()
        .map(|p| per_actor[p.actor.as_str()] > 1)
        .collect();

    let mut keyed = BTreeMap::new();
    for (p, shared) in producers.into_iter().zip(shared) {
        let key = if shared { p.label() } else { p.actor.clone() };
        if let Some(first) = keyed.get(&key) {
            return Err(ConstructionError::DuplicateProducerKey {
                actor: actor.to_string(),
                port: port.to_string(),
                key,
                producers: vec![ProducerRef::label(first), p.label()],
            });
        }
        keyed.insert(key, p);
    }
    Ok(keyed)
}

fn check_acyclic(graph: &DiGraph<String, ()>) -> Result<(), ConstructionError> {
    let mut cyclic: Vec<String> = tarjan_scc(graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .flatten()
        .map(|idx| graph[idx].clone())
        .collect();

    if cyclic.is_empty() {
        return Ok(());
    }
    cyclic.sort();
    Err(ConstructionError::CyclicDependency { actors: cyclic })
}
