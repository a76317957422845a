use crate::{ConnectionInput, EngineError, ExecutionConfig, UserError, Value};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

const SCRUBBED: &str = "*****";

/// A named, typed credential/endpoint reference usable by tool bodies.
///
/// Secret values are scrubbed from Debug and serialized forms; tool bodies
/// read them through [`Connection::secret`]. Immutable for the run's
/// duration once resolved.
#[derive(Clone, PartialEq)]
pub struct Connection {
    pub name: String,
    pub kind: String,
    secrets: HashMap<String, String>,
    pub configs: HashMap<String, Value>,
}

impl Connection {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            secrets: HashMap::new(),
            configs: HashMap::new(),
        }
    }

    pub fn with_secret(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(key.into(), value.into());
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.configs.insert(key.into(), value.into());
        self
    }

    pub fn secret(&self, key: &str) -> Option<&str> {
        self.secrets.get(key).map(String::as_str)
    }

    pub fn secret_keys(&self) -> impl Iterator<Item = &str> {
        self.secrets.keys().map(String::as_str)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scrubbed: HashMap<&str, &str> =
            self.secrets.keys().map(|k| (k.as_str(), SCRUBBED)).collect();
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("secrets", &scrubbed)
            .field("configs", &self.configs)
            .finish()
    }
}

impl Serialize for Connection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let scrubbed: HashMap<&str, &str> =
            self.secrets.keys().map(|k| (k.as_str(), SCRUBBED)).collect();
        let mut state = serializer.serialize_struct("Connection", 4)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("kind", &self.kind)?;
        state.serialize_field("secrets", &scrubbed)?;
        state.serialize_field("configs", &self.configs)?;
        state.end()
    }
}

/// Resolved value of a node-scoped connection parameter.
#[derive(Debug, Clone)]
pub enum ConnectionValue {
    Literal(Value),
    Connection(Connection),
}

impl ConnectionValue {
    pub fn as_connection(&self) -> Option<&Connection> {
        match self {
            ConnectionValue::Connection(c) => Some(c),
            _ => None,
        }
    }
}

/// node name -> parameter name -> resolved value.
pub type ResolvedConnections = HashMap<String, HashMap<String, ConnectionValue>>;

/// External collaborator turning connection names into connection objects.
/// Secret/store details are outside the engine.
pub trait ConnectionProvider: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Connection, UserError>;
}

/// Provider over a fixed, pre-resolved set of connections.
#[derive(Default)]
pub struct StaticConnectionProvider {
    connections: HashMap<String, Connection>,
}

impl StaticConnectionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connection(mut self, connection: Connection) -> Self {
        self.connections.insert(connection.name.clone(), connection);
        self
    }
}

impl ConnectionProvider for StaticConnectionProvider {
    fn resolve(&self, name: &str) -> Result<Connection, UserError> {
        self.connections
            .get(name)
            .cloned()
            .ok_or_else(|| UserError::ConnectionNotFound(name.to_string()))
    }
}

/// Cache of resolved connection maps, keyed by the configuration's
/// deterministic identity key. Shared across rows within a run; safe to
/// share across concurrently executing rows.
#[derive(Default)]
pub struct ConnectionCache {
    entries: Mutex<HashMap<String, Arc<ResolvedConnections>>>,
}

impl ConnectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve every connection reference in the config, reusing a prior
    /// resolution when the identity key matches.
    pub fn resolve(
        &self,
        config: &ExecutionConfig,
        provider: &dyn ConnectionProvider,
    ) -> Result<Arc<ResolvedConnections>, EngineError> {
        let key = config.identity_key();
        if let Some(hit) = self
            .entries
            .lock()
            .expect("connection cache poisoned")
            .get(&key)
        {
            return Ok(Arc::clone(hit));
        }
        let mut resolved: ResolvedConnections = HashMap::new();
        for (node, params) in &config.connections {
            let entry = resolved.entry(node.clone()).or_default();
            for (param, input) in params {
                let value = match input {
                    ConnectionInput::Reference { connection } => {
                        ConnectionValue::Connection(provider.resolve(connection)?)
                    }
                    ConnectionInput::Literal(value) => ConnectionValue::Literal(value.clone()),
                };
                entry.insert(param.clone(), value);
            }
        }
        let resolved = Arc::new(resolved);
        self.entries
            .lock()
            .expect("connection cache poisoned")
            .insert(key, Arc::clone(&resolved));
        Ok(resolved)
    }
}
