//! Engine registry – turns names and descriptors into ready engines.
//!
//! Render engines, crypto engines and conversion clients each live in
//! their own table. Names are matched case-insensitively. The built-in
//! implementations are registered by [`Registry::new`]; applications add
//! their own with the `register_*` methods.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::config::Options;
use crate::crypto::{CryptoEngine, PdftkCrypto};
use crate::engine::{
    BuiltinEngine, ClientSpec, ConversionClient, HttpConversionClient, PrinceXmlEngine,
    RemoteServiceEngine, RenderEngine, WkHtmlToPdfEngine,
};
use crate::error::{PdfError, Result};

pub type EngineFactory =
    Box<dyn Fn(&Options, &Registry) -> Result<Box<dyn RenderEngine>> + Send + Sync>;
pub type CryptoFactory = Box<dyn Fn(&Options) -> Result<Box<dyn CryptoEngine>> + Send + Sync>;
pub type ClientFactory =
    Box<dyn Fn(&ClientSpec) -> Result<Arc<dyn ConversionClient>> + Send + Sync>;

/// How an engine is asked for.
pub enum PluginDescriptor<T: ?Sized> {
    /// A registry name, instantiated with default options.
    Named(String),
    /// A registry name plus engine options.
    Configured { class_name: String, options: Options },
    /// A pre-built engine, used as is.
    Instance(Box<T>),
}

impl<T: ?Sized> PluginDescriptor<T> {
    /// Read a descriptor from configuration: a name, or a map holding a
    /// `className` next to the engine's own options.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(name) if !name.trim().is_empty() => {
                Ok(PluginDescriptor::Named(name.trim().to_string()))
            }
            Value::Object(map) => {
                let class_name = map
                    .get("className")
                    .and_then(Value::as_str)
                    .filter(|name| !name.trim().is_empty())
                    .ok_or_else(|| {
                        PdfError::config("engine descriptor is missing its \"className\"")
                    })?;
                let mut options = map.clone();
                options.remove("className");
                Ok(PluginDescriptor::Configured {
                    class_name: class_name.trim().to_string(),
                    options,
                })
            }
            other => Err(PdfError::config(format!(
                "an engine must be given by name or as a map with a \"className\", got {other}"
            ))),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        PluginDescriptor::Named(name.into())
    }

    pub fn configured(class_name: impl Into<String>, options: Options) -> Self {
        PluginDescriptor::Configured {
            class_name: class_name.into(),
            options,
        }
    }
}

impl<T: ?Sized> fmt::Debug for PluginDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginDescriptor::Named(name) => f.debug_tuple("Named").field(name).finish(),
            PluginDescriptor::Configured {
                class_name,
                options,
            } => f
                .debug_struct("Configured")
                .field("class_name", class_name)
                .field("options", options)
                .finish(),
            PluginDescriptor::Instance(_) => f.write_str("Instance(..)"),
        }
    }
}

pub type EngineDescriptor = PluginDescriptor<dyn RenderEngine>;
pub type CryptoDescriptor = PluginDescriptor<dyn CryptoEngine>;

struct Entry<F> {
    name: String,
    factory: F,
}

/// Lookup tables for every pluggable implementation.
pub struct Registry {
    engines: HashMap<String, Entry<EngineFactory>>,
    cryptos: HashMap<String, Entry<CryptoFactory>>,
    clients: HashMap<String, Entry<ClientFactory>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("engines", &self.engine_names())
            .field("cryptos", &self.crypto_names())
            .field("clients", &names(&self.clients))
            .finish()
    }
}

impl Registry {
    /// A registry with the built-in engines, crypto engine and client.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_engine(WkHtmlToPdfEngine::NAME, |options, _| {
            Ok(Box::new(WkHtmlToPdfEngine::from_options(options)?))
        });
        registry.register_engine(PrinceXmlEngine::NAME, |options, _| {
            Ok(Box::new(PrinceXmlEngine::from_options(options)?))
        });
        registry.register_engine(BuiltinEngine::NAME, |options, _| {
            Ok(Box::new(BuiltinEngine::from_options(options)?))
        });
        registry.register_engine(RemoteServiceEngine::NAME, |options, registry| {
            Ok(Box::new(RemoteServiceEngine::from_options(options, registry)?))
        });
        registry.register_crypto(PdftkCrypto::NAME, |options| {
            Ok(Box::new(PdftkCrypto::from_options(options)?))
        });
        registry.register_client(HttpConversionClient::NAME, |spec| {
            let url = spec.service_url.as_deref().ok_or_else(|| {
                PdfError::config("PdfReactor: the Http client needs a \"serviceUrl\"")
            })?;
            Ok(Arc::new(HttpConversionClient::new(url, spec.timeout)?))
        });
        registry
    }

    /// A registry with nothing in it.
    pub fn empty() -> Self {
        Self {
            engines: HashMap::new(),
            cryptos: HashMap::new(),
            clients: HashMap::new(),
        }
    }

    pub fn register_engine<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&Options, &Registry) -> Result<Box<dyn RenderEngine>> + Send + Sync + 'static,
    {
        insert(&mut self.engines, name, Box::new(factory));
        self
    }

    pub fn register_crypto<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&Options) -> Result<Box<dyn CryptoEngine>> + Send + Sync + 'static,
    {
        insert(&mut self.cryptos, name, Box::new(factory));
        self
    }

    pub fn register_client<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&ClientSpec) -> Result<Arc<dyn ConversionClient>> + Send + Sync + 'static,
    {
        insert(&mut self.clients, name, Box::new(factory));
        self
    }

    pub fn engine_names(&self) -> Vec<&str> {
        names(&self.engines)
    }

    pub fn crypto_names(&self) -> Vec<&str> {
        names(&self.cryptos)
    }

    pub fn resolve_engine(&self, descriptor: EngineDescriptor) -> Result<Box<dyn RenderEngine>> {
        let (name, options) = match descriptor {
            PluginDescriptor::Instance(engine) => return Ok(engine),
            PluginDescriptor::Named(name) => (name, Options::new()),
            PluginDescriptor::Configured {
                class_name,
                options,
            } => (class_name, options),
        };
        match self.engines.get(&key(&name)) {
            Some(entry) => {
                log::debug!("resolved render engine {}", entry.name);
                (entry.factory)(&options, self)
            }
            None if self.cryptos.contains_key(&key(&name)) => Err(PdfError::resolution(format!(
                "`{name}` is a crypto engine and cannot render"
            ))),
            None => Err(PdfError::resolution(format!("engine `{name}` not found"))),
        }
    }

    pub fn resolve_crypto(&self, descriptor: CryptoDescriptor) -> Result<Box<dyn CryptoEngine>> {
        let (name, options) = match descriptor {
            PluginDescriptor::Instance(crypto) => return Ok(crypto),
            PluginDescriptor::Named(name) => (name, Options::new()),
            PluginDescriptor::Configured {
                class_name,
                options,
            } => (class_name, options),
        };
        match self.cryptos.get(&key(&name)) {
            Some(entry) => {
                log::debug!("resolved crypto engine {}", entry.name);
                (entry.factory)(&options)
            }
            None if self.engines.contains_key(&key(&name)) => Err(PdfError::resolution(format!(
                "`{name}` is a render engine and cannot encrypt"
            ))),
            None => Err(PdfError::resolution(format!(
                "crypto engine `{name}` not found"
            ))),
        }
    }

    /// Build a conversion client. Unknown clients are a configuration error.
    pub fn resolve_client(&self, spec: &ClientSpec) -> Result<Arc<dyn ConversionClient>> {
        let entry = self.clients.get(&key(&spec.class_name)).ok_or_else(|| {
            PdfError::config(format!("PdfReactor: client \"{}\" not found", spec.class_name))
        })?;
        (entry.factory)(spec)
    }
}

fn key(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

fn insert<F>(table: &mut HashMap<String, Entry<F>>, name: &str, factory: F) {
    let name = name.trim();
    table.insert(
        key(name),
        Entry {
            name: name.to_string(),
            factory,
        },
    );
}

fn names<F>(table: &HashMap<String, Entry<F>>) -> Vec<&str> {
    let mut names: Vec<&str> = table.values().map(|e| e.name.as_str()).collect();
    names.sort_unstable();
    names
}
