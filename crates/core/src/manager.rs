use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use crate::backend::Volume;
use crate::backend::local::LocalVolume;
use crate::backend::s3::S3Volume;
use crate::client::{self, ClientFactory};
use crate::config::{
    DEFAULT_VOLUME, LocalSettings, ObjectStoreDefaults, S3Settings, VolumeDefinition,
    VolumesConfig,
};
use crate::error::{Error, Result, Underlying};

/// Turns a volume definition into a live driver.
pub trait DriverFactory: Send + Sync {
    fn create(&self, name: &str, definition: &VolumeDefinition) -> Result<Arc<dyn Volume>>;
}

fn mismatch(name: &str, expected: &str, definition: &VolumeDefinition) -> Error {
    Error::Unknown {
        path: String::new(),
        bucket: None,
        underlying: Underlying::new(
            "DefinitionMismatch",
            format!(
                "volume {name} is a {} volume, driver expects {expected}",
                definition.protocol()
            ),
        ),
    }
}

pub struct LocalDriver;

impl DriverFactory for LocalDriver {
    fn create(&self, name: &str, definition: &VolumeDefinition) -> Result<Arc<dyn Volume>> {
        let VolumeDefinition::Local(settings) = definition else {
            return Err(mismatch(name, crate::backend::local::PROTOCOL, definition));
        };
        Ok(Arc::new(LocalVolume::new(settings.resolve())?))
    }
}

/// Builds [`S3Volume`]s, filling unset settings from `defaults`.
pub struct S3Driver {
    defaults: ObjectStoreDefaults,
    client_factory: ClientFactory,
}

impl S3Driver {
    pub fn new(defaults: ObjectStoreDefaults, client_factory: ClientFactory) -> Self {
        Self {
            defaults,
            client_factory,
        }
    }
}

impl DriverFactory for S3Driver {
    fn create(&self, name: &str, definition: &VolumeDefinition) -> Result<Arc<dyn Volume>> {
        let VolumeDefinition::S3(settings) = definition else {
            return Err(mismatch(name, crate::backend::s3::PROTOCOL, definition));
        };
        let config = settings.resolve(&self.defaults)?;
        Ok(Arc::new(S3Volume::new(&config, &self.client_factory)?))
    }
}

#[derive(Default)]
struct Registry {
    drivers: HashMap<String, Arc<dyn DriverFactory>>,
    definitions: BTreeMap<String, VolumeDefinition>,
    instances: HashMap<String, Arc<dyn Volume>>,
}

/// Maps volume names to drivers. Each volume is built on first access and
/// the same instance is handed out afterwards.
pub struct VolumeManager {
    default_volume: String,
    registry: RwLock<Registry>,
}

impl VolumeManager {
    /// Registry with the `fs` and `s3` drivers and one volume of each,
    /// named after its protocol.
    pub fn new(defaults: ObjectStoreDefaults) -> Self {
        Self::with_client_factory(defaults, client::default_factory())
    }

    pub fn with_client_factory(defaults: ObjectStoreDefaults, client_factory: ClientFactory) -> Self {
        let mut registry = Registry::default();
        registry.drivers.insert(
            crate::backend::local::PROTOCOL.to_string(),
            Arc::new(LocalDriver),
        );
        registry.drivers.insert(
            crate::backend::s3::PROTOCOL.to_string(),
            Arc::new(S3Driver::new(defaults, client_factory)),
        );
        registry.definitions.insert(
            crate::backend::local::PROTOCOL.to_string(),
            VolumeDefinition::Local(LocalSettings::default()),
        );
        registry.definitions.insert(
            crate::backend::s3::PROTOCOL.to_string(),
            VolumeDefinition::S3(S3Settings::default()),
        );

        Self {
            default_volume: DEFAULT_VOLUME.to_string(),
            registry: RwLock::new(registry),
        }
    }

    /// Built-in registry extended with the volumes of `config`, which
    /// replace built-in definitions of the same name.
    pub fn from_config(
        config: VolumesConfig,
        defaults: ObjectStoreDefaults,
        client_factory: ClientFactory,
    ) -> Self {
        let mut manager = Self::with_client_factory(defaults, client_factory);
        if let Some(default_volume) = config.default_volume {
            manager.default_volume = default_volume;
        }
        for (name, definition) in config.volumes {
            manager.add_volume(&name, definition, true);
        }
        manager
    }

    pub fn default_volume(&self) -> &str {
        &self.default_volume
    }

    /// The volume called `name`, or the default volume.
    pub fn volume(&self, name: Option<&str>) -> Result<Arc<dyn Volume>> {
        let name = name.unwrap_or(&self.default_volume);

        let (definition, driver) = {
            let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(volume) = registry.instances.get(name) {
                return Ok(volume.clone());
            }
            let definition = registry
                .definitions
                .get(name)
                .cloned()
                .ok_or_else(|| Error::UnknownVolume {
                    name: name.to_string(),
                })?;
            let driver = registry
                .drivers
                .get(definition.protocol())
                .cloned()
                .ok_or_else(|| Error::UnknownDriver {
                    protocol: definition.protocol().to_string(),
                })?;
            (definition, driver)
        };

        let created = driver.create(name, &definition)?;
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        // A concurrent caller may have won the race; keep its instance.
        let volume = registry
            .instances
            .entry(name.to_string())
            .or_insert_with(|| {
                info!(volume = name, protocol = definition.protocol(), "volume opened");
                created
            })
            .clone();
        Ok(volume)
    }

    /// Defines `name`. An existing definition is kept unless `overwrite` is
    /// set, in which case any live instance is dropped too. Returns whether
    /// the definition was stored.
    pub fn add_volume(&self, name: &str, definition: VolumeDefinition, overwrite: bool) -> bool {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        if registry.definitions.contains_key(name) && !overwrite {
            debug!(volume = name, "volume already defined, keeping existing definition");
            return false;
        }
        registry.instances.remove(name);
        debug!(volume = name, protocol = definition.protocol(), "volume defined");
        registry.definitions.insert(name.to_string(), definition);
        true
    }

    /// Registers the factory for `protocol`, replacing any previous one.
    /// Volumes already opened keep the driver they were built with.
    pub fn add_driver(&self, protocol: &str, driver: Arc<dyn DriverFactory>) {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        debug!(protocol, "driver registered");
        registry.drivers.insert(protocol.to_string(), driver);
    }

    pub fn driver(&self, protocol: &str) -> Result<Arc<dyn DriverFactory>> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry
            .drivers
            .get(protocol)
            .cloned()
            .ok_or_else(|| Error::UnknownDriver {
                protocol: protocol.to_string(),
            })
    }

    pub fn definition(&self, name: &str) -> Option<VolumeDefinition> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry.definitions.get(name).cloned()
    }

    /// Defined volume names with their protocols, sorted by name.
    pub fn volumes(&self) -> Vec<(String, &'static str)> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry
            .definitions
            .iter()
            .map(|(name, definition)| (name.clone(), definition.protocol()))
            .collect()
    }
}
