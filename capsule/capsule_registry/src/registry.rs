//! The capability registry.
//!
//! The registry is the sole mutator of persisted capabilities. Every change
//! is validated, persisted through [`CapabilityStorage`] and only then
//! applied to the live [`CapabilityReference`]. Mutations are serialized by
//! a reentrant write lock, so a capability removed by its own validity
//! condition in the middle of another mutation re-enters cleanly. Readers
//! never block: they take a snapshot of the index.

use crate::capability::CapabilityFactory;
use crate::descriptor::{self, CapabilityDescriptorRegistry};
use crate::factory::CapabilityFactoryRegistry;
use crate::reference::CapabilityReference;
use crate::secrets;
use capsule_condition::{Conditions, SystemStatus};
use capsule_core::{
    CapabilityContext, CapabilityDescriptor, CapabilityError, CapabilityIdentity, CapabilityQuery,
    CapabilityRegistryEvent, CapabilityStorage, CapabilityStorageItem, CapabilityType, Cipher,
    EventBus, Properties, Result, ValidationError, Violation,
};
use parking_lot::{ReentrantMutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

type Index = HashMap<CapabilityIdentity, Arc<CapabilityReference>>;

/// Which capability types a mutation may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    /// Only types whose descriptor is exposed.
    Exposed,
    /// Any registered type.
    Internal,
}

/// Registry of live capabilities backed by persistent storage.
pub struct CapabilityRegistry {
    me: Weak<CapabilityRegistry>,
    storage: Arc<dyn CapabilityStorage>,
    cipher: Arc<dyn Cipher>,
    factories: Arc<CapabilityFactoryRegistry>,
    descriptors: Arc<CapabilityDescriptorRegistry>,
    conditions: Conditions,
    write_lock: ReentrantMutex<()>,
    references: RwLock<Arc<Index>>,
}

impl CapabilityRegistry {
    /// Create a registry.
    ///
    /// # Arguments
    ///
    /// * `storage` - Where capability items are persisted.
    /// * `cipher` - Encrypts property values flagged as encrypted.
    /// * `factories` - Creates capability instances per type.
    /// * `descriptors` - Metadata and validation per type.
    /// * `conditions` - Condition factory handed to capabilities. The registry
    ///   installs itself as its capability query.
    pub fn new(
        storage: Arc<dyn CapabilityStorage>,
        cipher: Arc<dyn Cipher>,
        factories: Arc<CapabilityFactoryRegistry>,
        descriptors: Arc<CapabilityDescriptorRegistry>,
        conditions: Conditions,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<CapabilityRegistry>| {
            let query: Weak<dyn CapabilityQuery> = me.clone();
            Self {
                me: me.clone(),
                storage,
                cipher,
                factories,
                descriptors,
                conditions: conditions.with_query(query),
                write_lock: ReentrantMutex::new(()),
                references: RwLock::new(Arc::new(Index::new())),
            }
        })
    }

    /// The event bus capability events are posted on.
    pub fn bus(&self) -> &Arc<EventBus> {
        self.conditions.bus()
    }

    /// The system status activation and validity depend on.
    pub fn system(&self) -> &SystemStatus {
        self.conditions.system()
    }

    /// The condition factory handed to capabilities.
    pub fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    /// Registered capability factories.
    pub fn factories(&self) -> &Arc<CapabilityFactoryRegistry> {
        &self.factories
    }

    /// Registered capability descriptors.
    pub fn descriptors(&self) -> &Arc<CapabilityDescriptorRegistry> {
        &self.descriptors
    }

    /// Add a new capability.
    ///
    /// The properties are validated before anything is persisted. Once
    /// stored, the capability is created and, if `enabled`, activated when
    /// its activation condition allows.
    ///
    /// # Errors
    ///
    /// `ValidationError` for an unsupported or non-exposed type or invalid
    /// properties, or a cipher or storage error. Nothing is persisted on error.
    pub fn add(
        &self,
        capability_type: CapabilityType,
        enabled: bool,
        notes: Option<String>,
        properties: Properties,
    ) -> Result<Arc<CapabilityReference>> {
        self.add_item(capability_type, enabled, notes, properties, Access::Exposed)
    }

    /// Add a capability of any registered type, including types whose
    /// descriptor is not exposed to administrators.
    pub fn add_non_exposed(
        &self,
        capability_type: CapabilityType,
        enabled: bool,
        notes: Option<String>,
        properties: Properties,
    ) -> Result<Arc<CapabilityReference>> {
        self.add_item(capability_type, enabled, notes, properties, Access::Internal)
    }

    fn add_item(
        &self,
        capability_type: CapabilityType,
        enabled: bool,
        notes: Option<String>,
        properties: Properties,
        access: Access,
    ) -> Result<Arc<CapabilityReference>> {
        let _guard = self.write_lock.lock();
        let (factory, descriptor) = self.resolve_type(&capability_type)?;
        check_access(descriptor.as_ref(), access)?;
        self.validate(descriptor.as_ref(), None, &properties)?;

        let stored = secrets::encrypt(self.cipher.as_ref(), descriptor.as_ref(), &properties, None)?;
        let item = CapabilityStorageItem::new(
            descriptor.version(),
            capability_type.clone(),
            enabled,
            notes.clone(),
            stored.clone(),
        );
        let id = self.storage.add(item)?;
        info!("Added capability {} of type {}", id, capability_type);

        let reference = self.create_reference(id, capability_type, descriptor, factory.as_ref());
        reference.set_notes(notes);
        self.index_insert(reference.clone());
        reference.create(properties, stored)?;
        if enabled {
            reference.enable()?;
            reference.activate()?;
        }
        Ok(reference)
    }

    /// Replace the configuration of an existing capability.
    ///
    /// # Errors
    ///
    /// `CapabilityError::NotFound` for an unknown id, `ValidationError` for
    /// invalid properties, or a cipher or storage error.
    pub fn update(
        &self,
        id: CapabilityIdentity,
        enabled: bool,
        notes: Option<String>,
        properties: Properties,
    ) -> Result<Arc<CapabilityReference>> {
        let _guard = self.write_lock.lock();
        let reference = self.require(id)?;
        let descriptor = reference.descriptor();
        self.validate(descriptor.as_ref(), Some(id), &properties)?;

        let previous = reference.stored_properties();
        let stored = secrets::encrypt(
            self.cipher.as_ref(),
            descriptor.as_ref(),
            &properties,
            Some(&previous),
        )?;
        self.storage.update(
            id,
            CapabilityStorageItem::new(
                descriptor.version(),
                reference.capability_type(),
                enabled,
                notes.clone(),
                stored.clone(),
            ),
        )?;
        info!("Updated capability {}", id);

        self.apply(&reference, enabled, notes, properties, stored)?;
        Ok(reference)
    }

    /// Remove a capability.
    ///
    /// Returns the removed reference, or `None` if storage held the
    /// capability but it was not live.
    ///
    /// # Errors
    ///
    /// `CapabilityError::NotFound` if neither the registry nor storage know
    /// `id`, or `ValidationError` if the live capability's type is not exposed.
    pub fn remove(&self, id: CapabilityIdentity) -> Result<Option<Arc<CapabilityReference>>> {
        self.remove_item(id, Access::Exposed)
    }

    /// Remove a capability whatever its type's exposure.
    pub fn remove_non_exposed(
        &self,
        id: CapabilityIdentity,
    ) -> Result<Option<Arc<CapabilityReference>>> {
        self.remove_item(id, Access::Internal)
    }

    fn remove_item(
        &self,
        id: CapabilityIdentity,
        access: Access,
    ) -> Result<Option<Arc<CapabilityReference>>> {
        let _guard = self.write_lock.lock();
        let tracked = self.index().get(&id).cloned();
        if let Some(reference) = &tracked {
            check_access(reference.descriptor().as_ref(), access)?;
        }
        let deleted = self.storage.remove(id)?;
        if tracked.is_none() && !deleted {
            return Err(CapabilityError::NotFound(id).into());
        }
        info!("Removed capability {}", id);

        let removed = self.index_remove(id);
        if let Some(reference) = &removed {
            reference.remove()?;
        }
        Ok(removed)
    }

    /// Enable a capability, keeping its configuration.
    pub fn enable(&self, id: CapabilityIdentity) -> Result<Arc<CapabilityReference>> {
        self.set_enabled(id, true)
    }

    /// Disable a capability, keeping its configuration.
    pub fn disable(&self, id: CapabilityIdentity) -> Result<Arc<CapabilityReference>> {
        self.set_enabled(id, false)
    }

    fn set_enabled(&self, id: CapabilityIdentity, enabled: bool) -> Result<Arc<CapabilityReference>> {
        let _guard = self.write_lock.lock();
        let reference = self.require(id)?;
        self.update(id, enabled, reference.notes(), reference.properties())
    }

    /// The live capability with `id`.
    pub fn get(&self, id: CapabilityIdentity) -> Option<Arc<CapabilityReference>> {
        self.index().get(&id).cloned()
    }

    /// Live capabilities accepted by `predicate`.
    pub fn get_matching<P>(&self, predicate: P) -> Vec<Arc<CapabilityReference>>
    where
        P: Fn(&CapabilityReference) -> bool,
    {
        let mut matching: Vec<_> = self
            .index()
            .values()
            .filter(|reference| predicate(reference))
            .cloned()
            .collect();
        sort(&mut matching);
        matching
    }

    /// Every live capability, ordered by type then id.
    pub fn get_all(&self) -> Vec<Arc<CapabilityReference>> {
        self.get_matching(|_| true)
    }

    /// Load every stored capability.
    ///
    /// Items whose type is unknown, or that fail to decrypt or convert, are
    /// logged and skipped; the others still load. Items already live are
    /// updated in place. Posts [`CapabilityRegistryEvent::AfterLoad`] when done.
    ///
    /// # Errors
    ///
    /// Only if storage cannot be read at all.
    pub fn load(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        let items = self.storage.get_all()?;
        info!("Loading {} capabilities", items.len());

        for (id, item) in items {
            if let Err(err) = self.load_item(id, item) {
                error!("Failed to load capability {}: {}", id, err);
            }
        }

        self.bus().post(CapabilityRegistryEvent::AfterLoad);
        Ok(())
    }

    fn load_item(&self, id: CapabilityIdentity, item: CapabilityStorageItem) -> Result<()> {
        let capability_type = item.capability_type.clone();
        let Some(descriptor) = self.descriptors.get(&capability_type) else {
            warn!(
                "No descriptor for capability {} of type {}, skipping",
                id, capability_type
            );
            return Ok(());
        };
        let Some(factory) = self.factories.get(&capability_type) else {
            warn!(
                "No factory for capability {} of type {}, skipping",
                id, capability_type
            );
            return Ok(());
        };

        let mut properties =
            secrets::decrypt(self.cipher.as_ref(), descriptor.as_ref(), &item.properties)?;
        let mut stored = item.properties;

        let version = descriptor.version();
        if item.version != version {
            debug!(
                "Converting capability {} of type {} from version {} to {}",
                id, capability_type, item.version, version
            );
            properties = descriptor.convert(properties, item.version).map_err(|err| {
                CapabilityError::ConversionFailed {
                    capability_type: capability_type.clone(),
                    from: item.version,
                    to: version,
                    reason: format!("{:#}", err),
                }
            })?;
            stored = secrets::encrypt(self.cipher.as_ref(), descriptor.as_ref(), &properties, None)?;
            self.storage.update(
                id,
                CapabilityStorageItem::new(
                    version,
                    capability_type.clone(),
                    item.enabled,
                    item.notes.clone(),
                    stored.clone(),
                ),
            )?;
            info!(
                "Converted capability {} from version {} to {}",
                id, item.version, version
            );
        }

        if let Some(existing) = self.get(id) {
            debug!("Capability {} already loaded, updating", id);
            return self.apply(&existing, item.enabled, item.notes, properties, stored);
        }

        let reference =
            self.create_reference(id, capability_type.clone(), descriptor.clone(), factory.as_ref());
        reference.set_notes(item.notes);
        self.index_insert(reference.clone());
        reference.load(properties.clone(), stored)?;

        let violations = descriptor::validate(descriptor.as_ref(), Some(id), &properties);
        if !violations.is_empty() {
            let err = ValidationError::InvalidConfiguration(violations);
            reference.record_failure("Load", err.to_string());
        }

        if item.enabled {
            reference.enable()?;
            reference.activate()?;
        }
        debug!("Loaded capability {} of type {}", id, capability_type);
        Ok(())
    }

    /// Re-encrypt the secrets of stored capabilities with this registry's
    /// cipher, reading them with `previous`.
    ///
    /// Only capabilities whose type is accepted by `filter` are touched.
    /// Returns the number of items rewritten.
    ///
    /// # Errors
    ///
    /// A storage error, or a cipher error for the first value `previous`
    /// cannot decrypt. Items rewritten before the error stay rewritten.
    pub fn migrate_secrets<F>(&self, previous: &dyn Cipher, filter: F) -> Result<usize>
    where
        F: Fn(&CapabilityType) -> bool,
    {
        let _guard = self.write_lock.lock();
        let mut migrated = 0;

        for (id, item) in self.storage.get_all()? {
            if !filter(&item.capability_type) {
                continue;
            }
            let Some(descriptor) = self.descriptors.get(&item.capability_type) else {
                warn!(
                    "No descriptor for capability {} of type {}, not migrating",
                    id, item.capability_type
                );
                continue;
            };
            if !descriptor.form_fields().iter().any(|field| field.encrypted) {
                continue;
            }

            let properties = secrets::decrypt(previous, descriptor.as_ref(), &item.properties)?;
            let stored = secrets::encrypt(self.cipher.as_ref(), descriptor.as_ref(), &properties, None)?;
            self.storage.update(
                id,
                CapabilityStorageItem::new(
                    item.version,
                    item.capability_type.clone(),
                    item.enabled,
                    item.notes,
                    stored.clone(),
                ),
            )?;
            if let Some(reference) = self.get(id) {
                reference.set_stored_properties(stored);
            }
            migrated += 1;
        }

        info!("Migrated secrets of {} capabilities", migrated);
        Ok(migrated)
    }

    fn apply(
        &self,
        reference: &Arc<CapabilityReference>,
        enabled: bool,
        notes: Option<String>,
        properties: Properties,
        stored: Properties,
    ) -> Result<()> {
        if reference.is_enabled() && !enabled {
            reference.disable()?;
        }
        reference.set_notes(notes);
        reference.update(properties, stored, false)?;
        if !reference.is_enabled() && enabled {
            reference.enable()?;
            reference.activate()?;
        }
        Ok(())
    }

    fn resolve_type(
        &self,
        capability_type: &CapabilityType,
    ) -> Result<(Arc<dyn CapabilityFactory>, Arc<dyn CapabilityDescriptor>)> {
        match (
            self.factories.get(capability_type),
            self.descriptors.get(capability_type),
        ) {
            (Some(factory), Some(descriptor)) => Ok((factory, descriptor)),
            _ => Err(ValidationError::InvalidConfiguration(vec![Violation::new(
                "typeId",
                format!("Type '{}' is not supported", capability_type),
            )])
            .into()),
        }
    }

    fn validate(
        &self,
        descriptor: &dyn CapabilityDescriptor,
        id: Option<CapabilityIdentity>,
        properties: &Properties,
    ) -> Result<()> {
        let violations = descriptor::validate(descriptor, id, properties);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::InvalidConfiguration(violations).into())
        }
    }

    fn create_reference(
        &self,
        id: CapabilityIdentity,
        capability_type: CapabilityType,
        descriptor: Arc<dyn CapabilityDescriptor>,
        factory: &dyn CapabilityFactory,
    ) -> Arc<CapabilityReference> {
        let capability = factory.create(&self.conditions);
        CapabilityReference::new(
            id,
            capability_type,
            descriptor,
            capability,
            self.conditions.clone(),
            self.me.clone(),
        )
    }

    fn require(&self, id: CapabilityIdentity) -> Result<Arc<CapabilityReference>> {
        self.get(id)
            .ok_or_else(|| CapabilityError::NotFound(id).into())
    }

    fn index(&self) -> Arc<Index> {
        self.references.read().clone()
    }

    fn index_insert(&self, reference: Arc<CapabilityReference>) {
        let mut references = self.references.write();
        let mut next = Index::clone(&references);
        next.insert(reference.id(), reference);
        *references = Arc::new(next);
    }

    fn index_remove(&self, id: CapabilityIdentity) -> Option<Arc<CapabilityReference>> {
        let mut references = self.references.write();
        if !references.contains_key(&id) {
            return None;
        }
        let mut next = Index::clone(&references);
        let removed = next.remove(&id);
        *references = Arc::new(next);
        removed
    }
}

fn sort(references: &mut [Arc<CapabilityReference>]) {
    references.sort_by(|a, b| {
        a.capability_type()
            .as_str()
            .cmp(b.capability_type().as_str())
            .then_with(|| a.id().cmp(&b.id()))
    });
}

fn check_access(descriptor: &dyn CapabilityDescriptor, access: Access) -> Result<()> {
    if access == Access::Exposed && !descriptor.is_exposed() {
        return Err(ValidationError::InvalidConfiguration(vec![Violation::new(
            "typeId",
            format!("Type '{}' is not exposed", descriptor.capability_type()),
        )])
        .into());
    }
    Ok(())
}

impl CapabilityQuery for CapabilityRegistry {
    fn capabilities(&self) -> Vec<Arc<dyn CapabilityContext>> {
        self.index()
            .values()
            .map(|reference| reference.clone() as Arc<dyn CapabilityContext>)
            .collect()
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.index().len())
            .finish()
    }
}
