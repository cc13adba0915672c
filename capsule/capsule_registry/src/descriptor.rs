//! Lookup of capability descriptors by type, and built-in form validation.

use capsule_core::{
    CapabilityDescriptor, CapabilityIdentity, CapabilityType, FormField, Properties, Validator,
    Violation,
};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Maps capability types to their descriptors.
#[derive(Default)]
pub struct CapabilityDescriptorRegistry {
    descriptors: DashMap<CapabilityType, Arc<dyn CapabilityDescriptor>>,
}

impl CapabilityDescriptorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `descriptor` under its own type, replacing any previous one.
    pub fn register(&self, descriptor: Arc<dyn CapabilityDescriptor>) {
        let capability_type = descriptor.capability_type();
        debug!("Registering capability descriptor for {}", capability_type);
        if self
            .descriptors
            .insert(capability_type.clone(), descriptor)
            .is_some()
        {
            warn!("Replaced capability descriptor for {}", capability_type);
        }
    }

    /// Remove the descriptor for `capability_type`.
    pub fn unregister(&self, capability_type: &CapabilityType) -> bool {
        self.descriptors.remove(capability_type).is_some()
    }

    /// The descriptor for `capability_type`.
    pub fn get(&self, capability_type: &CapabilityType) -> Option<Arc<dyn CapabilityDescriptor>> {
        self.descriptors
            .get(capability_type)
            .map(|entry| entry.value().clone())
    }

    /// Every registered descriptor, ordered by type.
    pub fn all(&self) -> Vec<Arc<dyn CapabilityDescriptor>> {
        let mut all: Vec<_> = self
            .descriptors
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by_key(|d| d.capability_type());
        all
    }
}

/// Checks that every required form field has a non-blank value.
pub struct RequiredFieldsValidator {
    fields: Vec<FormField>,
}

impl RequiredFieldsValidator {
    /// Validate against `fields`.
    pub fn new(fields: Vec<FormField>) -> Self {
        Self { fields }
    }
}

impl Validator for RequiredFieldsValidator {
    fn validate(&self, properties: &Properties) -> Vec<Violation> {
        self.fields
            .iter()
            .filter(|field| field.required)
            .filter(|field| {
                properties
                    .get(&field.id)
                    .map_or(true, |value| value.trim().is_empty())
            })
            .map(|field| Violation::new(&field.id, format!("{} is required", field.label)))
            .collect()
    }

    fn explain(&self) -> String {
        String::from("required fields are present")
    }
}

/// Run the built-in and descriptor validators for a create (`id` is `None`)
/// or for an update or load of `id`, collecting every violation.
pub fn validate(
    descriptor: &dyn CapabilityDescriptor,
    id: Option<CapabilityIdentity>,
    properties: &Properties,
) -> Vec<Violation> {
    let mut validators: Vec<Arc<dyn Validator>> =
        vec![Arc::new(RequiredFieldsValidator::new(descriptor.form_fields()))];
    let custom = match id {
        None => descriptor.validator(),
        Some(id) => descriptor.validator_for(id),
    };
    validators.extend(custom);

    validators
        .iter()
        .flat_map(|validator| validator.validate(properties))
        .collect()
}
