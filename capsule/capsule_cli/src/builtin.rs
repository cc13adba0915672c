//! Capability types shipped with the CLI.
//!
//! - `log` writes its message to the log while active.
//! - `webhook` announces a URL with an optional shared secret. Schema version
//!   1 called the URL `endpoint`.

use anyhow::Result;
use capsule_condition::{Condition, Conditions};
use capsule_core::{
    CapabilityDescriptor, CapabilityType, FieldKind, FormField, Properties, Validator, Violation,
};
use capsule_registry::{Capability, CapabilityDescriptorRegistry, CapabilityFactoryRegistry};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

pub const LOG: &str = "log";
pub const WEBHOOK: &str = "webhook";

pub fn register(factories: &CapabilityFactoryRegistry, descriptors: &CapabilityDescriptorRegistry) {
    descriptors.register(Arc::new(LogDescriptor));
    factories.register(
        CapabilityType::new(LOG),
        Arc::new(|_: &Conditions| -> Box<dyn Capability> { Box::new(LogCapability::default()) }),
    );

    descriptors.register(Arc::new(WebhookDescriptor));
    factories.register(
        CapabilityType::new(WEBHOOK),
        Arc::new(|conditions: &Conditions| -> Box<dyn Capability> {
            Box::new(WebhookCapability::new(conditions.clone()))
        }),
    );
}

struct LogDescriptor;

impl CapabilityDescriptor for LogDescriptor {
    fn capability_type(&self) -> CapabilityType {
        CapabilityType::new(LOG)
    }

    fn name(&self) -> String {
        "Log".to_string()
    }

    fn form_fields(&self) -> Vec<FormField> {
        vec![FormField::new("message", "Message", FieldKind::String).required()]
    }

    fn about(&self) -> Option<String> {
        Some("Logs a message while active".to_string())
    }
}

#[derive(Default)]
struct LogCapability {
    message: Mutex<String>,
}

impl LogCapability {
    fn configure(&self, properties: &Properties) {
        *self.message.lock() = properties.get("message").cloned().unwrap_or_default();
    }
}

impl Capability for LogCapability {
    fn on_create(&self, properties: &Properties) -> Result<()> {
        self.configure(properties);
        Ok(())
    }

    fn on_update(&self, properties: &Properties, _previous: &Properties) -> Result<()> {
        self.configure(properties);
        Ok(())
    }

    fn on_activate(&self) -> Result<()> {
        info!(target: "capsule::log", "{}", self.message.lock());
        Ok(())
    }

    fn description(&self) -> Option<String> {
        Some(format!("Logs \"{}\"", self.message.lock()))
    }
}

struct WebhookDescriptor;

struct UrlValidator;

impl Validator for UrlValidator {
    fn validate(&self, properties: &Properties) -> Vec<Violation> {
        match properties.get("url") {
            Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => {
                vec![Violation::new("url", "URL must start with http:// or https://")]
            }
            _ => Vec::new(),
        }
    }

    fn explain(&self) -> String {
        "URL uses http or https".to_string()
    }
}

impl CapabilityDescriptor for WebhookDescriptor {
    fn capability_type(&self) -> CapabilityType {
        CapabilityType::new(WEBHOOK)
    }

    fn name(&self) -> String {
        "Webhook".to_string()
    }

    fn version(&self) -> u32 {
        2
    }

    fn form_fields(&self) -> Vec<FormField> {
        vec![
            FormField::new("url", "URL", FieldKind::Url).required(),
            FormField::new("secret", "Secret", FieldKind::Password).encrypted(),
        ]
    }

    fn validator(&self) -> Option<Arc<dyn Validator>> {
        Some(Arc::new(UrlValidator))
    }

    fn validator_for(&self, _id: capsule_core::CapabilityIdentity) -> Option<Arc<dyn Validator>> {
        Some(Arc::new(UrlValidator))
    }

    fn convert(&self, mut properties: Properties, from_version: u32) -> capsule_core::Result<Properties> {
        if from_version < 2 {
            if let Some(endpoint) = properties.remove("endpoint") {
                properties.insert("url".to_string(), endpoint);
            }
        }
        Ok(properties)
    }

    fn about(&self) -> Option<String> {
        Some("Announces a webhook URL; duplicates of the same URL stay inactive".to_string())
    }
}

struct WebhookCapability {
    conditions: Conditions,
    url: Mutex<String>,
}

impl WebhookCapability {
    fn new(conditions: Conditions) -> Self {
        Self {
            conditions,
            url: Mutex::new(String::new()),
        }
    }

    fn configure(&self, properties: &Properties) {
        *self.url.lock() = properties.get("url").cloned().unwrap_or_default();
    }
}

impl Capability for WebhookCapability {
    fn on_create(&self, properties: &Properties) -> Result<()> {
        self.configure(properties);
        Ok(())
    }

    fn on_update(&self, properties: &Properties, _previous: &Properties) -> Result<()> {
        self.configure(properties);
        Ok(())
    }

    fn on_activate(&self) -> Result<()> {
        info!("Webhook {} is ready", self.url.lock());
        Ok(())
    }

    fn on_passivate(&self) -> Result<()> {
        info!("Webhook {} is paused", self.url.lock());
        Ok(())
    }

    fn activation_condition(&self) -> Result<Option<Arc<dyn Condition>>> {
        Ok(Some(self.conditions.no_duplicates_on(&["url"])))
    }

    fn description(&self) -> Option<String> {
        Some(format!("Webhook to {}", self.url.lock()))
    }
}
