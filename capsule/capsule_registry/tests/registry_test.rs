//! Integration tests for capsule_registry.

use capsule_condition::{Condition, ConditionState, ConditionSupport, Conditions, SystemStatus};
use capsule_core::{
    CapabilityContext, CapabilityDescriptor, CapabilityError, CapabilityEvent,
    CapabilityIdentity, CapabilityRegistryEvent, CapabilityStorage, CapabilityStorageItem,
    CapabilityType, Cipher, Delivery, Error, EventBus, FieldKind, FormField, Properties,
    ValidationError, Violation,
};
use capsule_registry::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn record(&self, entry: &str) {
        self.0.lock().push(entry.to_string());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == entry).count()
    }

    fn clear(&self) {
        self.0.lock().clear();
    }
}

// A validity condition the test flips by hand.
#[derive(Clone)]
struct Switch {
    state: ConditionState,
    on: Arc<AtomicBool>,
}

impl Switch {
    fn new(bus: Arc<EventBus>) -> Self {
        Self {
            state: ConditionState::new(bus),
            on: Arc::new(AtomicBool::new(true)),
        }
    }

    fn set(&self, on: bool) {
        self.on.store(on, Ordering::SeqCst);
        self.state.set_satisfied(on);
    }
}

impl ConditionSupport for Switch {
    fn state(&self) -> &ConditionState {
        &self.state
    }

    fn do_bind(&self) {
        self.state.set_satisfied(self.on.load(Ordering::SeqCst));
    }

    fn describe_satisfied(&self) -> String {
        "switch on".to_string()
    }

    fn describe_unsatisfied(&self) -> String {
        "switch off".to_string()
    }
}

struct WebhookDescriptor {
    conversions: Arc<AtomicUsize>,
}

impl CapabilityDescriptor for WebhookDescriptor {
    fn capability_type(&self) -> CapabilityType {
        CapabilityType::new("webhook")
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
            FormField::new("secret", "Secret", FieldKind::Password)
                .required()
                .encrypted(),
        ]
    }

    fn convert(&self, mut properties: Properties, from_version: u32) -> capsule_core::Result<Properties> {
        if from_version != 1 {
            return Err(ValidationError::InvalidConfiguration(vec![Violation::new(
                "version",
                format!("cannot convert from version {}", from_version),
            )])
            .into());
        }
        self.conversions.fetch_add(1, Ordering::SeqCst);
        if let Some(endpoint) = properties.remove("endpoint") {
            properties.insert("url".to_string(), endpoint);
        }
        Ok(properties)
    }
}

struct SimpleDescriptor(&'static str);

impl CapabilityDescriptor for SimpleDescriptor {
    fn capability_type(&self) -> CapabilityType {
        CapabilityType::new(self.0)
    }

    fn name(&self) -> String {
        self.0.to_string()
    }

    fn form_fields(&self) -> Vec<FormField> {
        vec![FormField::new("text", "Text", FieldKind::String)]
    }
}

struct HiddenDescriptor;

impl CapabilityDescriptor for HiddenDescriptor {
    fn capability_type(&self) -> CapabilityType {
        CapabilityType::new("internal")
    }

    fn name(&self) -> String {
        "Internal".to_string()
    }

    fn form_fields(&self) -> Vec<FormField> {
        Vec::new()
    }

    fn is_exposed(&self) -> bool {
        false
    }
}

#[derive(Clone, Copy)]
enum Activation {
    Unconditional,
    // Unique URL, passivated while updating.
    Webhook,
    // Unique text only.
    UniqueText,
}

struct Tracker {
    journal: Journal,
    conditions: Conditions,
    activation: Activation,
    fail_update: Arc<AtomicBool>,
    slow_update: Arc<AtomicBool>,
    validity: Option<Switch>,
}

impl Capability for Tracker {
    fn on_create(&self, _properties: &Properties) -> anyhow::Result<()> {
        self.journal.record("create");
        Ok(())
    }

    fn on_load(&self, _properties: &Properties) -> anyhow::Result<()> {
        self.journal.record("load");
        Ok(())
    }

    fn on_update(&self, _properties: &Properties, _previous: &Properties) -> anyhow::Result<()> {
        if self.slow_update.load(Ordering::SeqCst) {
            self.journal.record("update started");
            thread::sleep(Duration::from_millis(300));
        }
        if self.fail_update.load(Ordering::SeqCst) {
            anyhow::bail!("cannot apply configuration");
        }
        self.journal.record("update");
        Ok(())
    }

    fn on_remove(&self) -> anyhow::Result<()> {
        self.journal.record("remove");
        Ok(())
    }

    fn on_activate(&self) -> anyhow::Result<()> {
        self.journal.record("activate");
        Ok(())
    }

    fn on_passivate(&self) -> anyhow::Result<()> {
        self.journal.record("passivate");
        Ok(())
    }

    fn activation_condition(&self) -> anyhow::Result<Option<Arc<dyn Condition>>> {
        match self.activation {
            Activation::Unconditional => Ok(None),
            Activation::Webhook => {
                let condition = self.conditions.all(vec![
                    self.conditions.no_duplicates_on(&["url"]),
                    self.conditions.passivate_during_update(),
                ])?;
                Ok(Some(condition))
            }
            Activation::UniqueText => Ok(Some(self.conditions.no_duplicates_on(&["text"]))),
        }
    }

    fn validity_condition(&self) -> anyhow::Result<Option<Arc<dyn Condition>>> {
        Ok(self
            .validity
            .clone()
            .map(|switch| Arc::new(switch) as Arc<dyn Condition>))
    }
}

#[derive(Clone)]
struct Switches {
    fail_update: Arc<AtomicBool>,
    slow_update: Arc<AtomicBool>,
}

fn tracker_factory(
    journal: &Journal,
    switches: &Switches,
    activation: Activation,
    validity: Option<Switch>,
) -> Arc<dyn CapabilityFactory> {
    let journal = journal.clone();
    let switches = switches.clone();
    Arc::new(move |conditions: &Conditions| -> Box<dyn Capability> {
        Box::new(Tracker {
            journal: journal.clone(),
            conditions: conditions.clone(),
            activation,
            fail_update: switches.fail_update.clone(),
            slow_update: switches.slow_update.clone(),
            validity: validity.clone(),
        })
    })
}

struct Harness {
    bus: Arc<EventBus>,
    system: SystemStatus,
    storage: InMemoryCapabilityStorage,
    cipher: Arc<AesGcmCipher>,
    journal: Journal,
    conversions: Arc<AtomicUsize>,
    fail_update: Arc<AtomicBool>,
    slow_update: Arc<AtomicBool>,
    validity: Switch,
    registry: Arc<CapabilityRegistry>,
}

impl Harness {
    fn new() -> Self {
        Self::with_storage(InMemoryCapabilityStorage::new(), "first passphrase")
    }

    fn with_storage(storage: InMemoryCapabilityStorage, passphrase: &str) -> Self {
        let bus = Arc::new(EventBus::new());
        let system = SystemStatus::new(bus.clone());
        let cipher = Arc::new(AesGcmCipher::from_passphrase(passphrase).unwrap());
        let journal = Journal::default();
        let conversions = Arc::new(AtomicUsize::new(0));
        let switches = Switches {
            fail_update: Arc::new(AtomicBool::new(false)),
            slow_update: Arc::new(AtomicBool::new(false)),
        };
        let validity = Switch::new(bus.clone());

        let descriptors = Arc::new(CapabilityDescriptorRegistry::new());
        descriptors.register(Arc::new(WebhookDescriptor {
            conversions: conversions.clone(),
        }));
        descriptors.register(Arc::new(SimpleDescriptor("note")));
        descriptors.register(Arc::new(SimpleDescriptor("guarded")));
        descriptors.register(Arc::new(SimpleDescriptor("hook")));
        descriptors.register(Arc::new(HiddenDescriptor));

        let factories = Arc::new(CapabilityFactoryRegistry::new());
        factories.register(
            CapabilityType::new("webhook"),
            tracker_factory(&journal, &switches, Activation::Webhook, None),
        );
        factories.register(
            CapabilityType::new("note"),
            tracker_factory(&journal, &switches, Activation::Unconditional, None),
        );
        factories.register(
            CapabilityType::new("guarded"),
            tracker_factory(&journal, &switches, Activation::Unconditional, Some(validity.clone())),
        );
        factories.register(
            CapabilityType::new("hook"),
            tracker_factory(&journal, &switches, Activation::UniqueText, None),
        );
        factories.register(
            CapabilityType::new("internal"),
            tracker_factory(
                &journal,
                &switches,
                Activation::Unconditional,
                Some(validity.clone()),
            ),
        );

        let registry = CapabilityRegistry::new(
            Arc::new(storage.clone()),
            cipher.clone(),
            factories,
            descriptors,
            Conditions::new(bus.clone(), system.clone()),
        );

        Self {
            bus,
            system,
            storage,
            cipher,
            journal,
            conversions,
            fail_update: switches.fail_update,
            slow_update: switches.slow_update,
            validity,
            registry,
        }
    }

    fn started() -> Self {
        let harness = Self::new();
        harness.system.started();
        harness
    }

    fn add_webhook(&self, url: &str, secret: &str) -> Arc<CapabilityReference> {
        self.registry
            .add(
                CapabilityType::new("webhook"),
                true,
                None,
                props(&[("url", url), ("secret", secret)]),
            )
            .unwrap()
    }
}

fn props(pairs: &[(&str, &str)]) -> Properties {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn violations(err: Error) -> Vec<Violation> {
    match err {
        Error::Validation(err) => err.violations().to_vec(),
        other => panic!("expected a validation error, got {other}"),
    }
}

fn count_events<E, F>(bus: &EventBus, filter: F) -> Arc<AtomicUsize>
where
    E: std::any::Any + Send + Sync,
    F: Fn(&E) -> bool + Send + Sync + 'static,
{
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    bus.subscribe::<E, _>("test counter", Delivery::Concurrent, move |event| {
        if filter(event) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    count
}

#[test]
fn test_add_unknown_type_persists_nothing() {
    let harness = Harness::started();

    let err = harness
        .registry
        .add(CapabilityType::new("ghost"), true, None, Properties::new())
        .unwrap_err();

    let violations = violations(err);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].key, "typeId");
    assert!(harness.storage.is_empty());
    assert!(harness.registry.get_all().is_empty());
}

#[test]
fn test_add_reports_every_violation() {
    let harness = Harness::started();

    let err = harness
        .registry
        .add(CapabilityType::new("webhook"), true, None, props(&[("url", " ")]))
        .unwrap_err();

    let mut keys: Vec<_> = violations(err).into_iter().map(|v| v.key).collect();
    keys.sort();
    assert_eq!(keys, vec!["secret", "url"]);
    assert!(harness.storage.is_empty());
    assert!(harness.journal.entries().is_empty());
}

#[test]
fn test_add_encrypts_secrets_and_activates() {
    let harness = Harness::started();
    let reference = harness.add_webhook("https://hooks.example.com", "s3cret");

    assert!(reference.is_active());
    assert_eq!(reference.state(), ReferenceState::Active);
    assert_eq!(reference.properties()["secret"], "s3cret");
    assert_eq!(harness.journal.entries(), vec!["create", "activate"]);

    let item = harness.storage.get(reference.id()).unwrap();
    assert_eq!(item.version, 2);
    assert!(item.enabled);
    assert_eq!(item.properties["url"], "https://hooks.example.com");
    assert_ne!(item.properties["secret"], "s3cret");
    assert_eq!(
        harness.cipher.decrypt(&item.properties["secret"]).unwrap(),
        "s3cret"
    );
}

#[test]
fn test_update_passivates_and_keeps_unchanged_ciphertext() {
    let harness = Harness::started();
    let reference = harness.add_webhook("https://a.example.com", "s3cret");
    let before = harness.storage.get(reference.id()).unwrap().properties["secret"].clone();
    harness.journal.clear();

    harness
        .registry
        .update(
            reference.id(),
            true,
            Some("moved".to_string()),
            props(&[("url", "https://b.example.com"), ("secret", "s3cret")]),
        )
        .unwrap();

    assert_eq!(harness.journal.entries(), vec!["passivate", "update", "activate"]);
    assert!(reference.is_active());
    assert_eq!(reference.notes().as_deref(), Some("moved"));

    let item = harness.storage.get(reference.id()).unwrap();
    assert_eq!(item.properties["url"], "https://b.example.com");
    assert_eq!(item.properties["secret"], before);
}

#[test]
fn test_unchanged_update_does_not_call_back() {
    let harness = Harness::started();
    let reference = harness.add_webhook("https://a.example.com", "s3cret");
    harness.journal.clear();

    harness
        .registry
        .update(
            reference.id(),
            true,
            None,
            props(&[("url", "https://a.example.com"), ("secret", "s3cret")]),
        )
        .unwrap();

    assert!(harness.journal.entries().is_empty());
    assert!(reference.is_active());
}

#[test]
fn test_duplicates_are_not_activated() {
    let harness = Harness::started();
    let first = harness.add_webhook("https://same.example.com", "one");
    let second = harness.add_webhook("https://same.example.com", "two");

    assert!(second.is_enabled());
    assert!(!second.is_active());
    assert!(!first.is_active());
    assert!(second.state_description().contains("same configuration"));

    harness.registry.remove(second.id()).unwrap();
    assert!(first.is_active());
}

#[test]
fn test_enable_and_disable() {
    let harness = Harness::started();
    let reference = harness
        .registry
        .add(CapabilityType::new("note"), false, None, props(&[("text", "hi")]))
        .unwrap();
    assert!(!reference.is_enabled());
    assert!(!reference.is_active());
    assert_eq!(reference.state_description(), "Disabled");

    harness.registry.enable(reference.id()).unwrap();
    assert!(reference.is_active());
    assert!(harness.storage.get(reference.id()).unwrap().enabled);

    harness.registry.disable(reference.id()).unwrap();
    assert!(!reference.is_enabled());
    assert!(!harness.storage.get(reference.id()).unwrap().enabled);
    assert_eq!(
        harness.journal.entries(),
        vec!["create", "activate", "passivate"]
    );
}

#[test]
fn test_enabled_capability_waits_for_system() {
    let harness = Harness::new();
    let reference = harness
        .registry
        .add(CapabilityType::new("note"), true, None, Properties::new())
        .unwrap();
    assert!(reference.is_enabled());
    assert!(!reference.is_active());
    assert_eq!(reference.state_description(), "System is not active");

    harness.system.started();
    assert!(reference.is_active());

    harness.system.stopping();
    assert!(!reference.is_active());
    assert!(reference.is_enabled());
}

#[test]
fn test_failed_update_is_captured_and_passivates() {
    let harness = Harness::started();
    let failures = count_events::<CapabilityEvent, _>(&harness.bus, |event| {
        matches!(event, CapabilityEvent::CallbackFailure { .. })
    });
    let reference = harness
        .registry
        .add(CapabilityType::new("note"), true, None, props(&[("text", "a")]))
        .unwrap();
    assert!(reference.is_active());

    harness.fail_update.store(true, Ordering::SeqCst);
    harness
        .registry
        .update(reference.id(), true, None, props(&[("text", "b")]))
        .unwrap();

    let failure = reference.failure().unwrap();
    assert_eq!(failure.action, "Update");
    assert!(failure.message.contains("cannot apply configuration"));
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert!(!reference.is_active());
    assert!(reference.is_enabled());
}

#[test]
fn test_lost_validity_removes_once() {
    let harness = Harness::started();
    let removals = count_events::<CapabilityEvent, _>(&harness.bus, |event| {
        matches!(event, CapabilityEvent::AfterRemove(_))
    });
    let reference = harness
        .registry
        .add(CapabilityType::new("guarded"), true, None, Properties::new())
        .unwrap();
    assert!(reference.is_active());

    harness.validity.set(false);

    assert!(harness.registry.get(reference.id()).is_none());
    assert!(harness.storage.is_empty());
    assert_eq!(reference.state(), ReferenceState::Removed);
    assert_eq!(harness.journal.count("remove"), 1);
    assert_eq!(removals.load(Ordering::SeqCst), 1);
}

#[test]
fn test_validity_is_ignored_while_stopping() {
    let harness = Harness::started();
    let reference = harness
        .registry
        .add(CapabilityType::new("guarded"), true, None, Properties::new())
        .unwrap();

    harness.system.stopping();
    harness.validity.set(false);

    assert!(harness.registry.get(reference.id()).is_some());
    assert_eq!(harness.storage.len(), 1);
    assert_eq!(harness.journal.count("remove"), 0);
}

#[test]
fn test_unknown_ids_are_not_found() {
    let harness = Harness::started();
    let id = CapabilityIdentity::new();

    for err in [
        harness.registry.update(id, true, None, Properties::new()).unwrap_err(),
        harness.registry.enable(id).unwrap_err(),
        harness.registry.disable(id).unwrap_err(),
        harness.registry.remove(id).unwrap_err(),
    ] {
        assert!(matches!(
            err,
            Error::Capability(CapabilityError::NotFound(missing)) if missing == id
        ));
    }
    assert!(harness.registry.get(id).is_none());
}

#[test]
fn test_remove_returns_reference() {
    let harness = Harness::started();
    let reference = harness.add_webhook("https://a.example.com", "s");

    let removed = harness.registry.remove(reference.id()).unwrap().unwrap();
    assert_eq!(removed.id(), reference.id());
    assert_eq!(removed.state(), ReferenceState::Removed);
    assert!(harness.storage.is_empty());
    assert_eq!(
        harness.journal.entries(),
        vec!["create", "activate", "passivate", "remove"]
    );
}

#[test]
fn test_load_restores_capabilities() {
    let first = Harness::started();
    let webhook = first.add_webhook("https://a.example.com", "s3cret");
    let note = first
        .registry
        .add(
            CapabilityType::new("note"),
            false,
            Some("kept".to_string()),
            props(&[("text", "hello")]),
        )
        .unwrap();

    let second = Harness::with_storage(first.storage.clone(), "first passphrase");
    let loads = count_events::<CapabilityRegistryEvent, _>(&second.bus, |_| true);
    second.system.started();
    second.registry.load().unwrap();

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(second.registry.get_all().len(), 2);

    let loaded = second.registry.get(webhook.id()).unwrap();
    assert!(loaded.is_active());
    assert_eq!(loaded.properties()["secret"], "s3cret");

    let loaded = second.registry.get(note.id()).unwrap();
    assert!(!loaded.is_enabled());
    assert_eq!(loaded.notes().as_deref(), Some("kept"));
    assert_eq!(second.journal.count("load"), 2);
    assert_eq!(second.journal.count("create"), 0);
}

#[test]
fn test_load_converts_old_versions_once() {
    let harness = Harness::started();
    let secret = harness.cipher.encrypt("s3cret").unwrap();
    let id = harness
        .storage
        .add(CapabilityStorageItem::new(
            1,
            CapabilityType::new("webhook"),
            true,
            None,
            props(&[("endpoint", "https://old.example.com"), ("secret", secret.as_str())]),
        ))
        .unwrap();

    harness.registry.load().unwrap();
    harness.registry.load().unwrap();

    assert_eq!(harness.conversions.load(Ordering::SeqCst), 1);
    assert_eq!(harness.registry.get_all().len(), 1);

    let item = harness.storage.get(id).unwrap();
    assert_eq!(item.version, 2);
    assert_eq!(item.properties["url"], "https://old.example.com");
    assert!(!item.properties.contains_key("endpoint"));
    assert_ne!(item.properties["secret"], "s3cret");
    assert_eq!(harness.cipher.decrypt(&item.properties["secret"]).unwrap(), "s3cret");

    let reference = harness.registry.get(id).unwrap();
    assert!(reference.is_active());
    assert_eq!(reference.properties()["url"], "https://old.example.com");
}

#[test]
fn test_load_skips_broken_items() {
    let harness = Harness::started();
    let secret = harness.cipher.encrypt("s").unwrap();
    let item = |version: u32, capability_type: &str| {
        CapabilityStorageItem::new(
            version,
            CapabilityType::new(capability_type),
            true,
            None,
            props(&[("url", "https://x.example.com"), ("secret", secret.as_str())]),
        )
    };

    harness.storage.add(item(1, "ghost")).unwrap();
    harness.storage.add(item(7, "webhook")).unwrap();
    let good = harness.storage.add(item(2, "webhook")).unwrap();

    harness.registry.load().unwrap();

    let loaded = harness.registry.get_all();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].id(), good);
    assert!(loaded[0].is_active());
    assert_eq!(harness.storage.len(), 3);
}

#[test]
fn test_load_captures_invalid_configuration() {
    let harness = Harness::started();
    let id = harness
        .storage
        .add(CapabilityStorageItem::new(
            2,
            CapabilityType::new("webhook"),
            false,
            None,
            props(&[("url", "https://x.example.com")]),
        ))
        .unwrap();

    harness.registry.load().unwrap();

    let reference = harness.registry.get(id).unwrap();
    let failure = reference.failure().unwrap();
    assert_eq!(failure.action, "Load");
    assert!(failure.message.contains("Secret is required"));
}

#[test]
fn test_migrate_secrets_to_new_key() {
    let old = Harness::started();
    let webhook = old.add_webhook("https://a.example.com", "s3cret");
    let note = old
        .registry
        .add(CapabilityType::new("note"), true, None, props(&[("text", "t")]))
        .unwrap();

    let new = Harness::with_storage(old.storage.clone(), "second passphrase");
    let migrated = new
        .registry
        .migrate_secrets(old.cipher.as_ref(), |t| t.as_str() == "webhook")
        .unwrap();
    assert_eq!(migrated, 1);

    new.system.started();
    new.registry.load().unwrap();
    let loaded = new.registry.get(webhook.id()).unwrap();
    assert_eq!(loaded.properties()["secret"], "s3cret");
    assert!(new.registry.get(note.id()).is_some());
    assert!(old
        .cipher
        .decrypt(&new.storage.get(webhook.id()).unwrap().properties["secret"])
        .is_err());
}

#[test]
fn test_get_matching() {
    let harness = Harness::started();
    harness.add_webhook("https://a.example.com", "s");
    harness
        .registry
        .add(CapabilityType::new("note"), false, None, Properties::new())
        .unwrap();

    let webhooks = harness
        .registry
        .get_matching(|r| r.capability_type().as_str() == "webhook");
    assert_eq!(webhooks.len(), 1);

    let inactive = harness.registry.get_matching(|r| !r.is_active());
    assert_eq!(inactive.len(), 1);
    assert_eq!(inactive[0].capability_type().as_str(), "note");
}

#[test]
fn test_file_storage_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("capabilities.json");

    let open = |bus: &Arc<EventBus>, system: &SystemStatus| {
        let descriptors = Arc::new(CapabilityDescriptorRegistry::new());
        descriptors.register(Arc::new(SimpleDescriptor("note")));
        let factories = Arc::new(CapabilityFactoryRegistry::new());
        factories.register(
            CapabilityType::new("note"),
            tracker_factory(
                &Journal::default(),
                &Switches {
                    fail_update: Arc::new(AtomicBool::new(false)),
                    slow_update: Arc::new(AtomicBool::new(false)),
                },
                Activation::Unconditional,
                None,
            ),
        );
        CapabilityRegistry::new(
            Arc::new(FileCapabilityStorage::new(&path)),
            Arc::new(AesGcmCipher::from_passphrase("file test").unwrap()),
            factories,
            descriptors,
            Conditions::new(bus.clone(), system.clone()),
        )
    };

    let bus = Arc::new(EventBus::new());
    let system = SystemStatus::new(bus.clone());
    let id = open(&bus, &system)
        .add(CapabilityType::new("note"), true, None, props(&[("text", "persisted")]))
        .unwrap()
        .id();

    let bus = Arc::new(EventBus::new());
    let system = SystemStatus::new(bus.clone());
    system.started();
    let registry = open(&bus, &system);
    registry.load().unwrap();

    let reference = registry.get(id).unwrap();
    assert_eq!(reference.properties()["text"], "persisted");
    assert!(reference.is_active());
}

fn wait_for(description: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", description);
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_update_and_shutdown_on_different_threads() {
    let harness = Harness::started();
    let add_hook = |text: &str| {
        harness
            .registry
            .add(CapabilityType::new("hook"), true, None, props(&[("text", text)]))
            .unwrap()
    };
    let first = add_hook("a");
    let second = add_hook("b");
    assert!(first.is_active() && second.is_active());

    harness.slow_update.store(true, Ordering::SeqCst);
    let (done, finished) = mpsc::channel();

    let registry = harness.registry.clone();
    let id = second.id();
    let updated = done.clone();
    let updater = thread::spawn(move || {
        let result = registry.update(id, true, None, props(&[("text", "a")]));
        updated.send("update").unwrap();
        result.map(|_| ())
    });

    // Stop the system while the update is inside `on_update`.
    wait_for("the update to start", || {
        harness.journal.count("update started") == 1
    });
    let system = harness.system.clone();
    let stopper = thread::spawn(move || {
        system.stopping();
        done.send("stopping").unwrap();
    });

    for _ in 0..2 {
        finished
            .recv_timeout(Duration::from_secs(10))
            .expect("update and shutdown did not both finish");
    }
    updater.join().unwrap().unwrap();
    stopper.join().unwrap();

    assert_eq!(second.properties(), props(&[("text", "a")]));
    assert!(!first.is_active());
    assert!(!second.is_active());
    assert!(first.is_enabled() && second.is_enabled());
}

#[test]
fn test_non_exposed_types_need_internal_access() {
    let harness = Harness::started();

    let err = harness
        .registry
        .add(CapabilityType::new("internal"), true, None, Properties::new())
        .unwrap_err();
    let violations = violations(err);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].key, "typeId");
    assert!(harness.storage.is_empty());

    let reference = harness
        .registry
        .add_non_exposed(CapabilityType::new("internal"), true, None, Properties::new())
        .unwrap();
    assert!(reference.is_active());

    let err = harness.registry.remove(reference.id()).unwrap_err();
    assert_eq!(crate::violations(err)[0].key, "typeId");
    assert!(harness.registry.get(reference.id()).is_some());
    assert_eq!(harness.storage.len(), 1);

    let removed = harness
        .registry
        .remove_non_exposed(reference.id())
        .unwrap()
        .unwrap();
    assert_eq!(removed.state(), ReferenceState::Removed);
    assert!(harness.storage.is_empty());
}

#[test]
fn test_non_exposed_operations_accept_exposed_types() {
    let harness = Harness::started();
    let reference = harness
        .registry
        .add_non_exposed(CapabilityType::new("note"), true, None, Properties::new())
        .unwrap();

    assert!(harness
        .registry
        .remove_non_exposed(reference.id())
        .unwrap()
        .is_some());
}

#[test]
fn test_lost_validity_removes_non_exposed_capability() {
    let harness = Harness::started();
    let reference = harness
        .registry
        .add_non_exposed(CapabilityType::new("internal"), true, None, Properties::new())
        .unwrap();

    harness.validity.set(false);

    assert_eq!(reference.state(), ReferenceState::Removed);
    assert!(harness.registry.get(reference.id()).is_none());
    assert!(harness.storage.is_empty());
}
