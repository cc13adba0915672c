//! Capability management commands

use crate::app::App;
use anyhow::{Context, Result};
use capsule_core::{CapabilityContext, CapabilityIdentity, CapabilityType, Properties};
use capsule_registry::CapabilityReference;
use chrono::SecondsFormat;
use clap::Args;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

const MASK: &str = "********";

#[derive(Debug, Error)]
pub enum ArgumentError {
    #[error("Invalid property '{0}', expected key=value")]
    InvalidProperty(String),
}

fn parse_property(arg: &str) -> Result<(String, String), ArgumentError> {
    match arg.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(ArgumentError::InvalidProperty(arg.to_string())),
    }
}

/// Arguments for commands addressing one capability
#[derive(Args)]
pub struct IdArgs {
    /// Capability id
    pub id: CapabilityIdentity,
}

/// Arguments for the add command
#[derive(Args)]
pub struct AddArgs {
    /// Capability type, see `capsule types`
    pub capability_type: String,

    /// Property as key=value, may be repeated
    #[clap(short = 'p', long = "property", value_parser = parse_property)]
    pub properties: Vec<(String, String)>,

    /// Administrator notes
    #[clap(long)]
    pub notes: Option<String>,

    /// Add the capability disabled
    #[clap(long)]
    pub disabled: bool,
}

/// Arguments for the update command
#[derive(Args)]
pub struct UpdateArgs {
    /// Capability id
    pub id: CapabilityIdentity,

    /// Property to set as key=value, may be repeated
    #[clap(short = 'p', long = "property", value_parser = parse_property)]
    pub properties: Vec<(String, String)>,

    /// Property to remove, may be repeated
    #[clap(long)]
    pub unset: Vec<String>,

    /// Administrator notes
    #[clap(long)]
    pub notes: Option<String>,
}

#[derive(Serialize)]
struct FailureView {
    action: String,
    message: String,
    occurred_at: String,
}

#[derive(Serialize)]
struct CapabilityView {
    id: String,
    #[serde(rename = "type")]
    capability_type: String,
    enabled: bool,
    active: bool,
    state: String,
    notes: Option<String>,
    description: Option<String>,
    properties: BTreeMap<String, String>,
    failure: Option<FailureView>,
}

impl CapabilityView {
    fn of(reference: &CapabilityReference) -> Self {
        let encrypted: HashSet<String> = reference
            .descriptor()
            .form_fields()
            .into_iter()
            .filter(|field| field.encrypted)
            .map(|field| field.id)
            .collect();
        let properties = reference
            .properties()
            .into_iter()
            .map(|(key, value)| {
                if encrypted.contains(&key) {
                    (key, MASK.to_string())
                } else {
                    (key, value)
                }
            })
            .collect();

        Self {
            id: reference.id().to_string(),
            capability_type: reference.capability_type().to_string(),
            enabled: reference.is_enabled(),
            active: reference.is_active(),
            state: reference.state_description(),
            notes: reference.notes(),
            description: reference.capability().description(),
            properties,
            failure: reference.failure().map(|failure| FailureView {
                action: failure.action,
                message: failure.message,
                occurred_at: failure
                    .occurred_at
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
            }),
        }
    }

    fn print_summary(&self) {
        println!("{}  {:<8}  {}", self.id, self.capability_type, self.state);
    }

    fn print_details(&self) {
        println!("Id:          {}", self.id);
        println!("Type:        {}", self.capability_type);
        println!("Enabled:     {}", self.enabled);
        println!("Active:      {}", self.active);
        println!("State:       {}", self.state);
        if let Some(description) = &self.description {
            println!("Description: {}", description);
        }
        if let Some(notes) = &self.notes {
            println!("Notes:       {}", notes);
        }
        if let Some(failure) = &self.failure {
            println!(
                "Failure:     {} failed at {}: {}",
                failure.action, failure.occurred_at, failure.message
            );
        }
        println!("Properties:");
        for (key, value) in &self.properties {
            println!("  {} = {}", key, value);
        }
    }
}

fn print(reference: &CapabilityReference, json: bool) -> Result<()> {
    let view = CapabilityView::of(reference);
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        view.print_details();
    }
    Ok(())
}

/// Implementation of the list command
pub fn execute_list(app: &App, json: bool) -> Result<()> {
    let views: Vec<CapabilityView> = app
        .registry
        .get_all()
        .iter()
        .map(|reference| CapabilityView::of(reference))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
    } else if views.is_empty() {
        println!("No capabilities");
    } else {
        for view in &views {
            view.print_summary();
        }
    }
    Ok(())
}

/// Implementation of the show command
pub fn execute_show(app: &App, args: &IdArgs, json: bool) -> Result<()> {
    let reference = app
        .registry
        .get(args.id)
        .with_context(|| format!("Capability {} not found", args.id))?;
    print(&reference, json)
}

/// Implementation of the add command
pub fn execute_add(app: &App, args: &AddArgs, json: bool) -> Result<()> {
    let properties: Properties = args.properties.iter().cloned().collect();
    let reference = app.registry.add(
        CapabilityType::new(args.capability_type.as_str()),
        !args.disabled,
        args.notes.clone(),
        properties,
    )?;

    if json {
        print(&reference, true)
    } else {
        println!("{}", reference.id());
        Ok(())
    }
}

/// Implementation of the update command
pub fn execute_update(app: &App, args: &UpdateArgs, json: bool) -> Result<()> {
    let current = app
        .registry
        .get(args.id)
        .with_context(|| format!("Capability {} not found", args.id))?;

    let mut properties = current.properties();
    for key in &args.unset {
        properties.remove(key);
    }
    properties.extend(args.properties.iter().cloned());
    let notes = args.notes.clone().or_else(|| current.notes());

    let reference = app
        .registry
        .update(args.id, current.is_enabled(), notes, properties)?;
    print(&reference, json)
}

/// Implementation of the enable command
pub fn execute_enable(app: &App, args: &IdArgs, json: bool) -> Result<()> {
    let reference = app.registry.enable(args.id)?;
    print(&reference, json)
}

/// Implementation of the disable command
pub fn execute_disable(app: &App, args: &IdArgs, json: bool) -> Result<()> {
    let reference = app.registry.disable(args.id)?;
    print(&reference, json)
}

/// Implementation of the remove command
pub fn execute_remove(app: &App, args: &IdArgs, json: bool) -> Result<()> {
    app.registry.remove(args.id)?;
    if json {
        println!("{}", serde_json::json!({ "removed": args.id.to_string() }));
    } else {
        println!("Removed {}", args.id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_property() {
        assert_eq!(
            parse_property("url=https://a.example.com/?x=1").unwrap(),
            ("url".to_string(), "https://a.example.com/?x=1".to_string())
        );
        assert_eq!(
            parse_property("message=").unwrap(),
            ("message".to_string(), String::new())
        );
        assert!(parse_property("novalue").is_err());
        assert!(parse_property("=value").is_err());
    }
}
