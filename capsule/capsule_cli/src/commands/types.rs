//! The `types` command

use crate::app::App;
use anyhow::Result;
use serde::Serialize;

#[derive(Serialize)]
struct TypeView {
    #[serde(rename = "type")]
    capability_type: String,
    name: String,
    version: u32,
    about: Option<String>,
    fields: Vec<String>,
}

/// Implementation of the types command
pub fn execute_types(app: &App, json: bool) -> Result<()> {
    let types: Vec<TypeView> = app
        .registry
        .descriptors()
        .all()
        .into_iter()
        .filter(|descriptor| descriptor.is_exposed())
        .map(|descriptor| TypeView {
            capability_type: descriptor.capability_type().to_string(),
            name: descriptor.name(),
            version: descriptor.version(),
            about: descriptor.about(),
            fields: descriptor
                .form_fields()
                .into_iter()
                .map(|field| {
                    if field.required {
                        format!("{}*", field.id)
                    } else {
                        field.id
                    }
                })
                .collect(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&types)?);
        return Ok(());
    }
    for view in types {
        println!(
            "{:<10} v{}  {}  [{}]",
            view.capability_type,
            view.version,
            view.about.unwrap_or(view.name),
            view.fields.join(", ")
        );
    }
    Ok(())
}
