//! Operator CLI handlers for `charter section` subcommands.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use charter_core::mutate::{NewSection, SectionPatch};
use charter_core::template;

use crate::SectionCommands;

/// Dispatch a `SectionCommands` variant to the appropriate handler.
pub async fn run_section_command(
    command: SectionCommands,
    pool: &PgPool,
    actor: Uuid,
) -> Result<()> {
    match command {
        SectionCommands::Add {
            template_id,
            title,
            parent,
            section_type,
            html,
        } => {
            let new = NewSection {
                parent_id: parent,
                section_type,
                html_content: html,
                ..NewSection::titled(title)
            };
            let section = template::create_section(pool, actor, template_id, new).await?;
            println!("Section {} created.", section.id);
            println!("  External ID: {}", section.section_id);
            if let Some(parent_id) = section.parent_id {
                println!("  Parent:      {parent_id}");
            }
            Ok(())
        }
        SectionCommands::List { template_id } => {
            let sections = template::list_sections(pool, template_id).await?;
            if sections.is_empty() {
                println!("Template {template_id} has no sections.");
                return Ok(());
            }
            println!("{:<6}  {:<6}  {:<36}  {:<14}  TITLE", "ID", "PARENT", "EXTERNAL ID", "TYPE");
            for s in &sections {
                let parent = s.parent_id.map(|p| p.to_string()).unwrap_or_else(|| "-".to_owned());
                println!(
                    "{:<6}  {:<6}  {:<36}  {:<14}  {}",
                    s.id,
                    parent,
                    s.section_id,
                    s.section_type.to_string(),
                    s.title
                );
            }
            Ok(())
        }
        SectionCommands::Update { template_id, file } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read patch file: {file}"))?;
            let patches = parse_patches(&contents)
                .with_context(|| format!("failed to parse patch file: {file}"))?;
            let reparented = patches.iter().any(|p| p.parent.is_some());
            let updated = template::update_sections(pool, actor, template_id, patches).await?;
            println!("{} section(s) updated.", updated.len());
            if reparented {
                println!(
                    "Parent changes are not reflected in the outline until \
                     `charter template rebuild-outline {template_id}`."
                );
            }
            Ok(())
        }
        SectionCommands::Delete { section_id } => {
            let template = template::delete_section(pool, actor, section_id).await?;
            println!(
                "Section {section_id} and its descendants deleted from template {}.",
                template.id
            );
            Ok(())
        }
    }
}

/// Accept either a JSON array of patches or a single patch object.
fn parse_patches(contents: &str) -> serde_json::Result<Vec<SectionPatch>> {
    let value: serde_json::Value = serde_json::from_str(contents)?;
    if value.is_array() {
        serde_json::from_value(value)
    } else {
        Ok(vec![serde_json::from_value(value)?])
    }
}
