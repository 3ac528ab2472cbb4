//! Operator CLI handlers for `charter template` subcommands.

use std::collections::HashMap;

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use charter_core::outline;
use charter_core::template::{self, NewTemplate, TemplatePatch};
use charter_db::models::{OutlineNode, Section, Template};

use crate::TemplateCommands;
use crate::config::CharterConfig;

/// Dispatch a `TemplateCommands` variant to the appropriate handler.
pub async fn run_template_command(
    command: TemplateCommands,
    pool: &PgPool,
    config: &CharterConfig,
) -> Result<()> {
    let actor = config.actor;
    match command {
        TemplateCommands::Create {
            name,
            license_type_id,
            entity_type,
            standard_ids,
            customer_ids,
        } => {
            let new = NewTemplate {
                name,
                standard_ids,
                customer_ids,
                license_type_id,
                entity_type,
            };
            let created = template::create_template(pool, actor, &new, &config.scaffold).await?;
            println!("Template {} created: {}", created.id, created.name);
            print_outline_summary(&created.outline.0);
            Ok(())
        }
        TemplateCommands::Clone { template_id, name } => {
            let copy = template::clone_template(pool, actor, template_id, &name).await?;
            println!("Template {template_id} cloned as {}: {}", copy.id, copy.name);
            print_outline_summary(&copy.outline.0);
            Ok(())
        }
        TemplateCommands::Show { template_id, json } => cmd_show(pool, template_id, json).await,
        TemplateCommands::List { entity_type } => {
            let templates = template::list_templates(pool, entity_type).await?;
            print_template_table(&templates);
            Ok(())
        }
        TemplateCommands::Patch { template_id, file } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read patch file: {file}"))?;
            let patch: TemplatePatch = serde_json::from_str(&contents)
                .with_context(|| format!("failed to parse patch file: {file}"))?;
            let patched = template::patch_template(pool, actor, template_id, patch).await?;
            println!("Template {} updated: {}", patched.id, patched.name);
            Ok(())
        }
        TemplateCommands::Delete { template_id } => {
            template::delete_template(pool, template_id).await?;
            println!("Template {template_id} deleted.");
            Ok(())
        }
        TemplateCommands::RebuildOutline { template_id } => {
            let rebuilt = template::rebuild_outline(pool, actor, template_id).await?;
            println!("Outline of template {template_id} rebuilt.");
            print_outline_summary(&rebuilt.outline.0);
            Ok(())
        }
        TemplateCommands::CheckOutline { template_id } => {
            let drift = template::check_outline(pool, template_id).await?;
            if drift.is_clean() {
                println!("Outline of template {template_id} matches its sections.");
                return Ok(());
            }
            print_ids("Sections missing from outline", &drift.missing);
            print_ids("Outline nodes without a section", &drift.unknown);
            print_ids("Outline nodes under the wrong parent", &drift.misplaced);
            println!();
            println!("Run `charter template rebuild-outline {template_id}` to fix.");
            Ok(())
        }
    }
}

async fn cmd_show(pool: &PgPool, template_id: i32, json: bool) -> Result<()> {
    let template = template::get_template(pool, template_id).await?;

    if json {
        let rendered =
            serde_json::to_string_pretty(&template).context("failed to serialize template")?;
        println!("{rendered}");
        return Ok(());
    }

    let sections = template::list_sections(pool, template_id).await?;
    let titles: HashMap<Uuid, &Section> = sections.iter().map(|s| (s.section_id, s)).collect();

    println!("Template {}: {}", template.id, template.name);
    println!("  Entity type: {}", template.entity_type);
    if let Some(kind) = template.template_type {
        println!("  Format:      {kind}");
    }
    println!(
        "  Flags:       editable={} default={} published={} locked={}",
        template.is_editable, template.is_default, template.is_published, template.is_locked
    );
    println!("  Sections:    {}", sections.len());
    println!();

    if template.outline.0.is_empty() {
        println!("  (empty outline)");
        return Ok(());
    }
    for (node, _) in outline::flatten(&template.outline.0) {
        let indent = "  ".repeat(node.level as usize + 1);
        let label = match titles.get(&node.section_id) {
            Some(section) => format!("{} (id {})", section.title, section.id),
            None => format!("<missing section {}>", node.section_id),
        };
        println!("{indent}{} {label}", node.search_key);
    }
    Ok(())
}

fn print_template_table(templates: &[Template]) {
    if templates.is_empty() {
        println!("No templates found. Use `charter template create <name>` to create one.");
        return;
    }

    let name_w = templates
        .iter()
        .map(|t| t.name.len())
        .max()
        .unwrap_or(4)
        .max(4);

    println!(
        "{:<6}  {:<name_w$}  {:<10}  {:<8}  {:<7}",
        "ID", "NAME", "ENTITY", "EDITABLE", "DEFAULT"
    );
    println!("{}", "-".repeat(6 + 2 + name_w + 2 + 10 + 2 + 8 + 2 + 7));
    for t in templates {
        println!(
            "{:<6}  {:<name_w$}  {:<10}  {:<8}  {:<7}",
            t.id,
            t.name,
            t.entity_type.to_string(),
            t.is_editable,
            t.is_default
        );
    }
}

fn print_outline_summary(forest: &[OutlineNode]) {
    let nodes = outline::flatten(forest);
    println!("  Outline: {} roots, {} nodes", forest.len(), nodes.len());
}

fn print_ids(heading: &str, ids: &[Uuid]) {
    if ids.is_empty() {
        return;
    }
    println!("{heading}:");
    for id in ids {
        println!("  - {id}");
    }
}
