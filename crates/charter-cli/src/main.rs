mod config;
mod section_cmds;
mod template_cmds;

use clap::{Parser, Subcommand};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use charter_db::models::{EntityType, SectionType};
use charter_db::pool;

use config::CharterConfig;

#[derive(Parser)]
#[command(name = "charter", about = "Policy template section tree and outline manager")]
struct Cli {
    /// Database URL (overrides CHARTER_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Operator UUID recorded in audit columns (overrides CHARTER_ACTOR)
    #[arg(long, global = true)]
    actor: Option<Uuid>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a charter config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/charter")]
        db_url: String,
        /// Template whose sections seed new templates (defaults to the first default template)
        #[arg(long)]
        scaffold_template_id: Option<i32>,
        /// Operator UUID recorded in audit columns
        #[arg(long)]
        operator: Option<Uuid>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create the charter database and run migrations
    DbInit,
    /// Template management
    Template {
        #[command(subcommand)]
        command: TemplateCommands,
    },
    /// Section management
    Section {
        #[command(subcommand)]
        command: SectionCommands,
    },
}

#[derive(Subcommand)]
pub enum TemplateCommands {
    /// Create a template seeded from the scaffold
    Create {
        name: String,
        /// License type id
        #[arg(long, default_value_t = 1)]
        license_type_id: i32,
        /// Entity type: assessment or policy
        #[arg(long, default_value = "assessment")]
        entity_type: EntityType,
        /// Comma-separated standard ids
        #[arg(long, value_delimiter = ',')]
        standard_ids: Vec<i32>,
        /// Comma-separated customer ids
        #[arg(long, value_delimiter = ',')]
        customer_ids: Vec<String>,
    },
    /// Copy a template and its sections under a new name
    Clone {
        /// Source template ID
        template_id: i32,
        /// Name of the copy
        name: String,
    },
    /// Show a template with its outline
    Show {
        template_id: i32,
        /// Print the template as JSON
        #[arg(long)]
        json: bool,
    },
    /// List available templates
    List {
        /// Only templates of this entity type
        #[arg(long)]
        entity_type: Option<EntityType>,
    },
    /// Apply a JSON template patch
    Patch {
        template_id: i32,
        /// Path to a JSON file holding the patch
        file: String,
    },
    /// Delete a template and all of its sections
    Delete { template_id: i32 },
    /// Rebuild the outline from the section rows
    RebuildOutline { template_id: i32 },
    /// Report differences between the outline and the section rows
    CheckOutline { template_id: i32 },
}

#[derive(Subcommand)]
pub enum SectionCommands {
    /// Insert a section
    Add {
        template_id: i32,
        title: String,
        /// Parent section row ID (omit for a root section)
        #[arg(long)]
        parent: Option<i32>,
        /// GLOBAL, CONTROL_FAMILY or CONTROL
        #[arg(long, default_value = "GLOBAL")]
        section_type: SectionType,
        /// HTML body
        #[arg(long)]
        html: Option<String>,
    },
    /// List a template's sections
    List { template_id: i32 },
    /// Apply a JSON array of section patches in one batch
    Update {
        template_id: i32,
        /// Path to a JSON file holding the patches
        file: String,
    },
    /// Delete a section and all of its descendants
    Delete {
        /// External section UUID
        section_id: Uuid,
    },
}

/// Execute the `charter init` command: write config file.
fn cmd_init(
    db_url: &str,
    scaffold_template_id: Option<i32>,
    operator: Option<Uuid>,
    force: bool,
) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: Some(config::DatabaseSection {
            url: db_url.to_owned(),
        }),
        scaffold: Some(config::ScaffoldSection {
            template_id: scaffold_template_id,
            skip_leading: None,
        }),
        operator: operator.map(|actor| config::OperatorSection { actor }),
    };

    config::save_config_to(&path, &cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    if let Some(id) = scaffold_template_id {
        println!("  scaffold.template_id = {id}");
    }
    println!();
    println!("Next: run `charter db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `charter db-init` command: create database and run migrations.
async fn cmd_db_init(resolved: &CharterConfig) -> anyhow::Result<()> {
    println!("Initializing charter database...");

    if pool::ensure_database_exists(&resolved.db_config).await? {
        println!("Created database.");
    }
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("charter db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = run(cli).await;
    if let Err(e) = result {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn connect(resolved: &CharterConfig) -> anyhow::Result<PgPool> {
    debug!(
        actor = %resolved.actor,
        scaffold_template_id = ?resolved.scaffold.template_id,
        skip_leading = resolved.scaffold.skip_leading,
        "configuration resolved"
    );
    pool::create_pool(&resolved.db_config).await
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Init {
            db_url,
            scaffold_template_id,
            operator,
            force,
        } => cmd_init(&db_url, scaffold_template_id, operator, force),
        Commands::DbInit => {
            let resolved = CharterConfig::resolve(cli.database_url.as_deref(), cli.actor)?;
            cmd_db_init(&resolved).await
        }
        Commands::Template { command } => {
            let resolved = CharterConfig::resolve(cli.database_url.as_deref(), cli.actor)?;
            let db_pool = connect(&resolved).await?;
            let result = template_cmds::run_template_command(command, &db_pool, &resolved).await;
            db_pool.close().await;
            result
        }
        Commands::Section { command } => {
            let resolved = CharterConfig::resolve(cli.database_url.as_deref(), cli.actor)?;
            let db_pool = connect(&resolved).await?;
            let result = section_cmds::run_section_command(command, &db_pool, resolved.actor).await;
            db_pool.close().await;
            result
        }
    }
}

#[cfg(test)]
mod test_util {
    use std::sync::{Mutex, MutexGuard};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Serialize tests that mutate process environment variables.
    pub fn lock_env() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
