//! Shared test utilities for charter integration tests.
//!
//! Provides a PostgreSQL instance shared across tests. Each test gets its
//! own database within the instance.
//!
//! Two modes:
//! - **`CHARTER_TEST_PG_URL`** set: use the external server directly.
//! - **No env var**: spin up a container via testcontainers, shared per test
//!   binary through a `OnceCell`.
//!
//! The fixture helpers at the bottom seed templates and section trees
//! straight through the query layer, bypassing the policy guard.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use testcontainers::ContainerAsync;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use charter_db::models::{EntityType, Section, SectionType, Template, TemplateType};
use charter_db::pool;
use charter_db::queries::sections::{self, NewSectionRow};
use charter_db::queries::templates::{self, NewTemplateRow};

/// Shared server state: base URL and optional container handle (kept alive).
struct SharedPg {
    base_url: String,
    /// Held to keep the container alive. `None` when using an external URL.
    _container: Option<ContainerAsync<Postgres>>,
}

static SHARED_PG: OnceCell<SharedPg> = OnceCell::const_new();

async fn init_shared_pg() -> SharedPg {
    if let Ok(url) = std::env::var("CHARTER_TEST_PG_URL") {
        return SharedPg {
            base_url: url,
            _container: None,
        };
    }

    let container = Postgres::default()
        .with_tag("16")
        .start()
        .await
        .expect("failed to start PostgreSQL container");

    let host = container.get_host().await.expect("failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("failed to get mapped port");

    let base_url = format!("postgresql://postgres:postgres@{host}:{port}");

    SharedPg {
        base_url,
        _container: Some(container),
    }
}

/// Base URL for the shared PostgreSQL (server root, no database name).
pub async fn pg_url() -> &'static str {
    let shared = SHARED_PG.get_or_init(init_shared_pg).await;
    &shared.base_url
}

/// Create a temporary database with migrations applied.
///
/// Returns `(pool, db_name)`. Call [`drop_test_db`] with the returned
/// `db_name` when the test is done.
pub async fn create_test_db() -> (PgPool, String) {
    let base_url = pg_url().await;

    let maint_url = format!("{base_url}/postgres");
    let maint_pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&maint_url)
        .await
        .expect("failed to connect to maintenance database");

    let db_name = format!("charter_test_{}", Uuid::new_v4().simple());
    let stmt = format!("CREATE DATABASE {db_name}");
    maint_pool
        .execute(stmt.as_str())
        .await
        .unwrap_or_else(|e| panic!("failed to create temp database {db_name}: {e}"));
    maint_pool.close().await;

    let temp_url = format!("{base_url}/{db_name}");
    let temp_pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&temp_url)
        .await
        .unwrap_or_else(|e| panic!("failed to connect to temp database {db_name}: {e}"));

    pool::run_migrations(&temp_pool)
        .await
        .expect("migrations should succeed");

    (temp_pool, db_name)
}

/// Drop a temporary database, terminating any open connections first.
pub async fn drop_test_db(db_name: &str) {
    let base_url = pg_url().await;
    let maint_url = format!("{base_url}/postgres");

    let maint_pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&maint_url)
        .await
        .expect("failed to connect to maintenance database for cleanup");

    let terminate = format!(
        "SELECT pg_terminate_backend(pid) \
         FROM pg_stat_activity \
         WHERE datname = '{db_name}' AND pid <> pg_backend_pid()"
    );
    let _ = maint_pool.execute(terminate.as_str()).await;

    let stmt = format!("DROP DATABASE IF EXISTS {db_name}");
    let _ = maint_pool.execute(stmt.as_str()).await;
    maint_pool.close().await;
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Audit user id used by fixtures.
pub const TEST_ACTOR: Uuid = Uuid::from_u128(0x0000_0000_0000_4000_8000_0000_0000_0001);

/// Flags for a seeded template.
#[derive(Debug, Clone, Copy)]
pub struct TemplateFlags {
    pub is_editable: bool,
    pub is_default: bool,
    pub is_locked: bool,
}

impl TemplateFlags {
    /// A normal, editable customer template.
    pub const EDITABLE: Self = Self {
        is_editable: true,
        is_default: false,
        is_locked: false,
    };

    /// The protected default template that seeds new templates.
    pub const DEFAULT: Self = Self {
        is_editable: false,
        is_default: true,
        is_locked: false,
    };
}

/// Insert a template row with an empty outline.
pub async fn seed_template(pool: &PgPool, name: &str, flags: TemplateFlags) -> Template {
    templates::insert_template(
        pool,
        &NewTemplateRow {
            name,
            template_type: Some(TemplateType::Word),
            entity_type: EntityType::Policy,
            standard_ids: &[],
            customer_ids: &[],
            license_type_id: 1,
            is_published: false,
            is_editable: flags.is_editable,
            is_default: flags.is_default,
            is_available: true,
            is_locked: flags.is_locked,
            llm_enabled: false,
            actor: TEST_ACTOR,
        },
    )
    .await
    .expect("seed template should insert")
}

/// Insert sections described as `(title, parent_index)` pairs, where
/// `parent_index` points at an earlier entry of `layout`. Rows are inserted in
/// order so ids ascend with the slice. Does not touch the outline.
pub async fn seed_sections(
    pool: &PgPool,
    template_id: i32,
    layout: &[(&str, Option<usize>)],
) -> Vec<Section> {
    let mut inserted: Vec<Section> = Vec::with_capacity(layout.len());
    for &(title, parent_index) in layout {
        let parent_id = parent_index.map(|i| inserted[i].id);
        let section = sections::insert_section(
            pool,
            &NewSectionRow {
                template_id,
                section_id: Uuid::new_v4(),
                parent_id,
                title,
                html_content: Some("<p>seed</p>"),
                description: None,
                section_type: SectionType::Global,
                is_active: true,
                is_looped: false,
                actor: TEST_ACTOR,
            },
        )
        .await
        .expect("seed section should insert");
        inserted.push(section);
    }
    inserted
}
