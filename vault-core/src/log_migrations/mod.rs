//! Event log database migrations
//!
//! Same layout as `crate::migrations`, applied to `logs.duckdb` by the
//! `LoggingService` through the shared `MigrationService`.

/// Log migrations in application order: (filename, sql_content)
pub const LOG_MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_initial_schema.sql", include_str!("001_initial_schema.sql")),
];
