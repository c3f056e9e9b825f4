//! Vault Core - trade ledger and settlement accounts
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core entities (Transaction, Account, User, Asset) and validation
//! - **ports**: Trait definitions for storage (LedgerStore, AccountStore)
//! - **services**: Business logic orchestration (ledger, accounts, event log)
//! - **adapters**: Concrete implementations (DuckDB, in-memory)

pub mod domain;
pub mod ports;
pub mod services;
pub mod adapters;
pub mod config;
pub mod migrations;
pub mod log_migrations;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use adapters::duckdb::DuckDbRepository;
use config::Config;
use services::*;

// Re-export commonly used types at crate root
pub use domain::{
    Account, Asset, AssetId, NewTransaction, PartyRole, Transaction, TransactionFilter,
    TransactionId, User, UserId,
};
pub use domain::result::Error;

/// Main context for vault operations
///
/// This is the primary entry point for all business logic. It holds
/// the database connection, configuration, and all services.
pub struct VaultContext {
    pub config: Config,
    pub repository: Arc<DuckDbRepository>,
    pub ledger: LedgerService,
    pub accounts: AccountService,
    pub event_log: Option<Arc<LoggingService>>,
}

impl VaultContext {
    /// Open the vault in `vault_dir`, creating the database on first use
    pub fn new(vault_dir: &Path) -> Result<Self> {
        let config = Config::load(vault_dir)?;

        let repository = if config.in_memory {
            Arc::new(DuckDbRepository::in_memory()?)
        } else {
            let db_path = config.database_path(vault_dir);
            Arc::new(
                DuckDbRepository::new(&db_path)
                    .with_context(|| format!("failed to open {}", db_path.display()))?,
            )
        };

        // Initialize schema
        repository.ensure_schema()?;

        let event_log = if config.event_log_enabled {
            Some(Arc::new(LoggingService::new(
                vault_dir,
                env!("CARGO_PKG_VERSION"),
            )?))
        } else {
            None
        };

        let mut ledger = LedgerService::new(Arc::clone(&repository) as Arc<dyn ports::LedgerStore>);
        if let Some(log) = &event_log {
            ledger = ledger.with_event_log(Arc::clone(log));
            if let Err(e) = log.log_event("ledger_opened") {
                tracing::warn!(error = %e, "failed to write event log entry");
            }
        }
        let accounts = AccountService::new(Arc::clone(&repository) as Arc<dyn ports::AccountStore>);

        tracing::info!(in_memory = config.in_memory, "vault opened");

        Ok(Self {
            config,
            repository,
            ledger,
            accounts,
            event_log,
        })
    }
}
