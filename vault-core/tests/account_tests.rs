//! Integration tests for settlement accounts backed by DuckDB
//!
//! Run with: cargo test --test account_tests -- --nocapture

use std::sync::Arc;
use tempfile::TempDir;

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;

use vault_core::adapters::duckdb::DuckDbRepository;
use vault_core::domain::{NewTransaction, UserId};
use vault_core::ports::{AccountStore, LedgerStore};
use vault_core::services::{AccountService, LedgerService};

const BUYER_IBAN: &str = "NL91ABNA0417164300";
const SELLER_IBAN: &str = "DE89370400440532013000";

fn create_test_repo(temp_dir: &TempDir) -> Arc<DuckDbRepository> {
    let db_path = temp_dir.path().join("accounts.duckdb");
    let repo = DuckDbRepository::new(&db_path).expect("Failed to create repository");
    repo.ensure_schema().expect("Failed to initialize schema");
    Arc::new(repo)
}

#[test]
fn test_open_account_normalizes_and_rejects_duplicates() {
    let temp_dir = TempDir::new().unwrap();
    let accounts = AccountService::new(create_test_repo(&temp_dir));

    let account = accounts
        .open_account("nl91 abna 0417 1643 00", Decimal::new(1050, 2))
        .unwrap();
    assert_eq!(account.iban, BUYER_IBAN);
    assert_eq!(account.owner, None);

    let stored = accounts.get_account(BUYER_IBAN).unwrap().unwrap();
    assert_eq!(stored.balance, Decimal::new(1050, 2));

    assert!(accounts
        .open_account(BUYER_IBAN, Decimal::ZERO)
        .unwrap_err()
        .is_store());
    assert!(accounts
        .open_account("not an iban", Decimal::ZERO)
        .unwrap_err()
        .is_validation());
    assert!(accounts
        .open_account(SELLER_IBAN, Decimal::new(-1, 0))
        .unwrap_err()
        .is_validation());
}

#[test]
fn test_owner_must_exist_and_is_set_once() {
    let temp_dir = TempDir::new().unwrap();
    let repo = create_test_repo(&temp_dir);
    let accounts = AccountService::new(repo.clone());
    let alice = repo.register_user(Some("Alice")).unwrap().id;
    let bob = repo.register_user(Some("Bob")).unwrap().id;

    accounts.open_account(BUYER_IBAN, Decimal::ZERO).unwrap();
    assert!(accounts
        .assign_owner(BUYER_IBAN, UserId(404))
        .unwrap_err()
        .is_not_found());

    let owned = accounts.assign_owner(BUYER_IBAN, alice).unwrap();
    assert_eq!(owned.owner, Some(alice));
    assert!(accounts.assign_owner(BUYER_IBAN, bob).unwrap_err().is_validation());
    assert_eq!(accounts.accounts_for_owner(alice).unwrap(), vec![owned]);
}

#[test]
fn test_balance_changes_persist() {
    let temp_dir = TempDir::new().unwrap();
    {
        let accounts = AccountService::new(create_test_repo(&temp_dir));
        accounts.open_account(BUYER_IBAN, Decimal::ZERO).unwrap();
        accounts.deposit(BUYER_IBAN, Decimal::new(25000, 2)).unwrap();
        accounts.withdraw(BUYER_IBAN, Decimal::new(5001, 2)).unwrap();
        assert!(accounts
            .withdraw(BUYER_IBAN, Decimal::new(1_000_000, 2))
            .unwrap_err()
            .is_validation());
    }

    let accounts = AccountService::new(create_test_repo(&temp_dir));
    let account = accounts.get_account(BUYER_IBAN).unwrap().unwrap();
    assert_eq!(account.balance, Decimal::new(19999, 2));
    assert!(accounts
        .deposit(SELLER_IBAN, Decimal::ONE)
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_record_then_settle() {
    let temp_dir = TempDir::new().unwrap();
    let repo = create_test_repo(&temp_dir);
    let ledger = LedgerService::new(repo.clone());
    let accounts = AccountService::new(repo.clone());

    let buyer = repo.register_user(Some("buyer")).unwrap().id;
    let seller = repo.register_user(Some("seller")).unwrap().id;
    let btc = repo.register_asset("BTC", "Bitcoin").unwrap().id;

    accounts.open_account(BUYER_IBAN, Decimal::new(30000, 0)).unwrap();
    accounts.open_account(SELLER_IBAN, Decimal::ZERO).unwrap();
    accounts.assign_owner(BUYER_IBAN, buyer).unwrap();
    accounts.assign_owner(SELLER_IBAN, seller).unwrap();

    let at = Utc.with_ymd_and_hms(2022, 6, 1, 8, 0, 0).unwrap();
    let trade = ledger
        .record(NewTransaction::new(
            buyer,
            seller,
            btc,
            Decimal::new(5, 1),
            Decimal::new(20000, 0),
            at,
        ))
        .unwrap();

    accounts.settle(&trade, BUYER_IBAN, SELLER_IBAN).unwrap();
    assert_eq!(
        accounts.get_account(BUYER_IBAN).unwrap().unwrap().balance,
        Decimal::new(10000, 0)
    );
    assert_eq!(
        accounts.get_account(SELLER_IBAN).unwrap().unwrap().balance,
        Decimal::new(20000, 0)
    );

    // Second settlement would overdraw the buyer; neither side moves
    assert!(accounts
        .settle(&trade, BUYER_IBAN, SELLER_IBAN)
        .unwrap_err()
        .is_validation());
    assert_eq!(
        accounts.get_account(SELLER_IBAN).unwrap().unwrap().balance,
        Decimal::new(20000, 0)
    );
}

#[test]
fn test_oversized_amounts_are_rejected_and_repository_stays_usable() {
    let temp_dir = TempDir::new().unwrap();
    let repo = create_test_repo(&temp_dir);
    let accounts = AccountService::new(repo.clone());
    let ledger = LedgerService::new(repo.clone());
    let limit = Decimal::from_i128_with_scale(100_000_000_000_000_000_000, 0);
    let just_below = limit - Decimal::ONE;

    accounts.open_account(BUYER_IBAN, Decimal::ONE).unwrap();
    accounts.open_account(SELLER_IBAN, Decimal::ZERO).unwrap();

    assert!(accounts.deposit(BUYER_IBAN, Decimal::MAX).unwrap_err().is_validation());
    assert!(accounts.deposit(BUYER_IBAN, limit).unwrap_err().is_validation());
    assert!(accounts.withdraw(BUYER_IBAN, limit).unwrap_err().is_validation());
    assert!(repo.transfer(BUYER_IBAN, SELLER_IBAN, limit).unwrap_err().is_validation());
    assert!(accounts
        .open_account("GB29NWBK60161331926819", Decimal::MAX)
        .unwrap_err()
        .is_validation());

    // Largest storable amount is fine, one more unit overflows the column
    let account = accounts.deposit(SELLER_IBAN, just_below).unwrap();
    assert_eq!(account.balance, just_below);
    assert!(accounts.deposit(SELLER_IBAN, Decimal::ONE).unwrap_err().is_validation());

    // Nothing above poisoned the repository
    assert_eq!(
        accounts.get_account(BUYER_IBAN).unwrap().unwrap().balance,
        Decimal::ONE
    );
    assert_eq!(
        accounts.get_account(SELLER_IBAN).unwrap().unwrap().balance,
        just_below
    );
    assert!(ledger.list_all().unwrap().is_empty());
    assert!(repo.register_user(Some("after")).is_ok());
}
