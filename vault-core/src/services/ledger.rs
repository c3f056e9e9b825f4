//! Ledger service - records trades and answers trade history queries

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::result::Result;
use crate::domain::{AssetId, NewTransaction, Transaction, TransactionFilter, TransactionId, UserId};
use crate::ports::LedgerStore;
use crate::services::logging::{LogEvent, LoggingService};

/// Append-only trade ledger
///
/// The ledger never updates or deletes a recorded trade. Queries return an
/// empty vector when nothing matches; a storage failure is always an error.
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    event_log: Option<Arc<LoggingService>>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            event_log: None,
        }
    }

    /// Also write record outcomes to the persistent event log
    pub fn with_event_log(mut self, event_log: Arc<LoggingService>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    /// Validate and append a trade, returning it with its assigned id
    ///
    /// A trade that fails validation never reaches the store.
    pub fn record(&self, trade: NewTransaction) -> Result<Transaction> {
        let validated = match trade.validate() {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "rejected trade");
                let mut event = LogEvent::new("transaction_rejected").with_error(e.to_string());
                if let Some(asset) = trade.asset {
                    event = event.with_asset(asset.0);
                }
                self.emit(event);
                return Err(e);
            }
        };

        let asset = validated.asset;
        let id = match self.store.insert_transaction(&validated) {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(asset = %asset, error = %e, "failed to store trade");
                self.emit(
                    LogEvent::new("store_failed")
                        .with_asset(asset.0)
                        .with_error(e.to_string())
                        .with_error_details("insert_transaction"),
                );
                return Err(e);
            }
        };

        tracing::info!(transaction = %id, asset = %asset, "recorded trade");
        self.emit(
            LogEvent::new("transaction_recorded")
                .with_asset(asset.0)
                .with_transaction(id.0),
        );
        Ok(validated.into_transaction(id))
    }

    /// Every recorded trade, in id order
    pub fn list_all(&self) -> Result<Vec<Transaction>> {
        self.query(&TransactionFilter::all())
    }

    /// Trades where the user is the buyer or the seller
    pub fn list_for_user(&self, user: UserId) -> Result<Vec<Transaction>> {
        self.query(&TransactionFilter::all().involving(user))
    }

    /// Trades involving the user with `start <= occurred_at <= end`
    pub fn list_for_user_in_range(
        &self,
        user: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        self.query(&TransactionFilter::all().involving(user).between(start, end))
    }

    /// Trades with `start <= occurred_at <= end`; empty when `start > end`
    pub fn list_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Transaction>> {
        self.query(&TransactionFilter::all().between(start, end))
    }

    /// Trades of one asset involving the user on either side
    pub fn list_for_user_and_asset(&self, user: UserId, asset: AssetId) -> Result<Vec<Transaction>> {
        self.query(&TransactionFilter::all().involving(user).with_asset(asset))
    }

    /// Trades where the user bought
    pub fn list_purchases(&self, user: UserId) -> Result<Vec<Transaction>> {
        self.query(&TransactionFilter::all().bought_by(user))
    }

    /// Trades where the user sold
    pub fn list_sales(&self, user: UserId) -> Result<Vec<Transaction>> {
        self.query(&TransactionFilter::all().sold_by(user))
    }

    pub fn query(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        if filter.is_empty_window() {
            return Ok(Vec::new());
        }
        self.store.query_transactions(filter)
    }

    pub fn get(&self, id: TransactionId) -> Result<Option<Transaction>> {
        self.store.get_transaction(id)
    }

    pub fn count(&self) -> Result<u64> {
        self.store.count_transactions()
    }

    /// Event log failures are reported but never fail the ledger operation
    fn emit(&self, event: LogEvent) {
        if let Some(log) = &self.event_log {
            if let Err(e) = log.log(event) {
                tracing::warn!(error = %e, "failed to write event log entry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    use crate::adapters::memory::MemoryStore;

    struct Fixture {
        ledger: LedgerService,
        store: Arc<MemoryStore>,
        alice: UserId,
        bob: UserId,
        carol: UserId,
        btc: AssetId,
        eth: AssetId,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let alice = store.register_user(Some("Alice")).unwrap().id;
        let bob = store.register_user(Some("Bob")).unwrap().id;
        let carol = store.register_user(None).unwrap().id;
        let btc = store.register_asset("BTC", "Bitcoin").unwrap().id;
        let eth = store.register_asset("ETH", "Ether").unwrap().id;
        Fixture {
            ledger: LedgerService::new(store.clone()),
            store,
            alice,
            bob,
            carol,
            btc,
            eth,
        }
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 1, day, 12, 0, 0).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_record_assigns_id_and_keeps_fields() {
        let f = fixture();
        let trade = NewTransaction::new(f.alice, f.bob, f.btc, dec("0.5"), dec("20000"), at(1));

        let recorded = f.ledger.record(trade.clone()).unwrap();
        assert_eq!(recorded.id, TransactionId(1));
        assert_eq!(recorded.buyer, f.alice);
        assert_eq!(recorded.seller, f.bob);
        assert_eq!(recorded.asset, f.btc);
        assert_eq!(recorded.quantity, dec("0.5"));
        assert_eq!(recorded.price, dec("20000"));
        assert_eq!(recorded.occurred_at, at(1));
        assert_eq!(f.ledger.get(recorded.id).unwrap(), Some(recorded));
    }

    #[test]
    fn test_invalid_trade_never_reaches_store() {
        let f = fixture();
        let missing_seller = NewTransaction::default()
            .with_buyer(f.alice)
            .with_asset(f.btc)
            .with_quantity(Decimal::ONE)
            .with_price(Decimal::ONE)
            .occurred_at(at(1));
        let zero_quantity = NewTransaction::new(f.alice, f.bob, f.btc, Decimal::ZERO, Decimal::ONE, at(1));

        assert!(f.ledger.record(missing_seller).unwrap_err().is_validation());
        assert!(f.ledger.record(zero_quantity).unwrap_err().is_validation());
        assert_eq!(f.store.count_transactions().unwrap(), 0);
    }

    #[test]
    fn test_unknown_asset_is_store_error() {
        let f = fixture();
        let trade = NewTransaction::new(f.alice, f.bob, AssetId(99), Decimal::ONE, Decimal::ONE, at(1));
        assert!(f.ledger.record(trade).unwrap_err().is_store());
    }

    #[test]
    fn test_role_queries() {
        let f = fixture();
        let ab = f
            .ledger
            .record(NewTransaction::new(f.alice, f.bob, f.btc, Decimal::ONE, Decimal::TEN, at(1)))
            .unwrap();
        let ba = f
            .ledger
            .record(NewTransaction::new(f.bob, f.alice, f.eth, Decimal::ONE, Decimal::TEN, at(2)))
            .unwrap();
        let bc = f
            .ledger
            .record(NewTransaction::new(f.bob, f.carol, f.btc, Decimal::ONE, Decimal::TEN, at(3)))
            .unwrap();

        assert_eq!(f.ledger.list_for_user(f.alice).unwrap(), vec![ab.clone(), ba.clone()]);
        assert_eq!(f.ledger.list_purchases(f.alice).unwrap(), vec![ab.clone()]);
        assert_eq!(f.ledger.list_sales(f.alice).unwrap(), vec![ba.clone()]);
        assert_eq!(f.ledger.list_for_user_and_asset(f.bob, f.btc).unwrap(), vec![ab, bc]);
        assert_eq!(f.ledger.list_for_user_in_range(f.bob, at(2), at(2)).unwrap(), vec![ba]);
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let f = fixture();
        f.ledger
            .record(NewTransaction::new(f.alice, f.bob, f.btc, Decimal::ONE, Decimal::TEN, at(2)))
            .unwrap();

        assert!(f.ledger.list_in_range(at(3), at(1)).unwrap().is_empty());
        assert_eq!(f.ledger.list_in_range(at(1), at(3)).unwrap().len(), 1);
    }

    #[test]
    fn test_event_log_records_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(LoggingService::new(dir.path(), "test").unwrap());
        let f = fixture();
        let ledger = LedgerService::new(f.store.clone()).with_event_log(log.clone());

        let recorded = ledger
            .record(NewTransaction::new(f.alice, f.bob, f.btc, Decimal::ONE, Decimal::TEN, at(1)))
            .unwrap();
        let _ = ledger.record(NewTransaction::new(f.alice, f.alice, f.btc, Decimal::ONE, Decimal::TEN, at(1)));

        let entries = log.get_recent(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries
            .iter()
            .any(|e| e.event == "transaction_recorded" && e.transaction_id == Some(recorded.id.0)));

        let errors = log.get_errors(10).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].event, "transaction_rejected");
    }
}
