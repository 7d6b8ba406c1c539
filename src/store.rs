//! Account store.
//!
//! Persistence for accounts, open positions, limit orders and closed trades.
//! Reads are per record. Writes go through [`AccountStore::commit`], which
//! applies everything one decision produced for one account in a single step
//! and rejects the write if the account moved on since it was read.

use crate::account::Account;
use crate::order::PendingOrder;
use crate::position::Position;
use crate::trade::ClosedTrade;
use crate::types::{AccountId, OrderId, Symbol};
use dashmap::DashMap;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("account {account} was modified concurrently (expected version {expected}, found {found})")]
    StaleWrite { account: AccountId, expected: u64, found: u64 },

    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    #[error("account {0} already exists")]
    AccountExists(AccountId),

    #[error("rejected write: {0}")]
    Rejected(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Everything one engine decision changes for one account.
///
/// `account.version` must be the version that was read; the store bumps it.
/// Removals apply before upserts so a flip can remove and re-add the same
/// symbol in one commit.
#[derive(Debug, Clone)]
pub struct AccountCommit {
    pub account: Account,
    pub removed_positions: Vec<Position>,
    pub upserted_positions: Vec<Position>,
    pub closed_trades: Vec<ClosedTrade>,
    pub orders: Vec<PendingOrder>,
}

impl AccountCommit {
    pub fn new(account: Account) -> Self {
        Self {
            account,
            removed_positions: Vec::new(),
            upserted_positions: Vec::new(),
            closed_trades: Vec::new(),
            orders: Vec::new(),
        }
    }

    pub fn remove_position(mut self, position: Position) -> Self {
        self.removed_positions.push(position);
        self
    }

    pub fn upsert_position(mut self, position: Position) -> Self {
        self.upserted_positions.push(position);
        self
    }

    pub fn record_trade(mut self, trade: ClosedTrade) -> Self {
        self.closed_trades.push(trade);
        self
    }

    pub fn write_order(mut self, order: PendingOrder) -> Self {
        self.orders.push(order);
        self
    }
}

#[async_trait::async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert_account(&self, account: Account) -> Result<(), StoreError>;

    async fn get_account(&self, account_id: AccountId) -> Result<Option<Account>, StoreError>;

    /// At most one open position exists per account and symbol.
    async fn get_position(&self, account_id: AccountId, symbol: &Symbol) -> Result<Option<Position>, StoreError>;

    async fn list_positions(&self, account_id: AccountId) -> Result<Vec<Position>, StoreError>;

    /// Open positions across all accounts.
    async fn list_open_positions(&self) -> Result<Vec<Position>, StoreError>;

    async fn get_order(&self, order_id: OrderId) -> Result<Option<PendingOrder>, StoreError>;

    /// All orders of an account in any status, oldest first.
    async fn list_orders(&self, account_id: AccountId) -> Result<Vec<PendingOrder>, StoreError>;

    /// Pending orders across all accounts, in insertion order per account.
    async fn list_pending_orders(&self) -> Result<Vec<PendingOrder>, StoreError>;

    async fn list_closed_trades(&self, account_id: AccountId) -> Result<Vec<ClosedTrade>, StoreError>;

    /// Applies the commit atomically. Returns the account's new version.
    async fn commit(&self, commit: AccountCommit) -> Result<u64, StoreError>;
}

#[derive(Debug)]
struct AccountRecord {
    account: Account,
    positions: HashMap<Symbol, Position>,
    orders: Vec<PendingOrder>,
    trades: Vec<ClosedTrade>,
}

/// In-process store. Each account's records sit behind one map entry, so a
/// commit holds a single shard lock while it checks the version and applies.
#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: DashMap<AccountId, AccountRecord>,
    order_index: DashMap<OrderId, AccountId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn validate(record: &AccountRecord, commit: &AccountCommit) -> Result<(), StoreError> {
        let account_id = record.account.id;
        let foreign_position = commit
            .removed_positions
            .iter()
            .chain(commit.upserted_positions.iter())
            .find(|p| p.account_id != account_id);
        if let Some(p) = foreign_position {
            return Err(StoreError::Rejected(format!("position {} belongs to account {}", p.id, p.account_id)));
        }
        if let Some(t) = commit.closed_trades.iter().find(|t| t.account_id != account_id) {
            return Err(StoreError::Rejected(format!("trade {} belongs to account {}", t.id, t.account_id)));
        }
        if let Some(o) = commit.orders.iter().find(|o| o.account_id != account_id) {
            return Err(StoreError::Rejected(format!("order {} belongs to account {}", o.id, o.account_id)));
        }
        if let Some(p) = commit.upserted_positions.iter().find(|p| p.size <= rust_decimal::Decimal::ZERO) {
            return Err(StoreError::Rejected(format!("position {} has non-positive size {}", p.id, p.size)));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AccountStore for MemoryStore {
    async fn insert_account(&self, account: Account) -> Result<(), StoreError> {
        use dashmap::mapref::entry::Entry;

        match self.accounts.entry(account.id) {
            Entry::Occupied(_) => Err(StoreError::AccountExists(account.id)),
            Entry::Vacant(slot) => {
                slot.insert(AccountRecord {
                    account,
                    positions: HashMap::new(),
                    orders: Vec::new(),
                    trades: Vec::new(),
                });
                Ok(())
            }
        }
    }

    async fn get_account(&self, account_id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.get(&account_id).map(|r| r.account.clone()))
    }

    async fn get_position(&self, account_id: AccountId, symbol: &Symbol) -> Result<Option<Position>, StoreError> {
        Ok(self
            .accounts
            .get(&account_id)
            .and_then(|r| r.positions.get(symbol).cloned()))
    }

    async fn list_positions(&self, account_id: AccountId) -> Result<Vec<Position>, StoreError> {
        let mut positions: Vec<Position> = self
            .accounts
            .get(&account_id)
            .map(|r| r.positions.values().cloned().collect())
            .unwrap_or_default();
        positions.sort_by_key(|p| p.created_at);
        Ok(positions)
    }

    async fn list_open_positions(&self) -> Result<Vec<Position>, StoreError> {
        Ok(self
            .accounts
            .iter()
            .flat_map(|r| r.positions.values().cloned().collect::<Vec<_>>())
            .collect())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<PendingOrder>, StoreError> {
        // copy the id out so no index guard is held while the account shard is locked
        let Some(account_id) = self.order_index.get(&order_id).map(|r| *r.value()) else {
            return Ok(None);
        };
        Ok(self
            .accounts
            .get(&account_id)
            .and_then(|r| r.orders.iter().find(|o| o.id == order_id).cloned()))
    }

    async fn list_orders(&self, account_id: AccountId) -> Result<Vec<PendingOrder>, StoreError> {
        Ok(self
            .accounts
            .get(&account_id)
            .map(|r| r.orders.clone())
            .unwrap_or_default())
    }

    async fn list_pending_orders(&self) -> Result<Vec<PendingOrder>, StoreError> {
        Ok(self
            .accounts
            .iter()
            .flat_map(|r| r.orders.iter().filter(|o| o.is_pending()).cloned().collect::<Vec<_>>())
            .collect())
    }

    async fn list_closed_trades(&self, account_id: AccountId) -> Result<Vec<ClosedTrade>, StoreError> {
        Ok(self
            .accounts
            .get(&account_id)
            .map(|r| r.trades.clone())
            .unwrap_or_default())
    }

    async fn commit(&self, commit: AccountCommit) -> Result<u64, StoreError> {
        let account_id = commit.account.id;
        let mut record = self
            .accounts
            .get_mut(&account_id)
            .ok_or(StoreError::AccountNotFound(account_id))?;

        if record.account.version != commit.account.version {
            return Err(StoreError::StaleWrite {
                account: account_id,
                expected: commit.account.version,
                found: record.account.version,
            });
        }
        Self::validate(&record, &commit)?;

        for removed in &commit.removed_positions {
            if record.positions.get(&removed.symbol).map(|p| p.id) == Some(removed.id) {
                record.positions.remove(&removed.symbol);
            }
        }
        for position in commit.upserted_positions {
            record.positions.insert(position.symbol.clone(), position);
        }

        record.trades.extend(commit.closed_trades);

        for order in commit.orders {
            match record.orders.iter_mut().find(|o| o.id == order.id) {
                Some(existing) => *existing = order,
                None => {
                    self.order_index.insert(order.id, account_id);
                    record.orders.push(order);
                }
            }
        }

        let version = commit.account.version + 1;
        record.account = Account { version, ..commit.account };

        debug!(account = %account_id, version, "commit applied");
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Leverage, MarginMode, Price, Quote, Side, Timestamp};
    use rust_decimal_macros::dec;

    async fn seeded() -> (MemoryStore, Account) {
        let store = MemoryStore::new();
        let account = Account::new(AccountId::new(), Quote::new(dec!(1000)), Timestamp::from_millis(0));
        store.insert_account(account.clone()).await.unwrap();
        (store, account)
    }

    fn position(account: &Account, symbol: &str) -> Position {
        Position::open(
            account.id,
            Symbol::new(symbol),
            Side::Long,
            dec!(1),
            Price::new_unchecked(dec!(100)),
            Leverage::new(dec!(5)).unwrap(),
            MarginMode::Cross,
            Timestamp::from_millis(1),
        )
    }

    fn order(account: &Account) -> PendingOrder {
        PendingOrder::new(
            account.id,
            Symbol::new("ETH"),
            Side::Long,
            dec!(1),
            Price::new_unchecked(dec!(100)),
            Leverage::new(dec!(5)).unwrap(),
            MarginMode::Cross,
            Timestamp::from_millis(1),
        )
    }

    #[tokio::test]
    async fn commit_bumps_version() {
        let (store, account) = seeded().await;
        let version = store
            .commit(AccountCommit::new(account.clone()).upsert_position(position(&account, "BTC")))
            .await
            .unwrap();
        assert_eq!(version, 1);

        let stored = store.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert!(store.get_position(account.id, &Symbol::new("BTC")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn stale_commit_rejected_without_effect() {
        let (store, account) = seeded().await;
        store.commit(AccountCommit::new(account.clone())).await.unwrap();

        let mut stale = account.clone();
        stale.cash_balance = Quote::zero();
        let err = store
            .commit(AccountCommit::new(stale).upsert_position(position(&account, "BTC")))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::StaleWrite {
                account: account.id,
                expected: 0,
                found: 1
            }
        );

        let stored = store.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(stored.cash_balance.value(), dec!(1000));
        assert!(store.list_positions(account.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_then_upsert_same_symbol() {
        let (store, account) = seeded().await;
        let first = position(&account, "BTC");
        store
            .commit(AccountCommit::new(account.clone()).upsert_position(first.clone()))
            .await
            .unwrap();

        let mut account = store.get_account(account.id).await.unwrap().unwrap();
        let second = Position {
            side: Side::Short,
            ..position(&account, "BTC")
        };
        store
            .commit(AccountCommit::new(account.clone()).remove_position(first).upsert_position(second.clone()))
            .await
            .unwrap();

        account = store.get_account(account.id).await.unwrap().unwrap();
        let positions = store.list_positions(account.id).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].id, second.id);
    }

    #[tokio::test]
    async fn orders_update_in_place() {
        let (store, account) = seeded().await;
        let mut o = order(&account);
        store.commit(AccountCommit::new(account.clone()).write_order(o.clone())).await.unwrap();

        o.cancel(Timestamp::from_millis(5)).unwrap();
        let account = store.get_account(account.id).await.unwrap().unwrap();
        store.commit(AccountCommit::new(account.clone()).write_order(o.clone())).await.unwrap();

        let orders = store.list_orders(account.id).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert!(!orders[0].is_pending());
        assert!(store.list_pending_orders().await.unwrap().is_empty());
        assert_eq!(store.get_order(o.id).await.unwrap().unwrap().id, o.id);
    }

    #[tokio::test]
    async fn foreign_records_rejected() {
        let (store, account) = seeded().await;
        let stranger = Account::new(AccountId::new(), Quote::zero(), Timestamp::from_millis(0));
        let err = store
            .commit(AccountCommit::new(account.clone()).upsert_position(position(&stranger, "BTC")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
    }

    #[tokio::test]
    async fn duplicate_and_missing_accounts() {
        let (store, account) = seeded().await;
        assert_eq!(
            store.insert_account(account.clone()).await.unwrap_err(),
            StoreError::AccountExists(account.id)
        );

        let ghost = Account::new(AccountId::new(), Quote::zero(), Timestamp::from_millis(0));
        assert_eq!(
            store.commit(AccountCommit::new(ghost.clone())).await.unwrap_err(),
            StoreError::AccountNotFound(ghost.id)
        );
    }
}
