// 8.0 engine/core.rs: main engine. wires the store, the price feed and the config together.
// every read-decide-write cycle on an account runs under that account's lock and is
// retried when the store reports the account moved on underneath it.

use super::results::EngineError;
use crate::account::{calculate_snapshot, pending_order_margin, total_unrealized_pnl, Account, AccountSnapshot};
use crate::config::EngineConfig;
use crate::executor::{Execution, ExecutionContext};
use crate::order::PendingOrder;
use crate::position::Position;
use crate::price_feed::{PriceCache, PriceFeed};
use crate::store::{AccountCommit, AccountStore, StoreError};
use crate::trade::ClosedTrade;
use crate::types::{AccountId, OrderId, Price, Quote, Symbol, Timestamp};
use dashmap::DashMap;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/** 8.1: main engine struct. state lives in the store, the engine only caches prices */
pub struct TradingEngine {
    pub(super) config: EngineConfig,
    pub(super) store: Arc<dyn AccountStore>,
    pub(super) feed: Arc<dyn PriceFeed>,
    pub(super) prices: PriceCache,
    pub(super) locks: DashMap<AccountId, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for TradingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradingEngine")
            .field("config", &self.config)
            .field("feed", &self.feed.name())
            .field("locked_accounts", &self.locks.len())
            .finish()
    }
}

impl TradingEngine {
    pub fn new(config: EngineConfig, store: Arc<dyn AccountStore>, feed: Arc<dyn PriceFeed>) -> Self {
        Self {
            config,
            store,
            feed,
            prices: PriceCache::new(),
            locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn AccountStore> {
        &self.store
    }

    pub async fn open_account(&self, initial_balance: Quote) -> Result<Account, EngineError> {
        let account = Account::new(AccountId::new(), initial_balance, Timestamp::now());
        self.store.insert_account(account.clone()).await?;
        info!(account = %account.id, balance = %account.cash_balance, "account opened");
        Ok(account)
    }

    pub async fn get_account(&self, account_id: AccountId) -> Result<Account, EngineError> {
        self.load_account(account_id).await
    }

    pub async fn open_positions(&self, account_id: AccountId) -> Result<Vec<Position>, EngineError> {
        self.load_account(account_id).await?;
        Ok(self.store.list_positions(account_id).await?)
    }

    /// Account state marked to `prices`. Positions without a price count as flat.
    pub async fn account_snapshot(
        &self,
        account_id: AccountId,
        prices: &HashMap<Symbol, Price>,
    ) -> Result<AccountSnapshot, EngineError> {
        let account = self.load_account(account_id).await?;
        let positions = self.store.list_positions(account_id).await?;
        let orders = self.store.list_orders(account_id).await?;
        Ok(calculate_snapshot(&account, positions, orders, prices, self.config.fees.maker_fee_rate))
    }

    /// Snapshot marked to the last prices the engine has seen.
    pub async fn latest_snapshot(&self, account_id: AccountId) -> Result<AccountSnapshot, EngineError> {
        let prices = self.prices.snapshot();
        self.account_snapshot(account_id, &prices).await
    }

    pub async fn trade_history(&self, account_id: AccountId) -> Result<Vec<ClosedTrade>, EngineError> {
        self.load_account(account_id).await?;
        Ok(self.store.list_closed_trades(account_id).await?)
    }

    pub async fn order_history(&self, account_id: AccountId) -> Result<Vec<PendingOrder>, EngineError> {
        self.load_account(account_id).await?;
        Ok(self.store.list_orders(account_id).await?)
    }

    pub(super) async fn load_account(&self, account_id: AccountId) -> Result<Account, EngineError> {
        self.store
            .get_account(account_id)
            .await?
            .ok_or(EngineError::AccountNotFound(account_id))
    }

    fn account_lock(&self, account_id: AccountId) -> Arc<Mutex<()>> {
        self.locks
            .entry(account_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Runs `attempt` under the account lock, re-running it when the commit
    /// loses a version race. The lock entry is dropped again once no other
    /// call holds or waits on it, so the registry only tracks busy accounts.
    pub(super) async fn with_account<T, F, Fut>(&self, account_id: AccountId, attempt: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let lock = self.account_lock(account_id);
        let result = {
            let _guard = lock.lock().await;
            self.retry_stale(account_id, attempt).await
        };

        drop(lock);
        self.locks.remove_if(&account_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn retry_stale<T, F, Fut>(&self, account_id: AccountId, mut attempt: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let mut tries = 0;
        loop {
            tries += 1;
            match attempt().await {
                Err(EngineError::Store(StoreError::StaleWrite { expected, found, .. })) => {
                    if tries >= self.config.max_write_attempts {
                        warn!(account = %account_id, tries, expected, found, "giving up after repeated version conflicts");
                        return Err(EngineError::StaleWrite {
                            account: account_id,
                            expected,
                        });
                    }
                    debug!(account = %account_id, tries, expected, found, "version conflict, retrying");
                    tokio::task::yield_now().await;
                }
                other => return other,
            }
        }
    }

    /// Inputs the executor needs from the rest of the account. `skip_order`
    /// drops an order's own reservation when that order is the one filling.
    pub(super) async fn execution_context(
        &self,
        account: &Account,
        symbol: &Symbol,
        skip_order: Option<OrderId>,
        now: Timestamp,
    ) -> Result<ExecutionContext, EngineError> {
        let positions = self.store.list_positions(account.id).await?;
        let orders: Vec<PendingOrder> = self
            .store
            .list_orders(account.id)
            .await?
            .into_iter()
            .filter(|o| Some(o.id) != skip_order)
            .collect();

        let prices = self.prices.snapshot();
        let other_pnl = total_unrealized_pnl(positions.iter().filter(|p| &p.symbol != symbol), &prices);
        let reserved = pending_order_margin(&orders, self.config.fees.maker_fee_rate);

        Ok(
            ExecutionContext::new(now, self.config.fees.clone(), self.config.markets.max_leverage(symbol))
                .with_unrealized_pnl(other_pnl)
                .with_pending_order_margin(reserved),
        )
    }

    /// Writes everything `exec` changed, plus an order update, in one commit.
    /// The returned execution carries the account's new version.
    pub(super) async fn commit_execution(
        &self,
        mut exec: Execution,
        order: Option<PendingOrder>,
    ) -> Result<Execution, EngineError> {
        let mut commit = AccountCommit::new(exec.account.clone());
        if let Some(removed) = exec.change.removed_position() {
            commit = commit.remove_position(removed.clone());
        }
        if let Some(position) = exec.change.resulting_position() {
            commit = commit.upsert_position(position.clone());
        }
        if let Some(trade) = &exec.closed_trade {
            commit = commit.record_trade(trade.clone());
        }
        if let Some(order) = order {
            commit = commit.write_order(order);
        }

        exec.account.version = self.store.commit(commit).await?;
        Ok(exec)
    }
}
