use crate::domain::money::{Amount, Balance};
use crate::domain::ports::{LedgerStore, ReconciliationQueue, Reservation};
use crate::domain::reconciliation::ReconciliationEntry;
use crate::domain::transaction::{
    PaymentCommand, Settlement, Transaction, TransactionId, TransactionStatus,
};
use crate::domain::wallet::Wallet;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
    WriteOptions,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for wallet balances, keyed by user id.
pub const CF_WALLETS: &str = "wallets";
/// Column Family for transaction records, keyed by transaction id.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family indexing transactions per user (`user_id ++ transaction_id`).
pub const CF_USER_TRANSACTIONS: &str = "user_transactions";
/// Column Family mapping `user_id ++ idempotency_key` to a transaction id.
pub const CF_IDEMPOTENCY: &str = "idempotency";
/// Column Family for the reconciliation queue, keyed by transaction id.
pub const CF_RECONCILIATION: &str = "reconciliation";

/// A persistent ledger and reconciliation queue using RocksDB.
///
/// Each mutating call builds one `WriteBatch` and commits it with a synced
/// WAL, so a balance change and its transaction row land together or not at
/// all. The read-check-write part of a call runs under `write_lock`, which is
/// the row-lock equivalent for this single-writer engine.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating
    /// any missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [
            CF_WALLETS,
            CF_TRANSACTIONS,
            CF_USER_TRANSACTIONS,
            CF_IDEMPOTENCY,
            CF_RECONCILIATION,
        ]
        .into_iter()
        .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
        .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                "{} column family not found",
                name
            ))))
        })
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_pinned_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf_name: &str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        let cf = self.cf(cf_name)?;
        batch.put_cf(cf, key, serde_json::to_vec(value)?);
        Ok(())
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        let mut opts = WriteOptions::default();
        opts.set_sync(true);
        self.db.write_opt(batch, &opts)?;
        Ok(())
    }

    fn wallet(&self, user_id: u64) -> Result<Option<Wallet>> {
        self.get_json(CF_WALLETS, &user_id.to_be_bytes())
    }

    fn stored_transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        self.get_json(CF_TRANSACTIONS, &id.to_bytes())
    }
}

fn user_prefixed(user_id: u64, suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + suffix.len());
    key.extend_from_slice(&user_id.to_be_bytes());
    key.extend_from_slice(suffix);
    key
}

#[async_trait]
impl LedgerStore for RocksDBStore {
    async fn reserve_and_create(&self, command: &PaymentCommand) -> Result<Reservation> {
        let _guard = self.write_lock.lock().await;

        let idem_key = user_prefixed(command.user_id, command.idempotency_key.as_str().as_bytes());
        let cf_idem = self.cf(CF_IDEMPOTENCY)?;
        if let Some(raw) = self.db.get_pinned_cf(cf_idem, &idem_key)? {
            let bytes: [u8; 16] = raw.as_ref().try_into().map_err(|_| {
                PaymentError::InternalError(Box::new(std::io::Error::other(
                    "Corrupt idempotency index entry",
                )))
            })?;
            let id = TransactionId::from_bytes(bytes);
            let existing = self
                .stored_transaction(id)?
                .ok_or(PaymentError::TransactionNotFound(id))?;
            if !existing.matches_command(command) {
                return Err(PaymentError::InvalidCommand(format!(
                    "Idempotency key '{}' was already used for a different payment",
                    command.idempotency_key
                )));
            }
            return Ok(Reservation::Existing(existing));
        }

        let mut wallet = self
            .wallet(command.user_id)?
            .unwrap_or_else(|| Wallet::new(command.user_id));
        wallet.reserve(command.amount)?;

        let tx = Transaction::pending(command);
        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_WALLETS, &command.user_id.to_be_bytes(), &wallet)?;
        self.put_json(&mut batch, CF_TRANSACTIONS, &tx.id.to_bytes(), &tx)?;
        batch.put_cf(
            self.cf(CF_USER_TRANSACTIONS)?,
            user_prefixed(command.user_id, &tx.id.to_bytes()),
            b"",
        );
        batch.put_cf(cf_idem, &idem_key, tx.id.to_bytes());
        self.commit(batch)?;

        Ok(Reservation::Created(tx))
    }

    async fn finalize(&self, id: TransactionId, settlement: Settlement) -> Result<Transaction> {
        let _guard = self.write_lock.lock().await;

        let mut tx = self
            .stored_transaction(id)?
            .ok_or(PaymentError::TransactionNotFound(id))?;
        tx.settle(&settlement)?;

        let mut batch = WriteBatch::default();
        if tx.status == TransactionStatus::Failed {
            let mut wallet = self
                .wallet(tx.user_id)?
                .unwrap_or_else(|| Wallet::new(tx.user_id));
            wallet.credit(tx.amount)?;
            self.put_json(&mut batch, CF_WALLETS, &tx.user_id.to_be_bytes(), &wallet)?;
        }
        self.put_json(&mut batch, CF_TRANSACTIONS, &id.to_bytes(), &tx)?;
        self.commit(batch)?;

        Ok(tx)
    }

    async fn mark_reconciling(&self, id: TransactionId) -> Result<Transaction> {
        let _guard = self.write_lock.lock().await;

        let mut tx = self
            .stored_transaction(id)?
            .ok_or(PaymentError::TransactionNotFound(id))?;
        if tx.status == TransactionStatus::Reconciling {
            return Ok(tx);
        }
        tx.transition(TransactionStatus::Reconciling)?;

        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_TRANSACTIONS, &id.to_bytes(), &tx)?;
        self.commit(batch)?;
        Ok(tx)
    }

    async fn deposit(&self, user_id: u64, amount: Amount) -> Result<Balance> {
        let _guard = self.write_lock.lock().await;

        let mut wallet = self.wallet(user_id)?.unwrap_or_else(|| Wallet::new(user_id));
        wallet.credit(amount)?;

        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_WALLETS, &user_id.to_be_bytes(), &wallet)?;
        self.commit(batch)?;
        Ok(wallet.balance)
    }

    async fn balance(&self, user_id: u64) -> Result<Balance> {
        Ok(self
            .wallet(user_id)?
            .map(|w| w.balance)
            .unwrap_or(Balance::ZERO))
    }

    async fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        self.stored_transaction(id)
    }

    async fn list_transactions(&self, user_id: u64, limit: usize) -> Result<Vec<Transaction>> {
        let cf = self.cf(CF_USER_TRANSACTIONS)?;
        let prefix = user_id.to_be_bytes();
        let upper = user_prefixed(user_id, &[0xFF; 16]);

        let mut transactions = Vec::new();
        // ULIDs sort by creation time, so walking the index backwards is newest first.
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(&upper, Direction::Reverse))
        {
            if transactions.len() >= limit {
                break;
            }
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let bytes: [u8; 16] = key[8..].try_into().map_err(|_| {
                PaymentError::InternalError(Box::new(std::io::Error::other(
                    "Corrupt user transaction index key",
                )))
            })?;
            if let Some(tx) = self.stored_transaction(TransactionId::from_bytes(bytes))? {
                transactions.push(tx);
            }
        }
        Ok(transactions)
    }

    async fn wallets(&self) -> Result<Vec<Wallet>> {
        let cf = self.cf(CF_WALLETS)?;
        let mut wallets = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            wallets.push(serde_json::from_slice(&value)?);
        }
        Ok(wallets)
    }

    async fn unresolved(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<Transaction>> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        let mut open = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let tx: Transaction = serde_json::from_slice(&value)?;
            if !tx.status.is_terminal() && tx.updated_at <= cutoff {
                open.push(tx);
            }
        }
        open.sort_by(|a, b| (a.updated_at, a.id).cmp(&(b.updated_at, b.id)));
        open.truncate(limit);
        Ok(open)
    }
}

#[async_trait]
impl ReconciliationQueue for RocksDBStore {
    async fn enqueue(&self, entry: ReconciliationEntry) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.put_json(
            &mut batch,
            CF_RECONCILIATION,
            &entry.transaction_id.to_bytes(),
            &entry,
        )?;
        self.commit(batch)
    }

    async fn pending(&self, limit: usize) -> Result<Vec<ReconciliationEntry>> {
        let cf = self.cf(CF_RECONCILIATION)?;
        let mut entries: Vec<ReconciliationEntry> = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            entries.push(serde_json::from_slice(&value)?);
        }
        entries.sort_by(|a, b| {
            (a.enqueued_at, a.transaction_id).cmp(&(b.enqueued_at, b.transaction_id))
        });
        entries.truncate(limit);
        Ok(entries)
    }

    async fn record_attempt(&self, id: TransactionId, error: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let Some(mut entry) = self.get_json::<ReconciliationEntry>(CF_RECONCILIATION, &id.to_bytes())?
        else {
            return Ok(());
        };
        entry.record_attempt(error);
        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_RECONCILIATION, &id.to_bytes(), &entry)?;
        self.commit(batch)
    }

    async fn remove(&self, id: TransactionId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut batch = WriteBatch::default();
        batch.delete_cf(self.cf(CF_RECONCILIATION)?, id.to_bytes());
        self.commit(batch)
    }
}
