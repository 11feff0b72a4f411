use std::str::FromStr;

use async_trait::async_trait;
use bitcoin::{hashes::sha256, OutPoint, Txid};
use sqlx::{
    sqlite::{SqlitePoolOptions, SqliteQueryResult, SqliteRow},
    Pool, Row, Sqlite,
};
use tracing::debug;

use super::SwapStore;
use crate::{
    errors::StoreError,
    types::{SwapInfo, SwapRecord, SwapRole, SwapStatus},
};

const SELECT_SWAPS: &str = r#"
    SELECT
        hash,
        role,
        counterparty_l1_address,
        amount_sat,
        status,
        opened_height,
        payment_outpoint,
        funding_txid,
        send_pending,
        commit_started
    FROM swaps
"#;

/// A [`SwapStore`] backed by a sqlite database.
#[derive(Debug, Clone)]
pub struct SqliteSwapStore {
    pool: Pool<Sqlite>,
}

impl SqliteSwapStore {
    /// Creates the swap table in `pool` if it does not exist yet.
    pub async fn new(pool: Pool<Sqlite>) -> Result<Self, StoreError> {
        let _: SqliteQueryResult = sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS swaps (
                hash CHAR(64) PRIMARY KEY,
                role TEXT NOT NULL,
                counterparty_l1_address TEXT NOT NULL,
                amount_sat INTEGER NOT NULL,
                status TEXT NOT NULL,
                opened_height INTEGER NOT NULL,
                payment_outpoint TEXT UNIQUE,
                funding_txid CHAR(64),
                send_pending INTEGER NOT NULL,
                commit_started INTEGER NOT NULL
            );
            "#,
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    /// Opens the database at `url`, e.g. `sqlite://swaps.db?mode=rwc` or `sqlite::memory:`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        debug!(%url, "opening swap database");
        // A single connection keeps an in-memory database alive and shared.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await?;
        Self::new(pool).await
    }
}

fn hash_key(hash: &sha256::Hash) -> String {
    hash.to_string()
}

fn hash_from_key(key: &str) -> Result<sha256::Hash, StoreError> {
    sha256::Hash::from_str(key).map_err(|e| corrupt("hash", e))
}

fn corrupt(column: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{column}: {err}"))
}

fn record_from_row(row: &SqliteRow) -> Result<SwapRecord, StoreError> {
    let hash: String = row.try_get("hash")?;
    let role: String = row.try_get("role")?;
    let counterparty_l1_address: String = row.try_get("counterparty_l1_address")?;
    let amount_sat: i64 = row.try_get("amount_sat")?;
    let status: String = row.try_get("status")?;
    let opened_height: i64 = row.try_get("opened_height")?;
    let payment: Option<String> = row.try_get("payment_outpoint")?;
    let funding_txid: Option<String> = row.try_get("funding_txid")?;
    let send_pending: bool = row.try_get("send_pending")?;
    let commit_started: bool = row.try_get("commit_started")?;

    Ok(SwapRecord {
        info: SwapInfo {
            hash: hash_from_key(&hash)?,
            counterparty_l1_address,
            amount_sat: u64::try_from(amount_sat).map_err(|e| corrupt("amount_sat", e))?,
            status: SwapStatus::from_str(&status).map_err(|e| corrupt("status", e))?,
        },
        role: SwapRole::from_str(&role).map_err(|e| corrupt("role", e))?,
        opened_height: u32::try_from(opened_height).map_err(|e| corrupt("opened_height", e))?,
        payment: payment
            .map(|outpoint| OutPoint::from_str(&outpoint))
            .transpose()
            .map_err(|e| corrupt("payment_outpoint", e))?,
        funding_txid: funding_txid
            .map(|txid| Txid::from_str(&txid))
            .transpose()
            .map_err(|e| corrupt("funding_txid", e))?,
        send_pending,
        commit_started,
    })
}

#[async_trait]
impl SwapStore for SqliteSwapStore {
    async fn save(&self, record: &SwapRecord) -> Result<(), StoreError> {
        let amount_sat = i64::try_from(record.info.amount_sat)
            .map_err(|e| StoreError::Corrupt(format!("amount_sat out of range: {e}")))?;

        let _: SqliteQueryResult = sqlx::query(
            r#"
            INSERT INTO swaps (
                hash,
                role,
                counterparty_l1_address,
                amount_sat,
                status,
                opened_height,
                payment_outpoint,
                funding_txid,
                send_pending,
                commit_started
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(hash) DO UPDATE SET
                status = excluded.status,
                payment_outpoint = excluded.payment_outpoint,
                funding_txid = excluded.funding_txid,
                send_pending = excluded.send_pending,
                commit_started = excluded.commit_started
            "#,
        )
        .bind(hash_key(&record.info.hash))
        .bind(record.role.as_str())
        .bind(record.info.counterparty_l1_address.as_str())
        .bind(amount_sat)
        .bind(record.info.status.as_str())
        .bind(i64::from(record.opened_height))
        .bind(record.payment.map(|outpoint| outpoint.to_string()))
        .bind(record.funding_txid.map(|txid| txid.to_string()))
        .bind(record.send_pending)
        .bind(record.commit_started)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load(&self, hash: &sha256::Hash) -> Result<Option<SwapRecord>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_SWAPS} WHERE hash = ?"))
            .bind(hash_key(hash))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn load_by_status(&self, status: SwapStatus) -> Result<Vec<SwapRecord>, StoreError> {
        let rows = sqlx::query(&format!("{SELECT_SWAPS} WHERE status = ?"))
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn load_all(&self) -> Result<Vec<SwapRecord>, StoreError> {
        let rows = sqlx::query(SELECT_SWAPS).fetch_all(&self.pool).await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn claim_payment(
        &self,
        hash: &sha256::Hash,
        outpoint: OutPoint,
    ) -> Result<bool, StoreError> {
        let (key, outpoint) = (hash_key(hash), outpoint.to_string());
        let result = sqlx::query(
            r#"
            UPDATE swaps SET payment_outpoint = ?
            WHERE hash = ?
                AND (payment_outpoint IS NULL OR payment_outpoint = ?)
                AND NOT EXISTS (
                    SELECT 1 FROM swaps WHERE payment_outpoint = ? AND hash != ?
                )
            "#,
        )
        .bind(outpoint.as_str())
        .bind(key.as_str())
        .bind(outpoint.as_str())
        .bind(outpoint.as_str())
        .bind(key.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let exists = sqlx::query("SELECT 1 FROM swaps WHERE hash = ?")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;
        match exists {
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(*hash)),
        }
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::hashes::Hash;

    use super::*;

    fn record(byte: u8, status: SwapStatus) -> SwapRecord {
        SwapRecord {
            info: SwapInfo {
                hash: sha256::Hash::hash(&[byte]),
                counterparty_l1_address: "bcrt1qexample".to_string(),
                amount_sat: 50_000,
                status,
            },
            role: SwapRole::Seeker,
            opened_height: 101,
            payment: None,
            funding_txid: None,
            send_pending: false,
            commit_started: false,
        }
    }

    #[tokio::test]
    async fn save_updates_in_place() {
        let store = SqliteSwapStore::connect("sqlite::memory:").await.unwrap();
        let mut swap = record(1, SwapStatus::Opened);
        store.save(&swap).await.unwrap();

        swap.commit_started = true;
        swap.send_pending = true;
        swap.funding_txid = Some(Txid::all_zeros());
        store.save(&swap).await.unwrap();

        assert_eq!(store.load(&swap.info.hash).await.unwrap(), Some(swap.clone()));
        assert_eq!(store.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn payment_is_claimed_by_one_swap() {
        let store = SqliteSwapStore::connect("sqlite::memory:").await.unwrap();
        let (first, second) = (record(5, SwapStatus::Opened), record(6, SwapStatus::Opened));
        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();
        let outpoint = OutPoint::new(Txid::all_zeros(), 1);

        assert!(store.claim_payment(&first.info.hash, outpoint).await.unwrap());
        assert!(store.claim_payment(&first.info.hash, outpoint).await.unwrap());
        assert!(!store.claim_payment(&second.info.hash, outpoint).await.unwrap());
        assert!(!store
            .claim_payment(&first.info.hash, OutPoint::new(Txid::all_zeros(), 2))
            .await
            .unwrap());

        let stored = store.load(&first.info.hash).await.unwrap().unwrap();
        assert_eq!(stored.payment, Some(outpoint));
        assert_eq!(store.load(&second.info.hash).await.unwrap().unwrap().payment, None);
        assert!(matches!(
            store.claim_payment(&sha256::Hash::hash(&[9]), outpoint).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn filters_by_status() {
        let store = SqliteSwapStore::connect("sqlite::memory:").await.unwrap();
        store.save(&record(1, SwapStatus::Opened)).await.unwrap();
        store.save(&record(2, SwapStatus::Canceled)).await.unwrap();
        store.save(&record(3, SwapStatus::Opened)).await.unwrap();

        let opened = store.load_by_status(SwapStatus::Opened).await.unwrap();
        assert_eq!(opened.len(), 2);
        assert!(opened.iter().all(|r| r.info.status == SwapStatus::Opened));
        assert_eq!(store.load(&sha256::Hash::hash(&[9])).await.unwrap(), None);
    }

    #[tokio::test]
    async fn survives_reopening_a_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("swaps.db").display());

        let swap = record(4, SwapStatus::Opened);
        {
            let store = SqliteSwapStore::connect(&url).await.unwrap();
            store.save(&swap).await.unwrap();
            store.pool.close().await;
        }
        let store = SqliteSwapStore::connect(&url).await.unwrap();
        assert_eq!(store.load(&swap.info.hash).await.unwrap(), Some(swap));
    }
}
