use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use portal_core::boost::{BoostOutcome, TokenBalances};
use portal_core::code::ReferralCode;
use portal_core::Address;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, Transaction};

use crate::error::{is_unique_violation, StoreError};
use crate::models::{
    stored_address, BoostRecord, BoostRow, Platform, ProgressRow, ProgressView, ReferralEntry,
    ReferralRow, UserRecord,
};
use crate::schema;

/// Attempts at drawing an unused referral code before giving up.
pub const MAX_CODE_ATTEMPTS: usize = 8;

const FILE_POOL_CONNECTIONS: u32 = 8;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const PROGRESS_SELECT: &str = "
    SELECT u.address,
           p.twitter_verified,
           p.twitter_account,
           p.telegram_verified,
           p.telegram_account,
           p.referral_code,
           (SELECT COUNT(*) FROM referrals r WHERE r.referrer_progress_id = p.id) AS referral_count,
           (SELECT ru.address
              FROM referrals r2
              JOIN progress rp ON rp.id = r2.referrer_progress_id
              JOIN users ru ON ru.id = rp.user_id
             WHERE r2.user_id = u.id) AS referred_by,
           p.updated_at
      FROM users u
      JOIN progress p ON p.user_id = u.id
     WHERE u.address = ?";

const BOOST_SELECT: &str = "
    SELECT u.address,
           b.token_a_balance,
           b.token_b_balance,
           b.token_c_balance,
           b.boost_coefficient,
           b.has_boost_a,
           b.has_boost_b,
           b.has_boost_c,
           b.updated_at
      FROM boosts b
      JOIN users u ON u.id = b.user_id
     WHERE u.address = ?";

/// Handle to the portal database. Cloning shares the pool.
#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database at `url` and apply the schema.
    ///
    /// In-memory URLs get a single long-lived connection, otherwise every
    /// pooled connection would see its own empty database.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(FILE_POOL_CONNECTIONS)
                .connect_with(
                    options
                        .journal_mode(SqliteJournalMode::Wal)
                        .busy_timeout(BUSY_TIMEOUT),
                )
                .await?
        };
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect("sqlite::memory:").await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a transaction that holds the database write lock from its first
    /// statement. Concurrent writers queue on `BUSY_TIMEOUT` instead of
    /// failing when a deferred read lock cannot be upgraded.
    pub(crate) async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, StoreError> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in schema::STATEMENTS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Create the user (and an empty progress record) on first contact.
    pub async fn touch_user(&self, address: &Address) -> Result<UserRecord, StoreError> {
        let mut tx = self.begin_write().await?;
        let user_id = ensure_user(&mut tx, address).await?;
        let user = sqlx::query_as::<_, UserRecord>(
            "SELECT id, address, created_at FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(user)
    }

    pub async fn find_user(&self, address: &Address) -> Result<Option<UserRecord>, StoreError> {
        let user = sqlx::query_as::<_, UserRecord>(
            "SELECT id, address, created_at FROM users WHERE address = ?",
        )
        .bind(address.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn progress(&self, address: &Address) -> Result<Option<ProgressView>, StoreError> {
        let row = sqlx::query_as::<_, ProgressRow>(PROGRESS_SELECT)
            .bind(address.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(ProgressView::try_from).transpose()
    }

    /// Mark a verification track complete and mint the user's referral code
    /// if this is their first completed track.
    pub async fn verify_social(
        &self,
        address: &Address,
        platform: Platform,
        account_id: &str,
    ) -> Result<ProgressView, StoreError> {
        let account_id = account_id.trim();
        if account_id.is_empty() {
            return Err(StoreError::MissingAccountId(platform.as_str()));
        }

        let mut tx = self.begin_write().await?;
        let user_id = ensure_user(&mut tx, address).await?;
        let update = match platform {
            Platform::Twitter => {
                "UPDATE progress SET twitter_verified = 1, twitter_account = ?, updated_at = ? WHERE user_id = ?"
            }
            Platform::Telegram => {
                "UPDATE progress SET telegram_verified = 1, telegram_account = ?, updated_at = ? WHERE user_id = ?"
            }
        };
        let updated = sqlx::query(update)
            .bind(account_id)
            .bind(Utc::now())
            .bind(user_id)
            .execute(&mut *tx)
            .await;
        match updated {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(StoreError::SocialAccountTaken(platform.as_str()));
            }
            Err(err) => return Err(err.into()),
        }
        let code = mint_code_if_missing(&mut tx, user_id).await?;
        tx.commit().await?;
        log::info!(
            "{} verified {} (referral code {})",
            address,
            platform.as_str(),
            code
        );

        self.progress(address)
            .await?
            .ok_or_else(|| StoreError::UnknownUser(address.to_string()))
    }

    /// Users referred by `address`, oldest first.
    pub async fn referrals_of(&self, address: &Address) -> Result<Vec<ReferralEntry>, StoreError> {
        if self.find_user(address).await?.is_none() {
            return Err(StoreError::UnknownUser(address.to_string()));
        }
        let rows = sqlx::query_as::<_, ReferralRow>(
            "SELECT ru.address AS address, r.created_at AS created_at
               FROM referrals r
               JOIN users ru ON ru.id = r.user_id
               JOIN progress p ON p.id = r.referrer_progress_id
               JOIN users owner ON owner.id = p.user_id
              WHERE owner.address = ?
              ORDER BY r.id",
        )
        .bind(address.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ReferralEntry::try_from).collect()
    }

    /// Overwrite the cached boost of `address` with a fresh computation.
    pub async fn save_boost(
        &self,
        address: &Address,
        balances: &TokenBalances,
        outcome: &BoostOutcome,
    ) -> Result<BoostRecord, StoreError> {
        let now = Utc::now();
        let mut tx = self.begin_write().await?;
        let user_id = ensure_user(&mut tx, address).await?;
        sqlx::query(
            "INSERT INTO boosts (user_id, token_a_balance, token_b_balance, token_c_balance,
                                 boost_coefficient, has_boost_a, has_boost_b, has_boost_c, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 token_a_balance = excluded.token_a_balance,
                 token_b_balance = excluded.token_b_balance,
                 token_c_balance = excluded.token_c_balance,
                 boost_coefficient = excluded.boost_coefficient,
                 has_boost_a = excluded.has_boost_a,
                 has_boost_b = excluded.has_boost_b,
                 has_boost_c = excluded.has_boost_c,
                 updated_at = excluded.updated_at",
        )
        .bind(user_id)
        .bind(balances.token_a.to_string())
        .bind(balances.token_b.to_string())
        .bind(balances.token_c.to_string())
        .bind(outcome.boost_coefficient)
        .bind(outcome.has_boost_a)
        .bind(outcome.has_boost_b)
        .bind(outcome.has_boost_c)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(BoostRecord {
            address: address.clone(),
            balances: balances.clone(),
            boost_coefficient: outcome.boost_coefficient,
            has_boost_a: outcome.has_boost_a,
            has_boost_b: outcome.has_boost_b,
            has_boost_c: outcome.has_boost_c,
            updated_at: now,
        })
    }

    pub async fn boost(&self, address: &Address) -> Result<Option<BoostRecord>, StoreError> {
        let row = sqlx::query_as::<_, BoostRow>(BOOST_SELECT)
            .bind(address.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(BoostRecord::try_from).transpose()
    }

    /// Every known address, in creation order.
    pub async fn addresses(&self) -> Result<Vec<Address>, StoreError> {
        let raw: Vec<String> = sqlx::query_scalar("SELECT address FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        raw.iter().map(|address| stored_address(address)).collect()
    }
}

/// Return the id of the user for `address`, inserting user and progress rows
/// if they do not exist yet.
pub(crate) async fn ensure_user(
    conn: &mut SqliteConnection,
    address: &Address,
) -> Result<i64, StoreError> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO users (address, created_at) VALUES (?, ?) ON CONFLICT(address) DO NOTHING",
    )
    .bind(address.as_str())
    .bind(now)
    .execute(&mut *conn)
    .await?;
    let user_id: i64 = sqlx::query_scalar("SELECT id FROM users WHERE address = ?")
        .bind(address.as_str())
        .fetch_one(&mut *conn)
        .await?;
    sqlx::query(
        "INSERT INTO progress (user_id, updated_at) VALUES (?, ?) ON CONFLICT(user_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(user_id)
}

async fn mint_code_if_missing(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> Result<ReferralCode, StoreError> {
    let existing: Option<String> =
        sqlx::query_scalar("SELECT referral_code FROM progress WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await?;
    if let Some(code) = existing {
        return ReferralCode::parse(&code)
            .map_err(|_| StoreError::Corrupt(format!("referral code {code:?}")));
    }

    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let code = ReferralCode::generate(&mut rand::thread_rng());
        let minted = sqlx::query(
            "UPDATE progress SET referral_code = ? WHERE user_id = ? AND referral_code IS NULL",
        )
        .bind(code.as_str())
        .bind(user_id)
        .execute(&mut *conn)
        .await;
        match minted {
            Ok(_) => return Ok(code),
            Err(err) if is_unique_violation(&err) => {
                log::debug!("referral code collision on attempt {attempt}");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(StoreError::CodeSpaceExhausted(MAX_CODE_ATTEMPTS))
}
