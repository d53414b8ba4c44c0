//! Referral join: link a new user to the owner of a referral code, once.

use chrono::Utc;
use portal_core::code::ReferralCode;
use portal_core::Address;
use serde::Serialize;
use sqlx::{FromRow, SqliteConnection};

use crate::error::{is_unique_violation, StoreError};
use crate::models::stored_address;
use crate::store::{ensure_user, Store};

/// Outcome of a successful join.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct JoinReceipt {
    pub referral_id: i64,
    pub referrer: Address,
    pub referred: Address,
}

#[derive(Debug, FromRow)]
struct ReferrerRow {
    progress_id: i64,
    address: String,
}

impl Store {
    /// Redeem `code` for `address` in a single transaction.
    ///
    /// Fails with [`StoreError::InvalidReferralCode`],
    /// [`StoreError::SelfReferralNotAllowed`] or [`StoreError::AlreadyReferred`]
    /// without leaving any rows behind. The transaction takes the write lock
    /// up front, so a concurrent join for the same address waits for this one
    /// and then sees its referral. The unique index on `referrals.user_id`
    /// still maps any row that slips through to `AlreadyReferred`.
    pub async fn join_referral(
        &self,
        code: &str,
        address: &Address,
    ) -> Result<JoinReceipt, StoreError> {
        let code = ReferralCode::parse(code).map_err(|_| StoreError::InvalidReferralCode)?;

        let mut tx = self.begin_write().await?;
        let referrer = sqlx::query_as::<_, ReferrerRow>(
            "SELECT p.id AS progress_id, u.address AS address
               FROM progress p
               JOIN users u ON u.id = p.user_id
              WHERE p.referral_code = ?",
        )
        .bind(code.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::InvalidReferralCode)?;
        let referrer_address = stored_address(&referrer.address)?;
        if &referrer_address == address {
            return Err(StoreError::SelfReferralNotAllowed);
        }

        let user_id = ensure_user(&mut tx, address).await?;
        let previous: Option<i64> = sqlx::query_scalar("SELECT id FROM referrals WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if previous.is_some() {
            return Err(StoreError::AlreadyReferred);
        }

        let referral_id = insert_referral(&mut tx, user_id, referrer.progress_id).await?;
        tx.commit().await?;
        log::info!("{address} joined through {referrer_address} (referral {referral_id})");

        Ok(JoinReceipt {
            referral_id,
            referrer: referrer_address,
            referred: address.clone(),
        })
    }
}

pub(crate) async fn insert_referral(
    conn: &mut SqliteConnection,
    user_id: i64,
    referrer_progress_id: i64,
) -> Result<i64, StoreError> {
    sqlx::query_scalar(
        "INSERT INTO referrals (user_id, referrer_progress_id, created_at)
         VALUES (?, ?, ?)
         RETURNING id",
    )
    .bind(user_id)
    .bind(referrer_progress_id)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            StoreError::AlreadyReferred
        } else {
            StoreError::Storage(err)
        }
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;
    use crate::models::Platform;
    use crate::store::tests::addr;

    async fn referral_rows(store: &Store) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM referrals")
            .fetch_one(store.pool())
            .await
            .unwrap()
    }

    async fn referrer_with_code(store: &Store, address: &Address) -> String {
        let progress = store
            .verify_social(address, Platform::Twitter, &address.to_string())
            .await
            .unwrap();
        progress.referral_code.unwrap().to_string()
    }

    #[tokio::test]
    async fn join_once_then_already_referred() {
        let store = Store::in_memory().await.unwrap();
        let (alice, bob, carol) = (addr(1), addr(2), addr(3));
        let alice_code = referrer_with_code(&store, &alice).await;
        let bob_code = referrer_with_code(&store, &bob).await;

        let receipt = store.join_referral(&alice_code, &carol).await.unwrap();
        assert_eq!(receipt.referrer, alice);
        assert_eq!(receipt.referred, carol);
        assert_eq!(referral_rows(&store).await, 1);

        let same_code = store.join_referral(&alice_code, &carol).await.unwrap_err();
        assert!(matches!(same_code, StoreError::AlreadyReferred));
        let other_code = store.join_referral(&bob_code, &carol).await.unwrap_err();
        assert!(matches!(other_code, StoreError::AlreadyReferred));
        assert_eq!(referral_rows(&store).await, 1);

        let progress = store.progress(&carol).await.unwrap().unwrap();
        assert_eq!(progress.referred_by, Some(alice.clone()));
        assert!(progress.referral_code.is_none());
        let alice_progress = store.progress(&alice).await.unwrap().unwrap();
        assert_eq!(alice_progress.referral_count, 1);
        let referred = store.referrals_of(&alice).await.unwrap();
        assert_eq!(referred.len(), 1);
        assert_eq!(referred[0].referred, carol);
    }

    #[tokio::test]
    async fn code_lookup_ignores_case_and_whitespace() {
        let store = Store::in_memory().await.unwrap();
        let code = referrer_with_code(&store, &addr(1)).await;
        let sloppy = format!("  {} ", code.to_ascii_lowercase());
        assert!(store.join_referral(&sloppy, &addr(2)).await.is_ok());
    }

    #[tokio::test]
    async fn self_referral_is_rejected_without_rows() {
        let store = Store::in_memory().await.unwrap();
        let alice = addr(1);
        let code = referrer_with_code(&store, &alice).await;
        let err = store.join_referral(&code, &alice).await.unwrap_err();
        assert!(matches!(err, StoreError::SelfReferralNotAllowed));
        assert_eq!(referral_rows(&store).await, 0);
    }

    #[tokio::test]
    async fn unknown_code_leaves_no_trace() {
        let store = Store::in_memory().await.unwrap();
        referrer_with_code(&store, &addr(1)).await;
        let newcomer = addr(99);

        for code in ["ZZZZZZ", "not-a-code", ""] {
            let err = store.join_referral(code, &newcomer).await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidReferralCode));
        }
        assert_eq!(referral_rows(&store).await, 0);
        assert!(store.find_user(&newcomer).await.unwrap().is_none());
        assert!(store.progress(&newcomer).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn existing_user_without_referral_can_join() {
        let store = Store::in_memory().await.unwrap();
        let code = referrer_with_code(&store, &addr(1)).await;
        let veteran = addr(2);
        store.touch_user(&veteran).await.unwrap();
        store.join_referral(&code, &veteran).await.unwrap();
        let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(users, 2);
    }

    struct TempDb(PathBuf);

    impl TempDb {
        fn new(tag: &str) -> Self {
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_nanos();
            let name = format!("portal-{tag}-{}-{nanos}.db", std::process::id());
            Self(std::env::temp_dir().join(name))
        }

        fn url(&self) -> String {
            format!("sqlite://{}", self.0.display())
        }
    }

    impl Drop for TempDb {
        fn drop(&mut self) {
            for suffix in ["", "-wal", "-shm"] {
                let mut path = self.0.clone().into_os_string();
                path.push(suffix);
                let _ = std::fs::remove_file(path);
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_joins_on_file_db_yield_one_success() {
        const ROUNDS: u64 = 20;
        let db = TempDb::new("join-race");
        let store = Store::connect(&db.url()).await.unwrap();
        let alice_code = referrer_with_code(&store, &addr(1)).await;
        let bob_code = referrer_with_code(&store, &addr(2)).await;

        for round in 0..ROUNDS {
            let newcomer = addr(1_000 + round);
            let tasks = [alice_code.clone(), bob_code.clone()].map(|code| {
                let store = store.clone();
                let newcomer = newcomer.clone();
                tokio::spawn(async move { store.join_referral(&code, &newcomer).await })
            });
            let mut successes = 0;
            let mut already = 0;
            for task in tasks {
                match task.await.unwrap() {
                    Ok(receipt) => {
                        assert_eq!(receipt.referred, newcomer);
                        successes += 1;
                    }
                    Err(StoreError::AlreadyReferred) => already += 1,
                    Err(other) => panic!("round {round}: unexpected join error: {other}"),
                }
            }
            assert_eq!((successes, already), (1, 1), "round {round}");

            let rows: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM referrals r JOIN users u ON u.id = r.user_id WHERE u.address = ?",
            )
            .bind(newcomer.as_str())
            .fetch_one(store.pool())
            .await
            .unwrap();
            assert_eq!(rows, 1, "round {round}");
        }
        assert_eq!(referral_rows(&store).await, ROUNDS as i64);
        store.pool().close().await;
    }

    #[tokio::test]
    async fn unique_index_rejects_second_referral_row() {
        let store = Store::in_memory().await.unwrap();
        referrer_with_code(&store, &addr(1)).await;
        let mut conn = store.pool().acquire().await.unwrap();
        let referrer_progress: i64 = sqlx::query_scalar("SELECT id FROM progress LIMIT 1")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        let user_id = ensure_user(&mut conn, &addr(2)).await.unwrap();

        insert_referral(&mut conn, user_id, referrer_progress)
            .await
            .unwrap();
        let err = insert_referral(&mut conn, user_id, referrer_progress)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyReferred));
    }
}
