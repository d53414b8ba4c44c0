use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::error::StoreError;
use crate::store::Store;

/// One flat line of the admin export.
#[derive(Clone, Debug, Serialize, FromRow, PartialEq)]
pub struct ExportRow {
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub twitter_verified: bool,
    pub telegram_verified: bool,
    pub referral_code: Option<String>,
    pub referral_count: i64,
    pub referred_by: Option<String>,
    pub boost_coefficient: Option<f64>,
    pub token_a_balance: Option<String>,
    pub token_b_balance: Option<String>,
    pub token_c_balance: Option<String>,
    pub boost_updated_at: Option<DateTime<Utc>>,
}

impl Store {
    /// Snapshot of every user, in creation order.
    pub async fn export(&self) -> Result<Vec<ExportRow>, StoreError> {
        let rows = sqlx::query_as::<_, ExportRow>(
            "SELECT u.address,
                    u.created_at,
                    COALESCE(p.twitter_verified, 0) AS twitter_verified,
                    COALESCE(p.telegram_verified, 0) AS telegram_verified,
                    p.referral_code,
                    (SELECT COUNT(*) FROM referrals r WHERE r.referrer_progress_id = p.id) AS referral_count,
                    (SELECT ru.address
                       FROM referrals r2
                       JOIN progress rp ON rp.id = r2.referrer_progress_id
                       JOIN users ru ON ru.id = rp.user_id
                      WHERE r2.user_id = u.id) AS referred_by,
                    b.boost_coefficient,
                    b.token_a_balance,
                    b.token_b_balance,
                    b.token_c_balance,
                    b.updated_at AS boost_updated_at
               FROM users u
               LEFT JOIN progress p ON p.user_id = u.id
               LEFT JOIN boosts b ON b.user_id = u.id
              ORDER BY u.id",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Platform;
    use crate::store::tests::addr;
    use portal_core::boost::{calculate_boost, BoostConfig, TokenBalances};
    use portal_core::U256;

    #[tokio::test]
    async fn export_flattens_progress_referrals_and_boosts() {
        let store = Store::in_memory().await.unwrap();
        let (alice, bob) = (addr(1), addr(2));
        let progress = store
            .verify_social(&alice, Platform::Twitter, "alice")
            .await
            .unwrap();
        let code = progress.referral_code.unwrap();
        store.join_referral(code.as_str(), &bob).await.unwrap();
        let balances = TokenBalances::new(U256::ZERO, U256::ZERO, U256::from(3u64));
        store
            .save_boost(
                &bob,
                &balances,
                &calculate_boost(&BoostConfig::default(), &balances),
            )
            .await
            .unwrap();

        let rows = store.export().await.unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].address, alice.to_string());
        assert!(rows[0].twitter_verified);
        assert_eq!(rows[0].referral_code.as_deref(), Some(code.as_str()));
        assert_eq!(rows[0].referral_count, 1);
        assert!(rows[0].boost_coefficient.is_none());

        assert_eq!(rows[1].address, bob.to_string());
        assert_eq!(rows[1].referred_by.as_deref(), Some(alice.as_str()));
        assert_eq!(rows[1].boost_coefficient, Some(1.1));
        assert_eq!(rows[1].token_c_balance.as_deref(), Some("3"));
    }
}
