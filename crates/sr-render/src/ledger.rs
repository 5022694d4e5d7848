//! Credit ledger boundary.
//!
//! The scheduler checks the balance at admission, deducts only after a
//! confirmed successful render, and refunds when a charged job fails.

use async_trait::async_trait;
use sr_core::{Result, StoryId, UserId};
use sr_db::pool::{get_conn, DbPool};
use sr_db::queries::credits;

/// Outcome of a balance-changing ledger call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerReceipt {
    pub success: bool,
    pub new_balance: i64,
}

/// External credit ledger.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn check_balance(&self, user_id: UserId) -> Result<i64>;

    async fn deduct(
        &self,
        user_id: UserId,
        amount: i64,
        reason: &str,
        story_id: StoryId,
    ) -> Result<LedgerReceipt>;

    async fn refund(
        &self,
        user_id: UserId,
        amount: i64,
        reason: &str,
        story_id: StoryId,
    ) -> Result<LedgerReceipt>;
}

/// [`CreditLedger`] backed by the local `credit_accounts` tables.
pub struct DbLedger {
    db: DbPool,
}

impl DbLedger {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

impl From<credits::BalanceChange> for LedgerReceipt {
    fn from(change: credits::BalanceChange) -> Self {
        Self {
            success: change.success,
            new_balance: change.new_balance,
        }
    }
}

#[async_trait]
impl CreditLedger for DbLedger {
    async fn check_balance(&self, user_id: UserId) -> Result<i64> {
        let conn = get_conn(&self.db)?;
        credits::balance(&conn, user_id)
    }

    async fn deduct(
        &self,
        user_id: UserId,
        amount: i64,
        reason: &str,
        story_id: StoryId,
    ) -> Result<LedgerReceipt> {
        let conn = get_conn(&self.db)?;
        credits::deduct(&conn, user_id, amount, reason, story_id).map(Into::into)
    }

    async fn refund(
        &self,
        user_id: UserId,
        amount: i64,
        reason: &str,
        story_id: StoryId,
    ) -> Result<LedgerReceipt> {
        let conn = get_conn(&self.db)?;
        credits::refund(&conn, user_id, amount, reason, story_id).map(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sr_db::pool::init_memory_pool;

    #[tokio::test]
    async fn deduct_and_refund_round_trip() {
        let db = init_memory_pool().unwrap();
        let user = UserId::new();
        let story = StoryId::new();
        {
            let conn = get_conn(&db).unwrap();
            credits::grant(&conn, user, 30, "seed").unwrap();
        }
        let ledger = DbLedger::new(db);

        let r = ledger.deduct(user, 10, "video render", story).await.unwrap();
        assert_eq!(
            r,
            LedgerReceipt {
                success: true,
                new_balance: 20
            }
        );
        let r = ledger.refund(user, 10, "render failed", story).await.unwrap();
        assert_eq!(r.new_balance, 30);
        assert_eq!(ledger.check_balance(user).await.unwrap(), 30);
    }

    #[tokio::test]
    async fn declined_deduction() {
        let db = init_memory_pool().unwrap();
        let ledger = DbLedger::new(db);
        let r = ledger
            .deduct(UserId::new(), 10, "video render", StoryId::new())
            .await
            .unwrap();
        assert!(!r.success);
        assert_eq!(r.new_balance, 0);
    }
}
