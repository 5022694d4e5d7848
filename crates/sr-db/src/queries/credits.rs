//! Credit accounts and the transaction journal.

use chrono::Utc;
use rusqlite::Connection;
use sr_core::{Error, Result, StoryId, TransactionId, UserId};

use crate::models::{timestamp, CreditTransaction};

const TX_COLS: &str = "id, user_id, amount, kind, reason, story_id, balance_after, created_at";

/// Result of a balance-changing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    pub success: bool,
    pub new_balance: i64,
}

/// Current balance; users without an account have zero.
pub fn balance(conn: &Connection, user_id: UserId) -> Result<i64> {
    match conn.query_row(
        "SELECT balance FROM credit_accounts WHERE user_id = ?1",
        [user_id.to_string()],
        |row| row.get(0),
    ) {
        Ok(b) => Ok(b),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Add credits to an account, creating it if needed.
pub fn grant(conn: &Connection, user_id: UserId, amount: i64, reason: &str) -> Result<i64> {
    if amount <= 0 {
        return Err(Error::Validation(format!("grant amount must be positive, got {amount}")));
    }
    credit(conn, user_id, amount, "grant", reason, None)
}

/// Return credits to an account after a failed render.
pub fn refund(
    conn: &Connection,
    user_id: UserId,
    amount: i64,
    reason: &str,
    story_id: StoryId,
) -> Result<BalanceChange> {
    let new_balance = credit(conn, user_id, amount, "refund", reason, Some(story_id))?;
    Ok(BalanceChange {
        success: true,
        new_balance,
    })
}

/// Take credits from an account if the balance covers `amount`.
///
/// An insufficient balance is not an error: it yields `success = false` and
/// leaves the account untouched.
pub fn deduct(
    conn: &Connection,
    user_id: UserId,
    amount: i64,
    reason: &str,
    story_id: StoryId,
) -> Result<BalanceChange> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;
    let now = timestamp(Utc::now());

    let updated = tx
        .execute(
            "UPDATE credit_accounts SET balance = balance - ?1, updated_at = ?2
             WHERE user_id = ?3 AND balance >= ?1",
            rusqlite::params![amount, &now, user_id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;

    let new_balance = balance(&tx, user_id)?;
    if updated == 0 {
        return Ok(BalanceChange {
            success: false,
            new_balance,
        });
    }

    journal(&tx, user_id, -amount, "deduct", reason, Some(story_id), new_balance, &now)?;
    tx.commit().map_err(|e| Error::database(e.to_string()))?;

    Ok(BalanceChange {
        success: true,
        new_balance,
    })
}

/// Journal entries for a user, newest first.
pub fn list_transactions(
    conn: &Connection,
    user_id: UserId,
    limit: i64,
) -> Result<Vec<CreditTransaction>> {
    let q = format!(
        "SELECT {TX_COLS} FROM credit_transactions WHERE user_id = ?1
         ORDER BY created_at DESC, rowid DESC LIMIT ?2"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(
            rusqlite::params![user_id.to_string(), limit],
            CreditTransaction::from_row,
        )
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

fn credit(
    conn: &Connection,
    user_id: UserId,
    amount: i64,
    kind: &str,
    reason: &str,
    story_id: Option<StoryId>,
) -> Result<i64> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;
    let now = timestamp(Utc::now());

    tx.execute(
        "INSERT INTO credit_accounts (user_id, balance, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(user_id) DO UPDATE SET balance = balance + excluded.balance,
             updated_at = excluded.updated_at",
        rusqlite::params![user_id.to_string(), amount, &now],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    let new_balance = balance(&tx, user_id)?;
    journal(&tx, user_id, amount, kind, reason, story_id, new_balance, &now)?;
    tx.commit().map_err(|e| Error::database(e.to_string()))?;

    Ok(new_balance)
}

#[allow(clippy::too_many_arguments)]
fn journal(
    conn: &Connection,
    user_id: UserId,
    amount: i64,
    kind: &str,
    reason: &str,
    story_id: Option<StoryId>,
    balance_after: i64,
    now: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO credit_transactions (id, user_id, amount, kind, reason, story_id, balance_after, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            TransactionId::new().to_string(),
            user_id.to_string(),
            amount,
            kind,
            reason,
            story_id.map(|s| s.to_string()),
            balance_after,
            now
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;

    #[test]
    fn unknown_user_has_zero_balance() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        assert_eq!(balance(&conn, UserId::new()).unwrap(), 0);
    }

    #[test]
    fn grant_deduct_refund_journal() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let user = UserId::new();
        let story = StoryId::new();

        assert_eq!(grant(&conn, user, 25, "welcome").unwrap(), 25);
        let d = deduct(&conn, user, 10, "video render", story).unwrap();
        assert_eq!(
            d,
            BalanceChange {
                success: true,
                new_balance: 15
            }
        );
        let r = refund(&conn, user, 10, "render failed", story).unwrap();
        assert_eq!(r.new_balance, 25);

        let journal = list_transactions(&conn, user, 10).unwrap();
        let kinds: Vec<&str> = journal.iter().map(|t| t.kind.as_str()).collect();
        assert_eq!(kinds, vec!["refund", "deduct", "grant"]);
        assert_eq!(journal[0].amount, 10);
        assert_eq!(journal[1].amount, -10);
        assert_eq!(journal[0].story_id, Some(story.to_string()));
    }

    #[test]
    fn insufficient_balance_is_not_deducted() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let user = UserId::new();
        grant(&conn, user, 5, "seed").unwrap();

        let d = deduct(&conn, user, 10, "video render", StoryId::new()).unwrap();
        assert!(!d.success);
        assert_eq!(d.new_balance, 5);
        assert_eq!(list_transactions(&conn, user, 10).unwrap().len(), 1);
    }

    #[test]
    fn grant_rejects_non_positive() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        assert!(grant(&conn, UserId::new(), 0, "x").is_err());
    }
}
