//! Credit balance and journal.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use sr_core::UserId;

use super::parse_path_id;
use crate::context::AppContext;
use crate::error::AppError;

const JOURNAL_LIMIT: i64 = 50;

/// One journal entry.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CreditEntry {
    pub amount: i64,
    pub kind: String,
    pub reason: String,
    pub story_id: Option<String>,
    pub balance_after: i64,
    pub created_at: String,
}

/// A user's balance with recent activity.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CreditsResponse {
    pub user_id: String,
    pub balance: i64,
    pub transactions: Vec<CreditEntry>,
}

/// GET /api/users/{id}/credits
#[utoipa::path(
    get,
    path = "/api/users/{id}/credits",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Balance and recent transactions", body = CreditsResponse)
    )
)]
pub async fn get_credits(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<CreditsResponse>, AppError> {
    let user_id: UserId = parse_path_id("user", &id)?;
    let conn = sr_db::pool::get_conn(&ctx.db)?;
    let balance = sr_db::queries::credits::balance(&conn, user_id)?;
    let transactions = sr_db::queries::credits::list_transactions(&conn, user_id, JOURNAL_LIMIT)?
        .into_iter()
        .map(|t| CreditEntry {
            amount: t.amount,
            kind: t.kind,
            reason: t.reason,
            story_id: t.story_id,
            balance_after: t.balance_after,
            created_at: t.created_at,
        })
        .collect();

    Ok(Json(CreditsResponse {
        user_id: user_id.to_string(),
        balance,
        transactions,
    }))
}
