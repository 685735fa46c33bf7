use chrono::NaiveDate;
use sqlx::FromRow;

/// A unit price observed for one model/token-kind/day (§3's Price Point,
/// the Cost Engine's input table). `unit_price` is scaled by
/// `MONEY_UNIT` (1/10,000,000 of a currency unit) so the column stays an
/// exact integer.
pub const MONEY_UNIT: i64 = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum TokenKind {
    Input,
    Output,
}

#[derive(Debug, Clone, FromRow)]
pub struct PricePoint {
    pub model_alias: String,
    pub token_kind: TokenKind,
    pub unit: String,
    pub unit_price: i64,
    pub currency: String,
    pub is_regional: bool,
    pub observed_at: NaiveDate,
}
