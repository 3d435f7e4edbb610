//! Domain models for Tally

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Serde helpers for money fields.
///
/// Amounts are stored as integer cents so that balance arithmetic and
/// comparisons are exact. On the wire they appear as decimal values
/// (e.g. `42.50`), rounded to the nearest cent on input.
pub mod money {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Convert a decimal amount to cents, rejecting non-finite values.
    pub fn to_cents(amount: f64) -> Option<i64> {
        if !amount.is_finite() {
            return None;
        }
        Some((amount * 100.0).round() as i64)
    }

    /// Convert cents back to a decimal amount for display.
    pub fn to_decimal(cents: i64) -> f64 {
        cents as f64 / 100.0
    }

    pub fn serialize<S: Serializer>(cents: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(to_decimal(*cents))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let value = f64::deserialize(deserializer)?;
        to_cents(value).ok_or_else(|| serde::de::Error::custom("amount must be a finite number"))
    }

    /// Same helpers for `Option<i64>` cent fields.
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            cents: &Option<i64>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match cents {
                Some(c) => serializer.serialize_some(&super::to_decimal(*c)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<i64>, D::Error> {
            let value = Option::<f64>::deserialize(deserializer)?;
            match value {
                Some(v) => super::to_cents(v)
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom("amount must be a finite number")),
                None => Ok(None),
            }
        }
    }
}

/// Direction of a ledger entry (also the kind of a category)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Income,
    Expense,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }

    /// Sign applied to the amount when folding into the running balance
    pub fn sign(&self) -> i64 {
        match self {
            Self::Income => 1,
            Self::Expense => -1,
        }
    }
}

impl std::str::FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            _ => Err(format!("Unknown entry kind: {}", s)),
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Subscription tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Pro,
    Enterprise,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }

    pub fn is_paid(&self) -> bool {
        !matches!(self, Self::Free)
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(format!("Unknown tier: {}", s)),
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Account status - accounts are soft-deleted, never removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Deleted,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deleted => "deleted",
        }
    }
}

impl std::str::FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "deleted" => Ok(Self::Deleted),
            _ => Err(format!("Unknown user status: {}", s)),
        }
    }
}

/// A registered user
///
/// The password hash and token columns never leave the store layer;
/// handlers expose users through [`Profile`].
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: Option<String>,
    pub status: UserStatus,
    pub email_verified: bool,
    pub verify_token: Option<String>,
    pub verify_token_expires: Option<DateTime<Utc>>,
    pub reset_token: Option<String>,
    pub reset_token_expires: Option<DateTime<Utc>>,
    /// Alert when the running balance drops below this threshold
    pub balance_alert_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Public view of a user account
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: Option<String>,
    pub email_verified: bool,
    #[serde(with = "money::option")]
    pub balance_alert: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for Profile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            username: u.username,
            first_name: u.first_name,
            last_name: u.last_name,
            display_name: u.display_name,
            email_verified: u.email_verified,
            balance_alert: u.balance_alert_cents,
            created_at: u.created_at,
        }
    }
}

/// Registration input
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Partial profile update - only supplied fields are written
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: Option<String>,
    #[serde(default, with = "money::option")]
    pub balance_alert: Option<i64>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.display_name.is_none()
            && self.balance_alert.is_none()
    }
}

/// An income/expense category
///
/// `user_id = None` marks a shared default category visible to everyone
/// and deletable by no one.
#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub kind: EntryKind,
    pub user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// A ledger entry with its running-balance snapshot
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub kind: EntryKind,
    #[serde(rename = "amount", with = "money")]
    pub amount_cents: i64,
    pub category_id: Option<i64>,
    /// Joined category name, when the entry has one
    pub category: Option<String>,
    pub description: String,
    pub date: NaiveDate,
    /// Running balance as of and including this entry, ordered by (date, id)
    #[serde(rename = "current_balance", with = "money")]
    pub balance_cents: i64,
    pub created_at: DateTime<Utc>,
}

/// Input for recording a ledger entry
#[derive(Debug, Clone, Deserialize)]
pub struct NewTransaction {
    pub kind: EntryKind,
    #[serde(rename = "amount", with = "money")]
    pub amount_cents: i64,
    pub category_id: Option<i64>,
    pub description: String,
    /// Defaults to today when absent
    pub date: Option<NaiveDate>,
}

/// Partial transaction update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionUpdate {
    #[serde(default, rename = "amount", with = "money::option")]
    pub amount_cents: Option<i64>,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub date: Option<NaiveDate>,
}

impl TransactionUpdate {
    pub fn is_empty(&self) -> bool {
        self.amount_cents.is_none()
            && self.description.is_none()
            && self.category_id.is_none()
            && self.date.is_none()
    }
}

/// Balance overview returned by the ledger
#[derive(Debug, Clone, Serialize)]
pub struct BalanceSummary {
    #[serde(rename = "current_balance", with = "money")]
    pub balance_cents: i64,
    #[serde(rename = "total_income", with = "money")]
    pub total_income_cents: i64,
    #[serde(rename = "current_month_expenses", with = "money")]
    pub current_month_expense_cents: i64,
    #[serde(rename = "previous_month_expenses", with = "money")]
    pub previous_month_expense_cents: i64,
    /// Month-over-month change; 100 when the previous month had no
    /// expenses but this one does, 0 when both are empty
    pub expense_change_pct: f64,
}

/// A savings goal
#[derive(Debug, Clone, Serialize)]
pub struct Goal {
    pub id: i64,
    pub user_id: i64,
    #[serde(rename = "amount", with = "money")]
    pub target_cents: i64,
    pub description: String,
    pub target_date: NaiveDate,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a goal
#[derive(Debug, Clone, Deserialize)]
pub struct NewGoal {
    #[serde(rename = "amount", with = "money")]
    pub target_cents: i64,
    pub description: String,
    /// Defaults to 30 days out when absent
    pub target_date: Option<NaiveDate>,
}

/// Partial goal update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GoalUpdate {
    #[serde(default, rename = "amount", with = "money::option")]
    pub target_cents: Option<i64>,
    pub description: Option<String>,
    pub target_date: Option<NaiveDate>,
}

impl GoalUpdate {
    pub fn is_empty(&self) -> bool {
        self.target_cents.is_none() && self.description.is_none() && self.target_date.is_none()
    }
}

/// A user's subscription row (one per user, created lazily as free)
#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub tier: Tier,
    pub started_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// A payment audit record (append-only)
#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    pub id: i64,
    pub user_id: i64,
    #[serde(rename = "amount", with = "money")]
    pub amount_cents: i64,
    pub method: String,
    pub external_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// A verified payment order, ready to apply
///
/// Constructed by the payment bridge after checking the provider's
/// reported status; the store refuses anything but COMPLETED.
#[derive(Debug, Clone)]
pub struct PaymentOrder {
    pub external_id: String,
    pub status: String,
    pub amount_cents: i64,
    pub method: String,
    /// Raw provider payload, kept for the audit trail
    pub metadata: serde_json::Value,
}

/// A pending email-change code
#[derive(Debug, Clone)]
pub struct EmailChangeCode {
    pub user_id: i64,
    pub kind: String,
    pub pending_email: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub verified: bool,
}

// ============================================================================
// Analytics
// ============================================================================

/// Income/expense totals over a period
#[derive(Debug, Clone, Serialize)]
pub struct PeriodSummary {
    pub from: NaiveDate,
    pub to: NaiveDate,
    #[serde(rename = "income", with = "money")]
    pub income_cents: i64,
    #[serde(rename = "expenses", with = "money")]
    pub expense_cents: i64,
    #[serde(rename = "net", with = "money")]
    pub net_cents: i64,
}

/// One month in the six-month rollup
#[derive(Debug, Clone, Serialize)]
pub struct MonthlyRollup {
    /// Month label, "YYYY-MM"
    pub month: String,
    #[serde(rename = "income", with = "money")]
    pub income_cents: i64,
    #[serde(rename = "expenses", with = "money")]
    pub expense_cents: i64,
    /// Expenses as a percentage of income; None when the month had no income
    pub expense_ratio_pct: Option<f64>,
}

/// Spending share of one category over a range
#[derive(Debug, Clone, Serialize)]
pub struct CategoryBreakdown {
    pub category: String,
    #[serde(rename = "amount", with = "money")]
    pub amount_cents: i64,
    pub percentage: f64,
    pub transaction_count: i64,
}

/// One flattened row of the transaction export
#[derive(Debug, Clone, Serialize)]
pub struct ExportRow {
    pub report: String,
    pub id: i64,
    pub date: NaiveDate,
    pub kind: EntryKind,
    #[serde(rename = "amount", with = "money")]
    pub amount_cents: i64,
    pub category: Option<String>,
    pub description: String,
    #[serde(rename = "balance", with = "money")]
    pub balance_cents: i64,
}
