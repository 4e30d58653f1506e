//! Tax report model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use uuid::Uuid;

/// Reporting period granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    Day,
    Week,
    Month,
    Year,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Day => "day",
            PeriodType::Week => "week",
            PeriodType::Month => "month",
            PeriodType::Year => "year",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "day" => Ok(PeriodType::Day),
            "week" => Ok(PeriodType::Week),
            "month" => Ok(PeriodType::Month),
            "year" => Ok(PeriodType::Year),
            other => Err(AppError::validation(
                "period_type",
                format!("unknown period type '{}'", other),
            )),
        }
    }
}

impl std::fmt::Display for PeriodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which ledger entries count towards a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Basis {
    /// Settled entries only.
    Paid,
    /// Every entry that has not been refunded, cancelled or voided.
    All,
}

impl Basis {
    pub fn as_str(&self) -> &'static str {
        match self {
            Basis::Paid => "paid",
            Basis::All => "all",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "paid" => Ok(Basis::Paid),
            "all" => Ok(Basis::All),
            other => Err(AppError::validation(
                "basis",
                format!("unknown basis '{}'", other),
            )),
        }
    }
}

/// Date fields of a period request. Which ones are required depends on the
/// period type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodParts {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub week: Option<u32>,
}

impl PeriodParts {
    pub fn year(year: i32) -> Self {
        Self {
            year: Some(year),
            ..Default::default()
        }
    }

    pub fn month(year: i32, month: u32) -> Self {
        Self {
            year: Some(year),
            month: Some(month),
            ..Default::default()
        }
    }

    pub fn day(year: i32, month: u32, day: u32) -> Self {
        Self {
            year: Some(year),
            month: Some(month),
            day: Some(day),
            ..Default::default()
        }
    }

    pub fn week(year: i32, week: u32) -> Self {
        Self {
            year: Some(year),
            week: Some(week),
            ..Default::default()
        }
    }
}

/// Identity of a cached report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReportKey {
    pub subject_id: Uuid,
    pub period_type: PeriodType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Computed tax report for one subject and period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TaxReport {
    pub report_id: Uuid,
    pub subject_id: Uuid,
    pub period_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub basis: String,
    pub business_size: String,
    pub total_revenue: Decimal,
    pub total_expenses: Decimal,
    pub cogs_amount: Decimal,
    pub purchases_amount: Decimal,
    pub inventory_value: Decimal,
    pub assessable_profit: Decimal,
    pub pit_amount: Decimal,
    pub pit_effective_rate: Decimal,
    pub pit_band: String,
    pub cit_amount: Decimal,
    pub cit_rate: Decimal,
    pub levy_amount: Decimal,
    pub levy_rate: Decimal,
    pub vat_collected: Decimal,
    pub taxable_sales: Decimal,
    pub zero_rated_sales: Decimal,
    pub exempt_sales: Decimal,
    pub pdf_url: Option<String>,
    pub generated_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
}

impl TaxReport {
    pub fn key(&self) -> Result<ReportKey, AppError> {
        Ok(ReportKey {
            subject_id: self.subject_id,
            period_type: PeriodType::parse(&self.period_type)?,
            start_date: self.start_date,
            end_date: self.end_date,
        })
    }

    /// Overwrite every computed figure from `other`, keeping identity and
    /// creation time. Any rendered artifact is invalidated.
    pub fn overwrite_figures(&mut self, other: &TaxReport) {
        self.basis = other.basis.clone();
        self.business_size = other.business_size.clone();
        self.total_revenue = other.total_revenue;
        self.total_expenses = other.total_expenses;
        self.cogs_amount = other.cogs_amount;
        self.purchases_amount = other.purchases_amount;
        self.inventory_value = other.inventory_value;
        self.assessable_profit = other.assessable_profit;
        self.pit_amount = other.pit_amount;
        self.pit_effective_rate = other.pit_effective_rate;
        self.pit_band = other.pit_band.clone();
        self.cit_amount = other.cit_amount;
        self.cit_rate = other.cit_rate;
        self.levy_amount = other.levy_amount;
        self.levy_rate = other.levy_rate;
        self.vat_collected = other.vat_collected;
        self.taxable_sales = other.taxable_sales;
        self.zero_rated_sales = other.zero_rated_sales;
        self.exempt_sales = other.exempt_sales;
        self.generated_utc = other.generated_utc;
        self.pdf_url = None;
    }
}
