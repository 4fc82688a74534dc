use chrono::{ DateTime, NaiveDate, Utc };
use std::fmt;
use std::str::FromStr;

use crate::models::admin::{
    CancellationRequest,
    ConversionRecord,
    CustomerRecord,
    PaymentRecord,
    UserRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Users,
    Customers,
    Payments,
    Cancellations,
    Conversions,
}

impl Dataset {
    pub fn name(&self) -> &'static str {
        match self {
            Dataset::Users => "users",
            Dataset::Customers => "customers",
            Dataset::Payments => "payments",
            Dataset::Cancellations => "cancellations",
            Dataset::Conversions => "conversions",
        }
    }

    pub fn header(&self) -> &'static [&'static str] {
        match self {
            Dataset::Users => &["Name", "Email"],
            Dataset::Customers => &["Email", "Stripe ID"],
            Dataset::Payments => &["Customer", "Amount", "Currency", "Status", "Date"],
            Dataset::Cancellations => &["Customer", "Reason", "Status", "Date"],
            Dataset::Conversions => &["User", "File", "Type", "Date"],
        }
    }

    pub fn file_name(&self, date: NaiveDate) -> String {
        format!("{}_{}.csv", self.name(), date.format("%Y-%m-%d"))
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dataset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "users" => Ok(Dataset::Users),
            "customers" => Ok(Dataset::Customers),
            "payments" => Ok(Dataset::Payments),
            "cancellations" | "cancellation_requests" => Ok(Dataset::Cancellations),
            "conversions" | "conversion_history" => Ok(Dataset::Conversions),
            other => Err(format!("Unknown export dataset: '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvExport {
    pub file_name: String,
    pub body: String,
}

pub trait CsvRow {
    fn cells(&self) -> Vec<String>;
}

fn format_date(ts: &Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()).unwrap_or_default()
}

/// Minor units to a decimal string, e.g. `1999` -> `19.99`.
pub fn format_amount(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

impl CsvRow for UserRecord {
    fn cells(&self) -> Vec<String> {
        vec![self.name.clone(), self.email.clone()]
    }
}

impl CsvRow for CustomerRecord {
    fn cells(&self) -> Vec<String> {
        vec![self.email.clone(), self.stripe_id.clone()]
    }
}

impl CsvRow for PaymentRecord {
    fn cells(&self) -> Vec<String> {
        vec![
            self.customer_id.clone(),
            format_amount(self.amount),
            self.currency.to_uppercase(),
            self.status.clone(),
            format_date(&self.created)
        ]
    }
}

impl CsvRow for CancellationRequest {
    fn cells(&self) -> Vec<String> {
        vec![
            self.customer_id.clone(),
            self.reason.clone(),
            self.status.clone(),
            format_date(&self.created)
        ]
    }
}

impl CsvRow for ConversionRecord {
    fn cells(&self) -> Vec<String> {
        vec![
            self.user_id.clone(),
            self.file_name.clone(),
            self.conversion_type.clone(),
            format_date(&self.created_at)
        ]
    }
}

pub fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn push_line<S: AsRef<str>>(out: &mut String, cells: &[S]) {
    let line = cells
        .iter()
        .map(|c| escape_field(c.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&line);
    out.push('\n');
}

pub fn render<R: CsvRow>(dataset: Dataset, rows: &[R], date: NaiveDate) -> CsvExport {
    let mut body = String::new();
    push_line(&mut body, dataset.header());
    for row in rows {
        push_line(&mut body, row.cells().as_slice());
    }
    CsvExport {
        file_name: dataset.file_name(date),
        body,
    }
}
