use chrono::{ DateTime, TimeZone, Utc };
use serde::{ Deserialize, Deserializer, Serialize };
use serde_json::Value as JsonValue;

/// Accepts Unix seconds, RFC 3339 strings, or `{ "seconds": .. }` objects.
pub fn parse_timestamp(value: &JsonValue) -> Option<DateTime<Utc>> {
    match value {
        JsonValue::Number(n) => {
            let secs = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            Utc.timestamp_opt(secs, 0).single()
        }
        JsonValue::String(s) =>
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
                .or_else(|| s.parse::<i64>().ok().and_then(|secs| Utc.timestamp_opt(secs, 0).single())),
        JsonValue::Object(map) => {
            let secs = map.get("seconds").or_else(|| map.get("_seconds"))?;
            let secs = secs.as_i64().or_else(|| secs.as_str().and_then(|s| s.parse().ok()))?;
            Utc.timestamp_opt(secs, 0).single()
        }
        _ => None,
    }
}

fn flexible_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where D: Deserializer<'de>
{
    let value = JsonValue::deserialize(deserializer)?;
    Ok(parse_timestamp(&value))
}

fn flexible_amount<'de, D>(deserializer: D) -> Result<i64, D::Error> where D: Deserializer<'de> {
    let value = JsonValue::deserialize(deserializer)?;
    Ok(match value {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)).unwrap_or(0),
        JsonValue::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default, alias = "displayName", alias = "display_name")]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CustomerRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, alias = "stripeId")]
    pub stripe_id: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PaymentRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub customer_id: String,
    #[serde(default, deserialize_with = "flexible_amount")]
    pub amount: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "flexible_timestamp")]
    pub created: Option<DateTime<Utc>>,
}

impl PaymentRecord {
    pub fn succeeded(&self) -> bool {
        self.status.eq_ignore_ascii_case("succeeded")
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CancellationRequest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub customer_id: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "flexible_timestamp")]
    pub created: Option<DateTime<Utc>>,
}

impl CancellationRequest {
    /// Requests without a status were never handled.
    pub fn pending(&self) -> bool {
        self.status.is_empty() || self.status.eq_ignore_ascii_case("pending")
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CheckoutSession {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub customer_id: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub mode: String,
    #[serde(default, deserialize_with = "flexible_timestamp")]
    pub created: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConversionRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default, alias = "userId")]
    pub user_id: String,
    #[serde(default, alias = "fileName")]
    pub file_name: String,
    #[serde(default, alias = "conversionType")]
    pub conversion_type: String,
    #[serde(default, alias = "createdAt", deserialize_with = "flexible_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_users: usize,
    pub total_customers: usize,
    pub paying_customers: usize,
    pub succeeded_payments: usize,
    /// Minor currency units keyed by lowercase ISO currency code.
    pub revenue_by_currency: std::collections::BTreeMap<String, i64>,
    pub pending_cancellations: usize,
    pub checkout_sessions: usize,
    pub total_conversions: usize,
    pub conversions_last_7_days: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn timestamps_accept_several_encodings() {
        let expected = Utc.timestamp_opt(1_700_000_000, 0).single();
        assert_eq!(parse_timestamp(&json!(1_700_000_000)), expected);
        assert_eq!(parse_timestamp(&json!("2023-11-14T22:13:20Z")), expected);
        assert_eq!(parse_timestamp(&json!({ "seconds": 1_700_000_000 })), expected);
        assert_eq!(parse_timestamp(&json!(true)), None);
    }

    #[test]
    fn payment_decodes_loose_fields() {
        let payment: PaymentRecord = serde_json
            ::from_value(json!({ "amount": "1999", "currency": "usd", "status": "succeeded" }))
            .unwrap();
        assert_eq!(payment.amount, 1999);
        assert!(payment.succeeded());
        assert!(payment.created.is_none());
    }

    #[test]
    fn user_name_falls_back_to_display_name() {
        let user: UserRecord = serde_json
            ::from_value(json!({ "displayName": "Ada", "email": "ada@example.com" }))
            .unwrap();
        assert_eq!(user.name, "Ada");
    }
}
