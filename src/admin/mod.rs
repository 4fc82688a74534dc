pub mod export;

use chrono::{ Duration as ChronoDuration, DateTime, Utc };
use futures::future::try_join_all;
use log::{ info, warn };
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::models::admin::{
    CancellationRequest,
    CheckoutSession,
    ConversionRecord,
    CustomerRecord,
    DashboardStats,
    PaymentRecord,
    UserRecord,
};
use crate::store::{ Document, DocumentStore, Fields, StoreError };
use self::export::{ render, CsvExport, Dataset };

pub const USERS: &str = "users";
pub const CUSTOMERS: &str = "customers";
pub const CHECKOUT_SESSIONS: &str = "checkout_sessions";
pub const CONVERSION_HISTORY: &str = "conversion_history";

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("document store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    UnknownDataset(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),
}

/// Fixed allow-list of identities that may open the dashboard.
#[derive(Debug, Clone, Default)]
pub struct AdminGate {
    allowed: HashSet<String>,
}

impl AdminGate {
    pub fn new<I, S>(ids: I) -> Self where I: IntoIterator<Item = S>, S: AsRef<str> {
        let allowed = ids
            .into_iter()
            .map(|id| id.as_ref().trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        Self { allowed }
    }

    /// Parses a comma separated list, as read from `ADMIN_IDS`.
    pub fn from_csv(ids: &str) -> Self {
        Self::new(ids.split(','))
    }

    pub fn is_admin(&self, identity: Option<&str>) -> bool {
        identity.map(|id| self.allowed.contains(id.trim())).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

fn decode_all<T: DeserializeOwned>(collection: &str, docs: &[Document]) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| {
            doc.decode::<T>()
                .map_err(|e| warn!("Skipping malformed {} record: {}", collection, e))
                .ok()
        })
        .collect()
}

pub struct AdminService {
    store: Arc<dyn DocumentStore>,
}

impl AdminService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    async fn load<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>, AdminError> {
        let docs = self.store.list(collection).await?;
        Ok(decode_all(collection, &docs))
    }

    pub async fn users(&self) -> Result<Vec<UserRecord>, AdminError> {
        self.load(USERS).await
    }

    pub async fn customers(&self) -> Result<Vec<CustomerRecord>, AdminError> {
        self.load(CUSTOMERS).await
    }

    pub async fn checkout_sessions(&self) -> Result<Vec<CheckoutSession>, AdminError> {
        self.load(CHECKOUT_SESSIONS).await
    }

    pub async fn conversions(&self) -> Result<Vec<ConversionRecord>, AdminError> {
        self.load(CONVERSION_HISTORY).await
    }

    /// Reads `customers/{id}/<sub>` for every customer, tagging each record
    /// with its owner.
    async fn per_customer<T, F>(
        &self,
        customers: &[CustomerRecord],
        sub: &str,
        mut tag: F
    ) -> Result<Vec<T>, AdminError>
        where T: DeserializeOwned, F: FnMut(&mut T, &str)
    {
        let lookups = customers.iter().map(|customer| {
            let collection = format!("{}/{}/{}", CUSTOMERS, customer.id, sub);
            async move {
                let docs = self.store.list(&collection).await?;
                Ok::<_, AdminError>((customer.id.clone(), decode_all::<T>(&collection, &docs)))
            }
        });

        let mut records = Vec::new();
        for (customer_id, mut batch) in try_join_all(lookups).await? {
            for record in batch.iter_mut() {
                tag(record, &customer_id);
            }
            records.extend(batch);
        }
        Ok(records)
    }

    pub async fn payments(&self, customers: &[CustomerRecord]) -> Result<Vec<PaymentRecord>, AdminError> {
        self.per_customer(customers, "payments", |p: &mut PaymentRecord, id| {
            p.customer_id = id.to_string();
        }).await
    }

    pub async fn cancellations(
        &self,
        customers: &[CustomerRecord]
    ) -> Result<Vec<CancellationRequest>, AdminError> {
        self.per_customer(customers, "cancellation_requests", |c: &mut CancellationRequest, id| {
            c.customer_id = id.to_string();
        }).await
    }

    pub async fn dashboard_stats(&self) -> Result<DashboardStats, AdminError> {
        let users = self.users().await?;
        let customers = self.customers().await?;
        let payments = self.payments(&customers).await?;
        let cancellations = self.cancellations(&customers).await?;
        let sessions = self.checkout_sessions().await?;
        let conversions = self.conversions().await?;

        let stats = aggregate(
            &users,
            &customers,
            &payments,
            &cancellations,
            &sessions,
            &conversions,
            Utc::now()
        );
        info!(
            "Dashboard stats: {} users, {} customers, {} payments",
            stats.total_users,
            stats.total_customers,
            stats.succeeded_payments
        );
        Ok(stats)
    }

    pub async fn record_conversion(
        &self,
        user_id: &str,
        file_name: &str,
        conversion_type: &str
    ) -> Result<ConversionRecord, AdminError> {
        if user_id.trim().is_empty() {
            return Err(AdminError::MissingField("user_id"));
        }
        if file_name.trim().is_empty() {
            return Err(AdminError::MissingField("file_name"));
        }

        let created_at = Utc::now();
        let mut fields = Fields::new();
        fields.insert("user_id".to_string(), json!(user_id));
        fields.insert("file_name".to_string(), json!(file_name));
        fields.insert("conversion_type".to_string(), json!(conversion_type));
        fields.insert("created_at".to_string(), json!(created_at.to_rfc3339()));
        let id = self.store.create(CONVERSION_HISTORY, fields).await?;
        info!("Recorded conversion {} for user {}", id, user_id);

        Ok(ConversionRecord {
            id,
            user_id: user_id.to_string(),
            file_name: file_name.to_string(),
            conversion_type: conversion_type.to_string(),
            created_at: Some(created_at),
        })
    }

    pub async fn export(&self, dataset: Dataset) -> Result<CsvExport, AdminError> {
        let today = Utc::now().date_naive();
        let export = match dataset {
            Dataset::Users => render(dataset, &self.users().await?, today),
            Dataset::Customers => render(dataset, &self.customers().await?, today),
            Dataset::Payments => {
                let customers = self.customers().await?;
                render(dataset, &self.payments(&customers).await?, today)
            }
            Dataset::Cancellations => {
                let customers = self.customers().await?;
                render(dataset, &self.cancellations(&customers).await?, today)
            }
            Dataset::Conversions => render(dataset, &self.conversions().await?, today),
        };
        Ok(export)
    }
}

pub fn aggregate(
    users: &[UserRecord],
    customers: &[CustomerRecord],
    payments: &[PaymentRecord],
    cancellations: &[CancellationRequest],
    sessions: &[CheckoutSession],
    conversions: &[ConversionRecord],
    now: DateTime<Utc>
) -> DashboardStats {
    let mut stats = DashboardStats {
        total_users: users.len(),
        total_customers: customers.len(),
        checkout_sessions: sessions.len(),
        total_conversions: conversions.len(),
        ..Default::default()
    };

    let mut paying = HashSet::new();
    for payment in payments.iter().filter(|p| p.succeeded()) {
        stats.succeeded_payments += 1;
        paying.insert(payment.customer_id.as_str());
        *stats.revenue_by_currency.entry(payment.currency.to_lowercase()).or_insert(0) +=
            payment.amount;
    }
    stats.paying_customers = paying.len();

    stats.pending_cancellations = cancellations
        .iter()
        .filter(|c| c.pending())
        .count();

    let week_ago = now - ChronoDuration::days(7);
    stats.conversions_last_7_days = conversions
        .iter()
        .filter(|c| c.created_at.map(|t| t >= week_ago && t <= now).unwrap_or(false))
        .count();

    stats
}
