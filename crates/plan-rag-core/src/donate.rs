//! Plan donations.
//!
//! A donated plan is archived as a [`DonatedPlan`] and also indexed as a
//! document so later queries can retrieve it. Donations that lack a title or
//! description get them from the model via
//! [`MetadataSynthesizer::describe_table`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::answer;
use crate::error::{RagError, Result, UpstreamContext};
use crate::metadata::{Metadata, RESERVED_KEYS};
use crate::models::{DonatedPlan, Plan, Table};
use crate::store::DocumentStore;
use crate::synth::MetadataSynthesizer;

/// Metadata key holding the donating user.
pub const META_USER_ID: &str = "user_id";
/// Metadata key holding the donated plan id.
pub const META_PLAN_ID: &str = "plan_id";
/// Metadata key naming where a document came from.
pub const META_SOURCE: &str = "source";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonatePlanRequest {
    pub user_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub table: Table,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationReceipt {
    pub plan_id: String,
    pub ids: Vec<String>,
}

/// Append-only archive of donated plans.
#[async_trait]
pub trait DonationStore: Send + Sync {
    async fn add(&self, plan: &DonatedPlan) -> AnyResult<()>;
    async fn get(&self, plan_id: &str) -> AnyResult<Option<DonatedPlan>>;
}

#[derive(Default)]
pub struct InMemoryDonationStore {
    plans: RwLock<HashMap<String, DonatedPlan>>,
}

impl InMemoryDonationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DonationStore for InMemoryDonationStore {
    async fn add(&self, plan: &DonatedPlan) -> AnyResult<()> {
        let mut plans = self
            .plans
            .write()
            .map_err(|_| anyhow::anyhow!("donation store lock poisoned"))?;
        anyhow::ensure!(
            !plans.contains_key(&plan.plan_id),
            "plan {} already donated",
            plan.plan_id
        );
        plans.insert(plan.plan_id.clone(), plan.clone());
        Ok(())
    }

    async fn get(&self, plan_id: &str) -> AnyResult<Option<DonatedPlan>> {
        let plans = self
            .plans
            .read()
            .map_err(|_| anyhow::anyhow!("donation store lock poisoned"))?;
        Ok(plans.get(plan_id).cloned())
    }
}

pub struct DonationService {
    synthesizer: MetadataSynthesizer,
    archive: Arc<dyn DonationStore>,
    store: DocumentStore,
}

impl DonationService {
    pub fn new(
        synthesizer: MetadataSynthesizer,
        archive: Arc<dyn DonationStore>,
        store: DocumentStore,
    ) -> Self {
        Self {
            synthesizer,
            archive,
            store,
        }
    }

    /// Archive and index a donated plan.
    ///
    /// Title and description supplied by the donor are kept as given; only
    /// missing ones are filled in by the model. Row sums sent by the donor
    /// are replaced with sums of the cells before anything is stored.
    pub async fn donate(&self, request: DonatePlanRequest) -> Result<DonationReceipt> {
        let user_id = request.user_id.trim().to_string();
        if user_id.is_empty() {
            return Err(RagError::validation("userId is required"));
        }
        if request.table.is_empty() {
            return Err(RagError::validation("table must not be empty"));
        }

        let title = non_empty(request.title);
        let description = non_empty(request.description);
        let mut table = request.table;
        answer::update_sums(&mut table);

        let (plan, synthesized) = match (title, description) {
            (Some(title), Some(description)) => {
                let plan = Plan {
                    title,
                    description,
                    table,
                };
                let mut extra = Metadata::new();
                self.synthesizer.enrich(&plan, &mut extra).await;
                (plan, extra)
            }
            (title, description) => {
                let described = self.synthesizer.describe_table(&table).await?;
                let plan = Plan {
                    title: title.unwrap_or(described.title),
                    description: description.unwrap_or(described.description),
                    table,
                };
                (plan, described.metadata)
            }
        };

        let donated = DonatedPlan {
            user_id,
            plan_id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            title: plan.title,
            description: plan.description,
            table: plan.table,
        };
        self.archive
            .add(&donated)
            .await
            .upstream("archive donated plan")?;

        let mut doc = donated.plan().to_document();
        doc.metadata.merge(synthesized, RESERVED_KEYS);
        doc.metadata.insert(META_USER_ID, donated.user_id.clone());
        doc.metadata.insert(META_PLAN_ID, donated.plan_id.clone());
        doc.metadata.insert(META_SOURCE, "donation");

        let ids = self.store.upsert(vec![doc]).await?;
        tracing::info!(plan_id = %donated.plan_id, user_id = %donated.user_id, "plan donated");

        Ok(DonationReceipt {
            plan_id: donated.plan_id,
            ids,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
