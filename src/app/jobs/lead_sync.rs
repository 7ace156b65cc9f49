use crate::adapters::{MondayClient, ZohoClient};
use crate::config::BoardConfig;
use crate::core::{CheckpointStore, ProgressCheckpoint};
use crate::domain::model::{BoardItem, CrmRecord, JobReport};
use crate::domain::ports::{BoardApi, SyncJob};
use crate::utils::error::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub const LEAD_FIELDS: &[&str] = &[
    "Full_Name",
    "id",
    "Owner",
    "Email",
    "Phone",
    "Mobile",
    "Lead_Status",
    "Notes",
];

/// 把 CRM lead 的負責人與備註同步到看板上對應的 item
pub struct LeadSyncJob {
    crm: Arc<ZohoClient>,
    monday: Arc<MondayClient>,
    boards: Vec<BoardConfig>,
    checkpoint: CheckpointStore,
    module: String,
}

impl LeadSyncJob {
    pub fn new(
        crm: Arc<ZohoClient>,
        monday: Arc<MondayClient>,
        boards: &[BoardConfig],
        checkpoint: CheckpointStore,
    ) -> Self {
        Self {
            crm,
            monday,
            boards: boards.iter().filter(|b| b.has_lead_columns()).cloned().collect(),
            checkpoint,
            module: "Leads".to_string(),
        }
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    /// 依 checkpoint 決定從哪一筆開始；找不到上次的 id 時從頭開始
    async fn resume_index(&self, leads: &[CrmRecord]) -> Result<usize> {
        let Some(checkpoint) = self.checkpoint.load().await? else {
            return Ok(0);
        };

        match leads.iter().position(|lead| lead.id == checkpoint.last_lead_id) {
            Some(index) => {
                tracing::info!(
                    "⏩ Resuming after lead {} ({}), {} already processed",
                    checkpoint.last_lead_id,
                    checkpoint.last_lead_email,
                    index + 1
                );
                Ok(index + 1)
            }
            None => {
                tracing::warn!(
                    "⚠️ Checkpoint lead {} not found, starting from the beginning",
                    checkpoint.last_lead_id
                );
                Ok(0)
            }
        }
    }

    async fn owner_id(&self, owner: &str, cache: &mut HashMap<String, Option<String>>) -> Option<String> {
        let key = owner.to_lowercase();
        if let Some(cached) = cache.get(&key) {
            return cached.clone();
        }

        let id = match self.monday.find_user_by_name(owner).await {
            Ok(user) => user.map(|u| u.id),
            Err(e) => {
                tracing::warn!("⚠️ Could not look up user {}: {}", owner, e);
                None
            }
        };
        cache.insert(key, id.clone());
        id
    }

    fn column_values(board: &BoardConfig, owner: &str, notes: &str, owner_id: Option<&str>) -> Map<String, Value> {
        let mut values = Map::new();
        if let Some(column) = &board.owner_text_column {
            values.insert(column.clone(), Value::String(owner.to_string()));
        }
        if let Some(column) = &board.notes_column {
            values.insert(column.clone(), json!({ "text": notes.replace('\n', "\n\n") }));
        }
        if let (Some(column), Some(id)) = (&board.owner_column, owner_id) {
            let id = id.parse::<u64>().map_or_else(|_| json!(id), |n| json!(n));
            values.insert(
                column.clone(),
                json!({ "personsAndTeams": [{ "id": id, "kind": "person" }] }),
            );
        }
        values
    }

    async fn update_item(&self, item: &BoardItem, owner: &str, notes: &str, owner_id: Option<&str>) -> Result<()> {
        let Some(board) = self.boards.iter().find(|b| b.id == item.board_id) else {
            return Ok(());
        };
        let mut values = Self::column_values(board, owner, notes, owner_id);

        match self
            .monday
            .change_multiple_column_values(item.board_id, &item.id, &Value::Object(values.clone()))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.has_graphql_error("ColumnValueException") && owner_id.is_some() => {
                tracing::warn!(
                    "⚠️ Could not assign person {:?} on board {}, retrying without it",
                    owner_id,
                    item.board_id
                );
                if let Some(column) = &board.owner_column {
                    values.remove(column);
                }
                self.monday
                    .change_multiple_column_values(item.board_id, &item.id, &Value::Object(values))
                    .await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn sync_lead(
        &self,
        lead: &CrmRecord,
        email: &str,
        owners: &mut HashMap<String, Option<String>>,
    ) -> Result<usize> {
        let lookups: Vec<_> = self.boards.iter().map(BoardConfig::lookup).collect();
        let items = self.monday.find_items_by_email(&lookups, email).await?;
        if items.is_empty() {
            tracing::info!("🔍 No matching items found for {}", email);
            return Ok(0);
        }

        let owner = lead.owner_name().unwrap_or_default();
        let notes = lead.notes().unwrap_or_default();
        let owner_id = match owner {
            "" => None,
            name => self.owner_id(name, owners).await,
        };

        let mut updated = 0;
        for item in &items {
            match self.update_item(item, owner, notes, owner_id.as_deref()).await {
                Ok(()) => {
                    tracing::info!("✅ Updated item {} on board {}", item.id, item.board_id);
                    updated += 1;
                }
                Err(e) => tracing::error!("❌ Error updating item {} on board {}: {}", item.id, item.board_id, e),
            }
        }
        Ok(updated)
    }
}

#[async_trait]
impl SyncJob for LeadSyncJob {
    fn name(&self) -> &str {
        "lead-sync"
    }

    async fn run(&self) -> Result<JobReport> {
        let leads = self.crm.list_records(&self.module, LEAD_FIELDS, None).await?;
        let mut report = JobReport::default();

        if leads.is_empty() {
            tracing::info!("No leads were fetched");
            return Ok(report);
        }

        let start = self.resume_index(&leads).await?;
        let mut owners = HashMap::new();

        for (index, lead) in leads.iter().enumerate().skip(start) {
            report.processed += 1;
            let name = lead.display_name().unwrap_or("(no name)");
            tracing::info!("📋 Processing lead {}/{}: {}", index + 1, leads.len(), name);

            match lead.email() {
                None => {
                    tracing::info!("Lead {} has no email, skipping", name);
                    report.skipped += 1;
                }
                Some(email) => match self.sync_lead(lead, email, &mut owners).await {
                    Ok(0) => report.skipped += 1,
                    Ok(_) => report.updated += 1,
                    Err(e) => {
                        tracing::error!("❌ Lead {} failed: {}", name, e);
                        report.failed += 1;
                    }
                },
            }

            self.checkpoint
                .save(&ProgressCheckpoint {
                    last_lead_email: lead.email().unwrap_or_default().to_string(),
                    last_lead_id: lead.id.clone(),
                })
                .await?;
        }

        self.checkpoint.clear().await?;
        Ok(report)
    }
}
