//! Media commands - inspect and administer ledger records

use crate::error::Result;
use crate::meta::{LedgerStore, MediaRecord, MetaDb, ResourceType};
use tracing::info;

/// Which records `media list` returns
#[derive(Debug, Clone, Default)]
pub struct MediaFilter {
    pub user_name: Option<String>,
    pub resource_type: Option<ResourceType>,
}

/// Look up one record by its upstream id
pub async fn cmd_get_media(db: &MetaDb, resource_id: &str) -> Result<Option<MediaRecord>> {
    db.lookup_by_resource_id(resource_id).await
}

/// List records, narrowed by user and/or type
pub async fn cmd_list_media(db: &MetaDb, filter: MediaFilter) -> Result<Vec<MediaRecord>> {
    let records = match (&filter.user_name, filter.resource_type) {
        (Some(user), Some(kind)) => db
            .list_by_user_name(user)
            .await?
            .into_iter()
            .filter(|r| r.resource_type == kind)
            .collect(),
        (Some(user), None) => db.list_by_user_name(user).await?,
        (None, Some(kind)) => db.list_by_resource_type(kind).await?,
        (None, None) => db.list_media().await?,
    };
    Ok(records)
}

/// Remove one record. Returns whether it existed.
pub async fn cmd_remove_media(db: &MetaDb, resource_id: &str) -> Result<bool> {
    info!(%resource_id, "Removing media record");
    db.remove_media(resource_id).await
}

pub fn print_media_record(record: &MediaRecord) {
    println!("Resource: {}", record.resource_id);
    println!("  ID: {}", record.id);
    println!("  User: {} ({})", record.user_name, record.user_id);
    println!("  Type: {} ({})", record.resource_type, record.resource_type.code());
    println!("  URL: {}", record.resource_url);
    println!("  Created: {}", record.created_at.to_rfc3339());
    println!("  Updated: {}", record.updated_at.to_rfc3339());
}

pub fn print_media_records(records: &[MediaRecord]) {
    if records.is_empty() {
        println!("No media records found.");
        return;
    }

    println!("\n🗂  Media Records ({})\n", records.len());
    for record in records {
        println!(
            "  {:<24} {:<16} {:<8} {}",
            record.resource_id, record.user_name, record.resource_type, record.resource_url
        );
    }
}
