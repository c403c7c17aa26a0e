use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Metadata record of one generated image or video.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "media_objects")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// `image`, `video` or `upscaled_video`
    pub category: String,
    pub file_name: String,
    pub primary_url: Option<String>,
    pub backup_url: Option<String>,
    /// `none`/NULL, `pending`, `completed` or `failed`
    pub backup_status: Option<String>,
    pub file_size: Option<i64>,
    pub backup_checksum: Option<String>,
    pub backup_error: Option<String>,
    pub backup_attempted_at: Option<DateTimeUtc>,
    pub backed_up_at: Option<DateTimeUtc>,
    pub created_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
