use crate::entities::{prelude::*, *};
use crate::models::{BackupStatus, CategoryStats, MediaCategory};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Alias, Expr, Func};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};

/// Queries and single-statement status transitions on `media_objects`.
///
/// Every status change is one conditional UPDATE, so two writers can never
/// both move the same object out of a given state.
#[derive(Clone)]
pub struct MediaRepository {
    db: DatabaseConnection,
}

/// Objects a backup run may pick up: a non-blank primary URL, and either no
/// backup attempt yet or a `failed`/stale `pending` attempt older than
/// `retry_before`. `completed` objects never match.
fn eligible_condition(retry_before: DateTime<Utc>) -> Condition {
    let retry_due = Condition::any()
        .add(media_objects::Column::BackupAttemptedAt.is_null())
        .add(media_objects::Column::BackupAttemptedAt.lte(retry_before));

    Condition::all()
        .add(media_objects::Column::PrimaryUrl.is_not_null())
        .add(
            Expr::expr(
                Func::cust(Alias::new("TRIM")).arg(Expr::col(media_objects::Column::PrimaryUrl)),
            )
            .ne(""),
        )
        .add(
            Condition::any()
                .add(media_objects::Column::BackupStatus.is_null())
                .add(media_objects::Column::BackupStatus.eq(BackupStatus::None.as_str()))
                .add(
                    Condition::all()
                        .add(media_objects::Column::BackupStatus.is_in([
                            BackupStatus::Failed.as_str(),
                            BackupStatus::Pending.as_str(),
                        ]))
                        .add(retry_due),
                ),
        )
}

impl MediaRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<media_objects::Model>> {
        Ok(MediaObjects::find_by_id(id).one(&self.db).await?)
    }

    /// Oldest eligible objects of a category, at most `limit` of them.
    pub async fn select_eligible(
        &self,
        category: MediaCategory,
        limit: u64,
        retry_before: DateTime<Utc>,
    ) -> Result<Vec<media_objects::Model>> {
        let objects = MediaObjects::find()
            .filter(media_objects::Column::Category.eq(category.as_db()))
            .filter(eligible_condition(retry_before))
            .order_by_asc(media_objects::Column::CreatedAt)
            .order_by_asc(media_objects::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(objects)
    }

    /// Moves an eligible object to `pending`. Returns false when the object
    /// was completed or claimed by someone else in the meantime.
    pub async fn claim(
        &self,
        id: &str,
        retry_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let res = MediaObjects::update_many()
            .col_expr(
                media_objects::Column::BackupStatus,
                Expr::value(BackupStatus::Pending.as_str()),
            )
            .col_expr(media_objects::Column::BackupAttemptedAt, Expr::value(now))
            .filter(media_objects::Column::Id.eq(id))
            .filter(eligible_condition(retry_before))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected == 1)
    }

    pub async fn mark_completed(
        &self,
        id: &str,
        backup_url: &str,
        file_size: i64,
        checksum: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let res = MediaObjects::update_many()
            .col_expr(
                media_objects::Column::BackupStatus,
                Expr::value(BackupStatus::Completed.as_str()),
            )
            .col_expr(media_objects::Column::BackupUrl, Expr::value(backup_url))
            .col_expr(media_objects::Column::FileSize, Expr::value(file_size))
            .col_expr(media_objects::Column::BackupChecksum, Expr::value(checksum))
            .col_expr(
                media_objects::Column::BackupError,
                Expr::value(Option::<String>::None),
            )
            .col_expr(media_objects::Column::BackedUpAt, Expr::value(now))
            .filter(media_objects::Column::Id.eq(id))
            .filter(media_objects::Column::BackupStatus.eq(BackupStatus::Pending.as_str()))
            .exec(&self.db)
            .await?;

        if res.rows_affected != 1 {
            return Err(anyhow::anyhow!(
                "Media object {} was not pending when completing its backup",
                id
            ));
        }
        Ok(())
    }

    pub async fn mark_failed(&self, id: &str, error: &str) -> Result<()> {
        MediaObjects::update_many()
            .col_expr(
                media_objects::Column::BackupStatus,
                Expr::value(BackupStatus::Failed.as_str()),
            )
            .col_expr(media_objects::Column::BackupError, Expr::value(error))
            .filter(media_objects::Column::Id.eq(id))
            .filter(
                Condition::any()
                    .add(media_objects::Column::BackupStatus.is_null())
                    .add(media_objects::Column::BackupStatus.ne(BackupStatus::Completed.as_str())),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn category_stats(&self, category: MediaCategory) -> Result<CategoryStats> {
        let base = || {
            MediaObjects::find().filter(media_objects::Column::Category.eq(category.as_db()))
        };

        let total = base().count(&self.db).await?;
        let pending = base()
            .filter(media_objects::Column::BackupStatus.eq(BackupStatus::Pending.as_str()))
            .count(&self.db)
            .await?;
        let failed = base()
            .filter(media_objects::Column::BackupStatus.eq(BackupStatus::Failed.as_str()))
            .count(&self.db)
            .await?;

        let completed_sizes: Vec<Option<i64>> = base()
            .filter(media_objects::Column::BackupStatus.eq(BackupStatus::Completed.as_str()))
            .select_only()
            .column(media_objects::Column::FileSize)
            .into_tuple()
            .all(&self.db)
            .await?;

        let completed = completed_sizes.len() as u64;
        let backed_up_bytes = completed_sizes
            .iter()
            .map(|size| size.unwrap_or(0).max(0) as u64)
            .sum();

        Ok(CategoryStats {
            category: category.as_wire().to_string(),
            total,
            not_backed_up: total.saturating_sub(pending + failed + completed),
            pending,
            completed,
            failed,
            backed_up_bytes,
        })
    }
}
