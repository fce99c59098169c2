use crate::api::error::AppError;
use crate::entities::{prelude::*, video_posts};
use sea_orm::sea_query::{Expr, SimpleExpr};
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, TransactionTrait};

use super::VideoService;

/// `column = column + 1` on every row matching `filter`, evaluated by the
/// database so concurrent callers never lose an update.
pub async fn increment_column<C: ConnectionTrait>(
    conn: &C,
    column: video_posts::Column,
    filter: SimpleExpr,
) -> Result<u64, DbErr> {
    let result = VideoPosts::update_many()
        .col_expr(column, Expr::col(column).add(1))
        .filter(filter)
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

impl VideoService {
    async fn increment_in_own_txn(
        &self,
        column: video_posts::Column,
        filter: SimpleExpr,
    ) -> Result<u64, AppError> {
        let txn = self.db.begin().await?;
        let affected = increment_column(&txn, column, filter).await?;
        txn.commit().await?;
        Ok(affected)
    }

    pub async fn increment_view_count(&self, video_id: i32) -> Result<(), AppError> {
        let affected = self
            .increment_in_own_txn(
                video_posts::Column::ViewCount,
                video_posts::Column::Id.eq(video_id),
            )
            .await?;
        if affected == 0 {
            return Err(AppError::NotFound("Video not found".to_string()));
        }
        Ok(())
    }

    pub async fn increment_like_count(&self, video_id: i32) -> Result<(), AppError> {
        let affected = self
            .increment_in_own_txn(
                video_posts::Column::LikeCount,
                video_posts::Column::Id.eq(video_id),
            )
            .await?;
        if affected == 0 {
            return Err(AppError::NotFound("Video not found".to_string()));
        }
        Ok(())
    }

    /// Returns false when no video is stored under `filename`.
    pub async fn increment_view_count_by_path(&self, filename: &str) -> Result<bool, AppError> {
        let affected = self
            .increment_in_own_txn(
                video_posts::Column::ViewCount,
                video_posts::Column::VideoPath.eq(filename),
            )
            .await?;
        Ok(affected > 0)
    }
}
