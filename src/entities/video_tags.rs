use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "video_tags")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub video_id: i32,
    pub tag: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::video_posts::Entity",
        from = "Column::VideoId",
        to = "super::video_posts::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    VideoPosts,
}

impl Related<super::video_posts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VideoPosts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
