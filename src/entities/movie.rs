use sea_orm::entity::prelude::*;

/// `first_letter` and `sort_title` are derived from `title` on write and back
/// the letter-bucket queries and catalogue ordering.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "movies")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub description: Option<String>,
    pub director_id: Option<i32>,
    pub runtime: Option<i32>,
    pub first_letter: Option<String>,
    pub sort_title: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
