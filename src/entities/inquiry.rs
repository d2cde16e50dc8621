use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inquiries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub liveaction: Option<String>,
    pub schema: String, // JSON-encoded Value
    pub ttl: i64,
    pub roles: String, // JSON array
    pub users: String, // JSON array
    pub tag: String,
    pub status: String, // "pending" | "responded" | "timeout"
    pub response: Option<String>, // JSON-encoded Value
    pub context: String, // JSON: {user, rbac: {user, roles}}
    pub created_at: i64,
    pub responded_at: Option<i64>,
    pub responded_by: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
