use async_trait::async_trait;
use chrono::Utc;
use migration::MigratorTrait;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ColumnTrait, Database, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    Set,
};
use std::collections::BTreeSet;

use crate::authz::store::{AssignmentStore, RoleStore};
use crate::authz::types::{
    PermissionGrant, PermissionType, ResourceType, ResourceUid, Role, RoleAssignment, User,
};
use crate::entities;
use crate::errors::{ParleyError, StoreError};
use crate::inquiry::store::InquiryStore;
use crate::inquiry::types::{
    Inquiry, InquiryFilter, InquiryStatus, Resolution, Transition,
};
use crate::settings::Database as DbCfg;

/// Connect and bring the schema up to date.
pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, ParleyError> {
    let db = Database::connect(&cfg.url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

/// SQL-backed implementation of the role, assignment and inquiry stores.
#[derive(Debug, Clone)]
pub struct SqlStore {
    db: DatabaseConnection,
}

impl SqlStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

}

fn role_from_model(model: entities::role::Model) -> Result<Role, StoreError> {
    let grants: Vec<String> = serde_json::from_str(&model.grants)
        .map_err(|e| StoreError::corrupt(&model.name, format!("grants: {e}")))?;
    Ok(Role {
        name: model.name,
        description: model.description,
        grants,
        system: model.system != 0,
    })
}

fn grant_from_model(model: entities::permission_grant::Model) -> Result<PermissionGrant, StoreError> {
    let resource_type: ResourceType = model
        .resource_type
        .parse()
        .map_err(|e: crate::authz::errors::AuthzError| StoreError::corrupt(&model.id, e.to_string()))?;
    let resource_uid = ResourceUid::parse(resource_type, &model.resource_uid)
        .ok_or_else(|| StoreError::corrupt(&model.id, "empty resource uid"))?;

    let names: Vec<String> = serde_json::from_str(&model.permission_types)
        .map_err(|e| StoreError::corrupt(&model.id, format!("permission_types: {e}")))?;
    let mut permission_types = Vec::with_capacity(names.len());
    for name in names {
        let p: PermissionType = name
            .parse()
            .map_err(|e: crate::authz::errors::AuthzError| StoreError::corrupt(&model.id, e.to_string()))?;
        permission_types.push(p);
    }

    PermissionGrant::new(model.id.clone(), resource_type, resource_uid, permission_types)
        .map_err(|e| StoreError::corrupt(&model.id, e.to_string()))
}

fn inquiry_from_model(model: entities::inquiry::Model) -> Result<Inquiry, StoreError> {
    let status = InquiryStatus::parse(&model.status)
        .ok_or_else(|| StoreError::corrupt(&model.id, format!("unknown status `{}`", model.status)))?;
    let response = match model.response {
        Some(raw) => Some(serde_json::from_str(&raw)?),
        None => None,
    };

    Ok(Inquiry {
        schema: serde_json::from_str(&model.schema)?,
        roles: serde_json::from_str(&model.roles)?,
        users: serde_json::from_str(&model.users)?,
        context: serde_json::from_str(&model.context)?,
        id: model.id,
        liveaction: model.liveaction,
        ttl: model.ttl,
        tag: model.tag,
        status,
        response,
        created_at: model.created_at,
        responded_at: model.responded_at,
        responded_by: model.responded_by,
    })
}

fn inquiry_to_active(inquiry: &Inquiry) -> Result<entities::inquiry::ActiveModel, StoreError> {
    let response = match &inquiry.response {
        Some(value) => Some(serde_json::to_string(value)?),
        None => None,
    };

    Ok(entities::inquiry::ActiveModel {
        id: Set(inquiry.id.clone()),
        liveaction: Set(inquiry.liveaction.clone()),
        schema: Set(serde_json::to_string(&inquiry.schema)?),
        ttl: Set(inquiry.ttl),
        roles: Set(serde_json::to_string(&inquiry.roles)?),
        users: Set(serde_json::to_string(&inquiry.users)?),
        tag: Set(inquiry.tag.clone()),
        status: Set(inquiry.status.as_str().to_string()),
        response: Set(response),
        context: Set(serde_json::to_string(&inquiry.context)?),
        created_at: Set(inquiry.created_at),
        responded_at: Set(inquiry.responded_at),
        responded_by: Set(inquiry.responded_by.clone()),
    })
}

#[async_trait]
impl RoleStore for SqlStore {
    async fn get_role(&self, name: &str) -> Result<Option<Role>, StoreError> {
        use entities::role::{Column, Entity};

        match Entity::find()
            .filter(Column::Name.eq(name))
            .one(&self.db)
            .await?
        {
            Some(model) => Ok(Some(role_from_model(model)?)),
            None => Ok(None),
        }
    }

    async fn upsert_role(&self, role: Role) -> Result<(), StoreError> {
        use entities::role::{ActiveModel, Column, Entity};

        let model = ActiveModel {
            name: Set(role.name),
            description: Set(role.description),
            grants: Set(serde_json::to_string(&role.grants)?),
            system: Set(role.system as i64),
        };

        Entity::insert(model)
            .on_conflict(
                OnConflict::column(Column::Name)
                    .update_columns([Column::Description, Column::Grants, Column::System])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Ok(())
    }

    async fn get_grant(&self, id: &str) -> Result<Option<PermissionGrant>, StoreError> {
        use entities::permission_grant::{Column, Entity};

        match Entity::find()
            .filter(Column::Id.eq(id))
            .one(&self.db)
            .await?
        {
            Some(model) => Ok(Some(grant_from_model(model)?)),
            None => Ok(None),
        }
    }

    async fn upsert_grant(&self, grant: PermissionGrant) -> Result<(), StoreError> {
        use entities::permission_grant::{ActiveModel, Column, Entity};

        let permission_types: Vec<&str> = grant
            .permission_types()
            .iter()
            .map(|p| p.as_str())
            .collect();

        let model = ActiveModel {
            id: Set(grant.id.clone()),
            resource_type: Set(grant.resource_type.as_str().to_string()),
            resource_uid: Set(grant.resource_uid.as_str().to_string()),
            permission_types: Set(serde_json::to_string(&permission_types)?),
        };

        Entity::insert(model)
            .on_conflict(
                OnConflict::column(Column::Id)
                    .update_columns([
                        Column::ResourceType,
                        Column::ResourceUid,
                        Column::PermissionTypes,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Ok(())
    }

    async fn grants_for_role(&self, role: &str) -> Result<Vec<PermissionGrant>, StoreError> {
        use entities::permission_grant::{Column, Entity};

        let Some(role) = self.get_role(role).await? else {
            return Ok(Vec::new());
        };
        if role.grants.is_empty() {
            return Ok(Vec::new());
        }

        let models = Entity::find()
            .filter(Column::Id.is_in(role.grants.iter().cloned()))
            .all(&self.db)
            .await?;
        if models.len() < role.grants.len() {
            tracing::warn!(role = %role.name, "role references missing grants");
        }

        models.into_iter().map(grant_from_model).collect()
    }
}

#[async_trait]
impl AssignmentStore for SqlStore {
    async fn get_user(&self, name: &str) -> Result<Option<User>, StoreError> {
        use entities::user::{Column, Entity};

        Ok(Entity::find()
            .filter(Column::Name.eq(name))
            .one(&self.db)
            .await?
            .map(|model| User { name: model.name }))
    }

    async fn upsert_user(&self, user: User) -> Result<(), StoreError> {
        use entities::user::{ActiveModel, Column, Entity};

        let model = ActiveModel {
            name: Set(user.name),
            created_at: Set(Utc::now().timestamp()),
        };

        Entity::insert(model)
            .on_conflict(OnConflict::column(Column::Name).do_nothing().to_owned())
            .exec_without_returning(&self.db)
            .await?;

        Ok(())
    }

    async fn roles_for_user(&self, user: &str) -> Result<BTreeSet<String>, StoreError> {
        use entities::role_assignment::{Column, Entity};

        Ok(Entity::find()
            .filter(Column::User.eq(user))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|model| model.role)
            .collect())
    }

    async fn upsert_assignment(&self, assignment: RoleAssignment) -> Result<(), StoreError> {
        use entities::role_assignment::{ActiveModel, Column, Entity};

        let model = ActiveModel {
            id: NotSet,
            user: Set(assignment.user),
            role: Set(assignment.role),
            created_at: Set(Utc::now().timestamp()),
        };

        Entity::insert(model)
            .on_conflict(
                OnConflict::columns([Column::User, Column::Role])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl InquiryStore for SqlStore {
    async fn get(&self, id: &str) -> Result<Option<Inquiry>, StoreError> {
        use entities::inquiry::{Column, Entity};

        match Entity::find()
            .filter(Column::Id.eq(id))
            .one(&self.db)
            .await?
        {
            Some(model) => Ok(Some(inquiry_from_model(model)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, filter: &InquiryFilter) -> Result<Vec<Inquiry>, StoreError> {
        use entities::inquiry::{Column, Entity};

        let mut query = Entity::find();
        if let Some(status) = filter.status {
            query = query.filter(Column::Status.eq(status.as_str()));
        }

        query
            .order_by_asc(Column::CreatedAt)
            .order_by_asc(Column::Id)
            .offset(filter.offset)
            .limit(filter.limit)
            .all(&self.db)
            .await?
            .into_iter()
            .map(inquiry_from_model)
            .collect()
    }

    async fn pending_expired(&self, now: i64) -> Result<Vec<Inquiry>, StoreError> {
        use entities::inquiry::{Column, Entity};

        // TTLs are positive, so nothing created after `now` can be due
        let candidates = Entity::find()
            .filter(Column::Status.eq(InquiryStatus::Pending.as_str()))
            .filter(Column::CreatedAt.lte(now))
            .order_by_asc(Column::CreatedAt)
            .all(&self.db)
            .await?;

        let mut due = Vec::new();
        for model in candidates {
            let inquiry = inquiry_from_model(model)?;
            if inquiry.is_expired(now) {
                due.push(inquiry);
            }
        }
        Ok(due)
    }

    async fn insert(&self, inquiry: Inquiry) -> Result<bool, StoreError> {
        use entities::inquiry::{Column, Entity};

        let rows = Entity::insert(inquiry_to_active(&inquiry)?)
            .on_conflict(OnConflict::column(Column::Id).do_nothing().to_owned())
            .exec_without_returning(&self.db)
            .await?;

        Ok(rows == 1)
    }

    /// Single conditional UPDATE guarded by `status = 'pending'`; the row
    /// count tells whether this caller won.
    async fn resolve(&self, id: &str, resolution: Resolution) -> Result<Transition, StoreError> {
        use entities::inquiry::{Column, Entity};

        let mut update =
            Entity::update_many().col_expr(Column::Status, Expr::value(resolution.status().as_str()));
        if let Resolution::Responded { response, by, at } = &resolution {
            update = update
                .col_expr(Column::Response, Expr::value(serde_json::to_string(response)?))
                .col_expr(Column::RespondedBy, Expr::value(by.clone()))
                .col_expr(Column::RespondedAt, Expr::value(*at));
        }

        let result = update
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(InquiryStatus::Pending.as_str()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 1 {
            let updated = self
                .get(id)
                .await?
                .ok_or_else(|| StoreError::corrupt(id, "row vanished after resolve"))?;
            return Ok(Transition::Applied(updated));
        }

        Ok(match self.get(id).await? {
            Some(current) => Transition::Rejected(current.status),
            None => Transition::Missing,
        })
    }
}
