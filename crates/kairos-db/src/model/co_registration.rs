use chrono::{DateTime, Utc};
use diesel::{pg::Pg, prelude::*};

use crate::db::schema;

/// An entity joined to an occurrence on behalf of a participating user.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = schema::co_registration)]
#[diesel(check_for_backend(Pg))]
#[diesel(primary_key(occurrence_id, user_id, entity_id))]
pub struct CoRegistration {
    pub occurrence_id: uuid::Uuid,
    pub user_id: uuid::Uuid,
    pub entity_id: uuid::Uuid,
    pub fee_required: bool,
    pub paid: bool,
    /// Created together with the user's own participation, removed when the user leaves.
    pub auto_join: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Insertable)]
#[diesel(table_name = schema::co_registration)]
pub struct NewCoRegistration {
    pub occurrence_id: uuid::Uuid,
    pub user_id: uuid::Uuid,
    pub entity_id: uuid::Uuid,
    pub fee_required: bool,
    pub paid: bool,
    pub auto_join: bool,
}
