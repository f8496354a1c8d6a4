//! Identity boundary.
//!
//! Accounts are owned by the auth service; this crate only resolves a user id
//! to display fields when populating claim responses.

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Stored shape of a `users` document, reduced to the fields we read.
#[derive(Deserialize, Debug, Clone)]
pub struct UserDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub email: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl From<UserDoc> for UserView {
    fn from(doc: UserDoc) -> Self {
        Self {
            id: doc.id.to_hex(),
            name: doc.name,
            email: doc.email,
        }
    }
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Lookup by id for display population. `None` when the account no longer
    /// exists; records keep their dangling reference in that case.
    async fn display(&self, id: ObjectId) -> Result<Option<UserView>, AppError>;
}
