//! # MongoDB
//!
//! Document store backing the QR record collection.
//!
//! ## Schema
//! - `qrcodes`: one document per issued code, `{_id, value, user?, purpose?,
//!   isClaimed, location?, path, timestamp}`; `timestamp` and the path sample
//!   timestamps are Unix milliseconds.
//! - `users`: owned by the auth service; read here only to resolve `{_id,
//!   name, email}` for display population.
//!
//! Claim and administrative assignment are single conditional
//! `findOneAndUpdate` calls filtered on `isClaimed: false`, so a record can
//! transition to claimed at most once even under concurrent requests.

use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::{
    Client, Collection, Database,
    bson::{Document, doc, oid::ObjectId},
    options::ReturnDocument,
};
use tracing::info;

use crate::{
    error::AppError,
    qr::{GeoPoint, PathSample, QrRecord},
    store::QrStore,
    user::{IdentityStore, UserDoc, UserView},
};

pub async fn init_mongo(mongo_url: &str, db_name: &str) -> Database {
    let client = Client::with_uri_str(mongo_url)
        .await
        .expect("Database misconfigured!");

    info!("Connected to MongoDB at {mongo_url}");

    client.database(db_name)
}

pub struct MongoStore {
    qr: Collection<QrRecord>,
    users: Collection<UserDoc>,
}

impl MongoStore {
    pub fn new(db: &Database) -> Self {
        Self {
            qr: db.collection("qrcodes"),
            users: db.collection("users"),
        }
    }

    async fn find_sorted(&self, filter: Document) -> Result<Vec<QrRecord>, AppError> {
        let cursor = self.qr.find(filter).sort(doc! { "timestamp": -1 }).await?;
        Ok(cursor.try_collect().await?)
    }
}

fn point_doc(point: GeoPoint) -> Document {
    doc! { "lat": point.lat, "lng": point.lng }
}

fn sample_doc(sample: PathSample) -> Document {
    doc! { "lat": sample.lat, "lng": sample.lng, "timestamp": sample.timestamp }
}

#[async_trait]
impl QrStore for MongoStore {
    async fn insert_batch(&self, records: Vec<QrRecord>) -> Result<Vec<QrRecord>, AppError> {
        self.qr.insert_many(&records).await?;
        Ok(records)
    }

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<QrRecord>, AppError> {
        Ok(self.qr.find_one(doc! { "_id": id }).await?)
    }

    async fn find_by_value(&self, value: &str) -> Result<Option<QrRecord>, AppError> {
        Ok(self.qr.find_one(doc! { "value": value }).await?)
    }

    async fn unclaimed(&self) -> Result<Vec<QrRecord>, AppError> {
        self.find_sorted(doc! { "isClaimed": false }).await
    }

    async fn claimed_by_user(&self, user: ObjectId) -> Result<Vec<QrRecord>, AppError> {
        self.find_sorted(doc! { "user": user, "isClaimed": true })
            .await
    }

    async fn all(&self) -> Result<Vec<QrRecord>, AppError> {
        self.find_sorted(doc! {}).await
    }

    async fn delete_by_id(&self, id: ObjectId) -> Result<bool, AppError> {
        let result = self.qr.delete_one(doc! { "_id": id }).await?;
        Ok(result.deleted_count == 1)
    }

    async fn owned_by(&self, value: &str, user: ObjectId) -> Result<bool, AppError> {
        let found = self
            .qr
            .find_one(doc! { "value": value, "user": user })
            .await?;
        Ok(found.is_some())
    }

    async fn claim_if_unclaimed(
        &self,
        id: ObjectId,
        user: ObjectId,
        purpose: &str,
        location: Option<GeoPoint>,
    ) -> Result<Option<QrRecord>, AppError> {
        let mut fields = doc! { "user": user, "purpose": purpose, "isClaimed": true };
        if let Some(point) = location {
            fields.insert("location", point_doc(point));
        }

        Ok(self
            .qr
            .find_one_and_update(doc! { "_id": id, "isClaimed": false }, doc! { "$set": fields })
            .return_document(ReturnDocument::After)
            .await?)
    }

    async fn assign_if_unclaimed(
        &self,
        value: &str,
        user: ObjectId,
        location: GeoPoint,
    ) -> Result<Option<QrRecord>, AppError> {
        Ok(self
            .qr
            .find_one_and_update(
                doc! { "value": value, "isClaimed": false },
                doc! { "$set": {
                    "user": user,
                    "isClaimed": true,
                    "location": point_doc(location),
                } },
            )
            .return_document(ReturnDocument::After)
            .await?)
    }

    async fn assign_by_value(
        &self,
        value: &str,
        sample: PathSample,
    ) -> Result<Option<QrRecord>, AppError> {
        Ok(self
            .qr
            .find_one_and_update(
                doc! { "value": value },
                doc! { "$set": {
                    "isClaimed": true,
                    "location": point_doc(sample.point()),
                    "path": [sample_doc(sample)],
                } },
            )
            .return_document(ReturnDocument::After)
            .await?)
    }

    async fn push_path(
        &self,
        value: &str,
        sample: PathSample,
    ) -> Result<Option<QrRecord>, AppError> {
        Ok(self
            .qr
            .find_one_and_update(
                doc! { "value": value },
                doc! {
                    "$push": { "path": sample_doc(sample) },
                    "$set": { "location": point_doc(sample.point()) },
                },
            )
            .return_document(ReturnDocument::After)
            .await?)
    }
}

#[async_trait]
impl IdentityStore for MongoStore {
    async fn display(&self, id: ObjectId) -> Result<Option<UserView>, AppError> {
        let user = self.users.find_one(doc! { "_id": id }).await?;
        Ok(user.map(UserView::from))
    }
}
