//! QR record store seam.
//!
//! The lifecycle service talks to the store only through this trait; the
//! production backend is MongoDB (`crate::database`) and tests run against the
//! in-memory backend below. The claim/assign primitives are conditional
//! writes: they mutate a record only while it is still unclaimed, so two
//! racing claims cannot both succeed.

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;

use crate::{
    error::AppError,
    qr::{GeoPoint, PathSample, QrRecord},
};

#[async_trait]
pub trait QrStore: Send + Sync {
    /// Inserts pre-built records (ids already assigned) and returns them.
    async fn insert_batch(&self, records: Vec<QrRecord>) -> Result<Vec<QrRecord>, AppError>;

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<QrRecord>, AppError>;

    async fn find_by_value(&self, value: &str) -> Result<Option<QrRecord>, AppError>;

    /// Unclaimed records, newest first.
    async fn unclaimed(&self) -> Result<Vec<QrRecord>, AppError>;

    /// Claimed records belonging to `user`, newest first.
    async fn claimed_by_user(&self, user: ObjectId) -> Result<Vec<QrRecord>, AppError>;

    /// Every record, newest first.
    async fn all(&self) -> Result<Vec<QrRecord>, AppError>;

    /// Hard delete. `false` when no record had that id.
    async fn delete_by_id(&self, id: ObjectId) -> Result<bool, AppError>;

    async fn owned_by(&self, value: &str, user: ObjectId) -> Result<bool, AppError>;

    /// Marks the record claimed with user and purpose, setting `location` when
    /// given. Only applies while `isClaimed` is still false; `None` means the
    /// record was claimed in the meantime (or never existed).
    async fn claim_if_unclaimed(
        &self,
        id: ObjectId,
        user: ObjectId,
        purpose: &str,
        location: Option<GeoPoint>,
    ) -> Result<Option<QrRecord>, AppError>;

    /// Claim-by-value variant used by administrative assignment: sets user and
    /// location but no purpose, and does not seed the path. Conditional on the
    /// record being unclaimed, like `claim_if_unclaimed`.
    async fn assign_if_unclaimed(
        &self,
        value: &str,
        user: ObjectId,
        location: GeoPoint,
    ) -> Result<Option<QrRecord>, AppError>;

    /// Direct location assignment: marks the record claimed, overwrites
    /// `location`, and REPLACES the path with this single sample. Runs
    /// unconditionally, including on already-claimed records.
    async fn assign_by_value(
        &self,
        value: &str,
        sample: PathSample,
    ) -> Result<Option<QrRecord>, AppError>;

    /// Appends one sample to the path and moves `location` to it.
    async fn push_path(
        &self,
        value: &str,
        sample: PathSample,
    ) -> Result<Option<QrRecord>, AppError>;
}
