//! Claim lifecycle operations.
//!
//! Every handler funnels into this service: mint, list, claim, assign, path
//! tracking, ownership validation, delete. Inputs are validated here before
//! any store interaction, and user references are resolved to display fields
//! on the way out. Claim conflicts are enforced by the store's conditional
//! writes, so a lost race reports `AlreadyClaimed` rather than silently
//! double-claiming.

use std::sync::Arc;

use mongodb::bson::oid::ObjectId;
use serde::Deserialize;

use crate::{
    error::AppError,
    qr::{GeoPoint, PathSample, QrCodeView, QrRecord, now_ms},
    store::QrStore,
    user::IdentityStore,
};

/// One entry of a mint batch. `value` is required but arrives loose so the
/// boundary can reject it as bad input rather than a deserialization failure.
#[derive(Deserialize, Debug, Clone)]
pub struct MintEntry {
    pub value: Option<String>,
    pub timestamp: Option<i64>,
}

/// Claim-time location; used only when both coordinates are present.
#[derive(Deserialize, Debug, Clone, Copy, Default)]
pub struct LooseLocation {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl LooseLocation {
    pub fn point(self) -> Option<GeoPoint> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        }
    }
}

pub struct ClaimService {
    store: Arc<dyn QrStore>,
    identity: Arc<dyn IdentityStore>,
}

impl ClaimService {
    pub fn new(store: Arc<dyn QrStore>, identity: Arc<dyn IdentityStore>) -> Self {
        Self { store, identity }
    }

    pub async fn mint_batch(&self, entries: Vec<MintEntry>) -> Result<Vec<QrCodeView>, AppError> {
        if entries.is_empty() {
            return Err(AppError::InvalidInput("Invalid data"));
        }

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            let value = match entry.value {
                Some(value) if !value.is_empty() => value,
                _ => return Err(AppError::InvalidInput("Invalid data")),
            };
            records.push(QrRecord::unclaimed(
                value,
                entry.timestamp.unwrap_or_else(now_ms),
            ));
        }

        let created = self.store.insert_batch(records).await?;
        Ok(created.into_iter().map(|r| QrCodeView::new(r, None)).collect())
    }

    pub async fn unclaimed(&self) -> Result<Vec<QrCodeView>, AppError> {
        let records = self.store.unclaimed().await?;
        Ok(records
            .into_iter()
            .map(|r| QrCodeView::new(r, None))
            .collect())
    }

    pub async fn claim(
        &self,
        qr_id: &str,
        purpose: &str,
        user_id: &str,
        location: Option<LooseLocation>,
    ) -> Result<QrCodeView, AppError> {
        if qr_id.is_empty() || purpose.is_empty() || user_id.is_empty() {
            return Err(AppError::InvalidInput(
                "QR ID, purpose, and user ID are required",
            ));
        }
        let qr_id = parse_id(qr_id)?;
        let user_id = parse_id(user_id)?;

        let record = self.store.find_by_id(qr_id).await?.ok_or(AppError::NotFound)?;
        if record.is_claimed {
            return Err(AppError::AlreadyClaimed);
        }

        let point = location.and_then(LooseLocation::point);
        let updated = self
            .store
            .claim_if_unclaimed(qr_id, user_id, purpose, point)
            .await?
            // Claimed between the lookup and the conditional write.
            .ok_or(AppError::AlreadyClaimed)?;

        self.resolve(updated).await
    }

    pub async fn details(&self, value: &str) -> Result<QrCodeView, AppError> {
        let record = self
            .store
            .find_by_value(value)
            .await?
            .ok_or(AppError::NotFound)?;
        self.resolve(record).await
    }

    pub async fn for_user(&self, user_id: &str) -> Result<Vec<QrCodeView>, AppError> {
        let user_id = parse_id(user_id)?;
        let records = self.store.claimed_by_user(user_id).await?;
        self.resolve_all(records).await
    }

    pub async fn all(&self) -> Result<Vec<QrCodeView>, AppError> {
        let records = self.store.all().await?;
        self.resolve_all(records).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        let id = parse_id(id)?;
        if self.store.delete_by_id(id).await? {
            Ok(())
        } else {
            Err(AppError::NotFound)
        }
    }

    pub async fn validate_ownership(&self, value: &str, user_id: &str) -> Result<(), AppError> {
        if value.is_empty() || user_id.is_empty() {
            return Err(AppError::InvalidInput("QR value and userId are required"));
        }
        let user_id = parse_id(user_id)?;
        if self.store.owned_by(value, user_id).await? {
            Ok(())
        } else {
            Err(AppError::NotAssigned)
        }
    }

    pub async fn assign_to_user(
        &self,
        user_id: &str,
        value: &str,
        lat: Option<f64>,
        lng: Option<f64>,
    ) -> Result<QrCodeView, AppError> {
        let (Some(lat), Some(lng)) = (lat, lng) else {
            return Err(AppError::InvalidInput(
                "userId, qrValue, lat, and lng are required",
            ));
        };
        if user_id.is_empty() || value.is_empty() {
            return Err(AppError::InvalidInput(
                "userId, qrValue, lat, and lng are required",
            ));
        }
        let user_id = parse_id(user_id)?;

        let record = self
            .store
            .find_by_value(value)
            .await?
            .ok_or(AppError::NotFound)?;
        if record.is_claimed {
            return Err(AppError::AlreadyClaimed);
        }

        let updated = self
            .store
            .assign_if_unclaimed(value, user_id, GeoPoint { lat, lng })
            .await?
            .ok_or(AppError::AlreadyClaimed)?;

        self.resolve(updated).await
    }

    pub async fn assign_by_value(
        &self,
        value: &str,
        lat: Option<f64>,
        lng: Option<f64>,
    ) -> Result<QrCodeView, AppError> {
        let (Some(lat), Some(lng)) = (lat, lng) else {
            return Err(AppError::InvalidInput("qrValue, lat, and lng are required"));
        };

        // Intentionally no claimed check: a re-assignment overwrites the
        // location and restarts the path at this sample.
        let sample = PathSample::at(GeoPoint { lat, lng }, now_ms());
        let updated = self
            .store
            .assign_by_value(value, sample)
            .await?
            .ok_or(AppError::NotFound)?;

        self.resolve(updated).await
    }

    pub async fn append_path(
        &self,
        value: &str,
        lat: Option<f64>,
        lng: Option<f64>,
    ) -> Result<QrCodeView, AppError> {
        let (Some(lat), Some(lng)) = (lat, lng) else {
            return Err(AppError::InvalidInput("qrValue, lat, and lng are required"));
        };

        let sample = PathSample::at(GeoPoint { lat, lng }, now_ms());
        let updated = self
            .store
            .push_path(value, sample)
            .await?
            .ok_or(AppError::NotFound)?;

        self.resolve(updated).await
    }

    async fn resolve(&self, record: QrRecord) -> Result<QrCodeView, AppError> {
        let user = match record.user {
            Some(id) => self.identity.display(id).await?,
            None => None,
        };
        Ok(QrCodeView::new(record, user))
    }

    async fn resolve_all(&self, records: Vec<QrRecord>) -> Result<Vec<QrCodeView>, AppError> {
        let mut views = Vec::with_capacity(records.len());
        for record in records {
            views.push(self.resolve(record).await?);
        }
        Ok(views)
    }
}

fn parse_id(raw: &str) -> Result<ObjectId, AppError> {
    ObjectId::parse_str(raw).map_err(|_| AppError::InvalidInput("Invalid id format"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryIdentity, MemoryStore};

    fn setup() -> (ClaimService, Arc<MemoryStore>, Arc<MemoryIdentity>) {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(MemoryIdentity::new());
        let service = ClaimService::new(store.clone(), identity.clone());
        (service, store, identity)
    }

    fn entry(value: &str) -> MintEntry {
        MintEntry {
            value: Some(value.to_string()),
            timestamp: None,
        }
    }

    fn loc(lat: f64, lng: f64) -> Option<LooseLocation> {
        Some(LooseLocation {
            lat: Some(lat),
            lng: Some(lng),
        })
    }

    #[tokio::test]
    async fn mint_batch_creates_unclaimed_records() {
        let (service, _, _) = setup();

        let created = service
            .mint_batch(vec![entry("a"), entry("b"), entry("c")])
            .await
            .unwrap();
        assert_eq!(created.len(), 3);
        assert!(created.iter().all(|v| !v.is_claimed && !v.id.is_empty()));

        let unclaimed = service.unclaimed().await.unwrap();
        assert_eq!(unclaimed.len(), 3);
    }

    #[tokio::test]
    async fn mint_batch_rejects_empty_and_missing_value() {
        let (service, _, _) = setup();

        let err = service.mint_batch(vec![]).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let err = service
            .mint_batch(vec![MintEntry {
                value: None,
                timestamp: None,
            }])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn unclaimed_lists_newest_first() {
        let (service, _, _) = setup();

        let entries = [("old", 1_000), ("mid", 2_000), ("new", 3_000)]
            .map(|(value, timestamp)| MintEntry {
                value: Some(value.to_string()),
                timestamp: Some(timestamp),
            });
        service.mint_batch(entries.to_vec()).await.unwrap();

        let values: Vec<_> = service
            .unclaimed()
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.value)
            .collect();
        assert_eq!(values, ["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn claim_sets_fields_and_resolves_user() {
        let (service, _, identity) = setup();
        let user = identity.add_user("Ada", "ada@example.com");

        let minted = service.mint_batch(vec![entry("111")]).await.unwrap();
        let claimed = service
            .claim(&minted[0].id, "Delivery", &user.to_hex(), loc(10.0, 20.0))
            .await
            .unwrap();

        assert!(claimed.is_claimed);
        assert_eq!(claimed.purpose.as_deref(), Some("Delivery"));
        assert_eq!(claimed.location, Some(GeoPoint { lat: 10.0, lng: 20.0 }));
        let display = claimed.user.unwrap();
        assert_eq!(display.name, "Ada");
        assert_eq!(display.email, "ada@example.com");
    }

    #[tokio::test]
    async fn second_claim_always_rejected() {
        let (service, _, identity) = setup();
        let user = identity.add_user("Ada", "ada@example.com");

        let minted = service.mint_batch(vec![entry("111")]).await.unwrap();
        service
            .claim(&minted[0].id, "Delivery", &user.to_hex(), None)
            .await
            .unwrap();

        // Same caller, same purpose: still a conflict.
        let err = service
            .claim(&minted[0].id, "Delivery", &user.to_hex(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyClaimed));
    }

    #[tokio::test]
    async fn claim_requires_all_fields() {
        let (service, _, identity) = setup();
        let user = identity.add_user("Ada", "ada@example.com");

        let minted = service.mint_batch(vec![entry("111")]).await.unwrap();
        let err = service
            .claim(&minted[0].id, "", &user.to_hex(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn claim_unknown_id_is_not_found() {
        let (service, _, identity) = setup();
        let user = identity.add_user("Ada", "ada@example.com");

        let err = service
            .claim(&ObjectId::new().to_hex(), "Delivery", &user.to_hex(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn claim_ignores_partial_location() {
        let (service, _, identity) = setup();
        let user = identity.add_user("Ada", "ada@example.com");

        let minted = service.mint_batch(vec![entry("111")]).await.unwrap();
        let claimed = service
            .claim(
                &minted[0].id,
                "Delivery",
                &user.to_hex(),
                Some(LooseLocation {
                    lat: Some(10.0),
                    lng: None,
                }),
            )
            .await
            .unwrap();

        assert!(claimed.is_claimed);
        assert_eq!(claimed.location, None);
    }

    #[tokio::test]
    async fn append_path_adds_exactly_one_sample_per_call() {
        let (service, _, _) = setup();
        service.mint_batch(vec![entry("222")]).await.unwrap();

        service
            .assign_by_value("222", Some(1.0), Some(2.0))
            .await
            .unwrap();
        for k in 0..3usize {
            let view = service
                .append_path("222", Some(3.0 + k as f64), Some(4.0))
                .await
                .unwrap();
            assert_eq!(view.path.len(), 2 + k);
        }

        let details = service.details("222").await.unwrap();
        assert_eq!(details.path.len(), 4);
        assert!(
            details
                .path
                .windows(2)
                .all(|w| w[0].timestamp <= w[1].timestamp)
        );
        assert_eq!(
            details.location,
            Some(details.path.last().unwrap().point())
        );
    }

    #[tokio::test]
    async fn assign_by_value_resets_path_to_one_sample() {
        let (service, _, _) = setup();
        service.mint_batch(vec![entry("222")]).await.unwrap();

        service
            .assign_by_value("222", Some(1.0), Some(2.0))
            .await
            .unwrap();
        service.append_path("222", Some(3.0), Some(4.0)).await.unwrap();
        service.append_path("222", Some(5.0), Some(6.0)).await.unwrap();

        let reassigned = service
            .assign_by_value("222", Some(7.0), Some(8.0))
            .await
            .unwrap();
        assert_eq!(reassigned.path.len(), 1);
        assert_eq!(reassigned.location, Some(GeoPoint { lat: 7.0, lng: 8.0 }));
    }

    #[tokio::test]
    async fn assign_by_value_overwrites_claimed_records() {
        let (service, _, identity) = setup();
        let user = identity.add_user("Ada", "ada@example.com");

        let minted = service.mint_batch(vec![entry("222")]).await.unwrap();
        service
            .claim(&minted[0].id, "Delivery", &user.to_hex(), loc(10.0, 20.0))
            .await
            .unwrap();

        // No conflict check on this entry point.
        let reassigned = service
            .assign_by_value("222", Some(1.0), Some(2.0))
            .await
            .unwrap();
        assert!(reassigned.is_claimed);
        assert_eq!(reassigned.location, Some(GeoPoint { lat: 1.0, lng: 2.0 }));
        assert_eq!(reassigned.path.len(), 1);
    }

    #[tokio::test]
    async fn append_path_on_unknown_value_is_not_found() {
        let (service, _, _) = setup();
        let err = service
            .append_path("missing", Some(1.0), Some(2.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn append_path_requires_coordinates() {
        let (service, _, _) = setup();
        service.mint_batch(vec![entry("222")]).await.unwrap();

        let err = service.append_path("222", Some(1.0), None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn for_user_excludes_unclaimed_and_other_users() {
        let (service, store, identity) = setup();
        let owner = identity.add_user("Ada", "ada@example.com");
        let other = identity.add_user("Bob", "bob@example.com");

        let minted = service.mint_batch(vec![entry("mine")]).await.unwrap();
        service
            .claim(&minted[0].id, "Delivery", &owner.to_hex(), None)
            .await
            .unwrap();

        // A record can carry a user reference while still unclaimed; it must
        // not show up in the claimed listing.
        let mut stray = QrRecord::unclaimed("stray".to_string(), now_ms());
        stray.user = Some(owner);
        store.insert_batch(vec![stray]).await.unwrap();

        let mine = service.for_user(&owner.to_hex()).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].value, "mine");

        let theirs = service.for_user(&other.to_hex()).await.unwrap();
        assert!(theirs.is_empty());
    }

    #[tokio::test]
    async fn validate_ownership_matches_exact_pair() {
        let (service, _, identity) = setup();
        let owner = identity.add_user("Ada", "ada@example.com");
        let other = identity.add_user("Bob", "bob@example.com");

        let minted = service.mint_batch(vec![entry("111")]).await.unwrap();
        service
            .claim(&minted[0].id, "Delivery", &owner.to_hex(), None)
            .await
            .unwrap();

        service
            .validate_ownership("111", &owner.to_hex())
            .await
            .unwrap();

        let err = service
            .validate_ownership("111", &other.to_hex())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotAssigned));
    }

    #[tokio::test]
    async fn all_lists_every_record_newest_first_with_users_resolved() {
        let (service, _, identity) = setup();
        let user = identity.add_user("Ada", "ada@example.com");

        let entries = [("old", 1_000), ("new", 2_000)].map(|(value, timestamp)| MintEntry {
            value: Some(value.to_string()),
            timestamp: Some(timestamp),
        });
        let minted = service.mint_batch(entries.to_vec()).await.unwrap();
        service
            .claim(&minted[0].id, "Delivery", &user.to_hex(), None)
            .await
            .unwrap();

        let all = service.all().await.unwrap();
        let values: Vec<_> = all.iter().map(|v| v.value.as_str()).collect();
        assert_eq!(values, ["new", "old"]);

        let claimed = all.iter().find(|v| v.value == "old").unwrap();
        assert_eq!(claimed.user.as_ref().unwrap().name, "Ada");
        assert!(all.iter().find(|v| v.value == "new").unwrap().user.is_none());
    }

    #[tokio::test]
    async fn details_on_unknown_value_is_not_found() {
        let (service, _, _) = setup();
        let err = service.details("missing").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn delete_removes_record_permanently() {
        let (service, _, _) = setup();
        let minted = service.mint_batch(vec![entry("111")]).await.unwrap();

        service.delete(&minted[0].id).await.unwrap();
        let err = service.delete(&minted[0].id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound));
        assert!(service.unclaimed().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn assign_to_user_rejects_claimed_and_skips_path() {
        let (service, _, identity) = setup();
        let user = identity.add_user("Ada", "ada@example.com");

        service.mint_batch(vec![entry("111")]).await.unwrap();
        let assigned = service
            .assign_to_user(&user.to_hex(), "111", Some(1.0), Some(2.0))
            .await
            .unwrap();
        assert!(assigned.is_claimed);
        assert_eq!(assigned.user.as_ref().unwrap().name, "Ada");
        // Administrative assignment does not start tracking.
        assert!(assigned.path.is_empty());

        let err = service
            .assign_to_user(&user.to_hex(), "111", Some(1.0), Some(2.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyClaimed));
    }

    #[tokio::test]
    async fn end_to_end_claim_flow() {
        let (service, _, identity) = setup();
        let user = identity.add_user("Ada", "ada@example.com");

        let minted = service.mint_batch(vec![entry("111")]).await.unwrap();
        let unclaimed = service.unclaimed().await.unwrap();
        assert_eq!(unclaimed.len(), 1);
        assert_eq!(unclaimed[0].value, "111");

        let claimed = service
            .claim(&minted[0].id, "Delivery", &user.to_hex(), loc(10.0, 20.0))
            .await
            .unwrap();
        assert!(claimed.is_claimed);
        assert_eq!(claimed.purpose.as_deref(), Some("Delivery"));
        assert_eq!(claimed.location, Some(GeoPoint { lat: 10.0, lng: 20.0 }));

        let err = service
            .claim(&minted[0].id, "Pickup", &user.to_hex(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyClaimed));
    }

    #[tokio::test]
    async fn end_to_end_tracking_flow() {
        let (service, _, _) = setup();
        service.mint_batch(vec![entry("222")]).await.unwrap();

        service
            .assign_by_value("222", Some(1.0), Some(2.0))
            .await
            .unwrap();
        service.append_path("222", Some(3.0), Some(4.0)).await.unwrap();

        let details = service.details("222").await.unwrap();
        assert_eq!(details.path.len(), 2);
        assert_eq!(details.path[0].point(), GeoPoint { lat: 1.0, lng: 2.0 });
        assert_eq!(details.path[1].point(), GeoPoint { lat: 3.0, lng: 4.0 });
        assert_eq!(details.location, Some(GeoPoint { lat: 3.0, lng: 4.0 }));
    }
}
