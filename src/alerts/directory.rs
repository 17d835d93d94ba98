use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::info;

use crate::db::IncidentStore;
use crate::error::StoreError;
use crate::models::{AlertType, ResponderRecord};

/// Read-mostly view of who can respond to what. Writes go to the store first,
/// then to the in-memory copy. Duty and location changes only touch their own
/// column, so concurrent edits to one responder never undo each other.
pub struct ResponderDirectory {
    store: Arc<dyn IncidentStore>,
    records: DashMap<String, ResponderRecord>,
}

impl std::fmt::Debug for ResponderDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponderDirectory")
            .field("responders", &self.records.len())
            .finish()
    }
}

impl ResponderDirectory {
    pub fn new(store: Arc<dyn IncidentStore>) -> Self {
        Self {
            store,
            records: DashMap::new(),
        }
    }

    /// Load every responder row into memory.
    pub async fn hydrate(&self) -> Result<usize, StoreError> {
        let rows = self.store.list_responders().await?;
        let count = rows.len();
        for record in rows {
            self.records.insert(record.user_id.clone(), record);
        }
        info!("Loaded {} responders", count);
        Ok(count)
    }

    pub async fn upsert(&self, mut record: ResponderRecord) -> Result<ResponderRecord, StoreError> {
        record.updated_at = Utc::now();
        self.store.upsert_responder(&record).await?;
        self.records.insert(record.user_id.clone(), record.clone());
        Ok(record)
    }

    /// `None` when the user has no responder record.
    pub async fn set_on_duty(
        &self,
        user_id: &str,
        on_duty: bool,
    ) -> Result<Option<ResponderRecord>, StoreError> {
        let now = Utc::now();
        if !self.store.set_responder_on_duty(user_id, on_duty, now).await? {
            return Ok(None);
        }
        self.apply(user_id, |r| {
            r.is_on_duty = on_duty;
            r.updated_at = now;
        })
        .await
    }

    pub async fn update_location(
        &self,
        user_id: &str,
        location: Option<String>,
    ) -> Result<Option<ResponderRecord>, StoreError> {
        let now = Utc::now();
        if !self
            .store
            .set_responder_location(user_id, location.as_deref(), now)
            .await?
        {
            return Ok(None);
        }
        self.apply(user_id, |r| {
            r.location = location;
            r.updated_at = now;
        })
        .await
    }

    pub fn get(&self, user_id: &str) -> Option<ResponderRecord> {
        self.records.get(user_id).map(|r| r.clone())
    }

    pub fn all(&self) -> Vec<ResponderRecord> {
        let mut all: Vec<_> = self.records.iter().map(|r| r.clone()).collect();
        all.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        all
    }

    /// On-duty responders whose capabilities cover `alert_type`.
    pub fn eligible_for(&self, alert_type: AlertType) -> Vec<ResponderRecord> {
        let mut eligible: Vec<_> = self
            .records
            .iter()
            .filter(|r| r.can_take(alert_type))
            .map(|r| r.clone())
            .collect();
        eligible.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        eligible
    }

    /// Mirror a column update already committed to the store. A record this
    /// instance has never seen is pulled from the store instead.
    async fn apply<F>(&self, user_id: &str, change: F) -> Result<Option<ResponderRecord>, StoreError>
    where
        F: FnOnce(&mut ResponderRecord),
    {
        if let Some(mut record) = self.records.get_mut(user_id) {
            change(record.value_mut());
            return Ok(Some(record.value().clone()));
        }

        let fetched = self
            .store
            .list_responders()
            .await?
            .into_iter()
            .find(|r| r.user_id == user_id);
        if let Some(record) = &fetched {
            self.records.insert(record.user_id.clone(), record.clone());
        }
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryIncidentStore;

    fn responder(user_id: &str, on_duty: bool, types: &[AlertType]) -> ResponderRecord {
        ResponderRecord {
            user_id: user_id.to_string(),
            responder_type: "emt".to_string(),
            is_on_duty: on_duty,
            location: None,
            can_respond_to: types.to_vec(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn eligibility_needs_duty_and_capability() {
        let store = Arc::new(InMemoryIncidentStore::new());
        let directory = ResponderDirectory::new(store.clone());
        directory.upsert(responder("emt-1", true, &[AlertType::Medical])).await.unwrap();
        directory.upsert(responder("emt-2", false, &[AlertType::Medical])).await.unwrap();
        directory.upsert(responder("sec-1", true, &[AlertType::Security])).await.unwrap();

        let eligible: Vec<_> = directory
            .eligible_for(AlertType::Medical)
            .into_iter()
            .map(|r| r.user_id)
            .collect();
        assert_eq!(eligible, vec!["emt-1".to_string()]);

        directory.set_on_duty("emt-2", true).await.unwrap();
        assert_eq!(directory.eligible_for(AlertType::Medical).len(), 2);
    }

    #[tokio::test]
    async fn updates_write_through_and_survive_hydrate() {
        let store = Arc::new(InMemoryIncidentStore::new());
        let directory = ResponderDirectory::new(store.clone());
        directory.upsert(responder("emt-1", true, &[AlertType::Medical])).await.unwrap();
        directory
            .update_location("emt-1", Some("Section 104".to_string()))
            .await
            .unwrap();

        let fresh = ResponderDirectory::new(store);
        assert_eq!(fresh.hydrate().await.unwrap(), 1);
        assert_eq!(fresh.get("emt-1").unwrap().location.as_deref(), Some("Section 104"));
        assert_eq!(fresh.set_on_duty("ghost", true).await.unwrap(), None);
    }

    #[tokio::test]
    async fn duty_and_location_edits_from_two_instances_both_stick() {
        let store = Arc::new(InMemoryIncidentStore::new());
        store
            .upsert_responder(&responder("emt-1", false, &[AlertType::Medical]))
            .await
            .unwrap();
        let gate = ResponderDirectory::new(store.clone());
        let dispatch = ResponderDirectory::new(store.clone());
        gate.hydrate().await.unwrap();
        dispatch.hydrate().await.unwrap();

        gate.set_on_duty("emt-1", true).await.unwrap();
        let moved = dispatch
            .update_location("emt-1", Some("Gate C".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(moved.location.as_deref(), Some("Gate C"));

        let fresh = ResponderDirectory::new(store);
        fresh.hydrate().await.unwrap();
        let stored = fresh.get("emt-1").unwrap();
        assert!(stored.is_on_duty);
        assert_eq!(stored.location.as_deref(), Some("Gate C"));
    }

    #[tokio::test]
    async fn column_update_pulls_in_a_responder_added_elsewhere() {
        let store = Arc::new(InMemoryIncidentStore::new());
        let directory = ResponderDirectory::new(store.clone());
        store
            .upsert_responder(&responder("sec-4", false, &[AlertType::Security]))
            .await
            .unwrap();

        let record = directory.set_on_duty("sec-4", true).await.unwrap().unwrap();
        assert!(record.is_on_duty);
        assert_eq!(directory.eligible_for(AlertType::Security).len(), 1);
    }
}
