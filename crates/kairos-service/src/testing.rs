//! In-process collaborators and fixtures for engine tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeDelta, TimeZone, Utc};
use kairos_core::config::EngineConfig;
use kairos_core::schedule::RecurrenceDays;
use kairos_db::db::enums::{Period, PaymentType};
use kairos_db::model::group::{NewRecurrenceGroup, RecurrenceGroup};
use kairos_db::model::occurrence::{NewOccurrence, Occurrence};
use kairos_db::store::{GroupStore, MemoryStore, OccurrenceStore};

use crate::clock::ManualClock;
use crate::context::EngineContext;
use crate::identity::{Directory, DirectoryError};
use crate::ledger::{ChargeRequest, Ledger, LedgerError, Receipt, RefundRequest};
use crate::notify::{EventKind, NotificationBus, NotificationEvent};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct LedgerState {
    charges: Vec<ChargeRequest>,
    refunds: Vec<RefundRequest>,
    paid: HashSet<(uuid::Uuid, String)>,
    decline_charges: bool,
    fail_refunds: bool,
}

/// A ledger that records every call.
#[derive(Debug, Default)]
pub struct FakeLedger {
    state: Mutex<LedgerState>,
}

impl FakeLedger {
    pub fn charges(&self) -> Vec<ChargeRequest> {
        lock(&self.state).charges.clone()
    }

    pub fn refunds(&self) -> Vec<RefundRequest> {
        lock(&self.state).refunds.clone()
    }

    pub fn decline_charges(&self, decline: bool) {
        lock(&self.state).decline_charges = decline;
    }

    pub fn fail_refunds(&self, fail: bool) {
        lock(&self.state).fail_refunds = fail;
    }

    /// Records a payment made outside the engine.
    pub fn mark_paid(&self, user_id: uuid::Uuid, reference: &str) {
        lock(&self.state).paid.insert((user_id, reference.to_string()));
    }
}

#[async_trait]
impl Ledger for FakeLedger {
    async fn charge(&self, request: ChargeRequest) -> Result<Receipt, LedgerError> {
        let mut state = lock(&self.state);
        if state.decline_charges {
            return Err(LedgerError::Declined("insufficient funds".to_string()));
        }
        state
            .paid
            .insert((request.user_id, request.reference.clone()));
        state.charges.push(request);
        Ok(Receipt {
            transaction_id: format!("charge-{}", state.charges.len()),
        })
    }

    async fn refund(&self, request: RefundRequest) -> Result<Receipt, LedgerError> {
        let mut state = lock(&self.state);
        if state.fail_refunds {
            return Err(LedgerError::NoResponse);
        }
        state
            .paid
            .remove(&(request.to_user_id, request.reference.clone()));
        state.refunds.push(request);
        Ok(Receipt {
            transaction_id: format!("refund-{}", state.refunds.len()),
        })
    }

    async fn check_paid(&self, user_id: uuid::Uuid, reference: &str) -> Result<bool, LedgerError> {
        Ok(lock(&self.state)
            .paid
            .contains(&(user_id, reference.to_string())))
    }
}

#[derive(Debug, Default)]
struct BusState {
    events: Vec<NotificationEvent>,
    members: HashSet<(uuid::Uuid, uuid::Uuid)>,
}

/// A bus that keeps every published event.
#[derive(Debug, Default)]
pub struct RecordingBus {
    state: Mutex<BusState>,
}

impl RecordingBus {
    pub fn events(&self, kind: EventKind) -> Vec<NotificationEvent> {
        lock(&self.state)
            .events
            .iter()
            .filter(|event| event.kind == kind)
            .cloned()
            .collect()
    }

    pub fn is_member(&self, user_id: uuid::Uuid, group_id: uuid::Uuid) -> bool {
        lock(&self.state).members.contains(&(user_id, group_id))
    }
}

impl NotificationBus for RecordingBus {
    fn publish(&self, event: NotificationEvent) {
        lock(&self.state).events.push(event);
    }

    fn subscribe_to_group(&self, user_id: uuid::Uuid, group_id: uuid::Uuid) {
        lock(&self.state).members.insert((user_id, group_id));
    }

    fn unsubscribe_from_group(&self, user_id: uuid::Uuid, group_id: uuid::Uuid) {
        lock(&self.state).members.remove(&(user_id, group_id));
    }
}

/// A directory where every user exists unless listed as unknown.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    unknown: Mutex<HashSet<uuid::Uuid>>,
    admins: Mutex<HashSet<(uuid::Uuid, uuid::Uuid)>>,
}

impl StaticDirectory {
    pub fn forget(&self, user_id: uuid::Uuid) {
        lock(&self.unknown).insert(user_id);
    }

    pub fn grant_admin(&self, user_id: uuid::Uuid, community_id: uuid::Uuid) {
        lock(&self.admins).insert((user_id, community_id));
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn is_admin(
        &self,
        user_id: uuid::Uuid,
        community_id: uuid::Uuid,
    ) -> Result<bool, DirectoryError> {
        Ok(lock(&self.admins).contains(&(user_id, community_id)))
    }

    async fn user_exists(&self, user_id: uuid::Uuid) -> Result<bool, DirectoryError> {
        Ok(!lock(&self.unknown).contains(&user_id))
    }
}

pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0)
        .single()
        .expect("valid time")
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// A wired engine over a memory store.
pub struct Harness {
    pub ctx: EngineContext,
    pub store: MemoryStore,
    pub ledger: Arc<FakeLedger>,
    pub bus: Arc<RecordingBus>,
    pub directory: Arc<StaticDirectory>,
    pub clock: Arc<ManualClock>,
    pub publisher_id: uuid::Uuid,
    pub community_id: uuid::Uuid,
}

impl Harness {
    pub fn new(now: DateTime<Utc>) -> Self {
        let store = MemoryStore::new();
        let ledger = Arc::new(FakeLedger::default());
        let bus = Arc::new(RecordingBus::default());
        let directory = Arc::new(StaticDirectory::default());
        let clock = Arc::new(ManualClock::new(now));
        let ctx = EngineContext {
            store: Arc::new(store.clone()),
            ledger: ledger.clone(),
            bus: bus.clone(),
            directory: directory.clone(),
            clock: clock.clone(),
            settings: EngineConfig::default(),
        };
        Self {
            ctx,
            store,
            ledger,
            bus,
            directory,
            clock,
            publisher_id: uuid::Uuid::now_v7(),
            community_id: uuid::Uuid::now_v7(),
        }
    }

    /// An unsaved one-hour occurrence in Berlin with free, unlimited terms.
    pub fn new_occurrence(&self, start_time: DateTime<Utc>) -> NewOccurrence {
        NewOccurrence {
            id: uuid::Uuid::now_v7(),
            group_id: None,
            template_id: None,
            publisher_id: self.publisher_id,
            community_id: self.community_id,
            title: "Evening climbing".to_string(),
            labels: vec!["sport".to_string()],
            start_time,
            end_time: start_time + TimeDelta::hours(1),
            timezone: "Europe/Berlin".to_string(),
            capacity_min: 0,
            capacity_max: None,
            payment_type: PaymentType::Free,
            payment_amount: 0,
            payment_currency: "USD".to_string(),
            location: None,
            propagation_pending: false,
        }
    }

    pub async fn occurrence(&self, new: NewOccurrence) -> Occurrence {
        self.store.create_occurrence(new).await.expect("occurrence stored")
    }

    /// A stored occurrence with the given capacity and payment terms.
    pub async fn occurrence_with(
        &self,
        start_time: DateTime<Utc>,
        capacity_max: Option<i32>,
        payment: (PaymentType, i64),
    ) -> Occurrence {
        let mut new = self.new_occurrence(start_time);
        new.capacity_max = capacity_max;
        new.payment_type = payment.0;
        new.payment_amount = payment.1;
        self.occurrence(new).await
    }

    pub fn new_group(&self, days: &RecurrenceDays) -> NewRecurrenceGroup {
        NewRecurrenceGroup {
            id: uuid::Uuid::now_v7(),
            publisher_id: self.publisher_id,
            community_id: self.community_id,
            period: Period::Weekly,
            days: days.to_json(),
            timezone: "Europe/Berlin".to_string(),
            active_from: None,
            active_until: None,
            template_id: None,
        }
    }

    pub async fn group(&self, days: &RecurrenceDays) -> RecurrenceGroup {
        self.store
            .create_group(self.new_group(days))
            .await
            .expect("group stored")
    }
}
