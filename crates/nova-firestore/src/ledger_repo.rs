//! Typed access to user ledger documents.
//!
//! One document per user in the `users` collection holds the balance, the
//! plan, the entitlement set, and the most recent generation outcome. This
//! module owns the field encoding in both directions and wraps the
//! optimistic transaction loop so billing code works with [`UserLedger`]
//! values instead of raw field maps.
//!
//! Stored timestamps are decoded tolerantly: documents written over the
//! years carry epoch numbers (seconds or milliseconds), RFC 3339 strings,
//! or structured `{seconds, nanos}` maps, and all of them must read back
//! as the same instant. Writes always produce native timestamp values.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nova_models::{
    CreationStatus, Entitlements, LastResult, PlanTier, StoredInstant, UserLedger,
};

use crate::error::FirestoreResult;
use crate::store::{transact, DocumentStore, TxnDecision, TxnError, TxnOptions};
use crate::types::{ToFirestoreValue, Value};

/// Collection holding one ledger document per user.
pub const USERS_COLLECTION: &str = "users";

/// Fields a billing transaction writes. `lastResult`, `createdAt`, and the
/// client-owned `notifyGenerationDone` stay outside the mask, so a commit
/// can never clobber a concurrent status merge, the creation stamp, or a
/// preference toggle.
const BILLING_MASK: [&str; 7] = [
    "credits",
    "plan",
    "planUntil",
    "planPeriod",
    "trialCreditsGranted",
    "entitlements",
    "updatedAt",
];

fn billing_mask() -> Vec<String> {
    BILLING_MASK.iter().map(|s| s.to_string()).collect()
}

// =============================================================================
// Field Codec
// =============================================================================

/// Decode a stored timestamp of any historical shape.
pub fn decode_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::TimestampValue(s) | Value::StringValue(s) => {
            StoredInstant::Iso(s.clone()).to_datetime()
        }
        Value::IntegerValue(s) => s
            .parse::<f64>()
            .ok()
            .and_then(|n| StoredInstant::Epoch(n).to_datetime()),
        Value::DoubleValue(n) => StoredInstant::Epoch(*n).to_datetime(),
        Value::MapValue(map) => {
            let fields = map.fields.as_ref()?;
            let seconds = fields
                .get("seconds")
                .or_else(|| fields.get("_seconds"))
                .and_then(decode_i64)?;
            let nanoseconds = fields
                .get("nanoseconds")
                .or_else(|| fields.get("nanos"))
                .or_else(|| fields.get("_nanoseconds"))
                .and_then(decode_i64)
                .unwrap_or(0) as u32;
            StoredInstant::Structured {
                seconds,
                nanoseconds,
            }
            .to_datetime()
        }
        _ => None,
    }
}

fn decode_i64(value: &Value) -> Option<i64> {
    match value {
        Value::IntegerValue(s) => s.parse().ok(),
        Value::DoubleValue(n) => Some(*n as i64),
        _ => None,
    }
}

fn decode_str(value: &Value) -> Option<String> {
    match value {
        Value::StringValue(s) => Some(s.clone()),
        _ => None,
    }
}

fn decode_bool(value: &Value) -> Option<bool> {
    match value {
        Value::BooleanValue(b) => Some(*b),
        _ => None,
    }
}

fn encode_instant(instant: Option<DateTime<Utc>>) -> Value {
    match instant {
        Some(dt) => dt.to_firestore_value(),
        None => Value::NullValue(()),
    }
}

fn encode_opt_str(value: &Option<String>) -> Value {
    match value {
        Some(s) => s.to_firestore_value(),
        None => Value::NullValue(()),
    }
}

/// Decode a ledger from stored fields, defaulting anything absent or
/// malformed to the minimal-record shape.
pub fn parse_ledger(fields: &HashMap<String, Value>) -> UserLedger {
    let get_instant = |key: &str| fields.get(key).and_then(decode_instant);
    let get_str = |key: &str| fields.get(key).and_then(decode_str);

    let entitlements = fields
        .get("entitlements")
        .and_then(|v| match v {
            Value::MapValue(m) => m.fields.as_ref(),
            _ => None,
        })
        .map(parse_entitlements)
        .unwrap_or_default();

    let last_result = fields
        .get("lastResult")
        .and_then(|v| match v {
            Value::MapValue(m) => m.fields.as_ref(),
            _ => None,
        })
        .and_then(parse_last_result);

    UserLedger {
        credits: fields.get("credits").and_then(decode_i64).unwrap_or(0),
        plan: get_str("plan")
            .map(|s| PlanTier::from_str(&s))
            .unwrap_or(PlanTier::Free),
        plan_until: get_instant("planUntil"),
        plan_period: get_str("planPeriod"),
        trial_credits_granted: fields
            .get("trialCreditsGranted")
            .and_then(decode_bool)
            .unwrap_or(false),
        entitlements,
        last_result,
        notify_generation_done: fields
            .get("notifyGenerationDone")
            .and_then(decode_bool)
            .unwrap_or(true),
        created_at: get_instant("createdAt").unwrap_or_else(Utc::now),
        updated_at: get_instant("updatedAt").unwrap_or_else(Utc::now),
    }
}

fn parse_entitlements(fields: &HashMap<String, Value>) -> Entitlements {
    let get_instant = |key: &str| fields.get(key).and_then(decode_instant);

    let packs_owned: BTreeSet<String> = fields
        .get("packsOwned")
        .and_then(|v| match v {
            Value::ArrayValue(arr) => arr.values.as_ref(),
            _ => None,
        })
        .map(|values| values.iter().filter_map(decode_str).collect())
        .unwrap_or_default();

    Entitlements {
        no_watermark_until: get_instant("noWatermarkUntil"),
        ad_free_until: get_instant("adFreeUntil"),
        templates_until: get_instant("templatesUntil"),
        pro_prompt_until: get_instant("proPromptUntil"),
        prompt_builder_until: get_instant("promptBuilderUntil"),
        packs_owned,
    }
}

fn parse_last_result(fields: &HashMap<String, Value>) -> Option<LastResult> {
    let creation_id = fields.get("creationId").and_then(decode_str)?;
    Some(LastResult {
        creation_id,
        status: fields
            .get("status")
            .and_then(decode_str)
            .and_then(|s| CreationStatus::from_str(&s))
            .unwrap_or(CreationStatus::Pending),
        url: fields.get("url").and_then(decode_str),
        error: fields.get("error").and_then(decode_str),
        seen_by_user: fields
            .get("seenByUser")
            .and_then(decode_bool)
            .unwrap_or(false),
        updated_at: fields
            .get("updatedAt")
            .and_then(decode_instant)
            .unwrap_or_else(Utc::now),
    })
}

/// Encode a ledger to stored fields. Cleared instants become explicit
/// nulls so the document shape stays stable across sweeps.
pub fn ledger_to_fields(ledger: &UserLedger) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("credits".to_string(), ledger.credits.to_firestore_value());
    fields.insert("plan".to_string(), ledger.plan.as_str().to_firestore_value());
    fields.insert("planUntil".to_string(), encode_instant(ledger.plan_until));
    fields.insert("planPeriod".to_string(), encode_opt_str(&ledger.plan_period));
    fields.insert(
        "trialCreditsGranted".to_string(),
        ledger.trial_credits_granted.to_firestore_value(),
    );
    fields.insert(
        "entitlements".to_string(),
        entitlements_to_value(&ledger.entitlements),
    );
    if let Some(last) = &ledger.last_result {
        fields.insert("lastResult".to_string(), last_result_to_value(last));
    }
    fields.insert(
        "notifyGenerationDone".to_string(),
        ledger.notify_generation_done.to_firestore_value(),
    );
    fields.insert(
        "createdAt".to_string(),
        ledger.created_at.to_firestore_value(),
    );
    fields.insert(
        "updatedAt".to_string(),
        ledger.updated_at.to_firestore_value(),
    );
    fields
}

fn entitlements_to_value(entitlements: &Entitlements) -> Value {
    let mut fields = HashMap::new();
    fields.insert(
        "noWatermarkUntil".to_string(),
        encode_instant(entitlements.no_watermark_until),
    );
    fields.insert(
        "adFreeUntil".to_string(),
        encode_instant(entitlements.ad_free_until),
    );
    fields.insert(
        "templatesUntil".to_string(),
        encode_instant(entitlements.templates_until),
    );
    fields.insert(
        "proPromptUntil".to_string(),
        encode_instant(entitlements.pro_prompt_until),
    );
    fields.insert(
        "promptBuilderUntil".to_string(),
        encode_instant(entitlements.prompt_builder_until),
    );
    fields.insert(
        "packsOwned".to_string(),
        Value::array(
            entitlements
                .packs_owned
                .iter()
                .map(|p| p.to_firestore_value())
                .collect(),
        ),
    );
    Value::map(fields)
}

pub(crate) fn last_result_to_value(last: &LastResult) -> Value {
    let mut fields = HashMap::new();
    fields.insert(
        "creationId".to_string(),
        last.creation_id.to_firestore_value(),
    );
    fields.insert(
        "status".to_string(),
        last.status.as_str().to_firestore_value(),
    );
    fields.insert("url".to_string(), encode_opt_str(&last.url));
    fields.insert("error".to_string(), encode_opt_str(&last.error));
    fields.insert(
        "seenByUser".to_string(),
        last.seen_by_user.to_firestore_value(),
    );
    fields.insert(
        "updatedAt".to_string(),
        last.updated_at.to_firestore_value(),
    );
    Value::map(fields)
}

// =============================================================================
// Repository
// =============================================================================

/// Outcome of one ledger decision pass.
#[derive(Debug)]
pub enum LedgerDecision<T, E> {
    /// Persist `ledger` and return `value` once the commit sticks.
    Commit { ledger: UserLedger, value: T },
    /// Nothing to persist.
    ReadOnly(T),
    /// Domain rejection, never retried.
    Abort(E),
}

/// Repository for user ledger documents.
#[derive(Clone)]
pub struct LedgerRepository {
    store: Arc<dyn DocumentStore>,
    options: TxnOptions,
}

impl LedgerRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            options: TxnOptions::default(),
        }
    }

    pub fn with_options(store: Arc<dyn DocumentStore>, options: TxnOptions) -> Self {
        Self { store, options }
    }

    /// Read a ledger without transacting.
    pub async fn get(&self, uid: &str) -> FirestoreResult<Option<UserLedger>> {
        let snap = self.store.get(USERS_COLLECTION, uid).await?;
        Ok(snap.map(|s| parse_ledger(&s.fields)))
    }

    /// Run a ledger transaction.
    ///
    /// `decide` sees the current ledger (or `None` for a new user) and
    /// returns what to do; it can run more than once after lost commit
    /// races, so it must stay effect-free. A commit on an absent document
    /// creates the full record; on an existing one it patches only the
    /// billing fields, leaving `lastResult` and `createdAt` alone.
    pub async fn transact_ledger<T, E, F>(
        &self,
        uid: &str,
        now: DateTime<Utc>,
        mut decide: F,
    ) -> Result<T, TxnError<E>>
    where
        F: FnMut(Option<&UserLedger>) -> LedgerDecision<T, E>,
    {
        transact(
            self.store.as_ref(),
            USERS_COLLECTION,
            uid,
            &self.options,
            |snapshot| {
                let existing = snapshot.map(|s| parse_ledger(&s.fields));
                match decide(existing.as_ref()) {
                    LedgerDecision::ReadOnly(value) => TxnDecision::ReadOnly(value),
                    LedgerDecision::Abort(e) => TxnDecision::Abort(e),
                    LedgerDecision::Commit { mut ledger, value } => {
                        ledger.updated_at = now;
                        let mut fields = ledger_to_fields(&ledger);
                        if snapshot.is_none() {
                            TxnDecision::Commit {
                                fields,
                                mask: None,
                                value,
                            }
                        } else {
                            fields.remove("createdAt");
                            fields.remove("lastResult");
                            fields.remove("notifyGenerationDone");
                            TxnDecision::Commit {
                                fields,
                                mask: Some(billing_mask()),
                                value,
                            }
                        }
                    }
                }
            },
        )
        .await
    }

    /// Merge the latest generation outcome into the ledger.
    ///
    /// Plain merge outside the billing mask: the finalizer reports status
    /// without contending with balance transactions. The ledger must
    /// already exist, which it does for anyone who was charged.
    pub async fn merge_last_result(
        &self,
        uid: &str,
        last: &LastResult,
        now: DateTime<Utc>,
    ) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("lastResult".to_string(), last_result_to_value(last));
        fields.insert("updatedAt".to_string(), now.to_firestore_value());
        self.store
            .patch(
                USERS_COLLECTION,
                uid,
                fields,
                Some(vec!["lastResult".to_string(), "updatedAt".to_string()]),
                None,
            )
            .await?;
        Ok(())
    }

    /// Mark the stored last result as seen. Returns `false` when there is
    /// nothing to mark.
    pub async fn mark_last_result_seen(
        &self,
        uid: &str,
        now: DateTime<Utc>,
    ) -> FirestoreResult<bool> {
        let Some(snap) = self.store.get(USERS_COLLECTION, uid).await? else {
            return Ok(false);
        };
        let ledger = parse_ledger(&snap.fields);
        let Some(mut last) = ledger.last_result else {
            return Ok(false);
        };
        if last.seen_by_user {
            return Ok(true);
        }
        last.seen_by_user = true;
        self.merge_last_result(uid, &last, now).await?;
        Ok(true)
    }
}
