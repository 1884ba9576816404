//! Audit records. Every committed mutation writes one in the same sled
//! transaction, so the trail can never lag the data. Before/after snapshots
//! are stored as the row's CBOR together with a sha256 digest of those bytes.

use crate::error::EngineError;
use crate::store;
use crate::time::TimeStamp;
use chrono::Utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
#[cbor(index_only)]
pub enum EntityKind {
    #[n(0)]
    LeaveRequest,
    #[n(1)]
    LeaveBalance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
#[cbor(index_only)]
pub enum AuditAction {
    #[n(0)]
    RequestCreate,
    #[n(1)]
    RequestApproveL1,
    #[n(2)]
    RequestApprove,
    #[n(3)]
    RequestApproveL2,
    #[n(4)]
    RequestReject,
    #[n(5)]
    RequestCancel,
    #[n(6)]
    BalanceGrant,
    #[n(7)]
    BalanceConsume,
    #[n(8)]
    BalanceRestore,
}

#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct AuditRecord {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub entity: EntityKind,
    #[n(2)]
    pub entity_id: String,
    #[n(3)]
    pub action: AuditAction,
    #[n(4)]
    pub before: Option<Vec<u8>>,
    #[n(5)]
    pub before_digest: Option<String>,
    #[n(6)]
    pub after: Option<Vec<u8>>,
    #[n(7)]
    pub after_digest: Option<String>,
    #[n(8)]
    pub actor_id: String,
    #[n(9)]
    pub reason: Option<String>,
    #[n(10)]
    pub at: TimeStamp<Utc>,
}

impl AuditRecord {
    /// Snapshot both sides of a mutation. `before`/`after` are the full rows;
    /// create passes no before, and nothing here passes no after.
    pub fn record<T: minicbor::Encode<()>>(
        id: &str,
        entity: EntityKind,
        entity_id: &str,
        action: AuditAction,
        before: Option<&T>,
        after: Option<&T>,
        actor_id: &str,
        reason: Option<&str>,
        at: TimeStamp<Utc>,
    ) -> Result<Self, EngineError> {
        let before = before.map(store::encode).transpose()?;
        let after = after.map(store::encode).transpose()?;
        let before_digest = before.as_ref().map(sha256::digest);
        let after_digest = after.as_ref().map(sha256::digest);

        Ok(Self {
            id: id.to_string(),
            entity,
            entity_id: entity_id.to_string(),
            action,
            before,
            before_digest,
            after,
            after_digest,
            actor_id: actor_id.to_string(),
            reason: reason.map(str::to_string),
            at,
        })
    }

    /// Decode a snapshot back into its row type.
    pub fn decode_after<T: for<'b> minicbor::Decode<'b, ()>>(
        &self,
    ) -> Result<Option<T>, EngineError> {
        self.after.as_deref().map(store::decode).transpose()
    }
}
