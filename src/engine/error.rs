use thiserror::Error;

use crate::engine::types::AnomalyStatus;
use crate::store::StoreError;

/// Unit-level failures. None of these are retried inside the engine; the
/// worker wrapper decides whether to skip, retry or alert per session.
#[derive(Debug, Error)]
pub enum EngineError {
    /// 事件乱序/重复/时长为负，整批拒绝，不做部分恢复
    #[error("malformed event batch for session {session_id}: {detail}")]
    MalformedEvent { session_id: String, detail: String },

    #[error("illegal anomaly transition: {from:?} -> {to:?}")]
    InvalidTransition { from: AnomalyStatus, to: AnomalyStatus },

    /// effective + invalid != total 说明分类器自身有缺陷，必须中止本单元
    #[error("duration invariant violated for session {session_id}: effective={effective} invalid={invalid} total={total}")]
    InvariantViolation {
        session_id: String,
        effective: f64,
        invalid: f64,
        total: f64,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
