//! 谱系仓储

use async_trait::async_trait;
use errors::AppResult;

use crate::domain::entities::{BatchReference, LedgerEntry, LineageEdge};
use crate::domain::value_objects::{CycleId, RegroupingId};

#[async_trait]
pub trait LineageRepository: Send + Sync {
    async fn record_edge(&self, edge: &LineageEdge) -> AppResult<()>;

    async fn record_batch_reference(&self, reference: &BatchReference) -> AppResult<()>;

    /// 幂等键重复时忽略，返回是否实际写入
    async fn record_ledger_entry(&self, entry: &LedgerEntry) -> AppResult<bool>;

    async fn edges_for_regrouping(&self, regrouping_id: &RegroupingId) -> AppResult<Vec<LineageEdge>>;

    /// 周期上记录过的批次组成
    async fn batch_references_for_cycle(&self, cycle_id: &CycleId) -> AppResult<Vec<BatchReference>>;

    async fn batch_references_for_regrouping(
        &self,
        regrouping_id: &RegroupingId,
    ) -> AppResult<Vec<BatchReference>>;

    async fn ledger_for_regrouping(&self, regrouping_id: &RegroupingId) -> AppResult<Vec<LedgerEntry>>;
}
