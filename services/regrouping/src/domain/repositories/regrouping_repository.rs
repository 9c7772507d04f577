//! 重组事件仓储

use async_trait::async_trait;
use errors::AppResult;

use crate::domain::entities::{DestinationParticipant, Regrouping, SourceParticipant};
use crate::domain::value_objects::{ParticipantId, RegroupingId};

/// 重组事件及其参与者
#[async_trait]
pub trait RegroupingRepository: Send + Sync {
    async fn insert(&self, regrouping: &Regrouping) -> AppResult<()>;

    async fn update(&self, regrouping: &Regrouping) -> AppResult<()>;

    async fn find_by_id(&self, id: &RegroupingId) -> AppResult<Option<Regrouping>>;

    /// 查询并锁定，直到工作单元结束
    async fn find_by_id_for_update(&self, id: &RegroupingId) -> AppResult<Option<Regrouping>>;

    // ========== 来源 ==========

    async fn insert_source(&self, source: &SourceParticipant) -> AppResult<()>;

    /// 按登记顺序
    async fn list_sources(&self, regrouping_id: &RegroupingId) -> AppResult<Vec<SourceParticipant>>;

    /// 返回是否删除了记录
    async fn delete_source(
        &self,
        regrouping_id: &RegroupingId,
        participant_id: &ParticipantId,
    ) -> AppResult<bool>;

    // ========== 目标 ==========

    async fn insert_destination(&self, destination: &DestinationParticipant) -> AppResult<()>;

    async fn update_destination(&self, destination: &DestinationParticipant) -> AppResult<()>;

    /// 按登记顺序
    async fn list_destinations(
        &self,
        regrouping_id: &RegroupingId,
    ) -> AppResult<Vec<DestinationParticipant>>;

    async fn delete_destination(
        &self,
        regrouping_id: &RegroupingId,
        participant_id: &ParticipantId,
    ) -> AppResult<bool>;
}
