//! 实体基础 trait

use common::{AuditInfo, UserId};

pub trait Entity {
    type Id;

    fn id(&self) -> &Self::Id;
}

/// 聚合根：一致性边界，内部实体只能经由聚合根修改
pub trait AggregateRoot: Entity {
    fn audit_info(&self) -> &AuditInfo;
    fn audit_info_mut(&mut self) -> &mut AuditInfo;

    /// 状态变更后刷新更新时间
    fn mark_modified(&mut self, by: Option<UserId>) {
        self.audit_info_mut().touch(by);
    }
}
