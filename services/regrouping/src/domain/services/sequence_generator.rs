//! 重组编号生成

use errors::{AppError, AppResult};

use crate::domain::unit_of_work::UnitOfWork;

/// 基于存储原子计数器的编号生成器
///
/// 编号在调用方的工作单元内分配：工作单元回滚时编号一并撤销，因此不会留下空号。
#[derive(Debug, Clone)]
pub struct SequenceGenerator {
    name: String,
}

impl SequenceGenerator {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn next(&self, uow: &dyn UnitOfWork) -> AppResult<i64> {
        let value = uow.sequences().next_value(&self.name).await?;
        if value <= 0 {
            return Err(AppError::internal(format!(
                "Sequence {} returned non-positive value {}",
                self.name, value
            )));
        }
        Ok(value)
    }
}
