//! 批次台账条目类型

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    /// 从来源容器转出
    TransferOut,
    /// 转入目标容器
    TransferIn,
    /// 售出
    Sale,
    /// 来源与目标之差
    Mortality,
}

text_enum!(LedgerKind {
    TransferOut => "transfer_out",
    TransferIn => "transfer_in",
    Sale => "sale",
    Mortality => "mortality",
});
