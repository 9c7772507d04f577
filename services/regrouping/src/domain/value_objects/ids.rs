//! 强类型 ID 定义

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From,
        )]
        #[display("{_0}")]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(common::new_id())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

define_id!(
    /// 养殖单元 ID
    UnitId
);
define_id!(
    /// 容器（篮）ID
    ContainerId
);
define_id!(
    /// 生产周期 ID
    CycleId
);
define_id!(
    /// 批次 ID
    BatchId
);
define_id!(
    /// 规格等级 ID
    SizeClassId
);
define_id!(
    /// 测量事件 ID
    MeasurementId
);
define_id!(
    /// 重组事件 ID
    RegroupingId
);
define_id!(
    /// 参与者（来源/目标）ID
    ParticipantId
);
define_id!(LedgerEntryId);
