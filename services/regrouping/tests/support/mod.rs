//! 测试夹具：内存存储 + 一个养殖单元 + 规格目录 + 两个批次

#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use config::RegroupingConfig;
use domain_core::Entity;
use regrouping::application::{
    AttachSourcesCommand, CreateRegroupingCommand, DestinationSpec,
};
use regrouping::domain::entities::{
    Batch, Container, Cycle, MeasurementEvent, RearingUnit, Regrouping, SizeClass,
};
use regrouping::domain::enums::MeasurementKind;
use regrouping::domain::unit_of_work::UnitOfWorkFactory;
use regrouping::domain::value_objects::{
    BatchId, ContainerId, Destination, RowLabel, SampleInput, SlotPosition,
};
use regrouping::infrastructure::persistence::StoreState;
use regrouping::{InMemoryEventBus, InMemoryStore, ServiceHandler};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// 初始测量日期
pub fn stocking_date() -> NaiveDate {
    date(2024, 5, 1)
}

/// 重组日期
pub fn regrouping_date() -> NaiveDate {
    date(2024, 6, 1)
}

pub struct Farm {
    pub store: InMemoryStore,
    pub bus: InMemoryEventBus,
    pub handler: ServiceHandler,
    /// 4 个槽位：DX/1 DX/2 SX/1 SX/2
    pub unit: RearingUnit,
    pub small: SizeClass,
    pub medium: SizeClass,
    pub large: SizeClass,
    pub batch_a: Batch,
    pub batch_b: Batch,
}

impl Farm {
    pub async fn new() -> Self {
        Self::with_config(RegroupingConfig::default()).await
    }

    pub async fn with_config(config: RegroupingConfig) -> Self {
        let store = InMemoryStore::new();
        let bus = InMemoryEventBus::new();
        let handler = ServiceHandler::new(Arc::new(store.clone()), Arc::new(bus.clone()), config)
            .unwrap();

        let unit = RearingUnit::new("Line A", 4).unwrap();
        let small = SizeClass::new("S", 401.0, 600.0);
        let medium = SizeClass::new("M", 201.0, 400.0);
        let large = SizeClass::new("L", 50.0, 200.0);
        let batch_a = Batch::new("Hatchery North", date(2024, 1, 10), 100_000);
        let batch_b = Batch::new("Hatchery South", date(2024, 2, 5), 50_000);

        let uow = store.begin().await.unwrap();
        uow.units().insert(&unit).await.unwrap();
        for class in [&small, &medium, &large] {
            uow.size_classes().insert(class).await.unwrap();
        }
        uow.batches().insert(&batch_a).await.unwrap();
        uow.batches().insert(&batch_b).await.unwrap();
        uow.commit().await.unwrap();

        Self {
            store,
            bus,
            handler,
            unit,
            small,
            medium,
            large,
            batch_a,
            batch_b,
        }
    }

    pub fn pos(&self, row: &str, slot: u32) -> SlotPosition {
        SlotPosition::new(self.unit.id().clone(), RowLabel::new(row).unwrap(), slot)
    }

    /// 添加一个空闲容器
    pub async fn empty_container(&self, label: &str) -> Container {
        let container = Container::new(label).unwrap();
        let uow = self.store.begin().await.unwrap();
        uow.containers().insert(&container).await.unwrap();
        uow.commit().await.unwrap();
        container
    }

    /// 添加一个在养容器：开启周期并写入首次测量
    pub async fn stocked_container(
        &self,
        label: &str,
        position: Option<SlotPosition>,
        animal_count: i64,
        animals_per_kg: f64,
        batch_id: Option<&BatchId>,
    ) -> (Container, Cycle) {
        let mut container = Container::new(label).unwrap();
        let cycle = Cycle::open(container.id().clone(), stocking_date(), batch_id.cloned());
        container.activate(cycle.id().clone(), position).unwrap();

        let activation = MeasurementEvent::new(
            container.id().clone(),
            cycle.id().clone(),
            MeasurementKind::FirstActivation,
            stocking_date(),
        )
        .with_population(
            animal_count,
            Some(animal_count as f64 / animals_per_kg * 1000.0),
            Some(animals_per_kg),
        )
        .with_batch(batch_id.cloned());

        let uow = self.store.begin().await.unwrap();
        uow.containers().insert(&container).await.unwrap();
        uow.cycles().insert(&cycle).await.unwrap();
        uow.measurements().append(&activation).await.unwrap();
        uow.commit().await.unwrap();

        (container, cycle)
    }

    /// 创建草稿并登记来源
    pub async fn draft_with_sources(&self, sources: &[&Container]) -> Regrouping {
        let regrouping = self
            .handler
            .create_regrouping_draft(CreateRegroupingCommand::new(regrouping_date()))
            .await
            .unwrap();
        self.handler
            .attach_sources(AttachSourcesCommand {
                regrouping_id: regrouping.id().clone(),
                container_ids: sources.iter().map(|c| c.id().clone()).collect(),
            })
            .await
            .unwrap();
        regrouping
    }

    pub async fn state(&self) -> StoreState {
        self.store.snapshot().await
    }

    pub async fn container(&self, id: &ContainerId) -> Container {
        self.state().await.containers.get(id).cloned().unwrap()
    }
}

/// 100 g 样本里 30 只活体：300 只/kg
pub fn medium_sample() -> SampleInput {
    SampleInput::new(100.0, 30, 0)
}

pub fn placed(container: &Container, position: SlotPosition, total_weight_g: f64) -> DestinationSpec {
    DestinationSpec {
        container_id: container.id().clone(),
        destination: Destination::Placed(position),
        total_weight_g,
        sample: medium_sample(),
        notes: None,
    }
}

pub fn sold(container: &Container, total_weight_g: f64) -> DestinationSpec {
    DestinationSpec {
        container_id: container.id().clone(),
        destination: Destination::Sold,
        total_weight_g,
        sample: medium_sample(),
        notes: None,
    }
}
