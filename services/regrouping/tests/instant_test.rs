//! 即时分选测试

mod support;

use support::*;
use domain_core::Entity;
use errors::AppError;
use regrouping::application::{
    CreateRegroupingCommand, ExecuteInstantRegroupingCommand, InstantDestinationSpec,
    PreviewInstantRegroupingQuery,
};
use regrouping::domain::entities::Container;
use regrouping::domain::enums::{CycleState, MeasurementKind, RegroupingKind, RegroupingStatus};
use regrouping::domain::value_objects::{Destination, SampleInput, SlotPosition};

/// 100 g 样本：48 只活、2 只死 → 480 只/kg，死亡率 4%
fn screening_sample() -> SampleInput {
    SampleInput::new(100.0, 48, 2)
}

fn placed_at(container: &Container, position: SlotPosition, total_weight_g: f64) -> InstantDestinationSpec {
    InstantDestinationSpec {
        container_id: container.id().clone(),
        destination: Destination::Placed(position),
        total_weight_g,
        animal_count: None,
        notes: None,
    }
}

#[tokio::test]
async fn test_preview_computes_without_writing() {
    let farm = Farm::new().await;
    let (a1, _) = farm
        .stocked_container("A1", Some(farm.pos("DX", 1)), 10_000, 450.0, Some(&farm.batch_a.id))
        .await;
    let (a2, _) = farm
        .stocked_container("A2", Some(farm.pos("DX", 2)), 8_000, 450.0, Some(&farm.batch_b.id))
        .await;
    farm.empty_container("B2").await;
    farm.empty_container("B1").await;
    let before = farm.state().await;

    let preview = farm
        .handler
        .preview_instant_regrouping(PreviewInstantRegroupingQuery {
            source_container_ids: vec![a1.id().clone(), a2.id().clone()],
            sample: screening_sample(),
            date: None,
        })
        .await
        .unwrap();

    assert_eq!(preview.total_animals, 18_000);
    assert_eq!(preview.sources.len(), 2);
    assert!((preview.sample.animals_per_kg - 480.0).abs() < 1e-9);
    assert_eq!(preview.sample.mortality_rate_percent, Some(4.0));
    assert_eq!(preview.size_class.as_ref().map(|c| c.code.as_str()), Some("S"));

    // 来源所占槽位视为空闲
    assert_eq!(preview.available_positions.len(), 4);
    assert_eq!(preview.available_positions[0].position, farm.pos("DX", 1));

    let labels: Vec<&str> = preview.suggested_destinations.iter().map(|c| c.label()).collect();
    assert_eq!(labels, vec!["B1", "B2"]);

    let after = farm.state().await;
    assert_eq!(after.measurements.len(), before.measurements.len());
    assert!(after.regroupings.is_empty());
    assert!(after.sequences.is_empty());
}

#[tokio::test]
async fn test_preview_rejects_duplicate_sources() {
    let farm = Farm::new().await;
    let (a1, _) = farm
        .stocked_container("A1", Some(farm.pos("DX", 1)), 1000, 450.0, None)
        .await;

    let err = farm
        .handler
        .preview_instant_regrouping(PreviewInstantRegroupingQuery {
            source_container_ids: vec![a1.id().clone(), a1.id().clone()],
            sample: screening_sample(),
            date: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_two_sources_into_one_placed_destination() {
    let farm = Farm::new().await;
    let (a1, a1_cycle) = farm
        .stocked_container("A1", Some(farm.pos("DX", 1)), 10_000, 450.0, Some(&farm.batch_a.id))
        .await;
    let (a2, a2_cycle) = farm
        .stocked_container("A2", Some(farm.pos("DX", 2)), 8_000, 450.0, Some(&farm.batch_b.id))
        .await;
    let b1 = farm.empty_container("B1").await;

    let outcome = farm
        .handler
        .execute_instant_regrouping(ExecuteInstantRegroupingCommand {
            source_container_ids: vec![a1.id().clone(), a2.id().clone()],
            destinations: vec![placed_at(&b1, farm.pos("SX", 1), 20_000.0)],
            sample: screening_sample(),
            date: regrouping_date(),
            notes: None,
        })
        .await
        .unwrap();

    // round(20000 / (1000 / 480)) = 9600
    assert_eq!(outcome.destinations[0].animal_count, 9_600);
    assert_eq!(outcome.size_class_id.as_ref(), Some(&farm.small.id));
    assert_eq!(outcome.sample.mortality_rate_percent, Some(4.0));
    assert_eq!(outcome.mass_balance.source_total, 18_000);
    assert_eq!(outcome.mass_balance.mortality_loss, 8_400);
    assert_eq!(outcome.regrouping.kind(), RegroupingKind::Instant);
    assert_eq!(outcome.regrouping.status(), RegroupingStatus::Completed);

    // 目标沿用起始来源的周期
    assert_eq!(&outcome.cycle_id, a1_cycle.id());
    assert_eq!(outcome.destinations[0].cycle_id.as_ref(), Some(a1_cycle.id()));

    let state = farm.state().await;
    for source in [&a1, &a2] {
        let stored = &state.containers[source.id()];
        assert!(!stored.is_active());
        assert!(stored.placement().is_none());
    }
    assert_eq!(state.cycles[a2_cycle.id()].state(), CycleState::Closed);

    let shared = &state.cycles[a1_cycle.id()];
    assert!(shared.is_active());
    assert_eq!(shared.container_id(), b1.id());

    let b1_stored = &state.containers[b1.id()];
    assert!(b1_stored.is_active());
    assert_eq!(b1_stored.placement(), Some(&farm.pos("SX", 1)));
    assert_eq!(b1_stored.current_cycle_id(), Some(a1_cycle.id()));

    // 每个来源一条分选测量，目标一条
    let screenings = state
        .measurements
        .iter()
        .filter(|m| m.kind == MeasurementKind::Screening)
        .count();
    assert_eq!(screenings, 3);
    assert_eq!(state.edges.len(), 2);

    assert_eq!(farm.bus.events_for("regrouping_completed").await.len(), 1);
}

#[tokio::test]
async fn test_source_refilled_in_place_and_sale() {
    let farm = Farm::new().await;
    let (a1, a1_cycle) = farm
        .stocked_container("A1", Some(farm.pos("DX", 1)), 1_000, 450.0, Some(&farm.batch_a.id))
        .await;
    let b2 = farm.empty_container("B2").await;

    let outcome = farm
        .handler
        .execute_instant_regrouping(ExecuteInstantRegroupingCommand {
            source_container_ids: vec![a1.id().clone()],
            destinations: vec![
                InstantDestinationSpec {
                    container_id: a1.id().clone(),
                    destination: Destination::Placed(farm.pos("DX", 1)),
                    total_weight_g: 1_250.0,
                    animal_count: Some(600),
                    notes: Some("Kept in place".to_string()),
                },
                InstantDestinationSpec {
                    container_id: b2.id().clone(),
                    destination: Destination::Sold,
                    total_weight_g: 800.0,
                    animal_count: Some(380),
                    notes: None,
                },
            ],
            sample: screening_sample(),
            date: regrouping_date(),
            notes: None,
        })
        .await
        .unwrap();
    assert_eq!(outcome.mass_balance.destination_total, 980);
    assert_eq!(outcome.mass_balance.mortality_loss, 20);

    let state = farm.state().await;
    let a1_stored = &state.containers[a1.id()];
    assert!(a1_stored.is_active());
    assert_eq!(a1_stored.placement(), Some(&farm.pos("DX", 1)));
    assert_eq!(a1_stored.current_cycle_id(), Some(a1_cycle.id()));
    assert!(state.cycles[a1_cycle.id()].is_active());

    // 售出的容器不占位
    assert!(!state.containers[b2.id()].is_active());
    assert!(state
        .measurements
        .iter()
        .any(|m| &m.container_id == b2.id() && m.kind == MeasurementKind::Sale));

    // 后续分选读到的是该容器自己的最新数量
    let preview = farm
        .handler
        .preview_instant_regrouping(PreviewInstantRegroupingQuery {
            source_container_ids: vec![a1.id().clone()],
            sample: screening_sample(),
            date: None,
        })
        .await
        .unwrap();
    assert_eq!(preview.total_animals, 600);
}

#[tokio::test]
async fn test_all_sold_closes_shared_cycle() {
    let farm = Farm::new().await;
    let (a1, a1_cycle) = farm
        .stocked_container("A1", Some(farm.pos("DX", 1)), 500, 450.0, Some(&farm.batch_a.id))
        .await;
    let b1 = farm.empty_container("B1").await;

    farm.handler
        .execute_instant_regrouping(ExecuteInstantRegroupingCommand {
            source_container_ids: vec![a1.id().clone()],
            destinations: vec![InstantDestinationSpec {
                container_id: b1.id().clone(),
                destination: Destination::Sold,
                total_weight_g: 1_000.0,
                animal_count: None,
                notes: None,
            }],
            sample: screening_sample(),
            date: regrouping_date(),
            notes: None,
        })
        .await
        .unwrap();

    let state = farm.state().await;
    assert_eq!(state.cycles[a1_cycle.id()].state(), CycleState::Closed);
    assert!(!state.containers[a1.id()].is_active());
    assert!(!state.containers[b1.id()].is_active());
}

#[tokio::test]
async fn test_active_outsider_destination_is_conflict() {
    let farm = Farm::new().await;
    let (a1, a1_cycle) = farm
        .stocked_container("A1", Some(farm.pos("DX", 1)), 1_000, 450.0, None)
        .await;
    let (busy, _) = farm.stocked_container("C1", None, 100, 450.0, None).await;

    let err = farm
        .handler
        .execute_instant_regrouping(ExecuteInstantRegroupingCommand {
            source_container_ids: vec![a1.id().clone()],
            destinations: vec![placed_at(&busy, farm.pos("SX", 1), 1_000.0)],
            sample: screening_sample(),
            date: regrouping_date(),
            notes: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let state = farm.state().await;
    assert!(state.cycles[a1_cycle.id()].is_active());
    assert!(state.regroupings.is_empty());
}

#[tokio::test]
async fn test_source_already_regrouped_is_conflict() {
    let farm = Farm::new().await;
    let (a1, _) = farm
        .stocked_container("A1", Some(farm.pos("DX", 1)), 1_000, 450.0, None)
        .await;
    let b1 = farm.empty_container("B1").await;
    let b2 = farm.empty_container("B2").await;
    let never_stocked = farm.empty_container("E1").await;

    farm.handler
        .execute_instant_regrouping(ExecuteInstantRegroupingCommand {
            source_container_ids: vec![a1.id().clone()],
            destinations: vec![placed_at(&b1, farm.pos("SX", 1), 1_000.0)],
            sample: screening_sample(),
            date: regrouping_date(),
            notes: None,
        })
        .await
        .unwrap();

    // A1 已被上一次分选腾出：同一来源的第二次操作是冲突
    let err = farm
        .handler
        .execute_instant_regrouping(ExecuteInstantRegroupingCommand {
            source_container_ids: vec![a1.id().clone()],
            destinations: vec![placed_at(&b2, farm.pos("SX", 2), 1_000.0)],
            sample: screening_sample(),
            date: regrouping_date(),
            notes: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "got {err:?}");

    // 从未在养的容器仍是校验错误
    let err = farm
        .handler
        .execute_instant_regrouping(ExecuteInstantRegroupingCommand {
            source_container_ids: vec![never_stocked.id().clone()],
            destinations: vec![placed_at(&b2, farm.pos("SX", 2), 1_000.0)],
            sample: screening_sample(),
            date: regrouping_date(),
            notes: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)), "got {err:?}");
    assert_eq!(farm.state().await.regroupings.len(), 1);
}

#[tokio::test]
async fn test_oversized_destination_counts_are_rejected() {
    let farm = Farm::new().await;
    let (a1, a1_cycle) = farm
        .stocked_container("A1", Some(farm.pos("DX", 1)), 1_000, 450.0, None)
        .await;
    let b1 = farm.empty_container("B1").await;
    let b2 = farm.empty_container("B2").await;

    let huge = |container: &Container| InstantDestinationSpec {
        container_id: container.id().clone(),
        destination: Destination::Sold,
        total_weight_g: 1_000.0,
        animal_count: Some(i64::MAX / 2 + 1),
        notes: None,
    };

    let err = farm
        .handler
        .execute_instant_regrouping(ExecuteInstantRegroupingCommand {
            source_container_ids: vec![a1.id().clone()],
            destinations: vec![huge(&b1), huge(&b2)],
            sample: screening_sample(),
            date: regrouping_date(),
            notes: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)), "got {err:?}");

    let state = farm.state().await;
    assert!(state.cycles[a1_cycle.id()].is_active());
    assert!(state.regroupings.is_empty());
}

#[tokio::test]
async fn test_failed_claim_rolls_back_number_and_sources() {
    let farm = Farm::new().await;
    let (a1, a1_cycle) = farm
        .stocked_container("A1", Some(farm.pos("DX", 1)), 1_000, 450.0, Some(&farm.batch_a.id))
        .await;
    farm.stocked_container("C9", Some(farm.pos("SX", 2)), 200, 450.0, None)
        .await;
    let b1 = farm.empty_container("B1").await;
    let measurements_before = farm.state().await.measurements.len();

    // 槽位 SX/2 被非来源容器占用：占位时失败，此前的写入全部撤销
    let err = farm
        .handler
        .execute_instant_regrouping(ExecuteInstantRegroupingCommand {
            source_container_ids: vec![a1.id().clone()],
            destinations: vec![placed_at(&b1, farm.pos("SX", 2), 1_000.0)],
            sample: screening_sample(),
            date: regrouping_date(),
            notes: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let state = farm.state().await;
    assert!(state.regroupings.is_empty());
    assert!(state.sources.is_empty());
    assert_eq!(state.measurements.len(), measurements_before);
    assert!(state.cycles[a1_cycle.id()].is_active());
    assert_eq!(state.containers[a1.id()].placement(), Some(&farm.pos("DX", 1)));
    assert!(farm.bus.get_events().await.is_empty());

    // 编号未被消耗
    let draft = farm
        .handler
        .create_regrouping_draft(CreateRegroupingCommand::new(regrouping_date()))
        .await
        .unwrap();
    assert_eq!(draft.number(), 1);
}

#[tokio::test]
async fn test_retired_destination_is_rejected() {
    let farm = Farm::new().await;
    let (a1, _) = farm
        .stocked_container("A1", Some(farm.pos("DX", 1)), 1_000, 450.0, None)
        .await;

    let mut retired = Container::new("R1").unwrap();
    retired.retire();
    {
        use regrouping::domain::unit_of_work::UnitOfWorkFactory;
        let uow = farm.store.begin().await.unwrap();
        uow.containers().insert(&retired).await.unwrap();
        uow.commit().await.unwrap();
    }

    let err = farm
        .handler
        .execute_instant_regrouping(ExecuteInstantRegroupingCommand {
            source_container_ids: vec![a1.id().clone()],
            destinations: vec![placed_at(&retired, farm.pos("SX", 1), 1_000.0)],
            sample: screening_sample(),
            date: regrouping_date(),
            notes: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_invalid_sample_is_rejected_before_any_read() {
    let farm = Farm::new().await;
    let (a1, _) = farm
        .stocked_container("A1", Some(farm.pos("DX", 1)), 1_000, 450.0, None)
        .await;
    let b1 = farm.empty_container("B1").await;

    let err = farm
        .handler
        .execute_instant_regrouping(ExecuteInstantRegroupingCommand {
            source_container_ids: vec![a1.id().clone()],
            destinations: vec![placed_at(&b1, farm.pos("SX", 1), 1_000.0)],
            sample: SampleInput::new(100.0, 0, 5),
            date: regrouping_date(),
            notes: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_shared_cycle_survives_partial_regrouping() {
    use regrouping::application::{AttachDestinationsCommand, CompleteRegroupingCommand};

    let farm = Farm::new().await;
    let (a1, a1_cycle) = farm
        .stocked_container("A1", Some(farm.pos("DX", 1)), 1_000, 450.0, None)
        .await;
    let b1 = farm.empty_container("B1").await;
    let b2 = farm.empty_container("B2").await;
    let c1 = farm.empty_container("C1").await;

    // B1 与 B2 共用 A1 的周期，周期记在 B1 上
    farm.handler
        .execute_instant_regrouping(ExecuteInstantRegroupingCommand {
            source_container_ids: vec![a1.id().clone()],
            destinations: vec![
                placed_at(&b1, farm.pos("SX", 1), 1_000.0),
                placed_at(&b2, farm.pos("SX", 2), 1_000.0),
            ],
            sample: screening_sample(),
            date: regrouping_date(),
            notes: None,
        })
        .await
        .unwrap();
    assert_eq!(farm.state().await.cycles[a1_cycle.id()].container_id(), b1.id());

    // 之后只把 B1 分出去：共用周期移交给 B2，而不是关闭
    let later = date(2024, 6, 15);
    let draft = farm
        .handler
        .create_regrouping_draft(CreateRegroupingCommand::new(later))
        .await
        .unwrap();
    farm.handler
        .attach_sources(regrouping::application::AttachSourcesCommand {
            regrouping_id: draft.id().clone(),
            container_ids: vec![b1.id().clone()],
        })
        .await
        .unwrap();
    farm.handler
        .attach_destinations(AttachDestinationsCommand {
            regrouping_id: draft.id().clone(),
            destinations: vec![placed(&c1, farm.pos("SX", 1), 1_000.0)],
        })
        .await
        .unwrap();
    farm.handler
        .complete_regrouping(CompleteRegroupingCommand {
            regrouping_id: draft.id().clone(),
        })
        .await
        .unwrap();

    let state = farm.state().await;
    let shared = &state.cycles[a1_cycle.id()];
    assert!(shared.is_active());
    assert_eq!(shared.container_id(), b2.id());
    assert!(state.containers[b2.id()].is_active());
    assert!(!state.containers[b1.id()].is_active());
    assert!(state.containers[c1.id()].is_active());
}
