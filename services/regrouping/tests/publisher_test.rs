//! 通知失败不影响已提交的重组

mod support;

use std::sync::Arc;

use async_trait::async_trait;
use support::*;
use config::RegroupingConfig;
use domain_core::Entity;
use errors::{AppError, AppResult};
use mockall::mock;
use ports::EventPublisher;
use regrouping::application::{
    CancelRegroupingCommand, CreateRegroupingCommand, ExecuteInstantRegroupingCommand,
    InstantDestinationSpec,
};
use regrouping::domain::enums::RegroupingStatus;
use regrouping::domain::value_objects::{Destination, SampleInput};
use regrouping::ServiceHandler;

mock! {
    pub Publisher {}

    #[async_trait]
    impl EventPublisher for Publisher {
        async fn publish_raw(&self, topic: &str, payload: &str) -> AppResult<()>;
    }
}

fn failing_publisher(expected_calls: usize) -> MockPublisher {
    let mut publisher = MockPublisher::new();
    publisher
        .expect_publish_raw()
        .times(expected_calls)
        .returning(|_, _| Err(AppError::internal("broker unavailable")));
    publisher
}

#[tokio::test]
async fn test_publish_failure_keeps_committed_regrouping() {
    let farm = Farm::new().await;
    let (a1, cycle) = farm
        .stocked_container("A1", Some(farm.pos("DX", 1)), 1_000, 300.0, None)
        .await;
    let b1 = farm.empty_container("B1").await;

    let handler = ServiceHandler::new(
        Arc::new(farm.store.clone()),
        Arc::new(failing_publisher(1)),
        RegroupingConfig::default(),
    )
    .unwrap();

    let outcome = handler
        .execute_instant_regrouping(ExecuteInstantRegroupingCommand {
            source_container_ids: vec![a1.id().clone()],
            destinations: vec![InstantDestinationSpec {
                container_id: b1.id().clone(),
                destination: Destination::Placed(farm.pos("SX", 1)),
                total_weight_g: 3_000.0,
                animal_count: None,
                notes: None,
            }],
            sample: SampleInput::new(100.0, 30, 0),
            date: regrouping_date(),
            notes: None,
        })
        .await
        .unwrap();

    let state = farm.state().await;
    let stored = &state.regroupings[outcome.regrouping.id()];
    assert_eq!(stored.status(), RegroupingStatus::Completed);
    assert_eq!(state.cycles[cycle.id()].container_id(), b1.id());
    assert!(farm.bus.get_events().await.is_empty());
}

#[tokio::test]
async fn test_publish_failure_keeps_cancellation() {
    let farm = Farm::new().await;
    let handler = ServiceHandler::new(
        Arc::new(farm.store.clone()),
        Arc::new(failing_publisher(1)),
        RegroupingConfig::default(),
    )
    .unwrap();

    let draft = handler
        .create_regrouping_draft(CreateRegroupingCommand::new(regrouping_date()))
        .await
        .unwrap();
    let cancelled = handler
        .cancel_regrouping(CancelRegroupingCommand {
            regrouping_id: draft.id().clone(),
            reason: Some("Weather".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(cancelled.status(), RegroupingStatus::Cancelled);
    let state = farm.state().await;
    assert_eq!(
        state.regroupings[draft.id()].cancellation_reason(),
        Some("Weather")
    );
}

#[tokio::test]
async fn test_rejected_regrouping_publishes_nothing() {
    let farm = Farm::new().await;
    let (a1, _) = farm
        .stocked_container("A1", Some(farm.pos("DX", 1)), 1_000, 300.0, None)
        .await;

    let handler = ServiceHandler::new(
        Arc::new(farm.store.clone()),
        Arc::new(failing_publisher(0)),
        RegroupingConfig::default(),
    )
    .unwrap();

    let err = handler
        .execute_instant_regrouping(ExecuteInstantRegroupingCommand {
            source_container_ids: vec![a1.id().clone()],
            destinations: vec![InstantDestinationSpec {
                container_id: a1.id().clone(),
                destination: Destination::Placed(farm.pos("ZZ", 1)),
                total_weight_g: 3_000.0,
                animal_count: None,
                notes: None,
            }],
            sample: SampleInput::new(100.0, 30, 0),
            date: regrouping_date(),
            notes: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}
