// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::Config;
use propeller_core::NewTask;
use serde_json::json;
use std::time::Duration;

async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn startup_and_shutdown() {
    let manager = startup(&Config::default()).await.unwrap();
    manager.shutdown().await;
}

#[tokio::test]
async fn invalid_scheduler_fails_startup() {
    let config = Config {
        scheduler: "fifo".to_string(),
        ..Default::default()
    };
    assert!(matches!(
        startup(&config).await.unwrap_err(),
        LifecycleError::Config(_)
    ));
}

#[tokio::test]
async fn bus_messages_flow_through_the_pump() {
    let manager = startup(&Config::default()).await.unwrap();
    let alive_topic = format!("{}/control/proplet/alive", manager.topics.base());
    manager
        .bus
        .publish(&alive_topic, &json!({"proplet_id": "p1"}))
        .await
        .unwrap();

    let registry = Arc::clone(&manager.registry);
    let registered = eventually(|| {
        let registry = Arc::clone(&registry);
        async move {
            registry
                .get_proplet(&PropletId::new("p1"))
                .await
                .map(|p| p.alive)
                .unwrap_or(false)
        }
    })
    .await;
    assert!(registered, "alive message should reach the registry");
    manager.shutdown().await;
}

#[tokio::test]
async fn start_command_reaches_bus_subscribers() {
    let manager = startup(&Config::default()).await.unwrap();
    let mut start_rx = manager
        .bus
        .subscribe(&manager.topics.manager_start())
        .await
        .unwrap();

    let alive_topic = format!("{}/control/proplet/alive", manager.topics.base());
    manager
        .bus
        .publish(&alive_topic, &json!({"proplet_id": "p1"}))
        .await
        .unwrap();

    let registry = Arc::clone(&manager.registry);
    assert!(
        eventually(|| {
            let registry = Arc::clone(&registry);
            async move {
                registry
                    .get_proplet(&PropletId::new("p1"))
                    .await
                    .map(|p| p.alive)
                    .unwrap_or(false)
            }
        })
        .await
    );

    let task = manager
        .service
        .create_task(NewTask {
            name: "demo".to_string(),
            image_url: "oci://registry/app:1".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    manager.service.start_task(&task.id).await.unwrap();

    let (topic, payload) = start_rx.recv().await.unwrap();
    assert_eq!(topic, manager.topics.manager_start());
    assert_eq!(payload["id"], json!(task.id.as_str()));
    assert_eq!(payload["proplet_id"], json!("p1"));
    manager.shutdown().await;
}
