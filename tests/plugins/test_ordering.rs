// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Registration-order execution and shared context mutation

use async_trait::async_trait;
use fleet_vision_capture::capture::CaptureKind;
use fleet_vision_capture::plugins::{
    HookHandler, HookName, HookOutcome, PluginContext, PluginDescriptor, PluginRuntime,
    ResultHook,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// Tags the payload with the fleet unit recorded in context
struct FleetTagger;

#[async_trait]
impl ResultHook for FleetTagger {
    async fn call(&self, mut payload: Value, ctx: &mut PluginContext) -> anyhow::Result<Value> {
        let unit = ctx
            .metadata
            .get("fleetUnit")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("fleetUnit missing from context"))?;
        payload["fleetUnit"] = unit;
        Ok(payload)
    }
}

fn ctx() -> PluginContext {
    PluginContext::new("session-42", CaptureKind::Odometer)
}

#[tokio::test]
async fn test_enrichment_from_a_is_visible_to_b() {
    let mut runtime = PluginRuntime::new();
    runtime
        .register(PluginDescriptor::new("unit-lookup", "1.0.0").with_hook(
            HookName::EnrichResult,
            HookHandler::result(|mut payload, ctx| {
                ctx.set_metadata("fleetUnit", json!("TRK-0193"));
                payload["lookedUp"] = json!(true);
                Ok(payload)
            }),
        ))
        .unwrap();
    runtime
        .register(
            PluginDescriptor::new("fleet-tagger", "2.1.0")
                .with_hook(HookName::EnrichResult, HookHandler::Result(Arc::new(FleetTagger))),
        )
        .unwrap();

    let mut ctx = ctx();
    let payload = runtime
        .run_result(HookName::EnrichResult, json!({"reading": 48213}), &mut ctx)
        .await
        .unwrap();

    assert_eq!(payload["reading"], 48213);
    assert_eq!(payload["lookedUp"], true);
    assert_eq!(payload["fleetUnit"], "TRK-0193");
}

#[tokio::test]
async fn test_reversed_registration_fails_at_b() {
    let mut runtime = PluginRuntime::new();
    runtime
        .register(
            PluginDescriptor::new("fleet-tagger", "2.1.0")
                .with_hook(HookName::EnrichResult, HookHandler::Result(Arc::new(FleetTagger))),
        )
        .unwrap();
    runtime
        .register(PluginDescriptor::new("unit-lookup", "1.0.0").with_hook(
            HookName::EnrichResult,
            HookHandler::result(|payload, ctx| {
                ctx.set_metadata("fleetUnit", json!("TRK-0193"));
                Ok(payload)
            }),
        ))
        .unwrap();

    let mut ctx = ctx();
    let err = runtime
        .run_result(HookName::EnrichResult, json!({}), &mut ctx)
        .await
        .unwrap_err();
    assert_eq!(err.plugin_id, "fleet-tagger");
    assert_eq!(err.hook, HookName::EnrichResult);
    // the runtime funnels the failure into on-error before surfacing it
    let reason = ctx.last_error.expect("on-error ran with a reason");
    assert_eq!(reason.plugin_id.as_deref(), Some("fleet-tagger"));
}

#[tokio::test]
async fn test_each_phase_runs_in_order() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut runtime = PluginRuntime::new();
    for id in ["a", "b", "c"] {
        let log = calls.clone();
        let mut descriptor = PluginDescriptor::new(id, "1");
        for hook in [HookName::BeforeCapture, HookName::AfterCapture] {
            let log = log.clone();
            descriptor = descriptor.with_hook(
                hook,
                HookHandler::lifecycle(move |_| {
                    log.lock().unwrap().push(format!("{hook}:{id}"));
                    Ok(())
                }),
            );
        }
        runtime.register(descriptor).unwrap();
    }

    let mut ctx = ctx();
    for hook in [HookName::BeforeCapture, HookName::AfterCapture] {
        assert_eq!(
            runtime.run_hook(hook, Value::Null, &mut ctx).await.unwrap(),
            HookOutcome::Completed
        );
    }
    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            "before-capture:a",
            "before-capture:b",
            "before-capture:c",
            "after-capture:a",
            "after-capture:b",
            "after-capture:c",
        ]
    );
}

#[tokio::test]
async fn test_render_hooks_collect_without_side_effects() {
    let mut runtime = PluginRuntime::new();
    runtime
        .register(PluginDescriptor::new("badge", "1").with_hook(
            HookName::RenderResultBadge,
            HookHandler::render(|ctx| Some(json!({ "attempt": ctx.attempt }))),
        ))
        .unwrap();
    runtime
        .register(PluginDescriptor::new("silent", "1").with_hook(
            HookName::RenderOverlay,
            HookHandler::render(|_| None),
        ))
        .unwrap();

    let mut ctx = ctx();
    ctx.attempt = 2;
    let outcome = runtime
        .run_hook(HookName::RenderResultBadge, Value::Null, &mut ctx)
        .await
        .unwrap();
    match outcome {
        HookOutcome::Rendered(outputs) => {
            assert_eq!(outputs.len(), 1);
            assert_eq!(outputs[0].plugin_id, "badge");
            assert_eq!(outputs[0].output["attempt"], 2);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(runtime.run_render(HookName::RenderOverlay, &ctx).is_empty());
    assert!(runtime.run_render(HookName::RenderToolbar, &ctx).is_empty());
}
