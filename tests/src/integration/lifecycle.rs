//! # Lifecycle Integration
//!
//! Drives whole applications through Init, Start and Stop:
//!
//! 1. **Ordering**: dependencies initialize first, Stop runs in reverse
//! 2. **Cycles**: rejected before any module is touched
//! 3. **Failures**: Init/Start abort with the module named, Stop is best effort
//! 4. **Run loop**: shutdown future and context cancellation

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use modulith_runtime::{
        AppError, Application, Context, LifecycleState, ModuleStatus, RuntimeConfig,
        ServiceDependency,
    };

    use crate::fixtures::{Journal, Labelled, TestModule};

    // =========================================================================
    // ORDERING
    // =========================================================================

    #[tokio::test]
    async fn test_every_edge_initializes_dependency_first() {
        let journal = Journal::default();
        let app = Application::new();
        let graph: [(&str, &[&str]); 6] = [
            ("gateway", &["auth", "router"]),
            ("router", &["cache"]),
            ("auth", &["store", "cache"]),
            ("cache", &["store"]),
            ("metrics", &[]),
            ("store", &[]),
        ];
        for (name, deps) in graph {
            app.register_module(TestModule::new(name, &journal).after(deps.iter().copied()).arc())
                .unwrap();
        }

        app.init().await.unwrap();

        let order = app.init_order();
        let at = |name: &str| order.iter().position(|m| m == name).unwrap();
        for (name, deps) in graph {
            for dep in deps {
                assert!(at(dep) < at(name), "{dep} must initialize before {name}");
            }
        }
        assert_eq!(order, vec!["metrics", "store", "cache", "router", "auth", "gateway"]);
    }

    #[tokio::test]
    async fn test_init_order_is_deterministic() {
        let build = || {
            let journal = Journal::default();
            let app = Application::new();
            app.register_module(TestModule::new("e", &journal).after(["a"]).arc())
                .unwrap();
            for name in ["d", "c", "b", "a"] {
                app.register_module(TestModule::new(name, &journal).arc()).unwrap();
            }
            app
        };

        let first = build();
        let second = build();
        first.init().await.unwrap();
        second.init().await.unwrap();

        assert_eq!(first.init_order(), second.init_order());
        assert_eq!(first.init_order(), vec!["d", "c", "b", "a", "e"]);
    }

    #[tokio::test]
    async fn test_two_phase_start_and_reverse_stop() {
        let journal = Journal::default();
        let app = Application::new();
        app.register_module(TestModule::new("web", &journal).after(["db"]).arc()).unwrap();
        app.register_module(TestModule::new("db", &journal).arc()).unwrap();

        let ctx = Context::new();
        app.init().await.unwrap();
        app.start(&ctx).await.unwrap();
        app.stop(&ctx).await.unwrap();

        assert_eq!(
            journal.entries(),
            vec!["init:db", "init:web", "start:db", "start:web", "stop:web", "stop:db"]
        );
        assert_eq!(app.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_service_requirement_orders_provider_first() {
        let journal = Journal::default();
        let app = Application::new();
        app.register_module(
            TestModule::new("router", &journal)
                .requires(ServiceDependency::required("auth"))
                .arc(),
        )
        .unwrap();
        app.register_module(TestModule::new("jwt", &journal).publishes("auth", "jwt").arc())
            .unwrap();

        app.init().await.unwrap();

        assert_eq!(app.init_order(), vec!["jwt", "router"]);
    }

    #[tokio::test]
    async fn test_interface_requirement_orders_provider_registered_later() {
        let journal = Journal::default();
        let app = Application::new();
        app.register_module(
            TestModule::new("consumer", &journal)
                .requires(
                    ServiceDependency::required("storage")
                        .with_interface::<dyn Labelled>()
                        .by_interface(),
                )
                .arc(),
        )
        .unwrap();
        app.register_module(TestModule::new("provider", &journal).publishes("mem-store", "mem").arc())
            .unwrap();

        app.init().await.unwrap();

        assert_eq!(app.init_order(), vec!["provider", "consumer"]);
        assert_eq!(journal.entries(), vec!["init:provider", "init:consumer"]);
    }

    #[tokio::test]
    async fn test_optional_requirement_yields_to_hard_one() {
        let journal = Journal::default();
        let app = Application::new();
        app.register_module(
            TestModule::new("b", &journal)
                .publishes("y", "b")
                .requires(ServiceDependency::required("x"))
                .arc(),
        )
        .unwrap();
        app.register_module(
            TestModule::new("a", &journal)
                .publishes("x", "a")
                .requires(ServiceDependency::optional("y"))
                .arc(),
        )
        .unwrap();

        app.init().await.unwrap();

        assert_eq!(app.init_order(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_module_requiring_its_own_service() {
        let journal = Journal::default();
        let app = Application::new();
        app.register_module(
            TestModule::new("solo", &journal)
                .publishes("svc", "solo")
                .requires(ServiceDependency::required("svc"))
                .arc(),
        )
        .unwrap();

        app.init().await.unwrap();

        assert_eq!(app.services().get_services_by_module("solo"), vec!["svc"]);
    }

    // =========================================================================
    // CYCLES
    // =========================================================================

    #[tokio::test]
    async fn test_cycle_rejected_before_any_init() {
        let journal = Journal::default();
        let app = Application::new();
        app.register_module(TestModule::new("free", &journal).arc()).unwrap();
        app.register_module(TestModule::new("a", &journal).after(["c"]).arc()).unwrap();
        app.register_module(TestModule::new("b", &journal).after(["a"]).arc()).unwrap();
        app.register_module(TestModule::new("c", &journal).after(["b"]).arc()).unwrap();

        let err = app.init().await.unwrap_err();

        match &err {
            AppError::CircularDependency { modules } => {
                let mut members = modules.clone();
                members.sort();
                assert_eq!(members, vec!["a", "b", "c"]);
            }
            other => panic!("expected a cycle, got {other}"),
        }
        assert!(journal.is_empty(), "no module may be touched: {:?}", journal.entries());
        assert_eq!(app.state(), LifecycleState::Failed);
    }

    #[tokio::test]
    async fn test_missing_dependency_rejected() {
        let journal = Journal::default();
        let app = Application::new();
        app.register_module(TestModule::new("api", &journal).after(["db"]).arc()).unwrap();

        let err = app.init().await.unwrap_err();

        assert!(matches!(
            err,
            AppError::MissingDependency { ref dependency, .. } if dependency == "db"
        ));
        assert!(journal.is_empty());
    }

    #[tokio::test]
    async fn test_dependency_on_disabled_module_is_missing() {
        let journal = Journal::default();
        let config = RuntimeConfig::from_vars([("MODULITH_MODULE_DB", "false")]);
        let app = Application::with_config(config);
        app.register_module(TestModule::new("db", &journal).arc()).unwrap();
        app.register_module(TestModule::new("api", &journal).after(["db"]).arc()).unwrap();

        assert_eq!(app.module_status("db"), Some(ModuleStatus::Disabled));
        assert!(matches!(
            app.init().await,
            Err(AppError::MissingDependency { .. })
        ));
    }

    // =========================================================================
    // FAILURES
    // =========================================================================

    #[tokio::test]
    async fn test_required_service_missing_aborts_init() {
        let journal = Journal::default();
        let app = Application::new();
        app.register_module(TestModule::new("early", &journal).arc()).unwrap();
        app.register_module(
            TestModule::new("needy", &journal)
                .requires(ServiceDependency::required("database"))
                .arc(),
        )
        .unwrap();
        app.register_module(TestModule::new("late", &journal).arc()).unwrap();

        let err = app.init().await.unwrap_err();

        assert!(matches!(
            err,
            AppError::RequiredServiceNotFound { ref module, ref service }
                if module == "needy" && service == "database"
        ));
        assert_eq!(journal.entries(), vec!["init:early"]);
    }

    #[tokio::test]
    async fn test_optional_service_missing_is_fine() {
        let journal = Journal::default();
        let app = Application::new();
        app.register_module(
            TestModule::new("relaxed", &journal)
                .requires(ServiceDependency::optional("database"))
                .arc(),
        )
        .unwrap();

        app.init().await.unwrap();
        assert_eq!(journal.entries(), vec!["init:relaxed"]);
    }

    #[tokio::test]
    async fn test_start_failure_aborts_remaining_starts() {
        let journal = Journal::default();
        let app = Application::new();
        app.register_module(TestModule::new("one", &journal).arc()).unwrap();
        app.register_module(TestModule::new("two", &journal).failing_start().arc()).unwrap();
        app.register_module(TestModule::new("three", &journal).arc()).unwrap();

        let ctx = Context::new();
        app.init().await.unwrap();
        let err = app.start(&ctx).await.unwrap_err();

        assert!(matches!(err, AppError::ModuleStartFailed { ref module, .. } if module == "two"));
        assert!(journal.position("start:three").is_none());
        assert_eq!(app.module_status("two"), Some(ModuleStatus::Failed));

        // Every initialized module is still torn down.
        app.stop(&ctx).await.unwrap();
        assert_eq!(
            journal.with_prefix("stop"),
            vec!["stop:three", "stop:two", "stop:one"]
        );
    }

    #[tokio::test]
    async fn test_stop_is_best_effort_and_aggregates() {
        let journal = Journal::default();
        let app = Application::new();
        app.register_module(TestModule::new("a", &journal).failing_stop().arc()).unwrap();
        app.register_module(TestModule::new("b", &journal).arc()).unwrap();
        app.register_module(TestModule::new("c", &journal).failing_stop().arc()).unwrap();

        let ctx = Context::new();
        app.init().await.unwrap();
        app.start(&ctx).await.unwrap();
        let err = app.stop(&ctx).await.unwrap_err();

        assert_eq!(journal.with_prefix("stop"), vec!["stop:c", "stop:b", "stop:a"]);
        match &err {
            AppError::StopFailed(failures) => {
                assert_eq!(failures.len(), 2);
                assert!(failures
                    .iter()
                    .all(|f| matches!(f, AppError::ModuleStopFailed { .. })));
            }
            other => panic!("expected aggregate, got {other}"),
        }
        assert_eq!(err.failed_modules(), vec!["c", "a"]);
        assert_eq!(app.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_stopped_is_terminal() {
        let app = Application::new();
        let ctx = Context::new();
        app.init().await.unwrap();
        app.stop(&ctx).await.unwrap();

        assert!(matches!(app.init().await, Err(AppError::InvalidState { .. })));
        assert!(matches!(app.start(&ctx).await, Err(AppError::InvalidState { .. })));
        assert!(matches!(app.stop(&ctx).await, Err(AppError::InvalidState { .. })));
    }

    // =========================================================================
    // RUN LOOP
    // =========================================================================

    #[tokio::test]
    async fn test_run_until_stops_on_cancellation() {
        let journal = Journal::default();
        let app = Application::new();
        app.register_module(TestModule::new("worker", &journal).arc()).unwrap();

        let ctx = Context::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        tokio::time::timeout(
            Duration::from_secs(5),
            app.run_until(&ctx, std::future::pending()),
        )
        .await
        .expect("run_until should return after cancellation")
        .unwrap();

        assert_eq!(
            journal.entries(),
            vec!["init:worker", "start:worker", "stop:worker"]
        );
    }

    #[tokio::test]
    async fn test_run_until_reports_init_failure_after_cleanup() {
        let journal = Journal::default();
        let app = Application::new();
        app.register_module(TestModule::new("ok", &journal).arc()).unwrap();
        app.register_module(TestModule::new("bad", &journal).failing_init().arc()).unwrap();

        let err = app
            .run_until(&Context::new(), async {})
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ModuleInitFailed { ref module, .. } if module == "bad"));
        assert_eq!(journal.entries(), vec!["init:ok", "init:bad", "stop:ok"]);
        assert_eq!(app.state(), LifecycleState::Stopped);
    }
}
