//! # Service Registry Integration
//!
//! Services published by modules during Init, looked up by other modules:
//!
//! 1. **Conflict renaming**: the first registrant keeps the name
//! 2. **Interface discovery**: finds renamed services too
//! 3. **Module listing**: only the asking module's services
//! 4. **Dependency checks**: interface requirements and interface fallback

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use modulith_runtime::{
        events, AppError, AppHandle, Application, EventFilter, Initializable, Module,
        ServiceDependency, Subject,
    };

    use crate::fixtures::{Audited, Journal, Labelled, RecordingObserver, TestModule};

    async fn app_with_conflict() -> Application {
        let journal = Journal::default();
        let app = Application::new();
        app.register_module(TestModule::new("ModuleA", &journal).publishes("svc", "a").arc())
            .unwrap();
        app.register_module(
            TestModule::new("ModuleB", &journal)
                .publishes("svc", "b")
                .publishes("extra", "b-extra")
                .arc(),
        )
        .unwrap();
        app.init().await.unwrap();
        app
    }

    #[tokio::test]
    async fn test_conflicting_names_are_qualified() {
        let app = app_with_conflict().await;
        let services = app.services();

        let a = services.get_service::<dyn Labelled>("svc").unwrap();
        let b = services.get_service::<dyn Labelled>("svc.ModuleB").unwrap();
        assert_eq!(a.label(), "a");
        assert_eq!(b.label(), "b");

        let entry = services.get_service_entry("svc.ModuleB").unwrap();
        assert_eq!(entry.module_name, "ModuleB");
        assert_eq!(entry.original_name, "svc");
        assert_eq!(entry.actual_name, "svc.ModuleB");

        let first = services.get_service_entry("svc").unwrap();
        assert_eq!(first.module_name, "ModuleA");
        assert_eq!(first.original_name, "svc");
    }

    #[tokio::test]
    async fn test_interface_lookup_sees_every_implementation() {
        let app = app_with_conflict().await;

        let labels: Vec<String> = app
            .services()
            .get_services_by_interface::<dyn Labelled>()
            .iter()
            .map(|found| found.service.label())
            .collect();

        assert_eq!(labels, vec!["a", "b", "b-extra"]);
        assert!(app
            .services()
            .get_services_by_interface::<dyn Audited>()
            .is_empty());
    }

    #[tokio::test]
    async fn test_services_by_module() {
        let app = app_with_conflict().await;

        assert_eq!(
            app.services().get_services_by_module("ModuleB"),
            vec!["svc.ModuleB", "extra"]
        );
        assert_eq!(app.services().get_services_by_module("ModuleA"), vec!["svc"]);
    }

    #[tokio::test]
    async fn test_lookup_errors() {
        let app = app_with_conflict().await;

        assert!(matches!(
            app.services().get_service::<dyn Labelled>("nope"),
            Err(AppError::ServiceNotFound { ref name }) if name == "nope"
        ));
        assert!(matches!(
            app.services().get_service::<dyn Audited>("svc"),
            Err(AppError::ServiceTypeMismatch { ref name, .. }) if name == "svc"
        ));
    }

    #[tokio::test]
    async fn test_third_registrant_colliding_with_qualified_name_fails() {
        let journal = Journal::default();
        let app = Application::new();
        app.register_module(TestModule::new("a", &journal).publishes("svc", "a").arc())
            .unwrap();
        // "svc.b" taken outright by an unrelated module.
        app.register_module(TestModule::new("c", &journal).publishes("svc.b", "c").arc())
            .unwrap();
        app.register_module(TestModule::new("b", &journal).publishes("svc", "b").arc())
            .unwrap();

        let err = app.init().await.unwrap_err();
        match err {
            AppError::ModuleInitFailed { module, cause } => {
                assert_eq!(module, "b");
                assert!(matches!(
                    cause.downcast_ref::<AppError>(),
                    Some(AppError::ServiceNameConflictUnresolvable { .. })
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_required_interface_checked() {
        let journal = Journal::default();
        let app = Application::new();
        app.register_module(TestModule::new("store", &journal).publishes("kv", "memory").arc())
            .unwrap();
        app.register_module(
            TestModule::new("auditor", &journal)
                .requires(ServiceDependency::required("kv").with_interface::<dyn Audited>())
                .arc(),
        )
        .unwrap();

        let err = app.init().await.unwrap_err();
        assert!(matches!(err, AppError::ServiceTypeMismatch { ref name, .. } if name == "kv"));
    }

    #[tokio::test]
    async fn test_match_by_interface_fallback() {
        let journal = Journal::default();
        let app = Application::new();
        app.register_module(TestModule::new("store", &journal).publishes("kv", "memory").arc())
            .unwrap();
        app.register_module(
            TestModule::new("reader", &journal)
                .after(["store"])
                .requires(
                    ServiceDependency::required("labels")
                        .with_interface::<dyn Labelled>()
                        .by_interface(),
                )
                .arc(),
        )
        .unwrap();

        app.init().await.unwrap();
        assert_eq!(journal.entries(), vec!["init:store", "init:reader"]);
    }

    /// Looks up a service published by an earlier module from its own Init.
    struct Consumer {
        seen: parking_lot::Mutex<Option<String>>,
    }

    #[async_trait]
    impl Initializable for Consumer {
        async fn init(&self, app: &AppHandle) -> anyhow::Result<()> {
            let service = app.get_service::<dyn Labelled>("svc")?;
            *self.seen.lock() = Some(service.label());
            Ok(())
        }
    }

    impl Module for Consumer {
        fn name(&self) -> &str {
            "consumer"
        }

        fn as_initializable(&self) -> Option<&dyn Initializable> {
            Some(self)
        }
    }

    #[tokio::test]
    async fn test_services_visible_to_later_modules_and_announced() {
        let journal = Journal::default();
        let announcements = Journal::default();
        let app = Application::new();
        app.subject().register_observer(
            RecordingObserver::new("watch", &announcements),
            EventFilter::types([events::SERVICE_REGISTERED]),
        );

        app.register_module(TestModule::new("provider", &journal).publishes("svc", "p").arc())
            .unwrap();
        let consumer = Arc::new(Consumer {
            seen: parking_lot::Mutex::new(None),
        });
        app.register_module(consumer.clone()).unwrap();

        app.init().await.unwrap();

        assert_eq!(consumer.seen.lock().as_deref(), Some("p"));
        assert_eq!(
            announcements.entries(),
            vec![format!("watch:{}", events::SERVICE_REGISTERED)]
        );
    }
}
