use std::sync::Arc;

use crate::{
    errors::{LifecycleError, PreparationErrors, TeardownError, TeardownErrors},
    filter::{by_lifecycle, PointFilterExt},
    orchestrator::LifecycleOrchestrator,
    point::{InjectionPoint, Scope},
    store::ScopedStore,
    types::Instance,
};

/// Lifecycle of one test class, driven by the host runner's events
///
/// Class scoped points are prepared when the class starts and live until it ends.
/// Method scoped points get a fresh store per test method. Deployment scoped points
/// are only prepared once their deployment is deployed and are destroyed before it is
/// undeployed.
#[derive(Debug)]
pub struct ClassSession {
    orchestrator: Arc<LifecycleOrchestrator>,
    class_name: String,
    class_store: ScopedStore,
    method_store: Option<ScopedStore>,
    /// Method scoped points declared on the class, recreated for every method
    method_points: Vec<InjectionPoint>,
    deployment_points: Vec<InjectionPoint>,
}

impl ClassSession {
    pub fn new(orchestrator: Arc<LifecycleOrchestrator>, class_name: impl Into<String>) -> Self {
        let class_name = class_name.into();
        Self {
            orchestrator,
            class_store: ScopedStore::class(class_name.clone()),
            class_name,
            method_store: None,
            method_points: Vec::new(),
            deployment_points: Vec::new(),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn orchestrator(&self) -> &LifecycleOrchestrator {
        &self.orchestrator
    }

    pub fn class_store(&self) -> &ScopedStore {
        &self.class_store
    }

    pub fn method_store(&self) -> Option<&ScopedStore> {
        self.method_store.as_ref()
    }

    /// Registers the points declared on the class and prepares the class scoped ones
    pub fn before_class(
        &mut self,
        points: impl IntoIterator<Item = InjectionPoint>,
    ) -> Result<(), PreparationErrors> {
        let _span = tracing::debug_span!("before_class", class = %self.class_name).entered();

        let mut class_points = Vec::new();
        for point in points {
            match point.scope() {
                Scope::Class => class_points.push(point),
                Scope::Method => self.method_points.push(point),
                Scope::Deployment => self.deployment_points.push(point),
            }
        }
        self.orchestrator
            .prepare_all(&self.class_store, &class_points)
    }

    /// Opens a fresh method store and prepares the method scoped points in it
    ///
    /// A store left open by a previous method is torn down first.
    pub fn before_method(
        &mut self,
        method_name: &str,
        points: impl IntoIterator<Item = InjectionPoint>,
    ) -> Result<(), PreparationErrors> {
        let _span =
            tracing::debug_span!("before_method", class = %self.class_name, method = method_name)
                .entered();

        if self.method_store.is_some() {
            tracing::warn!("The previous method of {} was never finished", self.class_name);
            if let Err(errors) = self.after_method() {
                tracing::warn!("{errors}");
            }
        }

        let store = ScopedStore::method(format!("{}::{}", self.class_name, method_name));
        let points: Vec<_> = self
            .method_points
            .iter()
            .cloned()
            .chain(points)
            .collect();
        let result = self.orchestrator.prepare_all(&store, &points);
        self.method_store = Some(store);
        result
    }

    pub fn after_method(&mut self) -> Result<(), TeardownErrors> {
        match self.method_store.take() {
            Some(store) => self.orchestrator.teardown(&store),
            None => Ok(()),
        }
    }

    /// Prepares the points bound to the deployment that was just deployed
    pub fn after_deploy(&mut self, deployment_name: &str) -> Result<(), PreparationErrors> {
        let _span = tracing::debug_span!("after_deploy", deployment = deployment_name).entered();
        let points: Vec<_> = self
            .deployment_points
            .iter()
            .filter(|point| point.deployment_name() == Some(deployment_name))
            .collect();
        self.orchestrator.prepare_all(&self.class_store, points)
    }

    /// Destroys the points bound to the deployment about to be undeployed
    ///
    /// They are prepared again on the next deploy.
    pub fn before_undeploy(&mut self, deployment_name: &str) -> Result<(), TeardownErrors> {
        let _span = tracing::debug_span!("before_undeploy", deployment = deployment_name).entered();
        let filter = by_lifecycle([Scope::Deployment]).and(|point: &InjectionPoint| {
            point.deployment_name() == Some(deployment_name)
        });

        let result = self
            .orchestrator
            .teardown_matching(&self.class_store, &filter);
        for point in self.class_store.find(&filter) {
            self.class_store.forget(&point);
        }
        result
    }

    /// Tears down the open method store, then the class store
    pub fn after_class(&mut self) -> Result<(), TeardownErrors> {
        let _span = tracing::debug_span!("after_class", class = %self.class_name).entered();
        let mut errors: Vec<TeardownError> = Vec::new();

        if let Err(failed) = self.after_method() {
            errors.extend(failed.errors);
        }
        if let Err(failed) = self.orchestrator.teardown(&self.class_store) {
            errors.extend(failed.errors);
        }

        TeardownErrors { errors }.into_result()
    }

    /// Value for a field or parameter, looked up in the store of the point's scope
    pub fn current_value(&self, point: &InjectionPoint) -> Result<Option<Instance>, LifecycleError> {
        match point.scope() {
            Scope::Method => match &self.method_store {
                Some(store) => self.orchestrator.current_value(store, point),
                None => Ok(None),
            },
            Scope::Class | Scope::Deployment => {
                self.orchestrator.current_value(&self.class_store, point)
            }
        }
    }
}
