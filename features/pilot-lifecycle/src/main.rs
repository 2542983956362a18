use std::{convert::Infallible, sync::Arc};

use pilot_lifecycle::{
    AugmentingEnhancer, Cancellation, ClassSession, Configurator, DescriptorSource, Destructor,
    DynError, InjectionPoint, Instantiator, LifecycleEvent, LifecycleOrchestrator, Qualifier,
    RegistryBuilder, ResourceType,
};

const BROWSER: ResourceType = ResourceType::named("Browser");

fn main() {
    let registry = RegistryBuilder::new()
        .add_configurator(BROWSER, BrowserConfigurator)
        .add_instantiator(BROWSER, BrowserInstantiator)
        .add_destructor(BROWSER, BrowserDestructor)
        .add_enhancer(BROWSER, AugmentingEnhancer::new(["screenshots"]))
        .build();

    let orchestrator = LifecycleOrchestrator::builder(registry)
        .observe(|event: &LifecycleEvent<'_>| println!("{:?} {}", event.kind(), event.point()))
        .build();

    let mut session = ClassSession::new(Arc::new(orchestrator), "LoginTest");
    let main_browser = InjectionPoint::class(BROWSER);
    let secondary = InjectionPoint::class(BROWSER).with_qualifier(Qualifier::named("secondary"));

    session
        .before_class([main_browser.clone(), secondary.clone()])
        .unwrap();

    let browser = session.current_value(&main_browser).unwrap().unwrap();
    println!("{:?}", browser.view::<Browser>().unwrap());

    session.after_class().unwrap();
}

#[derive(Debug)]
struct BrowserSettings {
    url: String,
}
struct BrowserConfigurator;
impl Configurator for BrowserConfigurator {
    type Configuration = BrowserSettings;

    fn create_configuration(
        &self,
        descriptor: &dyn DescriptorSource,
        point: &InjectionPoint,
    ) -> Result<BrowserSettings, Infallible> {
        let url = descriptor
            .lookup(point.qualifier().name(), "url")
            .unwrap_or_else(|| "http://localhost:4444".to_string());
        Ok(BrowserSettings { url })
    }
}

#[derive(Debug)]
struct Browser {
    url: String,
}
struct BrowserInstantiator;
impl Instantiator for BrowserInstantiator {
    type Configuration = BrowserSettings;
    type Provides = Browser;

    fn create_instance(
        &self,
        configuration: &BrowserSettings,
        _cancellation: &Cancellation,
    ) -> Result<Browser, DynError> {
        Ok(Browser {
            url: configuration.url.clone(),
        })
    }
}

struct BrowserDestructor;
impl Destructor for BrowserDestructor {
    type Destroys = Browser;

    fn destroy_instance(&self, instance: Arc<Browser>) -> Result<(), Infallible> {
        println!("Closing browser at {}", instance.url);
        Ok(())
    }
}
