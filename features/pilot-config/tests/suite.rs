use std::{convert::Infallible, sync::Arc, time::Duration};

use figment::Jail;
use pilot_config::{
    configurator::SectionConfigurator, provider::PropertyProvider, settings::SuiteSettings,
};
use pilot_lifecycle::{
    Cancellation, Destructor, InjectionPoint, Instantiator, LifecycleOrchestrator, Qualifier,
    RegistryBuilder, ResourceType, ScopedStore,
};
use serde::Deserialize;

const BROWSER: ResourceType = ResourceType::named("Browser");

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
struct BrowserConfig {
    name: String,
    headless: bool,
}

#[derive(Debug)]
struct Browser {
    config: BrowserConfig,
}

struct BrowserInstantiator;
impl Instantiator for BrowserInstantiator {
    type Configuration = BrowserConfig;
    type Provides = Browser;

    fn create_instance(
        &self,
        configuration: &BrowserConfig,
        _cancellation: &Cancellation,
    ) -> Result<Browser, Infallible> {
        Ok(Browser {
            config: configuration.clone(),
        })
    }
}

struct BrowserDestructor;
impl Destructor for BrowserDestructor {
    type Destroys = Browser;

    fn destroy_instance(&self, _instance: Arc<Browser>) -> Result<(), Infallible> {
        Ok(())
    }
}

const SUITE: &str = r#"
[lifecycle]
instantiation_timeout_secs = 20

[browser]
name = "firefox"
headless = true

[browser-secondary]
name = "chrome"
"#;

#[test]
fn suite_file_drives_settings_and_configuration() {
    Jail::expect_with(|jail| {
        jail.create_file("pilot.toml", SUITE)?;
        jail.set_env("PILOT_BROWSER__HEADLESS", "false");

        let figment = Arc::new(pilot_config::layered("pilot.toml"));
        let settings = SuiteSettings::from_figment(&figment).unwrap();
        let properties = PropertyProvider::from_figment(&figment).unwrap();

        let registry = RegistryBuilder::new()
            .add_configurator(
                BROWSER,
                SectionConfigurator::<BrowserConfig>::new(figment.clone(), "browser"),
            )
            .add_instantiator(BROWSER, BrowserInstantiator)
            .add_destructor(BROWSER, BrowserDestructor)
            .build();
        let orchestrator = LifecycleOrchestrator::builder(registry)
            .descriptor(properties)
            .settings(settings.into_lifecycle_settings())
            .build();
        assert_eq!(
            orchestrator.settings().instantiation_timeout,
            Some(Duration::from_secs(20))
        );

        let store = ScopedStore::class("SuiteTest");
        let default = InjectionPoint::class(BROWSER);
        let secondary = InjectionPoint::class(BROWSER).with_qualifier(Qualifier::named("secondary"));
        orchestrator
            .prepare_all(&store, [&default, &secondary])
            .unwrap();

        let first = orchestrator.current_value(&store, &default).unwrap().unwrap();
        let first = first.view::<Browser>().unwrap();
        assert_eq!(first.config.name, "firefox");
        assert!(!first.config.headless);

        let second = orchestrator.current_value(&store, &secondary).unwrap().unwrap();
        assert_eq!(second.view::<Browser>().unwrap().config.name, "chrome");

        orchestrator.teardown(&store).unwrap();
        Ok(())
    });
}

#[test]
fn properties_feed_descriptor_lookups() {
    Jail::expect_with(|jail| {
        jail.create_file("pilot.toml", SUITE)?;
        jail.set_env("PILOT_LIFECYCLE__DEBUG", "true");

        let properties = PropertyProvider::load("pilot.toml").unwrap();
        let settings = SuiteSettings::from_descriptor(&properties).unwrap();

        assert!(settings.debug);
        assert_eq!(settings.instantiation_timeout_secs, 20);
        assert_eq!(settings.into_lifecycle_settings().instantiation_timeout, None);
        Ok(())
    });
}
