#[macro_use]
extern crate rocket;

pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod ledger;
pub mod mail;
pub mod models;
pub mod report;
pub mod routes;
pub mod scan;

use crate::cache::MessageCache;
use crate::config::AppConfig;
use crate::mail::{MailClientProvider, StaticTokenProvider};
use crate::scan::{ScanPipeline, ScanService};
use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket, Route};
use rocket_okapi::{
    openapi_get_routes,
    rapidoc::{GeneralConfig, HideShowConfig, RapiDocConfig, make_rapidoc},
    settings::UrlObject,
    swagger_ui::{SwaggerUIConfig, make_swagger_ui},
};
use std::sync::{Arc, Once};
use tokio_util::sync::CancellationToken;

static LOGGER: Once = Once::new();

pub fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

/// Every API route, for mounting under `/api/v1`.
pub fn api_routes() -> Vec<Route> {
    openapi_get_routes![
        // Health routes
        routes::health::health_check,
        // Scan routes
        routes::scan::start_scan,
        routes::scan::scan_status,
        routes::scan::cancel_scan,
        // Report routes
        routes::report::get_report,
        // Cache routes
        routes::cache::cache_stats,
        routes::cache::clear_cache,
    ]
}

/// Build the scan service over an opened cache.
pub fn scan_service(config: &AppConfig, cache: Arc<MessageCache>) -> ScanService {
    let pipeline = ScanPipeline::new(Some(cache), config.pipeline.clone());
    ScanService::new(pipeline, config.watchdog.clone(), config.window.clone())
}

pub fn rocket() -> Rocket<Build> {
    init_logger();

    let config = AppConfig::from_env();
    let background = CancellationToken::new();
    let sweeper_token = background.clone();

    rocket::build()
        .manage(config.clone())
        // Open the result cache and build the scan service on top of it
        .attach(AdHoc::try_on_ignite(
            "Open Message Cache",
            move |rocket| async move {
                match MessageCache::open(&config.cache.path, config.cache.ttl).await {
                    Ok(cache) => {
                        let cache = Arc::new(cache);
                        let service = scan_service(&config, cache.clone());
                        let provider: Arc<dyn MailClientProvider> =
                            Arc::new(StaticTokenProvider::new(config.gmail.clone()));
                        if config.gmail.access_token.is_none() {
                            log::warn!("GMAIL_ACCESS_TOKEN not set; scans will be rejected");
                        }
                        Ok(rocket.manage(cache).manage(service).manage(provider))
                    }
                    Err(e) => {
                        log::error!("failed to open message cache: {}", e);
                        Err(rocket)
                    }
                }
            },
        ))
        // Purge expired cache rows in the background
        .attach(AdHoc::on_liftoff("Spawn Cache Sweeper", move |rocket| {
            Box::pin(async move {
                let cache = rocket.state::<Arc<MessageCache>>();
                let config = rocket.state::<AppConfig>();
                if let (Some(cache), Some(config)) = (cache, config) {
                    log::info!(
                        "starting cache sweeper (every {:?})",
                        config.cache.sweep_interval
                    );
                    cache
                        .clone()
                        .spawn_sweeper(config.cache.sweep_interval, sweeper_token);
                } else {
                    log::error!("failed to spawn cache sweeper: cache not initialised");
                }
            })
        }))
        .attach(AdHoc::on_shutdown("Stop Background Work", move |rocket| {
            Box::pin(async move {
                background.cancel();
                if let Some(scans) = rocket.state::<ScanService>() {
                    if scans.cancel().is_ok() {
                        log::info!("cancelled running scan on shutdown");
                    }
                }
            })
        }))
        .mount("/api/v1", api_routes())
        .mount(
            "/api/docs/swagger/",
            make_swagger_ui(&SwaggerUIConfig {
                url: "../../v1/openapi.json".to_owned(),
                ..Default::default()
            }),
        )
        .mount(
            "/api/docs/rapidoc/",
            make_rapidoc(&RapiDocConfig {
                general: GeneralConfig {
                    spec_urls: vec![UrlObject::new("Order Checker API", "../../v1/openapi.json")],
                    ..Default::default()
                },
                hide_show: HideShowConfig {
                    allow_spec_url_load: false,
                    allow_spec_file_load: false,
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use crate::cache::MessageCache;
    use crate::mail::MailClientProvider;
    use crate::scan::ScanService;
    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::local::blocking::Client;
    use rocket::{Build, Rocket, Route};
    use std::sync::Arc;

    /// Builder for constructing Rocket instances tailored for integration tests.
    #[derive(Default)]
    pub struct TestRocketBuilder {
        figment: Figment,
        mounts: Vec<(String, Vec<Route>)>,
        scans: Option<ScanService>,
        cache: Option<Arc<MessageCache>>,
        provider: Option<Arc<dyn MailClientProvider>>,
    }

    impl TestRocketBuilder {
        /// Start a builder with sensible defaults: random port, logging disabled.
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                ..Default::default()
            }
        }

        /// Mount routes under `/api/v1`.
        pub fn mount_api_routes(mut self, routes: Vec<Route>) -> Self {
            self.mounts.push(("/api/v1".to_string(), routes));
            self
        }

        pub fn manage_scan_service(mut self, scans: ScanService) -> Self {
            self.scans = Some(scans);
            self
        }

        pub fn manage_cache(mut self, cache: Arc<MessageCache>) -> Self {
            self.cache = Some(cache);
            self
        }

        pub fn manage_mail_provider(mut self, provider: Arc<dyn MailClientProvider>) -> Self {
            self.provider = Some(provider);
            self
        }

        /// Finish building the Rocket instance.
        pub fn build(self) -> Rocket<Build> {
            let mut rocket = rocket::custom(self.figment);

            for (base, routes) in self.mounts {
                rocket = rocket.mount(base, routes);
            }
            if let Some(scans) = self.scans {
                rocket = rocket.manage(scans);
            }
            if let Some(cache) = self.cache {
                rocket = rocket.manage(cache);
            }
            if let Some(provider) = self.provider {
                rocket = rocket.manage(provider);
            }

            rocket
        }

        /// Convenience helper to produce a blocking local client.
        pub fn blocking_client(self) -> Client {
            Client::tracked(self.build()).expect("valid Rocket instance")
        }

        /// Convenience helper to produce an asynchronous local client.
        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }
}
