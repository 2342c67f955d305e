use actix_web::{web, App, HttpServer};
use log::{info, warn, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Root};
use log4rs::encode::pattern::PatternEncoder;
use manhuagui_scraper::api;
use manhuagui_scraper::app_state::AppState;
use manhuagui_scraper::config::Config;

const LOG_CONFIG: &str = "log4rs.yml";

/// Load log4rs.yml, or log to stdout at info level when it is missing
fn init_logging() {
    let file_error = match log4rs::init_file(LOG_CONFIG, Default::default()) {
        Ok(()) => return,
        Err(e) => e,
    };

    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S)} {h({l})} {t} - {m}{n}")))
        .build();
    let fallback = log4rs::Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info));

    match fallback {
        Ok(config) => {
            if log4rs::init_config(config).is_ok() {
                warn!("{} not loaded ({}), logging to stdout", LOG_CONFIG, file_error);
            }
        }
        Err(e) => eprintln!("logging disabled: {}", e),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    init_logging();

    let cfg = Config::load();
    let bind_addr = cfg.server.bind_addr.clone();

    info!("Site: {}", cfg.fetcher.site_url);
    info!("  Image host: {}", cfg.fetcher.image_host);
    info!("  Chapter attempts: {}", cfg.fetcher.chapter_attempts);
    info!("  Proxy: {}", cfg.fetcher.proxy.as_deref().unwrap_or("none"));
    info!(
        "  Cache: {} entries, {}s TTL",
        cfg.cache.capacity, cfg.cache.ttl_secs
    );

    let state = AppState::new(cfg)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    let data = web::Data::new(state);

    info!("Listening on {}", bind_addr);
    HttpServer::new(move || App::new().app_data(data.clone()).configure(api::configure))
        .bind(&bind_addr)?
        .run()
        .await
}
