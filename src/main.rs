use tokio_util::sync::CancellationToken;

mod config;
mod replay;

fn init_logging(level: log::LevelFilter) {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .filter_module("ffmpeg_mux", level)
        .filter_module("lite_mux", level)
        .init();
}

#[tokio::main]
async fn main() {
    let config = config::config();
    init_logging(config.log_level);
    if let Err(e) = ffmpeg_mux::init() {
        eprintln!("Error initializing ffmpeg: {}", e);
        std::process::exit(1);
    }

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("interrupted, closing session");
            cancel_clone.cancel();
        }
    });

    if let Err(e) = replay::run(config, cancel).await {
        log::error!("relay failed: {:#}", e);
        std::process::exit(1);
    }
}
