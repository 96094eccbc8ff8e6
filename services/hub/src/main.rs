use hub::{HubConfig, HubConfigInput};
use std::env;
use std::path::Path;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "neko233-router-server.json";

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let config_path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_owned());
    let config = match load_config(&config_path) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(%err, path = %config_path, "failed to load hub config");
            std::process::exit(1);
        }
    };

    let hub = hub::Hub::new(config);
    info!("hub starting");

    tokio::select! {
        result = hub.run() => {
            if let Err(err) = result {
                error!(%err, "hub server error");
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            info!("shutdown requested");
            hub.shutdown();
        }
    }
}

fn load_config(path: &str) -> Result<HubConfig, String> {
    if !Path::new(path).exists() {
        let default = HubConfigInput {
            router_server_port: 9999,
            http_monitor_port: 19999,
            admin_password: "root".to_owned(),
        };
        if let Ok(json) = serde_json::to_string_pretty(&default) {
            let _ = std::fs::write(path, json);
        }
        return Err(format!(
            "没有在当前路径找到配置文件, 自动给你生成了一个 {path}, 配置好后再启动项目!"
        ));
    }
    let data = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let input: HubConfigInput = serde_json::from_str(&data).map_err(|e| e.to_string())?;
    HubConfig::validate(input).map_err(|e| e.to_string())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
