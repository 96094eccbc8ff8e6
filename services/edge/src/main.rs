use edge::{EdgeConfig, EdgeConfigInput};
use route_rpc::StubRegistry;
use std::env;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "neko233-router-client.json";

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
            error!(%err, path = %config_path, "failed to load edge config");
            std::process::exit(1);
        }
    };

    let stubs = Arc::new(StubRegistry::new());
    register_demo_stubs(&stubs);

    let client = edge::EdgeClient::new(config, stubs);
    if let Err(err) = client.start().await {
        error!(%err, "failed to start edge client");
        std::process::exit(1);
    }
    info!("edge client starting");

    if let Err(err) = client.await_route_table_ready().await {
        error!(%err, "等待路由信息失败");
        std::process::exit(1);
    }

    shutdown_signal().await;
    info!("shutdown requested");
    client.shutdown().await;
}

/// Registers the template's one demo stub so the stub registry's fail-fast
/// check is satisfied. Real deployments replace this with their own
/// `StubRegistry::register_raw` calls before `EdgeClient::start`.
fn register_demo_stubs(stubs: &Arc<StubRegistry>) {
    let (meta, handler) = route_rpc::stub::two_arg_handler::<i64, i64, i64, _>(1, "adds two integers", "add", ["a", "b"], |a, b| Ok(a + b));
    stubs.register_raw(meta, handler);
}

fn load_config(path: &str) -> Result<EdgeConfig, String> {
    if !Path::new(path).exists() {
        let default = EdgeConfigInput {
            route_id: String::new(),
            router_center_host: "127.0.0.1".to_owned(),
            router_center_port: 9999,
            rpc_mode: "relay".to_owned(),
            local_rpc_host: String::new(),
            local_rpc_port: 0,
            heart_beat_interval_second: 10,
            reconnect_interval_ms: 30_000,
        };
        if let Ok(json) = serde_json::to_string_pretty(&default) {
            let _ = std::fs::write(path, json);
        }
        return Err(format!(
            "没有在当前路径找到配置文件, 自动给你生成了一个 {path}, 配置好后再启动项目!"
        ));
    }
    let data = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let input: EdgeConfigInput = serde_json::from_str(&data).map_err(|e| e.to_string())?;
    EdgeConfig::validate(input).map_err(|e| e.to_string())
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
