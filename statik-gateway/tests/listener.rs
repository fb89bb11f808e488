use std::sync::Arc;

use statik_core::config::{GatewayKind, MountConfig, RuntimeMode, StaticFilesConfig};
use statik_files::StaticFiles;
use statik_gateway::{InfoApp, gateway_for, serve};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_listener_serves_files_and_app() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("public");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(root.join("app.css"), "body { color: red }").unwrap();
    std::fs::write(root.join("app.css.gz"), "not-really-gzip").unwrap();

    let config = StaticFilesConfig {
        mounts: vec![MountConfig {
            prefix: "/assets".to_string(),
            root,
        }],
        ..Default::default()
    };

    for kind in GatewayKind::ALL {
        let files = Arc::new(StaticFiles::new(&config, RuntimeMode::Mt).unwrap());
        let gateway = gateway_for(kind, files, Arc::new(InfoApp::new(RuntimeMode::Mt)));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve(listener, gateway, async {
            let _ = stop_rx.await;
        }));

        let client = reqwest::Client::new();

        let res = client
            .get(format!("http://{}/assets/app.css", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200, "{kind}");
        assert_eq!(res.headers()["content-type"], "text/css");
        assert_eq!(res.headers()["content-length"], "19");
        assert_eq!(res.text().await.unwrap(), "body { color: red }");

        let res = client
            .get(format!("http://{}/assets/app.css", addr))
            .header("Accept-Encoding", "gzip")
            .send()
            .await
            .unwrap();
        assert_eq!(res.headers()["content-encoding"], "gzip");
        assert_eq!(res.bytes().await.unwrap().as_ref(), b"not-really-gzip");

        let res = client
            .get(format!("http://{}/assets/missing.css", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 404);

        let res = client.get(format!("http://{}/info", addr)).send().await.unwrap();
        assert_eq!(res.status(), 200);
        let info: serde_json::Value = res.json().await.unwrap();
        assert_eq!(info["gateway"], kind.as_str());

        stop_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
