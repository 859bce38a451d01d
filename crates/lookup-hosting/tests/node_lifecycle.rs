//! 服务节点完整生命周期：启动、管理面访问、运维事件、主动退出。
//!
//! 命名节点以内存传输替身代替，管理面则通过真实 TCP 监听与 `reqwest` 访问；
//! `https` 节点按其注册时声明的地址与 scheme 拨号。

use std::{collections::HashMap, fs, net::TcpListener, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use lookup_client::{HttpTransport, Transport, TransportError, TransportResponse, TransportSettings};
use lookup_core::{
    Scheme, ServiceNode,
    consts::{
        EVENT_REQUEST_PATH, LOOKUP_DEREGISTER_PATH, LOOKUP_QUERY_PATH, LOOKUP_REGISTER_PATH,
        PING_PATH,
    },
};
use lookup_hosting::{
    BootError, ConfigError, NodeConfig, NodeHostBuilder, ProcessExit, ShutdownState, TlsError,
};
use parking_lot::Mutex;
use serde_json::{Value, json};

const LOOKUP: &str = "10.0.0.1:7000";

#[derive(Default)]
struct LookupStub {
    calls: Mutex<Vec<(String, Value)>>,
}

impl LookupStub {
    fn registered(&self) -> Option<ServiceNode> {
        self.calls
            .lock()
            .iter()
            .find(|(url, _)| url.ends_with(LOOKUP_REGISTER_PATH))
            .and_then(|(_, payload)| serde_json::from_value(payload.clone()).ok())
    }

    fn paths(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .map(|(url, _)| url.trim_start_matches(&format!("https://{LOOKUP}")).to_owned())
            .collect()
    }
}

#[async_trait]
impl Transport for LookupStub {
    async fn post(
        &self,
        url: &str,
        body: Bytes,
        read_body: bool,
    ) -> Result<TransportResponse, TransportError> {
        let payload = serde_json::from_slice(&body).unwrap_or(Value::Null);
        self.calls.lock().push((url.to_owned(), payload));
        let reply: HashMap<String, &str> = HashMap::from([
            (format!("https://{LOOKUP}{LOOKUP_REGISTER_PATH}"), ""),
            (format!("https://{LOOKUP}{LOOKUP_DEREGISTER_PATH}"), ""),
            (format!("https://{LOOKUP}{LOOKUP_QUERY_PATH}"), "{\"nodes\":[]}"),
        ]);
        match reply.get(url) {
            Some(body) if read_body => Ok(TransportResponse::new(200, body.to_string())),
            Some(_) => Ok(TransportResponse::new(200, Bytes::new())),
            None => Err(TransportError::Unavailable {
                url: url.to_owned(),
                detail: "no route".to_owned(),
            }),
        }
    }
}

#[derive(Default)]
struct RecordingExit {
    codes: Mutex<Vec<i32>>,
}

impl ProcessExit for RecordingExit {
    fn exit(&self, code: i32) {
        self.codes.lock().push(code);
    }
}

fn config(stack_dump_dir: PathBuf) -> NodeConfig {
    NodeConfig {
        host: "127.0.0.1:0".to_owned(),
        lookup: vec![LOOKUP.to_owned()],
        node_type: "worker".to_owned(),
        scheme: Scheme::Http,
        shutdown_timeout_ms: 500,
        shutdown_min_dwell_ms: 0,
        stack_dump_dir,
        ..NodeConfig::default()
    }
}

async fn post_json(
    http: &reqwest::Client,
    url: &str,
    body: Value,
) -> (reqwest::StatusCode, Value) {
    let response = http
        .post(url)
        .json(&body)
        .send()
        .await
        .expect("admin endpoint reachable");
    let status = response.status();
    let body = response.json().await.unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn node_serves_admin_events_and_deregisters_on_exit() {
    let dump_dir = std::env::temp_dir().join(format!(
        "lookup-node-lifecycle-{}",
        lookup_core::uid::generate_uid()
    ));
    let lookup = Arc::new(LookupStub::default());
    let exit = Arc::new(RecordingExit::default());

    let node = NodeHostBuilder::new(config(dump_dir.clone()))
        .with_transport(Arc::clone(&lookup) as Arc<dyn Transport>)
        .with_process_exit(Arc::clone(&exit) as Arc<dyn ProcessExit>)
        .start()
        .await
        .expect("node starts");
    let app_uid = node.client().app_uid().to_owned();
    let base = format!("http://{}", node.local_addr());
    assert_eq!(lookup.paths(), [LOOKUP_REGISTER_PATH]);

    let http = reqwest::Client::new();
    let (status, body) =
        post_json(&http, &format!("{base}{PING_PATH}"), json!({ "to-uid": app_uid })).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body, json!({ "from-uid": app_uid }));

    let event_url = format!("{base}{EVENT_REQUEST_PATH}");
    let (_, body) = post_json(
        &http,
        &event_url,
        json!({ "event-id": "dumpAppStack", "event-args": [] }),
    )
    .await;
    assert_eq!(body, json!({ "result": true }));
    assert!(dump_dir.join("worker.127001_0.stack").exists());

    let (_, body) = post_json(
        &http,
        &event_url,
        json!({ "event-id": "nodeUpdatedNotify", "event-args": [] }),
    )
    .await;
    assert_eq!(body, json!({ "result": true }));

    // 未提供日志句柄时不注册 setLogLevel，事件视为无动作。
    let (_, body) = post_json(
        &http,
        &event_url,
        json!({ "event-id": "setLogLevel", "event-args": ["4"] }),
    )
    .await;
    assert_eq!(body, json!({ "result": false }));
    drop(http);

    let coordinator = Arc::clone(node.coordinator());
    let requester = tokio::spawn(async move { coordinator.request_exit(7).await });
    node.wait().await.expect("node shuts down cleanly");
    assert!(requester.await.expect("exit request completes"));

    assert_eq!(*exit.codes.lock(), [7]);
    assert!(
        lookup
            .paths()
            .iter()
            .any(|path| path == LOOKUP_DEREGISTER_PATH)
    );
    let dumps = fs::read_to_string(dump_dir.join("worker.127001_0.stack")).expect("stack file");
    assert!(dumps.contains("(exit)"));
    let _ = fs::remove_dir_all(dump_dir);
}

fn free_local_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .expect("ephemeral port")
        .port()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn https_node_is_reachable_on_the_scheme_it_registers() {
    let dir = std::env::temp_dir().join(format!(
        "lookup-node-tls-{}",
        lookup_core::uid::generate_uid()
    ));
    fs::create_dir_all(&dir).expect("scratch dir");
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_owned()])
        .expect("self-signed certificate");
    fs::write(dir.join("server.crt"), certified.cert.pem()).expect("write cert");
    fs::write(dir.join("server.key"), certified.key_pair.serialize_pem()).expect("write key");

    let mut config = config(dir.clone());
    config.host = format!("127.0.0.1:{}", free_local_port());
    config.scheme = Scheme::Https;
    config.tls_cert = dir.join("server.crt");
    config.tls_key = dir.join("server.key");
    let lookup = Arc::new(LookupStub::default());
    let node = NodeHostBuilder::new(config)
        .with_transport(Arc::clone(&lookup) as Arc<dyn Transport>)
        .with_process_exit(Arc::new(RecordingExit::default()))
        .start()
        .await
        .expect("node starts");

    let advertised = lookup.registered().expect("node registered itself");
    assert_eq!(advertised.scheme, Scheme::Https);

    // 对端与发现客户端使用同一传输实现，自签证书按默认设置放行。
    let peer = HttpTransport::new(&TransportSettings::default()).expect("peer transport");
    let ping = json!({ "to-uid": node.client().app_uid() }).to_string();
    let response = peer
        .post(&advertised.join_url(PING_PATH), ping.into(), true)
        .await
        .expect("tls handshake and request succeed");
    assert!(response.is_ok());
    let body: Value = serde_json::from_slice(&response.body).expect("json body");
    assert_eq!(body, json!({ "from-uid": node.client().app_uid() }));

    // 明文拨号无法与 TLS 端口完成请求。
    let plain = advertised.join_url(PING_PATH).replacen("https://", "http://", 1);
    assert!(peer.post(&plain, Bytes::from_static(b"{}"), true).await.is_err());

    node.coordinator().request_exit(0).await;
    node.wait().await.expect("node shuts down cleanly");
    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn missing_certificate_stops_https_boot() {
    let mut config = config(std::env::temp_dir());
    config.scheme = Scheme::Https;
    config.tls_cert = std::env::temp_dir().join("lookup-node-absent.crt");
    let err = NodeHostBuilder::new(config)
        .with_transport(Arc::new(LookupStub::default()))
        .start()
        .await
        .expect_err("certificate must exist");
    assert!(matches!(err, BootError::Tls(TlsError::Certificate { .. })));
}

#[tokio::test]
async fn invalid_configuration_stops_boot_early() {
    let mut config = config(std::env::temp_dir());
    config.host = "0.0.0.0:9000".to_owned();
    let err = NodeHostBuilder::new(config)
        .with_transport(Arc::new(LookupStub::default()))
        .start()
        .await
        .expect_err("unspecified host is rejected");
    assert!(matches!(
        err,
        BootError::Config(ConfigError::InvalidAddress { .. })
    ));
}

#[tokio::test]
async fn coordinator_starts_in_running_state() {
    let dump_dir = std::env::temp_dir().join(format!(
        "lookup-node-running-{}",
        lookup_core::uid::generate_uid()
    ));
    let node = NodeHostBuilder::new(config(dump_dir.clone()))
        .with_transport(Arc::new(LookupStub::default()))
        .with_process_exit(Arc::new(RecordingExit::default()))
        .start()
        .await
        .expect("node starts");
    assert_eq!(node.coordinator().state(), ShutdownState::Running);
    assert!(!node.coordinator().shutdown_token().is_cancelled());
    node.coordinator().request_exit(0).await;
    node.wait().await.expect("node shuts down cleanly");
    let _ = fs::remove_dir_all(dump_dir);
}
