//! Plain HTTP routes served alongside the relay on the same port.

use std::time::Duration;

use base64::Engine as _;

mod common;

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

#[tokio::test]
async fn home_page_names_the_domain() {
    let backend = common::start_echo_backend().await;
    let relay = common::start_relay(common::relay_config(backend)).await;

    let res = client().get(format!("http://{}/", relay.addr)).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.text().await.unwrap(), "Relay running on relay.test");

    relay.stop().await;
}

#[tokio::test]
async fn health_reports_backend_and_connections() {
    let backend = common::start_echo_backend().await;
    let relay = common::start_relay(common::relay_config(backend)).await;

    let res = client().get(format!("http://{}/health", relay.addr)).send().await.unwrap();
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["backend"], "unknown");
    // The health request itself is a live connection.
    assert!(body["active_connections"].as_u64().unwrap() >= 1);

    relay.stop().await;
}

#[tokio::test]
async fn subscription_is_base64_share_link() {
    let backend = common::start_echo_backend().await;
    let mut config = common::relay_config(backend);
    config.subscription.uuid = "9afd1229-b893-40c1-84dd-51e7ce204913".into();
    config.subscription.public_port = Some(443);
    config.subscription.remark = "edge".into();
    let relay = common::start_relay(config).await;

    let res = client().get(format!("http://{}/sub", relay.addr)).send().await.unwrap();
    assert_eq!(res.status(), 200);
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(res.text().await.unwrap())
        .unwrap();
    assert_eq!(
        String::from_utf8(decoded).unwrap(),
        "vless://9afd1229-b893-40c1-84dd-51e7ce204913@relay.test:443\
         ?encryption=none&security=tls&sni=relay.test&type=ws&path=%2Fspeed#edge"
    );

    relay.stop().await;
}

#[tokio::test]
async fn plain_get_on_upgrade_path_is_not_relayed() {
    let backend = common::start_echo_backend().await;
    let relay = common::start_relay(common::relay_config(backend)).await;

    let res = client().get(format!("http://{}/speed", relay.addr)).send().await.unwrap();
    assert_eq!(res.status(), 404);

    relay.stop().await;
}
