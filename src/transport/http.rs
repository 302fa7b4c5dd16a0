//! HTTP 轮询传输源
//!
//! 对后端 REST 端点做周期轮询，端点返回待投递通知 payload 的 JSON 数组。
//! 阻塞式 reqwest 客户端，由适配器放到 `spawn_blocking` 里驱动。

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;

use super::{Credentials, TransportSource};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP 轮询源
pub struct HttpPollingSource {
    client: reqwest::blocking::Client,
    /// 已建立的会话凭据；`None` 表示未连接
    session: Mutex<Option<Credentials>>,
}

impl HttpPollingSource {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            client,
            session: Mutex::new(None),
        })
    }

    fn request(&self, credentials: &Credentials) -> reqwest::blocking::RequestBuilder {
        let mut req = self.client.get(&credentials.endpoint);
        if let Some(token) = &credentials.token {
            req = req.bearer_auth(token);
        }
        req
    }
}

impl TransportSource for HttpPollingSource {
    fn connect(&self, credentials: &Credentials) -> Result<()> {
        // 先做一次探测请求验证端点可达，再建立会话
        let response = self
            .request(credentials)
            .send()
            .with_context(|| format!("probing {}", credentials.endpoint))?;

        if !response.status().is_success() {
            bail!(
                "notification endpoint returned {} during connect",
                response.status()
            );
        }

        *self.session.lock().unwrap() = Some(credentials.clone());
        Ok(())
    }

    fn fetch(&self) -> Result<Vec<Value>> {
        let credentials = self
            .session
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("fetch called before connect"))?;

        let response = self
            .request(&credentials)
            .send()
            .context("polling notification endpoint")?
            .error_for_status()?;

        let payloads: Vec<Value> = response
            .json()
            .context("decoding notification poll response")?;
        Ok(payloads)
    }

    fn disconnect(&self) {
        *self.session.lock().unwrap() = None;
    }
}
